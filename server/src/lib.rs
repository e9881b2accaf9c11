//! # Tile World Server Library
//!
//! This library provides the authoritative simulation of a shared 2D tile
//! world. It owns the canonical state of every logged-in user, advances that
//! state at a fixed tick rate, and broadcasts a fresh snapshot of the whole
//! world to every connected session after each step.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! All gameplay decisions happen here: movement along held keys and computed
//! paths, melee combat with its cooldown timers, death and respawn, chat
//! message lifetimes, and item drop pickup. Clients only express intent;
//! the world decides what actually happens.
//!
//! ### Session Management
//! Tracks the lifecycle of every connection: registration, login (binding a
//! user to a session), explicit logout with a synchronous save, and
//! idempotent disconnect. Sessions without a bound user still receive
//! broadcasts as spectators.
//!
//! ### Snapshot Broadcasting
//! Once per tick the world assembles a single [`shared::WorldSnapshot`] and
//! delivers a per-recipient clone to each session, annotated with that
//! recipient's own user id. Sends never block the tick.
//!
//! ## Architecture Design
//!
//! ### Single Tick Driver
//! One task drives the simulation at a fixed rate, draining queued
//! [`game::WorldCommand`] intents and then calling [`game::World::step`]
//! under the world's write lock. Steps that would overlap are skipped, not
//! queued, so load shows up as a lower tick rate rather than growing lag.
//!
//! ### Timers as Tasks
//! Combat cooldowns and deferred drop creation are spawned tasks sleeping on
//! their delay. When a timer fires it re-acquires the world lock and
//! re-resolves its parties by name; anyone who left in the meantime turns
//! the callback into a no-op. Each attacker holds at most one cooldown
//! timer, and resetting a user aborts their pending timer.
//!
//! ## Module Organization
//!
//! - [`game`] — the [`game::World`]: session registry, drop table, tile
//!   map, tick step, snapshot assembly and command application.
//! - [`user`] — per-player state and its tick-by-tick update rules.
//! - [`session`] — connection identity and the outbound packet channel.
//! - [`combat`] — melee range gating and swing resolution.
//! - [`drops`] — the keyed table of ephemeral item drops.
//! - [`pathfinding`] — A* over the walkability grid derived from the map.

pub mod combat;
pub mod drops;
pub mod game;
pub mod pathfinding;
pub mod session;
pub mod user;
