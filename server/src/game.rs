//! The authoritative world: session registry, drop table, tile map and the
//! per-tick simulation step.
//!
//! All mutation funnels through the single tick driver holding the world's
//! write lock; cooldown and drop timers take the same lock from their own
//! tasks, so every cross-task mutation is a critical section.

use crate::combat;
use crate::drops::DropTable;
use crate::pathfinding::Grid;
use crate::session::{Session, SessionId};
use crate::user::{Attack, User};
use log::{info, warn};
use rand::Rng;
use shared::{
    Direction, Packet, PlayerSnapshot, WorldSnapshot, ATTACK_COOLDOWN_MS, DROP_DELAY_MS,
    MESSAGE_TTL_TICKS, TICK_RATE, TILE_SIZE,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

/// Persistence collaborator. Called synchronously inside `logout`, which
/// guarantees the save has completed before the user detaches from the
/// session.
pub trait UserStore: Send + Sync {
    fn save(&self, user: &User);
}

/// Store that discards every save. Useful when persistence is handled
/// elsewhere or not at all.
pub struct NullStore;

impl UserStore for NullStore {
    fn save(&self, _user: &User) {}
}

/// Runtime tunables; defaults reflect the production constants.
#[derive(Debug, Clone)]
pub struct WorldConfig {
    pub tick_rate: u32,
    pub attack_cooldown: Duration,
    pub drop_delay: Duration,
    pub message_ttl_ticks: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        WorldConfig {
            tick_rate: TICK_RATE,
            attack_cooldown: Duration::from_millis(ATTACK_COOLDOWN_MS),
            drop_delay: Duration::from_millis(DROP_DELAY_MS),
            message_ttl_ticks: MESSAGE_TTL_TICKS,
        }
    }
}

/// Intents delivered into the tick loop from transport and admin tasks.
#[derive(Debug)]
pub enum WorldCommand {
    Connect {
        session_id: SessionId,
        outbound: mpsc::UnboundedSender<Packet>,
    },
    Disconnect {
        session_id: SessionId,
    },
    Login {
        session_id: SessionId,
        username: String,
        avatar: String,
    },
    Logout {
        session_id: SessionId,
    },
    /// Handshake completion: the client has received its initial state.
    MarkLoaded {
        session_id: SessionId,
    },
    KeyPress {
        session_id: SessionId,
        direction: Direction,
        pressed: bool,
    },
    MoveTo {
        session_id: SessionId,
        x: i32,
        y: i32,
    },
    Follow {
        session_id: SessionId,
        target: Option<String>,
    },
    Attack {
        session_id: SessionId,
        target: Option<String>,
    },
    Chat {
        session_id: SessionId,
        text: String,
    },
    DropItem {
        item: u32,
        name: String,
        quantity: u32,
        x: i32,
        y: i32,
    },
}

/// Shared 2D tile world and everything living in it.
pub struct World {
    sessions: HashMap<SessionId, Session>,
    pub drops: DropTable,
    map: Vec<Vec<u8>>,
    grid: Grid,
    pub config: WorldConfig,
    tick: u64,
    store: Arc<dyn UserStore>,
}

impl World {
    pub fn new(map: Vec<Vec<u8>>, config: WorldConfig, store: Arc<dyn UserStore>) -> Self {
        let grid = Grid::from_tile_map(&map);
        World {
            sessions: HashMap::new(),
            drops: DropTable::new(),
            map,
            grid,
            config,
            tick: 0,
            store,
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn tile_map(&self) -> &Vec<Vec<u8>> {
        &self.map
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    // --- Session registry ---

    /// Registers a bare connection with no user bound yet. An existing
    /// session under the same id is replaced.
    pub fn register(&mut self, session: Session) {
        info!("session {} connected", session.id);
        self.sessions.insert(session.id, session);
    }

    /// Binds a user to a session, keyed by session id. Overwriting an
    /// existing id is how relogin on the same connection is modeled.
    pub fn add_session(&mut self, mut session: Session, user: User) {
        info!("session {}: {} entered the world", session.id, user.id);
        session.user = Some(user);
        self.sessions.insert(session.id, session);
    }

    /// Binds a user to an already-registered session. Replaces any user
    /// currently bound to it.
    pub fn bind_user(&mut self, session_id: SessionId, user: User) -> bool {
        match self.sessions.get_mut(&session_id) {
            Some(session) => {
                info!("session {}: {} entered the world", session_id, user.id);
                session.user = Some(user);
                true
            }
            None => false,
        }
    }

    /// Removes the session binding without side effects.
    pub fn remove_session(&mut self, session_id: SessionId) -> Option<Session> {
        self.sessions.remove(&session_id)
    }

    /// Linear scan for the session whose logged-in user has this name.
    pub fn session_by_username(&self, username: &str) -> Option<SessionId> {
        self.sessions
            .values()
            .find(|session| session.username() == Some(username))
            .map(|session| session.id)
    }

    pub fn user(&self, session_id: SessionId) -> Option<&User> {
        self.sessions
            .get(&session_id)
            .and_then(|session| session.user.as_ref())
    }

    pub fn user_mut(&mut self, session_id: SessionId) -> Option<&mut User> {
        self.sessions
            .get_mut(&session_id)
            .and_then(|session| session.user.as_mut())
    }

    fn position_of(&self, username: &str) -> Option<(i32, i32)> {
        self.session_by_username(username)
            .and_then(|id| self.user(id))
            .map(|user| (user.x, user.y))
    }

    /// Usernames of all logged-in users standing exactly at this pixel
    /// position.
    pub fn users_at(&self, x: i32, y: i32) -> Vec<String> {
        self.sessions
            .values()
            .filter_map(|session| session.user.as_ref())
            .filter(|user| user.x == x && user.y == y)
            .map(|user| user.id.clone())
            .collect()
    }

    /// Saves and detaches the session's user. No-op (returns false) when no
    /// user is bound. A non-empty reason is delivered to the session's
    /// channel as a one-shot logout notification.
    pub fn logout(&mut self, session_id: SessionId, reason: Option<&str>) -> bool {
        let Some(session) = self.sessions.get_mut(&session_id) else {
            return false;
        };
        let Some(mut user) = session.user.take() else {
            return false;
        };

        self.store.save(&user);
        if let Some(reason) = reason.filter(|r| !r.is_empty()) {
            session.send(Packet::LoggedOut {
                reason: reason.to_string(),
            });
        }

        user.clear_attack();
        info!("session {}: {} logged out", session_id, user.id);
        true
    }

    /// Tears a session down. Idempotent: unknown ids are ignored; a bound
    /// user goes through `logout` first, so state is saved before the
    /// session disappears.
    pub fn disconnect(&mut self, session_id: SessionId) {
        if !self.sessions.contains_key(&session_id) {
            return;
        }
        self.logout(session_id, None);
        self.remove_session(session_id);
        info!("session {} disconnected", session_id);
    }

    // --- Game-rules helpers ---

    /// Forces the named user through the death transition. Returns false if
    /// no such user is in the world.
    pub fn kill(&mut self, username: &str) -> bool {
        let Some(session_id) = self.session_by_username(username) else {
            return false;
        };
        let spawn = self.spawn_point();
        if let Some(user) = self.user_mut(session_id) {
            user.die(spawn);
            true
        } else {
            false
        }
    }

    /// Moves one session's user onto another's tile. No-op when either
    /// session lacks a user.
    pub fn teleport(&mut self, from: SessionId, to: SessionId) {
        let Some((x, y)) = self.user(to).map(|user| (user.x, user.y)) else {
            return;
        };
        if let Some(user) = self.user_mut(from) {
            user.x = x;
            user.y = y;
            user.path.clear();
        }
    }

    /// Random walkable tile in pixel coordinates; (0, 0) when the map has
    /// no walkable tile at all.
    pub fn spawn_point(&self) -> (i32, i32) {
        let mut walkable = Vec::new();
        for ty in 0..self.grid.height() as i32 {
            for tx in 0..self.grid.width() as i32 {
                if self.grid.is_walkable(tx, ty) {
                    walkable.push((tx * TILE_SIZE, ty * TILE_SIZE));
                }
            }
        }
        if walkable.is_empty() {
            return (0, 0);
        }
        walkable[rand::thread_rng().gen_range(0..walkable.len())]
    }

    // --- Item drops ---

    /// Schedules a drop after the configured delay, decorrelating key
    /// generation from the causing event.
    pub fn add_drop(
        &self,
        handle: &Arc<RwLock<World>>,
        item: u32,
        name: String,
        quantity: u32,
        x: i32,
        y: i32,
    ) {
        let delay = self.config.drop_delay;
        let world = Arc::clone(handle);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut world = world.write().await;
            world.drops.insert(item, &name, quantity, x, y);
        });
    }

    // --- Tick step ---

    /// Advances the world by one tick and broadcasts the resulting
    /// snapshot to every session.
    pub fn step(&mut self, handle: &Arc<RwLock<World>>) {
        self.tick += 1;

        let ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        for session_id in ids {
            self.update_user(session_id, handle);
        }

        self.broadcast();
    }

    fn update_user(&mut self, session_id: SessionId, handle: &Arc<RwLock<World>>) {
        // Refresh the follow path before movement. Held keys and explicit
        // paths both take precedence over auto-follow.
        let (follow_target, ux, uy) = match self.user(session_id) {
            Some(user) if user.loaded => {
                let target = if user.keys.direction().is_none() && user.path.is_empty() {
                    user.following.clone()
                } else {
                    None
                };
                (target, user.x, user.y)
            }
            _ => return,
        };
        if let Some(target) = follow_target {
            match self.position_of(&target) {
                Some((tx, ty)) => {
                    let path = self.grid.find_path(ux, uy, tx, ty);
                    if let Some(user) = self.user_mut(session_id) {
                        user.set_path(path);
                    }
                }
                None => {
                    // Follow target left the world
                    if let Some(user) = self.user_mut(session_id) {
                        user.following = None;
                    }
                }
            }
        }

        let tick = self.tick;
        {
            let grid = &self.grid;
            if let Some(session) = self.sessions.get_mut(&session_id) {
                if let Some(user) = session.user.as_mut() {
                    user.advance(grid, tick);
                }
            }
        }

        let died = self.user(session_id).is_some_and(|user| user.health <= 0);
        if died {
            let spawn = self.spawn_point();
            if let Some(user) = self.user_mut(session_id) {
                user.die(spawn);
            }
        }

        combat::update(self, handle, session_id);

        // Pickup scan: first detected drop wins, removal makes it
        // unavailable to everyone else this tick.
        let position = self.user(session_id).map(|user| (user.x, user.y));
        if let Some((ux, uy)) = position {
            for key in self.drops.overlapping(ux, uy, TILE_SIZE, TILE_SIZE) {
                if let Some(item) = self.drops.remove(&key) {
                    if let Some(user) = self.user_mut(session_id) {
                        user.pickup(item.item, item.quantity);
                    }
                }
            }
        }
    }

    // --- Snapshot broadcast ---

    /// Assembles the broadcast payload for the current tick, without a
    /// recipient annotation.
    pub fn snapshot(&self) -> WorldSnapshot {
        let players: HashMap<String, PlayerSnapshot> = self
            .sessions
            .values()
            .filter_map(|session| session.user.as_ref())
            .map(|user| (user.id.clone(), user.snapshot()))
            .collect();

        WorldSnapshot {
            tick: self.tick,
            players,
            items: self.drops.items(),
            world_map: self.map.clone(),
            world_matrix: self.grid.matrix(),
            logged: None,
        }
    }

    /// Pushes the tick snapshot to every session, annotated with the
    /// recipient's own user id. Sends never block; unreachable peers are
    /// skipped.
    fn broadcast(&self) {
        let snapshot = self.snapshot();
        for session in self.sessions.values() {
            let mut own = snapshot.clone();
            own.logged = session.username().map(str::to_string);
            session.send(Packet::Tick(Box::new(own)));
        }
    }
}

/// Applies one intent to the world. Runs on the tick task between steps, so
/// commands never interleave with a step half-way.
pub fn apply_command(world: &mut World, handle: &Arc<RwLock<World>>, command: WorldCommand) {
    match command {
        WorldCommand::Connect {
            session_id,
            outbound,
        } => {
            world.register(Session::new(session_id, outbound));
        }
        WorldCommand::Disconnect { session_id } => {
            world.disconnect(session_id);
        }
        WorldCommand::Login {
            session_id,
            username,
            avatar,
        } => {
            if world.session_by_username(&username).is_some() {
                warn!(
                    "session {}: login as {} refused, name already in world",
                    session_id, username
                );
                return;
            }
            let (x, y) = world.spawn_point();
            if !world.bind_user(session_id, User::new(&username, &avatar, x, y)) {
                warn!("session {}: login for unknown session", session_id);
            }
        }
        WorldCommand::Logout { session_id } => {
            world.logout(session_id, None);
        }
        WorldCommand::MarkLoaded { session_id } => {
            if let Some(user) = world.user_mut(session_id) {
                user.loaded = true;
            }
        }
        WorldCommand::KeyPress {
            session_id,
            direction,
            pressed,
        } => {
            if let Some(user) = world.user_mut(session_id) {
                user.keys.set(direction, pressed);
            }
        }
        WorldCommand::MoveTo { session_id, x, y } => {
            let Some((ux, uy)) = world.user(session_id).map(|user| (user.x, user.y)) else {
                return;
            };
            let path = world.grid().find_path(ux, uy, x, y);
            if let Some(user) = world.user_mut(session_id) {
                user.set_path(path);
            }
        }
        WorldCommand::Follow { session_id, target } => {
            if let Some(user) = world.user_mut(session_id) {
                user.following = target.filter(|name| *name != user.id);
            }
        }
        WorldCommand::Attack { session_id, target } => {
            if let Some(user) = world.user_mut(session_id) {
                user.clear_attack();
                if let Some(target) = target.filter(|name| *name != user.id) {
                    user.attack = Some(Attack {
                        target,
                        cooldown: None,
                    });
                }
            }
        }
        WorldCommand::Chat { session_id, text } => {
            let tick = world.tick();
            let ttl = world.config.message_ttl_ticks;
            if let Some(user) = world.user_mut(session_id) {
                user.say(text, tick, ttl);
            }
        }
        WorldCommand::DropItem {
            item,
            name,
            quantity,
            x,
            y,
        } => {
            world.add_drop(handle, item, name, quantity, x, y);
        }
    }
}

/// Loads the static tile map from a JSON file of rows of tile codes.
///
/// This is the one fatal-class startup condition: an unreadable or corrupt
/// map prevents grid construction and is surfaced once, not retried.
pub fn load_tile_map(path: &Path) -> Result<Vec<Vec<u8>>, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    let map: Vec<Vec<u8>> = serde_json::from_str(&raw)?;
    if map.is_empty() || map.iter().all(|row| row.is_empty()) {
        return Err(format!("tile map {} has no tiles", path.display()).into());
    }
    Ok(map)
}
