//! Melee combat resolution.
//!
//! Per attacker the state machine is idle → acquiring(target) →
//! in_range(cooldown running) → idle. Range gating happens every tick; the
//! damage itself lands on a spawned cooldown timer that re-resolves both
//! parties under the world lock, so a vanished attacker or victim turns the
//! swing into a no-op.

use crate::game::World;
use crate::session::SessionId;
use log::debug;
use shared::{ATTACK_DAMAGE, TILE_SIZE};
use std::sync::Arc;
use tokio::sync::RwLock;

/// True when the attacker stands on one of the four cardinal-adjacent tiles
/// of the target: exactly one tile away on one axis, aligned on the other.
/// Diagonal or same-tile positioning is never in range.
pub fn in_melee_range(ax: i32, ay: i32, tx: i32, ty: i32) -> bool {
    let dx = ax - tx;
    let dy = ay - ty;
    (dx.abs() == TILE_SIZE && dy == 0) || (dx == 0 && dy.abs() == TILE_SIZE)
}

/// Evaluates one attacker's intent for this tick, starting a cooldown timer
/// when they are in range with none pending.
pub fn update(world: &mut World, handle: &Arc<RwLock<World>>, session_id: SessionId) {
    let Some(attacker) = world.user(session_id) else {
        return;
    };
    if !attacker.loaded {
        return;
    }
    let Some(attack) = attacker.attack.as_ref() else {
        return;
    };

    let attacker_name = attacker.id.clone();
    let target_name = attack.target.clone();
    let cooldown_running = attack.cooldown.is_some();
    let (ax, ay) = (attacker.x, attacker.y);

    // Target left the world: treat the attacker as idle. A pending timer is
    // left to complete on its own and will no-op against the absent victim.
    let Some(victim_session) = world.session_by_username(&target_name) else {
        return;
    };
    let Some(victim) = world.user(victim_session) else {
        return;
    };
    let (vx, vy) = (victim.x, victim.y);

    if cooldown_running || !in_melee_range(ax, ay, vx, vy) {
        return;
    }

    let cooldown = world.config.attack_cooldown;
    let world_handle = Arc::clone(handle);
    let task = tokio::spawn(async move {
        tokio::time::sleep(cooldown).await;
        let mut world = world_handle.write().await;
        resolve_swing(&mut world, &attacker_name, &target_name);
    });

    if let Some(attacker) = world.user_mut(session_id) {
        if let Some(attack) = attacker.attack.as_mut() {
            attack.cooldown = Some(task.abort_handle());
        }
    }
}

/// Applies one completed swing. Runs when a cooldown timer fires; either
/// party having left the world since turns this into a no-op.
pub fn resolve_swing(world: &mut World, attacker_name: &str, victim_name: &str) {
    // The timer has fired either way: drop the handle so the next in-range
    // tick can start a fresh swing.
    let Some(attacker_session) = world.session_by_username(attacker_name) else {
        debug!("swing by absent attacker {} discarded", attacker_name);
        return;
    };
    if let Some(attacker) = world.user_mut(attacker_session) {
        if let Some(attack) = attacker.attack.as_mut() {
            attack.cooldown = None;
        }
    }

    let Some(victim_session) = world.session_by_username(victim_name) else {
        debug!("swing against absent victim {} discarded", victim_name);
        return;
    };

    let victim_dead = match world.user_mut(victim_session) {
        Some(victim) => {
            victim.damage(ATTACK_DAMAGE);
            victim.health <= 0
        }
        None => return,
    };

    // Don't keep swinging at an already-dead target; the victim's own death
    // transition runs on its next tick.
    if victim_dead {
        if let Some(attacker) = world.user_mut(attacker_session) {
            attacker.clear_attack();
        }
    }
}
