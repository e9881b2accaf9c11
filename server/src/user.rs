//! Per-player simulation state and its tick-by-tick update rules.

use crate::pathfinding::Grid;
use log::{debug, info};
use shared::{
    ChatMessage, Direction, PlayerSnapshot, DEFAULT_MAX_HEALTH, FRAME_COUNT, FRAME_STEP, TILE_SIZE,
};
use std::collections::{HashMap, VecDeque};
use tokio::task::AbortHandle;

/// Melee intent of a user: who they are swinging at, and the handle of the
/// in-flight cooldown timer if one is running. At most one timer exists per
/// attacker at any time.
#[derive(Debug, Default)]
pub struct Attack {
    pub target: String,
    pub cooldown: Option<AbortHandle>,
}

/// Held movement keys, updated by `KeyPress` intents.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl KeyState {
    pub fn set(&mut self, direction: Direction, pressed: bool) {
        match direction {
            Direction::Up => self.up = pressed,
            Direction::Down => self.down = pressed,
            Direction::Left => self.left = pressed,
            Direction::Right => self.right = pressed,
        }
    }

    /// Direction of held-key movement, if any key is down. With several
    /// keys held the first in up/down/left/right order wins.
    pub fn direction(&self) -> Option<Direction> {
        if self.up {
            Some(Direction::Up)
        } else if self.down {
            Some(Direction::Down)
        } else if self.left {
            Some(Direction::Left)
        } else if self.right {
            Some(Direction::Right)
        } else {
            None
        }
    }
}

/// A chat message pinned to its speaker until the expiry tick passes.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub id: String,
    pub text: String,
    pub expires_tick: u64,
}

/// A logged-in player's authoritative state.
///
/// Positions are pixel coordinates that stay tile-aligned: every movement
/// step covers exactly one tile. Facing and frame are cosmetic state derived
/// from the motion each tick.
#[derive(Debug)]
pub struct User {
    pub id: String,
    pub x: i32,
    pub y: i32,
    pub facing: Direction,
    pub frame: f32,
    pub health: i32,
    pub max_health: i32,
    pub avatar: String,
    /// Set by the handshake collaborator once the client has received its
    /// initial state; the simulation ignores the user until then.
    pub loaded: bool,
    /// True on ticks where the user moved under direct key control.
    pub walking: bool,
    /// Remaining waypoints, consumed head-first one per tick.
    pub path: VecDeque<(i32, i32)>,
    /// Auto-approach target; direct walk control takes precedence.
    pub following: Option<String>,
    pub attack: Option<Attack>,
    pub message: Option<PendingMessage>,
    pub keys: KeyState,
    pub inventory: HashMap<u32, u32>,
    message_seq: u64,
}

impl User {
    pub fn new(id: &str, avatar: &str, x: i32, y: i32) -> Self {
        User {
            id: id.to_string(),
            x,
            y,
            facing: Direction::default(),
            frame: 0.0,
            health: DEFAULT_MAX_HEALTH,
            max_health: DEFAULT_MAX_HEALTH,
            avatar: avatar.to_string(),
            loaded: false,
            walking: false,
            path: VecDeque::new(),
            following: None,
            attack: None,
            message: None,
            keys: KeyState::default(),
            inventory: HashMap::new(),
            message_seq: 0,
        }
    }

    /// Replaces any current path wholesale.
    pub fn set_path(&mut self, path: Vec<(i32, i32)>) {
        self.path = path.into();
    }

    /// Advances position, animation and message expiry by one tick.
    ///
    /// Movement priority: held keys, then the explicit path, then nothing —
    /// follow paths are installed by the world before this runs and consumed
    /// here like any other path.
    pub fn advance(&mut self, grid: &Grid, tick: u64) {
        if !self.loaded {
            return;
        }

        if let Some(direction) = self.keys.direction() {
            // Direct control invalidates click-to-move
            self.path.clear();
            self.facing = direction;
            self.walking = true;

            let (dx, dy) = direction.delta();
            let nx = self.x + dx * TILE_SIZE;
            let ny = self.y + dy * TILE_SIZE;
            if grid.is_walkable_pixel(nx, ny) {
                self.x = nx;
                self.y = ny;
            }
            self.step_animation();
        } else if let Some((wx, wy)) = self.path.pop_front() {
            self.walking = false;
            self.face_towards(wx, wy);
            self.x = wx;
            self.y = wy;
            self.step_animation();
        } else {
            self.walking = false;
            self.frame = 0.0;
        }

        if let Some(message) = &self.message {
            if message.expires_tick <= tick {
                self.message = None;
            }
        }
    }

    fn face_towards(&mut self, x: i32, y: i32) {
        if x > self.x {
            self.facing = Direction::Right;
        } else if x < self.x {
            self.facing = Direction::Left;
        } else if y < self.y {
            self.facing = Direction::Up;
        } else if y > self.y {
            self.facing = Direction::Down;
        }
    }

    fn step_animation(&mut self) {
        self.frame = (self.frame + FRAME_STEP) % FRAME_COUNT;
    }

    pub fn damage(&mut self, amount: i32) {
        self.health -= amount;
        debug!("{} took {} damage ({} hp left)", self.id, amount, self.health);
    }

    /// Death transition: logs and delegates to [`User::reset`].
    pub fn die(&mut self, spawn: (i32, i32)) {
        info!("{} died, respawning at {:?}", self.id, spawn);
        self.reset(spawn);
    }

    /// Respawn policy: full health at the given spawn tile, with all
    /// movement and combat intent cleared.
    pub fn reset(&mut self, spawn: (i32, i32)) {
        self.health = self.max_health;
        self.x = spawn.0;
        self.y = spawn.1;
        self.path.clear();
        self.following = None;
        self.walking = false;
        self.frame = 0.0;
        self.keys = KeyState::default();
        self.clear_attack();
    }

    /// Drops the attack intent, aborting a pending cooldown timer so it can
    /// never fire against stale state.
    pub fn clear_attack(&mut self) {
        if let Some(attack) = self.attack.take() {
            if let Some(handle) = attack.cooldown {
                handle.abort();
            }
        }
    }

    /// Grants a picked-up item stack to this user's inventory.
    pub fn pickup(&mut self, item: u32, quantity: u32) {
        *self.inventory.entry(item).or_insert(0) += quantity;
        info!("{} picked up {}x item {}", self.id, quantity, item);
    }

    /// Attaches a chat message with a per-user unique id. Any previous
    /// message is replaced.
    pub fn say(&mut self, text: String, tick: u64, ttl_ticks: u64) {
        self.message_seq += 1;
        self.message = Some(PendingMessage {
            id: format!("{}_{}", self.id, self.message_seq),
            text,
            expires_tick: tick + ttl_ticks,
        });
    }

    /// Public fields of this user as broadcast in the snapshot. The
    /// fractional frame is rounded up; `following` is suppressed while the
    /// user walks under direct control.
    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            loaded: self.loaded,
            id: self.id.clone(),
            health: self.health,
            max_health: self.max_health,
            avatar: self.avatar.clone(),
            facing: self.facing,
            frame: self.frame.ceil() as u32,
            x: self.x,
            y: self.y,
            following: if self.walking {
                None
            } else {
                self.following.clone()
            },
            message: self.message.as_ref().map(|m| ChatMessage {
                id: m.id.clone(),
                text: m.text.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn open_grid() -> Grid {
        Grid::from_tile_map(&vec![vec![1; 8]; 8])
    }

    fn loaded_user(x: i32, y: i32) -> User {
        let mut user = User::new("alice", "F", x, y);
        user.loaded = true;
        user
    }

    #[test]
    fn test_unloaded_user_is_inert() {
        let grid = open_grid();
        let mut user = User::new("alice", "F", 32, 32);
        user.set_path(vec![(64, 32)]);

        user.advance(&grid, 1);

        assert_eq!((user.x, user.y), (32, 32));
        assert_eq!(user.path.len(), 1);
    }

    #[test]
    fn test_path_consumed_one_waypoint_per_tick() {
        let grid = open_grid();
        let mut user = loaded_user(0, 0);
        user.set_path(vec![(0, 0), (32, 0), (64, 0)]);

        user.advance(&grid, 1);
        assert_eq!((user.x, user.y), (0, 0));
        user.advance(&grid, 2);
        assert_eq!((user.x, user.y), (32, 0));
        assert_eq!(user.facing, Direction::Right);
        user.advance(&grid, 3);
        assert_eq!((user.x, user.y), (64, 0));
        assert!(user.path.is_empty());
    }

    #[test]
    fn test_keys_take_precedence_over_path() {
        let grid = open_grid();
        let mut user = loaded_user(32, 32);
        user.set_path(vec![(64, 32), (96, 32)]);
        user.keys.set(Direction::Down, true);

        user.advance(&grid, 1);

        assert_eq!((user.x, user.y), (32, 64));
        assert!(user.walking);
        assert!(user.path.is_empty(), "direct control drops the path");
    }

    #[test]
    fn test_key_movement_blocked_by_void_tile() {
        let mut map = vec![vec![1; 4]; 4];
        map[1][2] = 0;
        let grid = Grid::from_tile_map(&map);

        let mut user = loaded_user(32, 32);
        user.keys.set(Direction::Right, true);
        user.advance(&grid, 1);

        // Facing updates, position does not
        assert_eq!((user.x, user.y), (32, 32));
        assert_eq!(user.facing, Direction::Right);
        assert!(user.walking);
    }

    #[test]
    fn test_animation_frame_wraps_and_resets() {
        let grid = open_grid();
        let mut user = loaded_user(0, 0);
        user.keys.set(Direction::Right, true);

        user.advance(&grid, 1);
        assert_approx_eq!(user.frame, FRAME_STEP, 1e-6);
        for tick in 2..=8 {
            user.advance(&grid, tick);
        }
        assert!(user.frame < FRAME_COUNT);

        user.keys.set(Direction::Right, false);
        user.advance(&grid, 9);
        assert_approx_eq!(user.frame, 0.0, 1e-6);
        assert!(!user.walking);
    }

    #[test]
    fn test_message_expires() {
        let grid = open_grid();
        let mut user = loaded_user(0, 0);
        user.say("hello".to_string(), 10, 5);

        user.advance(&grid, 14);
        assert!(user.message.is_some());
        user.advance(&grid, 15);
        assert!(user.message.is_none());
    }

    #[test]
    fn test_message_ids_are_unique() {
        let mut user = loaded_user(0, 0);
        user.say("one".to_string(), 1, 100);
        let first = user.message.as_ref().unwrap().id.clone();
        user.say("two".to_string(), 1, 100);
        let second = user.message.as_ref().unwrap().id.clone();
        assert_ne!(first, second);
    }

    #[test]
    fn test_reset_restores_health_and_clears_intent() {
        let mut user = loaded_user(96, 96);
        user.health = -5;
        user.set_path(vec![(128, 96)]);
        user.following = Some("bob".to_string());
        user.attack = Some(Attack {
            target: "bob".to_string(),
            cooldown: None,
        });

        user.reset((32, 64));

        assert_eq!(user.health, user.max_health);
        assert_eq!((user.x, user.y), (32, 64));
        assert!(user.path.is_empty());
        assert!(user.following.is_none());
        assert!(user.attack.is_none());
    }

    #[test]
    fn test_pickup_accumulates() {
        let mut user = loaded_user(0, 0);
        user.pickup(7, 2);
        user.pickup(7, 3);
        user.pickup(9, 1);

        assert_eq!(user.inventory[&7], 5);
        assert_eq!(user.inventory[&9], 1);
    }

    #[test]
    fn test_snapshot_rounds_frame_up_and_suppresses_following() {
        let mut user = loaded_user(32, 32);
        user.frame = 1.5;
        user.following = Some("bob".to_string());

        let idle = user.snapshot();
        assert_eq!(idle.frame, 2);
        assert_eq!(idle.following.as_deref(), Some("bob"));

        user.walking = true;
        let walking = user.snapshot();
        assert!(walking.following.is_none());
    }
}
