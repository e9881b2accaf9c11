use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Edge length of one world tile in pixels. Player sprites and item drops
/// share the same footprint.
pub const TILE_SIZE: i32 = 32;
/// Fixed simulation rate in steps per second.
pub const TICK_RATE: u32 = 30;
/// Damage applied by one completed melee swing.
pub const ATTACK_DAMAGE: i32 = 10;
/// Delay between entering melee range and the damage landing, in milliseconds.
pub const ATTACK_COOLDOWN_MS: u64 = 1000;
/// Delay between a drop request and the item appearing in the world,
/// in milliseconds.
pub const DROP_DELAY_MS: u64 = 250;
/// Health granted to a freshly created or respawned user.
pub const DEFAULT_MAX_HEALTH: i32 = 100;
/// Ticks a chat message stays attached to its speaker before expiring.
pub const MESSAGE_TTL_TICKS: u64 = 150;
/// Walk-cycle frames per avatar sheet; `frame` wraps below this value.
pub const FRAME_COUNT: f32 = 4.0;
/// Fractional frame advance per tick while a user is moving.
pub const FRAME_STEP: f32 = 0.5;

/// Cardinal facing/movement direction of a user.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

impl Direction {
    /// Unit tile offset for this direction. Positive y is downward,
    /// matching screen coordinates.
    pub fn delta(&self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

/// A chat line pinned to a player, identified so clients can deduplicate it
/// across consecutive snapshots.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
}

/// Public per-player fields included in every snapshot.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlayerSnapshot {
    pub loaded: bool,
    pub id: String,
    pub health: i32,
    pub max_health: i32,
    pub avatar: String,
    pub facing: Direction,
    /// Animation frame, rounded up from the server's fractional counter.
    pub frame: u32,
    pub x: i32,
    pub y: i32,
    /// Auto-follow target, absent while the user walks under direct control.
    pub following: Option<String>,
    pub message: Option<ChatMessage>,
}

/// An item lying in the world, awaiting pickup.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DroppedItem {
    pub key: String,
    pub item: u32,
    pub name: String,
    pub quantity: u32,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl DroppedItem {
    /// Axis-aligned overlap test against another box, used for pickup
    /// collision. Exact edge contact does not count as overlap.
    pub fn overlaps(&self, x: i32, y: i32, width: i32, height: i32) -> bool {
        check_overlap(
            self.x,
            self.y,
            self.width,
            self.height,
            x,
            y,
            width,
            height,
        )
    }
}

/// AABB intersection of two pixel-space boxes.
#[allow(clippy::too_many_arguments)]
pub fn check_overlap(
    x1: i32,
    y1: i32,
    w1: i32,
    h1: i32,
    x2: i32,
    y2: i32,
    w2: i32,
    h2: i32,
) -> bool {
    x1 < x2 + w2 && x1 + w1 > x2 && y1 < y2 + h2 && y1 + h1 > y2
}

/// The world state broadcast to every session once per tick.
///
/// The payload is identical for all recipients except for `logged`, which
/// names the recipient's own user for client-side disambiguation.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub players: HashMap<String, PlayerSnapshot>,
    pub items: Vec<DroppedItem>,
    pub world_map: Vec<Vec<u8>>,
    /// Traversability grid derived from the map: 0 walkable, 1 blocked.
    pub world_matrix: Vec<Vec<u8>>,
    pub logged: Option<String>,
}

/// Messages crossing the session boundary in either direction.
///
/// The first group are client intents; the last two are server-to-client.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Login { username: String, avatar: String },
    Logout,
    KeyPress { direction: Direction, pressed: bool },
    MoveTo { x: i32, y: i32 },
    Attack { target: Option<String> },
    Follow { target: Option<String> },
    Chat { text: String },

    Tick(Box<WorldSnapshot>),
    LoggedOut { reason: String },
}

impl Packet {
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Packet, bincode::Error> {
        bincode::deserialize(bytes)
    }
}
