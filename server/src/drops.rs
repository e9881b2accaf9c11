//! Ephemeral world items awaiting pickup.
//!
//! The table itself is synchronous; the deliberate creation delay lives on
//! `World::add_drop`, which inserts here once its timer fires.

use log::debug;
use shared::{DroppedItem, TILE_SIZE};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Keyed collection of active item drops.
#[derive(Debug, Default)]
pub struct DropTable {
    items: HashMap<String, DroppedItem>,
    next_seq: u64,
}

impl DropTable {
    pub fn new() -> Self {
        DropTable::default()
    }

    /// Key derived from item type, quantity and drop time. A table-owned
    /// sequence number is appended so identical drops within the same
    /// second still get distinct keys.
    fn next_key(&mut self, item: u32, quantity: u32) -> String {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.next_seq += 1;
        format!("drop_{}_{}_{}_{}", item, quantity, seconds, self.next_seq)
    }

    /// Creates a drop with a fixed 32×32 bounding box and returns its key.
    pub fn insert(&mut self, item: u32, name: &str, quantity: u32, x: i32, y: i32) -> String {
        let key = self.next_key(item, quantity);
        debug!("drop {} spawned at ({}, {})", key, x, y);
        self.items.insert(
            key.clone(),
            DroppedItem {
                key: key.clone(),
                item,
                name: name.to_string(),
                quantity,
                x,
                y,
                width: TILE_SIZE,
                height: TILE_SIZE,
            },
        );
        key
    }

    /// Removes and returns the drop, or `None` if the key is absent. Pickup
    /// side effects run on the returned item, so a grant happens at most
    /// once per drop.
    pub fn remove(&mut self, key: &str) -> Option<DroppedItem> {
        self.items.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&DroppedItem> {
        self.items.get(key)
    }

    /// Keys of all drops overlapping the given box, sorted for a stable
    /// first-detected-wins order.
    pub fn overlapping(&self, x: i32, y: i32, width: i32, height: i32) -> Vec<String> {
        let mut keys: Vec<String> = self
            .items
            .values()
            .filter(|drop| drop.overlaps(x, y, width, height))
            .map(|drop| drop.key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Active drops in key order, as broadcast in the snapshot.
    pub fn items(&self) -> Vec<DroppedItem> {
        let mut items: Vec<DroppedItem> = self.items.values().cloned().collect();
        items.sort_by(|a, b| a.key.cmp(&b.key));
        items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
