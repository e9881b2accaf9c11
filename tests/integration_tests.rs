//! Integration tests for the tile-world simulation
//!
//! These tests drive complete multi-component scenarios through the public
//! world API: combat between two users across cooldown timers, deferred
//! drop creation and pickup, session replacement, and snapshot delivery.

use server::game::{apply_command, NullStore, World, WorldCommand, WorldConfig};
use server::session::Session;
use server::user::User;
use shared::{Direction, Packet, ATTACK_DAMAGE, DEFAULT_MAX_HEALTH, TILE_SIZE};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::RwLock;

/// COMBAT SCENARIOS
mod combat_tests {
    use super::*;

    /// Two adjacent users; the attacker lands exactly one swing per
    /// cooldown window.
    #[tokio::test]
    async fn melee_swing_lands_after_cooldown() {
        let world = fast_world();
        {
            let mut w = world.write().await;
            let _rx1 = join(&mut w, 1, "alice", 2 * TILE_SIZE, 2 * TILE_SIZE);
            let _rx2 = join(&mut w, 2, "bob", 2 * TILE_SIZE, TILE_SIZE);
            apply_command(
                &mut w,
                &world,
                WorldCommand::Attack {
                    session_id: 2,
                    target: Some("alice".to_string()),
                },
            );
            w.step(&world);
            assert_eq!(
                w.user(1).unwrap().health,
                DEFAULT_MAX_HEALTH,
                "damage is deferred until the cooldown fires"
            );
        }

        tokio::time::sleep(Duration::from_millis(80)).await;

        let w = world.read().await;
        assert_eq!(w.user(1).unwrap().health, DEFAULT_MAX_HEALTH - ATTACK_DAMAGE);
    }

    /// Repeated ticks while a cooldown is pending never stack swings.
    #[tokio::test]
    async fn cooldown_prevents_stacked_swings() {
        let world = fast_world();
        {
            let mut w = world.write().await;
            let _rx1 = join(&mut w, 1, "alice", 2 * TILE_SIZE, 2 * TILE_SIZE);
            let _rx2 = join(&mut w, 2, "bob", 3 * TILE_SIZE, 2 * TILE_SIZE);
            apply_command(
                &mut w,
                &world,
                WorldCommand::Attack {
                    session_id: 2,
                    target: Some("alice".to_string()),
                },
            );
            for _ in 0..5 {
                w.step(&world);
            }
        }

        tokio::time::sleep(Duration::from_millis(80)).await;

        let w = world.read().await;
        assert_eq!(w.user(1).unwrap().health, DEFAULT_MAX_HEALTH - ATTACK_DAMAGE);
    }

    /// A killing blow resets the attacker's intent; the victim respawns at
    /// full health and takes no further damage.
    #[tokio::test]
    async fn killing_blow_ends_the_fight() {
        let world = fast_world();
        {
            let mut w = world.write().await;
            let _rx1 = join(&mut w, 1, "alice", 2 * TILE_SIZE, 2 * TILE_SIZE);
            let _rx2 = join(&mut w, 2, "bob", TILE_SIZE, 2 * TILE_SIZE);
            w.user_mut(1).unwrap().health = ATTACK_DAMAGE;
            apply_command(
                &mut w,
                &world,
                WorldCommand::Attack {
                    session_id: 2,
                    target: Some("alice".to_string()),
                },
            );
            w.step(&world);
        }

        tokio::time::sleep(Duration::from_millis(80)).await;

        {
            let mut w = world.write().await;
            assert_eq!(w.user(1).unwrap().health, 0);
            assert!(
                w.user(2).unwrap().attack.is_none(),
                "attacker intent cleared on kill"
            );
            // Death transition runs on the victim's next tick
            w.step(&world);
            assert_eq!(w.user(1).unwrap().health, DEFAULT_MAX_HEALTH);
        }

        // No timer survives the kill
        tokio::time::sleep(Duration::from_millis(80)).await;
        let w = world.read().await;
        assert_eq!(w.user(1).unwrap().health, DEFAULT_MAX_HEALTH);
    }

    /// A victim who disconnects mid-cooldown absorbs nothing; the timer
    /// fires into a no-op.
    #[tokio::test]
    async fn disconnect_voids_pending_swing() {
        let world = fast_world();
        {
            let mut w = world.write().await;
            let _rx1 = join(&mut w, 1, "alice", 2 * TILE_SIZE, 2 * TILE_SIZE);
            let _rx2 = join(&mut w, 2, "bob", 2 * TILE_SIZE, 3 * TILE_SIZE);
            apply_command(
                &mut w,
                &world,
                WorldCommand::Attack {
                    session_id: 2,
                    target: Some("alice".to_string()),
                },
            );
            w.step(&world);
            w.disconnect(1);
        }

        tokio::time::sleep(Duration::from_millis(80)).await;

        let w = world.read().await;
        assert!(w.user(1).is_none());
        assert!(w.user(2).unwrap().attack.is_some(), "intent persists");
    }
}

/// ITEM DROP SCENARIOS
mod drop_tests {
    use super::*;

    /// Drop creation is deferred; once the item exists, a user standing on
    /// it picks it up on the next tick, exactly once.
    #[tokio::test]
    async fn deferred_drop_then_single_pickup() {
        let world = fast_world();
        {
            let mut w = world.write().await;
            let _rx = join(&mut w, 1, "alice", 2 * TILE_SIZE, 2 * TILE_SIZE);
            apply_command(
                &mut w,
                &world,
                WorldCommand::DropItem {
                    item: 7,
                    name: "Gem".to_string(),
                    quantity: 2,
                    x: 2 * TILE_SIZE,
                    y: 2 * TILE_SIZE,
                },
            );
            assert!(w.drops.is_empty(), "drop does not exist yet");
        }

        tokio::time::sleep(Duration::from_millis(60)).await;

        let mut w = world.write().await;
        assert_eq!(w.drops.len(), 1);

        w.step(&world);

        assert!(w.drops.is_empty());
        assert_eq!(w.user(1).unwrap().inventory[&7], 2);

        // The same tile yields nothing further
        w.step(&world);
        assert_eq!(w.user(1).unwrap().inventory[&7], 2);
    }

    /// Removing a key twice grants at most one item; the second removal is
    /// an explicit no-op.
    #[tokio::test]
    async fn double_remove_is_harmless() {
        let world = fast_world();
        let mut w = world.write().await;
        let key = w.drops.insert(3, "Coin", 5, 0, 0);

        assert!(w.drops.remove(&key).is_some());
        assert!(w.drops.remove(&key).is_none());
        assert!(w.drops.is_empty());
    }

    /// Identical drops requested in the same second stay distinct.
    #[tokio::test]
    async fn identical_drops_get_distinct_keys() {
        let world = fast_world();
        {
            let w = world.read().await;
            for _ in 0..3 {
                w.add_drop(&world, 5, "Sword".to_string(), 1, 0, 0);
            }
        }

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(world.read().await.drops.len(), 3);
    }
}

/// SESSION LIFECYCLE SCENARIOS
mod session_tests {
    use super::*;

    /// Binding a new user to an existing session id replaces the previous
    /// binding; the old username no longer resolves.
    #[tokio::test]
    async fn rebinding_replaces_previous_user() {
        let world = fast_world();
        let mut w = world.write().await;
        let _rx1 = join(&mut w, 1, "alice", 0, 0);
        let _rx2 = join(&mut w, 1, "carol", 0, 0);

        assert_eq!(w.session_count(), 1);
        assert!(w.session_by_username("alice").is_none());
        assert_eq!(w.session_by_username("carol"), Some(1));
    }

    /// A second login under an in-world name is refused; the first user
    /// keeps playing undisturbed.
    #[tokio::test]
    async fn duplicate_username_login_refused() {
        let world = fast_world();
        let mut w = world.write().await;
        let _rx1 = join(&mut w, 1, "alice", 0, 0);

        let (tx, _rx2) = mpsc::unbounded_channel();
        apply_command(
            &mut w,
            &world,
            WorldCommand::Connect {
                session_id: 2,
                outbound: tx,
            },
        );
        apply_command(
            &mut w,
            &world,
            WorldCommand::Login {
                session_id: 2,
                username: "alice".to_string(),
                avatar: "M".to_string(),
            },
        );

        assert!(w.user(2).is_none());
        assert_eq!(w.session_by_username("alice"), Some(1));
    }

    /// Logout with a reason notifies the session; the user is gone but the
    /// connection remains and can log in again.
    #[tokio::test]
    async fn logout_then_relogin_on_same_session() {
        let world = fast_world();
        let mut w = world.write().await;
        let mut rx = join(&mut w, 1, "alice", 0, 0);

        assert!(w.logout(1, Some("Logged in elsewhere")));
        assert!(w.user(1).is_none());
        match rx.try_recv() {
            Ok(Packet::LoggedOut { reason }) => assert_eq!(reason, "Logged in elsewhere"),
            other => panic!("expected logout notification, got {:?}", other),
        }

        apply_command(
            &mut w,
            &world,
            WorldCommand::Login {
                session_id: 1,
                username: "alice".to_string(),
                avatar: "F".to_string(),
            },
        );
        assert_eq!(w.session_by_username("alice"), Some(1));
    }
}

/// MOVEMENT AND SNAPSHOT SCENARIOS
mod world_tests {
    use super::*;

    /// A move-to intent walks the user tile by tile to the destination,
    /// which each snapshot reflects.
    #[tokio::test]
    async fn move_to_walks_the_path() {
        let world = fast_world();
        let mut w = world.write().await;
        let mut rx = join(&mut w, 1, "alice", 0, 0);

        apply_command(
            &mut w,
            &world,
            WorldCommand::MoveTo {
                session_id: 1,
                x: 3 * TILE_SIZE,
                y: 0,
            },
        );

        // The path starts with the current tile, then one tile per tick
        let mut positions = Vec::new();
        for _ in 0..4 {
            w.step(&world);
            positions.push(w.user(1).unwrap().x);
        }
        assert_eq!(positions, vec![0, TILE_SIZE, 2 * TILE_SIZE, 3 * TILE_SIZE]);

        // Snapshots tracked the walk
        let mut last_seen = None;
        while let Ok(Packet::Tick(snapshot)) = rx.try_recv() {
            last_seen = Some(snapshot.players["alice"].x);
        }
        assert_eq!(last_seen, Some(3 * TILE_SIZE));
    }

    /// Held keys move one tile per tick and override a pending path.
    #[tokio::test]
    async fn key_movement_overrides_path() {
        let world = fast_world();
        let mut w = world.write().await;
        let _rx = join(&mut w, 1, "alice", TILE_SIZE, TILE_SIZE);

        apply_command(
            &mut w,
            &world,
            WorldCommand::MoveTo {
                session_id: 1,
                x: 5 * TILE_SIZE,
                y: TILE_SIZE,
            },
        );
        apply_command(
            &mut w,
            &world,
            WorldCommand::KeyPress {
                session_id: 1,
                direction: Direction::Down,
                pressed: true,
            },
        );

        w.step(&world);

        let alice = w.user(1).unwrap();
        assert_eq!((alice.x, alice.y), (TILE_SIZE, 2 * TILE_SIZE));
        assert!(alice.path.is_empty(), "explicit path dropped");
    }

    /// Every session receives the tick snapshot annotated with its own
    /// user id.
    #[tokio::test]
    async fn snapshots_are_annotated_per_recipient() {
        let world = fast_world();
        let mut w = world.write().await;
        let mut rx_alice = join(&mut w, 1, "alice", 0, 0);
        let mut rx_bob = join(&mut w, 2, "bob", TILE_SIZE, 0);

        w.step(&world);

        for (rx, name) in [(&mut rx_alice, "alice"), (&mut rx_bob, "bob")] {
            match rx.try_recv() {
                Ok(Packet::Tick(snapshot)) => {
                    assert_eq!(snapshot.logged.as_deref(), Some(name));
                    assert_eq!(snapshot.players.len(), 2);
                    assert_eq!(snapshot.world_map, *w.tile_map());
                }
                other => panic!("expected tick for {}, got {:?}", name, other),
            }
        }
    }
}

// HELPER FUNCTIONS

/// World on an open 8×8 map with short timer delays so scenarios complete
/// in tens of milliseconds.
fn fast_world() -> Arc<RwLock<World>> {
    let map = vec![vec![1; 8]; 8];
    let config = WorldConfig {
        attack_cooldown: Duration::from_millis(40),
        drop_delay: Duration::from_millis(20),
        ..WorldConfig::default()
    };
    Arc::new(RwLock::new(World::new(map, config, Arc::new(NullStore))))
}

/// Adds a loaded user on a fresh session, returning the outbound receiver.
fn join(world: &mut World, id: u64, name: &str, x: i32, y: i32) -> UnboundedReceiver<Packet> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut user = User::new(name, "F", x, y);
    user.loaded = true;
    world.add_session(Session::new(id, tx), user);
    rx
}
