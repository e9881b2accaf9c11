use clap::Parser;
use log::{error, info};
use server::game::{self, NullStore, World, WorldCommand, WorldConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Parses command-line arguments, loads the tile map, then runs the tick
/// loop until interrupted.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Path to the JSON tile map
        #[clap(short, long, default_value = "map.json")]
        map: PathBuf,
        /// Tick rate (updates per second)
        #[clap(short, long, default_value = "30")]
        tick_rate: u32,
    }

    let args = Args::parse();

    // An unreadable or corrupt map is the one fatal startup condition
    let map = match game::load_tile_map(&args.map) {
        Ok(map) => map,
        Err(e) => {
            error!("failed to load tile map {}: {}", args.map.display(), e);
            return Err(e);
        }
    };
    info!(
        "loaded tile map {} ({} rows), ticking at {} Hz",
        args.map.display(),
        map.len(),
        args.tick_rate
    );

    let config = WorldConfig {
        tick_rate: args.tick_rate,
        ..WorldConfig::default()
    };
    let world = Arc::new(RwLock::new(World::new(map, config, Arc::new(NullStore))));

    // Transports hand their intents to the tick loop over this channel. The
    // sender is the integration surface for whatever frontend drives the
    // world; the binary itself only wires the loop.
    let (cmd_sender, cmd_receiver) = mpsc::unbounded_channel::<WorldCommand>();
    let _cmd_sender = cmd_sender;

    let tick_handle = {
        let world = Arc::clone(&world);
        tokio::spawn(async move {
            run_tick_loop(world, cmd_receiver, args.tick_rate).await;
        })
    };

    tokio::select! {
        result = tick_handle => {
            if let Err(e) = result {
                error!("tick loop task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

/// Drives the world at a fixed rate. Ticks that would overlap are skipped
/// rather than queued, so sustained load degrades the rate instead of
/// accumulating lag.
async fn run_tick_loop(
    world: Arc<RwLock<World>>,
    mut cmd_receiver: mpsc::UnboundedReceiver<WorldCommand>,
    tick_rate: u32,
) {
    let mut interval_timer = interval(Duration::from_secs_f32(1.0 / tick_rate as f32));
    interval_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // The first tick fires immediately
    interval_timer.tick().await;

    loop {
        interval_timer.tick().await;

        // Drain pending intents before stepping so commands never
        // interleave with a half-finished step
        let mut commands = Vec::new();
        while let Ok(cmd) = cmd_receiver.try_recv() {
            commands.push(cmd);
        }

        let mut state = world.write().await;
        for cmd in commands {
            game::apply_command(&mut state, &world, cmd);
        }
        state.step(&world);
    }
}
