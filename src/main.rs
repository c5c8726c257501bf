//! Binary entrypoint for the worldtree CLI.
//!
//! Commands:
//! - `init` - write a starter `config.toml`
//! - `demo` - fill a kitchen with refrigerators, sticks and nested cubes
//! - `stress [--threads N] [--moves M] [--seed S]` - randomized concurrent
//!   movers followed by an audit; exits non-zero on any violation
//!
//! See the library crate docs for module-level details: `worldtree::`.
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use worldtree::config::Config;
use worldtree::logutil::{escape_log, init_logging};
use worldtree::world::content::{cube_fill, DebugCube, PointyStick, Refrigerator, Room};
use worldtree::world::{Actor, Node, Relation, TextReport, World};

#[derive(Parser)]
#[command(name = "worldtree")]
#[command(about = "Concurrent containment hierarchy engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Run the kitchen scenario and log room statistics after each phase
    Demo,
    /// Run randomized concurrent movers and audit the result
    Stress {
        /// Concurrent movers (overrides config)
        #[arg(short, long)]
        threads: Option<usize>,
        /// Moves per mover (overrides config)
        #[arg(short, long)]
        moves: Option<usize>,
        /// RNG seed (overrides config)
        #[arg(short, long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            init_logging(None, cli.verbose);
            info!("Initializing new worldtree configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Demo => {
            let config = Config::load_or_default(&cli.config).await?;
            init_logging(Some(&config.logging), cli.verbose);
            let world = World::new(&config.world)?;
            run_demo(&world)?;
            world.wait_idle();
            let audit = world.audit();
            println!("{}", serde_json::to_string_pretty(&audit)?);
            if !audit.is_clean() {
                std::process::exit(1);
            }
        }
        Commands::Stress {
            threads,
            moves,
            seed,
        } => {
            let mut config = Config::load_or_default(&cli.config).await?;
            init_logging(Some(&config.logging), cli.verbose);
            if let Some(threads) = threads {
                config.stress.threads = threads;
            }
            if let Some(moves) = moves {
                config.stress.moves_per_thread = moves;
            }
            if let Some(seed) = seed {
                config.stress.seed = seed;
            }
            let world = World::new(&config.world)?;
            let summary = worldtree::stress::run(&world, &config.stress).await?;
            let payload = serde_json::json!({
                "status": if summary.passed() { "ok" } else { "failed" },
                "summary": summary,
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
            if !summary.passed() {
                // movers that overran the deadline are still blocked inside
                // the engine; do not wait for them
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn log_room(phase: &str, room: &Arc<Node>) {
    info!(
        "{}: {} holds {} items ({} deep), {:.3} m3, {:.1} kg, longest {:.2} m, widest {:.2} m",
        phase,
        room,
        room.content_count(),
        room.content_count_deep(),
        room.content_size(),
        room.content_weight(),
        room.longest_content(),
        room.widest_content()
    );
}

fn run_demo(world: &World) -> Result<()> {
    let kitchen = world.spawn("wablroom", Room::new(1000.0, 14.0, 8.0));

    for _ in 0..4 {
        world.create("refrigerator", Refrigerator, &kitchen, Relation::IN)?;
    }
    log_room("refrigerators", &kitchen);

    let mut sticks = 0usize;
    loop {
        let stick = world.spawn("pointy stick", PointyStick);
        let mut report = TextReport::new();
        if !world.commit(&stick, &kitchen, Relation::IN, &mut report)? {
            info!("stick {} refused: {}", sticks + 1, escape_log(report.text()));
            break;
        }
        sticks += 1;
    }
    log_room("sticks", &kitchen);

    let fifth = world.spawn("refrigerator", Refrigerator);
    let mut report = TextReport::new();
    if world.commit(&fifth, &kitchen, Relation::IN, &mut report)? {
        warn!("a fifth refrigerator fit into a full room");
    } else {
        info!("fifth refrigerator refused: {}", escape_log(report.text()));
    }

    let cube_room = world.spawn("cube room", Room::new(1000.0, 14.0, 8.0));
    let cubes = cube_fill(world, &cube_room, 5.0, 4);
    info!("placed {} cubes", cubes.len());
    log_room("cubes", &cube_room);
    if let Some(top) = cubes.last() {
        info!("{}", top.describe(worldtree::world::Detail::Detail));
        let cube = DebugCube::new(0.5);
        let side = cube.scale();
        let spare = world.spawn("spare cube", cube);
        let mut report = TextReport::new();
        let fits = world.commit(&spare, top, Relation::IN, &mut report)?;
        info!("spare cube ({} m) into {}: {} {}", side, top, fits, escape_log(report.text()));
    }

    for item in kitchen.contents() {
        world.destroy(&item, &Actor::System)?;
    }
    log_room("cleared", &kitchen);
    if kitchen.content_count() != 0 || kitchen.content_size() != 0.0 {
        return Err(anyhow!("kitchen not empty after clearing: {:?}", kitchen.content_stats()));
    }
    Ok(())
}
