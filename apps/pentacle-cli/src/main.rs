mod demo;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::IVec3;
use pentacle_common::Point3;
use pentacle_kernel::TickClock;
use pentacle_persist::SaveStore;
use pentacle_world::{IntrinsicTable, MAIN_ACTOR_ID, ShapeFlags, World, WorldConfig};
use tracing_subscriber::EnvFilter;

use demo::Session;

#[derive(Parser)]
#[command(name = "pentacle-cli", about = "CLI tool for the pentacle world kernel")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// World configuration (YAML); defaults to Ultima VIII rules
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version, configuration and the demo world
    Info,
    /// Walk the avatar through the demo map
    Simulate {
        /// Number of frames to run
        #[arg(short, long, default_value = "60")]
        ticks: u32,
        /// Run as many frames as this much game time takes instead
        #[arg(short, long)]
        seconds: Option<f64>,
    },
    /// Sweep the avatar's box between two points and list what it touches
    Sweep {
        #[arg(long, value_parser = parse_point, default_value = "800,1200,0")]
        from: Point3,
        #[arg(long, value_parser = parse_point, default_value = "2000,1200,0")]
        to: Point3,
    },
    /// Run the demo for a while, then save it to a slot
    Save {
        #[arg(short, long)]
        dir: PathBuf,
        #[arg(long, default_value = "1")]
        slot: u32,
        #[arg(short, long, default_value = "30")]
        ticks: u32,
        #[arg(long, default_value = "demo")]
        description: String,
    },
    /// Load a slot and keep simulating
    Load {
        #[arg(short, long)]
        dir: PathBuf,
        #[arg(long, default_value = "1")]
        slot: u32,
        #[arg(short, long, default_value = "0")]
        ticks: u32,
    },
    /// List the slots in a save directory
    Slots {
        #[arg(short, long)]
        dir: PathBuf,
    },
}

fn parse_point(s: &str) -> Result<Point3, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [x, y, z] = parts.as_slice() else {
        return Err(format!("expected x,y,z, got {s:?}"));
    };
    let coord = |v: &str| v.parse::<i32>().map_err(|e| format!("{v:?}: {e}"));
    Ok(IVec3::new(coord(x)?, coord(y)?, coord(z)?))
}

fn run(world: &mut World, session: &mut Session, frames: u32) -> anyhow::Result<()> {
    for _ in 0..frames {
        demo::step(world, session)?;
        for event in world.drain_events() {
            tracing::debug!(frame = session.frames, ?event, "usecode event");
        }
    }
    Ok(())
}

/// Frames due after `seconds` of game time, fed to the clock in 10ms slices.
fn frames_for(config: &WorldConfig, seconds: f64) -> u32 {
    let mut clock = TickClock::new(config.ticks_per_second).with_max_catch_up(u32::MAX);
    let slices = (seconds.max(0.0) * 100.0).round() as u64;
    (0..slices)
        .map(|_| clock.advance(Duration::from_millis(10)))
        .sum()
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = match &cli.config {
        Some(path) => WorldConfig::load(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => WorldConfig::default(),
    };

    match cli.command {
        Commands::Info => {
            println!("pentacle-cli v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "config: {:?}, chunk {} x {}, viewport {}x{}, {} fps",
                config.game,
                config.chunk_size(),
                config.map_chunks,
                config.viewport_width,
                config.viewport_height,
                config.ticks_per_second
            );
            for (name, table) in [
                ("remorse", IntrinsicTable::remorse()),
                ("regret", IntrinsicTable::regret()),
            ] {
                println!(
                    "intrinsics ({name}): {} entries, {} native",
                    table.len(),
                    table.native_count()
                );
            }
            let world = demo::build(config)?;
            println!("{}", world.summary());
        }
        Commands::Simulate { ticks, seconds } => {
            let frames = seconds.map_or(ticks, |s| frames_for(&config, s));
            println!("Simulating {frames} frames");
            let mut world = demo::build(config)?;
            let mut session = Session {
                frames: 0,
                walking: true,
            };
            run(&mut world, &mut session, frames)?;
            if let Some(avatar) = world.objects().get(MAIN_ACTOR_ID) {
                println!("avatar at {} on map {}", avatar.pos, avatar.map_num);
            }
            println!("{}", world.summary());
        }
        Commands::Sweep { from, to } => {
            let world = demo::build(config)?;
            let dims = world.shapes().get(demo::AVATAR).dims;
            let hits = world.current_map().sweep_test(
                world.objects(),
                world.shapes(),
                from,
                to,
                dims,
                ShapeFlags::SOLID,
                MAIN_ACTOR_ID,
                false,
            );
            println!("Sweep {from} -> {to}: {} items", hits.len());
            for hit in &hits {
                let shape = world.objects().get(hit.item).map_or(0, |i| i.shape);
                println!(
                    "  item {} (shape {shape}): t={}..{} blocking={} touching={} dirs={:03b}",
                    hit.item, hit.hit_time, hit.end_time, hit.blocking, hit.touching, hit.dirs
                );
            }
            match hits.iter().find(|h| h.blocking) {
                Some(first) => println!("stops at {}", first.interpolated(from, to)),
                None => println!("path is clear"),
            }
        }
        Commands::Save {
            dir,
            slot,
            ticks,
            description,
        } => {
            let mut world = demo::build(config)?;
            let mut session = Session {
                frames: 0,
                walking: true,
            };
            run(&mut world, &mut session, ticks)?;
            let mut store = SaveStore::open(&dir)?;
            let info = store.save(slot, &world, &description, &session)?;
            println!(
                "Saved slot {slot}: id={}, tick={}, map={}, objects={}",
                info.id, info.tick, info.map_num, info.objects
            );
        }
        Commands::Load { dir, slot, ticks } => {
            // a failed load leaves the fresh session in place
            let mut world = demo::build(config.clone())?;
            let mut session = Session::default();
            let store = SaveStore::open(&dir)?;
            match store.load(slot, config, demo::shapes()) {
                Ok(loaded) => {
                    session = loaded.app_state().unwrap_or_else(|err| {
                        tracing::warn!(%err, "ignoring unreadable session state");
                        Session::default()
                    });
                    println!(
                        "Loaded slot {slot}: \"{}\" saved at tick {}",
                        loaded.info.description, loaded.info.tick
                    );
                    world = loaded.world;
                }
                Err(err) => {
                    tracing::error!(slot, %err, "load failed, keeping current session");
                }
            }
            run(&mut world, &mut session, ticks)?;
            println!("{}", world.summary());
        }
        Commands::Slots { dir } => {
            let store = SaveStore::open(&dir)?;
            if store.slots().is_empty() {
                println!("no saves in {}", store.root().display());
            }
            for entry in store.slots() {
                println!(
                    "{:>3}  {:<20} tick {:>6}  map {:>3}  {}",
                    entry.slot, entry.description, entry.tick, entry.map_num, entry.id
                );
            }
            if let Err(err) = store.verify_integrity() {
                tracing::warn!(%err, "store failed integrity check");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_parse() {
        assert_eq!(parse_point("1, -2,3").unwrap(), IVec3::new(1, -2, 3));
        assert!(parse_point("1,2").is_err());
        assert!(parse_point("a,b,c").is_err());
    }

    #[test]
    fn seconds_become_frames() {
        let config = WorldConfig::default();
        assert_eq!(frames_for(&config, 1.0), 30);
        assert_eq!(frames_for(&config, 0.0), 0);
    }

    #[test]
    fn demo_sweep_is_stopped_by_the_wall() {
        let world = demo::build(WorldConfig::default()).unwrap();
        let from = IVec3::new(800, 1200, 0);
        let to = IVec3::new(2000, 1200, 0);
        let hits = world.current_map().sweep_test(
            world.objects(),
            world.shapes(),
            from,
            to,
            IVec3::new(64, 64, 80),
            ShapeFlags::SOLID,
            MAIN_ACTOR_ID,
            false,
        );
        let wall = hits.iter().find(|h| h.blocking).unwrap();
        assert_eq!(world.objects().get(wall.item).unwrap().shape, demo::WALL);
        assert_eq!(wall.interpolated(from, to).x, 1368);
    }

    #[test]
    fn saved_session_survives_the_store() {
        let tmp = tempfile::tempdir().unwrap();
        let mut world = demo::build(WorldConfig::default()).unwrap();
        let mut session = Session {
            frames: 0,
            walking: true,
        };
        run(&mut world, &mut session, 5).unwrap();
        let mut store = SaveStore::open(tmp.path()).unwrap();
        store.save(3, &world, "five", &session).unwrap();

        let loaded = store.load(3, WorldConfig::default(), demo::shapes()).unwrap();
        assert_eq!(loaded.app_state::<Session>().unwrap(), session);
        assert_eq!(
            loaded.world.objects().get(MAIN_ACTOR_ID).unwrap().pos,
            demo::START + IVec3::new(5 * demo::STEP, 0, 0)
        );
    }
}
