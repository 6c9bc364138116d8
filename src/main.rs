use goshawk::sim::{
    AgentParams, FixedNum, FixedVec2, RawSimConfig, SimConfig, Simulation,
};

use rand::Rng;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use std::fs;
use std::path::PathBuf;

fn setup_file_logging() -> String {
    // Create logs directory if it doesn't exist
    let log_dir = PathBuf::from("logs");
    if !log_dir.exists() {
        fs::create_dir_all(&log_dir).expect("Failed to create logs directory");
    }

    // Clean up old log files, keeping only the last 25
    cleanup_old_logs(&log_dir, 25);

    // Generate timestamped filename
    let now = chrono::Local::now();
    let log_filename = format!("goshawk_{}.log", now.format("%Y%m%d_%H%M%S"));
    let log_file_path = log_dir.join(&log_filename);
    let log_path_str = log_file_path.to_string_lossy().to_string();

    // Create file appender with timestamped filename
    let file_appender = RollingFileAppender::new(
        Rotation::NEVER, // Don't rotate during a single run
        &log_dir,
        &log_filename,
    );

    // Create a formatting layer for the file
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false); // No ANSI colors in file

    // Create a formatting layer for stdout (minimal)
    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("goshawk=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    log_path_str
}

fn cleanup_old_logs(log_dir: &PathBuf, keep_count: usize) {
    if let Ok(entries) = fs::read_dir(log_dir) {
        let mut log_files: Vec<_> = entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|s| s.starts_with("goshawk") && s.ends_with(".log"))
                    .unwrap_or(false)
            })
            .collect();

        // Sort by modified time (oldest first)
        log_files.sort_by_key(|e| e.metadata().ok().and_then(|m| m.modified().ok()));

        // Delete oldest files if we exceed keep_count
        if log_files.len() > keep_count {
            for file in log_files.iter().take(log_files.len() - keep_count) {
                let _ = fs::remove_file(file.path());
            }
        }
    }
}

/// Headless demonstration: a 128x128 world with scattered obstacle blocks,
/// a few hundred agents flocking toward one target.
fn main() {
    let log_path = setup_file_logging();
    info!("Logging to {}", log_path);

    let mut raw = RawSimConfig::default();
    raw.map_width = 128.0;
    raw.map_height = 128.0;
    let config = SimConfig::from(&raw);
    let tick_rate = config.tick_rate;
    let mut sim = Simulation::new(config);

    // Static geometry, then the explicit finalize step.
    sim.register_obstacle_region(FixedVec2::from_f32(40.0, 30.0), FixedVec2::from_f32(60.0, 50.0));
    sim.register_obstacle_region(FixedVec2::from_f32(80.0, 60.0), FixedVec2::from_f32(95.0, 100.0));
    sim.register_obstacle_region(FixedVec2::from_f32(20.0, 80.0), FixedVec2::from_f32(45.0, 90.0));
    sim.finalize_obstacles();

    if let Some(stats) = sim.graph_stats() {
        info!(
            "Graph: {} portals, {} connections across {} regions",
            stats.portal_count, stats.connection_count, stats.region_count
        );
    }

    // Scatter agents across the open south-west corner.
    let mut rng = rand::rng();
    let mut spawned = 0usize;
    while spawned < 400 {
        let pos = FixedVec2::from_f32(
            rng.random_range(2.0..30.0),
            rng.random_range(2.0..25.0),
        );
        if sim.spawn_agent(pos, AgentParams::default()).is_ok() {
            spawned += 1;
        }
    }
    info!("Spawned {} agents", spawned);

    let target = FixedVec2::from_f32(120.5, 120.5);
    sim.set_target(target).expect("demo target must be walkable");

    let dt = FixedNum::from_num(1.0) / FixedNum::from_num(tick_rate);
    let started = std::time::Instant::now();
    let max_ticks = 4000u64;
    let arrival = FixedNum::from_num(3.0);

    let mut arrived = 0usize;
    for _ in 0..max_ticks {
        sim.tick(dt);

        if sim.tick_count() % 300 == 0 {
            arrived = sim
                .agent_ids()
                .filter(|&id| {
                    sim.agent(id)
                        .map(|r| (r.pos - target).length() < arrival)
                        .unwrap_or(false)
                })
                .count();
            info!(
                "tick {}: {}/{} arrived, {} stranded",
                sim.tick_count(),
                arrived,
                sim.agent_count(),
                sim.stranded_agents().len()
            );
        }
        if arrived == sim.agent_count() {
            break;
        }
    }

    info!(
        "Done: {}/{} arrived after {} ticks in {:.2?}",
        arrived,
        sim.agent_count(),
        sim.tick_count(),
        started.elapsed()
    );
}
