use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hopwire_node::config::NodeConfig;
use hopwire_node::runtime::NodeRuntime;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;
use tracing::info;

fn env_u16(key: &str, default: u16) -> u16 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_path(key: &str, default: &str) -> PathBuf {
    env::var(key).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(default))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

/// Entry point for a single mesh node process, spawned by the external
/// process launcher with its identity and neighbor list supplied through
/// the environment and a neighbor file.
fn main() {
    init_tracing();

    let node_id = env_u16("HOPWIRE_NODE_ID", 0) as u8;
    let neighbor_file = env_path("HOPWIRE_NEIGHBOR_FILE", "./AccessTable.txt");
    let config_file = env::var("HOPWIRE_CONFIG_FILE").ok();

    let mut config = match config_file {
        Some(path) => NodeConfig::load_toml(&path).unwrap_or_else(|err| {
            tracing::warn!(%err, path, "failed to load config file, using defaults");
            NodeConfig::default()
        }),
        None => NodeConfig::default(),
    };
    config.apply_env_overrides();

    info!(node_id, data_dir = %config.data_dir, "starting node");

    let runtime = Arc::new(NodeRuntime::bootstrap(node_id, &neighbor_file, config));

    let shutdown_requested = Arc::new(AtomicBool::new(false));
    for sig in [SIGINT, SIGTERM] {
        flag::register(sig, Arc::clone(&shutdown_requested))
            .expect("failed to register signal handler");
    }

    let watcher_runtime = runtime.clone();
    let watcher_flag = shutdown_requested.clone();
    let watcher = std::thread::spawn(move || {
        while !watcher_flag.load(Ordering::SeqCst) {
            std::thread::sleep(std::time::Duration::from_millis(200));
        }
        info!("shutdown signal received");
        watcher_runtime.shutdown();
    });

    runtime.run();
    let _ = watcher.join();

    runtime.flush_to_disk();
    info!("node stopped cleanly");
}
