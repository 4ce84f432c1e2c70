mod action_socket;
pub mod actions;
pub mod agent;
pub mod capture_flow;
pub mod config;
pub mod feedback;
pub mod hotkeys;
pub mod launch;
pub mod migration;
pub mod paths;
pub mod permissions;
pub mod settings_editor;
pub mod settings_sync;
pub mod system;

pub use action_socket::send_action_to_running_instance;

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use crate::migration::{MigrationOutcome, SettingsMigrator};

/// `RUST_LOG` wins; otherwise `debug` when debug mode is on, else `info`.
fn init_tracing(debug_mode: bool) {
    let default_level = if debug_mode { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

pub fn run() {
    // Settings decide the log level, so migration runs before the subscriber exists and its
    // outcome is logged afterwards.
    let prepared = SettingsMigrator::from_config_dir().and_then(|m| m.prepare_store());
    let debug_mode = prepared
        .as_ref()
        .map(|(store, _)| store.load().debug_mode)
        .unwrap_or(false);
    init_tracing(debug_mode);

    let store = match prepared {
        Ok((store, outcome)) => {
            match outcome {
                MigrationOutcome::AlreadyCurrent => debug!("Settings already current"),
                MigrationOutcome::MigratedFrom(legacy) => {
                    info!(from = %legacy.display(), "Migrated legacy settings")
                }
                MigrationOutcome::CreatedDefaults => info!("Created default settings"),
            }
            store
        }
        Err(e) => {
            error!(error = %e, "Failed to prepare settings");
            std::process::exit(1);
        }
    };
    info!(path = %store.path().display(), "Text Shot agent starting");

    // Global shortcut registration must stay on the main thread.
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start async runtime");
            std::process::exit(1);
        }
    };
    runtime.block_on(agent::run_agent(store));
}
