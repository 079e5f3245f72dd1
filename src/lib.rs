pub mod db;
pub mod persistence;
pub mod settings;
pub mod timer;
mod utils;

use std::{future::Future, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use db::Database;
use persistence::TimerPersistence;
use settings::{resolve_data_dir, SettingsStore, DATABASE_FILE_NAME, SETTINGS_FILE_NAME};
use timer::{commands::run_console, SystemClock, TimerStore};
use tokio::{
    io::{AsyncBufRead, AsyncWrite, BufReader},
    runtime::Runtime,
};

pub use utils::logging::init_logging;

/// How long leftover blocking work (a pending stdin read) may hold up exit.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

/// Starts the engine on the platform data directory and serves the text
/// console on stdin/stdout until EOF, `quit` or Ctrl-C.
pub fn run() -> Result<()> {
    init_logging();
    log::info!("Friendly Timer starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;

    let outcome = runtime.block_on(serve());
    close_runtime(runtime);
    outcome
}

/// The stdin reader sits in a blocking read that cannot be cancelled, so the
/// runtime is torn down with a deadline instead of waiting for the next line.
fn close_runtime(runtime: Runtime) {
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    log::debug!("Runtime stopped");
}

async fn serve() -> Result<()> {
    let data_dir = resolve_data_dir()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let settings = SettingsStore::new(data_dir.join(SETTINGS_FILE_NAME))?;
    let engine = settings.engine();

    let database = Database::new(data_dir.join(DATABASE_FILE_NAME))?;
    let persistence = TimerPersistence::new(database, engine.storage_key.clone());
    let store = TimerStore::init(persistence, Arc::new(SystemClock), engine.tick_interval()).await;

    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::warn!("Could not listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };
    serve_console(
        &store,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        interrupt,
    )
    .await
}

/// Runs the console until it ends or `interrupt` fires, then shuts the store
/// down. The console future is dropped as soon as the interrupt wins.
async fn serve_console<R, W>(
    store: &TimerStore,
    reader: R,
    writer: W,
    interrupt: impl Future<Output = ()>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let outcome = tokio::select! {
        result = run_console(store, reader, writer) => result,
        _ = interrupt => {
            log::info!("Interrupted, shutting down");
            Ok(())
        }
    };

    if !store.shutdown().await {
        log::warn!("Final save failed; the last changes may be lost");
    }

    outcome
}
