use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use uuid::Uuid;

use vinyl_custodian::cli::{Cli, Command};
use vinyl_custodian::core::audio_reader::{self, DiscPatternSet};
use vinyl_custodian::core::backup::BackupStore;
use vinyl_custodian::core::orchestrator::Orchestrator;
use vinyl_custodian::core::queue::{QueueHandler, WorkQueue};
use vinyl_custodian::core::scanner::Scanner;
use vinyl_custodian::core::watcher::Watcher;
use vinyl_custodian::repository::SqliteTagBackupsRepository;
use vinyl_custodian::services::settings::SettingsStore;
use vinyl_custodian::utils::config::{get_config, Config};
use vinyl_custodian::utils::db::get_application_db;
use vinyl_custodian::web::routes::create_router;
use vinyl_custodian::web::AppState;

fn backup_root(config: &Config) -> PathBuf {
    config.database.path.parent().map(|p| p.join("backups")).unwrap_or_else(|| PathBuf::from("./backups"))
}

/// Runs the queue worker to completion on a blocking thread: every item
/// already enqueued is drained in FIFO order, then the worker stops at the
/// shutdown sentinel queued right behind it. Used by the one-shot CLI
/// commands, which don't start the long-running Watcher/façade.
async fn drain_queue(queue: WorkQueue, worker: vinyl_custodian::core::queue::WorkQueueWorker, orchestrator: Arc<Orchestrator>) -> anyhow::Result<()> {
    queue.shutdown();
    let handler: Arc<dyn QueueHandler> = orchestrator;
    tokio::task::spawn_blocking(move || worker.run(handler)).await?;
    Ok(())
}

async fn compile_patterns(pool: &sqlx::SqlitePool, settings: &SettingsStore) -> anyhow::Result<DiscPatternSet> {
    let version = settings.version();
    let resolved = settings.resolve(pool).await?;
    Ok(DiscPatternSet::compile(&resolved.disc_subfolder_patterns, version))
}

async fn run_scan(pool: &sqlx::SqlitePool, queue: &WorkQueue, settings: &SettingsStore, music_path: &Path, force: bool) -> anyhow::Result<()> {
    let patterns = compile_patterns(pool, settings).await?;
    let scanner = Scanner::new();
    let report = scanner.scan_directory(pool, music_path, force, &patterns, queue).await?;
    log::info!(
        "Scan complete: {} added, {} updated, {} removed",
        report.added.len(),
        report.updated.len(),
        report.removed.len()
    );
    Ok(())
}

async fn restore_latest_backup(pool: &sqlx::SqlitePool, root: PathBuf, album_id: Uuid) -> anyhow::Result<()> {
    let backups_repo = SqliteTagBackupsRepository::new();
    let mut backups = backups_repo.all_by_album(pool, album_id).await?;
    backups.sort_by_key(|b| b.created_at());
    let Some(latest) = backups.pop() else {
        anyhow::bail!("no backups found for album {album_id}");
    };

    let store = BackupStore::new(root);
    let restored = store.restore_backup(pool, latest.id())?;
    log::info!("Restored {restored} track(s) for album {album_id} from backup {}", latest.id());
    Ok(())
}

async fn serve(
    pool: sqlx::SqlitePool,
    queue: WorkQueue,
    worker: vinyl_custodian::core::queue::WorkQueueWorker,
    orchestrator: Arc<Orchestrator>,
    settings: Arc<SettingsStore>,
    config: &Config,
) -> anyhow::Result<()> {
    let patterns = compile_patterns(&pool, &settings).await?;
    let known = audio_reader::discover_album_folders(&config.media.music_path, &patterns);
    let resolved = settings.resolve(&pool).await?;
    let poll_interval = Duration::from_secs(resolved.watch_poll_interval_secs.max(1) as u64);

    let handler: Arc<dyn QueueHandler> = orchestrator.clone();
    std::thread::spawn(move || worker.run(handler));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let watcher = Watcher::new(config.media.music_path.clone(), poll_interval, known);
    let watcher_queue = queue.clone();
    let watcher_settings = settings.clone();
    let watcher_pool = pool.clone();
    let patterns_fn = move || {
        futures::executor::block_on(compile_patterns(&watcher_pool, &watcher_settings))
            .unwrap_or_else(|_| DiscPatternSet::compile(&[], watcher_settings.version()))
    };
    tokio::spawn(watcher.run(watcher_queue, patterns_fn, shutdown_rx));

    let state = AppState { pool, queue: queue.clone(), events: orchestrator.events_sender() };
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("Serving façade on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("Shutting down");
            let _ = shutdown_tx.send(true);
            queue.shutdown();
        })
        .await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = get_config()?;
    let db = get_application_db().await?;
    let pool = db.get_pool().clone();

    let settings = Arc::new(SettingsStore::new(config.tagging.clone()));
    let (queue, worker) = WorkQueue::new();
    let orchestrator = Arc::new(Orchestrator::new(pool.clone(), queue.clone(), settings.clone(), backup_root(config)));

    match cli.command {
        Command::DryStart => {
            log::info!("Config OK. Database OK. Music path: {}", config.media.music_path.display());
            Ok(())
        }
        Command::Scan { force } => run_scan(&pool, &queue, &settings, &config.media.music_path, force).await,
        Command::Retag { album_id, release_id } => {
            let id = Uuid::parse_str(&album_id)?;
            queue.enqueue_album(id, release_id, true);
            drain_queue(queue, worker, orchestrator).await
        }
        Command::Restore { album_id } => {
            let id = Uuid::parse_str(&album_id)?;
            restore_latest_backup(&pool, backup_root(config), id).await
        }
        Command::Serve => serve(pool, queue, worker, orchestrator, settings, config).await,
    }
}
