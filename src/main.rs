use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use video_archiver::commands::{self, AddPlaylistRequest, HistoryQuery};
use video_archiver::core::daemon_control::{DaemonControl, ProcessDaemonControl};
use video_archiver::core::orchestrator::spawn_event_logger;
use video_archiver::core::process_lock::ProcessLock;
use video_archiver::{
    AppConfig, AppError, AppState, DaemonStartup, OutputFormat, StartupCoordinator, UiStartup,
};

#[derive(Parser)]
#[command(author, version, about = "Keeps local folders in sync with remote playlists", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the background archiver until interrupted
    Daemon,
    /// Show daemon and change signal state
    Status,
    /// Ask the daemon to rescan now
    Trigger,
    /// Queue a failed download for another attempt
    Retry { id: i64 },
    /// Queue every given-up download for another attempt
    RetryAll,
    /// List download history, newest first
    History {
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        /// only failures
        #[arg(long)]
        failed: bool,
    },
    /// List playlist subscriptions
    Playlists,
    /// Subscribe to a playlist
    AddPlaylist {
        /// playlist URL or id
        locator: String,
        /// destination directory
        directory: PathBuf,
        #[arg(long, default_value = "mp3")]
        format: OutputFormat,
        #[arg(long, default_value = "")]
        name: String,
    },
    /// Stop archiving a playlist, keeping its history
    DisablePlaylist { id: i64 },
    /// Register an existing archive directory as known content
    RegisterDir { path: PathBuf },
    /// List registered files
    Registry {
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Show or change the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the active configuration
    Show,
    /// Restore the default configuration
    Reset,
    /// Write the configuration to a file
    Export { path: PathBuf },
    /// Replace the configuration with the contents of a file
    Import { path: PathBuf },
}

impl Command {
    fn mode(&self) -> &'static str {
        match self {
            Command::Daemon => "daemon",
            _ => "ui",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = AppState::load_or_initialize_config();
    if let Err(e) = video_archiver::init(&config.logging.level) {
        eprintln!("Failed to initialise logging: {e}");
    }

    let span = info_span!("video-archiver", mode = cli.command.mode());
    let result = async {
        match cli.command {
            Command::Daemon => run_daemon(config).await,
            command => run_ui(config, command).await,
        }
    }
    .instrument(span)
    .await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn coordinator_for(config: &AppConfig) -> anyhow::Result<StartupCoordinator> {
    let data_dir = AppConfig::get_data_dir()?;
    let control: Arc<dyn DaemonControl> = Arc::new(ProcessDaemonControl::current()?);
    let lock = ProcessLock::from_config(config.lock_path(&data_dir), &config.lock);
    Ok(StartupCoordinator::from_config(lock, control, &config.lock))
}

async fn run_daemon(config: AppConfig) -> anyhow::Result<()> {
    info!("🚀 Starting {} daemon v{}", video_archiver::NAME, video_archiver::VERSION);

    let coordinator = coordinator_for(&config)?;
    let data_dir = AppConfig::get_data_dir()?;

    let startup = coordinator
        .run_daemon_startup(|| async move {
            let state = AppState::open(config, &data_dir)?;
            let tools = commands::check_tools(&state).await;
            let verify = state.config.read().await.fetcher.verify_downloads;

            match &tools.ytdlp {
                Some(version) => info!("yt-dlp {}", version),
                None => return Err(AppError::System("yt-dlp is not available".to_string())),
            }
            match &tools.ffmpeg {
                Some(version) => info!("{}", version),
                None if verify => {
                    return Err(AppError::System(
                        "ffmpeg is not available but download verification is enabled".to_string(),
                    ))
                }
                None => warn!("ffmpeg is not available"),
            }
            Ok(state)
        })
        .await?;

    let mut state = match startup {
        DaemonStartup::Ready(state) => state,
        DaemonStartup::AlreadyStarting => {
            info!("Another daemon is starting up, exiting");
            return Ok(());
        }
    };
    state.config_path = AppConfig::get_config_path().ok();

    let cancel = CancellationToken::new();
    spawn_signal_handlers(cancel.clone());

    let (events, receiver) = mpsc::unbounded_channel();
    let logger = spawn_event_logger(receiver);

    let mut orchestrator = state.build_orchestrator(Some(events)).await;
    orchestrator.run(cancel).await?;

    // closes the event channel
    drop(orchestrator);
    if let Err(e) = logger.await {
        warn!("Event logger ended abnormally: {}", e);
    }

    info!("👋 Daemon stopped");
    Ok(())
}

fn spawn_signal_handlers(cancel: CancellationToken) {
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C; shutting down after the current item");
            on_ctrl_c.cancel();
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                return;
            }
        };
        tokio::spawn(async move {
            if sigterm.recv().await.is_some() {
                info!("Received SIGTERM; shutting down after the current item");
                cancel.cancel();
            }
        });
    }
}

async fn run_ui(config: AppConfig, command: Command) -> anyhow::Result<()> {
    let coordinator = coordinator_for(&config)?;
    match coordinator.run_ui_startup().await? {
        UiStartup::Unlocked => {}
        UiStartup::WaitedForDaemon => info!("Daemon finished starting"),
        UiStartup::RestartedDaemon => warn!("Daemon had to be restarted"),
    }

    let data_dir = AppConfig::get_data_dir()?;
    let mut state = AppState::open(config, &data_dir)?;
    state.config_path = AppConfig::get_config_path().ok();

    match command {
        Command::Daemon => anyhow::bail!("daemon mode cannot run as a UI command"),
        Command::Status => {
            let status = commands::daemon_status(&state).await?;
            let tools = commands::check_tools(&state).await;
            println!("daemon running:  {}", status.running);
            println!("daemon starting: {}", status.starting);
            println!("change pending:  {}", status.change_pending);
            println!("yt-dlp:          {}", tools.ytdlp.as_deref().unwrap_or("missing"));
            println!("ffmpeg:          {}", tools.ffmpeg.as_deref().unwrap_or("missing"));
        }
        Command::Trigger => {
            commands::trigger_change(&state).await?;
            println!("change signal raised");
        }
        Command::Retry { id } => {
            if commands::set_manual_retry(&state, id).await? {
                println!("download {id} queued for retry");
            } else {
                println!("download {id} is not in a retryable state");
            }
        }
        Command::RetryAll => {
            let count = commands::retry_all_given_up(&state).await?;
            println!("{count} downloads queued for retry");
        }
        Command::History {
            offset,
            limit,
            failed,
        } => {
            let page = commands::get_download_history_page(
                &state,
                HistoryQuery {
                    offset,
                    limit,
                    show_success: !failed,
                    show_failed: true,
                },
            )
            .await?;
            for download in page {
                println!(
                    "{:>6}  {:<24}  {:>2}x  {}  {}",
                    download.id.unwrap_or_default(),
                    download.status.to_string(),
                    download.attempt_count,
                    download.url,
                    download
                        .output_filename
                        .or(download.fail_message)
                        .unwrap_or_default()
                );
            }
        }
        Command::Playlists => {
            for playlist in commands::get_playlists(&state).await? {
                println!(
                    "{:>4}  {}  {}  {}  {:?}  {}",
                    playlist.id,
                    if playlist.is_enabled { "on " } else { "off" },
                    playlist.output_format,
                    playlist.name,
                    playlist.save_directory,
                    playlist.locator
                );
            }
        }
        Command::AddPlaylist {
            locator,
            directory,
            format,
            name,
        } => {
            let id = commands::add_playlist(
                &state,
                AddPlaylistRequest {
                    name,
                    locator,
                    output_format: format,
                    save_directory: directory,
                    thumbnail_base64: None,
                },
            )
            .await?;
            println!("playlist {id} added");
        }
        Command::DisablePlaylist { id } => {
            commands::disable_playlist(&state, id).await?;
            println!("playlist {id} disabled");
        }
        Command::RegisterDir { path } => {
            let summary = commands::register_directory(&state, path).await?;
            println!(
                "{} files registered, {} errors",
                summary.registered, summary.errors
            );
        }
        Command::Registry { offset, limit } => {
            let page = commands::get_registered_files(&state, offset, limit).await?;
            println!("{} registered files", page.total);
            for file in page.files {
                println!("{}  {:?}", file.digest, file.file_path);
            }
        }
        Command::Config { action } => match action {
            ConfigAction::Show => {
                println!("{}", commands::get_config(&state).await.export()?);
            }
            ConfigAction::Reset => {
                commands::reset_config(&state).await?;
                println!("configuration reset to defaults");
            }
            ConfigAction::Export { path } => {
                commands::export_config(&state, &path).await?;
                println!("configuration written to {:?}", path);
            }
            ConfigAction::Import { path } => {
                commands::import_config(&state, &path).await?;
                println!("configuration imported from {:?}", path);
            }
        },
    }

    Ok(())
}
