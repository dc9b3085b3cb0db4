// Binwatch Command Line Interface
// Runs the multi-camera garbage watch and its maintenance commands

mod console;

use anyhow::{anyhow, bail, Context};
use binwatch_eye::alert::{Alerter, EmailAlerter};
use binwatch_eye::camera::{DefaultOpener, FrameSource, ImageFolderSource};
use binwatch_eye::config::{AppConfig, DetectorConfig, StreamSpec};
use binwatch_eye::dashboard::Dashboard;
use binwatch_eye::frame::{Frame, PixelFormat};
use binwatch_eye::models::{Detector, ModelManager};
use binwatch_eye::processing::DetectionPipeline;
use binwatch_eye::registry::StreamRegistry;
use binwatch_eye::stream::WorkerContext;
use clap::{Parser, Subcommand};
use console::ConsoleSink;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "binwatch")]
#[command(about = "Binwatch - garbage detection over live camera streams", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML, or JSON by extension)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the configured streams until Ctrl+C
    Run {
        /// Stream to register, as AREA=SOURCE (repeatable)
        #[arg(long = "stream", value_name = "AREA=SOURCE")]
        streams: Vec<String>,

        /// Sender address for alert mails
        #[arg(long)]
        sender: Option<String>,

        /// App password of the sender account
        #[arg(long)]
        app_password: Option<String>,

        /// Recipient of alert mails
        #[arg(long)]
        recipient: Option<String>,

        /// ONNX model file
        #[arg(long)]
        model: Option<PathBuf>,

        /// Directory for per-area JPEG snapshots
        #[arg(long)]
        snapshot_dir: Option<PathBuf>,
    },

    /// Load and validate the configuration, then print it
    CheckConfig,

    /// Fetch the model from the configured model_url if it is missing
    DownloadModel {
        /// HTTPS URL of the ONNX model
        #[arg(long)]
        url: Option<String>,

        /// Expected SHA-256 of the model, hex
        #[arg(long)]
        sha256: Option<String>,
    },

    /// Send one alert mail to verify the SMTP setup
    SendTestAlert {
        /// Area name used in the mail
        #[arg(long)]
        area: String,

        /// Image to attach (a blank frame when omitted)
        #[arg(long)]
        image: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.log_level = Some(level);
    }
    init_logging(config.log_level.as_deref().unwrap_or("info"));

    match cli.command {
        Commands::Run {
            streams,
            sender,
            app_password,
            recipient,
            model,
            snapshot_dir,
        } => {
            for stream in &streams {
                config.streams.push(StreamSpec::parse(stream).map_err(|e| anyhow!(e))?);
            }
            if let Some(sender) = sender {
                config.mailer.sender = sender;
            }
            if let Some(password) = app_password {
                config.mailer.app_password = password;
            }
            if let Some(recipient) = recipient {
                config.mailer.recipient = recipient;
            }
            if let Some(model) = model {
                config.detector.model_path = model;
            }
            if snapshot_dir.is_some() {
                config.dashboard.snapshot_dir = snapshot_dir;
            }
            run(config).await?;
        }
        Commands::CheckConfig => {
            check_config(&config)?;
        }
        Commands::DownloadModel { url, sha256 } => {
            if url.is_some() {
                config.detector.model_url = url;
            }
            if sha256.is_some() {
                config.detector.model_sha256 = sha256;
            }
            config.detector.validate().map_err(|e| anyhow!(e))?;
            let path = ModelManager::new(config.detector.clone()).ensure_model().await?;
            println!("✅ Model ready at {:?}", path);
        }
        Commands::SendTestAlert { area, image } => {
            send_test_alert(&config, &area, image.as_deref()).await?;
        }
    }

    Ok(())
}

/// Defaults, then the file if given, then `BINWATCH_*` variables
fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let mut config = match path {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => AppConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(feature = "onnx")]
fn build_detector(config: &DetectorConfig) -> anyhow::Result<Arc<dyn Detector>> {
    let model = binwatch_eye::models::yolo::YoloModel::new(config)?;
    Ok(Arc::new(model))
}

#[cfg(not(feature = "onnx"))]
fn build_detector(config: &DetectorConfig) -> anyhow::Result<Arc<dyn Detector>> {
    bail!(
        "Cannot load {:?}: binwatch was built without the onnx feature",
        config.model_path
    )
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    config.validate()?;

    ModelManager::new(config.detector.clone()).ensure_model().await?;
    let detector = build_detector(&config.detector)?;
    let alerter: Arc<dyn Alerter> = Arc::new(EmailAlerter::new(config.mailer.clone())?);
    let pipeline = DetectionPipeline::new(detector, config.worker.confidence_floor);
    let ctx = WorkerContext::new(Arc::new(DefaultOpener), pipeline, alerter, config.worker.clone());
    let registry = Arc::new(StreamRegistry::new(ctx));

    for stream in &config.streams {
        let line = format!("{}={}", stream.area, stream.source);
        if let console::CommandResult::Error(msg) = console::handle_command(&registry, &line) {
            warn!("Skipping stream {:?}: {}", stream.area, msg);
            println!("❌ {}", msg);
        }
    }

    println!("Type AREA=SOURCE to add a stream, 'help' for commands");
    let quit = Arc::new(Notify::new());
    spawn_command_reader(registry.clone(), quit.clone())?;

    let running = Arc::new(AtomicBool::new(true));
    let dashboard = Dashboard::new(registry.clone(), config.dashboard.refresh_interval);
    let mut sink = ConsoleSink::new(
        config.dashboard.snapshot_dir.clone(),
        config.dashboard.snapshot_interval,
    );

    let loop_running = running.clone();
    let dashboard_task = tokio::task::spawn_blocking(move || {
        dashboard.run(&mut sink, &loop_running);
    });

    tokio::select! {
        _ = wait_for_shutdown() => {},
        _ = quit.notified() => info!("Exit requested from the console"),
    }
    running.store(false, Ordering::SeqCst);

    if let Err(e) = dashboard_task.await {
        error!("Dashboard loop ended abnormally: {}", e);
    }

    let registry_for_stop = registry.clone();
    tokio::task::spawn_blocking(move || registry_for_stop.shutdown()).await?;
    info!("All streams stopped");
    Ok(())
}

/// Read console commands on their own thread; typing `exit` wakes `quit`
fn spawn_command_reader(registry: Arc<StreamRegistry>, quit: Arc<Notify>) -> anyhow::Result<()> {
    std::thread::Builder::new()
        .name("console-commands".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            let mut stdout = std::io::stdout();
            match console::run_commands(&registry, stdin.lock(), &mut stdout) {
                Ok(true) => quit.notify_one(),
                Ok(false) => info!("Console input closed, watching until Ctrl+C"),
                Err(e) => error!("Console input failed: {}", e),
            }
        })?;
    Ok(())
}

/// Wait for Ctrl+C (or SIGTERM on unix)
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

fn check_config(config: &AppConfig) -> anyhow::Result<()> {
    config.validate()?;

    println!("✅ Configuration is valid");
    println!();
    println!("  Sample interval:   {:?}", config.worker.sample_interval);
    println!("  Sustain threshold: {:?}", config.worker.sustain_threshold);
    println!("  Confidence floor:  {}", config.worker.confidence_floor);
    println!("  Model:             {:?}", config.detector.model_path);
    println!(
        "  SMTP relay:        {}:{}",
        config.mailer.smtp_host, config.mailer.smtp_port
    );
    if !config.mailer.has_credentials() {
        println!("  ⚠️  Mail credentials incomplete, alerts will not be delivered");
    }
    if config.streams.is_empty() {
        println!("  Streams:           none");
    } else {
        println!("  Streams:");
        for stream in &config.streams {
            println!("    {} <- {}", stream.area, stream.source);
        }
    }
    Ok(())
}

fn test_frame(image: Option<&Path>) -> anyhow::Result<Frame> {
    match image {
        Some(path) => {
            let mut source = ImageFolderSource::open(path)?;
            source
                .read()
                .ok_or_else(|| anyhow!("Could not decode {:?}", path))
        }
        None => Ok(Frame::filled(640, 480, PixelFormat::Bgr8, 128)?),
    }
}

async fn send_test_alert(config: &AppConfig, area: &str, image: Option<&Path>) -> anyhow::Result<()> {
    let area = area.trim();
    if area.is_empty() {
        bail!("Area name must not be empty");
    }

    let frame = test_frame(image)?;
    let alerter = EmailAlerter::new(config.mailer.clone())?;
    let area_name = area.to_string();
    let sent = tokio::task::spawn_blocking(move || alerter.send_alert(&area_name, &frame)).await?;

    if !sent {
        bail!("Test alert for {} could not be delivered, see the log for details", area);
    }
    println!("✅ Test alert for {} sent to {}", area, config.mailer.recipient);
    Ok(())
}
