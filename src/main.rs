//! Facewatch Agent CLI
//!
//! Owner-aware camera monitor with gated intruder alerts.

use anyhow::Context;
use clap::{Parser, Subcommand};
use facewatch_agent::{
    camera::{backend_available, Camera},
    command::CommandHook,
    config::Config,
    dispatch::AlertDispatcher,
    monitor::{prepare_model, Monitor, StopHandle},
    transparency::create_shared_log_with_persistence,
    vision::{
        training::enrollment_files, train_owner_model, ModelArtifacts, RecognitionEngine,
        TrainingRequest,
    },
    PRIVACY_NOTICE, VERSION,
};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "facewatch")]
#[command(version = VERSION)]
#[command(about = "Owner-aware camera monitor with gated intruder alerts", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the camera until Ctrl+C
    Monitor {
        /// Camera device index (overrides config)
        #[arg(long)]
        camera: Option<i32>,

        /// Fail instead of training when no owner model exists
        #[arg(long)]
        no_auto_train: bool,
    },

    /// Train the owner model from enrollment images
    Train {
        /// Directory of owner images (overrides config)
        #[arg(long)]
        enroll_dir: Option<PathBuf>,
    },

    /// Show model and activity status
    Status,

    /// Show configuration
    Config,

    /// Send a LOCK command through the command hook
    Lock,

    /// Display the camera privacy notice
    Notice,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Monitor {
            camera,
            no_auto_train,
        } => cmd_monitor(camera, no_auto_train),
        Commands::Train { enroll_dir } => cmd_train(enroll_dir),
        Commands::Status => {
            cmd_status();
            Ok(())
        }
        Commands::Config => {
            cmd_config();
            Ok(())
        }
        Commands::Lock => cmd_lock(),
        Commands::Notice => {
            println!("{PRIVACY_NOTICE}");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn cmd_monitor(camera: Option<i32>, no_auto_train: bool) -> anyhow::Result<()> {
    println!("Facewatch Agent v{VERSION}");
    println!();

    let mut config = Config::load().unwrap_or_default();
    if let Some(index) = camera {
        config.camera_index = index;
    }
    if no_auto_train {
        config.auto_train = false;
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    if let Some(report) = prepare_model(&config)? {
        println!(
            "Trained owner model from {} images ({} skipped)",
            report.images_used, report.images_skipped
        );
    }

    if !backend_available() {
        eprintln!("Warning: built without a camera backend; no frames will be captured.");
    }

    println!("Starting monitor...");
    println!("  Owner: {}", config.owner_name);
    println!("  Camera: {}", config.camera_index);
    println!("  Snapshots: {}", config.intruder_dir().display());
    println!(
        "  Backend: {}",
        config.alerts.backend_url.as_deref().unwrap_or("none (log only)")
    );
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let log = create_shared_log_with_persistence(config.activity_path());
    let dispatcher = AlertDispatcher::from_config(&config, Some(log.clone()))
        .context("could not start alert dispatcher")?;

    let index = config.camera_index;
    let engine_config = config.clone();
    let mut monitor = Monitor::start(
        &config,
        move || Camera::new(index),
        move || RecognitionEngine::from_config(&engine_config),
        dispatcher,
        log.clone(),
    )?;

    ctrlc_handler(monitor.stop_handle());

    let mut last_threat = false;
    while monitor.is_running() {
        let telemetry = monitor.telemetry();
        if telemetry.threat != last_threat {
            println!(
                "[{}] threat: {} ({} faces, {:.1} fps)",
                chrono::Local::now().format("%H:%M:%S"),
                telemetry.threat,
                telemetry.faces.len(),
                telemetry.fps
            );
            last_threat = telemetry.threat;
        }
        thread::sleep(Duration::from_millis(200));
    }

    println!();
    println!("Stopping...");
    monitor.join();

    if let Err(e) = log.save() {
        eprintln!("Warning: Could not save activity log: {e}");
    }
    println!();
    println!("{}", log.summary());
    Ok(())
}

fn cmd_train(enroll_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();
    let mut request = TrainingRequest::from_config(&config);
    if let Some(dir) = enroll_dir {
        request.enroll_dir = dir;
    }

    println!("Training owner '{}'", request.owner_name);
    println!("  Images: {}", request.enroll_dir.display());

    let report = train_owner_model(&request)?;

    println!();
    println!("Training complete.");
    println!("  Images used: {}", report.images_used);
    println!("  Images skipped: {}", report.images_skipped);
    println!("  Model: {}", report.artifacts.model_path.display());
    println!("  Labels: {}", report.artifacts.labels_path.display());
    Ok(())
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    println!("Facewatch Agent Status");
    println!("======================");
    println!();
    println!("Host: {host}");
    println!(
        "Camera backend: {}",
        if backend_available() {
            "available ✓"
        } else {
            "not compiled in ✗"
        }
    );
    println!();

    let artifacts = ModelArtifacts::in_dir(&config.model_dir());
    println!("Owner model:");
    println!("  Owner: {}", config.owner_name);
    println!(
        "  Model: {}",
        if artifacts.exist() {
            "trained ✓"
        } else {
            "missing ✗"
        }
    );
    match enrollment_files(&config.enroll_dir()) {
        Ok(files) => println!(
            "  Enrollment images: {} (need {})",
            files.len(),
            config.recognition.min_enrollment_images
        ),
        Err(_) => println!(
            "  Enrollment images: directory missing ({})",
            config.enroll_dir().display()
        ),
    }
    println!();

    let stats_path = config.activity_path();
    if stats_path.exists() {
        if let Ok(content) = std::fs::read_to_string(&stats_path) {
            if let Ok(stats) = serde_json::from_str::<serde_json::Value>(&content) {
                println!("Cumulative Activity:");
                for (key, label) in [
                    ("frames_sampled", "Frames analysed"),
                    ("faces_observed", "Faces observed"),
                    ("intruder_frames", "Frames with an intruder"),
                    ("alerts_fired", "Alerts fired"),
                    ("dispatch_failures", "Dispatch failures"),
                ] {
                    if let Some(value) = stats.get(key) {
                        println!("  {label}: {value}");
                    }
                }
                if let Some(updated) = stats.get("last_updated") {
                    println!("  Last updated: {updated}");
                }
            }
        }
    } else {
        println!("No activity recorded yet.");
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_lock() -> anyhow::Result<()> {
    let ack = CommandHook::default().handle("LOCK")?;
    println!(
        "{:?} handled at {}",
        ack.command,
        ack.handled_at.format("%Y-%m-%d %H:%M:%S")
    );
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(stop: StopHandle) {
    ctrlc::set_handler(move || {
        stop.stop();
    })
    .expect("Error setting Ctrl+C handler");
}
