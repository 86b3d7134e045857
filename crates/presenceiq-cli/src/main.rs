use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use presenceiq_core::form::{AttendanceSelection, StudentDetails};
use presenceiq_hw::Camera;
use std::path::PathBuf;

mod attend;
mod bundle;
mod config;
mod register;
mod screen;

#[derive(Parser)]
#[command(name = "presenceiq", about = "PresenceIQ face capture for registration and attendance")]
struct Cli {
    /// V4L2 device path (overrides PRESENCEIQ_CAMERA_DEVICE)
    #[arg(long, global = true)]
    device: Option<String>,
    /// Where submission bundles are written (overrides PRESENCEIQ_OUTPUT_DIR)
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a student with a 9-angle face capture
    Register {
        /// University seat number (e.g., "1MS21CS001")
        #[arg(long)]
        usn: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value_t = 1)]
        semester: u8,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        section: Option<String>,
        /// Date of birth, YYYY-MM-DD
        #[arg(long, value_name = "YYYY-MM-DD")]
        dob: Option<NaiveDate>,
        #[arg(long)]
        address: Option<String>,
    },
    /// Capture students' faces to mark attendance
    Attend {
        #[arg(long)]
        class: String,
        #[arg(long)]
        subject: String,
    },
    /// List the capture angles
    Poses,
    /// List V4L2 capture devices
    Devices,
    /// Run camera diagnostics (bypasses the capture workflow)
    Test {
        /// Save the test still as a JPEG
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = config::Config::from_env();
    if let Some(device) = cli.device {
        config.camera_device = device;
    }
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Register {
            usn,
            name,
            email,
            semester,
            phone,
            section,
            dob,
            address,
        } => {
            let details = StudentDetails {
                usn,
                name,
                email,
                semester,
                phone,
                section,
                date_of_birth: dob,
                address,
            };
            register::run(&config, details).await?;
        }
        Commands::Attend { class, subject } => {
            attend::run(&config, AttendanceSelection { class, subject }).await?;
        }
        Commands::Poses => {
            for pose in presenceiq_core::pose::nine_angle() {
                println!("{}. {:<15} {}", pose.ordinal + 1, pose.name, pose.instruction);
            }
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for d in devices {
                println!("{}  {} [{}] {}", d.path, d.name, d.driver, d.bus);
            }
        }
        Commands::Test { save } => run_diagnostics(&config, save)?,
    }

    Ok(())
}

fn run_diagnostics(config: &config::Config, save: Option<PathBuf>) -> Result<()> {
    println!("Running camera diagnostics on {}...", config.camera_device);
    let camera = Camera::open(&config.camera_device, config.frame_width, config.frame_height)
        .with_context(|| format!("failed to open {}", config.camera_device))?;
    println!(
        "Opened {}: {}x{} {:?}",
        camera.card, camera.width, camera.height, camera.fourcc
    );

    camera
        .discard_frames(config.warmup_frames)
        .context("warmup capture failed")?;
    let frame = camera.capture_frame().context("capture failed")?;
    let quality = frame.quality();
    println!(
        "Frame #{}: brightness {:.1}/255, dark={}, sharpness {:.3}, contrast {:.3}, score {:.3}",
        frame.sequence,
        frame.avg_brightness(),
        frame.is_dark,
        quality.sharpness,
        quality.contrast,
        quality.score
    );

    if let Some(path) = save {
        let jpeg = frame
            .encode_jpeg(config.jpeg_quality)
            .context("jpeg encoding failed")?;
        std::fs::write(&path, jpeg).with_context(|| format!("failed to write {}", path.display()))?;
        println!("Saved {}", path.display());
    }

    Ok(())
}
