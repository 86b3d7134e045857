//! Attendance screen: one still per student, submitted for recognition.

use crate::bundle;
use crate::config::Config;
use crate::screen::{self, ScreenCommand};
use anyhow::{Context, Result};
use presenceiq_core::form::{package_attendance, AttendanceSelection};
use presenceiq_core::{MediaAcquisition, StreamRequest};
use presenceiq_hw::spawn_camera_worker;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Attendance stills are submitted for matching, not enrolment, so a
/// smaller frame is enough.
const ATTENDANCE_REQUEST: StreamRequest = StreamRequest {
    width: 640,
    height: 480,
    facing: presenceiq_core::types::Facing::User,
};

pub async fn run(config: &Config, selection: AttendanceSelection) -> Result<()> {
    if selection.validate().is_err() {
        anyhow::bail!("Please select class and subject first!");
    }

    let handle = spawn_camera_worker(&config.camera_device, config.worker_options())
        .context("failed to start camera worker")?;
    let mut media = MediaAcquisition::new(handle, ATTENDANCE_REQUEST)
        .with_open_timeout(config.open_timeout());

    println!(
        "Marking attendance for {} / {}. Press Enter to capture a student, 'cancel' to finish.",
        selection.class, selection.subject
    );
    if let Err(e) = media.open().await {
        screen::print_camera_error(&e);
    }

    let mut marked = 0usize;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        println!("\n{marked} captured this session. [Enter] capture, 'open' retry camera, 'cancel' finish");
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match screen::parse_command(&line) {
            ScreenCommand::Capture => match media.capture_frame().await {
                Ok(Some(image)) => {
                    let request = package_attendance(selection.clone(), image)?;
                    match bundle::write_attendance(&config.output_dir, &request) {
                        Ok(dir) => {
                            marked += 1;
                            println!("Captured. Submitted for recognition: {}", dir.display());
                        }
                        Err(e) => println!("! Submission failed: {e:#}"),
                    }
                }
                Ok(None) => println!("Camera not ready. Type 'open' to retry."),
                Err(e) => {
                    screen::print_camera_error(&e);
                    if !media.is_open() {
                        println!("Camera closed. Type 'open' to reconnect.");
                    }
                }
            },
            ScreenCommand::Open => {
                if let Err(e) = media.open().await {
                    screen::print_camera_error(&e);
                }
            }
            ScreenCommand::Cancel => break,
            ScreenCommand::Help | ScreenCommand::Unknown(_) => {
                println!("Commands: <Enter> capture, open, cancel");
            }
            other => println!("'{other:?}' is not available when marking attendance"),
        }
    }

    media.close();
    println!("Attendance session finished: {marked} captured.");
    Ok(())
}
