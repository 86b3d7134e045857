//! Student registration screen: nine-angle capture plus details.

use crate::bundle;
use crate::config::Config;
use crate::screen::{self, ScreenCommand};
use anyhow::{Context, Result};
use presenceiq_core::form::{package_registration, FormError, StudentDetails};
use presenceiq_core::sequencer::SequencerError;
use presenceiq_core::{CameraBackend, CaptureOutcome, CaptureSequencer, MediaAcquisition, SequencerState};
use presenceiq_hw::spawn_camera_worker;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
Commands:
  <Enter> | c      capture the current angle
  retake N         clear angle N and capture it again
  open             retry opening the camera
  reset            discard every capture and start over
  status           show captured angles
  submit           register the student (all angles required)
  cancel           leave without registering";

pub async fn run(config: &Config, details: StudentDetails) -> Result<()> {
    // Reject a bad form before anyone sits through nine captures.
    details.validate().context("invalid student details")?;

    let handle = spawn_camera_worker(&config.camera_device, config.worker_options())
        .context("failed to start camera worker")?;
    let media = MediaAcquisition::new(handle, config.stream_request())
        .with_open_timeout(config.open_timeout());
    let mut session = CaptureSequencer::nine_angle(media);

    println!("Registering {} ({})", details.name, details.usn);
    println!("Ensure good lighting, keep your face centred and a neutral expression.");
    println!("{HELP}");

    start(&mut session).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt(&session);
        let Some(line) = lines.next_line().await? else {
            session.cancel();
            println!("Input closed; registration cancelled.");
            return Ok(());
        };

        match screen::parse_command(&line) {
            ScreenCommand::Capture => capture(&mut session).await,
            ScreenCommand::Retake(n) => match screen::retake_ordinal(n, session.poses().len()) {
                Ok(ordinal) => report(session.retake(ordinal).await),
                Err(msg) => println!("! {msg}"),
            },
            ScreenCommand::Open => {
                report(session.reopen_camera().await);
            }
            ScreenCommand::Reset => {
                session.reset();
                println!("All captures discarded.");
                start(&mut session).await;
            }
            ScreenCommand::Status => {
                println!("{}", screen::slot_grid(session.poses(), session.store()));
            }
            ScreenCommand::Submit => {
                if submit(config, &details, &session)? {
                    return Ok(());
                }
            }
            ScreenCommand::Cancel => {
                session.cancel();
                println!("Registration cancelled.");
                return Ok(());
            }
            ScreenCommand::Help => println!("{HELP}"),
            ScreenCommand::Unknown(cmd) => println!("Unknown command: {cmd} (type 'help')"),
        }
    }
}

async fn start<B: CameraBackend>(session: &mut CaptureSequencer<B>) {
    report(session.start().await);
}

async fn capture<B: CameraBackend>(session: &mut CaptureSequencer<B>) {
    match session.capture_current().await {
        Ok(CaptureOutcome::Stored { ordinal, .. }) => captured(session, ordinal),
        Ok(CaptureOutcome::Completed { ordinal }) => {
            captured(session, ordinal);
            println!("All angles captured. Type 'submit' to register or 'retake N' to redo one.");
        }
        Ok(CaptureOutcome::NotReady) => {
            if session.state() == SequencerState::Complete {
                println!("Every angle is captured. Use 'retake N' to redo one.");
            } else {
                println!("Camera not ready. Type 'open' to retry.");
            }
        }
        Err(e) => report::<()>(Err(e)),
    }
}

fn captured<B: CameraBackend>(session: &CaptureSequencer<B>, ordinal: usize) {
    let pose = &session.poses()[ordinal];
    println!("Captured {}.", pose.name);
    if let Ok(Some(image)) = session.store().slot_at(ordinal) {
        if let Some(warning) = screen::quality_warning(pose, image) {
            println!("{warning}");
        }
    }
}

/// Returns `Ok(true)` once a bundle has been written.
fn submit<B: CameraBackend>(
    config: &Config,
    details: &StudentDetails,
    session: &CaptureSequencer<B>,
) -> Result<bool> {
    let payload = match package_registration(details.clone(), session.completed()) {
        Ok(payload) => payload,
        Err(FormError::IncompleteCapture(missing)) => {
            println!(
                "Please complete the {}-angle face capture first ({} / {} captured).",
                missing.total, missing.captured, missing.total
            );
            println!("Remaining: {}", missing.remaining.join(", "));
            return Ok(false);
        }
        Err(e) => return Err(e).context("invalid student details"),
    };

    let low: Vec<_> = session.low_quality().iter().map(|p| p.name.as_str()).collect();
    if !low.is_empty() {
        println!("Warning: low image quality for {}. Recognition may be less reliable.", low.join(", "));
    }

    match bundle::write_registration(&config.output_dir, &payload) {
        Ok(dir) => {
            println!("Student registered. Bundle written to {}", dir.display());
            Ok(true)
        }
        Err(e) => {
            // Captures stay in place; the user can fix the problem and resubmit.
            println!("! Submission failed: {e:#}");
            Ok(false)
        }
    }
}

fn report<T>(result: Result<T, SequencerError>) {
    match result {
        Ok(_) => {}
        Err(SequencerError::Camera(e)) => screen::print_camera_error(&e),
        Err(e) => println!("! {e}"),
    }
}

fn prompt<B: CameraBackend>(session: &CaptureSequencer<B>) {
    let progress = screen::progress_line(session.completed_count(), session.store().total());
    match session.current_pose() {
        Some(pose) if session.camera_open() => println!(
            "\n{progress}\nAngle {} of {}: {} - {}",
            pose.ordinal + 1,
            session.poses().len(),
            pose.name,
            pose.instruction
        ),
        Some(pose) => println!(
            "\n{progress}\nCamera closed (next angle: {}). Type 'open' to retry.",
            pose.name
        ),
        None => println!("\n{progress}"),
    }
}
