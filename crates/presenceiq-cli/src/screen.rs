//! Line-oriented terminal screen helpers shared by the capture commands.

use presenceiq_core::{
    AcquisitionError, CaptureStore, EncodedImage, PoseDescriptor, MIN_ENROLL_QUALITY,
};

/// One line of user input on a capture screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenCommand {
    /// Empty line or `c`: capture the current pose.
    Capture,
    /// `retake N`, 1-based as shown on screen.
    Retake(usize),
    Open,
    Reset,
    Status,
    Submit,
    Cancel,
    Help,
    Unknown(String),
}

pub fn parse_command(line: &str) -> ScreenCommand {
    let mut words = line.split_whitespace();
    let Some(first) = words.next() else {
        return ScreenCommand::Capture;
    };

    match first.to_lowercase().as_str() {
        "c" | "capture" => ScreenCommand::Capture,
        "r" | "retake" => match words.next().and_then(|n| n.parse::<usize>().ok()) {
            Some(n) if n >= 1 => ScreenCommand::Retake(n),
            _ => ScreenCommand::Unknown(line.trim().to_string()),
        },
        "o" | "open" => ScreenCommand::Open,
        "reset" => ScreenCommand::Reset,
        "s" | "status" => ScreenCommand::Status,
        "submit" => ScreenCommand::Submit,
        "q" | "quit" | "cancel" => ScreenCommand::Cancel,
        "h" | "help" | "?" => ScreenCommand::Help,
        _ => ScreenCommand::Unknown(line.trim().to_string()),
    }
}

/// "3 / 9 angles [###------]"
pub fn progress_line(completed: usize, total: usize) -> String {
    let bar: String = (0..total)
        .map(|i| if i < completed { '#' } else { '-' })
        .collect();
    format!("{completed} / {total} angles [{bar}]")
}

/// Map an angle number as typed (1-based) to an ordinal.
pub fn retake_ordinal(n: usize, total: usize) -> Result<usize, String> {
    if (1..=total).contains(&n) {
        Ok(n - 1)
    } else {
        Err(format!("There is no angle {n}; choose 1-{total}."))
    }
}

/// Warning for a stored still that scored below the enrolment threshold.
pub fn quality_warning(pose: &PoseDescriptor, image: &EncodedImage) -> Option<String> {
    let quality = image.quality?;
    if quality.is_enrollable() {
        return None;
    }
    Some(format!(
        "! Image quality too low for {} (score {:.2}, need {:.2}). Type 'retake {}' to capture it again.",
        pose.name,
        quality.score,
        MIN_ENROLL_QUALITY,
        pose.ordinal + 1
    ))
}

/// One row per pose: `x` captured, `!` captured but low quality.
pub fn slot_grid(poses: &[PoseDescriptor], store: &CaptureStore) -> String {
    poses
        .iter()
        .map(|pose| {
            let mark = match store.slot_at(pose.ordinal) {
                Ok(Some(image)) if image.is_low_quality() => "!",
                Ok(Some(_)) => "x",
                _ => " ",
            };
            format!("  [{mark}] {}. {}", pose.ordinal + 1, pose.name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn print_camera_error(e: &AcquisitionError) {
    println!("! {}", e.user_message());
    tracing::debug!(error = %e, "camera error shown to user");
}
