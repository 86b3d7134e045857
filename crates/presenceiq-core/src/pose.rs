//! Pose catalogue.
//!
//! The ordered list of head orientations a registration capture walks
//! through. The default set is embedded at compile time from
//! `contrib/poses/nine-angle.toml` and parsed once on first use.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

/// Compile-time embedded nine-angle pose set.
const NINE_ANGLE_TOML: &str = include_str!("../../../contrib/poses/nine-angle.toml");

static NINE_ANGLE: OnceLock<Vec<PoseDescriptor>> = OnceLock::new();

#[derive(Error, Debug)]
pub enum PoseError {
    #[error("bad pose catalogue TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("pose catalogue is empty")]
    Empty,
    #[error("duplicate pose name: {0}")]
    DuplicateName(String),
}

/// One required head orientation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoseDescriptor {
    /// Short label, e.g. "Front" or "Left Profile".
    pub name: String,
    /// Prompt shown to the person being captured.
    pub instruction: String,
    /// Position in the sequence (0-based).
    pub ordinal: usize,
}

impl PoseDescriptor {
    /// Lowercase, hyphenated form of the name for file names ("left-profile").
    pub fn slug(&self) -> String {
        self.name
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect::<Vec<_>>()
            .join("-")
    }
}

#[derive(Debug, Deserialize)]
struct CatalogueFile {
    pose: Vec<PoseEntry>,
}

#[derive(Debug, Deserialize)]
struct PoseEntry {
    name: String,
    instruction: String,
}

/// Parse a pose catalogue. Ordinals follow file order.
pub fn parse_catalogue(src: &str) -> Result<Vec<PoseDescriptor>, PoseError> {
    let file: CatalogueFile = toml::from_str(src)?;
    if file.pose.is_empty() {
        return Err(PoseError::Empty);
    }

    let mut poses: Vec<PoseDescriptor> = Vec::with_capacity(file.pose.len());
    for (ordinal, entry) in file.pose.into_iter().enumerate() {
        if poses.iter().any(|p| p.name == entry.name) {
            return Err(PoseError::DuplicateName(entry.name));
        }
        poses.push(PoseDescriptor {
            name: entry.name,
            instruction: entry.instruction,
            ordinal,
        });
    }
    Ok(poses)
}

/// The built-in nine-angle pose set.
///
/// Returns a `'static` slice; the catalogue is never mutated after load.
/// An invalid embedded catalogue yields an empty slice, which a capture
/// session refuses to start on.
pub fn nine_angle() -> &'static [PoseDescriptor] {
    NINE_ANGLE.get_or_init(|| match parse_catalogue(NINE_ANGLE_TOML) {
        Ok(poses) => poses,
        Err(e) => {
            tracing::error!(error = %e, "embedded pose catalogue is invalid");
            Vec::new()
        }
    })
}
