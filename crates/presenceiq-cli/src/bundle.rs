//! Submission bundles.
//!
//! A bundle is a directory holding the encoded stills and a
//! `manifest.json` describing them. The manifest is written last, so a
//! directory without one is an interrupted write.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use presenceiq_core::form::{AttendanceRequest, AttendanceSelection, RegistrationPayload, StudentDetails};
use presenceiq_core::{EncodedImage, FrameQuality};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const MANIFEST: &str = "manifest.json";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageEntry {
    pub ordinal: usize,
    pub pose: String,
    pub file: String,
    pub media_type: &'static str,
    pub size: usize,
    pub sha256: String,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<FrameQuality>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationManifest {
    pub bundle_id: String,
    pub student: StudentDetails,
    pub registered_at: DateTime<Utc>,
    pub face_images: Vec<ImageEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceManifest {
    pub bundle_id: String,
    #[serde(flatten)]
    pub selection: AttendanceSelection,
    pub timestamp: DateTime<Utc>,
    pub image: ImageEntry,
}

/// Write a registration bundle under `root`, returning its directory.
pub fn write_registration(root: &Path, payload: &RegistrationPayload) -> Result<PathBuf> {
    let bundle_id = Uuid::new_v4().simple().to_string();
    let dir = root.join(format!(
        "registration-{}-{bundle_id}",
        sanitize(&payload.details.usn)
    ));
    create_dir(&dir)?;

    let mut face_images = Vec::with_capacity(payload.capture.len());
    for capture in &payload.capture.captures {
        let file = format!(
            "{:02}-{}.{}",
            capture.pose.ordinal + 1,
            capture.pose.slug(),
            capture.image.media_type.extension()
        );
        face_images.push(write_image(
            &dir,
            &file,
            capture.pose.ordinal,
            &capture.pose.name,
            &capture.image,
        )?);
    }

    let manifest = RegistrationManifest {
        bundle_id,
        student: payload.details.clone(),
        registered_at: payload.registered_at,
        face_images,
    };
    write_manifest(&dir, &manifest)?;

    tracing::info!(dir = %dir.display(), usn = %payload.details.usn, "registration bundle written");
    Ok(dir)
}

/// Write an attendance bundle under `root`, returning its directory.
pub fn write_attendance(root: &Path, request: &AttendanceRequest) -> Result<PathBuf> {
    let bundle_id = Uuid::new_v4().simple().to_string();
    let dir = root.join(format!(
        "attendance-{}-{bundle_id}",
        request.timestamp.format("%Y%m%dT%H%M%S")
    ));
    create_dir(&dir)?;

    let file = format!("capture.{}", request.image.media_type.extension());
    let image = write_image(&dir, &file, 0, "Attendance", &request.image)?;

    let manifest = AttendanceManifest {
        bundle_id,
        selection: request.selection.clone(),
        timestamp: request.timestamp,
        image,
    };
    write_manifest(&dir, &manifest)?;

    tracing::info!(
        dir = %dir.display(),
        class = %request.selection.class,
        subject = %request.selection.subject,
        "attendance bundle written"
    );
    Ok(dir)
}

fn create_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create bundle directory {}", dir.display()))
}

fn write_image(
    dir: &Path,
    file: &str,
    ordinal: usize,
    pose: &str,
    image: &EncodedImage,
) -> Result<ImageEntry> {
    let path = dir.join(file);
    std::fs::write(&path, &image.bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;

    Ok(ImageEntry {
        ordinal,
        pose: pose.to_string(),
        file: file.to_string(),
        media_type: image.media_type.mime(),
        size: image.len(),
        sha256: sha256_hex(&image.bytes),
        width: image.width,
        height: image.height,
        captured_at: image.captured_at,
        quality: image.quality,
    })
}

fn write_manifest<T: Serialize>(dir: &Path, manifest: &T) -> Result<()> {
    let path = dir.join(MANIFEST);
    let json = serde_json::to_vec_pretty(manifest).context("failed to serialize manifest")?;
    std::fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Keep only characters that are safe in a directory name.
fn sanitize(s: &str) -> String {
    let cleaned: String = s
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}
