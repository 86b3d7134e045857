//! Typed form records and submission packaging.
//!
//! A capture session only leaves the workflow through one of these
//! packages, after the surrounding form has been validated.

use crate::sequencer::{CompletedCapture, IncompleteCapture};
use crate::types::EncodedImage;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Semesters offered, inclusive.
pub const SEMESTERS: std::ops::RangeInclusive<u8> = 1..=8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("invalid email address: {0}")]
    InvalidEmail(String),
    #[error("semester must be between 1 and 8, got {0}")]
    InvalidSemester(u8),
    #[error("face capture incomplete: {0}")]
    IncompleteCapture(#[from] IncompleteCapture),
}

/// Student details entered alongside the face capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDetails {
    /// University seat number, e.g. "1MS21CS001".
    pub usn: String,
    pub name: String,
    pub email: String,
    pub semester: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl StudentDetails {
    pub fn validate(&self) -> Result<(), FormError> {
        require("usn", &self.usn)?;
        require("name", &self.name)?;
        require("email", &self.email)?;
        if !is_valid_email(self.email.trim()) {
            return Err(FormError::InvalidEmail(self.email.clone()));
        }
        if !SEMESTERS.contains(&self.semester) {
            return Err(FormError::InvalidSemester(self.semester));
        }
        Ok(())
    }
}

/// A validated registration: details plus one still per pose.
#[derive(Debug, Clone)]
pub struct RegistrationPayload {
    pub details: StudentDetails,
    pub capture: CompletedCapture,
    pub registered_at: DateTime<Utc>,
}

/// Validate the form and package it with a finished capture.
pub fn package_registration(
    details: StudentDetails,
    capture: Result<CompletedCapture, IncompleteCapture>,
) -> Result<RegistrationPayload, FormError> {
    details.validate()?;
    let capture = capture?;
    Ok(RegistrationPayload {
        details,
        capture,
        registered_at: Utc::now(),
    })
}

/// Class and subject selected on the attendance screen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSelection {
    pub class: String,
    pub subject: String,
}

impl AttendanceSelection {
    pub fn validate(&self) -> Result<(), FormError> {
        require("class", &self.class)?;
        require("subject", &self.subject)?;
        Ok(())
    }
}

/// A single still submitted for recognition against a class roster.
#[derive(Debug, Clone)]
pub struct AttendanceRequest {
    pub selection: AttendanceSelection,
    pub image: EncodedImage,
    pub timestamp: DateTime<Utc>,
}

pub fn package_attendance(
    selection: AttendanceSelection,
    image: EncodedImage,
) -> Result<AttendanceRequest, FormError> {
    selection.validate()?;
    Ok(AttendanceRequest {
        selection,
        image,
        timestamp: Utc::now(),
    })
}

fn require(field: &'static str, value: &str) -> Result<(), FormError> {
    if value.trim().is_empty() {
        Err(FormError::MissingField(field))
    } else {
        Ok(())
    }
}

/// `local@domain.tld` with no whitespace and exactly one `@`.
fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    // Some dot must have at least one character on either side.
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}
