//! Stored identities: `<millisecond-timestamp>-<original-filename>`.
//! ------------------------------------------------------------------
//! Single source of truth for generating, validating and taking apart the
//! names under which uploads are persisted and addressed.

use chrono::{DateTime, Local, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::error::{AppError, AppResult};

static IDENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)-(.+)$").unwrap_or_else(|_| Regex::new("^$").unwrap())
});

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoredIdentity {
    raw: String,
    uploaded_at_ms: i64,
    display_name: String,
}

impl StoredIdentity {
    /// Build the identity for a new upload of `original_name` at `now_ms`.
    ///
    /// The original name is reduced to its last path component and NFC
    /// normalized; a name that ends up empty is rejected.
    pub fn generate(original_name: &str, now_ms: i64) -> AppResult<Self> {
        let base = original_name
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .unwrap_or_default()
            .trim();
        let display: String = base.nfc().collect();
        validate_segment(&display)
            .map_err(|m| AppError::user("bad_filename".to_string(), m))?;
        Ok(Self {
            raw: format!("{}-{}", now_ms, display),
            uploaded_at_ms: now_ms,
            display_name: display,
        })
    }

    /// Parse an identity received from a client or found in the storage folder.
    pub fn parse(raw: &str) -> AppResult<Self> {
        validate_segment(raw).map_err(|_| not_found())?;
        let caps = IDENTITY_RE.captures(raw).ok_or_else(not_found)?;
        let uploaded_at_ms = caps[1].parse::<i64>().map_err(|_| not_found())?;
        Ok(Self {
            raw: raw.to_string(),
            uploaded_at_ms,
            display_name: caps[2].to_string(),
        })
    }

    pub fn as_str(&self) -> &str { &self.raw }

    pub fn uploaded_at_ms(&self) -> i64 { self.uploaded_at_ms }

    /// Identity with the timestamp prefix and its separator stripped.
    pub fn display_name(&self) -> &str { &self.display_name }

    pub fn uploaded_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.uploaded_at_ms)
    }

    /// Upload time rendered in the local timezone, e.g. `2024-10-29 17:23:34`.
    pub fn uploaded_at_local(&self) -> String {
        match self.uploaded_at() {
            Some(t) => t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
            None => "Invalid Date".to_string(),
        }
    }
}

impl std::fmt::Display for StoredIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn not_found() -> AppError {
    AppError::not_found("not_found", "File not found")
}

/// A stored name must be a single, non-special path segment.
fn validate_segment(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("filename cannot be empty".to_string());
    }
    if name == "." || name == ".." {
        return Err("'.' and '..' are not allowed as filenames".to_string());
    }
    if name.chars().any(|c| c == '\u{0000}' || c == '/' || c == '\\') {
        return Err("filename cannot contain separators or NUL characters".to_string());
    }
    Ok(())
}
