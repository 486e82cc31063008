//! Input validation for issuance requests.
//!
//! Everything here runs before any cache lookup or signing call.

use crate::error::{Result, ServiceError};

/// Longest signature validity S3 accepts (7 days).
pub const MAX_EXPIRY_SECS: u32 = 604_800;

/// S3 object keys are limited to 1024 bytes.
pub const MAX_PATH_BYTES: usize = 1024;

/// Checks a bucket name against S3 naming rules.
pub fn validate_bucket(bucket: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(ServiceError::InvalidInput(format!(
            "Invalid bucket '{}': {}",
            bucket, reason
        )))
    };

    if !(3..=63).contains(&bucket.len()) {
        return invalid("must be 3-63 characters");
    }
    if !bucket
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
    {
        return invalid("only lowercase letters, digits, '.' and '-' are allowed");
    }
    let edges_ok = bucket
        .chars()
        .next()
        .zip(bucket.chars().last())
        .map_or(false, |(first, last)| {
            first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric()
        });
    if !edges_ok {
        return invalid("must start and end with a letter or digit");
    }
    if bucket.contains("..") {
        return invalid("must not contain consecutive dots");
    }
    Ok(())
}

/// Checks an object path.
pub fn validate_path(path: &str) -> Result<()> {
    let invalid = |reason: &str| Err(ServiceError::InvalidInput(format!("Invalid path: {}", reason)));

    if path.is_empty() {
        return invalid("cannot be empty");
    }
    if path.len() > MAX_PATH_BYTES {
        return invalid("exceeds 1024 bytes");
    }
    if path.starts_with('/') {
        return invalid("must not start with '/'");
    }
    if path.chars().any(char::is_control) {
        return invalid("contains control characters");
    }
    if path.split('/').any(|segment| segment == "..") {
        return invalid("must not contain '..' segments");
    }
    Ok(())
}

pub fn validate_expiry(expiry_secs: u32) -> Result<()> {
    if expiry_secs == 0 || expiry_secs > MAX_EXPIRY_SECS {
        return Err(ServiceError::InvalidInput(format!(
            "Expiry must be between 1 and {} seconds",
            MAX_EXPIRY_SECS
        )));
    }
    Ok(())
}
