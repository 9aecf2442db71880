//! Built-in file validators
//!
//! Both validators inspect the part headers only; they never touch the file
//! bytes. [`UploadRules`] assembles whichever of them a storage adapter wants
//! to run for its field.

use super::form::FileHeader;
use super::validate::{generate_key, validate, ValidationErrors, Validator};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Message recorded when the content type is not in the allowed set
pub const NOT_ALLOWED_TYPE: &str = "not an allowed type";

/// Message recorded when the declared content length is not an integer
pub const UNPARSABLE_LENGTH: &str = "couldn't parse content length";

/// Rejects files whose declared `Content-Type` is not in `allowed_types`.
///
/// Matching is exact string comparison; a part with no content type is
/// compared as the empty string.
pub struct FileTypeValidator<'a> {
    pub field: &'a str,
    pub allowed_types: &'a HashSet<String>,
    pub header: &'a FileHeader,
}

impl Validator for FileTypeValidator<'_> {
    fn is_valid(&self, errors: &mut ValidationErrors) {
        if !self.allowed_types.contains(self.header.content_type()) {
            errors.add(generate_key(self.field), NOT_ALLOWED_TYPE);
        }
    }
}

/// Rejects files whose declared `Content-Length` exceeds `max_size` bytes.
pub struct MaxFileSizeValidator<'a> {
    pub field: &'a str,
    pub max_size: u64,
    pub header: &'a FileHeader,
}

impl Validator for MaxFileSizeValidator<'_> {
    fn is_valid(&self, errors: &mut ValidationErrors) {
        let key = generate_key(self.field);
        let size = match self.header.content_length().unwrap_or("").parse::<i64>() {
            Ok(size) => size,
            Err(_) => {
                errors.add(key, UNPARSABLE_LENGTH);
                return;
            }
        };

        // Negative lengths never exceed the limit
        if size > 0 && size as u64 > self.max_size {
            errors.add(key, format!("is too big {}", humanize_bytes(size as u64)));
        }
    }
}

/// Per-field upload rules, as read from configuration.
///
/// An empty `allowed_types` set and an absent `max_size` each disable the
/// corresponding check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadRules {
    #[serde(default)]
    pub allowed_types: HashSet<String>,
    #[serde(default)]
    pub max_size: Option<u64>,
}

impl UploadRules {
    /// Run the configured checks for `field` against `header`
    pub fn validate(&self, field: &str, header: &FileHeader) -> ValidationErrors {
        let file_type = FileTypeValidator {
            field,
            allowed_types: &self.allowed_types,
            header,
        };
        let max_size = self.max_size.map(|max_size| MaxFileSizeValidator {
            field,
            max_size,
            header,
        });

        let mut validators: Vec<&dyn Validator> = Vec::with_capacity(2);
        if !self.allowed_types.is_empty() {
            validators.push(&file_type);
        }
        if let Some(ref max_size) = max_size {
            validators.push(max_size);
        }

        validate(&validators)
    }
}

const SIZE_SUFFIXES: [&str; 7] = ["B", "kB", "MB", "GB", "TB", "PB", "EB"];

/// Format a byte count with SI units: `"512 B"`, `"4.2 MB"`, `"10 MB"`.
///
/// Values are rounded to one decimal place; anything at or above ten drops
/// the decimal.
pub fn humanize_bytes(bytes: u64) -> String {
    if bytes < 10 {
        return format!("{} B", bytes);
    }

    let mut exp = 0usize;
    let mut unit = 1u64;
    while exp + 1 < SIZE_SUFFIXES.len() && bytes / unit >= 1000 {
        unit *= 1000;
        exp += 1;
    }

    let val = (bytes as f64 / unit as f64 * 10.0 + 0.5).floor() / 10.0;
    if val < 10.0 {
        format!("{:.1} {}", val, SIZE_SUFFIXES[exp])
    } else {
        format!("{:.0} {}", val, SIZE_SUFFIXES[exp])
    }
}
