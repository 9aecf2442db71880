//! Validation error accumulator
//!
//! Validators append human-readable messages keyed by a form field. An empty
//! accumulator means the upload is valid.

use heck::ToSnakeCase;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Field-keyed collection of validation messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message under `key`
    pub fn add(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(key.into())
            .or_default()
            .push(message.into());
    }

    /// Messages recorded for `key`
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.errors.get(key).map(Vec::as_slice)
    }

    /// True if any message has been recorded
    pub fn has_any(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Total number of messages across all keys
    pub fn count(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.errors
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Merge every message from `other` into this accumulator
    pub fn append(&mut self, other: ValidationErrors) {
        for (key, messages) in other.errors {
            self.errors.entry(key).or_default().extend(messages);
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, messages) in &self.errors {
            for message in messages {
                if !first {
                    f.write_str("\n")?;
                }
                write!(f, "{} {}", key, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// A single check contributing zero or more messages
pub trait Validator: Send + Sync {
    fn is_valid(&self, errors: &mut ValidationErrors);
}

impl<F> Validator for F
where
    F: Fn(&mut ValidationErrors) + Send + Sync,
{
    fn is_valid(&self, errors: &mut ValidationErrors) {
        self(errors)
    }
}

/// Run every validator, in order, into a fresh accumulator
pub fn validate(validators: &[&dyn Validator]) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    for validator in validators {
        validator.is_valid(&mut errors);
    }
    errors
}

/// Derive the error key for a form field name.
///
/// Spaces and dashes are dropped, then the name is snake_cased:
/// `"File"` becomes `"file"`, `"AvatarImage"` becomes `"avatar_image"`.
pub fn generate_key(field: &str) -> String {
    let compact: String = field.chars().filter(|c| *c != ' ' && *c != '-').collect();
    compact.to_snake_case()
}
