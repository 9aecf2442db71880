//! Metrics module
//!
//! Prometheus counters and histograms for the upload pipeline, plus the text
//! encoder behind `GET /metrics`.

use crate::upload::ValidationErrors;
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "wave_uploads_total",
        "Total number of upload attempts by outcome",
        &["target", "status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "wave_upload_bytes_total",
        "Total bytes stored"
    ).unwrap();

    pub static ref UPLOAD_DURATION: HistogramVec = register_histogram_vec!(
        "wave_upload_duration_seconds",
        "Storage put duration in seconds",
        &["target"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    ).unwrap();

    // Validation metrics
    pub static ref VALIDATION_ERRORS: CounterVec = register_counter_vec!(
        "wave_validation_errors_total",
        "Validation messages by field key",
        &["field"]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "wave_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

/// Outcome of one upload attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Success,
    Invalid,
    Failure,
    Skipped,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Success => "success",
            UploadStatus::Invalid => "invalid",
            UploadStatus::Failure => "failure",
            UploadStatus::Skipped => "skipped",
        }
    }
}

/// Record the outcome of an upload attempt
pub fn record_upload(target: &str, status: UploadStatus) {
    UPLOADS_TOTAL
        .with_label_values(&[target, status.as_str()])
        .inc();
}

/// Record bytes written by a successful put
pub fn record_upload_bytes(bytes: u64) {
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record put duration
pub fn record_upload_duration(target: &str, duration_secs: f64) {
    UPLOAD_DURATION
        .with_label_values(&[target])
        .observe(duration_secs);
}

/// Record every message of a rejected upload under its field key
pub fn record_validation_errors(errors: &ValidationErrors) {
    for (field, messages) in errors.iter() {
        VALIDATION_ERRORS
            .with_label_values(&[field])
            .inc_by(messages.len() as f64);
    }
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Encode every registered metric in the Prometheus text format
pub fn encode() -> Result<(String, Vec<u8>), prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_upload() {
        record_upload("metrics-test", UploadStatus::Success);
        record_upload("metrics-test", UploadStatus::Success);
        record_upload("metrics-test", UploadStatus::Invalid);

        let success = UPLOADS_TOTAL
            .with_label_values(&["metrics-test", "success"])
            .get();
        assert!(success >= 2.0);
    }

    #[test]
    fn test_record_validation_errors_counts_messages() {
        let mut errors = ValidationErrors::new();
        errors.add("metrics_test_field", "not an allowed type");
        errors.add("metrics_test_field", "is too big 10 MB");

        let before = VALIDATION_ERRORS
            .with_label_values(&["metrics_test_field"])
            .get();
        record_validation_errors(&errors);
        let after = VALIDATION_ERRORS
            .with_label_values(&["metrics_test_field"])
            .get();
        assert_eq!(after - before, 2.0);
    }

    #[test]
    fn test_encode_contains_metrics() {
        record_upload_bytes(1024);
        record_upload_duration("metrics-test", 0.01);
        record_error("metrics_test");

        let (content_type, body) = encode().unwrap();
        assert!(content_type.starts_with("text/plain"));
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("wave_upload_bytes_total"));
        assert!(text.contains("wave_errors_total"));
    }
}
