use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::persist;
use crate::validate::RejectReason;

pub const ERROR_HEADER: [&str; 5] = ["run_utc", "period_key", "subject_id", "error_kind", "message"];

/// Failure taxonomy shared by both pipelines. The string forms are the stable
/// values written to the error tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    FormatInvalid,
    DuplicateId,
    NotFound,
    ApiError,
    EmptyUploads,
    NoVideos,
    UploadsMissing,
    UploadsInvalid,
    Unexpected,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::FormatInvalid => "FORMAT_INVALID",
            ErrorKind::DuplicateId => "DUPLICATE_ID",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::ApiError => "API_ERROR",
            ErrorKind::EmptyUploads => "EMPTY_UPLOADS",
            ErrorKind::NoVideos => "NO_VIDEOS",
            ErrorKind::UploadsMissing => "UPLOADS_MISSING",
            ErrorKind::UploadsInvalid => "UPLOADS_INVALID",
            ErrorKind::Unexpected => "UNEXPECTED_ERROR",
        }
    }
}

impl From<RejectReason> for ErrorKind {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::Format => ErrorKind::FormatInvalid,
            RejectReason::Duplicate => ErrorKind::DuplicateId,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub run_utc: DateTime<Utc>,
    pub period_key: String,
    pub subject_id: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorRecord {
    fn to_row(&self) -> Vec<String> {
        vec![
            self.run_utc.format("%Y-%m-%d %H:%M:%S").to_string(),
            self.period_key.clone(),
            self.subject_id.clone(),
            self.kind.as_str().to_string(),
            self.message.clone(),
        ]
    }
}

/// Per-run error accumulator. Failures are values appended here, never
/// control flow that aborts sibling subjects.
#[derive(Debug)]
pub struct RunReport {
    period_key: String,
    records: Vec<ErrorRecord>,
}

impl RunReport {
    pub fn new(period_key: impl Into<String>) -> Self {
        Self {
            period_key: period_key.into(),
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, subject_id: impl Into<String>, kind: ErrorKind, message: impl Into<String>) {
        let record = ErrorRecord {
            run_utc: Utc::now(),
            period_key: self.period_key.clone(),
            subject_id: subject_id.into(),
            kind,
            message: message.into(),
        };
        warn!(
            subject = %record.subject_id,
            kind = record.kind.as_str(),
            message = %record.message,
            "run error recorded"
        );
        self.records.push(record);
    }

    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    pub fn count_of(&self, kind: ErrorKind) -> usize {
        self.records.iter().filter(|r| r.kind == kind).count()
    }

    /// Daily semantics: append to a run-spanning table, header on create.
    pub fn append_to(&self, path: &Path) -> Result<()> {
        if self.records.is_empty() {
            return Ok(());
        }
        persist::append_csv(path, &ERROR_HEADER, self.records.iter().map(|r| r.to_row()))
    }

    /// Monthly semantics: the period's error file is rewritten wholesale.
    pub fn write_period_file(&self, path: &Path) -> Result<()> {
        persist::atomic_write_csv(path, &ERROR_HEADER, self.records.iter().map(|r| r.to_row()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_carry_period_key_and_kind_strings() {
        let mut report = RunReport::new("2026-08");
        report.push("UCx", ErrorKind::NotFound, "channel not returned");
        report.push("UCy", ErrorKind::ApiError, "http 500");
        assert_eq!(report.records().len(), 2);
        assert_eq!(report.records()[0].period_key, "2026-08");
        assert_eq!(report.records()[0].kind.as_str(), "NOT_FOUND");
        assert_eq!(report.count_of(ErrorKind::ApiError), 1);
    }

    #[test]
    fn reject_reasons_map_onto_kinds() {
        assert_eq!(
            ErrorKind::from(RejectReason::Format),
            ErrorKind::FormatInvalid
        );
        assert_eq!(
            ErrorKind::from(RejectReason::Duplicate),
            ErrorKind::DuplicateId
        );
    }
}
