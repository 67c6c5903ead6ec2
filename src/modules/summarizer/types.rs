use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{ErrorCode, SummarizerError};

use super::length::LengthClass;

/// Kind of artifact a summarization request starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Text,
    Pdf,
    Docx,
    Url,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Text => "text",
            SourceKind::Pdf => "pdf",
            SourceKind::Docx => "docx",
            SourceKind::Url => "url",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(SourceKind::Text),
            "pdf" => Some(SourceKind::Pdf),
            "docx" => Some(SourceKind::Docx),
            "url" => Some(SourceKind::Url),
            _ => None,
        }
    }

    /// Map an uploaded file name onto a source kind using its extension.
    pub fn from_filename(filename: &str) -> Result<Self, SummarizerError> {
        let extension = std::path::Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "txt" => Ok(SourceKind::Text),
            "pdf" => Ok(SourceKind::Pdf),
            "docx" => Ok(SourceKind::Docx),
            "" => Err(SummarizerError::validation(format!(
                "`{filename}` has no file extension. Upload a .txt, .pdf or .docx file."
            ))),
            other => Err(SummarizerError::validation(format!(
                "Unsupported file format `.{other}`. Upload a .txt, .pdf or .docx file."
            ))),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub enum SourcePayload {
    Text(String),
    Bytes(Vec<u8>),
    Url(String),
}

impl SourcePayload {
    pub fn len(&self) -> usize {
        match self {
            SourcePayload::Text(text) => text.len(),
            SourcePayload::Bytes(bytes) => bytes.len(),
            SourcePayload::Url(url) => url.len(),
        }
    }
}

impl fmt::Debug for SourcePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourcePayload::Text(text) => write!(f, "Text({} bytes)", text.len()),
            SourcePayload::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            SourcePayload::Url(url) => write!(f, "Url({url})"),
        }
    }
}

/// One inbound unit of work. Built per call and dropped once processed.
///
/// `source_kind` is `None` only for uploads whose extension matched no supported kind; such a
/// request fails in its own extraction stage.
#[derive(Debug, Clone)]
pub struct SummaryRequest {
    source_kind: Option<SourceKind>,
    payload: SourcePayload,
    original_identifier: String,
    length_class: LengthClass,
    user_id: String,
}

impl SummaryRequest {
    pub fn text(text: impl Into<String>, length_class: LengthClass, user_id: impl Into<String>) -> Self {
        Self {
            source_kind: Some(SourceKind::Text),
            payload: SourcePayload::Text(text.into()),
            original_identifier: "Direct text input".to_string(),
            length_class,
            user_id: user_id.into(),
        }
    }

    pub fn url(url: impl Into<String>, length_class: LengthClass, user_id: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            source_kind: Some(SourceKind::Url),
            original_identifier: url.clone(),
            payload: SourcePayload::Url(url),
            length_class,
            user_id: user_id.into(),
        }
    }

    pub fn file(
        source_kind: SourceKind,
        filename: impl Into<String>,
        bytes: Vec<u8>,
        length_class: LengthClass,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            source_kind: Some(source_kind),
            payload: SourcePayload::Bytes(bytes),
            original_identifier: filename.into(),
            length_class,
            user_id: user_id.into(),
        }
    }

    /// Uploaded file whose kind is taken from its extension. Unsupported extensions are kept
    /// so the item can fail on its own instead of rejecting the surrounding batch.
    pub fn upload(
        filename: impl Into<String>,
        bytes: Vec<u8>,
        length_class: LengthClass,
        user_id: impl Into<String>,
    ) -> Self {
        let filename = filename.into();
        Self {
            source_kind: SourceKind::from_filename(&filename).ok(),
            payload: SourcePayload::Bytes(bytes),
            original_identifier: filename,
            length_class,
            user_id: user_id.into(),
        }
    }

    pub fn source_kind(&self) -> Option<SourceKind> {
        self.source_kind
    }

    /// Kind label for logs and audit details.
    pub fn source_label(&self) -> &'static str {
        self.source_kind.map_or("unknown", |kind| kind.as_str())
    }

    pub fn payload(&self) -> &SourcePayload {
        &self.payload
    }

    pub fn original_identifier(&self) -> &str {
        &self.original_identifier
    }

    pub fn length_class(&self) -> LengthClass {
        self.length_class
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub text: String,
    pub source_kind: SourceKind,
    pub original_identifier: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Failed,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Success => "success",
            ResultStatus::Failed => "failed",
        }
    }
}

/// Outcome of one summarization.
///
/// Fields are read-only from outside the module; `error_detail` and `error_code` are
/// present exactly when `status` is [`ResultStatus::Failed`].
#[derive(Debug, Clone, Serialize)]
pub struct SummaryResult {
    summary_text: Option<String>,
    length_class: LengthClass,
    source_kind: Option<SourceKind>,
    original_identifier: String,
    created_at: DateTime<Utc>,
    user_id: String,
    status: ResultStatus,
    error_detail: Option<String>,
    error_code: Option<ErrorCode>,
}

impl SummaryResult {
    pub fn succeeded(request: &SummaryRequest, summary_text: String) -> Self {
        Self {
            summary_text: Some(summary_text),
            length_class: request.length_class,
            source_kind: request.source_kind,
            original_identifier: request.original_identifier.clone(),
            created_at: Utc::now(),
            user_id: request.user_id.clone(),
            status: ResultStatus::Success,
            error_detail: None,
            error_code: None,
        }
    }

    pub fn failed(request: &SummaryRequest, error: &SummarizerError) -> Self {
        Self {
            summary_text: None,
            length_class: request.length_class,
            source_kind: request.source_kind,
            original_identifier: request.original_identifier.clone(),
            created_at: Utc::now(),
            user_id: request.user_id.clone(),
            status: ResultStatus::Failed,
            error_detail: Some(error.user_message()),
            error_code: Some(error.code()),
        }
    }

    /// Rebuild a stored result. Returns `None` when the stored row violates the
    /// status/error invariant.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        summary_text: Option<String>,
        length_class: LengthClass,
        source_kind: Option<SourceKind>,
        original_identifier: String,
        created_at: DateTime<Utc>,
        user_id: String,
        status: ResultStatus,
        error_detail: Option<String>,
        error_code: Option<ErrorCode>,
    ) -> Option<Self> {
        let consistent = match status {
            ResultStatus::Success => error_detail.is_none() && error_code.is_none(),
            ResultStatus::Failed => error_detail.is_some() && error_code.is_some(),
        };
        consistent.then_some(Self {
            summary_text,
            length_class,
            source_kind,
            original_identifier,
            created_at,
            user_id,
            status,
            error_detail,
            error_code,
        })
    }

    pub fn summary_text(&self) -> Option<&str> {
        self.summary_text.as_deref()
    }

    pub fn length_class(&self) -> LengthClass {
        self.length_class
    }

    pub fn source_kind(&self) -> Option<SourceKind> {
        self.source_kind
    }

    pub fn source_label(&self) -> &'static str {
        self.source_kind.map_or("unknown", |kind| kind.as_str())
    }

    pub fn original_identifier(&self) -> &str {
        &self.original_identifier
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> ResultStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error_code
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub total: usize,
    pub successful_count: usize,
    pub failed_count: usize,
    pub items: Vec<SummaryResult>,
}

impl BatchResult {
    pub fn from_items(items: Vec<SummaryResult>) -> Self {
        let successful_count = items.iter().filter(|item| item.is_success()).count();
        Self {
            total: items.len(),
            successful_count,
            failed_count: items.len() - successful_count,
            items,
        }
    }
}
