use std::{collections::HashMap, path::Path};

use axum::{extract::Multipart, http::StatusCode};

pub type UploadResult<T> = Result<T, UploadError>;

/// Rejected multipart form. Messages are written for the end user.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct UploadError {
    status: StatusCode,
    message: String,
}

impl UploadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<axum::extract::multipart::MultipartError> for UploadError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        let status = err.status();
        let message = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "The upload is larger than the server accepts.".to_string()
        } else {
            format!("Could not read the upload form: {}", err.body_text())
        };
        Self { status, message }
    }
}

/// Expectations for one multipart file field.
#[derive(Debug, Clone, Copy)]
pub struct FileFieldConfig<'a> {
    pub field_name: &'a str,
    pub allowed_extensions: &'a [&'a str],
    pub max_files: usize,
    pub min_files: usize,
}

impl<'a> FileFieldConfig<'a> {
    pub fn new(field_name: &'a str, allowed_extensions: &'a [&'a str], max_files: usize) -> Self {
        Self {
            field_name,
            allowed_extensions,
            max_files,
            min_files: if max_files == 0 { 0 } else { 1 },
        }
    }

    pub fn with_min_files(mut self, min_files: usize) -> Self {
        self.min_files = min_files;
        self
    }

    /// Sanitized display name for `file_name`, or an error when its extension is not allowed.
    fn accept(&self, index: usize, file_name: &str) -> UploadResult<String> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        let allowed = self.allowed_extensions.is_empty()
            || self
                .allowed_extensions
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(&extension));
        if !allowed {
            let label = if extension.is_empty() {
                "files without an extension".to_string()
            } else {
                format!("`.{extension}` files")
            };
            return Err(UploadError::new(format!(
                "Unsupported file type: {label} are not accepted. Allowed: {}.",
                self.allowed_extensions
                    .iter()
                    .map(|ext| format!(".{ext}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        let sanitized = sanitize_filename::sanitize(file_name);
        Ok(if sanitized.is_empty() {
            format!("file_{index}.{extension}")
        } else {
            sanitized
        })
    }
}

/// A file read fully into memory.
#[derive(Clone)]
pub struct UploadedFile {
    pub field_name: String,
    pub original_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
pub struct UploadOutcome {
    pub files: Vec<UploadedFile>,
    pub text_fields: HashMap<String, Vec<String>>,
}

impl UploadOutcome {
    pub fn take_files(&mut self, field_name: &str) -> Vec<UploadedFile> {
        let (matching, rest) = std::mem::take(&mut self.files)
            .into_iter()
            .partition(|file| file.field_name == field_name);
        self.files = rest;
        matching
    }

    pub fn first_text(&self, field_name: &str) -> Option<&str> {
        self.text_fields
            .get(field_name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// Read a multipart form into memory, enforcing per-field counts and extensions.
pub async fn read_upload_form(
    mut multipart: Multipart,
    field_configs: &[FileFieldConfig<'_>],
) -> UploadResult<UploadOutcome> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut outcome = UploadOutcome::default();

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or("").to_string();

        let Some(file_name) = field.file_name().map(str::to_string) else {
            let value = field.text().await?;
            outcome.text_fields.entry(field_name).or_default().push(value);
            continue;
        };

        let Some(config) = field_configs
            .iter()
            .find(|config| config.field_name == field_name)
        else {
            return Err(UploadError::new(format!(
                "Unexpected file field `{field_name}`."
            )));
        };

        let count = counts.entry(config.field_name).or_default();
        if *count >= config.max_files {
            return Err(UploadError::new(format!(
                "Too many files in `{}` (at most {}).",
                config.field_name, config.max_files
            )));
        }

        let original_name = config.accept(*count, &file_name)?;
        let bytes = field.bytes().await?;
        *count += 1;

        outcome.files.push(UploadedFile {
            field_name,
            original_name,
            bytes: bytes.to_vec(),
        });
    }

    for config in field_configs {
        let count = counts.get(config.field_name).copied().unwrap_or_default();
        if count < config.min_files {
            return Err(UploadError::new(format!(
                "Select at least {} file(s) for `{}`.",
                config.min_files, config.field_name
            )));
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCS: &[&str] = &["txt", "pdf", "docx"];

    #[test]
    fn allowed_extensions_are_case_insensitive() {
        let config = FileFieldConfig::new("file", DOCS, 1);
        assert_eq!(config.accept(0, "Report.PDF").unwrap(), "Report.PDF");
    }

    #[test]
    fn other_extensions_are_rejected_with_400() {
        let config = FileFieldConfig::new("file", DOCS, 1);
        let err = config.accept(0, "slides.pptx").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.message().contains(".pptx"));

        assert!(config.accept(0, "README").is_err());
    }

    #[test]
    fn path_components_are_stripped_from_names() {
        let config = FileFieldConfig::new("file", DOCS, 1);
        let name = config.accept(0, "../../etc/notes.txt").unwrap();
        assert!(!name.contains('/'));
        assert!(name.ends_with("notes.txt"));
    }
}
