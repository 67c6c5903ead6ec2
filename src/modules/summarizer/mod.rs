mod api;
mod completion;
mod extract;
mod length;
mod service;
mod types;
mod ui;

use axum::{
    Router,
    routing::{get, post},
};

pub use extract::Extractor;
pub use length::LengthClass;
pub use service::{HistoryPolicy, SummarizationService};
pub use types::{BatchResult, ResultStatus, SourceKind, SummaryRequest, SummaryResult};

#[cfg(test)]
pub(crate) use {completion::CompletionClient, extract::fixtures, length::GenerationParams};

use crate::{
    error::SummarizerResult,
    web::{AppState, uploads::UploadedFile},
};

const ALLOWED_EXTENSIONS: &[&str] = &["txt", "pdf", "docx"];

/// Multipart cap for the batch field. The real batch limit is checked by the service so that
/// oversized batches are audited.
const BATCH_FIELD_SLACK: usize = 40;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/summarize/text", post(api::summarize_text))
        .route("/api/summarize/url", post(api::summarize_url))
        .route("/api/summarize/file", post(api::summarize_file))
        .route("/api/summarize/batch", post(api::summarize_batch))
        .route("/api/history", get(api::history))
        .route("/api/health", get(api::health))
        .route("/", get(ui::dashboard))
        .route("/text", get(ui::text_page).post(ui::submit_text))
        .route("/url", get(ui::url_page).post(ui::submit_url))
        .route("/upload", get(ui::upload_page).post(ui::submit_upload))
        .route("/batch", get(ui::batch_page).post(ui::submit_batch))
        .route("/history", get(ui::history_page))
}

fn file_request(
    file: UploadedFile,
    length_class: LengthClass,
    user_id: &str,
) -> SummarizerResult<SummaryRequest> {
    let kind = SourceKind::from_filename(&file.original_name)?;
    Ok(SummaryRequest::file(
        kind,
        file.original_name,
        file.bytes,
        length_class,
        user_id,
    ))
}

fn batch_field_cap(max_batch_files: usize) -> usize {
    max_batch_files.saturating_add(BATCH_FIELD_SLACK)
}

/// Batch uploads accept any extension; unsupported files fail as individual items.
fn batch_requests(
    files: Vec<UploadedFile>,
    length_class: LengthClass,
    user_id: &str,
) -> Vec<SummaryRequest> {
    files
        .into_iter()
        .map(|file| SummaryRequest::upload(file.original_name, file.bytes, length_class, user_id))
        .collect()
}
