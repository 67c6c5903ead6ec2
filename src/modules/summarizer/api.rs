use axum::{
    Json,
    extract::{
        Multipart, Query, State,
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{
    error::{ErrorCode, SummarizerError},
    history::HistoryEntry,
    web::{
        AppState,
        auth::require_bearer_user,
        responses::{json_error, summarizer_error, upload_error},
        uploads::{FileFieldConfig, read_upload_form},
    },
};

use super::{
    ALLOWED_EXTENSIONS, BatchResult, LengthClass, SourceKind, SummaryRequest, SummaryResult,
    batch_field_cap, batch_requests, file_request,
};

const DEFAULT_HISTORY_LIMIT: usize = 10;

type ApiResult<T> = Result<Json<T>, Response>;

#[derive(Deserialize)]
pub struct TextSummaryBody {
    text: String,
    #[serde(default)]
    length: Option<String>,
}

#[derive(Deserialize)]
pub struct UrlSummaryBody {
    url: String,
    #[serde(default)]
    length: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    success: bool,
    summary: String,
    length: LengthClass,
    source_type: Option<SourceKind>,
    source: String,
    created_at: String,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    success: bool,
    count: usize,
    history: Vec<HistoryEntry>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

pub async fn summarize_text(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<TextSummaryBody>, JsonRejection>,
) -> ApiResult<SummaryResponse> {
    let user = require_bearer_user(&state, &headers)?;
    let Json(body) = body.map_err(|rejection| bad_request(rejection.body_text()))?;
    let length = parse_length(body.length.as_deref())?;

    let result = state
        .service()
        .summarize_one(SummaryRequest::text(body.text, length, &user))
        .await;
    into_response(result)
}

pub async fn summarize_url(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<UrlSummaryBody>, JsonRejection>,
) -> ApiResult<SummaryResponse> {
    let user = require_bearer_user(&state, &headers)?;
    let Json(body) = body.map_err(|rejection| bad_request(rejection.body_text()))?;
    let length = parse_length(body.length.as_deref())?;

    let result = state
        .service()
        .summarize_one(SummaryRequest::url(body.url, length, &user))
        .await;
    into_response(result)
}

pub async fn summarize_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<SummaryResponse> {
    let user = require_bearer_user(&state, &headers)?;
    let multipart = multipart.map_err(|rejection| bad_request(rejection.body_text()))?;

    let mut form = read_upload_form(multipart, &[FileFieldConfig::new("file", ALLOWED_EXTENSIONS, 1)])
        .await
        .map_err(|err| upload_error(&err).into_response())?;
    let length = parse_length(form.first_text("length"))?;

    let Some(file) = form.take_files("file").pop() else {
        return Err(api_error(&SummarizerError::validation("No file was uploaded.")));
    };
    let request = file_request(file, length, &user).map_err(|err| api_error(&err))?;

    let result = state.service().summarize_one(request).await;
    into_response(result)
}

pub async fn summarize_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<BatchResult> {
    let user = require_bearer_user(&state, &headers)?;
    let multipart = multipart.map_err(|rejection| bad_request(rejection.body_text()))?;

    let field_cap = batch_field_cap(state.service().max_batch_files());
    let mut form = read_upload_form(
        multipart,
        &[FileFieldConfig::new("files", &[], field_cap).with_min_files(0)],
    )
    .await
    .map_err(|err| upload_error(&err).into_response())?;
    let length = parse_length(form.first_text("length"))?;

    let requests = batch_requests(form.take_files("files"), length, &user);

    state
        .service()
        .summarize_batch(requests, &user)
        .await
        .map(Json)
        .map_err(|err| api_error(&err))
}

pub async fn history(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<HistoryResponse> {
    let user = require_bearer_user(&state, &headers)?;
    let Query(query) = query.map_err(|rejection| bad_request(rejection.body_text()))?;
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);

    let history = state.history().recent(&user, limit).await.map_err(|err| {
        error!(?err, user_id = %user, "failed to load history entries");
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InternalError.as_str(),
            "Could not load history. Please try again later.",
        )
        .into_response()
    })?;

    Ok(Json(HistoryResponse {
        success: true,
        count: history.len(),
        history,
    }))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339(),
    })
}

fn parse_length(value: Option<&str>) -> Result<LengthClass, Response> {
    LengthClass::parse_or_default(value).map_err(|err| api_error(&err))
}

// Body rejections are reported after authentication, in the JSON error shape.
fn bad_request(message: String) -> Response {
    json_error(
        StatusCode::BAD_REQUEST,
        ErrorCode::ValidationError.as_str(),
        message,
    )
    .into_response()
}

fn api_error(err: &SummarizerError) -> Response {
    summarizer_error(err).into_response()
}

fn into_response(result: SummaryResult) -> ApiResult<SummaryResponse> {
    match (result.summary_text(), result.error_code()) {
        (Some(summary), None) => Ok(Json(SummaryResponse {
            success: true,
            summary: summary.to_string(),
            length: result.length_class(),
            source_type: result.source_kind(),
            source: result.original_identifier().to_string(),
            created_at: result.created_at().to_rfc3339(),
        })),
        (_, code) => {
            let code = code.unwrap_or(ErrorCode::InternalError);
            Err(json_error(
                code.http_status(),
                code.as_str(),
                result.error_detail().unwrap_or_default(),
            )
            .into_response())
        }
    }
}
