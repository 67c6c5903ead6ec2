use axum::{
    extract::{Form, Multipart, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use tracing::error;

use crate::{
    error::{SummarizerError, SummarizerResult},
    history::HistoryEntry,
    web::{
        AppState,
        auth::current_user,
        templates::{PageLayout, escape_html, render_login_page, render_page},
        uploads::{FileFieldConfig, UploadOutcome, read_upload_form},
    },
};

use super::{
    ALLOWED_EXTENSIONS, BatchResult, LengthClass, SummaryRequest, SummaryResult, batch_field_cap,
    batch_requests, file_request,
};

const DASHBOARD_RECENT: usize = 5;
const HISTORY_PAGE_LIMIT: usize = 50;

#[derive(Deserialize)]
pub struct TextForm {
    text: String,
    #[serde(default)]
    length: Option<String>,
}

#[derive(Deserialize)]
pub struct UrlForm {
    url: String,
    #[serde(default)]
    length: Option<String>,
}

fn require_user(state: &AppState, jar: &CookieJar) -> Result<String, Redirect> {
    current_user(state, jar).ok_or_else(|| Redirect::to("/"))
}

pub async fn dashboard(State(state): State<AppState>, jar: CookieJar) -> Html<String> {
    let Some(user) = current_user(&state, &jar) else {
        return Html(render_login_page(None));
    };

    let recent = load_history(&state, &user, DASHBOARD_RECENT).await;
    let body = format!(
        r#"        <section class="panel">
            <h2>Summarize</h2>
            <p class="note">Paste text, point at a web page, or upload a .txt, .pdf or .docx file. Batch mode accepts up to {max_batch} files at once.</p>
            <p><a href="/text">Text</a> · <a href="/url">URL</a> · <a href="/upload">Single file</a> · <a href="/batch">Batch</a></p>
        </section>
        <section class="panel">
            <h2>Recent summaries</h2>
{history}
        </section>
"#,
        max_batch = state.service().max_batch_files(),
        history = render_history_table(&recent),
    );

    Html(render_page(PageLayout {
        meta_title: "Document Summarizer",
        page_heading: "Document Summarizer",
        username: &user,
        body_html: body,
    }))
}

pub async fn text_page(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Html<String>, Redirect> {
    let user = require_user(&state, &jar)?;
    Ok(text_view(&user, "", LengthClass::default(), None))
}

pub async fn submit_text(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<TextForm>,
) -> Result<Html<String>, Redirect> {
    let user = require_user(&state, &jar)?;

    let (length, panel) = match LengthClass::parse_or_default(form.length.as_deref()) {
        Ok(length) => {
            let request = SummaryRequest::text(form.text.clone(), length, &user);
            let result = state.service().summarize_one(request).await;
            (length, render_result_panel(&result))
        }
        Err(err) => (LengthClass::default(), render_error_panel(&err.user_message())),
    };
    Ok(text_view(&user, &form.text, length, Some(panel)))
}

pub async fn url_page(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Html<String>, Redirect> {
    let user = require_user(&state, &jar)?;
    Ok(url_view(&user, "", LengthClass::default(), None))
}

pub async fn submit_url(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<UrlForm>,
) -> Result<Html<String>, Redirect> {
    let user = require_user(&state, &jar)?;

    let (length, panel) = match LengthClass::parse_or_default(form.length.as_deref()) {
        Ok(length) => {
            let request = SummaryRequest::url(form.url.clone(), length, &user);
            let result = state.service().summarize_one(request).await;
            (length, render_result_panel(&result))
        }
        Err(err) => (LengthClass::default(), render_error_panel(&err.user_message())),
    };
    Ok(url_view(&user, &form.url, length, Some(panel)))
}

pub async fn upload_page(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Html<String>, Redirect> {
    let user = require_user(&state, &jar)?;
    Ok(upload_view(&user, false, state.service().max_batch_files(), None))
}

pub async fn submit_upload(
    State(state): State<AppState>,
    jar: CookieJar,
    multipart: Multipart,
) -> Result<Response, Redirect> {
    let user = require_user(&state, &jar)?;
    let max_batch = state.service().max_batch_files();

    let mut form =
        match read_upload_form(multipart, &[FileFieldConfig::new("file", ALLOWED_EXTENSIONS, 1)])
            .await
        {
            Ok(form) => form,
            Err(err) => {
                let panel = render_error_panel(err.message());
                return Ok((err.status(), upload_view(&user, false, max_batch, Some(panel)))
                    .into_response());
            }
        };

    let panel = match single_file_request(&mut form, &user) {
        Ok(request) => render_result_panel(&state.service().summarize_one(request).await),
        Err(err) => render_error_panel(&err.user_message()),
    };
    Ok(upload_view(&user, false, max_batch, Some(panel)).into_response())
}

pub async fn batch_page(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Html<String>, Redirect> {
    let user = require_user(&state, &jar)?;
    Ok(upload_view(&user, true, state.service().max_batch_files(), None))
}

pub async fn submit_batch(
    State(state): State<AppState>,
    jar: CookieJar,
    multipart: Multipart,
) -> Result<Response, Redirect> {
    let user = require_user(&state, &jar)?;
    let max_batch = state.service().max_batch_files();

    let field = FileFieldConfig::new("files", &[], batch_field_cap(max_batch)).with_min_files(0);
    let mut form = match read_upload_form(multipart, &[field]).await {
        Ok(form) => form,
        Err(err) => {
            let panel = render_error_panel(err.message());
            return Ok(
                (err.status(), upload_view(&user, true, max_batch, Some(panel))).into_response(),
            );
        }
    };

    let requests = LengthClass::parse_or_default(form.first_text("length"))
        .map(|length| batch_requests(form.take_files("files"), length, &user));

    let panel = match requests {
        Ok(requests) => match state.service().summarize_batch(requests, &user).await {
            Ok(batch) => render_batch_panel(&batch),
            Err(err) => render_error_panel(&err.user_message()),
        },
        Err(err) => render_error_panel(&err.user_message()),
    };
    Ok(upload_view(&user, true, max_batch, Some(panel)).into_response())
}

pub async fn history_page(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Html<String>, Redirect> {
    let user = require_user(&state, &jar)?;
    let entries = load_history(&state, &user, HISTORY_PAGE_LIMIT).await;

    let body = format!(
        r#"        <section class="panel">
            <h2>Your summaries</h2>
{table}
        </section>
"#,
        table = render_history_table(&entries),
    );
    Ok(Html(render_page(PageLayout {
        meta_title: "History",
        page_heading: "History",
        username: &user,
        body_html: body,
    })))
}

fn single_file_request(form: &mut UploadOutcome, user: &str) -> SummarizerResult<SummaryRequest> {
    let length = LengthClass::parse_or_default(form.first_text("length"))?;
    let file = form
        .take_files("file")
        .pop()
        .ok_or_else(|| SummarizerError::validation("Choose a file to upload."))?;
    file_request(file, length, user)
}

async fn load_history(state: &AppState, user: &str, limit: usize) -> Vec<HistoryEntry> {
    match state.history().recent(user, limit).await {
        Ok(entries) => entries,
        Err(err) => {
            error!(?err, user_id = user, "failed to load history entries");
            Vec::new()
        }
    }
}

fn text_view(user: &str, text: &str, length: LengthClass, panel: Option<String>) -> Html<String> {
    let body = format!(
        r#"        <section class="panel">
            <h2>Summarize text</h2>
            <form method="post" action="/text">
                <label for="text">Text</label>
                <textarea id="text" name="text" required>{text}</textarea>
                {length_select}
                <button type="submit">Summarize</button>
            </form>
            {panel}
        </section>
"#,
        text = escape_html(text),
        length_select = render_length_select(length),
        panel = panel.unwrap_or_default(),
    );
    Html(render_page(PageLayout {
        meta_title: "Summarize text",
        page_heading: "Summarize text",
        username: user,
        body_html: body,
    }))
}

fn url_view(user: &str, url: &str, length: LengthClass, panel: Option<String>) -> Html<String> {
    let body = format!(
        r#"        <section class="panel">
            <h2>Summarize a web page</h2>
            <form method="post" action="/url">
                <label for="url">URL</label>
                <input id="url" type="url" name="url" placeholder="https://" value="{url}" required>
                {length_select}
                <button type="submit">Summarize</button>
            </form>
            {panel}
        </section>
"#,
        url = escape_html(url),
        length_select = render_length_select(length),
        panel = panel.unwrap_or_default(),
    );
    Html(render_page(PageLayout {
        meta_title: "Summarize a web page",
        page_heading: "Summarize a web page",
        username: user,
        body_html: body,
    }))
}

fn upload_view(user: &str, batch: bool, max_batch: usize, panel: Option<String>) -> Html<String> {
    let (heading, action, input) = if batch {
        (
            "Batch summarize",
            "/batch",
            r#"<input id="files" type="file" name="files" accept=".txt,.pdf,.docx" multiple required>"#,
        )
    } else {
        (
            "Summarize a file",
            "/upload",
            r#"<input id="files" type="file" name="file" accept=".txt,.pdf,.docx" required>"#,
        )
    };
    let note = if batch {
        format!("Up to {max_batch} files; each file is summarized on its own and failures do not stop the rest.")
    } else {
        "Supported formats: .txt, .pdf, .docx.".to_string()
    };

    let body = format!(
        r#"        <section class="panel">
            <h2>{heading}</h2>
            <p class="note">{note}</p>
            <form method="post" action="{action}" enctype="multipart/form-data">
                <label for="files">Files</label>
                {input}
                {length_select}
                <button type="submit">Summarize</button>
            </form>
            {panel}
        </section>
"#,
        length_select = render_length_select(LengthClass::default()),
        panel = panel.unwrap_or_default(),
    );
    Html(render_page(PageLayout {
        meta_title: heading,
        page_heading: heading,
        username: user,
        body_html: body,
    }))
}

fn render_length_select(selected: LengthClass) -> String {
    let options = LengthClass::ALL
        .iter()
        .map(|class| {
            let marker = if *class == selected { " selected" } else { "" };
            format!(
                r#"<option value="{value}"{marker}>{label}</option>"#,
                value = class.as_str(),
                label = class.label(),
            )
        })
        .collect::<String>();
    format!(r#"<label for="length">Summary length</label><select id="length" name="length">{options}</select>"#)
}

fn render_error_panel(message: &str) -> String {
    format!(
        r#"<div class="status-box error">{}</div>"#,
        escape_html(message)
    )
}

fn render_result_panel(result: &SummaryResult) -> String {
    match result.summary_text() {
        Some(summary) if result.is_success() => format!(
            r#"<div class="status-box success"><strong>{length} summary of {source}</strong>
{summary}</div>"#,
            length = result.length_class().label(),
            source = escape_html(result.original_identifier()),
            summary = escape_html(summary),
        ),
        _ => render_error_panel(result.error_detail().unwrap_or("Summarization failed.")),
    }
}

fn render_batch_panel(batch: &BatchResult) -> String {
    let rows = batch
        .items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let outcome = if item.is_success() {
                escape_html(item.summary_text().unwrap_or_default())
            } else {
                escape_html(item.error_detail().unwrap_or_default())
            };
            format!(
                r#"<tr><td>{index}</td><td>{name}</td><td><span class="status-tag {status}">{status}</span></td><td>{outcome}</td></tr>"#,
                index = idx + 1,
                name = escape_html(item.original_identifier()),
                status = item.status().as_str(),
            )
        })
        .collect::<String>();

    format!(
        r#"<div class="status-box">{ok} of {total} files summarized, {failed} failed.</div>
<table><thead><tr><th>#</th><th>File</th><th>Status</th><th>Summary</th></tr></thead><tbody>{rows}</tbody></table>"#,
        ok = batch.successful_count,
        total = batch.total,
        failed = batch.failed_count,
    )
}

fn render_history_table(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return r#"<p class="note">No summaries yet.</p>"#.to_string();
    }

    let rows = entries
        .iter()
        .map(|entry| {
            let result = &entry.result;
            let text = result
                .summary_text()
                .or(result.error_detail())
                .unwrap_or_default();
            format!(
                r#"<tr><td>{created}</td><td>{kind}</td><td>{source}</td><td>{length}</td><td><span class="status-tag {status}">{status}</span></td><td>{text}</td></tr>"#,
                created = result.created_at().format("%Y-%m-%d %H:%M UTC"),
                kind = result.source_label(),
                source = escape_html(result.original_identifier()),
                length = result.length_class(),
                status = result.status().as_str(),
                text = escape_html(text),
            )
        })
        .collect::<String>();

    format!(
        r#"<table><thead><tr><th>When</th><th>Type</th><th>Source</th><th>Length</th><th>Status</th><th>Summary</th></tr></thead><tbody>{rows}</tbody></table>"#
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use tower::ServiceExt;

    use super::super::HistoryPolicy;
    use super::*;
    use crate::{
        accounts::InMemoryAccountStore,
        config::AppConfig,
        test_support::{FakeCompletion, service_with},
        web::{auth::SESSION_COOKIE, router::build_router},
    };

    fn signed_in_app(completion: FakeCompletion) -> (Router, String) {
        let harness = service_with(completion, HistoryPolicy::default());
        let state = AppState::from_parts(
            AppConfig::for_tests(),
            harness.service.clone(),
            harness.history.clone(),
            Arc::new(InMemoryAccountStore::new()),
        );
        let token = state.tokens().issue("alice").expect("token").access_token;
        (build_router(state), format!("{SESSION_COOKIE}={token}"))
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf8")
    }

    #[tokio::test]
    async fn signed_out_root_shows_login_and_tools_redirect() {
        let (router, _) = signed_in_app(FakeCompletion::ok("s"));

        let root = router
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(root.status(), StatusCode::OK);
        assert!(body_text(root).await.contains(r#"action="/login""#));

        let tool = router
            .oneshot(Request::get("/text").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(tool.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn text_form_renders_summary_inline() {
        let (router, cookie) = signed_in_app(FakeCompletion::ok("Foxes <3 dogs."));
        let response = router
            .oneshot(
                Request::post("/text")
                    .header(header::COOKIE, cookie)
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("text=The+quick+brown+fox.&length=short"))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Foxes &lt;3 dogs."));
        assert!(html.contains(r#"<option value="short" selected>"#));
    }

    #[tokio::test]
    async fn failures_render_in_the_result_panel() {
        let (router, cookie) = signed_in_app(FakeCompletion::unavailable());
        let response = router
            .oneshot(
                Request::post("/text")
                    .header(header::COOKIE, cookie)
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("text=hello"))
                    .expect("request"),
            )
            .await
            .expect("response");

        let html = body_text(response).await;
        assert!(html.contains("status-box error"));
        assert!(html.contains("temporarily unavailable"));
    }

    #[test]
    fn batch_panel_lists_items_in_order() {
        let ok = SummaryRequest::text("a", LengthClass::Short, "alice");
        let batch = BatchResult::from_items(vec![
            SummaryResult::succeeded(&ok, "first".to_string()),
            SummaryResult::failed(&ok, &SummarizerError::FileProcessing("bad".to_string())),
        ]);
        let html = render_batch_panel(&batch);
        assert!(html.contains("1 of 2 files summarized, 1 failed."));
        let first = html.find("first").expect("first row");
        let second = html.find("status-tag failed").expect("second row");
        assert!(first < second);
    }
}
