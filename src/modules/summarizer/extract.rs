use std::io::{Cursor, Read};

use anyhow::{Context, Result, anyhow};
use quick_xml::{Reader as XmlReader, events::Event};
use reqwest::{Client, Url, header::CONTENT_TYPE};
use scraper::Html;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::{
    config::{FetchSettings, LimitSettings},
    error::{SummarizerError, SummarizerResult},
};

use super::types::{ExtractedDocument, SourceKind, SourcePayload};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; doc-summarizer/0.1)";
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Turns uploaded artifacts and URLs into plain text.
///
/// Holds only immutable state: the size limit and an HTTP client for the `url` kind.
#[derive(Clone)]
pub struct Extractor {
    http: Client,
    max_file_bytes: usize,
}

impl Extractor {
    pub fn new(limits: &LimitSettings, fetch: &FetchSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(fetch.timeout)
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(!fetch.verify_tls)
            .build()
            .context("failed to build URL fetch client")?;

        Ok(Self {
            http,
            max_file_bytes: limits.max_file_bytes,
        })
    }

    pub async fn extract(
        &self,
        source_kind: SourceKind,
        payload: &SourcePayload,
        original_identifier: &str,
    ) -> SummarizerResult<ExtractedDocument> {
        let text = match (source_kind, payload) {
            (SourceKind::Text, SourcePayload::Text(text)) => {
                if text.trim().is_empty() {
                    return Err(SummarizerError::validation("Text cannot be empty."));
                }
                text.clone()
            }
            (SourceKind::Text, SourcePayload::Bytes(bytes)) => {
                self.check_size(bytes)?;
                let text = String::from_utf8(bytes.clone()).map_err(|err| {
                    SummarizerError::FileProcessing(format!("text file is not valid UTF-8: {err}"))
                })?;
                if text.trim().is_empty() {
                    return Err(SummarizerError::validation("The uploaded text file is empty."));
                }
                text
            }
            (SourceKind::Pdf, SourcePayload::Bytes(bytes)) => {
                self.check_size(bytes)?;
                let bytes = bytes.clone();
                let text = run_parser("pdf", move || {
                    pdf_extract::extract_text_from_mem(bytes.as_slice())
                        .map_err(|err| anyhow!("failed to extract PDF text: {err}"))
                })
                .await?;
                non_empty_or(text, "no text could be extracted from the PDF")?
            }
            (SourceKind::Docx, SourcePayload::Bytes(bytes)) => {
                self.check_size(bytes)?;
                let bytes = bytes.clone();
                let text = run_parser("docx", move || extract_docx_text(&bytes)).await?;
                non_empty_or(text, "no text could be extracted from the DOCX")?
            }
            (SourceKind::Url, SourcePayload::Url(url)) => self.fetch_url_text(url).await?,
            (kind, payload) => {
                return Err(SummarizerError::Internal(format!(
                    "payload {payload:?} does not match source kind {kind}"
                )));
            }
        };

        info!(
            source_kind = %source_kind,
            identifier = original_identifier,
            chars = text.chars().count(),
            "text extraction completed"
        );

        Ok(ExtractedDocument {
            text,
            source_kind,
            original_identifier: original_identifier.to_string(),
        })
    }

    fn check_size(&self, bytes: &[u8]) -> SummarizerResult<()> {
        if bytes.is_empty() {
            return Err(SummarizerError::validation("The uploaded file is empty."));
        }
        if bytes.len() > self.max_file_bytes {
            return Err(SummarizerError::validation(format!(
                "File size ({:.2} MB) exceeds the maximum limit ({} MB).",
                bytes.len() as f64 / (1024.0 * 1024.0),
                self.max_file_bytes / (1024 * 1024)
            )));
        }
        Ok(())
    }

    async fn fetch_url_text(&self, raw: &str) -> SummarizerResult<String> {
        let url = parse_http_url(raw)?;
        debug!(%url, "fetching URL");

        let mut response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|err| fetch_error(&url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SummarizerError::Fetch(format!("{url} returned status {status}")));
        }

        let is_plain_text = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<mime::Mime>().ok())
            .is_some_and(|mime| mime.type_() == mime::TEXT && mime.subtype() == mime::PLAIN);

        if response
            .content_length()
            .is_some_and(|declared| declared > self.max_file_bytes as u64)
        {
            return Err(self.page_too_large());
        }

        // Chunked or unannounced bodies are capped while streaming.
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|err| fetch_error(&url, err))? {
            if bytes.len() + chunk.len() > self.max_file_bytes {
                return Err(self.page_too_large());
            }
            bytes.extend_from_slice(&chunk);
        }
        let body = String::from_utf8_lossy(&bytes);

        let text = if is_plain_text {
            clean_text(&body)
        } else {
            html_to_text(&body)
        };

        if text.is_empty() {
            return Err(SummarizerError::Fetch(format!(
                "no text could be extracted from {url}"
            )));
        }

        Ok(text)
    }

    fn page_too_large(&self) -> SummarizerError {
        SummarizerError::validation(format!(
            "The page at this URL is larger than the {} MB limit.",
            self.max_file_bytes / (1024 * 1024)
        ))
    }
}

fn parse_http_url(raw: &str) -> SummarizerResult<Url> {
    let invalid =
        || SummarizerError::validation("Please enter a valid URL starting with http:// or https://.");

    let url = Url::parse(raw.trim()).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(invalid());
    }
    Ok(url)
}

fn fetch_error(url: &Url, err: reqwest::Error) -> SummarizerError {
    if err.is_timeout() {
        warn!(%url, "URL fetch timed out");
        SummarizerError::Fetch(format!("timed out fetching {url}"))
    } else if is_certificate_error(&err) {
        warn!(%url, ?err, "TLS certificate verification failed");
        SummarizerError::Certificate(format!("{url}: {}", error_chain(&err)))
    } else {
        warn!(%url, ?err, "URL fetch failed");
        SummarizerError::Fetch(format!("failed to fetch {url}: {err}"))
    }
}

fn is_certificate_error(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(error) = current {
        if error.to_string().to_ascii_lowercase().contains("certificate") {
            return true;
        }
        current = error.source();
    }
    false
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut current = err.source();
    while let Some(error) = current {
        parts.push(error.to_string());
        current = error.source();
    }
    parts.join(": ")
}

fn non_empty_or(text: String, detail: &str) -> SummarizerResult<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(SummarizerError::FileProcessing(detail.to_string()))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Run a document parser on the blocking pool. Parser errors and panics both surface as
/// file-processing failures.
async fn run_parser<F>(format: &'static str, job: F) -> SummarizerResult<String>
where
    F: FnOnce() -> Result<String> + Send + 'static,
{
    match tokio::task::spawn_blocking(job).await {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(err)) => Err(SummarizerError::FileProcessing(format!("{err:#}"))),
        Err(join_err) => Err(SummarizerError::FileProcessing(format!(
            "{format} parser aborted: {join_err}"
        ))),
    }
}

fn extract_docx_text(bytes: &[u8]) -> Result<String> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).context("failed to open DOCX archive")?;

    let mut document = archive
        .by_name("word/document.xml")
        .context("missing word/document.xml in DOCX archive")?;

    let mut xml = String::new();
    document
        .read_to_string(&mut xml)
        .context("failed to read DOCX XML")?;

    let mut reader = XmlReader::from_str(&xml);
    let mut buf = Vec::new();
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text_node = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"w:p" => current.clear(),
                b"w:tab" => current.push('\t'),
                b"w:br" => current.push('\n'),
                b"w:t" => in_text_node = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"w:tab" => current.push('\t'),
                b"w:br" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text_node {
                    let value = e.unescape().map_err(|err| anyhow!(err))?;
                    current.push_str(&value);
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"w:t" => in_text_node = false,
                b"w:p" => {
                    if !current.trim().is_empty() {
                        paragraphs.push(std::mem::take(&mut current));
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => return Err(anyhow!("failed to parse DOCX XML: {}", err)),
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs.join("\n"))
}

/// Collect the visible text of an HTML document.
pub(crate) fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|element| HIDDEN_ELEMENTS.contains(&element.name()))
        });
        if hidden {
            continue;
        }
        raw.push_str(text);
        raw.push('\n');
    }

    clean_text(&raw)
}

/// Trim every line, break on runs of double spaces, and drop empty fragments.
fn clean_text(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .flat_map(|line| line.split("  "))
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}


#[cfg(test)]
mod tests {
    use std::{fmt, io};

    use axum::{Router, http::StatusCode, response::Html as HtmlResponse, routing::get};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;
    use crate::test_support::{closed_local_url, spawn_server};

    fn extractor() -> Extractor {
        Extractor::new(&LimitSettings::default(), &FetchSettings::default()).expect("extractor")
    }

    fn small_extractor() -> Extractor {
        let limits = LimitSettings {
            max_file_bytes: 16,
            max_batch_files: 10,
        };
        Extractor::new(&limits, &FetchSettings::default()).expect("extractor")
    }

    /// Serves one chunked `text/plain` response with no Content-Length header.
    async fn spawn_chunked_server(chunk: &'static [u8], repeats: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;

            let mut response = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
            for _ in 0..repeats {
                response.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
                response.extend_from_slice(chunk);
                response.extend_from_slice(b"\r\n");
            }
            response.extend_from_slice(b"0\r\n\r\n");
            let _ = socket.write_all(&response).await;
        });
        format!("http://{addr}/stream")
    }

    #[tokio::test]
    async fn plain_text_is_returned_verbatim() {
        let input = "The quick brown fox jumps over the lazy dog. It was a sunny day.";
        let doc = extractor()
            .extract(SourceKind::Text, &SourcePayload::Text(input.to_string()), "input")
            .await
            .expect("text extraction");
        assert_eq!(doc.text, input);
        assert_eq!(doc.source_kind, SourceKind::Text);
    }

    #[tokio::test]
    async fn whitespace_text_is_a_validation_error() {
        let err = extractor()
            .extract(SourceKind::Text, &SourcePayload::Text(" \n\t ".to_string()), "input")
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizerError::Validation(_)));
    }

    #[tokio::test]
    async fn non_utf8_text_file_fails_processing() {
        let err = extractor()
            .extract(SourceKind::Text, &SourcePayload::Bytes(vec![0xff, 0xfe, 0x00]), "a.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizerError::FileProcessing(_)));
    }

    #[tokio::test]
    async fn oversized_file_is_a_validation_error() {
        let err = small_extractor()
            .extract(SourceKind::Pdf, &SourcePayload::Bytes(vec![b'%'; 17]), "big.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizerError::Validation(_)));
        assert!(err.user_message().contains("exceeds"));
    }

    #[tokio::test]
    async fn garbage_pdf_fails_processing() {
        let err = extractor()
            .extract(
                SourceKind::Pdf,
                &SourcePayload::Bytes(b"this is not a pdf at all".to_vec()),
                "broken.pdf",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizerError::FileProcessing(_)));
    }

    #[tokio::test]
    async fn well_formed_pdf_yields_text() {
        let doc = extractor()
            .extract(
                SourceKind::Pdf,
                &SourcePayload::Bytes(fixtures::pdf_bytes("Hello from PDF")),
                "hello.pdf",
            )
            .await
            .expect("pdf extraction");
        assert!(doc.text.contains("Hello"));
    }

    #[tokio::test]
    async fn docx_paragraphs_are_joined_in_order() {
        let bytes = fixtures::docx_bytes(&["First paragraph.", "", "Second paragraph."]);
        let doc = extractor()
            .extract(SourceKind::Docx, &SourcePayload::Bytes(bytes), "doc.docx")
            .await
            .expect("docx extraction");
        assert_eq!(doc.text, "First paragraph.\nSecond paragraph.");
    }

    #[tokio::test]
    async fn repeated_docx_extraction_is_byte_identical() {
        let payload = SourcePayload::Bytes(fixtures::docx_bytes(&["Stable", "output"]));
        let extractor = extractor();
        let first = extractor
            .extract(SourceKind::Docx, &payload, "doc.docx")
            .await
            .expect("first");
        let second = extractor
            .extract(SourceKind::Docx, &payload, "doc.docx")
            .await
            .expect("second");
        assert_eq!(first.text.as_bytes(), second.text.as_bytes());
    }

    #[tokio::test]
    async fn repeated_text_and_pdf_extraction_is_byte_identical() {
        let extractor = extractor();
        let cases = [
            (
                SourceKind::Text,
                SourcePayload::Text("Line one.\nLine two.".to_string()),
            ),
            (
                SourceKind::Text,
                SourcePayload::Bytes(b"Uploaded notes.".to_vec()),
            ),
            (
                SourceKind::Pdf,
                SourcePayload::Bytes(fixtures::pdf_bytes("Deterministic output")),
            ),
        ];

        for (kind, payload) in cases {
            let first = extractor.extract(kind, &payload, "input").await.expect("first");
            let second = extractor.extract(kind, &payload, "input").await.expect("second");
            assert_eq!(first.text.as_bytes(), second.text.as_bytes(), "{kind}");
        }
    }

    #[tokio::test]
    async fn zip_without_document_xml_fails_processing() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("readme.txt", SimpleFileOptions::default())
            .expect("start file");
        zip.write_all(b"not a word document").expect("write");
        let bytes = zip.finish().expect("finish").into_inner();

        let err = extractor()
            .extract(SourceKind::Docx, &SourcePayload::Bytes(bytes), "fake.docx")
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizerError::FileProcessing(_)));
    }

    #[test]
    fn html_text_skips_scripts_and_styles() {
        let html = r#"<html><head><style>body { color: red; }</style>
            <script>var secret = 1;</script></head>
            <body><h1>Title</h1><p>First   line.</p><noscript>enable js</noscript><p>Second</p></body></html>"#;
        let text = html_to_text(html);
        assert_eq!(text, "Title\nFirst\nline.\nSecond");
    }

    #[tokio::test]
    async fn malformed_urls_are_validation_errors() {
        let extractor = extractor();
        for raw in ["not a url", "ftp://example.com/file", "http://"] {
            let err = extractor
                .extract(SourceKind::Url, &SourcePayload::Url(raw.to_string()), raw)
                .await
                .unwrap_err();
            assert!(matches!(err, SummarizerError::Validation(_)), "{raw}");
        }
    }

    #[tokio::test]
    async fn unreachable_host_is_a_fetch_error() {
        let url = closed_local_url().await;
        let err = extractor()
            .extract(SourceKind::Url, &SourcePayload::Url(url.clone()), &url)
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizerError::Fetch(_)));
    }

    #[tokio::test]
    async fn fetched_html_is_reduced_to_visible_text() {
        let app = Router::new()
            .route(
                "/article",
                get(|| async {
                    HtmlResponse("<html><body><script>x()</script><p>Rust is fast.</p></body></html>")
                }),
            )
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }));
        let addr = spawn_server(app).await;
        let extractor = extractor();

        let url = format!("http://{addr}/article");
        let doc = extractor
            .extract(SourceKind::Url, &SourcePayload::Url(url.clone()), &url)
            .await
            .expect("fetch article");
        assert_eq!(doc.text, "Rust is fast.");
        assert_eq!(doc.original_identifier, url);

        let missing = format!("http://{addr}/missing");
        let err = extractor
            .extract(SourceKind::Url, &SourcePayload::Url(missing.clone()), &missing)
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizerError::Fetch(_)));
    }

    #[tokio::test]
    async fn page_with_a_large_declared_length_is_rejected() {
        let app = Router::new().route("/big", get(|| async { "x".repeat(64) }));
        let addr = spawn_server(app).await;

        let url = format!("http://{addr}/big");
        let err = small_extractor()
            .extract(SourceKind::Url, &SourcePayload::Url(url.clone()), &url)
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizerError::Validation(_)));
        assert!(err.user_message().contains("larger than"));
    }

    #[tokio::test]
    async fn chunked_page_is_cut_off_at_the_size_limit() {
        let url = spawn_chunked_server(b"0123456789", 5).await;
        let err = small_extractor()
            .extract(SourceKind::Url, &SourcePayload::Url(url.clone()), &url)
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizerError::Validation(_)));
    }

    #[tokio::test]
    async fn chunked_page_under_the_limit_is_read_in_full() {
        let url = spawn_chunked_server(b"abc ", 3).await;
        let doc = small_extractor()
            .extract(SourceKind::Url, &SourcePayload::Url(url.clone()), &url)
            .await
            .expect("chunked fetch");
        assert_eq!(doc.text, "abc abc abc");
    }

    #[derive(Debug)]
    struct RequestFailed(io::Error);

    impl fmt::Display for RequestFailed {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("error sending request")
        }
    }

    impl std::error::Error for RequestFailed {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn certificate_failures_are_found_in_the_error_chain() {
        let tls = RequestFailed(io::Error::other(
            "certificate verify failed: self signed certificate",
        ));
        assert!(is_certificate_error(&tls));
        assert!(error_chain(&tls).ends_with("self signed certificate"));

        let refused = RequestFailed(io::Error::other("connection refused"));
        assert!(!is_certificate_error(&refused));
    }
}
