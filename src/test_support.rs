use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use axum::Router;
use tokio::net::TcpListener;

use crate::{
    audit::{AuditEvent, AuditSink, AuditStatus},
    config::AppConfig,
    error::{SummarizerError, SummarizerResult},
    history::InMemoryHistoryStore,
    llm::LlmError,
    modules::summarizer::{
        CompletionClient, Extractor, GenerationParams, HistoryPolicy, SummarizationService,
    },
};

pub async fn spawn_server(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

/// URL of a loopback port that was bound and released, so connections are refused.
pub async fn closed_local_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}

enum Reply {
    Summary(String),
    Unavailable,
    ContextOverflow,
}

/// Deterministic completion client that records every call.
pub struct FakeCompletion {
    reply: Reply,
    calls: Mutex<Vec<(String, GenerationParams)>>,
}

impl FakeCompletion {
    pub fn ok(summary: &str) -> Self {
        Self {
            reply: Reply::Summary(summary.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            reply: Reply::Unavailable,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fails the way the provider client does when the input exceeds the context window.
    pub fn context_overflow() -> Self {
        Self {
            reply: Reply::ContextOverflow,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, GenerationParams)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for FakeCompletion {
    async fn complete(&self, text: &str, params: GenerationParams) -> SummarizerResult<String> {
        self.calls.lock().unwrap().push((text.to_string(), params));
        match &self.reply {
            Reply::Summary(summary) => Ok(summary.clone()),
            Reply::Unavailable => Err(SummarizerError::ServiceUnavailable(
                "upstream returned 503".to_string(),
            )),
            Reply::ContextOverflow => Err(LlmError::ContextLengthExceeded(
                "maximum context length is 8192 tokens".to_string(),
            )
            .into()),
        }
    }
}

#[derive(Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditSink {
    pub fn events_for(&self, action: &str) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.action == action)
            .cloned()
            .collect()
    }

    pub fn statuses(&self, action: &str) -> Vec<AuditStatus> {
        self.events_for(action)
            .into_iter()
            .map(|event| event.status)
            .collect()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn emit(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct ServiceHarness {
    pub service: SummarizationService,
    pub completion: Arc<FakeCompletion>,
    pub history: Arc<InMemoryHistoryStore>,
    pub audit: Arc<RecordingAuditSink>,
}

pub fn service_with(completion: FakeCompletion, policy: HistoryPolicy) -> ServiceHarness {
    let config = AppConfig::for_tests();
    let completion = Arc::new(completion);
    let history = Arc::new(InMemoryHistoryStore::new());
    let audit = Arc::new(RecordingAuditSink::default());
    let extractor = Extractor::new(&config.limits, &config.fetch).expect("extractor");

    let service = SummarizationService::new(
        extractor,
        completion.clone(),
        history.clone(),
        audit.clone(),
        policy,
        config.limits.max_batch_files,
    );

    ServiceHarness {
        service,
        completion,
        history,
        audit,
    }
}
