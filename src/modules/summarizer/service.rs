use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::{
    audit::{AuditEvent, AuditSink, AuditStatus},
    error::{SummarizerError, SummarizerResult},
    history::HistoryStore,
};

use super::{
    completion::CompletionClient,
    extract::Extractor,
    length::resolve,
    types::{BatchResult, SourceKind, SummaryRequest, SummaryResult},
};

const ACTION_SUMMARIZE: &str = "summarize";
const ACTION_BATCH: &str = "batch_summarization";
const ACTION_BATCH_ITEM: &str = "batch_item_processed";

/// Which single-item outcomes are written to history. Batch items are always written.
#[derive(Clone, Copy, Debug, Default)]
pub struct HistoryPolicy {
    pub record_failed_single: bool,
}

/// Progress of one item through the pipeline. `Completed` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemStage {
    Received,
    Extracting,
    Extracted,
    Summarizing,
    Completed,
    Failed,
}

impl ItemStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStage::Received => "received",
            ItemStage::Extracting => "extracting",
            ItemStage::Extracted => "extracted",
            ItemStage::Summarizing => "summarizing",
            ItemStage::Completed => "completed",
            ItemStage::Failed => "failed",
        }
    }
}

struct ItemOutcome {
    result: SummaryResult,
    failure: Option<ItemFailure>,
}

struct ItemFailure {
    /// Stage that was running when the error surfaced.
    stage: ItemStage,
    error: SummarizerError,
}

#[derive(Clone)]
pub struct SummarizationService {
    extractor: Extractor,
    completion: Arc<dyn CompletionClient>,
    history: Arc<dyn HistoryStore>,
    audit: Arc<dyn AuditSink>,
    policy: HistoryPolicy,
    max_batch_files: usize,
}

impl SummarizationService {
    pub fn new(
        extractor: Extractor,
        completion: Arc<dyn CompletionClient>,
        history: Arc<dyn HistoryStore>,
        audit: Arc<dyn AuditSink>,
        policy: HistoryPolicy,
        max_batch_files: usize,
    ) -> Self {
        Self {
            extractor,
            completion,
            history,
            audit,
            policy,
            max_batch_files,
        }
    }

    pub fn max_batch_files(&self) -> usize {
        self.max_batch_files
    }

    /// Summarize one input. Never fails: errors come back as a failed [`SummaryResult`].
    pub async fn summarize_one(&self, request: SummaryRequest) -> SummaryResult {
        let user_id = request.user_id().to_string();
        self.audit
            .emit(
                AuditEvent::new(&user_id, ACTION_SUMMARIZE, AuditStatus::Started)
                    .detail("source_type", request.source_label())
                    .detail("identifier", request.original_identifier())
                    .detail("summary_length", request.length_class().as_str())
                    .detail("payload_bytes", request.payload().len()),
            )
            .await;

        let outcome = self.process(&request).await;

        let event = match &outcome.failure {
            None => AuditEvent::new(&user_id, ACTION_SUMMARIZE, AuditStatus::Success).detail(
                "summary_chars",
                outcome
                    .result
                    .summary_text()
                    .map(|text| text.chars().count())
                    .unwrap_or_default(),
            ),
            Some(ItemFailure { stage, error: err }) => {
                error!(
                    user_id = %user_id,
                    identifier = request.original_identifier(),
                    stage = stage.as_str(),
                    error = %err,
                    "summarization failed"
                );
                AuditEvent::new(&user_id, ACTION_SUMMARIZE, AuditStatus::Failed)
                    .detail("stage", stage.as_str())
                    .detail("error_code", err.code().as_str())
                    .with_error(err.to_string())
            }
        };
        self.audit
            .emit(
                event
                    .detail("source_type", request.source_label())
                    .detail("identifier", request.original_identifier()),
            )
            .await;

        if outcome.result.is_success() || self.policy.record_failed_single {
            self.record(&user_id, outcome.result.clone()).await;
        }

        outcome.result
    }

    /// Summarize up to `max_batch_files` inputs one after another, in order.
    ///
    /// The only error is the up-front size check; once it passes every item produces a result.
    pub async fn summarize_batch(
        &self,
        requests: Vec<SummaryRequest>,
        user_id: &str,
    ) -> SummarizerResult<BatchResult> {
        let filenames = requests
            .iter()
            .map(|request| request.original_identifier().to_string())
            .collect::<Vec<_>>();
        let summary_length = requests
            .first()
            .map(|request| request.length_class().as_str())
            .unwrap_or_default();

        self.audit
            .emit(
                AuditEvent::new(user_id, ACTION_BATCH, AuditStatus::Started)
                    .detail("batch_size", requests.len())
                    .detail("summary_length", summary_length)
                    .detail("filenames", filenames),
            )
            .await;

        if let Err(err) = self.check_batch_size(requests.len()) {
            self.audit
                .emit(
                    AuditEvent::new(user_id, ACTION_BATCH, AuditStatus::Failed)
                        .detail("batch_size", requests.len())
                        .with_error(err.user_message()),
                )
                .await;
            return Err(err);
        }

        let total = requests.len();
        let mut items = Vec::with_capacity(total);
        for (index, request) in requests.into_iter().enumerate() {
            info!(
                user_id,
                item = index + 1,
                total,
                identifier = request.original_identifier(),
                "processing batch item"
            );

            let outcome = self.process(&request).await;
            let event = match &outcome.failure {
                None => AuditEvent::new(user_id, ACTION_BATCH_ITEM, AuditStatus::Success).detail(
                    "summary_chars",
                    outcome
                        .result
                        .summary_text()
                        .map(|text| text.chars().count())
                        .unwrap_or_default(),
                ),
                Some(ItemFailure { stage, error: err }) => {
                    AuditEvent::new(user_id, ACTION_BATCH_ITEM, AuditStatus::Failed)
                        .detail("stage", stage.as_str())
                        .detail("error_code", err.code().as_str())
                        .with_error(format!("{err} | user message: {}", err.user_message()))
                }
            };
            self.audit
                .emit(
                    event
                        .detail("batch_index", index)
                        .detail("filename", request.original_identifier()),
                )
                .await;

            self.record(user_id, outcome.result.clone()).await;
            items.push(outcome.result);
        }

        let batch = BatchResult::from_items(items);
        let status = if batch.failed_count == 0 {
            AuditStatus::Success
        } else {
            AuditStatus::PartialSuccess
        };
        self.audit
            .emit(
                AuditEvent::new(user_id, ACTION_BATCH, status)
                    .detail("total_files", batch.total)
                    .detail("successful", batch.successful_count)
                    .detail("failed", batch.failed_count)
                    .detail(
                        "success_rate",
                        format!(
                            "{:.1}%",
                            batch.successful_count as f64 / batch.total as f64 * 100.0
                        ),
                    ),
            )
            .await;

        Ok(batch)
    }

    fn check_batch_size(&self, count: usize) -> SummarizerResult<()> {
        if count == 0 {
            return Err(SummarizerError::validation(
                "Select at least one file to summarize.",
            ));
        }
        if count > self.max_batch_files {
            return Err(SummarizerError::validation(format!(
                "Maximum {} files allowed per batch.",
                self.max_batch_files
            )));
        }
        Ok(())
    }

    async fn process(&self, request: &SummaryRequest) -> ItemOutcome {
        let mut stage = ItemStage::Received;
        let outcome = match self.run_stages(request, &mut stage).await {
            Ok(summary) => {
                stage = ItemStage::Completed;
                ItemOutcome {
                    result: SummaryResult::succeeded(request, summary),
                    failure: None,
                }
            }
            Err(error) => {
                let failed_at = std::mem::replace(&mut stage, ItemStage::Failed);
                ItemOutcome {
                    result: SummaryResult::failed(request, &error),
                    failure: Some(ItemFailure {
                        stage: failed_at,
                        error,
                    }),
                }
            }
        };
        debug!(
            identifier = request.original_identifier(),
            stage = stage.as_str(),
            "item finished"
        );
        outcome
    }

    async fn run_stages(
        &self,
        request: &SummaryRequest,
        stage: &mut ItemStage,
    ) -> SummarizerResult<String> {
        *stage = ItemStage::Extracting;
        let kind = match request.source_kind() {
            Some(kind) => kind,
            None => SourceKind::from_filename(request.original_identifier())?,
        };
        let document = self
            .extractor
            .extract(kind, request.payload(), request.original_identifier())
            .await?;
        *stage = ItemStage::Extracted;
        debug!(
            identifier = %document.original_identifier,
            source_kind = %document.source_kind,
            chars = document.text.len(),
            "document extracted"
        );

        let params = resolve(request.length_class());
        *stage = ItemStage::Summarizing;
        self.completion.complete(&document.text, params).await
    }

    async fn record(&self, user_id: &str, result: SummaryResult) {
        if let Err(err) = self.history.append(user_id, result).await {
            warn!(user_id, error = %format!("{err:#}"), "failed to append history entry");
        }
    }
}
