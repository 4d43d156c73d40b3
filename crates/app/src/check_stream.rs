use std::{sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use hns_scout_core::{CheckResult, Normalizer, PartitionCalendar, Token};
use hns_scout_lookup::MarketplaceClient;
use hns_scout_storage::{PartitionStore, RecordOutcome, StoreError};

use crate::pacing::PacingPolicy;

/// Results buffered between the worker and the response body.
const STREAM_BUFFER: usize = 4;

/// Lifecycle of one check stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    NotStarted,
    Streaming,
    ClientDisconnected,
    Completed,
}

impl StreamPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Streaming => "streaming",
            Self::ClientDisconnected => "client_disconnected",
            Self::Completed => "completed",
        }
    }
}

/// What a finished stream did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub phase: StreamPhase,
    pub tokens: usize,
    pub emitted: usize,
    pub available: usize,
    pub persist_failures: usize,
}

impl StreamSummary {
    fn new(tokens: usize) -> Self {
        Self {
            phase: StreamPhase::NotStarted,
            tokens,
            emitted: 0,
            available: 0,
            persist_failures: 0,
        }
    }
}

/// Drives lookups for a batch of names and pushes one result per name to the caller.
#[derive(Clone)]
pub struct StreamController {
    lookup: MarketplaceClient,
    store: PartitionStore,
    pacing: PacingPolicy,
    calendar: PartitionCalendar,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl StreamController {
    pub fn new(
        lookup: MarketplaceClient,
        store: PartitionStore,
        pacing: PacingPolicy,
        calendar: PartitionCalendar,
    ) -> Self {
        Self {
            lookup,
            store,
            pacing,
            calendar,
            clock: Arc::new(Utc::now),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    /// Starts a worker for `raw_text` and returns the receiving end of its results.
    ///
    /// Dropping the receiver is how the caller disconnects.
    pub fn spawn(&self, raw_text: &str, title: Option<String>) -> mpsc::Receiver<CheckResult> {
        let tokens = Normalizer::normalize(raw_text);
        let (sender, receiver) = mpsc::channel(STREAM_BUFFER);
        let controller = self.clone();
        tokio::spawn(async move {
            controller.run(tokens, title.as_deref(), sender).await;
        });
        receiver
    }

    /// Processes tokens strictly in order.
    ///
    /// The caller is checked once per token, after pacing and before the lookup.
    /// A lookup already in flight when the caller leaves is allowed to finish.
    pub async fn run(
        &self,
        tokens: Vec<Token>,
        title: Option<&str>,
        sink: mpsc::Sender<CheckResult>,
    ) -> StreamSummary {
        let mut summary = StreamSummary::new(tokens.len());
        histogram!("check_stream_tokens").record(tokens.len() as f64);
        let pacer = self.pacing.pacer();
        summary.phase = StreamPhase::Streaming;

        for token in &tokens {
            pacer.ready().await;
            if sink.is_closed() {
                summary.phase = StreamPhase::ClientDisconnected;
                break;
            }

            if token.is_converted() {
                debug!(stage = "stream", name = token.original(), lookup = token.lookup(), "using ascii form for lookup");
            }
            let started = Instant::now();
            let state = self.lookup.check(token.lookup()).await;
            histogram!("lookup_latency_seconds").record(started.elapsed().as_secs_f64());
            counter!("lookup_requests_total", "state" => state.metric_label()).increment(1);

            if state.is_available() {
                summary.available += 1;
                // Best effort: a failed write never changes the reported result.
                if let Err(err) = self.persist(token, title).await {
                    summary.persist_failures += 1;
                    warn!(stage = "storage", name = token.original(), error = %err, "failed to persist available domain");
                }
            }

            if sink
                .send(CheckResult::new(token.original(), state))
                .await
                .is_err()
            {
                summary.phase = StreamPhase::ClientDisconnected;
                break;
            }
            summary.emitted += 1;
        }

        if summary.phase == StreamPhase::Streaming {
            summary.phase = StreamPhase::Completed;
        }

        counter!("check_streams_total", "phase" => summary.phase.as_str()).increment(1);
        info!(
            stage = "stream",
            phase = summary.phase.as_str(),
            tokens = summary.tokens,
            emitted = summary.emitted,
            available = summary.available,
            persist_failures = summary.persist_failures,
            "check stream finished"
        );
        summary
    }

    async fn persist(&self, token: &Token, title: Option<&str>) -> Result<RecordOutcome, StoreError> {
        let key = self.calendar.key_at((self.clock)());
        let outcome = self
            .store
            .record(&key, title, token.original())
            .await
            .inspect_err(|_| {
                counter!("store_writes_total", "outcome" => "error").increment(1);
            })?;
        counter!("store_writes_total", "outcome" => outcome.as_str()).increment(1);
        Ok(outcome)
    }
}
