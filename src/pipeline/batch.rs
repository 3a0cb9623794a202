//! Batch triage over JSONL input.
//!
//! Pipeline flow:
//! Requests (JSONL) → bounded fan-out → Orchestrator per request → Outcomes (JSONL)
//!
//! Each request runs in its own task, spawned once a concurrency permit is
//! free. A failed request becomes an outcome record; it never aborts the batch.

use crate::models::{ErrorKind, Result, RiskLevel, TriageError, UserContext, VerificationDecision};
use crate::pipeline::{RetryPolicy, VerificationOrchestrator};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

/// One line of batch input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageRequest {
    /// Caller-supplied id (generated when absent)
    #[serde(default = "new_request_id")]
    pub id: String,

    /// Applicant context: free text or any JSON value
    pub context: serde_json::Value,
}

fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Why a request produced no decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl From<&TriageError> for FailureRecord {
    fn from(e: &TriageError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
            retryable: e.is_retryable(),
        }
    }
}

/// One line of batch output: exactly one of `decision` or `error` is set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageOutcome {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<VerificationDecision>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureRecord>,

    /// Classifier attempts made (0 when input was rejected up front)
    pub attempts: u32,

    pub decided_at: DateTime<Utc>,
}

impl TriageOutcome {
    fn new(id: String, result: Result<VerificationDecision>, attempts: u32) -> Self {
        let (decision, error) = match result {
            Ok(d) => (Some(d), None),
            Err(e) => (None, Some(FailureRecord::from(&e))),
        };
        Self {
            id,
            decision,
            error,
            attempts,
            decided_at: Utc::now(),
        }
    }
}

/// Batch run statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStats {
    pub total: usize,
    pub decided: usize,
    pub failed: usize,
    pub by_risk: BTreeMap<RiskLevel, usize>,
    pub by_error: BTreeMap<String, usize>,
    pub runtime_secs: f64,
}

/// Runs many independent triage requests with bounded concurrency.
pub struct BatchRunner {
    orchestrator: VerificationOrchestrator,
    retry: RetryPolicy,
    semaphore: Arc<Semaphore>,
    show_progress: bool,
}

impl BatchRunner {
    pub fn new(
        orchestrator: VerificationOrchestrator,
        retry: RetryPolicy,
        concurrency: usize,
    ) -> Self {
        Self {
            orchestrator,
            retry,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            show_progress: false,
        }
    }

    /// Draw a progress bar on stderr while running.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Load requests from a JSONL file.
    pub fn load_requests(path: &Path) -> Result<Vec<TriageRequest>> {
        let file = File::open(path).map_err(|e| TriageError::io("opening requests file", e))?;
        let reader = BufReader::new(file);
        let mut requests = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| TriageError::io("reading requests file", e))?;
            if line.trim().is_empty() {
                continue;
            }
            let request: TriageRequest = serde_json::from_str(&line).map_err(|e| {
                TriageError::InvalidInput(format!("Line {}: {}", line_num + 1, e))
            })?;
            requests.push(request);
        }

        info!(count = requests.len(), "Loaded requests");
        Ok(requests)
    }

    /// Write outcomes as JSONL.
    pub fn write_outcomes(path: &Path, outcomes: &[TriageOutcome]) -> Result<()> {
        let file = File::create(path).map_err(|e| TriageError::io("creating output file", e))?;
        let mut writer = BufWriter::new(file);

        for outcome in outcomes {
            let line = serde_json::to_string(outcome)
                .map_err(|e| TriageError::Internal(format!("serializing outcome: {e}")))?;
            writeln!(writer, "{line}").map_err(|e| TriageError::io("writing output file", e))?;
        }

        writer
            .flush()
            .map_err(|e| TriageError::io("flushing output file", e))
    }

    /// Run every request; outcomes come back in input order.
    pub async fn run(&self, requests: Vec<TriageRequest>) -> (Vec<TriageOutcome>, BatchStats) {
        let start = Instant::now();
        let progress = self.progress_bar(requests.len() as u64);

        let mut handles = Vec::with_capacity(requests.len());
        for request in requests {
            let orchestrator = self.orchestrator.clone();
            let retry = self.retry;
            let progress = progress.clone();

            // At most `concurrency` tasks exist at once.
            let permit = Arc::clone(&self.semaphore).acquire_owned().await;

            let id = request.id.clone();
            let handle = tokio::spawn(async move {
                let outcome = match permit {
                    Ok(_permit) => triage_one(&orchestrator, &retry, request).await,
                    Err(_) => TriageOutcome::new(
                        request.id,
                        Err(TriageError::Internal("Semaphore closed".to_string())),
                        0,
                    ),
                };
                progress.inc(1);
                outcome
            });
            handles.push((id, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!(request_id = %id, error = %e, "Task panicked");
                    outcomes.push(TriageOutcome::new(
                        id,
                        Err(TriageError::Internal(format!("task failed: {e}"))),
                        0,
                    ));
                }
            }
        }
        progress.finish_and_clear();

        let stats = summarize(&outcomes, start.elapsed().as_secs_f64());
        info!(
            total = stats.total,
            decided = stats.decided,
            failed = stats.failed,
            "Batch complete"
        );
        (outcomes, stats)
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} ({eta})")
        {
            bar.set_style(style);
        }
        bar
    }
}

async fn triage_one(
    orchestrator: &VerificationOrchestrator,
    retry: &RetryPolicy,
    request: TriageRequest,
) -> TriageOutcome {
    let context = match UserContext::from_json(&request.context) {
        Ok(c) => c,
        Err(e) => return TriageOutcome::new(request.id, Err(e), 0),
    };

    let (result, attempts) = retry
        .run(|| orchestrator.decide_context(&context))
        .await;

    if let Err(e) = &result {
        warn!(request_id = %request.id, kind = %e.kind(), error = %e, "Triage failed");
    }
    TriageOutcome::new(request.id, result, attempts)
}

fn summarize(outcomes: &[TriageOutcome], runtime_secs: f64) -> BatchStats {
    let mut stats = BatchStats {
        total: outcomes.len(),
        runtime_secs,
        ..Default::default()
    };

    for outcome in outcomes {
        if let Some(decision) = &outcome.decision {
            stats.decided += 1;
            *stats.by_risk.entry(decision.risk_level()).or_default() += 1;
        }
        if let Some(error) = &outcome.error {
            stats.failed += 1;
            *stats.by_error.entry(error.kind.to_string()).or_default() += 1;
        }
    }

    stats
}
