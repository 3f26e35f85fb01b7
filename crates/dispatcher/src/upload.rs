//! Batched session upload with retry between batches

use std::time::Duration;

use contracts::{BatchMode, ResultSink, SessionRecord, UploadConfig, UploadEnvelope};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::error::DispatcherError;
use crate::metrics::SinkMetrics;

/// How one session is cut and paced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPlan {
    pub mode: BatchMode,
    pub batch_size: usize,
    pub inter_batch_delay: Duration,
    /// Extra attempts for a batch that failed transiently
    pub max_retries: u32,
    /// Backoff before retry `n` is `retry_backoff * n`
    pub retry_backoff: Duration,
}

impl UploadPlan {
    pub fn new(config: &UploadConfig, mode: BatchMode) -> Self {
        Self {
            mode,
            batch_size: config.batch_size(mode),
            inter_batch_delay: Duration::from_millis(config.inter_batch_delay_ms),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Proximity plan without pacing
    pub fn immediate(batch_size: usize) -> Self {
        Self {
            mode: BatchMode::Proximity,
            batch_size,
            inter_batch_delay: Duration::ZERO,
            max_retries: UploadConfig::default().max_retries,
            retry_backoff: Duration::ZERO,
        }
    }
}

/// Outcome of a completed upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub session_id: String,
    pub batches_sent: usize,
    pub items_sent: usize,
    pub retries: u32,
}

/// Send a session to one sink, batch by batch
///
/// Batches go out strictly in order. A transient failure retries the same
/// batch up to `max_retries` times; any other failure, or running out of
/// retries, aborts the rest of the session. Batches already sent stay sent.
#[instrument(
    name = "dispatcher_upload_session",
    skip(sink, record, plan, metrics),
    fields(sink = %sink.name(), session_id = %record.session_id, mode = ?plan.mode)
)]
pub async fn upload_session<S: ResultSink>(
    sink: &mut S,
    record: &SessionRecord,
    plan: &UploadPlan,
    metrics: &SinkMetrics,
) -> Result<UploadReport, DispatcherError> {
    let envelopes = UploadEnvelope::split(record, plan.batch_size);
    let total = envelopes.len();
    let mut report = UploadReport {
        session_id: record.session_id.clone(),
        batches_sent: 0,
        items_sent: 0,
        retries: 0,
    };

    for envelope in &envelopes {
        if envelope.batch.index > 0 && !plan.inter_batch_delay.is_zero() {
            sleep(plan.inter_batch_delay).await;
        }

        let mut attempt = 0;
        loop {
            match sink.write_batch(envelope).await {
                Ok(()) => break,
                Err(e) if e.is_transient() && attempt < plan.max_retries => {
                    attempt += 1;
                    report.retries += 1;
                    metrics.inc_retries();
                    warn!(
                        batch = envelope.batch.index,
                        attempt,
                        error = %e,
                        "Transient batch failure, retrying"
                    );
                    sleep(plan.retry_backoff * attempt).await;
                }
                Err(e) => {
                    metrics.inc_failure_count();
                    record_batch(sink.name(), "failed");
                    warn!(
                        batch = envelope.batch.index,
                        total,
                        sent = report.batches_sent,
                        error = %e,
                        "Session upload aborted"
                    );
                    return Err(DispatcherError::UploadAborted {
                        sink_name: sink.name().to_string(),
                        session_id: record.session_id.clone(),
                        batch: envelope.batch.index,
                        total,
                        source: e,
                    });
                }
            }
        }

        metrics.inc_batches();
        record_batch(sink.name(), "sent");
        report.batches_sent += 1;
        report.items_sent += envelope.batch.count;
        debug!(batch = envelope.batch.index, total, count = envelope.batch.count, "Batch sent");
    }

    sink.flush().await?;

    info!(
        batches = report.batches_sent,
        items = report.items_sent,
        retries = report.retries,
        "Session upload complete"
    );
    Ok(report)
}

fn record_batch(sink: &str, status: &'static str) {
    metrics::counter!(
        "motion_play_upload_batches_total",
        "sink" => sink.to_string(),
        "status" => status
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{record, MockSink};
    use contracts::SessionKind;

    #[tokio::test]
    async fn test_batches_in_order() {
        let mut sink = MockSink::new("upload");
        let metrics = SinkMetrics::new();

        let report = upload_session(&mut sink, &record(60), &UploadPlan::immediate(25), &metrics)
            .await
            .unwrap();

        assert_eq!(report.batches_sent, 3);
        assert_eq!(report.items_sent, 60);
        let batches = sink.batches.lock().unwrap();
        let counts: Vec<usize> = batches.iter().map(|e| e.batch.count).collect();
        assert_eq!(counts, [25, 25, 10]);
        assert!(batches[0].batch.is_first);
        assert!(batches[0].summary.is_some());
        assert!(batches[2].summary.is_none());
        assert_eq!(metrics.batches(), 3);
    }

    #[tokio::test]
    async fn test_empty_session_sends_nothing() {
        let mut sink = MockSink::new("upload");
        let report = upload_session(
            &mut sink,
            &record(0),
            &UploadPlan::immediate(25),
            &SinkMetrics::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.batches_sent, 0);
        assert!(sink.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let mut sink = MockSink::new("flaky");
        sink.transient_failures = 2;
        let metrics = SinkMetrics::new();

        let report = upload_session(&mut sink, &record(30), &UploadPlan::immediate(25), &metrics)
            .await
            .unwrap();

        assert_eq!(report.batches_sent, 2);
        assert_eq!(report.retries, 2);
        assert_eq!(metrics.retries(), 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted_aborts() {
        let mut sink = MockSink::new("down");
        sink.transient_failures = 10;

        let err = upload_session(
            &mut sink,
            &record(30),
            &UploadPlan::immediate(25),
            &SinkMetrics::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DispatcherError::UploadAborted { batch: 0, total: 2, .. }));
    }

    #[tokio::test]
    async fn test_permanent_failure_keeps_partial_upload() {
        let mut sink = MockSink::new("broken");
        sink.fail_batch_at = Some(1);
        let metrics = SinkMetrics::new();

        let err = upload_session(&mut sink, &record(60), &UploadPlan::immediate(25), &metrics)
            .await
            .unwrap_err();

        assert!(matches!(err, DispatcherError::UploadAborted { batch: 1, total: 3, .. }));
        // No retry for a permanent failure, and batch 2 is never attempted
        assert_eq!(sink.attempts.lock().unwrap().as_slice(), [0, 1]);
        assert_eq!(sink.batches.lock().unwrap().len(), 1);
        assert_eq!(metrics.failure_count(), 1);
    }

    #[test]
    fn test_plan_batch_sizes() {
        let config = UploadConfig::default();
        assert_eq!(UploadPlan::new(&config, BatchMode::Proximity).batch_size, 25);
        assert_eq!(UploadPlan::new(&config, BatchMode::Interrupt).batch_size, 100);
        let live = UploadPlan::new(&config, BatchMode::for_kind(SessionKind::Proximity, true));
        assert_eq!(live.batch_size, 200);
        assert_eq!(live.inter_batch_delay, Duration::from_millis(100));
    }
}
