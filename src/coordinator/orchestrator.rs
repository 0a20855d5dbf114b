//! Drives one file from fingerprint to a finalized object.
//!
//! SINGLE plans are one direct PUT. CHUNKED plans are uploaded one signed-URL
//! batch at a time: each batch runs through a bounded pool and must settle
//! before the next batch's URLs are requested. The first chunk that exhausts
//! its retries cancels its in-flight siblings and fails the session.

use crate::cancel::{run_cancellable, CancellationToken};
use crate::chunk::{
    partition, ChunkDescriptor, ChunkError, ChunkOutcome, ChunkReader, ChunkTransferWorker,
    ChunkUrlBatcher,
};
use crate::config::{ConfigResult, UploaderConfig};
use crate::coordinator::error::{UploadError, UploadResult};
use crate::coordinator::state_machine::UploadStateMachine;
use crate::coordinator::types::{UploadReport, UploadRequest, UploadTransition};
use crate::fingerprint::FingerprintEngine;
use crate::metrics::recorder::{record_bytes_confirmed, record_chunk_confirmed};
use crate::metrics::SessionMetrics;
use crate::network::{
    BytesSentFn, CompletedObject, ControlPlane, HttpControlPlane, HttpObjectStore, ObjectStore,
    TransferRateLimiter,
};
use crate::plan::{PlanError, UploadPlan, UploadPlanNegotiator, UploadStrategy};
use crate::progress::{EventBus, ProgressAggregator, ProgressMode, TerminalReport, UploadEvent};
use crate::retry::{ChunkFailure, RetryNotice, RetryScheduler};
use crate::session::{SessionStatus, SessionStore, UploadSession};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Values shared by every part upload of one session
struct PartContext<'a> {
    session_id: &'a str,
    upload_id: &'a str,
    content_type: &'a str,
    reader: &'a ChunkReader,
}

pub struct UploadOrchestrator {
    control: Arc<dyn ControlPlane>,
    fingerprints: FingerprintEngine,
    negotiator: UploadPlanNegotiator,
    batcher: ChunkUrlBatcher,
    worker: ChunkTransferWorker,
    retry: RetryScheduler,
    concurrency: usize,
    purpose: String,
    events: EventBus,
    store: Option<Arc<SessionStore>>,
}

impl UploadOrchestrator {
    pub fn new(
        config: &UploaderConfig,
        control: Arc<dyn ControlPlane>,
        object_store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            fingerprints: FingerprintEngine::new(config.fingerprint_sample_bytes),
            negotiator: UploadPlanNegotiator::new(
                control.clone(),
                config.purpose.clone(),
                config.single_upload_threshold,
                config.chunk_size_bytes,
            ),
            batcher: ChunkUrlBatcher::new(control.clone(), config.url_batch_size),
            worker: ChunkTransferWorker::new(
                object_store,
                TransferRateLimiter::new(config.max_bytes_per_second),
            ),
            retry: RetryScheduler::new(control.clone(), config.retry_policy()),
            concurrency: config.concurrency.clamp(1, 10),
            purpose: config.purpose.clone(),
            events: EventBus::default(),
            store: None,
            control,
        }
    }

    /// Validate `config` and build HTTP clients for both remote services
    pub fn from_config(config: &UploaderConfig) -> ConfigResult<Self> {
        config.validate()?;
        let control = HttpControlPlane::new(&config.base_url, config.bearer_token.as_deref())?;
        let object_store = HttpObjectStore::new()?;
        Ok(Self::new(config, Arc::new(control), Arc::new(object_store)))
    }

    /// Checkpoint sessions to `store` as they progress
    pub fn with_session_store(mut self, store: Arc<SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Publish on a shared bus, e.g. one bus for several orchestrators
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.events.subscribe()
    }

    pub fn session_store(&self) -> Option<&Arc<SessionStore>> {
        self.store.as_ref()
    }

    /// Upload a file from scratch.
    ///
    /// Always returns a report. Exactly one [`UploadEvent::Terminal`] is
    /// published per call.
    pub async fn start_upload(
        &self,
        request: UploadRequest,
        cancel: &CancellationToken,
    ) -> UploadReport {
        let purpose = request
            .purpose
            .clone()
            .unwrap_or_else(|| self.purpose.clone());
        let mut session = UploadSession::new(
            request.path.clone(),
            request.resolved_filename(),
            request.content_type.clone(),
            purpose,
        );
        let sm = UploadStateMachine::new();
        let metrics = SessionMetrics::start("start");

        info!(
            session_id = %session.session_id,
            path = %session.file_path.display(),
            "upload started"
        );
        self.emit_status(&session);

        let result = self.run_new(&mut session, &sm, cancel).await;
        self.finish(session, &sm, metrics, result).await
    }

    /// Continue an interrupted chunked session, uploading only the parts
    /// without a SUCCEEDED outcome. Refuses if the file changed.
    pub async fn resume_upload(
        &self,
        mut session: UploadSession,
        cancel: &CancellationToken,
    ) -> UploadReport {
        let sm = UploadStateMachine::from_status(session.status);
        let metrics = SessionMetrics::start("resume");

        let result = self.run_resume(&mut session, &sm, cancel).await;
        self.finish(session, &sm, metrics, result).await
    }

    /// Re-issue only the final completion call of a session whose bytes are
    /// all on the object store.
    pub async fn retry_completion(
        &self,
        mut session: UploadSession,
        cancel: &CancellationToken,
    ) -> UploadReport {
        let sm = UploadStateMachine::from_status(session.status);
        let metrics = SessionMetrics::start("completion");

        let result = self.run_completion_retry(&mut session, &sm, cancel).await;
        self.finish(session, &sm, metrics, result).await
    }

    async fn run_new(
        &self,
        session: &mut UploadSession,
        sm: &UploadStateMachine,
        cancel: &CancellationToken,
    ) -> UploadResult<()> {
        let fingerprint = run_cancellable(
            cancel,
            self.fingerprints.compute_fingerprint(&session.file_path),
        )
        .await??;
        session.fingerprint = Some(fingerprint.clone());

        let plan = run_cancellable(
            cancel,
            self.negotiator.negotiate_with_purpose(
                &session.purpose,
                &session.filename,
                fingerprint.size_bytes,
                &session.content_type,
                &fingerprint,
            ),
        )
        .await??;
        session.plan = Some(plan.clone());

        self.apply(session, sm, UploadTransition::Start)?;
        self.checkpoint(session).await;

        match plan.strategy {
            UploadStrategy::Single => self.run_single(session, &plan, cancel).await,
            UploadStrategy::Chunked => {
                let progress =
                    ProgressAggregator::new(ProgressMode::Chunked, plan.total_size_bytes);
                self.emit_progress(session, &progress);

                self.run_chunks(session, &plan, &progress, cancel).await?;
                self.complete(session, &plan, &progress, cancel).await
            }
        }
    }

    async fn run_resume(
        &self,
        session: &mut UploadSession,
        sm: &UploadStateMachine,
        cancel: &CancellationToken,
    ) -> UploadResult<()> {
        if !session.can_resume() {
            return Err(UploadError::CannotResume(format!(
                "session {} is {}",
                session.session_id, session.status
            )));
        }
        let (stored, plan) = match (&session.fingerprint, &session.plan) {
            (Some(fingerprint), Some(plan)) => (fingerprint.clone(), plan.clone()),
            _ => {
                return Err(UploadError::CannotResume(
                    "session has no fingerprint or plan".into(),
                ))
            }
        };

        let current = run_cancellable(
            cancel,
            self.fingerprints.compute_fingerprint(&session.file_path),
        )
        .await?
        .map_err(|e| UploadError::CannotResume(format!("cannot read source file: {e}")))?;

        if !current.same_content(&stored) {
            return Err(UploadError::CannotResume(
                "source file changed since the upload started".into(),
            ));
        }

        session.uploaded_bytes = confirmed_bytes(session, &plan);
        self.apply(session, sm, UploadTransition::Resume)?;
        info!(
            session_id = %session.session_id,
            upload_id = %plan.upload_id,
            missing = session.missing_parts().len(),
            "resuming upload"
        );

        let progress = ProgressAggregator::resuming(
            ProgressMode::Chunked,
            plan.total_size_bytes,
            session.uploaded_bytes,
        );
        self.emit_progress(session, &progress);
        self.checkpoint(session).await;

        self.run_chunks(session, &plan, &progress, cancel).await?;
        self.complete(session, &plan, &progress, cancel).await
    }

    async fn run_completion_retry(
        &self,
        session: &mut UploadSession,
        sm: &UploadStateMachine,
        cancel: &CancellationToken,
    ) -> UploadResult<()> {
        if !session.status.is_completion_failed() {
            return Err(UploadError::CannotResume(format!(
                "session {} is {}, not awaiting completion",
                session.session_id, session.status
            )));
        }
        let plan = session
            .plan
            .clone()
            .filter(|plan| plan.is_chunked())
            .ok_or_else(|| UploadError::CannotResume("session has no chunked plan".into()))?;
        if !session.all_parts_succeeded() {
            return Err(UploadError::CannotResume(format!(
                "parts {:?} were never uploaded",
                session.missing_parts()
            )));
        }

        self.apply(session, sm, UploadTransition::RetryCompletion)?;
        info!(session_id = %session.session_id, upload_id = %plan.upload_id, "retrying completion");

        let progress = ProgressAggregator::resuming(
            ProgressMode::Chunked,
            plan.total_size_bytes,
            session.uploaded_bytes,
        );
        self.complete(session, &plan, &progress, cancel).await
    }

    async fn run_single(
        &self,
        session: &mut UploadSession,
        plan: &UploadPlan,
        cancel: &CancellationToken,
    ) -> UploadResult<()> {
        let total = plan.total_size_bytes;
        let url = plan.direct_url.clone().ok_or_else(|| {
            UploadError::Negotiation(PlanError::InvalidPlan("single upload without a URL".into()))
        })?;

        let progress = Arc::new(ProgressAggregator::new(ProgressMode::Single, total));
        self.emit_progress(session, &progress);

        let body = ChunkReader::new(session.file_path.clone())
            .read_all()
            .await
            .map_err(|e| UploadError::Transfer {
                attempts: 0,
                source: ChunkError::Io(e),
            })?;
        if body.len() as u64 != total {
            return Err(UploadError::Transfer {
                attempts: 0,
                source: ChunkError::Protocol(format!(
                    "file is {} bytes, plan expects {total}",
                    body.len()
                )),
            });
        }

        let descriptor = ChunkDescriptor {
            part_number: 1,
            start_byte: 0,
            end_byte: total.saturating_sub(1),
            upload_url: url,
        };
        let session_id = session.session_id.clone();
        let content_type = session.content_type.clone();
        let on_sent = self.bytes_sent_fn(&session_id, 0, total, Some(progress.clone()));
        let notice = |n: RetryNotice| self.emit_retry_notice(&session_id, n);

        let result = self
            .retry
            .run_with_retry(None, descriptor, cancel, &notice, |d, _attempt| {
                let body = body.clone();
                let on_sent = on_sent.clone();
                let worker = &self.worker;
                let content_type = content_type.as_str();
                async move { worker.transfer(body, &d, content_type, on_sent, cancel).await }
            })
            .await;

        match result {
            Ok(outcome) => {
                debug!(session_id = %session_id, etag = %outcome.etag, "direct upload stored");
                if session.record_outcome(outcome, total) {
                    record_bytes_confirmed(total);
                }
                session.object = Some(CompletedObject {
                    upload_id: Some(plan.upload_id.clone()),
                    object_key: plan.object_key.clone(),
                    bucket: plan.bucket.clone(),
                    size_bytes: Some(total),
                    extra: Default::default(),
                });
                progress.mark_complete();
                self.emit_progress(session, &progress);
                Ok(())
            }
            Err(ChunkFailure { outcome, error }) => {
                let attempts = outcome.attempts;
                session.record_outcome(outcome, 0);
                if error.is_aborted() {
                    return Err(UploadError::Aborted);
                }
                Err(UploadError::Transfer {
                    attempts,
                    source: error,
                })
            }
        }
    }

    /// Upload every part still missing from `session`, batch by batch.
    async fn run_chunks(
        &self,
        session: &mut UploadSession,
        plan: &UploadPlan,
        progress: &ProgressAggregator,
        cancel: &CancellationToken,
    ) -> UploadResult<()> {
        let (total_chunks, _) = plan.chunk_layout().ok_or_else(|| {
            UploadError::Negotiation(PlanError::InvalidPlan("chunked upload without layout".into()))
        })?;

        let reader = ChunkReader::new(session.file_path.clone());
        let session_id = session.session_id.clone();
        let content_type = session.content_type.clone();
        let ctx = PartContext {
            session_id: &session_id,
            upload_id: &plan.upload_id,
            content_type: &content_type,
            reader: &reader,
        };

        for range in self
            .batcher
            .ranges_for(total_chunks, &session.missing_parts())
        {
            let descriptors = run_cancellable(
                cancel,
                self.batcher.next_batch(plan, range.from, range.to),
            )
            .await?
            .map_err(|source| UploadError::ChunkUrls {
                from: range.from,
                to: range.to,
                source,
            })?;

            let missing = session.missing_parts();
            let pending: Vec<ChunkDescriptor> = descriptors
                .into_iter()
                .filter(|d| missing.contains(&d.part_number))
                .collect();

            debug!(
                session_id = %session_id,
                from = range.from,
                to = range.to,
                parts = pending.len(),
                "uploading batch"
            );

            let result = self
                .run_batch(session, &ctx, pending, progress, cancel)
                .await;
            self.checkpoint(session).await;
            result?;
        }

        Ok(())
    }

    /// Run one batch through the bounded pool and wait for all of it to settle.
    async fn run_batch(
        &self,
        session: &mut UploadSession,
        ctx: &PartContext<'_>,
        pending: Vec<ChunkDescriptor>,
        progress: &ProgressAggregator,
        cancel: &CancellationToken,
    ) -> UploadResult<()> {
        let batch_token = cancel.child_token();
        let mut results = futures::stream::iter(pending)
            .map(|descriptor| self.upload_part(ctx, descriptor, &batch_token))
            .buffer_unordered(self.concurrency);

        let mut failure: Option<UploadError> = None;

        // Outcomes are applied here, one at a time
        while let Some(result) = results.next().await {
            match result {
                Ok((outcome, len)) => {
                    self.events.emit(UploadEvent::ChunkCompleted {
                        session_id: ctx.session_id.to_string(),
                        part_number: outcome.part_number,
                        etag: outcome.etag.clone(),
                        attempts: outcome.attempts,
                    });
                    if session.record_outcome(outcome, len) {
                        record_chunk_confirmed(len);
                        progress.on_bytes_transferred(len);
                        self.emit_progress(session, progress);
                    }
                }
                Err(ChunkFailure { outcome, error }) => {
                    let part = outcome.part_number;
                    let attempts = outcome.attempts;
                    session.record_outcome(outcome, 0);

                    if error.is_aborted() || failure.is_some() {
                        continue;
                    }

                    error!(
                        session_id = ctx.session_id,
                        part,
                        attempts,
                        %error,
                        "chunk failed, cancelling in-flight siblings"
                    );
                    batch_token.cancel();
                    failure = Some(UploadError::Chunk {
                        part,
                        attempts,
                        source: error,
                    });
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }
        if cancel.is_cancelled() {
            return Err(UploadError::Aborted);
        }
        Ok(())
    }

    /// One part: read its bytes, then PUT and notify under the retry budget.
    async fn upload_part(
        &self,
        ctx: &PartContext<'_>,
        descriptor: ChunkDescriptor,
        token: &CancellationToken,
    ) -> Result<(ChunkOutcome, u64), ChunkFailure> {
        let part = descriptor.part_number;
        let len = descriptor.byte_len();

        if token.is_cancelled() {
            return Err(ChunkFailure::new(part, 0, ChunkError::Aborted));
        }

        let bytes = ctx
            .reader
            .read_range(descriptor.start_byte, descriptor.end_byte)
            .await
            .map_err(|e| ChunkFailure::new(part, 0, ChunkError::Io(e)))?;

        let notice = |n: RetryNotice| self.emit_retry_notice(ctx.session_id, n);

        let outcome = self
            .retry
            .run_with_retry(Some(ctx.upload_id), descriptor, token, &notice, |d, _attempt| {
                let bytes = bytes.clone();
                let on_sent = self.bytes_sent_fn(ctx.session_id, d.part_number, len, None);
                async move {
                    let outcome = self
                        .worker
                        .transfer(bytes, &d, ctx.content_type, on_sent, token)
                        .await?;

                    run_cancellable(
                        token,
                        self.control
                            .complete_chunk(ctx.upload_id, d.part_number, &outcome.etag),
                    )
                    .await
                    .map_err(|_| ChunkError::Aborted)?
                    .map_err(|e| ChunkError::Transfer {
                        part: d.part_number,
                        status: e.status(),
                        message: format!("completion notify failed: {e}"),
                    })?;

                    Ok::<_, ChunkError>(outcome)
                }
            })
            .await?;

        debug!(
            session_id = ctx.session_id,
            part,
            attempts = outcome.attempts,
            "chunk confirmed"
        );
        Ok((outcome, len))
    }

    async fn complete(
        &self,
        session: &mut UploadSession,
        plan: &UploadPlan,
        progress: &ProgressAggregator,
        cancel: &CancellationToken,
    ) -> UploadResult<()> {
        let missing = session.missing_parts();
        if !missing.is_empty() {
            return Err(UploadError::Incomplete { missing });
        }

        info!(
            session_id = %session.session_id,
            upload_id = %plan.upload_id,
            "all chunks uploaded, finalizing"
        );

        let object = run_cancellable(cancel, self.control.complete_chunked_upload(&plan.upload_id))
            .await?
            .map_err(UploadError::Completion)?;

        session.object = Some(object);
        progress.mark_complete();
        self.emit_progress(session, progress);
        Ok(())
    }

    /// Settle the session into its terminal state and publish the result.
    async fn finish(
        &self,
        mut session: UploadSession,
        sm: &UploadStateMachine,
        metrics: SessionMetrics,
        result: UploadResult<()>,
    ) -> UploadReport {
        let error = match result {
            Ok(()) => match sm.transition(UploadTransition::Complete) {
                Ok(status) => {
                    session.status = status;
                    metrics.completed();
                    info!(
                        session_id = %session.session_id,
                        uploaded_bytes = session.uploaded_bytes,
                        "upload completed"
                    );
                    None
                }
                Err(err) => {
                    metrics.failed(err.kind().as_str());
                    Some(err)
                }
            },
            Err(err) if err.is_aborted() => {
                session.status = sm
                    .transition(UploadTransition::Cancel)
                    .unwrap_or(SessionStatus::Cancelled);
                metrics.cancelled();
                info!(session_id = %session.session_id, "upload cancelled");
                Some(err)
            }
            Err(err) => {
                if let Some(phase) = err.phase() {
                    session.status = sm
                        .transition(UploadTransition::Fail { phase })
                        .unwrap_or(SessionStatus::Failed { phase });
                }
                metrics.failed(err.kind().as_str());
                error!(
                    session_id = %session.session_id,
                    status = %session.status,
                    kind = err.kind().as_str(),
                    "upload failed: {err}"
                );
                Some(err)
            }
        };

        session.touch();
        self.checkpoint(&session).await;
        self.emit_status(&session);
        self.events.emit(UploadEvent::Terminal(TerminalReport {
            session_id: session.session_id.clone(),
            status: session.status,
            uploaded_bytes: session.uploaded_bytes,
            error_kind: error.as_ref().map(|e| e.kind()),
            message: error.as_ref().map(|e| e.to_string()),
        }));

        UploadReport { session, error }
    }

    fn apply(
        &self,
        session: &mut UploadSession,
        sm: &UploadStateMachine,
        transition: UploadTransition,
    ) -> UploadResult<()> {
        session.status = sm.transition(transition)?;
        session.touch();
        self.emit_status(session);
        Ok(())
    }

    /// Persistence is best effort. A failed save never fails the upload.
    async fn checkpoint(&self, session: &UploadSession) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(session).await {
                warn!(session_id = %session.session_id, "session checkpoint failed: {e}");
            }
        }
    }

    fn emit_status(&self, session: &UploadSession) {
        self.events.emit(UploadEvent::StatusChanged {
            session_id: session.session_id.clone(),
            status: session.status,
        });
    }

    fn emit_progress(&self, session: &UploadSession, progress: &ProgressAggregator) {
        self.events.emit(UploadEvent::Progress {
            session_id: session.session_id.clone(),
            percentage: progress.percentage(),
            uploaded_bytes: progress.uploaded_bytes(),
            total_bytes: progress.total_bytes(),
        });
    }

    fn emit_retry_notice(&self, session_id: &str, notice: RetryNotice) {
        let event = match notice {
            RetryNotice::Retrying {
                part_number,
                attempt,
                delay,
            } => UploadEvent::ChunkRetrying {
                session_id: session_id.to_string(),
                part_number,
                attempt,
                delay_ms: delay.as_millis() as u64,
            },
            RetryNotice::UrlReissued { part_number } => UploadEvent::UrlReissued {
                session_id: session_id.to_string(),
                part_number,
            },
        };
        self.events.emit(event);
    }

    /// Byte callback for one PUT. With `progress` set (direct uploads) the
    /// running count also drives the session percentage.
    fn bytes_sent_fn(
        &self,
        session_id: &str,
        part_number: u32,
        total: u64,
        progress: Option<Arc<ProgressAggregator>>,
    ) -> BytesSentFn {
        let events = self.events.clone();
        let session_id = session_id.to_string();
        Arc::new(move |sent: u64| {
            events.emit(UploadEvent::BytesSent {
                session_id: session_id.clone(),
                part_number,
                sent,
                total,
            });
            if let Some(progress) = &progress {
                let percentage = progress.observe_loaded(sent);
                events.emit(UploadEvent::Progress {
                    session_id: session_id.clone(),
                    percentage,
                    uploaded_bytes: progress.uploaded_bytes(),
                    total_bytes: progress.total_bytes(),
                });
            }
        })
    }
}

/// Bytes covered by the SUCCEEDED parts of `session`
fn confirmed_bytes(session: &UploadSession, plan: &UploadPlan) -> u64 {
    let Some((_, chunk_size)) = plan.chunk_layout() else {
        return 0;
    };
    session
        .chunk_outcomes
        .values()
        .filter(|o| o.is_succeeded())
        .filter_map(|o| partition::expected_range(o.part_number, chunk_size, plan.total_size_bytes))
        .map(|(start, end)| end - start + 1)
        .sum()
}
