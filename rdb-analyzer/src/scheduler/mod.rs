//! Three-phase analysis scheduler
//!
//! Drives every submitted track through Technical → (Creative,
//! Instrumentation) → merge/persist. Each phase draws a permit from its own
//! bounded pool; per track, Technical strictly happens-before the two
//! background phases, and nothing orders tracks against each other.
//!
//! Submissions return a handle that yields a partial record as soon as the
//! technical phase finishes and exactly one terminal event per track.
//! Submissions arriving before the caller signals readiness are buffered; a
//! watchdog assumes readiness after five seconds.

mod merge;
mod state;

pub use merge::{assemble_final, assemble_partial, elevate_electronic, hint_instruments};
pub use state::{StateTransition, TrackProgress, TrackState};

use crate::config::{clamp_workers, AnalyzerConfig, PhaseMode};
use crate::phases::{
    CreativeContext, CreativePhase, InstrumentationContext, InstrumentationPhase, TechnicalPhase,
};
use crate::services::creative::CreativeOutcome;
use crate::services::ensemble::EnsembleOutcome;
use crate::services::waveform::WaveformRenderer;
use crate::store::{build_document, write_sidecar, LibraryStore};
use chrono::Utc;
use rdb_common::events::{AnalysisEvent, AnalysisStage, EventBus, StageStatus};
use rdb_common::keys::track_key;
use rdb_common::model::TrackRecord;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

/// Readiness watchdog: after this long, buffered submissions flow anyway.
const READINESS_WATCHDOG: Duration = Duration::from_secs(5);

/// Per-track events delivered on the submission channel.
#[derive(Debug)]
pub enum TrackEvent {
    /// Technical phase finished; creative and instrumentation still running.
    Partial(Box<TrackRecord>),
    /// Merged record persisted. Terminal.
    Completed(Box<TrackRecord>),
    /// Track failed (container probe) or persistence failed. Terminal.
    Failed { path: PathBuf, error: String },
}

/// Handle returned by [`AnalysisScheduler::submit`].
pub struct Submission {
    id: Uuid,
    cancel: CancellationToken,
    events: mpsc::Receiver<TrackEvent>,
}

impl Submission {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next event; `None` once every track of this submission terminated.
    pub async fn next_event(&mut self) -> Option<TrackEvent> {
        self.events.recv().await
    }

    /// Cancel outstanding work for this submission. Queued and in-flight
    /// tracks stop; partial data is not persisted.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token usable to cancel this submission from another task.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

struct QueuedTrack {
    path: PathBuf,
    events: mpsc::Sender<TrackEvent>,
    cancel: CancellationToken,
}

struct ReadyState {
    ready: bool,
    buffered: Vec<QueuedTrack>,
}

struct Inner {
    mode: PhaseMode,
    bus: EventBus,
    technical: Arc<dyn TechnicalPhase>,
    creative: Arc<dyn CreativePhase>,
    instrumentation: Arc<dyn InstrumentationPhase>,
    store: Arc<LibraryStore>,
    waveform: Option<WaveformRenderer>,
    tech_sem: Arc<Semaphore>,
    creative_sem: Arc<Semaphore>,
    instr_sem: Arc<Semaphore>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    ready: parking_lot::Mutex<ReadyState>,
}

/// The analysis scheduler. Cheap to clone; all clones share the pools.
#[derive(Clone)]
pub struct AnalysisScheduler {
    inner: Arc<Inner>,
}

impl AnalysisScheduler {
    pub fn new(
        config: &AnalyzerConfig,
        bus: EventBus,
        technical: Arc<dyn TechnicalPhase>,
        creative: Arc<dyn CreativePhase>,
        instrumentation: Arc<dyn InstrumentationPhase>,
        store: Arc<LibraryStore>,
        waveform: Option<WaveformRenderer>,
    ) -> Self {
        let inner = Arc::new(Inner {
            mode: config.mode,
            bus,
            technical,
            creative,
            instrumentation,
            store,
            waveform,
            tech_sem: Arc::new(Semaphore::new(clamp_workers(config.tech_workers))),
            creative_sem: Arc::new(Semaphore::new(clamp_workers(config.creative_workers))),
            instr_sem: Arc::new(Semaphore::new(clamp_workers(config.instrumentation_workers))),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            ready: parking_lot::Mutex::new(ReadyState {
                ready: false,
                buffered: Vec::new(),
            }),
        });

        // Readiness watchdog.
        let scheduler = Self {
            inner: inner.clone(),
        };
        let watchdog = scheduler.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(READINESS_WATCHDOG) => {
                    watchdog.mark_ready();
                }
                _ = watchdog.inner.shutdown.cancelled() => {}
            }
        });

        scheduler
    }

    /// Submit a batch of audio files for analysis.
    ///
    /// Per track the returned handle yields a [`TrackEvent::Partial`] after
    /// the technical phase, then exactly one terminal event.
    pub fn submit(&self, paths: Vec<PathBuf>) -> Submission {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(paths.len().max(1) * 2 + 4);
        let cancel = self.inner.shutdown.child_token();

        let queued: Vec<QueuedTrack> = paths
            .into_iter()
            .map(|path| QueuedTrack {
                path,
                events: tx.clone(),
                cancel: cancel.clone(),
            })
            .collect();

        let mut ready = self.inner.ready.lock();
        if ready.ready {
            drop(ready);
            for track in queued {
                self.spawn_track(track);
            }
        } else {
            tracing::debug!(submission = %id, "Caller not ready, buffering submission");
            ready.buffered.extend(queued);
        }

        Submission {
            id,
            cancel,
            events: rx,
        }
    }

    /// Signal readiness: buffered submissions start in arrival order.
    pub fn mark_ready(&self) {
        let buffered = {
            let mut ready = self.inner.ready.lock();
            if ready.ready {
                return;
            }
            ready.ready = true;
            std::mem::take(&mut ready.buffered)
        };
        if !buffered.is_empty() {
            tracing::info!(count = buffered.len(), "Processing buffered submissions");
        }
        for track in buffered {
            self.spawn_track(track);
        }
    }

    /// Graceful shutdown: wait up to `grace` for in-flight work, then
    /// cancel the remainder (child processes are killed on drop).
    pub async fn shutdown(&self, grace: Duration) {
        self.inner.tracker.close();
        if tokio::time::timeout(grace, self.inner.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!("Shutdown grace elapsed, cancelling outstanding analysis work");
            self.inner.shutdown.cancel();
            self.inner.tracker.wait().await;
        }
    }

    fn spawn_track(&self, track: QueuedTrack) {
        let inner = self.inner.clone();
        self.inner.tracker.spawn(drive_track(inner, track));
    }
}

async fn drive_track(inner: Arc<Inner>, track: QueuedTrack) {
    let path_str = track.path.to_string_lossy().to_string();
    let key = track_key(&path_str);
    let mut progress = TrackProgress::new();

    inner.emit_progress(&key, &path_str, 0, "Queued for analysis");

    // Technical phase, gated by the TECH pool.
    let permit = tokio::select! {
        _ = track.cancel.cancelled() => return,
        permit = inner.tech_sem.clone().acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return,
        },
    };

    progress.transition_to(TrackState::TechRunning);
    inner.emit_status(&key, &path_str, AnalysisStage::Technical, StageStatus::Processing, None);

    let technical = tokio::select! {
        _ = track.cancel.cancelled() => {
            drop(permit);
            return;
        }
        result = inner.technical.analyze(&track.path) => result,
    };
    drop(permit);

    let technical = match technical {
        Ok(outcome) => outcome,
        Err(e) => {
            progress.transition_to(TrackState::Failed);
            let error = e.to_string();
            inner.emit_status(
                &key,
                &path_str,
                AnalysisStage::Technical,
                StageStatus::Error,
                Some(error.clone()),
            );
            tracing::error!(file = %path_str, error = %error, "Container probe failed, skipping track");
            let _ = track
                .events
                .send(TrackEvent::Failed {
                    path: track.path.clone(),
                    error,
                })
                .await;
            return;
        }
    };

    progress.transition_to(TrackState::TechDone);
    inner.emit_status(&key, &path_str, AnalysisStage::Technical, StageStatus::Complete, None);
    inner.emit_progress(&key, &path_str, 25, "Technical analysis complete");
    inner.bus.emit(AnalysisEvent::TrackPartial {
        key: key.clone(),
        path: path_str.clone(),
        timestamp: Utc::now(),
    });

    let partial = assemble_partial(&track.path, &key, &technical, Utc::now());
    if track
        .events
        .send(TrackEvent::Partial(Box::new(partial)))
        .await
        .is_err()
    {
        tracing::debug!(file = %path_str, "Submission handle dropped, continuing to persist");
    }

    let title = technical
        .facts
        .tags
        .title
        .clone()
        .or_else(|| {
            track
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
        })
        .unwrap_or_else(|| path_str.clone());
    let creative_ctx = CreativeContext {
        title,
        bpm: technical.facts.bpm,
        hints: technical.probes.hints.clone(),
    };
    let mut instr_ctx = InstrumentationContext {
        path: track.path.clone(),
        hints: technical.probes.hints.clone(),
        creative_suggestions: Vec::new(),
    };

    let outcomes = match inner.mode {
        PhaseMode::Concurrent => {
            let creative = run_creative(&inner, &key, &path_str, &track.cancel, &creative_ctx);
            let instrumentation =
                run_instrumentation(&inner, &key, &path_str, &track.cancel, &instr_ctx);
            let (creative, instrumentation) = tokio::join!(creative, instrumentation);
            creative.zip(instrumentation)
        }
        PhaseMode::Sequential => {
            progress.transition_to(TrackState::CreativeRunning);
            match run_creative(&inner, &key, &path_str, &track.cancel, &creative_ctx).await {
                Some(creative) => {
                    instr_ctx.creative_suggestions =
                        creative.facts.suggested_instruments.clone();
                    progress.transition_to(TrackState::InstrumentationRunning);
                    run_instrumentation(&inner, &key, &path_str, &track.cancel, &instr_ctx)
                        .await
                        .map(|instrumentation| (creative, instrumentation))
                }
                None => None,
            }
        }
    };

    // A user-cancelled background phase never persists partial data.
    // Graceful shutdown instead writes out what the track has, with
    // explicit status strings marking the skipped phases.
    let (creative, instrumentation) = match outcomes {
        Some(pair) => pair,
        None if inner.shutdown.is_cancelled() => (
            CreativeOutcome::defaults("Shutdown - creative analysis skipped"),
            EnsembleOutcome::skipped("shutdown - instrumentation skipped"),
        ),
        None => return,
    };

    progress.transition_to(TrackState::Merging);

    let waveform_png = match &inner.waveform {
        Some(renderer) if !inner.shutdown.is_cancelled() => renderer.render(&track.path).await,
        _ => None,
    };

    let (record, section) = assemble_final(
        &track.path,
        &key,
        &technical,
        &creative,
        &instrumentation,
        waveform_png,
        Utc::now(),
    );

    let persisted = match inner.store.upsert(&record).await {
        Ok(persisted) => persisted,
        Err(e) => {
            progress.transition_to(TrackState::Failed);
            let error = e.to_string();
            inner.emit_status(
                &key,
                &path_str,
                AnalysisStage::Instrumentation,
                StageStatus::Error,
                Some(error.clone()),
            );
            tracing::error!(file = %path_str, error = %error, "Store upsert failed");
            let _ = track
                .events
                .send(TrackEvent::Failed {
                    path: track.path.clone(),
                    error,
                })
                .await;
            return;
        }
    };

    if let Err(e) = inner.store.rebuild_criteria().await {
        // The record is persisted; the next successful upsert re-derives
        // the criteria, so this is not terminal for the track.
        tracing::error!(error = %e, "Criteria rebuild failed");
    }

    let document = build_document(&persisted, &section);
    if let Err(e) = write_sidecar(&track.path, &document).await {
        tracing::error!(file = %path_str, error = %e, "Sidecar write failed");
    }

    progress.transition_to(TrackState::Persisted);
    inner.emit_progress(&key, &path_str, 100, "Analysis complete");
    inner.bus.emit(AnalysisEvent::TrackPersisted {
        key: key.clone(),
        path: path_str.clone(),
        timestamp: Utc::now(),
    });
    let _ = track
        .events
        .send(TrackEvent::Completed(Box::new(persisted)))
        .await;
}

async fn run_creative(
    inner: &Inner,
    key: &str,
    path: &str,
    cancel: &CancellationToken,
    ctx: &CreativeContext,
) -> Option<CreativeOutcome> {
    let permit = tokio::select! {
        _ = cancel.cancelled() => return None,
        permit = inner.creative_sem.clone().acquire_owned() => permit.ok()?,
    };
    inner.emit_status(key, path, AnalysisStage::Creative, StageStatus::Processing, None);

    let outcome = tokio::select! {
        _ = cancel.cancelled() => {
            drop(permit);
            return None;
        }
        outcome = inner.creative.analyze(ctx) => outcome,
    };
    drop(permit);

    inner.emit_status(
        key,
        path,
        AnalysisStage::Creative,
        StageStatus::Complete,
        Some(outcome.status.clone()),
    );
    inner.emit_progress(key, path, 50, "Creative analysis complete");
    Some(outcome)
}

async fn run_instrumentation(
    inner: &Inner,
    key: &str,
    path: &str,
    cancel: &CancellationToken,
    ctx: &InstrumentationContext,
) -> Option<EnsembleOutcome> {
    let permit = tokio::select! {
        _ = cancel.cancelled() => return None,
        permit = inner.instr_sem.clone().acquire_owned() => permit.ok()?,
    };
    inner.emit_status(
        key,
        path,
        AnalysisStage::Instrumentation,
        StageStatus::Processing,
        None,
    );

    let outcome = tokio::select! {
        _ = cancel.cancelled() => {
            drop(permit);
            return None;
        }
        outcome = inner.instrumentation.analyze(ctx) => outcome,
    };
    drop(permit);

    inner.emit_status(
        key,
        path,
        AnalysisStage::Instrumentation,
        StageStatus::Complete,
        Some(outcome.status.clone()),
    );
    inner.emit_progress(key, path, 75, "Instrumentation analysis complete");
    Some(outcome)
}

impl Inner {
    fn emit_status(
        &self,
        key: &str,
        path: &str,
        stage: AnalysisStage,
        status: StageStatus,
        note: Option<String>,
    ) {
        self.bus.emit(AnalysisEvent::PhaseStatus {
            key: key.to_string(),
            path: path.to_string(),
            stage,
            status,
            note,
            timestamp: Utc::now(),
        });
    }

    fn emit_progress(&self, key: &str, path: &str, pct: u8, label: &str) {
        self.bus.emit(AnalysisEvent::PhaseProgress {
            key: key.to_string(),
            path: path.to_string(),
            pct,
            label: label.to_string(),
            timestamp: Utc::now(),
        });
    }
}
