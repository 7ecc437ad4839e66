use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, info, warn};

use crate::classifier::EntityClassifier;
use crate::config::SuggestionConfig;
use crate::error::JoblogError;
use crate::model::TemplateSuggestion;
use crate::store::Store;
use crate::suggestion::job::{SuggestionJob, SuggestionOutcome};
use crate::suggestion::{first_unknown_token, MIN_TERM_CHARS};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Queued-job bookkeeping shared between the submit side and the worker.
#[derive(Default)]
struct JobTracker {
    queued: HashMap<String, usize>,
    cancelled: HashSet<String>,
}

impl JobTracker {
    fn finish(&mut self, record_id: &str) {
        if let Some(count) = self.queued.get_mut(record_id) {
            *count -= 1;
            if *count == 0 {
                self.queued.remove(record_id);
                self.cancelled.remove(record_id);
            }
        }
    }
}

fn lock(tracker: &Mutex<JobTracker>) -> Result<MutexGuard<'_, JobTracker>, JoblogError> {
    tracker.lock().map_err(|_| JoblogError::WorkerStopped)
}

/// Background producer of vocabulary suggestions.
///
/// Jobs go through a bounded channel to one dedicated thread; `submit` never
/// blocks. Each job yields a [`SuggestionOutcome`] on the outcome channel,
/// which is best-effort: outcomes nobody reads are dropped once it is full.
pub struct SuggestionEngine {
    job_sender: Sender<SuggestionJob>,
    outcome_receiver: Receiver<SuggestionOutcome>,
    worker: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
    tracker: Arc<Mutex<JobTracker>>,
}

impl SuggestionEngine {
    pub fn start(
        store: Arc<Store>,
        classifier: Arc<dyn EntityClassifier>,
        config: &SuggestionConfig,
    ) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (job_sender, job_receiver) = bounded::<SuggestionJob>(capacity);
        let (outcome_sender, outcome_receiver) = bounded::<SuggestionOutcome>(capacity);
        let shutdown = Arc::new(AtomicBool::new(false));
        let tracker = Arc::new(Mutex::new(JobTracker::default()));

        let worker = SuggestionWorker {
            store,
            classifier,
            min_confidence: config.min_confidence,
            tracker: Arc::clone(&tracker),
        };
        let shutdown_flag = Arc::clone(&shutdown);
        let handle = thread::spawn(move || {
            worker.run(job_receiver, outcome_sender, shutdown_flag);
        });

        info!("Started suggestion worker (queue capacity {})", capacity);

        Self {
            job_sender,
            outcome_receiver,
            worker: handle,
            shutdown,
            tracker,
        }
    }

    /// Queues `job`. Returns `Ok(false)` if the queue is full and the job was
    /// dropped.
    pub fn submit(&self, job: SuggestionJob) -> Result<bool, JoblogError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(JoblogError::WorkerStopped);
        }

        let record_id = job.record_id.clone();
        let mut tracker = lock(&self.tracker)?;
        match self.job_sender.try_send(job) {
            Ok(()) => {
                *tracker.queued.entry(record_id).or_insert(0) += 1;
                Ok(true)
            }
            Err(TrySendError::Full(job)) => {
                warn!(
                    "Suggestion queue full, dropping job for record {}",
                    job.record_id
                );
                Ok(false)
            }
            Err(TrySendError::Disconnected(_)) => Err(JoblogError::WorkerStopped),
        }
    }

    /// Marks every queued job for `record_id` as stale. A job already being
    /// persisted finishes first, so once this returns no new suggestion for
    /// the record can appear.
    pub fn cancel_record(&self, record_id: &str) -> Result<(), JoblogError> {
        let mut tracker = lock(&self.tracker)?;
        if tracker.queued.contains_key(record_id) {
            debug!("Cancelling queued suggestion jobs for record {}", record_id);
            tracker.cancelled.insert(record_id.to_string());
        }
        Ok(())
    }

    pub fn try_recv_outcome(&self) -> Option<SuggestionOutcome> {
        self.outcome_receiver.try_recv().ok()
    }

    pub fn recv_outcome_timeout(&self, timeout: Duration) -> Option<SuggestionOutcome> {
        self.outcome_receiver.recv_timeout(timeout).ok()
    }

    /// Number of jobs waiting in the queue.
    pub fn queued(&self) -> usize {
        self.job_sender.len()
    }

    /// Stops the worker after its current job; queued jobs are abandoned.
    pub fn shutdown(&self) {
        info!("Shutting down suggestion worker...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Closes the queue and joins the worker. Without a prior
    /// [`shutdown`](Self::shutdown) every queued job is processed first.
    pub fn wait(self) -> Vec<SuggestionOutcome> {
        drop(self.job_sender);

        if let Err(e) = self.worker.join() {
            error!("Suggestion worker panicked: {:?}", e);
        } else {
            debug!("Suggestion worker finished");
        }

        self.outcome_receiver.try_iter().collect()
    }
}

struct SuggestionWorker {
    store: Arc<Store>,
    classifier: Arc<dyn EntityClassifier>,
    min_confidence: f64,
    tracker: Arc<Mutex<JobTracker>>,
}

impl SuggestionWorker {
    fn run(
        self,
        job_receiver: Receiver<SuggestionJob>,
        outcome_sender: Sender<SuggestionOutcome>,
        shutdown: Arc<AtomicBool>,
    ) {
        debug!("Suggestion worker started");

        loop {
            if shutdown.load(Ordering::Relaxed) {
                debug!("Suggestion worker received shutdown signal");
                break;
            }

            match job_receiver.recv_timeout(POLL_INTERVAL) {
                Ok(job) => {
                    let span = tracing::debug_span!("suggestion", record_id = %job.record_id);
                    let _enter = span.enter();

                    let outcome = self.process(&job);
                    self.log_outcome(&outcome);

                    match self.tracker.lock() {
                        Ok(mut tracker) => tracker.finish(&job.record_id),
                        Err(_) => {
                            error!("Suggestion tracker poisoned, stopping worker");
                            break;
                        }
                    }

                    match outcome_sender.try_send(outcome) {
                        Ok(()) | Err(TrySendError::Full(_)) => {}
                        Err(TrySendError::Disconnected(_)) => {
                            debug!("Suggestion outcome channel closed");
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Suggestion job channel disconnected");
                    break;
                }
            }
        }

        debug!("Suggestion worker stopped");
    }

    fn process(&self, job: &SuggestionJob) -> SuggestionOutcome {
        let stale = || SuggestionOutcome::Stale {
            record_id: job.record_id.clone(),
        };
        let failed = |reason: String| SuggestionOutcome::Failed {
            record_id: job.record_id.clone(),
            reason,
        };

        if self.is_cancelled(&job.record_id) {
            return stale();
        }

        let template = match self.store.get_template(&job.template_id) {
            Ok(Some(template)) => template,
            Ok(None) => return stale(),
            Err(e) => return failed(e.to_string()),
        };

        let Some(term) =
            first_unknown_token(&job.original_input, &template.vocabulary(), MIN_TERM_CHARS)
        else {
            return SuggestionOutcome::NoCandidate {
                record_id: job.record_id.clone(),
            };
        };

        let classification = match self.classifier.classify(&term, &job.original_input) {
            Ok(Some(c)) if c.confidence >= self.min_confidence => c,
            Ok(prediction) => {
                return SuggestionOutcome::LowConfidence {
                    record_id: job.record_id.clone(),
                    term,
                    confidence: prediction.map(|c| c.confidence),
                }
            }
            Err(e) => return failed(e.to_string()),
        };

        let suggestion = match TemplateSuggestion::new(
            &template.id,
            term,
            classification.entity_type,
            classification.confidence,
            &job.record_id,
            &job.original_input,
        ) {
            Ok(s) => s,
            Err(e) => return failed(e.to_string()),
        };

        // Held across the existence check and the insert so a concurrent
        // delete either cancels first or sees the suggestion to remove.
        let tracker = match self.tracker.lock() {
            Ok(tracker) => tracker,
            Err(_) => return failed("suggestion tracker poisoned".to_string()),
        };
        if tracker.cancelled.contains(&job.record_id) {
            return stale();
        }
        match self.store.get_record(&job.record_id) {
            Ok(scan) if scan.value.is_some() => {}
            Ok(_) => return stale(),
            Err(e) => return failed(e.to_string()),
        }
        if let Err(e) = self.store.save_suggestion(&suggestion) {
            return failed(e.to_string());
        }
        drop(tracker);

        SuggestionOutcome::Created(suggestion)
    }

    fn is_cancelled(&self, record_id: &str) -> bool {
        self.tracker
            .lock()
            .map(|t| t.cancelled.contains(record_id))
            .unwrap_or(true)
    }

    fn log_outcome(&self, outcome: &SuggestionOutcome) {
        match outcome {
            SuggestionOutcome::Created(s) => info!(
                "Suggested '{}' as {} ({:.2}) for template {}",
                s.suggested_term, s.suggested_entity_type, s.confidence, s.template_id
            ),
            SuggestionOutcome::NoCandidate { record_id } => warn!(
                "Record {} needs review but has no unknown term to suggest",
                record_id
            ),
            SuggestionOutcome::LowConfidence {
                record_id, term, ..
            } => debug!(
                "No confident type for '{}' from record {}",
                term, record_id
            ),
            SuggestionOutcome::Stale { record_id } => {
                debug!("Discarded stale suggestion job for record {}", record_id)
            }
            SuggestionOutcome::Failed { record_id, reason } => {
                warn!("Suggestion for record {} failed: {}", record_id, reason)
            }
        }
    }
}
