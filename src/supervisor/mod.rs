// Supervisor module - one pass over the scripts document

mod control;
mod report;

pub use control::ScriptSummary;
pub use report::{PassReport, ScriptOutcome, ScriptResult};

use crate::config::{PersistMode, SupervisorConfig};
use crate::error::Result;
use crate::notify::{sink_from_config, Notification, NotificationSink};
use crate::process::{ProcessProbe, ScriptRecord};
use crate::state::{ScriptDocument, ScriptEntry, ScriptStore};
use chrono::{Local, NaiveDateTime};
use tracing::{debug, error, info, warn};

/// Runs supervision passes against one scripts file
///
/// A supervisor owns the scripts document for the duration of a pass; passes
/// against the same file must not overlap.
pub struct Supervisor {
    config: SupervisorConfig,
    store: ScriptStore,
    probe: ProcessProbe,
    sink: Box<dyn NotificationSink>,
}

impl Supervisor {
    /// Create a supervisor that reports through the given sink
    pub fn new(config: SupervisorConfig, sink: Box<dyn NotificationSink>) -> Self {
        let store = ScriptStore::new(&config.scripts_file);
        Self {
            config,
            store,
            probe: ProcessProbe::new(),
            sink,
        }
    }

    /// Create a supervisor with the sink named in the configuration
    pub fn from_config(config: SupervisorConfig) -> Self {
        let sink = sink_from_config(&config.notification);
        Self::new(config, sink)
    }

    pub fn store(&self) -> &ScriptStore {
        &self.store
    }

    pub fn probe_mut(&mut self) -> &mut ProcessProbe {
        &mut self.probe
    }

    /// Perform a single supervision pass
    ///
    /// Every active entry is inspected in document order and restarted when
    /// its process is gone or past its timeout. A failing entry is reported
    /// and skipped; only store errors (loading, writing) abort the pass.
    ///
    /// # Returns
    /// * `Ok(PassReport)` - Per-script outcomes of the pass
    /// * `Err(WardenError)` - The document could not be loaded or persisted
    pub fn run_pass(&mut self) -> Result<PassReport> {
        let started_at = Local::now().naive_local();
        debug!("Starting pass over {}", self.store.path().display());

        let mut document = self.store.load()?;
        let mut report = PassReport::new(started_at, self.config.report_running);
        let mut pending_write = false;

        for index in 0..document.len() {
            let entry = &document.entries()[index];
            let label = entry.label(index);

            match entry.is_active() {
                Ok(true) => {}
                Ok(false) => {
                    debug!("{} is inactive, skipping", label);
                    report.push(label, ScriptOutcome::Skipped);
                    continue;
                }
                Err(e) => {
                    error!("Failed to read {}: {}", label, e);
                    report.push(label, ScriptOutcome::Failed { error: e.to_string() });
                    continue;
                }
            }

            match self.reconcile_entry(entry) {
                Ok(Some((pid, launched_at))) => {
                    document.entries_mut()[index].record_launch(pid, launched_at);
                    if !self.persist_after_restart(&document)? {
                        pending_write = true;
                    }
                    report.push(label, ScriptOutcome::Restarted { pid });
                }
                Ok(None) => {
                    report.push(label, ScriptOutcome::Healthy);
                }
                Err(e) => {
                    error!("Failed to supervise {}: {}", label, e);
                    report.push(label, ScriptOutcome::Failed { error: e.to_string() });
                }
            }
        }

        if pending_write {
            self.store.persist(&document)?;
        }

        info!(
            "Pass finished: {} restarted, {} failed, {} skipped",
            report.restart_count(),
            report.failure_count(),
            report.skipped_count()
        );

        if report.has_changes() {
            report.notified = self.notify(&report);
        } else {
            debug!("Nothing happened");
        }

        Ok(report)
    }

    /// Build the record for one entry and let it reconcile itself
    fn reconcile_entry(&mut self, entry: &ScriptEntry) -> Result<Option<(u32, NaiveDateTime)>> {
        let mut record = ScriptRecord::from_entry(entry, &self.config.launch)?;

        let launched = record.evaluate_and_reconcile(&mut self.probe)?;
        Ok(launched.map(|pid| {
            let launched_at = record
                .last_launch()
                .unwrap_or_else(|| Local::now().naive_local());
            (pid, launched_at)
        }))
    }

    /// Write the document after a restart according to the persist mode
    ///
    /// Returns `true` when the document was written, `false` when the write
    /// is deferred to the end of the pass.
    fn persist_after_restart(&self, document: &ScriptDocument) -> Result<bool> {
        match self.config.persist_mode {
            PersistMode::Immediate => {
                self.store.persist(document)?;
                Ok(true)
            }
            PersistMode::Batched => Ok(false),
        }
    }

    fn notify(&self, report: &PassReport) -> bool {
        let notification = Notification::new(
            self.config.notification.topic.clone(),
            report.subject(),
            report.body(),
        );

        match self.sink.publish(&notification) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to publish notification: {}", e);
                false
            }
        }
    }
}
