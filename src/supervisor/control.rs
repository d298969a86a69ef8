// Operator commands acting on a single named script

use super::Supervisor;
use crate::error::{Result, WardenError};
use crate::process::{pid_from_value, ScriptRecord};
use crate::state::fields;
use serde_json::Value;
use tracing::{info, warn};

/// Snapshot of one script for listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSummary {
    pub name: String,
    pub active: bool,
    pub pid: Option<u32>,
    pub running: bool,
    pub last_date: Option<String>,
    pub timeout: Option<u64>,
}

impl Supervisor {
    /// Describe every script in the document without changing anything
    pub fn list(&mut self) -> Result<Vec<ScriptSummary>> {
        let document = self.store.load()?;
        let mut summaries = Vec::with_capacity(document.len());

        for (index, entry) in document.entries().iter().enumerate() {
            // Malformed values show up as empty columns rather than failing the listing
            let pid = pid_from_value(entry.get(fields::PID)).unwrap_or(None);
            let running = match pid {
                Some(pid) => self.probe.is_alive(i64::from(pid)).unwrap_or(false),
                None => false,
            };

            summaries.push(ScriptSummary {
                name: entry.label(index),
                active: entry.is_active().unwrap_or(false),
                pid,
                running,
                last_date: entry
                    .get(fields::LAST_DATE)
                    .and_then(Value::as_str)
                    .map(str::to_string),
                timeout: entry
                    .get(fields::TIMEOUT)
                    .and_then(Value::as_u64)
                    .filter(|t| *t > 0),
            });
        }

        Ok(summaries)
    }

    /// Stop a script if it is running and launch it again
    ///
    /// Works regardless of the `active` flag.
    pub fn restart_script(&mut self, name: &str) -> Result<u32> {
        let mut document = self.store.load()?;
        let index = document
            .position(name)
            .ok_or_else(|| WardenError::ScriptNotFound(name.to_string()))?;

        let mut record = ScriptRecord::from_entry(&document.entries()[index], &self.config.launch)?;
        let pid = record.restart(&mut self.probe)?;
        let launched_at = record
            .last_launch()
            .unwrap_or_else(|| chrono::Local::now().naive_local());

        document.entries_mut()[index].record_launch(pid, launched_at);
        self.store.persist(&document)?;

        info!("{} restarted manually (pid: {})", name, pid);
        Ok(pid)
    }

    /// Stop a script and exclude it from future passes
    pub fn deactivate_script(&mut self, name: &str) -> Result<()> {
        let mut document = self.store.load()?;
        let index = document
            .position(name)
            .ok_or_else(|| WardenError::ScriptNotFound(name.to_string()))?;

        let entry = &document.entries()[index];
        if let Some(pid) = pid_from_value(entry.get(fields::PID))? {
            let pid = i64::from(pid);
            if self.probe.is_alive(pid)? {
                info!("Terminating {} (pid: {})", name, pid);
                self.probe.terminate(pid)?;
            }
        }

        let entry = &mut document.entries_mut()[index];
        entry.clear_launch();
        entry.set_active(false);
        self.store.persist(&document)?;

        info!("{} deactivated", name);
        Ok(())
    }

    /// Include a script in future passes again
    pub fn activate_script(&mut self, name: &str) -> Result<()> {
        let mut document = self.store.load()?;
        let index = document
            .position(name)
            .ok_or_else(|| WardenError::ScriptNotFound(name.to_string()))?;

        let entry = &mut document.entries_mut()[index];
        if entry.is_active().unwrap_or(false) {
            warn!("{} is already active", name);
        }
        entry.set_active(true);
        self.store.persist(&document)?;

        info!("{} activated", name);
        Ok(())
    }
}
