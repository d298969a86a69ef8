use chrono::NaiveDateTime;
use std::fmt;

/// What a pass did with one script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutcome {
    /// Inactive, never inspected
    Skipped,
    /// Running and within its timeout
    Healthy,
    /// Was dead or timed out, now freshly launched
    Restarted { pid: u32 },
    /// Could not be built or reconciled this pass
    Failed { error: String },
}

impl fmt::Display for ScriptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptOutcome::Skipped => write!(f, "skipped"),
            ScriptOutcome::Healthy => write!(f, "healthy"),
            ScriptOutcome::Restarted { pid } => write!(f, "restarted (pid {})", pid),
            ScriptOutcome::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptResult {
    pub name: String,
    pub outcome: ScriptOutcome,
}

/// Outcome of one supervision pass
#[derive(Debug, Clone)]
pub struct PassReport {
    pub started_at: NaiveDateTime,
    pub results: Vec<ScriptResult>,
    /// Whether a notification was delivered for this pass
    pub notified: bool,
    report_running: bool,
}

impl PassReport {
    pub fn new(started_at: NaiveDateTime, report_running: bool) -> Self {
        Self {
            started_at,
            results: Vec::new(),
            notified: false,
            report_running,
        }
    }

    pub fn push(&mut self, name: String, outcome: ScriptOutcome) {
        self.results.push(ScriptResult { name, outcome });
    }

    pub fn outcome_of(&self, name: &str) -> Option<&ScriptOutcome> {
        self.results
            .iter()
            .find(|r| r.name == name)
            .map(|r| &r.outcome)
    }

    pub fn restart_count(&self) -> usize {
        self.count(|o| matches!(o, ScriptOutcome::Restarted { .. }))
    }

    pub fn failure_count(&self) -> usize {
        self.count(|o| matches!(o, ScriptOutcome::Failed { .. }))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|o| matches!(o, ScriptOutcome::Skipped))
    }

    fn count(&self, pred: impl Fn(&ScriptOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }

    /// Whether the pass produced anything worth reporting
    pub fn has_changes(&self) -> bool {
        !self.body().is_empty()
    }

    /// Subject line carrying the pass timestamp
    pub fn subject(&self) -> String {
        format!(
            "Scripts Changes [{}]",
            self.started_at.format("%Y-%m-%d %H:%M:%S%.6f")
        )
    }

    /// One line per reportable script, in document order
    pub fn body(&self) -> String {
        let mut body = String::new();

        for result in &self.results {
            let line = match result.outcome {
                ScriptOutcome::Restarted { .. } => {
                    format!("{} Has Been Restarted", result.name)
                }
                ScriptOutcome::Failed { ref error } => {
                    format!("{} Failed To Restart [{}]", result.name, error)
                }
                ScriptOutcome::Healthy if self.report_running => {
                    format!("{} Is Already Running", result.name)
                }
                _ => continue,
            };
            body.push_str(&line);
            body.push('\n');
        }

        body
    }
}
