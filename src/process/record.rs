use crate::config::LaunchDefaults;
use crate::error::{Result, WardenError};
use crate::process::probe::{pid_from_value, ProcessProbe};
use crate::process::spawner::{spawn_detached, LaunchCommand};
use crate::state::{fields, ScriptEntry};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A supervised script, validated and ready to be launched or inspected
#[derive(Debug, Clone)]
pub struct ScriptRecord {
    name: String,
    file_path: PathBuf,
    directory: PathBuf,
    executing_path: String,
    unbuffered_flag: Option<String>,
    arguments: Vec<String>,
    save_path: PathBuf,
    timeout: Option<u64>,
    last_pid: Option<u32>,
    last_launch: Option<NaiveDateTime>,
}

impl ScriptRecord {
    /// Build a record from a persisted entry, validating every field
    ///
    /// Checks run in a fixed order and the first failure is returned:
    /// name/file presence, pid, timeout, last date, directory, script file,
    /// executing path, save path, arguments.
    pub fn from_entry(entry: &ScriptEntry, defaults: &LaunchDefaults) -> Result<Self> {
        let name = required_string(entry, fields::NAME)?;
        let file = required_string(entry, fields::FILE)?;

        let last_pid = pid_from_value(entry.get(fields::PID))?;
        let timeout = parse_timeout(&name, entry.get(fields::TIMEOUT))?;
        let last_launch = match entry.get(fields::LAST_DATE) {
            None | Some(Value::Null) => None,
            Some(Value::String(raw)) => Some(parse_last_date(raw)?),
            Some(other) => {
                return Err(WardenError::InvalidLastTime(format!(
                    "{} last date must be a string [{}]",
                    name, other
                )))
            }
        };

        let directory = parse_directory(&name, entry.get(fields::DIRECTORY))?;

        let file_path = PathBuf::from(&file);
        let full_path = directory.join(&file_path);
        if !full_path.is_file() {
            return Err(WardenError::InvalidScriptPath(format!(
                "File path must be an existing file [{}]",
                full_path.display()
            )));
        }

        let executing_path = match entry.get(fields::EXECUTE) {
            None | Some(Value::Null) => defaults.interpreter.clone(),
            Some(Value::String(path)) if !path.trim().is_empty() => path.clone(),
            Some(other) => {
                return Err(WardenError::InvalidExecutingPath(format!(
                    "Invalid executing path for {} [{}]",
                    name, other
                )))
            }
        };

        let save_path = parse_save_path(&name, &directory, defaults, entry.get(fields::LOG))?;
        let arguments = parse_arguments(&name, entry.get(fields::ARGUMENTS))?;

        Ok(Self {
            name,
            file_path,
            directory,
            executing_path,
            unbuffered_flag: defaults
                .unbuffered_flag
                .clone()
                .filter(|flag| !flag.is_empty()),
            arguments,
            save_path,
            timeout,
            last_pid,
            last_launch,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn executing_path(&self) -> &str {
        &self.executing_path
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Log file template; each launch writes a timestamped sibling of it
    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    pub fn timeout_secs(&self) -> Option<u64> {
        self.timeout
    }

    pub fn last_pid(&self) -> Option<u32> {
        self.last_pid
    }

    pub fn last_launch(&self) -> Option<NaiveDateTime> {
        self.last_launch
    }

    /// The command line this record launches
    pub fn launch_command(&self) -> LaunchCommand {
        let mut args = Vec::with_capacity(self.arguments.len() + 2);
        if let Some(ref flag) = self.unbuffered_flag {
            args.push(flag.clone());
        }
        args.push(self.file_path.to_string_lossy().into_owned());
        args.extend(self.arguments.iter().cloned());

        LaunchCommand {
            program: self.executing_path.clone(),
            args,
            working_dir: self.directory.clone(),
        }
    }

    /// Log file for a launch at the given time
    pub fn log_path_at(&self, launched_at: DateTime<Utc>) -> PathBuf {
        let file_name = self
            .save_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.txt", self.name));
        let stamped = format!("{}_{}", launched_at.timestamp_micros(), file_name);

        match self.save_path.parent() {
            Some(parent) => parent.join(stamped),
            None => PathBuf::from(stamped),
        }
    }

    /// Start the script in the background and remember its pid
    pub fn launch(&mut self) -> Result<u32> {
        // Every launch gets its own timestamped log file
        let log_path = self.log_path_at(Utc::now());
        let output = File::create(&log_path).map_err(|e| {
            WardenError::InvalidSavePath(format!(
                "Failed to open log file for {} [{}]: {}",
                self.name,
                log_path.display(),
                e
            ))
        })?;

        let command = self.launch_command();
        let pid = match spawn_detached(&command, output) {
            Ok(pid) => pid,
            Err(e) => {
                // Nothing ran; drop the empty log file
                if let Err(rm_err) = fs::remove_file(&log_path) {
                    debug!("Failed to remove {}: {}", log_path.display(), rm_err);
                }
                return Err(e);
            }
        };

        // Only remember the launch once the OS accepted it
        self.last_pid = Some(pid);
        self.last_launch = Some(Local::now().naive_local());

        info!(
            "Launched {} (pid: {}, cmd: {}, log: {})",
            self.name,
            pid,
            command,
            log_path.display()
        );

        Ok(pid)
    }

    /// Whether the last launched process is still alive
    pub fn is_running(&self, probe: &mut ProcessProbe) -> Result<bool> {
        match self.last_pid {
            None => Ok(false),
            Some(pid) => probe.is_alive(i64::from(pid)),
        }
    }

    /// Whether the configured timeout has elapsed since the last launch
    ///
    /// A record with a pid but no launch time starts its clock now and is
    /// not restarted on this call.
    pub fn should_restart_on_timeout(&mut self) -> bool {
        self.timed_out_at(Local::now().naive_local())
    }

    fn timed_out_at(&mut self, now: NaiveDateTime) -> bool {
        let Some(timeout) = self.timeout else {
            return false;
        };

        if self.last_pid.is_none() {
            return false;
        }

        match self.last_launch {
            None => {
                self.last_launch = Some(now);
                false
            }
            Some(launched_at) => {
                // A launch time in the future (clock moved back) never times out
                let elapsed_ms = (now - launched_at).num_milliseconds();
                u64::try_from(elapsed_ms)
                    .map(|elapsed| elapsed >= timeout.saturating_mul(1000))
                    .unwrap_or(false)
            }
        }
    }

    /// Decide whether this script needs a restart and perform it
    ///
    /// # Returns
    /// * `Ok(None)` - Process is healthy, nothing was done
    /// * `Ok(Some(pid))` - A fresh process was launched
    /// * `Err(WardenError)` - Probing, terminating or launching failed
    pub fn evaluate_and_reconcile(&mut self, probe: &mut ProcessProbe) -> Result<Option<u32>> {
        let timed_out = self.should_restart_on_timeout();
        let running = self.is_running(probe)?;

        if running && !timed_out {
            debug!("{} is running (pid: {:?})", self.name, self.last_pid);
            return Ok(None);
        }

        if running {
            info!(
                "{} exceeded its timeout of {}s, terminating pid {:?}",
                self.name,
                self.timeout.unwrap_or_default(),
                self.last_pid
            );
            self.terminate(probe)?;
        } else {
            info!("{} is not running", self.name);
        }

        self.launch().map(Some)
    }

    /// Stop the current process if it is alive, then launch a new one
    pub fn restart(&mut self, probe: &mut ProcessProbe) -> Result<u32> {
        if self.is_running(probe)? {
            self.terminate(probe)?;
        }
        self.launch()
    }

    /// Send a termination request to the last launched process
    pub fn terminate(&self, probe: &mut ProcessProbe) -> Result<()> {
        match self.last_pid {
            Some(pid) => probe.terminate(i64::from(pid)),
            None => Ok(()),
        }
    }
}

fn required_string(entry: &ScriptEntry, field: &str) -> Result<String> {
    match entry.get(field) {
        None | Some(Value::Null) => Err(WardenError::MissingField(format!(
            "Script must provide a {} field",
            field
        ))),
        Some(Value::String(value)) => Ok(value.clone()),
        Some(other) => Err(WardenError::InvalidEntry(format!(
            "{} must be a string [{}]",
            field, other
        ))),
    }
}

fn parse_timeout(name: &str, value: Option<&Value>) -> Result<Option<u64>> {
    let invalid = |raw: &dyn std::fmt::Display| {
        WardenError::InvalidTimeout(format!(
            "{} timeout must be a positive integer or null [{}]",
            name, raw
        ))
    };

    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(None),
            Some(secs) if secs > 0 => Ok(Some(secs as u64)),
            Some(_) => Err(invalid(n)),
            None => match n.as_u64() {
                Some(secs) => Ok(Some(secs)),
                None => Err(invalid(n)),
            },
        },
        Some(other) => Err(invalid(other)),
    }
}

/// Parse a persisted launch time into local naive time
///
/// Accepts RFC 3339 with an offset, naive date-times with `T` or a space
/// separator (fraction optional) and bare dates.
pub fn parse_last_date(raw: &str) -> Result<NaiveDateTime> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Local).naive_local());
    }

    const LAYOUTS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];
    for layout in LAYOUTS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, layout) {
            return Ok(parsed);
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| WardenError::InvalidLastTime(format!("Invalid last execution date [{}]", raw)))
}

fn parse_directory(name: &str, value: Option<&Value>) -> Result<PathBuf> {
    let directory = match value {
        None | Some(Value::Null) => std::env::current_dir().map_err(|e| {
            WardenError::InvalidDirectory(format!(
                "{} has no directory and the current one is unusable: {}",
                name, e
            ))
        })?,
        Some(Value::String(dir)) => PathBuf::from(dir),
        Some(other) => {
            return Err(WardenError::InvalidDirectory(format!(
                "{} operating directory must be a string [{}]",
                name, other
            )))
        }
    };

    if !directory.is_dir() {
        return Err(WardenError::InvalidDirectory(format!(
            "{} must have a valid operating directory [{}]",
            name,
            directory.display()
        )));
    }

    Ok(directory)
}

fn parse_save_path(
    name: &str,
    directory: &Path,
    defaults: &LaunchDefaults,
    value: Option<&Value>,
) -> Result<PathBuf> {
    let save_path = match value {
        None | Some(Value::Null) => {
            let logs_dir = directory.join(&defaults.log_dir_name);
            fs::create_dir_all(&logs_dir).map_err(|e| {
                WardenError::InvalidSavePath(format!(
                    "Failed to create log directory for {} [{}]: {}",
                    name,
                    logs_dir.display(),
                    e
                ))
            })?;
            logs_dir.join(format!("{}.txt", name))
        }
        Some(Value::String(path)) => directory.join(path),
        Some(other) => {
            return Err(WardenError::InvalidSavePath(format!(
                "Saving path must be a string for {} [{}]",
                name, other
            )))
        }
    };

    if save_path.file_name().is_none() {
        return Err(WardenError::InvalidSavePath(format!(
            "Saving path has no file name for {} [{}]",
            name,
            save_path.display()
        )));
    }

    match save_path.parent() {
        Some(parent) if parent.is_dir() => Ok(save_path),
        _ => Err(WardenError::InvalidSavePath(format!(
            "Invalid saving path directory for {} [{}]",
            name,
            save_path.display()
        ))),
    }
}

fn parse_arguments(name: &str, value: Option<&Value>) -> Result<Vec<String>> {
    let items = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(WardenError::InvalidArguments(format!(
                "{} arguments must be a list [{}]",
                name, other
            )))
        }
    };

    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(WardenError::InvalidArguments(format!(
                "{} arguments must be strings [{}]",
                name, other
            ))),
        })
        .collect()
}
