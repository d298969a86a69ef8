// State module - the persisted scripts document

use crate::error::{Result, WardenError};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Field names of a script entry on disk
pub mod fields {
    pub const NAME: &str = "name";
    pub const FILE: &str = "file";
    pub const PID: &str = "pid";
    pub const DIRECTORY: &str = "directory";
    pub const EXECUTE: &str = "execute";
    pub const LOG: &str = "log";
    pub const ARGUMENTS: &str = "arguments";
    pub const TIMEOUT: &str = "timeout";
    pub const ACTIVE: &str = "active";
    pub const LAST_DATE: &str = "last_date";
}

/// Timestamp layout written to `last_date`
pub const LAST_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// One script entry exactly as it appears in the scripts file.
///
/// Keys keep their original order and unknown keys are carried along
/// untouched; the typed view lives in [`crate::process::ScriptRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptEntry(Map<String, Value>);

impl ScriptEntry {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// The entry name, if present and a string
    pub fn name(&self) -> Option<&str> {
        self.0.get(fields::NAME).and_then(Value::as_str)
    }

    /// Name used in logs and reports, even for malformed entries
    pub fn label(&self, index: usize) -> String {
        match self.name() {
            Some(name) => name.to_string(),
            None => format!("<entry {}>", index),
        }
    }

    /// Whether the engine should supervise this entry (defaults to true)
    pub fn is_active(&self) -> Result<bool> {
        match self.0.get(fields::ACTIVE) {
            None | Some(Value::Null) => Ok(true),
            Some(Value::Bool(active)) => Ok(*active),
            Some(other) => Err(WardenError::InvalidEntry(format!(
                "{} must be a boolean [{}]",
                fields::ACTIVE,
                other
            ))),
        }
    }

    /// Store the pid and launch time of a fresh launch
    pub fn record_launch(&mut self, pid: u32, launched_at: NaiveDateTime) {
        self.0.insert(fields::PID.to_string(), Value::from(pid));
        self.0.insert(
            fields::LAST_DATE.to_string(),
            Value::String(launched_at.format(LAST_DATE_FORMAT).to_string()),
        );
    }

    /// Forget the last launch
    pub fn clear_launch(&mut self) {
        self.0.insert(fields::PID.to_string(), Value::Null);
        self.0.insert(fields::LAST_DATE.to_string(), Value::Null);
    }

    pub fn set_active(&mut self, active: bool) {
        self.0.insert(fields::ACTIVE.to_string(), Value::Bool(active));
    }
}

/// Ordered collection of script entries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptDocument {
    entries: Vec<ScriptEntry>,
}

impl ScriptDocument {
    pub fn new(entries: Vec<ScriptEntry>) -> Self {
        Self { entries }
    }

    /// Build a document from parsed JSON, checking its shape
    pub fn from_value(value: Value) -> Result<Self> {
        let items = match value {
            Value::Array(items) => items,
            other => {
                return Err(WardenError::InvalidScriptsFile(format!(
                    "Scripts file must be a JSON list [{}]",
                    json_type_name(&other)
                )))
            }
        };

        let entries = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(fields) => Ok(ScriptEntry::new(fields)),
                other => Err(WardenError::InvalidScriptsFile(format!(
                    "Entry {} must be a JSON object [{}]",
                    index,
                    json_type_name(&other)
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ScriptEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [ScriptEntry] {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position of the first entry with the given name
    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name() == Some(name))
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Script store handles reading and writing the scripts document
pub struct ScriptStore {
    path: PathBuf,
}

impl ScriptStore {
    /// Create a new store for the given scripts file
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Load the scripts document from disk
    pub fn load(&self) -> Result<ScriptDocument> {
        if !self.path.is_file() {
            return Err(WardenError::MissingScriptsFile(self.path.clone()));
        }

        let contents = fs::read_to_string(&self.path).map_err(|e| {
            WardenError::InvalidScriptsFile(format!("Failed to read scripts file: {}", e))
        })?;

        let value: Value = serde_json::from_str(&contents).map_err(|e| {
            WardenError::InvalidScriptsFile(format!("Scripts file is not valid JSON: {}", e))
        })?;

        ScriptDocument::from_value(value)
    }

    /// Write the document back to disk
    ///
    /// Output is pretty printed with four-space indentation. The document is
    /// written to a sibling temp file which is then renamed over the target.
    pub fn persist(&self, document: &ScriptDocument) -> Result<()> {
        let temp_path = self.temp_path();

        // Write to a temporary file first (atomic write pattern)
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);

            // Four-space indentation, keys in their stored order
            let formatter = PrettyFormatter::with_indent(b"    ");
            let mut serializer = serde_json::Serializer::with_formatter(&mut writer, formatter);
            document.serialize(&mut serializer).map_err(|e| {
                WardenError::Serialization(format!("Failed to serialize scripts: {}", e))
            })?;

            writer.flush()?;
        }

        // Swap the finished document into place
        fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    /// Get the path to the scripts file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
