use crate::error::{Result, WardenError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Supervisor configuration with every setting that used to be ambient state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Path to the JSON document listing the supervised scripts
    #[serde(default = "default_scripts_file")]
    pub scripts_file: PathBuf,

    /// Defaults applied when a script entry omits launch settings
    #[serde(default)]
    pub launch: LaunchDefaults,

    /// Notification channel settings
    #[serde(default)]
    pub notification: NotificationConfig,

    /// Add a report line for scripts that were already running
    #[serde(default)]
    pub report_running: bool,

    /// When restarts get written back to the scripts file
    #[serde(default)]
    pub persist_mode: PersistMode,

    /// Interval between passes in watch mode (in seconds)
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// File that receives unhandled errors from the binary (empty disables it)
    #[serde(default = "default_error_log")]
    pub error_log: Option<PathBuf>,
}

/// Launch settings used by records that do not specify their own
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchDefaults {
    /// Interpreter or binary used when an entry has no `execute` field
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Flag placed before the script path (unbuffered output)
    #[serde(default = "default_unbuffered_flag")]
    pub unbuffered_flag: Option<String>,

    /// Directory name, relative to the script directory, for derived log files
    #[serde(default = "default_log_dir_name")]
    pub log_dir_name: String,
}

/// Where change reports are sent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Topic attached to each notification
    #[serde(default = "default_topic")]
    pub topic: String,

    #[serde(default)]
    pub sink: SinkConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkConfig {
    /// Write notifications to the structured log
    #[default]
    Log,
    /// Pipe notifications into an external program
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

/// Persistence strategy for restarts within a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PersistMode {
    /// Write the document after every individual restart
    #[default]
    Immediate,
    /// Write the document once at the end of the pass
    Batched,
}

/// Error log used when no configuration could be loaded
pub const DEFAULT_ERROR_LOG: &str = "log.txt";

// Default value functions for serde
fn default_scripts_file() -> PathBuf {
    PathBuf::from("scripts.json")
}

fn default_error_log() -> Option<PathBuf> {
    Some(PathBuf::from(DEFAULT_ERROR_LOG))
}

fn default_check_interval() -> u64 {
    60
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_unbuffered_flag() -> Option<String> {
    Some("-u".to_string())
}

fn default_log_dir_name() -> String {
    "logs".to_string()
}

fn default_topic() -> String {
    "Script Handler".to_string()
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            scripts_file: default_scripts_file(),
            launch: LaunchDefaults::default(),
            notification: NotificationConfig::default(),
            report_running: false,
            persist_mode: PersistMode::default(),
            check_interval_secs: default_check_interval(),
            error_log: default_error_log(),
        }
    }
}

impl Default for LaunchDefaults {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            unbuffered_flag: default_unbuffered_flag(),
            log_dir_name: default_log_dir_name(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            sink: SinkConfig::default(),
        }
    }
}

impl SupervisorConfig {
    /// Load the configuration from a file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<SupervisorConfig> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| WardenError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let mut config: SupervisorConfig = match extension {
            "toml" => toml::from_str(&contents)
                .map_err(|e| WardenError::InvalidConfig(format!("Failed to parse TOML: {}", e)))?,
            "json" => serde_json::from_str(&contents)
                .map_err(|e| WardenError::InvalidConfig(format!("Failed to parse JSON: {}", e)))?,
            _ => {
                return Err(WardenError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        config.expand_env_vars();
        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.scripts_file.as_os_str().is_empty() {
            return Err(WardenError::ConfigError(
                "scripts_file must not be empty".to_string(),
            ));
        }

        if self.launch.interpreter.trim().is_empty() {
            return Err(WardenError::ConfigError(
                "launch.interpreter must not be empty".to_string(),
            ));
        }

        if self.launch.log_dir_name.trim().is_empty() {
            return Err(WardenError::ConfigError(
                "launch.log_dir_name must not be empty".to_string(),
            ));
        }

        if self.check_interval_secs == 0 {
            return Err(WardenError::ConfigError(
                "check_interval_secs must be at least 1".to_string(),
            ));
        }

        if self.notification.topic.trim().is_empty() {
            return Err(WardenError::ConfigError(
                "notification.topic must not be empty".to_string(),
            ));
        }

        if let SinkConfig::Command { ref program, .. } = self.notification.sink {
            if program.trim().is_empty() {
                return Err(WardenError::ConfigError(
                    "notification.sink.program must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Expand environment variables in path-like settings
    fn expand_env_vars(&mut self) {
        self.scripts_file = expand_env_in_path(&self.scripts_file);

        if let Some(ref error_log) = self.error_log {
            self.error_log = Some(expand_env_in_path(error_log));
        }

        self.launch.interpreter = expand_env_in_string(&self.launch.interpreter);

        if let SinkConfig::Command { ref mut program, .. } = self.notification.sink {
            *program = expand_env_in_string(program);
        }
    }

    /// Error log path, unless it was disabled with an empty value
    pub fn error_log_path(&self) -> Option<&Path> {
        self.error_log
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }

    /// Get the watch interval as Duration
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

/// Expand `$VAR` and `${VAR}` references in a string
fn expand_env_in_string(s: &str) -> String {
    if !s.contains('$') {
        return s.to_string();
    }

    // Longest names first so `$HOME_DIR` is not clobbered by `$HOME`
    let mut vars: Vec<(String, String)> = std::env::vars().collect();
    vars.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut result = s.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("${{{}}}", key), &value);
        result = result.replace(&format!("${}", key), &value);
    }

    result
}

fn expand_env_in_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    PathBuf::from(expand_env_in_string(&path_str))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_config_defaults() {
        let config = SupervisorConfig::default();

        assert_eq!(config.scripts_file, PathBuf::from("scripts.json"));
        assert_eq!(config.launch.interpreter, "python3");
        assert_eq!(config.launch.unbuffered_flag.as_deref(), Some("-u"));
        assert_eq!(config.launch.log_dir_name, "logs");
        assert_eq!(config.notification.topic, "Script Handler");
        assert_eq!(config.notification.sink, SinkConfig::Log);
        assert_eq!(config.persist_mode, PersistMode::Immediate);
        assert!(!config.report_running);
        assert_eq!(config.check_interval(), Duration::from_secs(60));
        assert_eq!(config.error_log_path(), Some(Path::new("log.txt")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_error_log_disables_it() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("warden.toml");
        fs::write(&config_path, r#"error_log = """#).unwrap();

        let config = SupervisorConfig::from_file(&config_path).unwrap();
        assert_eq!(config.error_log_path(), None);
    }

    #[test]
    fn test_load_toml_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("warden.toml");

        let toml_content = r#"
            scripts_file = "/srv/scripts.json"
            report_running = true
            persist_mode = "batched"
            check_interval_secs = 15

            [launch]
            interpreter = "/usr/bin/python3.11"
            log_dir_name = "output"

            [notification]
            topic = "Nightly Jobs"
            sink = { kind = "command", program = "/usr/local/bin/notify", args = ["--quiet"] }
        "#;
        fs::write(&config_path, toml_content).unwrap();

        let config = SupervisorConfig::from_file(&config_path).unwrap();
        assert_eq!(config.scripts_file, PathBuf::from("/srv/scripts.json"));
        assert!(config.report_running);
        assert_eq!(config.persist_mode, PersistMode::Batched);
        assert_eq!(config.check_interval_secs, 15);
        assert_eq!(config.launch.interpreter, "/usr/bin/python3.11");
        assert_eq!(config.launch.unbuffered_flag.as_deref(), Some("-u"));
        assert_eq!(config.launch.log_dir_name, "output");
        assert_eq!(config.notification.topic, "Nightly Jobs");
        assert_eq!(
            config.notification.sink,
            SinkConfig::Command {
                program: "/usr/local/bin/notify".to_string(),
                args: vec!["--quiet".to_string()],
            }
        );
    }

    #[test]
    fn test_load_json_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("warden.json");

        fs::write(
            &config_path,
            r#"{"scripts_file": "jobs.json", "launch": {"interpreter": "node", "unbuffered_flag": null}}"#,
        )
        .unwrap();

        let config = SupervisorConfig::from_file(&config_path).unwrap();
        assert_eq!(config.scripts_file, PathBuf::from("jobs.json"));
        assert_eq!(config.launch.interpreter, "node");
        assert_eq!(config.launch.unbuffered_flag, None);
    }

    #[test]
    fn test_unsupported_extension() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("warden.yaml");
        fs::write(&config_path, "scripts_file: x").unwrap();

        let result = SupervisorConfig::from_file(&config_path);
        assert!(matches!(result, Err(WardenError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = SupervisorConfig {
            check_interval_secs: 0,
            ..SupervisorConfig::default()
        };
        assert!(matches!(config.validate(), Err(WardenError::ConfigError(_))));
    }

    #[test]
    fn test_validate_rejects_empty_command_program() {
        let mut config = SupervisorConfig::default();
        config.notification.sink = SinkConfig::Command {
            program: " ".to_string(),
            args: vec![],
        };
        assert!(matches!(config.validate(), Err(WardenError::ConfigError(_))));
    }

    #[test]
    fn test_expand_env_in_string() {
        std::env::set_var("SCRIPTWARDEN_TEST_ROOT", "/opt/jobs");
        assert_eq!(
            expand_env_in_string("${SCRIPTWARDEN_TEST_ROOT}/scripts.json"),
            "/opt/jobs/scripts.json"
        );
        assert_eq!(
            expand_env_in_string("$SCRIPTWARDEN_TEST_ROOT/log.txt"),
            "/opt/jobs/log.txt"
        );
        assert_eq!(expand_env_in_string("plain.json"), "plain.json");
    }
}
