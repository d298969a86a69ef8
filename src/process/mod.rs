// Process module - per-script lifecycle: probing, spawning, restart decisions

pub mod probe;
mod record;
pub mod spawner;

pub use probe::{pid_from_value, validate_pid, ProcessProbe};
pub use record::{parse_last_date, ScriptRecord};
pub use spawner::{spawn_detached, LaunchCommand};
