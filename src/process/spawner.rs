use crate::error::{Result, WardenError};
use std::fmt;
use std::fs::File;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Everything needed to start one script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    /// Interpreter or executable
    pub program: String,

    /// Argument vector, passed to the OS as-is
    pub args: Vec<String>,

    /// Working directory of the new process
    pub working_dir: PathBuf,
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Spawn a process that outlives the supervisor
///
/// Both stdout and stderr go to `output`. On unix the child gets its own
/// session; on Windows it is detached from the console in a new process group.
/// The child handle is dropped without waiting.
///
/// # Returns
/// * `Ok(pid)` - Process ID assigned by the OS
/// * `Err(WardenError::ProcessError)` - The OS refused to start the process
pub fn spawn_detached(command: &LaunchCommand, output: File) -> Result<u32> {
    let stderr = output.try_clone().map_err(|e| {
        WardenError::ProcessError(format!("Failed to duplicate log handle: {}", e))
    })?;

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .current_dir(&command.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(output))
        .stderr(Stdio::from(stderr));

    detach(&mut cmd);

    let child = cmd.spawn().map_err(|e| {
        WardenError::ProcessError(format!("Failed to spawn '{}': {}", command, e))
    })?;

    Ok(child.id())
}

#[cfg(unix)]
fn detach(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;

    // SAFETY: setsid is async-signal-safe and touches no parent state
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid()
                .map(|_| ())
                .map_err(std::io::Error::from)
        });
    }
}

#[cfg(windows)]
fn detach(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;

    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

    cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(any(unix, windows)))]
fn detach(_cmd: &mut Command) {}
