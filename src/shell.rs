//! Shell-backend interface — the one seam through which task commands
//! reach the operating system.
//!
//! Commands run under the platform shell with the task's working directory
//! set and the parent environment inherited unchanged. Stdio is inherited
//! so task output streams straight to the terminal.

use std::path::Path;
use std::process::Command;

/// How a child process finished.
#[derive(Debug, Clone, Copy)]
pub struct ExecStatus {
    pub exit_code: i32,
    /// True when the child died from the terminal's interrupt signal
    pub interrupted: bool,
}

impl ExecStatus {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.interrupted
    }
}

/// Run one command string via the platform shell in `working_dir`,
/// blocking until it exits. Spawn failures come back as bare messages;
/// the caller owns task context.
pub fn run_command(command: &str, working_dir: &Path) -> Result<ExecStatus, String> {
    let mut shell = platform_shell(command);
    let status = shell
        .current_dir(working_dir)
        .status()
        .map_err(|e| format!("failed to spawn shell: {}", e))?;

    Ok(ExecStatus {
        exit_code: status.code().unwrap_or(-1),
        interrupted: died_from_interrupt(&status),
    })
}

#[cfg(unix)]
fn platform_shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn platform_shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(unix)]
fn died_from_interrupt(status: &std::process::ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    const SIGINT: i32 = 2;
    status.signal() == Some(SIGINT)
}

#[cfg(windows)]
fn died_from_interrupt(_status: &std::process::ExitStatus) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_success() {
        let dir = tempfile::tempdir().unwrap();
        let status = run_command("true", dir.path()).unwrap();
        assert!(status.success());
        assert_eq!(status.exit_code, 0);
    }

    #[test]
    fn test_run_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let status = run_command("exit 42", dir.path()).unwrap();
        assert!(!status.success());
        assert_eq!(status.exit_code, 42);
    }

    #[test]
    fn test_run_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        run_command("pwd > where.txt", dir.path()).unwrap();
        let recorded = std::fs::read_to_string(dir.path().join("where.txt")).unwrap();
        let recorded = Path::new(recorded.trim()).canonicalize().unwrap();
        assert_eq!(recorded, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn test_run_multiline() {
        let dir = tempfile::tempdir().unwrap();
        let status = run_command("echo one > out.txt\necho two >> out.txt", dir.path()).unwrap();
        assert!(status.success());
        let content = std::fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_sigint_detected() {
        let dir = tempfile::tempdir().unwrap();
        let status = run_command("kill -INT $$", dir.path()).unwrap();
        assert!(status.interrupted);
        assert!(!status.success());
    }

    #[test]
    fn test_run_inherits_environment() {
        let dir = tempfile::tempdir().unwrap();
        // PATH is always present in the inherited environment
        let status = run_command("test -n \"$PATH\"", dir.path()).unwrap();
        assert!(status.success());
    }
}
