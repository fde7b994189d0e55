//! Running a program "interactively": in a new terminal window when one can be
//! spawned, otherwise attached to our own standard streams.

use std::path::Path;
use std::process::{Child, Command, Stdio};

/// How a launched program was started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchStrategy {
    /// Launcher argv prefix that succeeded, e.g. `["xterm", "-e"]`
    Terminal(Vec<String>),
    /// Windows new-console creation flag
    NewConsole,
    /// No terminal could be spawned; the program shares our stdio
    Direct,
}

/// A program started by compile-and-run, tracked so it can be stopped.
#[derive(Debug)]
pub struct LaunchedProcess {
    child: Child,
    pub strategy: LaunchStrategy,
}

impl LaunchedProcess {
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// True while the process (or its terminal) has not exited
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Exit code once the process has exited (reaping it), `None` while running.
    /// The inner `None` means it was killed by a signal.
    pub fn try_exit(&mut self) -> Option<Option<i32>> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.code()),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!("status of pid {} unavailable: {}", self.child.id(), e);
                None
            }
        }
    }

    /// Terminate unconditionally and reap. Returns false if it had already exited.
    pub fn stop(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        let killed = self.child.kill().is_ok();
        let _ = self.child.wait();
        killed
    }

    /// Block until the process exits, returning its exit code
    pub fn wait(&mut self) -> std::io::Result<Option<i32>> {
        Ok(self.child.wait()?.code())
    }
}

/// Platform terminal launchers, tried in order
pub fn default_terminals() -> Vec<Vec<String>> {
    let owned = |argv: &[&str]| argv.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    if cfg!(target_os = "macos") {
        vec![owned(&["open", "-a", "Terminal"])]
    } else if cfg!(windows) {
        Vec::new()
    } else {
        vec![
            owned(&["x-terminal-emulator", "-e"]),
            owned(&["gnome-terminal", "--"]),
            owned(&["konsole", "-e"]),
            owned(&["xterm", "-e"]),
        ]
    }
}

/// Launch `program args...` in the first terminal that spawns; fall back to a
/// direct child sharing our stdio. Only the direct fallback's failure is an error.
pub fn launch(
    program: &Path,
    args: &[String],
    terminals: &[Vec<String>],
) -> std::io::Result<LaunchedProcess> {
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NEW_CONSOLE: u32 = 0x0000_0010;
        let mut cmd = Command::new(program);
        cmd.args(args).creation_flags(CREATE_NEW_CONSOLE);
        match cmd.spawn() {
            Ok(child) => {
                return Ok(LaunchedProcess {
                    child,
                    strategy: LaunchStrategy::NewConsole,
                });
            }
            Err(e) => tracing::debug!("new console launch failed: {}", e),
        }
    }

    for launcher in terminals {
        let Some((head, rest)) = launcher.split_first() else {
            continue;
        };
        let mut cmd = Command::new(head);
        cmd.args(rest)
            .arg(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        match cmd.spawn() {
            Ok(child) => {
                tracing::info!("launched {} via {}", program.display(), head);
                return Ok(LaunchedProcess {
                    child,
                    strategy: LaunchStrategy::Terminal(launcher.clone()),
                });
            }
            Err(e) => tracing::debug!("terminal {} unavailable: {}", head, e),
        }
    }

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()?;
    tracing::info!("launched {} directly", program.display());
    Ok(LaunchedProcess {
        child,
        strategy: LaunchStrategy::Direct,
    })
}
