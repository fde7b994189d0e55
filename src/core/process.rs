//! Bounded subprocess execution.
//!
//! Each pipe of the child is drained by a dedicated blocking reader thread
//! that forwards chunks over a channel. The calling thread waits on that
//! channel with a deadline, so there is no sleep-based polling while the
//! child is producing output. A run ends in one of three ways: both pipes
//! close and the child exits, the deadline passes, or a `KillSwitch` is
//! tripped. The last two kill the child's whole process tree and reap the
//! child before returning.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// How a captured run finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

/// Output of a finished (or forcibly ended) child process
#[derive(Debug, Clone)]
pub struct Captured {
    pub stdout: String,
    pub stderr: String,
    pub ending: Ending,
}

impl Captured {
    /// Exit code, if the process exited normally
    pub fn exit_code(&self) -> Option<i32> {
        match self.ending {
            Ending::Exited(status) => status.code(),
            _ => None,
        }
    }

    /// True only for a normal exit with code 0
    pub fn success(&self) -> bool {
        matches!(self.ending, Ending::Exited(status) if status.success())
    }
}

#[derive(Debug, Clone, Copy)]
enum Pipe {
    Stdout,
    Stderr,
}

enum Signal {
    Chunk(Pipe, Vec<u8>),
    Closed,
    Cancel,
}

#[derive(Default)]
struct SwitchState {
    /// A job is in progress, possibly between two processes
    in_job: bool,
    /// Tripped while no process was attached
    cancel_pending: bool,
    armed: Option<Sender<Signal>>,
}

/// Handle that lets another thread stop the run currently in flight.
///
/// A switch is armed for the duration of one `run_captured` call. Between
/// `begin` and `finish` a trip that finds nothing armed is latched and ends
/// the next armed run immediately. Outside a job, tripping does nothing.
#[derive(Clone, Default)]
pub struct KillSwitch {
    state: Arc<Mutex<SwitchState>>,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request termination of the armed run. Returns false if nothing is running.
    pub fn trip(&self) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if let Some(tx) = state.armed.as_ref() {
            return tx.send(Signal::Cancel).is_ok();
        }
        if state.in_job {
            state.cancel_pending = true;
        }
        state.in_job
    }

    /// True while a run is attached to this switch
    pub fn is_armed(&self) -> bool {
        match self.state.lock() {
            Ok(state) => state.armed.is_some(),
            Err(_) => false,
        }
    }

    /// True between `begin` and `finish`
    pub fn in_job(&self) -> bool {
        match self.state.lock() {
            Ok(state) => state.in_job,
            Err(_) => false,
        }
    }

    /// Mark the start of a job that may spawn several processes
    pub fn begin(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.in_job = true;
            state.cancel_pending = false;
        }
    }

    /// End the job; a latched cancel that was never delivered is dropped
    pub fn finish(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.in_job = false;
            state.cancel_pending = false;
        }
    }

    fn arm(&self, tx: Sender<Signal>) {
        if let Ok(mut state) = self.state.lock() {
            if state.cancel_pending {
                state.cancel_pending = false;
                let _ = tx.send(Signal::Cancel);
            }
            state.armed = Some(tx);
        }
    }

    fn disarm(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.armed = None;
        }
    }
}

impl std::fmt::Debug for KillSwitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KillSwitch")
            .field("armed", &self.is_armed())
            .finish()
    }
}

/// Run `command` to completion with stdout/stderr captured, bounded by `timeout`.
///
/// Spawn failures are returned as `Err`; everything after a successful spawn
/// (including timeouts and cancellation) is reported through `Captured::ending`.
pub fn run_captured(
    mut command: Command,
    timeout: Duration,
    kill: Option<&KillSwitch>,
) -> std::io::Result<Captured> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    own_process_group(&mut command);

    let mut child = command.spawn()?;
    // No deadline when the timeout is too large to represent
    let deadline = Instant::now().checked_add(timeout);

    let (tx, rx) = mpsc::channel();
    match child.stdout.take() {
        Some(out) => spawn_reader(out, Pipe::Stdout, tx.clone()),
        None => {
            let _ = tx.send(Signal::Closed);
        }
    }
    match child.stderr.take() {
        Some(err) => spawn_reader(err, Pipe::Stderr, tx.clone()),
        None => {
            let _ = tx.send(Signal::Closed);
        }
    }
    if let Some(switch) = kill {
        switch.arm(tx.clone());
    }
    drop(tx);

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut open_pipes = 2;

    let forced = loop {
        if open_pipes == 0 {
            break None;
        }
        let remaining = match deadline {
            Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                Some(left) if !left.is_zero() => left,
                _ => break Some(Ending::TimedOut),
            },
            None => Duration::MAX,
        };
        match rx.recv_timeout(remaining) {
            Ok(Signal::Chunk(Pipe::Stdout, bytes)) => stdout.extend_from_slice(&bytes),
            Ok(Signal::Chunk(Pipe::Stderr, bytes)) => stderr.extend_from_slice(&bytes),
            Ok(Signal::Closed) => open_pipes -= 1,
            Ok(Signal::Cancel) => break Some(Ending::Cancelled),
            Err(RecvTimeoutError::Timeout) => break Some(Ending::TimedOut),
            Err(RecvTimeoutError::Disconnected) => break None,
        }
    };

    if let Some(switch) = kill {
        switch.disarm();
    }

    let ending = match forced {
        Some(ending) => {
            terminate(&mut child);
            // Keep whatever the readers delivered before the kill
            while let Ok(signal) = rx.try_recv() {
                match signal {
                    Signal::Chunk(Pipe::Stdout, bytes) => stdout.extend_from_slice(&bytes),
                    Signal::Chunk(Pipe::Stderr, bytes) => stderr.extend_from_slice(&bytes),
                    _ => {}
                }
            }
            ending
        }
        None => wait_until(&mut child, deadline)?,
    };

    Ok(Captured {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        ending,
    })
}

fn spawn_reader<R: Read + Send + 'static>(mut reader: R, pipe: Pipe, tx: Sender<Signal>) {
    thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(Signal::Chunk(pipe, buf[..n].to_vec())).is_err() {
                        return;
                    }
                }
            }
        }
        let _ = tx.send(Signal::Closed);
    });
}

/// Both pipes are closed; the exit normally follows immediately.
fn wait_until(child: &mut Child, deadline: Option<Instant>) -> std::io::Result<Ending> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Ending::Exited(status));
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            terminate(child);
            return Ok(Ending::TimedOut);
        }
        thread::sleep(Duration::from_millis(5));
    }
}

/// Unconditional kill of the child and everything it started, followed by a
/// reap so no zombie is left behind.
fn terminate(child: &mut Child) {
    kill_tree(child);
    if let Err(e) = child.kill() {
        tracing::debug!("kill of pid {} failed: {}", child.id(), e);
    }
    if let Err(e) = child.wait() {
        tracing::warn!("reaping pid {} failed: {}", child.id(), e);
    }
}

/// The child leads a new process group, so a compiler driver's helpers
/// (cc1, as, ld) can be killed together with it.
#[cfg(unix)]
fn own_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_command: &mut Command) {}

/// Must run before the child is reaped, while its pid still names the group.
#[cfg(unix)]
fn kill_tree(child: &Child) {
    use nix::sys::signal::{self, killpg};
    use nix::unistd::Pid;

    let Ok(pgid) = i32::try_from(child.id()) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pgid), signal::SIGKILL) {
        tracing::debug!("kill of process group {} failed: {}", pgid, e);
    }
}

#[cfg(windows)]
fn kill_tree(child: &Child) {
    let pid = child.id().to_string();
    let killed = Command::new("taskkill")
        .args(["/F", "/T", "/PID", pid.as_str()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(e) = killed {
        tracing::debug!("taskkill of {} failed: {}", pid, e);
    }
}

#[cfg(not(any(unix, windows)))]
fn kill_tree(_child: &Child) {}
