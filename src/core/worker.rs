//! Background execution of runs so the UI thread never blocks on a process.
//!
//! One worker thread owns the `ProcessRunner` and takes jobs from a FIFO
//! queue, so at most one external process runs at a time and results never
//! interleave. Every job gets a `RunId`; every event carries it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::core::diagnostics::Finding;
use crate::core::id::RunId;
use crate::core::launch::LaunchedProcess;
use crate::core::process::KillSwitch;
use crate::core::runner::{ProcessRunner, RunRequest, RunResult, RunSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    Run(RunRequest),
    /// Compile, then launch the executable
    CompileAndRun { source: RunSource, flags: Vec<String> },
    /// `tcc -run` inside a terminal window
    Interactive(PathBuf),
    Analyze(PathBuf),
    /// Forget cached tools and probe again
    Detect,
}

impl Job {
    pub fn describe(&self) -> String {
        match self {
            Job::Run(req) => format!("{} run", req.mode.as_str()),
            Job::CompileAndRun {
                source: RunSource::Path(path),
                ..
            } => format!("compile and run {}", path.display()),
            Job::CompileAndRun { .. } => "compile and run".to_string(),
            Job::Interactive(source) => format!("interactive run of {}", source.display()),
            Job::Analyze(source) => format!("analysis of {}", source.display()),
            Job::Detect => "tool detection".to_string(),
        }
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    Run(RunResult),
    /// Program started outside the runner; `pid` is set when it is tracked
    Launched { result: RunResult, pid: Option<u32> },
    Analysis(Vec<Finding>),
    Detected { compiler: String, interpreter: String },
}

#[derive(Debug)]
pub enum RunEvent {
    Started { id: RunId, job: String },
    Finished { id: RunId, outcome: RunOutcome },
}

impl RunEvent {
    pub fn id(&self) -> RunId {
        match self {
            RunEvent::Started { id, .. } | RunEvent::Finished { id, .. } => *id,
        }
    }
}

type Tracked = Arc<Mutex<Option<LaunchedProcess>>>;

pub struct RunController {
    jobs: Option<Sender<(RunId, Job)>>,
    worker: Option<JoinHandle<()>>,
    kill: KillSwitch,
    launched: Tracked,
    shutting_down: Arc<AtomicBool>,
    next_id: u64,
}

impl RunController {
    /// Move `runner` onto a worker thread. Events are delivered through `sink`
    /// on that thread, so the sink should only hand them off (e.g. an mpsc
    /// sender to the UI loop).
    pub fn spawn<F>(runner: ProcessRunner, sink: F) -> std::io::Result<Self>
    where
        F: Fn(RunEvent) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<(RunId, Job)>();
        let kill = runner.kill_switch();
        let launched: Tracked = Arc::new(Mutex::new(None));
        let shutting_down = Arc::new(AtomicBool::new(false));

        let worker_kill = kill.clone();
        let worker_launched = Arc::clone(&launched);
        let worker_shutdown = Arc::clone(&shutting_down);
        let worker = thread::Builder::new()
            .name("chix-runner".to_string())
            .spawn(move || {
                let mut runner = runner;
                for (id, job) in rx {
                    if worker_shutdown.load(Ordering::SeqCst) {
                        tracing::debug!("dropping queued {} during shutdown", id);
                        continue;
                    }
                    sink(RunEvent::Started {
                        id,
                        job: job.describe(),
                    });
                    worker_kill.begin();
                    let outcome = execute(&mut runner, job, &worker_launched);
                    worker_kill.finish();
                    sink(RunEvent::Finished { id, outcome });
                }
            })?;

        Ok(Self {
            jobs: Some(tx),
            worker: Some(worker),
            kill,
            launched,
            shutting_down,
            next_id: 1,
        })
    }

    /// Queue a job behind any already submitted
    pub fn submit(&mut self, job: Job) -> Option<RunId> {
        let id = RunId(self.next_id);
        self.next_id += 1;
        let sent = self
            .jobs
            .as_ref()
            .map(|tx| tx.send((id, job)).is_ok())
            .unwrap_or(false);
        if sent {
            tracing::debug!("queued {}", id);
            Some(id)
        } else {
            tracing::warn!("run worker is gone, {} not queued", id);
            None
        }
    }

    /// True while the worker is executing a job
    pub fn is_busy(&self) -> bool {
        self.kill.in_job()
    }

    /// Terminate the process in flight and the tracked launched program.
    /// A stop that arrives before the job has spawned anything still ends
    /// the job's next process. Returns whether anything was stopped.
    pub fn stop_execution(&self) -> bool {
        let cancelled = self.kill.trip();
        let stopped = match self.launched.lock() {
            Ok(mut guard) => guard.take().map(|mut p| p.stop()).unwrap_or(false),
            Err(_) => false,
        };
        if cancelled || stopped {
            tracing::info!("execution stopped");
        }
        cancelled || stopped
    }

    /// Reap the tracked program if it exited on its own.
    /// Returns its pid and exit code (`None` when killed by a signal).
    pub fn reap_finished(&self) -> Option<(u32, Option<i32>)> {
        let mut guard = self.launched.lock().ok()?;
        let code = guard.as_mut()?.try_exit()?;
        let process = guard.take()?;
        tracing::debug!("program {} exited on its own", process.id());
        Some((process.id(), code))
    }
}

impl Drop for RunController {
    fn drop(&mut self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.kill.trip();
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("run worker panicked");
            }
        }
    }
}

fn execute(runner: &mut ProcessRunner, job: Job, launched: &Tracked) -> RunOutcome {
    match job {
        Job::Run(request) => RunOutcome::Run(runner.run(&request)),
        Job::CompileAndRun { source, flags } => {
            let (result, process) = match &source {
                RunSource::Path(path) => runner.compile_and_run(path, &flags),
                RunSource::Text(code) => runner.compile_and_run_code(code, &flags),
            };
            let pid = process.map(|p| track(launched, p));
            RunOutcome::Launched { result, pid }
        }
        Job::Interactive(source) => match runner.run_interactive(&source) {
            Ok(process) => {
                let pid = track(launched, process);
                let result = RunResult {
                    success: true,
                    message: format!("Started {} in a new window", source.display()),
                    raw_output: String::new(),
                    warnings: Vec::new(),
                    errors: Vec::new(),
                    executable_path: None,
                    failure: None,
                };
                RunOutcome::Launched {
                    result,
                    pid: Some(pid),
                }
            }
            Err(failure) => RunOutcome::Launched {
                result: RunResult::failed(failure),
                pid: None,
            },
        },
        Job::Analyze(source) => RunOutcome::Analysis(runner.analyze(&source)),
        Job::Detect => {
            runner.redetect();
            RunOutcome::Detected {
                compiler: runner.compiler_info(),
                interpreter: runner.interpreter_info(),
            }
        }
    }
}

/// Replace the tracked program. A previous one still running is stopped.
fn track(launched: &Tracked, process: LaunchedProcess) -> u32 {
    let pid = process.id();
    if let Ok(mut guard) = launched.lock() {
        if let Some(mut previous) = guard.replace(process) {
            if previous.stop() {
                tracing::info!("stopped previous program {}", previous.id());
            }
        }
    }
    pid
}
