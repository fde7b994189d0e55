//! Compile, interpret and analyze C sources through external tools.
//!
//! `ProcessRunner` finds a compiler (gcc/clang/tcc) and an interpreter
//! (`tcc -run`), caches what it found, and turns every way a run can go wrong
//! into a `RunResult` instead of an error the caller has to handle.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Config;
use crate::core::diagnostics::{Finding, OutputClassifier, Severity, parse_findings};
use crate::core::error::RunFailure;
use crate::core::launch::{self, LaunchedProcess};
use crate::core::process::{Captured, Ending, KillSwitch, run_captured};
use crate::core::tool::{self, ToolHandle, ToolKind};

/// Flags that make diagnostics parseable as plain text
const WARNING_FLAGS: &[&str] = &["-Wall", "-Wextra", "-fdiagnostics-color=never"];
const ANALYZE_FLAGS: &[&str] = &[
    "-fsyntax-only",
    "-Wall",
    "-Wextra",
    "-Wpedantic",
    "-fdiagnostics-color=never",
];

/// Longest accepted run timeout; larger settings are capped here
pub const MAX_RUN_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);
const MAX_PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Whether a run compiles to an executable or interprets the source directly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Compile,
    Interpret,
}

impl RunMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "compile" | "compiler" => Some(RunMode::Compile),
            "interpret" | "interpreter" => Some(RunMode::Interpret),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Compile => "compile",
            RunMode::Interpret => "interpret",
        }
    }
}

/// What to run: a file on disk or in-memory text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunSource {
    Path(PathBuf),
    Text(String),
}

/// Input of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub source: RunSource,
    pub mode: RunMode,
    pub extra_flags: Vec<String>,
}

impl RunRequest {
    pub fn new(source: RunSource, mode: RunMode) -> Self {
        Self {
            source,
            mode,
            extra_flags: Vec::new(),
        }
    }

    pub fn with_flags(mut self, flags: Vec<String>) -> Self {
        self.extra_flags = flags;
        self
    }
}

/// Outcome of a compile or interpret run. Produced once, never mutated by callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub success: bool,
    /// Short status line
    pub message: String,
    /// Program stdout (interpret) or compiler stdout+stderr (compile)
    pub raw_output: String,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    /// Set only for a successful compile
    pub executable_path: Option<PathBuf>,
    pub failure: Option<RunFailure>,
}

impl RunResult {
    /// Result of a run that never produced output
    pub fn failed(failure: RunFailure) -> Self {
        Self {
            success: false,
            message: failure.to_string(),
            raw_output: String::new(),
            warnings: Vec::new(),
            errors: vec![failure.to_string()],
            executable_path: None,
            failure: Some(failure),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(&self.failure, Some(f) if f.is_timeout())
    }
}

/// Tool discovery and run limits
#[derive(Debug, Clone)]
pub struct ToolchainConfig {
    pub compiler_candidates: Vec<String>,
    pub interpreter_candidates: Vec<String>,
    /// Checked for existence when no interpreter candidate responds
    pub interpreter_paths: Vec<PathBuf>,
    pub probe_timeout: Duration,
    pub run_timeout: Duration,
    pub analyze_timeout: Duration,
    pub info_timeout: Duration,
    /// Terminal launchers for compile-and-run, tried in order
    pub terminals: Vec<Vec<String>>,
    /// Where executables go when no output path is given
    pub build_dir: PathBuf,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            compiler_candidates: tool::default_compiler_candidates(),
            interpreter_candidates: vec!["tcc".to_string()],
            interpreter_paths: tool::default_interpreter_paths(),
            probe_timeout: Duration::from_secs(1),
            run_timeout: Duration::from_secs(10),
            analyze_timeout: Duration::from_secs(5),
            info_timeout: Duration::from_secs(2),
            terminals: launch::default_terminals(),
            build_dir: std::env::temp_dir().join("chix_compiler"),
        }
    }
}

impl ToolchainConfig {
    /// Defaults overridden by `run_timeout_secs`, `probe_timeout_ms` and `compiler`
    pub fn from_config(config: &Config) -> Self {
        let mut tc = Self::default();
        if let Some(timeout) =
            config.get_duration("run_timeout_secs", Duration::from_secs(1), MAX_RUN_TIMEOUT)
        {
            tc.run_timeout = timeout;
        }
        if let Some(timeout) =
            config.get_duration("probe_timeout_ms", Duration::from_millis(1), MAX_PROBE_TIMEOUT)
        {
            tc.probe_timeout = timeout;
        }
        // A preferred compiler is probed before the defaults
        if let Some(cc) = config.get_nonempty("compiler") {
            tc.compiler_candidates.retain(|c| c != cc);
            tc.compiler_candidates.insert(0, cc.to_string());
        }
        tc
    }
}

/// Cached detection result: `None` = not probed yet
type Detected = Option<Option<ToolHandle>>;

pub struct ProcessRunner {
    config: ToolchainConfig,
    compiler: Detected,
    interpreter: Detected,
    kill: KillSwitch,
    /// Executable of the last `compile_code`, replaced by the next one
    scratch: Option<PathBuf>,
}

impl ProcessRunner {
    pub fn new(config: ToolchainConfig) -> Self {
        Self {
            config,
            compiler: None,
            interpreter: None,
            kill: KillSwitch::new(),
            scratch: None,
        }
    }

    pub fn config(&self) -> &ToolchainConfig {
        &self.config
    }

    /// Switch that stops the run in flight from another thread
    pub fn kill_switch(&self) -> KillSwitch {
        self.kill.clone()
    }

    // ==================== Detection ====================

    /// First responding compiler candidate; probed once, then cached
    pub fn detect_compiler(&mut self) -> Option<ToolHandle> {
        if self.compiler.is_none() {
            let found = tool::detect_first(
                ToolKind::Compiler,
                &self.config.compiler_candidates,
                "--version",
                self.config.probe_timeout,
            );
            if found.is_none() {
                tracing::warn!("no C compiler found among {:?}", self.config.compiler_candidates);
            }
            self.compiler = Some(found);
        }
        self.compiler.clone().flatten()
    }

    /// Interpreter on PATH, else a known install location; cached
    pub fn detect_interpreter(&mut self) -> Option<ToolHandle> {
        if self.interpreter.is_none() {
            let found = tool::detect_first(
                ToolKind::Interpreter,
                &self.config.interpreter_candidates,
                "-version",
                self.config.probe_timeout,
            )
            .or_else(|| {
                tool::find_installed(ToolKind::Interpreter, &self.config.interpreter_paths, "-version")
            });
            if found.is_none() {
                tracing::warn!("no C interpreter (tcc) found");
            }
            self.interpreter = Some(found);
        }
        self.interpreter.clone().flatten()
    }

    /// Forget cached tools and probe again
    pub fn redetect(&mut self) -> (Option<ToolHandle>, Option<ToolHandle>) {
        self.compiler = None;
        self.interpreter = None;
        (self.detect_compiler(), self.detect_interpreter())
    }

    pub fn compiler_info(&mut self) -> String {
        match self.detect_compiler() {
            Some(cc) => cc.describe(self.config.info_timeout),
            None => "No C compiler detected. Please install GCC, Clang, or TCC.".to_string(),
        }
    }

    pub fn interpreter_info(&mut self) -> String {
        match self.detect_interpreter() {
            Some(tcc) => tcc.describe(self.config.info_timeout),
            None => "TCC (Tiny C Compiler) is not available. Please install TCC for interpretation mode."
                .to_string(),
        }
    }

    // ==================== Runs ====================

    /// Dispatch a request on its mode and source kind
    pub fn run(&mut self, request: &RunRequest) -> RunResult {
        match (&request.mode, &request.source) {
            (RunMode::Compile, RunSource::Path(path)) => {
                self.compile(path, None, &request.extra_flags)
            }
            (RunMode::Compile, RunSource::Text(code)) => {
                self.compile_code(code, &request.extra_flags)
            }
            (RunMode::Interpret, RunSource::Path(path)) => self.interpret_file(path, &[]),
            (RunMode::Interpret, RunSource::Text(code)) => self.interpret_code(code, &[]),
        }
    }

    /// Compile `source` to `output` (default: build dir + file stem).
    pub fn compile(&mut self, source: &Path, output: Option<&Path>, extra_flags: &[String]) -> RunResult {
        let Some(cc) = self.detect_compiler() else {
            return RunResult::failed(RunFailure::ToolNotFound(ToolKind::Compiler));
        };
        if !source.exists() {
            return RunResult::failed(RunFailure::SourceNotFound(source.to_path_buf()));
        }

        let output = match output {
            Some(p) => p.to_path_buf(),
            None => self.default_output_path(source),
        };
        if let Some(parent) = output.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return RunResult::failed(RunFailure::Io(format!(
                    "cannot create {}: {}",
                    parent.display(),
                    e
                )));
            }
        }
        if output.exists() {
            if let Err(e) = std::fs::remove_file(&output) {
                return RunResult::failed(RunFailure::StaleOutput {
                    path: output,
                    reason: e.to_string(),
                });
            }
        }

        let mut cmd = cc.command();
        cmd.args(WARNING_FLAGS)
            .args(extra_flags)
            .arg(source)
            .arg("-o")
            .arg(&output);

        tracing::debug!("compiling {} with {}", source.display(), cc.name());
        let captured = match run_captured(cmd, self.config.run_timeout, Some(&self.kill)) {
            Ok(c) => c,
            Err(e) => return spawn_failure(&cc, e),
        };

        if let Some(result) = self.forced_ending(&captured, "Compilation") {
            return result;
        }

        let (warnings, errors) = OutputClassifier::classify(&captured.stderr);
        let raw_output = join_streams(&captured);

        if captured.success() {
            RunResult {
                success: true,
                message: "Compilation successful".to_string(),
                raw_output,
                warnings,
                errors: Vec::new(),
                executable_path: Some(output),
                failure: None,
            }
        } else {
            let errors = if errors.is_empty() {
                vec!["Compilation failed".to_string()]
            } else {
                errors
            };
            RunResult {
                success: false,
                message: "Compilation failed with errors".to_string(),
                raw_output,
                warnings,
                errors,
                executable_path: None,
                failure: Some(RunFailure::NonZeroExit(captured.exit_code())),
            }
        }
    }

    /// Compile unsaved text through a private temp source file.
    ///
    /// Only the newest scratch executable is kept in the build dir.
    pub fn compile_code(&mut self, code: &str, extra_flags: &[String]) -> RunResult {
        self.discard_scratch();
        let temp = match write_temp_source(code) {
            Ok(t) => t,
            Err(e) => return RunResult::failed(RunFailure::Io(e.to_string())),
        };
        let output = self.default_output_path(temp.path());
        let result = self.compile(temp.path(), Some(&output), extra_flags);
        if result.success {
            self.scratch = result.executable_path.clone();
        }
        result
        // temp source removed here on drop
    }

    fn discard_scratch(&mut self) {
        let Some(old) = self.scratch.take() else {
            return;
        };
        match std::fs::remove_file(&old) {
            Ok(()) => tracing::debug!("removed scratch executable {}", old.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            // A program still running from it may hold the file on some platforms
            Err(e) => tracing::debug!("keeping {}: {}", old.display(), e),
        }
    }

    /// Run `tcc -run source args...`
    pub fn interpret_file(&mut self, source: &Path, args: &[String]) -> RunResult {
        let Some(tcc) = self.detect_interpreter() else {
            return RunResult::failed(RunFailure::ToolNotFound(ToolKind::Interpreter));
        };
        if !source.exists() {
            return RunResult::failed(RunFailure::SourceNotFound(source.to_path_buf()));
        }

        let mut cmd = tcc.command();
        cmd.arg("-run").arg(source).args(args);

        tracing::debug!("interpreting {} with {}", source.display(), tcc.name());
        let captured = match run_captured(cmd, self.config.run_timeout, Some(&self.kill)) {
            Ok(c) => c,
            Err(e) => return spawn_failure(&tcc, e),
        };

        if let Some(result) = self.forced_ending(&captured, "Interpretation") {
            return result;
        }

        let (warnings, _) = OutputClassifier::classify(&captured.stderr);
        if captured.success() {
            RunResult {
                success: true,
                message: "Program finished".to_string(),
                raw_output: captured.stdout,
                warnings,
                errors: Vec::new(),
                executable_path: None,
                failure: None,
            }
        } else {
            let errors: Vec<String> = captured
                .stderr
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect();
            let errors = if errors.is_empty() {
                vec!["Unknown error".to_string()]
            } else {
                errors
            };
            RunResult {
                success: false,
                message: "Interpretation failed".to_string(),
                raw_output: join_streams(&captured),
                warnings,
                errors,
                executable_path: None,
                failure: Some(RunFailure::NonZeroExit(captured.exit_code())),
            }
        }
    }

    /// Interpret in-memory code. The temp file has a unique name per call and
    /// is removed on every exit path.
    pub fn interpret_code(&mut self, code: &str, args: &[String]) -> RunResult {
        let temp = match write_temp_source(code) {
            Ok(t) => t,
            Err(e) => return RunResult::failed(RunFailure::Io(e.to_string())),
        };
        self.interpret_file(temp.path(), args)
    }

    /// Compile, then start the executable in a terminal (or directly).
    ///
    /// A launch failure turns the successful compile result into a failure;
    /// the compile is not repeated.
    pub fn compile_and_run(
        &mut self,
        source: &Path,
        extra_flags: &[String],
    ) -> (RunResult, Option<LaunchedProcess>) {
        let result = self.compile(source, None, extra_flags);
        self.launch_built(result)
    }

    /// `compile_and_run` for unsaved text
    pub fn compile_and_run_code(
        &mut self,
        code: &str,
        extra_flags: &[String],
    ) -> (RunResult, Option<LaunchedProcess>) {
        let result = self.compile_code(code, extra_flags);
        self.launch_built(result)
    }

    fn launch_built(&mut self, mut result: RunResult) -> (RunResult, Option<LaunchedProcess>) {
        let Some(exe) = result.executable_path.clone() else {
            return (result, None);
        };
        if !result.success {
            return (result, None);
        }

        match launch::launch(&exe, &[], &self.config.terminals) {
            Ok(process) => (result, Some(process)),
            Err(e) => {
                tracing::warn!("launch of {} failed: {}", exe.display(), e);
                let failure = RunFailure::LaunchFailed(e.to_string());
                result.success = false;
                result.message = failure.to_string();
                result.errors.push(failure.to_string());
                result.failure = Some(failure);
                (result, None)
            }
        }
    }

    /// Interpret a saved file in a terminal window (`tcc -run` inside the launcher)
    pub fn run_interactive(&mut self, source: &Path) -> Result<LaunchedProcess, RunFailure> {
        let tcc = self
            .detect_interpreter()
            .ok_or(RunFailure::ToolNotFound(ToolKind::Interpreter))?;
        if !source.exists() {
            return Err(RunFailure::SourceNotFound(source.to_path_buf()));
        }
        let args = vec!["-run".to_string(), source.display().to_string()];
        launch::launch(&tcc.program, &args, &self.config.terminals)
            .map_err(|e| RunFailure::LaunchFailed(e.to_string()))
    }

    /// Syntax-only pass with strict warnings, parsed into findings.
    pub fn analyze(&mut self, source: &Path) -> Vec<Finding> {
        let Some(cc) = self.detect_compiler() else {
            return vec![Finding::new(Severity::Error, "No compiler available for analysis")];
        };
        if !source.exists() {
            return vec![Finding::new(Severity::Error, "Source file not found")];
        }

        let mut cmd = cc.command();
        cmd.args(ANALYZE_FLAGS).arg(source);
        match run_captured(cmd, self.config.analyze_timeout, Some(&self.kill)) {
            Ok(captured) => match captured.ending {
                Ending::TimedOut => vec![Finding::new(
                    Severity::Error,
                    format!(
                        "Analysis error: {}",
                        RunFailure::Timeout(self.config.analyze_timeout)
                    ),
                )],
                Ending::Cancelled => vec![Finding::new(Severity::Error, "Analysis was stopped")],
                Ending::Exited(_) => parse_findings(&captured.stderr),
            },
            Err(e) => vec![Finding::new(Severity::Error, format!("Analysis error: {}", e))],
        }
    }

    fn default_output_path(&self, source: &Path) -> PathBuf {
        let stem = match source.file_stem() {
            Some(s) => s.to_string_lossy().into_owned(),
            None => "program".to_string(),
        };
        let name = if cfg!(windows) {
            format!("{}.exe", stem)
        } else {
            stem
        };
        self.config.build_dir.join(name)
    }

    fn forced_ending(&self, captured: &Captured, what: &str) -> Option<RunResult> {
        let failure = match captured.ending {
            Ending::TimedOut => RunFailure::Timeout(self.config.run_timeout),
            Ending::Cancelled => RunFailure::Cancelled,
            Ending::Exited(_) => return None,
        };
        tracing::warn!("{} ended early: {}", what, failure);
        let mut result = RunResult::failed(failure);
        result.message = format!("{} {}", what, result.message.to_lowercase());
        result.raw_output = join_streams(captured);
        Some(result)
    }
}

fn spawn_failure(tool: &ToolHandle, e: std::io::Error) -> RunResult {
    RunResult::failed(RunFailure::Spawn {
        program: tool.name(),
        reason: e.to_string(),
    })
}

fn join_streams(captured: &Captured) -> String {
    let mut text = captured.stdout.clone();
    if !text.is_empty() && !captured.stderr.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(&captured.stderr);
    text
}

fn write_temp_source(code: &str) -> std::io::Result<tempfile::NamedTempFile> {
    let mut temp = tempfile::Builder::new()
        .prefix("chix-run-")
        .suffix(".c")
        .tempfile()?;
    temp.write_all(code.as_bytes())?;
    temp.flush()?;
    Ok(temp)
}
