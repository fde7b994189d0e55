//! This module defines the central `EditorApp` structure: the explicit
//! application context holding the open tabs, the current project, editor
//! settings, and the output pane that run results are written into.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::core::autosave::AutosaveStore;
use crate::core::diagnostics::Finding;
use crate::core::id::{DocumentId, RunId};
use crate::core::project::ProjectManager;
use crate::core::recent::RecentFiles;
use crate::core::runner::{RunMode, RunRequest, RunResult, RunSource};
use crate::core::settings::EditorSettings;
use crate::core::tabs::TabSet;
use crate::core::worker::{Job, RunEvent, RunOutcome};

/// Kind of an output pane line, used for its prefix and colour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Info,
    Success,
    Warning,
    Error,
    /// Verbatim program or compiler output
    Plain,
}

impl OutputKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            OutputKind::Info => "[INFO] ",
            OutputKind::Success => "[SUCCESS] ",
            OutputKind::Warning => "[WARNING] ",
            OutputKind::Error => "[ERROR] ",
            OutputKind::Plain => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub kind: OutputKind,
    pub text: String,
}

/// EditorApp: the root application state.
pub struct EditorApp {
    pub config: Config,
    pub settings: EditorSettings,
    pub tabs: TabSet,
    pub projects: ProjectManager,
    pub recent: RecentFiles,
    /// Mode used by `run`
    pub mode: RunMode,
    /// Lines written since the last `take_output`
    output: Vec<OutputLine>,
    /// Status/error message to display to user
    pub message: Option<String>,
    /// Most recently submitted run; older results are still shown
    pub last_run: Option<RunId>,
}

impl EditorApp {
    pub fn new(config: Config, store: AutosaveStore, recent: RecentFiles) -> Self {
        let settings = EditorSettings::from_config(&config);
        let mode = config
            .get_string("mode")
            .and_then(RunMode::parse)
            .unwrap_or_default();
        Self {
            config,
            settings,
            tabs: TabSet::new(store),
            projects: ProjectManager::new(),
            recent,
            mode,
            output: Vec::new(),
            message: None,
            last_run: None,
        }
    }

    /// Build the app from configuration and open the startup paths.
    /// Directories are opened as projects, anything else as a file.
    pub fn initialize_with_config(config: Config, paths: &[PathBuf]) -> Self {
        let recent = RecentFiles::load(RecentFiles::default_path());
        let mut app = Self::new(config, AutosaveStore::default(), recent);
        for path in paths {
            app.open_path(path);
        }
        app
    }

    // ==================== Files & projects ====================

    pub fn open_path(&mut self, path: &Path) {
        if path.is_dir() {
            self.open_project(path);
        } else {
            self.open_file(path);
        }
    }

    pub fn open_file(&mut self, path: &Path) -> DocumentId {
        let id = self.tabs.open_file(path);
        self.recent.add(path);
        self.set_message(format!("Opened {}", path.display()));
        id
    }

    pub fn open_project(&mut self, path: &Path) -> bool {
        match self
            .projects
            .open_project(path, &mut self.settings, &mut self.tabs)
        {
            Ok(_) => {
                let name = self.projects.name().unwrap_or_default().to_string();
                self.set_message(format!("Project opened: {}", name));
                true
            }
            Err(e) => {
                self.set_message(e.to_string());
                false
            }
        }
    }

    pub fn create_project(&mut self, path: &Path, template: Option<&str>) -> bool {
        match self.projects.create_project(path, template, &self.settings) {
            Ok(()) => {
                let main_c = path.join("src").join("main.c");
                if main_c.is_file() {
                    self.open_file(&main_c);
                }
                self.set_message(format!("Project created: {}", path.display()));
                true
            }
            Err(e) => {
                self.set_message(e.to_string());
                false
            }
        }
    }

    pub fn save_project_state(&mut self) -> bool {
        let saved = self.projects.save_state(&self.settings, &self.tabs);
        if saved {
            self.set_message("Project state saved");
        } else if self.projects.current_root().is_none() {
            self.set_message("No project is open");
        }
        saved
    }

    /// Persist project state on exit
    pub fn shutdown(&mut self) {
        self.projects.close_project(&self.settings, &self.tabs);
    }

    // ==================== Runs ====================

    /// Build the job for `run` from the active tab and current mode.
    ///
    /// Interpretation always uses the buffer text. Compilation uses the file
    /// when it is saved and unmodified, else the buffer text.
    pub fn run_job(&self) -> Job {
        let doc = self.tabs.active();
        match self.mode {
            RunMode::Interpret => {
                Job::Run(RunRequest::new(RunSource::Text(doc.text()), RunMode::Interpret))
            }
            RunMode::Compile => {
                let source = match &doc.path {
                    Some(path) if !doc.is_modified() && path.exists() => {
                        RunSource::Path(path.clone())
                    }
                    _ => RunSource::Text(doc.text()),
                };
                Job::CompileAndRun {
                    source,
                    flags: Vec::new(),
                }
            }
        }
    }

    /// Path of the active tab if it is saved, for jobs that need a real file
    pub fn saved_active_path(&self) -> Result<PathBuf, String> {
        let doc = self.tabs.active();
        match &doc.path {
            Some(path) if !doc.is_modified() && path.exists() => Ok(path.clone()),
            Some(_) => Err(format!("Save {} first", doc.display_name())),
            None => Err("Save the file first".to_string()),
        }
    }

    /// Fold a worker event into the output pane
    pub fn apply_run_event(&mut self, event: RunEvent) {
        match event {
            RunEvent::Started { job, .. } => {
                self.push_output(OutputKind::Info, format!("Starting {}...", job));
            }
            RunEvent::Finished { outcome, .. } => match outcome {
                RunOutcome::Run(result) => self.report_result(&result, false),
                RunOutcome::Launched { result, pid } => {
                    self.report_result(&result, true);
                    if let Some(pid) = pid {
                        self.push_output(OutputKind::Info, format!("Program running (pid {})", pid));
                    }
                }
                RunOutcome::Analysis(findings) => self.report_findings(&findings),
                RunOutcome::Detected {
                    compiler,
                    interpreter,
                } => {
                    self.push_output(OutputKind::Info, compiler);
                    self.push_output(OutputKind::Info, interpreter);
                }
            },
        }
    }

    fn report_result(&mut self, result: &RunResult, launched: bool) {
        self.output.extend(result_lines(result, launched));
        self.set_message(result.message.clone());
    }

    fn report_findings(&mut self, findings: &[Finding]) {
        self.output.extend(finding_lines(findings));
        let errors = findings.iter().filter(|f| f.is_error()).count();
        let warnings = findings.iter().filter(|f| f.is_warning()).count();
        self.set_message(format!("Analysis: {} errors, {} warnings", errors, warnings));
    }

    // ==================== Output & status ====================

    pub fn push_output(&mut self, kind: OutputKind, text: impl Into<String>) {
        self.output.push(OutputLine {
            kind,
            text: text.into(),
        });
    }

    pub fn output(&self) -> &[OutputLine] {
        &self.output
    }

    /// Drain lines for display
    pub fn take_output(&mut self) -> Vec<OutputLine> {
        std::mem::take(&mut self.output)
    }

    pub fn set_message(&mut self, msg: impl Into<String>) {
        self.message = Some(msg.into());
    }

    pub fn take_message(&mut self) -> Option<String> {
        self.message.take()
    }
}

/// Output pane lines for a run result. Program output is shown only for runs
/// whose output was captured (not for programs launched in their own window).
pub fn result_lines(result: &RunResult, launched: bool) -> Vec<OutputLine> {
    let line = |kind, text: &str| OutputLine {
        kind,
        text: text.to_string(),
    };
    let mut lines = Vec::new();
    if result.success {
        lines.push(line(OutputKind::Success, &result.message));
        for warning in &result.warnings {
            lines.push(line(OutputKind::Warning, warning));
        }
        if !launched && !result.raw_output.is_empty() {
            lines.push(line(OutputKind::Plain, &result.raw_output));
        }
    } else {
        lines.push(line(OutputKind::Error, &result.message));
        for error in &result.errors {
            lines.push(line(OutputKind::Plain, error));
        }
        for warning in &result.warnings {
            lines.push(line(OutputKind::Warning, warning));
        }
    }
    lines
}

/// Output pane lines for analysis findings
pub fn finding_lines(findings: &[Finding]) -> Vec<OutputLine> {
    if findings.is_empty() {
        return vec![OutputLine {
            kind: OutputKind::Success,
            text: "No issues found".to_string(),
        }];
    }
    findings
        .iter()
        .map(|finding| {
            let kind = if finding.is_error() {
                OutputKind::Error
            } else if finding.is_warning() {
                OutputKind::Warning
            } else {
                OutputKind::Plain
            };
            let text = match &finding.location {
                Some(loc) => format!(
                    "{}:{}:{}: {}",
                    loc.file.display(),
                    loc.line,
                    loc.column,
                    finding.message
                ),
                None => finding.message.clone(),
            };
            OutputLine { kind, text }
        })
        .collect()
}
