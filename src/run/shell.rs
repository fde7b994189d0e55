//! Shell mode: a line-oriented editing session.
//!
//! Commands arrive from a stdin reader thread, run results from the run
//! worker, and both are multiplexed on one channel together with the autosave
//! timer. The UI state (`EditorApp`) is only ever touched from this loop.

use std::collections::HashSet;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::queue;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

use crate::config::Config;
use crate::core::app::{EditorApp, OutputKind, OutputLine};
use crate::core::autosave::Autosaver;
use crate::core::document::Document;
use crate::core::id::RunId;
use crate::core::runner::{ProcessRunner, RunMode, ToolchainConfig};
use crate::core::tabs::NoPrompt;
use crate::core::worker::{Job, RunController, RunEvent};

use super::ShellStyle;

const HELP: &str = "Commands:
  new                     open a blank tab
  open PATH               open a file, or a directory as project
  tabs                    list tabs (* active, + modified)
  select N | next | prev  switch tabs
  close[!]                close the active tab (! discards changes)
  show                    print the active buffer
  append TEXT             append a line
  set N TEXT              replace line N
  save | saveas PATH      write the active tab
  run                     run the active tab in the current mode
  interactive             run the saved file with tcc in a terminal
  analyze [PATH]          syntax-only check with strict warnings
  stop                    stop the running process
  mode [compile|interpret]
  detect                  probe compilers again
  project open PATH | create PATH [TEMPLATE] | save | close
  recover [N]             list or reopen autosave snapshots
  quit[!]                 exit (! discards changes)";

/// Everything the shell loop reacts to
#[derive(Debug)]
pub enum ShellEvent {
    Line(String),
    InputClosed,
    Run(RunEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Shell<W: Write> {
    pub app: EditorApp,
    runs: RunController,
    autosaver: Autosaver,
    style: ShellStyle,
    out: W,
    pending: HashSet<RunId>,
    input_closed: bool,
}

impl<W: Write> Shell<W> {
    pub fn new(
        app: EditorApp,
        runs: RunController,
        autosaver: Autosaver,
        style: ShellStyle,
        out: W,
    ) -> Self {
        Self {
            app,
            runs,
            autosaver,
            style,
            out,
            pending: HashSet::new(),
            input_closed: false,
        }
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Runs submitted and not yet finished
    pub fn pending_runs(&self) -> usize {
        self.pending.len()
    }

    /// Drive the loop until `quit` or until input ends and no run is pending.
    pub fn run(&mut self, events: Receiver<ShellEvent>) -> io::Result<()> {
        self.prompt()?;
        loop {
            if self.input_closed && self.pending.is_empty() {
                break;
            }
            let wait = self.autosaver.time_until_due(Instant::now());
            match events.recv_timeout(wait) {
                Ok(ShellEvent::Line(line)) => {
                    if self.handle_line(&line)? == Flow::Quit {
                        break;
                    }
                    self.prompt()?;
                }
                Ok(ShellEvent::InputClosed) => self.input_closed = true,
                Ok(ShellEvent::Run(event)) => self.handle_run_event(event)?,
                Err(RecvTimeoutError::Timeout) => self.autosave_tick(Instant::now())?,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        Ok(())
    }

    pub fn handle_run_event(&mut self, event: RunEvent) -> io::Result<()> {
        if let RunEvent::Finished { id, .. } = &event {
            self.pending.remove(id);
        }
        self.app.apply_run_event(event);
        self.reap_launched();
        self.flush_app()
    }

    pub fn autosave_tick(&mut self, now: Instant) -> io::Result<()> {
        let written = self.autosaver.tick(now, &mut self.app.tabs);
        if written > 0 {
            tracing::debug!("autosaved {} tabs", written);
        }
        if self.reap_launched() {
            self.flush_app()?;
        }
        Ok(())
    }

    /// Report a launched program that exited on its own
    fn reap_launched(&mut self) -> bool {
        let Some((pid, code)) = self.runs.reap_finished() else {
            return false;
        };
        let text = match code {
            Some(code) => format!("Program {} exited with code {}", pid, code),
            None => format!("Program {} was terminated by a signal", pid),
        };
        self.app.push_output(OutputKind::Info, text);
        true
    }

    /// Execute one command line
    pub fn handle_line(&mut self, line: &str) -> io::Result<Flow> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(Flow::Continue);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((w, r)) => (w, r.trim()),
            None => (line, ""),
        };
        let (word, force) = match word.strip_suffix('!') {
            Some(w) => (w, true),
            None => (word, false),
        };
        let command = self.app.config.resolve(word).to_string();

        let flow = self.execute(&command, rest, force);
        self.reap_launched();
        self.flush_app()?;
        Ok(flow)
    }

    fn execute(&mut self, command: &str, rest: &str, force: bool) -> Flow {
        match command {
            "new" => {
                self.app.tabs.create_tab(None, None);
                self.app.set_message("New tab");
            }
            "open" => match rest {
                "" => self.app.set_message("Usage: open PATH"),
                path => self.app.open_path(&PathBuf::from(path)),
            },
            "tabs" => self.list_tabs(),
            "select" => {
                let selected = rest
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| self.app.tabs.select_index(i));
                match selected {
                    Some(_) => self.announce_active(),
                    None => self.app.set_message("Usage: select N (see tabs)"),
                }
            }
            "next" => {
                self.app.tabs.next_tab();
                self.announce_active();
            }
            "prev" => {
                self.app.tabs.prev_tab();
                self.announce_active();
            }
            "close" => self.close_active(force),
            "show" => self.show_active(),
            "append" => {
                self.app.tabs.active_mut().append(&format!("{}\n", rest));
            }
            "set" => self.set_line(rest),
            "save" => self.save_active(None),
            "saveas" => match rest {
                "" => self.app.set_message("Usage: saveas PATH"),
                path => self.save_active(Some(PathBuf::from(path))),
            },
            "run" => {
                let job = self.app.run_job();
                self.submit(job);
            }
            "interactive" => match self.app.saved_active_path() {
                Ok(path) => self.submit(Job::Interactive(path)),
                Err(msg) => self.app.set_message(msg),
            },
            "analyze" => {
                let path = if rest.is_empty() {
                    self.app.saved_active_path()
                } else {
                    Ok(PathBuf::from(rest))
                };
                match path {
                    Ok(path) => self.submit(Job::Analyze(path)),
                    Err(msg) => self.app.set_message(msg),
                }
            }
            "stop" => {
                if self.runs.stop_execution() {
                    self.app.set_message("Execution stopped");
                } else {
                    self.app.set_message("Nothing is running");
                }
            }
            "mode" => {
                if let Some(mode) = RunMode::parse(rest) {
                    self.app.mode = mode;
                }
                let msg = format!("Mode: {}", self.app.mode.as_str());
                self.app.set_message(msg);
            }
            "detect" => self.submit(Job::Detect),
            "project" => self.project(rest),
            "recover" => self.recover(rest),
            "help" => self.app.push_output(OutputKind::Plain, HELP),
            "quit" => {
                if self.app.tabs.has_unsaved_changes() && !force {
                    self.app
                        .set_message("Unsaved changes (save them or use quit! to discard)");
                } else {
                    return Flow::Quit;
                }
            }
            other => self
                .app
                .set_message(format!("Unknown command: {} (try help)", other)),
        }
        Flow::Continue
    }

    fn submit(&mut self, job: Job) {
        match self.runs.submit(job) {
            Some(id) => {
                self.pending.insert(id);
                self.app.last_run = Some(id);
            }
            None => self.app.set_message("Run worker is not available"),
        }
    }

    fn announce_active(&mut self) {
        let name = self.app.tabs.active().display_name();
        self.app.set_message(format!("Active: {}", name));
    }

    fn list_tabs(&mut self) {
        let active = self.app.tabs.active_id();
        let lines: Vec<String> = self
            .app
            .tabs
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                format!(
                    "{} {}: {}{}",
                    if doc.id() == active { '*' } else { ' ' },
                    i + 1,
                    doc.display_name(),
                    if doc.is_modified() { " +" } else { "" }
                )
            })
            .collect();
        for line in lines {
            self.app.push_output(OutputKind::Plain, line);
        }
    }

    fn show_active(&mut self) {
        let doc = self.app.tabs.active();
        let width = doc.line_count().to_string().len();
        let lines: Vec<String> = (0..doc.line_count())
            .filter_map(|i| doc.line(i).map(|text| format!("{:>width$} | {}", i + 1, text)))
            .collect();
        for line in lines {
            self.app.push_output(OutputKind::Plain, line);
        }
    }

    fn set_line(&mut self, rest: &str) {
        let (n, text) = rest.split_once(' ').unwrap_or((rest, ""));
        let replaced = match n.parse::<usize>().ok().and_then(|n| n.checked_sub(1)) {
            Some(idx) => self.app.tabs.active_mut().replace_line(idx, text),
            None => false,
        };
        if !replaced {
            self.app.set_message("Usage: set N TEXT (N within the buffer)");
        }
    }

    fn close_active(&mut self, force: bool) {
        let id = self.app.tabs.active_id();
        if self.app.tabs.is_modified(id) && !force {
            let name = self.app.tabs.active().display_name();
            self.app.set_message(format!(
                "{} has unsaved changes (save first or use close!)",
                name
            ));
            return;
        }
        self.app.tabs.close_tab(id);
        self.announce_active();
    }

    fn save_active(&mut self, target: Option<PathBuf>) {
        let id = self.app.tabs.active_id();
        let saved = match &target {
            Some(path) => {
                let mut prompt = |_: &Document| Some(path.clone());
                self.app.tabs.save_tab_as(id, &mut prompt)
            }
            None => self.app.tabs.save_tab(id, &mut NoPrompt),
        };
        match saved {
            Ok(true) => {
                let path = self.app.tabs.active().path.clone();
                if let Some(path) = path {
                    self.app.recent.add(&path);
                    self.app.set_message(format!("Saved {}", path.display()));
                }
            }
            Ok(false) => self.app.set_message("No file name (use saveas PATH)"),
            Err(e) => self.app.set_message(format!("Save failed: {}", e)),
        }
    }

    fn project(&mut self, rest: &str) {
        let mut words = rest.split_whitespace();
        match (words.next(), words.next(), words.next()) {
            (Some("open"), Some(path), _) => {
                self.app.open_project(&PathBuf::from(path));
            }
            (Some("create"), Some(path), template) => {
                self.app.create_project(&PathBuf::from(path), template);
            }
            (Some("save"), None, _) => {
                self.app.save_project_state();
            }
            (Some("close"), None, _) => {
                self.app.shutdown();
                self.app.set_message("Project closed");
            }
            _ => self
                .app
                .set_message("Usage: project open PATH | create PATH [TEMPLATE] | save | close"),
        }
    }

    fn recover(&mut self, rest: &str) {
        let snapshots = self.app.tabs.store().recoverable();
        // Snapshots of tabs open in this session are not crash leftovers
        let own: HashSet<_> = self.app.tabs.iter().map(Document::autosave_key).collect();
        let snapshots: Vec<_> = snapshots
            .into_iter()
            .filter(|h| !own.contains(&h.key))
            .collect();

        if rest.is_empty() {
            if snapshots.is_empty() {
                self.app.set_message("No snapshots to recover");
            }
            for (i, handle) in snapshots.iter().enumerate() {
                let age = handle.saved_at.elapsed().unwrap_or_default().as_secs();
                self.app
                    .push_output(OutputKind::Plain, format!("{}: {} ({}s old)", i + 1, handle.key, age));
            }
            return;
        }

        let picked = rest
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| snapshots.get(i));
        match picked.and_then(|h| self.app.tabs.restore_snapshot(h)) {
            Some(id) => self.app.set_message(format!("Recovered into {}", id)),
            None => self.app.set_message("Usage: recover N (see recover)"),
        }
    }

    // ==================== Output ====================

    fn prompt(&mut self) -> io::Result<()> {
        if self.style.prompt && !self.input_closed {
            write!(self.out, "chix> ")?;
            self.out.flush()?;
        }
        Ok(())
    }

    fn flush_app(&mut self) -> io::Result<()> {
        for line in self.app.take_output() {
            write_line(&mut self.out, self.style, &line)?;
        }
        if let Some(msg) = self.app.take_message() {
            if self.style.color {
                queue!(
                    self.out,
                    SetForegroundColor(Color::DarkGrey),
                    Print(format!("-- {}\n", msg)),
                    ResetColor
                )?;
            } else {
                writeln!(self.out, "-- {}", msg)?;
            }
        }
        self.out.flush()
    }
}

fn kind_color(kind: OutputKind) -> Option<Color> {
    match kind {
        OutputKind::Info => Some(Color::Cyan),
        OutputKind::Success => Some(Color::Green),
        OutputKind::Warning => Some(Color::Yellow),
        OutputKind::Error => Some(Color::Red),
        OutputKind::Plain => None,
    }
}

/// Print one output-pane line, coloured prefix when enabled
pub fn write_line<W: Write>(out: &mut W, style: ShellStyle, line: &OutputLine) -> io::Result<()> {
    let text = line.text.strip_suffix('\n').unwrap_or(&line.text);
    match kind_color(line.kind).filter(|_| style.color) {
        Some(color) => queue!(
            out,
            SetForegroundColor(color),
            Print(line.kind.prefix()),
            ResetColor,
            Print(text),
            Print("\n")
        ),
        None => writeln!(out, "{}{}", line.kind.prefix(), text),
    }
}

fn spawn_stdin_reader(tx: Sender<ShellEvent>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(ShellEvent::Line(line)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!("stdin read failed: {}", e);
                    break;
                }
            }
        }
        let _ = tx.send(ShellEvent::InputClosed);
    });
}

/// Run the interactive shell on stdin/stdout.
pub fn run_shell_mode(
    paths: &[PathBuf],
    config: &Config,
    style: ShellStyle,
) -> Result<(), Box<dyn std::error::Error>> {
    const DAY: Duration = Duration::from_secs(24 * 60 * 60);
    let max_age = config
        .get_duration("autosave_max_age_days", DAY, DAY * 365)
        .unwrap_or(DAY * 7);
    let interval = config
        .get_duration("autosave_interval_secs", Duration::from_secs(1), DAY)
        .unwrap_or(Duration::from_secs(60));

    let app = EditorApp::initialize_with_config(config.clone(), paths);
    app.tabs.store().clean_stale(max_age);

    let (tx, rx) = mpsc::channel();
    let run_tx = tx.clone();
    let runner = ProcessRunner::new(ToolchainConfig::from_config(config));
    let runs = RunController::spawn(runner, move |event| {
        let _ = run_tx.send(ShellEvent::Run(event));
    })?;
    spawn_stdin_reader(tx);

    let autosaver = Autosaver::new(interval, Instant::now());
    let mut shell = Shell::new(app, runs, autosaver, style, io::stdout());

    let leftovers = shell.app.tabs.store().recoverable().len();
    if leftovers > 0 {
        shell
            .app
            .set_message(format!("{} autosave snapshots found (see recover)", leftovers));
    }
    shell.flush_app()?;

    shell.run(rx)?;
    shell.app.shutdown();
    Ok(())
}
