//! Batch mode: run or analyze one file, print the result and exit.

use std::io::{self, Write};
use std::path::Path;
use std::process::Command;

use crate::config::Config;
use crate::core::app::{OutputKind, OutputLine, finding_lines, result_lines};
use crate::core::process::{Ending, run_captured};
use crate::core::runner::{ProcessRunner, RunMode, RunRequest, RunSource, ToolchainConfig};

use super::validate_file_path;

/// Run `path` once in the configured mode. Returns whether the run succeeded.
pub fn run_batch_run(path: &Path, config: &Config) -> Result<bool, Box<dyn std::error::Error>> {
    let path = validate_file_path(path)?;
    let mode = config
        .get_string("mode")
        .and_then(RunMode::parse)
        .unwrap_or_default();
    let mut runner = ProcessRunner::new(ToolchainConfig::from_config(config));
    let stdout = io::stdout();
    batch_run(&mut runner, &path, mode, &mut stdout.lock())
}

/// Analyze `path`. Returns false when any error was found.
pub fn run_batch_analyze(path: &Path, config: &Config) -> Result<bool, Box<dyn std::error::Error>> {
    let path = validate_file_path(path)?;
    let mut runner = ProcessRunner::new(ToolchainConfig::from_config(config));
    let findings = runner.analyze(&path);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    print_lines(&mut out, &finding_lines(&findings))?;
    Ok(!findings.iter().any(|f| f.is_error()))
}

pub(crate) fn batch_run<W: Write>(
    runner: &mut ProcessRunner,
    path: &Path,
    mode: RunMode,
    out: &mut W,
) -> Result<bool, Box<dyn std::error::Error>> {
    let request = RunRequest::new(RunSource::Path(path.to_path_buf()), mode);
    let result = runner.run(&request);
    print_lines(out, &result_lines(&result, false))?;

    // Interpretation already ran the program
    let Some(exe) = result.executable_path.filter(|_| result.success) else {
        return Ok(result.success);
    };

    let timeout = runner.config().run_timeout;
    let kill = runner.kill_switch();
    let captured = run_captured(Command::new(&exe), timeout, Some(&kill))?;
    out.write_all(captured.stdout.as_bytes())?;
    if !captured.stderr.is_empty() {
        io::stderr().write_all(captured.stderr.as_bytes())?;
    }

    let status = match captured.ending {
        Ending::Exited(_) if captured.success() => OutputLine {
            kind: OutputKind::Success,
            text: "Program exited normally".to_string(),
        },
        Ending::Exited(_) => OutputLine {
            kind: OutputKind::Error,
            text: match captured.exit_code() {
                Some(code) => format!("Program exited with code {}", code),
                None => "Program was terminated by a signal".to_string(),
            },
        },
        Ending::TimedOut => OutputLine {
            kind: OutputKind::Error,
            text: format!("Program timed out after {:?}", timeout),
        },
        Ending::Cancelled => OutputLine {
            kind: OutputKind::Error,
            text: "Program was stopped".to_string(),
        },
    };
    print_lines(out, std::slice::from_ref(&status))?;
    Ok(captured.success())
}

fn print_lines<W: Write>(out: &mut W, lines: &[OutputLine]) -> io::Result<()> {
    for line in lines {
        let text = line.text.strip_suffix('\n').unwrap_or(&line.text);
        writeln!(out, "{}{}", line.kind.prefix(), text)?;
    }
    out.flush()
}
