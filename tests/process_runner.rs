//! Process runner tests against stand-in tools
//!
//! A small shell script plays the compiler so the compile/classify/timeout
//! paths run on any unix machine. Tests against real gcc and tcc are skipped
//! when those tools are not installed.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use chix::core::error::RunFailure;
use chix::core::runner::{ProcessRunner, RunMode, RunRequest, RunSource, ToolchainConfig};
use chix::core::worker::{Job, RunController, RunEvent, RunOutcome};
use tempfile::TempDir;

/// Compiler stand-in: answers `--version`, fails on sources containing
/// SYNTAX_ERROR, warns on UNUSED, and writes a runnable script as the output
/// (left without the execute bit when the source mentions NOEXEC).
const FAKE_CC: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then echo "fakecc 1.0"; exit 0; fi
out=""; src=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    -*) shift ;;
    *) src="$1"; shift ;;
  esac
done
if grep -q SYNTAX_ERROR "$src"; then
  echo "$src:2:5: error: expected ';' before '}' token" >&2
  exit 1
fi
if grep -q UNUSED "$src"; then
  echo "$src:1:9: warning: unused variable 'x' [-Wunused-variable]" >&2
fi
if [ -n "$out" ]; then
  printf '#!/bin/sh\necho built\n' > "$out"
  grep -q NOEXEC "$src" || chmod +x "$out"
fi
exit 0
"#;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Stand-in that records its pid and then hangs
fn slow_cc(dir: &Path) -> PathBuf {
    let pid_file = dir.join("cc.pid");
    let body = format!(
        "#!/bin/sh\nif [ \"$1\" = \"--version\" ]; then echo slowcc; exit 0; fi\necho $$ > {}\nexec sleep 30\n",
        pid_file.display()
    );
    write_script(dir, "slowcc", &body)
}

/// Stand-in whose real work happens in a background helper, the way the gcc
/// driver hands off to cc1
fn forking_cc(dir: &Path) -> PathBuf {
    let pid_file = dir.join("helper.pid");
    let body = format!(
        "#!/bin/sh\nif [ \"$1\" = \"--version\" ]; then echo forkcc; exit 0; fi\nsleep 30 &\necho $! > {}\nwait\n",
        pid_file.display()
    );
    write_script(dir, "forkcc", &body)
}

/// Interpreter stand-in for `tcc -run SRC`: logs each source path it was
/// given, prints "hi", exits 3 on EXIT_THREE and hangs on HANG.
fn fake_tcc(dir: &Path) -> PathBuf {
    let log = dir.join("tcc.log");
    let body = format!(
        r#"#!/bin/sh
if [ "$1" = "-version" ]; then echo "tcc version 0.9.27"; exit 0; fi
[ "$1" = "-run" ] || exit 64
src="$2"
echo "$src" >> {}
if grep -q HANG "$src"; then exec sleep 30; fi
if grep -q EXIT_THREE "$src"; then
  echo "$src:2: error: runtime failure" >&2
  exit 3
fi
printf hi
"#,
        log.display()
    );
    write_script(dir, "faketcc", &body)
}

/// Live and not a zombie, per /proc. Hosts without /proc report false.
fn alive(pid: &str) -> bool {
    match fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => match stat.rsplit_once(") ") {
            Some((_, rest)) => !rest.starts_with('Z') && !rest.starts_with('X'),
            None => true,
        },
        Err(_) => false,
    }
}

fn gone_within(pid: &str, limit: Duration) -> bool {
    let start = Instant::now();
    while alive(pid) {
        if start.elapsed() > limit {
            return false;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    true
}

fn toolchain(dir: &Path, compiler: &Path) -> ToolchainConfig {
    ToolchainConfig {
        compiler_candidates: vec![compiler.display().to_string()],
        interpreter_candidates: vec!["chix-no-such-tcc".to_string()],
        interpreter_paths: Vec::new(),
        terminals: Vec::new(),
        build_dir: dir.join("build"),
        ..ToolchainConfig::default()
    }
}

fn source(dir: &TempDir, name: &str, code: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, code).unwrap();
    path
}

fn has_tool(program: &str, flag: &str) -> bool {
    Command::new(program)
        .arg(flag)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

// =============================================================================
// COMPILE
// =============================================================================

#[test]
fn compile_success_collects_warnings() {
    let dir = tempfile::tempdir().unwrap();
    let cc = write_script(dir.path(), "fakecc", FAKE_CC);
    let src = source(&dir, "warn.c", "int main(void){int x; /* UNUSED */ return 0;}\n");

    let mut runner = ProcessRunner::new(toolchain(dir.path(), &cc));
    let result = runner.compile(&src, None, &[]);

    assert!(result.success, "{:?}", result);
    assert_eq!(result.message, "Compilation successful");
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("unused variable"));
    assert!(result.errors.is_empty());
    let exe = result.executable_path.unwrap();
    assert!(exe.starts_with(dir.path().join("build")));
    assert!(exe.is_file());
}

#[test]
fn compile_syntax_error_has_no_executable() {
    let dir = tempfile::tempdir().unwrap();
    let cc = write_script(dir.path(), "fakecc", FAKE_CC);
    let src = source(&dir, "bad.c", "int main(void){\n  SYNTAX_ERROR }\n");

    let mut runner = ProcessRunner::new(toolchain(dir.path(), &cc));
    let result = runner.compile(&src, None, &[]);

    assert!(!result.success);
    assert!(result.executable_path.is_none());
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("expected ';'"));
    assert_eq!(result.failure, Some(RunFailure::NonZeroExit(Some(1))));
}

#[test]
fn compile_missing_source() {
    let dir = tempfile::tempdir().unwrap();
    let cc = write_script(dir.path(), "fakecc", FAKE_CC);
    let missing = dir.path().join("nope.c");

    let mut runner = ProcessRunner::new(toolchain(dir.path(), &cc));
    let result = runner.compile(&missing, None, &[]);
    assert_eq!(result.failure, Some(RunFailure::SourceNotFound(missing)));
}

#[test]
fn compile_refuses_output_it_cannot_remove() {
    let dir = tempfile::tempdir().unwrap();
    let cc = write_script(dir.path(), "fakecc", FAKE_CC);
    let src = source(&dir, "main.c", "int main(void){return 0;}\n");
    let out_dir = dir.path().join("out");
    fs::create_dir(&out_dir).unwrap();
    fs::write(out_dir.join("keep.txt"), "x").unwrap();

    let mut runner = ProcessRunner::new(toolchain(dir.path(), &cc));
    let result = runner.compile(&src, Some(&out_dir), &[]);

    assert!(!result.success);
    assert!(result.executable_path.is_none());
    assert!(
        matches!(&result.failure, Some(RunFailure::StaleOutput { path, .. }) if *path == out_dir),
        "{:?}",
        result
    );
    assert!(out_dir.join("keep.txt").is_file());
}

#[test]
fn unbounded_timeout_still_compiles() {
    let dir = tempfile::tempdir().unwrap();
    let cc = write_script(dir.path(), "fakecc", FAKE_CC);
    let src = source(&dir, "main.c", "int main(void){return 0;}\n");

    let mut config = toolchain(dir.path(), &cc);
    config.run_timeout = Duration::MAX;
    let mut runner = ProcessRunner::new(config);
    assert!(runner.compile(&src, None, &[]).success);
}

#[test]
fn launch_failure_turns_success_into_failure() {
    let dir = tempfile::tempdir().unwrap();
    let cc = write_script(dir.path(), "fakecc", FAKE_CC);
    let src = source(&dir, "noexec.c", "int main(void){return 0;} /* NOEXEC */\n");

    // No terminals, so the launch is direct and the missing execute bit fails it
    let mut runner = ProcessRunner::new(toolchain(dir.path(), &cc));
    let (result, process) = runner.compile_and_run(&src, &[]);

    assert!(process.is_none());
    assert!(!result.success);
    assert!(
        matches!(result.failure, Some(RunFailure::LaunchFailed(_))),
        "{:?}",
        result
    );
    assert!(result.message.starts_with("Failed to run executable"));
    assert!(result.errors.iter().any(|e| e.starts_with("Failed to run executable")));
}

#[test]
fn scratch_builds_do_not_accumulate() {
    let dir = tempfile::tempdir().unwrap();
    let cc = write_script(dir.path(), "fakecc", FAKE_CC);
    let mut runner = ProcessRunner::new(toolchain(dir.path(), &cc));

    let first = runner.compile_code("int main(void){return 0;}", &[]);
    let first_exe = first.executable_path.unwrap();
    assert!(first_exe.is_file());

    let second = runner.compile_code("int main(void){return 1;}", &[]);
    let second_exe = second.executable_path.unwrap();
    assert_ne!(first_exe, second_exe);
    assert!(!first_exe.exists());
    assert!(second_exe.is_file());
    assert_eq!(fs::read_dir(dir.path().join("build")).unwrap().count(), 1);
}

#[test]
fn compile_code_uses_text() {
    let dir = tempfile::tempdir().unwrap();
    let cc = write_script(dir.path(), "fakecc", FAKE_CC);

    let mut runner = ProcessRunner::new(toolchain(dir.path(), &cc));
    let request = RunRequest::new(
        RunSource::Text("int main(void){ SYNTAX_ERROR }".to_string()),
        RunMode::Compile,
    );
    assert!(!runner.run(&request).success);

    let request = RunRequest::new(
        RunSource::Text("int main(void){return 0;}".to_string()),
        RunMode::Compile,
    );
    assert!(runner.run(&request).success);
}

#[test]
fn analyze_parses_locations() {
    let dir = tempfile::tempdir().unwrap();
    let cc = write_script(dir.path(), "fakecc", FAKE_CC);
    let src = source(&dir, "lint.c", "int main(void){int x; /* UNUSED */ return 0;}\n");

    let mut runner = ProcessRunner::new(toolchain(dir.path(), &cc));
    let findings = runner.analyze(&src);

    assert_eq!(findings.len(), 1);
    assert!(findings[0].is_warning());
    let loc = findings[0].location.as_ref().unwrap();
    assert_eq!((loc.line, loc.column), (1, 9));
    assert_eq!(loc.file, src);
}

// =============================================================================
// INTERPRET
// =============================================================================

fn interpreter(dir: &TempDir) -> ProcessRunner {
    let mut config = toolchain(dir.path(), Path::new("chix-no-such-cc"));
    config.interpreter_candidates = vec![fake_tcc(dir.path()).display().to_string()];
    config.run_timeout = Duration::from_millis(500);
    ProcessRunner::new(config)
}

/// Source paths the stand-in interpreter was handed, in order
fn interpreted_sources(dir: &TempDir) -> Vec<PathBuf> {
    fs::read_to_string(dir.path().join("tcc.log"))
        .unwrap()
        .lines()
        .map(PathBuf::from)
        .collect()
}

#[test]
fn interpret_code_success_and_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut runner = interpreter(&dir);

    let ok = runner.interpret_code("int main(void){return 0;}\n", &[]);
    assert!(ok.success, "{:?}", ok);
    assert_eq!(ok.message, "Program finished");
    assert_eq!(ok.raw_output, "hi");
    assert!(ok.executable_path.is_none());

    let failed = runner.interpret_code("int main(void){\n  EXIT_THREE }\n", &[]);
    assert!(!failed.success);
    assert_eq!(failed.message, "Interpretation failed");
    assert_eq!(failed.failure, Some(RunFailure::NonZeroExit(Some(3))));
    assert!(failed.errors.iter().any(|e| e.contains("runtime failure")));
}

#[test]
fn interpret_code_removes_temp_source_on_every_exit() {
    let dir = tempfile::tempdir().unwrap();
    let mut runner = interpreter(&dir);

    assert!(runner.interpret_code("int main(void){return 0;}", &[]).success);
    assert!(!runner.interpret_code("EXIT_THREE", &[]).success);
    assert!(runner.interpret_code("HANG", &[]).is_timeout());

    let sources = interpreted_sources(&dir);
    assert_eq!(sources.len(), 3);
    // Every call got its own file
    assert_ne!(sources[0], sources[1]);
    assert_ne!(sources[1], sources[2]);
    for src in sources {
        assert!(!src.exists(), "{} left behind", src.display());
    }
}

#[test]
fn interpret_file_runs_saved_source() {
    let dir = tempfile::tempdir().unwrap();
    let src = source(&dir, "saved.c", "int main(void){return 0;}\n");
    let mut runner = interpreter(&dir);

    let result = runner.interpret_file(&src, &[]);
    assert!(result.success, "{:?}", result);
    assert_eq!(interpreted_sources(&dir), vec![src.clone()]);
    // Saved sources are never deleted
    assert!(src.is_file());
}

// =============================================================================
// TIMEOUT AND CANCELLATION
// =============================================================================

#[test]
fn timeout_kills_the_child() {
    let dir = tempfile::tempdir().unwrap();
    let cc = slow_cc(dir.path());
    let src = source(&dir, "slow.c", "int main(void){return 0;}\n");

    let mut config = toolchain(dir.path(), &cc);
    config.run_timeout = Duration::from_millis(500);
    let mut runner = ProcessRunner::new(config);

    let started = Instant::now();
    let result = runner.compile(&src, None, &[]);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(result.is_timeout(), "{:?}", result);
    assert!(!result.success);

    if let Ok(pid) = fs::read_to_string(dir.path().join("cc.pid")) {
        let proc_dir = PathBuf::from(format!("/proc/{}", pid.trim()));
        if Path::new("/proc/self").exists() {
            assert!(!proc_dir.exists(), "timed out child still running");
        }
    }
}

#[test]
fn timeout_kills_compiler_helpers() {
    let dir = tempfile::tempdir().unwrap();
    let cc = forking_cc(dir.path());
    let src = source(&dir, "slow.c", "int main(void){return 0;}\n");

    let mut config = toolchain(dir.path(), &cc);
    config.run_timeout = Duration::from_secs(1);
    let mut runner = ProcessRunner::new(config);

    let result = runner.compile(&src, None, &[]);
    assert!(result.is_timeout(), "{:?}", result);

    let pid = fs::read_to_string(dir.path().join("helper.pid")).unwrap();
    assert!(
        gone_within(pid.trim(), Duration::from_secs(3)),
        "helper {} outlived the timeout",
        pid.trim()
    );
}

#[test]
fn stop_execution_cancels_running_job() {
    let dir = tempfile::tempdir().unwrap();
    let cc = forking_cc(dir.path());
    let src = source(&dir, "slow.c", "int main(void){return 0;}\n");

    let mut config = toolchain(dir.path(), &cc);
    config.run_timeout = Duration::from_secs(30);
    let (tx, rx) = mpsc::channel();
    let mut controller = RunController::spawn(ProcessRunner::new(config), move |e| {
        let _ = tx.send(e);
    })
    .unwrap();

    let id = controller
        .submit(Job::Run(RunRequest::new(RunSource::Path(src), RunMode::Compile)))
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while !controller.is_busy() {
        assert!(Instant::now() < deadline, "job never started");
        std::thread::sleep(Duration::from_millis(10));
    }

    let started = Instant::now();
    assert!(controller.stop_execution());

    loop {
        match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
            RunEvent::Finished {
                id: finished,
                outcome: RunOutcome::Run(result),
            } => {
                assert_eq!(finished, id);
                assert_eq!(result.failure, Some(RunFailure::Cancelled));
                break;
            }
            RunEvent::Started { .. } => continue,
            other => panic!("unexpected event {:?}", other),
        }
    }
    assert!(started.elapsed() < Duration::from_secs(10));

    if let Ok(pid) = fs::read_to_string(dir.path().join("helper.pid")) {
        assert!(gone_within(pid.trim(), Duration::from_secs(3)));
    }
}

// =============================================================================
// BATCH
// =============================================================================

#[test]
fn batch_run_compiles_and_executes() {
    let dir = tempfile::tempdir().unwrap();
    let cc = write_script(dir.path(), "fakecc", FAKE_CC);
    let name = format!("batch_{}.c", std::process::id());
    let src = source(&dir, &name, "int main(void){return 0;}\n");

    let mut config = chix::config::Config::default();
    chix::user_config::configure(&mut config);
    config.set("compiler", cc.display().to_string());
    assert!(chix::run::run_batch_run(&src, &config).unwrap());
}

// =============================================================================
// REAL TOOLS
// =============================================================================

#[test]
fn real_gcc_compiles_and_rejects() {
    if !has_tool("gcc", "--version") {
        eprintln!("gcc not installed, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mut runner = ProcessRunner::new(toolchain(dir.path(), Path::new("gcc")));

    let good = source(&dir, "good.c", "int main(void){return 0;}\n");
    let result = runner.compile(&good, None, &[]);
    assert!(result.success, "{:?}", result);
    assert!(result.executable_path.unwrap().is_file());

    let bad = source(&dir, "bad.c", "int main(void){ return 0 }\n");
    let result = runner.compile(&bad, None, &[]);
    assert!(!result.success);
    assert!(result.executable_path.is_none());
    assert!(result.errors.iter().any(|e| e.contains("error:")));
}

#[test]
fn real_tcc_interprets_hello() {
    if !has_tool("tcc", "-version") {
        eprintln!("tcc not installed, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mut config = toolchain(dir.path(), Path::new("chix-no-such-cc"));
    config.interpreter_candidates = vec!["tcc".to_string()];
    let mut runner = ProcessRunner::new(config);

    let result = runner.interpret_code(
        "#include <stdio.h>\nint main(void){printf(\"hi\");return 0;}\n",
        &[],
    );
    assert!(result.success, "{:?}", result);
    assert_eq!(result.raw_output, "hi");
}
