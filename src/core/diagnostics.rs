//! Compiler Diagnostic Parsing
//!
//! Two consumers read GCC/Clang/TCC stderr:
//! - runs classify lines into warning and error entries (`OutputClassifier`)
//! - static analysis turns lines into structured findings (`parse_findings`)

use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

// =============================================================================
// RUN OUTPUT CLASSIFICATION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Warning,
    Error,
}

/// Splits compiler text into ordered warning and error entries.
///
/// - a line containing `warning:` (any case) starts a warning entry
/// - a line containing `error:` starts an error entry
/// - `note:` lines and other non-empty lines are appended to the entry that
///   immediately precedes them
/// - lines seen before any entry are held and prefixed to the next entry;
///   if no entry ever follows they become one error entry of their own
#[derive(Debug, Default)]
pub struct OutputClassifier {
    warnings: Vec<String>,
    errors: Vec<String>,
    last: Option<EntryKind>,
    pending: Vec<String>,
}

impl OutputClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a whole block of text
    pub fn classify(text: &str) -> (Vec<String>, Vec<String>) {
        let mut classifier = Self::new();
        for line in text.lines() {
            classifier.push_line(line);
        }
        classifier.finish()
    }

    pub fn push_line(&mut self, line: &str) {
        let line = line.trim_end();
        if line.trim().is_empty() {
            return;
        }

        let lower = line.to_lowercase();
        if lower.contains("warning:") {
            let entry = self.take_pending(line);
            self.warnings.push(entry);
            self.last = Some(EntryKind::Warning);
        } else if lower.contains("error:") {
            let entry = self.take_pending(line);
            self.errors.push(entry);
            self.last = Some(EntryKind::Error);
        } else {
            let target = match self.last {
                Some(EntryKind::Warning) => self.warnings.last_mut(),
                Some(EntryKind::Error) => self.errors.last_mut(),
                None => None,
            };
            match target {
                Some(entry) => {
                    entry.push('\n');
                    entry.push_str(line);
                }
                None => self.pending.push(line.to_string()),
            }
        }
    }

    /// Returns `(warnings, errors)`
    pub fn finish(mut self) -> (Vec<String>, Vec<String>) {
        if !self.pending.is_empty() {
            self.errors.push(self.pending.join("\n"));
        }
        (self.warnings, self.errors)
    }

    fn take_pending(&mut self, line: &str) -> String {
        if self.pending.is_empty() {
            return line.to_string();
        }
        let mut entry = std::mem::take(&mut self.pending).join("\n");
        entry.push('\n');
        entry.push_str(line);
        entry
    }
}

// =============================================================================
// ANALYSIS FINDINGS
// =============================================================================

/// Severity level of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
    Info,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
            Severity::Info => "info",
        }
    }
}

/// Source position of a structured finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: PathBuf,
    /// 1-indexed
    pub line: usize,
    /// 1-indexed
    pub column: usize,
}

/// One analysis result. Lines that do not have the
/// `file:line:col: severity: message` shape are kept as `Info` without a location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub severity: Severity,
    pub location: Option<Location>,
    pub message: String,
}

impl Finding {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            location: None,
            message: message.into(),
        }
    }

    pub fn at(mut self, file: impl Into<PathBuf>, line: usize, column: usize) -> Self {
        self.location = Some(Location {
            file: file.into(),
            line,
            column,
        });
        self
    }

    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }

    pub fn is_warning(&self) -> bool {
        matches!(self.severity, Severity::Warning)
    }
}

static FINDING_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*?):(\d+):(\d+):\s*(warning|error|note):\s*(.*)$")
        .expect("finding pattern is valid")
});

/// Parse a single line into a finding
pub fn parse_finding(line: &str) -> Finding {
    let line = line.trim_end();
    if let Some(caps) = FINDING_LINE.captures(line) {
        let numbers = (caps[2].parse::<usize>(), caps[3].parse::<usize>());
        if let (Ok(line_no), Ok(column)) = numbers {
            let severity = match &caps[4] {
                "error" => Severity::Error,
                "warning" => Severity::Warning,
                _ => Severity::Note,
            };
            return Finding::new(severity, caps[5].trim()).at(&caps[1], line_no, column);
        }
    }
    Finding::new(Severity::Info, line)
}

/// Parse analyzer output; blank lines are skipped, nothing else is dropped.
pub fn parse_findings(text: &str) -> Vec<Finding> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(parse_finding)
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_error_and_warning() {
        let text = "main.c:3:5: warning: unused variable 'x' [-Wunused-variable]\n\
                    main.c:4:1: error: expected ';' before '}' token\n";
        let (warnings, errors) = OutputClassifier::classify(text);
        assert_eq!(warnings.len(), 1);
        assert_eq!(errors.len(), 1);
        assert!(warnings[0].contains("unused variable"));
        assert!(errors[0].contains("expected ';'"));
    }

    #[test]
    fn test_note_attaches_to_preceding_entry() {
        // The note follows the warning, not the earlier error
        let text = "a.c:1:1: error: first\n\
                    a.c:2:1: warning: second\n\
                    a.c:2:1: note: about second\n";
        let (warnings, errors) = OutputClassifier::classify(text);
        assert_eq!(errors, vec!["a.c:1:1: error: first".to_string()]);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].ends_with("note: about second"));
    }

    #[test]
    fn test_case_insensitive_tokens() {
        let (warnings, errors) = OutputClassifier::classify("x.c:1: WARNING: loud\nx.c:2: Error: loud too");
        assert_eq!(warnings.len(), 1);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_context_lines_are_kept() {
        let text = "main.c: In function 'main':\n\
                    main.c:4:1: error: expected ';' before '}' token\n\
                    \x20   4 | }\n\
                    \x20     | ^\n";
        let (warnings, errors) = OutputClassifier::classify(text);
        assert!(warnings.is_empty());
        assert_eq!(errors.len(), 1);
        let entry = &errors[0];
        assert!(entry.starts_with("main.c: In function 'main':"));
        assert!(entry.contains("4 | }"));
        assert!(entry.contains('^'));
    }

    #[test]
    fn test_unowned_lines_become_error_entry() {
        let text = "/usr/bin/ld: main.o: in function `main':\nmain.c:(.text+0x5): undefined reference to `foo'\ncollect2: ld returned 1 exit status\n";
        let (warnings, errors) = OutputClassifier::classify(text);
        assert!(warnings.is_empty());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].lines().count(), 3);
    }

    #[test]
    fn test_blank_output() {
        let (warnings, errors) = OutputClassifier::classify("\n  \n");
        assert!(warnings.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn test_parse_structured_finding() {
        let f = parse_finding("src/main.c:10:5: error: expected ';' before '}'");
        assert!(f.is_error());
        let loc = f.location.unwrap();
        assert_eq!(loc.file, PathBuf::from("src/main.c"));
        assert_eq!(loc.line, 10);
        assert_eq!(loc.column, 5);
        assert_eq!(f.message, "expected ';' before '}'");
    }

    #[test]
    fn test_parse_note_and_warning() {
        assert_eq!(parse_finding("a.c:1:2: note: here").severity, Severity::Note);
        assert!(parse_finding("a.c:1:2: warning: w").is_warning());
    }

    #[test]
    fn test_unstructured_line_is_info() {
        let f = parse_finding("main.c: In function 'main':");
        assert_eq!(f.severity, Severity::Info);
        assert!(f.location.is_none());
        assert_eq!(f.message, "main.c: In function 'main':");
    }

    #[test]
    fn test_parse_findings_skips_blank_only() {
        let text = "a.c: In function 'f':\n\na.c:3:9: warning: unused\n    3 | int x;\n";
        let findings = parse_findings(text);
        assert_eq!(findings.len(), 3);
        assert_eq!(findings[0].severity, Severity::Info);
        assert!(findings[1].is_warning());
        assert_eq!(findings[2].severity, Severity::Info);
    }
}
