//! Diagnostic types and reporters for rule-set loading

use crate::xml::XmlElement;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Severity level for diagnostics
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Recoverable problem, loading continues unchanged
    #[default]
    Warning,
    /// Definite problem, the offending element was skipped or ignored
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "warning" | "warn" => Ok(Severity::Warning),
            "error" | "err" => Ok(Severity::Error),
            _ => Err(()),
        }
    }
}

/// Location inside a rule-set document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Document the diagnostic belongs to
    pub file: PathBuf,
    /// Line number (1-based, 0 when unknown)
    pub line: usize,
    /// Column number (1-based, 0 when unknown)
    pub column: usize,
}

impl Location {
    pub fn new(file: impl Into<PathBuf>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "{}", self.file.display())
        } else {
            write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
        }
    }
}

/// A warning or error raised while loading a rule-set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub location: Location,
    /// Underlying cause, if the problem came from a lower layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>, location: Location) -> Self {
        Self {
            severity,
            message: message.into(),
            location,
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.location, self.severity, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " (caused by: {})", cause)?;
        }
        Ok(())
    }
}

/// Sink for diagnostics produced while loading
pub trait MessageReporter {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Reporter that keeps every diagnostic in memory
#[derive(Debug, Default)]
pub struct CollectingReporter {
    diagnostics: Vec<Diagnostic>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Check if any diagnostic message contains the given text
    pub fn has_message(&self, severity: Severity, part: &str) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == severity && d.message.contains(part))
    }
}

impl MessageReporter for CollectingReporter {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

/// Reporter that forwards diagnostics to the `log` facade
#[derive(Debug, Default)]
pub struct LogReporter {
    errors: usize,
    warnings: usize,
}

impl LogReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }
}

impl MessageReporter for LogReporter {
    fn report(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => {
                self.errors += 1;
                log::error!("{}", diagnostic);
            }
            Severity::Warning => {
                self.warnings += 1;
                log::warn!("{}", diagnostic);
            }
        }
    }
}

/// Binds one document to a diagnostic sink.
///
/// Every decode step of the loader threads this through instead of returning
/// errors, so a malformed element only costs the element itself.
pub struct XmlErrorReporter<'r> {
    file: PathBuf,
    sink: &'r mut dyn MessageReporter,
    errors: usize,
    warnings: usize,
}

impl<'r> XmlErrorReporter<'r> {
    pub fn new(file: impl Into<PathBuf>, sink: &'r mut dyn MessageReporter) -> Self {
        Self {
            file: file.into(),
            sink,
            errors: 0,
            warnings: 0,
        }
    }

    pub fn file(&self) -> &PathBuf {
        &self.file
    }

    /// Underlying sink, used to open reporters for referenced documents
    pub fn sink(&mut self) -> &mut dyn MessageReporter {
        &mut *self.sink
    }

    pub fn location_of(&self, element: &XmlElement) -> Location {
        Location::new(self.file.clone(), element.line(), element.column())
    }

    pub fn warn(&mut self, element: &XmlElement, message: impl Into<String>) {
        let location = self.location_of(element);
        self.emit(Diagnostic::new(Severity::Warning, message, location));
    }

    pub fn error(&mut self, element: &XmlElement, message: impl Into<String>) {
        let location = self.location_of(element);
        self.emit(Diagnostic::new(Severity::Error, message, location));
    }

    pub fn error_with_cause(
        &mut self,
        element: &XmlElement,
        message: impl Into<String>,
        cause: impl fmt::Display,
    ) {
        let location = self.location_of(element);
        self.emit(Diagnostic::new(Severity::Error, message, location).with_cause(cause));
    }

    /// Report an error with an explicit position (e.g. a malformed document)
    pub fn error_at(&mut self, line: usize, column: usize, message: impl Into<String>) {
        let location = Location::new(self.file.clone(), line, column);
        self.emit(Diagnostic::new(Severity::Error, message, location));
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    fn emit(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
        }
        self.sink.report(diagnostic);
    }
}
