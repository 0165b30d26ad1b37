//! Leveled diagnostics collected during a compilation
//!
//! Every message is forwarded to `tracing` at a matching level and also kept
//! in order, so callers (and tests) can inspect exactly what a compilation
//! reported without installing a subscriber.

use std::fmt;

use serde::Serialize;

/// Severity of a diagnostic, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Disaster,
    Error,
    Warning,
    Message,
    Detail,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disaster => write!(f, "disaster"),
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Message => write!(f, "message"),
            Self::Detail => write!(f, "detail"),
        }
    }
}

/// A single reported finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.level, self.message)
    }
}

/// Diagnostics sink threaded through every compiler pass
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message and forward it to `tracing`
    pub fn emit(&mut self, level: Level, message: impl Into<String>) {
        let message = message.into();
        match level {
            Level::Disaster | Level::Error => tracing::error!("{}", message),
            Level::Warning => tracing::warn!("{}", message),
            Level::Message => tracing::info!("{}", message),
            Level::Detail => tracing::debug!("{}", message),
        }
        self.entries.push(Diagnostic { level, message });
    }

    pub fn disaster(&mut self, message: impl Into<String>) {
        self.emit(Level::Disaster, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.emit(Level::Error, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.emit(Level::Warning, message);
    }

    pub fn message(&mut self, message: impl Into<String>) {
        self.emit(Level::Message, message);
    }

    pub fn detail(&mut self, message: impl Into<String>) {
        self.emit(Level::Detail, message);
    }

    /// All diagnostics in emission order
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Diagnostics at exactly the given level
    pub fn at(&self, level: Level) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.level == level)
    }

    /// Number of diagnostics at the given level or more severe
    pub fn count_at_least(&self, level: Level) -> usize {
        self.entries.iter().filter(|d| d.level <= level).count()
    }

    pub fn has_errors(&self) -> bool {
        self.count_at_least(Level::Error) > 0
    }

    /// True if any diagnostic at `level` contains `needle`
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.at(level).any(|d| d.message.contains(needle))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered_by_severity() {
        assert!(Level::Disaster < Level::Error);
        assert!(Level::Error < Level::Warning);
        assert!(Level::Message < Level::Detail);
    }

    #[test]
    fn test_collects_in_order() {
        let mut diags = Diagnostics::new();
        diags.detail("created symbol");
        diags.warn("ambiguous");
        diags.error("cycle");

        assert_eq!(diags.len(), 3);
        assert_eq!(diags.entries()[1].level, Level::Warning);
        assert_eq!(diags.count_at_least(Level::Warning), 2);
        assert!(diags.has_errors());
        assert!(diags.contains(Level::Error, "cycle"));
        assert!(!diags.contains(Level::Warning, "cycle"));
    }
}
