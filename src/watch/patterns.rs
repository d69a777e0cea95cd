// src/watch/patterns.rs

use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use crate::events::Event;
use crate::types::CommandId;

/// A pattern that failed to compile and is being ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPattern {
    pub pattern: String,
    pub error: String,
}

/// Checks output lines of one running command against its error patterns.
///
/// Patterns are case-insensitive. The watcher never stops the process and
/// does not debounce: every matching line yields its own
/// `Event::CommandFailed`.
#[derive(Debug, Clone)]
pub struct PatternWatcher {
    command_id: CommandId,
    patterns: Vec<(String, Regex)>,
    invalid: Vec<InvalidPattern>,
}

/// Compile `sources`, splitting usable patterns from invalid ones.
/// Blank entries are dropped.
fn compile(sources: &[String]) -> (Vec<(String, Regex)>, Vec<InvalidPattern>) {
    let mut patterns = Vec::new();
    let mut invalid = Vec::new();
    for source in sources {
        if source.trim().is_empty() {
            continue;
        }
        match RegexBuilder::new(source).case_insensitive(true).build() {
            Ok(re) => patterns.push((source.clone(), re)),
            Err(e) => invalid.push(InvalidPattern {
                pattern: source.clone(),
                error: e.to_string(),
            }),
        }
    }
    (patterns, invalid)
}

/// Patterns among `sources` that do not compile.
pub fn invalid_patterns(sources: &[String]) -> Vec<InvalidPattern> {
    compile(sources).1
}

/// Warn about every pattern of `command_id` that will be ignored.
///
/// Called when a command is saved, so the warning shows up once rather
/// than on every start.
pub fn report_invalid_patterns(command_id: &str, sources: &[String]) -> Vec<InvalidPattern> {
    let invalid = invalid_patterns(sources);
    for bad in &invalid {
        warn!(
            command = %command_id,
            pattern = %bad.pattern,
            error = %bad.error,
            "invalid error pattern; it will be ignored"
        );
    }
    invalid
}

impl PatternWatcher {
    /// Compile `sources`. Invalid entries are skipped instead of failing the
    /// run; they were already reported when the command was saved.
    pub fn new(command_id: impl Into<CommandId>, sources: &[String]) -> Self {
        let command_id = command_id.into();
        let (patterns, invalid) = compile(sources);
        if !invalid.is_empty() {
            debug!(command = %command_id, count = invalid.len(), "skipping invalid error patterns");
        }

        Self {
            command_id,
            patterns,
            invalid,
        }
    }

    /// Whether any usable pattern exists. When false, `check` is a no-op.
    pub fn is_active(&self) -> bool {
        !self.patterns.is_empty()
    }

    pub fn invalid_patterns(&self) -> &[InvalidPattern] {
        &self.invalid
    }

    /// Sources of every pattern matching `line`, in configured order.
    pub fn matches(&self, line: &str) -> Vec<String> {
        self.patterns
            .iter()
            .filter(|(_, re)| re.is_match(line))
            .map(|(source, _)| source.clone())
            .collect()
    }

    /// The failure event for `line`, if it matches anything.
    pub fn check(&self, line: &str) -> Option<Event> {
        if !self.is_active() {
            return None;
        }
        let patterns = self.matches(line);
        if patterns.is_empty() {
            return None;
        }
        Some(Event::CommandFailed {
            id: self.command_id.clone(),
            line: line.to_string(),
            patterns,
        })
    }
}
