//! Readiness detection for the engine's interactive protocol.
//!
//! The engine never acknowledges a command. Whether it is ready for the next
//! one is inferred from its output: a known prompt, a termination marker, an
//! error marker, or quiescence after it has said something.

use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;

/// Output observed since the last command was sent.
#[derive(Debug, Clone, Copy)]
pub struct OutputWindow<'a> {
    /// Tail of the text received (stdout and stderr) since the last send.
    pub since_send: &'a str,
    /// Time since the last chunk of output arrived, or since the send if none did.
    pub quiet_for: Duration,
}

/// Verdict of a [`ReadinessDetector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Keep waiting.
    Pending,
    /// The engine shows a known prompt.
    Prompt,
    /// Output stopped for the quiet interval. The engine is presumed ready,
    /// though it may still be working.
    Quiet,
    /// The engine reported that the calculation finished.
    Finished,
    /// The engine reported an error; carries the offending line.
    Error(String),
}

/// Decides from accumulated output whether the engine can take more input.
pub trait ReadinessDetector {
    fn assess(&self, window: &OutputWindow<'_>) -> Readiness;
}

/// Regex-driven detector with a quiescence fallback.
#[derive(Debug, Clone)]
pub struct MarkerDetector {
    prompts: Vec<Regex>,
    finish: Vec<Regex>,
    errors: Vec<Regex>,
    quiet_interval: Duration,
}

impl MarkerDetector {
    pub fn new(
        prompt_patterns: &[String],
        finish_patterns: &[String],
        error_patterns: &[String],
        quiet_interval: Duration,
    ) -> Result<Self> {
        Ok(Self {
            prompts: compile(prompt_patterns).context("compile prompt patterns")?,
            finish: compile(finish_patterns).context("compile finish patterns")?,
            errors: compile(error_patterns).context("compile error patterns")?,
            quiet_interval,
        })
    }
}

impl ReadinessDetector for MarkerDetector {
    fn assess(&self, window: &OutputWindow<'_>) -> Readiness {
        for pattern in &self.errors {
            if let Some(found) = pattern.find(window.since_send) {
                return Readiness::Error(line_around(window.since_send, found.start()));
            }
        }
        if self.finish.iter().any(|re| re.is_match(window.since_send)) {
            return Readiness::Finished;
        }
        if self.prompts.iter().any(|re| re.is_match(window.since_send)) {
            return Readiness::Prompt;
        }
        if !window.since_send.trim().is_empty() && window.quiet_for >= self.quiet_interval {
            return Readiness::Quiet;
        }
        Readiness::Pending
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| Regex::new(pattern).with_context(|| format!("invalid pattern {pattern:?}")))
        .collect()
}

/// The full line containing byte offset `at`.
fn line_around(text: &str, at: usize) -> String {
    let start = text[..at].rfind('\n').map_or(0, |idx| idx + 1);
    let end = text[at..].find('\n').map_or(text.len(), |idx| at + idx);
    text[start..end].trim().to_string()
}
