//! Subprocess client for the external morphological analyzer.
//!
//! The analyzer runs as a separate program (typically a Python NLP stack):
//! raw text goes in on stdin, analyzer JSON comes back on stdout. One
//! request, one response, one timeout. Nothing here touches the store,
//! so a dead or slow analyzer fails the one ingest that needed it.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use lectio_pipeline::analyzer::{AnalyzeFuture, Analyzer, AnalyzerError, validate_output};
use lectio_types::AnalyzedText;

/// Analyzer driven through a configured command line.
pub struct CommandAnalyzer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandAnalyzer {
    /// Build from a whitespace-separated command line, e.g.
    /// `"python3 analyze.py --lang la"`.
    pub fn from_command_line(command: &str, timeout: Duration) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            timeout,
        })
    }

    async fn run(&self, content: &str) -> Result<AnalyzedText, AnalyzerError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AnalyzerError::Unavailable(format!("spawn {}: {e}", self.program)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AnalyzerError::Unavailable("analyzer stdin unavailable".into()))?;
        stdin
            .write_all(content.as_bytes())
            .await
            .map_err(|e| AnalyzerError::Unavailable(format!("write to analyzer: {e}")))?;
        drop(stdin);

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AnalyzerError::TimedOut(self.timeout))?
            .map_err(|e| AnalyzerError::Unavailable(format!("wait for analyzer: {e}")))?;

        if !output.status.success() {
            return Err(AnalyzerError::Unavailable(format!(
                "analyzer exited with {}",
                output.status
            )));
        }

        debug!(bytes = output.stdout.len(), "analyzer responded");
        let analyzed: AnalyzedText = serde_json::from_slice(&output.stdout)
            .map_err(|e| AnalyzerError::Malformed(e.to_string()))?;
        validate_output(&analyzed)?;
        Ok(analyzed)
    }
}

impl Analyzer for CommandAnalyzer {
    fn analyze<'a>(&'a self, content: &'a str) -> AnalyzeFuture<'a> {
        Box::pin(self.run(content))
    }
}
