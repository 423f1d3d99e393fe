//! Boundary to the external morphological analyzer.
//!
//! The analyzer is an out-of-process collaborator: it consumes raw text and
//! returns, per sentence, ordered tokens with surface, lemma candidate,
//! coarse POS, dependency label, head index, and an open feature set. This
//! module only defines the contract; concrete clients (subprocess, stub)
//! live with whoever owns the process boundary.
//!
//! Nothing downstream mutates storage until a full, validated
//! [`AnalyzedText`] is in hand, so cancelling or failing an analyzer call
//! simply discards the in-memory result.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

use lectio_types::AnalyzedText;

/// Failure talking to, or understanding, the external analyzer.
///
/// All variants abort ingestion of the one text being analyzed and leave
/// the store untouched; they are retryable from the caller's side.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("analyzer unavailable: {0}")]
    Unavailable(String),
    #[error("analyzer returned malformed output: {0}")]
    Malformed(String),
    #[error("analyzer timed out after {0:?}")]
    TimedOut(Duration),
}

pub type AnalyzeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<AnalyzedText, AnalyzerError>> + Send + 'a>>;

/// An external analyzer client.
pub trait Analyzer: Send + Sync {
    /// Analyze one text. A single request/response boundary: implementors
    /// own connection handling and timeouts.
    fn analyze<'a>(&'a self, content: &'a str) -> AnalyzeFuture<'a>;
}

/// Check structural sanity of analyzer output before it is allowed near
/// the store: every head index must point inside its sentence (0 = root)
/// and no token may have an empty surface.
pub fn validate_output(analyzed: &AnalyzedText) -> Result<(), AnalyzerError> {
    for (s, sentence) in analyzed.sentences.iter().enumerate() {
        let len = sentence.tokens.len();
        for (t, token) in sentence.tokens.iter().enumerate() {
            if token.surface.is_empty() {
                return Err(AnalyzerError::Malformed(format!(
                    "sentence {} token {} has an empty surface",
                    s + 1,
                    t + 1
                )));
            }
            if token.head > len {
                return Err(AnalyzerError::Malformed(format!(
                    "sentence {} token {} head {} out of range (len {})",
                    s + 1,
                    t + 1,
                    token.head,
                    len
                )));
            }
        }
    }
    Ok(())
}
