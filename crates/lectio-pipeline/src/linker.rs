//! Link building: walk one analyzed text and emit a positional link per
//! token, registering newly observed surface forms along the way.
//!
//! Links for a text are replaced wholesale on (re-)ingestion and never
//! touch links belonging to other texts; nothing is written until the full
//! analyzer output has been walked, so a failing analyzer call leaves the
//! previous link set valid.

use serde::Serialize;
use tracing::info;

use crate::projector::{self, TreeRenderer};
use crate::resolver::{self, ResolutionDiagnostic};
use lectio_store::{LexiconStore, NewLink, StoreError};
use lectio_types::{AnalyzedText, Pos, TextId};

/// Summary of one text ingestion.
#[derive(Clone, Debug, Default, Serialize)]
pub struct IngestReport {
    pub text: TextId,
    pub sentences: usize,
    pub links_created: usize,
    pub entries_created: usize,
    pub forms_created: usize,
    /// Homonym ties resolved deterministically but worth human review.
    pub ambiguities: Vec<ResolutionDiagnostic>,
    /// Tokens that produced a link but no entry (await orphan repair).
    pub errors: Vec<String>,
}

/// Ingest one analyzed text: resolve every word token, emit links in
/// reading order, and overwrite the per-sentence annotations.
///
/// Punctuation tokens get a link with no entry. Word tokens always get an
/// entry, in the worst case a freshly created provisional one. The old
/// link set for this text is replaced in the same exclusive store call
/// that inserts the new one, so re-ingestion is atomic and idempotent.
pub fn ingest(
    store: &mut LexiconStore,
    text: TextId,
    analyzed: &AnalyzedText,
    renderer: Option<&dyn TreeRenderer>,
) -> Result<IngestReport, StoreError> {
    let mut report = IngestReport {
        text,
        sentences: analyzed.sentences.len(),
        ..IngestReport::default()
    };

    let mut new_links = Vec::with_capacity(analyzed.token_count());
    for (s, sentence) in analyzed.sentences.iter().enumerate() {
        let sentence_number = s as u32 + 1;
        for (t, token) in sentence.tokens.iter().enumerate() {
            let position = t as u32 + 1;
            let role = projector::project_role(&token.dep);
            let entry = if lectio_norm::is_word(&token.surface) {
                match resolver::resolve(
                    store,
                    &token.surface,
                    &token.lemma,
                    Pos::from_upos(&token.upos),
                    &token.features,
                ) {
                    Some(resolution) => {
                        if resolution.created {
                            report.entries_created += 1;
                        }
                        if resolution.form_created {
                            report.forms_created += 1;
                        }
                        if let Some(diagnostic) = resolution.diagnostic {
                            report.ambiguities.push(diagnostic);
                        }
                        Some(resolution.entry)
                    }
                    None => {
                        report.errors.push(format!(
                            "sentence {sentence_number} position {position}: \
                             no resolvable key for {:?}",
                            token.surface
                        ));
                        None
                    }
                }
            } else {
                None
            };
            new_links.push(NewLink {
                sentence: sentence_number,
                position,
                surface: token.surface.clone(),
                features: token.features.clone(),
                role,
                entry,
            });
        }
    }

    report.links_created = new_links.len();
    store.replace_links(text, new_links)?;

    store.remove_annotations(text);
    for (s, sentence) in analyzed.sentences.iter().enumerate() {
        let annotation = projector::annotate_sentence(text, s as u32 + 1, sentence, renderer);
        store.upsert_annotation(annotation);
    }

    info!(
        text = %text,
        links = report.links_created,
        entries = report.entries_created,
        forms = report.forms_created,
        "ingested text"
    );
    Ok(report)
}
