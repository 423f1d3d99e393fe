//! Token → lexicon-entry resolution.
//!
//! Given a token (surface + lemma hint + POS + features), find the matching
//! canonical entry or create a provisional one. The worst case is a
//! provisional entry a human must later curate; tokens are never dropped,
//! and uncertainty is carried in the entry's `status` and in
//! [`ResolutionDiagnostic`] values rather than in errors.
//!
//! All lookups run against a `&mut LexiconStore`, so a caller holding the
//! store exclusively gets the whole read-candidates/decide/write step as
//! one atomic unit; two concurrent first sightings of a lemma therefore
//! cannot both create an entry.

use serde::Serialize;
use tracing::debug;

use lectio_norm::normalize;
use lectio_store::{LexiconStore, NewEntry};
use lectio_types::{EntryId, EntryStatus, MorphFeatures, Pos};

/// A resolution tie that survived every deterministic tie-break.
///
/// Low-severity: the lowest-id candidate was chosen, but a human should
/// look at the group.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolutionDiagnostic {
    pub surface: String,
    pub lemma_key: String,
    pub chosen: EntryId,
    pub rejected: Vec<EntryId>,
}

/// Outcome of resolving one token.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    pub entry: EntryId,
    /// Whether a provisional entry was created for this token.
    pub created: bool,
    /// Whether a new inflected-form row was recorded.
    pub form_created: bool,
    pub diagnostic: Option<ResolutionDiagnostic>,
}

/// Resolve a token with a lemma hint from the analyzer.
///
/// Returns `None` only when neither the lemma hint nor the surface yields
/// a non-empty normalized key (nothing to attach an entry to), a case the
/// link builder never produces for word tokens.
pub fn resolve(
    store: &mut LexiconStore,
    surface: &str,
    lemma_hint: &str,
    pos: Pos,
    features: &MorphFeatures,
) -> Option<Resolution> {
    let lemma_key = normalize(lemma_hint);
    let surface_key = normalize(surface);

    let mut candidates: Vec<EntryId> = Vec::new();
    for key in [&lemma_key, &surface_key] {
        if !key.is_empty() {
            for id in store.candidates(key, pos) {
                if !candidates.contains(&id) {
                    candidates.push(id);
                }
            }
        }
    }
    candidates.sort();

    let (entry, created, diagnostic) = match candidates.len() {
        0 => {
            let lemma = if lemma_hint.trim().is_empty() {
                surface
            } else {
                lemma_hint
            };
            if normalize(lemma).is_empty() {
                return None;
            }
            let id = create_provisional(store, lemma, pos, features);
            debug!(%id, lemma, %pos, "created provisional entry");
            (id, true, None)
        }
        1 => (candidates[0], false, None),
        _ => {
            let (chosen, diagnostic) = disambiguate(store, candidates, surface, &lemma_key, features);
            (chosen, false, diagnostic)
        }
    };

    if !created {
        fill_entry_gaps(store, entry, features);
    }

    let form_created = if surface_key.is_empty() {
        false
    } else {
        store
            .upsert_form(entry, surface, features.clone())
            .map(|(_, created)| created)
            .unwrap_or(false)
    };

    Some(Resolution {
        entry,
        created,
        form_created,
        diagnostic,
    })
}

/// Degraded resolution for orphan repair: only a stored surface form and
/// feature blob are available, so the match runs across every POS and the
/// confidence is lower. Still creates a provisional entry rather than give
/// up, unless the surface has no usable key at all.
pub fn resolve_surface_only(
    store: &mut LexiconStore,
    surface: &str,
    features: &MorphFeatures,
) -> Option<Resolution> {
    let surface_key = normalize(surface);
    if surface_key.is_empty() {
        return None;
    }

    let candidates = store.candidates_any_pos(&surface_key);
    let (entry, created, diagnostic) = match candidates.len() {
        0 => {
            let id = create_provisional(store, surface, Pos::Other, features);
            debug!(%id, surface, "created provisional entry from surface only");
            (id, true, None)
        }
        1 => (candidates[0], false, None),
        _ => {
            let (chosen, diagnostic) =
                disambiguate(store, candidates, surface, &surface_key, features);
            (chosen, false, diagnostic)
        }
    };

    let form_created = store
        .upsert_form(entry, surface, features.clone())
        .map(|(_, created)| created)
        .unwrap_or(false);

    Some(Resolution {
        entry,
        created,
        form_created,
        diagnostic,
    })
}

/// Tie-break ladder for a homonym group. Candidates arrive POS-filtered
/// and id-sorted; each step narrows the set only when it leaves at least
/// one survivor:
/// 1. morphological-class attribute match (declension / conjugation /
///    gender present on both the token and the entry),
/// 2. non-provisional status,
/// 3. lowest id, recording the tie when more than one entry remains.
fn disambiguate(
    store: &LexiconStore,
    mut candidates: Vec<EntryId>,
    surface: &str,
    key: &str,
    features: &MorphFeatures,
) -> (EntryId, Option<ResolutionDiagnostic>) {
    narrow(&mut candidates, |id| {
        let entry = store.entry(id).expect("candidate from index");
        class_attr_match(entry.declension.as_deref(), features.declension())
            || class_attr_match(entry.conjugation.as_deref(), features.conjugation())
            || class_attr_match(entry.gender.as_deref(), features.gender())
    });
    narrow(&mut candidates, |id| {
        store.entry(id).expect("candidate from index").status != EntryStatus::Provisional
    });

    let chosen = candidates[0];
    let diagnostic = (candidates.len() > 1).then(|| ResolutionDiagnostic {
        surface: surface.to_string(),
        lemma_key: key.to_string(),
        chosen,
        rejected: candidates[1..].to_vec(),
    });
    (chosen, diagnostic)
}

/// Keep only candidates passing `keep`, unless that would empty the set.
fn narrow(candidates: &mut Vec<EntryId>, keep: impl Fn(EntryId) -> bool) {
    let kept: Vec<EntryId> = candidates.iter().copied().filter(|id| keep(*id)).collect();
    if !kept.is_empty() {
        *candidates = kept;
    }
}

fn class_attr_match(entry_value: Option<&str>, token_value: Option<&str>) -> bool {
    match (entry_value, token_value) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

fn create_provisional(
    store: &mut LexiconStore,
    lemma: &str,
    pos: Pos,
    features: &MorphFeatures,
) -> EntryId {
    store.insert_entry(NewEntry {
        lemma: lemma.to_string(),
        pos,
        gloss: String::new(),
        status: EntryStatus::Provisional,
        gender: features.gender().map(str::to_string),
        declension: features.declension().map(str::to_string),
        conjugation: features.conjugation().map(str::to_string),
        ..NewEntry::default()
    })
}

/// Fill missing morphological-class attributes on an existing entry from
/// the token's features. Existing values are never overwritten.
fn fill_entry_gaps(store: &mut LexiconStore, id: EntryId, features: &MorphFeatures) {
    let gender = features.gender().map(str::to_string);
    let declension = features.declension().map(str::to_string);
    let conjugation = features.conjugation().map(str::to_string);
    if gender.is_none() && declension.is_none() && conjugation.is_none() {
        return;
    }
    let _ = store.update_entry(id, |entry| {
        if entry.gender.is_none() {
            entry.gender = gender;
        }
        if entry.declension.is_none() {
            entry.declension = declension;
        }
        if entry.conjugation.is_none() {
            entry.conjugation = conjugation;
        }
    });
}
