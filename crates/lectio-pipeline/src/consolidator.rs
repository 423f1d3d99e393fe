//! Consolidation: detect duplicate lexicon entries, merge them
//! deterministically, and repair links left dangling by earlier merges,
//! deletions, or tampering.
//!
//! Runs as an idempotent batch job over the whole store: a second pass
//! with no intervening ingestion reports zero further mutations. Callers
//! give it exclusive store access for the duration of a pass; it is a
//! maintenance job and nothing user-facing blocks on it.
//!
//! The grouping rule drives everything: entries sharing a
//! `(normalized lemma, POS)` key are one word spelled differently. The
//! one-off "fix word X" case is [`force_merge`], a thin wrapper over the
//! same merge routine with the survivor chosen by the caller.

use serde::Serialize;
use tracing::{info, warn};

use crate::resolver;
use lectio_store::{LexiconStore, StoreError};
use lectio_types::{EntryId, LinkId, MorphFeatures, Pos};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsolidateError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("cannot merge entry {0} into itself")]
    SameEntry(EntryId),
    #[error("POS mismatch: survivor {survivor} is {survivor_pos}, victim {victim} is {victim_pos}")]
    PosMismatch {
        survivor: EntryId,
        survivor_pos: Pos,
        victim: EntryId,
        victim_pos: Pos,
    },
}

/// One merge performed during a pass.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MergedPair {
    pub survivor: EntryId,
    pub victim: EntryId,
    pub lemma_key: String,
    pub pos: Pos,
}

/// A losing field value discarded during a merge, kept for audit.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MergeConflict {
    pub survivor: EntryId,
    pub victim: EntryId,
    pub field: &'static str,
    pub kept: String,
    pub discarded: String,
}

/// Summary of one consolidation pass.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ReconcileReport {
    pub merged_pairs: Vec<MergedPair>,
    pub relinked_forms: usize,
    /// Victim forms dropped because the survivor already knew the spelling.
    pub collapsed_forms: usize,
    pub relinked_tokens: usize,
    pub repaired_orphans: usize,
    /// Orphans no plausible entry could be found for, now `needs_review`.
    pub flagged_orphans: usize,
    pub deleted_orphan_forms: usize,
    pub conflicts: Vec<MergeConflict>,
}

impl ReconcileReport {
    /// True when the pass changed nothing (the fixpoint signal).
    pub fn is_noop(&self) -> bool {
        self.merged_pairs.is_empty()
            && self.relinked_forms == 0
            && self.collapsed_forms == 0
            && self.relinked_tokens == 0
            && self.repaired_orphans == 0
            && self.flagged_orphans == 0
            && self.deleted_orphan_forms == 0
            && self.conflicts.is_empty()
    }
}

/// Run one full consolidation pass: merge duplicate groups, drop orphaned
/// form rows, and repair orphaned token links.
pub fn reconcile(store: &mut LexiconStore) -> Result<ReconcileReport, ConsolidateError> {
    let mut report = ReconcileReport::default();

    for ((lemma_key, pos), mut ids) in store.duplicate_lemma_groups() {
        ids.sort_by_key(|id| {
            let entry = store.entry(*id).expect("group member is live");
            (
                std::cmp::Reverse(entry.has_gloss()),
                std::cmp::Reverse(entry.status.rank()),
                *id,
            )
        });
        let survivor = ids[0];
        for victim in ids[1..].to_vec() {
            merge_into(store, survivor, victim, &mut report)?;
            report.merged_pairs.push(MergedPair {
                survivor,
                victim,
                lemma_key: lemma_key.clone(),
                pos,
            });
        }
    }

    let orphan_forms: Vec<_> = store
        .iter_forms()
        .filter(|form| !store.entry_exists(form.entry))
        .map(|form| form.id)
        .collect();
    for id in orphan_forms {
        store.remove_form(id);
        report.deleted_orphan_forms += 1;
    }

    repair_orphan_links(store, &mut report);

    info!(
        merged = report.merged_pairs.len(),
        relinked_forms = report.relinked_forms,
        relinked_tokens = report.relinked_tokens,
        repaired = report.repaired_orphans,
        flagged = report.flagged_orphans,
        "consolidation pass complete"
    );
    Ok(report)
}

/// Merge one specific victim into one specific survivor: the generalized
/// form of the old per-word fix-up scripts. Refuses POS-mismatched pairs
/// unless explicitly overridden (the forced case exists precisely to clean
/// up wrong-POS duplicates).
pub fn force_merge(
    store: &mut LexiconStore,
    survivor: EntryId,
    victim: EntryId,
    allow_pos_mismatch: bool,
) -> Result<ReconcileReport, ConsolidateError> {
    if survivor == victim {
        return Err(ConsolidateError::SameEntry(survivor));
    }
    let survivor_pos = store
        .entry(survivor)
        .ok_or(StoreError::UnknownEntry(survivor))?
        .pos;
    let victim_entry = store.entry(victim).ok_or(StoreError::UnknownEntry(victim))?;
    let (victim_pos, lemma_key) = (victim_entry.pos, victim_entry.lemma_key());
    if survivor_pos != victim_pos && !allow_pos_mismatch {
        return Err(ConsolidateError::PosMismatch {
            survivor,
            survivor_pos,
            victim,
            victim_pos,
        });
    }

    let mut report = ReconcileReport::default();
    merge_into(store, survivor, victim, &mut report)?;
    report.merged_pairs.push(MergedPair {
        survivor,
        victim,
        lemma_key,
        pos: survivor_pos,
    });
    Ok(report)
}

/// The one merge routine: fold the victim's fields into the survivor,
/// re-point every referent, then delete the victim.
fn merge_into(
    store: &mut LexiconStore,
    survivor: EntryId,
    victim: EntryId,
    report: &mut ReconcileReport,
) -> Result<(), ConsolidateError> {
    let victim_entry = store
        .entry(victim)
        .ok_or(StoreError::UnknownEntry(victim))?
        .clone();

    let mut conflicts = Vec::new();
    store.update_entry(survivor, |entry| {
        // Gloss: survivor keeps its own; a differing victim gloss is an
        // audit-worthy conflict, an empty survivor adopts the victim's.
        if victim_entry.has_gloss() {
            if !entry.has_gloss() {
                entry.gloss = victim_entry.gloss.clone();
            } else if entry.gloss.trim() != victim_entry.gloss.trim() {
                conflicts.push(MergeConflict {
                    survivor,
                    victim,
                    field: "gloss",
                    kept: entry.gloss.clone(),
                    discarded: victim_entry.gloss.clone(),
                });
            }
        }

        let string_fields: [(&'static str, &mut Option<String>, &Option<String>); 5] = [
            ("gender", &mut entry.gender, &victim_entry.gender),
            ("declension", &mut entry.declension, &victim_entry.declension),
            (
                "conjugation",
                &mut entry.conjugation,
                &victim_entry.conjugation,
            ),
            ("genitive", &mut entry.genitive, &victim_entry.genitive),
            (
                "principal_parts",
                &mut entry.principal_parts,
                &victim_entry.principal_parts,
            ),
        ];
        for (field, own, theirs) in string_fields {
            match (own.as_deref(), theirs.as_deref()) {
                (None, Some(value)) => *own = Some(value.to_string()),
                (Some(kept), Some(discarded)) if kept != discarded => {
                    conflicts.push(MergeConflict {
                        survivor,
                        victim,
                        field,
                        kept: kept.to_string(),
                        discarded: discarded.to_string(),
                    });
                }
                _ => {}
            }
        }

        // Numeric pedagogical fields: the lower, more specific value wins.
        entry.level = min_option(entry.level, victim_entry.level);
        entry.frequency_rank = min_option(entry.frequency_rank, victim_entry.frequency_rank);
        entry.is_fundamental |= victim_entry.is_fundamental;
    })?;
    report.conflicts.extend(conflicts);

    let stats = store.repoint_entry(victim, survivor)?;
    report.relinked_forms += stats.forms_moved;
    report.collapsed_forms += stats.forms_collapsed;
    report.relinked_tokens += stats.links_moved;

    // Only deletable once nothing references it.
    store.remove_entry(victim)?;
    Ok(())
}

fn min_option<T: Ord + Copy>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (value, None) | (None, value) => value,
    }
}

/// Re-submit orphaned links to the resolver in degraded, surface-only
/// mode. Punctuation links keep their null entry; word links that cannot
/// be repaired are flagged for review instead of crashing the pass.
fn repair_orphan_links(store: &mut LexiconStore, report: &mut ReconcileReport) {
    let orphans: Vec<(LinkId, String, MorphFeatures, bool)> = store
        .iter_links()
        .filter(|link| {
            let dangling = link.entry.is_some_and(|id| !store.entry_exists(id));
            let null_word = link.entry.is_none() && link.is_word() && !link.needs_review;
            dangling || null_word
        })
        .map(|link| {
            (
                link.id,
                link.surface.clone(),
                link.features.clone(),
                link.is_word(),
            )
        })
        .collect();

    for (id, surface, features, is_word) in orphans {
        if !is_word {
            // A dangling reference on punctuation can only come from
            // tampering; null is its correct resting state.
            let _ = store.set_link_entry(id, None, false);
            report.repaired_orphans += 1;
            continue;
        }
        match resolver::resolve_surface_only(store, &surface, &features) {
            Some(resolution) => {
                let _ = store.set_link_entry(id, Some(resolution.entry), false);
                report.repaired_orphans += 1;
            }
            None => {
                warn!(link = %id, surface, "orphan link could not be repaired");
                let _ = store.set_link_entry(id, None, true);
                report.flagged_orphans += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectio_store::{NewEntry, NewLink};
    use lectio_types::{EntryStatus, SyntaxRole};

    fn entry(store: &mut LexiconStore, lemma: &str, pos: Pos, gloss: &str) -> EntryId {
        store.insert_entry(NewEntry {
            lemma: lemma.into(),
            pos,
            gloss: gloss.into(),
            status: if gloss.is_empty() {
                EntryStatus::Provisional
            } else {
                EntryStatus::Active
            },
            ..NewEntry::default()
        })
    }

    fn word_link(surface: &str, position: u32, entry: Option<EntryId>) -> NewLink {
        NewLink {
            sentence: 1,
            position,
            surface: surface.into(),
            features: MorphFeatures::new(),
            role: SyntaxRole::Subject,
            entry,
        }
    }

    #[test]
    fn merges_duplicates_and_repoints_referents() {
        let mut store = LexiconStore::new();
        let survivor = entry(&mut store, "civis", Pos::Noun, "citizen");
        let victim = entry(&mut store, "ciuis", Pos::Noun, "");
        store.upsert_form(survivor, "civis", MorphFeatures::new()).unwrap();
        store.upsert_form(survivor, "cives", MorphFeatures::new()).unwrap();
        store.upsert_form(victim, "ciuem", MorphFeatures::new()).unwrap();
        store.upsert_form(victim, "ciuibus", MorphFeatures::new()).unwrap();

        let text = store.insert_text("T", "...", 1);
        let mut links: Vec<NewLink> = (1..=5)
            .map(|p| word_link("ciuis", p, Some(victim)))
            .collect();
        links.push(word_link("civis", 6, Some(survivor)));
        links.push(word_link("cives", 7, Some(survivor)));
        store.replace_links(text, links).unwrap();

        let report = reconcile(&mut store).expect("reconcile");

        assert_eq!(report.merged_pairs.len(), 1);
        assert_eq!(report.merged_pairs[0].survivor, survivor);
        assert_eq!(report.merged_pairs[0].victim, victim);
        assert_eq!(report.relinked_tokens, 5);
        assert_eq!(report.relinked_forms, 2);
        assert!(!store.entry_exists(victim));
        assert_eq!(store.links_for_entry(survivor).len(), 7);
        assert_eq!(store.forms_for_entry(survivor).len(), 4);
    }

    #[test]
    fn pos_mismatch_blocks_grouping() {
        let mut store = LexiconStore::new();
        let noun = entry(&mut store, "venio", Pos::Noun, "");
        let verb = entry(&mut store, "venio", Pos::Verb, "to come");

        let report = reconcile(&mut store).expect("reconcile");
        assert!(report.merged_pairs.is_empty());
        assert!(store.entry_exists(noun));
        assert!(store.entry_exists(verb));

        // The forced path refuses too, unless explicitly overridden.
        assert!(matches!(
            force_merge(&mut store, verb, noun, false),
            Err(ConsolidateError::PosMismatch { .. })
        ));
        let forced = force_merge(&mut store, verb, noun, true).expect("forced merge");
        assert_eq!(forced.merged_pairs.len(), 1);
        assert!(!store.entry_exists(noun));
    }

    #[test]
    fn field_merge_precedence() {
        let mut store = LexiconStore::new();
        let survivor = entry(&mut store, "aqua", Pos::Noun, "");
        let victim = entry(&mut store, "aqua", Pos::Noun, "water");
        store
            .update_entry(survivor, |e| {
                e.level = Some(5);
                e.genitive = Some("aquae".into());
            })
            .unwrap();
        store
            .update_entry(victim, |e| {
                e.level = Some(2);
                e.frequency_rank = Some(120);
                e.is_fundamental = true;
                e.genitive = Some("aquāī".into());
            })
            .unwrap();

        // Victim has the gloss, so survivor selection flips the pair: the
        // glossed entry survives. Force the direction to test adoption.
        let report = force_merge(&mut store, survivor, victim, false).expect("merge");
        let merged = store.entry(survivor).expect("live").clone();
        assert_eq!(merged.gloss, "water");
        assert_eq!(merged.level, Some(2));
        assert_eq!(merged.frequency_rank, Some(120));
        assert!(merged.is_fundamental);
        // Differing genitive: survivor's value kept, conflict recorded.
        assert_eq!(merged.genitive.as_deref(), Some("aquae"));
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].field, "genitive");
        assert_eq!(report.conflicts[0].discarded, "aquāī");
    }

    #[test]
    fn differing_glosses_keep_survivor_and_record_conflict() {
        let mut store = LexiconStore::new();
        let first = entry(&mut store, "malum", Pos::Noun, "apple");
        let second = entry(&mut store, "mālum", Pos::Noun, "evil");

        let report = reconcile(&mut store).expect("reconcile");
        assert_eq!(report.merged_pairs.len(), 1);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].field, "gloss");
        assert_eq!(report.conflicts[0].kept, "apple");
        assert_eq!(report.conflicts[0].discarded, "evil");
        assert_eq!(store.entry(first).expect("live").gloss, "apple");
        assert!(!store.entry_exists(second));
    }

    #[test]
    fn orphan_repair_attaches_or_creates_but_skips_punctuation() {
        let mut store = LexiconStore::new();
        let verb = entry(&mut store, "venio", Pos::Verb, "to come");
        store.upsert_form(verb, "venit", MorphFeatures::new()).unwrap();
        let text = store.insert_text("T", "...", 1);
        store
            .replace_links(
                text,
                vec![
                    // Known surface with no entry: should reattach to verb.
                    word_link("venit", 1, None),
                    // Unknown surface: should get a fresh provisional entry.
                    word_link("ignotum", 2, None),
                    // Punctuation: null is fine, never an orphan.
                    NewLink {
                        sentence: 1,
                        position: 3,
                        surface: ".".into(),
                        features: MorphFeatures::new(),
                        role: SyntaxRole::Other,
                        entry: None,
                    },
                ],
            )
            .unwrap();

        let report = reconcile(&mut store).expect("reconcile");
        assert_eq!(report.repaired_orphans, 2);
        assert_eq!(report.flagged_orphans, 0);

        let repaired = store.link_at(text, 1, 1).expect("link");
        assert_eq!(repaired.entry, Some(verb));
        let created = store.link_at(text, 1, 2).expect("link");
        let created_entry = store.entry(created.entry.expect("attached")).expect("live");
        assert_eq!(created_entry.status, EntryStatus::Provisional);
        let punct = store.link_at(text, 1, 3).expect("link");
        assert!(punct.entry.is_none());
        assert!(!punct.needs_review);
    }

    #[test]
    fn reconcile_reaches_fixpoint() {
        let mut store = LexiconStore::new();
        entry(&mut store, "civis", Pos::Noun, "citizen");
        let victim = entry(&mut store, "ciuis", Pos::Noun, "");
        store.upsert_form(victim, "ciuem", MorphFeatures::new()).unwrap();
        let text = store.insert_text("T", "...", 1);
        store
            .replace_links(text, vec![word_link("ciuem", 1, Some(victim)), word_link("mare", 2, None)])
            .unwrap();

        let first = reconcile(&mut store).expect("first pass");
        assert!(!first.is_noop());
        let second = reconcile(&mut store).expect("second pass");
        assert!(second.is_noop(), "second pass mutated: {second:?}");
    }

    #[test]
    fn tampered_snapshot_with_dangling_references_is_repaired() {
        // The store API refuses to create dangling references, so the only
        // way to get them is a hand-edited snapshot.
        let json = serde_json::json!({
            "entries": [{
                "id": 1, "lemma": "venio", "pos": "verb",
                "gloss": "to come", "status": "active"
            }],
            "forms": [
                {"id": 1, "entry": 1, "surface": "venit", "normalized": "uenit", "features": {}},
                {"id": 2, "entry": 99, "surface": "umbra", "normalized": "umbra", "features": {}}
            ],
            "links": [
                {"id": 1, "text": 1, "sentence": 1, "position": 1, "surface": "venit",
                 "features": {}, "role": "predicate", "entry": 99, "needs_review": false},
                {"id": 2, "text": 1, "sentence": 1, "position": 2, "surface": "—",
                 "features": {}, "role": "other", "entry": 99, "needs_review": false}
            ],
            "annotations": [],
            "texts": [{"id": 1, "title": "T", "content": "venit —", "level": 1}],
            "next_entry_id": 100, "next_form_id": 100, "next_link_id": 100, "next_text_id": 100
        });
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("tampered.json");
        std::fs::write(&path, json.to_string()).expect("write snapshot");
        let mut store =
            LexiconStore::load(&path, lectio_store::LoadMode::Owned).expect("load snapshot");

        let report = reconcile(&mut store).expect("reconcile");
        assert_eq!(report.deleted_orphan_forms, 1);
        // The word link reattaches via its known form; the punctuation link
        // goes back to null without a review flag.
        assert_eq!(report.repaired_orphans, 2);
        assert_eq!(report.flagged_orphans, 0);
        let text = store.find_text_by_title("T").expect("text").id;
        let word = store.link_at(text, 1, 1).expect("link");
        assert_eq!(word.entry.map(|e| e.0), Some(1));
        let punct = store.link_at(text, 1, 2).expect("link");
        assert!(punct.entry.is_none());
        assert!(!punct.needs_review);

        let second = reconcile(&mut store).expect("second pass");
        assert!(second.is_noop(), "second pass mutated: {second:?}");
    }
}
