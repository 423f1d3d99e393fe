//! The lexicon store: canonical entries, their known inflected forms, the
//! positional links from source-text tokens to entries, and per-sentence
//! syntax annotations.
//!
//! Records live in `BTreeMap` arenas keyed by stable integer ids, so every
//! iteration (and therefore every tie-break taken by the resolver and the
//! consolidator) is deterministic, and merges are plain index rewrites.
//! Secondary indices (`(normalized lemma, POS)` to entries, normalized
//! form to entries) are derived state, rebuilt from the arenas on load and
//! never persisted.
//!
//! Persistence is a whole-store JSON snapshot. Callers choose between
//! memory-mapping the snapshot or reading it into an owned buffer at runtime
//! via [`LoadMode`]; writes go through a temp file and an atomic rename.
//!
//! The store itself is single-writer: mutators take `&mut self`. Callers
//! that ingest concurrently wrap it in a lock so that each
//! read-candidates/decide/write step of resolution runs as one exclusive
//! section, which is what keeps two concurrent first sightings of a lemma
//! from creating twin provisional entries.
//!
//! # Example
//! ```
//! use lectio_store::{LexiconStore, NewEntry};
//! use lectio_types::{EntryStatus, Pos};
//!
//! let mut store = LexiconStore::new();
//! let id = store.insert_entry(NewEntry {
//!     lemma: "rosa".into(),
//!     pos: Pos::Noun,
//!     gloss: "rose".into(),
//!     status: EntryStatus::Active,
//!     ..NewEntry::default()
//! });
//! store.upsert_form(id, "rosam", Default::default()).unwrap();
//! assert_eq!(store.candidates("rosa", Pos::Noun), vec![id]);
//! assert_eq!(store.candidates("rosam", Pos::Noun), vec![id]);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use lectio_norm::normalize;
use lectio_types::{EntryId, EntryStatus, FormId, LinkId, MorphFeatures, Pos, SyntaxRole, TextId};

/// Strategy for loading a snapshot file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadMode {
    /// Memory-map the snapshot (fast, no buffer copy).
    Mmap,
    /// Read the snapshot into an owned buffer (portable fallback).
    Owned,
}

enum Buffer {
    Mmap(Mmap),
    Owned(Vec<u8>),
}

impl Buffer {
    fn as_slice(&self) -> &[u8] {
        match self {
            Buffer::Mmap(m) => m.as_ref(),
            Buffer::Owned(v) => v.as_slice(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown entry id {0}")]
    UnknownEntry(EntryId),
    #[error("unknown text id {0}")]
    UnknownText(TextId),
    #[error("entry {0} is still referenced by forms or links")]
    EntryReferenced(EntryId),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A canonical lexicon entry ("word").
///
/// `gloss` empty means the entry is a placeholder awaiting curation; the
/// morphological-class attributes mirror what a Latin dictionary records per
/// POS (declension + genitive + gender for nouns, conjugation + principal
/// parts for verbs). `level` and `frequency_rank` are pedagogical metadata
/// where a *lower* value is the more specific claim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LexiconEntry {
    pub id: EntryId,
    pub lemma: String,
    pub pos: Pos,
    #[serde(default)]
    pub gloss: String,
    pub status: EntryStatus,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub declension: Option<String>,
    #[serde(default)]
    pub conjugation: Option<String>,
    #[serde(default)]
    pub genitive: Option<String>,
    #[serde(default)]
    pub principal_parts: Option<String>,
    #[serde(default)]
    pub level: Option<u8>,
    #[serde(default)]
    pub frequency_rank: Option<u32>,
    #[serde(default)]
    pub is_fundamental: bool,
}

impl LexiconEntry {
    /// Whether the gloss carries real content (placeholders are empty).
    pub fn has_gloss(&self) -> bool {
        !self.gloss.trim().is_empty()
    }

    /// Normalized comparison key of the lemma.
    pub fn lemma_key(&self) -> String {
        normalize(&self.lemma)
    }
}

/// Fields for a new entry; ids are assigned by the store.
#[derive(Clone, Debug, Default)]
pub struct NewEntry {
    pub lemma: String,
    pub pos: Pos,
    pub gloss: String,
    pub status: EntryStatus,
    pub gender: Option<String>,
    pub declension: Option<String>,
    pub conjugation: Option<String>,
    pub genitive: Option<String>,
    pub principal_parts: Option<String>,
    pub level: Option<u8>,
    pub frequency_rank: Option<u32>,
    pub is_fundamental: bool,
}

/// Reverse-index row: one observed surface spelling of an entry.
///
/// Unique per `(entry, normalized)`; the raw `surface` keeps the spelling
/// exactly as first read so tooling can show what was actually seen.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InflectedForm {
    pub id: FormId,
    pub entry: EntryId,
    pub surface: String,
    pub normalized: String,
    #[serde(default)]
    pub features: MorphFeatures,
}

/// One token occurrence in a source text.
///
/// `entry` is `None` for punctuation tokens, and transiently for orphans
/// awaiting repair; `needs_review` marks links the consolidator could not
/// repair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenLink {
    pub id: LinkId,
    pub text: TextId,
    /// 1-based sentence number within the text.
    pub sentence: u32,
    /// 1-based position within the sentence.
    pub position: u32,
    /// Literal surface form as read (not the normalized key).
    pub surface: String,
    #[serde(default)]
    pub features: MorphFeatures,
    pub role: SyntaxRole,
    pub entry: Option<EntryId>,
    #[serde(default)]
    pub needs_review: bool,
}

impl TokenLink {
    /// Punctuation links are the only ones allowed a permanent null entry.
    pub fn is_word(&self) -> bool {
        lectio_norm::is_word(&self.surface)
    }
}

/// Fields for a new token link; text and ids are supplied by the store.
#[derive(Clone, Debug, PartialEq)]
pub struct NewLink {
    pub sentence: u32,
    pub position: u32,
    pub surface: String,
    pub features: MorphFeatures,
    pub role: SyntaxRole,
    pub entry: Option<EntryId>,
}

/// One token row of a persisted dependency graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepToken {
    /// 1-based position within the sentence.
    pub index: u32,
    pub surface: String,
    pub lemma: String,
    pub pos: Pos,
    pub dep: String,
    /// 1-based head position; 0 marks the root.
    pub head: u32,
}

/// Per-sentence syntactic annotation, keyed by `(text, sentence)`.
///
/// Overwritten wholesale each time the sentence is (re-)analyzed; its
/// lifecycle is independent of entries and links.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SentenceAnnotation {
    pub text: TextId,
    pub sentence: u32,
    pub tokens: Vec<DepToken>,
    /// Role → sorted 1-based token positions; a token appears in exactly
    /// one role.
    pub roles: BTreeMap<SyntaxRole, Vec<u32>>,
    /// Best-effort rendered dependency tree; absent when no renderer was
    /// available or rendering failed.
    #[serde(default)]
    pub tree: Option<String>,
}

/// Immutable source text plus identifying metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceText {
    pub id: TextId,
    pub title: String,
    pub content: String,
    pub level: u8,
}

/// What a re-pointing sweep moved for one victim entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RepointStats {
    pub forms_moved: usize,
    /// Victim forms dropped because the survivor already knew the spelling.
    pub forms_collapsed: usize,
    pub links_moved: usize,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    entries: Vec<LexiconEntry>,
    forms: Vec<InflectedForm>,
    links: Vec<TokenLink>,
    annotations: Vec<SentenceAnnotation>,
    texts: Vec<SourceText>,
    next_entry_id: u64,
    next_form_id: u64,
    next_link_id: u64,
    next_text_id: u64,
}

/// The lexicon store. See the crate docs for the data model.
#[derive(Debug, Default)]
pub struct LexiconStore {
    entries: BTreeMap<EntryId, LexiconEntry>,
    forms: BTreeMap<FormId, InflectedForm>,
    links: BTreeMap<LinkId, TokenLink>,
    annotations: BTreeMap<(TextId, u32), SentenceAnnotation>,
    texts: BTreeMap<TextId, SourceText>,
    next_entry_id: u64,
    next_form_id: u64,
    next_link_id: u64,
    next_text_id: u64,
    // Derived indices, rebuilt on load.
    lemma_index: HashMap<(String, Pos), BTreeSet<EntryId>>,
    form_index: HashMap<String, BTreeSet<EntryId>>,
    entry_forms: HashMap<EntryId, BTreeSet<FormId>>,
    entry_links: HashMap<EntryId, BTreeSet<LinkId>>,
    text_links: HashMap<TextId, BTreeSet<LinkId>>,
}

impl LexiconStore {
    pub fn new() -> Self {
        Self {
            next_entry_id: 1,
            next_form_id: 1,
            next_link_id: 1,
            next_text_id: 1,
            ..Self::default()
        }
    }

    // ----- texts -------------------------------------------------------

    pub fn insert_text(&mut self, title: &str, content: &str, level: u8) -> TextId {
        let id = TextId(self.next_text_id);
        self.next_text_id += 1;
        self.texts.insert(
            id,
            SourceText {
                id,
                title: title.to_string(),
                content: content.to_string(),
                level,
            },
        );
        id
    }

    pub fn text(&self, id: TextId) -> Option<&SourceText> {
        self.texts.get(&id)
    }

    /// Title lookup used by re-imports: the same title refers to the same
    /// text record.
    pub fn find_text_by_title(&self, title: &str) -> Option<&SourceText> {
        self.texts.values().find(|t| t.title == title)
    }

    pub fn update_text(&mut self, id: TextId, content: &str, level: u8) -> Result<()> {
        let text = self.texts.get_mut(&id).ok_or(StoreError::UnknownText(id))?;
        text.content = content.to_string();
        text.level = level;
        Ok(())
    }

    pub fn iter_texts(&self) -> impl Iterator<Item = &SourceText> {
        self.texts.values()
    }

    // ----- entries -----------------------------------------------------

    pub fn insert_entry(&mut self, new: NewEntry) -> EntryId {
        let id = EntryId(self.next_entry_id);
        self.next_entry_id += 1;
        let entry = LexiconEntry {
            id,
            lemma: new.lemma,
            pos: new.pos,
            gloss: new.gloss,
            status: new.status,
            gender: new.gender,
            declension: new.declension,
            conjugation: new.conjugation,
            genitive: new.genitive,
            principal_parts: new.principal_parts,
            level: new.level,
            frequency_rank: new.frequency_rank,
            is_fundamental: new.is_fundamental,
        };
        self.lemma_index
            .entry((entry.lemma_key(), entry.pos))
            .or_default()
            .insert(id);
        self.entries.insert(id, entry);
        id
    }

    pub fn entry(&self, id: EntryId) -> Option<&LexiconEntry> {
        self.entries.get(&id)
    }

    pub fn entry_exists(&self, id: EntryId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Apply a mutation to an entry, keeping the lemma index consistent
    /// even when the mutation rewrites lemma or POS.
    pub fn update_entry(&mut self, id: EntryId, f: impl FnOnce(&mut LexiconEntry)) -> Result<()> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(StoreError::UnknownEntry(id))?;
        let old_key = (normalize(&entry.lemma), entry.pos);
        f(entry);
        entry.id = id;
        let new_key = (normalize(&entry.lemma), entry.pos);
        if old_key != new_key {
            if let Some(set) = self.lemma_index.get_mut(&old_key) {
                set.remove(&id);
                if set.is_empty() {
                    self.lemma_index.remove(&old_key);
                }
            }
            self.lemma_index.entry(new_key).or_default().insert(id);
        }
        Ok(())
    }

    /// Remove an entry. Refuses while any form or link still references it;
    /// the caller must re-point those first.
    pub fn remove_entry(&mut self, id: EntryId) -> Result<LexiconEntry> {
        if !self.entries.contains_key(&id) {
            return Err(StoreError::UnknownEntry(id));
        }
        let forms_left = self.entry_forms.get(&id).is_some_and(|s| !s.is_empty());
        let links_left = self.entry_links.get(&id).is_some_and(|s| !s.is_empty());
        if forms_left || links_left {
            return Err(StoreError::EntryReferenced(id));
        }
        let entry = self.entries.remove(&id).expect("checked above");
        let key = (entry.lemma_key(), entry.pos);
        if let Some(set) = self.lemma_index.get_mut(&key) {
            set.remove(&id);
            if set.is_empty() {
                self.lemma_index.remove(&key);
            }
        }
        self.entry_forms.remove(&id);
        self.entry_links.remove(&id);
        Ok(entry)
    }

    pub fn iter_entries(&self) -> impl Iterator<Item = &LexiconEntry> {
        self.entries.values()
    }

    /// Entries matching a normalized key for a POS, via lemma or any known
    /// inflected form. Sorted by id, deduplicated.
    pub fn candidates(&self, key: &str, pos: Pos) -> Vec<EntryId> {
        let mut out: BTreeSet<EntryId> = BTreeSet::new();
        if let Some(set) = self.lemma_index.get(&(key.to_string(), pos)) {
            out.extend(set.iter().copied());
        }
        if let Some(set) = self.form_index.get(key) {
            out.extend(
                set.iter()
                    .copied()
                    .filter(|id| self.entries.get(id).is_some_and(|e| e.pos == pos)),
            );
        }
        out.into_iter().collect()
    }

    /// Entries matching a normalized key under *any* POS: the degraded
    /// lookup used by orphan repair, where no POS is known. Only live
    /// entries are returned; stale form-index references (orphaned forms)
    /// are skipped.
    pub fn candidates_any_pos(&self, key: &str) -> Vec<EntryId> {
        let mut out: BTreeSet<EntryId> = BTreeSet::new();
        if let Some(set) = self.form_index.get(key) {
            out.extend(set.iter().copied().filter(|id| self.entries.contains_key(id)));
        }
        for ((lemma_key, _), ids) in &self.lemma_index {
            if lemma_key == key {
                out.extend(ids.iter().copied());
            }
        }
        out.into_iter().collect()
    }

    /// Groups of distinct entries sharing a `(normalized lemma, POS)` key,
    /// i.e. the consolidator's merge candidates. Deterministic order.
    pub fn duplicate_lemma_groups(&self) -> Vec<((String, Pos), Vec<EntryId>)> {
        let mut groups: BTreeMap<(String, Pos), Vec<EntryId>> = BTreeMap::new();
        for entry in self.entries.values() {
            groups
                .entry((entry.lemma_key(), entry.pos))
                .or_default()
                .push(entry.id);
        }
        groups.into_iter().filter(|(_, ids)| ids.len() > 1).collect()
    }

    // ----- inflected forms ---------------------------------------------

    /// Ensure a form row `(entry, normalize(surface))` exists. Returns the
    /// row id and whether it was created; duplicates collapse here.
    pub fn upsert_form(
        &mut self,
        entry: EntryId,
        surface: &str,
        features: MorphFeatures,
    ) -> Result<(FormId, bool)> {
        if !self.entries.contains_key(&entry) {
            return Err(StoreError::UnknownEntry(entry));
        }
        let normalized = normalize(surface);
        if let Some(existing) = self
            .entry_forms
            .get(&entry)
            .into_iter()
            .flatten()
            .copied()
            .find(|fid| self.forms[fid].normalized == normalized)
        {
            return Ok((existing, false));
        }
        let id = FormId(self.next_form_id);
        self.next_form_id += 1;
        self.forms.insert(
            id,
            InflectedForm {
                id,
                entry,
                surface: surface.to_string(),
                normalized: normalized.clone(),
                features,
            },
        );
        self.entry_forms.entry(entry).or_default().insert(id);
        self.form_index.entry(normalized).or_default().insert(entry);
        Ok((id, true))
    }

    pub fn form(&self, id: FormId) -> Option<&InflectedForm> {
        self.forms.get(&id)
    }

    pub fn iter_forms(&self) -> impl Iterator<Item = &InflectedForm> {
        self.forms.values()
    }

    pub fn forms_for_entry(&self, entry: EntryId) -> Vec<&InflectedForm> {
        self.entry_forms
            .get(&entry)
            .into_iter()
            .flatten()
            .map(|id| &self.forms[id])
            .collect()
    }

    /// Drop a form row, cleaning both indices. Used for orphaned forms.
    pub fn remove_form(&mut self, id: FormId) -> Option<InflectedForm> {
        let form = self.forms.remove(&id)?;
        if let Some(set) = self.entry_forms.get_mut(&form.entry) {
            set.remove(&id);
            if set.is_empty() {
                self.entry_forms.remove(&form.entry);
            }
        }
        let still_indexed = self
            .entry_forms
            .get(&form.entry)
            .into_iter()
            .flatten()
            .any(|fid| self.forms[fid].normalized == form.normalized);
        if !still_indexed
            && let Some(set) = self.form_index.get_mut(&form.normalized)
        {
            set.remove(&form.entry);
            if set.is_empty() {
                self.form_index.remove(&form.normalized);
            }
        }
        Some(form)
    }

    // ----- token links -------------------------------------------------

    /// Replace every link of a text in one exclusive step: the old set is
    /// removed and the new set inserted before the method returns, so a
    /// re-ingestion is atomic from any reader's point of view.
    pub fn replace_links(&mut self, text: TextId, new_links: Vec<NewLink>) -> Result<Vec<LinkId>> {
        if !self.texts.contains_key(&text) {
            return Err(StoreError::UnknownText(text));
        }
        for link_id in self.text_links.remove(&text).into_iter().flatten() {
            if let Some(link) = self.links.remove(&link_id)
                && let Some(entry) = link.entry
                && let Some(set) = self.entry_links.get_mut(&entry)
            {
                set.remove(&link_id);
                if set.is_empty() {
                    self.entry_links.remove(&entry);
                }
            }
        }
        let mut ids = Vec::with_capacity(new_links.len());
        for new in new_links {
            let id = LinkId(self.next_link_id);
            self.next_link_id += 1;
            if let Some(entry) = new.entry {
                self.entry_links.entry(entry).or_default().insert(id);
            }
            self.text_links.entry(text).or_default().insert(id);
            self.links.insert(
                id,
                TokenLink {
                    id,
                    text,
                    sentence: new.sentence,
                    position: new.position,
                    surface: new.surface,
                    features: new.features,
                    role: new.role,
                    entry: new.entry,
                    needs_review: false,
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    pub fn link(&self, id: LinkId) -> Option<&TokenLink> {
        self.links.get(&id)
    }

    pub fn iter_links(&self) -> impl Iterator<Item = &TokenLink> {
        self.links.values()
    }

    /// Links of one text in reading order.
    pub fn links_for_text(&self, text: TextId) -> Vec<&TokenLink> {
        let mut links: Vec<&TokenLink> = self
            .text_links
            .get(&text)
            .into_iter()
            .flatten()
            .map(|id| &self.links[id])
            .collect();
        links.sort_by_key(|l| (l.sentence, l.position));
        links
    }

    pub fn link_at(&self, text: TextId, sentence: u32, position: u32) -> Option<&TokenLink> {
        self.text_links
            .get(&text)
            .into_iter()
            .flatten()
            .map(|id| &self.links[id])
            .find(|l| l.sentence == sentence && l.position == position)
    }

    pub fn links_for_entry(&self, entry: EntryId) -> Vec<&TokenLink> {
        self.entry_links
            .get(&entry)
            .into_iter()
            .flatten()
            .map(|id| &self.links[id])
            .collect()
    }

    /// Re-target one link, keeping the entry index consistent.
    pub fn set_link_entry(
        &mut self,
        id: LinkId,
        entry: Option<EntryId>,
        needs_review: bool,
    ) -> Result<()> {
        if let Some(target) = entry
            && !self.entries.contains_key(&target)
        {
            return Err(StoreError::UnknownEntry(target));
        }
        let Some(link) = self.links.get_mut(&id) else {
            return Ok(());
        };
        let old = link.entry;
        link.entry = entry;
        link.needs_review = needs_review;
        if old != entry {
            if let Some(prev) = old
                && let Some(set) = self.entry_links.get_mut(&prev)
            {
                set.remove(&id);
                if set.is_empty() {
                    self.entry_links.remove(&prev);
                }
            }
            if let Some(next) = entry {
                self.entry_links.entry(next).or_default().insert(id);
            }
        }
        Ok(())
    }

    /// Rewrite every form and link referencing `victim` to reference
    /// `survivor`. Victim forms whose normalized key the survivor already
    /// covers are dropped rather than duplicated.
    pub fn repoint_entry(&mut self, victim: EntryId, survivor: EntryId) -> Result<RepointStats> {
        if !self.entries.contains_key(&survivor) {
            return Err(StoreError::UnknownEntry(survivor));
        }
        let mut stats = RepointStats::default();

        let survivor_keys: BTreeSet<String> = self
            .entry_forms
            .get(&survivor)
            .into_iter()
            .flatten()
            .map(|id| self.forms[id].normalized.clone())
            .collect();

        for form_id in self
            .entry_forms
            .get(&victim)
            .map(|s| s.iter().copied().collect::<Vec<_>>())
            .unwrap_or_default()
        {
            let key = self.forms[&form_id].normalized.clone();
            if survivor_keys.contains(&key) {
                self.remove_form(form_id);
                stats.forms_collapsed += 1;
            } else {
                let form = self.forms.get_mut(&form_id).expect("form id from index");
                form.entry = survivor;
                if let Some(set) = self.entry_forms.get_mut(&victim) {
                    set.remove(&form_id);
                }
                self.entry_forms.entry(survivor).or_default().insert(form_id);
                if let Some(set) = self.form_index.get_mut(&key) {
                    set.remove(&victim);
                    set.insert(survivor);
                }
                stats.forms_moved += 1;
            }
        }
        if self.entry_forms.get(&victim).is_some_and(BTreeSet::is_empty) {
            self.entry_forms.remove(&victim);
        }

        for link_id in self
            .entry_links
            .remove(&victim)
            .map(|s| s.into_iter().collect::<Vec<_>>())
            .unwrap_or_default()
        {
            let link = self.links.get_mut(&link_id).expect("link id from index");
            link.entry = Some(survivor);
            self.entry_links.entry(survivor).or_default().insert(link_id);
            stats.links_moved += 1;
        }

        Ok(stats)
    }

    // ----- sentence annotations ----------------------------------------

    pub fn upsert_annotation(&mut self, annotation: SentenceAnnotation) {
        self.annotations
            .insert((annotation.text, annotation.sentence), annotation);
    }

    pub fn annotation(&self, text: TextId, sentence: u32) -> Option<&SentenceAnnotation> {
        self.annotations.get(&(text, sentence))
    }

    pub fn annotations_for_text(&self, text: TextId) -> Vec<&SentenceAnnotation> {
        self.annotations
            .range((text, 0)..=(text, u32::MAX))
            .map(|(_, a)| a)
            .collect()
    }

    /// Drop every annotation of a text; returns how many were removed.
    /// Called before re-analysis so stale trailing sentences cannot linger.
    pub fn remove_annotations(&mut self, text: TextId) -> usize {
        let keys: Vec<(TextId, u32)> = self
            .annotations
            .range((text, 0)..=(text, u32::MAX))
            .map(|(k, _)| *k)
            .collect();
        let count = keys.len();
        for key in keys {
            self.annotations.remove(&key);
        }
        count
    }

    // ----- counts ------------------------------------------------------

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn form_count(&self) -> usize {
        self.forms.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn annotation_count(&self) -> usize {
        self.annotations.len()
    }

    pub fn text_count(&self) -> usize {
        self.texts.len()
    }

    // ----- persistence -------------------------------------------------

    /// Write a snapshot next to `path` and atomically rename it into place.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let snapshot = Snapshot {
            entries: self.entries.values().cloned().collect(),
            forms: self.forms.values().cloned().collect(),
            links: self.links.values().cloned().collect(),
            annotations: self.annotations.values().cloned().collect(),
            texts: self.texts.values().cloned().collect(),
            next_entry_id: self.next_entry_id,
            next_form_id: self.next_form_id,
            next_link_id: self.next_link_id,
            next_text_id: self.next_text_id,
        };
        let tmp = path.with_extension("tmp");
        let file = File::create(&tmp)?;
        serde_json::to_writer(&file, &snapshot)?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Load a snapshot, choosing between mmap and an owned buffer at
    /// runtime. Derived indices are rebuilt from the record arenas.
    pub fn load(path: impl AsRef<Path>, mode: LoadMode) -> Result<Self> {
        let path = path.as_ref();
        let buffer = match mode {
            LoadMode::Mmap => {
                let file = File::open(path)?;
                // Safety: the snapshot file is owned by this process and not
                // mutated while mapped.
                Buffer::Mmap(unsafe { Mmap::map(&file)? })
            }
            LoadMode::Owned => {
                let mut file = File::open(path)?;
                let mut buf = Vec::new();
                file.read_to_end(&mut buf)?;
                Buffer::Owned(buf)
            }
        };
        let snapshot: Snapshot = serde_json::from_slice(buffer.as_slice())?;
        Ok(Self::from_snapshot(snapshot))
    }

    fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut store = Self {
            next_entry_id: snapshot.next_entry_id,
            next_form_id: snapshot.next_form_id,
            next_link_id: snapshot.next_link_id,
            next_text_id: snapshot.next_text_id,
            ..Self::default()
        };
        for text in snapshot.texts {
            store.texts.insert(text.id, text);
        }
        for entry in snapshot.entries {
            store
                .lemma_index
                .entry((entry.lemma_key(), entry.pos))
                .or_default()
                .insert(entry.id);
            store.entries.insert(entry.id, entry);
        }
        for form in snapshot.forms {
            store.entry_forms.entry(form.entry).or_default().insert(form.id);
            store
                .form_index
                .entry(form.normalized.clone())
                .or_default()
                .insert(form.entry);
            store.forms.insert(form.id, form);
        }
        for link in snapshot.links {
            if let Some(entry) = link.entry {
                store.entry_links.entry(entry).or_default().insert(link.id);
            }
            store.text_links.entry(link.text).or_default().insert(link.id);
            store.links.insert(link.id, link);
        }
        for annotation in snapshot.annotations {
            store
                .annotations
                .insert((annotation.text, annotation.sentence), annotation);
        }
        store
    }
}
