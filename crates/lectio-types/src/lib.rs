//! Shared types for the lectio lexical-linking pipeline.
//!
//! The goal is to expose the vocabulary every other crate speaks (parts of
//! speech, entry lifecycle states, pedagogical syntax roles, morphological
//! feature bags, and the token/sentence model produced by the external
//! analyzer) while staying cheap to depend on. Everything here is plain
//! data with `serde` derives; no I/O, no storage assumptions.
//!
//! Use [`Pos::from_upos`] to map analyzer tags into the lexicon's POS set,
//! [`MorphFeatures`] to carry the analyzer's opaque feature pairs, and the
//! id newtypes ([`EntryId`], [`TextId`], …) to reference records by stable
//! integer ids rather than pointers.
//!
//! ```rust
//! use lectio_types::{EntryStatus, Pos};
//!
//! assert_eq!(Pos::from_upos("PROPN"), Pos::ProperNoun);
//! assert_ne!(Pos::from_upos("PROPN"), Pos::Noun);
//! assert!(EntryStatus::Active.rank() > EntryStatus::Provisional.rank());
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Part of speech as tracked by the lexicon.
///
/// Proper nouns are a distinct value on purpose: a proper-noun and a
/// common-noun entry with the same normalized lemma are different words and
/// must never be merged or cross-resolved.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Pos {
    Noun,
    ProperNoun,
    Verb,
    Adjective,
    Adverb,
    Pronoun,
    Preposition,
    Conjunction,
    Interjection,
    Numeral,
    #[default]
    Other,
}

impl Pos {
    /// Map a Universal-Dependencies coarse tag (what the analyzer emits)
    /// into the lexicon's POS set. Unknown tags land in [`Pos::Other`].
    pub fn from_upos(tag: &str) -> Self {
        match tag {
            "NOUN" => Pos::Noun,
            "PROPN" => Pos::ProperNoun,
            "VERB" | "AUX" => Pos::Verb,
            "ADJ" | "DET" => Pos::Adjective,
            "ADV" | "PART" => Pos::Adverb,
            "PRON" => Pos::Pronoun,
            "ADP" => Pos::Preposition,
            "SCONJ" | "CCONJ" => Pos::Conjunction,
            "INTJ" => Pos::Interjection,
            "NUM" => Pos::Numeral,
            _ => Pos::Other,
        }
    }

    /// Stable lowercase name used in reports and API payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Pos::Noun => "noun",
            Pos::ProperNoun => "proper_noun",
            Pos::Verb => "verb",
            Pos::Adjective => "adjective",
            Pos::Adverb => "adverb",
            Pos::Pronoun => "pronoun",
            Pos::Preposition => "preposition",
            Pos::Conjunction => "conjunction",
            Pos::Interjection => "interjection",
            Pos::Numeral => "numeral",
            Pos::Other => "other",
        }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a lexicon entry.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Auto-created without a human-authored gloss, pending curation.
    #[default]
    Provisional,
    /// Touched by automation in a way a human should double-check.
    NeedsReview,
    /// Curated and trusted.
    Active,
}

impl EntryStatus {
    /// Precedence used by survivor selection: higher rank wins.
    pub fn rank(self) -> u8 {
        match self {
            EntryStatus::Provisional => 0,
            EntryStatus::NeedsReview => 1,
            EntryStatus::Active => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Provisional => "provisional",
            EntryStatus::NeedsReview => "needs_review",
            EntryStatus::Active => "active",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of pedagogical syntax roles shown to learners.
///
/// Fine-grained dependency labels from the analyzer are projected onto this
/// set; anything unmappable lands in [`SyntaxRole::Other`] rather than being
/// dropped.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyntaxRole {
    Subject,
    Predicate,
    DirectObject,
    IndirectObject,
    Modifier,
    Determiner,
    Apposition,
    Conjunction,
    PrepositionMarker,
    Complement,
    Other,
}

impl SyntaxRole {
    /// Every role, in display order. Used to build role-group maps with a
    /// stable iteration order.
    pub const ALL: [SyntaxRole; 11] = [
        SyntaxRole::Subject,
        SyntaxRole::Predicate,
        SyntaxRole::DirectObject,
        SyntaxRole::IndirectObject,
        SyntaxRole::Modifier,
        SyntaxRole::Determiner,
        SyntaxRole::Apposition,
        SyntaxRole::Conjunction,
        SyntaxRole::PrepositionMarker,
        SyntaxRole::Complement,
        SyntaxRole::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SyntaxRole::Subject => "subject",
            SyntaxRole::Predicate => "predicate",
            SyntaxRole::DirectObject => "direct_object",
            SyntaxRole::IndirectObject => "indirect_object",
            SyntaxRole::Modifier => "modifier",
            SyntaxRole::Determiner => "determiner",
            SyntaxRole::Apposition => "apposition",
            SyntaxRole::Conjunction => "conjunction",
            SyntaxRole::PrepositionMarker => "preposition_marker",
            SyntaxRole::Complement => "complement",
            SyntaxRole::Other => "other",
        }
    }
}

impl fmt::Display for SyntaxRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque morphological feature bag from the analyzer (case, number, gender,
/// tense, …). Stored verbatim; keys are analyzer-specific.
///
/// Backed by a `BTreeMap` so serialization and comparison are order-stable.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MorphFeatures(pub BTreeMap<String, String>);

impl MorphFeatures {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Case-insensitive key lookup; analyzers disagree on capitalisation
    /// (`Gender` vs `gender`).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn gender(&self) -> Option<&str> {
        self.get("gender")
    }

    pub fn declension(&self) -> Option<&str> {
        self.get("declension")
    }

    pub fn conjugation(&self) -> Option<&str> {
        self.get("conjugation")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MorphFeatures {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize,
            Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(
    /// Stable id of a lexicon entry.
    EntryId
);
id_newtype!(
    /// Stable id of a source text.
    TextId
);
id_newtype!(
    /// Stable id of an inflected-form row.
    FormId
);
id_newtype!(
    /// Stable id of a token link row.
    LinkId
);

/// One token as produced by the external analyzer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedToken {
    /// Literal surface text as read from the source.
    pub surface: String,
    /// The analyzer's lemma candidate.
    pub lemma: String,
    /// Coarse Universal-Dependencies POS tag (`NOUN`, `VERB`, …).
    pub upos: String,
    /// Fine-grained dependency relation label (`nsubj`, `obl`, …).
    pub dep: String,
    /// Head token index within the sentence, 1-based; 0 marks the root.
    pub head: usize,
    #[serde(default)]
    pub features: MorphFeatures,
}

/// One analyzed sentence: tokens in reading order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedSentence {
    pub tokens: Vec<AnalyzedToken>,
}

/// Full analyzer output for one text.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedText {
    pub sentences: Vec<AnalyzedSentence>,
}

impl AnalyzedText {
    /// Total token count across sentences.
    pub fn token_count(&self) -> usize {
        self.sentences.iter().map(|s| s.tokens.len()).sum()
    }
}
