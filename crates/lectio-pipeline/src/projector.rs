//! Syntax projection: collapse the analyzer's fine-grained dependency
//! labels into the closed set of pedagogical roles, and render a
//! best-effort dependency tree.
//!
//! The projector reads only the analyzer token stream; it never touches the
//! lexicon. Role groups are bitsets over token positions so membership
//! checks and serialization stay order-stable, and each token lands in
//! exactly one role; unmappable labels go to the explicit `other` bucket,
//! never on the floor.

use std::collections::BTreeMap;

use bitvec::prelude::*;
use thiserror::Error;
use tracing::warn;

use lectio_store::{DepToken, SentenceAnnotation};
use lectio_types::{AnalyzedSentence, Pos, SyntaxRole, TextId};

type BitSet = BitVec<usize, Lsb0>;

/// Map one dependency label to a pedagogical role.
///
/// The static table covers the labels the analyzer is known to emit; a
/// substring heuristic catches close variants (`nsubj:pass`, `obl:tmod`,
/// …) before the `other` fallback.
pub fn project_role(dep: &str) -> SyntaxRole {
    match dep {
        "nsubj" | "csubj" => SyntaxRole::Subject,
        "root" | "ROOT" => SyntaxRole::Predicate,
        "obj" => SyntaxRole::DirectObject,
        "iobj" => SyntaxRole::IndirectObject,
        "advmod" | "amod" | "nmod" | "obl" | "nummod" | "acl" => SyntaxRole::Modifier,
        "det" => SyntaxRole::Determiner,
        "appos" => SyntaxRole::Apposition,
        "cc" | "conj" | "mark" => SyntaxRole::Conjunction,
        "case" => SyntaxRole::PrepositionMarker,
        "xcomp" | "ccomp" | "advcl" => SyntaxRole::Complement,
        other => {
            if other.contains("subj") {
                SyntaxRole::Subject
            } else if other.contains("obj") {
                SyntaxRole::DirectObject
            } else if other.contains("mod") {
                SyntaxRole::Modifier
            } else {
                SyntaxRole::Other
            }
        }
    }
}

/// Role → token-position sets for one sentence, backed by bitsets.
#[derive(Clone, Debug)]
pub struct RoleGroups {
    len: usize,
    sets: BTreeMap<SyntaxRole, BitSet>,
}

impl RoleGroups {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            sets: BTreeMap::new(),
        }
    }

    fn assign(&mut self, role: SyntaxRole, index0: usize) {
        let len = self.len;
        self.sets
            .entry(role)
            .or_insert_with(|| bitvec![usize, Lsb0; 0; len])
            .set(index0, true);
    }

    /// 1-based positions carrying a role, in sentence order.
    pub fn positions(&self, role: SyntaxRole) -> Vec<u32> {
        self.sets
            .get(&role)
            .map(|set| set.iter_ones().map(|i| i as u32 + 1).collect())
            .unwrap_or_default()
    }

    /// Flatten into the persisted representation (only non-empty roles).
    pub fn into_map(self) -> BTreeMap<SyntaxRole, Vec<u32>> {
        self.sets
            .into_iter()
            .filter(|(_, set)| set.any())
            .map(|(role, set)| (role, set.iter_ones().map(|i| i as u32 + 1).collect()))
            .collect()
    }
}

/// Project one sentence into role groups and the dependency-token rows
/// that get persisted alongside them.
pub fn project(sentence: &AnalyzedSentence) -> (RoleGroups, Vec<DepToken>) {
    let mut groups = RoleGroups::new(sentence.tokens.len());
    let mut tokens = Vec::with_capacity(sentence.tokens.len());
    for (i, token) in sentence.tokens.iter().enumerate() {
        let role = project_role(&token.dep);
        groups.assign(role, i);
        tokens.push(DepToken {
            index: i as u32 + 1,
            surface: token.surface.clone(),
            lemma: token.lemma.clone(),
            pos: Pos::from_upos(&token.upos),
            dep: token.dep.clone(),
            head: token.head as u32,
        });
    }
    (groups, tokens)
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("dependency graph is not a tree: {0}")]
    Malformed(String),
    #[error("renderer unavailable: {0}")]
    Unavailable(String),
}

/// Optional capability for producing a displayable dependency tree.
///
/// Rendering is best-effort: a failure here must never block the role
/// groups, so callers log and carry on with `tree = None`.
pub trait TreeRenderer: Send + Sync {
    fn render(&self, tokens: &[DepToken]) -> Result<String, RenderError>;
}

/// Plain-text tree renderer: one line per token, children indented under
/// their head.
pub struct TextTreeRenderer;

impl TreeRenderer for TextTreeRenderer {
    fn render(&self, tokens: &[DepToken]) -> Result<String, RenderError> {
        if tokens.is_empty() {
            return Ok(String::new());
        }
        let roots: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| t.head == 0)
            .map(|(i, _)| i)
            .collect();
        if roots.is_empty() {
            return Err(RenderError::Malformed("no root token".into()));
        }
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); tokens.len()];
        for (i, token) in tokens.iter().enumerate() {
            if token.head > 0 {
                let head = token.head as usize - 1;
                if head >= tokens.len() {
                    return Err(RenderError::Malformed(format!(
                        "head {} out of range",
                        token.head
                    )));
                }
                children[head].push(i);
            }
        }

        let mut out = String::new();
        let mut visited = vec![false; tokens.len()];
        for root in roots {
            write_node(&mut out, tokens, &children, &mut visited, root, 0)?;
        }
        if let Some(unreached) = visited.iter().position(|v| !v) {
            return Err(RenderError::Malformed(format!(
                "token {} unreachable from any root (cycle?)",
                unreached + 1
            )));
        }
        Ok(out)
    }
}

fn write_node(
    out: &mut String,
    tokens: &[DepToken],
    children: &[Vec<usize>],
    visited: &mut [bool],
    index: usize,
    depth: usize,
) -> Result<(), RenderError> {
    if visited[index] {
        return Err(RenderError::Malformed(format!(
            "token {} visited twice (cycle)",
            index + 1
        )));
    }
    visited[index] = true;
    let token = &tokens[index];
    if depth == 0 {
        out.push_str(&token.surface);
    } else {
        out.push_str(&"   ".repeat(depth - 1));
        out.push_str("└─ ");
        out.push_str(&token.surface);
        out.push_str(" (");
        out.push_str(&token.dep);
        out.push(')');
    }
    out.push('\n');
    for &child in &children[index] {
        write_node(out, tokens, children, visited, child, depth + 1)?;
    }
    Ok(())
}

/// Build the full per-sentence annotation, rendering a tree when a
/// renderer is on hand.
pub fn annotate_sentence(
    text: TextId,
    sentence_number: u32,
    sentence: &AnalyzedSentence,
    renderer: Option<&dyn TreeRenderer>,
) -> SentenceAnnotation {
    let (groups, tokens) = project(sentence);
    let tree = renderer.and_then(|r| match r.render(&tokens) {
        Ok(rendered) => Some(rendered),
        Err(err) => {
            warn!(text = %text, sentence = sentence_number, "tree rendering failed: {err}");
            None
        }
    });
    SentenceAnnotation {
        text,
        sentence: sentence_number,
        tokens,
        roles: groups.into_map(),
        tree,
    }
}
