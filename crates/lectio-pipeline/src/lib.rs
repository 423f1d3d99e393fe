//! The lexical linking pipeline: resolve tokens to lexicon entries, build
//! positional links, project syntax roles, and consolidate the store.

pub mod analyzer;
pub mod consolidator;
pub mod linker;
pub mod projector;
pub mod resolver;

pub use analyzer::{Analyzer, AnalyzerError};
pub use consolidator::{ConsolidateError, ReconcileReport, force_merge, reconcile};
pub use linker::{IngestReport, ingest};
pub use projector::{TextTreeRenderer, TreeRenderer, project_role};
pub use resolver::{Resolution, ResolutionDiagnostic, resolve, resolve_surface_only};
