use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use tower::util::ServiceExt;

use lectio_pipeline::analyzer::{AnalyzeFuture, Analyzer, AnalyzerError};
use lectio_server::{AppState, router};
use lectio_store::{LexiconStore, NewEntry};
use lectio_types::{
    AnalyzedSentence, AnalyzedText, AnalyzedToken, EntryStatus, MorphFeatures, Pos,
};

struct StubAnalyzer(AnalyzedText);

impl Analyzer for StubAnalyzer {
    fn analyze<'a>(&'a self, _content: &'a str) -> AnalyzeFuture<'a> {
        let out = self.0.clone();
        Box::pin(async move { Ok(out) })
    }
}

struct FailingAnalyzer;

impl Analyzer for FailingAnalyzer {
    fn analyze<'a>(&'a self, _content: &'a str) -> AnalyzeFuture<'a> {
        Box::pin(async move {
            Err(AnalyzerError::Unavailable(
                "analyzer worker offline".into(),
            ))
        })
    }
}

fn token(surface: &str, lemma: &str, upos: &str, dep: &str, head: usize) -> AnalyzedToken {
    AnalyzedToken {
        surface: surface.into(),
        lemma: lemma.into(),
        upos: upos.into(),
        dep: dep.into(),
        head,
        features: MorphFeatures::new(),
    }
}

fn sample_analysis() -> AnalyzedText {
    AnalyzedText {
        sentences: vec![AnalyzedSentence {
            tokens: vec![
                token("Puella", "puella", "NOUN", "nsubj", 3),
                token("rosam", "rosa", "NOUN", "obj", 3),
                token("amat", "amo", "VERB", "root", 0),
                token(".", ".", "PUNCT", "punct", 3),
            ],
        }],
    }
}

fn make_state(analyzer: Arc<dyn Analyzer>, store_path: Option<PathBuf>) -> AppState {
    AppState {
        store: Arc::new(RwLock::new(LexiconStore::new())),
        analyzer,
        store_path,
    }
}

fn ingest_request() -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/texts")
        .header("content-type", "application/json")
        .body(Body::from(
            r#"{"title": "Puella", "content": "Puella rosam amat.", "level": 1}"#,
        ))
        .expect("request")
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn healthz_ok() {
    let state = make_state(Arc::new(StubAnalyzer(sample_analysis())), None);
    let app = router(state);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn ingest_then_query_flow() {
    let state = make_state(Arc::new(StubAnalyzer(sample_analysis())), None);
    let app = router(state);

    let response = app.clone().oneshot(ingest_request()).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["links_created"], 4);
    assert_eq!(report["entries_created"], 3);
    let text_id = report["text"].as_u64().expect("text id");

    // Tooltip lookup for "rosam".
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/v1/texts/{text_id}/tokens/1/2"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let info = body_json(response).await;
    assert_eq!(info["surface"], "rosam");
    assert_eq!(info["role"], "direct_object");
    assert_eq!(info["entry"]["lemma"], "rosa");
    assert_eq!(info["entry"]["status"], "provisional");

    // Punctuation token has no entry.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/v1/texts/{text_id}/tokens/1/4"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    let info = body_json(response).await;
    assert!(info["entry"].is_null());

    // Role groups.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/v1/texts/{text_id}/sentences/1/roles"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let roles = body_json(response).await;
    assert_eq!(roles["roles"]["subject"], serde_json::json!([1]));
    assert_eq!(roles["roles"]["predicate"], serde_json::json!([3]));

    // Rendered tree.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/v1/texts/{text_id}/sentences/1/tree"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let tree = body_json(response).await;
    assert!(tree["tree"].as_str().expect("tree text").starts_with("amat"));

    // Re-analysis is idempotent.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/v1/texts/{text_id}/reanalyze"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let second = body_json(response).await;
    assert_eq!(second["links_created"], 4);
    assert_eq!(second["entries_created"], 0);
}

#[tokio::test]
async fn analyzer_failure_leaves_store_untouched() {
    let state = make_state(Arc::new(FailingAnalyzer), None);
    let app = router(state.clone());

    let response = app.clone().oneshot(ingest_request()).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert!(
        body["error"]
            .as_str()
            .unwrap_or_default()
            .contains("analyzer")
    );

    let store = state.store.read().expect("lock");
    assert_eq!(store.link_count(), 0);
    assert_eq!(store.entry_count(), 0);
    // The text record is not created either: nothing was persisted.
    assert_eq!(store.text_count(), 0);
}

#[tokio::test]
async fn ingest_rejects_missing_fields() {
    let state = make_state(Arc::new(StubAnalyzer(sample_analysis())), None);
    let app = router(state);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/texts")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"title": "  ", "content": "x"}"#))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(
        body["error"]
            .as_str()
            .unwrap_or_default()
            .contains("title")
    );
}

#[tokio::test]
async fn reconcile_merges_then_reaches_fixpoint() {
    let state = make_state(Arc::new(StubAnalyzer(sample_analysis())), None);
    {
        let mut store = state.store.write().expect("lock");
        store.insert_entry(NewEntry {
            lemma: "civis".into(),
            pos: Pos::Noun,
            gloss: "citizen".into(),
            status: EntryStatus::Active,
            ..NewEntry::default()
        });
        store.insert_entry(NewEntry {
            lemma: "ciuis".into(),
            pos: Pos::Noun,
            ..NewEntry::default()
        });
    }
    let app = router(state);

    let reconcile = || {
        Request::builder()
            .method("POST")
            .uri("/v1/reconcile")
            .body(Body::empty())
            .expect("request")
    };
    let response = app.clone().oneshot(reconcile()).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["merged_pairs"].as_array().expect("pairs").len(), 1);

    let response = app.clone().oneshot(reconcile()).await.expect("response");
    let report = body_json(response).await;
    assert!(report["merged_pairs"].as_array().expect("pairs").is_empty());
    assert_eq!(report["relinked_tokens"], 0);
}

#[tokio::test]
async fn force_merge_rejects_pos_mismatch() {
    let state = make_state(Arc::new(StubAnalyzer(sample_analysis())), None);
    {
        let mut store = state.store.write().expect("lock");
        store.insert_entry(NewEntry {
            lemma: "venio".into(),
            pos: Pos::Verb,
            gloss: "to come".into(),
            status: EntryStatus::Active,
            ..NewEntry::default()
        });
        store.insert_entry(NewEntry {
            lemma: "venio".into(),
            pos: Pos::Noun,
            ..NewEntry::default()
        });
    }
    let app = router(state);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/reconcile/force")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"survivor": 1, "victim": 2}"#))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(
        body["error"]
            .as_str()
            .unwrap_or_default()
            .contains("POS mismatch")
    );
}

#[tokio::test]
async fn successful_ingest_persists_a_snapshot() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("lexicon.json");
    let state = make_state(Arc::new(StubAnalyzer(sample_analysis())), Some(path.clone()));
    let app = router(state);

    let response = app.oneshot(ingest_request()).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let reloaded =
        LexiconStore::load(&path, lectio_store::LoadMode::Owned).expect("snapshot loads");
    assert_eq!(reloaded.link_count(), 4);
    assert_eq!(reloaded.entry_count(), 3);
}
