//! End-to-end engine scenarios: index a workspace on disk, then query it the
//! way the tool layer does.

use std::sync::Arc;

use anyhow::Result;

use super::TestRig;
use crate::embeddings::Embedder;
use crate::extractors::{MatchType, SymbolKind};
use crate::search::{SearchMethod, SearchOptions, SearchRouter};
use crate::trace::{TraceDirection, TraceEngine, TraceOptions};

#[test]
fn index_then_goto() {
    let rig = TestRig::new();
    rig.write_file(
        "src/models.py",
        "class User:\n    def greet(self):\n        return 'hi'\n",
    );
    rig.index();

    let db = rig.db.lock().unwrap();

    let user = db.get_symbol_by_name("User", None).unwrap().unwrap();
    assert_eq!(user.file_path, "src/models.py");
    assert_eq!(user.kind, SymbolKind::Class);
    assert_eq!(user.start_line, 1);

    let greet = db.get_symbol_by_name("greet", None).unwrap().unwrap();
    assert_eq!(greet.file_path, "src/models.py");
    assert_eq!(greet.start_line, 2);
    assert_eq!(greet.kind, SymbolKind::Method);
}

#[test]
fn pattern_search_preserves_code_idioms() {
    let rig = TestRig::new();
    rig.write_file(
        "Services/UserService.cs",
        "public class UserService : BaseService\n{\n    private readonly ILogger<UserService> _logger;\n}\n",
    );
    rig.index();

    let store = rig.vector_store.read().unwrap();
    let embedder = rig.embedder.as_ref();

    // The class row matches the ": BaseService" idiom.
    let hits = store.search(": BaseService", SearchMethod::Pattern, 10, embedder);
    assert!(hits.iter().any(|h| h.name == "UserService"));

    // The field row matches "ILogger<".
    let hits = store.search("ILogger<UserService>", SearchMethod::Pattern, 10, embedder);
    assert!(hits.iter().any(|h| h.name == "_logger"));

    // Contrast case: plain text search can't handle the ':' query-syntax
    // metacharacter; it yields zero rows instead of erroring.
    let hits = store.search(": BaseService", SearchMethod::Text, 10, embedder);
    assert!(hits.is_empty());
}

#[test]
fn pattern_safety_over_full_char_set() {
    let rig = TestRig::new();
    rig.write_file("src/sample.py", "def handler():\n    pass\n");
    rig.index();

    let store = rig.vector_store.read().unwrap();
    let embedder = rig.embedder.as_ref();

    for query in [
        ": Base", "List<", "x[0]", "f()", "{}", "a=b", "c?", "a.b", "p,q", "a/b", "x\\y", "a|b",
        "a&b", "a^b", "~x", "!x", "a+b", "a-b", "a*b", "@dec", "#pragma",
    ] {
        // Neither method may error on pattern-carrying characters.
        let _ = store.search(query, SearchMethod::Pattern, 10, embedder);
        let _ = store.search(query, SearchMethod::Hybrid, 10, embedder);
    }
}

#[test]
fn cross_language_trace_with_variants() {
    let rig = TestRig::new();
    // No stored relationship links these two.
    rig.write_file(
        "src/services/user.ts",
        "export class UserService {\n}\n",
    );
    rig.write_file("api/users.py", "def user_service():\n    pass\n");
    rig.index();

    let db = rig.db.lock().unwrap();
    let engine = TraceEngine::new(&db, None, None);
    let path = engine
        .trace(&TraceOptions {
            symbol_name: "UserService".to_string(),
            direction: TraceDirection::Downstream,
            ..Default::default()
        })
        .unwrap();

    let root = path.root.expect("root present");
    assert_eq!(root.name, "UserService");
    let child = root
        .children
        .iter()
        .find(|c| c.name == "user_service")
        .expect("variant-discovered child");
    assert_eq!(child.match_type, MatchType::Variant);
    assert_eq!(child.language, "python");
}

/// Embedder stub with hand-placed vectors: credential-related names cluster,
/// date formatting is orthogonal.
struct StubEmbedder;

impl Embedder for StubEmbedder {
    fn dimensions(&self) -> usize {
        4
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = if text.contains("authenticate_user") {
                    vec![1.0, 0.0, 0.0, 0.0]
                } else if text.contains("verifyCredentials") {
                    vec![0.9, 0.1, 0.0, 0.0]
                } else if text.contains("format_date") {
                    vec![0.0, 0.0, 1.0, 0.0]
                } else {
                    vec![0.0, 0.0, 0.0, 1.0]
                };
                crate::embeddings::normalize(&mut v);
                v
            })
            .collect())
    }
}

#[test]
fn semantic_discovery_finds_conceptual_matches() {
    let rig = TestRig::with_embedder(Arc::new(StubEmbedder));
    rig.write_file(
        "auth/service.py",
        "def authenticate_user(username, password):\n    pass\n",
    );
    rig.write_file(
        "src/auth.ts",
        "export function verifyCredentials(username: string, password: string) {\n}\n",
    );
    rig.write_file("src/dates.py", "def format_date(value):\n    pass\n");
    rig.index();

    let db = rig.db.lock().unwrap();
    let store = rig.vector_store.read().unwrap();
    let embedder: Arc<dyn Embedder> = Arc::new(StubEmbedder);
    let engine = TraceEngine::new(&db, Some(&store), Some(embedder.as_ref()));

    let path = engine
        .trace(&TraceOptions {
            symbol_name: "authenticate_user".to_string(),
            direction: TraceDirection::Downstream,
            enable_semantic: true,
            ..Default::default()
        })
        .unwrap();

    let root = path.root.expect("root present");
    let semantic_child = root
        .children
        .iter()
        .find(|c| c.name == "verifyCredentials")
        .expect("semantic child present");
    assert_eq!(semantic_child.match_type, MatchType::Semantic);
    assert!(semantic_child.confidence.unwrap() >= 0.7);

    // Unrelated symbols stay out.
    assert!(!root.children.iter().any(|c| c.name == "format_date"));
}

#[test]
fn search_scores_bounded_and_sorted_everywhere() {
    let rig = TestRig::new();
    rig.write_file(
        "src/app.py",
        "def get_user():\n    pass\n\ndef get_user_data():\n    pass\n\nclass UserRepo:\n    pass\n",
    );
    rig.index();

    let store = rig.vector_store.read().unwrap();
    let db = rig.db.lock().unwrap();

    for method in [
        SearchMethod::Text,
        SearchMethod::Pattern,
        SearchMethod::Semantic,
        SearchMethod::Hybrid,
        SearchMethod::Auto,
    ] {
        let outcome = SearchRouter::search(
            &store,
            &db,
            rig.embedder.as_ref(),
            None,
            "get_user",
            &SearchOptions {
                method,
                limit: 10,
                ..Default::default()
            },
        );
        for hit in &outcome.hits {
            assert!((0.0..=1.0).contains(&hit.score), "score out of range");
        }
        for window in outcome.hits.windows(2) {
            assert!(window[0].score >= window[1].score, "scores not descending");
        }
    }
}

#[test]
fn search_limit_boundaries() {
    let rig = TestRig::new();
    rig.write_file("src/one.py", "def alpha():\n    pass\n");
    rig.index();

    let store = rig.vector_store.read().unwrap();
    let db = rig.db.lock().unwrap();

    let outcome = SearchRouter::search(
        &store,
        &db,
        rig.embedder.as_ref(),
        None,
        "alpha",
        &SearchOptions {
            limit: 0,
            ..Default::default()
        },
    );
    assert!(outcome.hits.is_empty());

    // Oversized limits clamp rather than error.
    let outcome = SearchRouter::search(
        &store,
        &db,
        rig.embedder.as_ref(),
        None,
        "alpha",
        &SearchOptions {
            limit: 5000,
            ..Default::default()
        },
    );
    assert!(outcome.hits.len() <= 1000);
}

#[test]
fn empty_file_and_comment_only_files_index_cleanly() {
    let rig = TestRig::new();
    rig.write_file("src/empty.py", "");
    rig.write_file("src/comments.py", "# nothing here\n# just notes\n");
    let stats = rig.index();

    assert_eq!(stats.files_indexed, 2);
    let db = rig.db.lock().unwrap();
    assert_eq!(db.file_count().unwrap(), 2);
    // Neither produced symbols.
    let symbols = db.get_symbols_for_file("src/empty.py").unwrap();
    assert!(symbols.is_empty());
}

#[test]
fn dual_store_row_sets_agree_per_file() {
    let rig = TestRig::new();
    rig.write_file(
        "src/app.py",
        "def one():\n    pass\n\ndef two():\n    pass\n",
    );
    rig.index();

    let db = rig.db.lock().unwrap();
    let store = rig.vector_store.read().unwrap();

    let db_symbols = db.get_symbols_for_file("src/app.py").unwrap();
    for symbol in &db_symbols {
        assert!(
            store.get_row(&symbol.id).is_some(),
            "vector row missing for {}",
            symbol.name
        );
    }
    assert_eq!(store.len(), db.symbol_count().unwrap() as usize);
}

#[test]
fn delete_consistency_across_both_stores() {
    let rig = TestRig::new();
    rig.write_file("src/doomed.py", "def going_away():\n    pass\n");
    rig.write_file("src/kept.py", "def staying():\n    pass\n");
    rig.index();

    rig.indexer().remove_file("src/doomed.py").unwrap();

    let db = rig.db.lock().unwrap();
    assert!(db.get_symbol_by_name("going_away", None).unwrap().is_none());
    assert!(db.get_symbol_by_name("staying", None).unwrap().is_some());
    assert!(db.get_symbols_for_file("src/doomed.py").unwrap().is_empty());

    let store = rig.vector_store.read().unwrap();
    assert_eq!(store.len(), db.symbol_count().unwrap() as usize);
}

#[tokio::test(flavor = "multi_thread")]
async fn watcher_hash_gate_end_to_end() {
    use crate::utils::ignore::IgnoreEngine;
    use crate::watcher::FileWatcher;
    use std::time::Duration;

    let rig = TestRig::new();
    rig.write_file("src/utils.py", "def util():\n    pass\n");
    rig.index();

    let hashes = rig.db.lock().unwrap().get_file_hashes().unwrap();
    let ignore = Arc::new(IgnoreEngine::for_workspace(rig.workspace_root()));
    let mut watcher = FileWatcher::new(rig.workspace_root().to_path_buf(), hashes, ignore)
        .with_forced_polling();
    let mut rx = watcher.start().unwrap();

    // Save with no content change: nothing propagates.
    rig.write_file("src/utils.py", "def util():\n    pass\n");
    let quiet = tokio::time::timeout(Duration::from_millis(1500), rx.recv()).await;
    assert!(quiet.is_err(), "unchanged save must not emit an event");

    // Append a new function: exactly one MODIFIED event with a fresh hash.
    rig.write_file("src/utils.py", "def util():\n    pass\n\ndef extra():\n    pass\n");
    let batch = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event within timeout")
        .expect("channel open");
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].0, crate::watcher::FileEvent::Modified);
    assert!(batch[0].2.is_some());

    // Processing the batch lands the new symbol in the index.
    let indexer = rig.indexer();
    tokio::task::block_in_place(|| indexer.apply_watch_batch(batch, &watcher)).unwrap();
    assert!(rig
        .db
        .lock()
        .unwrap()
        .get_symbol_by_name("extra", None)
        .unwrap()
        .is_some());

    watcher.stop();
}

#[test]
fn dead_code_scenario_with_test_exclusions() {
    let rig = TestRig::new();
    rig.write_file("tests/test_a.py", "def test_helper():\n    pass\n");
    rig.write_file(
        "src/main.py",
        "def orphan_func():\n    pass\n\ndef used():\n    pass\n\ndef entry():\n    used()\n",
    );
    rig.index();

    let mut db = rig.db.lock().unwrap();
    let dead = db
        .dead_code_candidates(&crate::database::DeadCodeOptions::default())
        .unwrap();
    let names: Vec<&str> = dead.iter().map(|s| s.name.as_str()).collect();

    assert!(names.contains(&"orphan_func"));
    assert!(!names.contains(&"test_helper"));
    assert!(!names.contains(&"used"));
}
