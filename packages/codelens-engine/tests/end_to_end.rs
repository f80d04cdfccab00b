//! End-to-end scenarios over a real temp workspace: ingest with the
//! deterministic hashing runtime, query, mutate, corrupt, recover.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use codelens_core::changes::FileSelector;
use codelens_core::{ErrorKind, FragmentKind, QueryOptions};
use codelens_engine::{CacheTier, Engine, HashingRuntime};
use pretty_assertions::assert_eq;

const CALC_TAX: &str = "function calcTax(income, rate) {\n    return income*rate;\n}\n";

fn engine_for(root: &Path) -> Engine {
    let runtime = Arc::new(HashingRuntime::new(256));
    Engine::open(root, runtime).unwrap()
}

async fn ingest_all(engine: &Engine) {
    let report = engine.ingest(&FileSelector::ForceAll).await.unwrap();
    assert!(report.skipped.is_empty(), "skipped: {:?}", report.skipped);
}

fn commit_all(dir: &Path, message: &str) {
    let repo = match git2::Repository::open(dir) {
        Ok(repo) => repo,
        Err(_) => git2::Repository::init(dir).unwrap(),
    };
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = git2::Signature::now("tester", "tester@example.com").unwrap();
    let parent = repo
        .head()
        .ok()
        .and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn scenario_single_function_retrieval() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("tax.ts"), CALC_TAX).unwrap();

    let engine = engine_for(dir.path());
    ingest_all(&engine).await;

    let response = engine
        .query("tax calculation", &QueryOptions::default().with_k(1))
        .await
        .unwrap();

    assert_eq!(response.records.len(), 1);
    let record = &response.records[0];
    assert_eq!(record.name.as_deref(), Some("calcTax"));
    assert_eq!(record.kind, FragmentKind::Function);
    assert_eq!(record.complexity, 1);
    assert!(record.dependencies.is_empty());
    assert!(record.signature.contains("income"));
    assert!(record.signature.contains("rate"));
    assert!(record.snippet.contains("income*rate"));
}

#[tokio::test(flavor = "multi_thread")]
async fn scenario_identical_copies_tie_break() {
    let dir = tempfile::TempDir::new().unwrap();
    for i in 0..10 {
        std::fs::write(dir.path().join(format!("copy{i}.ts")), CALC_TAX).unwrap();
    }

    let engine = engine_for(dir.path());
    ingest_all(&engine).await;

    let response = engine
        .query("tax calculation", &QueryOptions::default().with_k(5))
        .await
        .unwrap();

    assert_eq!(response.records.len(), 5);
    let paths: Vec<&str> = response
        .records
        .iter()
        .map(|r| r.file_path.as_str())
        .collect();
    assert_eq!(
        paths,
        vec!["copy0.ts", "copy1.ts", "copy2.ts", "copy3.ts", "copy4.ts"]
    );
    for record in &response.records {
        assert_eq!(record.name.as_deref(), Some("calcTax"));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn scenario_rename_changes_fragment_identity() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("tax.ts"), CALC_TAX).unwrap();
    commit_all(dir.path(), "initial");

    let engine = engine_for(dir.path());
    ingest_all(&engine).await;

    let before = engine.store().stats().unwrap();
    let old_id = engine
        .query("tax calculation", &QueryOptions::default().with_k(1))
        .await
        .unwrap()
        .records[0]
        .fragment_id
        .clone();

    // rename the function; same span, new name
    std::fs::write(
        dir.path().join("tax.ts"),
        CALC_TAX.replace("calcTax", "computeTax"),
    )
    .unwrap();

    let report = engine
        .ingest(&FileSelector::ChangedSinceHead)
        .await
        .unwrap();
    assert_eq!(report.modified, 1);

    let after = engine.store().stats().unwrap();
    assert_eq!(before.fragments, after.fragments);
    assert_eq!(before.embeddings, after.embeddings);

    // the stale identity is gone from every table and the index
    assert!(engine.store().get_fragment(&old_id).unwrap().is_none());
    assert!(engine.store().get_annotation(&old_id).unwrap().is_none());
    assert!(engine
        .store()
        .fetch_hydration(&[old_id.clone()])
        .unwrap()
        .is_empty());

    let response = engine
        .query("tax computation", &QueryOptions::default().with_k(5))
        .await
        .unwrap();
    assert!(response
        .records
        .iter()
        .all(|r| r.fragment_id != old_id));
    assert!(response
        .records
        .iter()
        .any(|r| r.name.as_deref() == Some("computeTax")));
}

#[tokio::test(flavor = "multi_thread")]
async fn scenario_repeat_query_hits_l1() {
    let dir = tempfile::TempDir::new().unwrap();
    // enough distinct files that the uncached path pays for the lazy
    // graph build, the oversampled search, and the hydration join
    for i in 0..40 {
        std::fs::write(
            dir.path().join(format!("mod{i:02}.ts")),
            CALC_TAX.replace("calcTax", &format!("calcTax{i:02}")),
        )
        .unwrap();
    }

    let engine = engine_for(dir.path());
    ingest_all(&engine).await;

    let options = QueryOptions::default().with_k(3);
    let first = engine.query("tax calculation", &options).await.unwrap();
    assert!(!first.cache_hit());

    let second = engine.query("tax calculation", &options).await.unwrap();
    assert_eq!(second.cache_tier, Some(CacheTier::L1));
    assert_eq!(second.records, first.records);
    // the memory hit must be strictly faster than the full computation
    assert!(
        second.duration_ms < first.duration_ms,
        "L1 hit took {}ms, uncached query took {}ms",
        second.duration_ms,
        first.duration_ms
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn scenario_file_rename_invalidates_cache() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("tax.ts"), CALC_TAX).unwrap();

    let engine = engine_for(dir.path());
    ingest_all(&engine).await;

    let options = QueryOptions::default().with_k(1);
    let cached = engine.query("tax calculation", &options).await.unwrap();
    assert_eq!(cached.records[0].file_path, "tax.ts");
    assert!(engine
        .query("tax calculation", &options)
        .await
        .unwrap()
        .cache_hit());

    // move the file; index version bumps, cached entry goes stale
    std::fs::rename(dir.path().join("tax.ts"), dir.path().join("levy.ts")).unwrap();
    ingest_all(&engine).await;

    let fresh = engine.query("tax calculation", &options).await.unwrap();
    assert!(!fresh.cache_hit());
    assert_eq!(fresh.records[0].file_path, "levy.ts");
}

#[tokio::test(flavor = "multi_thread")]
async fn scenario_corrupt_index_rebuilds_in_background() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("tax.ts"), CALC_TAX).unwrap();

    let options = QueryOptions::default().with_k(1);
    let before;
    {
        let engine = engine_for(dir.path());
        ingest_all(&engine).await;
        before = engine.query("tax calculation", &options).await.unwrap();
    }

    // truncate the serialized graph
    let bin = dir.path().join(".codelens/hnsw.bin");
    let bytes = std::fs::read(&bin).unwrap();
    std::fs::write(&bin, &bytes[..bytes.len() / 2]).unwrap();

    let engine = engine_for(dir.path());
    // the durable cache tiers survived the restart and would happily
    // serve the old (version-consistent) result; drop them so the
    // corruption path is actually exercised
    engine.clear_cache(None).unwrap();

    let err = engine
        .query("tax calculation", &options)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::IndexRebuilding);

    // the background rebuild finishes from embeddings.db; retry succeeds
    let mut recovered = None;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        match engine.query("tax calculation", &options).await {
            Ok(response) => {
                recovered = Some(response);
                break;
            }
            Err(e) if e.kind == ErrorKind::IndexRebuilding => continue,
            Err(other) => panic!("unexpected error during rebuild: {other}"),
        }
    }
    let recovered = recovered.expect("rebuild never completed");
    assert_eq!(recovered.records, before.records);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_workspace_returns_empty_results() {
    let dir = tempfile::TempDir::new().unwrap();
    let engine = engine_for(dir.path());

    let response = engine
        .query("anything at all", &QueryOptions::default())
        .await
        .unwrap();
    assert!(response.records.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn zero_length_query_rejected() {
    let dir = tempfile::TempDir::new().unwrap();
    let engine = engine_for(dir.path());

    for query in ["", "   ", "\n\t"] {
        let err = engine
            .query(query, &QueryOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConfigurationInvalid);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn comment_only_file_yields_no_rows() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("notes.py"), "# nothing here\n# at all\n").unwrap();

    let engine = engine_for(dir.path());
    ingest_all(&engine).await;

    let stats = engine.store().stats().unwrap();
    assert_eq!(stats.fragments, 0);
    assert_eq!(stats.embeddings, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn self_retrieval_by_summary() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("geometry.ts"),
        "function circleArea(radius) {\n    return 3.14 * radius * radius;\n}\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("net.ts"),
        "function openSocket(host, port) {\n    return connect(host, port);\n}\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("tax.ts"), CALC_TAX).unwrap();

    let engine = engine_for(dir.path());
    ingest_all(&engine).await;

    // query with the fragment's own summary text: top-1 self-retrieval
    let response = engine
        .query(
            "Function circleArea with 1 parameter",
            &QueryOptions::default().with_k(1),
        )
        .await
        .unwrap();
    assert_eq!(response.records[0].name.as_deref(), Some("circleArea"));
    assert!(
        response.records[0].score >= 0.4,
        "self-retrieval score too low: {}",
        response.records[0].score
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn filters_limit_results() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/tax.ts"), CALC_TAX).unwrap();
    std::fs::write(dir.path().join("other.ts"), CALC_TAX).unwrap();

    let engine = engine_for(dir.path());
    ingest_all(&engine).await;

    let mut options = QueryOptions::default().with_k(10);
    options.file_filter = Some("src/".to_string());
    let response = engine.query("tax calculation", &options).await.unwrap();
    assert!(!response.records.is_empty());
    assert!(response
        .records
        .iter()
        .all(|r| r.file_path.starts_with("src/")));

    let mut options = QueryOptions::default().with_k(10);
    options.kind_filter = Some(FragmentKind::Class);
    let response = engine.query("tax calculation", &options).await.unwrap();
    assert!(response.records.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn warm_and_analyze_cache() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("tax.ts"), CALC_TAX).unwrap();

    let engine = engine_for(dir.path());
    ingest_all(&engine).await;

    let options = QueryOptions::default().with_k(2);
    for _ in 0..3 {
        engine.query("tax calculation", &options).await.unwrap();
    }
    engine.query("socket pool", &options).await.unwrap();

    engine.clear_cache(None).unwrap();
    let warmed = engine.warm_cache(2).await.unwrap();
    assert_eq!(warmed, 2);

    // warmed entries now serve from memory
    let response = engine.query("tax calculation", &options).await.unwrap();
    assert_eq!(response.cache_tier, Some(CacheTier::L1));

    let analytics = engine.analyze_cache().unwrap();
    assert_eq!(analytics.top_queries[0].query_text, "tax calculation");
    assert!(analytics.l1.hits >= 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn watcher_drives_incremental_ingestion() {
    let dir = tempfile::TempDir::new().unwrap();
    let engine = engine_for(dir.path());
    ingest_all(&engine).await;
    assert_eq!(engine.store().stats().unwrap().fragments, 0);

    let mut watcher = engine.watcher();
    watcher.start().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    std::fs::write(dir.path().join("tax.ts"), CALC_TAX).unwrap();

    let mut indexed = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if engine.store().stats().unwrap().fragments > 0 {
            indexed = true;
            break;
        }
    }
    watcher.stop();
    assert!(indexed, "watcher never ingested the new file");

    let response = engine
        .query("tax calculation", &QueryOptions::default().with_k(1))
        .await
        .unwrap();
    assert_eq!(response.records[0].name.as_deref(), Some("calcTax"));
}
