//! Integration tests for a full extraction run.

mod common;

use std::sync::Arc;

use serde_json::Value;

use common::{controller, FailingStore, FakeForum};
use subreddit_archiver::config::ArchiveFormat;
use subreddit_archiver::constants::LEDGER_KEY;
use subreddit_archiver::error::PipelineError;
use subreddit_archiver::reddit::{CommentNode, CommentTree};
use subreddit_archiver::s3::{MemoryStore, ObjectStore};

const POSTS_KEY: &str = "reddit-data-json/posts/year=2025/month=11/day=2/subreddit=ProductReviews/reddit_product_reviews_posts_2025-11-02-08-00-00.json";

fn comments_key(post_id: &str) -> String {
    format!(
        "reddit-data-json/comments/year=2025/month=11/day=2/subreddit=ProductReviews/reddit_product_review_comments_{post_id}_2025-11-02-08-00-00.json"
    )
}

async fn ledger_ids(store: &dyn ObjectStore) -> Vec<String> {
    let bytes = store.get(LEDGER_KEY).await.unwrap().expect("ledger written");
    serde_json::from_slice(&bytes).unwrap()
}

async fn json_array(store: &MemoryStore, key: &str) -> Vec<Value> {
    let object = store.object(key).await.expect("object written");
    serde_json::from_slice(&object.data).unwrap()
}

fn sources(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}

#[tokio::test]
async fn test_first_run_archives_posts_comments_and_ledger() {
    let forum = Arc::new(
        FakeForum::new()
            .with_posts("ProductReviews", &["p1", "p2", "p3"])
            .with_comments("p1", &["c1", "c2"]),
    );
    let store = Arc::new(MemoryStore::new());

    let summary = controller(forum.clone(), store.clone(), 10, &[ArchiveFormat::Json])
        .run(&sources(&["ProductReviews"]))
        .await
        .unwrap();

    assert_eq!(summary.total_posts(), 3);
    assert_eq!(summary.total_comments(), 2);
    assert_eq!(forum.submission_calls(), 3);

    let posts = json_array(&store, POSTS_KEY).await;
    let ids: Vec<&str> = posts.iter().map(|p| p["id"].as_str().unwrap()).collect();
    assert_eq!(ids, ["p1", "p2", "p3"]);
    assert_eq!(posts[0]["created_utc"], "2025-11-01 10:00:00");
    assert_eq!(posts[0]["subreddit"], "ProductReviews");
    assert_eq!(posts[0]["author"], "reviewer");

    let comments = json_array(&store, &comments_key("p1")).await;
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0]["post_id"], "p1");
    assert_eq!(comments[0]["parent_id"], "t3_p1");
    assert_eq!(comments[0]["author"], Value::Null);

    // Posts without comments produce no comment archive
    assert!(store.object(&comments_key("p2")).await.is_none());
    assert!(store.object(&comments_key("p3")).await.is_none());

    assert_eq!(ledger_ids(store.as_ref()).await, ["p1", "p2", "p3"]);
}

#[tokio::test]
async fn test_second_run_only_archives_new_posts() {
    let store = Arc::new(MemoryStore::new());

    let first = Arc::new(FakeForum::new().with_posts("ProductReviews", &["p1", "p2", "p3"]));
    controller(first, store.clone(), 10, &[ArchiveFormat::Json])
        .run(&sources(&["ProductReviews"]))
        .await
        .unwrap();

    let second = Arc::new(
        FakeForum::new()
            .with_posts("ProductReviews", &["p4", "p1", "p2", "p3"])
            .with_comments("p4", &["c9"]),
    );
    let summary = controller(second.clone(), store.clone(), 10, &[ArchiveFormat::Json])
        .run(&sources(&["ProductReviews"]))
        .await
        .unwrap();

    assert_eq!(summary.total_posts(), 1);
    assert_eq!(second.submission_calls(), 1);

    // Same fixed clock, so the second run overwrites the posts blob
    let posts = json_array(&store, POSTS_KEY).await;
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["id"], "p4");

    assert_eq!(ledger_ids(store.as_ref()).await, ["p1", "p2", "p3", "p4"]);
}

#[tokio::test]
async fn test_rerun_with_nothing_new_writes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let forum = Arc::new(FakeForum::new().with_posts("ProductReviews", &["p1", "p2"]));

    controller(forum.clone(), store.clone(), 10, &[ArchiveFormat::Json])
        .run(&sources(&["ProductReviews"]))
        .await
        .unwrap();
    let keys_after_first = store.keys().await;
    let ledger_after_first = store.object(LEDGER_KEY).await.unwrap();

    let summary = controller(forum.clone(), store.clone(), 10, &[ArchiveFormat::Json])
        .run(&sources(&["ProductReviews"]))
        .await
        .unwrap();

    assert_eq!(summary.total_posts(), 0);
    assert!(summary.sources[0].keys.is_empty());
    assert_eq!(store.keys().await, keys_after_first);
    assert_eq!(store.object(LEDGER_KEY).await.unwrap(), ledger_after_first);
    // Only the first run fetched comment trees
    assert_eq!(forum.submission_calls(), 2);
}

#[tokio::test]
async fn test_posts_upload_failure_leaves_ledger_untouched() {
    let forum = Arc::new(
        FakeForum::new()
            .with_posts("ProductReviews", &["p1", "p2"])
            .with_comments("p1", &["c1"]),
    );
    let store = Arc::new(FailingStore::rejecting("reddit-data-json/posts/"));

    let result = controller(forum.clone(), store.clone(), 10, &[ArchiveFormat::Json])
        .run(&sources(&["ProductReviews"]))
        .await;

    match result {
        Err(PipelineError::Archive { key, .. }) => assert_eq!(key, POSTS_KEY),
        other => panic!("expected archive error, got {other:?}"),
    }
    assert!(store.inner.object(LEDGER_KEY).await.is_none());
    assert_eq!(forum.submission_calls(), 0);
    assert!(store.inner.keys().await.is_empty());
}

#[tokio::test]
async fn test_comment_fetch_failure_is_isolated_to_its_post() {
    let forum = Arc::new(
        FakeForum::new()
            .with_posts("ProductReviews", &["p1", "p2", "p3"])
            .with_submission_failure("p2")
            .with_comments("p1", &["c1"])
            .with_comments("p3", &["c3"]),
    );
    let store = Arc::new(MemoryStore::new());

    let summary = controller(forum, store.clone(), 10, &[ArchiveFormat::Json])
        .run(&sources(&["ProductReviews"]))
        .await
        .unwrap();

    assert_eq!(summary.sources[0].failed_comment_posts, 1);
    assert!(store.object(&comments_key("p1")).await.is_some());
    assert!(store.object(&comments_key("p2")).await.is_none());
    assert!(store.object(&comments_key("p3")).await.is_some());
    assert_eq!(ledger_ids(store.as_ref()).await, ["p1", "p2", "p3"]);
}

#[tokio::test]
async fn test_listing_failure_keeps_partial_results() {
    let forum = Arc::new(
        FakeForum::new()
            .with_posts("ProductReviews", &["p1", "p2"])
            .with_listing_failure("ProductReviews", "connection reset")
            .with_posts("ProductReviews", &["p3"]),
    );
    let store = Arc::new(MemoryStore::new());

    let summary = controller(forum, store.clone(), 10, &[ArchiveFormat::Json])
        .run(&sources(&["ProductReviews"]))
        .await
        .unwrap();

    assert!(summary.sources[0].listing_interrupted);
    assert_eq!(summary.total_posts(), 2);
    assert_eq!(json_array(&store, POSTS_KEY).await.len(), 2);
    assert_eq!(ledger_ids(store.as_ref()).await, ["p1", "p2"]);
}

#[tokio::test]
async fn test_post_limit_caps_listing() {
    let forum = Arc::new(FakeForum::new().with_posts("gadgets", &["a", "b", "c", "d"]));
    let store = Arc::new(MemoryStore::new());

    let summary = controller(forum, store.clone(), 2, &[ArchiveFormat::Json])
        .run(&sources(&["gadgets"]))
        .await
        .unwrap();

    assert_eq!(summary.total_posts(), 2);
    assert_eq!(ledger_ids(store.as_ref()).await, ["a", "b"]);
}

#[tokio::test]
async fn test_ledger_is_shared_across_sources() {
    let forum = Arc::new(
        FakeForum::new()
            .with_posts("apple", &["x1", "x2"])
            .with_posts("gadgets", &["x2", "x3"]),
    );
    let store = Arc::new(MemoryStore::new());

    let summary = controller(forum, store.clone(), 10, &[ArchiveFormat::Json])
        .run(&sources(&["apple", "gadgets"]))
        .await
        .unwrap();

    assert_eq!(summary.sources[0].new_posts, 2);
    assert_eq!(summary.sources[1].new_posts, 1);
    assert_eq!(ledger_ids(store.as_ref()).await, ["x1", "x2", "x3"]);
}

#[tokio::test]
async fn test_empty_source_is_skipped() {
    let forum = Arc::new(FakeForum::new().with_posts("apple", &["a1"]));
    let store = Arc::new(MemoryStore::new());

    let summary = controller(forum, store.clone(), 10, &[ArchiveFormat::Json])
        .run(&sources(&["android", "apple"]))
        .await
        .unwrap();

    assert_eq!(summary.sources.len(), 2);
    assert!(summary.sources[0].keys.is_empty());
    assert_eq!(summary.sources[1].new_posts, 1);
}

#[tokio::test]
async fn test_all_formats_written_with_their_layouts() {
    let forum = Arc::new(
        FakeForum::new()
            .with_posts("ProductReviews", &["p1"])
            .with_comments("p1", &["c1"]),
    );
    let store = Arc::new(MemoryStore::new());

    let summary = controller(
        forum,
        store.clone(),
        10,
        &[ArchiveFormat::Json, ArchiveFormat::Csv, ArchiveFormat::Parquet],
    )
    .run(&sources(&["ProductReviews"]))
    .await
    .unwrap();

    let keys: Vec<&str> = summary.keys().collect();
    assert_eq!(
        keys,
        [
            POSTS_KEY,
            "reddit-data-csv/year=2025/month=11/subreddit=ProductReviews/reddit_product_reviews_posts_2025-11-02-08-00-00.csv",
            "reddit-data-parquet/posts/year=2025/month=11/subreddit=ProductReviews/reddit_product_reviews_posts_2025-11-02-08-00-00.parquet",
            comments_key("p1").as_str(),
            "reddit-data-csv/year=2025/month=11/subreddit=ProductReviews/reddit_product_review_comments_p1_2025-11-02-08-00-00.csv",
            "reddit-data-parquet/comments/year=2025/month=11/subreddit=ProductReviews/reddit_product_review_comments_p1_2025-11-02-08-00-00.parquet",
        ]
    );

    let csv = store
        .object("reddit-data-csv/year=2025/month=11/subreddit=ProductReviews/reddit_product_review_comments_p1_2025-11-02-08-00-00.csv")
        .await
        .unwrap();
    let text = String::from_utf8(csv.data).unwrap();
    assert!(text.starts_with("id,body,score,parent_id,created_utc,author,post_id\n"));
    assert!(text.contains("c1,Comment c1,1,t3_p1,2025-11-01 11:00:00,,p1"));
}

#[tokio::test]
async fn test_tabular_failure_still_attempts_other_formats() {
    let forum = Arc::new(FakeForum::new().with_posts("ProductReviews", &["p1"]));
    let store = Arc::new(FailingStore::rejecting("reddit-data-csv/"));

    let result = controller(
        forum,
        store.clone(),
        10,
        &[ArchiveFormat::Csv, ArchiveFormat::Json, ArchiveFormat::Parquet],
    )
    .run(&sources(&["ProductReviews"]))
    .await;

    assert!(matches!(result, Err(PipelineError::Archive { .. })));
    let keys = store.inner.keys().await;
    assert!(keys.iter().any(|k| k == POSTS_KEY));
    assert!(keys.iter().any(|k| k.starts_with("reddit-data-parquet/posts/")));
    // The batch was not fully archived, so its ids are not recorded
    assert!(!keys.iter().any(|k| k == LEDGER_KEY));
}

#[tokio::test]
async fn test_nested_replies_are_flattened_breadth_first() {
    let tree = CommentTree {
        roots: vec![
            CommentNode {
                comment: common::comment("a", "t3_p1"),
                replies: vec![CommentNode {
                    comment: common::comment("a1", "t1_a"),
                    replies: Vec::new(),
                }],
            },
            CommentNode {
                comment: common::comment("b", "t3_p1"),
                replies: Vec::new(),
            },
        ],
        unexpanded: 1,
        malformed: 0,
    };
    let forum = Arc::new(
        FakeForum::new()
            .with_posts("ProductReviews", &["p1"])
            .with_tree("p1", tree),
    );
    let store = Arc::new(MemoryStore::new());

    controller(forum, store.clone(), 10, &[ArchiveFormat::Json])
        .run(&sources(&["ProductReviews"]))
        .await
        .unwrap();

    let comments = json_array(&store, &comments_key("p1")).await;
    let ids: Vec<&str> = comments.iter().map(|c| c["id"].as_str().unwrap()).collect();
    assert_eq!(ids, ["a", "b", "a1"]);
}

#[tokio::test]
async fn test_comments_upload_failure_halts_run_after_ledger_update() {
    let forum = Arc::new(
        FakeForum::new()
            .with_posts("ProductReviews", &["p1", "p2"])
            .with_comments("p1", &["c1"])
            .with_comments("p2", &["c2"])
            .with_posts("gadgets", &["g1"]),
    );
    let store = Arc::new(FailingStore::rejecting("reddit-data-json/comments/"));

    let result = controller(forum.clone(), store.clone(), 10, &[ArchiveFormat::Json])
        .run(&sources(&["ProductReviews", "gadgets"]))
        .await;

    match result {
        Err(PipelineError::Archive { key, .. }) => assert_eq!(key, comments_key("p1")),
        other => panic!("expected archive error, got {other:?}"),
    }
    // Posts were archived and recorded before the comments upload failed
    assert!(store.inner.object(POSTS_KEY).await.is_some());
    assert_eq!(ledger_ids(store.as_ref()).await, ["p1", "p2"]);
    // The run stopped at the first failed upload
    assert_eq!(forum.submission_calls(), 1);
}

#[test]
fn test_controller_debug_output() {
    let forum = Arc::new(FakeForum::new());
    let store = Arc::new(MemoryStore::new());

    let debug = format!(
        "{:?}",
        controller(forum, store, 10, &[ArchiveFormat::Csv, ArchiveFormat::Json])
    );

    assert!(debug.starts_with("RunController"));
    assert!(debug.contains("FixedClock"));
    assert!(debug.contains("formats: [Json, Csv]"));
}
