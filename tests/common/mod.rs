//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures_util::stream::{self, BoxStream};

use subreddit_archiver::archive::Archiver;
use subreddit_archiver::clock::FixedClock;
use subreddit_archiver::config::ArchiveFormat;
use subreddit_archiver::extractor::Extractor;
use subreddit_archiver::ledger::Ledger;
use subreddit_archiver::pipeline::RunController;
use subreddit_archiver::rate_limiter::RequestRateLimiter;
use subreddit_archiver::reddit::{CommentNode, CommentTree, ForumApi, UpstreamComment, UpstreamPost};
use subreddit_archiver::s3::{MemoryStore, ObjectStore};
use subreddit_archiver::serializer::Fields;

/// Instant the fixed test clock reports.
pub fn run_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 11, 2, 8, 0, 0).unwrap()
}

pub fn post(id: &str, source: &str) -> UpstreamPost {
    UpstreamPost {
        id: id.to_string(),
        title: format!("Review {id}"),
        selftext: format!("Body of {id}"),
        score: 10,
        num_comments: 1,
        url: format!("https://www.reddit.com/r/{source}/comments/{id}/"),
        created_utc: Utc.with_ymd_and_hms(2025, 11, 1, 10, 0, 0).unwrap(),
        subreddit: source.to_string(),
        author: Some("reviewer".to_string()),
        extra: Fields::new(),
    }
}

pub fn comment(id: &str, parent_id: &str) -> UpstreamComment {
    UpstreamComment {
        id: id.to_string(),
        body: format!("Comment {id}"),
        score: 1,
        parent_id: parent_id.to_string(),
        created_utc: Utc.with_ymd_and_hms(2025, 11, 1, 11, 0, 0).unwrap(),
        author: None,
        extra: Fields::new(),
    }
}

/// A tree of top-level comments without replies.
pub fn flat_tree(post_id: &str, comment_ids: &[&str]) -> CommentTree {
    CommentTree {
        roots: comment_ids
            .iter()
            .map(|id| CommentNode {
                comment: comment(id, &format!("t3_{post_id}")),
                replies: Vec::new(),
            })
            .collect(),
        unexpanded: 0,
        malformed: 0,
    }
}

enum ListingItem {
    Post(UpstreamPost),
    Fail(String),
}

/// Scripted forum API.
///
/// Listings yield their items in order and stop after a scripted failure.
/// Posts without a scripted comment tree have no comments.
#[derive(Default)]
pub struct FakeForum {
    listings: HashMap<String, Vec<ListingItem>>,
    trees: HashMap<String, CommentTree>,
    failing_submissions: Vec<String>,
    submission_calls: AtomicUsize,
}

impl FakeForum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_posts(mut self, source: &str, ids: &[&str]) -> Self {
        let items = self.listings.entry(source.to_string()).or_default();
        items.extend(ids.iter().map(|id| ListingItem::Post(post(id, source))));
        self
    }

    pub fn with_listing_failure(mut self, source: &str, message: &str) -> Self {
        self.listings
            .entry(source.to_string())
            .or_default()
            .push(ListingItem::Fail(message.to_string()));
        self
    }

    pub fn with_comments(mut self, post_id: &str, comment_ids: &[&str]) -> Self {
        self.trees
            .insert(post_id.to_string(), flat_tree(post_id, comment_ids));
        self
    }

    pub fn with_tree(mut self, post_id: &str, tree: CommentTree) -> Self {
        self.trees.insert(post_id.to_string(), tree);
        self
    }

    pub fn with_submission_failure(mut self, post_id: &str) -> Self {
        self.failing_submissions.push(post_id.to_string());
        self
    }

    pub fn submission_calls(&self) -> usize {
        self.submission_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ForumApi for FakeForum {
    fn listing<'a>(&'a self, source: &'a str, limit: usize) -> BoxStream<'a, Result<UpstreamPost>> {
        let mut items = Vec::new();
        for item in self.listings.get(source).into_iter().flatten().take(limit) {
            match item {
                ListingItem::Post(post) => items.push(Ok(post.clone())),
                ListingItem::Fail(message) => {
                    items.push(Err(anyhow::anyhow!("{message}")));
                    break;
                }
            }
        }
        Box::pin(stream::iter(items))
    }

    async fn submission(&self, post_id: &str) -> Result<CommentTree> {
        self.submission_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_submissions.iter().any(|id| id == post_id) {
            anyhow::bail!("submission {post_id} unavailable");
        }
        Ok(self.trees.get(post_id).cloned().unwrap_or_default())
    }
}

/// Object store that rejects writes under one key prefix.
pub struct FailingStore {
    pub inner: MemoryStore,
    fail_prefix: String,
}

impl FailingStore {
    pub fn rejecting(prefix: &str) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_prefix: prefix.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for FailingStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<()> {
        if key.starts_with(&self.fail_prefix) {
            anyhow::bail!("access denied: {key}");
        }
        self.inner.put(key, data, content_type).await
    }
}

/// Controller over `forum` and `store` with a fixed clock and no throttling.
pub fn controller(
    forum: Arc<FakeForum>,
    store: Arc<dyn ObjectStore>,
    post_limit: usize,
    formats: &[ArchiveFormat],
) -> RunController {
    let clock = Arc::new(FixedClock(run_time()));
    let ledger = Ledger::new(Arc::clone(&store));
    let limiter = RequestRateLimiter::with_interval(std::time::Duration::ZERO);
    let extractor = Extractor::new(forum, ledger.clone(), limiter);
    let archiver = Archiver::new(store, clock.clone());
    RunController::new(extractor, archiver, ledger, clock, post_limit, formats)
}
