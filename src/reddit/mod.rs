//! The upstream forum API as seen by the extractor.

use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::BoxStream;

mod client;
pub mod models;

pub use client::RedditClient;
pub use models::{CommentNode, CommentTree, UpstreamComment, UpstreamPost};

/// Capability to read subreddit listings and comment trees.
#[async_trait]
pub trait ForumApi: Send + Sync {
    /// Stream up to `limit` posts from the hot listing of `source`.
    ///
    /// Pages are fetched lazily, so an error can surface after some posts
    /// have already been yielded. The stream ends after the first error.
    fn listing<'a>(&'a self, source: &'a str, limit: usize) -> BoxStream<'a, Result<UpstreamPost>>;

    /// Load the comment tree of a submission.
    async fn submission(&self, post_id: &str) -> Result<CommentTree>;
}
