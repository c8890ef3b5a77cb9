//! Rate-limited, ledger-filtered extraction of posts and comments.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::StreamExt;
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::ledger::Ledger;
use crate::rate_limiter::RequestRateLimiter;
use crate::records::{CommentRecord, PostRecord};
use crate::reddit::ForumApi;
use crate::serializer::{serialize_fields, FullRecord};

/// Result of one extraction call.
///
/// `records` and `full` are parallel: entry `i` of each describes the same
/// item. When the upstream failed part way, `error` is set and the records
/// gathered before the failure are still present.
#[derive(Debug)]
pub struct Extraction<R> {
    pub records: Vec<R>,
    pub full: Vec<FullRecord>,
    pub error: Option<PipelineError>,
}

impl<R> Default for Extraction<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            full: Vec::new(),
            error: None,
        }
    }
}

impl<R> Extraction<R> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    fn push(&mut self, record: R, full: FullRecord) {
        self.records.push(record);
        self.full.push(full);
    }
}

/// Pulls posts and comments from the forum API.
pub struct Extractor {
    api: Arc<dyn ForumApi>,
    ledger: Ledger,
    limiter: RequestRateLimiter,
}

impl Extractor {
    #[must_use]
    pub fn new(api: Arc<dyn ForumApi>, ledger: Ledger, limiter: RequestRateLimiter) -> Self {
        Self {
            api,
            ledger,
            limiter,
        }
    }

    /// Extract up to `limit` posts from the hot listing of `source`,
    /// skipping any whose id is already in the ledger.
    ///
    /// The ledger is read once, at the start of the call.
    pub async fn extract_posts(&self, source: &str, limit: usize) -> Extraction<PostRecord> {
        let stored = self.ledger.load().await;
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Extraction::default();

        info!(source = %source, limit, "Extracting posts");

        let mut listing = self.api.listing(source, limit);
        while let Some(item) = listing.next().await {
            self.limiter.wait().await;

            let post = match item {
                Ok(post) => post,
                Err(e) => {
                    out.error = Some(PipelineError::Upstream {
                        context: format!("listing r/{source}"),
                        source: e,
                    });
                    break;
                }
            };

            if stored.contains(&post.id) {
                info!(source = %source, post_id = %post.id, "Skipping duplicate post");
                continue;
            }
            // Pages can overlap when the listing shifts between requests
            if !seen.insert(post.id.clone()) {
                debug!(source = %source, post_id = %post.id, "Post repeated within listing");
                continue;
            }

            out.push(PostRecord::from(&post), serialize_fields(&post.fields()));
        }

        info!(
            source = %source,
            new_posts = out.len(),
            interrupted = out.error.is_some(),
            "Post extraction finished"
        );
        out
    }

    /// Extract every loaded comment of a post.
    ///
    /// A failure to fetch the tree yields an empty extraction carrying the
    /// error; it never affects other posts.
    pub async fn extract_comments(&self, post_id: &str) -> Extraction<CommentRecord> {
        let mut out = Extraction::default();

        self.limiter.wait().await;
        let tree = match self.api.submission(post_id).await {
            Ok(tree) => tree,
            Err(e) => {
                out.error = Some(PipelineError::Upstream {
                    context: format!("comments of post {post_id}"),
                    source: e,
                });
                return out;
            }
        };

        for comment in tree.into_flat() {
            self.limiter.wait().await;

            let mut fields = comment.fields();
            fields.insert("post_id".to_string(), post_id.into());
            out.push(CommentRecord::new(&comment, post_id), serialize_fields(&fields));
        }

        debug!(post_id = %post_id, comments = out.len(), "Comment extraction finished");
        out
    }
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor")
            .field("ledger", &self.ledger)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}
