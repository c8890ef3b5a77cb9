//! Slim, fixed-schema records used for tabular and columnar archives.

use serde::Serialize;

use crate::reddit::{UpstreamComment, UpstreamPost};
use crate::serializer::format_timestamp;

/// Slim projection of a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostRecord {
    pub id: String,
    pub title: String,
    pub selftext: String,
    pub score: i64,
    pub num_comments: i64,
    pub url: String,
    pub created_utc: String,
    pub sub_reddit_name: String,
    pub author: Option<String>,
}

impl From<&UpstreamPost> for PostRecord {
    fn from(post: &UpstreamPost) -> Self {
        Self {
            id: post.id.clone(),
            title: post.title.clone(),
            selftext: post.selftext.clone(),
            score: post.score,
            num_comments: post.num_comments,
            url: post.url.clone(),
            created_utc: format_timestamp(&post.created_utc),
            sub_reddit_name: post.subreddit.clone(),
            author: post.author.clone(),
        }
    }
}

/// Slim projection of a comment, stamped with the post it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentRecord {
    pub id: String,
    pub body: String,
    pub score: i64,
    pub parent_id: String,
    pub created_utc: String,
    pub author: Option<String>,
    pub post_id: String,
}

impl CommentRecord {
    #[must_use]
    pub fn new(comment: &UpstreamComment, post_id: &str) -> Self {
        Self {
            id: comment.id.clone(),
            body: comment.body.clone(),
            score: comment.score,
            parent_id: comment.parent_id.clone(),
            created_utc: format_timestamp(&comment.created_utc),
            author: comment.author.clone(),
            post_id: post_id.to_string(),
        }
    }
}
