//! Upstream post and comment objects.
//!
//! Only the fields the pipeline consumes are typed. Everything else the API
//! returns is kept in `extra` and reaches the full record through the
//! serializer.

use std::collections::VecDeque;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::warn;

use crate::serializer::{FieldValue, Fields};

/// Author name Reddit reports for removed accounts.
const DELETED_AUTHOR: &str = "[deleted]";

/// A submission as returned by a subreddit listing.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamPost {
    pub id: String,
    pub title: String,
    pub selftext: String,
    pub score: i64,
    pub num_comments: i64,
    pub url: String,
    pub created_utc: DateTime<Utc>,
    pub subreddit: String,
    pub author: Option<String>,
    pub extra: Fields,
}

impl UpstreamPost {
    /// All fields of the post, typed fields taking precedence over extras.
    #[must_use]
    pub fn fields(&self) -> Fields {
        let mut fields = self.extra.clone();
        fields.insert("id".to_string(), self.id.clone().into());
        fields.insert("title".to_string(), self.title.clone().into());
        fields.insert("selftext".to_string(), self.selftext.clone().into());
        fields.insert("score".to_string(), self.score.into());
        fields.insert("num_comments".to_string(), self.num_comments.into());
        fields.insert("url".to_string(), self.url.clone().into());
        fields.insert("created_utc".to_string(), self.created_utc.into());
        fields.insert(
            "subreddit".to_string(),
            FieldValue::Named(Some(self.subreddit.clone())),
        );
        fields.insert("author".to_string(), FieldValue::Named(self.author.clone()));
        fields
    }

    /// Build a post from the `data` object of a `t3` listing child.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is not a JSON object or has no id.
    pub fn from_json(data: &Value) -> Result<Self> {
        let obj = data.as_object().context("post data is not an object")?;
        let id = required_str(data, "id")?;
        Ok(Self {
            title: str_field(data, "title"),
            selftext: str_field(data, "selftext"),
            score: int_field(data, "score"),
            num_comments: int_field(data, "num_comments"),
            url: str_field(data, "url"),
            created_utc: time_field(data, "created_utc"),
            subreddit: str_field(data, "subreddit"),
            author: author_field(data),
            extra: fields_from_object(obj, &[]),
            id,
        })
    }
}

/// A single comment from a submission's comment tree.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamComment {
    pub id: String,
    pub body: String,
    pub score: i64,
    /// Fullname of the parent: `t3_<post>` for top-level comments,
    /// `t1_<comment>` for replies.
    pub parent_id: String,
    pub created_utc: DateTime<Utc>,
    pub author: Option<String>,
    pub extra: Fields,
}

impl UpstreamComment {
    /// All fields of the comment, typed fields taking precedence over extras.
    #[must_use]
    pub fn fields(&self) -> Fields {
        let mut fields = self.extra.clone();
        fields.insert("id".to_string(), self.id.clone().into());
        fields.insert("body".to_string(), self.body.clone().into());
        fields.insert("score".to_string(), self.score.into());
        fields.insert("parent_id".to_string(), self.parent_id.clone().into());
        fields.insert("created_utc".to_string(), self.created_utc.into());
        fields.insert("author".to_string(), FieldValue::Named(self.author.clone()));
        fields
    }

    /// Build a comment from the `data` object of a `t1` child.
    ///
    /// The nested `replies` listing is not part of the comment itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is not a JSON object or has no id.
    pub fn from_json(data: &Value) -> Result<Self> {
        let obj = data.as_object().context("comment data is not an object")?;
        let id = required_str(data, "id")?;
        Ok(Self {
            body: str_field(data, "body"),
            score: int_field(data, "score"),
            parent_id: str_field(data, "parent_id"),
            created_utc: time_field(data, "created_utc"),
            author: author_field(data),
            extra: fields_from_object(obj, &["replies"]),
            id,
        })
    }
}

/// A comment and its direct replies.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentNode {
    pub comment: UpstreamComment,
    pub replies: Vec<CommentNode>,
}

/// The loaded comment forest of one submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentTree {
    pub roots: Vec<CommentNode>,
    /// Number of "load more comments" stubs that were not expanded.
    pub unexpanded: usize,
    /// Number of comments dropped because they could not be decoded.
    pub malformed: usize,
}

impl CommentTree {
    /// Flatten the forest breadth-first: all top-level comments, then their
    /// replies level by level.
    #[must_use]
    pub fn into_flat(self) -> Vec<UpstreamComment> {
        let mut out = Vec::new();
        let mut queue: VecDeque<CommentNode> = self.roots.into();
        while let Some(node) = queue.pop_front() {
            queue.extend(node.replies);
            out.push(node.comment);
        }
        out
    }

    /// Build a tree from the comment listing of a `/comments/{id}` response.
    ///
    /// A `t1` child that cannot be decoded is skipped together with its
    /// replies and counted in `malformed`; its siblings are kept.
    #[must_use]
    pub fn from_listing(listing: &Value) -> Self {
        let mut tree = Self::default();
        tree.roots = tree.nodes_from_listing(listing);
        tree
    }

    fn nodes_from_listing(&mut self, listing: &Value) -> Vec<CommentNode> {
        let Some(children) = listing
            .pointer("/data/children")
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };

        let mut nodes = Vec::with_capacity(children.len());
        for child in children {
            match child.get("kind").and_then(Value::as_str) {
                Some("t1") => {
                    let decoded = child
                        .get("data")
                        .context("comment child has no data")
                        .and_then(|data| UpstreamComment::from_json(data).map(|comment| (data, comment)));
                    let (data, comment) = match decoded {
                        Ok(decoded) => decoded,
                        Err(e) => {
                            warn!("Skipping malformed comment: {e:#}");
                            self.malformed += 1;
                            continue;
                        }
                    };
                    // An empty string means no replies
                    let replies = match data.get("replies") {
                        Some(replies @ Value::Object(_)) => self.nodes_from_listing(replies),
                        _ => Vec::new(),
                    };
                    nodes.push(CommentNode { comment, replies });
                }
                Some("more") => self.unexpanded += 1,
                _ => {}
            }
        }
        nodes
    }
}

fn required_str(data: &Value, key: &str) -> Result<String> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .with_context(|| format!("missing `{key}`"))
}

fn str_field(data: &Value, key: &str) -> String {
    data.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn int_field(data: &Value, key: &str) -> i64 {
    data.get(key)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().and_then(float_to_i64)))
        .unwrap_or_default()
}

fn time_field(data: &Value, key: &str) -> DateTime<Utc> {
    data.get(key)
        .and_then(Value::as_f64)
        .and_then(timestamp_from_epoch)
        .unwrap_or_default()
}

fn author_field(data: &Value) -> Option<String> {
    data.get("author")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty() && *name != DELETED_AUTHOR)
        .map(ToString::to_string)
}

/// Whole part of `value`, if it is finite and fits in an `i64`.
#[allow(clippy::cast_possible_truncation)]
fn float_to_i64(value: f64) -> Option<i64> {
    // i64::MAX is not exactly representable; 2^63 is the first value past it
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    let whole = value.trunc();
    (whole.is_finite() && (-LIMIT..LIMIT).contains(&whole)).then_some(whole as i64)
}

fn timestamp_from_epoch(secs: f64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(float_to_i64(secs)?, 0).single()
}

/// Lift a raw JSON object into upstream fields.
///
/// Numeric `*_utc` fields are timestamps, `author` and `subreddit` are named
/// objects. Keys in `skip` are left out.
fn fields_from_object(obj: &serde_json::Map<String, Value>, skip: &[&str]) -> Fields {
    obj.iter()
        .filter(|(k, _)| !skip.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), field_value(k, v)))
        .collect()
}

fn field_value(key: &str, value: &Value) -> FieldValue {
    match (key, value) {
        ("author", Value::String(name)) if name == DELETED_AUTHOR => FieldValue::Named(None),
        ("author" | "subreddit", Value::String(name)) => FieldValue::Named(Some(name.clone())),
        (k, Value::Number(n)) if k.ends_with("_utc") => n
            .as_f64()
            .and_then(timestamp_from_epoch)
            .map_or_else(|| json_scalar(value), FieldValue::Timestamp),
        _ => json_scalar(value),
    }
}

fn json_scalar(value: &Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Null,
        Value::Bool(b) => FieldValue::Bool(*b),
        Value::Number(n) => n
            .as_i64()
            .map(FieldValue::Int)
            .or_else(|| n.as_f64().map(FieldValue::Float))
            .unwrap_or_else(|| FieldValue::Opaque(n.to_string())),
        Value::String(s) => FieldValue::Text(s.clone()),
        Value::Array(items) => FieldValue::List(items.iter().map(json_scalar).collect()),
        Value::Object(map) => FieldValue::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), json_scalar(v)))
                .collect(),
        ),
    }
}
