//! Reddit OAuth API client.
//!
//! Uses application-only (client credentials) OAuth. Listings are paged
//! with the `after` cursor; comment trees come from `/comments/{id}`.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use super::{CommentTree, ForumApi, UpstreamPost};
use crate::config::Config;

/// Largest page Reddit serves for a listing request.
const MAX_PAGE_SIZE: usize = 100;

/// Refresh tokens this long before Reddit says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// One page of a listing.
struct ListingPage {
    children: Vec<Value>,
    after: Option<String>,
}

/// HTTP client for the Reddit API.
pub struct RedditClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    api_base: String,
    auth_base: String,
    token: Mutex<Option<AccessToken>>,
}

impl RedditClient {
    /// Create a new client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(config.reddit_user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            client_id: config.reddit_client_id.clone(),
            client_secret: config.reddit_client_secret.clone(),
            api_base: config.reddit_api_base.trim_end_matches('/').to_string(),
            auth_base: config.reddit_auth_base.trim_end_matches('/').to_string(),
            token: Mutex::new(None),
        })
    }

    /// Return a valid bearer token, fetching a new one if needed.
    async fn access_token(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if let Some(current) = token.as_ref() {
            if current.expires_at > Instant::now() + TOKEN_EXPIRY_MARGIN {
                return Ok(current.value.clone());
            }
        }

        debug!("Requesting Reddit access token");
        let response = self
            .http
            .post(format!("{}/api/v1/access_token", self.auth_base))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .context("Failed to request access token")?;

        if !response.status().is_success() {
            anyhow::bail!("Access token request failed with status {}", response.status());
        }

        let body: TokenResponse = response
            .json()
            .await
            .context("Failed to parse access token response")?;

        let value = body.access_token.clone();
        *token = Some(AccessToken {
            value: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        });
        Ok(value)
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let token = self.access_token().await?;
        let url = format!("{}{path}", self.api_base);
        trace!(url = %url, "GET");

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {path}"))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            // Force a fresh token on the next request
            *self.token.lock().await = None;
        }
        if !status.is_success() {
            anyhow::bail!("GET {path} failed with status {status}");
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {path}"))
    }

    async fn fetch_listing_page(
        &self,
        source: &str,
        limit: usize,
        after: Option<&str>,
    ) -> Result<ListingPage> {
        let mut query = vec![("limit", limit.to_string()), ("raw_json", "1".to_string())];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }

        let body = self.get_json(&format!("/r/{source}/hot"), &query).await?;
        let children = body
            .pointer("/data/children")
            .and_then(Value::as_array)
            .context("Listing response has no children")?
            .iter()
            .filter(|child| child.get("kind").and_then(Value::as_str) == Some("t3"))
            .filter_map(|child| child.get("data").cloned())
            .collect();
        let after = body
            .pointer("/data/after")
            .and_then(Value::as_str)
            .map(ToString::to_string);

        Ok(ListingPage { children, after })
    }
}

#[async_trait]
impl ForumApi for RedditClient {
    fn listing<'a>(&'a self, source: &'a str, limit: usize) -> BoxStream<'a, Result<UpstreamPost>> {
        Box::pin(try_stream! {
            let mut after: Option<String> = None;
            let mut yielded = 0usize;

            while yielded < limit {
                let page_size = (limit - yielded).min(MAX_PAGE_SIZE);
                let page = self.fetch_listing_page(source, page_size, after.as_deref()).await?;
                debug!(source = %source, items = page.children.len(), "Fetched listing page");

                let page_len = page.children.len();
                for data in page.children {
                    if yielded >= limit {
                        break;
                    }
                    match UpstreamPost::from_json(&data) {
                        Ok(post) => {
                            yielded += 1;
                            yield post;
                        }
                        Err(e) => warn!(source = %source, "Skipping malformed post in listing: {e:#}"),
                    }
                }

                match page.after {
                    Some(cursor) if page_len > 0 => after = Some(cursor),
                    _ => break,
                }
            }
        })
    }

    async fn submission(&self, post_id: &str) -> Result<CommentTree> {
        let body = self
            .get_json(&format!("/comments/{post_id}"), &[("raw_json", "1".to_string())])
            .await?;

        let comments = body
            .as_array()
            .and_then(|parts| parts.get(1))
            .context("Submission response has no comment listing")?;

        let tree = CommentTree::from_listing(comments);
        if tree.malformed > 0 {
            warn!(post_id = %post_id, malformed = tree.malformed, "Dropped malformed comments");
        }
        if tree.unexpanded > 0 {
            debug!(post_id = %post_id, unexpanded = tree.unexpanded, "Comment tree has unexpanded stubs");
        }
        Ok(tree)
    }
}

impl std::fmt::Debug for RedditClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}
