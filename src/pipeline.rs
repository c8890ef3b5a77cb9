//! One extraction run over the configured subreddits.
//!
//! For each source, strictly in order: extract posts, archive them, record
//! their ids in the ledger, then extract and archive each post's comments.
//! The ledger is only updated after every posts upload has succeeded, so an
//! archival failure never marks unarchived posts as seen.

use std::sync::Arc;

use tracing::{info, warn};

use crate::archive::{comments_filename, posts_filename, Archiver, RecordType, TabularRecord};
use crate::clock::Clock;
use crate::config::{ArchiveFormat, Config};
use crate::error::{recover, PipelineError};
use crate::extractor::{Extraction, Extractor};
use crate::ledger::{Ledger, PostIds};
use crate::rate_limiter::RequestRateLimiter;
use crate::reddit::ForumApi;
use crate::s3::ObjectStore;
use crate::serializer::FullRecord;

/// Outcome of one source's pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSummary {
    pub source: String,
    pub new_posts: usize,
    pub comments: usize,
    /// Object keys written, in upload order.
    pub keys: Vec<String>,
    /// The post listing stopped early because of an upstream error.
    pub listing_interrupted: bool,
    /// Posts whose comment tree could not be fetched.
    pub failed_comment_posts: usize,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub sources: Vec<SourceSummary>,
}

impl RunSummary {
    #[must_use]
    pub fn total_posts(&self) -> usize {
        self.sources.iter().map(|s| s.new_posts).sum()
    }

    #[must_use]
    pub fn total_comments(&self) -> usize {
        self.sources.iter().map(|s| s.comments).sum()
    }

    /// Every key written during the run.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.sources
            .iter()
            .flat_map(|s| s.keys.iter().map(String::as_str))
    }
}

/// Drives extraction, archival and ledger updates for a run.
#[derive(Debug)]
pub struct RunController {
    extractor: Extractor,
    archiver: Archiver,
    ledger: Ledger,
    clock: Arc<dyn Clock>,
    post_limit: usize,
    formats: Vec<ArchiveFormat>,
}

impl RunController {
    #[must_use]
    pub fn new(
        extractor: Extractor,
        archiver: Archiver,
        ledger: Ledger,
        clock: Arc<dyn Clock>,
        post_limit: usize,
        formats: &[ArchiveFormat],
    ) -> Self {
        let mut unique = Vec::with_capacity(formats.len());
        for format in formats {
            if !unique.contains(format) {
                unique.push(*format);
            }
        }
        // JSON is the primary archive and is always attempted first
        unique.sort_by_key(|format| *format != ArchiveFormat::Json);

        Self {
            extractor,
            archiver,
            ledger,
            clock,
            post_limit,
            formats: unique,
        }
    }

    /// Wire up all components from configuration.
    #[must_use]
    pub fn from_config(
        config: &Config,
        api: Arc<dyn ForumApi>,
        store: Arc<dyn ObjectStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ledger = Ledger::new(Arc::clone(&store));
        let limiter = RequestRateLimiter::with_interval(config.request_interval());
        let extractor = Extractor::new(api, ledger.clone(), limiter);
        let archiver = Archiver::new(store, Arc::clone(&clock));

        Self::new(
            extractor,
            archiver,
            ledger,
            clock,
            config.post_limit,
            &config.formats,
        )
    }

    /// Run every source in order.
    ///
    /// # Errors
    ///
    /// Stops at the first error whose policy is to propagate (an archive
    /// that could not be encoded or uploaded).
    pub async fn run(&self, sources: &[String]) -> Result<RunSummary, PipelineError> {
        let mut summary = RunSummary::default();

        for source in sources {
            summary.sources.push(self.run_source(source).await?);
        }

        info!(
            sources = summary.sources.len(),
            posts = summary.total_posts(),
            comments = summary.total_comments(),
            "Reddit extraction completed"
        );
        Ok(summary)
    }

    /// Run the full pipeline for one source.
    ///
    /// # Errors
    ///
    /// Returns archive errors; upstream errors are logged and the partial
    /// results archived.
    pub async fn run_source(&self, source: &str) -> Result<SourceSummary, PipelineError> {
        let mut summary = SourceSummary {
            source: source.to_string(),
            ..SourceSummary::default()
        };

        let Extraction {
            records: posts,
            full,
            error,
        } = self.extractor.extract_posts(source, self.post_limit).await;

        if let Some(e) = error {
            summary.listing_interrupted = true;
            recover(Err(e), source, || ())?;
        }
        if posts.is_empty() {
            info!(source = %source, "No new posts");
            return Ok(summary);
        }

        let stamp = self.clock.now();
        let keys = self
            .archive_batch(&posts, &full, RecordType::Posts, source, |format| {
                posts_filename(stamp, format)
            })
            .await?;
        summary.keys.extend(keys);
        summary.new_posts = posts.len();

        let new_ids: PostIds = posts.iter().map(|p| p.id.clone()).collect();
        self.ledger.merge_and_persist(&new_ids).await;

        for post in &posts {
            let mut comments = self.extractor.extract_comments(&post.id).await;
            if let Some(e) = comments.error.take() {
                summary.failed_comment_posts += 1;
                recover(Err(e), &post.id, || ())?;
                continue;
            }
            if comments.is_empty() {
                continue;
            }

            let stamp = self.clock.now();
            let keys = self
                .archive_batch(
                    &comments.records,
                    &comments.full,
                    RecordType::Comments,
                    source,
                    |format| comments_filename(&post.id, stamp, format),
                )
                .await?;
            summary.keys.extend(keys);
            summary.comments += comments.len();
        }

        info!(
            source = %source,
            posts = summary.new_posts,
            comments = summary.comments,
            "Source archived"
        );
        Ok(summary)
    }

    /// Upload one batch in every configured format.
    ///
    /// Every format is attempted even if an earlier one failed; the first
    /// failure is returned afterwards.
    async fn archive_batch<R: TabularRecord>(
        &self,
        records: &[R],
        full: &[FullRecord],
        record_type: RecordType,
        source: &str,
        filename: impl Fn(ArchiveFormat) -> String,
    ) -> Result<Vec<String>, PipelineError> {
        let mut keys = Vec::with_capacity(self.formats.len());
        let mut first_error = None;

        for &format in &self.formats {
            let name = filename(format);
            let result = match format {
                ArchiveFormat::Json => {
                    self.archiver
                        .upload_json(full, &name, record_type, source)
                        .await
                }
                ArchiveFormat::Csv => {
                    self.archiver
                        .upload_csv(records, &name, record_type, source)
                        .await
                }
                ArchiveFormat::Parquet => {
                    self.archiver
                        .upload_parquet(records, &name, record_type, source)
                        .await
                }
            };

            match result {
                Ok(key) => keys.push(key),
                Err(e) => {
                    warn!(source = %source, format = format.as_str(), "{e}");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(keys),
        }
    }
}
