//! Object key layout for archived blobs.
//!
//! JSON archives are partitioned down to the day; CSV and Parquet only to
//! the month, and CSV carries no record-type segment. Downstream readers
//! depend on both layouts, so they are kept as they are.

use chrono::{DateTime, Datelike, Utc};

use crate::config::ArchiveFormat;
use crate::constants::{CSV_PREFIX, FILENAME_TIME_FORMAT, JSON_PREFIX, PARQUET_PREFIX};

/// Kind of record in an archive blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    Posts,
    Comments,
}

impl RecordType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Posts => "posts",
            Self::Comments => "comments",
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ArchiveFormat {
    /// File extension of generated filenames.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Parquet => "parquet",
        }
    }

    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv",
            Self::Parquet => "application/x-parquet",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.extension()
    }
}

/// Compute the object key for an archive blob.
///
/// Month and day are not zero padded.
#[must_use]
pub fn partition_key(
    format: ArchiveFormat,
    record_type: RecordType,
    at: DateTime<Utc>,
    source: &str,
    filename: &str,
) -> String {
    let (year, month, day) = (at.year(), at.month(), at.day());
    match format {
        ArchiveFormat::Json => format!(
            "{JSON_PREFIX}/{record_type}/year={year}/month={month}/day={day}/subreddit={source}/{filename}"
        ),
        ArchiveFormat::Csv => {
            format!("{CSV_PREFIX}/year={year}/month={month}/subreddit={source}/{filename}")
        }
        ArchiveFormat::Parquet => format!(
            "{PARQUET_PREFIX}/{record_type}/year={year}/month={month}/subreddit={source}/{filename}"
        ),
    }
}

/// Filename for a batch of posts from one source.
#[must_use]
pub fn posts_filename(at: DateTime<Utc>, format: ArchiveFormat) -> String {
    format!(
        "reddit_product_reviews_posts_{}.{}",
        at.format(FILENAME_TIME_FORMAT),
        format.extension()
    )
}

/// Filename for the comments of one post.
#[must_use]
pub fn comments_filename(post_id: &str, at: DateTime<Utc>, format: ArchiveFormat) -> String {
    format!(
        "reddit_product_review_comments_{post_id}_{}.{}",
        at.format(FILENAME_TIME_FORMAT),
        format.extension()
    )
}
