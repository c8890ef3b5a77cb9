//! Shared constants used across the application.

/// Subreddits extracted when the command line names none.
pub const DEFAULT_SUBREDDITS: &[&str] = &[
    "ProductReviews",
    "amazonreviews",
    "apple",
    "android",
    "headphones",
    "buildapc",
    "gadgets",
];

/// Object key of the persisted set of already-archived post ids.
pub const LEDGER_KEY: &str = "reddit-data-json/stored_post_ids.json";

/// Root prefix for full JSON records.
pub const JSON_PREFIX: &str = "reddit-data-json";

/// Root prefix for tabular (CSV) records.
pub const CSV_PREFIX: &str = "reddit-data-csv";

/// Root prefix for columnar (Parquet) records.
pub const PARQUET_PREFIX: &str = "reddit-data-parquet";

/// Timestamp layout used for serialized record values.
pub const RECORD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Timestamp layout embedded in generated archive filenames.
pub const FILENAME_TIME_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// Default user agent sent to the Reddit API when none is configured.
pub const DEFAULT_USER_AGENT: &str = "subreddit-archiver/0.1";

/// Identifier of this stage as reported to the downstream job.
pub const DEFAULT_STAGE_ID: &str = "extract_data";

/// Name of the downstream job started after a successful run.
pub const DEFAULT_SUCCESSOR: &str = "transform_data";
