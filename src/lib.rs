//! Subreddit Archiver library.
//!
//! Pulls new posts and their comments from a set of subreddits under a
//! request-rate ceiling, skips posts already archived in earlier runs, and
//! writes the results to S3 under time- and source-partitioned keys.

pub mod archive;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod extractor;
pub mod ledger;
pub mod pipeline;
pub mod rate_limiter;
pub mod records;
pub mod reddit;
pub mod s3;
pub mod serializer;
pub mod trigger;
