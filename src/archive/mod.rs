//! Writing extraction output to the object store.
//!
//! Three independent write paths: full records as JSON, slim records as CSV,
//! slim records as Parquet. Each uploads one whole blob and reports upload
//! failures to the caller.

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::ArchiveFormat;
use crate::error::PipelineError;
use crate::s3::ObjectStore;
use crate::serializer::FullRecord;

pub mod partition;
pub mod tabular;

pub use partition::{comments_filename, partition_key, posts_filename, RecordType};
pub use tabular::TabularRecord;

/// Serialize a value as JSON with four-space indentation.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn pretty_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<Vec<u8>> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut ser).context("Failed to encode JSON")?;
    Ok(out)
}

/// Uploads record batches under time- and source-partitioned keys.
#[derive(Clone)]
pub struct Archiver {
    store: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
}

impl Archiver {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Upload full records as one pretty JSON array. Returns the key written.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Encode`] or [`PipelineError::Archive`].
    pub async fn upload_json(
        &self,
        records: &[FullRecord],
        filename: &str,
        record_type: RecordType,
        source: &str,
    ) -> Result<String, PipelineError> {
        let body = pretty_json(records).map_err(|e| PipelineError::Encode {
            format: ArchiveFormat::Json.as_str(),
            source: e,
        })?;
        self.upload(ArchiveFormat::Json, record_type, source, filename, &body, records.len())
            .await
    }

    /// Upload slim records as CSV. Returns the key written.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Encode`] or [`PipelineError::Archive`].
    pub async fn upload_csv<R: TabularRecord>(
        &self,
        records: &[R],
        filename: &str,
        record_type: RecordType,
        source: &str,
    ) -> Result<String, PipelineError> {
        let body = R::record_batch(records)
            .and_then(|batch| tabular::encode_csv(&batch))
            .map_err(|e| PipelineError::Encode {
                format: ArchiveFormat::Csv.as_str(),
                source: e,
            })?;
        self.upload(ArchiveFormat::Csv, record_type, source, filename, &body, records.len())
            .await
    }

    /// Upload slim records as Parquet. Returns the key written.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Encode`] or [`PipelineError::Archive`].
    pub async fn upload_parquet<R: TabularRecord>(
        &self,
        records: &[R],
        filename: &str,
        record_type: RecordType,
        source: &str,
    ) -> Result<String, PipelineError> {
        let body = R::record_batch(records)
            .and_then(|batch| tabular::encode_parquet(&batch))
            .map_err(|e| PipelineError::Encode {
                format: ArchiveFormat::Parquet.as_str(),
                source: e,
            })?;
        self.upload(
            ArchiveFormat::Parquet,
            record_type,
            source,
            filename,
            &body,
            records.len(),
        )
        .await
    }

    async fn upload(
        &self,
        format: ArchiveFormat,
        record_type: RecordType,
        source: &str,
        filename: &str,
        body: &[u8],
        count: usize,
    ) -> Result<String, PipelineError> {
        let key = partition_key(format, record_type, self.clock.now(), source, filename);
        debug!(key = %key, bytes = body.len(), "Uploading archive");

        self.store
            .put(&key, body, format.content_type())
            .await
            .map_err(|e| PipelineError::Archive {
                key: key.clone(),
                source: e,
            })?;

        info!(key = %key, records = count, "Data uploaded to S3");
        Ok(key)
    }
}

impl std::fmt::Debug for Archiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archiver").finish_non_exhaustive()
    }
}
