//! Arrow record batches for slim records, encoded as CSV or Parquet.

use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{ArrayRef, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::records::{CommentRecord, PostRecord};

/// Records with a fixed columnar schema.
pub trait TabularRecord: Sized {
    /// Build one record batch holding all `records`, columns in schema order.
    ///
    /// # Errors
    ///
    /// Returns an error if the columns do not match the schema.
    fn record_batch(records: &[Self]) -> Result<RecordBatch>;
}

fn utf8<'a>(values: impl Iterator<Item = &'a str>) -> ArrayRef {
    Arc::new(StringArray::from(values.collect::<Vec<_>>()))
}

fn nullable_utf8<'a>(values: impl Iterator<Item = Option<&'a str>>) -> ArrayRef {
    Arc::new(StringArray::from(values.collect::<Vec<_>>()))
}

fn int64(values: impl Iterator<Item = i64>) -> ArrayRef {
    Arc::new(Int64Array::from(values.collect::<Vec<_>>()))
}

impl TabularRecord for PostRecord {
    fn record_batch(records: &[Self]) -> Result<RecordBatch> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("title", DataType::Utf8, false),
            Field::new("selftext", DataType::Utf8, false),
            Field::new("score", DataType::Int64, false),
            Field::new("num_comments", DataType::Int64, false),
            Field::new("url", DataType::Utf8, false),
            Field::new("created_utc", DataType::Utf8, false),
            Field::new("sub_reddit_name", DataType::Utf8, false),
            Field::new("author", DataType::Utf8, true),
        ]));

        RecordBatch::try_new(
            schema,
            vec![
                utf8(records.iter().map(|r| r.id.as_str())),
                utf8(records.iter().map(|r| r.title.as_str())),
                utf8(records.iter().map(|r| r.selftext.as_str())),
                int64(records.iter().map(|r| r.score)),
                int64(records.iter().map(|r| r.num_comments)),
                utf8(records.iter().map(|r| r.url.as_str())),
                utf8(records.iter().map(|r| r.created_utc.as_str())),
                utf8(records.iter().map(|r| r.sub_reddit_name.as_str())),
                nullable_utf8(records.iter().map(|r| r.author.as_deref())),
            ],
        )
        .context("building posts record batch")
    }
}

impl TabularRecord for CommentRecord {
    fn record_batch(records: &[Self]) -> Result<RecordBatch> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("body", DataType::Utf8, false),
            Field::new("score", DataType::Int64, false),
            Field::new("parent_id", DataType::Utf8, false),
            Field::new("created_utc", DataType::Utf8, false),
            Field::new("author", DataType::Utf8, true),
            Field::new("post_id", DataType::Utf8, false),
        ]));

        RecordBatch::try_new(
            schema,
            vec![
                utf8(records.iter().map(|r| r.id.as_str())),
                utf8(records.iter().map(|r| r.body.as_str())),
                int64(records.iter().map(|r| r.score)),
                utf8(records.iter().map(|r| r.parent_id.as_str())),
                utf8(records.iter().map(|r| r.created_utc.as_str())),
                nullable_utf8(records.iter().map(|r| r.author.as_deref())),
                utf8(records.iter().map(|r| r.post_id.as_str())),
            ],
        )
        .context("building comments record batch")
    }
}

/// Encode a batch as CSV with a header row. Nulls become empty cells.
///
/// # Errors
///
/// Returns an error if the batch cannot be written.
pub fn encode_csv(batch: &RecordBatch) -> Result<Vec<u8>> {
    let mut writer = arrow_csv::WriterBuilder::new()
        .with_header(true)
        .build(Vec::new());
    writer.write(batch).context("writing csv rows")?;
    Ok(writer.into_inner())
}

/// Encode a batch as a Snappy-compressed Parquet file.
///
/// # Errors
///
/// Returns an error if the batch cannot be written.
pub fn encode_parquet(batch: &RecordBatch) -> Result<Vec<u8>> {
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), Some(props))
        .context("opening parquet writer")?;
    writer.write(batch).context("writing record batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(buf)
}
