use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use parquet::arrow::ArrowWriter;
use parquet::basic::{BrotliLevel, Compression};
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use std::path::Path;
use tracing::info;

/// Render the first `rows` rows as an ASCII table.
pub fn preview(batch: &RecordBatch, rows: usize) -> Result<String> {
    let head = batch.slice(0, rows.min(batch.num_rows()));
    Ok(pretty_format_batches(&[head])
        .context("rendering preview")?
        .to_string())
}

/// Persist `batch` as Brotli-compressed Parquet, writing through a `.tmp`
/// path that is renamed into place once the writer has closed.
pub fn write_parquet(batch: &RecordBatch, out_path: &Path) -> Result<()> {
    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let tmp_path = out_path.with_extension("parquet.tmp");
    let file =
        File::create(&tmp_path).with_context(|| format!("creating {}", tmp_path.display()))?;

    let props = WriterProperties::builder()
        .set_compression(Compression::BROTLI(BrotliLevel::try_new(5)?))
        .set_dictionary_enabled(true)
        .build();

    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .context("creating parquet writer")?;
    writer.write(batch).context("writing batch to parquet")?;
    writer.close().context("closing parquet writer")?;

    fs::rename(&tmp_path, out_path)
        .with_context(|| format!("renaming {} into place", tmp_path.display()))?;
    info!(path = %out_path.display(), rows = batch.num_rows(), "wrote output parquet");
    Ok(())
}
