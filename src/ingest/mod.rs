use anyhow::{Context, Result};
use arrow::compute::concat_batches;
use arrow::csv::{reader::Format, ReaderBuilder};
use std::fs::File;
use std::io::Seek;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::schema;
use crate::table::Table;

const INFER_SAMPLE_ROWS: usize = 1000;
const BATCH_SIZE: usize = 8192;

/// Load a headered CSV into a single record table.
///
/// Two passes over the file: a sample pass infers the column types, the full
/// pass reads with that schema. Every column the pipeline touches must be
/// present afterwards or the load fails listing the absentees.
pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Table> {
    let path = path.as_ref();
    let mut file =
        File::open(path).with_context(|| format!("opening input CSV {}", path.display()))?;

    let format = Format::default().with_header(true);
    let (inferred, _) = format
        .infer_schema(&mut file, Some(INFER_SAMPLE_ROWS))
        .with_context(|| format!("inferring schema from {}", path.display()))?;
    file.rewind().context("rewinding input after schema inference")?;
    let schema_ref = Arc::new(inferred);
    debug!(columns = schema_ref.fields().len(), "inferred CSV schema");

    let reader = ReaderBuilder::new(schema_ref.clone())
        .with_header(true)
        .with_batch_size(BATCH_SIZE)
        .build(file)
        .context("creating CSV reader")?;

    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch.with_context(|| format!("reading CSV batch from {}", path.display()))?);
    }
    let batch = concat_batches(&schema_ref, &batches).context("concatenating CSV batches")?;

    schema::validate_required(&batch.schema())?;

    info!(
        rows = batch.num_rows(),
        columns = batch.num_columns(),
        path = %path.display(),
        "loaded input table"
    );
    Ok(Table::new(batch))
}
