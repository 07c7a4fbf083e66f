use anyhow::{anyhow, bail, Result};
use arrow::array::{Array, FixedSizeListArray, FixedSizeListBuilder, Float64Array, Float64Builder};
use arrow::compute::{max, min};
use rayon::prelude::*;
use tracing::debug;

use crate::schema::SCALE_COLUMNS;
use crate::table::Table;

struct ColumnRange {
    name: &'static str,
    values: Float64Array,
    min: f64,
    max: f64,
}

/// Min-max scale the eight feature columns into a fixed-order
/// `FixedSizeList<f64, 8>`, one entry per row.
///
/// Assembly is strict: a null anywhere in a feature column is an error naming
/// it, as is a degenerate column whose min equals its max. Ranges come from
/// the table as it stands here, so each column's minimum scales to exactly 0
/// and its maximum to exactly 1.
pub fn scale_features(table: &Table) -> Result<FixedSizeListArray> {
    let columns: Vec<ColumnRange> = SCALE_COLUMNS
        .par_iter()
        .map(|&name| {
            let values = table.f64_column(name)?;
            if values.null_count() > 0 {
                bail!(
                    "column `{}` holds {} null value(s); every feature input must be populated",
                    name,
                    values.null_count()
                );
            }
            let lo = min(&values).ok_or_else(|| anyhow!("column `{}` has no rows", name))?;
            let hi = max(&values).ok_or_else(|| anyhow!("column `{}` has no rows", name))?;
            if lo == hi {
                bail!("column `{}` is degenerate: min == max == {}", name, lo);
            }
            Ok(ColumnRange {
                name,
                values,
                min: lo,
                max: hi,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    for c in &columns {
        debug!(column = c.name, min = c.min, max = c.max, "scaling range");
    }

    let mut builder =
        FixedSizeListBuilder::new(Float64Builder::new(), SCALE_COLUMNS.len() as i32);
    for row in 0..table.num_rows() {
        for c in &columns {
            builder
                .values()
                .append_value((c.values.value(row) - c.min) / (c.max - c.min));
        }
        builder.append(true);
    }
    Ok(builder.finish())
}
