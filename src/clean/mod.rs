use anyhow::{anyhow, Context, Result};
use arrow::array::{Array, BooleanArray, Int32Array, Int64Builder, StringArray};
use arrow::datatypes::{DataType, Field};
use arrow::row::{RowConverter, SortField};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::schema::{PURPOSE, PURPOSE_KEEP, TERM, VERIFICATION_STATUS, VERIFICATION_STATUS_BINARY};
use crate::table::Table;

static TERM_MONTHS: Lazy<Regex> = Lazy::new(|| Regex::new("months").unwrap());

/// Remove rows that are exact duplicates across every column, keeping the
/// first occurrence in input order.
pub fn dedup(table: &Table) -> Result<Table> {
    let batch = table.batch();
    let fields: Vec<SortField> = batch
        .schema()
        .fields()
        .iter()
        .map(|f| SortField::new(f.data_type().clone()))
        .collect();
    let converter = RowConverter::new(fields).context("building row encoder for dedup")?;
    let rows = converter
        .convert_columns(batch.columns())
        .context("row-encoding table for dedup")?;

    let mut seen: HashSet<Vec<u8>> = HashSet::with_capacity(rows.num_rows());
    let mask: BooleanArray = rows
        .iter()
        .map(|row| Some(seen.insert(row.as_ref().to_vec())))
        .collect();

    let kept = table.filter(&mask)?;
    debug!(
        before = table.num_rows(),
        after = kept.num_rows(),
        "removed exact duplicate rows"
    );
    Ok(kept)
}

/// Strip the literal `months` from `term` and parse the remainder as an
/// integer, replacing the column. Null stays null; non-numeric residue is a
/// fatal data error naming the row.
pub fn normalize_term(table: &Table) -> Result<Table> {
    let source = table.str_column(TERM)?;
    let mut months = Int64Builder::with_capacity(source.len());
    for (row, value) in source.iter().enumerate() {
        match value {
            None => months.append_null(),
            Some(raw) => {
                let stripped = TERM_MONTHS.replace_all(raw, "");
                let parsed: i64 = stripped.trim().parse().map_err(|_| {
                    anyhow!(
                        "column `{}` row {}: `{}` is not numeric after stripping `months`",
                        TERM,
                        row,
                        raw
                    )
                })?;
                months.append_value(parsed);
            }
        }
    }
    table.replace_column(
        TERM,
        Field::new(TERM, DataType::Int64, true),
        Arc::new(months.finish()),
    )
}

/// Add `verification_status_binary`: 0 for the exact value `Not Verified`,
/// 1 for anything else including null. The source column is dropped.
pub fn encode_verification(table: &Table) -> Result<Table> {
    let source = table.str_column(VERIFICATION_STATUS)?;
    let encoded: Int32Array = source
        .iter()
        .map(|value| {
            Some(match value {
                Some("Not Verified") => 0,
                _ => 1,
            })
        })
        .collect();
    let table = table.with_column(
        Field::new(VERIFICATION_STATUS_BINARY, DataType::Int32, false),
        Arc::new(encoded),
    )?;
    table.drop_columns(&[VERIFICATION_STATUS])
}

/// Fold every `purpose` outside the allow-list, nulls included, into the
/// literal `other`.
pub fn collapse_purpose(table: &Table) -> Result<Table> {
    let source = table.str_column(PURPOSE)?;
    let collapsed: StringArray = source
        .iter()
        .map(|value| match value {
            Some(v) if PURPOSE_KEEP.contains(v) => Some(v),
            _ => Some("other"),
        })
        .collect();
    table.replace_column(
        PURPOSE,
        Field::new(PURPOSE, DataType::Utf8, false),
        Arc::new(collapsed),
    )
}
