use anyhow::{anyhow, Context, Result};
use arrow::array::{Array, BooleanArray, Float64Array, Float64Builder, Int64Builder};
use arrow::datatypes::{DataType, Field};
use std::sync::Arc;
use tracing::debug;

use crate::schema::{
    ACC_NOW_DELINQ, ANNUAL_INC, AVG_FICO_SCORE, CR_HISTORY_TO_2015, DELINQUENCY_NOW_PLUS_PAST_2YRS,
    DELINQ_2YRS, DELINQ_AMNT, DELINQ_AMNT_PER_ACC, DTI, EARLIEST_CR_LINE, FICO_PER_INQUIRIES,
    INQ_LAST_6MTHS, LOAN_AMNT, LOAN_ANNUAL_INCOME_RATIO,
};
use crate::table::Table;

const CR_HISTORY_ANCHOR: i64 = 2015;
const DTI_LIMIT: f64 = 100.0;

/// Parse the four-digit year terminating an `earliest_cr_line` cell,
/// e.g. `Aug-2005` → 2005.
pub fn year_from_cr_line(raw: &str) -> Result<i64> {
    let trimmed = raw.trim();
    let suffix = trimmed
        .len()
        .checked_sub(4)
        .and_then(|start| trimmed.get(start..))
        .ok_or_else(|| anyhow!("`{}` is shorter than a four-digit year", raw))?;
    suffix
        .parse::<i64>()
        .map_err(|_| anyhow!("`{}` does not end in a four-digit year", raw))
}

/// Add `cr_history_to_2015` (years of credit history as of 2015) and drop the
/// source column. Null input stays null; an unparseable year is fatal.
pub fn derive_cr_history(table: &Table) -> Result<Table> {
    let source = table.str_column(EARLIEST_CR_LINE)?;
    let mut history = Int64Builder::with_capacity(source.len());
    for (row, value) in source.iter().enumerate() {
        match value {
            None => history.append_null(),
            Some(raw) => {
                let year = year_from_cr_line(raw)
                    .with_context(|| format!("column `{}` row {}", EARLIEST_CR_LINE, row))?;
                history.append_value(CR_HISTORY_ANCHOR - year);
            }
        }
    }
    let table = table.with_column(
        Field::new(CR_HISTORY_TO_2015, DataType::Int64, true),
        Arc::new(history.finish()),
    )?;
    table.drop_columns(&[EARLIEST_CR_LINE])
}

/// Keep rows with `dti <= 100`. The boundary value itself survives; a null
/// `dti` compares as not-true and is dropped with the outliers.
pub fn filter_dti(table: &Table) -> Result<Table> {
    let dti = table.f64_column(DTI)?;
    let mask: BooleanArray = dti
        .iter()
        .map(|v| Some(matches!(v, Some(x) if x <= DTI_LIMIT)))
        .collect();
    let kept = table.filter(&mask)?;
    debug!(
        before = table.num_rows(),
        after = kept.num_rows(),
        "filtered dti outliers"
    );
    Ok(kept)
}

/// Add the four combined features. Arithmetic is null-propagating, and a zero
/// `annual_inc` yields a null ratio rather than a non-finite value. The other
/// denominators are `1 + x` and stay at or above one for non-negative counts.
pub fn derive_ratios(table: &Table) -> Result<Table> {
    let loan_amnt = table.f64_column(LOAN_AMNT)?;
    let annual_inc = table.f64_column(ANNUAL_INC)?;
    let acc_now_delinq = table.f64_column(ACC_NOW_DELINQ)?;
    let delinq_2yrs = table.f64_column(DELINQ_2YRS)?;
    let delinq_amnt = table.f64_column(DELINQ_AMNT)?;
    let avg_fico = table.f64_column(AVG_FICO_SCORE)?;
    let inquiries = table.f64_column(INQ_LAST_6MTHS)?;

    let income_ratio = binary(&loan_amnt, &annual_inc, |loan, inc| {
        if inc == 0.0 {
            None
        } else {
            Some(loan / inc)
        }
    });
    let delinquency = binary(&acc_now_delinq, &delinq_2yrs, |now, past| Some(now + past));
    let per_acc = binary(&delinq_amnt, &acc_now_delinq, |amnt, now| {
        Some(amnt / (1.0 + now))
    });
    let fico_per_inq = binary(&avg_fico, &inquiries, |fico, inq| Some(fico / (1.0 + inq)));

    table
        .with_column(
            Field::new(LOAN_ANNUAL_INCOME_RATIO, DataType::Float64, true),
            Arc::new(income_ratio),
        )?
        .with_column(
            Field::new(DELINQUENCY_NOW_PLUS_PAST_2YRS, DataType::Float64, true),
            Arc::new(delinquency),
        )?
        .with_column(
            Field::new(DELINQ_AMNT_PER_ACC, DataType::Float64, true),
            Arc::new(per_acc),
        )?
        .with_column(
            Field::new(FICO_PER_INQUIRIES, DataType::Float64, true),
            Arc::new(fico_per_inq),
        )
}

/// Element-wise combine of two f64 columns; a null on either side, or `None`
/// from the combiner, is a null in the result.
fn binary(a: &Float64Array, b: &Float64Array, f: impl Fn(f64, f64) -> Option<f64>) -> Float64Array {
    let mut out = Float64Builder::with_capacity(a.len());
    for row in 0..a.len() {
        if a.is_null(row) || b.is_null(row) {
            out.append_null();
        } else {
            out.append_option(f(a.value(row), b.value(row)));
        }
    }
    out.finish()
}
