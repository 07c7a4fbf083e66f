use anyhow::{Context, Result};
use arrow::array::{Array, ArrayRef, FixedSizeListArray};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::table::Table;
use crate::{audit, clean, features, ingest, scale, schema};

/// Run the whole preparation pipeline over a CSV and return the two-column
/// model-ready table. The table value is threaded step to step; any step
/// failing aborts the run with the step name in the error chain.
pub fn run<P: AsRef<Path>>(input: P) -> Result<Table> {
    // ─── 1) load ─────────────────────────────────────────────────────
    let table = ingest::load_csv(input).context("load")?;

    // ─── 2) drop identifier and post-origination columns ─────────────
    let table = table
        .drop_columns(schema::FIXED_DROP)
        .context("drop fixed columns")?;

    // ─── 3) dedup ────────────────────────────────────────────────────
    let table = clean::dedup(&table).context("deduplicate")?;
    info!(rows = table.num_rows(), "after dedup");

    // ─── 4) missing-value audit (diagnostic only) ────────────────────
    let reports = audit::missing_by_label(&table).context("missing-value audit")?;
    audit::log_reports(&reports);

    // ─── 5) drop high-missing columns ────────────────────────────────
    let table = table
        .drop_columns(schema::HIGH_MISSING_DROP)
        .context("drop high-missing columns")?;

    // ─── 6) term → months ────────────────────────────────────────────
    let table = clean::normalize_term(&table).context("normalize term")?;

    // ─── 7) verification status → binary ─────────────────────────────
    let table = clean::encode_verification(&table).context("encode verification status")?;

    // ─── 8) collapse rare purposes ───────────────────────────────────
    let table = clean::collapse_purpose(&table).context("collapse purpose categories")?;

    // ─── 9) credit history ───────────────────────────────────────────
    let table = features::derive_cr_history(&table).context("derive credit history")?;

    // ─── 10) dti outliers ────────────────────────────────────────────
    let table = features::filter_dti(&table).context("filter dti outliers")?;
    info!(rows = table.num_rows(), "after dti filter");

    // ─── 11) combined features ───────────────────────────────────────
    let table = features::derive_ratios(&table).context("derive ratio features")?;

    // ─── 12) min-max scale ───────────────────────────────────────────
    let scaled = scale::scale_features(&table).context("scale features")?;

    // ─── 13) project ─────────────────────────────────────────────────
    let output = project_output(&table, scaled).context("project output")?;
    info!(rows = output.num_rows(), "pipeline complete");
    Ok(output)
}

/// The final projection: the scaled feature vector plus the label, nothing
/// else, one row per surviving input row.
fn project_output(table: &Table, scaled: FixedSizeListArray) -> Result<Table> {
    let label = table.column(schema::LOAN_STATUS)?.clone();
    let fields = vec![
        Field::new(schema::SCALED_FEATURES, scaled.data_type().clone(), false),
        Field::new(schema::LOAN_STATUS, label.data_type().clone(), true),
    ];
    let batch = RecordBatch::try_new(
        Arc::new(Schema::new(fields)),
        vec![Arc::new(scaled) as ArrayRef, label],
    )
    .context("assembling output batch")?;
    Ok(Table::new(batch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Float64Array, StringArray};
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,loanprep=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    const HEADER: &str = "id,issue_d,installment,last_credit_pull_d,last_fico_range_high,\
last_fico_range_low,mths_since_last_record,mths_since_last_delinq,inq_last_12m,emp_length,\
loan_status,term,verification_status,purpose,earliest_cr_line,dti,loan_amnt,annual_inc,\
acc_now_delinq,delinq_2yrs,delinq_amnt,avg_fico_score,inq_last_6mths";

    const ROW_1: &str = "1,Dec-2014,339.31,Jan-2016,679,675,,,,10+ years,Fully Paid,36 months,\
Not Verified,car,Aug-2005,10.5,10000,50000,0,0,0,700,0";
    const ROW_2: &str = "2,Jan-2015,521.04,Feb-2016,699,695,3,10,1,5 years,Charged Off,60 months,\
Verified,credit_card,Jan-1999,100.0,20000,40000,1,2,50,650,1";
    const ROW_OUTLIER: &str = "4,Feb-2015,101.2,Mar-2016,640,636,,,,<1 year,Charged Off,36 months,\
Source Verified,home_improvement,Feb-2000,100.01,8000,30000,0,0,0,600,3";
    const ROW_5: &str = "5,Mar-2015,250.0,Apr-2016,710,706,,,,2 years,Fully Paid,36 months,\
Source Verified,debt_consolidation,Mar-2010,55.2,5000,100000,0,1,100,720,2";

    fn write_input() -> NamedTempFile {
        // ROW_1 appears twice so deduplication has work to do.
        let content = format!(
            "{}\n{}\n{}\n{}\n{}\n{}\n",
            HEADER, ROW_1, ROW_2, ROW_1, ROW_OUTLIER, ROW_5
        );
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(content.as_bytes()).unwrap();
        tmp.flush().unwrap();
        tmp
    }

    #[test]
    fn end_to_end_produces_model_ready_table() {
        init_test_logging();
        let input = write_input();
        let output = run(input.path()).unwrap();

        // Exactly two columns, and only the rows that survive dedup plus the
        // dti filter: the duplicate of ROW_1 and the 100.01 outlier are gone.
        let schema = output.schema();
        assert_eq!(schema.fields().len(), 2);
        assert_eq!(schema.field(0).name(), schema::SCALED_FEATURES);
        assert_eq!(schema.field(1).name(), schema::LOAN_STATUS);
        assert_eq!(output.num_rows(), 3);

        let labels = output.str_column(schema::LOAN_STATUS).unwrap();
        assert_eq!(
            (0..3).map(|i| labels.value(i)).collect::<Vec<_>>(),
            vec!["Fully Paid", "Charged Off", "Fully Paid"]
        );

        let vectors = output
            .column(schema::SCALED_FEATURES)
            .unwrap()
            .as_any()
            .downcast_ref::<FixedSizeListArray>()
            .unwrap()
            .clone();
        assert_eq!(vectors.value_length(), 8);

        let mut per_column: Vec<Vec<f64>> = vec![Vec::new(); 8];
        for row in 0..output.num_rows() {
            let entry = vectors.value(row);
            let values = entry.as_any().downcast_ref::<Float64Array>().unwrap();
            for slot in 0..8 {
                let v = values.value(slot);
                assert!((0.0..=1.0).contains(&v), "slot {} out of range: {}", slot, v);
                per_column[slot].push(v);
            }
        }
        // Each feature's observed extremes hit the ends of the unit interval.
        for (slot, values) in per_column.iter().enumerate() {
            let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            assert_eq!(lo, 0.0, "slot {} min", slot);
            assert_eq!(hi, 1.0, "slot {} max", slot);
        }

        // Slot 0 is loan_amnt: survivors hold 10000, 20000, 5000, so the
        // first row scales to (10000 - 5000) / 15000.
        assert!((per_column[0][0] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn duplicate_and_outlier_rows_never_reach_the_output() {
        let input = write_input();
        let output = run(input.path()).unwrap();
        assert!(output.num_rows() <= 5);
        assert_eq!(output.num_rows(), 3);
    }

    #[test]
    fn missing_input_file_aborts_with_load_context() {
        let err = run("does-not-exist.csv").unwrap_err();
        assert!(format!("{:#}", err).contains("load"));
    }

    #[test]
    fn projection_keeps_label_order() {
        let table = Table::new(
            RecordBatch::try_new(
                Arc::new(Schema::new(vec![Field::new(
                    schema::LOAN_STATUS,
                    arrow::datatypes::DataType::Utf8,
                    true,
                )])),
                vec![Arc::new(StringArray::from(vec!["a", "b"])) as ArrayRef],
            )
            .unwrap(),
        );
        let mut builder = arrow::array::FixedSizeListBuilder::new(
            arrow::array::Float64Builder::new(),
            schema::SCALE_COLUMNS.len() as i32,
        );
        for _ in 0..2 {
            for _ in 0..schema::SCALE_COLUMNS.len() {
                builder.values().append_value(0.5);
            }
            builder.append(true);
        }
        let output = project_output(&table, builder.finish()).unwrap();
        assert_eq!(output.num_rows(), 2);
        assert_eq!(output.schema().fields().len(), 2);
    }
}
