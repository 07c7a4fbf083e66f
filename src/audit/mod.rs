use anyhow::Result;
use arrow::array::Array;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt::Write;
use tracing::info;

use crate::schema::LOAN_STATUS;
use crate::table::Table;

const NULL_LABEL: &str = "<null>";

/// Null/non-null counts for one `loan_status` group of one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupCounts {
    pub label: String,
    pub missing: u64,
    pub present: u64,
}

impl GroupCounts {
    pub fn missing_percentage(&self) -> f64 {
        safe_percentage(self.missing, self.present)
    }
}

/// Per-column missing-value distribution, grouped by label. Diagnostic only;
/// nothing downstream reads it.
#[derive(Debug, Clone)]
pub struct MissingReport {
    pub column: String,
    pub groups: Vec<GroupCounts>,
}

/// missing / (missing + present) * 100, reporting an empty group as 0 rather
/// than dividing by zero.
fn safe_percentage(missing: u64, present: u64) -> f64 {
    let total = missing + present;
    if total == 0 {
        0.0
    } else {
        missing as f64 / total as f64 * 100.0
    }
}

/// For every column holding at least one null, count null and non-null rows
/// per `loan_status` group. Columns are scanned independently in parallel;
/// groups come back sorted by label.
pub fn missing_by_label(table: &Table) -> Result<Vec<MissingReport>> {
    let labels = table.str_column(LOAN_STATUS)?;

    let candidates: Vec<(String, usize)> = table
        .schema()
        .fields()
        .iter()
        .enumerate()
        .filter(|(i, _)| table.batch().column(*i).null_count() > 0)
        .map(|(i, f)| (f.name().clone(), i))
        .collect();

    let reports = candidates
        .into_par_iter()
        .map(|(name, idx)| {
            let column = table.batch().column(idx);
            let mut groups: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
            for row in 0..column.len() {
                let label = if labels.is_null(row) {
                    NULL_LABEL
                } else {
                    labels.value(row)
                };
                let entry = groups.entry(label).or_default();
                if column.is_null(row) {
                    entry.0 += 1;
                } else {
                    entry.1 += 1;
                }
            }
            MissingReport {
                column: name,
                groups: groups
                    .into_iter()
                    .map(|(label, (missing, present))| GroupCounts {
                        label: label.to_string(),
                        missing,
                        present,
                    })
                    .collect(),
            }
        })
        .collect();

    Ok(reports)
}

/// Render one report as an aligned text table.
pub fn render(report: &MissingReport) -> String {
    let label_width = report
        .groups
        .iter()
        .map(|g| g.label.len())
        .max()
        .unwrap_or(0)
        .max(LOAN_STATUS.len());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<label_width$}  {:>8}  {:>8}  {:>9}",
        LOAN_STATUS, "missing", "present", "missing_%"
    );
    for g in &report.groups {
        let _ = writeln!(
            out,
            "{:<label_width$}  {:>8}  {:>8}  {:>8.2}%",
            g.label,
            g.missing,
            g.present,
            g.missing_percentage()
        );
    }
    out
}

pub fn log_reports(reports: &[MissingReport]) {
    if reports.is_empty() {
        info!("no columns with missing values");
        return;
    }
    for report in reports {
        info!("missing values in `{}`:\n{}", report.column, render(report));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Float64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use std::sync::Arc;

    fn table(labels: Vec<Option<&str>>, values: Vec<Option<f64>>) -> Table {
        let schema = Arc::new(Schema::new(vec![
            Field::new(LOAN_STATUS, DataType::Utf8, true),
            Field::new("dti", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(labels)) as ArrayRef,
                Arc::new(Float64Array::from(values)) as ArrayRef,
            ],
        )
        .unwrap();
        Table::new(batch)
    }

    #[test]
    fn column_without_nulls_reports_nothing() {
        let t = table(
            vec![Some("Fully Paid"), Some("Charged Off")],
            vec![Some(1.0), Some(2.0)],
        );
        assert!(missing_by_label(&t).unwrap().is_empty());
    }

    #[test]
    fn counts_split_by_label() {
        let t = table(
            vec![
                Some("Fully Paid"),
                Some("Fully Paid"),
                Some("Charged Off"),
                Some("Charged Off"),
            ],
            vec![None, Some(1.0), None, None],
        );
        let reports = missing_by_label(&t).unwrap();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.column, "dti");
        assert_eq!(
            report.groups,
            vec![
                GroupCounts {
                    label: "Charged Off".into(),
                    missing: 2,
                    present: 0,
                },
                GroupCounts {
                    label: "Fully Paid".into(),
                    missing: 1,
                    present: 1,
                },
            ]
        );
        assert_eq!(report.groups[0].missing_percentage(), 100.0);
        assert_eq!(report.groups[1].missing_percentage(), 50.0);
    }

    #[test]
    fn null_labels_bucket_separately() {
        let t = table(vec![None, Some("Fully Paid")], vec![None, Some(1.0)]);
        let reports = missing_by_label(&t).unwrap();
        assert_eq!(reports[0].groups[0].label, NULL_LABEL);
    }

    #[test]
    fn empty_group_is_zero_percent_not_an_error() {
        assert_eq!(safe_percentage(0, 0), 0.0);
        assert_eq!(safe_percentage(0, 10), 0.0);
        assert_eq!(safe_percentage(10, 0), 100.0);
    }

    #[test]
    fn render_holds_one_line_per_group() {
        let t = table(
            vec![Some("Fully Paid"), Some("Charged Off")],
            vec![None, Some(1.0)],
        );
        let reports = missing_by_label(&t).unwrap();
        let rendered = render(&reports[0]);
        assert_eq!(rendered.lines().count(), 3);
        assert!(rendered.contains("missing_%"));
    }
}
