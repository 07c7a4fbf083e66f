use anyhow::{anyhow, Result};
use arrow::datatypes::Schema;
use once_cell::sync::Lazy;
use std::collections::HashSet;

// Label and working columns.
pub const LOAN_STATUS: &str = "loan_status";
pub const TERM: &str = "term";
pub const VERIFICATION_STATUS: &str = "verification_status";
pub const PURPOSE: &str = "purpose";
pub const EARLIEST_CR_LINE: &str = "earliest_cr_line";
pub const DTI: &str = "dti";
pub const LOAN_AMNT: &str = "loan_amnt";
pub const ANNUAL_INC: &str = "annual_inc";
pub const ACC_NOW_DELINQ: &str = "acc_now_delinq";
pub const DELINQ_2YRS: &str = "delinq_2yrs";
pub const DELINQ_AMNT: &str = "delinq_amnt";
pub const AVG_FICO_SCORE: &str = "avg_fico_score";
pub const INQ_LAST_6MTHS: &str = "inq_last_6mths";

// Derived columns.
pub const VERIFICATION_STATUS_BINARY: &str = "verification_status_binary";
pub const CR_HISTORY_TO_2015: &str = "cr_history_to_2015";
pub const LOAN_ANNUAL_INCOME_RATIO: &str = "loan_annual_income_ratio";
pub const DELINQUENCY_NOW_PLUS_PAST_2YRS: &str = "delinquency_now_plus_past_2yrs";
pub const DELINQ_AMNT_PER_ACC: &str = "delinq_amnt_per_acc";
pub const FICO_PER_INQUIRIES: &str = "fico_per_inquiries";
pub const SCALED_FEATURES: &str = "scaled_features";

/// Identifier and post-origination columns removed up front.
pub const FIXED_DROP: &[&str] = &[
    "id",
    "issue_d",
    "installment",
    "last_credit_pull_d",
    "last_fico_range_high",
    "last_fico_range_low",
];

/// Columns dropped for their missing-value rates. A fixed policy decision,
/// independent of what the audit reports.
pub const HIGH_MISSING_DROP: &[&str] = &[
    "mths_since_last_record",
    "mths_since_last_delinq",
    "inq_last_12m",
    "emp_length",
];

/// Categories `purpose` keeps; everything else folds into `other`.
pub static PURPOSE_KEEP: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["debt_consolidation", "credit_card", "home_improvement", "other"]
        .into_iter()
        .collect()
});

/// Feature-vector slots, in output order.
pub const SCALE_COLUMNS: &[&str] = &[
    LOAN_AMNT,
    ANNUAL_INC,
    DTI,
    LOAN_ANNUAL_INCOME_RATIO,
    DELINQUENCY_NOW_PLUS_PAST_2YRS,
    DELINQ_AMNT_PER_ACC,
    FICO_PER_INQUIRIES,
    CR_HISTORY_TO_2015,
];

/// Every source column some step reads or drops.
fn required_columns() -> impl Iterator<Item = &'static str> {
    [
        LOAN_STATUS,
        TERM,
        VERIFICATION_STATUS,
        PURPOSE,
        EARLIEST_CR_LINE,
        DTI,
        LOAN_AMNT,
        ANNUAL_INC,
        ACC_NOW_DELINQ,
        DELINQ_2YRS,
        DELINQ_AMNT,
        AVG_FICO_SCORE,
        INQ_LAST_6MTHS,
    ]
    .into_iter()
    .chain(FIXED_DROP.iter().copied())
    .chain(HIGH_MISSING_DROP.iter().copied())
}

/// Check that every column the pipeline touches is present, listing all the
/// absentees at once rather than failing on the first step that needs one.
pub fn validate_required(schema: &Schema) -> Result<()> {
    let present: HashSet<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    let missing: Vec<&str> = required_columns().filter(|c| !present.contains(c)).collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(
            "input is missing required column(s): {}",
            missing.join(", ")
        ))
    }
}
