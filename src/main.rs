use anyhow::Result;
use loanprep::{emit, pipeline};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) run the pipeline ─────────────────────────────────────────
    let input = PathBuf::from("data.csv");
    let out_path = PathBuf::from("out").join("model_input.parquet");

    let output = pipeline::run(&input)?;

    // ─── 3) show the head, persist the table ─────────────────────────
    println!("{}", emit::preview(output.batch(), 20)?);
    emit::write_parquet(output.batch(), &out_path)?;

    info!("all done");
    Ok(())
}
