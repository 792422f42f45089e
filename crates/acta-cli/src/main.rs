use anyhow::Result;
use clap::Parser;

/// Reconcile the authoritative activity database into the per-program
/// collaboration sheets. One unparameterized pass per invocation.
#[derive(Debug, Parser)]
#[command(name = "acta", version)]
#[command(about = "Sync project activity records into program sheets")]
struct Cli {}

#[tokio::main]
async fn main() -> Result<()> {
    let _cli = Cli::parse();

    let summary = acta_sync::run_sync_once_from_env().await?;
    println!(
        "sync complete: run_id={} programs={} changed={}",
        summary.run_id,
        summary.programs,
        summary.reports.len()
    );

    Ok(())
}
