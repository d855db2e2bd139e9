use clap::Parser;
use colored::Colorize;
use evm_transfer_bench::abi::format_base_units;
use evm_transfer_bench::cli::Cli;
use evm_transfer_bench::driver::{run_sweep, RunReport};
use evm_transfer_bench::fixtures::Fixtures;
use reth_tracing::tracing::info;
use reth_tracing::{RethTracer, Tracer};

fn main() -> eyre::Result<()> {
    let _guard = RethTracer::new().init()?;

    let cli = Cli::parse();
    let configs = cli.run_configs()?;
    info!(target: "bench", runs = configs.len(), "starting sweep");

    let reports = run_sweep(&configs, &Fixtures::default());

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            print_report(report);
        }
        print_summary(&reports);
    }

    let failed = reports.iter().filter(|report| !report.succeeded()).count();
    if failed > 0 {
        eyre::bail!("{failed} of {} runs failed", reports.len());
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    let status = if report.succeeded() { "DONE".green().bold() } else { "FAILED".red().bold() };
    println!();
    println!("{} [{}] chain {} {}", report.name.bold(), report.backend, report.chain_id, status);

    if let Some(token) = report.token {
        let gas = report.deploy_gas.unwrap_or_default();
        println!("  token        {token} (deploy gas {gas})");
    }
    if report.batched {
        println!("  mode         batched through helper");
    }
    println!("  transfers    {}/{}", report.transfers_completed, report.transfers_requested);

    if let Some(stats) = &report.stats {
        println!("  loop         {:.3} ms", stats.duration.as_secs_f64() * 1e3);
        println!("  throughput   {}", format!("{:.0} transfers/s", stats.throughput).cyan().bold());
        println!("  per transfer {:.2} us", stats.avg_per_transfer.as_secs_f64() * 1e6);
        println!("  gas used     {}", stats.gas_used);
    }

    for entry in &report.balances {
        println!("  balance      {} {}", entry.account, format_base_units(entry.balance));
    }

    if let Some(failure) = &report.failure {
        let at = match failure.transfer_index {
            Some(index) => format!(" at transfer {index}"),
            None => String::new(),
        };
        println!("  {} in {}{at}: {}", "error".red(), failure.phase, failure.error);
    }
}

fn print_summary(reports: &[RunReport]) {
    println!();
    println!("{}", "Summary".bold());
    for report in reports {
        let throughput = report
            .stats
            .as_ref()
            .filter(|_| report.succeeded())
            .map(|stats| format!("{:>12.0} tx/s", stats.throughput))
            .unwrap_or_else(|| format!("{:>17}", "-"));
        println!("  {:<32} {:<9} {throughput}", report.name, report.backend.to_string());
    }
}
