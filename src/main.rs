use std::sync::Arc;

use clap::Parser;
use foobartory::config::DEFAULT_INITIAL_ROBOTS;
use foobartory::{Factory, FactoryError, RunReport, SimConfig, StdoutProgress, logging};

#[derive(Parser, Debug)]
#[command(name = "foobartory")]
#[command(about = "Robots mine, assemble and sell until the factory has 30 of them")]
struct Cli {
    /// Speed up the factory by the given factor.
    #[arg(short, long, default_value_t = 1.0)]
    speed: f64,
    /// Robots the factory starts with.
    #[arg(short, long, default_value_t = DEFAULT_INITIAL_ROBOTS)]
    robots: usize,
    /// Seed for reproducible random draws.
    #[arg(long)]
    seed: Option<u64>,
    /// Use multiple times to increase verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn print_summary(report: &RunReport) {
    let cpu_user = report
        .cpu_user_s
        .map(|v| format!("{v:.4}"))
        .unwrap_or_else(|| "NA".to_string());
    let cpu_sys = report
        .cpu_sys_s
        .map(|v| format!("{v:.4}"))
        .unwrap_or_else(|| "NA".to_string());
    println!("RUN SUMMARY");
    println!("robots={}", report.robots);
    println!("account={}", report.account);
    println!(
        "stock foo={} bar={} foobar={}",
        report.foo, report.bar, report.foobar
    );
    println!("elapsed_ms={}", report.elapsed.as_millis());
    println!("cpu_user_s={cpu_user} cpu_sys_s={cpu_sys}");
}

fn run(cli: Cli) -> Result<(), FactoryError> {
    let config = SimConfig {
        speed: cli.speed,
        initial_robots: cli.robots,
        seed: cli.seed,
    };
    let factory = Factory::from_config(&config, Arc::new(StdoutProgress))?;

    println!("[*] Starting factory...");
    let report = factory.run(config.initial_robots)?;
    print_summary(&report);
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    if let Err(err) = run(cli) {
        eprintln!("foobartory: {err}");
        std::process::exit(1);
    }
}
