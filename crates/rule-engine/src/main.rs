//! 规则引擎命令行入口

use clap::Parser;
use eligibility_shared::config::AppConfig;
use eligibility_shared::observability;
use rule_engine::cli::{Cli, CommandRunner};

const SERVICE_NAME: &str = "rule-engine";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(SERVICE_NAME).unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig {
            service_name: SERVICE_NAME.to_string(),
            ..AppConfig::default()
        }
    });
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }

    observability::init(&config.service_name, &config.observability)?;

    let result = CommandRunner::new(config).run(cli.command).await;

    if cli.metrics {
        match observability::metrics::render() {
            Some(snapshot) => eprint!("{}", snapshot),
            None => eprintln!("metrics disabled (observability.metrics_enabled = false)"),
        }
    }
    result
}
