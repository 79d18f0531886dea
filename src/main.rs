use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use std::io::{self, Write};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use promwatch::agent;
use promwatch::config::{self, DEFAULT_CONFIG_FILE, LogLevel};
use promwatch::prelude::*;
use promwatch::util::logging;

/// Forward Prometheus query results to CloudWatch
#[derive(Parser, Debug)]
#[command(name = "promwatch", version, about)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Test configuration and exit
    #[arg(short = 't', long = "test")]
    test_only: bool,

    /// Override the configured log level
    #[arg(short, long, value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let (config, specs) = match prepare(&args, &mut io::stdout(), &mut io::stderr()) {
        ControlFlow::Continue(loaded) => loaded,
        ControlFlow::Break(status) => return ExitCode::from(status),
    };

    logging::init(args.log_level.as_ref().unwrap_or(&config.log_level));
    info!("promwatch {} starting", promwatch::VERSION);

    match run(config, specs).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Load and validate the configuration, breaking with an exit status on
/// failure or in test mode
fn prepare(
    args: &Args,
    out: &mut impl Write,
    err: &mut impl Write,
) -> ControlFlow<u8, (Configuration, Vec<MetricSpec>)> {
    let loaded = match config::load_and_validate(&args.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            logging::init(args.log_level.as_ref().unwrap_or(&LogLevel::Error));
            let _ = writeln!(err, "Configuration error: {}", e);
            return ControlFlow::Break(1);
        }
    };

    if args.test_only {
        let _ = writeln!(out, "Configuration {} OK", args.config.display());
        return ControlFlow::Break(0);
    }

    ControlFlow::Continue(loaded)
}

async fn run(config: Configuration, specs: Vec<MetricSpec>) -> Result<()> {
    info!("Creating prometheus collector with url: {}", config.prometheus_url);
    let collector = PrometheusCollector::new(
        &config.prometheus_url,
        config.query_timeout_secs.map(Duration::from_secs),
    )
    .context("Failed creating prometheus collector")?;

    info!("Creating CloudWatch client");
    let publisher = CloudWatchPublisher::new(&config.aws_region, config.dimension_name.clone())
        .await
        .context("Failed to get AWS credentials")?;

    let signals = agent::listen().context("Failed to install signal handlers")?;

    let options = AgentOptions::from(&config);
    let stats = Agent::new(specs, Arc::new(collector), publisher, options)
        .run(signals)
        .await?;

    info!("Shut down cleanly after publishing {} batches", stats.published);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::Builder;

    const VALID: &str = r#"
        prometheus_url = "http://prometheus:9090"
        aws_region = "us-east-1"

        [metrics.asg-cpu]
        query = "avg(cpu)"
        asg = "my-asg"
        namespace = "MyApp"
        unit = "Percent"
        interval = 1
    "#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn run_prepare(args: &[&str]) -> (ControlFlow<u8, usize>, String, String) {
        let args = Args::try_parse_from(args).unwrap();
        let mut out = Vec::new();
        let mut err = Vec::new();
        let flow = prepare(&args, &mut out, &mut err).map_continue(|(_, specs)| specs.len());
        (
            flow,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn test_default_arguments() {
        let args = Args::try_parse_from(["promwatch"]).unwrap();
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_FILE));
        assert!(!args.test_only);
        assert_eq!(args.log_level, None);

        let args =
            Args::try_parse_from(["promwatch", "-c", "other.toml", "-t", "-l", "debug"]).unwrap();
        assert_eq!(args.config, PathBuf::from("other.toml"));
        assert!(args.test_only);
        assert_eq!(args.log_level, Some(LogLevel::Debug));

        let args = Args::try_parse_from(["promwatch", "--config", "x.toml", "--test"]).unwrap();
        assert_eq!(args.config, PathBuf::from("x.toml"));
        assert!(args.test_only);
    }

    #[test]
    fn test_validate_only_success() {
        let file = write_config(VALID);
        let path = file.path().to_str().unwrap();

        let (flow, out, err) = run_prepare(&["promwatch", "-c", path, "-t"]);
        assert_eq!(flow, ControlFlow::Break(0));
        assert_eq!(out, format!("Configuration {} OK\n", path));
        assert!(err.is_empty());
    }

    #[test]
    fn test_invalid_configuration_fails() {
        let file = write_config(&VALID.replace("aws_region = \"us-east-1\"", ""));
        let path = file.path().to_str().unwrap();

        for args in [vec!["promwatch", "-c", path, "-t"], vec!["promwatch", "-c", path]] {
            let (flow, out, err) = run_prepare(&args);
            assert_eq!(flow, ControlFlow::Break(1));
            assert!(out.is_empty());
            assert_eq!(err, "Configuration error: aws_region missing\n");
        }
    }

    #[test]
    fn test_missing_file_fails() {
        let (flow, _, err) = run_prepare(&["promwatch", "-c", "/nonexistent/promwatch.toml", "-t"]);
        assert_eq!(flow, ControlFlow::Break(1));
        assert!(err.starts_with("Configuration error: "));
    }

    #[test]
    fn test_valid_configuration_continues() {
        let file = write_config(VALID);
        let path = file.path().to_str().unwrap();

        let (flow, out, err) = run_prepare(&["promwatch", "-c", path]);
        assert_eq!(flow, ControlFlow::Continue(1));
        assert!(out.is_empty());
        assert!(err.is_empty());
    }
}
