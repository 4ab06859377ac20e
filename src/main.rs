use clap::Parser;
use hmilink::daemon::RunOptions;
use hmilink::schema::validate::{validate, ValidationResult};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// hmilink: configuration and live-state client for LinuxCNC HMI pendants
#[derive(Parser)]
#[command(name = "hmilink", version, about)]
struct Cli {
    /// Path to the client settings file (TOML).
    #[arg(short, long, default_value = "/etc/hmilink/config.toml")]
    config: PathBuf,

    /// Enable JSON log output (for journald).
    #[arg(long)]
    json: bool,

    /// Validate client settings and exit.
    #[arg(long)]
    check: bool,

    /// Fetch the device configuration over HTTP, print it and exit.
    #[arg(long)]
    dump: bool,

    /// Validate a configuration payload file (JSON) and exit.
    #[arg(long, value_name = "FILE")]
    validate: Option<PathBuf>,

    /// Watch a configuration payload file (JSON) and save every change.
    #[arg(long, value_name = "FILE")]
    edits: Option<PathBuf>,

    /// Approve sensitive action changes without asking.
    #[arg(long)]
    yes: bool,

    /// Ask the device to restore factory defaults once connected.
    #[arg(long)]
    reset_defaults: bool,

    /// Ask the device to run its factory self-test once connected.
    #[arg(long)]
    factory_test: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Init tracing.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hmilink=info"));

    if cli.json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt().with_env_filter(filter).init();
    }

    // Payload validation needs no settings file.
    if let Some(path) = &cli.validate {
        let payload = hmilink::config::read_payload(path)?;
        match validate(&payload) {
            ValidationResult::Valid => {
                println!("{}: valid", path.display());
                return Ok(());
            }
            ValidationResult::Invalid(errors) => {
                for e in &errors {
                    println!("{e}");
                }
                anyhow::bail!("{}: {} validation error(s)", path.display(), errors.len());
            }
        }
    }

    info!("hmilink v{}", env!("CARGO_PKG_VERSION"));

    // Load settings.
    let config_path = cli
        .config
        .canonicalize()
        .unwrap_or_else(|_| cli.config.clone());
    let config = hmilink::config::load(&config_path)?;

    if cli.check {
        println!(
            "config OK: device {}, reconnect every {} ms, schema v{}",
            config.device.url, config.device.reconnect_interval_ms, config.device.schema_version,
        );
        return Ok(());
    }

    if cli.dump {
        let payload = hmilink::http::fetch_config(&config.device.http_base()).await?;
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    let options = RunOptions {
        edits: cli.edits,
        auto_confirm: cli.yes,
        reset_defaults: cli.reset_defaults,
        factory_test: cli.factory_test,
    };

    // Run the client.
    hmilink::daemon::run(config, options).await?;

    Ok(())
}
