use anyhow::Result;

use credhub_auth::{commands, config};

#[tokio::main]
async fn main() -> Result<()> {
    let (config, command) = config::Config::load()?;

    // Initialize logging with a configured level; stdout is reserved for command output
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::debug!(config_dir = %config.config_dir.display(), "Configuration loaded");

    match commands::run(&config, command).await {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(1);
        }
    }
}
