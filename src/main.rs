use anyhow::Result;
use clap::Parser;
use livesub::audio::{list_input_devices, suppress_audio_warnings};
use livesub::cli::Cli;
use livesub::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("livesub=info")),
        )
        .init();

    let cli = Cli::parse();

    suppress_audio_warnings();

    if cli.list_devices {
        for device in list_input_devices()? {
            println!("{}  {}", device.hash, device.name);
        }
        return Ok(());
    }

    let mut config = match cli.config {
        Some(ref path) => Config::load(path)?,
        None => Config::default(),
    };
    cli.apply_to(&mut config);

    livesub::app::run(config, cli.enable).await?;
    Ok(())
}
