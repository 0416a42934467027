//! Command-line interface for livesub
//!
//! Provides argument parsing using clap derive macros.

use clap::Parser;
use std::path::PathBuf;

/// Live subtitles from streaming speech recognition
#[derive(Parser, Debug)]
#[command(name = "livesub", version, about = "Live subtitles from streaming speech recognition")]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// HTTP listen port
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Recognition language code (e.g. en-US, de-DE)
    #[arg(short, long, value_name = "LANG")]
    pub language: Option<String>,

    /// Streaming recognition backend address (host:port)
    #[arg(long, value_name = "ADDR")]
    pub backend: Option<String>,

    /// Audio input device fingerprint (see /audio_input_device_list)
    #[arg(long, value_name = "HASH")]
    pub device: Option<String>,

    /// Onset threshold: amplitude range that opens the voice gate
    #[arg(long, value_name = "LEVEL")]
    pub onset_volume: Option<i32>,

    /// Release threshold: amplitude range below which a chunk is silence
    #[arg(long, value_name = "LEVEL")]
    pub release_volume: Option<i32>,

    /// Directory of HTML pages served under their stem
    #[arg(long, value_name = "DIR")]
    pub assets: Option<PathBuf>,

    /// Start with the pipeline enabled
    #[arg(long)]
    pub enable: bool,

    /// List usable audio input devices and exit
    #[arg(long)]
    pub list_devices: bool,
}

impl Cli {
    /// Folds the CLI overrides into a loaded configuration.
    pub fn apply_to(&self, config: &mut crate::config::Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(ref language) = self.language {
            config.stt.language = language.clone();
        }
        if let Some(ref backend) = self.backend {
            config.stt.backend_addr = backend.clone();
        }
        if let Some(ref device) = self.device {
            config.audio.device_hash = device.clone();
        }
        if let Some(onset) = self.onset_volume {
            config.gate.onset_volume = onset;
        }
        if let Some(release) = self.release_volume {
            config.gate.release_volume = release;
        }
        if let Some(ref assets) = self.assets {
            config.server.assets_dir = Some(assets.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_defaults_change_nothing() {
        let cli = Cli::parse_from(["livesub"]);
        let mut config = Config::default();
        cli.apply_to(&mut config);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_overrides_applied() {
        let cli = Cli::parse_from([
            "livesub",
            "--port",
            "9999",
            "--language",
            "de-DE",
            "--onset-volume",
            "750",
        ]);
        let mut config = Config::default();
        cli.apply_to(&mut config);

        assert_eq!(config.server.port, 9999);
        assert_eq!(config.stt.language, "de-DE");
        assert_eq!(config.gate.onset_volume, 750);
        assert_eq!(config.gate.release_volume, 5000);
    }

    #[test]
    fn test_enable_flag() {
        let cli = Cli::parse_from(["livesub", "--enable"]);
        assert!(cli.enable);
    }
}
