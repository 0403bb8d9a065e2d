use clap::Parser;
use std::path::PathBuf;

use crate::config;

#[derive(Parser, Debug)]
#[command(name = "whep-player")]
#[command(version = "0.1.0")]
#[command(about = "WHEP playback client", long_about = None)]
pub struct Args {
    /// Stream path under the WHEP server base URL
    pub stream_path: Option<String>,

    /// Configuration file path
    #[arg(short, long, default_value = "/etc/whep-player.toml")]
    pub config: PathBuf,

    /// WHEP server base URL
    #[arg(short = 'u', long)]
    pub base_url: Option<String>,

    /// Basic auth username
    #[arg(long)]
    pub username: Option<String>,

    /// Basic auth password
    #[arg(long)]
    pub password: Option<String>,

    /// Maximum reconnect attempts per play request
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Delay in milliseconds before a scheduled reconnect
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn load_config(&self) -> Result<config::Config, Box<dyn std::error::Error>> {
        let mut config = config::Config::load(&self.config)?;
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut config::Config) {
        if let Some(ref path) = self.stream_path {
            config.target.stream_path = path.clone();
        }
        if let Some(ref url) = self.base_url {
            config.target.base_url = url.clone();
        }
        if let Some(ref user) = self.username {
            config.target.username = Some(user.clone());
        }
        if let Some(ref password) = self.password {
            config.target.password = Some(password.clone());
        }
        if let Some(max_retries) = self.max_retries {
            config.retry.max_retries = max_retries;
        }
        if let Some(delay) = self.retry_delay_ms {
            config.retry.retry_delay_ms = delay;
        }
        match self.verbose {
            0 => {}
            1 => config.logging.level = "debug".to_string(),
            _ => config.logging.level = "trace".to_string(),
        }
    }
}
