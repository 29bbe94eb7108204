//! Runtime configuration, resolved once at startup and passed into components.

use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::ConfidenceScale;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000";

/// Flags shared by every subcommand, each overridable from the environment.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Base URL of the prediction service
    #[arg(long, global = true, env = "MEDASSIST_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Where the signed-in session is kept
    #[arg(long, global = true, env = "MEDASSIST_SESSION_FILE")]
    pub session_file: Option<PathBuf>,

    /// Scale of the confidence values returned by the service
    #[arg(long, global = true, env = "MEDASSIST_CONFIDENCE_SCALE", value_enum, default_value_t = ConfidenceScale::Auto)]
    pub confidence_scale: ConfidenceScale,

    /// Pause before the chat assistant starts over, in milliseconds
    #[arg(long, global = true, env = "MEDASSIST_RESET_DELAY_MS", default_value_t = 500)]
    pub reset_delay_ms: u64,

    /// Number of chat messages kept in memory
    #[arg(long, global = true, env = "MEDASSIST_CHAT_HISTORY_CAP", default_value_t = 200)]
    pub chat_history_cap: usize,

    /// Directory downloaded reports are written to
    #[arg(long, global = true, env = "MEDASSIST_REPORT_DIR", default_value = ".")]
    pub report_dir: PathBuf,
}

impl ConfigArgs {
    pub fn resolve(self) -> Result<Config> {
        let session_file = match self.session_file {
            Some(path) => path,
            None => default_session_file()?,
        };

        Config::new(
            self.api_url,
            session_file,
            self.confidence_scale,
            Duration::from_millis(self.reset_delay_ms),
            self.chat_history_cap,
            self.report_dir,
        )
    }
}

fn default_session_file() -> Result<PathBuf> {
    let base = dirs::data_dir().context("could not determine a data directory, set MEDASSIST_SESSION_FILE")?;
    Ok(base.join("medassist").join("session.json"))
}

#[derive(Debug, Clone)]
pub struct Config {
    api_url: String,
    session_file: PathBuf,
    confidence_scale: ConfidenceScale,
    reset_delay: Duration,
    chat_history_cap: usize,
    report_dir: PathBuf,
}

impl Config {
    pub fn new(
        api_url: String,
        session_file: PathBuf,
        confidence_scale: ConfidenceScale,
        reset_delay: Duration,
        chat_history_cap: usize,
        report_dir: PathBuf,
    ) -> Result<Self> {
        let api_url = api_url.trim().trim_end_matches('/').to_string();
        let host = api_url
            .strip_prefix("http://")
            .or_else(|| api_url.strip_prefix("https://"));
        match host {
            None => bail!("api url must start with http:// or https://, got {:?}", api_url),
            Some("") => bail!("api url has no host: {:?}", api_url),
            Some(_) => {}
        }
        if chat_history_cap == 0 {
            bail!("chat history cap must be at least 1");
        }

        Ok(Self {
            api_url,
            session_file,
            confidence_scale,
            reset_delay,
            chat_history_cap,
            report_dir,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn session_file(&self) -> &Path {
        &self.session_file
    }

    pub fn confidence_scale(&self) -> ConfidenceScale {
        self.confidence_scale
    }

    pub fn reset_delay(&self) -> Duration {
        self.reset_delay
    }

    pub fn chat_history_cap(&self) -> usize {
        self.chat_history_cap
    }

    pub fn report_dir(&self) -> &Path {
        &self.report_dir
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config::new(
        DEFAULT_API_URL.into(),
        PathBuf::from("session.json"),
        ConfidenceScale::Auto,
        Duration::from_millis(500),
        200,
        PathBuf::from("."),
    )
    .unwrap()
}
