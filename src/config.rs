//! Runtime configuration loaded from the environment (and `.env`).

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::invoice::common::get_static_dir;
use crate::render::surface::{template_url, PageFormat};
use crate::render::HandshakeTimeouts;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a non-negative integer, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },
    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
    #[error("invalid template path: {0}")]
    Template(String),
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub bind_host: String,
    pub bind_port: u16,
    pub template: Url,
    pub typst_bin: PathBuf,
    pub timeouts: HandshakeTimeouts,
    pub scratch_dir: PathBuf,
    pub output_dir: PathBuf,
    pub preview_idle: Duration,
    pub public_base_url: String,
    pub page: PageFormat,
}

impl RenderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_host = lookup("BIND_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let bind_port = parse_number(&lookup, "BIND_PORT", 8080u16)?;

        let template_path = lookup("INVOICE_TEMPLATE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| get_static_dir().join("invoice.typ"));
        let template =
            template_url(&template_path).map_err(|e| ConfigError::Template(e.to_string()))?;

        let ready = parse_seconds(&lookup, "READY_TIMEOUT_SECS", 10)?;
        let rendered = parse_seconds(&lookup, "RENDER_TIMEOUT_SECS", 10)?;

        let scratch_dir = lookup("SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| env::temp_dir().join("invoice-previews"));
        let output_dir = lookup("OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./invoices"));

        let preview_idle = parse_seconds(&lookup, "PREVIEW_IDLE_SECS", 1800)?;
        let public_base_url = lookup("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://{}:{}", bind_host, bind_port));

        let defaults = PageFormat::default();
        let page = PageFormat {
            paper: lookup("PAGE_PAPER").unwrap_or(defaults.paper),
            margin: lookup("PAGE_MARGIN").unwrap_or(defaults.margin),
        };

        Ok(Self {
            bind_host,
            bind_port,
            template,
            typst_bin: lookup("TYPST_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("typst")),
            timeouts: HandshakeTimeouts { ready, rendered },
            scratch_dir,
            output_dir,
            preview_idle,
            public_base_url,
            page,
        })
    }
}

fn parse_number<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
    }
}

fn parse_seconds<F>(lookup: &F, name: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs = parse_number(lookup, name, default)?;
    if secs == 0 {
        return Err(ConfigError::Zero { name });
    }
    Ok(Duration::from_secs(secs))
}
