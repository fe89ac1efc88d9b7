// Service configuration, merged from `CHROMA_*` environment variables over defaults.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use crate::core_modules::utils::image_helper::OutputFormat;
use crate::error::ConfigError;
use crate::output::{Naming, OutputStore};

pub const ENV_UDP_BIND: &str = "CHROMA_UDP_BIND";
pub const ENV_HTTP_BIND: &str = "CHROMA_HTTP_BIND";
pub const ENV_OUTPUT_DIR: &str = "CHROMA_OUTPUT_DIR";
pub const ENV_OUTPUT_NAMING: &str = "CHROMA_OUTPUT_NAMING";
pub const ENV_OUTPUT_FORMAT: &str = "CHROMA_OUTPUT_FORMAT";
pub const ENV_WORKER_THREADS: &str = "CHROMA_WORKER_THREADS";
pub const ENV_MAX_BODY_BYTES: &str = "CHROMA_MAX_BODY_BYTES";

pub const DEFAULT_UDP_BIND: &str = "0.0.0.0:8081";
pub const DEFAULT_HTTP_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Datagram dispatcher socket.
    pub udp_bind: String,
    /// HTTP front door; `None` disables it.
    pub http_bind: Option<String>,
    pub output_dir: PathBuf,
    pub naming: Naming,
    pub format: OutputFormat,
    /// Tokio worker threads.
    pub worker_threads: usize,
    /// Largest accepted HTTP request body.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            udp_bind: DEFAULT_UDP_BIND.to_string(),
            http_bind: Some(DEFAULT_HTTP_BIND.to_string()),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            naming: Naming::default(),
            format: OutputFormat::default(),
            worker_threads: num_cpus::get().max(1),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds a config from an arbitrary variable source. Unset variables keep
    /// their defaults; set but unparsable ones are an error naming the variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(bind) = lookup(ENV_UDP_BIND) {
            if bind.trim().is_empty() {
                return Err(invalid(ENV_UDP_BIND, &bind, "the datagram listener cannot be disabled"));
            }
            cfg.udp_bind = bind.trim().to_string();
        }
        if let Some(bind) = lookup(ENV_HTTP_BIND) {
            let bind = bind.trim();
            cfg.http_bind = (!bind.is_empty()).then(|| bind.to_string());
        }
        if let Some(dir) = lookup(ENV_OUTPUT_DIR) {
            if dir.trim().is_empty() {
                return Err(invalid(ENV_OUTPUT_DIR, &dir, "must not be empty"));
            }
            cfg.output_dir = PathBuf::from(dir.trim());
        }
        if let Some(naming) = parse_var(&lookup, ENV_OUTPUT_NAMING)? {
            cfg.naming = naming;
        }
        if let Some(format) = parse_var(&lookup, ENV_OUTPUT_FORMAT)? {
            cfg.format = format;
        }
        if let Some(threads) = parse_var::<usize, _>(&lookup, ENV_WORKER_THREADS)? {
            if threads == 0 {
                return Err(invalid(ENV_WORKER_THREADS, "0", "must be at least 1"));
            }
            cfg.worker_threads = threads;
        }
        if let Some(limit) = parse_var::<usize, _>(&lookup, ENV_MAX_BODY_BYTES)? {
            if limit == 0 {
                return Err(invalid(ENV_MAX_BODY_BYTES, "0", "must be at least 1"));
            }
            cfg.max_body_bytes = limit;
        }
        Ok(cfg)
    }

    pub fn output_store(&self) -> OutputStore {
        OutputStore::new(self.output_dir.clone(), self.naming, self.format)
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| invalid(var, &raw, err.to_string())),
    }
}

fn invalid(var: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.into(),
    }
}
