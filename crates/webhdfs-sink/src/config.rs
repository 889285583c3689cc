// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::ConfigError;
use crate::framing::{
    Compression, Framing, SnappyFormat, DEFAULT_SNAPPY_BUFSIZE, MAX_SNAPPY_BUFSIZE,
};

pub const DEFAULT_PORT: u16 = 50070;
pub const DEFAULT_FLUSH_SIZE: usize = 500;
pub const DEFAULT_IDLE_FLUSH_TIME_SECS: f64 = 1.0;
pub const DEFAULT_TIMEOUT_SECS: f64 = 30.0;
pub const DEFAULT_RETRY_INTERVAL_SECS: f64 = 0.5;
pub const DEFAULT_RETRY_TIMES: u32 = 5;

/// Settings for one sink instance. Built once at startup and shared
/// read-only afterwards.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Namenode (or HttpFS gateway) host
    pub host: String,
    pub port: u16,
    /// Value sent as `user.name` on every request
    pub user: String,
    /// Destination path template, e.g. `/user/logstash/dt=%{+YYYY-MM-dd}/%{host}.log`
    pub path: String,
    /// Optional `%{field}` format for each record; JSON lines when unset
    pub message_format: Option<String>,
    /// Seconds without a flush before buffered records are written
    pub idle_flush_time: f64,
    /// Number of buffered records that forces a flush
    pub flush_size: usize,
    pub open_timeout: f64,
    pub read_timeout: f64,
    /// Talk to an HttpFS gateway (single request per write) instead of WebHDFS
    pub use_httpfs: bool,
    pub use_ssl: bool,
    pub https_proxy: Option<String>,
    /// When false a failed write is not retried
    pub retry_known_errors: bool,
    pub retry_interval: f64,
    pub retry_times: u32,
    pub compression: Compression,
    pub snappy_bufsize: usize,
    pub snappy_format: SnappyFormat,
    pub remove_at_timestamp: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            user: String::new(),
            path: String::new(),
            message_format: None,
            idle_flush_time: DEFAULT_IDLE_FLUSH_TIME_SECS,
            flush_size: DEFAULT_FLUSH_SIZE,
            open_timeout: DEFAULT_TIMEOUT_SECS,
            read_timeout: DEFAULT_TIMEOUT_SECS,
            use_httpfs: false,
            use_ssl: false,
            https_proxy: None,
            retry_known_errors: true,
            retry_interval: DEFAULT_RETRY_INTERVAL_SECS,
            retry_times: DEFAULT_RETRY_TIMES,
            compression: Compression::None,
            snappy_bufsize: DEFAULT_SNAPPY_BUFSIZE,
            snappy_format: SnappyFormat::Stream,
            remove_at_timestamp: true,
        }
    }
}

impl SinkConfig {
    /// Create configuration from `WEBHDFS_*` environment variables.
    ///
    /// `WEBHDFS_SERVER=host:port` is accepted as a shorthand for
    /// `WEBHDFS_HOST` and `WEBHDFS_PORT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let (mut host, mut port) = (defaults.host, defaults.port);
        if let Ok(server) = env::var("WEBHDFS_SERVER") {
            (host, port) = parse_server(&server)?;
        }
        if let Ok(value) = env::var("WEBHDFS_HOST") {
            host = value;
        }
        if let Some(value) = parse_var("WEBHDFS_PORT")? {
            port = value;
        }

        let config = Self {
            host,
            port,
            user: env::var("WEBHDFS_USER").unwrap_or_default(),
            path: env::var("WEBHDFS_PATH").unwrap_or_default(),
            message_format: env::var("WEBHDFS_MESSAGE_FORMAT").ok(),
            idle_flush_time: parse_var("WEBHDFS_IDLE_FLUSH_TIME")?
                .unwrap_or(defaults.idle_flush_time),
            flush_size: parse_var("WEBHDFS_FLUSH_SIZE")?.unwrap_or(defaults.flush_size),
            open_timeout: parse_var("WEBHDFS_OPEN_TIMEOUT")?.unwrap_or(defaults.open_timeout),
            read_timeout: parse_var("WEBHDFS_READ_TIMEOUT")?.unwrap_or(defaults.read_timeout),
            use_httpfs: parse_bool_var("WEBHDFS_USE_HTTPFS")?.unwrap_or(defaults.use_httpfs),
            use_ssl: parse_bool_var("WEBHDFS_USE_SSL")?.unwrap_or(defaults.use_ssl),
            https_proxy: env::var("WEBHDFS_PROXY_HTTPS")
                .or_else(|_| env::var("HTTPS_PROXY"))
                .ok(),
            retry_known_errors: parse_bool_var("WEBHDFS_RETRY_KNOWN_ERRORS")?
                .unwrap_or(defaults.retry_known_errors),
            retry_interval: parse_var("WEBHDFS_RETRY_INTERVAL")?
                .unwrap_or(defaults.retry_interval),
            retry_times: parse_var("WEBHDFS_RETRY_TIMES")?.unwrap_or(defaults.retry_times),
            compression: parse_var("WEBHDFS_COMPRESSION")?.unwrap_or(defaults.compression),
            snappy_bufsize: parse_var("WEBHDFS_SNAPPY_BUFSIZE")?
                .unwrap_or(defaults.snappy_bufsize),
            snappy_format: parse_var("WEBHDFS_SNAPPY_FORMAT")?.unwrap_or(defaults.snappy_format),
            remove_at_timestamp: parse_bool_var("WEBHDFS_REMOVE_AT_TIMESTAMP")?
                .unwrap_or(defaults.remove_at_timestamp),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Missing("host"));
        }
        if self.user.trim().is_empty() {
            return Err(ConfigError::Missing("user"));
        }
        if self.path.trim().is_empty() {
            return Err(ConfigError::Missing("path"));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid(
                "port must be greater than 0".to_string(),
            ));
        }
        if self.flush_size == 0 {
            return Err(ConfigError::Invalid(
                "flush_size must be greater than 0".to_string(),
            ));
        }
        for (name, secs) in [
            ("idle_flush_time", self.idle_flush_time),
            ("open_timeout", self.open_timeout),
            ("read_timeout", self.read_timeout),
        ] {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a positive number of seconds, got {secs}"
                )));
            }
        }
        if !self.retry_interval.is_finite() || self.retry_interval < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "retry_interval must not be negative, got {}",
                self.retry_interval
            )));
        }
        if self.retry_times == 0 {
            return Err(ConfigError::Invalid(
                "retry_times must be at least 1".to_string(),
            ));
        }
        if self.snappy_bufsize == 0 || self.snappy_bufsize > MAX_SNAPPY_BUFSIZE {
            return Err(ConfigError::Invalid(format!(
                "snappy_bufsize must be between 1 and {MAX_SNAPPY_BUFSIZE}, got {}",
                self.snappy_bufsize
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn framing(&self) -> Framing {
        Framing::new(self.compression, self.snappy_format, self.snappy_bufsize)
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn idle_flush_interval(&self) -> Duration {
        secs(self.idle_flush_time)
    }

    #[must_use]
    pub fn open_timeout_duration(&self) -> Duration {
        secs(self.open_timeout)
    }

    #[must_use]
    pub fn read_timeout_duration(&self) -> Duration {
        secs(self.read_timeout)
    }

    #[must_use]
    pub fn retry_interval_duration(&self) -> Duration {
        secs(self.retry_interval)
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

fn parse_server(server: &str) -> Result<(String, u16), ConfigError> {
    match server.trim().rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|_| {
                ConfigError::Invalid(format!("Invalid port in server '{server}'"))
            })?;
            Ok((host.to_string(), port))
        }
        None => Ok((server.trim().to_string(), DEFAULT_PORT)),
    }
}

fn parse_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(format!("{name} has an invalid value '{raw}'"))),
        Err(_) => Ok(None),
    }
}

fn parse_bool_var(name: &'static str) -> Result<Option<bool>, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            _ => Err(ConfigError::Invalid(format!(
                "{name} must be true or false, got '{raw}'"
            ))),
        },
        Err(_) => Ok(None),
    }
}
