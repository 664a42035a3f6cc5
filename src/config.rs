// Copyright (C) 2022-2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of tracing-fanout.
//
// tracing-fanout is free software: you can redistribute it and/or modify it under the terms of the
// GNU General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// tracing-fanout is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with tracing-fanout.  If
// not, see <http://www.gnu.org/licenses/>.
//! Configuration resolution.
//!
//! Configuration reaches us one of two ways: as an explicit [`LoggerConfig`], or (absent one)
//! through environment variables that map one-to-one onto its fields. Either way, it's resolved
//! exactly once, by [`Settings::resolve`], into a [`Settings`] instance in which every value is
//! defined. Nothing downstream of that consults the environment again.
//!
//! # Examples
//!
//! ```rust
//! use tracing_fanout::config::{LoggerConfig, Settings};
//! use tracing_fanout::level::Level;
//!
//! let cfg = LoggerConfig {
//!     service_name: "billing".to_string(),
//!     log_mode: "DEBUG".to_string(),
//!     file_syncer_disabled: true,
//!     ..LoggerConfig::default()
//! };
//! let settings = Settings::resolve(Some(&cfg));
//! assert_eq!(settings.level, Level::Debug);
//! assert!(settings.file.is_none());
//! ```

use crate::{diag::diag, level::Level};

use chrono::Local;
use serde::{Deserialize, Serialize};

use std::{path::PathBuf, str::FromStr, time::Duration};

/// Socket write timeout, in milliseconds, when none is configured
pub const DEFAULT_SOCKET_TIMEOUT_MS: u64 = 10;
/// Log file size, in megabytes, at which the file is rotated
pub const DEFAULT_FILE_MAX_SIZE_MB: u64 = 10;
/// Rotated log files to retain
pub const DEFAULT_FILE_MAX_BACKUPS: usize = 10;
/// Days to retain rotated log files
pub const DEFAULT_FILE_MAX_AGE_DAYS: u32 = 1;

pub const ENV_SERVICE: &str = "SERVICE";
pub const ENV_MODE: &str = "LOGGER_MODE";
pub const ENV_JSON_ENCODER_DISABLED: &str = "LOGGER_JSON_ENCODER_DISABLED";
pub const ENV_CONSOLE_SYNCER_DISABLED: &str = "LOGGER_CONSOLE_SYNCER_DISABLED";
pub const ENV_FILE_SYNCER_DISABLED: &str = "LOGGER_FILE_SYNCER_DISABLED";
pub const ENV_SOCKET_LOGGING_ENABLED: &str = "LOGGER_SOCKET_LOGGING_ENABLED";
pub const ENV_SOCKET_ADDRESS: &str = "LOGGER_SOCKET_ADDRESS";
pub const ENV_SOCKET_PORT: &str = "LOGGER_SOCKET_PORT";
pub const ENV_SOCKET_TIMEOUT: &str = "LOGGER_SOCKET_TIMEOUT";
pub const ENV_FILE_SYNCER_PATH: &str = "LOGGER_FILE_SYNCER_PATH";
pub const ENV_FILE_SYNCER_MAX_SIZE: &str = "LOGGER_FILE_SYNCER_MAX_SIZE";
pub const ENV_FILE_SYNCER_MAX_BACKUPS: &str = "LOGGER_FILE_SYNCER_MAX_BACKUPS";
pub const ENV_FILE_SYNCER_MAX_AGE: &str = "LOGGER_FILE_SYNCER_MAX_AGE";
pub const ENV_FILE_SYNCER_COMPRESS: &str = "LOGGER_FILE_SYNCER_COMPRESS";

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       struct LoggerConfig                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Caller-facing logger configuration.
///
/// Every field has a default (see [`LoggerConfig::default`]), and the struct deserializes with
/// missing fields defaulted, so hosts may embed it in their own configuration files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Written into every record as `svc`
    pub service_name: String,
    /// `DEBUG`, `ERROR` or anything else (meaning `INFO`)
    pub log_mode: String,
    /// Use the human-readable encoder rather than JSON
    pub json_encoder_disabled: bool,
    /// Don't write records to stdout
    pub console_syncer_disabled: bool,
    /// Don't write records to the rotating log file
    pub file_syncer_disabled: bool,
    /// Also ship records to a remote collector
    pub socket_logging_enabled: bool,
    /// Per-write socket timeout, in milliseconds
    pub socket_timeout_ms: u64,
    /// Collector host; falls back to `LOGGER_SOCKET_ADDRESS`
    pub socket_address: Option<String>,
    /// Collector port; falls back to `LOGGER_SOCKET_PORT`
    pub socket_port: Option<u16>,
    /// Log file path (or a directory in which to place the default file name)
    pub file_syncer_path: Option<PathBuf>,
    /// Megabytes before rotation
    pub file_syncer_max_size: u64,
    /// Rotated files to retain (0 means retain them all)
    pub file_syncer_max_backups: usize,
    /// Days to retain rotated files (0 means no age limit)
    pub file_syncer_max_age: u32,
    /// gzip rotated files
    pub file_syncer_compress: bool,
}

impl std::default::Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            service_name: String::new(),
            log_mode: "INFO".to_string(),
            json_encoder_disabled: false,
            console_syncer_disabled: false,
            file_syncer_disabled: false,
            socket_logging_enabled: false,
            socket_timeout_ms: DEFAULT_SOCKET_TIMEOUT_MS,
            socket_address: None,
            socket_port: None,
            file_syncer_path: None,
            file_syncer_max_size: DEFAULT_FILE_MAX_SIZE_MB,
            file_syncer_max_backups: DEFAULT_FILE_MAX_BACKUPS,
            file_syncer_max_age: DEFAULT_FILE_MAX_AGE_DAYS,
            file_syncer_compress: false,
        }
    }
}

/// Parse a boolean the way Go's `strconv.ParseBool` does.
fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

impl LoggerConfig {
    /// Build a [`LoggerConfig`] from the process environment.
    pub fn from_env() -> LoggerConfig {
        LoggerConfig::from_lookup(|name| std::env::var(name).ok())
    }
    /// Build a [`LoggerConfig`] from an arbitrary variable lookup; absent or unparsable values
    /// take the defaults.
    pub fn from_lookup<F>(lookup: F) -> LoggerConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |name: &str| lookup(name).and_then(|s| parse_bool(&s)).unwrap_or(false);
        fn number<T: FromStr, F: Fn(&str) -> Option<String>>(lookup: &F, name: &str) -> Option<T> {
            lookup(name).and_then(|s| s.trim().parse::<T>().ok())
        }

        let defaults = LoggerConfig::default();
        let socket_timeout_ms = match lookup(ENV_SOCKET_TIMEOUT) {
            Some(text) => text.trim().parse::<u64>().unwrap_or_else(|err| {
                diag!("Failed to get timeout from env: {}", err);
                DEFAULT_SOCKET_TIMEOUT_MS
            }),
            None => DEFAULT_SOCKET_TIMEOUT_MS,
        };
        LoggerConfig {
            service_name: lookup(ENV_SERVICE).unwrap_or_default(),
            log_mode: lookup(ENV_MODE).unwrap_or(defaults.log_mode),
            json_encoder_disabled: flag(ENV_JSON_ENCODER_DISABLED),
            console_syncer_disabled: flag(ENV_CONSOLE_SYNCER_DISABLED),
            file_syncer_disabled: flag(ENV_FILE_SYNCER_DISABLED),
            socket_logging_enabled: flag(ENV_SOCKET_LOGGING_ENABLED),
            socket_timeout_ms,
            socket_address: lookup(ENV_SOCKET_ADDRESS),
            socket_port: number(&lookup, ENV_SOCKET_PORT),
            file_syncer_path: lookup(ENV_FILE_SYNCER_PATH)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            file_syncer_max_size: number(&lookup, ENV_FILE_SYNCER_MAX_SIZE)
                .unwrap_or(defaults.file_syncer_max_size),
            file_syncer_max_backups: number(&lookup, ENV_FILE_SYNCER_MAX_BACKUPS)
                .unwrap_or(defaults.file_syncer_max_backups),
            file_syncer_max_age: number(&lookup, ENV_FILE_SYNCER_MAX_AGE)
                .unwrap_or(defaults.file_syncer_max_age),
            file_syncer_compress: flag(ENV_FILE_SYNCER_COMPRESS),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         struct Settings                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Rotating file parameters
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileSettings {
    pub path: PathBuf,
    pub max_size_mb: u64,
    pub max_backups: usize,
    pub max_age_days: u32,
    pub compress: bool,
}

/// Remote collector parameters
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SocketSettings {
    /// `host:port`, ready for [`std::net::ToSocketAddrs`]
    pub address: String,
    pub timeout: Duration,
}

/// Fully resolved configuration; produced once & shared by every downstream component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub service_name: String,
    pub level: Level,
    pub json: bool,
    pub console: bool,
    pub file: Option<FileSettings>,
    pub socket: Option<SocketSettings>,
}

/// The file name used when none is configured: `logs_YYYY-MM-DD.log`
pub fn default_file_name() -> String {
    format!("logs_{}.log", Local::now().format("%Y-%m-%d"))
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

impl Settings {
    /// Resolve `config`, falling back to the process environment if it's `None`.
    pub fn resolve(config: Option<&LoggerConfig>) -> Settings {
        Settings::resolve_with(config, |name| std::env::var(name).ok())
    }
    /// Resolve `config`, falling back to `lookup` if it's `None`.
    ///
    /// The collector address & port are "environment-first" settings: when the struct leaves
    /// them unset they're read through `lookup` even if a struct was given.
    pub fn resolve_with<F>(config: Option<&LoggerConfig>, lookup: F) -> Settings
    where
        F: Fn(&str) -> Option<String>,
    {
        let from_env;
        let config = match config {
            Some(config) => config,
            None => {
                from_env = LoggerConfig::from_lookup(&lookup);
                &from_env
            }
        };

        let file = if config.file_syncer_disabled {
            None
        } else {
            let path = match &config.file_syncer_path {
                Some(path) if path.is_dir() => path.join(default_file_name()),
                Some(path) => path.clone(),
                None => PathBuf::from("logs").join(default_file_name()),
            };
            Some(FileSettings {
                path,
                max_size_mb: match config.file_syncer_max_size {
                    0 => DEFAULT_FILE_MAX_SIZE_MB,
                    n => n,
                },
                max_backups: config.file_syncer_max_backups,
                max_age_days: config.file_syncer_max_age,
                compress: config.file_syncer_compress,
            })
        };

        let socket = if config.socket_logging_enabled {
            let host = config
                .socket_address
                .clone()
                .or_else(|| lookup(ENV_SOCKET_ADDRESS))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "localhost".to_string());
            let port = config
                .socket_port
                .or_else(|| lookup(ENV_SOCKET_PORT).and_then(|s| s.trim().parse::<u16>().ok()));
            match port {
                Some(port) => Some(SocketSettings {
                    address: join_host_port(&host, port),
                    timeout: Duration::from_millis(match config.socket_timeout_ms {
                        0 => DEFAULT_SOCKET_TIMEOUT_MS,
                        n => n,
                    }),
                }),
                None => {
                    diag!(
                        "socket logging is enabled, but no collector port is configured ({} unset); \
                         socket logging disabled",
                        ENV_SOCKET_PORT
                    );
                    None
                }
            }
        } else {
            None
        };

        Settings {
            service_name: config.service_name.clone(),
            level: Level::from_mode(&config.log_mode),
            json: !config.json_encoder_disabled,
            console: !config.console_syncer_disabled,
            file,
            socket,
        }
    }
}
