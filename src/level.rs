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
//! Log severities.
//!
//! [`Level`] carries the five severities of a classic leveled logger, ordered from least to most
//! severe so that "is this record enabled?" is a plain comparison against the minimum level.

type StdResult<T, E> = std::result::Result<T, E>;

/// Record severity, least to most severe.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// debug-level message
    Debug,
    /// informational message
    Info,
    /// warning conditions
    Warn,
    /// error conditions
    Error,
    /// the process is about to exit
    Fatal,
}

impl std::default::Default for Level {
    fn default() -> Self {
        Level::Info
    }
}

impl Level {
    /// Map a configured log mode to the minimum level.
    ///
    /// Only `DEBUG` & `ERROR` are recognized; every other value (including `WARN`, and the empty
    /// string) yields [`Level::Info`]. This is never an error.
    pub fn from_mode(mode: &str) -> Level {
        match mode {
            "DEBUG" => Level::Debug,
            "ERROR" => Level::Error,
            _ => Level::Info,
        }
    }
    /// Lower-case name, as written into JSON records
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
    /// Upper-case name, as written by the human-readable encoder
    pub fn as_capital_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        write!(f, "{}", self.as_capital_str())
    }
}

impl std::convert::From<&tracing::Level> for Level {
    fn from(level: &tracing::Level) -> Self {
        match level {
            &tracing::Level::TRACE | &tracing::Level::DEBUG => Level::Debug,
            &tracing::Level::INFO => Level::Info,
            &tracing::Level::WARN => Level::Warn,
            &tracing::Level::ERROR => Level::Error,
        }
    }
}

#[cfg(test)]
mod level_tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!(Level::from_mode("DEBUG"), Level::Debug);
        assert_eq!(Level::from_mode("ERROR"), Level::Error);
        assert_eq!(Level::from_mode("INFO"), Level::Info);
        assert_eq!(Level::from_mode(""), Level::Info);
        // Case matters, and WARN is not a recognized mode
        assert_eq!(Level::from_mode("debug"), Level::Info);
        assert_eq!(Level::from_mode("WARN"), Level::Info);
    }

    #[test]
    fn test_ordering() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Error < Level::Fatal);
        assert_eq!(format!("{}", Level::Warn), "WARN".to_string());
        assert_eq!(Level::from(&tracing::Level::TRACE), Level::Debug);
    }
}
