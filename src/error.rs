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
//! [tracing-fanout](crate) errors

use backtrace::Backtrace;

/// [tracing-fanout](crate) error type
///
/// This crate eschews libraries like [thiserror] & [anyhow] in favor
/// of a straightforward enumeration with a few match arms chosen on the basis of what the caller
/// will need to respond.
///
/// Most failures inside a logging pipeline are *not* surfaced through this type at all: they
/// are either absorbed (configuration defaults), reported to local diagnostics (connect,
/// deadline & hostname failures) or recovered (broken pipes). What remains is what a caller can
/// actually act upon.
///
/// [thiserror]: https://docs.rs/thiserror
/// [anyhow]: https://docs.rs/anyhow
#[non_exhaustive]
pub enum Error {
    /// The logger kind named at initialization is not one we know how to build
    UnknownLoggerKind { kind: String, back: Backtrace },
    /// Failed to open a connection to the remote log collector
    Connect {
        addr: String,
        source: std::io::Error,
        back: Backtrace,
    },
    /// Failed to serialize a record
    Encode {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
}

impl std::fmt::Display for Error {
    // `Error` is non-exhaustive so that adding variants won't be a breaking change to our
    // callers. That means the compiler won't catch us if we miss a variant here, so we
    // always include a `_` arm.
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::UnknownLoggerKind { kind, .. } => write!(f, "Invalid logger type: {}", kind),
            Error::Connect { addr, source, .. } => {
                write!(f, "Failed to connect to log collector at {}: {}", addr, source)
            }
            Error::Encode { source, .. } => write!(f, "Failed to encode log record: {}", source),
            _ => write!(f, "Other tracing-fanout error"),
        }
    }
}

impl std::fmt::Debug for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::UnknownLoggerKind { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::Connect { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::Encode { back, .. } => write!(f, "{}\n{:?}", self, back),
            err => write!(f, "tracing-fanout error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    #[allow(unreachable_patterns)]
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connect { source, .. } => Some(source),
            Error::Encode { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
