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

//! A structured logging facade that fans one stream of records out to the console, a rotating
//! log file & a remote collector.
//!
//! # Introduction
//!
//! Applications tend to want their logs in several places at once: on `stdout` while developing,
//! in a file on the box for post-mortems, and shipped to a log collector for everything else. This
//! crate combines those destinations behind one leveled, structured logger, configured at start-up
//! from either a [`LoggerConfig`] or the environment.
//!
//! [`LoggerConfig`]: config::LoggerConfig
//!
//! The network destination is the interesting one. Collectors restart; when one does, the next
//! write on our TCP connection fails with a broken pipe. Rather than losing that record (or
//! crashing), the socket transport writes it to a local fallback & asks for the pipeline to be
//! rebuilt. A background thread dials a fresh connection, assembles a new logger around it, and
//! swaps it in atomically; callers never see the failure.
//!
//! # Usage
//!
//! ```no_run
//! use tracing_fanout::fields;
//!
//! // Configure from the environment (`SERVICE`, `LOGGER_MODE`, `LOGGER_SOCKET_PORT` & friends).
//! tracing_fanout::init().unwrap();
//!
//! tracing_fanout::info("order placed", fields!("order" => 1234, "meta" => serde_json::json!({"rush": true})));
//! tracing_fanout::infof("{} items shipped to {}", vec![3.into(), "Bree".into()]);
//! tracing_fanout::sync();
//! ```
//!
//! Values under the keys `ctx` & `meta` are JSON-encoded to strings before they're written, so
//! downstream they appear as a single opaque field.
//!
//! Applications already instrumented with [`tracing`] can route its events through the same
//! pipeline:
//!
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//!
//! ```no_run
//! use tracing_fanout::layer::FanoutLayer;
//! use tracing_subscriber::layer::SubscriberExt; // Needed to get `with()`
//!
//! let subscriber = tracing_subscriber::registry().with(FanoutLayer::default());
//! tracing::subscriber::set_global_default(subscriber).unwrap();
//!
//! tracing::info!(user = "alice", "Hello, world!");
//! ```

pub mod compose;
pub mod config;
mod diag;
pub mod encoder;
pub mod error;
pub mod fields;
pub mod layer;
pub mod level;
pub mod logger;
pub mod registry;
pub mod rotating;
pub mod sink;
#[cfg(test)]
mod test_utils;
pub mod transport;

pub use serde_json;

use config::LoggerConfig;
use registry::{Registry, Writer};

use once_cell::sync::Lazy;
use serde_json::Value;

use std::sync::Arc;

static REGISTRY: Lazy<Arc<Registry>> = Lazy::new(Registry::new);

/// The process-wide [`Registry`] behind the free functions in this crate
pub fn registry() -> Arc<Registry> {
    REGISTRY.clone()
}

/// Initialize logging from the environment. Only the first initialization has any effect.
pub fn init() -> error::Result<()> {
    REGISTRY.init()
}

/// Initialize a logger of kind `kind` ("fanout", or its alias "zap") from `config`, or from the
/// environment if `config` is `None`.
pub fn init_with_config(kind: &str, config: Option<LoggerConfig>) -> error::Result<()> {
    REGISTRY.init_with_config(kind, config)
}

pub fn debug(message: &str, fields: Vec<Value>) {
    REGISTRY.debug(message, fields)
}

pub fn info(message: &str, fields: Vec<Value>) {
    REGISTRY.info(message, fields)
}

/// Log at info, replacing each `{}` in `template` with the next of `args`.
pub fn infof(template: &str, args: Vec<Value>) {
    REGISTRY.infof(template, args)
}

pub fn warn(message: &str, fields: Vec<Value>) {
    REGISTRY.warn(message, fields)
}

pub fn error(message: &str, fields: Vec<Value>) {
    REGISTRY.error(message, fields)
}

/// Log at fatal, flush, & exit the process with status 1.
pub fn fatal(message: &str, fields: Vec<Value>) -> ! {
    REGISTRY.fatal(message, fields)
}

/// An [`std::io::Write`] implementation that logs each write at debug
pub fn writer() -> Writer {
    REGISTRY.writer()
}

/// Flush every destination; failures are reported on stderr.
pub fn sync() {
    REGISTRY.sync()
}
