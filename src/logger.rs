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

//! The leveled logging engine.
//!
//! A [`Core`] binds an [`Encoder`], a [`Sink`] & a minimum [`Level`]. A [`Logger`] tees every
//! record out to its cores, attaching its context fields (`svc` & `host`) along the way.
//! Loggers are immutable once built: reconfiguration means building a new one (see
//! [`crate::registry`]).
//!
//! Failures inside a logger (a record that won't encode, a sink that won't take it, a
//! malformed key/value list) are never returned to the caller; they're written to the
//! logger's error output, stderr by default.

use crate::{
    encoder::{format_timestamp, Encoder, Record},
    level::Level,
    sink::{Console, Sink},
    transport::SocketTransport,
};

use backtrace::Backtrace;
use chrono::Local;
use serde_json::Value;

use std::{io, sync::Arc};

/// The field carrying a stack trace on records at or above a logger's stack trace level
pub const STACKTRACE_KEY: &str = "stacktrace";

/// An encoder, a destination & a threshold
pub struct Core {
    encoder: Box<dyn Encoder>,
    sink: Arc<dyn Sink>,
    level: Level,
}

impl Core {
    pub fn new(encoder: Box<dyn Encoder>, sink: Arc<dyn Sink>, level: Level) -> Core {
        Core {
            encoder,
            sink,
            level,
        }
    }
    pub fn enabled(&self, level: Level) -> bool {
        level >= self.level
    }
    pub fn level(&self) -> Level {
        self.level
    }
    pub fn sink(&self) -> &Arc<dyn Sink> {
        &self.sink
    }
}

/// Render `template`, replacing each `{}` with the next of `args` (strings unquoted). Any
/// arguments left over are appended, space-separated.
pub fn render_template(template: &str, args: &[Value]) -> String {
    fn text(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut rest = template;
    while let Some(i) = rest.find("{}") {
        out.push_str(&rest[..i]);
        match args.next() {
            Some(arg) => out.push_str(&text(arg)),
            None => out.push_str("{}"),
        }
        rest = &rest[i + 2..];
    }
    out.push_str(rest);
    for arg in args {
        out.push(' ');
        out.push_str(&text(arg));
    }
    out
}

/// A tee of [`Core`]s sharing one set of context fields
pub struct Logger {
    cores: Vec<Core>,
    context: Vec<(String, Value)>,
    error_output: Arc<dyn Sink>,
    transport: Option<Arc<SocketTransport>>,
    stacktrace_level: Option<Level>,
}

impl Logger {
    pub fn new(cores: Vec<Core>, context: Vec<(String, Value)>) -> Logger {
        Logger {
            cores,
            context,
            error_output: Arc::new(Console::stderr()),
            transport: None,
            stacktrace_level: Some(Level::Error),
        }
    }
    /// Attach a stack trace to records at `level` & above (`None` to never attach one). The
    /// default is [`Level::Error`].
    pub fn with_stacktrace(mut self, level: Option<Level>) -> Logger {
        self.stacktrace_level = level;
        self
    }
    /// Report internal failures to `sink` rather than stderr.
    pub fn with_error_output(mut self, sink: Arc<dyn Sink>) -> Logger {
        self.error_output = sink;
        self
    }
    /// Note the socket transport one of our cores writes to.
    pub fn with_transport(mut self, transport: Arc<SocketTransport>) -> Logger {
        self.transport = Some(transport);
        self
    }
    /// Identifier of our socket transport, if we have one
    pub fn transport_id(&self) -> Option<u64> {
        self.transport.as_ref().map(|t| t.id())
    }
    pub fn cores(&self) -> &[Core] {
        &self.cores
    }
    pub fn context(&self) -> &[(String, Value)] {
        &self.context
    }
    pub fn enabled(&self, level: Level) -> bool {
        self.cores.iter().any(|core| core.enabled(level))
    }

    fn report(&self, text: std::fmt::Arguments<'_>) {
        let line = format!("{} {}\n", format_timestamp(&Local::now()), text);
        let _ = self.error_output.write(line.as_bytes());
    }

    /// Pair up `fields`, dropping (& reporting) anything that isn't a string-keyed pair.
    fn pairs<'a>(&self, fields: &'a [Value]) -> Vec<(&'a str, &'a Value)> {
        let mut pairs = Vec::with_capacity(fields.len() / 2);
        let mut chunks = fields.chunks_exact(2);
        for pair in &mut chunks {
            match &pair[0] {
                Value::String(key) => pairs.push((key.as_str(), &pair[1])),
                key => self.report(format_args!(
                    "Ignored key-value pair with non-string key: {}",
                    key
                )),
            }
        }
        if let [dangling] = chunks.remainder() {
            self.report(format_args!("Ignored key without a value: {}", dangling));
        }
        pairs
    }

    /// Emit one record at `level`.
    pub fn log(&self, level: Level, message: &str, fields: &[Value]) {
        if !self.enabled(level) {
            return;
        }
        let trace = match self.stacktrace_level {
            Some(min) if level >= min => Some(Value::String(format!("{:?}", Backtrace::new()))),
            _ => None,
        };
        let mut pairs = self.pairs(fields);
        if let Some(trace) = &trace {
            pairs.push((STACKTRACE_KEY, trace));
        }
        let record = Record {
            level,
            time: Local::now(),
            message,
            context: &self.context,
            fields: &pairs,
        };
        for core in self.cores.iter().filter(|core| core.enabled(level)) {
            match core.encoder.encode(&record) {
                Ok(buf) => {
                    if let Err(err) = core.sink.write(&buf) {
                        self.report(format_args!("write error: {}", err));
                    }
                }
                Err(err) => self.report(format_args!("encode error: {}", err)),
            }
        }
    }

    pub fn debug(&self, message: &str, fields: &[Value]) {
        self.log(Level::Debug, message, fields)
    }
    pub fn info(&self, message: &str, fields: &[Value]) {
        self.log(Level::Info, message, fields)
    }
    /// Log at info, formatting `template` with `args` (see [`render_template`]).
    pub fn infof(&self, template: &str, args: &[Value]) {
        if self.enabled(Level::Info) {
            self.log(Level::Info, &render_template(template, args), &[])
        }
    }
    pub fn warn(&self, message: &str, fields: &[Value]) {
        self.log(Level::Warn, message, fields)
    }
    pub fn error(&self, message: &str, fields: &[Value]) {
        self.log(Level::Error, message, fields)
    }
    /// Log at fatal, flush, and exit the process with status 1.
    pub fn fatal(&self, message: &str, fields: &[Value]) -> ! {
        self.log(Level::Fatal, message, fields);
        if let Err(err) = self.sync() {
            self.report(format_args!("sync error: {}", err));
        }
        std::process::exit(1)
    }

    /// Flush every core's sink. Every sink is flushed even if an earlier one fails; the first
    /// failure is returned.
    pub fn sync(&self) -> io::Result<()> {
        let mut first_err = None;
        for core in &self.cores {
            if let Err(err) = core.sink.sync() {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("cores", &self.cores.len())
            .field("context", &self.context)
            .field("transport", &self.transport)
            .finish()
    }
}
