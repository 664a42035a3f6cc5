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
//! Write destinations.
//!
//! A [`Sink`] is anything that accepts serialized log records as bytes & can be asked to flush
//! them. This module defines the trait along with the console & fan-out implementations; the
//! rotating file lives in [`crate::rotating`] and the socket in [`crate::transport`].
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use tracing_fanout::sink::{Console, MultiSink, Sink};
//!
//! let sink = MultiSink::new(vec![Arc::new(Console::stdout()), Arc::new(Console::stderr())]);
//! assert_eq!(sink.len(), 2);
//! sink.write(b"hello, world\n").unwrap();
//! ```

use std::{
    io::{self, Write},
    sync::Arc,
};

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          trait Sink                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Operations all write destinations must support.
///
/// Both methods take `&self`: a sink is shared between every thread that logs, so each
/// implementation is responsible for serializing access to whatever it wraps.
pub trait Sink: Send + Sync {
    /// Accept one serialized record; on success, the whole of `buf` has been taken.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;
    /// Flush anything buffered beneath us.
    fn sync(&self) -> io::Result<()>;
}

impl<T: Sink + ?Sized> Sink for Arc<T> {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }
    fn sync(&self) -> io::Result<()> {
        (**self).sync()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         struct Console                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// The process's standard output (or error).
#[derive(Clone, Copy, Debug)]
pub struct Console {
    stream: Stream,
}

impl Console {
    pub fn stdout() -> Console {
        Console {
            stream: Stream::Stdout,
        }
    }
    pub fn stderr() -> Console {
        Console {
            stream: Stream::Stderr,
        }
    }
}

impl Sink for Console {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        // Locking for the duration of `write_all` keeps concurrent records from interleaving.
        match self.stream {
            Stream::Stdout => io::stdout().lock().write_all(buf)?,
            Stream::Stderr => io::stderr().lock().write_all(buf)?,
        }
        Ok(buf.len())
    }
    fn sync(&self) -> io::Result<()> {
        match self.stream {
            Stream::Stdout => io::stdout().flush(),
            Stream::Stderr => io::stderr().flush(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        struct MultiSink                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Fan each write out to every child sink, in order.
///
/// Duplication is best-effort: a failing child doesn't keep the remaining children from seeing
/// the record. The write succeeds only if every child accepted it; otherwise the first error
/// encountered is returned once all children have been tried.
#[derive(Clone, Default)]
pub struct MultiSink {
    sinks: Vec<Arc<dyn Sink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Arc<dyn Sink>>) -> MultiSink {
        MultiSink { sinks }
    }
    pub fn push(&mut self, sink: Arc<dyn Sink>) {
        self.sinks.push(sink)
    }
    pub fn len(&self) -> usize {
        self.sinks.len()
    }
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Sink for MultiSink {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(err) = sink.write(buf) {
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(buf.len()),
        }
    }
    fn sync(&self) -> io::Result<()> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(err) = sink.sync() {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
