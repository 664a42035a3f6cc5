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
//! Test helpers: sinks that remember what they were given & connections that fail on cue.

use crate::{
    sink::Sink,
    transport::{Connection, Connector},
};

use parking_lot::Mutex;

use std::{
    collections::VecDeque,
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

/// A [`Sink`] that accumulates everything written to it.
#[derive(Default)]
pub struct CollectingSink {
    buf: Mutex<Vec<u8>>,
    syncs: AtomicUsize,
}

impl CollectingSink {
    pub fn contents(&self) -> Vec<u8> {
        self.buf.lock().clone()
    }
    pub fn text(&self) -> String {
        String::from_utf8(self.contents()).unwrap()
    }
    /// Each newline-terminated record, in order
    pub fn lines(&self) -> Vec<String> {
        self.text().lines().map(|s| s.to_string()).collect()
    }
    pub fn syncs(&self) -> usize {
        self.syncs.load(Ordering::SeqCst)
    }
}

impl Sink for CollectingSink {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.buf.lock().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn sync(&self) -> io::Result<()> {
        self.syncs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A [`Sink`] that refuses everything.
pub struct FailingSink;

impl Sink for FailingSink {
    fn write(&self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::other("refused"))
    }
    fn sync(&self) -> io::Result<()> {
        Err(io::Error::other("refused"))
    }
}

/// How a scripted connection behaves on write
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Script {
    /// Accept every write
    Healthy,
    /// Fail every write with `EPIPE`
    BrokenPipe,
    /// Fail every write as though the deadline passed
    TimedOut,
    /// Refuse to connect at all
    Refuse,
}

struct ScriptedConnection {
    script: Script,
    received: Arc<Mutex<Vec<u8>>>,
}

impl Connection for ScriptedConnection {
    fn set_write_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self.script {
            Script::BrokenPipe => Err(io::Error::from(io::ErrorKind::BrokenPipe)),
            Script::TimedOut => Err(io::Error::from(io::ErrorKind::WouldBlock)),
            _ => {
                self.received.lock().extend_from_slice(buf);
                Ok(())
            }
        }
    }
}

/// A [`Connector`] whose successive connections follow a script; once the script runs out,
/// connections are [`Script::Healthy`].
#[derive(Default)]
pub struct ScriptedConnector {
    script: Mutex<VecDeque<Script>>,
    connects: AtomicUsize,
    received: Arc<Mutex<Vec<u8>>>,
    delay: Option<Duration>,
}

impl ScriptedConnector {
    pub fn new(script: &[Script]) -> ScriptedConnector {
        ScriptedConnector {
            script: Mutex::new(script.iter().copied().collect()),
            ..Default::default()
        }
    }
    /// Sleep for `delay` before each connection attempt resolves
    pub fn with_delay(mut self, delay: Duration) -> ScriptedConnector {
        self.delay = Some(delay);
        self
    }
    /// Number of connection attempts so far
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
    /// Everything successfully written, across all connections
    pub fn received(&self) -> String {
        String::from_utf8(self.received.lock().clone()).unwrap()
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self) -> io::Result<Box<dyn Connection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let script = self.script.lock().pop_front().unwrap_or(Script::Healthy);
        match script {
            Script::Refuse => Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
            script => Ok(Box::new(ScriptedConnection {
                script,
                received: self.received.clone(),
            })),
        }
    }
    fn address(&self) -> String {
        "scripted".to_string()
    }
}
