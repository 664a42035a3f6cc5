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

//! The remote-collector transport.
//!
//! [`SocketTransport`] owns exactly one stream connection to a log collector & presents it as a
//! [`Sink`]. Each write is bounded by a timeout. When the collector goes away (the write fails
//! with a broken pipe) the record is written to a local fallback sink instead, the caller is told
//! the write succeeded, and a [`TransportEvent::ConnectionLost`] is sent to whoever is
//! responsible for rebuilding the pipeline (in practice, the [`Registry`]'s reconciler). Every
//! other failure is returned to the caller untouched.
//!
//! Connections are abstracted behind the [`Connection`] & [`Connector`] traits; the TCP
//! implementations are what the registry uses by default.
//!
//! # Examples
//!
//! ```rust
//! use std::{sync::Arc, time::Duration};
//! use tracing_fanout::sink::Console;
//! use tracing_fanout::transport::{SocketTransport, TcpConnector};
//!
//! let (tx, _rx) = crossbeam_channel::unbounded();
//! let transpo = SocketTransport::connect(
//!     &TcpConnector::new("i.am.not.there.invalid:5170"),
//!     Duration::from_millis(10),
//!     Arc::new(Console::stdout()),
//!     tx,
//! );
//! assert!(transpo.is_err()); // no such host, after all
//! ```
//!
//! [`Registry`]: crate::registry::Registry

use crate::{
    diag::diag,
    error::{Error, Result},
    sink::Sink,
};

use backtrace::Backtrace;
use crossbeam_channel::Sender;
use parking_lot::Mutex;

use std::{
    io::{self, Write},
    net::{TcpStream, ToSocketAddrs},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      connection mechanisms                                     //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Operations a live connection to a collector must support.
pub trait Connection: Send {
    /// Bound the time the next write may block.
    fn set_write_timeout(&mut self, timeout: Duration) -> io::Result<()>;
    /// Write the entirety of `buf`.
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
}

impl Connection for TcpStream {
    fn set_write_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        // A zero duration is rejected by the OS layer (as `InvalidInput`), which is exactly the
        // "couldn't set the deadline" case our caller reports & then ignores.
        TcpStream::set_write_timeout(self, Some(timeout))
    }
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        Write::write_all(self, buf)?;
        self.flush()
    }
}

/// Something that knows how to open a [`Connection`].
pub trait Connector: Send + Sync {
    fn connect(&self) -> io::Result<Box<dyn Connection>>;
    /// Where we're connecting to, for diagnostics
    fn address(&self) -> String;
}

/// How long [`TcpConnector`] waits for each candidate address to accept, by default
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Open TCP connections to `host:port`.
#[derive(Clone, Debug)]
pub struct TcpConnector {
    address: String,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new<S: Into<String>>(address: S) -> TcpConnector {
        TcpConnector {
            address: address.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
    /// Give up on each resolved address after `timeout`
    pub fn with_connect_timeout(mut self, timeout: Duration) -> TcpConnector {
        self.connect_timeout = timeout;
        self
    }
}

impl Connector for TcpConnector {
    /// Try each address `host:port` resolves to, in turn, returning the first connection made
    /// or the last error seen.
    fn connect(&self) -> io::Result<Box<dyn Connection>> {
        let mut last_err = None;
        for addr in self.address.as_str().to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => return Ok(Box::new(stream)),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} resolved to no addresses", self.address),
            )
        }))
    }
    fn address(&self) -> String {
        self.address.clone()
    }
}

/// `true` if `err` means the remote end has closed the connection
pub fn is_broken_pipe(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::BrokenPipe
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      struct SocketTransport                                    //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Signals from a transport to the pipeline's owner
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// The collector closed the connection underlying transport `transport_id`; the pipeline
    /// should be rebuilt around a fresh one.
    ConnectionLost { transport_id: u64 },
}

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

/// A [`Sink`] writing to a remote collector, with local fallback on broken pipes.
pub struct SocketTransport {
    id: u64,
    address: String,
    timeout: Duration,
    // One writer at a time; records must not interleave on the wire.
    connection: Mutex<Box<dyn Connection>>,
    fallback: Arc<dyn Sink>,
    events: Sender<TransportEvent>,
}

impl SocketTransport {
    /// Open a connection through `connector`.
    ///
    /// `timeout` bounds every subsequent write, `fallback` receives records the collector
    /// couldn't take, and `events` is told when the connection is lost.
    pub fn connect(
        connector: &dyn Connector,
        timeout: Duration,
        fallback: Arc<dyn Sink>,
        events: Sender<TransportEvent>,
    ) -> Result<SocketTransport> {
        let connection = connector.connect().map_err(|err| Error::Connect {
            addr: connector.address(),
            source: err,
            back: Backtrace::new(),
        })?;
        Ok(SocketTransport {
            id: NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed),
            address: connector.address(),
            timeout,
            connection: Mutex::new(connection),
            fallback,
            events,
        })
    }
    /// Process-unique identifier of this transport (and so of its connection)
    pub fn id(&self) -> u64 {
        self.id
    }
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl std::fmt::Debug for SocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketTransport")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Sink for SocketTransport {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut connection = self.connection.lock();
        if let Err(err) = connection.set_write_timeout(self.timeout) {
            diag!("Failed to set deadline: {}", err);
        }
        match connection.write_all(buf) {
            Ok(()) => Ok(buf.len()),
            Err(err) if is_broken_pipe(&err) => {
                drop(connection);
                if let Err(fallback_err) = self.fallback.write(buf) {
                    diag!("Fallback write failed after broken pipe: {}", fallback_err);
                }
                // A full channel already holds a pending rebuild request; a disconnected one
                // means the pipeline is being torn down.
                let _ = self.events.try_send(TransportEvent::ConnectionLost {
                    transport_id: self.id,
                });
                Ok(buf.len())
            }
            Err(err) => Err(err),
        }
    }
    fn sync(&self) -> io::Result<()> {
        Ok(())
    }
}
