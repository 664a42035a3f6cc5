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

//! The process-wide logger registry.
//!
//! # Introduction
//!
//! A [`Registry`] owns the active [`Logger`]. It builds it exactly once (on the first call to
//! [`Registry::init_with_config`], or lazily on the first log call), and replaces it wholesale
//! whenever the socket transport reports a broken pipe.
//!
//! # Reconciliation
//!
//! A [`SocketTransport`] that loses its connection doesn't touch the registry directly: it
//! sends a [`TransportEvent`] down a channel. A dedicated thread, started when the first
//! transport is opened, receives those events & calls [`Registry::reinitialize`], which dials
//! a fresh connection, builds a brand-new logger around it, and publishes it with one atomic
//! store. Callers holding the old logger finish their calls against it; subsequent calls see
//! the new one.
//!
//! The channel holds at most one pending event. Records that hit a dead connection while a
//! rebuild is already pending (or in progress) don't queue more work; if the rebuild fails, the
//! next such record asks again. Events naming a transport that is no longer active are ignored.

use crate::{
    compose,
    config::{LoggerConfig, Settings},
    diag::diag,
    error::{Error, Result},
    fields::normalize,
    level::Level,
    logger::Logger,
    sink::{Console, MultiSink, Sink},
    transport::{Connector, SocketTransport, TcpConnector, TransportEvent},
};

use arc_swap::ArcSwapOption;
use backtrace::Backtrace;
use crossbeam_channel::{bounded, Receiver, Sender};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde_json::Value;

use std::{
    io,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          LoggerKind                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The kinds of logger [`Registry::init_with_config`] knows how to build
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoggerKind {
    /// Console, rotating file & socket, fanned-out. Also accepted as "zap".
    Fanout,
}

impl std::str::FromStr for LoggerKind {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fanout" | "zap" => Ok(LoggerKind::Fanout),
            _ => Err(Error::UnknownLoggerKind {
                kind: s.to_string(),
                back: Backtrace::new(),
            }),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        struct Registry                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Everything fixed at initialization & re-used by every rebuild
struct Pipeline {
    settings: Settings,
    local: MultiSink,
    connector: Option<Arc<dyn Connector>>,
}

/// Holder of the active [`Logger`]
pub struct Registry {
    active: ArcSwapOption<Logger>,
    pipeline: OnceCell<Pipeline>,
    generation: AtomicU64,
    // Serializes rebuilds
    rebuild: Mutex<()>,
    console: Arc<dyn Sink>,
    fallback: Arc<dyn Sink>,
    connector: Option<Arc<dyn Connector>>,
    lookup: Lookup,
    events: Sender<TransportEvent>,
    receiver: Receiver<TransportEvent>,
    reconciler: OnceCell<()>,
    this: Weak<Registry>,
}

/// Construct a [`Registry`] with non-default collaborators.
///
/// Each of the console sink, the fallback sink (which receives records the collector couldn't
/// take), the collector connector & the environment lookup may be replaced; mostly useful for
/// testing.
#[derive(Default)]
pub struct RegistryBuilder {
    console: Option<Arc<dyn Sink>>,
    fallback: Option<Arc<dyn Sink>>,
    connector: Option<Arc<dyn Connector>>,
    lookup: Option<Lookup>,
}

impl RegistryBuilder {
    /// Write console output to `sink` rather than stdout
    pub fn console(mut self, sink: Arc<dyn Sink>) -> Self {
        self.console = Some(sink);
        self
    }
    /// Write records lost to a broken pipe to `sink` rather than stdout
    pub fn fallback(mut self, sink: Arc<dyn Sink>) -> Self {
        self.fallback = Some(sink);
        self
    }
    /// Reach the collector through `connector` rather than over TCP to the configured address
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }
    /// Read configuration variables through `lookup` rather than from the environment
    pub fn lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.lookup = Some(Box::new(lookup));
        self
    }
    pub fn build(self) -> Arc<Registry> {
        let (events, receiver) = bounded(1);
        Arc::new_cyclic(|this| Registry {
            active: ArcSwapOption::empty(),
            pipeline: OnceCell::new(),
            generation: AtomicU64::new(0),
            rebuild: Mutex::new(()),
            console: self
                .console
                .unwrap_or_else(|| Arc::new(Console::stdout())),
            fallback: self
                .fallback
                .unwrap_or_else(|| Arc::new(Console::stdout())),
            connector: self.connector,
            lookup: self
                .lookup
                .unwrap_or_else(|| Box::new(|name: &str| std::env::var(name).ok())),
            events,
            receiver,
            reconciler: OnceCell::new(),
            this: this.clone(),
        })
    }
}

impl Registry {
    /// A [`Registry`] writing to stdout & configured from the environment
    pub fn new() -> Arc<Registry> {
        RegistryBuilder::default().build()
    }
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Initialize with the default kind, configured from the environment.
    pub fn init(&self) -> Result<()> {
        self.init_with_config("fanout", None)
    }

    /// Initialize a logger of kind `kind` (see [`LoggerKind`]) from `config`, or from the
    /// environment if that's `None`.
    ///
    /// Only the first call builds anything; concurrent callers wait for it to finish & later
    /// calls return immediately. An unknown `kind` is fatal if a logger is already active (it is
    /// logged & the process exits); otherwise it is returned as an error.
    pub fn init_with_config(&self, kind: &str, config: Option<LoggerConfig>) -> Result<()> {
        match kind.parse::<LoggerKind>() {
            Ok(LoggerKind::Fanout) => {
                self.pipeline.get_or_init(|| self.build(config.as_ref()));
                Ok(())
            }
            Err(err) => {
                if let Some(logger) = self.current() {
                    logger.fatal(
                        "Unknown logger kind",
                        &[Value::from("kind"), Value::from(kind)],
                    );
                }
                Err(err)
            }
        }
    }

    /// The resolved settings, once initialized
    pub fn settings(&self) -> Option<&Settings> {
        self.pipeline.get().map(|p| &p.settings)
    }
    /// The active logger, if any
    pub fn current(&self) -> Option<Arc<Logger>> {
        self.active.load_full()
    }
    /// Number of loggers published so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    fn pending_events(&self) -> usize {
        self.receiver.len()
    }

    fn build(&self, config: Option<&LoggerConfig>) -> Pipeline {
        let settings = Settings::resolve_with(config, |name| (self.lookup)(name));
        let local = compose::build_destinations(&settings, self.console.clone());
        let connector = settings.socket.as_ref().map(|socket| {
            self.connector
                .clone()
                .unwrap_or_else(|| Arc::new(TcpConnector::new(socket.address.clone())))
        });
        let pipeline = Pipeline {
            settings,
            local,
            connector,
        };
        let transport = match self.open_transport(&pipeline) {
            Ok(transport) => transport,
            Err(err) => {
                diag!("{}; logging without the socket", err);
                None
            }
        };
        self.publish(compose::build_logger(
            &pipeline.settings,
            &pipeline.local,
            transport,
        ));
        pipeline
    }

    fn open_transport(&self, pipeline: &Pipeline) -> Result<Option<Arc<SocketTransport>>> {
        let (socket, connector) = match (&pipeline.settings.socket, &pipeline.connector) {
            (Some(socket), Some(connector)) => (socket, connector),
            _ => return Ok(None),
        };
        let transport = SocketTransport::connect(
            connector.as_ref(),
            socket.timeout,
            self.fallback.clone(),
            self.events.clone(),
        )?;
        self.start_reconciler();
        Ok(Some(Arc::new(transport)))
    }

    fn publish(&self, logger: Logger) {
        self.active.store(Some(Arc::new(logger)));
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn start_reconciler(&self) {
        self.reconciler.get_or_init(|| {
            let this = self.this.clone();
            let receiver = self.receiver.clone();
            if let Err(err) = std::thread::Builder::new()
                .name("fanout-reconciler".to_string())
                .spawn(move || reconcile(this, receiver))
            {
                diag!("Failed to start the reconciler: {}", err);
            }
        });
    }

    /// Replace the active logger with one built around a fresh connection, provided transport
    /// `transport_id` is still the active one (otherwise do nothing).
    ///
    /// If the new connection can't be made, the current logger stays in place & the error is
    /// returned.
    pub fn reinitialize(&self, transport_id: u64) -> Result<()> {
        let _guard = self.rebuild.lock();
        let pipeline = match self.pipeline.get() {
            Some(pipeline) => pipeline,
            None => return Ok(()),
        };
        let active = self.current().and_then(|logger| logger.transport_id());
        if active != Some(transport_id) {
            return Ok(());
        }
        let transport = self.open_transport(pipeline)?;
        self.publish(compose::build_logger(
            &pipeline.settings,
            &pipeline.local,
            transport,
        ));
        Ok(())
    }

    fn logger(&self) -> Option<Arc<Logger>> {
        if let Some(logger) = self.current() {
            return Some(logger);
        }
        if let Err(err) = self.init() {
            diag!("Failed to initialize logging: {}", err);
        }
        self.current()
    }

    /// Normalize `fields` & log them at `level`.
    pub fn log(&self, level: Level, message: &str, mut fields: Vec<Value>) {
        normalize(&mut fields);
        if let Some(logger) = self.logger() {
            logger.log(level, message, &fields);
        }
    }
    pub fn debug(&self, message: &str, fields: Vec<Value>) {
        self.log(Level::Debug, message, fields)
    }
    pub fn info(&self, message: &str, fields: Vec<Value>) {
        self.log(Level::Info, message, fields)
    }
    pub fn infof(&self, template: &str, mut args: Vec<Value>) {
        normalize(&mut args);
        if let Some(logger) = self.logger() {
            logger.infof(template, &args);
        }
    }
    pub fn warn(&self, message: &str, fields: Vec<Value>) {
        self.log(Level::Warn, message, fields)
    }
    pub fn error(&self, message: &str, fields: Vec<Value>) {
        self.log(Level::Error, message, fields)
    }
    /// Log at fatal, flush, & exit with status 1.
    pub fn fatal(&self, message: &str, mut fields: Vec<Value>) -> ! {
        normalize(&mut fields);
        match self.logger() {
            Some(logger) => logger.fatal(message, &fields),
            None => std::process::exit(1),
        }
    }
    /// Flush the active logger; failures are reported locally.
    pub fn sync(&self) {
        if let Some(logger) = self.current() {
            if let Err(err) = logger.sync() {
                diag!("Failed to sync: {}", err);
            }
        }
    }
    /// An [`io::Write`] implementation logging each write at debug.
    pub fn writer(self: &Arc<Self>) -> Writer {
        Writer {
            registry: self.clone(),
        }
    }
}

fn reconcile(this: Weak<Registry>, receiver: Receiver<TransportEvent>) {
    while let Ok(event) = receiver.recv() {
        let registry = match this.upgrade() {
            Some(registry) => registry,
            None => break,
        };
        match event {
            TransportEvent::ConnectionLost { transport_id } => {
                // A transport can break before the first build has been recorded
                registry.pipeline.wait();
                if let Err(err) = registry.reinitialize(transport_id) {
                    diag!("Reinitialization failed ({}); keeping the current logger", err);
                }
            }
        }
    }
}

/// Adapts a [`Registry`] to [`io::Write`]: each write becomes one debug-level record.
pub struct Writer {
    registry: Arc<Registry>,
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        let text = text.strip_suffix('\n').unwrap_or(&text);
        self.registry.debug(text, Vec::new());
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        self.registry.sync();
        Ok(())
    }
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::test_utils::{CollectingSink, Script, ScriptedConnector};

    use serde_json::json;

    use std::{
        io::Write,
        sync::Barrier,
        thread,
        time::{Duration, Instant},
    };

    struct Fixture {
        registry: Arc<Registry>,
        console: Arc<CollectingSink>,
        fallback: Arc<CollectingSink>,
        connector: Arc<ScriptedConnector>,
    }

    fn fixture(script: &[Script], env: &[(&'static str, &'static str)]) -> Fixture {
        fixture_with(ScriptedConnector::new(script), env)
    }

    fn fixture_with(
        connector: ScriptedConnector,
        env: &[(&'static str, &'static str)],
    ) -> Fixture {
        let console = Arc::new(CollectingSink::default());
        let fallback = Arc::new(CollectingSink::default());
        let connector = Arc::new(connector);
        let env: Vec<(&'static str, &'static str)> = env.to_vec();
        let registry = Registry::builder()
            .console(console.clone())
            .fallback(fallback.clone())
            .connector(connector.clone())
            .lookup(move |name| {
                env.iter()
                    .find(|(k, _)| *k == name)
                    .map(|(_, v)| v.to_string())
            })
            .build();
        Fixture {
            registry,
            console,
            fallback,
            connector,
        }
    }

    fn socket_config() -> LoggerConfig {
        LoggerConfig {
            service_name: "orders".to_string(),
            file_syncer_disabled: true,
            socket_logging_enabled: true,
            socket_port: Some(5170),
            ..Default::default()
        }
    }

    fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn concurrent_init_builds_once() {
        let f = fixture(&[], &[]);
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = f.registry.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    registry
                        .init_with_config("fanout", Some(socket_config()))
                        .unwrap();
                    registry.current().unwrap()
                })
            })
            .collect();
        let loggers: Vec<Arc<Logger>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(loggers.iter().all(|l| Arc::ptr_eq(l, &loggers[0])));
        assert_eq!(f.registry.generation(), 1);
        assert_eq!(f.connector.connects(), 1);
    }

    #[test]
    fn broken_pipe_rebuilds() {
        let f = fixture(&[Script::BrokenPipe], &[]);
        f.registry.init_with_config("zap", Some(socket_config())).unwrap();
        let first = f.registry.current().unwrap();
        let first_id = first.transport_id().unwrap();

        // The socket core's write reports success even though the pipe is broken...
        assert_eq!(first.cores()[1].sink().write(b"{\"msg\":\"lost\"}\n").unwrap(), 15);
        // ...because the record went to the fallback instead.
        assert_eq!(f.fallback.text(), "{\"msg\":\"lost\"}\n");

        assert!(wait_for(|| f.registry.generation() == 2));
        let second = f.registry.current().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_ne!(second.transport_id().unwrap(), first_id);
        assert_eq!(f.connector.connects(), 2);

        f.registry.info("after", vec![]);
        assert!(f.connector.received().contains("\"msg\":\"after\""));

        // A late signal from the dead transport changes nothing.
        f.registry.reinitialize(first_id).unwrap();
        assert_eq!(f.registry.generation(), 2);
    }

    #[test]
    fn broken_pipe_through_facade() {
        let f = fixture(&[Script::BrokenPipe], &[]);
        f.registry.init_with_config("fanout", Some(socket_config())).unwrap();
        f.registry.info("hello", vec![json!("user"), json!("alice")]);
        let lost: Value = serde_json::from_str(f.fallback.text().trim_end()).unwrap();
        assert_eq!(lost["msg"], json!("hello"));
        assert_eq!(lost["user"], json!("alice"));
        // The local destinations get it regardless.
        assert!(f.console.text().contains("\"msg\":\"hello\""));
        assert!(wait_for(|| f.registry.generation() == 2));
    }

    #[test]
    fn timeout_does_not_rebuild() {
        let f = fixture(&[Script::TimedOut], &[]);
        f.registry.init_with_config("fanout", Some(socket_config())).unwrap();
        let logger = f.registry.current().unwrap();
        assert!(logger.cores()[1].sink().write(b"x\n").is_err());
        f.registry.info("slow", vec![]);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(f.registry.generation(), 1);
        assert_eq!(f.connector.connects(), 1);
        assert!(f.fallback.text().is_empty());
    }

    #[test]
    fn failed_reconnect_keeps_logger() {
        let f = fixture(&[Script::BrokenPipe, Script::Refuse], &[]);
        f.registry.init_with_config("fanout", Some(socket_config())).unwrap();
        let first = f.registry.current().unwrap();
        let id = first.transport_id().unwrap();
        f.registry.info("trigger", vec![]);

        assert!(wait_for(|| f.connector.connects() == 2));
        // Let the reconciler finish with its refusal.
        thread::sleep(Duration::from_millis(50));
        assert_eq!(f.registry.generation(), 1);
        assert!(Arc::ptr_eq(&first, &f.registry.current().unwrap()));

        // The next attempt is allowed to connect.
        f.registry.reinitialize(id).unwrap();
        assert_eq!(f.registry.generation(), 2);
    }

    #[test]
    fn refused_at_startup_logs_locally() {
        let f = fixture(&[Script::Refuse], &[]);
        f.registry.init_with_config("fanout", Some(socket_config())).unwrap();
        let logger = f.registry.current().unwrap();
        assert_eq!(logger.transport_id(), None);
        assert_eq!(logger.cores().len(), 1);
        f.registry.warn("local only", vec![]);
        assert!(f.console.text().contains("\"msg\":\"local only\""));
    }

    #[test]
    fn unknown_kind() {
        let f = fixture(&[], &[]);
        match f.registry.init_with_config("logrus", None) {
            Err(Error::UnknownLoggerKind { kind, .. }) => assert_eq!(kind, "logrus"),
            other => panic!("expected UnknownLoggerKind, got {:?}", other),
        }
        assert!(f.registry.current().is_none());
        assert_eq!("ZAP".parse::<LoggerKind>().unwrap(), LoggerKind::Fanout);
        assert_eq!("Fanout".parse::<LoggerKind>().unwrap(), LoggerKind::Fanout);
    }

    #[test]
    fn defaults() {
        let f = fixture(&[], &[]);
        f.registry.init().unwrap();
        let settings = f.registry.settings().unwrap();
        assert_eq!(settings.level, Level::Info);
        assert!(settings.json);
        assert!(settings.console);
        assert!(settings.file.is_some());
        assert!(settings.socket.is_none());
        assert_eq!(f.registry.current().unwrap().transport_id(), None);
    }

    #[test]
    fn marshals_meta() {
        let f = fixture(&[], &[("LOGGER_FILE_SYNCER_DISABLED", "true")]);
        f.registry.info("msg", vec![json!("meta"), json!({"a": 1})]);
        let record: Value = serde_json::from_str(&f.console.lines()[0]).unwrap();
        let meta: Value = serde_json::from_str(record["meta"].as_str().unwrap()).unwrap();
        assert_eq!(meta, json!({"a": 1}));
    }

    #[test]
    fn lazy_init_and_levels() {
        let f = fixture(
            &[],
            &[
                ("LOGGER_FILE_SYNCER_DISABLED", "1"),
                ("LOGGER_MODE", "ERROR"),
                ("SERVICE", "billing"),
            ],
        );
        assert_eq!(f.registry.generation(), 0);
        f.registry.info("dropped", vec![]);
        f.registry.error("kept", vec![]);
        assert_eq!(f.registry.generation(), 1);
        let lines = f.console.lines();
        assert_eq!(lines.len(), 1);
        let record: Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(record["level"], json!("error"));
        assert_eq!(record["svc"], json!("billing"));
    }

    #[test]
    fn writer_logs_at_debug() {
        let f = fixture(
            &[],
            &[("LOGGER_FILE_SYNCER_DISABLED", "t"), ("LOGGER_MODE", "DEBUG")],
        );
        let mut writer = f.registry.writer();
        assert_eq!(writer.write(b"from a writer\n").unwrap(), 14);
        writer.flush().unwrap();
        let record: Value = serde_json::from_str(&f.console.lines()[0]).unwrap();
        assert_eq!(record["level"], json!("debug"));
        assert_eq!(record["msg"], json!("from a writer"));
        assert_eq!(f.console.syncs(), 1);
    }

    #[test]
    fn infof_marshals_and_renders() {
        let f = fixture(&[], &[("LOGGER_FILE_SYNCER_DISABLED", "true")]);
        f.registry
            .infof("{} placed order {}", vec![json!("alice"), json!(42)]);
        let record: Value = serde_json::from_str(&f.console.lines()[0]).unwrap();
        assert_eq!(record["msg"], json!("alice placed order 42"));
    }

    #[test]
    fn failing_reconnects_do_not_pile_up() {
        let mut script = vec![Script::BrokenPipe];
        script.extend(std::iter::repeat(Script::Refuse).take(10_000));
        let f = fixture_with(
            ScriptedConnector::new(&script).with_delay(Duration::from_millis(100)),
            &[],
        );
        f.registry.init_with_config("fanout", Some(socket_config())).unwrap();

        let started = Instant::now();
        for i in 0..10_000 {
            f.registry.info("busy", vec![json!("i"), json!(i)]);
        }
        let elapsed = started.elapsed();

        assert!(f.registry.pending_events() <= 1);
        // One attempt in flight at a time, each taking 100ms, plus the initial connect & the one
        // pending request.
        let bound = 3 + (elapsed.as_millis() / 100) as usize;
        assert!(f.connector.connects() <= bound);
        assert_eq!(f.fallback.lines().len(), 10_000);
        assert_eq!(f.registry.generation(), 1);
    }
}
