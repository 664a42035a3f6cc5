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

//! Assembling a [`Logger`] from resolved [`Settings`].
//!
//! The local destinations (console & rotating file) are combined into one [`MultiSink`] behind a
//! single core with the configured encoder. When a [`SocketTransport`] is available it gets a
//! core of its own, always JSON-encoded, at the same level. Every record carries the service name
//! (`svc`) & the host name (`host`).

use crate::{
    config::Settings,
    diag::diag,
    encoder::{ConsoleEncoder, Encoder, JsonEncoder},
    level::Level,
    logger::{Core, Logger},
    rotating::{RotatingFile, RotationPolicy},
    sink::{MultiSink, Sink},
    transport::SocketTransport,
};

use serde_json::Value;

use std::sync::Arc;

/// The field naming the service on every record
pub const SERVICE_KEY: &str = "svc";
/// The field naming the host on every record
pub const HOST_KEY: &str = "host";

/// Select the encoder & minimum level for the local destinations.
pub fn build_level_encoder(settings: &Settings) -> (Box<dyn Encoder>, Level) {
    let encoder: Box<dyn Encoder> = if settings.json {
        Box::new(JsonEncoder)
    } else {
        Box::new(ConsoleEncoder)
    };
    (encoder, settings.level)
}

/// Combine the enabled local destinations: `console` (unless disabled) & the rotating file
/// (unless disabled). The result may be empty.
pub fn build_destinations(settings: &Settings, console: Arc<dyn Sink>) -> MultiSink {
    let mut sinks = MultiSink::default();
    if settings.console {
        sinks.push(console);
    }
    if let Some(file) = &settings.file {
        sinks.push(Arc::new(RotatingFile::new(RotationPolicy::from(file))));
    }
    sinks
}

/// Look up this machine's host name, falling back to "unknown".
pub fn resolve_hostname() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(err) => {
            diag!("Failed to resolve the host name ({}); using \"unknown\"", err);
            "unknown".to_string()
        }
    }
}

/// Build a [`Logger`] writing to `local` and, if given, to `transport`.
///
/// The host name is resolved afresh on each call.
pub fn build_logger(
    settings: &Settings,
    local: &MultiSink,
    transport: Option<Arc<SocketTransport>>,
) -> Logger {
    let (encoder, level) = build_level_encoder(settings);
    let mut cores = Vec::with_capacity(2);
    if !local.is_empty() {
        cores.push(Core::new(encoder, Arc::new(local.clone()), level));
    }
    if let Some(transport) = &transport {
        cores.push(Core::new(Box::new(JsonEncoder), transport.clone(), level));
    }
    let context = vec![
        (
            SERVICE_KEY.to_string(),
            Value::String(settings.service_name.clone()),
        ),
        (HOST_KEY.to_string(), Value::String(resolve_hostname())),
    ];
    let logger = Logger::new(cores, context);
    match transport {
        Some(transport) => logger.with_transport(transport),
        None => logger,
    }
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::{
        config::FileSettings,
        test_utils::{CollectingSink, Script, ScriptedConnector},
    };

    use crossbeam_channel::unbounded;
    use serde_json::json;

    use std::time::Duration;

    fn settings() -> Settings {
        Settings {
            service_name: "orders".to_string(),
            level: Level::Info,
            json: true,
            console: true,
            file: None,
            socket: None,
        }
    }

    #[test]
    fn console_only() {
        let dests = build_destinations(&settings(), Arc::new(CollectingSink::default()));
        assert_eq!(dests.len(), 1);
    }

    #[test]
    fn console_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut settings = settings();
        settings.file = Some(FileSettings {
            path: path.clone(),
            max_size_mb: 1,
            max_backups: 1,
            max_age_days: 1,
            compress: false,
        });
        let console = Arc::new(CollectingSink::default());
        let dests = build_destinations(&settings, console.clone());
        assert_eq!(dests.len(), 2);

        assert_eq!(dests.write(b"both\n").unwrap(), 5);
        assert_eq!(console.text(), "both\n");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "both\n");
    }

    #[test]
    fn nothing_enabled() {
        let mut settings = settings();
        settings.console = false;
        let dests = build_destinations(&settings, Arc::new(CollectingSink::default()));
        assert!(dests.is_empty());
        let logger = build_logger(&settings, &dests, None);
        assert!(logger.cores().is_empty());
        // Must not panic
        logger.info("into the void", &[]);
    }

    #[test]
    fn level_and_encoder() {
        let mut settings = settings();
        settings.level = Level::Error;
        settings.json = false;
        let console = Arc::new(CollectingSink::default());
        let logger = build_logger(
            &settings,
            &build_destinations(&settings, console.clone()),
            None,
        );
        logger.warn("dropped", &[]);
        logger.error("kept", &[]);
        let lines = console.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("\tERROR\tkept\t{\"svc\":\"orders\",\"host\":"));
    }

    #[test]
    fn context_and_socket_core() {
        let console = Arc::new(CollectingSink::default());
        let connector = ScriptedConnector::new(&[Script::Healthy]);
        let (tx, _rx) = unbounded();
        let transport = Arc::new(
            SocketTransport::connect(
                &connector,
                Duration::from_millis(10),
                Arc::new(CollectingSink::default()),
                tx,
            )
            .unwrap(),
        );
        let settings = settings();
        let logger = build_logger(
            &settings,
            &build_destinations(&settings, console.clone()),
            Some(transport.clone()),
        );
        assert_eq!(logger.cores().len(), 2);
        assert_eq!(logger.transport_id(), Some(transport.id()));

        logger.info("hello", &[json!("user"), json!("alice")]);
        let local: Value = serde_json::from_str(&console.lines()[0]).unwrap();
        let remote: Value = serde_json::from_str(connector.received().trim_end()).unwrap();
        for record in [&local, &remote] {
            assert_eq!(record["msg"], json!("hello"));
            assert_eq!(record["svc"], json!("orders"));
            assert_eq!(record["user"], json!("alice"));
            assert!(record["host"].is_string());
        }
    }
}
