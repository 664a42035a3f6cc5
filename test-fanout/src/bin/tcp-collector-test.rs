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

//! Manual test against a throw-away TCP collector on the local host.
//!
//! The collector hangs up after the first record it receives; the records that follow should
//! show up on stdout (the fallback) until the logger has been rebuilt around a new connection,
//! after which the collector prints them again.

use tracing::{debug, error, info, trace, warn};
use tracing_fanout::{config::LoggerConfig, fields, layer::FanoutLayer};
use tracing_subscriber::{
    layer::SubscriberExt, // Needed to get `with()`
    registry::Registry,
};

use std::{
    io::{BufRead, BufReader},
    net::TcpListener,
    thread,
    time::Duration,
};

pub fn main() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        for (i, stream) in listener.incoming().enumerate() {
            let reader = BufReader::new(stream.unwrap());
            for line in reader.lines() {
                eprintln!("collector[{}]: {}", i, line.unwrap());
                if i == 0 {
                    // Hang up on the first connection after one record
                    break;
                }
            }
        }
    });

    tracing_fanout::init_with_config(
        "fanout",
        Some(LoggerConfig {
            service_name: "fanout-test".to_string(),
            log_mode: "DEBUG".to_string(),
            file_syncer_disabled: true,
            socket_logging_enabled: true,
            socket_address: Some("127.0.0.1".to_string()),
            socket_port: Some(port),
            ..Default::default()
        }),
    )
    .unwrap();

    // Setup the real subsriber...
    let subscriber = Registry::default().with(FanoutLayer::default());
    // and install it.
    let _guard = tracing::subscriber::set_default(subscriber);

    for i in 0..10 {
        trace!(i, "你好, TCP collector.");
        debug!(i, "你好, TCP collector.");
        info!(i, "你好, TCP collector.");
        warn!(i, "你好, TCP collector.");
        error!(i, "你好, TCP collector.");
        tracing_fanout::info(
            "direct",
            fields!("i" => i, "meta" => serde_json::json!({"round": i})),
        );
        thread::sleep(Duration::from_millis(100));
    }
    tracing_fanout::sync();
}
