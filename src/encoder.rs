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

//! Record encoders.
//!
//! An [`Encoder`] turns one [`Record`] into the bytes handed to a [`Sink`]. Two are provided:
//!
//! - [`JsonEncoder`]: one JSON object per line, e.g.
//!   `{"level":"info","ts":"2024-05-01T12:00:00.000+02:00","msg":"hello","svc":"api","host":"bree","user":"alice"}`
//! - [`ConsoleEncoder`]: tab-separated & easier on human eyes, e.g.
//!   `2024-05-01T12:00:00.000+02:00	INFO	hello	{"svc":"api","host":"bree","user":"alice"}`
//!
//! Both terminate each record with a newline.
//!
//! [`Sink`]: crate::sink::Sink

use crate::{
    error::{Error, Result},
    level::Level,
};

use backtrace::Backtrace;
use bytes::BufMut;
use chrono::prelude::*;
use serde_json::Value;

/// One log record, ready for encoding.
#[derive(Debug)]
pub struct Record<'a> {
    pub level: Level,
    pub time: DateTime<Local>,
    pub message: &'a str,
    /// Fields attached to every record of a logger (`svc` & `host`)
    pub context: &'a [(String, Value)],
    /// Per-call fields, already validated to have string keys
    pub fields: &'a [(&'a str, &'a Value)],
}

/// Operations all encoders must support
pub trait Encoder: Send + Sync {
    fn encode(&self, record: &Record<'_>) -> Result<Vec<u8>>;
}

/// Format a timestamp to millisecond precision with the local offset (`Z` for UTC).
pub fn format_timestamp(time: &DateTime<Local>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn encode_err(err: serde_json::Error) -> Error {
    Error::Encode {
        source: Box::new(err),
        back: Backtrace::new(),
    }
}

fn put_json<T: serde::Serialize + ?Sized>(buf: &mut Vec<u8>, value: &T) -> Result<()> {
    serde_json::to_writer(buf, value).map_err(encode_err)
}

/// Write `"key":value` pairs for the context & fields, comma-separated, with a leading comma
/// iff `leading_comma`.
fn put_pairs(buf: &mut Vec<u8>, record: &Record<'_>, mut leading_comma: bool) -> Result<()> {
    let context = record.context.iter().map(|(k, v)| (k.as_str(), v));
    let fields = record.fields.iter().map(|(k, v)| (*k, *v));
    for (key, value) in context.chain(fields) {
        if leading_comma {
            buf.put_u8(b',');
        }
        leading_comma = true;
        put_json(buf, key)?;
        buf.put_u8(b':');
        put_json(buf, value)?;
    }
    Ok(())
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        struct JsonEncoder                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// One JSON object per record
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonEncoder;

impl Encoder for JsonEncoder {
    fn encode(&self, record: &Record<'_>) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(256);
        buf.put_slice(b"{\"level\":");
        put_json(&mut buf, record.level.as_str())?;
        buf.put_slice(b",\"ts\":");
        put_json(&mut buf, &format_timestamp(&record.time))?;
        buf.put_slice(b",\"msg\":");
        put_json(&mut buf, record.message)?;
        put_pairs(&mut buf, record, true)?;
        buf.put_slice(b"}\n");
        Ok(buf)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      struct ConsoleEncoder                                     //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Tab-separated timestamp, level & message, followed by the fields as a JSON object
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleEncoder;

impl Encoder for ConsoleEncoder {
    fn encode(&self, record: &Record<'_>) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(256);
        buf.put_slice(format_timestamp(&record.time).as_bytes());
        buf.put_u8(b'\t');
        buf.put_slice(record.level.as_capital_str().as_bytes());
        buf.put_u8(b'\t');
        buf.put_slice(record.message.as_bytes());
        if !record.context.is_empty() || !record.fields.is_empty() {
            buf.put_slice(b"\t{");
            put_pairs(&mut buf, record, false)?;
            buf.put_u8(b'}');
        }
        buf.put_u8(b'\n');
        Ok(buf)
    }
}
