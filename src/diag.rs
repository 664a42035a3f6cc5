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
//! Local diagnostic output.
//!
//! A logging library can't log its own failures through itself; when the socket won't connect,
//! or the host name can't be discovered, we say so on stderr & carry on.

use std::io::Write;

/// Write one diagnostic line to stderr. Failures to do *that* are ignored; there is nowhere
/// left to report them.
pub(crate) fn report(args: std::fmt::Arguments<'_>) {
    let stderr = std::io::stderr();
    let mut lock = stderr.lock();
    let _ = writeln!(lock, "tracing-fanout: {}", args);
}

macro_rules! diag {
    ($($arg:tt)*) => {
        $crate::diag::report(format_args!($($arg)*))
    };
}

pub(crate) use diag;
