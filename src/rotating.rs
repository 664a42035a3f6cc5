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

//! A size-rotated log file.
//!
//! [`RotatingFile`] appends records to a log file until the next record would push it past
//! [`RotationPolicy::max_bytes`]. At that point the file is renamed aside with a timestamp
//! (`app.log` becomes `app-2024-05-01T12-00-00.000.log`) & a fresh file is started. After each
//! rotation old backups are pruned by count & by age, and optionally gzipped.

use crate::{config::FileSettings, diag::diag, sink::Sink};

use chrono::prelude::*;
use flate2::{write::GzEncoder, Compression};
use parking_lot::Mutex;

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    time::Duration,
};

const MEGABYTE: u64 = 1024 * 1024;
const BACKUP_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f";
const COMPRESS_SUFFIX: &str = ".gz";

/// Rotation parameters
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RotationPolicy {
    pub path: PathBuf,
    /// Rotate before the file would exceed this many bytes
    pub max_bytes: u64,
    /// Backups to retain; 0 retains all of them
    pub max_backups: usize,
    /// Remove backups older than this; `None` keeps them regardless of age
    pub max_age: Option<Duration>,
    /// gzip backups
    pub compress: bool,
    /// Stamp backups with local rather than UTC time
    pub local_time: bool,
}

impl RotationPolicy {
    pub fn new<P: Into<PathBuf>>(path: P) -> RotationPolicy {
        RotationPolicy {
            path: path.into(),
            max_bytes: crate::config::DEFAULT_FILE_MAX_SIZE_MB * MEGABYTE,
            max_backups: crate::config::DEFAULT_FILE_MAX_BACKUPS,
            max_age: None,
            compress: false,
            local_time: true,
        }
    }
}

impl std::convert::From<&FileSettings> for RotationPolicy {
    fn from(settings: &FileSettings) -> Self {
        RotationPolicy {
            path: settings.path.clone(),
            max_bytes: settings.max_size_mb.saturating_mul(MEGABYTE),
            max_backups: settings.max_backups,
            max_age: match settings.max_age_days {
                0 => None,
                days => Some(Duration::from_secs(u64::from(days) * 24 * 60 * 60)),
            },
            compress: settings.compress,
            local_time: true,
        }
    }
}

struct State {
    file: Option<File>,
    size: u64,
    // Stamp of the most recent backup; each new backup is stamped strictly later.
    last_backup: Option<NaiveDateTime>,
}

/// A [`Sink`] writing to a size-rotated file. The file (and its directory) is created on first
/// write.
pub struct RotatingFile {
    policy: RotationPolicy,
    state: Mutex<State>,
}

impl RotatingFile {
    pub fn new(policy: RotationPolicy) -> RotatingFile {
        RotatingFile {
            policy,
            state: Mutex::new(State {
                file: None,
                size: 0,
                last_backup: None,
            }),
        }
    }
    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }
    /// Rotate now, regardless of size.
    pub fn rotate(&self) -> io::Result<()> {
        let mut state = self.state.lock();
        self.rotate_locked(&mut state)
    }

    fn now(&self) -> NaiveDateTime {
        if self.policy.local_time {
            Local::now().naive_local()
        } else {
            Utc::now().naive_utc()
        }
    }

    fn open_existing_or_new(&self, state: &mut State, write_len: u64) -> io::Result<()> {
        let size = match fs::metadata(&self.policy.path) {
            Ok(md) => md.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return self.open_new(state),
            Err(err) => return Err(err),
        };
        if size + write_len >= self.policy.max_bytes {
            return self.rotate_locked(state);
        }
        match OpenOptions::new().append(true).open(&self.policy.path) {
            Ok(file) => {
                state.file = Some(file);
                state.size = size;
                Ok(())
            }
            // Can't append to the existing file for some reason; start over.
            Err(_) => self.open_new(state),
        }
    }

    fn open_new(&self, state: &mut State) -> io::Result<()> {
        if let Some(dir) = self.policy.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        if self.policy.path.exists() {
            let backup = self.unused_backup_name(state);
            fs::rename(&self.policy.path, backup)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.policy.path)?;
        state.file = Some(file);
        state.size = 0;
        Ok(())
    }

    fn rotate_locked(&self, state: &mut State) -> io::Result<()> {
        if let Some(file) = state.file.take() {
            drop(file);
        }
        self.open_new(state)?;
        self.mill();
        Ok(())
    }

    fn split_name(&self) -> (String, String) {
        let stem = self
            .policy
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = self
            .policy
            .path
            .extension()
            .map(|s| format!(".{}", s.to_string_lossy()))
            .unwrap_or_default();
        (stem, ext)
    }

    fn dir(&self) -> PathBuf {
        match self.policy.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn backup_name(&self, stamp: &NaiveDateTime) -> PathBuf {
        let (stem, ext) = self.split_name();
        self.dir()
            .join(format!("{}-{}{}", stem, stamp.format(BACKUP_TIME_FORMAT), ext))
    }

    /// A backup name later than any we've used & not already taken on disk (or in compressed
    /// form)
    fn unused_backup_name(&self, state: &mut State) -> PathBuf {
        let mut stamp = self.now();
        if let Some(last) = state.last_backup {
            if stamp <= last {
                stamp = last + chrono::Duration::milliseconds(1);
            }
        }
        loop {
            let candidate = self.backup_name(&stamp);
            let mut compressed = candidate.clone().into_os_string();
            compressed.push(COMPRESS_SUFFIX);
            if !candidate.exists() && !Path::new(&compressed).exists() {
                state.last_backup = Some(stamp);
                return candidate;
            }
            stamp += chrono::Duration::milliseconds(1);
        }
    }

    /// Existing backups, newest first
    fn backups(&self) -> io::Result<Vec<(NaiveDateTime, PathBuf)>> {
        let (stem, ext) = self.split_name();
        let prefix = format!("{}-", stem);
        let mut found = Vec::new();
        for entry in fs::read_dir(self.dir())? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let stamp = name
                .strip_prefix(&prefix)
                .and_then(|rest| {
                    rest.strip_suffix(COMPRESS_SUFFIX)
                        .unwrap_or(rest)
                        .strip_suffix(ext.as_str())
                })
                .and_then(|ts| NaiveDateTime::parse_from_str(ts, BACKUP_TIME_FORMAT).ok());
            if let Some(stamp) = stamp {
                found.push((stamp, entry.path()));
            }
        }
        found.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(found)
    }

    /// Prune & compress backups. Failures are reported, never returned: the record that
    /// triggered rotation has yet to be written.
    fn mill(&self) {
        let backups = match self.backups() {
            Ok(backups) => backups,
            Err(err) => {
                diag!("failed to list log file backups: {}", err);
                return;
            }
        };

        let cutoff = self.policy.max_age.and_then(|age| {
            chrono::Duration::from_std(age)
                .ok()
                .map(|age| self.now() - age)
        });

        let mut kept = 0;
        for (stamp, path) in backups {
            let too_many = self.policy.max_backups > 0 && kept >= self.policy.max_backups;
            let too_old = cutoff.map_or(false, |cutoff| stamp < cutoff);
            if too_many || too_old {
                if let Err(err) = fs::remove_file(&path) {
                    diag!("failed to remove old log file {}: {}", path.display(), err);
                }
                continue;
            }
            kept += 1;
            if self.policy.compress && !path.to_string_lossy().ends_with(COMPRESS_SUFFIX) {
                if let Err(err) = compress_file(&path) {
                    diag!("failed to compress log file {}: {}", path.display(), err);
                }
            }
        }
    }
}

/// gzip `path` to `path.gz` & remove the original.
fn compress_file(path: &Path) -> io::Result<()> {
    let mut target = path.as_os_str().to_os_string();
    target.push(COMPRESS_SUFFIX);
    let mut source = File::open(path)?;
    let mut encoder = GzEncoder::new(File::create(&target)?, Compression::default());
    io::copy(&mut source, &mut encoder)?;
    encoder.finish()?.sync_all()?;
    fs::remove_file(path)
}

impl Sink for RotatingFile {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let len = buf.len() as u64;
        if len > self.policy.max_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "write length {} exceeds maximum file size {}",
                    len, self.policy.max_bytes
                ),
            ));
        }
        let mut state = self.state.lock();
        if state.file.is_none() {
            self.open_existing_or_new(&mut state, len)?;
        }
        if state.size + len > self.policy.max_bytes {
            self.rotate_locked(&mut state)?;
        }
        let file = state
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("log file unexpectedly closed"))?;
        file.write_all(buf)?;
        state.size += len;
        Ok(buf.len())
    }
    fn sync(&self) -> io::Result<()> {
        match self.state.lock().file.as_mut() {
            Some(file) => file.sync_all(),
            None => Ok(()),
        }
    }
}
