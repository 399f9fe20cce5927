//! JSON Lines sink: one self-contained record per line.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use log::{debug, warn};

use super::{AttemptFilter, AttemptIter, AuditSink};
use crate::errors::AuditError;
use crate::models::AttemptRecord;

/// Default log location, relative to the working directory.
pub const DEFAULT_JSONL_PATH: &str = "logs/api_call_logs.jsonl";

#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl JsonlSink {
    /// Creates the parent directory; the file itself is opened on first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            writer: Mutex::new(None),
        })
    }

    pub fn open_default() -> Result<Self, AuditError> {
        Self::open(DEFAULT_JSONL_PATH)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Option<BufWriter<File>>> {
        self.writer.lock().unwrap_or_else(|poisoned| {
            warn!("JSONL sink lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_batch(
        writer: &mut BufWriter<File>,
        records: &[AttemptRecord],
    ) -> Result<(), AuditError> {
        for record in records {
            serde_json::to_writer(&mut *writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl AuditSink for JsonlSink {
    fn append(&self, records: &[AttemptRecord]) -> Result<(), AuditError> {
        let mut guard = self.lock();
        if guard.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            *guard = Some(BufWriter::new(file));
        }
        let Some(writer) = guard.as_mut() else {
            return Ok(());
        };

        let result = Self::write_batch(writer, records);
        if result.is_err() {
            // Reopen next time rather than keep writing after a partial line.
            *guard = None;
        }
        result
    }

    fn query(&self, filter: &AttemptFilter) -> Result<AttemptIter, AuditError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(AttemptIter::empty()),
            Err(e) => return Err(e.into()),
        };

        let filter = filter.clone();
        let path = self.path.display().to_string();
        let records = BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .filter(|line| !line.trim().is_empty())
            .filter_map(move |line| match serde_json::from_str::<AttemptRecord>(&line) {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!("Skipping malformed line in {}: {}", path, e);
                    None
                }
            })
            .filter(move |record| filter.matches(record));

        Ok(AttemptIter::new(records))
    }
}
