use crate::core::error::StoreError;
use crate::models::state::StateRecord;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

const HEADER: &str = "torrent_id,low_rate_start";

/// In-memory table of per-torrent records, keyed by torrent id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateTable {
    records: BTreeMap<u32, StateRecord>,
}

impl StateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record for `id`, or an empty record if none is stored
    pub fn get(&self, id: u32) -> StateRecord {
        self.records.get(&id).copied().unwrap_or_default()
    }

    /// Store `record` for `id`. Writing an empty record deletes the row.
    pub fn put(&mut self, id: u32, record: StateRecord) {
        if record.is_empty() {
            self.records.remove(&id);
        } else {
            self.records.insert(id, record);
        }
    }

    /// Returns true if a row was deleted
    pub fn remove(&mut self, id: u32) -> bool {
        self.records.remove(&id).is_some()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.records.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, StateRecord)> + '_ {
        self.records.iter().map(|(id, record)| (*id, *record))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Durable storage for the state table: load everything, save everything
pub trait StateStore {
    fn load(&self) -> Result<StateTable, StoreError>;

    /// Replace the stored table. Implementations must not leave a truncated
    /// table behind if they fail part way.
    fn save(&self, table: &StateTable) -> Result<(), StoreError>;
}

/// Comma-separated text file with one row per torrent
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn io_err(&self, path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn discard_tmp(&self, tmp: &Path) {
        if let Err(e) = fs::remove_file(tmp) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(
                    path = %tmp.display(),
                    error = %e,
                    "Failed to remove temporary state file"
                );
            }
        }
    }
}

fn parse_row(line: &str) -> Result<(u32, StateRecord), String> {
    let (id, start) = line
        .split_once(',')
        .ok_or_else(|| "expected 2 columns".to_string())?;

    let id = id
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid torrent_id: {}", e))?;

    let start = start.trim();
    let low_rate_start = if start.is_empty() {
        None
    } else {
        let start = start
            .parse::<i64>()
            .map_err(|e| format!("invalid low_rate_start: {}", e))?;
        if start < 0 {
            return Err(format!("low_rate_start {} is before the unix epoch", start));
        }
        Some(start)
    };

    Ok((id, StateRecord { low_rate_start }))
}

fn format_row(id: u32, record: &StateRecord) -> String {
    match record.low_rate_start {
        Some(start) => format!("{},{}", id, start),
        None => format!("{},", id),
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<StateTable, StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No state file yet, starting empty");
                return Ok(StateTable::new());
            }
            Err(e) => return Err(self.io_err(&self.path, e)),
        };

        let reader = BufReader::new(file);
        let mut table = StateTable::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result.map_err(|e| self.io_err(&self.path, e))?;
            let line = line.trim();

            // Skip empty lines and the header
            if line.is_empty() || line == HEADER {
                continue;
            }

            match parse_row(line) {
                Ok((id, record)) => table.put(id, record),
                Err(reason) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line_num = line_num + 1,
                        error = %reason,
                        "Failed to parse state row, skipping"
                    );
                }
            }
        }

        Ok(table)
    }

    fn save(&self, table: &StateTable) -> Result<(), StoreError> {
        let tmp = self.tmp_path();

        let mut contents = String::with_capacity(HEADER.len() + 1 + table.len() * 24);
        contents.push_str(HEADER);
        contents.push('\n');
        for (id, record) in table.iter() {
            contents.push_str(&format_row(id, &record));
            contents.push('\n');
        }

        let mut file = File::create(&tmp).map_err(|e| self.io_err(&tmp, e))?;
        if let Err(e) = file
            .write_all(contents.as_bytes())
            .and_then(|_| file.sync_all())
        {
            drop(file);
            self.discard_tmp(&tmp);
            return Err(self.io_err(&tmp, e));
        }
        drop(file);

        if let Err(e) = fs::rename(&tmp, &self.path) {
            self.discard_tmp(&tmp);
            return Err(self.io_err(&self.path, e));
        }

        tracing::debug!(
            path = %self.path.display(),
            rows = table.len(),
            "State saved"
        );

        Ok(())
    }
}
