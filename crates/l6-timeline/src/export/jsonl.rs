use crate::errors::TlError;
use crate::model::TraceEntry;
use serde::Serialize;
use serde_json::to_string;
use std::fs::{create_dir_all, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Upper bound for a single trace line; screenshots are the only large payload
pub const DEFAULT_MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

pub fn serialize_lines<T: Serialize>(
    items: &[T],
    max_payload_bytes: usize,
) -> Result<Vec<String>, TlError> {
    let mut serialized = Vec::with_capacity(items.len());
    for item in items {
        let json = to_string(item).map_err(|err| TlError::Serialization(err.to_string()))?;
        if json.len() > max_payload_bytes {
            return Err(TlError::Oversize);
        }
        serialized.push(json);
    }
    Ok(serialized)
}

pub fn write_lines(base_path: &Path, lines: &[String]) -> Result<String, TlError> {
    if let Some(parent) = base_path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)?;
        }
    }

    let mut writer = BufWriter::new(File::create(base_path)?);
    for line in lines {
        writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.write_all(b"\n"))?;
    }
    writer.flush()?;

    Ok(path_to_string(base_path))
}

/// Write a complete trace, one entry per line
pub fn write_trace(path: &Path, entries: &[TraceEntry]) -> Result<String, TlError> {
    let lines = serialize_lines(entries, DEFAULT_MAX_LINE_BYTES)?;
    write_lines(path, &lines)
}

/// Read a trace written by [`write_trace`]. Blank lines are skipped.
pub fn read_trace(path: &Path) -> Result<Vec<TraceEntry>, TlError> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(&line).map_err(|err| TlError::Malformed {
            line: index + 1,
            reason: err.to_string(),
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

fn path_to_string(path: &Path) -> String {
    path.to_path_buf()
        .components()
        .collect::<PathBuf>()
        .to_string_lossy()
        .to_string()
}
