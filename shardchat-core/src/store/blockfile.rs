/*
    blockfile.rs - Fixed-capacity shard files

    Every persisted collection is split into shards of `block_size`
    records: shard = id / block_size, offset = id % block_size. Shards
    are named by their index inside the collection directory. Text
    collections hold one record per line; JSON collections hold one
    serde document per shard.

    Dense id allocation uses a persisted `next_id` counter file per
    collection, read and bumped under the owning store's lock in the
    same critical section as the write that consumes the id.
*/

use crate::store::errors::{StoreError, StoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const COUNTER_FILE: &str = "next_id";

/// Shard index holding the record with this id
pub fn shard_index(id: u64, block_size: u64) -> u64 {
    id / block_size
}

/// Position of the record inside its shard
pub fn shard_offset(id: u64, block_size: u64) -> usize {
    (id % block_size) as usize
}

/// Path of a shard inside its collection directory
pub fn shard_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(index.to_string())
}

/// Number of contiguous shards present, counting up from shard 0
pub fn shard_count(dir: &Path) -> u64 {
    let mut index = 0;
    while shard_path(dir, index).exists() {
        index += 1;
    }
    index
}

/// Read all records of a line-oriented shard
pub fn read_lines(path: &Path) -> StoreResult<Vec<String>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = Vec::new();
    for line in reader.lines() {
        lines.push(line?);
    }
    Ok(lines)
}

/// Append one record to a line-oriented shard, creating it if absent
pub fn append_line(path: &Path, line: &str) -> StoreResult<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Truncate-rewrite a line-oriented shard with the given records.
///
/// The new content lands in a sibling temp file which is renamed over
/// the shard, so a concurrent reader sees either the old or the new
/// content, never a half-written file.
pub fn write_lines(path: &Path, lines: &[String]) -> StoreResult<()> {
    let tmp = tmp_path(path);
    {
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        for line in lines {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Decode the serde document held by a JSON shard
pub fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<T> {
    let file = File::open(path)?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| StoreError::corrupt(path.display().to_string(), e.to_string()))
}

/// Truncate-rewrite a JSON shard, atomically as in `write_lines`
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let tmp = tmp_path(path);
    {
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, value)
            .map_err(|e| StoreError::corrupt(path.display().to_string(), e.to_string()))?;
        writer.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Read the collection's persisted dense-id counter (0 if absent)
pub fn read_counter(dir: &Path) -> StoreResult<u64> {
    let path = dir.join(COUNTER_FILE);
    if !path.exists() {
        return Ok(0);
    }
    let raw = std::fs::read_to_string(&path)?;
    raw.trim()
        .parse()
        .map_err(|_| StoreError::corrupt(path.display().to_string(), "bad counter value"))
}

/// Persist the collection's dense-id counter
pub fn write_counter(dir: &Path, value: u64) -> StoreResult<()> {
    let path = dir.join(COUNTER_FILE);
    let tmp = tmp_path(&path);
    std::fs::write(&tmp, format!("{}\n", value))?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Sibling temp path used for atomic rewrites. Writers are serialized
/// by the owning store's lock, so one temp name per file suffices.
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_shard_math() {
        assert_eq!(shard_index(0, 200), 0);
        assert_eq!(shard_index(199, 200), 0);
        assert_eq!(shard_index(200, 200), 1);
        assert_eq!(shard_offset(200, 200), 0);
        assert_eq!(shard_offset(250, 200), 50);
    }

    #[test]
    fn test_append_and_read_lines() {
        let dir = tempdir().unwrap();
        let path = shard_path(dir.path(), 0);

        append_line(&path, "0 alice pw").unwrap();
        append_line(&path, "1 bob pw").unwrap();

        let lines = read_lines(&path).unwrap();
        assert_eq!(lines, vec!["0 alice pw".to_string(), "1 bob pw".to_string()]);
    }

    #[test]
    fn test_write_lines_truncates() {
        let dir = tempdir().unwrap();
        let path = shard_path(dir.path(), 0);

        append_line(&path, "stale").unwrap();
        write_lines(&path, &["fresh".to_string()]).unwrap();

        assert_eq!(read_lines(&path).unwrap(), vec!["fresh".to_string()]);
    }

    #[test]
    fn test_counter_round_trip() {
        let dir = tempdir().unwrap();
        assert_eq!(read_counter(dir.path()).unwrap(), 0);

        write_counter(dir.path(), 7).unwrap();
        assert_eq!(read_counter(dir.path()).unwrap(), 7);
    }

    #[test]
    fn test_shard_count_is_contiguous() {
        let dir = tempdir().unwrap();
        assert_eq!(shard_count(dir.path()), 0);

        append_line(&shard_path(dir.path(), 0), "x").unwrap();
        append_line(&shard_path(dir.path(), 1), "y").unwrap();
        // counter file must not be counted as a shard
        write_counter(dir.path(), 2).unwrap();

        assert_eq!(shard_count(dir.path()), 2);
    }

    #[test]
    fn test_rewrites_leave_no_temp_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.json");

        write_json(&path, &vec![1u64, 2]).unwrap();
        write_lines(&dir.path().join("0"), &["a".to_string()]).unwrap();
        write_counter(dir.path(), 3).unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left: {:?}", leftovers);
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.json");

        let value = vec![1u64, 2, 3];
        write_json(&path, &value).unwrap();
        let back: Vec<u64> = read_json(&path).unwrap();
        assert_eq!(back, value);
    }
}
