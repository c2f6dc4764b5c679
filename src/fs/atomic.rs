//! Crash-safe file replacement.
//!
//! Content goes to a uniquely named temporary file next to the target, is
//! synced, and is then renamed over the target. Readers see either the old
//! file or the new one, never a partial write. A crash can leave a
//! `.{name}.{uuid}.tmp` file behind; it is never read.

use crate::error::{Result, TaskgateError};
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Atomically replace `path` with `content`, creating parent directories.
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty())
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            io_error(format!(
                "failed to create directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let temp_path = temp_path_for(path)?;
    if let Err(e) = write_and_sync(&temp_path, content) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        io_error(format!(
            "failed to atomically replace '{}': {}",
            path.display(),
            e
        ))
    })?;

    #[cfg(unix)]
    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }

    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn atomic_write_json<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    let mut json = serde_json::to_vec_pretty(value).map_err(|e| {
        io_error(format!(
            "failed to serialize '{}': {}",
            path.display(),
            e
        ))
    })?;
    json.push(b'\n');
    atomic_write(path, &json)
}

fn temp_path_for(target: &Path) -> Result<PathBuf> {
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io_error(format!("invalid file path '{}'", target.display())))?;
    let parent = target.parent().unwrap_or(Path::new("."));
    Ok(parent.join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple())))
}

fn write_and_sync(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| {
        io_error(format!(
            "failed to create temporary file '{}': {}",
            path.display(),
            e
        ))
    })?;
    file.write_all(content)
        .and_then(|_| file.sync_all())
        .map_err(|e| {
            io_error(format!(
                "failed to write temporary file '{}': {}",
                path.display(),
                e
            ))
        })
}

fn io_error(message: String) -> TaskgateError {
    TaskgateError::UserError(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_replaces_existing() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("state.json");
        fs::write(&file_path, "original").unwrap();

        atomic_write(&file_path, b"replacement").unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "replacement");
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("nested").join("dirs").join("a.txt");

        atomic_write(&file_path, b"nested").unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "nested");
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("a.txt");

        atomic_write(&file_path, b"one").unwrap();
        atomic_write(&file_path, b"two").unwrap();

        let names: Vec<String> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt"]);
    }

    #[test]
    fn test_atomic_write_json() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("v.json");

        atomic_write_json(&file_path, &vec![1, 2, 3]).unwrap();

        let content = fs::read_to_string(&file_path).unwrap();
        assert!(content.ends_with('\n'));
        let parsed: Vec<u32> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, vec![1, 2, 3]);
    }

    #[test]
    fn test_concurrent_writers_to_different_files() {
        let temp_dir = TempDir::new().unwrap();

        std::thread::scope(|s| {
            for i in 0..8 {
                let path = temp_dir.path().join(format!("f{}.txt", i));
                s.spawn(move || atomic_write(&path, format!("content {}", i).as_bytes()).unwrap());
            }
        });

        for i in 0..8 {
            let path = temp_dir.path().join(format!("f{}.txt", i));
            assert_eq!(fs::read_to_string(path).unwrap(), format!("content {}", i));
        }
    }
}
