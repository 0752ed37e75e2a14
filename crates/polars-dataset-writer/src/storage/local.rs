//! Local filesystem backend

use std::fs;
use std::path::Path;

use super::StorageBackend;
use crate::error::Result;

/// `std::fs` backed storage. Accepts plain paths and `file://` URIs.
#[derive(Debug, Default)]
pub struct LocalBackend;

impl LocalBackend {
    pub fn new() -> Self {
        Self
    }

    fn local_path(path: &str) -> &Path {
        Path::new(path.strip_prefix("file://").unwrap_or(path))
    }
}

impl StorageBackend for LocalBackend {
    fn exists(&self, path: &str) -> Result<bool> {
        Ok(Self::local_path(path).exists())
    }

    fn is_dir(&self, path: &str) -> Result<bool> {
        Ok(Self::local_path(path).is_dir())
    }

    fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        let path = Self::local_path(path);
        if path.is_file() {
            return Ok(Vec::new());
        }

        let mut names = fs::read_dir(path)?
            .map(|entry| Ok(entry?.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<Vec<_>>>()?;
        names.sort();
        Ok(names)
    }

    fn make_dir(&self, path: &str) -> Result<()> {
        fs::create_dir_all(Self::local_path(path))?;
        Ok(())
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        fs::remove_file(Self::local_path(path))?;
        Ok(())
    }

    fn remove_dir_all(&self, path: &str) -> Result<()> {
        let path = Self::local_path(path);
        if path.is_dir() {
            fs::remove_dir_all(path)?;
        } else if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        Ok(fs::read(Self::local_path(path))?)
    }

    fn write_file(&self, path: &str, data: Vec<u8>) -> Result<()> {
        let path = Self::local_path(path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, data)?;
        Ok(())
    }
}
