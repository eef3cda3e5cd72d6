//! Source archive creation for remote builds

use super::error::{RemoteError, RemoteResult};
use flate2::write::GzEncoder;
use flate2::Compression;
use ignore::{DirEntry, WalkBuilder};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, trace};

/// Directories that are pruned entirely
pub const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    ".venv",
    "venv",
    "__pycache__",
    "target",
    "dist",
    "build",
    ".next",
    ".nuxt",
    ".cache",
    ".idea",
    ".vscode",
    "coverage",
];

pub const EXCLUDED_FILES: &[&str] = &[".env", ".env.local", ".DS_Store", "Thumbs.db"];

pub const EXCLUDED_EXTENSIONS: &[&str] = &[
    "exe", "dll", "so", "dylib", "o", "a", "class", "pyc", "pyo",
];

/// A gzipped tarball held in memory
#[derive(Debug, Clone)]
pub struct SourceArchive {
    pub bytes: Vec<u8>,
    /// Lowercase hex SHA-256 of `bytes`
    pub checksum: String,
    pub file_count: usize,
}

impl SourceArchive {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn is_excluded(entry: &DirEntry) -> bool {
    let Some(name) = entry.file_name().to_str() else {
        return false;
    };
    let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
    if is_dir {
        return EXCLUDED_DIRS.contains(&name);
    }
    if EXCLUDED_FILES.contains(&name) {
        return true;
    }
    entry
        .path()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| EXCLUDED_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

fn archive_error(e: impl std::fmt::Display) -> RemoteError {
    RemoteError::Archive(e.to_string())
}

/// Archives `root` as `.tar.gz`, skipping the exclusion set.
///
/// Excluded directories are never descended into. Symlinks are stored as
/// link entries, not followed. `.gitignore` files are not consulted.
pub fn create_archive(root: &Path) -> RemoteResult<SourceArchive> {
    if !root.is_dir() {
        return Err(RemoteError::Archive(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let mut tar = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    tar.follow_symlinks(false);

    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(|e| !is_excluded(e))
        .build();

    let mut file_count = 0;
    for entry in walker {
        let entry = entry.map_err(archive_error)?;
        let path = entry.path();
        if path == root {
            continue;
        }
        let relative = path.strip_prefix(root).map_err(archive_error)?;
        let Some(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            tar.append_dir(relative, path).map_err(archive_error)?;
        } else {
            tar.append_path_with_name(path, relative)
                .map_err(archive_error)?;
            file_count += 1;
        }
        trace!(path = %relative.display(), "Archived");
    }

    let bytes = tar
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .map_err(archive_error)?;
    let checksum = sha256_hex(&bytes);

    debug!(
        root = %root.display(),
        files = file_count,
        bytes = bytes.len(),
        checksum = %checksum,
        "Created source archive"
    );

    Ok(SourceArchive {
        bytes,
        checksum,
        file_count,
    })
}
