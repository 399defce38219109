use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{debug, trace};

use super::identity::{base_name, CaseFolding};

/// Result of looking at the filesystem.
///
/// `Indeterminate` means the filesystem could not be read; the error is logged
/// where it happens. Callers treat it exactly like `NoMatch`: a probe never
/// blocks allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Match,
    NoMatch,
    Indeterminate,
}
impl Probe {
    pub const fn is_match(self) -> bool {
        matches!(self, Self::Match)
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn read_dir_probe(dir: &Path) -> Result<fs::ReadDir, Probe> {
    fs::read_dir(dir).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            return Probe::NoMatch;
        }
        debug!(?dir, ?e, "Could not list directory, treating as no match");
        Probe::Indeterminate
    })
}

/// Is there a file next to `path` with the same base name and exactly
/// `expected_size` bytes?
///
/// Without an expected size the directory is still listed, but nothing can
/// match.
pub fn find_same_content(path: &Path, expected_size: Option<u64>, folding: CaseFolding) -> Probe {
    let dir = parent_dir(path);
    let target = base_name(path, folding);

    let entries = match read_dir_probe(&dir) {
        Ok(entries) => entries,
        Err(probe) => return probe,
    };

    for entry in entries.flatten() {
        let entry_path = entry.path();
        if base_name(&entry_path, folding) != target {
            continue;
        }

        let Ok(meta) = entry.metadata() else {
            continue;
        };

        trace!(path = ?entry_path, size = meta.len(), ?expected_size, "Comparing candidate on disk");

        if meta.is_file() && expected_size == Some(meta.len()) {
            debug!(path = ?entry_path, "Same content already on disk");
            return Probe::Match;
        }
    }

    Probe::NoMatch
}

/// Is the exact file name of `path` already taken on disk?
pub fn is_occupied(path: &Path, folding: CaseFolding) -> Probe {
    match folding {
        CaseFolding::Exact => match fs::symlink_metadata(path) {
            Ok(_) => Probe::Match,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Probe::NoMatch,
            Err(e) => {
                debug!(?path, ?e, "Could not stat path, treating as free");
                Probe::Indeterminate
            }
        },

        CaseFolding::Fold => {
            let Some(file_name) = path.file_name() else {
                return Probe::NoMatch;
            };
            let target = folding.apply(&file_name.to_string_lossy());

            let entries = match read_dir_probe(&parent_dir(path)) {
                Ok(entries) => entries,
                Err(probe) => return probe,
            };

            let taken = entries
                .flatten()
                .any(|e| folding.apply(&e.file_name().to_string_lossy()) == target);

            if taken {
                Probe::Match
            } else {
                Probe::NoMatch
            }
        }
    }
}
