use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::song::Song;

static NUMBERING_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" \(\d+\)$").expect("Invalid numbering regex"));

/// How file names are compared when deciding whether two files are the same.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaseFolding {
    /// Unicode lowercase, independent of locale and host filesystem.
    #[default]
    Fold,
    Exact,
}
impl CaseFolding {
    pub fn apply(self, s: &str) -> String {
        match self {
            Self::Fold => s.to_lowercase(),
            Self::Exact => s.to_string(),
        }
    }
}

/// The unit of "sameness" for two files.
///
/// Equal base names with the same known size are the same content. An unknown
/// size matches nothing, not even another unknown size.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentIdentity {
    pub base_name: String,
    pub expected_size: Option<u64>,
}
impl ContentIdentity {
    pub fn resolve(path: &Path, song: &Song, folding: CaseFolding) -> Self {
        Self {
            base_name: base_name(path, folding),
            expected_size: song.expected_size(),
        }
    }
}

/// File stem with any `" (N)"` numbering removed, folded by `folding`.
pub fn base_name(path: &Path, folding: CaseFolding) -> String {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    folding.apply(&NUMBERING_SUFFIX.replace(&stem, ""))
}
