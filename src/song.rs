use serde::Deserialize;

use crate::naming::NamingError;

/// Size the catalog reported for the track's audio file.
///
/// Catalogs are inconsistent about this field. Numbers and numeric strings
/// are read; any other JSON value is kept but never yields a size.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ReportedSize {
    Number(serde_json::Number),
    Text(String),
    Other(serde_json::Value),
}
impl ReportedSize {
    /// The size in bytes, if it is a positive whole number.
    pub fn bytes(&self) -> Option<u64> {
        match self {
            Self::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(whole_bytes)),
            Self::Text(s) => {
                let s = s.trim();
                s.parse::<u64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(whole_bytes))
            }
            Self::Other(_) => None,
        }
        .filter(|n| *n > 0)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn whole_bytes(f: f64) -> Option<u64> {
    (f.is_finite() && f.fract() == 0.0 && f >= 0.0 && f < u64::MAX as f64).then(|| f as u64)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub song_name: String,
    pub singer: String,
    pub album_name: String,
    /// Display index within the run, usually zero padded.
    pub index: String,
    pub raw_index: usize,
    pub ext: String,
    #[serde(default)]
    pub is_free_trial: bool,
    #[serde(default)]
    pub size: Option<ReportedSize>,
    #[serde(default)]
    pub program_date: Option<String>,
    #[serde(default)]
    pub program_order: Option<u32>,
}
impl Song {
    pub fn expected_size(&self) -> Option<u64> {
        self.size.as_ref().and_then(ReportedSize::bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Playlist,
    Album,
    Djradio,
}
impl SourceKind {
    const ALL: [Self; 3] = [Self::Playlist, Self::Album, Self::Djradio];

    /// Machine name, also what gets looked for in catalog URLs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Playlist => "playlist",
            Self::Album => "album",
            Self::Djradio => "djradio",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Playlist => "列表",
            Self::Album => "专辑",
            Self::Djradio => "电台",
        }
    }

    pub fn from_url(url: &str) -> Result<Self, NamingError> {
        if let Some(kind) = Self::ALL.into_iter().find(|k| url.contains(k.name())) {
            return Ok(kind);
        }

        // `#/radio` pages are the same thing as `#/djradio`
        if url.contains("#/radio") {
            return Ok(Self::Djradio);
        }

        Err(NamingError::UnsupportedSource(url.to_string()))
    }
}

#[cfg(test)]
pub(crate) fn test_song(name: &str, size: Option<i64>) -> Song {
    Song {
        song_name: name.to_string(),
        singer: "Artist A".to_string(),
        album_name: "Album 1".to_string(),
        index: "01".to_string(),
        raw_index: 0,
        ext: "mp3".to_string(),
        is_free_trial: false,
        size: size.map(|n| ReportedSize::Number(n.into())),
        program_date: None,
        program_order: None,
    }
}
