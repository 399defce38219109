use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use sanitize_filename::Options as SanitizeOptions;

use crate::song::{Song, SourceKind};

pub const TRIAL_MARKER: &str = " [试听]";

const SANITIZE_OPTIONS: SanitizeOptions<'static> = SanitizeOptions {
    windows: true,
    truncate: true,
    replacement: "!",
};

fn token(name: &str) -> Regex {
    Regex::new(&format!("(?i):{name}")).expect("Invalid token regex")
}

// `:typeText` has to go before `:type`
static TYPE_TEXT: Lazy<Regex> = Lazy::new(|| token("typeText"));
static TYPE: Lazy<Regex> = Lazy::new(|| token("type"));

// same order as the values in `render`, `:rawIndex` before `:index`
static SONG_TOKENS: Lazy<[Regex; 6]> = Lazy::new(|| {
    ["songName", "singer", "albumName", "rawIndex", "index", "ext"].map(token)
});

static NAME: Lazy<Regex> = Lazy::new(|| token("name"));
static PROGRAM_DATE: Lazy<Regex> = Lazy::new(|| token("programDate"));
static PROGRAM_ORDER: Lazy<Regex> = Lazy::new(|| token("programOrder"));

pub fn sanitize(value: &str) -> String {
    sanitize_filename::sanitize_with_options(value, SANITIZE_OPTIONS)
}

fn substitute(format: &str, re: &Regex, value: &str) -> String {
    re.replace_all(format, NoExpand(&sanitize(value))).into_owned()
}

/// Fill the template's tokens from the song and its source.
///
/// Separators written in the template stay as they are, values are
/// sanitized before insertion so they can never introduce new path
/// components.
pub fn render(format: &str, kind: SourceKind, song: &Song, name: &str) -> PathBuf {
    let mut format = substitute(format, &TYPE_TEXT, kind.label());
    format = substitute(&format, &TYPE, kind.name());

    let values = [
        song.song_name.clone(),
        song.singer.clone(),
        song.album_name.clone(),
        song.raw_index.to_string(),
        song.index.clone(),
        song.ext.clone(),
    ];
    for (re, value) in SONG_TOKENS.iter().zip(&values) {
        format = substitute(&format, re, value);
    }

    format = substitute(&format, &NAME, name);

    if kind == SourceKind::Djradio {
        if let Some(date) = &song.program_date {
            format = substitute(&format, &PROGRAM_DATE, date);
        }
        if let Some(order) = song.program_order {
            format = substitute(&format, &PROGRAM_ORDER, &order.to_string());
        }
    }

    let path = PathBuf::from(format);
    if song.is_free_trial {
        mark_trial(&path)
    } else {
        path
    }
}

fn mark_trial(path: &std::path::Path) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let file_name = match path.extension() {
        Some(ext) => format!("{stem}{TRIAL_MARKER}.{}", ext.to_string_lossy()),
        None => format!("{stem}{TRIAL_MARKER}"),
    };

    path.with_file_name(file_name)
}
