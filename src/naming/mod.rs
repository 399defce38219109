pub mod identity;
pub mod oracle;
pub mod registry;
pub mod resolver;
pub mod template;

use std::{path::PathBuf, sync::Arc};

use identity::ContentIdentity;
use registry::AllocationRegistry;
use resolver::CollisionResolver;
use tracing::debug;

use crate::song::{Song, SourceKind};

#[derive(Debug, thiserror::Error)]
pub enum NamingError {
    #[error("unsupported source type: {0}")]
    UnsupportedSource(String),
}

/// Where a song should be written, if anywhere.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Allocated(PathBuf),
    /// The same content is already on disk or claimed in this run.
    Skipped,
}

#[derive(Debug, Clone, Copy)]
pub struct FileNameRequest<'a> {
    pub format: &'a str,
    pub song: &'a Song,
    /// Catalog page the song came from, used to tell the source type.
    pub source_url: &'a str,
    pub name: &'a str,
    pub check_skip_exists: bool,
}

#[derive(Debug, Clone)]
pub struct FileNamer {
    registry: Arc<AllocationRegistry>,
    resolver: CollisionResolver,
}
impl FileNamer {
    pub fn new(registry: Arc<AllocationRegistry>) -> Self {
        Self {
            resolver: CollisionResolver::new(Arc::clone(&registry)),
            registry,
        }
    }

    #[tracing::instrument(skip_all, fields(song = %req.song.song_name, index = %req.song.index))]
    pub fn file_name(&self, req: FileNameRequest<'_>) -> Result<Resolution, NamingError> {
        let kind = SourceKind::from_url(req.source_url)?;
        let path = template::render(req.format, kind, req.song, req.name);
        let identity = ContentIdentity::resolve(&path, req.song, self.registry.folding());
        debug!(?path, ?identity, "Rendered file name");

        if req.check_skip_exists && self.resolver.precheck(&path, &identity) {
            return Ok(Resolution::Skipped);
        }

        Ok(self.resolver.resolve(&path, &identity))
    }
}
