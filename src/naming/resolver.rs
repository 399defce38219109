use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, trace};

use super::{
    identity::{base_name, ContentIdentity},
    oracle,
    registry::{AllocationRegistry, ClaimOutcome},
    Resolution,
};

/// `dir/stem (n).ext`, or the path itself for `n == 0`.
pub fn numbered(path: &Path, counter: u32) -> PathBuf {
    if counter == 0 {
        return path.to_path_buf();
    }

    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let file_name = match path.extension() {
        Some(ext) => format!("{stem} ({counter}).{}", ext.to_string_lossy()),
        None => format!("{stem} ({counter})"),
    };

    path.with_file_name(file_name)
}

#[derive(Debug, Clone)]
pub struct CollisionResolver {
    registry: Arc<AllocationRegistry>,
}
impl CollisionResolver {
    pub const fn new(registry: Arc<AllocationRegistry>) -> Self {
        Self { registry }
    }

    /// Is the content already on disk or claimed in this run?
    ///
    /// Never true for an unknown size.
    fn already_satisfied(&self, candidate: &Path, identity: &ContentIdentity) -> bool {
        let Some(size) = identity.expected_size else {
            return false;
        };

        oracle::find_same_content(candidate, Some(size), self.registry.folding()).is_match()
            || self.registry.has_claim(&identity.base_name, size)
    }

    /// Cheap check against the unnumbered path only.
    pub fn precheck(&self, path: &Path, identity: &ContentIdentity) -> bool {
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let skip = self.already_satisfied(&path, identity);

        if skip {
            debug!(?path, "Pre-check found the same content, skipping");
        }
        skip
    }

    /// Find the first free numbered variant of `path` and claim it, or skip
    /// if the same content is already accounted for.
    pub fn resolve(&self, path: &Path, identity: &ContentIdentity) -> Resolution {
        let folding = self.registry.folding();

        for counter in 0.. {
            let candidate = numbered(path, counter);
            let candidate_identity = ContentIdentity {
                base_name: base_name(&candidate, folding),
                expected_size: identity.expected_size,
            };

            if self.already_satisfied(&candidate, &candidate_identity) {
                debug!(?candidate, "Same content already present, skipping");
                return Resolution::Skipped;
            }

            if self.registry.is_path_claimed(&candidate) {
                trace!(?candidate, "Name taken in this run");
                continue;
            }

            if oracle::is_occupied(&candidate, folding).is_match() {
                trace!(?candidate, "Name taken on disk");
                continue;
            }

            match self.registry.try_claim(&candidate, &candidate_identity) {
                ClaimOutcome::Claimed => {
                    debug!(?candidate, "Allocated file name");
                    return Resolution::Allocated(candidate);
                }
                ClaimOutcome::AlreadyHeld => {
                    debug!(?candidate, "Same content claimed concurrently, skipping");
                    return Resolution::Skipped;
                }
                ClaimOutcome::PathTaken => {
                    trace!(?candidate, "Name taken in this run");
                }
            }
        }

        unreachable!("counter space exhausted")
    }
}
