use std::{collections::HashMap, path::Path};

use parking_lot::Mutex;
use tracing::trace;

use super::identity::{base_name, CaseFolding, ContentIdentity};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Claim {
    path: String,
    size: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    /// An equal identity is already claimed; the caller should skip.
    AlreadyHeld,
    /// The path belongs to a different identity.
    PathTaken,
}

/// Names handed out during the current run.
///
/// Claims are grouped by base name. Every operation takes the same lock, so
/// a check followed by a claim through [`Self::try_claim`] is one step even
/// when several resolutions run at once.
#[derive(Debug, Default)]
pub struct AllocationRegistry {
    folding: CaseFolding,
    claims: Mutex<HashMap<String, Vec<Claim>>>,
}
impl AllocationRegistry {
    pub fn new(folding: CaseFolding) -> Self {
        Self {
            folding,
            claims: Mutex::default(),
        }
    }

    pub const fn folding(&self) -> CaseFolding {
        self.folding
    }

    fn path_key(&self, path: &Path) -> String {
        self.folding.apply(&path.to_string_lossy())
    }

    pub fn has_claim(&self, base_name: &str, size: u64) -> bool {
        self.claims
            .lock()
            .get(base_name)
            .is_some_and(|claims| claims.iter().any(|c| c.size == Some(size)))
    }

    pub fn is_path_claimed(&self, path: &Path) -> bool {
        let key = self.path_key(path);
        self.claims
            .lock()
            .get(&base_name(path, self.folding))
            .is_some_and(|claims| claims.iter().any(|c| c.path == key))
    }

    /// Record a claim unconditionally. Claiming the same path and size twice
    /// keeps one claim.
    #[allow(dead_code)]
    pub fn claim(&self, path: &Path, identity: &ContentIdentity) {
        let claim = Claim {
            path: self.path_key(path),
            size: identity.expected_size,
        };

        let mut claims = self.claims.lock();
        add_claim(claims.entry(identity.base_name.clone()).or_default(), claim);
    }

    pub fn try_claim(&self, path: &Path, identity: &ContentIdentity) -> ClaimOutcome {
        let key = self.path_key(path);

        let mut claims = self.claims.lock();
        let entry = claims.entry(identity.base_name.clone()).or_default();

        if identity.expected_size.is_some() && entry.iter().any(|c| c.size == identity.expected_size) {
            return ClaimOutcome::AlreadyHeld;
        }

        if entry.iter().any(|c| c.path == key) {
            return ClaimOutcome::PathTaken;
        }

        add_claim(
            entry,
            Claim {
                path: key,
                size: identity.expected_size,
            },
        );
        ClaimOutcome::Claimed
    }

    pub fn release(&self, path: &Path, identity: &ContentIdentity) {
        let key = self.path_key(path);

        let mut claims = self.claims.lock();
        let Some(entry) = claims.get_mut(&identity.base_name) else {
            return;
        };

        entry.retain(|c| !(c.path == key && c.size == identity.expected_size));
        trace!(path = key, size = ?identity.expected_size, "Released name");

        if entry.is_empty() {
            claims.remove(&identity.base_name);
        }
    }

    pub fn reset(&self) {
        self.claims.lock().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.claims.lock().is_empty()
    }
}

fn add_claim(entry: &mut Vec<Claim>, claim: Claim) {
    if !entry.contains(&claim) {
        trace!(?claim, "Claiming name");
        entry.push(claim);
    }
}
