/// Artifact reuse policy.
///
/// Every stage writes files a later run can pick up again (tagged
/// document, slide plan, rendered deck, template mapping). This policy
/// is the single place deciding whether an existing artifact is kept.
/// Assets are the exception: once written they are never overwritten,
/// forced or not.
use std::path::Path;

use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct CachePolicy {
    force: bool,
}

impl CachePolicy {
    pub fn new(force: bool) -> Self {
        Self { force }
    }

    pub fn force(&self) -> bool {
        self.force
    }

    /// Whether an existing artifact at `path` should be reused.
    pub fn reuse(&self, kind: &str, path: &Path) -> bool {
        let hit = !self.force && path.exists();
        if hit {
            debug!(kind, path = %path.display(), "reusing cached artifact");
        }
        hit
    }

    /// Whether an asset at `path` must be kept. Assets are written once
    /// and survive forced runs.
    pub fn keep_asset(&self, path: &Path) -> bool {
        path.exists()
    }
}
