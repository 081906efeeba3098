//! On-disk layout: `<root>/<owner_id>/<job_id>/<filename>`, exports under
//! `<root>/<owner_id>/exports/`.

mod naming;
mod sanitize;

pub use naming::{filename_from_url_path, item_filename, plan_filenames, unique_filenames};
pub use sanitize::{is_safe_component, sanitize_component};

use std::path::{Path, PathBuf};

/// Directory name for export archives inside an owner directory.
pub const EXPORTS_DIR: &str = "exports";

#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn owner_dir(&self, owner_id: &str) -> PathBuf {
        self.root.join(owner_id)
    }

    pub fn job_dir(&self, owner_id: &str, job_id: &str) -> PathBuf {
        self.owner_dir(owner_id).join(job_id)
    }

    pub fn exports_dir(&self, owner_id: &str) -> PathBuf {
        self.owner_dir(owner_id).join(EXPORTS_DIR)
    }

    /// True if `path` resolves inside the owner's directory. Both sides are
    /// canonicalized, so the path must exist.
    pub fn is_owned_by(&self, owner_id: &str, path: &Path) -> bool {
        let (Ok(owner), Ok(path)) = (
            self.owner_dir(owner_id).canonicalize(),
            path.canonicalize(),
        ) else {
            return false;
        };
        path.starts_with(&owner) && path != owner
    }
}
