use std::path::{Path, PathBuf};

/// Handle to the directory a project was opened from.
///
/// Loader factories resolve relative data-source paths against it. Projects
/// built in memory have no root.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProjectRoot {
    path: Option<PathBuf>,
}

impl ProjectRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Resolves `relative` against the root; absolute paths pass through.
    pub fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let candidate = Path::new(relative);
        if candidate.is_absolute() {
            return Some(candidate.to_path_buf());
        }
        self.path.as_ref().map(|root| root.join(candidate))
    }
}
