use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Read-only settings shared by every request thread.
#[derive(Debug, Clone)]
pub struct DashboardState {
    pub root: PathBuf,
    /// How often the event stream polls `events.jsonl` for new lines.
    pub poll_interval: Duration,
}

pub type SharedState = Arc<DashboardState>;

impl DashboardState {
    pub fn new(root: PathBuf) -> DashboardState {
        DashboardState { root, poll_interval: Duration::from_millis(500) }
    }

    /// Directory of run `name`, or `None` when the name could escape the
    /// experiment root.
    pub fn run_dir(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return None;
        }
        let dir = self.root.join(name);
        if dir.is_dir() { Some(dir) } else { None }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_names_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("run_a")).unwrap();
        let state = DashboardState::new(tmp.path().to_path_buf());
        assert!(state.run_dir("run_a").is_some());
        assert!(state.run_dir("../etc").is_none());
        assert!(state.run_dir("a/b").is_none());
        assert!(state.run_dir("missing").is_none());
    }
}
