//! Breadcrumb navigation path
//!
//! Ordered, root-exclusive sequence of folders where each entry's parent is
//! the previous entry (or root for the first). The path is purely derived
//! state: it only changes through navigation, and an entry whose declared
//! parent contradicts the path tail forces a rebuild instead of a blind
//! append.

/// One breadcrumb entry
#[derive(Debug, Clone, PartialEq)]
pub struct PathEntry {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
}

/// Outcome of entering a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathOutcome {
    /// Folder was a child of the current target and was appended
    Descended,
    /// Folder was already on the path; everything below it was dropped
    Truncated,
    /// Folder does not fit the current path; caller must rebuild the chain
    NeedsRebuild,
}

/// Breadcrumb sequence; empty means root
#[derive(Debug, Default)]
pub struct NavigationPath {
    entries: Vec<PathEntry>,
}

impl NavigationPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// The folder currently navigated to; None is root
    pub fn target(&self) -> Option<&str> {
        self.entries.last().map(|entry| entry.id.as_str())
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[PathEntry] {
        &self.entries
    }

    /// Id of the folder one level up from the current target; None is root
    pub fn parent_target(&self) -> Option<&str> {
        if self.entries.len() < 2 {
            None
        } else {
            self.entries
                .get(self.entries.len() - 2)
                .map(|entry| entry.id.as_str())
        }
    }

    /// Enter a folder, preserving the ancestry invariant
    pub fn enter(&mut self, entry: PathEntry) -> PathOutcome {
        if let Some(position) = self.entries.iter().position(|e| e.id == entry.id) {
            self.entries.truncate(position + 1);
            return PathOutcome::Truncated;
        }
        if entry.parent_id.as_deref() == self.target() {
            self.entries.push(entry);
            return PathOutcome::Descended;
        }
        PathOutcome::NeedsRebuild
    }

    /// Install a freshly computed root-to-target chain
    pub fn replace(&mut self, chain: Vec<PathEntry>) {
        debug_assert!(chain
            .windows(2)
            .all(|pair| pair[1].parent_id.as_deref() == Some(pair[0].id.as_str())));
        debug_assert!(chain.first().map_or(true, |e| e.parent_id.is_none()));
        self.entries = chain;
    }

    /// Back to root
    pub fn reset(&mut self) {
        self.entries.clear();
    }
}
