//! Address-bar snapshots
//!
//! A completed query is addressable as `/q/{record id}`; `/` is the empty
//! home view. Addresses carry only the id, the segments themselves are
//! reloaded from the history store.

use crate::explore::Explorer;
use crate::segment::RecordId;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Address of the empty home view
pub const HOME_PATH: &str = "/";

const SNAPSHOT_PREFIX: &str = "/q/";

/// Length of a hyphenated record id
const ID_LEN: usize = 36;

const HYPHENS: [usize; 4] = [8, 13, 18, 23];

/// Canonical address of a record
pub fn encode(id: RecordId) -> String {
    format!("{SNAPSHOT_PREFIX}{id}")
}

/// Address of the view showing `id`, or home
pub fn path_for(id: Option<RecordId>) -> String {
    id.map(encode).unwrap_or_else(|| HOME_PATH.to_string())
}

/// The record named by a canonical address.
///
/// Any other shape (home, foreign routes, truncated or braced ids,
/// trailing segments) is simply "nothing to load".
pub fn decode(path: &str) -> Option<RecordId> {
    let id = path.strip_prefix(SNAPSHOT_PREFIX)?;
    if id.len() != ID_LEN {
        return None;
    }
    let well_formed = id.bytes().enumerate().all(|(i, b)| {
        if HYPHENS.contains(&i) {
            b == b'-'
        } else {
            b.is_ascii_hexdigit()
        }
    });
    if !well_formed {
        return None;
    }
    Uuid::parse_str(id).ok().map(RecordId::from_uuid)
}

/// A navigable address with history, such as a browser router.
pub trait Navigator {
    fn current_path(&self) -> String;

    /// Push `path` as a new history entry
    fn navigate(&mut self, path: &str);
}

/// In-memory back/forward history
#[derive(Debug, Clone)]
pub struct MemoryHistory {
    entries: Vec<String>,
    index: usize,
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::starting_at(HOME_PATH)
    }

    pub fn starting_at(path: &str) -> Self {
        Self {
            entries: vec![path.to_string()],
            index: 0,
        }
    }

    pub fn back(&mut self) -> bool {
        if self.index == 0 {
            return false;
        }
        self.index -= 1;
        true
    }

    pub fn forward(&mut self) -> bool {
        if self.index + 1 >= self.entries.len() {
            return false;
        }
        self.index += 1;
        true
    }

    /// Entries recorded, counting the starting one
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Navigator for MemoryHistory {
    fn current_path(&self) -> String {
        self.entries[self.index].clone()
    }

    fn navigate(&mut self, path: &str) {
        self.entries.truncate(self.index + 1);
        self.entries.push(path.to_string());
        self.index = self.entries.len() - 1;
    }
}

/// Keeps an explorer and an address bar in step.
pub struct AddressSync<N> {
    explorer: Arc<Explorer>,
    navigator: N,
}

impl<N: Navigator> AddressSync<N> {
    pub fn new(explorer: Arc<Explorer>, navigator: N) -> Self {
        Self {
            explorer,
            navigator,
        }
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    pub fn navigator_mut(&mut self) -> &mut N {
        &mut self.navigator
    }

    /// Push the active record's address if it changed.
    ///
    /// Returns the address pushed, if any.
    pub fn publish(&mut self) -> Option<String> {
        let path = path_for(self.explorer.state().record_id);
        if path == self.navigator.current_path() {
            return None;
        }
        debug!(%path, "publishing address");
        self.navigator.navigate(&path);
        Some(path)
    }

    /// Load whatever the current address names.
    ///
    /// Returns whether a stored record was shown; otherwise the explorer
    /// is left at the home view.
    pub fn restore(&self) -> bool {
        let path = self.navigator.current_path();
        let id = decode(&path);
        if id.is_none() && path != HOME_PATH {
            debug!(%path, "address is not a snapshot");
        }
        self.explorer.restore(id)
    }
}
