use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::store::{Document, DocumentStore, StoreError, CURRENT_POSITION_KEY};

/// Name shown for a position with no spice assigned
pub const EMPTY_SPICE: &str = "Empty";

/// Position index → spice name, iterated in ascending index order
pub type NameMap = BTreeMap<usize, String>;

/// Errors from position mutations
#[derive(Debug, Error)]
pub enum PositionError {
    /// Index outside the rack's position range
    #[error("position {0} does not exist on this rack")]
    UnknownPosition(usize),

    /// Remote write or read failed (local state is kept)
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One slot of the rack as seen by the panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    /// Position index
    pub index: usize,
    /// Assigned spice name, [`EMPTY_SPICE`] when unassigned
    pub name: String,
    /// Whether this is the current position
    pub selected: bool,
}

/// Read-only view of the live name mapping, shareable with worker threads
///
/// Only the owning [`PositionStore`] writes through it.
#[derive(Clone, Default)]
pub struct SharedNames(Arc<RwLock<NameMap>>);

impl SharedNames {
    /// Runs `f` against the mapping under the read lock
    pub fn read<R>(&self, f: impl FnOnce(&NameMap) -> R) -> R {
        let guard = self.0.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Copy of the mapping
    #[must_use]
    pub fn snapshot(&self) -> NameMap {
        self.read(Clone::clone)
    }

    fn write<R>(&self, f: impl FnOnce(&mut NameMap) -> R) -> R {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl From<NameMap> for SharedNames {
    fn from(names: NameMap) -> Self {
        Self(Arc::new(RwLock::new(names)))
    }
}

/// Rack state mirrored to a [`DocumentStore`]
///
/// Every mutation updates local state first and then writes the single affected
/// key remotely. A failed write is returned to the caller but not rolled back.
pub struct PositionStore<S> {
    store: S,
    indices: Range<usize>,
    names: SharedNames,
    current: Option<usize>,
}

impl<S: DocumentStore> PositionStore<S> {
    /// Creates a store with every position empty and nothing selected
    pub fn new(store: S, indices: Range<usize>) -> Self {
        let names = SharedNames::default();
        names.write(|map| {
            for index in indices.clone() {
                map.insert(index, EMPTY_SPICE.to_owned());
            }
        });

        Self {
            store,
            indices,
            names,
            current: None,
        }
    }

    /// Creates a store and loads the remote document into it
    ///
    /// # Errors
    /// Returns error if the remote document cannot be fetched
    pub fn open(store: S, indices: Range<usize>) -> Result<Self, StoreError> {
        let mut positions = Self::new(store, indices);
        positions.load()?;
        Ok(positions)
    }

    /// Replaces local state with the remote document
    ///
    /// Positions without a remote entry become [`EMPTY_SPICE`]. Malformed entries
    /// (non-integer keys, non-string names, indices outside the rack) are skipped.
    ///
    /// # Errors
    /// Returns error if the remote document cannot be fetched
    pub fn load(&mut self) -> Result<(NameMap, Option<usize>), StoreError> {
        let document = self.store.fetch_root()?;
        let (names, current) = parse_document(&document, &self.indices);

        info!(
            assigned = names.values().filter(|name| *name != EMPTY_SPICE).count(),
            current = ?current,
            "loaded rack state"
        );

        self.names.write(|map| map.clone_from(&names));
        self.current = current;

        Ok((names, current))
    }

    /// Marks `index` as the current position and records it remotely
    ///
    /// Returns the previously current index, whose selection is cleared.
    ///
    /// # Errors
    /// Returns error for an unknown index or if the remote write fails
    pub fn set_current(&mut self, index: usize) -> Result<Option<usize>, PositionError> {
        self.check_index(index)?;

        let previous = self.current.replace(index);
        if let Some(previous) = previous {
            debug!(previous, "cleared selection");
        }
        info!(index, "position selected");

        self.store
            .set_child(CURRENT_POSITION_KEY, &Value::from(index))?;
        Ok(previous)
    }

    /// Assigns a spice name to `index`
    ///
    /// Whitespace is trimmed; blank input is ignored without touching the store.
    /// Returns `false` when the input was blank.
    ///
    /// # Errors
    /// Returns error for an unknown index or if the remote write fails
    pub fn rename(&mut self, index: usize, new_name: &str) -> Result<bool, PositionError> {
        self.check_index(index)?;

        let new_name = new_name.trim();
        if new_name.is_empty() {
            debug!(index, "ignoring blank spice name");
            return Ok(false);
        }

        self.assign(index, new_name)?;
        Ok(true)
    }

    /// Resets `index` to [`EMPTY_SPICE`]
    ///
    /// # Errors
    /// Returns error for an unknown index or if the remote write fails
    pub fn clear(&mut self, index: usize) -> Result<(), PositionError> {
        self.check_index(index)?;
        self.assign(index, EMPTY_SPICE)
    }

    fn assign(&mut self, index: usize, name: &str) -> Result<(), PositionError> {
        self.names.write(|map| map.insert(index, name.to_owned()));
        info!(index, name, "position renamed");

        self.store.set_child(&index.to_string(), &Value::from(name))?;
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<(), PositionError> {
        if self.indices.contains(&index) {
            Ok(())
        } else {
            warn!(index, "rejected unknown position");
            Err(PositionError::UnknownPosition(index))
        }
    }
}

impl<S> PositionStore<S> {
    /// Spice name at `index`
    #[must_use]
    pub fn name(&self, index: usize) -> Option<String> {
        self.names.read(|map| map.get(&index).cloned())
    }

    /// Copy of the full mapping
    #[must_use]
    pub fn names(&self) -> NameMap {
        self.names.snapshot()
    }

    /// Live view of the mapping for readers on other threads
    #[must_use]
    pub fn shared_names(&self) -> SharedNames {
        self.names.clone()
    }

    /// Currently selected index
    #[must_use]
    pub const fn current(&self) -> Option<usize> {
        self.current
    }

    /// Valid position indices
    #[must_use]
    pub fn indices(&self) -> Range<usize> {
        self.indices.clone()
    }

    /// Every position with its name and selection flag
    #[must_use]
    pub fn positions(&self) -> Vec<Position> {
        self.names.read(|map| {
            map.iter()
                .map(|(&index, name)| Position {
                    index,
                    name: name.clone(),
                    selected: self.current == Some(index),
                })
                .collect()
        })
    }

    /// Releases the underlying document store
    pub fn into_inner(self) -> S {
        self.store
    }
}

/// Extracts the name mapping and current index from a raw document
pub(crate) fn parse_document(document: &Document, indices: &Range<usize>) -> (NameMap, Option<usize>) {
    let mut names: NameMap = indices
        .clone()
        .map(|index| (index, EMPTY_SPICE.to_owned()))
        .collect();
    let mut current = None;

    for (key, value) in document {
        if key == CURRENT_POSITION_KEY {
            current = value
                .as_u64()
                .and_then(|index| usize::try_from(index).ok())
                .filter(|index| indices.contains(index));
            if current.is_none() && !value.is_null() {
                debug!(%value, "skipping malformed current position");
            }
            continue;
        }

        let Ok(index) = key.parse::<usize>() else {
            debug!(key, "skipping non-integer key");
            continue;
        };
        if !indices.contains(&index) {
            debug!(index, "skipping position outside the rack");
            continue;
        }
        let Some(name) = value.as_str() else {
            debug!(index, %value, "skipping non-string spice name");
            continue;
        };

        names.insert(index, name.to_owned());
    }

    (names, current)
}

/// Every stored position in index order, for read-only viewers
///
/// Unlike [`PositionStore::load`] this is not limited to the rack's range and
/// does not fill in empty slots: keys that are not integers and values that are
/// not strings are skipped.
#[must_use]
pub fn stored_positions(document: &Document) -> Vec<Position> {
    let current = document.get(CURRENT_POSITION_KEY).and_then(Value::as_u64);

    let listing: NameMap = document
        .iter()
        .filter_map(|(key, value)| Some((key.parse::<usize>().ok()?, value.as_str()?.to_owned())))
        .collect();

    listing
        .into_iter()
        .map(|(index, name)| Position {
            index,
            name,
            selected: current == u64::try_from(index).ok(),
        })
        .collect()
}
