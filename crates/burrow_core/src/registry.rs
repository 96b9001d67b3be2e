//! Registry of open table handles, ordered by table name then handle id.

use crate::types::HandleId;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use tracing::debug;

/// Ordered set of `(dname, handle)` pairs for every open table handle.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    open: Mutex<BTreeSet<(String, HandleId)>>,
}

impl HandleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an opened handle. Returns `false` if it was already present.
    pub fn insert(&self, dname: &str, handle: HandleId) -> bool {
        self.open.lock().insert((dname.to_string(), handle))
    }

    /// Forgets a closed handle. Unknown handles are ignored, which keeps
    /// teardown paths safe to call twice.
    pub fn remove(&self, dname: &str, handle: HandleId) -> bool {
        let removed = self.open.lock().remove(&(dname.to_string(), handle));
        if !removed {
            debug!(dname, %handle, "closing handle that was not registered");
        }
        removed
    }

    /// Whether any handle on `dname` is open.
    #[must_use]
    pub fn is_open(&self, dname: &str) -> bool {
        let open = self.open.lock();
        let from = (dname.to_string(), HandleId::new(0));
        open.range(from..)
            .next()
            .is_some_and(|(name, _)| name == dname)
    }

    /// Number of open handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.open.lock().len()
    }

    /// Whether no handle is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.open.lock().is_empty()
    }

    /// Every open handle in registry order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, HandleId)> {
        self.open.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    #[test]
    fn ties_break_by_handle_id() {
        let registry = HandleRegistry::new();
        registry.insert("b", HandleId::new(1));
        registry.insert("a", HandleId::new(7));
        registry.insert("a", HandleId::new(3));

        let names: Vec<_> = registry
            .snapshot()
            .into_iter()
            .map(|(n, h)| format!("{n}/{}", h.as_u64()))
            .collect();
        assert_eq!(names, ["a/3", "a/7", "b/1"]);
    }

    #[test]
    fn is_open_matches_whole_name_only() {
        let registry = HandleRegistry::new();
        registry.insert("orders_archive", HandleId::new(1));
        assert!(!registry.is_open("orders"));
        assert!(registry.is_open("orders_archive"));
    }

    #[test]
    fn removing_twice_is_harmless() {
        let registry = HandleRegistry::new();
        registry.insert("t", HandleId::new(1));
        assert!(registry.remove("t", HandleId::new(1)));
        assert!(!registry.remove("t", HandleId::new(1)));
        assert!(registry.is_empty());
    }

    proptest! {
        #[test]
        fn registry_tracks_open_minus_closed(
            ops in prop::collection::vec((0u8..4, 0u64..6, any::<bool>()), 0..60)
        ) {
            let registry = HandleRegistry::new();
            let mut model: BTreeMap<(String, u64), ()> = BTreeMap::new();

            for (name, id, open) in ops {
                let dname = format!("t{name}");
                if open {
                    registry.insert(&dname, HandleId::new(id));
                    model.insert((dname, id), ());
                } else {
                    registry.remove(&dname, HandleId::new(id));
                    model.remove(&(dname, id));
                }
            }

            let actual: Vec<(String, u64)> = registry
                .snapshot()
                .into_iter()
                .map(|(n, h)| (n, h.as_u64()))
                .collect();
            let expected: Vec<(String, u64)> = model.into_keys().collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
