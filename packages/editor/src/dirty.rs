//! Dirty-node accumulator.
//!
//! Created once per history session, merged on every update that keeps
//! the current entry, cleared whenever the engine pushes a new entry or
//! discards a candidate. The change-notification coalescer reads the
//! accumulated sets.

use std::collections::{HashMap, HashSet};

use crate::state::NodeKey;

/// `true` means the element was intentionally marked dirty, not just
/// touched as an ancestor of a changed leaf.
pub type IntentionallyDirty = bool;

#[derive(Debug, Default, Clone)]
pub struct DirtyNodes {
    leaves: HashSet<NodeKey>,
    elements: HashMap<NodeKey, IntentionallyDirty>,
}

impl DirtyNodes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(
        &mut self,
        leaves: &HashSet<NodeKey>,
        elements: &HashMap<NodeKey, IntentionallyDirty>,
    ) {
        self.leaves.extend(leaves.iter().cloned());
        for (key, intentional) in elements {
            let entry = self.elements.entry(key.clone()).or_insert(false);
            *entry |= *intentional;
        }
    }

    pub fn reset(&mut self) {
        self.leaves.clear();
        self.elements.clear();
    }

    pub fn leaves(&self) -> &HashSet<NodeKey> {
        &self.leaves
    }

    pub fn elements(&self) -> &HashMap<NodeKey, IntentionallyDirty> {
        &self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty() && self.elements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_accumulates_and_reset_clears() {
        let mut dirty = DirtyNodes::new();

        let mut leaves = HashSet::new();
        leaves.insert("a".to_string());
        let mut elements = HashMap::new();
        elements.insert("p".to_string(), false);

        dirty.merge(&leaves, &elements);

        let mut elements2 = HashMap::new();
        elements2.insert("p".to_string(), true);
        dirty.merge(&HashSet::new(), &elements2);

        assert!(dirty.leaves().contains("a"));
        // Intentional flag is sticky across merges.
        assert_eq!(dirty.elements()["p"], true);

        dirty.reset();
        assert!(dirty.is_empty());
    }
}
