use std::collections::HashMap;
use tracing::debug;

/// Game name -> surrogate id of the sales row inserted for it in this run.
///
/// Names are not unique across (year, genre, publisher); a later insert for the
/// same name replaces the earlier id and is counted as shadowed.
#[derive(Debug, Default)]
pub struct IdentityMap {
    ids: HashMap<String, i32>,
    shadowed: u64,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the id assigned to `name`; returns the id it replaced, if any.
    pub fn record(&mut self, name: &str, id: i32) -> Option<i32> {
        let previous = self.ids.insert(name.to_string(), id);
        if let Some(prev) = previous {
            self.shadowed += 1;
            debug!(name, previous_id = prev, id, "sales name shadowed by later insert");
        }
        previous
    }

    pub fn resolve(&self, name: &str) -> Option<i32> {
        self.ids.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn shadowed(&self) -> u64 {
        self.shadowed
    }
}
