use crate::schema::decoded::{Decoded, Hex};
use crate::schema::key::Key;
use std::collections::HashMap;

/// An iterator over the keys of a role, resolving each key ID against a keys
/// map. Key IDs that do not resolve are skipped.
pub(crate) struct KeysIter<'a> {
    pub(crate) keyids_iter: std::slice::Iter<'a, Decoded<Hex>>,
    pub(crate) keys: &'a HashMap<Decoded<Hex>, Key>,
}

impl<'a> Iterator for KeysIter<'a> {
    type Item = &'a Key;

    fn next(&mut self) -> Option<Self::Item> {
        self.keyids_iter
            .by_ref()
            .find_map(|keyid| self.keys.get(keyid))
    }
}
