//! Set differences shared by both reconcilers.

use std::collections::BTreeSet;

/// What to add and what to remove to turn `existing` into `desired`.
///
/// `to_add` and `to_remove` are disjoint by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetDiff<T: Ord> {
    pub to_add: BTreeSet<T>,
    pub to_remove: BTreeSet<T>,
}

impl<T: Ord> SetDiff<T> {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// `desired − existing` and `existing − desired`.
pub fn diff_sets<T: Ord + Clone>(desired: &BTreeSet<T>, existing: &BTreeSet<T>) -> SetDiff<T> {
    SetDiff {
        to_add: desired.difference(existing).cloned().collect(),
        to_remove: existing.difference(desired).cloned().collect(),
    }
}

/// Items of `desired` not present in `existing`.
pub fn missing<'a, T, I>(desired: I, existing: &BTreeSet<T>) -> BTreeSet<T>
where
    T: Ord + Clone + 'a,
    I: IntoIterator<Item = &'a T>,
{
    desired
        .into_iter()
        .filter(|item| !existing.contains(*item))
        .cloned()
        .collect()
}
