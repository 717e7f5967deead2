// ⏰ Change tracking - equality-gated mutation with LastUpdatedDate stamping
//
// "Same content ⇒ no write". Value objects compare on business fields only
// (internal id and timestamps are ignored), and `apply_changes` mutates and
// re-stamps only when the proposed state actually differs. Re-running an
// import with identical input therefore leaves every timestamp untouched.

use chrono::{DateTime, Utc};

/// A child value inside an aggregate collection
pub trait ChangeTracked: Clone {
    /// Identifying key within the owning collection (species code, role id, ...)
    fn key(&self) -> String;

    fn last_updated_date(&self) -> DateTime<Utc>;

    /// Copy business fields from `incoming` when they differ; stamp `at`.
    /// Returns whether anything changed. Identity is never copied.
    fn apply_from(&mut self, incoming: &Self, at: DateTime<Utc>) -> bool;

    /// Stamp a freshly added item
    fn touch(&mut self, at: DateTime<Utc>);
}

/// Null and empty string are the same value for comparison
pub fn same_text(a: &Option<String>, b: &Option<String>) -> bool {
    a.as_deref().unwrap_or("") == b.as_deref().unwrap_or("")
}

/// Assign when different; report whether it changed
pub fn assign<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot != value {
        *slot = value;
        true
    } else {
        false
    }
}

/// Assign text unless it only differs by null-vs-empty
pub fn assign_text(slot: &mut Option<String>, value: Option<String>) -> bool {
    if same_text(slot, &value) {
        false
    } else {
        *slot = value;
        true
    }
}

/// What `sync_collection` did to a child collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionChanges {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

impl CollectionChanges {
    pub fn any(&self) -> bool {
        self.added + self.updated + self.removed > 0
    }
}

/// Bring `items` in line with `incoming`:
/// - matched keys are merged via `apply_from` (re-stamped only if they differ)
/// - new keys are appended and stamped
/// - keys absent from `incoming` are removed
///
/// Existing order is preserved; new items keep incoming order.
pub fn sync_collection<T: ChangeTracked>(
    items: &mut Vec<T>,
    incoming: Vec<T>,
    at: DateTime<Utc>,
) -> CollectionChanges {
    let mut changes = CollectionChanges::default();

    let incoming_keys: Vec<String> = incoming.iter().map(|i| i.key()).collect();
    let before = items.len();
    items.retain(|item| incoming_keys.contains(&item.key()));
    changes.removed = before - items.len();

    for new_item in incoming {
        let key = new_item.key();
        match items.iter_mut().find(|existing| existing.key() == key) {
            Some(existing) => {
                if existing.apply_from(&new_item, at) {
                    changes.updated += 1;
                }
            }
            None => {
                let mut added = new_item;
                added.touch(at);
                items.push(added);
                changes.added += 1;
            }
        }
    }

    changes
}

/// Merge without removal: matched keys updated, new keys appended, others untouched
pub fn merge_collection<T: ChangeTracked>(
    items: &mut Vec<T>,
    incoming: Vec<T>,
    at: DateTime<Utc>,
) -> CollectionChanges {
    let mut changes = CollectionChanges::default();

    for new_item in incoming {
        let key = new_item.key();
        match items.iter_mut().find(|existing| existing.key() == key) {
            Some(existing) => {
                if existing.apply_from(&new_item, at) {
                    changes.updated += 1;
                }
            }
            None => {
                let mut added = new_item;
                added.touch(at);
                items.push(added);
                changes.added += 1;
            }
        }
    }

    changes
}
