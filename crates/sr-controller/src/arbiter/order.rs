//! Total order over controller node identifiers.

use sr_types::NodeId;
use std::cmp::Ordering;

/// Comparator used to elect a pair owner.
///
/// Every instance of the cluster must use the same implementation or two
/// nodes may both believe they own a pair.
pub trait NodeOrder: Send + Sync {
    fn compare(&self, a: &NodeId, b: &NodeId) -> Ordering;
}

/// Plain string comparison of node identifiers.
///
/// `"192.168.1.10"` sorts before `"192.168.1.2"`; identifiers are not
/// interpreted as addresses.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicographicOrder;

impl NodeOrder for LexicographicOrder {
    fn compare(&self, a: &NodeId, b: &NodeId) -> Ordering {
        a.as_str().cmp(b.as_str())
    }
}
