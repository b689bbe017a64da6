//! Tracks One-Cancels-Other (OCO) linkage between orders.
//!
//! A small owned collaborator wrapping its state in `Arc<RwLock<...>>` so it
//! can be cloned into an `AdmissionCoordinator` and shared across product
//! books without becoming a process-global singleton. `parking_lot` is used
//! rather than an async-aware lock because every access here happens inside
//! a synchronous critical section (ProductBook's lock already serializes
//! matching; this registry never awaits anything).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Dual-keyed linkage: each registered pair is reachable from either id.
#[derive(Debug, Clone, Default)]
pub struct OrderRelationshipRegistry {
    links: Arc<RwLock<HashMap<String, String>>>,
}

impl OrderRelationshipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link two order ids as an OCO pair. Registering a pair twice for the
    /// same ids is idempotent; registering either id against a different
    /// counterpart replaces the old link (stale OCO state should never
    /// survive an order being resubmitted under a reused id).
    pub fn link_oco(&self, a: &str, b: &str) {
        let mut links = self.links.write();
        links.insert(a.to_string(), b.to_string());
        links.insert(b.to_string(), a.to_string());
    }

    /// The id linked to `id` via OCO, if any.
    pub fn linked_to(&self, id: &str) -> Option<String> {
        self.links.read().get(id).cloned()
    }

    /// Remove `id` from the registry, returning its former counterpart.
    /// Called once an OCO order reaches a final state, whether by trading,
    /// being cancelled directly, or being cascaded from its sibling, so the
    /// link cannot be followed twice.
    pub fn unlink(&self, id: &str) -> Option<String> {
        let mut links = self.links.write();
        let counterpart = links.remove(id)?;
        links.remove(&counterpart);
        Some(counterpart)
    }

    pub fn is_linked(&self, id: &str) -> bool {
        self.links.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.links.read().len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linked_pair_resolves_both_ways() {
        let reg = OrderRelationshipRegistry::new();
        reg.link_oco("a", "b");
        assert_eq!(reg.linked_to("a").as_deref(), Some("b"));
        assert_eq!(reg.linked_to("b").as_deref(), Some("a"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn unlink_removes_both_entries() {
        let reg = OrderRelationshipRegistry::new();
        reg.link_oco("a", "b");
        let counterpart = reg.unlink("a").unwrap();
        assert_eq!(counterpart, "b");
        assert!(!reg.is_linked("a"));
        assert!(!reg.is_linked("b"));
        assert!(reg.is_empty());
    }

    #[test]
    fn relinking_replaces_stale_pair() {
        let reg = OrderRelationshipRegistry::new();
        reg.link_oco("a", "b");
        reg.link_oco("a", "c");
        assert_eq!(reg.linked_to("a").as_deref(), Some("c"));
        assert_eq!(reg.linked_to("c").as_deref(), Some("a"));
    }

    #[test]
    fn unknown_id_has_no_link() {
        let reg = OrderRelationshipRegistry::new();
        assert!(reg.linked_to("ghost").is_none());
        assert!(reg.unlink("ghost").is_none());
    }
}
