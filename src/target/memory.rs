//! In-process target backend.
//!
//! Backs tests, demos, and dry experiments with an in-memory record
//! store. Mutating calls are counted so tests can assert that check mode
//! and no-op reconciliations never mutate.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::debug;

use crate::error::Result;
use crate::model::{CurrentState, Delta, DesiredState, ResourceIdentity};

use super::TargetSystem;

/// In-memory target backend.
#[derive(Debug, Default)]
pub struct MemoryTarget {
    /// Stored records keyed by assigned id.
    records: Mutex<BTreeMap<String, CurrentState>>,
    /// Number of mutating calls performed.
    mutations: AtomicUsize,
    /// Next id to assign.
    next_id: AtomicU64,
}

impl MemoryTarget {
    /// Creates an empty in-memory target.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record directly, bypassing the capability interface.
    ///
    /// Returns the assigned id. Intended for arranging test scenarios.
    pub fn seed(&self, attributes: BTreeMap<String, crate::model::ParamValue>) -> String {
        let id = self.assign_id();
        let state = CurrentState::new(Some(id.clone()), attributes);
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id.clone(), state);
        id
    }

    /// Returns the number of mutating calls performed so far.
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Returns true if no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn assign_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("mem-{n}")
    }
}

#[async_trait]
impl TargetSystem for MemoryTarget {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn list_candidates(&self, identity: &ResourceIdentity) -> Result<Vec<CurrentState>> {
        let records = self
            .records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let matching: Vec<CurrentState> = records
            .values()
            .filter(|state| identity.matches(&state.attributes))
            .cloned()
            .collect();

        debug!("Memory target: {} candidate(s) for ({identity})", matching.len());
        Ok(matching)
    }

    async fn create(&self, desired: &DesiredState) -> Result<CurrentState> {
        self.mutations.fetch_add(1, Ordering::SeqCst);

        let id = self.assign_id();
        let state = CurrentState::new(Some(id.clone()), desired.values().clone());

        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id, state.clone());

        Ok(state)
    }

    async fn update(&self, id: &str, delta: &Delta) -> Result<CurrentState> {
        self.mutations.fetch_add(1, Ordering::SeqCst);

        let mut records = self
            .records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let state = records.get_mut(id).ok_or_else(|| {
            crate::error::ConvergeError::internal(format!("no such record: {id}"))
        })?;

        for (key, value) in &delta.changes {
            state.attributes.insert(key.clone(), value.clone());
        }

        Ok(state.clone())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.mutations.fetch_add(1, Ordering::SeqCst);

        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(id);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ParamValue, Presence};

    fn attrs(name: &str, size: i64) -> BTreeMap<String, ParamValue> {
        BTreeMap::from([
            (String::from("name"), ParamValue::Str(name.to_string())),
            (String::from("size"), ParamValue::Int(size)),
        ])
    }

    #[tokio::test]
    async fn test_create_then_list() {
        let target = MemoryTarget::new();
        let desired = DesiredState::new(Presence::Present, attrs("x", 10));

        let created = target.create(&desired).await.unwrap();
        assert!(created.id.is_some());
        assert_eq!(target.mutation_count(), 1);

        let identity = ResourceIdentity::new(BTreeMap::from([(
            String::from("name"),
            ParamValue::Str(String::from("x")),
        )]));
        let candidates = target.list_candidates(&identity).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].attributes, attrs("x", 10));
    }

    #[tokio::test]
    async fn test_list_is_read_only() {
        let target = MemoryTarget::new();
        target.seed(attrs("x", 10));

        let identity = ResourceIdentity::new(BTreeMap::from([(
            String::from("name"),
            ParamValue::Str(String::from("x")),
        )]));
        let _ = target.list_candidates(&identity).await.unwrap();
        assert_eq!(target.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_update_merges_delta() {
        let target = MemoryTarget::new();
        let id = target.seed(attrs("x", 10));

        let delta = Delta {
            changes: BTreeMap::from([(String::from("size"), ParamValue::Int(20))]),
        };
        let updated = target.update(&id, &delta).await.unwrap();
        assert_eq!(updated.attributes.get("size"), Some(&ParamValue::Int(20)));
        assert_eq!(
            updated.attributes.get("name"),
            Some(&ParamValue::Str(String::from("x")))
        );
    }

    #[tokio::test]
    async fn test_delete_absent_is_ok() {
        let target = MemoryTarget::new();
        assert!(target.delete("mem-99").await.is_ok());
        assert!(target.is_empty());
    }
}
