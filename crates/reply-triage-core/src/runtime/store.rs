// crates/reply-triage-core/src/runtime/store.rs
// ============================================================================
// Module: Reply Triage In-Memory Store
// Description: In-memory wizard store for tests and local runs.
// Purpose: Provide a deterministic store with the same CAS and commit semantics as SQLite.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! This module provides an in-memory implementation of [`WizardStore`] for
//! tests and local runs. Instances and ledgers share one mutex so a commit
//! writes its outputs and removes the instance under a single lock.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::InstanceId;
use crate::core::ThreadId;
use crate::core::WizardInstance;
use crate::interfaces::CommitBatch;
use crate::interfaces::StoreError;
use crate::interfaces::ThreadLedger;
use crate::interfaces::WizardStore;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Store contents guarded together.
#[derive(Debug, Default)]
struct Inner {
    /// Instances keyed by instance id.
    instances: BTreeMap<String, WizardInstance>,
    /// Committed outputs keyed by thread id.
    ledgers: BTreeMap<String, ThreadLedger>,
}

/// In-memory wizard store for tests and local runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryWizardStore {
    /// Store contents protected by a mutex.
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryWizardStore {
    /// Creates a new in-memory wizard store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Locks the store contents.
    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Store("wizard store mutex poisoned".to_string()))
    }
}

impl WizardStore for InMemoryWizardStore {
    fn load(&self, instance_id: &InstanceId) -> Result<Option<WizardInstance>, StoreError> {
        Ok(self.lock()?.instances.get(instance_id.as_str()).cloned())
    }

    fn save(&self, instance: &WizardInstance, expected_version: u64) -> Result<u64, StoreError> {
        let mut guard = self.lock()?;
        let key = instance.instance_id.as_str().to_string();
        let found = guard.instances.get(&key).map_or(0, |stored| stored.version);
        if found != expected_version {
            return Err(StoreError::Conflict {
                instance_id: key,
                expected: expected_version,
                found,
            });
        }
        let version = found + 1;
        let mut stored = instance.clone();
        stored.version = version;
        guard.instances.insert(key, stored);
        Ok(version)
    }

    fn commit(&self, batch: &CommitBatch) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let key = batch.instance_id.as_str();
        let found = guard.instances.get(key).map_or(0, |stored| stored.version);
        if found != batch.expected_version || found == 0 {
            return Err(StoreError::Conflict {
                instance_id: key.to_string(),
                expected: batch.expected_version,
                found,
            });
        }
        if let Some(record) = &batch.record {
            let mut committed = guard.ledgers.values().flat_map(|ledger| &ledger.records);
            if committed.any(|existing| existing.record_id == record.record_id) {
                return Err(StoreError::DuplicateRecord(record.record_id.as_str().to_string()));
            }
        }
        guard.instances.remove(key);
        let ledger = guard.ledgers.entry(batch.thread_id.as_str().to_string()).or_default();
        if let Some(record) = &batch.record {
            ledger.records.push(record.clone());
        }
        if let Some(backfill) = &batch.backfill {
            ledger.backfills.push(backfill.clone());
        }
        if let Some(disposition) = &batch.disposition {
            ledger.dispositions.push(disposition.clone());
        }
        Ok(())
    }

    fn ledger(&self, thread_id: &ThreadId) -> Result<ThreadLedger, StoreError> {
        Ok(self.lock()?.ledgers.get(thread_id.as_str()).cloned().unwrap_or_default())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;
    use crate::core::DispositionRecord;
    use crate::core::DraftId;
    use crate::core::DraftRef;
    use crate::core::InputSource;
    use crate::core::MessageDisposition;
    use crate::core::MessageId;
    use crate::core::SessionId;
    use crate::core::WizardKind;

    /// Fresh manual instance.
    fn instance() -> WizardInstance {
        WizardInstance::new(
            WizardKind::ObligeeAction,
            ThreadId::new("t-1"),
            InputSource::Manual,
            DraftRef {
                session_id: SessionId::new("s"),
                draft_id: DraftId::new("d"),
            },
        )
    }

    #[test]
    fn save_is_compare_and_set() {
        let store = InMemoryWizardStore::new();
        let instance = instance();
        assert_eq!(store.save(&instance, 0).unwrap(), 1);
        let err = store.save(&instance, 0).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                expected: 0,
                found: 1,
                ..
            }
        ));
        assert_eq!(store.save(&instance, 1).unwrap(), 2);
        assert_eq!(store.load(&instance.instance_id).unwrap().unwrap().version, 2);
    }

    #[test]
    fn commit_removes_instance_and_appends_ledger() {
        let store = InMemoryWizardStore::new();
        let instance = instance();
        store.save(&instance, 0).unwrap();
        let batch = CommitBatch {
            instance_id: instance.instance_id.clone(),
            expected_version: 1,
            thread_id: instance.thread_id.clone(),
            record: None,
            backfill: None,
            disposition: Some(DispositionRecord {
                message_id: MessageId::new("m-1"),
                disposition: MessageDisposition::Unrelated,
            }),
        };
        store.commit(&batch).unwrap();
        assert!(store.load(&instance.instance_id).unwrap().is_none());
        assert_eq!(store.ledger(&instance.thread_id).unwrap().dispositions.len(), 1);
        assert!(store.commit(&batch).is_err());
        assert_eq!(store.ledger(&instance.thread_id).unwrap().dispositions.len(), 1);
    }
}
