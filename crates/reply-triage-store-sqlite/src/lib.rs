// crates/reply-triage-store-sqlite/src/lib.rs
// ============================================================================
// Module: Reply Triage SQLite Store
// Description: Durable wizard persistence backed by SQLite.
// Purpose: Expose the SQLite-backed WizardStore and its configuration.
// Dependencies: crate::store
// ============================================================================

//! ## Overview
//! This crate persists in-progress wizard instances and committed outputs in
//! a single `SQLite` database. Instance saves are compare-and-set on a stored
//! version; commits apply every output and delete the instance in one
//! transaction.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::InstanceSummary;
pub use store::MAX_PAYLOAD_BYTES;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
pub use store::SqliteWizardStore;
