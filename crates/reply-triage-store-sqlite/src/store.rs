// crates/reply-triage-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Wizard Store
// Description: Durable WizardStore backed by SQLite WAL.
// Purpose: Persist wizard instances and committed outputs with integrity hashes.
// Dependencies: reply-triage-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`WizardStore`] using `SQLite`. Each save
//! writes a canonical JSON snapshot of the instance into an append-only
//! version table, guarded by a compare-and-set on the latest version. Commit
//! outputs (records, backfills, dispositions) are stored as hashed canonical
//! JSON and written together with the instance deletion in one transaction.
//! Loads verify stored hashes and fail closed on corruption.
//! Security posture: database contents are untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use reply_triage_core::ClassificationRecord;
use reply_triage_core::CommitBatch;
use reply_triage_core::DeliveredDateBackfill;
use reply_triage_core::DispositionRecord;
use reply_triage_core::InstanceId;
use reply_triage_core::StoreError;
use reply_triage_core::ThreadId;
use reply_triage_core::ThreadLedger;
use reply_triage_core::WizardInstance;
use reply_triage_core::WizardStore;
use reply_triage_core::hashing::DEFAULT_HASH_ALGORITHM;
use reply_triage_core::hashing::HashAlgorithm;
use reply_triage_core::hashing::canonical_json_bytes;
use reply_triage_core::hashing::hash_bytes;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum snapshot or output payload size accepted by the store.
pub const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` wizard store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `max_versions`, when set, must be greater than zero.
/// - `read_pool_size` must be greater than zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Optional maximum versions kept per instance (older versions pruned).
    #[serde(default)]
    pub max_versions: Option<u64>,
    /// Number of read-only connections used for read path isolation.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
}

impl SqliteStoreConfig {
    /// Builds a configuration with defaults for everything but the path.
    #[must_use]
    pub const fn for_path(path: PathBuf) -> Self {
        Self {
            path,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::Wal,
            sync_mode: SqliteSyncMode::Full,
            max_versions: None,
            read_pool_size: 2,
        }
    }

    /// Validates limits that do not touch the filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when a limit is out of range.
    pub fn validate(&self) -> Result<(), SqliteStoreError> {
        if self.max_versions == Some(0) {
            return Err(SqliteStoreError::Invalid("max_versions must be greater than zero".to_string()));
        }
        if self.read_pool_size == 0 {
            return Err(SqliteStoreError::Invalid("read_pool_size must be greater than zero".to_string()));
        }
        validate_store_path(&self.path)
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default read connection pool size.
const fn default_read_pool_size() -> usize {
    2
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw instance state or record payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption or hash mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Payload exceeded the size limit.
    #[error("sqlite store payload too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
    /// A record with the same identifier is already committed.
    #[error("sqlite store duplicate record: {0}")]
    DuplicateRecord(String),
    /// Compare-and-set failed on the instance version.
    #[error("sqlite store conflict for {instance_id}: expected version {expected}, found {found}")]
    Conflict {
        /// Instance identifier.
        instance_id: String,
        /// Version the caller expected.
        expected: u64,
        /// Version currently stored.
        found: u64,
    },
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::Store(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::DuplicateRecord(record_id) => Self::DuplicateRecord(record_id),
            SqliteStoreError::TooLarge {
                max_bytes,
                actual_bytes,
            } => Self::Invalid(format!("payload exceeds size limit: {actual_bytes} bytes (max {max_bytes})")),
            SqliteStoreError::Conflict {
                instance_id,
                expected,
                found,
            } => Self::Conflict {
                instance_id,
                expected,
                found,
            },
        }
    }
}

/// Maps a rusqlite error into a store error.
fn db_error(err: &rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed wizard store with WAL support.
///
/// # Invariants
/// - Instance loads verify stored hashes before deserialization.
/// - Writes are serialized through the writer connection mutex.
#[derive(Clone)]
pub struct SqliteWizardStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared writer connection guarded by a mutex.
    write_connection: Arc<Mutex<Connection>>,
    /// Read-only connection pool used for read path isolation under WAL.
    read_connections: Arc<Vec<Mutex<Connection>>>,
    /// Round-robin cursor for read connection selection.
    read_cursor: Arc<AtomicUsize>,
}

/// Summary metadata for a stored instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSummary {
    /// Instance identifier.
    pub instance_id: InstanceId,
    /// Thread identifier.
    pub thread_id: ThreadId,
    /// Latest stored version.
    pub latest_version: u64,
    /// Unix milliseconds when the latest version was saved.
    pub saved_at: i64,
}

/// Hashed canonical payload ready for insertion.
struct PreparedPayload {
    /// Canonical JSON bytes.
    bytes: Vec<u8>,
    /// Hex digest of `bytes`.
    hash: String,
    /// Digest algorithm.
    algorithm: HashAlgorithm,
}

/// Raw payload read back from a table.
struct StoredPayload {
    /// Stored JSON bytes.
    bytes: Vec<u8>,
    /// Stored digest.
    hash: String,
    /// Stored algorithm label.
    algorithm: String,
}

impl SqliteWizardStore {
    /// Opens an `SQLite`-backed wizard store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        config.validate()?;
        ensure_parent_dir(&config.path)?;
        let mut write_connection = open_connection(&config)?;
        initialize_schema(&mut write_connection)?;
        let mut read_connections = Vec::with_capacity(config.read_pool_size);
        for _ in 0 .. config.read_pool_size {
            read_connections.push(Mutex::new(open_connection(&config)?));
        }
        Ok(Self {
            config,
            write_connection: Arc::new(Mutex::new(write_connection)),
            read_connections: Arc::new(read_connections),
            read_cursor: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Picks a read connection round-robin.
    fn read_connection(&self) -> &Mutex<Connection> {
        let len = self.read_connections.len();
        let index = self.read_cursor.fetch_add(1, Ordering::Relaxed) % len;
        &self.read_connections[index]
    }

    /// Runs `apply` inside a transaction on the writer connection.
    fn write<T>(
        &self,
        apply: impl FnOnce(&Transaction<'_>) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let mut guard = self
            .write_connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite write mutex poisoned".to_string()))?;
        let tx = guard.transaction().map_err(|err| db_error(&err))?;
        let value = apply(&tx)?;
        tx.commit().map_err(|err| db_error(&err))?;
        Ok(value)
    }

    /// Runs `read` inside a transaction on a pooled read connection.
    fn read<T>(
        &self,
        read: impl FnOnce(&Transaction<'_>) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let mut guard = self
            .read_connection()
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite read mutex poisoned".to_string()))?;
        let tx = guard.transaction().map_err(|err| db_error(&err))?;
        let value = read(&tx)?;
        tx.commit().map_err(|err| db_error(&err))?;
        Ok(value)
    }

    /// Verifies the store can execute a simple SQL statement.
    fn check_connection(&self) -> Result<(), SqliteStoreError> {
        self.read(|tx| {
            tx.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).map_err(|err| db_error(&err))?;
            Ok(())
        })
    }

    /// Loads the latest snapshot of an instance, verifying its hash.
    fn load_instance(&self, instance_id: &InstanceId) -> Result<Option<WizardInstance>, SqliteStoreError> {
        let fetched = self.read(|tx| fetch_latest_snapshot(tx, instance_id.as_str()))?;
        let Some((version, payload)) = fetched else {
            return Ok(None);
        };
        let instance: WizardInstance = decode_payload(&payload, instance_id.as_str())?;
        if instance.instance_id != *instance_id {
            return Err(SqliteStoreError::Invalid("instance_id mismatch between key and payload".to_string()));
        }
        if instance.version != version {
            return Err(SqliteStoreError::Corrupt(format!(
                "version mismatch for instance {instance_id}: row {version}, payload {}",
                instance.version
            )));
        }
        Ok(Some(instance))
    }

    /// Writes a new instance version if the stored version matches.
    fn save_instance(&self, instance: &WizardInstance, expected_version: u64) -> Result<u64, SqliteStoreError> {
        let next_version = expected_version
            .checked_add(1)
            .ok_or_else(|| SqliteStoreError::Invalid("instance version overflow".to_string()))?;
        let mut snapshot = instance.clone();
        snapshot.version = next_version;
        let payload = prepare_payload(&snapshot)?;
        let max_versions = self.config.max_versions;
        self.write(|tx| {
            let found = stored_version(tx, instance.instance_id.as_str())?.unwrap_or(0);
            if found != expected_version {
                return Err(SqliteStoreError::Conflict {
                    instance_id: instance.instance_id.to_string(),
                    expected: expected_version,
                    found,
                });
            }
            let next = to_sql_version(next_version)?;
            tx.execute(
                "INSERT INTO wizard_instances (instance_id, thread_id, latest_version) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(instance_id) DO UPDATE SET thread_id = excluded.thread_id, \
                 latest_version = excluded.latest_version",
                params![instance.instance_id.as_str(), instance.thread_id.as_str(), next],
            )
            .map_err(|err| db_error(&err))?;
            tx.execute(
                "INSERT INTO wizard_instance_versions (instance_id, version, state_json, state_hash, \
                 hash_algorithm, saved_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    instance.instance_id.as_str(),
                    next,
                    payload.bytes.as_slice(),
                    payload.hash.as_str(),
                    payload.algorithm.label(),
                    unix_millis()
                ],
            )
            .map_err(|err| db_error(&err))?;
            enforce_retention(tx, instance.instance_id.as_str(), next, max_versions)?;
            Ok(next_version)
        })
    }

    /// Applies a commit batch atomically.
    fn apply_commit(&self, batch: &CommitBatch) -> Result<(), SqliteStoreError> {
        let record = batch.record.as_ref().map(prepare_payload).transpose()?;
        let backfill = batch.backfill.as_ref().map(prepare_payload).transpose()?;
        let disposition = batch.disposition.as_ref().map(prepare_payload).transpose()?;
        self.write(|tx| {
            let instance_id = batch.instance_id.as_str();
            let found = stored_version(tx, instance_id)?.unwrap_or(0);
            if found == 0 || found != batch.expected_version {
                return Err(SqliteStoreError::Conflict {
                    instance_id: instance_id.to_string(),
                    expected: batch.expected_version,
                    found,
                });
            }
            tx.execute("DELETE FROM wizard_instances WHERE instance_id = ?1", params![instance_id])
                .map_err(|err| db_error(&err))?;
            let thread_id = batch.thread_id.as_str();
            let committed_at = unix_millis();
            if let (Some(record), Some(payload)) = (&batch.record, &record) {
                let existing: Option<i64> = tx
                    .query_row(
                        "SELECT 1 FROM classification_records WHERE record_id = ?1",
                        params![record.record_id.as_str()],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(|err| db_error(&err))?;
                if existing.is_some() {
                    return Err(SqliteStoreError::DuplicateRecord(record.record_id.as_str().to_string()));
                }
                tx.execute(
                    "INSERT INTO classification_records (record_id, thread_id, payload_json, payload_hash, \
                     hash_algorithm, committed_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        record.record_id.as_str(),
                        thread_id,
                        payload.bytes.as_slice(),
                        payload.hash.as_str(),
                        payload.algorithm.label(),
                        committed_at
                    ],
                )
                .map_err(|err| db_error(&err))?;
            }
            if let Some(payload) = &backfill {
                insert_output(tx, "delivered_date_backfills", thread_id, payload, committed_at)?;
            }
            if let Some(payload) = &disposition {
                insert_output(tx, "message_dispositions", thread_id, payload, committed_at)?;
            }
            Ok(())
        })
    }

    /// Reads every committed output of a thread.
    fn read_ledger(&self, thread_id: &ThreadId) -> Result<ThreadLedger, SqliteStoreError> {
        self.read(|tx| {
            let records: Vec<ClassificationRecord> =
                fetch_outputs(tx, "classification_records", thread_id.as_str())?;
            let backfills: Vec<DeliveredDateBackfill> =
                fetch_outputs(tx, "delivered_date_backfills", thread_id.as_str())?;
            let dispositions: Vec<DispositionRecord> =
                fetch_outputs(tx, "message_dispositions", thread_id.as_str())?;
            Ok(ThreadLedger {
                records,
                backfills,
                dispositions,
            })
        })
    }

    /// Lists in-progress instances, most recently saved first.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] if the query fails or stored versions are
    /// invalid.
    pub fn list_instances(&self, thread_id: Option<&ThreadId>) -> Result<Vec<InstanceSummary>, SqliteStoreError> {
        self.read(|tx| {
            let mut stmt = tx
                .prepare(
                    "SELECT i.instance_id, i.thread_id, i.latest_version, v.saved_at FROM wizard_instances i \
                     JOIN wizard_instance_versions v ON v.instance_id = i.instance_id AND v.version = \
                     i.latest_version WHERE (?1 IS NULL OR i.thread_id = ?1) ORDER BY v.saved_at DESC, \
                     i.instance_id ASC",
                )
                .map_err(|err| db_error(&err))?;
            let rows = stmt
                .query_map(params![thread_id.map(ThreadId::as_str)], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })
                .map_err(|err| db_error(&err))?;
            let mut summaries = Vec::new();
            for row in rows {
                let (instance_id, thread_id, latest_version, saved_at) = row.map_err(|err| db_error(&err))?;
                summaries.push(InstanceSummary {
                    latest_version: from_sql_version(latest_version, &instance_id)?,
                    instance_id: InstanceId::from_raw(instance_id),
                    thread_id: ThreadId::new(thread_id),
                    saved_at,
                });
            }
            Ok(summaries)
        })
    }
}

impl WizardStore for SqliteWizardStore {
    fn load(&self, instance_id: &InstanceId) -> Result<Option<WizardInstance>, StoreError> {
        self.load_instance(instance_id).map_err(StoreError::from)
    }

    fn save(&self, instance: &WizardInstance, expected_version: u64) -> Result<u64, StoreError> {
        self.save_instance(instance, expected_version).map_err(StoreError::from)
    }

    fn commit(&self, batch: &CommitBatch) -> Result<(), StoreError> {
        self.apply_commit(batch).map_err(StoreError::from)
    }

    fn ledger(&self, thread_id: &ThreadId) -> Result<ThreadLedger, StoreError> {
        self.read_ledger(thread_id).map_err(StoreError::from)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        self.check_connection().map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Payloads
// ============================================================================

/// Canonicalizes and hashes a payload, enforcing the size limit.
fn prepare_payload<T: Serialize>(value: &T) -> Result<PreparedPayload, SqliteStoreError> {
    let bytes = canonical_json_bytes(value).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    if bytes.len() > MAX_PAYLOAD_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_PAYLOAD_BYTES,
            actual_bytes: bytes.len(),
        });
    }
    let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes);
    Ok(PreparedPayload {
        bytes,
        hash: digest.value,
        algorithm: digest.algorithm,
    })
}

/// Verifies a stored payload's hash and deserializes it.
fn decode_payload<T: DeserializeOwned>(payload: &StoredPayload, key: &str) -> Result<T, SqliteStoreError> {
    let algorithm = HashAlgorithm::from_label(&payload.algorithm)
        .ok_or_else(|| SqliteStoreError::Invalid(format!("unsupported hash algorithm: {}", payload.algorithm)))?;
    let expected = hash_bytes(algorithm, &payload.bytes);
    if expected.value != payload.hash {
        return Err(SqliteStoreError::Corrupt(format!("hash mismatch for {key}")));
    }
    serde_json::from_slice(&payload.bytes).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

/// Ensures a stored payload length is within limits.
fn check_length(length: i64, key: &str) -> Result<(), SqliteStoreError> {
    let length = usize::try_from(length)
        .map_err(|_| SqliteStoreError::Invalid(format!("negative payload length for {key}")))?;
    if length > MAX_PAYLOAD_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_PAYLOAD_BYTES,
            actual_bytes: length,
        });
    }
    Ok(())
}

// ============================================================================
// SECTION: Queries
// ============================================================================

/// Reads the latest stored version of an instance.
fn stored_version(tx: &Transaction<'_>, instance_id: &str) -> Result<Option<u64>, SqliteStoreError> {
    let version: Option<i64> = tx
        .query_row(
            "SELECT latest_version FROM wizard_instances WHERE instance_id = ?1",
            params![instance_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|err| db_error(&err))?;
    version.map(|version| from_sql_version(version, instance_id)).transpose()
}

/// Fetches the latest snapshot of an instance.
fn fetch_latest_snapshot(
    tx: &Transaction<'_>,
    instance_id: &str,
) -> Result<Option<(u64, StoredPayload)>, SqliteStoreError> {
    let Some(version) = stored_version(tx, instance_id)? else {
        return Ok(None);
    };
    let sql_version = to_sql_version(version)?;
    let metadata: Option<(i64, String, String)> = tx
        .query_row(
            "SELECT length(state_json), state_hash, hash_algorithm FROM wizard_instance_versions \
             WHERE instance_id = ?1 AND version = ?2",
            params![instance_id, sql_version],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
        .map_err(|err| db_error(&err))?;
    let (length, hash, algorithm) = metadata.ok_or_else(|| {
        SqliteStoreError::Corrupt(format!("missing version {version} for instance {instance_id}"))
    })?;
    check_length(length, instance_id)?;
    let bytes: Vec<u8> = tx
        .query_row(
            "SELECT state_json FROM wizard_instance_versions WHERE instance_id = ?1 AND version = ?2",
            params![instance_id, sql_version],
            |row| row.get(0),
        )
        .map_err(|err| db_error(&err))?;
    Ok(Some((
        version,
        StoredPayload {
            bytes,
            hash,
            algorithm,
        },
    )))
}

/// Inserts a thread-scoped output payload.
fn insert_output(
    tx: &Transaction<'_>,
    table: &'static str,
    thread_id: &str,
    payload: &PreparedPayload,
    committed_at: i64,
) -> Result<(), SqliteStoreError> {
    tx.execute(
        &format!(
            "INSERT INTO {table} (thread_id, payload_json, payload_hash, hash_algorithm, committed_at) VALUES \
             (?1, ?2, ?3, ?4, ?5)"
        ),
        params![thread_id, payload.bytes.as_slice(), payload.hash.as_str(), payload.algorithm.label(), committed_at],
    )
    .map_err(|err| db_error(&err))?;
    Ok(())
}

/// Reads and verifies every output of a thread from one table, in commit order.
fn fetch_outputs<T: DeserializeOwned>(
    tx: &Transaction<'_>,
    table: &'static str,
    thread_id: &str,
) -> Result<Vec<T>, SqliteStoreError> {
    let mut stmt = tx
        .prepare(&format!(
            "SELECT length(payload_json), payload_json, payload_hash, hash_algorithm FROM {table} WHERE \
             thread_id = ?1 ORDER BY seq ASC"
        ))
        .map_err(|err| db_error(&err))?;
    let rows = stmt
        .query_map(params![thread_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                StoredPayload {
                    bytes: row.get(1)?,
                    hash: row.get(2)?,
                    algorithm: row.get(3)?,
                },
            ))
        })
        .map_err(|err| db_error(&err))?;
    let mut outputs = Vec::new();
    for row in rows {
        let (length, payload) = row.map_err(|err| db_error(&err))?;
        check_length(length, table)?;
        outputs.push(decode_payload(&payload, table)?);
    }
    Ok(outputs)
}

/// Enforces version retention if configured.
fn enforce_retention(
    tx: &Transaction<'_>,
    instance_id: &str,
    latest_version: i64,
    max_versions: Option<u64>,
) -> Result<(), SqliteStoreError> {
    let Some(max_versions) = max_versions else {
        return Ok(());
    };
    let max_versions = i64::try_from(max_versions)
        .map_err(|_| SqliteStoreError::Invalid("max_versions too large".to_string()))?;
    if latest_version > max_versions {
        let min_version = latest_version - max_versions + 1;
        tx.execute(
            "DELETE FROM wizard_instance_versions WHERE instance_id = ?1 AND version < ?2",
            params![instance_id, min_version],
        )
        .map_err(|err| db_error(&err))?;
    }
    Ok(())
}

/// Converts a version to its SQL representation.
fn to_sql_version(version: u64) -> Result<i64, SqliteStoreError> {
    i64::try_from(version).map_err(|_| SqliteStoreError::Invalid("instance version too large".to_string()))
}

/// Converts a stored version, rejecting non-positive values.
fn from_sql_version(version: i64, instance_id: &str) -> Result<u64, SqliteStoreError> {
    u64::try_from(version)
        .ok()
        .filter(|version| *version > 0)
        .ok_or_else(|| SqliteStoreError::Corrupt(format!("invalid latest_version for instance {instance_id}")))
}

// ============================================================================
// SECTION: Connection Setup
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid("store path contains an overlong component".to_string()));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid("store path must be a file, not a directory".to_string()));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags =
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(|err| db_error(&err))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(connection: &Connection, config: &SqliteStoreConfig) -> Result<(), SqliteStoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_error(&err))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| db_error(&err))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| db_error(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| db_error(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| db_error(&err))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS wizard_instances (
                    instance_id TEXT PRIMARY KEY NOT NULL,
                    thread_id TEXT NOT NULL,
                    latest_version INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS wizard_instance_versions (
                    instance_id TEXT NOT NULL,
                    version INTEGER NOT NULL,
                    state_json BLOB NOT NULL,
                    state_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL,
                    saved_at INTEGER NOT NULL,
                    PRIMARY KEY (instance_id, version),
                    FOREIGN KEY (instance_id)
                        REFERENCES wizard_instances(instance_id) ON DELETE CASCADE
                );
                CREATE TABLE IF NOT EXISTS classification_records (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    record_id TEXT NOT NULL UNIQUE,
                    thread_id TEXT NOT NULL,
                    payload_json BLOB NOT NULL,
                    payload_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL,
                    committed_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_classification_records_thread
                    ON classification_records (thread_id, seq);
                CREATE TABLE IF NOT EXISTS delivered_date_backfills (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    thread_id TEXT NOT NULL,
                    payload_json BLOB NOT NULL,
                    payload_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL,
                    committed_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_delivered_date_backfills_thread
                    ON delivered_date_backfills (thread_id, seq);
                CREATE TABLE IF NOT EXISTS message_dispositions (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    thread_id TEXT NOT NULL,
                    payload_json BLOB NOT NULL,
                    payload_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL,
                    committed_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_message_dispositions_thread
                    ON message_dispositions (thread_id, seq);",
            )
            .map_err(|err| db_error(&err))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!("unsupported schema version: {value}")));
        }
    }
    tx.commit().map_err(|err| db_error(&err))?;
    Ok(())
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
