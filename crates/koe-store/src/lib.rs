//! KOE Storage Layer
//!
//! Implements the `EventLog` and `AccelerationLog` traits on SQLite, plus an
//! in-memory log for tests and one-off evaluations.
//!
//! # Concurrency
//!
//! Appends use optimistic concurrency: the caller passes the case version its
//! mutation was computed against, and the append fails with
//! [`StoreError::Conflict`] when the stored version has moved on. The version
//! check, the engine validation and the insert run inside one immediate
//! transaction, so two writers against the same database file cannot both win.
//!
//! # Examples
//!
//! ```no_run
//! use koe_store::SqliteStore;
//!
//! let store = SqliteStore::new("koe.db").unwrap();
//! // Store is now ready for case logs
//! ```

#![warn(missing_docs)]

mod memory;

pub use memory::MemoryStore;

use koe_domain::traits::{AccelerationHistory, AccelerationLog, CaseLog, EventLog};
use koe_domain::{
    AccelerationCase, AccelerationCaseId, AccelerationEvent, AccelerationProjection, AccelerationRecord,
    CaseId, CaseProjection, CaseVersion, DomainError, EngineConfig, Event, EventRecord,
};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The event (or the stored log) was rejected by the engine
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The stored version advanced since the caller read it
    #[error("Version conflict on case {case_id}: expected version {expected}, stored version is {actual}")]
    Conflict {
        /// Case the append targeted
        case_id: CaseId,
        /// Version the caller computed its mutation against
        expected: CaseVersion,
        /// Version currently stored
        actual: CaseVersion,
    },

    /// The stored acceleration version advanced since the caller read it
    #[error("Version conflict on acceleration {id}: expected version {expected}, stored version is {actual}")]
    AccelerationConflict {
        /// Acceleration case the append targeted
        id: AccelerationCaseId,
        /// Version the caller computed its mutation against
        expected: CaseVersion,
        /// Version currently stored
        actual: CaseVersion,
    },

    /// Invalid data format
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl StoreError {
    /// Whether the caller should refetch and retry
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. } | StoreError::AccelerationConflict { .. })
            || matches!(self, StoreError::Domain(e) if e.is_conflict())
    }
}

/// Check the stored case version against the caller's expectation
pub(crate) fn check_case_version(
    case_id: &CaseId,
    actual: CaseVersion,
    expected_version: CaseVersion,
) -> Result<(), StoreError> {
    actual.ensure_matches(expected_version).map_err(|e| match e {
        DomainError::Conflict { expected, actual } => {
            tracing::warn!(
                "Rejecting append to case {}: expected version {}, stored version is {}",
                case_id,
                expected,
                actual
            );
            StoreError::Conflict {
                case_id: case_id.clone(),
                expected,
                actual,
            }
        }
        other => StoreError::Domain(other),
    })
}

/// Check the stored acceleration version against the caller's expectation
pub(crate) fn check_acceleration_version(
    id: &AccelerationCaseId,
    actual: CaseVersion,
    expected_version: CaseVersion,
) -> Result<(), StoreError> {
    actual.ensure_matches(expected_version).map_err(|e| match e {
        DomainError::Conflict { expected, actual } => {
            tracing::warn!(
                "Rejecting append to acceleration {}: expected version {}, stored version is {}",
                id,
                expected,
                actual
            );
            StoreError::AccelerationConflict { id: *id, expected, actual }
        }
        other => StoreError::Domain(other),
    })
}

/// SQLite-based implementation of EventLog
///
/// # Thread Safety
///
/// SQLite connections are not thread-safe. Each thread should have its own
/// SqliteStore instance; instances opened on the same file coordinate through
/// the database.
pub struct SqliteStore {
    conn: Connection,
    projection: CaseProjection,
    accelerations: AccelerationProjection,
}

impl SqliteStore {
    /// Open (or create) a store with the default engine configuration
    ///
    /// Use `:memory:` for an in-memory database (useful for testing).
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::with_config(path, &EngineConfig::default())
    }

    /// Open (or create) a store validating appends under `config`
    pub fn with_config<P: AsRef<Path>>(path: P, config: &EngineConfig) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let mut store = Self {
            conn,
            projection: CaseProjection::new(config),
            accelerations: AccelerationProjection::new(&config.acceleration),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&mut self) -> Result<(), StoreError> {
        let schema = include_str!("schema.sql");
        self.conn.execute_batch(schema)?;
        Ok(())
    }

    fn version_in(conn: &Connection, case_id: &CaseId) -> Result<CaseVersion, StoreError> {
        let version: Option<i64> = conn
            .query_row(
                "SELECT version FROM cases WHERE case_id = ?1",
                params![case_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match version {
            None => Ok(CaseVersion::INITIAL),
            Some(v) => u64::try_from(v)
                .map(CaseVersion::new)
                .map_err(|_| StoreError::InvalidData(format!("Negative version {} for case {}", v, case_id))),
        }
    }

    fn events_in(conn: &Connection, case_id: &CaseId) -> Result<Vec<Event>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, track_kind, event_type, actor_role, timestamp, payload
             FROM events WHERE case_id = ?1 ORDER BY seq",
        )?;

        let records = stmt
            .query_map(params![case_id.as_str()], |row| {
                Ok(EventRecord {
                    id: row.get(0)?,
                    track_kind: row.get(1)?,
                    event_type: row.get(2)?,
                    actor_role: row.get(3)?,
                    timestamp: row.get(4)?,
                    payload: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let events = records
            .into_iter()
            .map(Event::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(DomainError::from)?;

        Ok(events)
    }

    fn acceleration_version_in(conn: &Connection, id: &AccelerationCaseId) -> Result<CaseVersion, StoreError> {
        let version: Option<i64> = conn
            .query_row(
                "SELECT version FROM accelerations WHERE acceleration_id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match version {
            None => Ok(CaseVersion::INITIAL),
            Some(v) => u64::try_from(v)
                .map(CaseVersion::new)
                .map_err(|_| StoreError::InvalidData(format!("Negative version {} for acceleration {}", v, id))),
        }
    }

    fn acceleration_events_in(
        conn: &Connection,
        id: &AccelerationCaseId,
    ) -> Result<Vec<AccelerationEvent>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, action, timestamp, payload
             FROM acceleration_events WHERE acceleration_id = ?1 ORDER BY seq",
        )?;

        let records = stmt
            .query_map(params![id.to_string()], |row| {
                Ok(AccelerationRecord {
                    id: row.get(0)?,
                    action: row.get(1)?,
                    timestamp: row.get(2)?,
                    payload: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let events = records
            .into_iter()
            .map(AccelerationEvent::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(DomainError::from)?;

        Ok(events)
    }

    fn acceleration_ids_in(conn: &Connection) -> Result<Vec<AccelerationCaseId>, StoreError> {
        let mut stmt =
            conn.prepare("SELECT acceleration_id FROM accelerations WHERE version > 0 ORDER BY acceleration_id")?;
        let raw = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let ids = raw
            .iter()
            .map(|id| id.parse::<AccelerationCaseId>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(DomainError::from)?;
        Ok(ids)
    }

    /// Fold every stored acceleration log except `except`
    fn accelerations_in(
        conn: &Connection,
        projection: &AccelerationProjection,
        except: Option<&AccelerationCaseId>,
    ) -> Result<Vec<AccelerationCase>, StoreError> {
        let mut cases = Vec::new();
        for id in Self::acceleration_ids_in(conn)? {
            if except == Some(&id) {
                continue;
            }
            let events = Self::acceleration_events_in(conn, &id)?;
            cases.push(projection.fold(id, &events)?);
        }
        Ok(cases)
    }

    /// Load a case log and fold it
    pub fn project(&self, case_id: &CaseId) -> Result<koe_domain::Case, StoreError> {
        let log = self.load(case_id)?;
        Ok(self.projection.fold(case_id, &log.events)?)
    }

    /// Load an acceleration log and fold it
    pub fn project_acceleration(&self, id: &AccelerationCaseId) -> Result<AccelerationCase, StoreError> {
        let log = self.load_acceleration(id)?;
        Ok(self.accelerations.fold(*id, &log.events)?)
    }
}

impl EventLog for SqliteStore {
    type Error = StoreError;

    fn load(&self, case_id: &CaseId) -> Result<CaseLog, Self::Error> {
        let version = Self::version_in(&self.conn, case_id)?;
        let events = Self::events_in(&self.conn, case_id)?;
        if events.len() as u64 != version.value() {
            return Err(StoreError::InvalidData(format!(
                "Case {} has {} events but version {}",
                case_id,
                events.len(),
                version
            )));
        }
        tracing::debug!("Loaded case {} at version {}", case_id, version);

        Ok(CaseLog {
            case_id: case_id.clone(),
            events,
            version,
        })
    }

    fn append(
        &mut self,
        case_id: &CaseId,
        expected_version: CaseVersion,
        event: Event,
    ) -> Result<CaseVersion, Self::Error> {
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let actual = Self::version_in(&tx, case_id)?;
        check_case_version(case_id, actual, expected_version)?;

        let existing = Self::events_in(&tx, case_id)?;
        self.projection.validate_append(case_id, &existing, &event)?;

        let record = event.to_record().map_err(DomainError::from)?;
        let next = actual.next();
        let seq = i64::try_from(next.value())
            .map_err(|_| StoreError::InvalidData(format!("Version overflow for case {}", case_id)))?;

        tx.execute(
            "INSERT INTO cases (case_id, version) VALUES (?1, ?2)
             ON CONFLICT(case_id) DO UPDATE SET version = excluded.version",
            params![case_id.as_str(), seq],
        )?;
        tx.execute(
            "INSERT INTO events (case_id, seq, id, track_kind, event_type, actor_role, timestamp, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                case_id.as_str(),
                seq,
                &record.id,
                &record.track_kind,
                &record.event_type,
                &record.actor_role,
                &record.timestamp,
                &record.payload,
            ],
        )?;
        tx.commit()?;

        tracing::info!(
            "Appended {} on {} track to case {} (version {})",
            event.event_type,
            event.track_kind,
            case_id,
            next
        );
        Ok(next)
    }

    fn case_ids(&self) -> Result<Vec<CaseId>, Self::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT case_id FROM cases WHERE version > 0 ORDER BY case_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|id| id.map(CaseId::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

impl AccelerationLog for SqliteStore {
    fn load_acceleration(&self, id: &AccelerationCaseId) -> Result<AccelerationHistory, Self::Error> {
        let version = Self::acceleration_version_in(&self.conn, id)?;
        let events = Self::acceleration_events_in(&self.conn, id)?;
        if events.len() as u64 != version.value() {
            return Err(StoreError::InvalidData(format!(
                "Acceleration {} has {} actions but version {}",
                id,
                events.len(),
                version
            )));
        }

        Ok(AccelerationHistory {
            id: *id,
            events,
            version,
        })
    }

    fn append_acceleration(
        &mut self,
        id: &AccelerationCaseId,
        expected_version: CaseVersion,
        event: AccelerationEvent,
    ) -> Result<CaseVersion, Self::Error> {
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let actual = Self::acceleration_version_in(&tx, id)?;
        check_acceleration_version(id, actual, expected_version)?;

        let existing = Self::acceleration_events_in(&tx, id)?;
        let others = if event.action.referenced_cases().is_empty() {
            Vec::new()
        } else {
            Self::accelerations_in(&tx, &self.accelerations, Some(id))?
        };
        self.accelerations.validate_append(*id, &existing, &event, &others)?;

        let record = event.to_record().map_err(DomainError::from)?;
        let next = actual.next();
        let seq = i64::try_from(next.value())
            .map_err(|_| StoreError::InvalidData(format!("Version overflow for acceleration {}", id)))?;

        tx.execute(
            "INSERT INTO accelerations (acceleration_id, version) VALUES (?1, ?2)
             ON CONFLICT(acceleration_id) DO UPDATE SET version = excluded.version",
            params![id.to_string(), seq],
        )?;
        tx.execute(
            "INSERT INTO acceleration_events (acceleration_id, seq, id, action, timestamp, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id.to_string(), seq, &record.id, &record.action, &record.timestamp, &record.payload],
        )?;
        tx.commit()?;

        tracing::info!(
            "Appended {} to acceleration {} (version {})",
            event.action.as_str(),
            id,
            next
        );
        Ok(next)
    }

    fn acceleration_ids(&self) -> Result<Vec<AccelerationCaseId>, Self::Error> {
        Self::acceleration_ids_in(&self.conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use koe_domain::{ResponseResult, TrackKind};

    fn at(day: u32) -> chrono::DateTime<chrono::Utc> {
        use chrono::TimeZone;
        chrono::Utc.with_ymd_and_hms(2024, 5, day, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_store_initialization() {
        let store = SqliteStore::new(":memory:");
        assert!(store.is_ok(), "Store should initialize successfully");
    }

    #[test]
    fn test_unknown_case_loads_empty() {
        let store = SqliteStore::new(":memory:").unwrap();
        let log = store.load(&CaseId::new("KOE-404")).unwrap();
        assert!(log.is_empty());
        assert_eq!(log.version, CaseVersion::INITIAL);
        assert!(store.case_ids().unwrap().is_empty());
    }

    #[test]
    fn test_append_and_load() {
        let mut store = SqliteStore::new(":memory:").unwrap();
        let case_id = CaseId::new("KOE-1");

        let v1 = store
            .append(&case_id, CaseVersion::INITIAL, Event::claim_sent(TrackKind::Basis, at(1), None))
            .unwrap();
        let v2 = store
            .append(&case_id, v1, Event::response(TrackKind::Basis, at(3), ResponseResult::Approved, None))
            .unwrap();
        assert_eq!(v2, CaseVersion::new(2));

        let log = store.load(&case_id).unwrap();
        assert_eq!(log.events.len(), 2);
        assert_eq!(log.version, v2);
        assert_eq!(store.case_ids().unwrap(), vec![case_id.clone()]);

        let case = store.project(&case_id).unwrap();
        assert_eq!(case.basis.status, koe_domain::TrackStatus::Approved);
    }

    #[test]
    fn test_invalid_event_is_not_written() {
        let mut store = SqliteStore::new(":memory:").unwrap();
        let case_id = CaseId::new("KOE-2");

        let err = store
            .append(&case_id, CaseVersion::INITIAL, Event::claim_sent(TrackKind::Schedule, at(1), Some(3.0)))
            .unwrap_err();
        assert!(matches!(err, StoreError::Domain(DomainError::Validation(_))));
        assert_eq!(store.load(&case_id).unwrap().version, CaseVersion::INITIAL);
    }
}
