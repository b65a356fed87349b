//! Trait definitions for external interactions
//!
//! The engine never performs I/O. Persistence of case logs lives behind
//! [`EventLog`], and of acceleration logs behind [`AccelerationLog`]; the
//! store crate implements both.

use crate::acceleration::AccelerationEvent;
use crate::case::{CaseId, CaseVersion};
use crate::event::Event;
use crate::forsering::AccelerationCaseId;

/// A case log as read from storage
#[derive(Debug, Clone, PartialEq)]
pub struct CaseLog {
    /// Case the events belong to
    pub case_id: CaseId,
    /// Events in append order
    pub events: Vec<Event>,
    /// Stored version (number of events)
    pub version: CaseVersion,
}

impl CaseLog {
    /// Log of a case that has no events yet
    pub fn empty(case_id: CaseId) -> Self {
        Self {
            case_id,
            events: Vec::new(),
            version: CaseVersion::INITIAL,
        }
    }

    /// Whether the case has any events
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Append-only, versioned storage of case event logs
///
/// Implementations must reject an append whose `expected_version` differs
/// from the stored version, and must increase the version by exactly one on
/// every successful append.
pub trait EventLog {
    /// Error type for log operations
    type Error;

    /// Load a case log; unknown cases load as empty at the initial version
    fn load(&self, case_id: &CaseId) -> Result<CaseLog, Self::Error>;

    /// Append one event, returning the new version
    fn append(
        &mut self,
        case_id: &CaseId,
        expected_version: CaseVersion,
        event: Event,
    ) -> Result<CaseVersion, Self::Error>;

    /// Identifiers of all cases with at least one event
    fn case_ids(&self) -> Result<Vec<CaseId>, Self::Error>;
}

/// An acceleration log as read from storage
#[derive(Debug, Clone, PartialEq)]
pub struct AccelerationHistory {
    /// Acceleration case the actions belong to
    pub id: AccelerationCaseId,
    /// Actions in append order
    pub events: Vec<AccelerationEvent>,
    /// Stored version (number of actions)
    pub version: CaseVersion,
}

impl AccelerationHistory {
    /// Log of an acceleration case that has no actions yet
    pub fn empty(id: AccelerationCaseId) -> Self {
        Self {
            id,
            events: Vec::new(),
            version: CaseVersion::INITIAL,
        }
    }

    /// Whether the acceleration case has any actions
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Append-only, versioned storage of acceleration logs
///
/// Same version rules as [`EventLog`]. Implementations also refuse to let two
/// live acceleration cases hold the same schedule track.
pub trait AccelerationLog: EventLog {
    /// Load an acceleration log; unknown ids load as empty at the initial version
    fn load_acceleration(&self, id: &AccelerationCaseId) -> Result<AccelerationHistory, Self::Error>;

    /// Append one action, returning the new version
    fn append_acceleration(
        &mut self,
        id: &AccelerationCaseId,
        expected_version: CaseVersion,
        event: AccelerationEvent,
    ) -> Result<CaseVersion, Self::Error>;

    /// Identifiers of all acceleration cases with at least one action, oldest first
    fn acceleration_ids(&self) -> Result<Vec<AccelerationCaseId>, Self::Error>;
}
