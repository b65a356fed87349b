//! Error taxonomy for the adjudication engine
//!
//! Only malformed input and concurrency conflicts are errors. Domain outcomes
//! such as a rejected claim or a precluded notice are ordinary results, and an
//! indeterminate verdict is expressed as `None`, never as an error.

use crate::case::CaseVersion;
use crate::event::{ActorRole, EventType};
use crate::forsering::{AccelerationCaseId, AccelerationState};
use crate::track::{TrackKind, TrackStatus};
use chrono::NaiveDate;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, DomainError>;

/// Top-level engine error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Malformed or contradictory input; never silently corrected
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The stored case version advanced since the caller read it
    #[error("Version conflict: expected version {expected}, stored version is {actual}")]
    Conflict {
        /// Version the caller computed its mutation against
        expected: CaseVersion,
        /// Version currently stored
        actual: CaseVersion,
    },
}

impl DomainError {
    /// Whether the caller should refetch and retry
    pub fn is_conflict(&self) -> bool {
        matches!(self, DomainError::Conflict { .. })
    }
}

/// Causes of a validation failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Notice (or window end) dated before the discovery date
    #[error("Notice date {notice} is earlier than discovery date {discovery}")]
    NoticeBeforeDiscovery {
        /// Date the circumstance was discovered
        discovery: NaiveDate,
        /// Date the notice was sent
        notice: NaiveDate,
    },

    /// Track kind string not recognised
    #[error("Unknown track kind: {0}")]
    UnknownTrackKind(String),

    /// Event type string not recognised
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// Actor role string not recognised
    #[error("Unknown actor role: {0}")]
    UnknownActorRole(String),

    /// Claim category string not recognised
    #[error("Unknown claim category: {0}")]
    UnknownCategory(String),

    /// Response result string not recognised
    #[error("Unknown response result: {0}")]
    UnknownResponseResult(String),

    /// Event identifier is not a valid UUID
    #[error("Invalid event id: {0}")]
    InvalidEventId(String),

    /// Timestamp could not be parsed as RFC 3339
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Payload could not be (de)serialized
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Events from several tracks passed where one track was expected
    #[error("Events span several tracks: expected {expected}, found {found}")]
    MixedTracks {
        /// Track kind of the first event
        expected: TrackKind,
        /// Conflicting track kind
        found: TrackKind,
    },

    /// Event not permitted in the current track status
    #[error("Invalid transition on {kind} track: {event} is not allowed in status {from}")]
    InvalidTransition {
        /// Track the event targets
        kind: TrackKind,
        /// Status before the event
        from: TrackStatus,
        /// Offending event type
        event: EventType,
    },

    /// Event submitted by a party not entitled to it
    #[error("{event} may not be submitted by the {actor}")]
    WrongActor {
        /// Offending event type
        event: EventType,
        /// Role that submitted it
        actor: ActorRole,
    },

    /// Response event without a result in its payload
    #[error("Response event on {0} track carries no result")]
    MissingResponseResult(TrackKind),

    /// Partial approval that does not say how much was approved
    #[error("Partial approval on {0} track carries no approved value")]
    MissingApprovedValue(TrackKind),

    /// Case log is empty
    #[error("Case log contains no events")]
    EmptyCase,

    /// The first event of a case must target the basis track
    #[error("A case must start with a basis event, first event targets the {0} track")]
    CaseMustStartWithBasis(TrackKind),

    /// Compensation events on a force-majeure case
    #[error("Force majeure entitles to schedule relief only; compensation claims are not applicable")]
    CompensationNotApplicable,

    /// Negative or non-finite amount
    #[error("Invalid amount for {field}: {value}")]
    InvalidAmount {
        /// Field name
        field: &'static str,
        /// Offending value
        value: f64,
    },

    /// Activation attempted while the estimate exceeds the ceiling or is unconfirmed
    #[error("Estimated cost {estimated} is not within the ceiling {ceiling} (percentage confirmed: {percentage_confirmed})")]
    CostNotWithinLimit {
        /// Estimated acceleration cost
        estimated: f64,
        /// Computed cost ceiling
        ceiling: f64,
        /// Whether the percentage-of-contract ceiling was confirmed
        percentage_confirmed: bool,
    },

    /// Referenced track is not a schedule track
    #[error("Case {case_id}: only schedule tracks can be accelerated, got {kind}")]
    NotScheduleTrack {
        /// Case the track belongs to
        case_id: String,
        /// Track kind found
        kind: TrackKind,
    },

    /// Referenced schedule track is not rejected
    #[error("Case {case_id}: schedule track must be rejected, status is {status}")]
    TrackNotRejected {
        /// Case the track belongs to
        case_id: String,
        /// Current status
        status: TrackStatus,
    },

    /// Referenced schedule track has no rejected days
    #[error("Case {0}: schedule track has no rejected days")]
    NoRejectedDays(String),

    /// Rejected-day count beyond any plausible contract period
    #[error("Case {case_id}: {days} rejected days is out of range")]
    RejectedDaysOutOfRange {
        /// Case the track belongs to
        case_id: String,
        /// Offending day count
        days: f64,
    },

    /// Sum of rejected days does not fit the day counter
    #[error("Total rejected days overflow")]
    RejectedDaysOverflow,

    /// Acceleration case references no tracks
    #[error("An acceleration case must reference at least one rejected schedule track")]
    NoTracksReferenced,

    /// Track referenced twice
    #[error("Case {0} is already referenced by this acceleration case")]
    DuplicateTrackReference(String),

    /// Track is not referenced
    #[error("Case {0} is not referenced by this acceleration case")]
    TrackReferenceNotFound(String),

    /// References are frozen once the acceleration is activated
    #[error("Referenced tracks cannot change in state {0}; stop and recreate the acceleration case")]
    TrackReferencesFrozen(AccelerationState),

    /// Acceleration action not allowed in the current state
    #[error("Cannot {action} an acceleration case in state {from}")]
    InvalidAccelerationTransition {
        /// State before the action
        from: AccelerationState,
        /// Attempted action
        action: &'static str,
    },

    /// Acceleration identifier is not a valid UUID
    #[error("Invalid acceleration id: {0}")]
    InvalidAccelerationId(String),

    /// Acceleration action string not recognised
    #[error("Unknown acceleration action: {0}")]
    UnknownAccelerationAction(String),

    /// Acceleration log is empty
    #[error("Acceleration log contains no actions")]
    EmptyAcceleration,

    /// The first action of an acceleration log must open it
    #[error("An acceleration log must start by opening the case, first action is {0}")]
    AccelerationMustStartOpened(&'static str),

    /// Schedule track already aggregated into another live acceleration case
    #[error("Case {case_id} is already part of acceleration {acceleration}")]
    AlreadyAccelerated {
        /// Case the schedule track belongs to
        case_id: String,
        /// Acceleration case holding the reference
        acceleration: AccelerationCaseId,
    },
}
