//! KOE Domain Layer
//!
//! The adjudication engine for change-order claims ("krav om endringsordre")
//! under the NS 8407 contract standard. It is pure and synchronous: every
//! operation is a function of an immutable snapshot of events plus explicit
//! configuration.
//!
//! ## Key Concepts
//!
//! - **Case**: one claim, split into a basis, a compensation and a schedule track
//! - **Event**: an immutable entry in a case log; all state is folded from events
//! - **Preclusion**: whether a late notice forfeits the claim
//! - **Consequence**: how the basis decision governs the dependent tracks
//! - **Acceleration**: the contractor's capped cost claim for rejected schedule days
//!
//! ## Architecture
//!
//! - No I/O and no wall-clock reads
//! - Status is always derived by replaying the full event history
//! - Persistence lives behind the [`EventLog`] and [`AccelerationLog`] traits

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod acceleration;
pub mod case;
pub mod config;
pub mod consequence;
pub mod deadline;
pub mod error;
pub mod event;
pub mod forsering;
pub mod grade;
pub mod preclusion;
pub mod status;
pub mod track;
pub mod traits;

// Re-exports for convenience
pub use acceleration::{AccelerationAction, AccelerationEvent, AccelerationProjection, AccelerationRecord};
pub use case::{Case, CaseId, CaseProjection, CaseVersion};
pub use config::EngineConfig;
pub use consequence::{
    promote_subsidiaries, resolve_consequence, BasisDecision, ConsequenceInput, ConsequenceResult,
    MessageKey, Promotion, PromotionLedger, Severity,
};
pub use deadline::days_between;
pub use error::{DomainError, Result, ValidationError};
pub use event::{ActorRole, CaseDetails, Event, EventId, EventPayload, EventRecord, EventType};
pub use forsering::{
    acceleration_for, check_within_limit, compute_acceleration_ceiling, ensure_not_accelerated,
    AccelerationCase, AccelerationCaseId, AccelerationPolicy, AccelerationState, CostEntry,
    ForseringCostEngine, OwnerDecision, RejectedScheduleRef, MAX_REJECTED_DAYS,
};
pub use grade::compute_grade;
pub use preclusion::{
    evaluate_preclusion, ClaimCategory, DeadlineRule, PreclusionConfig, PreclusionEvaluator,
    PreclusionInput, PreclusionVerdict, RuleId,
};
pub use status::{compute_track_status, project_track, TrackStateMachine};
pub use track::{ResponseResult, Track, TrackKind, TrackStatus};
pub use traits::{AccelerationHistory, AccelerationLog, CaseLog, EventLog};
