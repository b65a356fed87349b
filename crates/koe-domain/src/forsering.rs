//! Acceleration ("forsering") cost engine
//!
//! When schedule claims are rejected, the contractor may choose to accelerate
//! and claim the cost. That cost is capped: it may not exceed the daily
//! penalty exposure the rejected days represent. An acceleration case
//! aggregates rejected schedule tracks, possibly from unrelated cases, and
//! walks a small state machine:
//!
//! ```text
//! draft -> notified -> activated -> owner_responded
//!   \________\___________\---------> stopped
//! ```
//!
//! Activation is refused unless the estimate is within the ceiling and the
//! percentage confirmation is given. Incurred cost is an append-only ledger.

use crate::case::{Case, CaseId, CaseVersion};
use crate::error::{Result, ValidationError};
use crate::track::{Track, TrackKind, TrackStatus};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Statutory cost ceiling: daily penalty rate times rejected days
///
/// Never negative.
///
/// # Examples
///
/// ```
/// use koe_domain::compute_acceleration_ceiling;
///
/// assert_eq!(compute_acceleration_ceiling(50_000.0, 20), 1_000_000.0);
/// assert_eq!(compute_acceleration_ceiling(50_000.0, 0), 0.0);
/// ```
pub fn compute_acceleration_ceiling(daily_rate: f64, total_rejected_days: u32) -> f64 {
    (daily_rate * f64::from(total_rejected_days)).max(0.0)
}

/// Whether an estimate may be activated against a ceiling
pub fn check_within_limit(estimated_cost: f64, ceiling: f64, percentage_confirmed: bool) -> bool {
    percentage_confirmed && estimated_cost <= ceiling
}

fn ensure_amount(field: &'static str, value: f64) -> std::result::Result<(), ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidAmount { field, value })
    }
}

/// Unique identifier for an acceleration case
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccelerationCaseId(uuid::Uuid);

impl AccelerationCaseId {
    /// Generate a new UUIDv7-based id
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> uuid::Uuid {
        self.0
    }
}

impl Default for AccelerationCaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccelerationCaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AccelerationCaseId {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| ValidationError::InvalidAccelerationId(format!("{}: {}", s, e)))
    }
}

/// Cap on the ceiling relative to the contract value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccelerationPolicy {
    /// Maximum ceiling as a percentage of the contract value; unset means no cap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_percent_of_contract: Option<f64>,
}

impl AccelerationPolicy {
    /// Apply the percentage-of-contract cap, when both cap and contract value are known
    pub fn cap(&self, ceiling: f64, contract_value: Option<f64>) -> f64 {
        match (self.max_percent_of_contract, contract_value) {
            (Some(percent), Some(value)) => ceiling.min((value * percent / 100.0).max(0.0)),
            _ => ceiling,
        }
    }
}

/// Largest rejected-day count a single schedule track may carry (one century)
pub const MAX_REJECTED_DAYS: u32 = 36_525;

/// A rejected schedule track referenced by an acceleration case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedScheduleRef {
    /// Case the schedule track belongs to
    pub case_id: CaseId,
    /// Days claimed but not granted
    pub rejected_days: u32,
}

impl RejectedScheduleRef {
    /// Reference a schedule track that was rejected in full or in part
    pub fn from_track(case_id: CaseId, track: &Track) -> std::result::Result<Self, ValidationError> {
        if track.kind != TrackKind::Schedule {
            return Err(ValidationError::NotScheduleTrack {
                case_id: case_id.to_string(),
                kind: track.kind,
            });
        }
        if !matches!(track.status, TrackStatus::Rejected | TrackStatus::PartiallyApproved) {
            return Err(ValidationError::TrackNotRejected {
                case_id: case_id.to_string(),
                status: track.status,
            });
        }

        let days = track.rejected_value().unwrap_or(0.0).round();
        if days.is_nan() || days <= 0.0 {
            return Err(ValidationError::NoRejectedDays(case_id.to_string()));
        }
        if days > f64::from(MAX_REJECTED_DAYS) {
            return Err(ValidationError::RejectedDaysOutOfRange {
                case_id: case_id.to_string(),
                days,
            });
        }

        Ok(Self {
            case_id,
            rejected_days: days as u32,
        })
    }

    /// Reference the schedule track of a projected case
    pub fn from_case(case: &Case) -> std::result::Result<Self, ValidationError> {
        match &case.schedule {
            Some(schedule) => Self::from_track(case.id.clone(), schedule),
            None => Self::from_track(case.id.clone(), &Track::new(TrackKind::Schedule)),
        }
    }
}

/// State of an acceleration case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccelerationState {
    /// Being prepared
    Draft,
    /// Owner notified of the intent to accelerate
    Notified,
    /// Acceleration under way
    Activated,
    /// Owner accepted or rejected the acceleration claim (terminal)
    OwnerResponded,
    /// Stopped by the contractor (terminal)
    Stopped,
}

impl AccelerationState {
    /// Get the state as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            AccelerationState::Draft => "draft",
            AccelerationState::Notified => "notified",
            AccelerationState::Activated => "activated",
            AccelerationState::OwnerResponded => "owner_responded",
            AccelerationState::Stopped => "stopped",
        }
    }

    /// No action may follow a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, AccelerationState::OwnerResponded | AccelerationState::Stopped)
    }
}

impl fmt::Display for AccelerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner's answer to an acceleration claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerDecision {
    /// Acceleration cost accepted
    Accepted,
    /// Acceleration cost rejected
    Rejected,
}

/// One entry in the incurred-cost ledger
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    /// Total cost incurred so far
    pub amount: f64,
    /// When the figure was recorded
    pub recorded_at: DateTime<Utc>,
}

/// Aggregated acceleration claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccelerationCase {
    id: AccelerationCaseId,
    version: CaseVersion,
    tracks: Vec<RejectedScheduleRef>,
    total_rejected_days: u32,
    daily_penalty_rate: f64,
    estimated_cost: f64,
    percentage_confirmed: bool,
    contract_value: Option<f64>,
    policy: AccelerationPolicy,
    max_cost_ceiling: f64,
    notice_date: Option<NaiveDate>,
    state: AccelerationState,
    owner_response: Option<OwnerDecision>,
    ledger: Vec<CostEntry>,
}

impl AccelerationCase {
    fn new(
        id: AccelerationCaseId,
        policy: AccelerationPolicy,
        tracks: Vec<RejectedScheduleRef>,
        daily_penalty_rate: f64,
        estimated_cost: f64,
        percentage_confirmed: bool,
        contract_value: Option<f64>,
    ) -> std::result::Result<Self, ValidationError> {
        ensure_amount("daily_penalty_rate", daily_penalty_rate)?;
        ensure_amount("estimated_cost", estimated_cost)?;
        if let Some(value) = contract_value {
            ensure_amount("contract_value", value)?;
        }
        if tracks.is_empty() {
            return Err(ValidationError::NoTracksReferenced);
        }
        for (i, track) in tracks.iter().enumerate() {
            if tracks[..i].iter().any(|t| t.case_id == track.case_id) {
                return Err(ValidationError::DuplicateTrackReference(track.case_id.to_string()));
            }
        }

        let mut case = Self {
            id,
            version: CaseVersion::INITIAL,
            tracks,
            total_rejected_days: 0,
            daily_penalty_rate,
            estimated_cost,
            percentage_confirmed,
            contract_value,
            policy,
            max_cost_ceiling: 0.0,
            notice_date: None,
            state: AccelerationState::Draft,
            owner_response: None,
            ledger: Vec::new(),
        };
        case.recompute_ceiling()?;
        Ok(case)
    }

    fn recompute_ceiling(&mut self) -> std::result::Result<(), ValidationError> {
        let total = self
            .tracks
            .iter()
            .try_fold(0u32, |sum, t| sum.checked_add(t.rejected_days))
            .ok_or(ValidationError::RejectedDaysOverflow)?;
        self.total_rejected_days = total;
        let raw = compute_acceleration_ceiling(self.daily_penalty_rate, total);
        self.max_cost_ceiling = self.policy.cap(raw, self.contract_value);
        Ok(())
    }

    pub(crate) fn set_version(&mut self, version: CaseVersion) {
        self.version = version;
    }

    fn invalid(&self, action: &'static str) -> ValidationError {
        ValidationError::InvalidAccelerationTransition {
            from: self.state,
            action,
        }
    }

    /// Identifier
    pub fn id(&self) -> AccelerationCaseId {
        self.id
    }

    /// Number of actions folded into this projection; `0` for an unsaved aggregation
    pub fn version(&self) -> CaseVersion {
        self.version
    }

    /// Contract value used for the percentage cap
    pub fn contract_value(&self) -> Option<f64> {
        self.contract_value
    }

    /// Whether the case's schedule track is referenced
    pub fn references(&self, case_id: &CaseId) -> bool {
        self.tracks.iter().any(|t| &t.case_id == case_id)
    }

    /// Referenced schedule tracks
    pub fn tracks(&self) -> &[RejectedScheduleRef] {
        &self.tracks
    }

    /// Daily penalty rate
    pub fn daily_penalty_rate(&self) -> f64 {
        self.daily_penalty_rate
    }

    /// Estimated acceleration cost
    pub fn estimated_cost(&self) -> f64 {
        self.estimated_cost
    }

    /// Percentage-of-contract ceiling confirmation
    pub fn percentage_confirmed(&self) -> bool {
        self.percentage_confirmed
    }

    /// Sum of rejected days across referenced tracks
    pub fn total_rejected_days(&self) -> u32 {
        self.total_rejected_days
    }

    /// Maximum cost that may be claimed
    pub fn max_cost_ceiling(&self) -> f64 {
        self.max_cost_ceiling
    }

    /// Estimate within ceiling and confirmed
    pub fn cost_within_limit(&self) -> bool {
        check_within_limit(self.estimated_cost, self.max_cost_ceiling, self.percentage_confirmed)
    }

    /// Current state
    pub fn state(&self) -> AccelerationState {
        self.state
    }

    /// Date the owner was notified
    pub fn notice_date(&self) -> Option<NaiveDate> {
        self.notice_date
    }

    /// Owner's answer, once given
    pub fn owner_response(&self) -> Option<OwnerDecision> {
        self.owner_response
    }

    /// Acceleration is under way
    pub fn is_activated(&self) -> bool {
        self.state == AccelerationState::Activated
    }

    /// Stopped by the contractor
    pub fn is_stopped(&self) -> bool {
        self.state == AccelerationState::Stopped
    }

    /// Full incurred-cost ledger, oldest first
    pub fn ledger(&self) -> &[CostEntry] {
        &self.ledger
    }

    /// Latest recorded incurred cost
    pub fn current_incurred_cost(&self) -> Option<f64> {
        self.ledger.last().map(|entry| entry.amount)
    }

    /// Reference another rejected schedule track (before activation only)
    pub fn add_track(&mut self, track: RejectedScheduleRef) -> Result<()> {
        if !matches!(self.state, AccelerationState::Draft | AccelerationState::Notified) {
            return Err(ValidationError::TrackReferencesFrozen(self.state).into());
        }
        if self.references(&track.case_id) {
            return Err(ValidationError::DuplicateTrackReference(track.case_id.to_string()).into());
        }
        self.tracks.push(track);
        if let Err(e) = self.recompute_ceiling() {
            self.tracks.pop();
            return Err(e.into());
        }
        Ok(())
    }

    /// Drop a referenced track (before activation only)
    ///
    /// After activation the case must be stopped and recreated instead.
    pub fn remove_track(&mut self, case_id: &CaseId) -> Result<RejectedScheduleRef> {
        if !matches!(self.state, AccelerationState::Draft | AccelerationState::Notified) {
            return Err(ValidationError::TrackReferencesFrozen(self.state).into());
        }
        let index = self
            .tracks
            .iter()
            .position(|t| &t.case_id == case_id)
            .ok_or_else(|| ValidationError::TrackReferenceNotFound(case_id.to_string()))?;
        if self.tracks.len() == 1 {
            return Err(ValidationError::NoTracksReferenced.into());
        }
        let removed = self.tracks.remove(index);
        self.recompute_ceiling()?;
        Ok(removed)
    }

    /// Revise the estimate and confirmation (before activation only)
    pub fn revise_estimate(&mut self, estimated_cost: f64, percentage_confirmed: bool) -> Result<()> {
        if !matches!(self.state, AccelerationState::Draft | AccelerationState::Notified) {
            return Err(self.invalid("revise the estimate of").into());
        }
        ensure_amount("estimated_cost", estimated_cost)?;
        self.estimated_cost = estimated_cost;
        self.percentage_confirmed = percentage_confirmed;
        Ok(())
    }

    /// Record that the owner was notified
    pub fn notify(&mut self, notice_date: NaiveDate) -> Result<()> {
        if self.state != AccelerationState::Draft {
            return Err(self.invalid("notify").into());
        }
        self.notice_date = Some(notice_date);
        self.state = AccelerationState::Notified;
        Ok(())
    }

    /// Start accelerating; refused unless the cost is within the limit
    pub fn activate(&mut self) -> Result<()> {
        if self.state != AccelerationState::Notified {
            return Err(self.invalid("activate").into());
        }
        if !self.cost_within_limit() {
            tracing::warn!(
                "Refusing to activate acceleration {}: estimate {} against ceiling {} (confirmed: {})",
                self.id,
                self.estimated_cost,
                self.max_cost_ceiling,
                self.percentage_confirmed
            );
            return Err(ValidationError::CostNotWithinLimit {
                estimated: self.estimated_cost,
                ceiling: self.max_cost_ceiling,
                percentage_confirmed: self.percentage_confirmed,
            }
            .into());
        }
        self.state = AccelerationState::Activated;
        tracing::debug!(
            "Acceleration {} activated over {} rejected days, ceiling {}",
            self.id,
            self.total_rejected_days(),
            self.max_cost_ceiling
        );
        Ok(())
    }

    /// Append the incurred cost so far (while activated)
    pub fn record_incurred_cost(&mut self, amount: f64, recorded_at: DateTime<Utc>) -> Result<()> {
        if self.state != AccelerationState::Activated {
            return Err(self.invalid("record incurred cost on").into());
        }
        ensure_amount("incurred_cost", amount)?;
        self.ledger.push(CostEntry { amount, recorded_at });
        Ok(())
    }

    /// Record the owner's answer
    pub fn respond(&mut self, decision: OwnerDecision) -> Result<()> {
        if !matches!(self.state, AccelerationState::Notified | AccelerationState::Activated) {
            return Err(self.invalid("respond to").into());
        }
        self.owner_response = Some(decision);
        self.state = AccelerationState::OwnerResponded;
        Ok(())
    }

    /// Stop the acceleration (contractor-initiated, terminal)
    pub fn stop(&mut self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(self.invalid("stop").into());
        }
        self.state = AccelerationState::Stopped;
        tracing::debug!("Acceleration {} stopped", self.id);
        Ok(())
    }
}

/// Latest acceleration still holding a reference to the case's schedule track
///
/// Stopped accelerations release their references.
pub fn acceleration_for<'a>(case_id: &CaseId, accelerations: &'a [AccelerationCase]) -> Option<&'a AccelerationCase> {
    accelerations
        .iter()
        .rev()
        .find(|a| !a.is_stopped() && a.references(case_id))
}

/// Refuse a schedule track that a live acceleration already aggregates
pub fn ensure_not_accelerated(
    case_id: &CaseId,
    accelerations: &[AccelerationCase],
) -> std::result::Result<(), ValidationError> {
    match acceleration_for(case_id, accelerations) {
        Some(existing) => Err(ValidationError::AlreadyAccelerated {
            case_id: case_id.to_string(),
            acceleration: existing.id(),
        }),
        None => Ok(()),
    }
}

/// Builds acceleration cases from rejected schedule tracks
#[derive(Debug, Clone, Default)]
pub struct ForseringCostEngine {
    policy: AccelerationPolicy,
}

impl ForseringCostEngine {
    /// Create an engine with the given cap policy
    pub fn new(policy: AccelerationPolicy) -> Self {
        Self { policy }
    }

    /// Policy the ceiling is capped under
    pub fn policy(&self) -> &AccelerationPolicy {
        &self.policy
    }

    /// Aggregate already-validated track references
    pub fn aggregate(
        &self,
        id: AccelerationCaseId,
        tracks: Vec<RejectedScheduleRef>,
        daily_penalty_rate: f64,
        estimated_cost: f64,
        percentage_confirmed: bool,
        contract_value: Option<f64>,
    ) -> Result<AccelerationCase> {
        let case = AccelerationCase::new(
            id,
            self.policy.clone(),
            tracks,
            daily_penalty_rate,
            estimated_cost,
            percentage_confirmed,
            contract_value,
        )?;
        tracing::debug!(
            "Aggregated {} schedule tracks into acceleration {}: {} days, ceiling {}",
            case.tracks.len(),
            case.id,
            case.total_rejected_days(),
            case.max_cost_ceiling
        );
        Ok(case)
    }

    /// Aggregate the schedule tracks of projected cases
    pub fn aggregate_cases(
        &self,
        id: AccelerationCaseId,
        cases: &[Case],
        daily_penalty_rate: f64,
        estimated_cost: f64,
        percentage_confirmed: bool,
        contract_value: Option<f64>,
    ) -> Result<AccelerationCase> {
        let tracks = cases
            .iter()
            .map(RejectedScheduleRef::from_case)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        self.aggregate(id, tracks, daily_penalty_rate, estimated_cost, percentage_confirmed, contract_value)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: the ceiling is rate times days and never negative
        #[test]
        fn test_ceiling_non_negative(rate in 0.0f64..1e7, days in 0u32..10_000) {
            let ceiling = compute_acceleration_ceiling(rate, days);
            prop_assert!(ceiling >= 0.0);
            prop_assert_eq!(ceiling, rate * f64::from(days));
        }

        /// Property: the capped ceiling never exceeds the contract cap
        #[test]
        fn test_cap_respected(rate in 0.0f64..1e6, days in 1u32..1_000, percent in 0.0f64..100.0, value in 0.0f64..1e9) {
            let policy = AccelerationPolicy { max_percent_of_contract: Some(percent) };
            let capped = policy.cap(compute_acceleration_ceiling(rate, days), Some(value));
            prop_assert!(capped >= 0.0);
            prop_assert!(capped <= value * percent / 100.0 + 1e-6);
        }
    }
}
