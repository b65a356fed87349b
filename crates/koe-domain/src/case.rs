//! Case projection - folds a whole case log into its three tracks
//!
//! A case is opened by its first basis event. Compensation and schedule tracks
//! materialize at their first event. While the basis is rejected, responses on
//! the dependent tracks are recorded as subsidiary; when a later basis response
//! flips the rejection into an approval, those responses are promoted to
//! principal exactly once for that reversal event.

use crate::config::EngineConfig;
use crate::consequence::{
    promote_subsidiaries, resolve_consequence, ConsequenceInput, ConsequenceResult, Promotion,
    PromotionLedger,
};
use crate::error::{DomainError, Result, ValidationError};
use crate::event::{CaseDetails, Event};
use crate::forsering::{acceleration_for, AccelerationCase, AccelerationCaseId};
use crate::preclusion::{ClaimCategory, PreclusionEvaluator, PreclusionInput, PreclusionVerdict};
use crate::status::{ordered, TrackStateMachine};
use crate::track::{ResponseResult, Track, TrackKind, TrackStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Case identifier, chosen by the caller (e.g. "KOE-2024-017")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(String);

impl CaseId {
    /// Wrap a case identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CaseId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Number of entries in a case or acceleration log
///
/// Every successful append increases the version by exactly one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseVersion(u64);

impl CaseVersion {
    /// Version of a case with no events
    pub const INITIAL: CaseVersion = CaseVersion(0);

    /// Wrap a raw version number
    pub fn new(version: u64) -> Self {
        Self(version)
    }

    /// Raw version number
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Version after one more append
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Check the stored version (`self`) against the caller's expectation
    pub fn ensure_matches(&self, expected: CaseVersion) -> Result<()> {
        if *self == expected {
            Ok(())
        } else {
            Err(DomainError::Conflict {
                expected,
                actual: *self,
            })
        }
    }
}

impl fmt::Display for CaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Projection of a case log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    /// Case identifier
    pub id: CaseId,

    /// Case title
    pub title: String,

    /// Owner (byggherre)
    pub owner: String,

    /// Contractor (entreprenør)
    pub contractor: String,

    /// Claim category
    pub category: ClaimCategory,

    /// Basis track, always present
    pub basis: Track,

    /// Compensation track, absent until its first event
    pub compensation: Option<Track>,

    /// Schedule track, absent until its first event
    pub schedule: Option<Track>,

    /// Acceleration case this case's schedule track is aggregated into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceleration: Option<AccelerationCaseId>,

    /// Number of events folded
    pub version: CaseVersion,

    /// Promotions applied, one per reversal event
    pub reversals: Vec<Promotion>,

    /// Consequence of the basis decision; `None` while undecided
    pub consequence: Option<ConsequenceResult>,

    /// Timeliness of the basis notice
    pub basis_preclusion: PreclusionVerdict,
}

impl Case {
    /// Get a track by kind
    pub fn track(&self, kind: TrackKind) -> Option<&Track> {
        match kind {
            TrackKind::Basis => Some(&self.basis),
            TrackKind::Compensation => self.compensation.as_ref(),
            TrackKind::Schedule => self.schedule.as_ref(),
        }
    }

    /// Status of a track; draft while it has no events
    ///
    /// Force majeure never gives compensation, so that track reads as not
    /// applicable.
    pub fn track_status(&self, kind: TrackKind) -> TrackStatus {
        if kind == TrackKind::Compensation && self.category.is_force_majeure() {
            return TrackStatus::NotApplicable;
        }
        self.track(kind).map_or(TrackStatus::Draft, |t| t.status)
    }

    /// Tracks present in the case, basis first
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        std::iter::once(&self.basis)
            .chain(self.compensation.as_ref())
            .chain(self.schedule.as_ref())
    }

    /// Whether any dependent track holds a subsidiary response
    pub fn has_subsidiary_responses(&self) -> bool {
        self.tracks().any(|t| t.kind.is_dependent() && t.is_subsidiary)
    }

    /// Link the case to an acceleration case
    pub fn with_acceleration(mut self, id: AccelerationCaseId) -> Self {
        self.acceleration = Some(id);
        self
    }

    /// Link the case to the live acceleration holding its schedule track, if any
    pub fn link_acceleration(self, accelerations: &[AccelerationCase]) -> Self {
        match acceleration_for(&self.id, accelerations).map(AccelerationCase::id) {
            Some(id) => self.with_acceleration(id),
            None => self,
        }
    }
}

/// Folds case logs under an engine configuration
#[derive(Debug, Clone)]
pub struct CaseProjection {
    preclusion: PreclusionEvaluator,
}

impl CaseProjection {
    /// Create a projection using the given configuration
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            preclusion: PreclusionEvaluator::new(config.preclusion.clone()),
        }
    }

    /// Fold a full case log
    ///
    /// Events are replayed in timestamp order; ties keep log order.
    pub fn fold(&self, case_id: &CaseId, events: &[Event]) -> Result<Case> {
        let ordered = ordered(events);
        let first = ordered.first().ok_or(ValidationError::EmptyCase)?;
        if first.track_kind != TrackKind::Basis {
            return Err(ValidationError::CaseMustStartWithBasis(first.track_kind).into());
        }

        let details = ordered
            .iter()
            .find_map(|e| e.payload.case.clone())
            .unwrap_or_else(|| CaseDetails {
                title: case_id.to_string(),
                owner: String::new(),
                contractor: String::new(),
                category: ClaimCategory::Other,
            });
        let category = details.category;

        let mut basis = Track::new(TrackKind::Basis);
        let mut compensation: Option<Track> = None;
        let mut schedule: Option<Track> = None;
        let mut ledger = PromotionLedger::new();
        let mut reversals = Vec::new();
        let mut last_response_reversed = false;
        let mut reversal_had_subsidiaries = false;

        for event in ordered {
            let machine = TrackStateMachine::new(event.track_kind);
            match event.track_kind {
                TrackKind::Basis => {
                    let previous = basis.result;
                    machine.apply(&mut basis, event)?;
                    if !event.event_type.is_response() {
                        continue;
                    }

                    let reversed = previous == Some(ResponseResult::Rejected)
                        && basis.result.is_some_and(|r| r.is_approval());
                    last_response_reversed = reversed;
                    if reversed {
                        reversal_had_subsidiaries = [&compensation, &schedule]
                            .into_iter()
                            .flatten()
                            .any(|t| t.is_subsidiary);
                        let promotion = promote_subsidiaries(
                            compensation.iter_mut().chain(schedule.iter_mut()),
                            event.id,
                            &mut ledger,
                        );
                        tracing::debug!(
                            "Basis reversal {} in case {} promoted {:?}",
                            event.id,
                            case_id,
                            promotion.promoted
                        );
                        reversals.push(promotion);
                    }
                }
                TrackKind::Compensation | TrackKind::Schedule => {
                    if event.track_kind == TrackKind::Compensation && category.is_force_majeure() {
                        return Err(ValidationError::CompensationNotApplicable.into());
                    }
                    let slot = if event.track_kind == TrackKind::Compensation {
                        &mut compensation
                    } else {
                        &mut schedule
                    };
                    let track = slot.get_or_insert_with(|| Track::new(event.track_kind));
                    machine.apply(track, event)?;
                    if event.event_type.is_response() {
                        track.is_subsidiary = basis.result == Some(ResponseResult::Rejected);
                    }
                }
            }
        }

        let consequence = resolve_consequence(&ConsequenceInput {
            result: basis.result.map(Into::into),
            is_special_category_with_hard_deadline: category.is_special_category_with_hard_deadline(),
            was_timely: basis.was_timely,
            is_force_majeure_category: category.is_force_majeure(),
            is_reversal: last_response_reversed,
            has_subsidiary_responses: last_response_reversed && reversal_had_subsidiaries,
        });

        let basis_preclusion = self.preclusion.evaluate(&PreclusionInput {
            discovery_date: basis.discovery_date,
            notice_date: basis.notice_date,
            window_end: None,
            category,
            invoked_as_late: basis.was_timely == Some(false),
        })?;

        tracing::debug!(
            "Folded case {}: {} events, basis {}",
            case_id,
            events.len(),
            basis.status
        );

        Ok(Case {
            id: case_id.clone(),
            title: details.title,
            owner: details.owner,
            contractor: details.contractor,
            category,
            basis,
            compensation,
            schedule,
            acceleration: None,
            version: CaseVersion::new(events.len() as u64),
            reversals,
            consequence,
            basis_preclusion,
        })
    }

    /// Check that appending `event` keeps the log foldable
    ///
    /// Returns the projection the log would have after the append.
    pub fn validate_append(&self, case_id: &CaseId, existing: &[Event], event: &Event) -> Result<Case> {
        let mut events = Vec::with_capacity(existing.len() + 1);
        events.extend_from_slice(existing);
        events.push(event.clone());
        self.fold(case_id, &events)
    }
}

impl Default for CaseProjection {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consequence::{MessageKey, Severity};
    use crate::event::{ActorRole, EventPayload, EventType};
    use crate::forsering::ForseringCostEngine;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    fn t(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap()
    }

    fn opening(category: ClaimCategory, day: u32) -> Event {
        Event::new(TrackKind::Basis, EventType::ClaimSent, ActorRole::Contractor, t(day)).with_payload(
            EventPayload {
                case: Some(CaseDetails {
                    title: "Endret fundamentering".to_string(),
                    owner: "Statsbygg".to_string(),
                    contractor: "Veidekke".to_string(),
                    category,
                }),
                discovery_date: NaiveDate::from_ymd_opt(2024, 2, 20),
                notice_date: NaiveDate::from_ymd_opt(2024, 3, 1),
                ..Default::default()
            },
        )
    }

    fn basis_update(result: ResponseResult, day: u32) -> Event {
        Event::new(TrackKind::Basis, EventType::ResponseUpdated, ActorRole::Owner, t(day)).with_payload(
            EventPayload {
                result: Some(result),
                ..Default::default()
            },
        )
    }

    fn case_id() -> CaseId {
        CaseId::new("KOE-2024-017")
    }

    fn fold(events: &[Event]) -> Result<Case> {
        CaseProjection::default().fold(&case_id(), events)
    }

    fn rejected_basis_with_dependents() -> Vec<Event> {
        vec![
            opening(ClaimCategory::OrderedChange, 1),
            Event::claim_sent(TrackKind::Compensation, t(2), Some(400_000.0)),
            Event::claim_sent(TrackKind::Schedule, t(2), Some(15.0)),
            Event::response(TrackKind::Basis, t(5), ResponseResult::Rejected, None),
            Event::response(TrackKind::Compensation, t(6), ResponseResult::PartiallyApproved, Some(250_000.0)),
            Event::response(TrackKind::Schedule, t(6), ResponseResult::Approved, None),
        ]
    }

    #[test]
    fn test_case_details_from_opening_event() {
        let case = fold(&[opening(ClaimCategory::OwnerDefect, 1)]).unwrap();
        assert_eq!(case.title, "Endret fundamentering");
        assert_eq!(case.owner, "Statsbygg");
        assert_eq!(case.category, ClaimCategory::OwnerDefect);
        assert_eq!(case.basis.status, TrackStatus::Sent);
        assert!(case.compensation.is_none());
        assert_eq!(case.track_status(TrackKind::Schedule), TrackStatus::Draft);
        assert_eq!(case.version, CaseVersion::new(1));
        assert_eq!(case.consequence, None);
    }

    #[test]
    fn test_rejected_basis_makes_dependent_responses_subsidiary() {
        let case = fold(&rejected_basis_with_dependents()).unwrap();

        let consequence = case.consequence.unwrap();
        assert_eq!(consequence.severity, Severity::Warning);
        assert_eq!(consequence.message_key, MessageKey::Disputed);

        let compensation = case.compensation.as_ref().unwrap();
        assert!(compensation.is_subsidiary);
        assert_eq!(compensation.grade(), Some(63));
        assert!(case.schedule.as_ref().unwrap().is_subsidiary);
        assert!(case.reversals.is_empty());
    }

    #[test]
    fn test_reversal_promotes_subsidiary_responses() {
        let mut events = rejected_basis_with_dependents();
        let reversal = basis_update(ResponseResult::Approved, 9);
        let reversal_id = reversal.id;
        events.push(reversal);

        let case = fold(&events).unwrap();
        assert_eq!(case.basis.status, TrackStatus::Approved);
        assert!(!case.compensation.as_ref().unwrap().is_subsidiary);
        assert!(!case.schedule.as_ref().unwrap().is_subsidiary);
        assert!(!case.has_subsidiary_responses());

        assert_eq!(case.reversals.len(), 1);
        assert_eq!(case.reversals[0].reversal_event, reversal_id);
        assert_eq!(
            case.reversals[0].promoted,
            vec![TrackKind::Compensation, TrackKind::Schedule]
        );

        let consequence = case.consequence.unwrap();
        assert_eq!(consequence.message_key, MessageKey::BasisRecognised);
        assert_eq!(
            consequence.reversal_message_key,
            Some(MessageKey::PromoteSubsidiaryResponses)
        );
    }

    #[test]
    fn test_refolding_does_not_repeat_promotion() {
        let mut events = rejected_basis_with_dependents();
        events.push(basis_update(ResponseResult::Approved, 9));

        let first = fold(&events).unwrap();
        let second = fold(&events).unwrap();
        assert_eq!(first.reversals, second.reversals);
        assert_eq!(second.reversals.len(), 1);
    }

    #[test]
    fn test_approval_without_prior_rejection_is_not_a_reversal() {
        let events = vec![
            opening(ClaimCategory::Other, 1),
            Event::response(TrackKind::Basis, t(3), ResponseResult::Approved, None),
        ];
        let case = fold(&events).unwrap();
        assert!(case.reversals.is_empty());
        assert_eq!(case.consequence.unwrap().reversal_message_key, None);
    }

    #[test]
    fn test_reversal_key_cleared_by_later_response() {
        let mut events = rejected_basis_with_dependents();
        events.push(basis_update(ResponseResult::Approved, 9));
        events.push(basis_update(ResponseResult::PartiallyApproved, 12));

        let case = fold(&events).unwrap();
        assert_eq!(case.reversals.len(), 1);
        assert_eq!(case.consequence.unwrap().reversal_message_key, None);
    }

    #[test]
    fn test_dependent_response_after_reversal_is_principal() {
        let mut events = rejected_basis_with_dependents();
        events.push(basis_update(ResponseResult::Approved, 9));
        events.push(
            Event::new(TrackKind::Compensation, EventType::ResponseUpdated, ActorRole::Owner, t(10)).with_payload(
                EventPayload {
                    result: Some(ResponseResult::Approved),
                    ..Default::default()
                },
            ),
        );

        let case = fold(&events).unwrap();
        let compensation = case.compensation.unwrap();
        assert!(!compensation.is_subsidiary);
        assert_eq!(compensation.approved_value, Some(400_000.0));
    }

    #[test]
    fn test_empty_log() {
        assert!(matches!(
            fold(&[]).unwrap_err(),
            DomainError::Validation(ValidationError::EmptyCase)
        ));
    }

    #[test]
    fn test_case_must_start_with_basis() {
        let events = vec![
            Event::claim_sent(TrackKind::Schedule, t(1), Some(10.0)),
            opening(ClaimCategory::Other, 2),
        ];
        assert!(matches!(
            fold(&events).unwrap_err(),
            DomainError::Validation(ValidationError::CaseMustStartWithBasis(TrackKind::Schedule))
        ));
    }

    #[test]
    fn test_force_majeure_has_no_compensation() {
        let case = fold(&[opening(ClaimCategory::ForceMajeure, 1)]).unwrap();
        assert_eq!(case.track_status(TrackKind::Compensation), TrackStatus::NotApplicable);

        let events = vec![
            opening(ClaimCategory::ForceMajeure, 1),
            Event::claim_sent(TrackKind::Compensation, t(2), Some(1.0)),
        ];
        assert!(matches!(
            fold(&events).unwrap_err(),
            DomainError::Validation(ValidationError::CompensationNotApplicable)
        ));
    }

    #[test]
    fn test_late_basis_notice_invoked_by_owner() {
        let events = vec![
            Event::new(TrackKind::Basis, EventType::ClaimSent, ActorRole::Contractor, t(1)).with_payload(
                EventPayload {
                    case: Some(CaseDetails {
                        title: "Pålegg uten endringsordre".to_string(),
                        owner: "Statens vegvesen".to_string(),
                        contractor: "AF Gruppen".to_string(),
                        category: ClaimCategory::IrregularChange,
                    }),
                    discovery_date: NaiveDate::from_ymd_opt(2024, 1, 1),
                    notice_date: NaiveDate::from_ymd_opt(2024, 1, 20),
                    ..Default::default()
                },
            ),
            Event::new(TrackKind::Basis, EventType::ResponseGiven, ActorRole::Owner, t(4)).with_payload(
                EventPayload {
                    result: Some(ResponseResult::Rejected),
                    was_timely: Some(false),
                    ..Default::default()
                },
            ),
        ];

        let case = fold(&events).unwrap();
        assert_eq!(case.basis_preclusion.is_precluded, Some(true));
        assert_eq!(case.basis_preclusion.days_elapsed, 19);

        let consequence = case.consequence.unwrap();
        assert_eq!(consequence.severity, Severity::Danger);
        assert_eq!(consequence.message_key, MessageKey::DoublySubsidiary);
    }

    #[test]
    fn test_validate_append_rejects_invalid_event() {
        let projection = CaseProjection::default();
        let existing = vec![opening(ClaimCategory::Other, 1)];

        let lock = Event::new(TrackKind::Basis, EventType::Locked, ActorRole::Owner, t(2));
        assert!(projection.validate_append(&case_id(), &existing, &lock).is_err());

        let response = Event::response(TrackKind::Basis, t(2), ResponseResult::Approved, None);
        let case = projection.validate_append(&case_id(), &existing, &response).unwrap();
        assert_eq!(case.version, CaseVersion::new(2));
    }

    #[test]
    fn test_partial_schedule_approval_without_value_is_refused() {
        let events = vec![
            opening(ClaimCategory::ScheduleDelay, 1),
            Event::claim_sent(TrackKind::Schedule, t(2), Some(20.0)),
            Event::response(TrackKind::Schedule, t(4), ResponseResult::PartiallyApproved, None),
        ];
        assert_eq!(
            fold(&events).unwrap_err(),
            DomainError::Validation(ValidationError::MissingApprovedValue(TrackKind::Schedule))
        );
    }

    #[test]
    fn test_case_links_live_acceleration() {
        let case = fold(&[
            opening(ClaimCategory::ScheduleDelay, 1),
            Event::claim_sent(TrackKind::Schedule, t(2), Some(15.0)),
            Event::response(TrackKind::Schedule, t(4), ResponseResult::Rejected, None),
        ])
        .unwrap();
        assert_eq!(case.acceleration, None);

        let id: AccelerationCaseId = "01890a5d-ac96-774b-bcce-b302099a8057".parse().unwrap();
        let mut acceleration = ForseringCostEngine::default()
            .aggregate_cases(id, std::slice::from_ref(&case), 50_000.0, 100_000.0, true, None)
            .unwrap();
        let linked = case.clone().link_acceleration(std::slice::from_ref(&acceleration));
        assert_eq!(linked.acceleration, Some(id));

        acceleration.stop().unwrap();
        let released = case.link_acceleration(&[acceleration]);
        assert_eq!(released.acceleration, None);
    }

    #[test]
    fn test_version_conflict() {
        let stored = CaseVersion::new(4);
        assert!(stored.ensure_matches(CaseVersion::new(4)).is_ok());

        let err = stored.ensure_matches(CaseVersion::new(3)).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(
            err,
            DomainError::Conflict {
                expected: CaseVersion::new(3),
                actual: CaseVersion::new(4),
            }
        );
        assert_eq!(CaseVersion::INITIAL.next(), CaseVersion::new(1));
    }
}
