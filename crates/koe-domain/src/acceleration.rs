//! Acceleration log - the versioned actions an acceleration case is folded from
//!
//! An acceleration case is persisted the same way as a claim case: as an
//! append-only log of actions under a version counter. The projection replays
//! the actions through the [`AccelerationCase`] lifecycle, so a log can only
//! hold actions the lifecycle accepts.

use crate::case::{CaseId, CaseVersion};
use crate::error::{Result, ValidationError};
use crate::event::{ActorRole, EventId};
use crate::forsering::{
    ensure_not_accelerated, AccelerationCase, AccelerationCaseId, AccelerationPolicy, ForseringCostEngine,
    OwnerDecision, RejectedScheduleRef,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

const ACTIONS: [&str; 9] = [
    "opened",
    "track_added",
    "track_removed",
    "estimate_revised",
    "notified",
    "activated",
    "cost_recorded",
    "owner_responded",
    "stopped",
];

/// A step in the life of an acceleration case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AccelerationAction {
    /// Aggregate rejected schedule tracks into a new acceleration case
    Opened {
        /// Referenced tracks, with their rejected days at the time of opening
        tracks: Vec<RejectedScheduleRef>,
        /// Daily penalty rate (NOK per day)
        daily_penalty_rate: f64,
        /// Estimated acceleration cost (NOK)
        estimated_cost: f64,
        /// Percentage-of-contract ceiling confirmed
        percentage_confirmed: bool,
        /// Contract value, for the percentage cap
        #[serde(default, skip_serializing_if = "Option::is_none")]
        contract_value: Option<f64>,
    },
    /// Reference one more rejected schedule track
    TrackAdded {
        /// Added reference
        track: RejectedScheduleRef,
    },
    /// Drop a referenced track
    TrackRemoved {
        /// Case whose schedule track is dropped
        case_id: CaseId,
    },
    /// Revise the estimate and its confirmation
    EstimateRevised {
        /// New estimate (NOK)
        estimated_cost: f64,
        /// Percentage-of-contract ceiling confirmed
        percentage_confirmed: bool,
    },
    /// Owner notified of the intent to accelerate
    Notified {
        /// Date of the notice
        notice_date: NaiveDate,
    },
    /// Acceleration started
    Activated,
    /// Incurred cost so far
    CostRecorded {
        /// Total incurred (NOK)
        amount: f64,
    },
    /// Owner's answer
    OwnerResponded {
        /// Accepted or rejected
        decision: OwnerDecision,
    },
    /// Stopped by the contractor
    Stopped,
}

impl AccelerationAction {
    /// Get the action name
    pub fn as_str(&self) -> &'static str {
        match self {
            AccelerationAction::Opened { .. } => "opened",
            AccelerationAction::TrackAdded { .. } => "track_added",
            AccelerationAction::TrackRemoved { .. } => "track_removed",
            AccelerationAction::EstimateRevised { .. } => "estimate_revised",
            AccelerationAction::Notified { .. } => "notified",
            AccelerationAction::Activated => "activated",
            AccelerationAction::CostRecorded { .. } => "cost_recorded",
            AccelerationAction::OwnerResponded { .. } => "owner_responded",
            AccelerationAction::Stopped => "stopped",
        }
    }

    /// Party that takes this action
    pub fn actor(&self) -> ActorRole {
        match self {
            AccelerationAction::OwnerResponded { .. } => ActorRole::Owner,
            _ => ActorRole::Contractor,
        }
    }

    /// Cases whose schedule tracks this action starts referencing
    pub fn referenced_cases(&self) -> Vec<&CaseId> {
        match self {
            AccelerationAction::Opened { tracks, .. } => tracks.iter().map(|t| &t.case_id).collect(),
            AccelerationAction::TrackAdded { track } => vec![&track.case_id],
            _ => Vec::new(),
        }
    }
}

/// An immutable entry in an acceleration log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccelerationEvent {
    /// Unique identifier
    pub id: EventId,
    /// When the action happened
    pub timestamp: DateTime<Utc>,
    /// Recorded action
    #[serde(flatten)]
    pub action: AccelerationAction,
}

impl AccelerationEvent {
    /// Record an action at `timestamp`
    pub fn new(action: AccelerationAction, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: EventId::new(),
            timestamp,
            action,
        }
    }

    /// Convert to the persisted, string-typed shape
    pub fn to_record(&self) -> std::result::Result<AccelerationRecord, ValidationError> {
        let payload = serde_json::to_string(&self.action)
            .map_err(|e| ValidationError::MalformedPayload(e.to_string()))?;

        Ok(AccelerationRecord {
            id: self.id.to_string(),
            action: self.action.as_str().to_string(),
            timestamp: self.timestamp.to_rfc3339(),
            payload,
        })
    }
}

/// Persisted shape of an acceleration action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccelerationRecord {
    /// Event id (UUID string)
    pub id: String,
    /// Action name
    pub action: String,
    /// RFC 3339 timestamp
    pub timestamp: String,
    /// JSON payload, tagged with the action name
    pub payload: String,
}

impl TryFrom<AccelerationRecord> for AccelerationEvent {
    type Error = ValidationError;

    fn try_from(record: AccelerationRecord) -> std::result::Result<Self, Self::Error> {
        if !ACTIONS.contains(&record.action.as_str()) {
            return Err(ValidationError::UnknownAccelerationAction(record.action));
        }

        let timestamp = DateTime::parse_from_rfc3339(&record.timestamp)
            .map_err(|e| ValidationError::InvalidTimestamp(format!("{}: {}", record.timestamp, e)))?
            .with_timezone(&Utc);

        let action: AccelerationAction = serde_json::from_str(&record.payload)
            .map_err(|e| ValidationError::MalformedPayload(e.to_string()))?;
        if action.as_str() != record.action {
            return Err(ValidationError::MalformedPayload(format!(
                "payload holds {} but the record says {}",
                action.as_str(),
                record.action
            )));
        }

        Ok(AccelerationEvent {
            id: EventId::from_string(&record.id)?,
            timestamp,
            action,
        })
    }
}

/// Folds acceleration logs under a cap policy
#[derive(Debug, Clone, Default)]
pub struct AccelerationProjection {
    engine: ForseringCostEngine,
}

impl AccelerationProjection {
    /// Create a projection capping ceilings under `policy`
    pub fn new(policy: &AccelerationPolicy) -> Self {
        Self {
            engine: ForseringCostEngine::new(policy.clone()),
        }
    }

    /// Engine used to aggregate opening actions
    pub fn engine(&self) -> &ForseringCostEngine {
        &self.engine
    }

    /// Fold a full acceleration log
    ///
    /// Actions are replayed in timestamp order; ties keep log order.
    pub fn fold(&self, id: AccelerationCaseId, events: &[AccelerationEvent]) -> Result<AccelerationCase> {
        let mut ordered: Vec<&AccelerationEvent> = events.iter().collect();
        ordered.sort_by_key(|e| e.timestamp);

        let (first, rest) = ordered.split_first().ok_or(ValidationError::EmptyAcceleration)?;
        let AccelerationAction::Opened {
            tracks,
            daily_penalty_rate,
            estimated_cost,
            percentage_confirmed,
            contract_value,
        } = &first.action
        else {
            return Err(ValidationError::AccelerationMustStartOpened(first.action.as_str()).into());
        };

        let mut case = self.engine.aggregate(
            id,
            tracks.clone(),
            *daily_penalty_rate,
            *estimated_cost,
            *percentage_confirmed,
            *contract_value,
        )?;
        for event in rest {
            Self::apply(&mut case, event)?;
        }
        case.set_version(CaseVersion::new(events.len() as u64));

        tracing::debug!(
            "Folded acceleration {}: {} actions, state {}",
            id,
            events.len(),
            case.state()
        );
        Ok(case)
    }

    fn apply(case: &mut AccelerationCase, event: &AccelerationEvent) -> Result<()> {
        match &event.action {
            AccelerationAction::Opened { .. } => Err(ValidationError::InvalidAccelerationTransition {
                from: case.state(),
                action: "reopen",
            }
            .into()),
            AccelerationAction::TrackAdded { track } => case.add_track(track.clone()),
            AccelerationAction::TrackRemoved { case_id } => case.remove_track(case_id).map(|_| ()),
            AccelerationAction::EstimateRevised {
                estimated_cost,
                percentage_confirmed,
            } => case.revise_estimate(*estimated_cost, *percentage_confirmed),
            AccelerationAction::Notified { notice_date } => case.notify(*notice_date),
            AccelerationAction::Activated => case.activate(),
            AccelerationAction::CostRecorded { amount } => case.record_incurred_cost(*amount, event.timestamp),
            AccelerationAction::OwnerResponded { decision } => case.respond(*decision),
            AccelerationAction::Stopped => case.stop(),
        }
    }

    /// Check that appending `event` keeps the log foldable
    ///
    /// `others` are the other acceleration cases in the store; a schedule
    /// track may only be held by one live acceleration at a time. Returns the
    /// projection the log would have after the append.
    pub fn validate_append(
        &self,
        id: AccelerationCaseId,
        existing: &[AccelerationEvent],
        event: &AccelerationEvent,
        others: &[AccelerationCase],
    ) -> Result<AccelerationCase> {
        for case_id in event.action.referenced_cases() {
            ensure_not_accelerated(case_id, others)?;
        }

        let mut events = Vec::with_capacity(existing.len() + 1);
        events.extend_from_slice(existing);
        events.push(event.clone());
        self.fold(id, &events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainError;
    use crate::forsering::AccelerationState;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, day, 10, 0, 0).unwrap()
    }

    fn id() -> AccelerationCaseId {
        "01890a5d-ac96-774b-bcce-b302099a8057".parse().unwrap()
    }

    fn reference(case: &str, days: u32) -> RejectedScheduleRef {
        RejectedScheduleRef {
            case_id: CaseId::new(case),
            rejected_days: days,
        }
    }

    fn opened(estimated_cost: f64) -> AccelerationEvent {
        AccelerationEvent::new(
            AccelerationAction::Opened {
                tracks: vec![reference("KOE-1", 12), reference("KOE-4", 8)],
                daily_penalty_rate: 50_000.0,
                estimated_cost,
                percentage_confirmed: true,
                contract_value: None,
            },
            at(1),
        )
    }

    fn projection() -> AccelerationProjection {
        AccelerationProjection::default()
    }

    #[test]
    fn test_fold_full_lifecycle() {
        let events = vec![
            opened(900_000.0),
            AccelerationEvent::new(
                AccelerationAction::Notified {
                    notice_date: NaiveDate::from_ymd_opt(2024, 9, 2).unwrap(),
                },
                at(2),
            ),
            AccelerationEvent::new(AccelerationAction::Activated, at(3)),
            AccelerationEvent::new(AccelerationAction::CostRecorded { amount: 200_000.0 }, at(10)),
            AccelerationEvent::new(AccelerationAction::CostRecorded { amount: 450_000.0 }, at(17)),
        ];

        let case = projection().fold(id(), &events).unwrap();
        assert_eq!(case.state(), AccelerationState::Activated);
        assert_eq!(case.version(), CaseVersion::new(5));
        assert_eq!(case.total_rejected_days(), 20);
        assert_eq!(case.max_cost_ceiling(), 1_000_000.0);
        assert_eq!(case.current_incurred_cost(), Some(450_000.0));
        assert_eq!(case.ledger()[0].recorded_at, at(10));
    }

    #[test]
    fn test_activation_over_ceiling_cannot_be_appended() {
        let existing = vec![
            opened(1_200_000.0),
            AccelerationEvent::new(
                AccelerationAction::Notified {
                    notice_date: NaiveDate::from_ymd_opt(2024, 9, 2).unwrap(),
                },
                at(2),
            ),
        ];
        let activate = AccelerationEvent::new(AccelerationAction::Activated, at(3));
        let err = projection().validate_append(id(), &existing, &activate, &[]).unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation(ValidationError::CostNotWithinLimit { .. })
        ));
    }

    #[test]
    fn test_log_must_start_opened() {
        let events = vec![AccelerationEvent::new(AccelerationAction::Activated, at(1))];
        assert_eq!(
            projection().fold(id(), &events).unwrap_err(),
            DomainError::Validation(ValidationError::AccelerationMustStartOpened("activated"))
        );
        assert_eq!(
            projection().fold(id(), &[]).unwrap_err(),
            DomainError::Validation(ValidationError::EmptyAcceleration)
        );
    }

    #[test]
    fn test_cannot_reopen() {
        let events = vec![opened(1.0), opened(2.0)];
        assert!(matches!(
            projection().fold(id(), &events).unwrap_err(),
            DomainError::Validation(ValidationError::InvalidAccelerationTransition { .. })
        ));
    }

    #[test]
    fn test_track_held_by_another_live_acceleration() {
        let other = projection()
            .fold(
                "01890a5d-ac96-774b-bcce-b302099a8058".parse().unwrap(),
                &[opened(1.0)],
            )
            .unwrap();

        let err = projection().validate_append(id(), &[], &opened(1.0), &[other]).unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation(ValidationError::AlreadyAccelerated { .. })
        ));
    }

    #[test]
    fn test_owner_answers_the_notice() {
        let respond = AccelerationAction::OwnerResponded {
            decision: OwnerDecision::Rejected,
        };
        assert_eq!(respond.actor(), ActorRole::Owner);
        assert_eq!(AccelerationAction::Stopped.actor(), ActorRole::Contractor);

        let events = vec![
            opened(1.0),
            AccelerationEvent::new(
                AccelerationAction::Notified {
                    notice_date: NaiveDate::from_ymd_opt(2024, 9, 2).unwrap(),
                },
                at(2),
            ),
            AccelerationEvent::new(respond, at(4)),
        ];
        let case = projection().fold(id(), &events).unwrap();
        assert_eq!(case.owner_response(), Some(OwnerDecision::Rejected));
    }

    #[test]
    fn test_record_conversion() {
        let event = AccelerationEvent::new(AccelerationAction::CostRecorded { amount: 75_000.0 }, at(6));
        let record = event.to_record().unwrap();
        assert_eq!(record.action, "cost_recorded");
        assert_eq!(AccelerationEvent::try_from(record).unwrap(), event);
    }

    #[test]
    fn test_unknown_or_mismatched_action() {
        let record = AccelerationEvent::new(AccelerationAction::Stopped, at(6)).to_record().unwrap();

        let mut unknown = record.clone();
        unknown.action = "paused".to_string();
        assert_eq!(
            AccelerationEvent::try_from(unknown).unwrap_err(),
            ValidationError::UnknownAccelerationAction("paused".to_string())
        );

        let mut mismatched = record;
        mismatched.action = "activated".to_string();
        assert!(matches!(
            AccelerationEvent::try_from(mismatched),
            Err(ValidationError::MalformedPayload(_))
        ));
    }
}
