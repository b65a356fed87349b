//! Track state machine - derives a track's status by folding its events
//!
//! The fold always starts from [`TrackStatus::Draft`] and replays the full,
//! timestamp-ordered history. There is no incremental patching: an event that
//! arrives out of order simply lands in its place on the next replay.

use crate::error::{Result, ValidationError};
use crate::event::{Event, EventType};
use crate::track::{ResponseResult, Track, TrackKind, TrackStatus};

/// Reducer for one track kind
#[derive(Debug, Clone, Copy)]
pub struct TrackStateMachine {
    kind: TrackKind,
}

impl TrackStateMachine {
    /// Create a state machine for the given track kind
    pub fn new(kind: TrackKind) -> Self {
        Self { kind }
    }

    /// Track kind this machine folds
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Status after applying `event` in status `from`
    pub fn next_status(
        &self,
        from: TrackStatus,
        event: &Event,
    ) -> std::result::Result<TrackStatus, ValidationError> {
        use EventType as E;
        use TrackStatus as S;

        if event.track_kind != self.kind {
            return Err(ValidationError::MixedTracks {
                expected: self.kind,
                found: event.track_kind,
            });
        }

        if let Some(required) = event.event_type.required_actor() {
            if event.actor_role != required {
                return Err(ValidationError::WrongActor {
                    event: event.event_type,
                    actor: event.actor_role,
                });
            }
        }

        let invalid = || ValidationError::InvalidTransition {
            kind: self.kind,
            from,
            event: event.event_type,
        };

        let next = match (from, event.event_type) {
            (S::Draft, E::ClaimSent) => S::Sent,
            (S::Sent, E::ClaimUpdated) => S::Sent,
            (S::UnderReview | S::UnderNegotiation, E::ClaimUpdated) => S::UnderReview,
            (s, E::ClaimUpdated) if s.has_response() => S::UnderReview,
            (S::Sent | S::UnderReview | S::UnderNegotiation, E::ResponseGiven) => self.response_status(event)?,
            (s, E::ResponseUpdated)
                if s.has_response() || matches!(s, S::UnderReview | S::UnderNegotiation) =>
            {
                self.response_status(event)?
            }
            (S::Rejected | S::PartiallyApproved, E::NegotiationOpened) => S::UnderNegotiation,
            (S::Approved, E::Locked) => S::Locked,
            (s, E::ClaimWithdrawn) if !s.is_terminal() => S::Withdrawn,
            _ => return Err(invalid()),
        };

        Ok(next)
    }

    fn response_status(&self, event: &Event) -> std::result::Result<TrackStatus, ValidationError> {
        event
            .payload
            .result
            .map(|r| r.status())
            .ok_or(ValidationError::MissingResponseResult(self.kind))
    }

    /// Apply one event to a track projection
    pub fn apply(&self, track: &mut Track, event: &Event) -> std::result::Result<(), ValidationError> {
        let next = self.next_status(track.status, event)?;
        let payload = &event.payload;

        for (field, value) in [
            ("claimed_value", payload.claimed_value),
            ("approved_value", payload.approved_value),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(ValidationError::InvalidAmount { field, value: v });
                }
            }
        }

        match event.event_type {
            EventType::ClaimSent | EventType::ClaimUpdated => {
                if payload.claimed_value.is_some() {
                    track.claimed_value = payload.claimed_value;
                }
                if payload.discovery_date.is_some() {
                    track.discovery_date = payload.discovery_date;
                }
                if payload.notice_date.is_some() {
                    track.notice_date = payload.notice_date;
                }
                if event.event_type == EventType::ClaimSent {
                    track.claim_sent_at = Some(event.timestamp);
                }
            }
            EventType::ResponseGiven | EventType::ResponseUpdated => {
                let result = payload.result.ok_or(ValidationError::MissingResponseResult(self.kind))?;
                track.approved_value = match result {
                    ResponseResult::Approved => payload.approved_value.or(track.claimed_value),
                    ResponseResult::Rejected => Some(0.0),
                    ResponseResult::PartiallyApproved if self.kind.is_dependent() => Some(
                        payload
                            .approved_value
                            .ok_or(ValidationError::MissingApprovedValue(self.kind))?,
                    ),
                    ResponseResult::PartiallyApproved => payload.approved_value,
                    ResponseResult::Waived => None,
                };
                track.result = Some(result);
                track.responded_at = Some(event.timestamp);
                if payload.was_timely.is_some() {
                    track.was_timely = payload.was_timely;
                }
            }
            EventType::ClaimWithdrawn | EventType::NegotiationOpened | EventType::Locked => {}
        }

        track.status = next;
        track.event_count += 1;
        Ok(())
    }

    /// Fold an ordered sequence of events into a fresh track
    pub fn fold<'a, I>(&self, events: I) -> std::result::Result<Track, ValidationError>
    where
        I: IntoIterator<Item = &'a Event>,
    {
        let mut track = Track::new(self.kind);
        for event in events {
            self.apply(&mut track, event)?;
        }
        Ok(track)
    }
}

/// Events in replay order: by timestamp, ties keep log order
pub fn ordered(events: &[Event]) -> Vec<&Event> {
    let mut ordered: Vec<&Event> = events.iter().collect();
    // sort_by_key is stable
    ordered.sort_by_key(|e| e.timestamp);
    ordered
}

/// Derive the status of a single track from its events
///
/// All events must target the same track. An empty history is a draft.
pub fn compute_track_status(events: &[Event]) -> Result<TrackStatus> {
    let Some(first) = events.first() else {
        return Ok(TrackStatus::Draft);
    };
    let machine = TrackStateMachine::new(first.track_kind);
    Ok(machine.fold(ordered(events))?.status)
}

/// Project one track out of a whole case log
pub fn project_track(kind: TrackKind, events: &[Event]) -> Result<Track> {
    let machine = TrackStateMachine::new(kind);
    let track = machine.fold(ordered(events).into_iter().filter(|e| e.track_kind == kind))?;
    Ok(track)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainError;
    use crate::event::{ActorRole, EventPayload};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap()
    }

    fn event(kind: TrackKind, event_type: EventType, actor: ActorRole, day: u32) -> Event {
        Event::new(kind, event_type, actor, t(day))
    }

    fn respond(kind: TrackKind, event_type: EventType, result: ResponseResult, day: u32) -> Event {
        event(kind, event_type, ActorRole::Owner, day).with_payload(EventPayload {
            result: Some(result),
            ..Default::default()
        })
    }

    #[test]
    fn test_empty_history_is_draft() {
        assert_eq!(compute_track_status(&[]).unwrap(), TrackStatus::Draft);
    }

    #[test]
    fn test_claim_sent() {
        let events = vec![Event::claim_sent(TrackKind::Basis, t(1), None)];
        assert_eq!(compute_track_status(&events).unwrap(), TrackStatus::Sent);
    }

    #[test]
    fn test_response_maps_to_status() {
        for (result, status) in [
            (ResponseResult::Approved, TrackStatus::Approved),
            (ResponseResult::Rejected, TrackStatus::Rejected),
            (ResponseResult::PartiallyApproved, TrackStatus::PartiallyApproved),
            (ResponseResult::Waived, TrackStatus::NotApplicable),
        ] {
            let events = vec![
                Event::claim_sent(TrackKind::Schedule, t(1), Some(10.0)),
                Event::response(TrackKind::Schedule, t(2), result, Some(5.0)),
            ];
            assert_eq!(compute_track_status(&events).unwrap(), status);
        }
    }

    #[test]
    fn test_claim_update_reopens_responded_track() {
        let events = vec![
            Event::claim_sent(TrackKind::Compensation, t(1), Some(100_000.0)),
            Event::response(TrackKind::Compensation, t(2), ResponseResult::Rejected, None),
            event(TrackKind::Compensation, EventType::ClaimUpdated, ActorRole::Contractor, 3),
        ];
        assert_eq!(compute_track_status(&events).unwrap(), TrackStatus::UnderReview);
    }

    #[test]
    fn test_claim_update_before_response_stays_sent() {
        let events = vec![
            Event::claim_sent(TrackKind::Compensation, t(1), Some(100_000.0)),
            event(TrackKind::Compensation, EventType::ClaimUpdated, ActorRole::Contractor, 2),
        ];
        assert_eq!(compute_track_status(&events).unwrap(), TrackStatus::Sent);
    }

    #[test]
    fn test_latest_response_wins() {
        let events = vec![
            Event::claim_sent(TrackKind::Basis, t(1), None),
            Event::response(TrackKind::Basis, t(2), ResponseResult::Rejected, None),
            respond(TrackKind::Basis, EventType::ResponseUpdated, ResponseResult::Approved, 5),
        ];
        let track = project_track(TrackKind::Basis, &events).unwrap();
        assert_eq!(track.status, TrackStatus::Approved);
        assert_eq!(track.result, Some(ResponseResult::Approved));
        assert_eq!(track.responded_at, Some(t(5)));
    }

    #[test]
    fn test_lock_after_approval() {
        let events = vec![
            Event::claim_sent(TrackKind::Schedule, t(1), Some(10.0)),
            Event::response(TrackKind::Schedule, t(2), ResponseResult::Approved, None),
            event(TrackKind::Schedule, EventType::Locked, ActorRole::Owner, 3),
        ];
        let track = project_track(TrackKind::Schedule, &events).unwrap();
        assert_eq!(track.status, TrackStatus::Locked);
        assert!(track.is_resolved());
        assert_eq!(track.approved_value, Some(10.0));
    }

    #[test]
    fn test_lock_requires_approval() {
        let events = vec![
            Event::claim_sent(TrackKind::Schedule, t(1), Some(10.0)),
            Event::response(TrackKind::Schedule, t(2), ResponseResult::Rejected, None),
            event(TrackKind::Schedule, EventType::Locked, ActorRole::Owner, 3),
        ];
        let err = compute_track_status(&events).unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation(ValidationError::InvalidTransition {
                from: TrackStatus::Rejected,
                event: EventType::Locked,
                ..
            })
        ));
    }

    #[test]
    fn test_withdrawal_is_contractor_only() {
        let events = vec![
            Event::claim_sent(TrackKind::Basis, t(1), None),
            event(TrackKind::Basis, EventType::ClaimWithdrawn, ActorRole::Owner, 2),
        ];
        assert!(matches!(
            compute_track_status(&events).unwrap_err(),
            DomainError::Validation(ValidationError::WrongActor { .. })
        ));

        let events = vec![
            Event::claim_sent(TrackKind::Basis, t(1), None),
            event(TrackKind::Basis, EventType::ClaimWithdrawn, ActorRole::Contractor, 2),
        ];
        assert_eq!(compute_track_status(&events).unwrap(), TrackStatus::Withdrawn);
    }

    #[test]
    fn test_nothing_follows_terminal_status() {
        let events = vec![
            Event::claim_sent(TrackKind::Basis, t(1), None),
            event(TrackKind::Basis, EventType::ClaimWithdrawn, ActorRole::Contractor, 2),
            event(TrackKind::Basis, EventType::ClaimUpdated, ActorRole::Contractor, 3),
        ];
        assert!(compute_track_status(&events).is_err());
    }

    #[test]
    fn test_negotiation_after_partial_approval() {
        let events = vec![
            Event::claim_sent(TrackKind::Compensation, t(1), Some(500_000.0)),
            Event::response(TrackKind::Compensation, t(2), ResponseResult::PartiallyApproved, Some(200_000.0)),
            event(TrackKind::Compensation, EventType::NegotiationOpened, ActorRole::Contractor, 3),
        ];
        let track = project_track(TrackKind::Compensation, &events).unwrap();
        assert_eq!(track.status, TrackStatus::UnderNegotiation);
        assert_eq!(track.approved_value, Some(200_000.0));
        assert_eq!(track.grade(), Some(40));
    }

    #[test]
    fn test_response_without_result() {
        let events = vec![
            Event::claim_sent(TrackKind::Basis, t(1), None),
            event(TrackKind::Basis, EventType::ResponseGiven, ActorRole::Owner, 2),
        ];
        assert!(matches!(
            compute_track_status(&events).unwrap_err(),
            DomainError::Validation(ValidationError::MissingResponseResult(TrackKind::Basis))
        ));
    }

    #[test]
    fn test_partial_approval_needs_approved_value() {
        let events = vec![
            Event::claim_sent(TrackKind::Schedule, t(1), Some(20.0)),
            Event::response(TrackKind::Schedule, t(3), ResponseResult::PartiallyApproved, None),
        ];
        assert!(matches!(
            compute_track_status(&events).unwrap_err(),
            DomainError::Validation(ValidationError::MissingApprovedValue(TrackKind::Schedule))
        ));

        let basis = vec![
            Event::claim_sent(TrackKind::Basis, t(1), None),
            Event::response(TrackKind::Basis, t(3), ResponseResult::PartiallyApproved, None),
        ];
        assert_eq!(compute_track_status(&basis).unwrap(), TrackStatus::PartiallyApproved);
    }

    #[test]
    fn test_mixed_tracks_rejected() {
        let events = vec![
            Event::claim_sent(TrackKind::Basis, t(1), None),
            Event::claim_sent(TrackKind::Schedule, t(2), Some(4.0)),
        ];
        assert!(matches!(
            compute_track_status(&events).unwrap_err(),
            DomainError::Validation(ValidationError::MixedTracks { .. })
        ));
    }

    #[test]
    fn test_out_of_order_events_are_replayed_in_order() {
        let sent = Event::claim_sent(TrackKind::Schedule, t(1), Some(20.0));
        let rejected = Event::response(TrackKind::Schedule, t(3), ResponseResult::Rejected, None);
        let arrived_late = vec![rejected.clone(), sent.clone()];
        let in_order = vec![sent, rejected];

        assert_eq!(
            compute_track_status(&arrived_late).unwrap(),
            compute_track_status(&in_order).unwrap()
        );
    }

    #[test]
    fn test_same_timestamp_keeps_log_order() {
        let at = t(4);
        let events = vec![
            Event::claim_sent(TrackKind::Basis, at, None),
            Event::response(TrackKind::Basis, at, ResponseResult::Approved, None),
        ];
        assert_eq!(compute_track_status(&events).unwrap(), TrackStatus::Approved);
    }

    #[test]
    fn test_negative_amount_rejected() {
        let events = vec![Event::claim_sent(TrackKind::Compensation, t(1), Some(-1.0))];
        assert!(matches!(
            compute_track_status(&events).unwrap_err(),
            DomainError::Validation(ValidationError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_project_track_filters_by_kind() {
        let start = t(1);
        let events = vec![
            Event::claim_sent(TrackKind::Basis, start, None),
            Event::claim_sent(TrackKind::Schedule, start + Duration::hours(1), Some(12.0)),
            Event::response(TrackKind::Schedule, start + Duration::days(2), ResponseResult::PartiallyApproved, Some(5.0)),
        ];
        let schedule = project_track(TrackKind::Schedule, &events).unwrap();
        assert_eq!(schedule.event_count, 2);
        assert_eq!(schedule.rejected_value(), Some(7.0));

        let compensation = project_track(TrackKind::Compensation, &events).unwrap();
        assert_eq!(compensation.status, TrackStatus::Draft);
    }
}
