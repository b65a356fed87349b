//! In-memory event log

use crate::{check_acceleration_version, check_case_version, StoreError};
use koe_domain::traits::{AccelerationHistory, AccelerationLog, CaseLog, EventLog};
use koe_domain::{
    AccelerationCase, AccelerationCaseId, AccelerationEvent, AccelerationProjection, CaseId, CaseProjection,
    CaseVersion, EngineConfig, Event,
};
use std::collections::BTreeMap;

/// Event log held in memory, with the same version and validation rules as
/// [`crate::SqliteStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    cases: BTreeMap<CaseId, Vec<Event>>,
    accelerations: BTreeMap<AccelerationCaseId, Vec<AccelerationEvent>>,
    projection: CaseProjection,
    acceleration_projection: AccelerationProjection,
}

impl MemoryStore {
    /// Create an empty store with the default engine configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store validating appends under `config`
    pub fn with_config(config: &EngineConfig) -> Self {
        Self {
            cases: BTreeMap::new(),
            accelerations: BTreeMap::new(),
            projection: CaseProjection::new(config),
            acceleration_projection: AccelerationProjection::new(&config.acceleration),
        }
    }

    fn other_accelerations(&self, except: &AccelerationCaseId) -> Result<Vec<AccelerationCase>, StoreError> {
        let mut cases = Vec::new();
        for (id, events) in self.accelerations.iter().filter(|(id, _)| *id != except) {
            cases.push(self.acceleration_projection.fold(*id, events)?);
        }
        Ok(cases)
    }
}

impl EventLog for MemoryStore {
    type Error = StoreError;

    fn load(&self, case_id: &CaseId) -> Result<CaseLog, Self::Error> {
        Ok(match self.cases.get(case_id) {
            Some(events) => CaseLog {
                case_id: case_id.clone(),
                events: events.clone(),
                version: CaseVersion::new(events.len() as u64),
            },
            None => CaseLog::empty(case_id.clone()),
        })
    }

    fn append(
        &mut self,
        case_id: &CaseId,
        expected_version: CaseVersion,
        event: Event,
    ) -> Result<CaseVersion, Self::Error> {
        let existing = self.cases.get(case_id).map(Vec::as_slice).unwrap_or_default();
        let actual = CaseVersion::new(existing.len() as u64);
        check_case_version(case_id, actual, expected_version)?;

        self.projection.validate_append(case_id, existing, &event)?;
        self.cases.entry(case_id.clone()).or_default().push(event);

        let next = actual.next();
        tracing::debug!("Appended to in-memory case {} (version {})", case_id, next);
        Ok(next)
    }

    fn case_ids(&self) -> Result<Vec<CaseId>, Self::Error> {
        Ok(self.cases.keys().cloned().collect())
    }
}

impl AccelerationLog for MemoryStore {
    fn load_acceleration(&self, id: &AccelerationCaseId) -> Result<AccelerationHistory, Self::Error> {
        Ok(match self.accelerations.get(id) {
            Some(events) => AccelerationHistory {
                id: *id,
                events: events.clone(),
                version: CaseVersion::new(events.len() as u64),
            },
            None => AccelerationHistory::empty(*id),
        })
    }

    fn append_acceleration(
        &mut self,
        id: &AccelerationCaseId,
        expected_version: CaseVersion,
        event: AccelerationEvent,
    ) -> Result<CaseVersion, Self::Error> {
        let existing = self.accelerations.get(id).map(Vec::as_slice).unwrap_or_default();
        let actual = CaseVersion::new(existing.len() as u64);
        check_acceleration_version(id, actual, expected_version)?;

        let others = if event.action.referenced_cases().is_empty() {
            Vec::new()
        } else {
            self.other_accelerations(id)?
        };
        self.acceleration_projection
            .validate_append(*id, existing, &event, &others)?;
        self.accelerations.entry(*id).or_default().push(event);

        let next = actual.next();
        tracing::debug!("Appended to in-memory acceleration {} (version {})", id, next);
        Ok(next)
    }

    fn acceleration_ids(&self) -> Result<Vec<AccelerationCaseId>, Self::Error> {
        Ok(self.accelerations.keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use koe_domain::{AccelerationAction, RejectedScheduleRef, TrackKind};

    #[test]
    fn test_conflict_leaves_log_untouched() {
        let mut store = MemoryStore::new();
        let case_id = CaseId::new("KOE-9");
        let at = Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap();

        store
            .append(&case_id, CaseVersion::INITIAL, Event::claim_sent(TrackKind::Basis, at, None))
            .unwrap();
        let err = store
            .append(&case_id, CaseVersion::INITIAL, Event::claim_sent(TrackKind::Schedule, at, Some(4.0)))
            .unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(store.load(&case_id).unwrap().version, CaseVersion::new(1));
    }

    #[test]
    fn test_conflict_carries_case_id() {
        let mut store = MemoryStore::new();
        let case_id = CaseId::new("KOE-10");
        let at = Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap();

        let err = store
            .append(&case_id, CaseVersion::new(2), Event::claim_sent(TrackKind::Basis, at, None))
            .unwrap_err();
        match err {
            StoreError::Conflict {
                case_id: conflicted,
                expected,
                actual,
            } => {
                assert_eq!(conflicted, case_id);
                assert_eq!(expected, CaseVersion::new(2));
                assert_eq!(actual, CaseVersion::INITIAL);
            }
            other => panic!("expected a conflict, got {other}"),
        }
    }

    #[test]
    fn test_acceleration_log_versions() {
        let mut store = MemoryStore::new();
        let id: AccelerationCaseId = "01890a5d-ac96-774b-bcce-b302099a8057".parse().unwrap();
        let at = Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap();
        let open = AccelerationEvent::new(
            AccelerationAction::Opened {
                tracks: vec![RejectedScheduleRef {
                    case_id: CaseId::new("KOE-9"),
                    rejected_days: 10,
                }],
                daily_penalty_rate: 40_000.0,
                estimated_cost: 300_000.0,
                percentage_confirmed: true,
                contract_value: None,
            },
            at,
        );

        let version = store.append_acceleration(&id, CaseVersion::INITIAL, open.clone()).unwrap();
        assert_eq!(version, CaseVersion::new(1));
        assert_eq!(store.acceleration_ids().unwrap(), vec![id]);

        let err = store
            .append_acceleration(&id, CaseVersion::INITIAL, AccelerationEvent::new(AccelerationAction::Stopped, at))
            .unwrap_err();
        assert!(matches!(err, StoreError::AccelerationConflict { .. }));
        assert!(err.is_conflict());

        let other: AccelerationCaseId = "01890a5d-ac96-774b-bcce-b302099a8058".parse().unwrap();
        let err = store.append_acceleration(&other, CaseVersion::INITIAL, open).unwrap_err();
        assert!(!err.is_conflict());
        assert!(store.load_acceleration(&other).unwrap().is_empty());
    }
}
