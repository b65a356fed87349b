//! Forsering command implementation.

use crate::cli::{EstimateArgs, ForseringAction, ForseringArgs, StepArgs};
use crate::config::OutputFormat;
use crate::error::{CliError, Result};
use crate::output::Formatter;
use koe_domain::traits::{AccelerationLog, EventLog};
use koe_domain::{
    ensure_not_accelerated, AccelerationAction, AccelerationCase, AccelerationCaseId, AccelerationEvent,
    AccelerationProjection, Case, CaseId, CaseProjection, CaseVersion, DomainError, RejectedScheduleRef,
};

/// Execute a forsering action.
pub fn execute_forsering<L>(
    args: ForseringArgs,
    log: &mut L,
    projection: &CaseProjection,
    accelerations: &AccelerationProjection,
    formatter: &Formatter,
) -> Result<()>
where
    L: AccelerationLog,
    CliError: From<<L as EventLog>::Error>,
{
    match args.action {
        ForseringAction::Preview(estimate) => {
            let cases = load_cases(log, projection, &estimate.cases)?;
            let preview = aggregate(accelerations, AccelerationCaseId::new(), &cases, &estimate)?;
            println!("{}", formatter.format_acceleration(&preview)?);
            Ok(())
        }
        ForseringAction::Open(open) => {
            let cases = load_cases(log, projection, &open.estimate.cases)?;
            let others = load_accelerations(log, accelerations)?;
            for case in &cases {
                ensure_not_accelerated(&case.id, &others).map_err(DomainError::from)?;
            }

            let id = AccelerationCaseId::new();
            let opened = aggregate(accelerations, id, &cases, &open.estimate)?;
            let action = AccelerationAction::Opened {
                tracks: opened.tracks().to_vec(),
                daily_penalty_rate: opened.daily_penalty_rate(),
                estimated_cost: opened.estimated_cost(),
                percentage_confirmed: opened.percentage_confirmed(),
                contract_value: opened.contract_value(),
            };
            let timestamp = open.at.unwrap_or_else(chrono::Utc::now);
            record(log, accelerations, id, CaseVersion::INITIAL, AccelerationEvent::new(action, timestamp), formatter)
        }
        ForseringAction::Show(args) => {
            let case = load_acceleration(log, accelerations, args.id)?;
            println!("{}", formatter.format_acceleration(&case)?);
            Ok(())
        }
        ForseringAction::List => {
            let all = load_accelerations(log, accelerations)?;
            println!("{}", formatter.format_accelerations(&all)?);
            Ok(())
        }
        ForseringAction::AddTrack(args) => {
            let case_id = CaseId::new(args.case);
            let case = load_case(log, projection, case_id)?;
            let track = RejectedScheduleRef::from_case(&case).map_err(DomainError::from)?;
            step(log, accelerations, args.step, AccelerationAction::TrackAdded { track }, formatter)
        }
        ForseringAction::RemoveTrack(args) => {
            let action = AccelerationAction::TrackRemoved {
                case_id: CaseId::new(args.case),
            };
            step(log, accelerations, args.step, action, formatter)
        }
        ForseringAction::Revise(args) => {
            let action = AccelerationAction::EstimateRevised {
                estimated_cost: args.estimated,
                percentage_confirmed: args.confirmed,
            };
            step(log, accelerations, args.step, action, formatter)
        }
        ForseringAction::Notify(args) => {
            let action = AccelerationAction::Notified {
                notice_date: args.notice_date,
            };
            step(log, accelerations, args.step, action, formatter)
        }
        ForseringAction::Activate(args) => step(log, accelerations, args, AccelerationAction::Activated, formatter),
        ForseringAction::Cost(args) => {
            let action = AccelerationAction::CostRecorded { amount: args.amount };
            step(log, accelerations, args.step, action, formatter)
        }
        ForseringAction::Respond(args) => {
            let action = AccelerationAction::OwnerResponded {
                decision: args.decision.into(),
            };
            step(log, accelerations, args.step, action, formatter)
        }
        ForseringAction::Stop(args) => step(log, accelerations, args, AccelerationAction::Stopped, formatter),
    }
}

/// Fold every stored acceleration case.
pub fn load_accelerations<L>(log: &L, projection: &AccelerationProjection) -> Result<Vec<AccelerationCase>>
where
    L: AccelerationLog,
    CliError: From<<L as EventLog>::Error>,
{
    let mut all = Vec::new();
    for id in log.acceleration_ids()? {
        all.push(load_acceleration(log, projection, id)?);
    }
    Ok(all)
}

fn load_acceleration<L>(log: &L, projection: &AccelerationProjection, id: AccelerationCaseId) -> Result<AccelerationCase>
where
    L: AccelerationLog,
    CliError: From<<L as EventLog>::Error>,
{
    let history = log.load_acceleration(&id)?;
    if history.is_empty() {
        return Err(CliError::AccelerationNotFound(id.to_string()));
    }
    Ok(projection.fold(id, &history.events)?)
}

fn load_case<L>(log: &L, projection: &CaseProjection, case_id: CaseId) -> Result<Case>
where
    L: EventLog,
    CliError: From<L::Error>,
{
    let stored = log.load(&case_id)?;
    if stored.is_empty() {
        return Err(CliError::NotFound(case_id.to_string()));
    }
    Ok(projection.fold(&case_id, &stored.events)?)
}

fn load_cases<L>(log: &L, projection: &CaseProjection, ids: &[String]) -> Result<Vec<Case>>
where
    L: EventLog,
    CliError: From<L::Error>,
{
    ids.iter()
        .map(|id| load_case(log, projection, CaseId::new(id.clone())))
        .collect()
}

fn aggregate(
    projection: &AccelerationProjection,
    id: AccelerationCaseId,
    cases: &[Case],
    estimate: &EstimateArgs,
) -> Result<AccelerationCase> {
    Ok(projection.engine().aggregate_cases(
        id,
        cases,
        estimate.rate,
        estimate.estimated,
        estimate.confirmed,
        estimate.contract_value,
    )?)
}

fn step<L>(
    log: &mut L,
    projection: &AccelerationProjection,
    args: StepArgs,
    action: AccelerationAction,
    formatter: &Formatter,
) -> Result<()>
where
    L: AccelerationLog,
    CliError: From<<L as EventLog>::Error>,
{
    let timestamp = args.at.unwrap_or_else(chrono::Utc::now);
    let expected = CaseVersion::new(args.expected_version);
    record(log, projection, args.id, expected, AccelerationEvent::new(action, timestamp), formatter)
}

fn record<L>(
    log: &mut L,
    projection: &AccelerationProjection,
    id: AccelerationCaseId,
    expected: CaseVersion,
    event: AccelerationEvent,
    formatter: &Formatter,
) -> Result<()>
where
    L: AccelerationLog,
    CliError: From<<L as EventLog>::Error>,
{
    if expected != CaseVersion::INITIAL && log.load_acceleration(&id)?.is_empty() {
        return Err(CliError::AccelerationNotFound(id.to_string()));
    }

    let action = event.action.as_str();
    let version = log.append_acceleration(&id, expected, event)?;

    match formatter.format() {
        OutputFormat::Table => {
            println!(
                "{}",
                formatter.success(&format!("Recorded {} on acceleration {} (version {})", action, id, version))
            );
            let case = load_acceleration(log, projection, id)?;
            println!("{}", formatter.format_acceleration(&case)?);
        }
        OutputFormat::Json => println!("{}", serde_json::json!({ "id": id, "version": version })),
        OutputFormat::Quiet => println!("{} {}", id, version),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{AccelerationArgs, DecisionArg, NotifyArgs, OpenArgs, RespondArgs, ReviseArgs, TrackRefArgs};
    use chrono::{NaiveDate, TimeZone, Utc};
    use koe_domain::{AccelerationState, Event, OwnerDecision, ResponseResult, TrackKind};
    use koe_store::{MemoryStore, StoreError};

    fn at(day: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, day, 9, 0, 0).unwrap()
    }

    fn rejected_schedule(log: &mut MemoryStore, id: &str, days: f64) {
        let case_id = CaseId::new(id);
        let mut version = CaseVersion::INITIAL;
        for event in [
            Event::claim_sent(TrackKind::Basis, at(1), None),
            Event::claim_sent(TrackKind::Schedule, at(2), Some(days)),
            Event::response(TrackKind::Schedule, at(5), ResponseResult::Rejected, None),
        ] {
            version = log.append(&case_id, version, event).unwrap();
        }
    }

    fn estimate(cases: &[&str], estimated: f64) -> EstimateArgs {
        EstimateArgs {
            cases: cases.iter().map(|c| c.to_string()).collect(),
            rate: 50_000.0,
            estimated,
            confirmed: true,
            contract_value: None,
        }
    }

    fn run(log: &mut MemoryStore, action: ForseringAction) -> Result<()> {
        let formatter = Formatter::new(OutputFormat::Quiet, false);
        execute_forsering(
            ForseringArgs { action },
            log,
            &CaseProjection::default(),
            &AccelerationProjection::default(),
            &formatter,
        )
    }

    fn open(log: &mut MemoryStore, cases: &[&str], estimated: f64) -> AccelerationCase {
        run(
            log,
            ForseringAction::Open(OpenArgs {
                estimate: estimate(cases, estimated),
                at: Some(at(10)),
            }),
        )
        .unwrap();
        let first = CaseId::new(cases[0]);
        load_accelerations(log, &AccelerationProjection::default())
            .unwrap()
            .into_iter()
            .find(|a| !a.is_stopped() && a.references(&first))
            .unwrap()
    }

    fn step_args(case: &AccelerationCase, day: u32) -> StepArgs {
        StepArgs {
            id: case.id(),
            expected_version: case.version().value(),
            at: Some(at(day)),
        }
    }

    fn reload(log: &MemoryStore, case: &AccelerationCase) -> AccelerationCase {
        load_acceleration(log, &AccelerationProjection::default(), case.id()).unwrap()
    }

    #[test]
    fn test_preview_saves_nothing() {
        let mut log = MemoryStore::new();
        rejected_schedule(&mut log, "KOE-1", 12.0);
        rejected_schedule(&mut log, "KOE-2", 8.0);

        run(&mut log, ForseringAction::Preview(estimate(&["KOE-1", "KOE-2"], 1_200_000.0))).unwrap();
        assert!(log.acceleration_ids().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_case() {
        let mut log = MemoryStore::new();
        let err = run(&mut log, ForseringAction::Preview(estimate(&["KOE-404"], 1.0))).unwrap_err();
        assert!(matches!(err, CliError::NotFound(_)));
    }

    #[test]
    fn test_lifecycle_through_commands() {
        let mut log = MemoryStore::new();
        rejected_schedule(&mut log, "KOE-1", 12.0);
        rejected_schedule(&mut log, "KOE-2", 8.0);

        let case = open(&mut log, &["KOE-1", "KOE-2"], 900_000.0);
        assert_eq!(case.total_rejected_days(), 20);
        assert_eq!(case.version(), CaseVersion::new(1));

        run(
            &mut log,
            ForseringAction::Notify(NotifyArgs {
                step: step_args(&case, 11),
                notice_date: NaiveDate::from_ymd_opt(2024, 8, 11).unwrap(),
            }),
        )
        .unwrap();
        let case = reload(&log, &case);
        run(&mut log, ForseringAction::Activate(step_args(&case, 12))).unwrap();
        let case = reload(&log, &case);
        run(
            &mut log,
            ForseringAction::Respond(RespondArgs {
                step: step_args(&case, 13),
                decision: DecisionArg::Accepted,
            }),
        )
        .unwrap();

        let case = reload(&log, &case);
        assert_eq!(case.state(), AccelerationState::OwnerResponded);
        assert_eq!(case.owner_response(), Some(OwnerDecision::Accepted));
        assert_eq!(case.version(), CaseVersion::new(4));

        run(&mut log, ForseringAction::Show(AccelerationArgs { id: case.id() })).unwrap();
        run(&mut log, ForseringAction::List).unwrap();
    }

    #[test]
    fn test_stale_version_is_refused() {
        let mut log = MemoryStore::new();
        rejected_schedule(&mut log, "KOE-1", 12.0);
        let case = open(&mut log, &["KOE-1"], 100_000.0);

        run(
            &mut log,
            ForseringAction::Revise(ReviseArgs {
                step: step_args(&case, 11),
                estimated: 90_000.0,
                confirmed: true,
            }),
        )
        .unwrap();
        let err = run(&mut log, ForseringAction::Stop(step_args(&case, 12))).unwrap_err();
        assert!(matches!(err, CliError::Store(StoreError::AccelerationConflict { .. })));
    }

    #[test]
    fn test_case_cannot_join_two_live_accelerations() {
        let mut log = MemoryStore::new();
        rejected_schedule(&mut log, "KOE-1", 12.0);
        rejected_schedule(&mut log, "KOE-2", 8.0);
        let first = open(&mut log, &["KOE-1"], 100_000.0);
        let second = open(&mut log, &["KOE-2"], 100_000.0);

        let err = run(
            &mut log,
            ForseringAction::AddTrack(TrackRefArgs {
                step: step_args(&second, 11),
                case: "KOE-1".to_string(),
            }),
        )
        .unwrap_err();
        assert!(err.to_string().contains(&first.id().to_string()));

        run(&mut log, ForseringAction::Stop(step_args(&first, 12))).unwrap();
        run(
            &mut log,
            ForseringAction::AddTrack(TrackRefArgs {
                step: step_args(&second, 13),
                case: "KOE-1".to_string(),
            }),
        )
        .unwrap();
        assert_eq!(reload(&log, &second).total_rejected_days(), 20);
    }

    #[test]
    fn test_unknown_acceleration() {
        let mut log = MemoryStore::new();
        let id: AccelerationCaseId = "01890a5d-ac96-774b-bcce-b302099a8057".parse().unwrap();
        let err = run(
            &mut log,
            ForseringAction::Activate(StepArgs {
                id,
                expected_version: 1,
                at: None,
            }),
        )
        .unwrap_err();
        assert!(matches!(err, CliError::AccelerationNotFound(_)));
    }
}
