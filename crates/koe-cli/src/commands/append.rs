//! Append command implementation.

use crate::cli::AppendArgs;
use crate::error::{CliError, Result};
use crate::output::Formatter;
use koe_domain::traits::EventLog;
use koe_domain::{CaseDetails, CaseId, CaseVersion, ClaimCategory, Event, EventPayload};

/// Execute the append command.
pub fn execute_append<L>(args: AppendArgs, log: &mut L, formatter: &Formatter) -> Result<()>
where
    L: EventLog,
    CliError: From<L::Error>,
{
    let case_id = CaseId::new(args.case.clone());
    let expected = CaseVersion::new(args.expected_version);
    let event = build_event(args)?;
    let description = format!("{} on {} track", event.event_type, event.track_kind);

    let version = log.append(&case_id, expected, event)?;

    match formatter.format() {
        crate::config::OutputFormat::Table => println!(
            "{}",
            formatter.success(&format!("Appended {} to {} (version {})", description, case_id, version))
        ),
        _ => println!("{}", version),
    }
    Ok(())
}

/// Build the event from command-line arguments.
fn build_event(args: AppendArgs) -> Result<Event> {
    let case = match (args.title, args.owner, args.contractor) {
        (Some(title), Some(owner), Some(contractor)) => Some(CaseDetails {
            title,
            owner,
            contractor,
            category: args.category.map_or(ClaimCategory::Other, Into::into),
        }),
        (None, None, None) => None,
        _ => {
            return Err(CliError::InvalidInput(
                "--title, --owner and --contractor must be given together".to_string(),
            ))
        }
    };

    let timestamp = args.at.unwrap_or_else(chrono::Utc::now);

    Ok(Event::new(args.track.into(), args.event_type.into(), args.actor.into(), timestamp).with_payload(
        EventPayload {
            claimed_value: args.claimed,
            approved_value: args.approved,
            result: args.result.map(Into::into),
            discovery_date: args.discovery,
            notice_date: args.notice,
            was_timely: args.was_timely,
            case,
            comment: args.comment,
        },
    ))
}
