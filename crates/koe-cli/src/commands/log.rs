//! Log and cases command implementations.

use crate::cli::CaseArgs;
use crate::error::{CliError, Result};
use crate::output::Formatter;
use koe_domain::traits::EventLog;
use koe_domain::status::ordered;
use koe_domain::CaseId;

/// Execute the log command: events in replay order.
pub fn execute_log<L>(args: CaseArgs, log: &L, formatter: &Formatter) -> Result<()>
where
    L: EventLog,
    CliError: From<L::Error>,
{
    let case_id = CaseId::new(args.case);
    let stored = log.load(&case_id)?;
    if stored.is_empty() {
        return Err(CliError::NotFound(case_id.to_string()));
    }

    let events: Vec<_> = ordered(&stored.events).into_iter().cloned().collect();
    println!("{}", formatter.format_events(&events)?);
    Ok(())
}

/// Execute the cases command.
pub fn execute_cases<L>(log: &L, formatter: &Formatter) -> Result<()>
where
    L: EventLog,
    CliError: From<L::Error>,
{
    let ids = log.case_ids()?;
    println!("{}", formatter.format_case_ids(&ids)?);
    Ok(())
}
