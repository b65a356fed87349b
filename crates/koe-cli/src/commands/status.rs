//! Status command implementation.

use crate::cli::CaseArgs;
use crate::commands::forsering::load_accelerations;
use crate::error::{CliError, Result};
use crate::output::Formatter;
use koe_domain::traits::{AccelerationLog, EventLog};
use koe_domain::{AccelerationProjection, CaseId, CaseProjection};

/// Execute the status command.
///
/// The case is linked to the live acceleration holding its schedule track.
pub fn execute_status<L>(
    args: CaseArgs,
    log: &L,
    projection: &CaseProjection,
    accelerations: &AccelerationProjection,
    formatter: &Formatter,
) -> Result<()>
where
    L: AccelerationLog,
    CliError: From<<L as EventLog>::Error>,
{
    let case_id = CaseId::new(args.case);
    let stored = log.load(&case_id)?;
    if stored.is_empty() {
        return Err(CliError::NotFound(case_id.to_string()));
    }

    let case = projection
        .fold(&case_id, &stored.events)?
        .link_acceleration(&load_accelerations(log, accelerations)?);
    println!("{}", formatter.format_case(&case)?);
    Ok(())
}
