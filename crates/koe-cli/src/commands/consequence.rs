//! Consequence command implementation.

use crate::cli::ConsequenceArgs;
use crate::error::Result;
use crate::output::Formatter;
use koe_domain::{resolve_consequence, ConsequenceInput};

/// Execute the consequence command.
pub fn execute_consequence(args: ConsequenceArgs, formatter: &Formatter) -> Result<()> {
    let consequence = resolve_consequence(&ConsequenceInput {
        result: Some(args.result.into()),
        is_special_category_with_hard_deadline: args.special,
        was_timely: args.timely,
        is_force_majeure_category: args.force_majeure,
        is_reversal: args.reversal,
        has_subsidiary_responses: args.has_subsidiary,
    });

    println!("{}", formatter.format_consequence(consequence.as_ref())?);
    Ok(())
}
