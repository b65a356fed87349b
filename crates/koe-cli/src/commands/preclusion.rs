//! Preclusion command implementation.

use crate::cli::PreclusionArgs;
use crate::error::Result;
use crate::output::Formatter;
use koe_domain::{PreclusionConfig, PreclusionEvaluator, PreclusionInput};

/// Execute the preclusion command.
pub fn execute_preclusion(args: PreclusionArgs, config: &PreclusionConfig, formatter: &Formatter) -> Result<()> {
    let evaluator = PreclusionEvaluator::new(config.clone());
    let verdict = evaluator.evaluate(&PreclusionInput {
        discovery_date: args.discovery,
        notice_date: args.notice,
        window_end: args.window_end,
        category: args.category.into(),
        invoked_as_late: args.invoked_late,
    })?;

    println!("{}", formatter.format_verdict(&verdict)?);
    Ok(())
}
