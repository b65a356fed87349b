//! Grade command implementation.

use crate::cli::GradeArgs;
use crate::error::{CliError, Result};
use crate::output::Formatter;
use koe_domain::compute_grade;

/// Execute the grade command.
///
/// A claimed value of zero or less has no grade.
pub fn execute_grade(args: GradeArgs, formatter: &Formatter) -> Result<()> {
    if args.approved < 0.0 {
        return Err(CliError::InvalidInput("Approved value must not be negative".to_string()));
    }

    let grade = compute_grade(args.claimed, args.approved);
    println!("{}", formatter.format_grade(grade)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;

    fn run(claimed: f64, approved: f64) -> Result<()> {
        execute_grade(GradeArgs { claimed, approved }, &Formatter::new(OutputFormat::Quiet, false))
    }

    #[test]
    fn test_negative_claim_has_no_grade() {
        assert!(run(-10.0, 5.0).is_ok());
        assert_eq!(compute_grade(-10.0, 5.0), None);
    }

    #[test]
    fn test_negative_approval_is_refused() {
        assert!(matches!(run(100.0, -1.0), Err(CliError::InvalidInput(_))));
    }
}
