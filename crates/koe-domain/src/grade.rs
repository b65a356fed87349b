//! Approval grade - how much of a claim was approved, in percent
//!
//! The grade is numeric only. Bucketing it into favourable/unfavourable
//! labels is left to the presentation layer.

/// Approved share of the claimed value, rounded and clamped to [0, 100]
///
/// Returns `None` when nothing meaningful was claimed (zero, negative or
/// non-finite) or when the approved value is not finite.
///
/// # Examples
///
/// ```
/// use koe_domain::compute_grade;
///
/// assert_eq!(compute_grade(100.0, 45.0), Some(45));
/// assert_eq!(compute_grade(100.0, 130.0), Some(100));
/// assert_eq!(compute_grade(0.0, 10.0), None);
/// ```
pub fn compute_grade(claimed: f64, approved: f64) -> Option<u8> {
    if !claimed.is_finite() || !approved.is_finite() || claimed <= 0.0 {
        return None;
    }

    let percent = (approved / claimed * 100.0).round();
    Some(percent.clamp(0.0, 100.0) as u8)
}
