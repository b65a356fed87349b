//! Deadline arithmetic
//!
//! Contract deadlines run in calendar days. Instants are reduced to their UTC
//! calendar date before differencing, so a notice sent late in the evening
//! counts on the same day as one sent in the morning.

use chrono::{DateTime, NaiveDate, Utc};

/// Signed number of calendar days from `from` to `to`
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use koe_domain::deadline::days_between;
///
/// let discovered = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let notified = NaiveDate::from_ymd_opt(2024, 1, 20).unwrap();
/// assert_eq!(days_between(discovered, notified), 19);
/// assert_eq!(days_between(notified, discovered), -19);
/// ```
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// Calendar-day difference between two instants, by UTC date
pub fn days_between_instants(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    days_between(from.date_naive(), to.date_naive())
}
