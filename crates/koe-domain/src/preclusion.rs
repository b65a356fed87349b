//! Preclusion evaluation - was a notice, claim or response given in time
//!
//! Lateness never decides preclusion on its own. The contract requires the
//! objecting party to raise lateness affirmatively, so a verdict of
//! "precluded" needs three things: a category with a timeliness requirement,
//! elapsed days beyond the category's threshold, and an explicit invocation.
//! The evaluator still reports `at_risk` when the threshold is exceeded so
//! callers can surface the exposure.

use crate::deadline::days_between;
use crate::error::{Result, ValidationError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default threshold for "without undue delay", in calendar days
pub const UNDUE_DELAY_DAYS: u32 = 14;

/// Category of a claim; selects the deadline rule that applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimCategory {
    /// Instruction treated as a change without a formal change order
    IrregularChange,
    /// Defects in the owner's deliveries or instructions
    OwnerDefect,
    /// Extraordinary circumstances outside either party's control
    ForceMajeure,
    /// Delay caused by the owner
    ScheduleDelay,
    /// Formal change order issued by the owner
    OrderedChange,
    /// Anything else
    Other,
}

impl ClaimCategory {
    /// Get the category as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimCategory::IrregularChange => "irregular_change",
            ClaimCategory::OwnerDefect => "owner_defect",
            ClaimCategory::ForceMajeure => "force_majeure",
            ClaimCategory::ScheduleDelay => "schedule_delay",
            ClaimCategory::OrderedChange => "ordered_change",
            ClaimCategory::Other => "other",
        }
    }

    /// Parse a category from a string (dashes or underscores)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "irregular_change" => Some(ClaimCategory::IrregularChange),
            "owner_defect" => Some(ClaimCategory::OwnerDefect),
            "force_majeure" => Some(ClaimCategory::ForceMajeure),
            "schedule_delay" => Some(ClaimCategory::ScheduleDelay),
            "ordered_change" => Some(ClaimCategory::OrderedChange),
            "other" => Some(ClaimCategory::Other),
            _ => None,
        }
    }

    /// Contract clause governing notice for this category
    pub fn rule_id(&self) -> RuleId {
        match self {
            ClaimCategory::IrregularChange => RuleId::Ns8407_32_2,
            ClaimCategory::OwnerDefect => RuleId::Ns8407_25_1_2,
            ClaimCategory::ForceMajeure | ClaimCategory::ScheduleDelay => RuleId::Ns8407_33_4,
            ClaimCategory::OrderedChange => RuleId::Ns8407_31_3,
            ClaimCategory::Other => RuleId::None,
        }
    }

    /// Deadline rule for this category under the given configuration
    pub fn deadline_rule(&self, config: &PreclusionConfig) -> DeadlineRule {
        match self {
            ClaimCategory::IrregularChange
            | ClaimCategory::OwnerDefect
            | ClaimCategory::ScheduleDelay => DeadlineRule::WithoutUndueDelay {
                threshold_days: config.undue_delay_days,
            },
            ClaimCategory::ForceMajeure => DeadlineRule::WithoutUndueDelay {
                threshold_days: config.force_majeure_days,
            },
            ClaimCategory::OrderedChange | ClaimCategory::Other => DeadlineRule::NoHardDeadline,
        }
    }

    /// Irregular changes carry a hard notice deadline with its own consequences
    pub fn is_special_category_with_hard_deadline(&self) -> bool {
        matches!(self, ClaimCategory::IrregularChange)
    }

    /// Force majeure entitles to schedule relief only
    pub fn is_force_majeure(&self) -> bool {
        matches!(self, ClaimCategory::ForceMajeure)
    }
}

impl fmt::Display for ClaimCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ClaimCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ValidationError::UnknownCategory(s.to_string()))
    }
}

/// Identifier of the clause a verdict was evaluated under
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleId {
    /// Notice of irregular change
    #[serde(rename = "ns8407_32_2")]
    Ns8407_32_2,
    /// Notice of defects in the owner's deliveries
    #[serde(rename = "ns8407_25_1_2")]
    Ns8407_25_1_2,
    /// Notice of schedule extension
    #[serde(rename = "ns8407_33_4")]
    Ns8407_33_4,
    /// Formal change order, no hard notice deadline
    #[serde(rename = "ns8407_31_3")]
    Ns8407_31_3,
    /// No rule applies
    #[serde(rename = "none")]
    None,
}

impl RuleId {
    /// Get the identifier as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::Ns8407_32_2 => "ns8407_32_2",
            RuleId::Ns8407_25_1_2 => "ns8407_25_1_2",
            RuleId::Ns8407_33_4 => "ns8407_33_4",
            RuleId::Ns8407_31_3 => "ns8407_31_3",
            RuleId::None => "none",
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deadline rule attached to a category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineRule {
    /// Action must be taken without undue delay
    WithoutUndueDelay {
        /// Calendar days after which the delay is considered undue
        threshold_days: u32,
    },
    /// No hard deadline applies
    NoHardDeadline,
}

impl DeadlineRule {
    /// Whether the rule requires timely action at all
    pub fn requires_timely_action(&self) -> bool {
        matches!(self, DeadlineRule::WithoutUndueDelay { .. })
    }

    /// Whether `days_elapsed` exceeds the rule's threshold
    pub fn is_exceeded(&self, days_elapsed: i64) -> bool {
        match self {
            DeadlineRule::WithoutUndueDelay { threshold_days } => days_elapsed > i64::from(*threshold_days),
            DeadlineRule::NoHardDeadline => false,
        }
    }
}

/// Thresholds for the deadline rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreclusionConfig {
    /// Days before a delay counts as undue
    /// Default: 14
    #[serde(default = "default_undue_delay_days")]
    pub undue_delay_days: u32,

    /// Days before a force-majeure notice counts as late
    /// Default: 14
    #[serde(default = "default_undue_delay_days")]
    pub force_majeure_days: u32,
}

fn default_undue_delay_days() -> u32 {
    UNDUE_DELAY_DAYS
}

impl Default for PreclusionConfig {
    fn default() -> Self {
        Self {
            undue_delay_days: UNDUE_DELAY_DAYS,
            force_majeure_days: UNDUE_DELAY_DAYS,
        }
    }
}

impl PreclusionConfig {
    /// Shorter thresholds (7 days)
    pub fn strict() -> Self {
        Self {
            undue_delay_days: 7,
            force_majeure_days: 7,
        }
    }

    /// Longer thresholds (21 days)
    pub fn lenient() -> Self {
        Self {
            undue_delay_days: 21,
            force_majeure_days: 21,
        }
    }
}

/// Everything needed to evaluate one timeliness gate
#[derive(Debug, Clone, PartialEq)]
pub struct PreclusionInput {
    /// When the circumstance was discovered
    pub discovery_date: Option<NaiveDate>,
    /// When notice was sent, if it has been
    pub notice_date: Option<NaiveDate>,
    /// End of the observation window when no notice has been sent yet
    pub window_end: Option<NaiveDate>,
    /// Category selecting the deadline rule
    pub category: ClaimCategory,
    /// The objecting party has affirmatively raised lateness
    pub invoked_as_late: bool,
}

/// Timeliness verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreclusionVerdict {
    /// `Some(true)` precluded, `Some(false)` not precluded, `None` not yet assessable
    pub is_precluded: Option<bool>,
    /// Calendar days between discovery and the reference date
    pub days_elapsed: i64,
    /// Clause the verdict was evaluated under
    pub applicable_rule: RuleId,
    /// Threshold exceeded, whether or not lateness was invoked
    pub at_risk: bool,
}

impl PreclusionVerdict {
    fn indeterminate(applicable_rule: RuleId) -> Self {
        Self {
            is_precluded: None,
            days_elapsed: 0,
            applicable_rule,
            at_risk: false,
        }
    }

    /// Whether the verdict could be assessed
    pub fn is_assessable(&self) -> bool {
        self.is_precluded.is_some()
    }
}

/// Evaluates timeliness gates under a configuration
#[derive(Debug, Clone, Default)]
pub struct PreclusionEvaluator {
    config: PreclusionConfig,
}

impl PreclusionEvaluator {
    /// Create an evaluator with the given thresholds
    pub fn new(config: PreclusionConfig) -> Self {
        Self { config }
    }

    /// Thresholds in use
    pub fn config(&self) -> &PreclusionConfig {
        &self.config
    }

    /// Evaluate one gate
    ///
    /// The reference date is the notice date, or the window end while no
    /// notice has been sent. A reference date before discovery is rejected.
    pub fn evaluate(&self, input: &PreclusionInput) -> Result<PreclusionVerdict> {
        let rule = input.category.deadline_rule(&self.config);
        let rule_id = input.category.rule_id();

        let Some(discovery) = input.discovery_date else {
            return Ok(PreclusionVerdict::indeterminate(rule_id));
        };
        let Some(reference) = input.notice_date.or(input.window_end) else {
            return Ok(PreclusionVerdict::indeterminate(rule_id));
        };

        if reference < discovery {
            return Err(ValidationError::NoticeBeforeDiscovery {
                discovery,
                notice: reference,
            }
            .into());
        }

        let days_elapsed = days_between(discovery, reference);
        let at_risk = rule.is_exceeded(days_elapsed);

        Ok(PreclusionVerdict {
            is_precluded: Some(at_risk && input.invoked_as_late),
            days_elapsed,
            applicable_rule: rule_id,
            at_risk,
        })
    }
}

/// Evaluate a notice against the default thresholds
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use koe_domain::{evaluate_preclusion, ClaimCategory};
///
/// let verdict = evaluate_preclusion(
///     NaiveDate::from_ymd_opt(2024, 1, 1),
///     NaiveDate::from_ymd_opt(2024, 1, 20),
///     ClaimCategory::IrregularChange,
///     true,
/// ).unwrap();
/// assert_eq!(verdict.is_precluded, Some(true));
/// assert_eq!(verdict.days_elapsed, 19);
/// ```
pub fn evaluate_preclusion(
    discovery_date: Option<NaiveDate>,
    reference_date: Option<NaiveDate>,
    category: ClaimCategory,
    invoked_as_late: bool,
) -> Result<PreclusionVerdict> {
    PreclusionEvaluator::default().evaluate(&PreclusionInput {
        discovery_date,
        notice_date: reference_date,
        window_end: None,
        category,
        invoked_as_late,
    })
}
