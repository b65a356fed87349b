//! Consequence resolution for the basis decision
//!
//! The basis response decides how the dependent tracks are to be read. The
//! resolver is an ordered decision table, evaluated top-down with the first
//! matching row winning. It only signals that subsidiary positions must be
//! promoted; the promotion itself is [`promote_subsidiaries`], applied once per
//! reversal event.

use crate::event::EventId;
use crate::track::{ResponseResult, Track};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Basis decision as seen by the resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasisDecision {
    /// Basis recognised (in full or in part)
    Approved,
    /// Basis refused
    Rejected,
    /// Requirement waived
    Waived,
}

impl From<ResponseResult> for BasisDecision {
    fn from(result: ResponseResult) -> Self {
        match result {
            ResponseResult::Approved | ResponseResult::PartiallyApproved => BasisDecision::Approved,
            ResponseResult::Rejected => BasisDecision::Rejected,
            ResponseResult::Waived => BasisDecision::Waived,
        }
    }
}

/// Severity for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Favourable to the contractor
    Success,
    /// Dispute or fallback positions follow
    Warning,
    /// Claim exposed on several grounds
    Danger,
    /// No downstream consequence
    Info,
}

impl Severity {
    /// Get the severity as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Danger => "danger",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message keys; the text itself belongs to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKey {
    /// Obligation waived, no downstream consequence
    ObligationWaived,
    /// Force majeure recognised: schedule relief only, never compensation
    ForceMajeureScheduleOnly,
    /// Principal position is preclusion, basis recognised subsidiarily
    BasisRecognisedSubsidiarily,
    /// Basis recognised for a timely notice; other tracks evaluated independently
    BasisRecognisedTimely,
    /// Basis recognised
    BasisRecognised,
    /// Force majeure rejected, the schedule claim may still proceed
    ForceMajeureRejectedScheduleMayProceed,
    /// Preclusion and rejection both apply downstream
    DoublySubsidiary,
    /// Rejected although timely; dependent tracks proceed subsidiarily
    RejectedTimely,
    /// Case disputed; dependent tracks proceed subsidiarily
    Disputed,
    /// Every subsidiary compensation/schedule response must become principal
    PromoteSubsidiaryResponses,
}

impl MessageKey {
    /// Get the key as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKey::ObligationWaived => "obligation_waived",
            MessageKey::ForceMajeureScheduleOnly => "force_majeure_schedule_only",
            MessageKey::BasisRecognisedSubsidiarily => "basis_recognised_subsidiarily",
            MessageKey::BasisRecognisedTimely => "basis_recognised_timely",
            MessageKey::BasisRecognised => "basis_recognised",
            MessageKey::ForceMajeureRejectedScheduleMayProceed => "force_majeure_rejected_schedule_may_proceed",
            MessageKey::DoublySubsidiary => "doubly_subsidiary",
            MessageKey::RejectedTimely => "rejected_timely",
            MessageKey::Disputed => "disputed",
            MessageKey::PromoteSubsidiaryResponses => "promote_subsidiary_responses",
        }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to the decision table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConsequenceInput {
    /// Basis decision; `None` while undecided
    pub result: Option<BasisDecision>,
    /// Category carries a hard notice deadline with its own consequences
    pub is_special_category_with_hard_deadline: bool,
    /// Owner's timeliness assessment; `None` when not assessed
    pub was_timely: Option<bool>,
    /// Category is force majeure
    pub is_force_majeure_category: bool,
    /// This basis response flipped a rejection into an approval
    pub is_reversal: bool,
    /// Dependent tracks hold subsidiary responses
    pub has_subsidiary_responses: bool,
}

/// Outcome of the decision table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsequenceResult {
    /// Display severity
    pub severity: Severity,
    /// Main message
    pub message_key: MessageKey,
    /// Set when subsidiary responses must be promoted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reversal_message_key: Option<MessageKey>,
}

/// Resolve the consequence of a basis decision
///
/// Total over its input; returns `None` only while the basis is undecided.
///
/// # Examples
///
/// ```
/// use koe_domain::consequence::{resolve_consequence, BasisDecision, ConsequenceInput, Severity};
///
/// let result = resolve_consequence(&ConsequenceInput {
///     result: Some(BasisDecision::Rejected),
///     ..Default::default()
/// }).unwrap();
/// assert_eq!(result.severity, Severity::Warning);
/// ```
pub fn resolve_consequence(input: &ConsequenceInput) -> Option<ConsequenceResult> {
    let decision = input.result?;
    let special = input.is_special_category_with_hard_deadline;
    let fm = input.is_force_majeure_category;

    let (severity, message_key) = match decision {
        BasisDecision::Waived => (Severity::Info, MessageKey::ObligationWaived),
        BasisDecision::Approved => match (fm, special, input.was_timely) {
            (true, _, _) => (Severity::Success, MessageKey::ForceMajeureScheduleOnly),
            (false, true, Some(false)) => (Severity::Success, MessageKey::BasisRecognisedSubsidiarily),
            (false, true, Some(true)) => (Severity::Success, MessageKey::BasisRecognisedTimely),
            _ => (Severity::Success, MessageKey::BasisRecognised),
        },
        BasisDecision::Rejected => match (fm, special, input.was_timely) {
            (true, _, _) => (Severity::Warning, MessageKey::ForceMajeureRejectedScheduleMayProceed),
            (false, true, Some(false)) => (Severity::Danger, MessageKey::DoublySubsidiary),
            (false, true, Some(true)) => (Severity::Warning, MessageKey::RejectedTimely),
            _ => (Severity::Warning, MessageKey::Disputed),
        },
    };

    let reversal_message_key = (input.is_reversal && input.has_subsidiary_responses)
        .then_some(MessageKey::PromoteSubsidiaryResponses);

    Some(ConsequenceResult {
        severity,
        message_key,
        reversal_message_key,
    })
}

/// Outcome of one promotion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    /// Basis event that triggered the reversal
    pub reversal_event: EventId,
    /// Tracks whose response became principal; empty when already applied
    pub promoted: Vec<crate::track::TrackKind>,
}

/// Reversal events a promotion has already been applied for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromotionLedger {
    applied: HashSet<EventId>,
}

impl PromotionLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a promotion was applied for this reversal event
    pub fn is_applied(&self, reversal_event: &EventId) -> bool {
        self.applied.contains(reversal_event)
    }
}

/// Promote subsidiary compensation/schedule responses to principal
///
/// Idempotent per reversal event: a second call with the same event id
/// changes nothing and reports no promoted tracks. The basis track is never
/// touched.
pub fn promote_subsidiaries<'a, I>(
    tracks: I,
    reversal_event: EventId,
    ledger: &mut PromotionLedger,
) -> Promotion
where
    I: IntoIterator<Item = &'a mut Track>,
{
    if !ledger.applied.insert(reversal_event) {
        return Promotion {
            reversal_event,
            promoted: Vec::new(),
        };
    }

    let promoted = tracks
        .into_iter()
        .filter(|track| track.kind.is_dependent() && track.is_subsidiary)
        .map(|track| {
            track.is_subsidiary = false;
            track.kind
        })
        .collect();

    Promotion {
        reversal_event,
        promoted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::TrackKind;

    fn input(result: BasisDecision) -> ConsequenceInput {
        ConsequenceInput {
            result: Some(result),
            ..Default::default()
        }
    }

    fn resolve(input: ConsequenceInput) -> ConsequenceResult {
        resolve_consequence(&input).unwrap()
    }

    #[test]
    fn test_undecided_is_none() {
        assert_eq!(resolve_consequence(&ConsequenceInput::default()), None);
    }

    #[test]
    fn test_waived_wins_over_everything() {
        let result = resolve(ConsequenceInput {
            is_force_majeure_category: true,
            is_special_category_with_hard_deadline: true,
            was_timely: Some(false),
            ..input(BasisDecision::Waived)
        });
        assert_eq!(result.severity, Severity::Info);
        assert_eq!(result.message_key, MessageKey::ObligationWaived);
    }

    #[test]
    fn test_approved_rows() {
        let fm = resolve(ConsequenceInput {
            is_force_majeure_category: true,
            ..input(BasisDecision::Approved)
        });
        assert_eq!(fm.message_key, MessageKey::ForceMajeureScheduleOnly);

        let late = resolve(ConsequenceInput {
            is_special_category_with_hard_deadline: true,
            was_timely: Some(false),
            ..input(BasisDecision::Approved)
        });
        assert_eq!(late.message_key, MessageKey::BasisRecognisedSubsidiarily);

        let timely = resolve(ConsequenceInput {
            is_special_category_with_hard_deadline: true,
            was_timely: Some(true),
            ..input(BasisDecision::Approved)
        });
        assert_eq!(timely.message_key, MessageKey::BasisRecognisedTimely);

        let general = resolve(input(BasisDecision::Approved));
        assert_eq!(general.severity, Severity::Success);
        assert_eq!(general.message_key, MessageKey::BasisRecognised);
    }

    #[test]
    fn test_rejected_rows() {
        let fm = resolve(ConsequenceInput {
            is_force_majeure_category: true,
            ..input(BasisDecision::Rejected)
        });
        assert_eq!(fm.severity, Severity::Warning);
        assert_eq!(fm.message_key, MessageKey::ForceMajeureRejectedScheduleMayProceed);

        let late = resolve(ConsequenceInput {
            is_special_category_with_hard_deadline: true,
            was_timely: Some(false),
            ..input(BasisDecision::Rejected)
        });
        assert_eq!(late.severity, Severity::Danger);
        assert_eq!(late.message_key, MessageKey::DoublySubsidiary);

        let timely = resolve(ConsequenceInput {
            is_special_category_with_hard_deadline: true,
            was_timely: Some(true),
            ..input(BasisDecision::Rejected)
        });
        assert_eq!(timely.severity, Severity::Warning);
        assert_eq!(timely.message_key, MessageKey::RejectedTimely);

        let general = resolve(input(BasisDecision::Rejected));
        assert_eq!(general.severity, Severity::Warning);
        assert_eq!(general.message_key, MessageKey::Disputed);
    }

    #[test]
    fn test_special_category_without_assessment_uses_general_row() {
        let result = resolve(ConsequenceInput {
            is_special_category_with_hard_deadline: true,
            ..input(BasisDecision::Rejected)
        });
        assert_eq!(result.message_key, MessageKey::Disputed);
    }

    #[test]
    fn test_reversal_key_needs_subsidiary_responses() {
        let without = resolve(ConsequenceInput {
            is_reversal: true,
            ..input(BasisDecision::Approved)
        });
        assert_eq!(without.reversal_message_key, None);

        let with = resolve(ConsequenceInput {
            is_reversal: true,
            has_subsidiary_responses: true,
            ..input(BasisDecision::Approved)
        });
        assert_eq!(with.reversal_message_key, Some(MessageKey::PromoteSubsidiaryResponses));
    }

    #[test]
    fn test_partial_approval_counts_as_approval() {
        assert_eq!(BasisDecision::from(ResponseResult::PartiallyApproved), BasisDecision::Approved);
    }

    #[test]
    fn test_promotion_is_idempotent() {
        let mut compensation = Track::new(TrackKind::Compensation);
        compensation.is_subsidiary = true;
        let mut schedule = Track::new(TrackKind::Schedule);
        schedule.is_subsidiary = true;
        let mut basis = Track::new(TrackKind::Basis);
        basis.is_subsidiary = true;

        let reversal = EventId::new();
        let mut ledger = PromotionLedger::new();

        let first = promote_subsidiaries([&mut basis, &mut compensation, &mut schedule], reversal, &mut ledger);
        assert_eq!(first.promoted, vec![TrackKind::Compensation, TrackKind::Schedule]);
        assert!(!compensation.is_subsidiary);
        assert!(!schedule.is_subsidiary);
        assert!(basis.is_subsidiary, "basis is never promoted");
        assert!(ledger.is_applied(&reversal));

        compensation.is_subsidiary = true;
        let second = promote_subsidiaries([&mut compensation], reversal, &mut ledger);
        assert!(second.promoted.is_empty());
        assert!(compensation.is_subsidiary, "second application is a no-op");
    }
}
