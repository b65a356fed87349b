//! Track module - the three adjudication tracks of a case
//!
//! Every case splits into a basis track (does a legal basis exist), a
//! compensation track (how much money) and a schedule track (how many extra
//! days). A [`Track`] is a projection: it is rebuilt by folding the track's
//! events and is never mutated directly by callers.

use crate::deadline::days_between_instants;
use crate::error::ValidationError;
use crate::grade::compute_grade;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which adjudication track an event or projection belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    /// Whether a legal basis for the claim exists
    Basis,
    /// Monetary claim tied to the basis
    Compensation,
    /// Additional-time claim tied to the basis
    Schedule,
}

impl TrackKind {
    /// All track kinds, basis first
    pub const ALL: [TrackKind; 3] = [TrackKind::Basis, TrackKind::Compensation, TrackKind::Schedule];

    /// Get the track kind as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Basis => "basis",
            TrackKind::Compensation => "compensation",
            TrackKind::Schedule => "schedule",
        }
    }

    /// Parse a track kind from a string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "basis" => Some(TrackKind::Basis),
            "compensation" => Some(TrackKind::Compensation),
            "schedule" => Some(TrackKind::Schedule),
            _ => None,
        }
    }

    /// Whether this track depends on the basis track
    pub fn is_dependent(&self) -> bool {
        !matches!(self, TrackKind::Basis)
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TrackKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ValidationError::UnknownTrackKind(s.to_string()))
    }
}

/// Derived status of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    /// Nothing sent yet
    Draft,
    /// Claim sent, awaiting response
    Sent,
    /// Claim revised after a response, awaiting a new response
    UnderReview,
    /// Claim approved in full
    Approved,
    /// Claim approved in part
    PartiallyApproved,
    /// Claim rejected
    Rejected,
    /// Parties negotiating after a rejection or partial approval
    UnderNegotiation,
    /// Claim withdrawn by the contractor (terminal)
    Withdrawn,
    /// Approved claim locked by the owner (terminal)
    Locked,
    /// Requirement waived or track does not apply
    NotApplicable,
}

impl TrackStatus {
    /// Get the status as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackStatus::Draft => "draft",
            TrackStatus::Sent => "sent",
            TrackStatus::UnderReview => "under_review",
            TrackStatus::Approved => "approved",
            TrackStatus::PartiallyApproved => "partially_approved",
            TrackStatus::Rejected => "rejected",
            TrackStatus::UnderNegotiation => "under_negotiation",
            TrackStatus::Withdrawn => "withdrawn",
            TrackStatus::Locked => "locked",
            TrackStatus::NotApplicable => "not_applicable",
        }
    }

    /// Resolved tracks need no further action from either party
    pub fn is_resolved(&self) -> bool {
        matches!(self, TrackStatus::Approved | TrackStatus::Locked | TrackStatus::Withdrawn)
    }

    /// No event may follow a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrackStatus::Locked | TrackStatus::Withdrawn)
    }

    /// The owner has answered the current claim
    pub fn has_response(&self) -> bool {
        matches!(
            self,
            TrackStatus::Approved
                | TrackStatus::PartiallyApproved
                | TrackStatus::Rejected
                | TrackStatus::NotApplicable
        )
    }
}

impl fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The owner's answer to a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    /// Claim accepted in full
    Approved,
    /// Claim refused
    Rejected,
    /// Claim accepted in part
    PartiallyApproved,
    /// Requirement waived
    Waived,
}

impl ResponseResult {
    /// Get the result as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseResult::Approved => "approved",
            ResponseResult::Rejected => "rejected",
            ResponseResult::PartiallyApproved => "partially_approved",
            ResponseResult::Waived => "waived",
        }
    }

    /// Parse a response result from a string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "approved" => Some(ResponseResult::Approved),
            "rejected" => Some(ResponseResult::Rejected),
            "partially_approved" => Some(ResponseResult::PartiallyApproved),
            "waived" => Some(ResponseResult::Waived),
            _ => None,
        }
    }

    /// Track status a response with this result leads to
    pub fn status(&self) -> TrackStatus {
        match self {
            ResponseResult::Approved => TrackStatus::Approved,
            ResponseResult::Rejected => TrackStatus::Rejected,
            ResponseResult::PartiallyApproved => TrackStatus::PartiallyApproved,
            ResponseResult::Waived => TrackStatus::NotApplicable,
        }
    }

    /// Approved in full or in part
    pub fn is_approval(&self) -> bool {
        matches!(self, ResponseResult::Approved | ResponseResult::PartiallyApproved)
    }
}

impl fmt::Display for ResponseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResponseResult {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ValidationError::UnknownResponseResult(s.to_string()))
    }
}

/// Projection of one track of a case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Track kind
    pub kind: TrackKind,

    /// Derived status
    pub status: TrackStatus,

    /// Claimed value: NOK for compensation, days for schedule
    pub claimed_value: Option<f64>,

    /// Approved value from the active response
    pub approved_value: Option<f64>,

    /// Active response result (latest response wins)
    pub result: Option<ResponseResult>,

    /// When the claim was first sent
    pub claim_sent_at: Option<DateTime<Utc>>,

    /// When the active response was given
    pub responded_at: Option<DateTime<Utc>>,

    /// When the underlying circumstance was discovered
    pub discovery_date: Option<NaiveDate>,

    /// When notice of the circumstance was given
    pub notice_date: Option<NaiveDate>,

    /// Active response is a subsidiary fallback (basis was rejected)
    pub is_subsidiary: bool,

    /// Owner's timeliness assessment; `None` while not assessable
    pub was_timely: Option<bool>,

    /// Number of events folded into this projection
    pub event_count: usize,
}

impl Track {
    /// Create an empty track in draft status
    pub fn new(kind: TrackKind) -> Self {
        Self {
            kind,
            status: TrackStatus::Draft,
            claimed_value: None,
            approved_value: None,
            result: None,
            claim_sent_at: None,
            responded_at: None,
            discovery_date: None,
            notice_date: None,
            is_subsidiary: false,
            was_timely: None,
            event_count: 0,
        }
    }

    /// Whether the track is resolved
    pub fn is_resolved(&self) -> bool {
        self.status.is_resolved()
    }

    /// Approval grade in percent, `None` until there is something to grade
    pub fn grade(&self) -> Option<u8> {
        compute_grade(self.claimed_value?, self.approved_value?)
    }

    /// Calendar days the owner took to answer the claim
    pub fn response_days(&self) -> Option<i64> {
        Some(days_between_instants(self.claim_sent_at?, self.responded_at?))
    }

    /// Claimed minus approved, never negative
    ///
    /// For a schedule track this is the number of rejected days.
    pub fn rejected_value(&self) -> Option<f64> {
        match self.result? {
            ResponseResult::Rejected => self.claimed_value,
            ResponseResult::PartiallyApproved => {
                let claimed = self.claimed_value?;
                let approved = self.approved_value.unwrap_or(0.0);
                Some((claimed - approved).max(0.0))
            }
            ResponseResult::Approved | ResponseResult::Waived => Some(0.0),
        }
    }
}
