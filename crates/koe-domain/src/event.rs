//! Event module - the append-only history every projection is folded from

use crate::error::ValidationError;
use crate::preclusion::ClaimCategory;
use crate::track::{ResponseResult, TrackKind};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an event based on UUIDv7
///
/// UUIDv7 ids sort chronologically, which keeps the persisted log readable
/// without consulting timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(uuid::Uuid);

impl EventId {
    /// Generate a new UUIDv7-based EventId
    ///
    /// # Examples
    ///
    /// ```
    /// use koe_domain::EventId;
    ///
    /// let a = EventId::new();
    /// let b = EventId::new();
    /// assert_ne!(a, b);
    /// ```
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }

    /// Parse an EventId from its string form
    pub fn from_string(s: &str) -> Result<Self, ValidationError> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| ValidationError::InvalidEventId(format!("{}: {}", s, e)))
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> uuid::Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Party submitting an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// The party making claims (entreprenør)
    Contractor,
    /// The party responding to claims (byggherre)
    Owner,
}

impl ActorRole {
    /// Get the role as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Contractor => "contractor",
            ActorRole::Owner => "owner",
        }
    }

    /// Parse a role from a string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "contractor" => Some(ActorRole::Contractor),
            "owner" => Some(ActorRole::Owner),
            _ => None,
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActorRole {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ValidationError::UnknownActorRole(s.to_string()))
    }
}

/// The action an event records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Contractor sends the claim
    ClaimSent,
    /// Contractor revises the claim
    ClaimUpdated,
    /// Contractor withdraws the claim
    ClaimWithdrawn,
    /// Owner responds to the claim
    ResponseGiven,
    /// Owner revises the response
    ResponseUpdated,
    /// Either party opens negotiation on a rejected or partly approved claim
    NegotiationOpened,
    /// Owner locks an approved claim
    Locked,
}

impl EventType {
    /// Get the event type as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ClaimSent => "claim_sent",
            EventType::ClaimUpdated => "claim_updated",
            EventType::ClaimWithdrawn => "claim_withdrawn",
            EventType::ResponseGiven => "response_given",
            EventType::ResponseUpdated => "response_updated",
            EventType::NegotiationOpened => "negotiation_opened",
            EventType::Locked => "locked",
        }
    }

    /// Parse an event type from a string (dashes or underscores)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "claim_sent" => Some(EventType::ClaimSent),
            "claim_updated" => Some(EventType::ClaimUpdated),
            "claim_withdrawn" => Some(EventType::ClaimWithdrawn),
            "response_given" => Some(EventType::ResponseGiven),
            "response_updated" => Some(EventType::ResponseUpdated),
            "negotiation_opened" => Some(EventType::NegotiationOpened),
            "locked" => Some(EventType::Locked),
            _ => None,
        }
    }

    /// The only role allowed to submit this event, if restricted
    pub fn required_actor(&self) -> Option<ActorRole> {
        match self {
            EventType::ClaimSent | EventType::ClaimUpdated | EventType::ClaimWithdrawn => {
                Some(ActorRole::Contractor)
            }
            EventType::ResponseGiven | EventType::ResponseUpdated | EventType::Locked => {
                Some(ActorRole::Owner)
            }
            EventType::NegotiationOpened => None,
        }
    }

    /// Response events carry a result
    pub fn is_response(&self) -> bool {
        matches!(self, EventType::ResponseGiven | EventType::ResponseUpdated)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ValidationError::UnknownEventType(s.to_string()))
    }
}

/// Case metadata, carried by the event that opens a case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseDetails {
    /// Case title
    pub title: String,
    /// Owner (byggherre)
    pub owner: String,
    /// Contractor (entreprenør)
    pub contractor: String,
    /// Claim category, selects deadline rules and consequences
    #[serde(default = "default_category")]
    pub category: ClaimCategory,
}

fn default_category() -> ClaimCategory {
    ClaimCategory::Other
}

/// Event payload; every field is optional and only read by the events it applies to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    /// Claimed value (NOK or days)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_value: Option<f64>,

    /// Approved value (NOK or days)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_value: Option<f64>,

    /// Response result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResponseResult>,

    /// When the circumstance was discovered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_date: Option<NaiveDate>,

    /// When notice was given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice_date: Option<NaiveDate>,

    /// Owner's timeliness assessment of the claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub was_timely: Option<bool>,

    /// Case metadata (first basis event only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case: Option<CaseDetails>,

    /// Free-text remark
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// An immutable entry in a case's event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier
    pub id: EventId,
    /// Track the event targets
    pub track_kind: TrackKind,
    /// Recorded action
    pub event_type: EventType,
    /// Submitting party
    pub actor_role: ActorRole,
    /// When the action happened
    pub timestamp: DateTime<Utc>,
    /// Action details
    #[serde(default)]
    pub payload: EventPayload,
}

impl Event {
    /// Create an event with an empty payload
    pub fn new(
        track_kind: TrackKind,
        event_type: EventType,
        actor_role: ActorRole,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::new(),
            track_kind,
            event_type,
            actor_role,
            timestamp,
            payload: EventPayload::default(),
        }
    }

    /// Replace the payload
    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = payload;
        self
    }

    /// Contractor sends a claim
    pub fn claim_sent(track_kind: TrackKind, timestamp: DateTime<Utc>, claimed: Option<f64>) -> Self {
        Self::new(track_kind, EventType::ClaimSent, ActorRole::Contractor, timestamp).with_payload(
            EventPayload {
                claimed_value: claimed,
                ..Default::default()
            },
        )
    }

    /// Owner responds to a claim
    pub fn response(
        track_kind: TrackKind,
        timestamp: DateTime<Utc>,
        result: ResponseResult,
        approved: Option<f64>,
    ) -> Self {
        Self::new(track_kind, EventType::ResponseGiven, ActorRole::Owner, timestamp).with_payload(
            EventPayload {
                result: Some(result),
                approved_value: approved,
                ..Default::default()
            },
        )
    }

    /// Convert to the persisted, string-typed shape
    pub fn to_record(&self) -> Result<EventRecord, ValidationError> {
        let payload = serde_json::to_string(&self.payload)
            .map_err(|e| ValidationError::MalformedPayload(e.to_string()))?;

        Ok(EventRecord {
            id: self.id.to_string(),
            track_kind: self.track_kind.as_str().to_string(),
            event_type: self.event_type.as_str().to_string(),
            actor_role: self.actor_role.as_str().to_string(),
            timestamp: self.timestamp.to_rfc3339(),
            payload,
        })
    }
}

/// Persisted shape of an event, as read from the event log collaborator
///
/// Converting a record into an [`Event`] is where unknown track kinds, event
/// types and roles are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Event id (UUID string)
    pub id: String,
    /// Track kind
    pub track_kind: String,
    /// Event type
    pub event_type: String,
    /// Actor role
    pub actor_role: String,
    /// RFC 3339 timestamp
    pub timestamp: String,
    /// JSON payload
    pub payload: String,
}

impl TryFrom<EventRecord> for Event {
    type Error = ValidationError;

    fn try_from(record: EventRecord) -> Result<Self, Self::Error> {
        let timestamp = DateTime::parse_from_rfc3339(&record.timestamp)
            .map_err(|e| ValidationError::InvalidTimestamp(format!("{}: {}", record.timestamp, e)))?
            .with_timezone(&Utc);

        let payload = if record.payload.trim().is_empty() {
            EventPayload::default()
        } else {
            serde_json::from_str(&record.payload)
                .map_err(|e| ValidationError::MalformedPayload(e.to_string()))?
        };

        Ok(Event {
            id: EventId::from_string(&record.id)?,
            track_kind: record.track_kind.parse()?,
            event_type: record.event_type.parse()?,
            actor_role: record.actor_role.parse()?,
            timestamp,
            payload,
        })
    }
}
