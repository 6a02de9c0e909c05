use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TrackerError;

/// Kinds of events that can happen during an application's lifecycle.
/// Discriminants match the seeded `event_types.id` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    VideoCall = 1,
    PhoneCall = 2,
    OnlineTest = 3,
    Interview = 4,
    OfflineTest = 5,
    Rejected = 6,
    AskMoreInfo = 7,
    Offer = 8,
}

impl EventType {
    pub const ALL: [EventType; 8] = [
        EventType::VideoCall,
        EventType::PhoneCall,
        EventType::OnlineTest,
        EventType::Interview,
        EventType::OfflineTest,
        EventType::Rejected,
        EventType::AskMoreInfo,
        EventType::Offer,
    ];

    pub fn id(self) -> i64 {
        self as i64
    }

    pub fn from_id(id: i64) -> Result<Self, TrackerError> {
        Self::ALL
            .into_iter()
            .find(|t| t.id() == id)
            .ok_or_else(|| TrackerError::InvalidEventType(id.to_string()))
    }

    /// Label stored in `event_types.description`.
    pub fn description(self) -> &'static str {
        match self {
            EventType::VideoCall => "VIDEO CALL",
            EventType::PhoneCall => "PHONE CALL",
            EventType::OnlineTest => "ONLINE TEST",
            EventType::Interview => "INTERVIEW",
            EventType::OfflineTest => "OFFLINE TEST",
            EventType::Rejected => "REJECTED",
            EventType::AskMoreInfo => "ASK MORE INFO",
            EventType::Offer => "OFFER",
        }
    }

    /// Status an application moves to once this event is recorded.
    pub fn resulting_status(self) -> Status {
        match self {
            EventType::Rejected => Status::Negative,
            _ => Status::Ongoing,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl std::str::FromStr for EventType {
    type Err = TrackerError;

    /// Accepts the numeric id, the stored label, or a snake/kebab-case name
    /// ("phone-call", "phone_call", "PHONE CALL", "2").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(id) = s.trim().parse::<i64>() {
            return Self::from_id(id);
        }
        let normalized = s.trim().to_uppercase().replace(['-', '_'], " ");
        Self::ALL
            .into_iter()
            .find(|t| t.description() == normalized)
            .ok_or_else(|| TrackerError::InvalidEventType(s.to_string()))
    }
}

/// Application status. Discriminants match the seeded `status.id` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    NoResponse = 1,
    Ongoing = 2,
    Negative = 3,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::NoResponse, Status::Ongoing, Status::Negative];

    pub fn id(self) -> i64 {
        self as i64
    }

    pub fn from_id(id: i64) -> Result<Self, TrackerError> {
        Self::ALL
            .into_iter()
            .find(|s| s.id() == id)
            .ok_or_else(|| TrackerError::InvalidStatus(id.to_string()))
    }

    /// Label stored in `status.status`.
    pub fn label(self) -> &'static str {
        match self {
            Status::NoResponse => "no response",
            Status::Ongoing => "ongoing",
            Status::Negative => "negative",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Status {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(id) = s.trim().parse::<i64>() {
            return Self::from_id(id);
        }
        let normalized = s.trim().to_lowercase().replace(['-', '_'], " ");
        Self::ALL
            .into_iter()
            .find(|st| st.label() == normalized)
            .ok_or_else(|| TrackerError::InvalidStatus(s.to_string()))
    }
}

/// Replays an event log (in the order it was recorded) on top of the
/// initial status. The result is what the write path should have stored.
pub fn derive_status(initial: Status, events: &[EventType]) -> Status {
    events
        .iter()
        .fold(initial, |_, event| event.resulting_status())
}

/// Parses a `YYYY-MM-DD` calendar date.
pub fn parse_date(s: &str) -> Result<NaiveDate, TrackerError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| TrackerError::InvalidDate(s.to_string()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
}

/// Input for `Database::submit_application`.
#[derive(Debug, Clone)]
pub struct NewApplication {
    pub date: NaiveDate,
    pub description: String,
    pub company: String,
    pub city: String,
    pub internship: bool,
    pub link: Option<String>,
    pub status: Status,
    pub platform: String,
}

impl NewApplication {
    /// Dated today, `NoResponse`, posted on LinkedIn, no link.
    pub fn new(description: &str, company: &str, city: &str, internship: bool) -> Self {
        Self {
            date: chrono::Local::now().date_naive(),
            description: description.to_string(),
            company: company.to_string(),
            city: city.to_string(),
            internship,
            link: None,
            status: Status::NoResponse,
            platform: "LinkedIn".to_string(),
        }
    }
}

/// An application joined with its company name and status label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub date: NaiveDate,
    pub description: String,
    pub company_id: i64,
    pub company: String, // denormalized for convenience
    pub internship: bool,
    pub city: String,
    pub status: Status,
    pub link: Option<String>,
    pub platform: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub application_id: i64,
    pub date: NaiveDate,
    pub event_type: EventType,
}

/// An event joined with the application and company it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDetail {
    pub id: i64,
    pub date: NaiveDate,
    pub event_type: EventType,
    pub event_description: String,
    pub application_id: i64,
    pub application_date: NaiveDate,
    pub application_description: String,
    pub application_status: Status,
    pub company: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationTimeline {
    pub application: Application,
    pub events: Vec<Event>,
}

/// A stored status that disagrees with the one re-derived from the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDrift {
    pub application_id: i64,
    pub stored: Status,
    pub derived: Status,
}
