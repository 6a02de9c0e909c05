//! Personal job-application tracker backed by a local SQLite file.
//!
//! Applications are filed against companies, lifecycle events (calls, tests,
//! interviews, rejections, offers) are recorded against applications, and
//! response-time statistics are derived from that history.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod stats;

pub use db::Database;
pub use error::{Result, TrackerError};
pub use models::{
    Application, ApplicationTimeline, Company, Event, EventDetail, EventType, NewApplication,
    Status, StatusDrift,
};
pub use stats::RejectionStats;
