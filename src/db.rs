use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Result, TrackerError};
use crate::models::{
    Application, ApplicationTimeline, Company, Event, EventDetail, EventType, NewApplication,
    Status, StatusDrift, derive_status,
};
use crate::stats::{self, RejectionStats, ResponseSample};

const TABLES: [&str; 5] = ["applications", "companies", "event_types", "events", "status"];

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS companies (
        id INTEGER PRIMARY KEY NOT NULL,
        name TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS status (
        id INTEGER PRIMARY KEY NOT NULL,
        status TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS event_types (
        id INTEGER PRIMARY KEY NOT NULL,
        description TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS applications (
        id INTEGER PRIMARY KEY NOT NULL,
        date TEXT NOT NULL,
        description TEXT NOT NULL,
        company_id INTEGER NOT NULL REFERENCES companies(id),
        internship INTEGER NOT NULL CHECK (internship IN (0, 1)),
        city TEXT NOT NULL,
        status INTEGER NOT NULL DEFAULT 1 REFERENCES status(id),
        link TEXT,
        platform TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY NOT NULL,
        application_id INTEGER NOT NULL REFERENCES applications(id),
        date TEXT NOT NULL,
        event_type INTEGER NOT NULL REFERENCES event_types(id)
    );

    CREATE INDEX IF NOT EXISTS idx_applications_company ON applications(company_id);
    CREATE INDEX IF NOT EXISTS idx_applications_date ON applications(date);
    CREATE INDEX IF NOT EXISTS idx_events_application ON events(application_id);
"#;

const APPLICATION_SELECT: &str = "
    SELECT a.id, a.date, a.description, a.company_id, c.name, a.internship,
           a.city, a.status, a.link, a.platform
    FROM applications a
    JOIN companies c ON a.company_id = c.id";

const EVENT_DETAIL_SELECT: &str = "
    SELECT e.id, e.date, e.event_type, t.description, a.id, a.date,
           a.description, a.status, c.name
    FROM events e
    JOIN applications a ON e.application_id = a.id
    JOIN companies c ON a.company_id = c.id
    JOIN event_types t ON e.event_type = t.id
    WHERE 1=1";

impl ToSql for Status {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.id()))
    }
}

impl FromSql for Status {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let id = i64::column_result(value)?;
        Status::from_id(id).map_err(|_| FromSqlError::OutOfRange(id))
    }
}

impl ToSql for EventType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.id()))
    }
}

impl FromSql for EventType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let id = i64::column_result(value)?;
        EventType::from_id(id).map_err(|_| FromSqlError::OutOfRange(id))
    }
}

/// Handle on the tracker's SQLite file. The connection is closed when the
/// handle is dropped; every multi-statement write runs in its own transaction
/// that rolls back if the handle's operation returns early.
pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(TrackerError::CreateDir)?;
            }
        }
        let conn = Connection::open(&path).map_err(|source| TrackerError::Connection {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        debug!(path = %path.display(), "opened database");
        Ok(Self { conn, path })
    }

    pub fn open_in_memory() -> Result<Self> {
        let path = PathBuf::from(":memory:");
        let conn = Connection::open_in_memory().map_err(|source| TrackerError::Connection {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Creates the tables and seeds the lookup rows. Safe to run repeatedly:
    /// seed rows that already exist are skipped.
    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;

        for event_type in EventType::ALL {
            self.seed(
                "INSERT INTO event_types (id, description) VALUES (?1, ?2)",
                event_type.id(),
                event_type.description(),
            )?;
        }
        for status in Status::ALL {
            self.seed(
                "INSERT INTO status (id, status) VALUES (?1, ?2)",
                status.id(),
                status.label(),
            )?;
        }
        Ok(())
    }

    fn seed(&self, sql: &str, id: i64, label: &str) -> Result<()> {
        match self.conn.execute(sql, params![id, label]) {
            Ok(_) => Ok(()),
            Err(e) if TrackerError::is_constraint_violation(&e) => {
                debug!(id, label, "seed row already present");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let placeholders = vec!["?"; TABLES.len()].join(", ");
        let found: i64 = self.conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ({placeholders})"
            ),
            params_from_iter(TABLES.iter()),
            |row| row.get(0),
        )?;
        if found < TABLES.len() as i64 {
            return Err(TrackerError::NotInitialized);
        }

        let event_types: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM event_types", [], |row| row.get(0))?;
        let statuses: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM status", [], |row| row.get(0))?;
        if event_types < EventType::ALL.len() as i64 || statuses < Status::ALL.len() as i64 {
            return Err(TrackerError::NotInitialized);
        }
        Ok(())
    }

    // --- Company operations ---

    /// Returns the id of the company whose name matches `name` ignoring case,
    /// inserting a new row when there is none.
    fn resolve_company(conn: &Connection, name: &str) -> Result<i64> {
        let wanted = name.to_lowercase();
        let mut stmt = conn.prepare("SELECT id, name FROM companies ORDER BY id")?;
        let existing = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .find(|(_, n)| n.to_lowercase() == wanted)
            .map(|(id, _)| id);

        if let Some(id) = existing {
            debug!(id, name, "reusing company");
            return Ok(id);
        }

        conn.execute("INSERT INTO companies (name) VALUES (?1)", [name])?;
        let id = conn.last_insert_rowid();
        debug!(id, name, "created company");
        Ok(id)
    }

    pub fn list_companies(&self) -> Result<Vec<Company>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM companies ORDER BY name COLLATE NOCASE, id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Company {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // --- Lookup tables ---

    pub fn list_event_types(&self) -> Result<Vec<(i64, String)>> {
        self.list_lookup("SELECT id, description FROM event_types ORDER BY id")
    }

    pub fn list_statuses(&self) -> Result<Vec<(i64, String)>> {
        self.list_lookup("SELECT id, status FROM status ORDER BY id")
    }

    fn list_lookup(&self, sql: &str) -> Result<Vec<(i64, String)>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // --- Application operations ---

    /// Records a new application, creating its company on first use.
    /// The company name is trimmed before matching and storing.
    /// Both inserts commit together.
    pub fn submit_application(&self, app: &NewApplication) -> Result<i64> {
        let company = app.company.trim();
        if company.is_empty() {
            return Err(TrackerError::InvalidInput(
                "company name must not be empty".to_string(),
            ));
        }
        if app.date > today() {
            return Err(TrackerError::InvalidInput(format!(
                "application date {} is in the future",
                app.date
            )));
        }

        let tx = self.conn.unchecked_transaction()?;
        let company_id = Self::resolve_company(&tx, company)?;
        tx.execute(
            "INSERT INTO applications (date, description, company_id, internship, city, status, link, platform)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                app.date,
                app.description,
                company_id,
                app.internship,
                app.city,
                app.status,
                app.link,
                app.platform
            ],
        )
        .map_err(|e| TrackerError::from_write(e, "application", "company", company_id))?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        info!(id, company, date = %app.date, "application submitted");
        Ok(id)
    }

    /// Overrides an application's stored status without recording an event.
    pub fn set_application_status(&self, application_id: i64, status: Status) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE applications SET status = ?1 WHERE id = ?2",
            params![status, application_id],
        )?;
        if changed == 0 {
            return Err(TrackerError::NotFound {
                entity: "application",
                id: application_id,
            });
        }
        info!(application_id, status = %status, "status set");
        Ok(())
    }

    pub fn get_application_by_id(&self, id: i64) -> Result<Application> {
        self.conn
            .query_row(
                &format!("{APPLICATION_SELECT} WHERE a.id = ?1"),
                [id],
                Self::row_to_application,
            )
            .optional()?
            .ok_or(TrackerError::NotFound {
                entity: "application",
                id,
            })
    }

    pub fn list_applications(&self) -> Result<Vec<Application>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{APPLICATION_SELECT} ORDER BY a.date ASC, a.id ASC"))?;
        let rows = stmt.query_map([], Self::row_to_application)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Applications whose company name contains `name` (case-insensitive),
    /// oldest first. Rejected applications are skipped when `ignore_rejected`.
    pub fn get_application_by_company(
        &self,
        name: &str,
        ignore_rejected: bool,
    ) -> Result<Vec<Application>> {
        let needle = name.to_lowercase();
        Ok(self
            .list_applications()?
            .into_iter()
            .filter(|a| !(ignore_rejected && a.status == Status::Negative))
            .filter(|a| a.company.to_lowercase().contains(&needle))
            .collect())
    }

    fn row_to_application(row: &rusqlite::Row) -> rusqlite::Result<Application> {
        Ok(Application {
            id: row.get(0)?,
            date: row.get(1)?,
            description: row.get(2)?,
            company_id: row.get(3)?,
            company: row.get(4)?,
            internship: row.get(5)?,
            city: row.get(6)?,
            status: row.get(7)?,
            link: row.get(8)?,
            platform: row.get(9)?,
        })
    }

    // --- Event operations ---

    /// Records an event and moves the application to the status it implies.
    /// Both writes commit together.
    pub fn record_event(
        &self,
        event_type: EventType,
        application_id: i64,
        date: NaiveDate,
    ) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT id FROM applications WHERE id = ?1",
                [application_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(TrackerError::Referential {
                entity: "event",
                parent: "application",
                id: application_id,
            });
        }

        let known_type: Option<i64> = tx
            .query_row(
                "SELECT id FROM event_types WHERE id = ?1",
                [event_type.id()],
                |row| row.get(0),
            )
            .optional()?;
        if known_type.is_none() {
            return Err(TrackerError::Referential {
                entity: "event",
                parent: "event_type",
                id: event_type.id(),
            });
        }

        // Both parents were checked above; a foreign-key failure here can only
        // come from the event type row disappearing.
        tx.execute(
            "INSERT INTO events (application_id, date, event_type) VALUES (?1, ?2, ?3)",
            params![application_id, date, event_type],
        )
        .map_err(|e| TrackerError::from_write(e, "event", "event_type", event_type.id()))?;
        let event_id = tx.last_insert_rowid();

        let status = event_type.resulting_status();
        tx.execute(
            "UPDATE applications SET status = ?1 WHERE id = ?2",
            params![status, application_id],
        )?;
        tx.commit()?;

        info!(event_id, application_id, event = %event_type, status = %status, "event recorded");
        Ok(event_id)
    }

    pub fn add_video_call(&self, application_id: i64, date: NaiveDate) -> Result<i64> {
        self.record_event(EventType::VideoCall, application_id, date)
    }

    pub fn add_phone_call(&self, application_id: i64, date: NaiveDate) -> Result<i64> {
        self.record_event(EventType::PhoneCall, application_id, date)
    }

    pub fn add_online_test(&self, application_id: i64, date: NaiveDate) -> Result<i64> {
        self.record_event(EventType::OnlineTest, application_id, date)
    }

    pub fn add_interview(&self, application_id: i64, date: NaiveDate) -> Result<i64> {
        self.record_event(EventType::Interview, application_id, date)
    }

    pub fn add_offline_test(&self, application_id: i64, date: NaiveDate) -> Result<i64> {
        self.record_event(EventType::OfflineTest, application_id, date)
    }

    pub fn add_rejection(&self, application_id: i64, date: NaiveDate) -> Result<i64> {
        self.record_event(EventType::Rejected, application_id, date)
    }

    pub fn add_ask_more_info(&self, application_id: i64, date: NaiveDate) -> Result<i64> {
        self.record_event(EventType::AskMoreInfo, application_id, date)
    }

    pub fn add_offer(&self, application_id: i64, date: NaiveDate) -> Result<i64> {
        self.record_event(EventType::Offer, application_id, date)
    }

    /// All events with their application and company, oldest first.
    pub fn list_events(
        &self,
        ignore_rejected_apps: bool,
        ignore_rejection_events: bool,
    ) -> Result<Vec<EventDetail>> {
        let mut sql = String::from(EVENT_DETAIL_SELECT);
        let mut values: Vec<i64> = vec![];

        if ignore_rejected_apps {
            sql.push_str(&format!(" AND a.status != ?{}", values.len() + 1));
            values.push(Status::Negative.id());
        }

        if ignore_rejection_events {
            sql.push_str(&format!(" AND e.event_type != ?{}", values.len() + 1));
            values.push(EventType::Rejected.id());
        }

        sql.push_str(" ORDER BY e.date ASC, e.id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), Self::row_to_event_detail)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_events_for_application(&self, application_id: i64) -> Result<ApplicationTimeline> {
        let application = self.get_application_by_id(application_id)?;

        let mut stmt = self.conn.prepare(
            "SELECT id, application_id, date, event_type FROM events
             WHERE application_id = ?1
             ORDER BY date ASC, id ASC",
        )?;
        let events = stmt
            .query_map([application_id], |row| {
                Ok(Event {
                    id: row.get(0)?,
                    application_id: row.get(1)?,
                    date: row.get(2)?,
                    event_type: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(ApplicationTimeline {
            application,
            events,
        })
    }

    fn row_to_event_detail(row: &rusqlite::Row) -> rusqlite::Result<EventDetail> {
        Ok(EventDetail {
            id: row.get(0)?,
            date: row.get(1)?,
            event_type: row.get(2)?,
            event_description: row.get(3)?,
            application_id: row.get(4)?,
            application_date: row.get(5)?,
            application_description: row.get(6)?,
            application_status: row.get(7)?,
            company: row.get(8)?,
        })
    }

    // --- Statistics ---

    /// Days from applying to the first recorded event. See `stats::response_days`.
    pub fn time_to_respond(&self, application_id: i64, ignore_ongoing: bool) -> Result<Option<i64>> {
        self.time_to_respond_on(application_id, ignore_ongoing, today())
    }

    pub fn time_to_respond_on(
        &self,
        application_id: i64,
        ignore_ongoing: bool,
        today: NaiveDate,
    ) -> Result<Option<i64>> {
        let applied: NaiveDate = self
            .conn
            .query_row(
                "SELECT date FROM applications WHERE id = ?1",
                [application_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(TrackerError::NotFound {
                entity: "application",
                id: application_id,
            })?;

        let first_event: Option<NaiveDate> = self.conn.query_row(
            "SELECT MIN(date) FROM events WHERE application_id = ?1",
            [application_id],
            |row| row.get(0),
        )?;

        Ok(stats::response_days(applied, first_event, ignore_ongoing, today))
    }

    pub fn rejection_statistics(&self, ignore_ongoing: bool) -> Result<RejectionStats> {
        self.rejection_statistics_on(ignore_ongoing, today())
    }

    pub fn rejection_statistics_on(
        &self,
        ignore_ongoing: bool,
        today: NaiveDate,
    ) -> Result<RejectionStats> {
        let applications = self.list_applications()?;

        let mut stmt = self
            .conn
            .prepare("SELECT application_id, MIN(date) FROM events GROUP BY application_id")?;
        let first_events = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, NaiveDate>(1)?)))?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;

        let samples: Vec<ResponseSample> = applications
            .iter()
            .filter_map(|a| {
                stats::response_days(a.date, first_events.get(&a.id).copied(), ignore_ongoing, today)
                    .map(|days| ResponseSample {
                        application_id: a.id,
                        applied: a.date,
                        days,
                    })
            })
            .collect();

        Ok(RejectionStats::from_samples(&samples, applications.len()))
    }

    // --- Status consistency ---

    /// Compares each application's stored status with the one replayed from
    /// its event log. Applications without events are never reported.
    pub fn check_statuses(&self) -> Result<Vec<StatusDrift>> {
        let mut stmt = self
            .conn
            .prepare("SELECT application_id, event_type FROM events ORDER BY id ASC")?;
        let mut logs: HashMap<i64, Vec<EventType>> = HashMap::new();
        for row in stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, EventType>(1)?)))? {
            let (application_id, event_type) = row?;
            logs.entry(application_id).or_default().push(event_type);
        }

        let drifts: Vec<StatusDrift> = self
            .list_applications()?
            .into_iter()
            .filter_map(|a| {
                let derived = derive_status(a.status, logs.get(&a.id)?);
                (derived != a.status).then_some(StatusDrift {
                    application_id: a.id,
                    stored: a.status,
                    derived,
                })
            })
            .collect();

        for drift in &drifts {
            warn!(
                application_id = drift.application_id,
                stored = %drift.stored,
                derived = %drift.derived,
                "stored status disagrees with event log"
            );
        }
        Ok(drifts)
    }

    /// Writes the derived status back for every drifted application.
    pub fn repair_statuses(&self) -> Result<Vec<StatusDrift>> {
        let drifts = self.check_statuses()?;
        if drifts.is_empty() {
            return Ok(drifts);
        }

        let tx = self.conn.unchecked_transaction()?;
        for drift in &drifts {
            tx.execute(
                "UPDATE applications SET status = ?1 WHERE id = ?2",
                params![drift.derived, drift.application_id],
            )?;
        }
        tx.commit()?;

        info!(repaired = drifts.len(), "statuses repaired");
        Ok(drifts)
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn test_db() -> Database {
        let db = Database::open_in_memory().expect("open test db");
        db.init().expect("init test db");
        db
    }

    fn count(db: &Database, table: &str) -> i64 {
        db.conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    fn apply(db: &Database, on: &str, company: &str) -> i64 {
        let mut app = NewApplication::new("Backend Engineer", company, "Paris", false);
        app.date = date(on);
        db.submit_application(&app).unwrap()
    }

    #[test]
    fn test_init_is_idempotent() {
        let db = test_db();
        db.init().unwrap();
        db.init().unwrap();
        assert_eq!(count(&db, "event_types"), 8);
        assert_eq!(count(&db, "status"), 3);
        db.ensure_initialized().unwrap();
    }

    #[test]
    fn test_init_across_connections() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("jobsearch.db");

        let first = Database::open(&path).unwrap();
        first.init().unwrap();
        let id = apply(&first, "2024-01-01", "Acme");
        drop(first);

        let second = Database::open(&path).unwrap();
        second.init().unwrap();
        assert_eq!(count(&second, "event_types"), 8);
        assert_eq!(count(&second, "status"), 3);
        assert_eq!(second.get_application_by_id(id).unwrap().company, "Acme");
    }

    #[test]
    fn test_lookup_rows_match_enums() {
        let db = test_db();
        let types = db.list_event_types().unwrap();
        assert_eq!(types.len(), 8);
        assert_eq!(types[5], (6, "REJECTED".to_string()));
        assert_eq!(types[7], (8, "OFFER".to_string()));
        let statuses = db.list_statuses().unwrap();
        assert_eq!(statuses[0], (1, "no response".to_string()));
        assert_eq!(statuses[2], (3, "negative".to_string()));
    }

    #[test]
    fn test_ensure_initialized_on_fresh_db() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.ensure_initialized(), Err(TrackerError::NotInitialized)));
    }

    #[test]
    fn test_submit_creates_company_once() {
        let db = test_db();
        let first = apply(&db, "2024-01-01", "Acme Corp");
        assert_eq!(count(&db, "companies"), 1);
        assert_eq!(count(&db, "applications"), 1);

        let second = apply(&db, "2024-01-02", "Acme Corp");
        assert_eq!(count(&db, "companies"), 1);
        assert_eq!(count(&db, "applications"), 2);

        let a = db.get_application_by_id(first).unwrap();
        let b = db.get_application_by_id(second).unwrap();
        assert_eq!(a.company_id, b.company_id);
    }

    #[test]
    fn test_submit_reuses_company_ignoring_case() {
        let db = test_db();
        apply(&db, "2024-01-01", "Société Générale");
        apply(&db, "2024-01-02", "SOCIÉTÉ GÉNÉRALE");
        assert_eq!(count(&db, "companies"), 1);
        assert_eq!(db.list_companies().unwrap()[0].name, "Société Générale");
    }

    #[test]
    fn test_submit_defaults_and_fields() {
        let db = test_db();
        let mut app = NewApplication::new("Data \"Intern\"", "O'Reilly", "Lyon", true);
        app.link = Some("https://example.com/jobs/1?a=b&c='d'".to_string());
        let id = db.submit_application(&app).unwrap();

        let stored = db.get_application_by_id(id).unwrap();
        assert_eq!(stored.date, today());
        assert_eq!(stored.description, "Data \"Intern\"");
        assert_eq!(stored.company, "O'Reilly");
        assert_eq!(stored.city, "Lyon");
        assert!(stored.internship);
        assert_eq!(stored.status, Status::NoResponse);
        assert_eq!(stored.link.as_deref(), Some("https://example.com/jobs/1?a=b&c='d'"));
        assert_eq!(stored.platform, "LinkedIn");
    }

    #[test]
    fn test_submit_rejects_empty_company() {
        let db = test_db();
        let app = NewApplication::new("Engineer", "   ", "Paris", false);
        assert!(matches!(
            db.submit_application(&app),
            Err(TrackerError::InvalidInput(_))
        ));
        assert_eq!(count(&db, "companies"), 0);
        assert_eq!(count(&db, "applications"), 0);
    }

    #[test]
    fn test_get_application_by_id_missing() {
        let db = test_db();
        assert!(matches!(
            db.get_application_by_id(42),
            Err(TrackerError::NotFound { id: 42, .. })
        ));
    }

    #[test]
    fn test_rejection_sets_negative() {
        let db = test_db();
        let mut app = NewApplication::new("Engineer", "Acme", "Paris", false);
        app.status = Status::Ongoing;
        let id = db.submit_application(&app).unwrap();

        db.add_rejection(id, date("2024-02-01")).unwrap();
        assert_eq!(db.get_application_by_id(id).unwrap().status, Status::Negative);
    }

    #[test]
    fn test_other_events_set_ongoing() {
        let db = test_db();
        for event_type in EventType::ALL.into_iter().filter(|t| *t != EventType::Rejected) {
            let id = apply(&db, "2024-01-01", "Acme");
            db.record_event(event_type, id, date("2024-01-03")).unwrap();
            assert_eq!(db.get_application_by_id(id).unwrap().status, Status::Ongoing);
        }
    }

    #[test]
    fn test_event_after_rejection_overwrites_status() {
        let db = test_db();
        let id = apply(&db, "2024-01-01", "Acme");
        db.add_rejection(id, date("2024-01-05")).unwrap();
        db.add_phone_call(id, date("2024-01-06")).unwrap();
        assert_eq!(db.get_application_by_id(id).unwrap().status, Status::Ongoing);
    }

    #[test]
    fn test_record_event_missing_application() {
        let db = test_db();
        let err = db.add_interview(99, date("2024-01-01")).unwrap_err();
        assert!(matches!(err, TrackerError::Referential { id: 99, .. }));
        assert_eq!(count(&db, "events"), 0);
    }

    #[test]
    fn test_record_event_missing_event_type_row() {
        let db = test_db();
        let id = apply(&db, "2024-01-01", "Acme");
        db.conn.execute("DELETE FROM event_types WHERE id = 8", []).unwrap();

        let err = db.add_offer(id, date("2024-01-02")).unwrap_err();
        match err {
            TrackerError::Referential { entity, parent, id } => {
                assert_eq!(entity, "event");
                assert_eq!(parent, "event_type");
                assert_eq!(id, EventType::Offer.id());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(count(&db, "events"), 0);
        assert_eq!(db.get_application_by_id(id).unwrap().status, Status::NoResponse);
    }

    #[test]
    fn test_ensure_initialized_detects_missing_seed_rows() {
        let db = test_db();
        db.conn.execute("DELETE FROM event_types WHERE id = 8", []).unwrap();
        assert!(matches!(db.ensure_initialized(), Err(TrackerError::NotInitialized)));

        db.init().unwrap();
        db.ensure_initialized().unwrap();

        db.conn.execute("DELETE FROM status WHERE id = 2", []).unwrap();
        assert!(matches!(db.ensure_initialized(), Err(TrackerError::NotInitialized)));
    }

    #[test]
    fn test_submit_rejects_future_date() {
        let db = test_db();
        let mut app = NewApplication::new("Engineer", "Acme", "Paris", false);
        app.date = today() + chrono::Duration::days(3);
        assert!(matches!(
            db.submit_application(&app),
            Err(TrackerError::InvalidInput(_))
        ));
        assert_eq!(count(&db, "companies"), 0);
        assert_eq!(count(&db, "applications"), 0);
    }

    #[test]
    fn test_pending_days_never_negative_for_submitted_today() {
        let db = test_db();
        let app = NewApplication::new("Engineer", "Acme", "Paris", false);
        let id = db.submit_application(&app).unwrap();
        assert_eq!(db.time_to_respond(id, false).unwrap(), Some(0));
    }

    #[test]
    fn test_submit_rolls_back_company_on_failure() {
        let db = test_db();
        db.conn
            .execute_batch(
                "CREATE TRIGGER fail_insert BEFORE INSERT ON applications
                 BEGIN SELECT RAISE(ABORT, 'boom'); END;",
            )
            .unwrap();

        let mut app = NewApplication::new("Engineer", "Acme", "Paris", false);
        app.date = date("2024-01-01");
        assert!(db.submit_application(&app).is_err());
        assert_eq!(count(&db, "companies"), 0);
        assert_eq!(count(&db, "applications"), 0);
    }

    #[test]
    fn test_record_event_rolls_back_on_failure() {
        let db = test_db();
        let id = apply(&db, "2024-01-01", "Acme");
        db.conn
            .execute_batch(
                "CREATE TRIGGER fail_update BEFORE UPDATE ON applications
                 BEGIN SELECT RAISE(ABORT, 'boom'); END;",
            )
            .unwrap();

        assert!(db.add_interview(id, date("2024-01-03")).is_err());
        assert_eq!(count(&db, "events"), 0);
        assert_eq!(db.get_application_by_id(id).unwrap().status, Status::NoResponse);
    }

    #[test]
    fn test_submit_trims_company_name() {
        let db = test_db();
        let first = apply(&db, "2024-01-01", "  Acme ");
        let second = apply(&db, "2024-01-02", "Acme");
        assert_eq!(count(&db, "companies"), 1);
        assert_eq!(db.get_application_by_id(first).unwrap().company, "Acme");
        assert_eq!(
            db.get_application_by_id(first).unwrap().company_id,
            db.get_application_by_id(second).unwrap().company_id
        );
    }

    #[test]
    fn test_set_application_status() {
        let db = test_db();
        let id = apply(&db, "2024-01-01", "Acme");
        db.set_application_status(id, Status::Negative).unwrap();
        assert_eq!(db.get_application_by_id(id).unwrap().status, Status::Negative);
        assert!(matches!(
            db.set_application_status(id + 1, Status::Ongoing),
            Err(TrackerError::NotFound { .. })
        ));
    }

    #[test]
    fn test_get_application_by_company() {
        let db = test_db();
        let later = apply(&db, "2024-03-01", "Acme Corp");
        let earlier = apply(&db, "2024-01-01", "acme labs");
        let rejected = apply(&db, "2024-02-01", "ACME Rejects");
        apply(&db, "2024-01-15", "Globex");
        db.add_rejection(rejected, date("2024-02-10")).unwrap();

        let found: Vec<i64> = db
            .get_application_by_company("acme", true)
            .unwrap()
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(found, vec![earlier, later]);

        let all: Vec<i64> = db
            .get_application_by_company("AcMe", false)
            .unwrap()
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(all, vec![earlier, rejected, later]);
    }

    #[test]
    fn test_get_application_by_company_non_ascii() {
        let db = test_db();
        let id = apply(&db, "2024-01-01", "Électricité de France");
        let found = db.get_application_by_company("électricité", true).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, id);
    }

    #[test]
    fn test_list_applications_ordered_by_date() {
        let db = test_db();
        let c = apply(&db, "2024-03-01", "C");
        let a = apply(&db, "2024-01-01", "A");
        let b = apply(&db, "2024-02-01", "B");
        let ids: Vec<i64> = db.list_applications().unwrap().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![a, b, c]);
    }

    #[test]
    fn test_list_events_filters() {
        let db = test_db();
        let rejected_app = apply(&db, "2024-01-01", "Acme");
        let open_app = apply(&db, "2024-01-02", "Globex");
        db.add_phone_call(rejected_app, date("2024-01-03")).unwrap();
        db.add_rejection(rejected_app, date("2024-01-10")).unwrap();
        db.add_interview(open_app, date("2024-01-05")).unwrap();

        let strict = db.list_events(true, true).unwrap();
        assert_eq!(strict.len(), 1);
        assert!(strict.iter().all(|e| e.application_status != Status::Negative));
        assert!(strict.iter().all(|e| e.event_type != EventType::Rejected));
        assert_eq!(strict[0].company, "Globex");
        assert_eq!(strict[0].event_description, "INTERVIEW");

        let default = db.list_events(false, true).unwrap();
        assert_eq!(default.len(), 2);

        let all = db.list_events(false, false).unwrap();
        let dates: Vec<NaiveDate> = all.iter().map(|e| e.date).collect();
        assert_eq!(
            dates,
            vec![date("2024-01-03"), date("2024-01-05"), date("2024-01-10")]
        );
    }

    #[test]
    fn test_list_events_for_application() {
        let db = test_db();
        let id = apply(&db, "2024-01-01", "Acme");
        let other = apply(&db, "2024-01-01", "Globex");
        db.add_interview(id, date("2024-01-20")).unwrap();
        db.add_phone_call(id, date("2024-01-05")).unwrap();
        db.add_video_call(other, date("2024-01-06")).unwrap();

        let timeline = db.list_events_for_application(id).unwrap();
        assert_eq!(timeline.application.company, "Acme");
        let kinds: Vec<EventType> = timeline.events.iter().map(|e| e.event_type).collect();
        assert_eq!(kinds, vec![EventType::PhoneCall, EventType::Interview]);

        assert!(matches!(
            db.list_events_for_application(404),
            Err(TrackerError::NotFound { .. })
        ));
    }

    #[test]
    fn test_time_to_respond() {
        let db = test_db();
        let id = apply(&db, "2024-01-01", "Acme");
        db.add_phone_call(id, date("2024-01-05")).unwrap();
        assert_eq!(db.time_to_respond(id, true).unwrap(), Some(4));
    }

    #[test]
    fn test_time_to_respond_uses_earliest_event() {
        let db = test_db();
        let id = apply(&db, "2024-01-01", "Acme");
        db.add_rejection(id, date("2024-01-30")).unwrap();
        db.add_online_test(id, date("2024-01-11")).unwrap();
        assert_eq!(db.time_to_respond(id, true).unwrap(), Some(10));
    }

    #[test]
    fn test_time_to_respond_without_events() {
        let db = test_db();
        let id = apply(&db, "2024-01-01", "Acme");
        assert_eq!(db.time_to_respond(id, true).unwrap(), None);
        assert_eq!(
            db.time_to_respond_on(id, false, date("2024-02-01")).unwrap(),
            Some(31)
        );

        let expected = (today() - date("2024-01-01")).num_days();
        let pending = db.time_to_respond(id, false).unwrap().unwrap();
        assert!(pending >= 0);
        assert_eq!(pending, expected);
    }

    #[test]
    fn test_time_to_respond_missing_application() {
        let db = test_db();
        assert!(matches!(
            db.time_to_respond(7, true),
            Err(TrackerError::NotFound { id: 7, .. })
        ));
    }

    #[test]
    fn test_rejection_statistics() {
        let db = test_db();
        let a = apply(&db, "2024-01-01", "Acme");
        let b = apply(&db, "2024-01-01", "Globex");
        let c = apply(&db, "2024-01-02", "Initech");
        apply(&db, "2024-01-03", "Umbrella");
        db.add_rejection(a, date("2024-01-03")).unwrap();
        db.add_phone_call(b, date("2024-01-05")).unwrap();
        db.add_rejection(c, date("2024-01-12")).unwrap();

        let stats = db.rejection_statistics(true).unwrap();
        assert_eq!(stats.total_applications, 4);
        assert_eq!(stats.sample_count, 3);
        assert_eq!(stats.mean, Some((2.0 + 4.0 + 10.0) / 3.0));
        let max = stats.max.unwrap();
        assert_eq!(max.application_id, c);
        assert_eq!(max.days, 10);
        assert_eq!(stats.daily_average[&date("2024-01-01")], 3.0);
        assert_eq!(stats.daily_average[&date("2024-01-02")], 10.0);

        let with_pending = db.rejection_statistics_on(false, date("2024-01-13")).unwrap();
        assert_eq!(with_pending.sample_count, 4);
        assert_eq!(with_pending.daily_average[&date("2024-01-03")], 10.0);
        assert!(with_pending.sample_count <= with_pending.total_applications);
    }

    #[test]
    fn test_check_and_repair_statuses() {
        let db = test_db();
        let drifted = apply(&db, "2024-01-01", "Acme");
        let untouched = apply(&db, "2024-01-01", "Globex");
        let quiet = apply(&db, "2024-01-01", "Initech");
        db.add_rejection(drifted, date("2024-01-04")).unwrap();
        db.add_interview(untouched, date("2024-01-04")).unwrap();
        db.set_application_status(drifted, Status::Ongoing).unwrap();
        db.set_application_status(quiet, Status::Ongoing).unwrap();

        let drifts = db.check_statuses().unwrap();
        assert_eq!(
            drifts,
            vec![StatusDrift {
                application_id: drifted,
                stored: Status::Ongoing,
                derived: Status::Negative,
            }]
        );

        let repaired = db.repair_statuses().unwrap();
        assert_eq!(repaired.len(), 1);
        assert_eq!(db.get_application_by_id(drifted).unwrap().status, Status::Negative);
        assert_eq!(db.get_application_by_id(quiet).unwrap().status, Status::Ongoing);
        assert!(db.check_statuses().unwrap().is_empty());
    }
}
