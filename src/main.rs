use anyhow::{Context, Result};
use apptrack::config::Config;
use apptrack::models::parse_date;
use apptrack::{Database, EventType, NewApplication, Status, logging};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "apptrack")]
#[command(about = "Track job applications, their events, and how long companies take to answer")]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true, env = "APPTRACK_DB")]
    db: Option<PathBuf>,

    /// Log level or filter (overridden by RUST_LOG)
    #[arg(long, global = true, env = "APPTRACK_LOG")]
    log_level: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Record a submitted application
    Apply {
        /// Company name
        company: String,

        /// Position description
        description: String,

        /// City of the position
        city: String,

        /// Application is for an internship
        #[arg(short, long)]
        internship: bool,

        /// Date submitted (YYYY-MM-DD, defaults to today)
        #[arg(short, long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,

        /// Link to the posting
        #[arg(short, long)]
        link: Option<String>,

        /// Initial status (no-response, ongoing, negative)
        #[arg(short, long, value_parser = parse_status_arg, default_value = "no-response")]
        status: Status,

        /// Where the posting was found
        #[arg(short, long, default_value = "LinkedIn")]
        platform: String,
    },

    /// Record an event for an application
    Event {
        /// Application ID
        id: i64,

        /// Event type (video-call, phone-call, online-test, interview,
        /// offline-test, rejected, ask-more-info, offer)
        #[arg(value_parser = parse_event_type_arg)]
        kind: EventType,

        /// Event date (YYYY-MM-DD, defaults to today)
        #[arg(short, long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,
    },

    /// Override an application's status
    Status {
        /// Application ID
        id: i64,

        /// New status (no-response, ongoing, negative)
        #[arg(value_parser = parse_status_arg)]
        status: Status,
    },

    /// Show application details
    Show {
        /// Application ID
        id: i64,
    },

    /// List all applications
    List,

    /// Find applications by company name
    Search {
        /// Part of the company name
        company: String,

        /// Include rejected applications
        #[arg(long)]
        include_rejected: bool,
    },

    /// List events across all applications
    Events {
        /// Include events of rejected applications
        #[arg(long)]
        include_rejected_apps: bool,

        /// Include the rejection events themselves
        #[arg(long)]
        include_rejections: bool,
    },

    /// Show the events of one application
    Timeline {
        /// Application ID
        id: i64,
    },

    /// Days until the first response for an application
    Respond {
        /// Application ID
        id: i64,

        /// Count days until today when nothing happened yet
        #[arg(long)]
        include_ongoing: bool,
    },

    /// Response time statistics
    Stats {
        /// Count pending applications up to today
        #[arg(long)]
        include_ongoing: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List companies
    Companies,

    /// List event types
    EventTypes,

    /// Check stored statuses against the event log
    Verify {
        /// Write the derived status back
        #[arg(long)]
        repair: bool,
    },
}

fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    parse_date(s).map_err(|e| e.to_string())
}

fn parse_status_arg(s: &str) -> Result<Status, String> {
    s.parse::<Status>().map_err(|e| e.to_string())
}

fn parse_event_type_arg(s: &str) -> Result<EventType, String> {
    s.parse::<EventType>().map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::resolve(cli.db, cli.log_level, cli.verbose);
    logging::init(&config.log_level)?;

    let db = Database::open(&config.db_path)
        .with_context(|| format!("Failed to open {}", config.db_path.display()))?;

    if !matches!(cli.command, Commands::Init) {
        db.ensure_initialized()?;
    }

    match cli.command {
        Commands::Init => {
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Apply {
            company,
            description,
            city,
            internship,
            date,
            link,
            status,
            platform,
        } => {
            let mut app = NewApplication::new(&description, &company, &city, internship);
            if let Some(date) = date {
                app.date = date;
            }
            app.link = link.filter(|l| !l.trim().is_empty());
            app.status = status;
            app.platform = platform;

            let id = db.submit_application(&app)?;
            println!("Added application #{} ({} - {})", id, company, description);
        }

        Commands::Event { id, kind, date } => {
            let date = date.unwrap_or_else(|| chrono::Local::now().date_naive());
            db.record_event(kind, id, date)?;
            let app = db.get_application_by_id(id)?;
            println!(
                "Recorded {} on {} for #{} ({}), status now {}",
                kind, date, id, app.company, app.status
            );
        }

        Commands::Status { id, status } => {
            db.set_application_status(id, status)?;
            println!("Application #{} marked as {}.", id, status);
        }

        Commands::Show { id } => {
            let app = db.get_application_by_id(id)?;
            println!("Application #{}", app.id);
            println!("Company: {}", app.company);
            println!("Date: {}", app.date);
            println!("City: {}", app.city);
            println!("Internship: {}", if app.internship { "yes" } else { "no" });
            println!("Status: {}", app.status);
            println!("Platform: {}", app.platform);
            if let Some(link) = &app.link {
                println!("Link: {}", link);
            }
            match db.time_to_respond(id, true)? {
                Some(days) => println!("First response after: {} day(s)", days),
                None => println!("First response after: -"),
            }
            println!("\n--- Description ---\n{}", textwrap::fill(&app.description, 78));
        }

        Commands::List => {
            print_applications(&db.list_applications()?);
        }

        Commands::Search {
            company,
            include_rejected,
        } => {
            print_applications(&db.get_application_by_company(&company, !include_rejected)?);
        }

        Commands::Events {
            include_rejected_apps,
            include_rejections,
        } => {
            let events = db.list_events(!include_rejected_apps, !include_rejections)?;
            if events.is_empty() {
                println!("No events found.");
            } else {
                println!("{:<12} {:<15} {:<6} {:<20} {:<25}", "DATE", "EVENT", "APP", "COMPANY", "DESCRIPTION");
                println!("{}", "-".repeat(82));
                for event in events {
                    println!(
                        "{:<12} {:<15} {:<6} {:<20} {:<25}",
                        event.date.to_string(),
                        event.event_description,
                        event.application_id,
                        truncate(&event.company, 18),
                        truncate(&event.application_description, 25)
                    );
                }
            }
        }

        Commands::Timeline { id } => {
            let timeline = db.list_events_for_application(id)?;
            let app = &timeline.application;
            println!(
                "#{} {} - {} ({}, applied {}, {})",
                app.id, app.company, app.description, app.city, app.date, app.status
            );
            if timeline.events.is_empty() {
                println!("No events yet.");
            } else {
                for event in &timeline.events {
                    let days = (event.date - app.date).num_days();
                    println!("  {} {:<15} (+{} days)", event.date, event.event_type.to_string(), days);
                }
            }
        }

        Commands::Respond { id, include_ongoing } => match db.time_to_respond(id, !include_ongoing)? {
            Some(days) => println!("{}", days),
            None => println!("No response yet for application #{}.", id),
        },

        Commands::Stats {
            include_ongoing,
            json,
        } => {
            let stats = db.rejection_statistics(!include_ongoing)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!(
                    "Responses: {} out of {} applications",
                    stats.sample_count, stats.total_applications
                );
                if let (Some(mean), Some(std_dev)) = (stats.mean, stats.std_dev) {
                    println!("Mean: {:.1} days", mean);
                    println!("Std dev: {:.1} days", std_dev);
                }
                if let Some(max) = &stats.max {
                    let app = db.get_application_by_id(max.application_id)?;
                    println!(
                        "Longest: {} days (#{} {} - {})",
                        max.days, app.id, app.company, app.description
                    );
                }
                if !stats.daily_average.is_empty() {
                    println!("\n{:<12} {:>10}", "APPLIED", "AVG DAYS");
                    println!("{}", "-".repeat(23));
                    for (date, avg) in &stats.daily_average {
                        println!("{:<12} {:>10.1}", date.to_string(), avg);
                    }
                }
            }
        }

        Commands::Companies => {
            let companies = db.list_companies()?;
            if companies.is_empty() {
                println!("No companies found.");
            } else {
                println!("{:<6} {:<30}", "ID", "NAME");
                println!("{}", "-".repeat(36));
                for company in companies {
                    println!("{:<6} {:<30}", company.id, truncate(&company.name, 30));
                }
            }
        }

        Commands::EventTypes => {
            for (id, description) in db.list_event_types()? {
                println!("{:<3} {}", id, description);
            }
        }

        Commands::Verify { repair } => {
            let drifts = if repair {
                db.repair_statuses()?
            } else {
                db.check_statuses()?
            };
            if drifts.is_empty() {
                println!("All statuses match the event log.");
            } else {
                for drift in &drifts {
                    println!(
                        "#{}: stored {}, events say {}",
                        drift.application_id, drift.stored, drift.derived
                    );
                }
                if repair {
                    println!("\nRepaired {} application(s).", drifts.len());
                } else {
                    println!("\nRun with --repair to fix {} application(s).", drifts.len());
                }
            }
        }
    }

    Ok(())
}

fn print_applications(apps: &[apptrack::Application]) {
    if apps.is_empty() {
        println!("No applications found.");
        return;
    }
    println!(
        "{:<6} {:<12} {:<12} {:<20} {:<25} {:<12}",
        "ID", "DATE", "STATUS", "COMPANY", "DESCRIPTION", "CITY"
    );
    println!("{}", "-".repeat(92));
    for app in apps {
        println!(
            "{:<6} {:<12} {:<12} {:<20} {:<25} {:<12}",
            app.id,
            app.date.to_string(),
            app.status.to_string(),
            truncate(&app.company, 18),
            truncate(&app.description, 23),
            truncate(&app.city, 12)
        );
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
