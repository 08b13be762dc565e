use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::{ColoredString, Colorize};
use helpdesk::report::{OpenTicketLine, OverdueTicket};
use helpdesk::{
    init, Config, Database, NewUser, Reports, SaltedSha256, ServiceDesk, StatusUpdate,
    SystemClock, Ticket, TicketStatus, Urgency, UserId, UserRegistry, UserType,
};
use serde::Serialize;
use std::error::Error;
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Parser, Debug)]
#[command(name = "helpdesk")]
#[command(author, version, about = "Helpdesk ticketing - triage, technician assignment and SLA tracking")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,

    /// User id performing the action
    #[arg(long = "as", value_name = "USER_ID", global = true)]
    actor: Option<UserId>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create .helpdesk/ with a default config and database
    Init,

    /// Register, log in and inspect users
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Technician skills
    Skill {
        #[command(subcommand)]
        action: CatalogAction,
    },

    /// Departments
    Department {
        #[command(subcommand)]
        action: CatalogAction,
    },

    /// Open, inspect and work on tickets
    Ticket {
        #[command(subcommand)]
        action: TicketAction,
    },

    /// Show unread notifications for --as and mark them read
    Notifications,

    /// Knowledge-base suggestions for a problem description
    Suggest {
        description: String,
        #[arg(short, long)]
        category: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Knowledge base
    Kb {
        #[command(subcommand)]
        action: KbAction,
    },

    /// Service-level table (category, urgency) -> hours
    Sla {
        #[command(subcommand)]
        action: SlaAction,
    },

    /// Management reports
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },

    /// Generate shell completions
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
enum UserAction {
    /// Register a new user
    Register {
        name: String,
        email: String,
        /// regular, technician, manager or hr
        #[arg(long = "type")]
        user_type: UserType,
        /// Required for regular users
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        /// YYYY-MM-DD
        #[arg(long)]
        birth_date: Option<NaiveDate>,
        #[arg(long)]
        password: String,
        /// Skill id (technicians only, repeatable)
        #[arg(long = "skill")]
        skills: Vec<i32>,
    },
    /// Check credentials
    Login {
        id: UserId,
        #[arg(long = "type")]
        user_type: UserType,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        password: String,
    },
    /// Show a user and their skills
    Show { id: UserId },
}

#[derive(Subcommand, Debug)]
enum CatalogAction {
    Add {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    List,
}

#[derive(Subcommand, Debug)]
enum TicketAction {
    /// Open a ticket as --as
    Open {
        description: String,
        #[arg(short, long)]
        category: String,
    },
    /// Ticket details, history and evaluation
    Show { id: i32 },
    /// Assign a technician by skill
    Assign { id: i32 },
    /// Change status and record the solution
    Update {
        id: i32,
        #[arg(short, long)]
        status: TicketStatus,
        #[arg(long)]
        solution: Option<String>,
        /// RFC 3339 timestamp; only with resolved/closed
        #[arg(long)]
        closed_at: Option<DateTime<Utc>>,
    },
    /// Log minutes worked by --as
    LogTime {
        id: i32,
        #[arg(short, long)]
        minutes: f64,
        #[arg(short, long)]
        activity: String,
    },
    /// Score a resolved or closed ticket (0-10)
    Evaluate {
        id: i32,
        #[arg(short, long, allow_negative_numbers = true)]
        score: i32,
        #[arg(short, long)]
        comment: Option<String>,
    },
    /// Tickets assigned to a technician (defaults to --as)
    Assigned { technician: Option<UserId> },
    /// Stored suggestion plus alternative articles
    Review {
        id: i32,
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
enum KbAction {
    /// Add a knowledge-base article
    Add {
        #[arg(short, long)]
        category: String,
        #[arg(short, long)]
        title: String,
        #[arg(short, long)]
        description: String,
        #[arg(short, long)]
        solution: String,
    },
}

#[derive(Subcommand, Debug)]
enum SlaAction {
    List,
    /// Insert or replace an entry
    Set {
        category: String,
        urgency: Urgency,
        hours: i32,
    },
    Delete {
        category: String,
        urgency: Urgency,
    },
    /// Categories with at least one entry
    Categories,
}

#[derive(Subcommand, Debug)]
enum ReportAction {
    /// Finished tickets per category
    Categories,
    /// Average resolution time
    Resolution,
    /// Assigned tickets and logged effort per technician
    Technicians,
    /// Logged hours per technician
    Hours {
        /// First day included (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day included (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Resolved / closed counts
    Summary,
    /// Active HIGH and CRITICAL tickets
    Critical,
    /// Active tickets past their SLA deadline
    Overdue,
}

fn init_logging(verbose: u8, config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match verbose {
            0 => config.logging.level.as_str(),
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn open_database(config: &Config) -> Result<Database, Box<dyn Error>> {
    let path = config.database_path();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(Database::open_at(&path, config.database.pool_size)?)
}

fn require_actor(actor: Option<UserId>) -> Result<UserId, Box<dyn Error>> {
    actor.ok_or_else(|| "this command needs --as <USER_ID>".into())
}

fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn urgency_label(urgency: Urgency) -> ColoredString {
    match urgency {
        Urgency::Critical => urgency.as_str().red().bold(),
        Urgency::High => urgency.as_str().red(),
        Urgency::Medium => urgency.as_str().yellow(),
        Urgency::Low => urgency.as_str().normal(),
    }
}

fn status_label(status: TicketStatus) -> ColoredString {
    match status {
        TicketStatus::Open => status.as_str().cyan(),
        TicketStatus::InProgress => status.as_str().yellow(),
        TicketStatus::Resolved | TicketStatus::Closed => status.as_str().green(),
    }
}

fn short_time(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

fn print_ticket_line(ticket: &Ticket) {
    println!(
        "  {} [{}] {} {} {}",
        format!("#{}", ticket.id).bold(),
        status_label(ticket.status),
        urgency_label(ticket.urgency),
        ticket.category.dimmed(),
        ticket.description
    );
}

fn day_start(day: NaiveDate) -> Option<DateTime<Utc>> {
    day.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive))
}

fn day_end(day: NaiveDate) -> Option<DateTime<Utc>> {
    day.and_hms_micro_opt(23, 59, 59, 999_999)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn main() {
    let cli = Cli::parse();
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e.red());
            std::process::exit(1);
        }
    };
    init_logging(cli.verbose, &config);

    if let Err(e) = run(cli, &config) {
        eprintln!("{} {}", "Error:".red().bold(), e.to_string().red());
        std::process::exit(1);
    }
}

fn run(cli: Cli, config: &Config) -> CliResult {
    let json = cli.json;
    let actor = cli.actor;

    match cli.command {
        Commands::Init => init::init_project()?,
        Commands::Completion { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "helpdesk", &mut std::io::stdout());
        }
        Commands::User { action } => {
            let db = open_database(config)?;
            let registry = UserRegistry::new(db, Arc::new(SystemClock), Arc::new(SaltedSha256));
            run_user(action, &registry, json)?;
        }
        Commands::Skill { action } => {
            let db = open_database(config)?;
            let registry = UserRegistry::new(db, Arc::new(SystemClock), Arc::new(SaltedSha256));
            match action {
                CatalogAction::Add { name, description } => {
                    let id = registry.add_skill(&name, description.as_deref())?;
                    println!("{} skill {} ({})", "Created".green(), id, name);
                }
                CatalogAction::List => {
                    let skills = registry.list_skills()?;
                    if json {
                        return print_json(&skills);
                    }
                    for skill in skills {
                        println!("  {:>4}  {}", skill.id, skill.name);
                    }
                }
            }
        }
        Commands::Department { action } => {
            let db = open_database(config)?;
            let registry = UserRegistry::new(db, Arc::new(SystemClock), Arc::new(SaltedSha256));
            match action {
                CatalogAction::Add { name, description } => {
                    let id = registry.add_department(&name, description.as_deref())?;
                    println!("{} department {} ({})", "Created".green(), id, name);
                }
                CatalogAction::List => {
                    let departments = registry.list_departments()?;
                    if json {
                        return print_json(&departments);
                    }
                    for department in departments {
                        println!("  {:>4}  {}", department.id, department.name);
                    }
                }
            }
        }
        Commands::Ticket { action } => {
            let desk = ServiceDesk::new(open_database(config)?, Arc::new(SystemClock), &config.triage);
            run_ticket(action, &desk, actor, json)?;
        }
        Commands::Notifications => {
            let user = require_actor(actor)?;
            let desk = ServiceDesk::new(open_database(config)?, Arc::new(SystemClock), &config.triage);
            let notes = desk.fetch_notifications(user)?;
            if json {
                return print_json(&notes);
            }
            if notes.is_empty() {
                println!("No new notifications.");
            }
            for note in notes {
                println!(
                    "  {} {} {}",
                    short_time(&note.sent_at).dimmed(),
                    format!("[{}]", note.kind).cyan(),
                    note.message
                );
            }
        }
        Commands::Suggest { description, category, limit } => {
            let desk = ServiceDesk::new(open_database(config)?, Arc::new(SystemClock), &config.triage);
            let suggestions = desk.suggest_solutions(&description, &category, limit)?;
            if json {
                return print_json(&suggestions);
            }
            if suggestions.is_empty() {
                println!("No matching articles in '{}'.", category);
            }
            for suggestion in suggestions {
                println!("  {}", suggestion.title.bold());
                println!("    {}", suggestion.excerpt);
            }
        }
        Commands::Kb { action: KbAction::Add { category, title, description, solution } } => {
            let desk = ServiceDesk::new(open_database(config)?, Arc::new(SystemClock), &config.triage);
            let id = desk.add_article(&category, &title, &description, &solution)?;
            println!("{} article {} in {}", "Created".green(), id, category);
        }
        Commands::Sla { action } => {
            let desk = ServiceDesk::new(open_database(config)?, Arc::new(SystemClock), &config.triage);
            run_sla(action, &desk, json)?;
        }
        Commands::Report { action } => {
            let reports = Reports::new(open_database(config)?, Arc::new(SystemClock));
            run_report(action, &reports, json)?;
        }
    }
    Ok(())
}

fn run_user(action: UserAction, registry: &UserRegistry, json: bool) -> CliResult {
    match action {
        UserAction::Register {
            name,
            email,
            user_type,
            department,
            phone,
            birth_date,
            password,
            skills,
        } => {
            let id = registry.register(&NewUser {
                name: &name,
                email: &email,
                birth_date,
                user_type,
                department: department.as_deref(),
                phone: phone.as_deref(),
                password: &password,
                skill_ids: &skills,
            })?;
            if json {
                return print_json(&serde_json::json!({ "user_id": id }));
            }
            println!("{} user {} ({}, {})", "Registered".green(), id, name, user_type);
        }
        UserAction::Login { id, user_type, department, password } => {
            let user = registry.login(id, user_type, department.as_deref(), &password)?;
            if json {
                return print_json(&user);
            }
            println!("{} {} ({})", "Welcome,".green(), user.name.bold(), user.user_type);
        }
        UserAction::Show { id } => {
            let user = registry
                .get_user(id)?
                .ok_or_else(|| format!("user {} not found", id))?;
            let skills = registry.skills_of(id)?;
            if json {
                return print_json(&serde_json::json!({ "user": user, "skills": skills }));
            }
            println!("{} {}", format!("User #{}", user.id).bold(), user.name);
            println!("  Email:      {}", user.email);
            println!("  Type:       {}", user.user_type);
            println!("  Status:     {}", user.status);
            if let Some(department) = &user.department {
                println!("  Department: {}", department);
            }
            if let Some(phone) = &user.phone {
                println!("  Phone:      {}", phone);
            }
            if let Some(birth_date) = user.birth_date {
                println!("  Born:       {}", birth_date);
            }
            println!("  Registered: {}", short_time(&user.registered_at));
            if !skills.is_empty() {
                let names: Vec<_> = skills.iter().map(|s| s.name.as_str()).collect();
                println!("  Skills:     {}", names.join(", "));
            }
        }
    }
    Ok(())
}

fn run_ticket(action: TicketAction, desk: &ServiceDesk, actor: Option<UserId>, json: bool) -> CliResult {
    match action {
        TicketAction::Open { description, category } => {
            let requester = require_actor(actor)?;
            let id = desk.open_ticket(&description, &category, requester)?;
            if json {
                return print_json(&serde_json::json!({ "ticket_id": id }));
            }
            let urgency = desk.get_ticket(id)?.map(|t| t.urgency).unwrap_or(Urgency::Low);
            println!("{} ticket #{} (urgency {})", "Opened".green(), id, urgency_label(urgency));
        }
        TicketAction::Show { id } => {
            let snapshot = desk
                .status_view(id)?
                .ok_or_else(|| format!("ticket {} not found", id))?;
            if json {
                return print_json(&snapshot);
            }
            let ticket = &snapshot.ticket;
            println!(
                "{} [{}] urgency {}",
                format!("Ticket #{}", ticket.id).bold(),
                status_label(ticket.status),
                urgency_label(ticket.urgency)
            );
            println!("  Description: {}", ticket.description);
            println!("  Category:    {}", ticket.category);
            println!("  Requester:   #{}", ticket.requester_id);
            match ticket.technician_id {
                Some(tech) => println!("  Technician:  #{}", tech),
                None => println!("  Technician:  {}", "unassigned".dimmed()),
            }
            println!("  Opened:      {}", short_time(&ticket.opened_at));
            if let Some(closed_at) = &ticket.closed_at {
                println!("  Closed:      {}", short_time(closed_at));
            }
            println!("  Solution:    {}", ticket.solution.as_deref().unwrap_or("-"));
            if let Some(minutes) = ticket.total_attendance_minutes {
                println!("  Logged:      {} min", minutes);
            }
            println!("\n{}", "History".bold());
            for entry in &snapshot.history {
                println!(
                    "  {} #{:<4} {}",
                    short_time(&entry.recorded_at).dimmed(),
                    entry.user_id,
                    entry.description
                );
            }
            if let Some(evaluation) = &snapshot.evaluation {
                println!(
                    "\n{} {} {}",
                    "Evaluation".bold(),
                    evaluation.score,
                    evaluation.comment.as_deref().unwrap_or("")
                );
            }
        }
        TicketAction::Assign { id } => {
            let requested_by = require_actor(actor)?;
            let assignment = desk.assign_technician(id, requested_by)?;
            if json {
                return print_json(&assignment);
            }
            println!(
                "{} ticket #{} to {} (#{})",
                "Assigned".green(),
                id,
                assignment.technician.name.bold(),
                assignment.technician.id
            );
        }
        TicketAction::Update { id, status, solution, closed_at } => {
            let acting = require_actor(actor)?;
            let ticket = desk.update_status(
                id,
                &StatusUpdate { status, solution: solution.as_deref(), closed_at },
                acting,
            )?;
            if json {
                return print_json(&ticket);
            }
            println!("{} ticket #{} -> {}", "Updated".green(), id, status_label(ticket.status));
        }
        TicketAction::LogTime { id, minutes, activity } => {
            let technician = require_actor(actor)?;
            let log_id = desk.add_time_log(id, technician, minutes, &activity)?;
            let total = desk
                .get_ticket(id)?
                .and_then(|t| t.total_attendance_minutes)
                .unwrap_or(minutes);
            if json {
                return print_json(&serde_json::json!({ "time_log_id": log_id, "total_minutes": total }));
            }
            println!("{} {} min on #{} (total {} min)", "Logged".green(), minutes, id, total);
        }
        TicketAction::Evaluate { id, score, comment } => {
            let evaluator = require_actor(actor)?;
            let evaluation_id = desk.evaluate(id, score, comment.as_deref(), evaluator)?;
            if json {
                return print_json(&serde_json::json!({ "evaluation_id": evaluation_id }));
            }
            println!("{} ticket #{} with {}/10", "Evaluated".green(), id, score);
        }
        TicketAction::Assigned { technician } => {
            let technician = match technician {
                Some(id) => id,
                None => require_actor(actor)?,
            };
            let tickets = desk.assigned_tickets(technician)?;
            if json {
                return print_json(&tickets);
            }
            if tickets.is_empty() {
                println!("No tickets assigned to #{}.", technician);
            }
            for ticket in &tickets {
                print_ticket_line(ticket);
            }
        }
        TicketAction::Review { id, limit } => {
            let review = desk
                .review_solutions(id, limit)?
                .ok_or_else(|| format!("ticket {} not found", id))?;
            if json {
                return print_json(&review);
            }
            println!(
                "{} {}",
                "Suggested:".bold(),
                review.suggested.as_deref().unwrap_or("none")
            );
            if !review.alternatives.is_empty() {
                println!("{}", "Alternatives:".bold());
            }
            for alternative in &review.alternatives {
                println!("  {} - {}", alternative.title, alternative.excerpt);
            }
        }
    }
    Ok(())
}

fn run_sla(action: SlaAction, desk: &ServiceDesk, json: bool) -> CliResult {
    match action {
        SlaAction::List => {
            let entries = desk.list_sla()?;
            if json {
                return print_json(&entries);
            }
            for entry in entries {
                println!(
                    "  {:<20} {:<10} {:>4}h",
                    entry.category,
                    urgency_label(entry.urgency),
                    entry.max_resolution_hours
                );
            }
        }
        SlaAction::Set { category, urgency, hours } => {
            desk.upsert_sla(&category, urgency, hours)?;
            println!("{} {} / {} = {}h", "Saved".green(), category, urgency, hours);
        }
        SlaAction::Delete { category, urgency } => {
            if desk.delete_sla(&category, urgency)? {
                println!("{} {} / {}", "Deleted".green(), category, urgency);
            } else {
                println!("{} no entry for {} / {}", "Skipping".yellow(), category, urgency);
            }
        }
        SlaAction::Categories => {
            let categories = desk.categories()?;
            if json {
                return print_json(&categories);
            }
            for category in categories {
                println!("  {}", category);
            }
        }
    }
    Ok(())
}

fn print_active_line(line: &OpenTicketLine) {
    print_ticket_line(&line.ticket);
    println!(
        "      opened {} by {}",
        short_time(&line.ticket.opened_at),
        line.requester_name
    );
}

fn print_overdue_line(line: &OverdueTicket) {
    print_ticket_line(&line.ticket);
    println!(
        "      due {} ({}h SLA), requested by {}",
        short_time(&line.deadline).red(),
        line.max_resolution_hours,
        line.requester_name
    );
}

fn minutes_text(minutes: Option<f64>) -> String {
    minutes.map_or_else(|| "-".to_string(), |m| format!("{:.1} min", m))
}

fn run_report(action: ReportAction, reports: &Reports, json: bool) -> CliResult {
    match action {
        ReportAction::Categories => {
            let stats = reports.tickets_by_category()?;
            if json {
                return print_json(&stats);
            }
            for stat in stats {
                println!(
                    "  {:<20} {:>4} tickets  avg {}",
                    stat.category,
                    stat.tickets,
                    minutes_text(stat.avg_resolution_minutes)
                );
            }
        }
        ReportAction::Resolution => {
            let average = reports.average_resolution_minutes()?;
            if json {
                return print_json(&serde_json::json!({ "avg_resolution_minutes": average }));
            }
            println!("Average resolution time: {}", minutes_text(average));
        }
        ReportAction::Technicians => {
            let workload = reports.technician_workload()?;
            if json {
                return print_json(&workload);
            }
            for line in workload {
                println!(
                    "  {:<20} {:>4} tickets  {:.1} min logged",
                    line.name, line.assigned_tickets, line.logged_minutes
                );
            }
        }
        ReportAction::Hours { from, to } => {
            let from = from.and_then(day_start);
            let to = to.and_then(day_end);
            let hours = reports.technician_hours(from, to)?;
            if json {
                return print_json(&hours);
            }
            for line in hours {
                println!("  {:<20} {:>8.2}h", line.name, line.hours());
            }
        }
        ReportAction::Summary => {
            let summary = reports.closure_summary()?;
            if json {
                return print_json(&summary);
            }
            println!("Finished tickets: {}", summary.total);
            println!("  {} {}", "Resolved:".green(), summary.resolved);
            println!("  {} {}", "Closed:".green(), summary.closed);
            println!("  Average resolution: {}", minutes_text(summary.avg_resolution_minutes));
        }
        ReportAction::Critical => {
            let lines = reports.critical_open()?;
            if json {
                return print_json(&lines);
            }
            if lines.is_empty() {
                println!("No open HIGH or CRITICAL tickets.");
            }
            lines.iter().for_each(print_active_line);
        }
        ReportAction::Overdue => {
            let lines = reports.overdue()?;
            if json {
                return print_json(&lines);
            }
            if lines.is_empty() {
                println!("No ticket is past its SLA.");
            }
            lines.iter().for_each(print_overdue_line);
        }
    }
    Ok(())
}
