use std::future::Future;
use std::path::Path;
use std::process::ExitCode;

use api::{ApiError, BackendClient, Settings};
use chrono::{Datelike, Local, NaiveDate};
use store::calendar::{self, Accuracy, BsDate, CalendarError, PatroDay};
use store::models::{Expense, Goal, Income, Task};
use store::summary::{completion_percent, MonthRange, MonthlySummary, TaskBuckets};
use store::{
    DailyTrackConfig, FileStore, NetworkStatus, OfflineCache, Repository, StoreError, SyncReport,
    SyncService,
};
use tracing_subscriber::EnvFilter;

fn usage() -> &'static str {
    "dailytrack: offline-first organizer data\n\n\
USAGE:\n\
  dailytrack today                 today's date in Bikram Sambat\n\
  dailytrack convert <YYYY-MM-DD>  Gregorian date to Bikram Sambat\n\
  dailytrack to-ad <YYYY/MM/DD>    Bikram Sambat date to Gregorian\n\
  dailytrack summary [YYYY-MM]     monthly totals from the local cache\n\
  dailytrack status                rows waiting to be synced\n\
  dailytrack sync                  push unsynced rows once\n\
  dailytrack watch                 push unsynced rows periodically until Ctrl-C\n\n\
ENV:\n\
  DAILYTRACK_EMAIL, DAILYTRACK_PASSWORD  credentials for sync and watch\n\
  BACKEND_URL, BACKEND_KEY, CACHE_DIR    see config.toml\n\
  RUST_LOG                               log filter (default: info)\n"
}

#[derive(Debug, PartialEq)]
enum Command {
    Today,
    Convert(NaiveDate),
    ToAd(BsDate),
    Summary(Option<MonthRange>),
    Status,
    Sync,
    Watch,
    Help,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Calendar(#[from] CalendarError),
    #[error("invalid {path}: {message}")]
    Config { path: String, message: String },
    #[error("{0} is not set")]
    MissingEnv(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn parse_args(args: &[String]) -> Result<Command, CliError> {
    let usage_err = |msg: String| Err(CliError::Usage(msg));
    let Some((name, rest)) = args.split_first() else {
        return Ok(Command::Help);
    };
    let command = match (name.as_str(), rest) {
        ("today", []) => Command::Today,
        ("convert", [date]) => match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
            Ok(date) => Command::Convert(date),
            Err(_) => return usage_err(format!("expected YYYY-MM-DD, got {date:?}")),
        },
        ("to-ad", [date]) => match date.parse::<BsDate>() {
            Ok(date) => Command::ToAd(date),
            Err(e) => return usage_err(e.to_string()),
        },
        ("summary", []) => Command::Summary(None),
        ("summary", [month]) => match MonthRange::parse(month) {
            Some(range) => Command::Summary(Some(range)),
            None => return usage_err(format!("expected YYYY-MM, got {month:?}")),
        },
        ("status", []) => Command::Status,
        ("sync", []) => Command::Sync,
        ("watch", []) => Command::Watch,
        ("help" | "-h" | "--help", _) => Command::Help,
        (other, _) => return usage_err(format!("unknown command or arguments: {other}")),
    };
    Ok(command)
}

fn env_var(name: &'static str) -> Result<String, CliError> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(CliError::MissingEnv(name))
}

fn load_config(dir: &Path) -> Result<DailyTrackConfig, CliError> {
    let path = dir.join(DailyTrackConfig::filename());
    if !path.exists() {
        return Ok(DailyTrackConfig::default());
    }
    let text = std::fs::read_to_string(&path)?;
    DailyTrackConfig::from_toml(&text).map_err(|e| CliError::Config {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

fn print_day(day: &PatroDay) {
    println!("{} ({})", day.bs.format_with_month(), day.bs);
    println!("{} {}", day.weekday, day.ad.format("%A, %Y-%m-%d"));
    if let Some(holiday) = day.holiday {
        println!("{} ({})", holiday.name, holiday.description);
    }
    if day.accuracy == Accuracy::Approximate {
        println!("note: month lengths for {} are estimated", day.bs.year);
    }
}

fn print_report(report: &SyncReport) {
    if let Some(reason) = report.skipped {
        println!("sync skipped: {reason:?}");
        return;
    }
    for (table, counts) in &report.tables {
        println!(
            "{table:>10}: {} pushed, {} failed, {} deferred",
            counts.pushed, counts.failed, counts.deferred
        );
    }
    match report.notice() {
        Some(notice) => println!("{}: {}", notice.title, notice.description),
        None => println!("Nothing to sync."),
    }
}

async fn summary(settings: &Settings, month: Option<MonthRange>) -> Result<(), CliError> {
    let today = Local::now().date_naive();
    let month = month.unwrap_or_else(|| MonthRange::containing(today));
    let repo = Repository::new(FileStore::open(settings.cache.dir.clone())?);

    let expenses = repo.records::<Expense>().await?;
    let incomes = repo.records::<Income>().await?;
    let summary = MonthlySummary::compute(month, &expenses, &incomes, &[]);
    let elapsed = if month.contains(today) {
        today.day()
    } else {
        month.days()
    };

    println!("{} to {}", month.start, month.end);
    println!("income:    {} ({} entries)", summary.income_total, summary.income_count);
    println!("expenses:  {} ({} entries)", summary.expense_total, summary.expense_count);
    println!("remaining: {}", summary.remaining());
    println!("daily avg: {}", summary.daily_average(elapsed));
    for (category, amount) in summary.top_categories(3) {
        println!("  {category}: {amount}");
    }

    let tasks = repo.records::<Task>().await?;
    let buckets = TaskBuckets::split(&tasks, today);
    let goals: Vec<Goal> = repo
        .records::<Goal>()
        .await?
        .into_iter()
        .filter(|g| g.goal_date == today)
        .collect();
    let due_today = buckets.today.iter().filter(|t| t.completed).count();
    println!(
        "tasks today: {}% of {} ({} upcoming, {} overdue)",
        completion_percent(due_today, buckets.today.len()),
        buckets.today.len(),
        buckets.upcoming.len(),
        buckets.overdue.len()
    );
    println!(
        "goals today: {}% of {}",
        completion_percent(goals.iter().filter(|g| g.completed).count(), goals.len()),
        goals.len()
    );
    Ok(())
}

async fn status(settings: &Settings) -> Result<(), CliError> {
    let repo = Repository::new(FileStore::open(settings.cache.dir.clone())?);
    let pending = repo.pending_counts().await?;
    if pending.is_empty() {
        println!("All rows synced.");
    }
    for (table, count) in pending {
        println!("{table:>10}: {count} pending");
    }
    Ok(())
}

async fn signed_in_service(
    settings: &Settings,
    config: &DailyTrackConfig,
) -> Result<SyncService<FileStore, BackendClient>, CliError> {
    let email = env_var("DAILYTRACK_EMAIL")?;
    let password = env_var("DAILYTRACK_PASSWORD")?;

    let client = BackendClient::new(settings)?;
    let session = client.sign_in_with_password(&email, &password).await?;
    let store = FileStore::open(settings.cache.dir.clone())?;
    let cache = OfflineCache::new(
        store,
        client,
        NetworkStatus::new(true),
        Some(session.user.id),
    );
    Ok(SyncService::new(cache, config.sync.clone()))
}

/// Sync on every tick until `shutdown` resolves.
async fn watch(
    service: &SyncService<FileStore, BackendClient>,
    shutdown: impl Future<Output = std::io::Result<()>>,
) -> Result<(), CliError> {
    let Some(period) = service.config().interval() else {
        return Err(CliError::Usage(
            "periodic sync is disabled (auto_sync_interval_secs = 0)".into(),
        ));
    };
    tracing::info!(secs = period.as_secs(), "watching for unsynced rows");
    let mut ticker = tokio::time::interval(period);
    tokio::pin!(shutdown);
    loop {
        // Polling `shutdown` first installs the Ctrl-C listener before the first pass.
        tokio::select! {
            biased;
            signal = &mut shutdown => {
                signal?;
                tracing::info!("stopping");
                return Ok(());
            }
            _ = ticker.tick() => {
                let report = service.sync_now().await;
                if let Some(notice) = report.notice() {
                    println!("{}: {}", notice.title, notice.description);
                }
            }
        }
    }
}

async fn run(command: Command) -> Result<(), CliError> {
    if command == Command::Help {
        print!("{}", usage());
        return Ok(());
    }
    let settings = Settings::new().map_err(ApiError::from)?;
    let config = load_config(&settings.cache.dir)?;
    let show_holidays = config.calendar.show_holidays;

    match command {
        Command::Help => {} // printed above
        Command::Today => print_day(&PatroDay::for_date(Local::now().date_naive(), show_holidays)),
        Command::Convert(date) => print_day(&PatroDay::for_date(date, show_holidays)),
        Command::ToAd(date) => {
            let ad = calendar::bs_to_ad(date)?;
            println!("{}", ad.format("%Y-%m-%d (%A)"));
            if !calendar::is_tabulated(date.year) {
                println!("note: month lengths for {} are estimated", date.year);
            }
        }
        Command::Summary(month) => summary(&settings, month).await?,
        Command::Status => status(&settings).await?,
        Command::Sync => {
            let service = signed_in_service(&settings, &config).await?;
            print_report(&service.sync_now().await);
            let left = service.cache().pending_count().await?;
            if left > 0 {
                println!("{left} row(s) still pending");
            }
        }
        Command::Watch => {
            let service = signed_in_service(&settings, &config).await?;
            watch(&service, tokio::signal::ctrl_c()).await?;
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("error: {e}\n\n{}", usage());
            return ExitCode::from(2);
        }
    };

    match run(command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Usage(msg)) => {
            eprintln!("error: {msg}");
            ExitCode::from(2)
        }
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}
