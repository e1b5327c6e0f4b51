use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use ledgerline_lib::api::ApiClient;
use ledgerline_lib::cache::{QueryCache, QueryObserver, QueryState};
use ledgerline_lib::config::RealtimeConfig;
use ledgerline_lib::realtime::RealtimeClient;
use ledgerline_lib::session::{Credential, Session, SessionInfo};
use ledgerline_lib::views::badge_label;

#[tokio::main]
async fn main() {
    ledgerline_lib::logging::init();
    if let Err(error) = run().await {
        eprintln!("ledgerline-tail failed: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let mut token: Option<String> = None;
    let mut api_url: Option<String> = None;
    let mut is_admin = false;
    let mut watch_stats = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            print_help();
            return Ok(());
        }
        if arg == "--admin" {
            is_admin = true;
            continue;
        }
        if arg == "--stats" {
            watch_stats = true;
            continue;
        }

        if let Some(value) = arg.strip_prefix("--token=") {
            token = Some(value.to_string());
            continue;
        }
        if arg == "--token" {
            let value = args.next().ok_or_else(|| "--token requires a value".to_string())?;
            token = Some(value);
            continue;
        }

        if let Some(value) = arg.strip_prefix("--api-url=") {
            api_url = Some(value.to_string());
            continue;
        }
        if arg == "--api-url" {
            let value = args.next().ok_or_else(|| "--api-url requires a value".to_string())?;
            api_url = Some(value);
            continue;
        }

        return Err(format!("unknown argument '{arg}'. Use --help for usage"));
    }

    let _ = dotenvy::dotenv();
    let config = RealtimeConfig::from_lookup(|key| match (key, api_url.as_ref()) {
        ("LEDGERLINE_API_URL", Some(url)) => Some(url.clone()),
        _ => std::env::var(key).ok(),
    })
    .map_err(|e| e.to_string())?;

    let token = token
        .or_else(|| std::env::var("LEDGERLINE_TOKEN").ok())
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| "a credential is required: pass --token or set LEDGERLINE_TOKEN".to_string())?;

    let credential = Credential::new(token);
    let cache = Arc::new(QueryCache::new());
    let session = Session::new();
    let client = RealtimeClient::from_config(&config, session.clone(), cache.clone())
        .map_err(|e| e.to_string())?;
    session.start(SessionInfo {
        credential: credential.clone(),
        is_admin,
    });

    // Refetched whenever the server reports a change touching stats.
    let stats = if watch_stats {
        let api = ApiClient::new(&config, credential).map_err(|e| e.to_string())?;
        Some(QueryObserver::mount(cache, ApiClient::stats_key(), move || {
            let api = api.clone();
            async move { api.stats().await }
        }))
    } else {
        None
    };
    let mut stats_changes = stats.as_ref().map(|observer| observer.subscribe());

    let scope = client
        .wait_scope(Duration::from_secs(5))
        .await
        .ok_or_else(|| "session scope did not open".to_string())?;
    println!("listening on {} (ctrl-c to stop)", config.events_url());

    let mut notifications = scope.store().subscribe();
    let mut audit_changes = scope.audit_log().map(|log| log.subscribe());
    let mut seen_notifications: HashSet<String> = HashSet::new();
    let mut seen_audit: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = notifications.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = notifications.borrow_and_update().clone();
                for notification in snapshot.notifications.iter().rev() {
                    if seen_notifications.insert(notification.id.clone()) {
                        println!(
                            "[{}] {} | {}: {}{}",
                            notification.occurred_at.format("%Y-%m-%d %H:%M:%S"),
                            notification.category,
                            notification.title,
                            notification.body,
                            notification.link.as_deref().map(|l| format!(" ({l})")).unwrap_or_default(),
                        );
                    }
                }
                if let Some(badge) = badge_label(snapshot.unread_count) {
                    println!("unread: {badge}");
                }
            }
            changed = async {
                match stats_changes.as_mut() {
                    Some(rx) => rx.changed().await,
                    None => std::future::pending().await,
                }
            } => {
                if changed.is_err() {
                    break;
                }
                let state = stats_changes.as_mut().map(|rx| rx.borrow_and_update().clone());
                match state {
                    Some(QueryState::Ready(stats)) => println!(
                        "stats: receivable {} received {} pending debts {} overdue charges {}",
                        stats.total_receivable, stats.total_received, stats.pending_debts, stats.overdue_charges,
                    ),
                    Some(QueryState::Failed(error)) => println!("stats unavailable: {error}"),
                    _ => {}
                }
            }
            changed = async {
                match audit_changes.as_mut() {
                    Some(rx) => rx.changed().await,
                    None => std::future::pending().await,
                }
            } => {
                if changed.is_err() {
                    break;
                }
                if let Some(log) = scope.audit_log() {
                    for record in log.records().iter().rev() {
                        let key = if record.id.is_empty() { format!("{record:?}") } else { record.id.clone() };
                        if seen_audit.insert(key) {
                            println!(
                                "audit {:<5} {} {} {}",
                                record.level.as_str(),
                                record.action,
                                record.actor.as_deref().unwrap_or("-"),
                                record.message,
                            );
                        }
                    }
                }
            }
        }
    }

    session.end();
    Ok(())
}

fn print_help() {
    println!(
        "ledgerline-tail\n\n\
Usage:\n\
  ledgerline-tail --token <token> [--admin] [--stats] [--api-url <url>]\n\n\
Options:\n\
  --token <token>    Bearer credential (default: $LEDGERLINE_TOKEN)\n\
  --admin            Also stream the admin audit log\n\
  --stats            Print dashboard stats whenever they are refetched\n\
  --api-url <url>    Backend base URL (default: $LEDGERLINE_API_URL)\n\
  -h, --help         Show this help"
    );
}
