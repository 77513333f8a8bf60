use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::cli::commands::{AlertsArgs, InfoArgs, SessionsArgs};
use crate::db::{AlertRecord, Database, PoolStats, ServerKind};
use crate::errors::StoreError;

#[derive(Debug, Serialize)]
struct StoreInfo {
    backend: &'static str,
    locator: String,
    sessions: usize,
    alerts: i64,
    history: i64,
    alert_tags: usize,
    params: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pool: Vec<PoolEntry>,
}

#[derive(Debug, Serialize)]
struct PoolEntry {
    key: String,
    #[serde(flatten)]
    stats: PoolStats,
}

#[derive(Debug, Serialize)]
struct AlertView {
    #[serde(flatten)]
    alert: AlertRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<BTreeMap<String, String>>,
}

fn pool_entries(db: &Database) -> Vec<PoolEntry> {
    let Some(server) = db.server() else {
        return Vec::new();
    };
    let ServerKind::Generic(generic) = server.kind() else {
        return Vec::new();
    };
    let pool = generic.pool();
    let mut entries: Vec<PoolEntry> = pool
        .keys()
        .into_iter()
        .map(|key| PoolEntry { key: key.to_string(), stats: pool.stats(&key) })
        .collect();
    entries.sort_by(|a, b| a.key.cmp(&b.key));
    entries
}

pub fn handle_info(args: InfoArgs) -> Result<(), StoreError> {
    let db = args.store.open()?;
    let summary = StoreInfo {
        backend: db.backend_name(),
        locator: db.locator().unwrap_or_default(),
        sessions: db.sessions().list()?.len(),
        alerts: db.alerts().count()?,
        history: db.history().count()?,
        alert_tags: db.alert_tags().all_tags()?.len(),
        params: db.params().all()?.len(),
        pool: pool_entries(&db),
    };
    info!(locator = %summary.locator, "Collected store info");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Backend:    {}", summary.backend);
        println!("Locator:    {}", summary.locator);
        println!("Sessions:   {}", summary.sessions);
        println!("Alerts:     {}", summary.alerts);
        println!("History:    {}", summary.history);
        println!("Alert tags: {}", summary.alert_tags);
        println!("Params:     {}", summary.params);
        for entry in &summary.pool {
            println!(
                "  {:<40} created={} reused={} closed={} idle={} peak={}",
                entry.key, entry.stats.created, entry.stats.reused, entry.stats.closed,
                entry.stats.idle, entry.stats.peak_in_use
            );
        }
    }
    db.close(false, false)
}

pub fn handle_alerts(args: AlertsArgs) -> Result<(), StoreError> {
    let db = args.store.open()?;
    let alerts = match (args.session, args.scan) {
        (Some(session_id), _) => db.alerts().alerts_by_session(session_id)?,
        (None, Some(scan_id)) => db.alerts().alerts_by_scan(scan_id)?,
        (None, None) => {
            let mut alerts = Vec::new();
            for alert_id in db.alerts().alert_list()? {
                if let Some(alert) = db.alerts().read(alert_id)? {
                    alerts.push(alert);
                }
            }
            alerts
        }
    };

    let mut views = Vec::with_capacity(alerts.len());
    for alert in alerts {
        let tags = if args.tags { Some(db.alert_tags().tags_by_alert_id(alert.alert_id)?) } else { None };
        views.push(AlertView { alert, tags });
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&views)?);
    } else if views.is_empty() {
        println!("No alerts");
    } else {
        for view in &views {
            let alert = &view.alert;
            let risk = alert
                .risk_level()
                .map(|r| format!("{:?}", r))
                .unwrap_or_else(|| alert.risk.to_string());
            println!("{:>6}  {:<7} {}  {}", alert.alert_id, risk, alert.name, alert.uri);
            if let Some(tags) = &view.tags {
                for (key, value) in tags {
                    println!("        {}={}", key, value);
                }
            }
        }
    }
    db.close(false, false)
}

pub fn handle_sessions(args: SessionsArgs) -> Result<(), StoreError> {
    let db = args.store.open()?;
    let sessions = db.sessions().list()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
    } else if sessions.is_empty() {
        println!("No sessions");
    } else {
        for session in &sessions {
            println!("{:>6}  {}  {}", session.session_id, session.last_access, session.session_name);
        }
    }
    db.close(false, false)
}
