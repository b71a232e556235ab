use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::debug;

/// Rolling activity window, in days.
const RESET_AFTER_DAYS: i64 = 30;

/// Activity counters for one client within the current window.
#[derive(Debug, Clone)]
pub struct ClientUsage {
    pub searches_this_month: u64,
    pub downloads_this_month: u64,
    pub month_started: DateTime<Utc>,
    #[allow(dead_code)]
    pub last_activity: DateTime<Utc>,
}

impl ClientUsage {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            searches_this_month: 0,
            downloads_this_month: 0,
            month_started: now,
            last_activity: now,
        }
    }

    fn roll_over_if_due(&mut self, now: DateTime<Utc>) {
        if now - self.month_started >= Duration::days(RESET_AFTER_DAYS) {
            self.searches_this_month = 0;
            self.downloads_this_month = 0;
            self.month_started = now;
        }
    }
}

/// Per-client usage counters, recorded by the request handlers.
///
/// Counters only; plan and quota decisions belong to the callers.
#[derive(Debug, Default)]
pub struct UsageTracker {
    clients: DashMap<String, ClientUsage>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    pub fn record_search(&self, client: &str) {
        self.record(client, |usage| usage.searches_this_month += 1);
    }

    pub fn record_download(&self, client: &str) {
        self.record(client, |usage| usage.downloads_this_month += 1);
    }

    fn record(&self, client: &str, bump: impl FnOnce(&mut ClientUsage)) {
        let now = Utc::now();
        let mut usage = self
            .clients
            .entry(client.to_string())
            .or_insert_with(|| ClientUsage::new(now));
        usage.roll_over_if_due(now);
        usage.last_activity = now;
        bump(&mut usage);
        debug!(
            "usage for {client}: {} searches, {} downloads",
            usage.searches_this_month, usage.downloads_this_month
        );
    }

    #[allow(dead_code)]
    pub fn get(&self, client: &str) -> Option<ClientUsage> {
        self.clients.get(client).map(|usage| usage.clone())
    }
}
