//! Cron-driven scheduling of workflow runs.
//!
//! Each workflow id owns at most one [`ScheduleConfig`] and, while enabled,
//! exactly one recurring timer task — installing a new timer always cancels
//! the prior one first, so duplicate timers can never coexist. Schedule
//! mutations persist through a [`ScheduleStore`]; [`stop_all`]
//! (WorkflowScheduler::stop_all) cancels every timer without deleting
//! stored configs.
//!
//! Expressions use five-field cron syntax
//! (minute hour day-of-month month day-of-week), validated structurally
//! before anything is stored.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cron::Schedule;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

/// Persisted schedule record for one workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub workflow_id: String,
    /// Five space-separated cron fields.
    pub cron_expression: String,
    pub name: String,
    pub enabled: bool,
}

/// External persistence collaborator: plain get/set/remove/list-all
/// semantics over a key-value medium.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn save(&self, config: &ScheduleConfig);
    async fn remove(&self, workflow_id: &str);
    async fn load_all(&self) -> Vec<ScheduleConfig>;
}

/// In-memory store used in tests and as the default medium.
#[derive(Default)]
pub struct MemoryScheduleStore {
    records: DashMap<String, ScheduleConfig>,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        MemoryScheduleStore::default()
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn save(&self, config: &ScheduleConfig) {
        self.records
            .insert(config.workflow_id.clone(), config.clone());
    }

    async fn remove(&self, workflow_id: &str) {
        self.records.remove(workflow_id);
    }

    async fn load_all(&self) -> Vec<ScheduleConfig> {
        let mut all: Vec<ScheduleConfig> =
            self.records.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| a.workflow_id.cmp(&b.workflow_id));
        all
    }
}

/// Callback invoked when a schedule fires. In production this is the
/// engine's run entrypoint; tests substitute counters.
#[async_trait]
pub trait ScheduleExecutor: Send + Sync {
    async fn execute_workflow(&self, workflow_id: &str);
}

/// (inclusive) numeric bounds per cron field.
const FIELD_BOUNDS: [(u32, u32); 5] = [(0, 59), (0, 23), (1, 31), (1, 12), (0, 6)];

/// Structural validation of a five-field cron expression.
///
/// Each field accepts `*`, a number, ranges (`a-b`), steps (`*/n`, `a-b/n`)
/// and comma lists thereof, with per-field numeric bounds.
pub fn validate_cron_expression(expr: &str) -> bool {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return false;
    }
    fields
        .iter()
        .zip(FIELD_BOUNDS.iter())
        .all(|(field, (min, max))| valid_field(field, *min, *max))
}

fn valid_field(field: &str, min: u32, max: u32) -> bool {
    if field.is_empty() {
        return false;
    }
    field.split(',').all(|part| valid_part(part, min, max))
}

fn valid_part(part: &str, min: u32, max: u32) -> bool {
    let (range, step) = match part.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (part, None),
    };
    if let Some(step) = step {
        match step.parse::<u32>() {
            Ok(n) if n >= 1 => {}
            _ => return false,
        }
    }
    if range == "*" {
        return true;
    }
    if let Some((start, end)) = range.split_once('-') {
        return match (start.parse::<u32>(), end.parse::<u32>()) {
            (Ok(a), Ok(b)) => a >= min && b <= max && a <= b,
            _ => false,
        };
    }
    match range.parse::<u32>() {
        Ok(n) => n >= min && n <= max,
        Err(_) => false,
    }
}

/// Canonical presets offered by the schedule editor.
pub const PRESETS: &[(&str, &str)] = &[
    ("every minute", "* * * * *"),
    ("every 5 minutes", "*/5 * * * *"),
    ("every 15 minutes", "*/15 * * * *"),
    ("every 30 minutes", "*/30 * * * *"),
    ("every hour", "0 * * * *"),
    ("daily at midnight", "0 0 * * *"),
    ("daily at 9:00", "0 9 * * *"),
    ("every Monday at 9:00", "0 9 * * 1"),
    ("weekdays at 9:00", "0 9 * * 1-5"),
    ("monthly on the 1st at 9:00", "0 9 1 * *"),
];

/// Cron expression for a human preset label, if one exists.
pub fn preset_expression(label: &str) -> Option<&'static str> {
    let needle = label.trim().to_lowercase();
    PRESETS
        .iter()
        .find(|(name, _)| name.to_lowercase() == needle)
        .map(|(_, expr)| *expr)
}

/// Human description of a cron expression. Recognizes exactly the canonical
/// preset forms and degrades to a generic description for anything else —
/// never fails.
pub fn humanize(expr: &str) -> String {
    let normalized = expr.split_whitespace().collect::<Vec<_>>().join(" ");
    PRESETS
        .iter()
        .find(|(_, canonical)| *canonical == normalized)
        .map(|(label, _)| (*label).to_string())
        .unwrap_or_else(|| format!("custom schedule: `{}`", expr))
}

/// Next fire time of a validated five-field expression.
///
/// The `cron` crate wants a seconds column (prefixed as `0`) and numbers
/// its weekdays from Sunday=1, so the day-of-week field is rewritten to
/// unambiguous names before parsing.
pub fn next_fire_time(expr: &str) -> Option<DateTime<Utc>> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return None;
    }
    let dow = dow_names(fields[4]);
    let promoted = format!(
        "0 {} {} {} {} {}",
        fields[0], fields[1], fields[2], fields[3], dow
    );
    let schedule = Schedule::from_str(&promoted).ok()?;
    schedule.upcoming(Utc).next()
}

/// Rewrite numeric day-of-week tokens (0=Sunday … 6=Saturday) to names,
/// preserving `*`, lists, ranges and steps.
fn dow_names(field: &str) -> String {
    const NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];
    let name_of = |token: &str| -> String {
        token
            .parse::<usize>()
            .ok()
            .and_then(|n| NAMES.get(n))
            .map(|s| s.to_string())
            .unwrap_or_else(|| token.to_string())
    };
    field
        .split(',')
        .map(|part| {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (part, None),
            };
            let mapped = match range.split_once('-') {
                Some((a, b)) => format!("{}-{}", name_of(a), name_of(b)),
                None => name_of(range),
            };
            match step {
                Some(step) => format!("{}/{}", mapped, step),
                None => mapped,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

struct ScheduleEntry {
    config: ScheduleConfig,
    timer: Option<JoinHandle<()>>,
}

/// Process-wide schedule table: initialized empty, populated by
/// [`set_schedule`](Self::set_schedule), torn down by
/// [`stop_all`](Self::stop_all). Timer callbacks and user edits can race,
/// so the table is a concurrent map.
pub struct WorkflowScheduler {
    entries: DashMap<String, ScheduleEntry>,
    store: Arc<dyn ScheduleStore>,
    executor: Arc<dyn ScheduleExecutor>,
}

impl WorkflowScheduler {
    pub fn new(store: Arc<dyn ScheduleStore>, executor: Arc<dyn ScheduleExecutor>) -> Self {
        WorkflowScheduler {
            entries: DashMap::new(),
            store,
            executor,
        }
    }

    pub fn in_memory(executor: Arc<dyn ScheduleExecutor>) -> Self {
        WorkflowScheduler::new(Arc::new(MemoryScheduleStore::new()), executor)
    }

    /// Hydrate the table from the store, installing timers for enabled
    /// schedules only.
    pub async fn load_persisted(&self) {
        for config in self.store.load_all().await {
            let timer = config.enabled.then(|| self.spawn_timer(config.clone()));
            self.entries.insert(
                config.workflow_id.clone(),
                ScheduleEntry { config, timer },
            );
        }
    }

    /// Store a schedule for a workflow, replacing any existing one.
    ///
    /// Returns `false` (and mutates nothing) when the cron expression does
    /// not validate — callers are expected to check and prompt the user.
    pub async fn set_schedule(&self, config: ScheduleConfig) -> bool {
        if !validate_cron_expression(&config.cron_expression) {
            tracing::warn!(
                workflow_id = %config.workflow_id,
                expression = %config.cron_expression,
                "rejected invalid cron expression"
            );
            return false;
        }
        self.cancel_timer(&config.workflow_id);
        self.store.save(&config).await;
        let timer = config.enabled.then(|| self.spawn_timer(config.clone()));
        tracing::info!(
            workflow_id = %config.workflow_id,
            expression = %config.cron_expression,
            enabled = config.enabled,
            "schedule set"
        );
        self.entries.insert(
            config.workflow_id.clone(),
            ScheduleEntry { config, timer },
        );
        true
    }

    pub fn get_schedule(&self, workflow_id: &str) -> Option<ScheduleConfig> {
        self.entries.get(workflow_id).map(|e| e.config.clone())
    }

    /// Enable or disable an existing schedule. Returns `false` when the
    /// workflow has none.
    pub async fn toggle_schedule(&self, workflow_id: &str, enabled: bool) -> bool {
        let Some(mut config) = self.get_schedule(workflow_id) else {
            return false;
        };
        config.enabled = enabled;
        self.set_schedule(config).await
    }

    /// Drop a schedule and its timer entirely. Returns `false` when the
    /// workflow had none.
    pub async fn remove_schedule(&self, workflow_id: &str) -> bool {
        self.cancel_timer(workflow_id);
        let existed = self.entries.remove(workflow_id).is_some();
        if existed {
            self.store.remove(workflow_id).await;
        }
        existed
    }

    /// All stored schedules, sorted by workflow id.
    pub fn all_schedules(&self) -> Vec<ScheduleConfig> {
        let mut all: Vec<ScheduleConfig> =
            self.entries.iter().map(|e| e.config.clone()).collect();
        all.sort_by(|a, b| a.workflow_id.cmp(&b.workflow_id));
        all
    }

    /// Cancel every active timer without deleting stored configs.
    pub fn stop_all(&self) {
        for mut entry in self.entries.iter_mut() {
            if let Some(timer) = entry.timer.take() {
                timer.abort();
            }
        }
        tracing::info!("all schedule timers stopped");
    }

    fn cancel_timer(&self, workflow_id: &str) {
        if let Some(mut entry) = self.entries.get_mut(workflow_id) {
            if let Some(timer) = entry.timer.take() {
                timer.abort();
            }
        }
    }

    fn spawn_timer(&self, config: ScheduleConfig) -> JoinHandle<()> {
        let executor = self.executor.clone();
        tokio::spawn(async move {
            loop {
                let Some(next) = next_fire_time(&config.cron_expression) else {
                    tracing::warn!(
                        workflow_id = %config.workflow_id,
                        "no upcoming fire time, timer exiting"
                    );
                    break;
                };
                let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait).await;

                tracing::info!(
                    workflow_id = %config.workflow_id,
                    scheduled_time = %next,
                    "schedule fired"
                );
                // Fire-and-forget so a long run never delays the next tick
                // or other schedules.
                let executor = executor.clone();
                let workflow_id = config.workflow_id.clone();
                tokio::spawn(async move {
                    executor.execute_workflow(&workflow_id).await;
                });
            }
        })
    }
}
