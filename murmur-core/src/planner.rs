//! Scheduling suggester: buckets a scored task list into today / tomorrow / this week.
//!
//! Buckets are filled in order and are mutually exclusive. Every task that
//! qualifies for a bucket leaves the pool, including the ones cut by the cap,
//! so overflow from an earlier bucket never shows up in a later one.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::priority::{PrioritizedTask, UrgencyTier};

pub const TODAY_CAP: usize = 5;
pub const TOMORROW_CAP: usize = 3;
pub const THIS_WEEK_CAP: usize = 7;

/// Above this many minutes planned for today, suggest spilling into tomorrow.
pub const DAY_CAPACITY_MINUTES: u32 = 480;
/// Above this many open tasks, suggest archiving.
pub const ACTIVE_TASK_LIMIT: usize = 20;

pub const ADVISORY_ALL_CLEAR: &str =
    "No critical tasks today. Good time to make progress on longer-term work.";
pub const ADVISORY_OVERLOAD: &str =
    "Today's plan is over 8 hours. Consider moving some items to tomorrow.";
pub const ADVISORY_TOO_MANY: &str =
    "More than 20 open tasks. Consider archiving or refocusing on what matters.";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Suggestions {
    pub today: Vec<PrioritizedTask>,
    pub tomorrow: Vec<PrioritizedTask>,
    pub this_week: Vec<PrioritizedTask>,
    pub advisories: Vec<String>,
}

impl Suggestions {
    pub fn is_empty(&self) -> bool {
        self.today.is_empty() && self.tomorrow.is_empty() && self.this_week.is_empty()
    }

    pub fn today_minutes(&self) -> u32 {
        self.today.iter().map(|p| p.estimated_minutes).sum()
    }
}

fn within(p: &PrioritizedTask, hours: f64) -> bool {
    p.hours_to_deadline.is_some_and(|h| h < hours)
}

fn qualifies_today(p: &PrioritizedTask) -> bool {
    p.tier == UrgencyTier::Critical || (p.tier == UrgencyTier::High && within(p, 48.0))
}

fn qualifies_tomorrow(p: &PrioritizedTask) -> bool {
    p.tier == UrgencyTier::High || (p.tier == UrgencyTier::Medium && within(p, 72.0))
}

fn qualifies_this_week(p: &PrioritizedTask) -> bool {
    within(p, 168.0) || p.tier == UrgencyTier::Medium
}

/// Pull every qualifier out of `pool`; keep the top `cap` by score.
fn take_bucket(
    pool: &mut Vec<PrioritizedTask>,
    cap: usize,
    qualifies: fn(&PrioritizedTask) -> bool,
) -> Vec<PrioritizedTask> {
    let (mut hits, rest): (Vec<_>, Vec<_>) = pool.drain(..).partition(|p| qualifies(p));
    *pool = rest;
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(cap);
    hits
}

pub fn suggest(prioritized: &[PrioritizedTask], _now: DateTime<Utc>) -> Suggestions {
    let mut pool: Vec<PrioritizedTask> = prioritized
        .iter()
        .filter(|p| p.task.is_active())
        .cloned()
        .collect();
    let active = pool.len();

    let today = take_bucket(&mut pool, TODAY_CAP, qualifies_today);
    let tomorrow = take_bucket(&mut pool, TOMORROW_CAP, qualifies_tomorrow);
    let this_week = take_bucket(&mut pool, THIS_WEEK_CAP, qualifies_this_week);

    let mut out = Suggestions {
        today,
        tomorrow,
        this_week,
        advisories: vec![],
    };
    out.advisories = advisories(&out, prioritized, active);
    out
}

fn advisories(s: &Suggestions, all: &[PrioritizedTask], active: usize) -> Vec<String> {
    let mut notes = Vec::new();

    if !s.today.iter().any(|p| p.tier == UrgencyTier::Critical) {
        notes.push(ADVISORY_ALL_CLEAR.to_string());
    }

    let critical: Vec<&str> = all
        .iter()
        .filter(|p| p.task.is_active() && p.tier == UrgencyTier::Critical)
        .map(|p| p.task.title.as_str())
        .collect();
    if !critical.is_empty() {
        notes.push(format!(
            "{} critical or overdue task(s) need attention now: {}",
            critical.len(),
            critical.join(", ")
        ));
    }

    if s.today_minutes() > DAY_CAPACITY_MINUTES {
        notes.push(ADVISORY_OVERLOAD.to_string());
    }
    if active > ACTIVE_TASK_LIMIT {
        notes.push(ADVISORY_TOO_MANY.to_string());
    }
    notes
}
