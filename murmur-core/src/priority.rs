//! Priority scoring: deterministic score + urgency tier per task.
//!
//! Scoring:
//! - base by priority: high 100, medium 50, low 25
//! - one deadline band (incomplete tasks only): overdue +200, <=2h +150,
//!   <=24h +75, <=72h +25
//! - +10 once the task is older than 7 days
//! - completed tasks score 0; scores never go below 0
//!
//! An AI scorer may replace the numbers, but only if its answer covers every
//! task exactly once. Any defect discards the whole answer.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

use crate::assist::TaskScorer;
use crate::error::ScoringError;
use crate::intent::json_object;
use crate::task::{Priority, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyTier {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for UrgencyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UrgencyTier::Low => "low",
            UrgencyTier::Medium => "medium",
            UrgencyTier::High => "high",
            UrgencyTier::Critical => "critical",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub score: f64,
    pub tier: UrgencyTier,
}

/// A task plus its derived ranking fields. A view, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrioritizedTask {
    pub task: Task,
    pub score: f64,
    pub tier: UrgencyTier,
    pub hours_to_deadline: Option<f64>,
    pub estimated_minutes: u32,
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Band {
    Overdue,
    Within2h,
    Within24h,
    Within72h,
    Later,
}

fn band(task: &Task, now: DateTime<Utc>) -> Option<Band> {
    let due = task.due?;
    if due < now {
        return Some(Band::Overdue);
    }
    let left = due - now;
    Some(if left <= Duration::hours(2) {
        Band::Within2h
    } else if left <= Duration::hours(24) {
        Band::Within24h
    } else if left <= Duration::hours(72) {
        Band::Within72h
    } else {
        Band::Later
    })
}

fn base_score(priority: Priority) -> f64 {
    match priority {
        Priority::High => 100.0,
        Priority::Medium => 50.0,
        Priority::Low => 25.0,
    }
}

pub fn score(task: &Task, now: DateTime<Utc>) -> Score {
    Score {
        score: numeric_score(task, now),
        tier: urgency_tier(task, now),
    }
}

fn numeric_score(task: &Task, now: DateTime<Utc>) -> f64 {
    if task.completed {
        return 0.0;
    }
    let mut s = base_score(task.priority);
    s += match band(task, now) {
        Some(Band::Overdue) => 200.0,
        Some(Band::Within2h) => 150.0,
        Some(Band::Within24h) => 75.0,
        Some(Band::Within72h) => 25.0,
        Some(Band::Later) | None => 0.0,
    };
    if now - task.created_at > Duration::days(7) {
        s += 10.0;
    }
    s.max(0.0)
}

/// Tier from deadline proximity, falling back to the task's own priority.
pub fn urgency_tier(task: &Task, now: DateTime<Utc>) -> UrgencyTier {
    if task.completed {
        return UrgencyTier::Low;
    }
    match band(task, now) {
        Some(Band::Overdue | Band::Within2h) => UrgencyTier::Critical,
        Some(Band::Within24h) => UrgencyTier::High,
        Some(Band::Within72h) => UrgencyTier::Medium,
        Some(Band::Later) | None => match task.priority {
            Priority::High => UrgencyTier::High,
            Priority::Medium => UrgencyTier::Medium,
            Priority::Low => UrgencyTier::Low,
        },
    }
}

/// Negative when overdue.
pub fn hours_to_deadline(task: &Task, now: DateTime<Utc>) -> Option<f64> {
    task.due.map(|d| (d - now).num_seconds() as f64 / 3600.0)
}

/// Rough effort guess from the title.
pub fn estimate_minutes(title: &str) -> u32 {
    let t = title.to_lowercase();
    let has = |words: &[&str]| {
        t.split(|c: char| !c.is_alphanumeric())
            .any(|w| words.contains(&w))
    };
    if has(&["project", "presentation", "research", "study", "exam", "thesis"]) {
        120
    } else if has(&["write", "report", "proposal", "prepare", "draft", "review", "plan"]) {
        90
    } else if has(&["meeting", "meet", "appointment", "workout", "gym", "clean"]) {
        60
    } else if has(&["call", "email", "text", "reply", "pay", "buy", "send", "book", "check"]) {
        15
    } else {
        30
    }
}

fn view(task: &Task, now: DateTime<Utc>, score: f64, reasoning: Option<String>) -> PrioritizedTask {
    PrioritizedTask {
        task: task.clone(),
        score,
        tier: urgency_tier(task, now),
        hours_to_deadline: hours_to_deadline(task, now),
        estimated_minutes: estimate_minutes(&task.title),
        reasoning,
    }
}

/// Highest score first; ties by earliest deadline, then oldest task.
fn rank(mut out: Vec<PrioritizedTask>) -> Vec<PrioritizedTask> {
    out.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| match (a.task.due, b.task.due) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
            .then_with(|| a.task.created_at.cmp(&b.task.created_at))
    });
    out
}

/// Deterministic ranking of a fresh task snapshot.
pub fn prioritize(tasks: &[Task], now: DateTime<Utc>) -> Vec<PrioritizedTask> {
    rank(
        tasks
            .iter()
            .map(|t| view(t, now, numeric_score(t, now), None))
            .collect(),
    )
}

/// One attempt at AI scoring; any defect in the answer means the deterministic ranking.
pub async fn prioritize_assisted(
    tasks: &[Task],
    now: DateTime<Utc>,
    scorer: Option<&dyn TaskScorer>,
) -> Vec<PrioritizedTask> {
    let Some(scorer) = scorer else {
        return prioritize(tasks, now);
    };
    if tasks.is_empty() {
        return vec![];
    }
    let assisted = match scorer.score(tasks, now).await {
        Ok(raw) => validate_assisted(tasks, &raw),
        Err(e) => Err(ScoringError::Collaborator(e.to_string())),
    };
    match assisted {
        Ok(scores) => rank(
            tasks
                .iter()
                .map(|t| {
                    let a = &scores[&t.id];
                    let s = if t.completed { 0.0 } else { a.score.max(0.0) };
                    view(t, now, s, a.reasoning.clone())
                })
                .collect(),
        ),
        Err(e) => {
            debug!(error = %e, "assisted scores discarded, using deterministic scoring");
            prioritize(tasks, now)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssistedScore {
    pub score: f64,
    pub reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawScore {
    #[serde(alias = "taskId", alias = "task_id")]
    id: String,
    score: serde_json::Value,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawScores {
    List(Vec<RawScore>),
    Wrapped { scores: Vec<RawScore> },
}

/// Every input id exactly once, no strangers, every score a finite number.
pub fn validate_assisted(
    tasks: &[Task],
    raw: &str,
) -> Result<HashMap<String, AssistedScore>, ScoringError> {
    let body = match (raw.find('['), raw.find('{')) {
        (Some(a), Some(o)) if a < o => raw.get(a..=raw.rfind(']').unwrap_or(a)),
        (Some(a), None) => raw.get(a..=raw.rfind(']').unwrap_or(a)),
        _ => json_object(raw),
    }
    .ok_or_else(|| ScoringError::Json("no JSON found".into()))?;

    let entries = match serde_json::from_str::<RawScores>(body)
        .map_err(|e| ScoringError::Json(e.to_string()))?
    {
        RawScores::List(v) | RawScores::Wrapped { scores: v } => v,
    };

    let wanted: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    let mut out = HashMap::with_capacity(entries.len());
    for e in entries {
        if !wanted.contains(e.id.as_str()) {
            return Err(ScoringError::UnknownId(e.id));
        }
        let score = e
            .score
            .as_f64()
            .filter(|s| s.is_finite())
            .ok_or_else(|| ScoringError::NonNumericScore(e.id.clone()))?;
        if out.contains_key(&e.id) {
            return Err(ScoringError::DuplicateId(e.id));
        }
        out.insert(
            e.id,
            AssistedScore {
                score,
                reasoning: e.reasoning,
            },
        );
    }
    if let Some(missing) = tasks.iter().find(|t| !out.contains_key(&t.id)) {
        return Err(ScoringError::MissingId(missing.id.clone()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 5, 9, 0, 0).unwrap()
    }

    fn task(id: &str, p: Priority) -> Task {
        Task::new("me", id, now()).with_id(id).with_priority(p)
    }

    struct Canned(String);

    #[async_trait]
    impl TaskScorer for Canned {
        async fn score(&self, _t: &[Task], _n: DateTime<Utc>) -> anyhow::Result<String> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn base_scores_by_priority() {
        assert_eq!(score(&task("a", Priority::High), now()).score, 100.0);
        assert_eq!(score(&task("b", Priority::Medium), now()).score, 50.0);
        assert_eq!(score(&task("c", Priority::Low), now()).score, 25.0);
    }

    #[test]
    fn overdue_high_is_critical() {
        let t = task("a", Priority::High).with_due(now() - Duration::hours(1));
        let s = score(&t, now());
        assert!(s.score >= 300.0);
        assert_eq!(s.tier, UrgencyTier::Critical);
    }

    #[test]
    fn deadline_bands_do_not_stack() {
        let cases = [
            (Duration::minutes(90), 150.0, UrgencyTier::Critical),
            (Duration::hours(12), 75.0, UrgencyTier::High),
            (Duration::hours(48), 25.0, UrgencyTier::Medium),
            (Duration::days(10), 0.0, UrgencyTier::Low),
        ];
        for (left, bonus, tier) in cases {
            let t = task("a", Priority::Low).with_due(now() + left);
            let s = score(&t, now());
            assert_eq!(s.score, 25.0 + bonus, "due in {left}");
            assert_eq!(s.tier, tier, "due in {left}");
        }
    }

    #[test]
    fn completed_scores_zero() {
        for p in [Priority::Low, Priority::Medium, Priority::High] {
            let mut t = task("a", p)
                .with_due(now() - Duration::days(3))
                .with_created_at(now() - Duration::days(30));
            t.set_completed(true, now());
            let s = score(&t, now());
            assert_eq!(s.score, 0.0);
            assert_eq!(s.tier, UrgencyTier::Low);
        }
    }

    #[test]
    fn age_bonus_after_a_week() {
        let t = task("a", Priority::Medium).with_created_at(now() - Duration::days(8));
        assert_eq!(score(&t, now()).score, 60.0);
    }

    #[test]
    fn tier_falls_back_to_priority() {
        assert_eq!(urgency_tier(&task("a", Priority::High), now()), UrgencyTier::High);
        assert_eq!(urgency_tier(&task("a", Priority::Low), now()), UrgencyTier::Low);
    }

    #[test]
    fn prioritize_orders_by_score() {
        let tasks = vec![
            task("low", Priority::Low),
            task("overdue", Priority::Medium).with_due(now() - Duration::minutes(5)),
            task("high", Priority::High),
        ];
        let ranked = prioritize(&tasks, now());
        let ids: Vec<&str> = ranked.iter().map(|p| p.task.id.as_str()).collect();
        assert_eq!(ids, vec!["overdue", "high", "low"]);
        assert!(ranked[0].hours_to_deadline.unwrap() < 0.0);
    }

    #[test]
    fn estimates_from_title() {
        assert_eq!(estimate_minutes("write the quarterly report"), 90);
        assert_eq!(estimate_minutes("study for the exam"), 120);
        assert_eq!(estimate_minutes("call mom"), 15);
        assert_eq!(estimate_minutes("team meeting"), 60);
        assert_eq!(estimate_minutes("water plants"), 30);
    }

    #[test]
    fn assisted_validation_rejects_defects() {
        let tasks = vec![task("a", Priority::Low), task("b", Priority::Low)];
        assert!(matches!(
            validate_assisted(&tasks, r#"[{"id":"a","score":10}]"#),
            Err(ScoringError::MissingId(id)) if id == "b"
        ));
        assert!(matches!(
            validate_assisted(&tasks, r#"[{"id":"a","score":1},{"id":"a","score":2},{"id":"b","score":3}]"#),
            Err(ScoringError::DuplicateId(_))
        ));
        assert!(matches!(
            validate_assisted(&tasks, r#"[{"id":"a","score":"high"},{"id":"b","score":3}]"#),
            Err(ScoringError::NonNumericScore(_))
        ));
        assert!(matches!(
            validate_assisted(&tasks, r#"[{"id":"a","score":1},{"id":"b","score":3},{"id":"z","score":3}]"#),
            Err(ScoringError::UnknownId(_))
        ));
        assert!(matches!(validate_assisted(&tasks, "no idea"), Err(ScoringError::Json(_))));
    }

    #[test]
    fn assisted_validation_accepts_wrapped_object() {
        let tasks = vec![task("a", Priority::Low)];
        let out = validate_assisted(
            &tasks,
            r#"{"scores":[{"id":"a","score":42.5,"reasoning":"due soon"}]}"#,
        )
        .unwrap();
        assert_eq!(out["a"].score, 42.5);
        assert_eq!(out["a"].reasoning.as_deref(), Some("due soon"));
    }

    #[tokio::test]
    async fn partial_assisted_answer_is_discarded_entirely() {
        let tasks = vec![task("a", Priority::High), task("b", Priority::Low)];
        let scorer = Canned(r#"[{"id":"b","score":999}]"#.to_string());
        let ranked = prioritize_assisted(&tasks, now(), Some(&scorer)).await;
        assert_eq!(ranked[0].task.id, "a");
        assert_eq!(ranked[0].score, 100.0);
        assert!(ranked.iter().all(|p| p.reasoning.is_none()));
    }

    #[tokio::test]
    async fn valid_assisted_answer_reorders() {
        let tasks = vec![task("a", Priority::High), task("b", Priority::Low)];
        let scorer = Canned(
            r#"[{"id":"a","score":10,"reasoning":"can wait"},{"id":"b","score":80,"reasoning":"blocks others"}]"#
                .to_string(),
        );
        let ranked = prioritize_assisted(&tasks, now(), Some(&scorer)).await;
        assert_eq!(ranked[0].task.id, "b");
        assert_eq!(ranked[0].score, 80.0);
        assert_eq!(ranked[0].reasoning.as_deref(), Some("blocks others"));
        // Tier stays deterministic.
        assert_eq!(ranked[1].tier, UrgencyTier::High);
    }
}
