//! Utterance parser: free text in, `ParsedIntent` out. Never fails.
//!
//! Deterministic first. The optional AI extractor gets exactly one attempt;
//! anything it returns that does not validate is discarded in favour of the
//! keyword/regex extractor below.
//!
//! Heuristic extraction:
//! 1) temporal phrases via `time::scan` (due date, event start, event length)
//! 2) task vs event by counting obligation cues against scheduling cues
//! 3) priority from urgency / deferral words
//! 4) location from "at/in the ..." or "at/in <Capitalised Name>"
//! 5) title = what remains after cutting the above out

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;
use tracing::debug;

use crate::assist::IntentExtractor;
use crate::error::ExtractionError;
use crate::intent::{IntentKind, ParsedIntent, validate_extraction};
use crate::task::Priority;
use crate::time::{self, TemporalScan};

/// Title length used when nothing better can be extracted.
pub const FALLBACK_TITLE_CHARS: usize = 50;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("parser pattern is valid")
}

static EVENT_CUES: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\b(?:schedule|scheduled|meetings?|meet\s+(?:with|up)|appointments?|appt|lunch|dinner|breakfast|brunch|coffee\s+with|interview|conference|party|flight|call\s+with|calendar|book\s+a)\b")
});
static CALL_AT_TIME: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)\bcall\b.{0,40}?\bat\s+(?:\d|noon|midnight)"));
static TASK_CUES: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\b(?:remind\s+me|need\s+to|needs\s+to|don'?t\s+forget|do\s+not\s+forget|have\s+to|has\s+to|must|gotta|todo|to-do)\b")
});
static HIGH_CUES: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\b(?:urgent(?:ly)?|asap|a\.s\.a\.p|as\s+soon\s+as\s+possible|immediately|critical|important|right\s+away|emergency|top\s+priority|high\s+priority)\b")
});
static LOW_CUES: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\b(?:when\s+i\s+have\s+(?:the\s+)?time|when\s+i\s+get\s+a\s+chance|eventually|some\s*day|no\s+rush|whenever|low\s+priority|at\s+some\s+point)\b")
});
static LEADING_CUE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)^\s*(?:(?:hey|ok|okay)\s+\w+\s*,?\s*)?(?:please\s+)?(?:(?:can|could|would)\s+you\s+)?(?:remind\s+me\s+(?:to|that|about)|(?:don'?t|do\s+not)\s+(?:let\s+me\s+)?forget\s+(?:to|about)?|i\s+(?:need|have|want|must|should)\s+to|i'?ve\s+got\s+to|i\s+gotta|need\s+to|have\s+to|schedule|set\s+up|book|add\s+(?:a|an)?\s*(?:task|event|reminder)\s*(?:to|for)?\s*:?|create\s+(?:a|an)?\s*(?:task|event|reminder)\s*(?:to|for)?\s*:?|todo\s*:?|to-do\s*:?)\s*(?:(?:a|an)\s+)?")
});
static AT_OR_IN: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)\b(?:at|in)\s+"));
static WORD: LazyLock<Regex> = LazyLock::new(|| re(r"\S+"));

const LOCATION_STOPS: &[&str] = &[
    "on", "at", "by", "for", "from", "to", "with", "before", "after", "until", "till", "about",
    "and", "tomorrow", "today", "tonight", "next", "this", "every",
];

/// Task unless scheduling cues outnumber obligation cues.
pub fn classify(utterance: &str) -> IntentKind {
    let event = EVENT_CUES.find_iter(utterance).count() + CALL_AT_TIME.find_iter(utterance).count();
    let task = TASK_CUES.find_iter(utterance).count();
    if event > task {
        IntentKind::Event
    } else {
        IntentKind::Task
    }
}

pub fn infer_priority(utterance: &str) -> Priority {
    let high = HIGH_CUES.find_iter(utterance).count();
    let low = LOW_CUES.find_iter(utterance).count();
    match high.cmp(&low) {
        std::cmp::Ordering::Greater => Priority::High,
        std::cmp::Ordering::Less => Priority::Low,
        std::cmp::Ordering::Equal => Priority::Medium,
    }
}

/// Last resort: a task titled with the first 50 characters, medium priority, no dates.
pub fn fallback_intent(utterance: &str) -> ParsedIntent {
    let mut title: String = utterance.trim().chars().take(FALLBACK_TITLE_CHARS).collect();
    if title.is_empty() {
        title = "Untitled task".to_string();
    }
    let mut intent = ParsedIntent::task(title);
    intent.priority = Some(Priority::Medium);
    intent
}

#[derive(Debug, Clone, Copy)]
pub struct UtteranceParser {
    tz: Tz,
}

impl UtteranceParser {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Parse with an optional AI extractor; one attempt, then the heuristic path.
    pub async fn parse(
        &self,
        utterance: &str,
        now: DateTime<Utc>,
        extractor: Option<&dyn IntentExtractor>,
    ) -> ParsedIntent {
        if let Some(extractor) = extractor {
            match self.try_extractor(extractor, utterance, now).await {
                Ok(intent) => return intent.normalized(now),
                Err(e) => debug!(error = %e, "extraction rejected, using heuristic parser"),
            }
        }
        self.heuristic(utterance, now)
    }

    async fn try_extractor(
        &self,
        extractor: &dyn IntentExtractor,
        utterance: &str,
        now: DateTime<Utc>,
    ) -> Result<ParsedIntent, ExtractionError> {
        let raw = extractor
            .extract(utterance, now)
            .await
            .map_err(|e| ExtractionError::Collaborator(e.to_string()))?;
        let mut intent = validate_extraction(&raw, now, self.tz)?;

        let expected = classify(utterance);
        if intent.kind != expected {
            debug!(?expected, got = ?intent.kind, "extractor disagrees with cue classification");
        }
        if intent.priority.is_none() {
            intent.priority = Some(infer_priority(utterance));
        }
        if intent.description.is_none() {
            intent.description = Some(utterance.trim().to_string());
        }
        Ok(intent)
    }

    /// Deterministic extractor. Also the ground truth for classification.
    pub fn heuristic(&self, utterance: &str, now: DateTime<Utc>) -> ParsedIntent {
        let text = utterance.trim();
        if text.is_empty() {
            return fallback_intent(text);
        }

        let kind = classify(text);
        let temporal = time::scan(text);
        let mut cut = Mask::new(text.len());
        for span in temporal.spans() {
            cut.mark(span.range.clone());
        }

        let location = find_location(text, &cut);
        if let (IntentKind::Event, Some((range, _))) = (kind, &location) {
            cut.mark(range.clone());
        }
        for m in HIGH_CUES.find_iter(text).chain(LOW_CUES.find_iter(text)) {
            cut.mark(m.range());
        }
        if let Some(m) = LEADING_CUE.find(text) {
            cut.mark(m.range());
        }

        let title = cut.remainder(text);
        if title.is_empty() {
            debug!(utterance = text, "no title left after extraction, using fallback");
            return fallback_intent(text);
        }

        let mut intent = match kind {
            IntentKind::Task => {
                let mut intent = ParsedIntent::task(title);
                intent.due = temporal.resolve(now, self.tz);
                intent
            }
            IntentKind::Event => self.event_window(ParsedIntent::event(title), &temporal, now),
        };
        intent.description = Some(text.to_string());
        intent.location = location.map(|(_, place)| place);
        intent.priority = Some(infer_priority(text));
        intent.normalized(now)
    }

    fn event_window(
        &self,
        mut intent: ParsedIntent,
        temporal: &TemporalScan,
        now: DateTime<Utc>,
    ) -> ParsedIntent {
        intent.start = temporal.resolve(now, self.tz);
        // A stated length with no start time still sets the window, starting now.
        if let Some(len) = temporal.length() {
            let start = intent.start.unwrap_or(now);
            intent.start = Some(start);
            intent.end = start.checked_add_signed(len);
        }
        intent
    }
}

/// Byte mask over the utterance; marked ranges are cut from the title.
struct Mask {
    cut: Vec<bool>,
}

impl Mask {
    fn new(len: usize) -> Self {
        Self { cut: vec![false; len] }
    }

    fn mark(&mut self, r: Range<usize>) {
        let end = r.end.min(self.cut.len());
        for b in &mut self.cut[r.start.min(end)..end] {
            *b = true;
        }
    }

    fn is_cut(&self, at: usize) -> bool {
        self.cut.get(at).copied().unwrap_or(false)
    }

    fn remainder(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for (i, ch) in text.char_indices() {
            out.push(if self.is_cut(i) { ' ' } else { ch });
        }
        let joined = out.split_whitespace().collect::<Vec<_>>().join(" ");
        joined
            .trim_matches(|c: char| c.is_whitespace() || ",.;:!?-".contains(c))
            .to_string()
    }
}

/// "at the Italian restaurant", "in Paris". Times and lowercase words are not places.
fn find_location(text: &str, temporal: &Mask) -> Option<(Range<usize>, String)> {
    for m in AT_OR_IN.find_iter(text) {
        if temporal.is_cut(m.start()) {
            continue;
        }
        let rest_start = m.end();
        let mut end = rest_start;
        let mut words: Vec<&str> = Vec::new();

        for w in WORD.find_iter(&text[rest_start..]) {
            let abs = rest_start + w.start();
            if temporal.is_cut(abs) {
                break;
            }
            let raw = w.as_str();
            let clean = raw.trim_end_matches(|c: char| ",.;:!?".contains(c));
            if !words.is_empty() && LOCATION_STOPS.contains(&clean.to_lowercase().as_str()) {
                break;
            }
            words.push(clean);
            end = abs + clean.len();
            if clean.len() != raw.len() {
                break;
            }
        }

        let Some(first) = words.first() else { continue };
        let article = matches!(first.to_lowercase().as_str(), "the" | "a" | "an");
        let capitalised = first.chars().next().is_some_and(char::is_uppercase);
        let starts_with_digit = first.chars().next().is_some_and(|c| c.is_ascii_digit());
        if starts_with_digit || !(article || capitalised) || (article && words.len() < 2) {
            continue;
        }
        return Some((m.start()..end, words.join(" ")));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assist::IntentExtractor;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};

    // Thursday 2026-03-05 09:00 UTC.
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 5, 9, 0, 0).unwrap()
    }

    fn parser() -> UtteranceParser {
        UtteranceParser::new(chrono_tz::UTC)
    }

    struct CannedExtractor(&'static str);

    #[async_trait]
    impl IntentExtractor for CannedExtractor {
        async fn extract(&self, _u: &str, _r: DateTime<Utc>) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct DownExtractor;

    #[async_trait]
    impl IntentExtractor for DownExtractor {
        async fn extract(&self, _u: &str, _r: DateTime<Utc>) -> anyhow::Result<String> {
            anyhow::bail!("connection refused")
        }
    }

    #[test]
    fn classifies_cues() {
        assert_eq!(classify("remind me to call mom tonight"), IntentKind::Task);
        assert_eq!(
            classify("schedule a meeting with John next Tuesday at 2 PM"),
            IntentKind::Event
        );
        assert_eq!(classify("dentist appointment tomorrow at 3pm"), IntentKind::Event);
        assert_eq!(classify("call at 5pm with the bank"), IntentKind::Event);
        // One cue each: ties go to task.
        assert_eq!(classify("remind me about the meeting"), IntentKind::Task);
        assert_eq!(classify("water the plants"), IntentKind::Task);
    }

    #[test]
    fn infers_priority_from_words() {
        assert_eq!(infer_priority("URGENT: file taxes"), Priority::High);
        assert_eq!(infer_priority("fix the door asap"), Priority::High);
        assert_eq!(infer_priority("clean the garage eventually"), Priority::Low);
        assert_eq!(infer_priority("read a book when I have time"), Priority::Low);
        assert_eq!(infer_priority("buy milk"), Priority::Medium);
    }

    #[test]
    fn urgent_proposal_due_this_afternoon() {
        let intent = parser().heuristic("URGENT: submit the proposal by 3pm today", now());
        assert_eq!(intent.kind, IntentKind::Task);
        assert_eq!(intent.priority, Some(Priority::High));
        assert_eq!(intent.title, "submit the proposal");
        assert_eq!(intent.due, Some(Utc.with_ymd_and_hms(2026, 3, 5, 15, 0, 0).unwrap()));
    }

    #[test]
    fn lunch_event_with_location() {
        let intent =
            parser().heuristic("Lunch with Sarah on Friday at noon at the Italian restaurant", now());
        assert_eq!(intent.kind, IntentKind::Event);
        assert!(intent.title.contains("Lunch with Sarah"));
        let start = Utc.with_ymd_and_hms(2026, 3, 6, 12, 0, 0).unwrap();
        assert_eq!(intent.start, Some(start));
        assert_eq!(intent.end, Some(start + Duration::minutes(60)));
        assert_eq!(intent.location.as_deref(), Some("the Italian restaurant"));
    }

    #[test]
    fn meeting_with_explicit_length() {
        let intent = parser().heuristic(
            "schedule a meeting with John next Tuesday at 2 PM for one hour",
            now(),
        );
        assert_eq!(intent.kind, IntentKind::Event);
        assert_eq!(intent.title, "meeting with John");
        let start = Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap();
        assert_eq!(intent.start, Some(start));
        assert_eq!(intent.end, Some(start + Duration::hours(1)));
    }

    #[test]
    fn length_without_start_time_keeps_its_length() {
        let intent = parser().heuristic("schedule a meeting with John for 2 hours", now());
        assert_eq!(intent.kind, IntentKind::Event);
        assert_eq!(intent.title, "meeting with John");
        assert_eq!(intent.start, Some(now()));
        assert_eq!(intent.end, Some(now() + Duration::hours(2)));
    }

    #[test]
    fn absurd_offsets_drop_the_date_instead_of_panicking() {
        let intent = parser().heuristic("remind me to renew the lease in 100000000 days", now());
        assert_eq!(intent.kind, IntentKind::Task);
        assert_eq!(intent.title, "renew the lease");
        assert!(intent.due.is_none());

        let intent = parser().heuristic("remind me to water plants in 99999999999999 hours", now());
        assert!(intent.title.starts_with("water plants"));
        assert!(intent.due.is_none());

        let intent = parser().heuristic("team meeting for 99999999999999 hours", now());
        assert_eq!(intent.kind, IntentKind::Event);
        assert_eq!(intent.start, Some(now()));
        assert_eq!(intent.end, Some(now() + Duration::minutes(60)));
    }

    #[test]
    fn remind_me_tonight() {
        let intent = parser().heuristic("remind me to call mom tonight", now());
        assert_eq!(intent.kind, IntentKind::Task);
        assert_eq!(intent.title, "call mom");
        assert_eq!(intent.due, Some(Utc.with_ymd_and_hms(2026, 3, 5, 20, 0, 0).unwrap()));
    }

    #[test]
    fn undated_task_has_no_due() {
        let intent = parser().heuristic("buy milk", now());
        assert_eq!(intent.title, "buy milk");
        assert!(intent.due.is_none());
        assert_eq!(intent.priority, Some(Priority::Medium));
    }

    #[test]
    fn event_without_time_starts_now() {
        let intent = parser().heuristic("team meeting", now());
        assert_eq!(intent.kind, IntentKind::Event);
        assert_eq!(intent.start, Some(now()));
        assert_eq!(intent.end, Some(now() + Duration::minutes(60)));
    }

    #[test]
    fn task_keeps_location_words_in_title() {
        let intent = parser().heuristic("pick up the parcel at the post office tomorrow", now());
        assert_eq!(intent.kind, IntentKind::Task);
        assert_eq!(intent.title, "pick up the parcel at the post office");
        assert_eq!(intent.location.as_deref(), Some("the post office"));
    }

    #[test]
    fn only_temporal_words_falls_back() {
        let intent = parser().heuristic("tomorrow at 3pm", now());
        assert_eq!(intent.kind, IntentKind::Task);
        assert_eq!(intent.title, "tomorrow at 3pm");
        assert!(intent.due.is_none());
    }

    #[test]
    fn fallback_truncates_to_fifty_chars() {
        let long = "x".repeat(80);
        assert_eq!(fallback_intent(&long).title.chars().count(), 50);
        assert_eq!(fallback_intent("   ").title, "Untitled task");
    }

    #[tokio::test]
    async fn malformed_extraction_falls_back() {
        let ex = CannedExtractor(r#"{"type":"task","priority":"high"}"#);
        let intent = parser().parse("buy milk", now(), Some(&ex)).await;
        assert_eq!(intent.kind, IntentKind::Task);
        assert_eq!(intent.title, "buy milk");
        assert_eq!(intent.priority, Some(Priority::Medium));
        assert!(intent.due.is_none());
    }

    #[tokio::test]
    async fn unreachable_extractor_falls_back() {
        let intent = parser().parse("remind me to call mom tonight", now(), Some(&DownExtractor)).await;
        assert_eq!(intent.title, "call mom");
    }

    #[tokio::test]
    async fn valid_extraction_is_used() {
        let ex = CannedExtractor(
            r#"{"type":"event","title":"Sync with design","startTime":"2026-03-09T16:00:00Z"}"#,
        );
        let intent = parser().parse("sync with design monday 4pm", now(), Some(&ex)).await;
        assert_eq!(intent.kind, IntentKind::Event);
        assert_eq!(intent.title, "Sync with design");
        let start = Utc.with_ymd_and_hms(2026, 3, 9, 16, 0, 0).unwrap();
        assert_eq!(intent.start, Some(start));
        assert_eq!(intent.end, Some(start + Duration::minutes(60)));
        assert_eq!(intent.priority, Some(Priority::Medium));
    }
}
