//! Time utilities: clocks and timezone-aware resolution of date/time phrases.
//!
//! `scan` finds every temporal phrase in an utterance ("by 3pm today",
//! "next Tuesday", "for one hour") and remembers where it was, so the parser can
//! cut those phrases out of the title. `TemporalScan::resolve` turns the phrases
//! into one UTC instant relative to a reference time in the user's timezone.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat,
    TimeZone, Utc, Weekday,
};
use chrono_tz::Tz;
use regex::{Captures, Regex};
use std::ops::Range;
use std::sync::{LazyLock, Mutex};

/// Source of "now". Injected everywhere so tests can step time by hand.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Hour used when only a day is named ("tomorrow", "on Friday").
pub const DEFAULT_DAY_HOUR: u32 = 9;

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or_default()
}

/// "today" with no clock time means by the end of the day.
fn end_of_today() -> NaiveTime {
    hm(23, 59)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayRef {
    Today,
    Tomorrow,
    DayAfterTomorrow,
    NextWeek,
    /// Next occurrence on or after today; `skip_today` for "next Friday" said on a Friday.
    Weekday { day: Weekday, skip_today: bool },
    Date(NaiveDate),
}

impl DayRef {
    fn date_from(self, today: NaiveDate) -> Option<NaiveDate> {
        let ahead = match self {
            DayRef::Today => 0,
            DayRef::Tomorrow => 1,
            DayRef::DayAfterTomorrow => 2,
            DayRef::NextWeek => 7,
            DayRef::Date(d) => return Some(d),
            DayRef::Weekday { day, skip_today } => {
                let diff = (day.num_days_from_monday() + 7 - today.weekday().num_days_from_monday()) % 7;
                if diff == 0 && skip_today { 7 } else { diff as i64 }
            }
        };
        today.checked_add_signed(Duration::days(ahead))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// Fully qualified instant (ISO-8601 with offset).
    Instant(DateTime<Utc>),
    Day(DayRef),
    /// Explicit clock time ("3pm", "14:30", "noon").
    Clock(NaiveTime),
    /// Soft time from a part of day ("tonight", "this morning").
    PartOfDay(NaiveTime),
    /// "in 2 hours"
    Offset(Duration),
    /// "for 90 minutes"
    Length(Duration),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub range: Range<usize>,
    pub fragment: Fragment,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemporalScan {
    spans: Vec<Span>,
}

impl TemporalScan {
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    fn overlaps(&self, r: &Range<usize>) -> bool {
        self.spans
            .iter()
            .any(|s| s.range.start < r.end && r.start < s.range.end)
    }

    fn find<T>(&self, f: impl Fn(&Fragment) -> Option<T>) -> Option<T> {
        self.spans.iter().find_map(|s| f(&s.fragment))
    }

    fn clocks(&self) -> Vec<NaiveTime> {
        self.spans
            .iter()
            .filter_map(|s| match s.fragment {
                Fragment::Clock(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn day(&self) -> Option<DayRef> {
        self.find(|f| match f {
            Fragment::Day(d) => Some(*d),
            _ => None,
        })
    }

    /// Explicit length, or the gap in a "from 2pm to 4pm" range.
    pub fn length(&self) -> Option<Duration> {
        if let Some(d) = self.find(|f| match f {
            Fragment::Length(d) => Some(*d),
            _ => None,
        }) {
            return Some(d);
        }
        match self.clocks().as_slice() {
            [from, to, ..] if to > from => Some(*to - *from),
            _ => None,
        }
    }

    /// Resolve to a single instant, or `None` when nothing usable was said.
    pub fn resolve(&self, reference: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        if let Some(at) = self.find(|f| match f {
            Fragment::Instant(t) => Some(*t),
            _ => None,
        }) {
            return Some(at);
        }
        if let Some(off) = self.find(|f| match f {
            Fragment::Offset(d) => Some(*d),
            _ => None,
        }) {
            return reference.checked_add_signed(off);
        }

        let day = self.day();
        let clock = self.clocks().first().copied().or_else(|| {
            self.find(|f| match f {
                Fragment::PartOfDay(t) => Some(*t),
                _ => None,
            })
        });
        if day.is_none() && clock.is_none() {
            return None;
        }

        let today = reference.with_timezone(&tz).date_naive();
        let date = match day {
            Some(d) => d.date_from(today)?,
            None => today,
        };
        let time = clock.unwrap_or(match day {
            Some(DayRef::Today) => end_of_today(),
            _ => hm(DEFAULT_DAY_HOUR, 0),
        });

        let at = local_to_utc(tz, date.and_time(time))?;
        let roll_days = match day {
            None if at < reference => 1,
            Some(DayRef::Weekday { .. }) if at < reference => 7,
            _ => 0,
        };
        if roll_days == 0 {
            return Some(at);
        }
        let date = date.checked_add_signed(Duration::days(roll_days))?;
        local_to_utc(tz, date.and_time(time))
    }
}

/// Map a local wall-clock time to UTC, stepping over DST gaps.
pub fn local_to_utc(tz: Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| {
            let shifted = local.checked_add_signed(Duration::hours(1))?;
            tz.from_local_datetime(&shifted).earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
}

/// Resolve a phrase or ISO-8601 string against `reference`.
pub fn resolve(reference: DateTime<Utc>, tz: Tz, expression: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(expression.trim()) {
        return Some(dt.with_timezone(&Utc));
    }
    scan(expression).resolve(reference, tz)
}

/// RFC 3339 with a `Z` suffix, second precision.
pub fn to_rfc3339_utc(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Short local rendering for notifications and CLI output.
pub fn format_local(dt: DateTime<Utc>, tz: Tz) -> String {
    dt.with_timezone(&tz).format("%a %b %-d %H:%M").to_string()
}

type Build = fn(&Captures<'_>) -> Vec<Fragment>;

const PRE: &str = r"(?:\b(?:by|on|at|before|due|until|till|to|from|around)\s+)?";
const NUM: &str = r"\d+(?:\.\d+)?|half\s+an?|an?|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|fifteen|twenty|thirty|forty[- ]five|forty|sixty|ninety";

fn re(pattern: &str) -> Regex {
    let p = pattern.replace("<pre>", PRE).replace("<num>", NUM);
    Regex::new(&format!("(?i){p}")).expect("temporal pattern is valid")
}

// Order matters: earlier rules claim text first.
static RULES: LazyLock<Vec<(Regex, Build)>> = LazyLock::new(|| {
    vec![
        (
            re(r"<pre>\b(\d{4}-\d{2}-\d{2})(?:[t ](\d{2}:\d{2}(?::\d{2})?)(?:\.\d+)?(z|[+-]\d{2}:?\d{2})?)?\b"),
            iso as Build,
        ),
        (re(r"\bin\s+(<num>)\s+(minutes?|mins?|hours?|hrs?|days?|weeks?)\b"), offset as Build),
        (re(r"\bfor\s+(<num>)\s+(minutes?|mins?|hours?|hrs?)\b"), length as Build),
        (re(r"<pre>\b(\d{1,2})(?::([0-5]\d))?\s*(a\.m\.|p\.m\.|am\b|pm\b)"), clock12 as Build),
        (re(r"<pre>\b([01]?\d|2[0-3]):([0-5]\d)\b"), clock24 as Build),
        (
            re(r"<pre>\b(noon|midday|midnight|end\s+of\s+(?:the\s+)?day|eod|close\s+of\s+business|cob)\b"),
            named_time as Build,
        ),
        (
            re(r"<pre>\b((?:the\s+)?day\s+after\s+tomorrow|today|tonight|tomorrow|tmrw|tmr|next\s+week|(?:this\s+)?weekend)\b"),
            day_word as Build,
        ),
        (
            re(r"<pre>\b(?:(next|this|coming)\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tues?|wed|thu(?:rs?)?|fri)\b"),
            weekday as Build,
        ),
        (re(r"\b(?:this\s+|in\s+the\s+|at\s+)?(morning|afternoon|evening|night)\b"), part_of_day as Build),
    ]
});

/// Find every temporal phrase in `text`. Spans never overlap.
pub fn scan(text: &str) -> TemporalScan {
    let mut out = TemporalScan::default();
    for (rule, build) in RULES.iter() {
        for caps in rule.captures_iter(text) {
            let Some(m) = caps.get(0) else { continue };
            let range = m.range();
            if out.overlaps(&range) {
                continue;
            }
            for fragment in build(&caps) {
                out.spans.push(Span {
                    range: range.clone(),
                    fragment,
                });
            }
        }
    }
    out.spans.sort_by_key(|s| s.range.start);
    out
}

fn group<'t>(c: &Captures<'t>, i: usize) -> Option<&'t str> {
    c.get(i).map(|m| m.as_str())
}

fn iso(c: &Captures<'_>) -> Vec<Fragment> {
    let Some(date) = group(c, 1).and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()) else {
        return vec![];
    };
    let Some(time) = group(c, 2).and_then(parse_hms) else {
        return vec![Fragment::Day(DayRef::Date(date))];
    };
    match group(c, 3) {
        Some(off) => parse_offset(off)
            .and_then(|o| o.from_local_datetime(&date.and_time(time)).single())
            .map(|dt| vec![Fragment::Instant(dt.with_timezone(&Utc))])
            .unwrap_or_default(),
        None => vec![Fragment::Day(DayRef::Date(date)), Fragment::Clock(time)],
    }
}

fn parse_hms(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

fn parse_offset(s: &str) -> Option<FixedOffset> {
    if s.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0);
    }
    let sign = if s.starts_with('-') { -1 } else { 1 };
    let digits: String = s.chars().filter(char::is_ascii_digit).collect();
    if digits.len() != 4 {
        return None;
    }
    let h: i32 = digits[..2].parse().ok()?;
    let m: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (h * 3600 + m * 60))
}

/// Numbers as people say them: "2", "1.5", "an", "half an", "ninety".
pub fn spoken_amount(word: &str) -> Option<f64> {
    let w = word.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    if let Ok(n) = w.parse::<f64>() {
        return Some(n);
    }
    let n = match w.as_str() {
        "a" | "an" | "one" => 1.0,
        "half a" | "half an" => 0.5,
        "two" => 2.0,
        "three" => 3.0,
        "four" => 4.0,
        "five" => 5.0,
        "six" => 6.0,
        "seven" => 7.0,
        "eight" => 8.0,
        "nine" => 9.0,
        "ten" => 10.0,
        "eleven" => 11.0,
        "twelve" => 12.0,
        "fifteen" => 15.0,
        "twenty" => 20.0,
        "thirty" => 30.0,
        "forty" => 40.0,
        "forty-five" | "forty five" => 45.0,
        "sixty" => 60.0,
        "ninety" => 90.0,
        _ => return None,
    };
    Some(n)
}

fn amount_duration(amount: &str, unit: &str) -> Option<Duration> {
    let n = spoken_amount(amount)?;
    let unit = unit.to_lowercase();
    let secs = if unit.starts_with("min") {
        60.0
    } else if unit.starts_with('h') {
        3600.0
    } else if unit.starts_with('d') {
        86_400.0
    } else if unit.starts_with('w') {
        604_800.0
    } else {
        return None;
    };
    let total = (n * secs).round();
    // Past i64 range the cast saturates; try_seconds rejects anything chrono cannot hold.
    if !total.is_finite() || total <= 0.0 || total >= i64::MAX as f64 {
        return None;
    }
    Duration::try_seconds(total as i64)
}

fn offset(c: &Captures<'_>) -> Vec<Fragment> {
    match (group(c, 1), group(c, 2)) {
        (Some(a), Some(u)) => amount_duration(a, u).map(Fragment::Offset).into_iter().collect(),
        _ => vec![],
    }
}

fn length(c: &Captures<'_>) -> Vec<Fragment> {
    match (group(c, 1), group(c, 2)) {
        (Some(a), Some(u)) => amount_duration(a, u).map(Fragment::Length).into_iter().collect(),
        _ => vec![],
    }
}

fn clock12(c: &Captures<'_>) -> Vec<Fragment> {
    let Some(hour) = group(c, 1).and_then(|h| h.parse::<u32>().ok()) else {
        return vec![];
    };
    if !(1..=12).contains(&hour) {
        return vec![];
    }
    let minute = group(c, 2).and_then(|m| m.parse::<u32>().ok()).unwrap_or(0);
    let pm = group(c, 3).is_some_and(|s| s.to_lowercase().starts_with('p'));
    let hour = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
        .map(Fragment::Clock)
        .into_iter()
        .collect()
}

fn clock24(c: &Captures<'_>) -> Vec<Fragment> {
    let hour = group(c, 1).and_then(|h| h.parse::<u32>().ok());
    let minute = group(c, 2).and_then(|m| m.parse::<u32>().ok());
    match (hour, minute) {
        (Some(h), Some(m)) => NaiveTime::from_hms_opt(h, m, 0)
            .map(Fragment::Clock)
            .into_iter()
            .collect(),
        _ => vec![],
    }
}

fn named_time(c: &Captures<'_>) -> Vec<Fragment> {
    let word = group(c, 1).unwrap_or_default().to_lowercase();
    let t = match word.as_str() {
        "noon" | "midday" => hm(12, 0),
        "midnight" => end_of_today(),
        _ => hm(17, 0),
    };
    vec![Fragment::Clock(t)]
}

fn day_word(c: &Captures<'_>) -> Vec<Fragment> {
    let word = group(c, 1)
        .unwrap_or_default()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    match word.as_str() {
        "today" => vec![Fragment::Day(DayRef::Today)],
        "tonight" => vec![Fragment::Day(DayRef::Today), Fragment::PartOfDay(hm(20, 0))],
        "tomorrow" | "tmrw" | "tmr" => vec![Fragment::Day(DayRef::Tomorrow)],
        "next week" => vec![Fragment::Day(DayRef::NextWeek)],
        "weekend" | "this weekend" => vec![Fragment::Day(DayRef::Weekday {
            day: Weekday::Sat,
            skip_today: false,
        })],
        _ => vec![Fragment::Day(DayRef::DayAfterTomorrow)],
    }
}

fn weekday(c: &Captures<'_>) -> Vec<Fragment> {
    let skip_today = group(c, 1).is_some_and(|q| q.eq_ignore_ascii_case("next"));
    let name = group(c, 2).unwrap_or_default().to_lowercase();
    let day = match &name[..name.len().min(3)] {
        "mon" => Weekday::Mon,
        "tue" => Weekday::Tue,
        "wed" => Weekday::Wed,
        "thu" => Weekday::Thu,
        "fri" => Weekday::Fri,
        "sat" => Weekday::Sat,
        "sun" => Weekday::Sun,
        _ => return vec![],
    };
    vec![Fragment::Day(DayRef::Weekday { day, skip_today })]
}

fn part_of_day(c: &Captures<'_>) -> Vec<Fragment> {
    let t = match group(c, 1).unwrap_or_default().to_lowercase().as_str() {
        "morning" => hm(9, 0),
        "afternoon" => hm(14, 0),
        "evening" => hm(18, 0),
        _ => hm(20, 0),
    };
    vec![Fragment::PartOfDay(t)]
}
