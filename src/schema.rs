use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub text: String,
    pub log_id: Option<String>,
    pub source: Option<String>,
}

/// Entries for one user, sorted by time, never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub entries: Vec<LogEntry>,
}

impl Conversation {
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.entries.first().map(|entry| entry.timestamp)
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.entries.last().map(|entry| entry.timestamp)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn transcript(&self) -> String {
        self.entries
            .iter()
            .map(|entry| match (entry.direction, &entry.log_id) {
                (Direction::User, Some(log_id)) => format!("User ({}): {}", log_id, entry.text),
                (Direction::User, None) => format!("User: {}", entry.text),
                (Direction::Bot, _) => format!("System: {}", entry.text),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn label(&self) -> &'static str {
        match self {
            Sentiment::Positive => "Positive",
            Sentiment::Neutral => "Neutral",
            Sentiment::Negative => "Negative",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub text: String,
    #[serde(default)]
    pub log_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    pub conversation_id: String,
    pub sentiment: Sentiment,
    pub pain_points: Vec<Finding>,
    pub highlights: Vec<Finding>,
    pub themes: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SentimentCounts {
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

impl SentimentCounts {
    pub fn record(&mut self, sentiment: Sentiment) {
        match sentiment {
            Sentiment::Positive => self.positive += 1,
            Sentiment::Neutral => self.neutral += 1,
            Sentiment::Negative => self.negative += 1,
        }
    }

    pub fn get(&self, sentiment: Sentiment) -> usize {
        match sentiment {
            Sentiment::Positive => self.positive,
            Sentiment::Neutral => self.neutral,
            Sentiment::Negative => self.negative,
        }
    }

    pub fn total(&self) -> usize {
        self.positive + self.neutral + self.negative
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThemeCount {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub total_conversations: usize,
    pub analyzed_conversations: usize,
    pub sentiment: SentimentCounts,
    pub themes: Vec<ThemeCount>,
    pub highlights: Vec<Finding>,
    pub pain_points: Vec<Finding>,
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportArtifact {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// The time range a run reports on, labelled with its report date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindow {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportWindow {
    /// The whole UTC calendar day.
    pub fn for_day(date: NaiveDate) -> Self {
        let start = date.and_time(chrono::NaiveTime::MIN).and_utc();
        Self {
            date,
            start,
            end: start + chrono::Duration::days(1),
        }
    }

    /// The `lookback` period ending at `now`, reported under `now`'s date.
    pub fn trailing(now: DateTime<Utc>, lookback: chrono::Duration) -> Self {
        Self {
            date: now.date_naive(),
            start: now - lookback,
            end: now,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(direction: Direction, text: &str, log_id: Option<&str>) -> LogEntry {
        LogEntry {
            user_id: "u1".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
            direction,
            text: text.into(),
            log_id: log_id.map(String::from),
            source: None,
        }
    }

    #[test]
    fn test_transcript_format() {
        let conv = Conversation {
            id: "conv_1".into(),
            user_id: "u1".into(),
            entries: vec![
                entry(Direction::User, "where is my order?", Some("log_abc")),
                entry(Direction::Bot, "It ships today.", Some("log_abc")),
                entry(Direction::User, "thanks", None),
            ],
        };
        assert_eq!(
            conv.transcript(),
            "User (log_abc): where is my order?\nSystem: It ships today.\nUser: thanks"
        );
    }

    #[test]
    fn test_bounds_of_hand_built_conversation() {
        let mut conv = Conversation {
            id: "conv_1".into(),
            user_id: "u1".into(),
            entries: Vec::new(),
        };
        assert_eq!(conv.started_at(), None);
        assert_eq!(conv.ended_at(), None);

        let mut later = entry(Direction::User, "still there?", None);
        later.timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        conv.entries = vec![entry(Direction::User, "hello", None), later];
        assert_eq!(conv.started_at(), Some(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()));
        assert_eq!(conv.ended_at(), Some(Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()));
    }

    #[test]
    fn test_window_for_day() {
        let window = ReportWindow::for_day(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert!(window.contains(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()));
        assert!(window.contains(Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 59).unwrap()));
        assert!(!window.contains(Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_trailing_window() {
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 6, 0, 0).unwrap();
        let window = ReportWindow::trailing(now, chrono::Duration::hours(24));
        assert_eq!(window.date, NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap());
        assert!(!window.contains(now));
    }

    #[test]
    fn test_sentiment_counts() {
        let mut counts = SentimentCounts::default();
        counts.record(Sentiment::Positive);
        counts.record(Sentiment::Negative);
        counts.record(Sentiment::Negative);
        assert_eq!(counts.get(Sentiment::Negative), 2);
        assert_eq!(counts.total(), 3);
    }
}
