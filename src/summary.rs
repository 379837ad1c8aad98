use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use chrono::NaiveDate;

use crate::schema::{AnalysisResult, DailySummary, Finding, Sentiment, SentimentCounts, ThemeCount};

pub const REPORT_TITLE: &str = "LOG ANALYSIS REPORT";
pub const SECTION_SUCCESSES: &str = "SUCCESSFUL INTERACTIONS";
pub const SECTION_PAIN_POINTS: &str = "USER PAIN POINTS/FRUSTRATIONS";
pub const SECTION_THEMES: &str = "COMMON THEMES/PATTERNS";
pub const SECTION_SENTIMENT: &str = "USER SENTIMENT SUMMARY";
pub const SECTION_SKIPPED: &str = "SKIPPED CONVERSATIONS";

const NONE_RECORDED: &str = "- None recorded";

#[derive(Debug, Clone, Copy)]
pub struct SummaryLimits {
    pub max_highlights: usize,
    pub max_pain_points: usize,
}

impl Default for SummaryLimits {
    fn default() -> Self {
        Self {
            max_highlights: 5,
            max_pain_points: 5,
        }
    }
}

/// Joins runs of whitespace, newlines included, into single spaces so a
/// label always stays on one report line.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Longest excerpts first; equal lengths keep first-seen order.
fn top_findings<'a, I>(findings: I, limit: usize) -> Vec<Finding>
where
    I: Iterator<Item = &'a Finding>,
{
    let mut seen = HashSet::new();
    let mut unique: Vec<&Finding> = findings
        .filter(|f| !f.text.trim().is_empty())
        .filter(|f| seen.insert(f.text.trim().to_lowercase()))
        .collect();
    unique.sort_by(|a, b| b.text.trim().len().cmp(&a.text.trim().len()));
    unique.into_iter().take(limit).cloned().collect()
}

/// Counts each theme once per conversation, merging labels that differ only
/// in case or whitespace. The first spelling seen is kept.
fn rank_themes(results: &[AnalysisResult]) -> Vec<ThemeCount> {
    let mut order: Vec<ThemeCount> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for result in results {
        let mut in_this_conversation = HashSet::new();
        for label in &result.themes {
            let label = collapse_whitespace(label);
            if label.is_empty() {
                continue;
            }
            let key = label.to_lowercase();
            if !in_this_conversation.insert(key.clone()) {
                continue;
            }
            match index.get(&key) {
                Some(&i) => order[i].count += 1,
                None => {
                    index.insert(key, order.len());
                    order.push(ThemeCount {
                        label,
                        count: 1,
                    });
                }
            }
        }
    }

    // Stable: ties stay in first-seen order
    order.sort_by(|a, b| b.count.cmp(&a.count));
    order
}

pub fn build_summary(
    date: NaiveDate,
    total_conversations: usize,
    results: &[AnalysisResult],
    skipped: &[String],
    limits: SummaryLimits,
) -> DailySummary {
    let mut sentiment = SentimentCounts::default();
    for result in results {
        sentiment.record(result.sentiment);
    }

    DailySummary {
        date,
        total_conversations,
        analyzed_conversations: results.len(),
        sentiment,
        themes: rank_themes(results),
        highlights: top_findings(results.iter().flat_map(|r| r.highlights.iter()), limits.max_highlights),
        pain_points: top_findings(results.iter().flat_map(|r| r.pain_points.iter()), limits.max_pain_points),
        skipped: skipped.to_vec(),
    }
}

fn write_findings(out: &mut String, findings: &[Finding]) {
    if findings.is_empty() {
        let _ = writeln!(out, "{NONE_RECORDED}");
        return;
    }
    for finding in findings {
        let text = collapse_whitespace(&finding.text);
        match &finding.log_id {
            Some(log_id) => {
                let _ = writeln!(out, "- {text} ({log_id})");
            }
            None => {
                let _ = writeln!(out, "- {text}");
            }
        }
    }
}

impl DailySummary {
    pub fn is_empty_day(&self) -> bool {
        self.total_conversations == 0
    }

    /// The plain-text report the PDF is rendered from. Section headings are
    /// the only all-caps lines.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{REPORT_TITLE} - {}", self.date.format("%Y-%m-%d"));
        let _ = writeln!(
            out,
            "Conversations: {} (analyzed {}, skipped {})",
            self.total_conversations,
            self.analyzed_conversations,
            self.skipped.len()
        );
        if self.is_empty_day() {
            let _ = writeln!(out, "No conversations were recorded for this day.");
        }

        let _ = writeln!(out, "{SECTION_SUCCESSES}");
        write_findings(&mut out, &self.highlights);

        let _ = writeln!(out, "{SECTION_PAIN_POINTS}");
        write_findings(&mut out, &self.pain_points);

        let _ = writeln!(out, "{SECTION_THEMES}");
        if self.themes.is_empty() {
            let _ = writeln!(out, "{NONE_RECORDED}");
        }
        for theme in &self.themes {
            let _ = writeln!(out, "- {} ({})", theme.label, theme.count);
        }

        let _ = writeln!(out, "{SECTION_SENTIMENT}");
        for sentiment in [Sentiment::Positive, Sentiment::Neutral, Sentiment::Negative] {
            let _ = writeln!(out, "- {}: {}", sentiment.label(), self.sentiment.get(sentiment));
        }

        if !self.skipped.is_empty() {
            let _ = writeln!(out, "{SECTION_SKIPPED}");
            for id in &self.skipped {
                let _ = writeln!(out, "- {id}");
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn finding(text: &str, log_id: Option<&str>) -> Finding {
        Finding {
            text: text.into(),
            log_id: log_id.map(String::from),
        }
    }

    fn result(id: &str, sentiment: Sentiment, themes: &[&str], highlights: Vec<Finding>) -> AnalysisResult {
        AnalysisResult {
            conversation_id: id.into(),
            sentiment,
            pain_points: Vec::new(),
            highlights,
            themes: themes.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_empty_day() {
        let summary = build_summary(date(), 0, &[], &[], SummaryLimits::default());
        assert_eq!(summary.total_conversations, 0);
        assert_eq!(summary.sentiment.total(), 0);
        assert!(summary.themes.is_empty());

        let text = summary.to_text();
        assert!(text.starts_with("LOG ANALYSIS REPORT - 2024-05-01"));
        assert!(text.contains("No conversations were recorded"));
        assert!(text.contains("- Positive: 0"));
        assert!(!text.contains(SECTION_SKIPPED));
    }

    #[test]
    fn test_sentiment_distribution() {
        let results = vec![
            result("conv_1", Sentiment::Positive, &[], vec![]),
            result("conv_2", Sentiment::Negative, &[], vec![]),
            result("conv_3", Sentiment::Positive, &[], vec![]),
        ];
        let summary = build_summary(date(), 4, &results, &["conv_4".into()], SummaryLimits::default());
        assert_eq!(summary.sentiment.positive, 2);
        assert_eq!(summary.sentiment.negative, 1);
        assert_eq!(summary.sentiment.neutral, 0);
        assert_eq!(summary.analyzed_conversations, 3);
        assert_eq!(summary.skipped, ["conv_4"]);
        assert!(summary.to_text().contains("SKIPPED CONVERSATIONS\n- conv_4"));
    }

    #[test]
    fn test_theme_ranking_and_dedup() {
        let results = vec![
            result("conv_1", Sentiment::Neutral, &["Billing", "shipping delay", "billing"], vec![]),
            result("conv_2", Sentiment::Neutral, &["login", " billing "], vec![]),
            result("conv_3", Sentiment::Neutral, &["Login", "refunds"], vec![]),
        ];
        let summary = build_summary(date(), 3, &results, &[], SummaryLimits::default());
        let ranked: Vec<(&str, usize)> = summary.themes.iter().map(|t| (t.label.as_str(), t.count)).collect();
        assert_eq!(
            ranked,
            [("Billing", 2), ("login", 2), ("shipping delay", 1), ("refunds", 1)]
        );
    }

    #[test]
    fn test_multiline_theme_stays_on_one_line() {
        let results = vec![
            result("conv_1", Sentiment::Negative, &["billing\nREFUND ISSUES"], vec![]),
            result("conv_2", Sentiment::Negative, &["Billing  refund issues"], vec![]),
        ];
        let summary = build_summary(date(), 2, &results, &[], SummaryLimits::default());
        assert_eq!(summary.themes, [ThemeCount { label: "billing REFUND ISSUES".into(), count: 2 }]);

        let text = summary.to_text();
        assert!(text.contains("- billing REFUND ISSUES (2)"));
        assert!(!text.lines().any(|line| line.starts_with("REFUND")));
    }

    #[test]
    fn test_highlight_cap_and_salience() {
        let results = vec![
            result(
                "conv_1",
                Sentiment::Positive,
                &[],
                vec![finding("short", None), finding("a much longer excerpt", Some("log_1"))],
            ),
            result(
                "conv_2",
                Sentiment::Positive,
                &[],
                vec![finding("tiny", None), finding("medium one", None), finding("equal", None)],
            ),
        ];
        let limits = SummaryLimits {
            max_highlights: 3,
            max_pain_points: 3,
        };
        let summary = build_summary(date(), 2, &results, &[], limits);
        let texts: Vec<&str> = summary.highlights.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(texts, ["a much longer excerpt", "medium one", "short"]);
        assert!(summary.to_text().contains("- a much longer excerpt (log_1)"));
    }

    #[test]
    fn test_build_is_idempotent() {
        let results = vec![
            result("conv_1", Sentiment::Positive, &["a", "b"], vec![finding("x", None)]),
            result("conv_2", Sentiment::Negative, &["b", "c"], vec![finding("y", None)]),
        ];
        let first = build_summary(date(), 2, &results, &[], SummaryLimits::default());
        let second = build_summary(date(), 2, &results, &[], SummaryLimits::default());
        assert_eq!(first, second);
        assert_eq!(first.to_text(), second.to_text());
    }
}
