use crate::conversation::{ConversationState, SelfCorrectionEntry};
use crate::topic::leading_keyword;
use chrono::Utc;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use std::fmt;

const MIN_QUESTION_CHARS: usize = 20;

const COMPLEXITY_MARKERS: &[&str] = &[
    "furthermore",
    "moreover",
    "additionally",
    "nevertheless",
    "consequently",
    "notwithstanding",
    "in addition to",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewIssue {
    Malformed,
    TooComplexForIntro,
    OffTopic,
    CompoundQuestion,
}

impl fmt::Display for ReviewIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ReviewIssue::Malformed => "too vague/malformed",
            ReviewIssue::TooComplexForIntro => "too complex for intro depth",
            ReviewIssue::OffTopic => "off-topic",
            ReviewIssue::CompoundQuestion => "compound question",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewOutcome {
    pub had_issue: bool,
    /// The first issue found, which is the one reported.
    pub issue: Option<ReviewIssue>,
    /// Every issue found, kept for the telemetry log.
    pub all_issues: Vec<ReviewIssue>,
}

/// A read-only quality gate over a question a persona asked.
///
/// Implementations never rewrite the question. The orchestrator only records
/// what they report.
#[cfg_attr(test, automock)]
pub trait QuestionReviewer: Send + Sync {
    fn review(&self, text: &str, topic: &str, depth: u8) -> ReviewOutcome;
}

/// Rule-based reviewer. Checks run in a fixed order and the first hit is the
/// reported issue.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfCorrectionReviewer;

impl QuestionReviewer for SelfCorrectionReviewer {
    fn review(&self, text: &str, topic: &str, depth: u8) -> ReviewOutcome {
        let lower = text.to_lowercase();
        let question_marks = text.matches('?').count();
        let mut issues = Vec::new();

        if text.trim().chars().count() < MIN_QUESTION_CHARS || question_marks == 0 {
            issues.push(ReviewIssue::Malformed);
        }
        if depth == 1 && COMPLEXITY_MARKERS.iter().any(|m| lower.contains(m)) {
            issues.push(ReviewIssue::TooComplexForIntro);
        }
        let keyword = leading_keyword(topic);
        if !keyword.is_empty() && !lower.contains(&keyword) {
            issues.push(ReviewIssue::OffTopic);
        }
        if question_marks > 1 {
            issues.push(ReviewIssue::CompoundQuestion);
        }

        ReviewOutcome {
            had_issue: !issues.is_empty(),
            issue: issues.first().copied(),
            all_issues: issues,
        }
    }
}

/// Reviews the question against the state's current topic and depth, and
/// appends to the self-correction log when anything is flagged.
pub fn review_and_log<R: QuestionReviewer + ?Sized>(
    reviewer: &R,
    state: &mut ConversationState,
    question: &str,
) -> ReviewOutcome {
    let topic = state.current_topic.clone().unwrap_or_default();
    let depth = state.depth_level();
    let outcome = reviewer.review(question, &topic, depth);
    if let Some(issue) = outcome.issue {
        tracing::debug!(
            session = %state.session_id,
            %issue,
            topic = %topic,
            depth,
            "question flagged by self-correction review"
        );
        state.record_self_correction(SelfCorrectionEntry {
            question: question.to_string(),
            topic,
            depth,
            issues: outcome.all_issues.clone(),
            at: Utc::now(),
        });
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::CandidateSummary;
    use crate::persona::default_roster;
    use std::time::Duration;

    #[test]
    fn test_good_question_passes() {
        let outcome = SelfCorrectionReviewer.review(
            "How would you approach the system design for a chat service?",
            "System Design",
            2,
        );
        assert_eq!(outcome, ReviewOutcome::default());
    }

    #[test]
    fn test_short_text_is_malformed() {
        let outcome = SelfCorrectionReviewer.review("Why?", "System Design", 2);
        assert_eq!(outcome.issue, Some(ReviewIssue::Malformed));
        assert!(outcome.all_issues.contains(&ReviewIssue::OffTopic));
    }

    #[test]
    fn test_complexity_markers_only_matter_at_intro_depth() {
        let text = "Moreover, what tradeoffs did your system design make under load?";
        let intro = SelfCorrectionReviewer.review(text, "System Design", 1);
        assert_eq!(intro.issue, Some(ReviewIssue::TooComplexForIntro));
        let deeper = SelfCorrectionReviewer.review(text, "System Design", 3);
        assert!(!deeper.had_issue);
    }

    #[test]
    fn test_compound_question_is_flagged_last() {
        let outcome = SelfCorrectionReviewer.review(
            "What was the leadership challenge? And how did you resolve it?",
            "Leadership",
            2,
        );
        assert_eq!(outcome.issue, Some(ReviewIssue::CompoundQuestion));
        assert_eq!(outcome.all_issues, vec![ReviewIssue::CompoundQuestion]);
    }

    #[test]
    fn test_review_and_log_appends_only_on_issue() {
        let mut state = ConversationState::new(
            CandidateSummary::default(),
            default_roster(),
            Duration::from_secs(60),
        )
        .unwrap();
        state.current_topic = Some("Teamwork".to_string());

        let mut reviewer = MockQuestionReviewer::new();
        reviewer
            .expect_review()
            .withf(|_, topic, depth| topic.to_string() == "Teamwork" && *depth == 1)
            .times(2)
            .returning(|text, _, _| {
                if text.ends_with('?') {
                    ReviewOutcome::default()
                } else {
                    ReviewOutcome {
                        had_issue: true,
                        issue: Some(ReviewIssue::Malformed),
                        all_issues: vec![ReviewIssue::Malformed],
                    }
                }
            });

        review_and_log(&reviewer, &mut state, "Tell me about your team?");
        assert!(state.self_correction_log().is_empty());

        let outcome = review_and_log(&reviewer, &mut state, "Okay");
        assert_eq!(outcome.issue, Some(ReviewIssue::Malformed));
        assert_eq!(state.self_correction_log().len(), 1);
        assert_eq!(state.self_correction_log()[0].topic, "Teamwork");
    }
}
