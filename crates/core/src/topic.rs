use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::BTreeSet;

/// Which kind of question pool a topic comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicBucket {
    Technical,
    Behavioral,
    Domain,
}

struct BucketRule {
    bucket: TopicBucket,
    role_keywords: &'static [&'static str],
    topics: &'static [&'static str],
}

const RULES: &[BucketRule] = &[
    BucketRule {
        bucket: TopicBucket::Technical,
        role_keywords: &[
            "engineer", "engineering", "developer", "programmer", "software", "devops", "sre",
            "architect", "backend", "frontend", "fullstack",
        ],
        topics: &[
            "System Design",
            "Debugging Approach",
            "Code Quality",
            "Performance Optimization",
            "Technical Tradeoffs",
        ],
    },
    BucketRule {
        bucket: TopicBucket::Domain,
        role_keywords: &["data", "analyst", "scientist", "analytics", "machine learning"],
        topics: &[
            "Data Modeling",
            "Experiment Design",
            "Statistical Reasoning",
            "Pipeline Reliability",
        ],
    },
    BucketRule {
        bucket: TopicBucket::Domain,
        role_keywords: &["product", "manager", "owner", "pm", "program"],
        topics: &[
            "Product Strategy",
            "Prioritization",
            "Stakeholder Management",
            "Metrics Definition",
        ],
    },
    BucketRule {
        bucket: TopicBucket::Domain,
        role_keywords: &["design", "designer", "ux", "ui", "researcher"],
        topics: &["Design Process", "User Research", "Design Critique"],
    },
    BucketRule {
        bucket: TopicBucket::Domain,
        role_keywords: &["sales", "account", "marketing", "customer"],
        topics: &["Customer Discovery", "Pipeline Management", "Negotiation"],
    },
];

const BEHAVIORAL_TOPICS: &[&str] = &[
    "Teamwork",
    "Conflict Resolution",
    "Leadership",
    "Failure and Learning",
    "Communication",
];

const FALLBACK_TOPIC: &str = "Background and Motivation";

/// Score a topic name must reach against free text to count as mentioned.
const MENTION_THRESHOLD: i64 = 70;

/// The topics one interview draws from, derived from the target role.
pub struct TopicPool {
    topics: Vec<(TopicBucket, String)>,
    matcher: SkimMatcherV2,
}

impl TopicPool {
    pub fn new(topics: Vec<(TopicBucket, String)>) -> Self {
        Self {
            topics,
            matcher: SkimMatcherV2::default(),
        }
    }

    /// Technical and domain buckets whose keywords appear in the role, plus
    /// the behavioral bucket which every interview gets.
    pub fn for_role(target_role: &str) -> Self {
        let role = target_role.to_lowercase();
        let words: Vec<&str> = role
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let mut topics = Vec::new();
        for rule in RULES {
            let matched = rule.role_keywords.iter().any(|kw| {
                if kw.contains(' ') {
                    role.contains(kw)
                } else {
                    words.contains(kw)
                }
            });
            if matched {
                topics.extend(rule.topics.iter().map(|t| (rule.bucket, t.to_string())));
            }
        }
        topics.extend(
            BEHAVIORAL_TOPICS
                .iter()
                .map(|t| (TopicBucket::Behavioral, t.to_string())),
        );
        Self::new(topics)
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(|(_, t)| t.as_str())
    }

    pub fn bucket_of(&self, topic: &str) -> Option<TopicBucket> {
        self.topics
            .iter()
            .find(|(_, t)| t == topic)
            .map(|(bucket, _)| *bucket)
    }

    /// Picks a topic not yet covered, or revisits a random one once all are.
    pub fn pick<R: Rng + ?Sized>(&self, covered: &BTreeSet<String>, rng: &mut R) -> String {
        let uncovered: Vec<&str> = self.topics().filter(|t| !covered.contains(*t)).collect();
        if let Some(topic) = uncovered.choose(rng) {
            return topic.to_string();
        }
        let all: Vec<&str> = self.topics().collect();
        all.choose(rng)
            .map(|t| t.to_string())
            .unwrap_or_else(|| FALLBACK_TOPIC.to_string())
    }

    /// Maps free text (for example a hint's suggested topic) onto the best
    /// matching pool topic.
    pub fn resolve(&self, text: &str) -> Option<&str> {
        let text_lower = text.to_lowercase();
        self.topics
            .iter()
            .filter_map(|(_, topic)| {
                self.matcher
                    .fuzzy_match(&text_lower, &topic.to_lowercase())
                    .filter(|score| *score > MENTION_THRESHOLD)
                    .map(|score| (score, topic.as_str()))
            })
            .max_by_key(|(score, _)| *score)
            .map(|(_, topic)| topic)
    }
}

/// First word of a topic, lowercased. A question about the topic is expected
/// to mention it.
pub fn leading_keyword(topic: &str) -> String {
    topic
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_lowercase()
}
