use crate::advisory::Hint;
use crate::conversation::{ConversationState, MAX_DEPTH, MIN_DEPTH};
use crate::instructions::InstructionBuilder;
use crate::topic::TopicPool;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

const HEDGING_PHRASES: &[&str] = &[
    "maybe",
    "not sure",
    "i don't know",
    "i dont know",
    "i guess",
    "probably",
    "kind of",
    "sort of",
    "i think",
];

const EXAMPLE_MARKERS: &[&str] = &["for example", "for instance", "such as", "specifically", "when i"];

const PROBEABLE_MARKERS: &[&str] = &["project", "experience", "challenge", "example"];

/// Chance that a new topic goes to the persona whose focus matches it.
const FOCUS_WEIGHT: f64 = 0.7;

const COMPLETE_ANSWER_WORDS: f64 = 50.0;

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerAnalysis {
    pub word_count: usize,
    pub completeness: f64,
    pub quality: f64,
    pub has_probeable_content: bool,
    pub should_follow_up: bool,
    pub confidence: f64,
}

/// Scores the participant's last answer at the current depth.
///
/// With no answer at all the defaults open a new topic at low confidence.
pub fn analyze_answer(answer: Option<&str>, depth: u8) -> AnswerAnalysis {
    let Some(answer) = answer.map(str::trim).filter(|a| !a.is_empty()) else {
        return AnswerAnalysis {
            word_count: 0,
            completeness: 0.0,
            quality: 0.5,
            has_probeable_content: false,
            should_follow_up: false,
            confidence: 0.3,
        };
    };

    let lower = answer.to_lowercase();
    let word_count = answer.split_whitespace().count();
    let completeness = (word_count as f64 / COMPLETE_ANSWER_WORDS).min(1.0);

    let mut quality: f64 = 0.5;
    if EXAMPLE_MARKERS.iter().any(|m| lower.contains(m)) || answer.chars().any(|c| c.is_ascii_digit()) {
        quality += 0.3;
    }
    if word_count > 30 {
        quality += 0.2;
    }
    if HEDGING_PHRASES.iter().any(|h| lower.contains(h)) {
        quality -= 0.3;
    }
    let quality = quality.clamp(0.0, 1.0);

    let has_probeable_content = PROBEABLE_MARKERS.iter().any(|m| lower.contains(m));
    let should_follow_up = completeness < 0.6
        || (quality > 0.8 && depth < MAX_DEPTH)
        || (has_probeable_content && depth < 3)
        || depth < 2;

    AnswerAnalysis {
        word_count,
        completeness,
        quality,
        has_probeable_content,
        should_follow_up,
        confidence: (0.4 + 0.3 * completeness + 0.3 * quality).clamp(0.0, 1.0),
    }
}

/// What the panel asks next and who asks it.
#[derive(Debug, Clone, PartialEq)]
pub struct NextQuestion {
    pub persona_index: usize,
    pub topic: String,
    pub depth: u8,
    pub follow_up: bool,
    /// Full system instruction, used when a new persona session is opened.
    pub instruction: String,
    /// Just the steering part, for the persona that is already live.
    pub guidance: String,
    pub hint_applied: bool,
}

/// Decides topic, depth and persona from the last answer.
///
/// The randomness source is injectable so tests can seed it.
pub struct TurnSelector<R: Rng = StdRng> {
    pool: TopicPool,
    rng: R,
    hint_floor: f64,
}

impl TurnSelector<StdRng> {
    pub fn for_role(target_role: &str, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new(TopicPool::for_role(target_role), rng)
    }
}

impl<R: Rng> TurnSelector<R> {
    pub fn new(pool: TopicPool, rng: R) -> Self {
        Self {
            pool,
            rng,
            hint_floor: 0.6,
        }
    }

    /// Minimum hint confidence before a hint may steer a topic switch.
    pub fn with_hint_floor(mut self, floor: f64) -> Self {
        self.hint_floor = floor;
        self
    }

    /// Picks the next question and records it in `state`.
    ///
    /// A follow-up keeps the persona and topic and goes one level deeper.
    /// Otherwise a new topic is opened at depth 1. A confident hint may name
    /// that topic and persona but never cancels a follow-up.
    pub fn determine_next_question(
        &mut self,
        state: &mut ConversationState,
        hint: Option<&Hint>,
        closing: bool,
    ) -> NextQuestion {
        let answer = state.last_participant_turn().map(|t| t.text.clone());
        let analysis = analyze_answer(answer.as_deref(), state.depth_level());
        let usable_hint = hint.filter(|h| h.confidence >= self.hint_floor);

        let (persona_index, topic, depth, follow_up, hint_applied) = match state.current_topic.clone() {
            Some(topic) if analysis.should_follow_up => {
                let depth = state.depth_level().saturating_add(1).min(MAX_DEPTH);
                (state.active_persona_index, topic, depth, true, false)
            }
            _ => {
                let hinted_topic = usable_hint
                    .and_then(|h| self.pool.resolve(&h.suggested_topic))
                    .map(str::to_string);
                let hinted_persona = usable_hint
                    .and_then(|h| h.suggested_persona_index)
                    .filter(|i| *i < state.personas().len());
                let hint_applied = hinted_topic.is_some() || hinted_persona.is_some();

                let topic = match hinted_topic {
                    Some(topic) => topic,
                    None => self.pool.pick(state.topics_covered(), &mut self.rng),
                };
                let persona = match hinted_persona {
                    Some(index) => index,
                    None => self.choose_persona(state, &topic),
                };
                (persona, topic, MIN_DEPTH, false, hint_applied)
            }
        };

        state.record_question(persona_index);
        state.cover_topic(&topic);
        state.current_topic = Some(topic.clone());
        state.set_depth(depth);

        let note = usable_hint.filter(|_| hint_applied).map(|h| h.reasoning.as_str());
        let builder = InstructionBuilder::new(&state.candidate, state.personas(), persona_index)
            .topic(&topic, state.depth_level(), follow_up)
            .closing(closing)
            .hint_note(note);
        let instruction = builder.build();
        let guidance = builder.guidance();

        tracing::debug!(
            session = %state.session_id,
            persona = persona_index,
            topic = %topic,
            bucket = ?self.pool.bucket_of(&topic),
            depth = state.depth_level(),
            follow_up,
            hint_applied,
            completeness = analysis.completeness,
            quality = analysis.quality,
            "next question selected"
        );

        NextQuestion {
            persona_index,
            topic,
            depth: state.depth_level(),
            follow_up,
            instruction,
            guidance,
            hint_applied,
        }
    }

    /// One weighted draw: usually the persona whose focus matches the topic,
    /// otherwise whoever has asked the fewest questions.
    fn choose_persona(&mut self, state: &ConversationState, topic: &str) -> usize {
        let focused = state.personas().iter().position(|p| p.focus_overlaps(topic));
        let draw_focus = self.rng.gen_bool(FOCUS_WEIGHT);
        match focused {
            Some(index) if draw_focus => index,
            _ => state
                .questions_by_persona()
                .iter()
                .enumerate()
                .min_by_key(|(_, count)| **count)
                .map(|(index, _)| index)
                .unwrap_or(0),
        }
    }
}
