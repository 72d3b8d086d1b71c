use crate::conversation::CandidateSummary;
use crate::persona::Persona;
use std::fmt::Write;

fn depth_guidance(depth: u8) -> &'static str {
    match depth {
        0 | 1 => "Ask an open, introductory question. Keep it short and approachable.",
        2 => "Ask for a concrete example from their experience.",
        3 => "Probe the details: their specific role, decisions, and results.",
        4 => "Challenge their reasoning. Ask about alternatives and tradeoffs they rejected.",
        _ => "Push to the edge of their knowledge with a hard hypothetical.",
    }
}

/// Renders the system instruction a persona's live session is opened with,
/// or the guidance note sent to an already running one.
#[derive(Debug, Clone)]
pub struct InstructionBuilder<'a> {
    candidate: &'a CandidateSummary,
    personas: &'a [Persona],
    speaker: usize,
    topic: Option<&'a str>,
    depth: u8,
    follow_up: bool,
    opening: bool,
    closing: bool,
    hint_note: Option<&'a str>,
}

impl<'a> InstructionBuilder<'a> {
    pub fn new(candidate: &'a CandidateSummary, personas: &'a [Persona], speaker: usize) -> Self {
        Self {
            candidate,
            personas,
            speaker,
            topic: None,
            depth: 1,
            follow_up: false,
            opening: false,
            closing: false,
            hint_note: None,
        }
    }

    pub fn topic(mut self, topic: &'a str, depth: u8, follow_up: bool) -> Self {
        self.topic = Some(topic);
        self.depth = depth;
        self.follow_up = follow_up;
        self
    }

    /// First persona of the call: greets and introduces the panel.
    pub fn opening(mut self, opening: bool) -> Self {
        self.opening = opening;
        self
    }

    pub fn closing(mut self, closing: bool) -> Self {
        self.closing = closing;
        self
    }

    pub fn hint_note(mut self, note: Option<&'a str>) -> Self {
        self.hint_note = note.filter(|n| !n.trim().is_empty());
        self
    }

    /// Full system instruction including identity and the hand-off syntax.
    pub fn build(&self) -> String {
        let Some(me) = self.personas.get(self.speaker) else {
            return self.guidance();
        };
        let candidate = if self.candidate.name.is_empty() {
            "the candidate"
        } else {
            self.candidate.name.as_str()
        };

        let mut out = String::new();
        let _ = writeln!(
            out,
            "You are {}, {}, interviewing {candidate} for a {} position as part of a panel.",
            me.name,
            me.role,
            if self.candidate.target_role.is_empty() {
                "open"
            } else {
                self.candidate.target_role.as_str()
            },
        );
        let _ = writeln!(out, "Your focus: {}.", me.focus);
        let _ = writeln!(out, "Your manner: {}", me.behavior);
        if !self.candidate.summary.is_empty() {
            let _ = writeln!(out, "Candidate background: {}", self.candidate.summary);
        }
        out.push_str("Ask exactly one question at a time and then wait for the answer. Never answer for the candidate.\n");

        let others: Vec<&str> = self
            .personas
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != self.speaker)
            .map(|(_, p)| p.name.as_str())
            .collect();
        if !others.is_empty() {
            let _ = writeln!(
                out,
                "Other panelists: {}. When it is natural to hand the floor to one of them, end your turn with [PASS: <name>]. The tag is never spoken aloud.",
                others.join(", ")
            );
        }
        if self.opening {
            out.push_str("Open the interview: greet the candidate warmly, introduce yourself and the panel in one or two sentences, then ask your first question.\n");
        }
        out.push_str(&self.guidance());
        out
    }

    /// Only the per-question part, for steering a session that is already live.
    pub fn guidance(&self) -> String {
        let mut out = String::new();
        if self.closing {
            out.push_str("Time is nearly up. Ask at most one last short question, then thank the candidate, invite their questions, and close the interview politely.\n");
        } else if let Some(topic) = self.topic {
            if self.follow_up {
                let _ = writeln!(out, "Follow up on their last answer about {topic}.");
            } else {
                let _ = writeln!(out, "Move to a new topic: {topic}.");
            }
            let _ = writeln!(out, "Depth {}/5. {}", self.depth, depth_guidance(self.depth));
        }
        if let Some(note) = self.hint_note {
            let _ = writeln!(out, "Panel note (optional, use your judgement): {note}");
        }
        out
    }
}
