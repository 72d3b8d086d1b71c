use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Opening,
    Active,
    Closing,
    Completed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Opening => "opening",
            Phase::Active => "active",
            Phase::Closing => "closing",
            Phase::Completed => "completed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct PhaseConfig {
    pub target: Duration,
    /// Closing starts once remaining time drops to this.
    pub closing_threshold: Duration,
    /// Opening gives way to active after this long even without an answer.
    pub opening_window: Duration,
    pub poll_interval: Duration,
    /// Pause between completion and teardown.
    pub completion_grace: Duration,
}

impl PhaseConfig {
    pub fn new(target: Duration) -> Self {
        Self {
            target,
            closing_threshold: Duration::from_secs(180),
            opening_window: Duration::from_secs(60),
            poll_interval: Duration::from_secs(10),
            completion_grace: Duration::from_secs(5),
        }
    }
}

/// Result of one poll. `transition` is only set on the poll that changed phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTick {
    pub phase: Phase,
    pub remaining: Duration,
    pub transition: Option<Phase>,
}

#[derive(Debug)]
pub struct PhaseTimer {
    config: PhaseConfig,
    phase: Phase,
    engaged: bool,
    closing_forced: bool,
}

impl PhaseTimer {
    pub fn new(config: PhaseConfig) -> Self {
        Self {
            config,
            phase: Phase::Opening,
            engaged: false,
            closing_forced: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &PhaseConfig {
        &self.config
    }

    pub fn remaining(&self, elapsed: Duration) -> Duration {
        self.config.target.saturating_sub(elapsed)
    }

    /// The participant has answered; opening is over at the next poll.
    pub fn mark_engaged(&mut self) {
        self.engaged = true;
    }

    /// Closing was requested from outside (for example by the advisor).
    pub fn force_closing(&mut self) {
        self.closing_forced = true;
    }

    pub fn poll(&mut self, elapsed: Duration) -> PhaseTick {
        let remaining = self.remaining(elapsed);
        let next = match self.phase {
            Phase::Completed => Phase::Completed,
            _ if remaining.is_zero() => Phase::Completed,
            Phase::Closing => Phase::Closing,
            _ if remaining <= self.config.closing_threshold || self.closing_forced => Phase::Closing,
            Phase::Opening if self.engaged || elapsed >= self.config.opening_window => Phase::Active,
            current => current,
        };
        let transition = (next != self.phase).then_some(next);
        if let Some(phase) = transition {
            tracing::info!(from = %self.phase, to = %phase, remaining_secs = remaining.as_secs(), "interview phase changed");
            self.phase = phase;
        }
        PhaseTick {
            phase: self.phase,
            remaining,
            transition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer(target_secs: u64) -> PhaseTimer {
        PhaseTimer::new(PhaseConfig::new(Duration::from_secs(target_secs)))
    }

    #[test]
    fn test_closing_is_entered_exactly_once() {
        let mut t = timer(600);
        let transitions: Vec<Phase> = (0..=65)
            .map(|i| t.poll(Duration::from_secs(i * 10)))
            .filter_map(|tick| tick.transition)
            .collect();
        assert_eq!(transitions, vec![Phase::Active, Phase::Closing, Phase::Completed]);
    }

    #[test]
    fn test_closing_starts_when_threshold_crossed() {
        let mut t = timer(600);
        t.mark_engaged();
        assert_eq!(t.poll(Duration::from_secs(419)).phase, Phase::Active);
        let tick = t.poll(Duration::from_secs(420));
        assert_eq!(tick.transition, Some(Phase::Closing));
        assert_eq!(tick.remaining, Duration::from_secs(180));
        assert_eq!(t.poll(Duration::from_secs(430)).transition, None);
    }

    #[test]
    fn test_engagement_ends_opening_early() {
        let mut t = timer(1800);
        assert_eq!(t.poll(Duration::from_secs(10)).phase, Phase::Opening);
        t.mark_engaged();
        assert_eq!(t.poll(Duration::from_secs(20)).transition, Some(Phase::Active));
    }

    #[test]
    fn test_completed_is_terminal() {
        let mut t = timer(60);
        assert_eq!(t.poll(Duration::from_secs(61)).transition, Some(Phase::Completed));
        assert_eq!(t.poll(Duration::from_secs(0)).phase, Phase::Completed);
        t.force_closing();
        assert_eq!(t.poll(Duration::from_secs(5)).transition, None);
    }

    #[test]
    fn test_forced_closing_fires_once() {
        let mut t = timer(1800);
        t.force_closing();
        assert_eq!(t.poll(Duration::from_secs(30)).transition, Some(Phase::Closing));
        t.force_closing();
        assert_eq!(t.poll(Duration::from_secs(40)).transition, None);
    }

    #[test]
    fn test_phase_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Phase::Closing).unwrap(), "\"closing\"");
    }
}
