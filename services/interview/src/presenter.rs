//! Terminal stand-in for the presentation layer.

use rehearse_core::Command;
use rehearse_core::conversation::SessionExport;
use tokio::sync::mpsc;

fn clock(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Renders one command as a console line, or `None` for state that is only logged.
pub fn render(command: &Command) -> Option<String> {
    match command {
        Command::TranscriptLine {
            display_name, text, ..
        } => Some(format!("{display_name}: {text}")),
        // A console cannot redraw a line in place, so only finished lines are printed.
        Command::InterimLine {
            display_name, text, ..
        } => {
            tracing::trace!(%display_name, %text, "interim transcript");
            None
        }
        Command::ActiveSpeaker { name, .. } => Some(format!("-- {name} has the floor --")),
        Command::PhaseChanged { phase, remaining_secs } => {
            Some(format!("-- phase: {phase} ({} left) --", clock(*remaining_secs)))
        }
        Command::Speaking(speaking) => {
            tracing::trace!(speaking, "speaking state");
            None
        }
        Command::TimeUpdate { phase, remaining_secs } => {
            tracing::debug!(%phase, remaining = %clock(*remaining_secs), "time update");
            None
        }
        Command::SessionEnded(_) => Some("-- call ended --".to_string()),
    }
}

/// Prints commands until the session ends, then hands back the export.
pub async fn present(mut commands: mpsc::Receiver<Command>) -> Option<SessionExport> {
    while let Some(command) = commands.recv().await {
        if let Some(line) = render(&command) {
            println!("{line}");
        }
        if let Command::SessionEnded(export) = command {
            return Some(*export);
        }
    }
    None
}
