use anyhow::{Context, Result};
use clap::Parser;
use rehearse_core::conversation::{CandidateSummary, ConversationState};
use rehearse_core::orchestrator::{Orchestrator, OrchestratorConfig};
use rehearse_core::persona::default_roster;
use rehearse_core::playback::AudioSink;
use rehearse_core::realtime_api::MediaCapture;
use rehearse_service::config::Config;
use rehearse_service::gemini_adapter::GeminiProvider;
use rehearse_service::{advisory_client, capture, presenter, roster_loader, sink};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "Run a live mock interview against a panel of AI personas")]
struct Cli {
    /// The candidate's name, as the panel should address them
    candidate: String,
    /// The role being interviewed for
    #[arg(short, long, default_value = "Software Engineer")]
    role: String,
    /// A short background summary shared with the panel
    #[arg(long, default_value = "")]
    summary: String,
    /// Directory of persona JSON files; the built-in panel is used when omitted
    #[arg(long)]
    roster: Option<PathBuf>,
    /// Replay this 16 kHz WAV file as the participant instead of a microphone
    #[arg(long)]
    wav: Option<PathBuf>,
    /// Seed for persona selection, for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
    #[cfg(feature = "device")]
    /// Input device name; the system default is used when omitted
    #[arg(long)]
    input_device: Option<String>,
    #[cfg(feature = "device")]
    /// Output device name; the system default is used when omitted
    #[arg(long)]
    output_device: Option<String>,
}

fn media_source(args: &Cli) -> Result<Box<dyn MediaCapture>> {
    if let Some(path) = &args.wav {
        return Ok(Box::new(capture::WavCapture::new(path)));
    }
    #[cfg(feature = "device")]
    {
        Ok(Box::new(capture::DeviceCapture::new(args.input_device.clone())))
    }
    #[cfg(not(feature = "device"))]
    {
        anyhow::bail!("no media source: pass --wav or build with the `device` feature")
    }
}

#[cfg(feature = "device")]
fn audio_sink(args: &Cli) -> Result<Arc<dyn AudioSink>> {
    let sink = sink::DeviceSink::open(
        args.output_device.clone(),
        rehearse_native_utils::audio::OUTPUT_PCM16_SAMPLE_RATE,
    )
    .context("Failed to open audio output")?;
    Ok(Arc::new(sink))
}

#[cfg(not(feature = "device"))]
fn audio_sink(_args: &Cli) -> Result<Arc<dyn AudioSink>> {
    Ok(Arc::new(sink::LogSink::default()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    tracing::info!("Configuration loaded successfully. Starting interview service...");

    // --- 3. Parse Command-Line Arguments ---
    let args = Cli::parse();

    // --- 4. Load the Panel ---
    let roster = match &args.roster {
        Some(dir) => roster_loader::load_roster(dir).context("Failed to load persona roster")?,
        None => default_roster(),
    };
    tracing::info!("Loaded {} personas.", roster.len());

    let candidate = CandidateSummary {
        name: args.candidate.clone(),
        target_role: args.role.clone(),
        summary: args.summary.clone(),
    };
    let state = ConversationState::new(candidate, roster, config.interview_duration)?;
    tracing::info!(session = %state.session_id, "conversation state created");

    // --- 5. Wire the Orchestrator ---
    let provider = Arc::new(GeminiProvider::new(&config.gemini_api_key, config.live_model.clone()));
    let orchestrator_config = OrchestratorConfig {
        target_duration: config.interview_duration,
        settle_delay: config.settle_delay,
        seed: args.seed,
        ..Default::default()
    };
    // Create the command channel to decouple core logic from the runtime.
    let (command_tx, command_rx) = tokio::sync::mpsc::channel(256);
    let (mut orchestrator, control) =
        Orchestrator::new(orchestrator_config, state, provider, audio_sink(&args)?, command_tx);
    let presenter = tokio::spawn(presenter::present(command_rx));

    // The advisor is optional; without it the panel runs on its own heuristics.
    let advisory = match &config.advisor_url {
        Some(url) => match advisory_client::connect(url).await {
            Ok(link) => Some(link),
            Err(e) => {
                tracing::warn!("continuing without advisor: {:#}", e);
                None
            }
        },
        None => None,
    };

    // --- 6. Start the Call ---
    orchestrator
        .start(media_source(&args)?, advisory)
        .await
        .context("Failed to start the interview")?;

    let ctrl_c_control = control.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, ending call");
            ctrl_c_control.end_call();
        }
    });

    let export = orchestrator.run().await;
    if presenter.await.ok().flatten().is_none() {
        tracing::warn!("presenter stopped before the session ended");
    }

    // --- 7. Hand Off the Export ---
    println!(
        "{}",
        serde_json::to_string_pretty(&export).context("Failed to serialize session export")?
    );
    Ok(())
}
