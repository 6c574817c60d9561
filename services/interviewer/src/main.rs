use anyhow::{Context, Result};
use clap::Parser;
use interview_core::Event;
use interview_core::controller::{SessionController, SessionSettings};
use interview_core::error::SessionError;
use interview_core::interview::InterviewConfig;
use interview_core::transcription::TranscriptionTimings;
use interview_core::uplink::{CaptureHandle, FrameSampler, MicrophoneUplink};
use interview_native_utils::device;
use interview_service::camera::SnapshotFrameSource;
use interview_service::config::{Config, EVENT_CHANNEL_CAPACITY};
use interview_service::deepgram::{DeepgramRecognizer, DeepgramSettings};
use interview_service::gemini_adapter::{self, GeminiAdapter};
use interview_service::microphone::{self, AudioTap};
use interview_service::{console, playback, prompt_loader};
use secrecy::ExposeSecret;
use std::path::PathBuf;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "Voice mock interview with a Gemini Live interviewer")]
struct Cli {
    /// Position the candidate is interviewing for
    #[arg(long, default_value = "Senior Frontend Engineer")]
    role: String,
    /// Company the interviewer represents
    #[arg(long, default_value = "Google")]
    company: String,
    /// Candidate's experience level
    #[arg(long, default_value = "5 years")]
    experience: String,
    /// Image file kept up to date by an external webcam capture
    #[arg(long)]
    camera_snapshot: Option<PathBuf>,
    /// Instruction template with {role}, {company} and {experience} placeholders
    #[arg(long)]
    instructions: Option<PathBuf>,
    /// Write the conversation transcript as JSON when the interview ends
    #[arg(long)]
    transcript_out: Option<PathBuf>,
    /// Name of the microphone to use
    #[arg(long)]
    input_device: Option<String>,
    /// Name of the speaker to use
    #[arg(long)]
    output_device: Option<String>,
    /// List audio devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Parse Command-Line Arguments ---
    let args = Cli::parse();

    // Device listing needs neither keys nor logging.
    if args.list_devices {
        println!("Input devices:\n{}", device::get_available_inputs()?);
        println!("Output devices:\n{}", device::get_available_outputs()?);
        return Ok(());
    }

    // --- 2. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 3. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    // --- 4. Interview Instructions ---
    let interview = InterviewConfig::new(&args.role, &args.company, &args.experience);
    let instructions = match &args.instructions {
        Some(path) => interview.render(&prompt_loader::load_template(path)?),
        None => interview.system_instruction(),
    };
    tracing::info!(
        "Preparing interview: {} at {} ({})",
        interview.role,
        interview.company,
        interview.experience
    );

    let settings = SessionSettings {
        instructions,
        voice: Some(config.gemini_voice.clone()),
        timings: TranscriptionTimings {
            silence_timeout: config.silence_timeout,
            ..TranscriptionTimings::default()
        },
    };

    // --- 5. Hardware ---
    let (tx, mut rx) = tokio::sync::mpsc::channel::<Event>(EVENT_CHANNEL_CAPACITY);
    let tap = AudioTap::new();

    let (mic, speaker) = match open_audio(&args, &tx, &tap) {
        Ok(devices) => devices,
        Err(e) => {
            let error = SessionError::permission(format!("{:#}", e));
            tracing::error!("{}", error);
            return Err(e);
        }
    };

    let recognizer = DeepgramRecognizer::new(
        DeepgramSettings {
            api_key: config.deepgram_api_key,
            model: config.deepgram_model.clone(),
            language: config.language.clone(),
        },
        mic.sample_rate,
        tap,
        tx.clone(),
    );
    let uplink = MicrophoneUplink::new(mic.sample_rate)?;
    let mut controller = SessionController::new(settings, recognizer, speaker.sink, uplink);
    let presenter = console::spawn(controller.subscribe());

    // --- 6. Remote Session ---
    controller.begin_connecting();
    let gemini_config = gemini_realtime::Config::builder()
        .with_api_key(config.gemini_api_key.expose_secret())
        .with_model(&config.gemini_model)
        .build();

    let mut pump = None;
    match GeminiAdapter::connect(gemini_config).await {
        Ok((adapter, server_events)) => {
            pump = Some(gemini_adapter::spawn_event_pump(server_events, tx.clone()));

            let mut captures: Vec<Box<dyn CaptureHandle>> = vec![Box::new(mic.capture)];
            if let Some(path) = &args.camera_snapshot {
                tracing::info!("Sampling camera snapshots from {}", path.display());
                let source = SnapshotFrameSource::new(path.clone());
                captures.push(Box::new(FrameSampler::spawn(
                    source,
                    config.frame_interval,
                    tx.clone(),
                )));
            }
            controller.open(adapter, captures).await;
        }
        Err(e) => controller.fail(SessionError::connection(format!("{:#}", e))).await,
    }

    // --- 7. Run Until Stopped ---
    let stop_tx = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, shutting down...");
            if stop_tx.send(Event::Stop).await.is_err() {
                tracing::debug!("Controller already stopped");
            }
        }
    });

    controller.run(&mut rx).await;

    if let Some(pump) = pump {
        pump.abort();
    }
    drop(mic.stream);
    drop(speaker.stream);

    if let Some(path) = &args.transcript_out {
        controller
            .transcript()
            .write_json(path)
            .with_context(|| format!("Failed to export transcript to {}", path.display()))?;
        tracing::info!(
            "Wrote {} transcript entries to {}",
            controller.transcript().len(),
            path.display()
        );
    }

    let snapshot = controller.snapshot();
    drop(controller);
    if let Err(e) = presenter.await {
        tracing::debug!("Presenter task ended abnormally: {}", e);
    }

    tracing::info!("Shutting down...");
    match snapshot.error {
        Some(message) => Err(anyhow::anyhow!(message)),
        None => Ok(()),
    }
}

fn open_audio(
    args: &Cli,
    tx: &tokio::sync::mpsc::Sender<Event>,
    tap: &AudioTap,
) -> Result<(microphone::Microphone, playback::Speaker)> {
    let input = device::get_or_default_input(args.input_device.clone())
        .context("Failed to get audio input device")?;
    let mic = microphone::open(&input, tx.clone(), tap.clone())?;

    let output = device::get_or_default_output(args.output_device.clone())
        .context("Failed to get audio output device")?;
    let speaker = playback::open(&output, tx.clone())?;

    Ok((mic, speaker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_listing_parses_without_other_arguments() {
        let args = Cli::try_parse_from(["interview-service", "--list-devices"]).unwrap();
        assert!(args.list_devices);
        assert_eq!(args.role, "Senior Frontend Engineer");
        assert_eq!(args.company, "Google");
        assert_eq!(args.experience, "5 years");
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
