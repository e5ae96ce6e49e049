use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use handset::api::{self, ApiState};
use handset::classifier::LlmClassifier;
use handset::config::CaptureMode;
use handset::device::{Pace, VolumeDirection};
use handset::pipeline::{Agent, CommandQueue, Dispatcher, StatusMarker};
use handset::services::{AnswerService, LlmAnswerer};
use handset::voice::{CommandCapture, CommandRenderer, ConsoleCapture, SpeechCapture};
use handset::{
    ActionResult, Actuator, AdbController, AppRegistry, ChatClient, Classifier, Config,
    DeviceController, SpeechSink,
};

/// Handset - voice-driven automation agent for Android devices
#[derive(Parser)]
#[command(name = "handset", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Also serve the HTTP API while the agent runs
    #[arg(long)]
    api: bool,

    /// HTTP API port (overrides config)
    #[arg(long, env = "HANDSET_PORT")]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List attached devices
    Devices,
    /// List known app names
    Apps,
    /// Open an app by friendly name
    Open {
        /// App name (e.g. "camera")
        #[arg(required = true)]
        app: Vec<String>,
    },
    /// Take a screenshot
    Screenshot,
    /// Go to the home screen
    Home,
    /// Navigate back
    Back,
    /// Step the volume up or down
    Volume {
        /// "up" or "down"
        direction: String,
    },
    /// Speak text through the configured renderer
    Say {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Show how an utterance is classified
    Classify {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Ask the answer service a question
    Ask {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Send money through the payment app
    Pay {
        /// Recipient name
        #[arg(long)]
        to: String,
        /// Amount (e.g. "500")
        #[arg(long)]
        amount: String,
    },
    /// Create a calendar event
    Event {
        /// Event title
        #[arg(long)]
        name: String,
        /// Event date as typed into the date field
        #[arg(long)]
        date: String,
    },
    /// Serve the HTTP API without the voice loop
    Serve,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,handset=info",
        1 => "info,handset=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("fatal: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = runtime.block_on(run(cli));
    // a capture thread may still be blocked on input
    runtime.shutdown_timeout(Duration::from_secs(1));

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(port) = cli.port {
        config.api_server.port = port;
    }

    let speech = build_speech(&config);

    match cli.command {
        None => run_agent(&config, speech, cli.api).await,
        Some(Command::Say { text }) => {
            speech.speak(&text.join(" ")).await?;
            Ok(())
        }
        Some(Command::Classify { text }) => {
            let classifier = build_classifier(&config)?;
            let text = text.join(" ");
            for entry in classifier.categorize(&text).await {
                println!("{entry}");
            }
            let command = classifier.classify(&text).await;
            println!("-> {} {:?}", command.category, command.query);
            Ok(())
        }
        Some(Command::Ask { text }) => {
            let client = ChatClient::from_config(&config.llm)?;
            let answerer = LlmAnswerer::new(client, config.llm.answer_model.clone());
            let answer = answerer.answer(&text.join(" ")).await?;
            println!("{answer}");
            speech.speak(&answer).await?;
            Ok(())
        }
        Some(Command::Apps) => {
            for (name, package) in build_registry(&config).entries() {
                println!("{name:<16} {package}");
            }
            Ok(())
        }
        Some(Command::Devices) => {
            let device = AdbController::discover(&config.device)?;
            let entries = device.list_devices().await?;
            if entries.is_empty() {
                println!("No devices attached");
            }
            for entry in entries {
                println!("{}\t{}", entry.serial, entry.state);
            }
            Ok(())
        }
        Some(Command::Serve) => {
            let state = build_api_state(&config, speech, Arc::new(CommandQueue::new()))?;
            api::serve(state, config.api_server.port).await?;
            Ok(())
        }
        Some(Command::Open { app }) => {
            let actuator = build_actuator(&config, speech.clone())?;
            report(&speech, actuator.open_app(&app.join(" ")).await).await
        }
        Some(Command::Screenshot) => {
            let actuator = build_actuator(&config, speech.clone())?;
            report(&speech, actuator.screenshot().await).await
        }
        Some(Command::Home) => {
            let actuator = build_actuator(&config, speech.clone())?;
            report(&speech, actuator.home().await).await
        }
        Some(Command::Back) => {
            let actuator = build_actuator(&config, speech.clone())?;
            report(&speech, actuator.back().await).await
        }
        Some(Command::Volume { direction }) => {
            let direction = VolumeDirection::parse(&direction)
                .ok_or_else(|| anyhow::anyhow!("direction must be \"up\" or \"down\""))?;
            let actuator = build_actuator(&config, speech.clone())?;
            report(&speech, actuator.volume(direction).await).await
        }
        Some(Command::Pay { to, amount }) => {
            let actuator = build_actuator(&config, speech.clone())?;
            report(&speech, actuator.send_payment(&to, &amount).await).await
        }
        Some(Command::Event { name, date }) => {
            let actuator = build_actuator(&config, speech.clone())?;
            report(&speech, actuator.schedule_event(&name, &date).await).await
        }
    }
}

/// Print a one-shot action result once its feedback has been spoken
async fn report(speech: &SpeechSink, result: Option<ActionResult>) -> anyhow::Result<()> {
    speech.wait_idle().await;

    let Some(result) = result else {
        anyhow::bail!(handset::Error::DeviceUnavailable);
    };
    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.success {
        anyhow::bail!(result.message);
    }
    Ok(())
}

async fn run_agent(config: &Config, speech: SpeechSink, with_api: bool) -> anyhow::Result<()> {
    let classifier = build_classifier(config)?;
    let dispatcher = build_dispatcher(config, speech)?;
    let queue = Arc::new(CommandQueue::new());

    if with_api {
        let state = Arc::new(ApiState::new(
            classifier.clone(),
            dispatcher.clone(),
            Arc::clone(&queue),
        ));
        let port = config.api_server.port;
        tokio::spawn(async move {
            if let Err(e) = api::serve(state, port).await {
                tracing::error!(error = %e, "API server stopped");
            }
        });
    }

    let capture: Arc<dyn SpeechCapture> =
        match (config.speech.capture, &config.speech.recognizer_command) {
            (CaptureMode::Command, Some(program)) => Arc::new(CommandCapture::new(program.clone())),
            _ => {
                println!("Type a command and press enter (Ctrl-D to stop).");
                Arc::new(ConsoleCapture::stdin())
            }
        };

    let agent = Agent::new(
        classifier,
        dispatcher,
        capture,
        StatusMarker::new(config.status_path()),
        config.pipeline.clone(),
    )
    .with_queue(queue);

    agent.run().await?;
    Ok(())
}

fn build_speech(config: &Config) -> SpeechSink {
    if config.speech.muted {
        SpeechSink::muted()
    } else {
        SpeechSink::new(Arc::new(CommandRenderer::new(config.speech.tts_command.clone())))
    }
}

fn build_registry(config: &Config) -> AppRegistry {
    AppRegistry::with_overrides(config.apps.iter().map(|(k, v)| (k.as_str(), v.clone())))
}

fn build_actuator(config: &Config, speech: SpeechSink) -> anyhow::Result<Actuator> {
    let device = AdbController::discover(&config.device)?;
    Ok(Actuator::new(
        Arc::new(device),
        Arc::new(build_registry(config)),
        speech,
        config.screenshot_dir(),
    )
    .with_pace(Pace::new(config.device.delay_scale)))
}

fn build_dispatcher(config: &Config, speech: SpeechSink) -> anyhow::Result<Dispatcher> {
    let actuator = build_actuator(config, speech.clone())?;
    let client = ChatClient::from_config(&config.llm)?;
    let answers = LlmAnswerer::new(client, config.llm.answer_model.clone());
    Ok(Dispatcher::new(Arc::new(actuator), Arc::new(answers), speech))
}

fn build_classifier(config: &Config) -> anyhow::Result<Classifier> {
    let client = ChatClient::from_config(&config.llm)?;
    let service = LlmClassifier::new(
        client,
        config.llm.classifier_model.clone(),
        config.classifier.temperature,
    );
    Ok(Classifier::new(Arc::new(service), config.classifier.max_attempts))
}

fn build_api_state(
    config: &Config,
    speech: SpeechSink,
    queue: Arc<CommandQueue>,
) -> anyhow::Result<Arc<ApiState>> {
    Ok(Arc::new(ApiState::new(
        build_classifier(config)?,
        build_dispatcher(config, speech)?,
        queue,
    )))
}
