use clap::{builder::PossibleValuesParser, Parser, Subcommand};
use colored::Colorize;
use falgen::{
    logger::{ConsoleNotifier, Notifier},
    models::{
        frame_size, GenerationOptions, ASPECT_RATIOS, DEFAULT_ASPECT_RATIO, DEFAULT_RESOLUTION,
        DURATIONS,
    },
    widget::{ApiService, EditorEvent, EditorEventKind, TextEditor},
    AlertPolicy, Composition, Config, FalClient, FalConfig, FalError, LogLevel, Logger, LoggerConfig,
    ManifestHost, Result,
};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "falgen")]
#[command(about = "Generate videos with fal.ai and import them into a project")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// KEY=value file holding FAL_KEY (falls back to .env and the environment)
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Append a debug log to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    /// Raise a notification for every error and HTTP entry
    #[arg(long, global = true)]
    alert_on_error: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a video from a prompt and add it to the project
    Generate {
        /// Text prompt
        prompt: String,

        /// Project manifest (created when missing)
        #[arg(short, long, default_value = "project.json")]
        project: PathBuf,

        #[arg(long, value_parser = PossibleValuesParser::new(ASPECT_RATIOS.iter().copied()))]
        aspect_ratio: Option<String>,

        #[arg(long, value_parser = PossibleValuesParser::new(DURATIONS.iter().copied()))]
        duration: Option<String>,

        #[arg(long)]
        resolution: Option<String>,

        #[arg(long)]
        negative_prompt: Option<String>,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long)]
        no_audio: bool,

        #[arg(long)]
        no_enhance: bool,

        /// Only print the video URL, skip download and import
        #[arg(long)]
        no_import: bool,

        /// Size of the composition created with a new project
        #[arg(long, default_value = "1920")]
        comp_width: u32,

        #[arg(long, default_value = "1080")]
        comp_height: u32,
    },

    /// Download an existing video URL and add it to the project
    Download {
        url: String,

        #[arg(short, long, default_value = "project.json")]
        project: PathBuf,

        /// Prompt recorded in the layer comment
        #[arg(long, default_value = "")]
        prompt: String,

        #[arg(long, default_value = "1920")]
        comp_width: u32,

        #[arg(long, default_value = "1080")]
        comp_height: u32,
    },

    /// Send text to an edit service
    Edit {
        text: String,

        #[arg(long)]
        base_url: String,
    },
}

/// Console echo only with `--verbose`; stdout is reserved for command output.
fn logger_config(cli: &Cli) -> LoggerConfig {
    let mut config = if cli.verbose {
        LoggerConfig::development().with_level(LogLevel::Debug)
    } else {
        LoggerConfig::production().with_console(false)
    };
    if let Some(path) = &cli.log_file {
        config = config.with_file_output(path);
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            config = config.with_raw_dumps(dir);
        }
    }
    if cli.alert_on_error {
        config = config.with_alert_policy(AlertPolicy::AlertOnError);
    }
    config
}

fn build_logger(cli: &Cli) -> std::io::Result<Logger> {
    Logger::with_notifier(logger_config(cli), Arc::new(ConsoleNotifier))
}

fn load_config(cli: &Cli) -> Result<Config> {
    let fal = match &cli.env_file {
        Some(path) => FalConfig::from_env_file(path)?,
        None => {
            if dotenv::dotenv().is_err() {
                log::debug!("No .env file found, using process environment");
            }
            FalConfig::from_env()
        }
    };
    Ok(Config::from_env().with_fal(fal))
}

fn composition(width: u32, height: u32) -> Composition {
    Composition {
        name: "FAL Composition".to_string(),
        width,
        height,
        duration_secs: 8.0,
    }
}

async fn run(cli: Cli, logger: Logger) -> Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Generate {
            prompt,
            project,
            aspect_ratio,
            duration,
            resolution,
            negative_prompt,
            seed,
            no_audio,
            no_enhance,
            no_import,
            comp_width,
            comp_height,
        } => {
            let options = GenerationOptions {
                aspect_ratio,
                duration,
                resolution,
                enhance_prompt: no_enhance.then_some(false),
                generate_audio: no_audio.then_some(false),
                negative_prompt,
                seed,
                auto_fix: None,
            };
            let footage_size = frame_size(
                options.resolution.as_deref().unwrap_or(DEFAULT_RESOLUTION),
                options.aspect_ratio.as_deref().unwrap_or(DEFAULT_ASPECT_RATIO),
            );
            let client = FalClient::new(config, logger.clone());

            tokio::task::spawn_blocking(move || -> Result<()> {
                if no_import {
                    let response = client.video().generate(&prompt, &options)?;
                    println!("{}", response.video_url);
                    return Ok(());
                }
                let mut host = ManifestHost::open_or_create(&project, composition(comp_width, comp_height))?
                    .with_footage_size(footage_size);
                let outcome = client.generate_into_project(&prompt, &options, &mut host)?;
                println!(
                    "{} {} -> layer {} in {}",
                    "✔".green(),
                    outcome.import.asset.path.display(),
                    outcome.import.layer.index,
                    outcome.import.composition.name
                );
                Ok(())
            })
            .await
            .map_err(|e| FalError::Host(format!("worker failed: {}", e)))?
        }

        Commands::Download {
            url,
            project,
            prompt,
            comp_width,
            comp_height,
        } => {
            let client = FalClient::new(config, logger.clone());
            tokio::task::spawn_blocking(move || -> Result<()> {
                let mut host = ManifestHost::open_or_create(&project, composition(comp_width, comp_height))?;
                let outcome = client.pipeline().run(&url, &prompt, &mut host)?;
                println!(
                    "{} {} -> layer {}",
                    "✔".green(),
                    outcome.asset.path.display(),
                    outcome.layer.index
                );
                Ok(())
            })
            .await
            .map_err(|e| FalError::Host(format!("worker failed: {}", e)))?
        }

        Commands::Edit { text, base_url } => {
            let editor = TextEditor::new(Arc::new(ApiService::new(base_url)), text);
            let events = logger.clone();
            editor.on(EditorEventKind::LoadingChange, move |event| {
                if let EditorEvent::LoadingChange(loading) = event {
                    events.debug("edit.loading", "Loading state changed", json!({ "loading": loading }));
                }
            });
            let payload = editor.handle_edit().await?;
            match payload.as_json() {
                Some(value) => println!("{}", serde_json::to_string_pretty(value)?),
                None => println!("{}", payload.as_text().unwrap_or_default()),
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let logger = match build_logger(&cli) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("{} cannot open log file: {}", "error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = logger.install() {
        eprintln!("{} {}", "warning:".yellow(), e);
    }

    let result = run(cli, logger.clone()).await;
    let code = match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let kind = e.kind();
            ConsoleNotifier.notify(
                &format!("{} error", kind.as_str()),
                &format!("{}\n{}", e, kind.hint()),
            );
            ExitCode::FAILURE
        }
    };
    logger.close();
    code
}
