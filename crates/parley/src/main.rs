//! A terminal chat with Gemini models, built on the `parley` library.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::path::PathBuf;
use std::pin::pin;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use parley::command::{Command, HELP};
use parley::core::{
    ChatBuilder, FailureNotice, GenerationConfig, JsonFileStore, Role,
    SessionError, SessionPolicy,
};
use parley::gemini::{GeminiConfigBuilder, GeminiProvider};
use parley::{Reply, Repl, Typewriter, gemini_capabilities};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::select;
use tokio::time::sleep;

const BAR_CHAR: &str = "▎";

/// Chat with Gemini models in the terminal.
#[derive(Debug, Parser)]
#[command(name = "parley", version)]
struct Cli {
    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Alternative endpoint of the Gemini API.
    #[arg(long, env = "GEMINI_BASE_URL")]
    base_url: Option<String>,

    /// Model to talk to.
    #[arg(long)]
    model: Option<String>,

    /// Sampling temperature, 0 to 2.
    #[arg(long)]
    temperature: Option<f32>,

    /// Nucleus sampling probability, 0 to 1.
    #[arg(long)]
    top_p: Option<f32>,

    /// Number of candidate tokens considered.
    #[arg(long)]
    top_k: Option<u32>,

    /// Upper bound of tokens in a response.
    #[arg(long)]
    max_output_tokens: Option<u32>,

    /// System instructions for the model.
    #[arg(long)]
    system_prompt: Option<String>,

    /// Hide error details in failed replies.
    #[arg(long)]
    generic_errors: bool,

    /// Clear the conversation whenever the configuration changes.
    #[arg(long)]
    reset_on_reconfigure: bool,

    /// Where transcripts and system prompts are saved.
    #[arg(long, default_value = "parley-history")]
    history_dir: PathBuf,

    /// Delay between revealed words, 0 to print replies at once.
    #[arg(long, default_value_t = 50)]
    typing_delay_ms: u64,
}

impl Cli {
    fn generation_config(&self) -> GenerationConfig {
        let defaults = GenerationConfig::default();
        GenerationConfig {
            model: self.model.clone().unwrap_or(defaults.model),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            top_k: self.top_k.unwrap_or(defaults.top_k),
            max_output_tokens: self
                .max_output_tokens
                .unwrap_or(defaults.max_output_tokens),
            system_prompt: self
                .system_prompt
                .clone()
                .unwrap_or(defaults.system_prompt),
        }
    }

    fn policy(&self) -> SessionPolicy {
        SessionPolicy {
            failure_notice: if self.generic_errors {
                FailureNotice::Generic
            } else {
                FailureNotice::Detailed
            },
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err}", "error:".bright_red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), SessionError> {
    let mut gemini_config = GeminiConfigBuilder::with_api_key(cli.api_key.clone());
    if let Some(base_url) = &cli.base_url {
        gemini_config = gemini_config.with_base_url(base_url.clone());
    }
    let provider = GeminiProvider::new(gemini_config.build());

    let chat = ChatBuilder::with_model_provider(provider)
        .with_config(cli.generation_config())
        .with_policy(cli.policy())
        .with_capabilities(gemini_capabilities())
        .build()?;
    let store = JsonFileStore::open(&cli.history_dir)?;
    let repl = Repl::new(chat, store, cli.reset_on_reconfigure);
    let typewriter = Typewriter::new(Duration::from_millis(cli.typing_delay_ms));

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    println!(
        "{} {} {}",
        "Chatting with".dimmed(),
        cli.generation_config().model.bright_white().bold(),
        "(type /help for commands)".dimmed()
    );

    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                error!("error reading input: {err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(err) => {
                println!("{} {err}", BAR_CHAR.bright_red());
                continue;
            }
        };

        let reply = if matches!(command, Command::Message(_)) {
            with_spinner(&progress_style, repl.execute(command)).await
        } else {
            repl.execute(command).await
        };

        match reply {
            Ok(Reply::Assistant(turn)) => {
                print!("{}🤖 ", BAR_CHAR.bright_cyan());
                std::io::stdout().flush().ok();
                let mut stdout = io::stdout();
                if let Err(err) = typewriter.play(turn.content(), &mut stdout).await {
                    error!("error writing output: {err}");
                }
                println!();
            }
            Ok(Reply::Notice(notice)) => {
                println!("{}{}", BAR_CHAR.bright_green(), notice.dimmed());
            }
            Ok(Reply::History(transcript)) => {
                for (index, turn) in transcript.iter().enumerate() {
                    let who = match turn.role() {
                        Role::User => "you".bright_yellow().to_string(),
                        Role::Assistant => "model".bright_cyan().to_string(),
                    };
                    println!("{:>3} {who:>5}: {}", index.dimmed(), turn.content());
                }
            }
            Ok(Reply::Prompts(names)) => {
                if names.is_empty() {
                    println!("{}", "No saved prompts.".dimmed());
                }
                for name in names {
                    println!("  {name}");
                }
            }
            Ok(Reply::Saved(path)) => {
                println!(
                    "{}{} {}",
                    BAR_CHAR.bright_green(),
                    "Saved to".dimmed(),
                    path.display()
                );
            }
            Ok(Reply::Help) => println!("{HELP}"),
            Ok(Reply::Quit) => break,
            Err(err) => {
                println!("{}{}", BAR_CHAR.bright_red(), err.bright_red());
            }
        }
    }

    repl.chat().close();
    Ok(())
}

/// Drives `fut` to completion while showing a spinner.
async fn with_spinner<F: Future>(style: &ProgressStyle, fut: F) -> F::Output {
    let progress_bar = ProgressBar::new_spinner();
    progress_bar.set_style(style.clone());
    progress_bar.set_message("🤔 Thinking...");

    let mut fut = pin!(fut);
    let output = loop {
        select! {
            output = &mut fut => break output,
            _ = sleep(Duration::from_millis(100)) => progress_bar.inc(1),
        }
    };

    // Finish the progress bar before printing anything else.
    progress_bar.finish_and_clear();
    output
}
