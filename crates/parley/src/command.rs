//! Parsing of the lines typed into the chat prompt.
//!
//! Lines starting with `/` are commands, everything else is a message.
//! A leading `//` sends a message starting with a single `/`.

use std::str::FromStr;

use parley_core::GenerationConfig;
use thiserror::Error;

/// One line of input.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Send a message.
    Message(String),
    /// `/edit <n> <text>`: replace assistant turn `n`.
    Edit {
        /// Index of the turn, as listed by `/history`.
        index: usize,
        /// The replacement.
        content: String,
    },
    /// `/set <field> <value>`, or `/model <id>`.
    Set(Setting),
    /// `/reset`: start over.
    Reset,
    /// `/history`: list the turns.
    History,
    /// `/save [name]`.
    Save(Option<String>),
    /// `/load <name>`.
    Load(String),
    /// `/prompt save <name>`: save the current system prompt.
    SavePrompt(String),
    /// `/prompt load <name>`: use a saved system prompt.
    LoadPrompt(String),
    /// `/prompt list`.
    ListPrompts,
    /// `/help`.
    Help,
    /// `/quit`.
    Quit,
}

/// A single configuration change.
#[derive(Clone, Debug, PartialEq)]
pub enum Setting {
    /// Switch models.
    Model(String),
    /// Sampling temperature.
    Temperature(f32),
    /// Top-p.
    TopP(f32),
    /// Top-k.
    TopK(u32),
    /// Maximum output tokens.
    MaxOutputTokens(u32),
    /// System prompt, empty to clear.
    SystemPrompt(String),
}

impl Setting {
    /// Applies this change to `config`.
    ///
    /// Ranges are not checked here, the session does that when the new
    /// configuration is applied.
    pub fn apply(self, config: &mut GenerationConfig) {
        match self {
            Self::Model(model) => config.model = model,
            Self::Temperature(value) => config.temperature = value,
            Self::TopP(value) => config.top_p = value,
            Self::TopK(value) => config.top_k = value,
            Self::MaxOutputTokens(value) => config.max_output_tokens = value,
            Self::SystemPrompt(prompt) => config.system_prompt = prompt,
        }
    }
}

/// Why a line could not be parsed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The command does not exist.
    #[error("unknown command `/{0}`, try /help")]
    UnknownCommand(String),
    /// The command is missing an argument or has a malformed one.
    #[error("usage: {0}")]
    Usage(&'static str),
    /// `/set` was given a field that does not exist.
    #[error("unknown setting `{0}`")]
    UnknownSetting(String),
    /// A number could not be parsed.
    #[error("invalid number `{0}`")]
    InvalidNumber(String),
}

/// Help text listing every command.
pub const HELP: &str = "\
/edit <n> <text>         replace assistant turn n
/set <field> <value>     model, temperature, top_p, top_k,
                         max_output_tokens or system_prompt
/model <id>              switch models
/reset                   start over
/history                 list the turns
/save [name]             save the transcript
/load <name>             load a saved transcript
/prompt save|load <name> save or use a system prompt
/prompt list             list saved system prompts
/quit                    leave";

impl Command {
    /// Parses one line of input, without its line terminator.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Self::Message(line.to_owned()));
        };
        if rest.starts_with('/') {
            return Ok(Self::Message(rest.to_owned()));
        }

        let (name, args) = split_word(rest);
        match name {
            "edit" => {
                let usage = ParseError::Usage("/edit <n> <text>");
                let (index, content) = split_word(args);
                let index = index.parse::<usize>().map_err(|_| usage.clone())?;
                if content.is_empty() {
                    return Err(usage);
                }
                Ok(Self::Edit {
                    index,
                    content: content.to_owned(),
                })
            }
            "set" => {
                let (field, value) = split_word(args);
                Ok(Self::Set(parse_setting(field, value)?))
            }
            "model" => Ok(Self::Set(Setting::Model(
                required(args, "/model <id>")?.to_owned(),
            ))),
            "reset" => Ok(Self::Reset),
            "history" => Ok(Self::History),
            "save" => Ok(Self::Save(
                (!args.is_empty()).then(|| args.to_owned()),
            )),
            "load" => Ok(Self::Load(required(args, "/load <name>")?.to_owned())),
            "prompt" => {
                let usage = "/prompt save|load <name> or /prompt list";
                match split_word(args) {
                    ("save", name) => {
                        Ok(Self::SavePrompt(required(name, usage)?.to_owned()))
                    }
                    ("load", name) => {
                        Ok(Self::LoadPrompt(required(name, usage)?.to_owned()))
                    }
                    ("list", "") => Ok(Self::ListPrompts),
                    _ => Err(ParseError::Usage(usage)),
                }
            }
            "help" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            _ => Err(ParseError::UnknownCommand(name.to_owned())),
        }
    }
}

fn parse_setting(field: &str, value: &str) -> Result<Setting, ParseError> {
    let setting = match field {
        "model" => Setting::Model(required(value, "/set model <id>")?.to_owned()),
        "temperature" => Setting::Temperature(number(value)?),
        "top_p" | "top-p" => Setting::TopP(number(value)?),
        "top_k" | "top-k" => Setting::TopK(number(value)?),
        "max_output_tokens" | "max-output-tokens" => {
            Setting::MaxOutputTokens(number(value)?)
        }
        "system_prompt" | "system-prompt" => {
            Setting::SystemPrompt(value.to_owned())
        }
        "" => return Err(ParseError::Usage("/set <field> <value>")),
        _ => return Err(ParseError::UnknownSetting(field.to_owned())),
    };
    Ok(setting)
}

fn number<T: FromStr>(value: &str) -> Result<T, ParseError> {
    value
        .parse()
        .map_err(|_| ParseError::InvalidNumber(value.to_owned()))
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (s.trim_end(), ""),
    }
}

fn required<'a>(arg: &'a str, usage: &'static str) -> Result<&'a str, ParseError> {
    let arg = arg.trim();
    if arg.is_empty() {
        Err(ParseError::Usage(usage))
    } else {
        Ok(arg)
    }
}
