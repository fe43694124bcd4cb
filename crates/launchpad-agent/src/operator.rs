use crate::catalog::{ConfigError, ServerConfig, ServerTool};

pub const HELP: &str = "\
commands:
  /create <tool> [ram]   download and set up a server (tools: Bukkit Spigot Paper Forge Sponge Mohist; ram 1-16, default 4)
  /start                 run the launch script
  /status                show the server process state
  /kill                  kill the server
  /help                  this text
  /quit                  leave (the server keeps running)
anything else is passed to the host shell";

/// One line typed at the operator console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Create(ServerConfig),
    Start,
    Status,
    Kill,
    Help,
    Quit,
    Relay(String),
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("usage: /create <tool> [ram]")]
    MissingTool,

    #[error("ram must be a whole number of GiB (got {0:?})")]
    BadRam(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown command /{0} (try /help)")]
    UnknownCommand(String),
}

impl OperatorCommand {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let line = input.trim();
        if line.is_empty() {
            return Ok(OperatorCommand::Empty);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(OperatorCommand::Relay(line.to_string()));
        };

        let mut words = rest.split_whitespace();
        let verb = words.next().unwrap_or_default().to_ascii_lowercase();
        match verb.as_str() {
            "create" => {
                let tool: ServerTool = words.next().ok_or(ParseError::MissingTool)?.parse()?;
                let config = match words.next() {
                    None => ServerConfig::with_default_ram(tool),
                    Some(raw) => {
                        let ram = raw
                            .parse::<u32>()
                            .map_err(|_| ParseError::BadRam(raw.to_string()))?;
                        ServerConfig::new(tool, ram)?
                    }
                };
                Ok(OperatorCommand::Create(config))
            }
            "start" => Ok(OperatorCommand::Start),
            "status" => Ok(OperatorCommand::Status),
            "kill" => Ok(OperatorCommand::Kill),
            "help" => Ok(OperatorCommand::Help),
            "quit" | "exit" => Ok(OperatorCommand::Quit),
            _ => Err(ParseError::UnknownCommand(verb)),
        }
    }
}
