//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing users to control the chat session without sending messages
//! to the chat endpoint.

/// A parsed chat command.
///
/// These commands control the chat session and are not sent to the endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Clear the conversation history.
    Clear,

    /// Switch the signed-in user.
    /// `None` signs out, after which messages are ignored.
    User(Option<String>),

    /// Switch the active pet.
    /// `None` clears the selection.
    Animal(Option<String>),

    /// Change the model.
    Model(String),

    /// Set the sampling temperature.
    Temperature(f32),

    /// Send the whole conversation, or only the latest message.
    History(bool),

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Display session statistics.
    Stats,

    /// Show the current configuration.
    ShowConfig,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command,
/// or `None` if it should be treated as a regular message.
///
/// # Examples
///
/// ```
/// # use petchat::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/animal bori").is_some());
/// assert!(parse_command("산책은 얼마나 시켜야 하나요?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    let rest = input.strip_prefix('/')?;
    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "clear" => ChatCommand::Clear,
        "user" => match argument {
            Some(arg) if arg.eq_ignore_ascii_case("clear") => ChatCommand::User(None),
            Some(user) => ChatCommand::User(Some(user.to_string())),
            None => ChatCommand::Invalid("/user requires a user id (or 'clear')".to_string()),
        },
        "animal" | "pet" => match argument {
            Some(arg) if arg.eq_ignore_ascii_case("clear") => ChatCommand::Animal(None),
            other => ChatCommand::Animal(other.map(|s| s.to_string())),
        },
        "model" => match argument {
            Some(model) => ChatCommand::Model(model.to_string()),
            None => ChatCommand::Invalid("/model requires a model name".to_string()),
        },
        "temperature" | "temp" => match argument {
            Some(arg) => match parse_f32_in_range(arg, 0.0, 2.0) {
                Ok(value) => ChatCommand::Temperature(value),
                Err(err) => ChatCommand::Invalid(format!("/temperature {err}")),
            },
            None => ChatCommand::Invalid("/temperature requires a value".to_string()),
        },
        "history" => match argument.and_then(parse_on_off) {
            Some(value) => ChatCommand::History(value),
            None => ChatCommand::Invalid("/history expects 'on' or 'off'".to_string()),
        },
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        "stats" | "status" => ChatCommand::Stats,
        "config" => ChatCommand::ShowConfig,
        _ => ChatCommand::Invalid(format!("Unknown command: /{command}")),
    };

    Some(result)
}

fn parse_f32_in_range(value: &str, min: f32, max: f32) -> Result<f32, String> {
    let parsed: f32 = value
        .parse()
        .map_err(|_| format!("expects a value between {min} and {max}"))?;
    if parsed.is_finite() && parsed >= min && parsed <= max {
        Ok(parsed)
    } else {
        Err(format!("expects a value between {min} and {max}"))
    }
}

fn parse_on_off(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" => Some(true),
        "off" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /clear                 Clear conversation history
  /user <id>             Switch the signed-in user ('clear' signs out)
  /animal [id]           Switch the active pet (no argument clears it)
  /model <name>          Change the model (e.g., /model gpt-4.1-mini)
  /temperature <v>       Set temperature 0.0-2.0
  /history on|off        Send the whole conversation or only the latest message
  /stats                 Show session statistics
  /config                Show current configuration
  /help                  Show this help message
  /quit                  Exit the chat

Press Ctrl+C while a reply is arriving to stop it."#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_quit_commands() {
        assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/exit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/q"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("  /quit  "), Some(ChatCommand::Quit));
    }

    #[test]
    fn parse_clear() {
        assert_eq!(parse_command("/clear"), Some(ChatCommand::Clear));
        assert_eq!(parse_command("/CLEAR"), Some(ChatCommand::Clear));
    }

    #[test]
    fn parse_user() {
        assert_eq!(
            parse_command("/user u-42"),
            Some(ChatCommand::User(Some("u-42".to_string())))
        );
        assert_eq!(parse_command("/user clear"), Some(ChatCommand::User(None)));
        assert!(matches!(
            parse_command("/user"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("requires")
        ));
    }

    #[test]
    fn parse_animal() {
        assert_eq!(
            parse_command("/animal bori"),
            Some(ChatCommand::Animal(Some("bori".to_string())))
        );
        assert_eq!(
            parse_command("/pet  nabi "),
            Some(ChatCommand::Animal(Some("nabi".to_string())))
        );
        assert_eq!(parse_command("/animal"), Some(ChatCommand::Animal(None)));
        assert_eq!(parse_command("/animal clear"), Some(ChatCommand::Animal(None)));
    }

    #[test]
    fn parse_model() {
        assert_eq!(
            parse_command("/model gpt-4.1-mini"),
            Some(ChatCommand::Model("gpt-4.1-mini".to_string()))
        );
        assert_eq!(
            parse_command("/model"),
            Some(ChatCommand::Invalid(
                "/model requires a model name".to_string()
            ))
        );
    }

    #[test]
    fn parse_temperature() {
        assert_eq!(
            parse_command("/temperature 1.5"),
            Some(ChatCommand::Temperature(1.5))
        );
        assert_eq!(parse_command("/temp 0"), Some(ChatCommand::Temperature(0.0)));
        assert!(matches!(
            parse_command("/temperature 2.5"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("between")
        ));
        assert!(matches!(
            parse_command("/temperature NaN"),
            Some(ChatCommand::Invalid(_))
        ));
        assert!(matches!(
            parse_command("/temperature"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("requires")
        ));
    }

    #[test]
    fn parse_history_toggle() {
        assert_eq!(parse_command("/history on"), Some(ChatCommand::History(true)));
        assert_eq!(parse_command("/history OFF"), Some(ChatCommand::History(false)));
        assert!(matches!(
            parse_command("/history sometimes"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("expects")
        ));
    }

    #[test]
    fn parse_stats_and_config() {
        assert_eq!(parse_command("/stats"), Some(ChatCommand::Stats));
        assert_eq!(parse_command("/config"), Some(ChatCommand::ShowConfig));
    }

    #[test]
    fn unknown_command() {
        assert_eq!(
            parse_command("/walk"),
            Some(ChatCommand::Invalid("Unknown command: /walk".to_string()))
        );
    }

    #[test]
    fn non_commands() {
        assert_eq!(parse_command("우리 강아지가 밥을 안 먹어요"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("  "), None);
    }

    #[test]
    fn help_text_lists_commands() {
        let help = help_text();
        for command in ["/quit", "/clear", "/user", "/animal", "/model", "/temperature", "/history"] {
            assert!(help.contains(command), "{command}");
        }
    }
}
