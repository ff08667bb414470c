use anyhow::Result;
use cliclack::input;
use tutor::transport::ChatMode;

use crate::commands::parse_mode;

#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Message(String),
    SetMode(ChatMode),
    Clear,
    Help,
    Exit,
    /// Unusable input, with the reason to show
    Invalid(String),
}

pub fn get_input(mode: ChatMode) -> Result<Input> {
    let text: String = input(format!("Ask the tutor ({}):    [Help: /?]", mode))
        .placeholder("")
        .interact()?;
    Ok(parse_input(&text))
}

pub fn parse_input(text: &str) -> Input {
    let text = text.trim();
    if text.eq_ignore_ascii_case("exit") || text.eq_ignore_ascii_case("/exit") {
        return Input::Exit;
    }
    if text == "/?" {
        return Input::Help;
    }
    if text.eq_ignore_ascii_case("/clear") {
        return Input::Clear;
    }
    if let Some(rest) = text.strip_prefix("/mode") {
        return match parse_mode(rest.trim()) {
            Ok(mode) => Input::SetMode(mode),
            Err(reason) => Input::Invalid(reason),
        };
    }
    Input::Message(text.to_string())
}

pub fn print_help() {
    println!("Commands:");
    println!("/mode <socratic|direct|talk> - Switch the tutoring style");
    println!("/clear - Forget this conversation");
    println!("/? - Display this help message");
    println!("exit - Leave the chat");
    println!("Ctrl+C - Stop the current reply (the text received so far is kept)");
}
