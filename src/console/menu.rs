// ABOUTME: Parsing of top-level menu input.
// ABOUTME: Distinguishes new targets, numbered selections, and exit.

use crate::types::{Target, TargetError};

#[derive(Debug, PartialEq, Eq)]
pub enum MenuChoice {
    /// `username@hostname` for a new login.
    Connect(Target),
    /// Contained `@` but was not a usable target.
    InvalidTarget(TargetError),
    /// Index into the listed credentials.
    Select(usize),
    Exit,
    Unrecognized(String),
    Empty,
}

impl MenuChoice {
    /// Interpret `input` given how many credentials are listed.
    pub fn parse(input: &str, listed: usize) -> Self {
        let input = input.trim();
        if input.is_empty() {
            return MenuChoice::Empty;
        }

        if input.contains('@') {
            return match Target::parse(input) {
                Ok(target) => MenuChoice::Connect(target),
                Err(e) => MenuChoice::InvalidTarget(e),
            };
        }

        if let Ok(index) = input.parse::<usize>()
            && index < listed
        {
            return MenuChoice::Select(index);
        }

        if input.eq_ignore_ascii_case("exit") {
            return MenuChoice::Exit;
        }

        MenuChoice::Unrecognized(input.to_string())
    }
}
