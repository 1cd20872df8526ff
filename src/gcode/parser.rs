//! Command grammar and the queue-building parser.
//!
//! Each recognized keyword pulls a fixed number of following tokens and
//! validates every one against its expected field letter. A command with a
//! missing or mistyped field is dropped whole with a diagnostic; parsing
//! then continues at the next token, so one bad command never poisons the
//! rest of the line.

use std::collections::VecDeque;

use thiserror::Error;

use super::lexer::{Lexer, Token};

/// A fully-validated command. Every numeric field was present and
/// type-checked before construction.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    RapidMove { x: f64, y: f64 },
    LinearMove { x: f64, y: f64, feed: f64 },
    ArcMove { clockwise: bool, x: f64, y: f64, feed: f64, radius: f64 },
    Dwell { millis: u64 },
    Home,
    SetAbsolute,
    SetRelative,
    StartAcquisition { pulses_per_sec: u32, label: String },
    StopAcquisition,
    StreamOn,
    StreamOff,
    SetExposure { microseconds: u32 },
}

impl Command {
    /// The wire keyword this command was parsed from.
    pub fn keyword(&self) -> &'static str {
        match self {
            Command::RapidMove { .. } => "G0",
            Command::LinearMove { .. } => "G1",
            Command::ArcMove { clockwise: true, .. } => "G2",
            Command::ArcMove { clockwise: false, .. } => "G3",
            Command::Dwell { .. } => "G4",
            Command::Home => "G28",
            Command::SetAbsolute => "G90",
            Command::SetRelative => "G91",
            Command::StartAcquisition { .. } => "M1000",
            Command::StopAcquisition => "M1001",
            Command::StreamOn => "M1002",
            Command::StreamOff => "M1003",
            Command::SetExposure { .. } => "M1004",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseDiagnostic {
    #[error("malformed {keyword}: missing or invalid {field} field")]
    BadField {
        keyword: &'static str,
        field: &'static str,
    },
    #[error("invalid \"{0}\" code")]
    UnknownWord(String),
}

/// Parse result: the executable queue plus everything that was dropped.
#[derive(Debug, Default)]
pub struct Program {
    pub commands: VecDeque<Command>,
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl Program {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Parse a piece of command text into a [`Program`].
pub fn parse(src: &str) -> Program {
    let mut tokens = Lexer::new(src);
    let mut program = Program::default();

    while let Some(token) = tokens.next() {
        let parsed = match keyword_of(&token) {
            Some("G0") => rapid_move(&mut tokens),
            Some("G1") => linear_move(&mut tokens),
            Some("G2") => arc_move(&mut tokens, true),
            Some("G3") => arc_move(&mut tokens, false),
            Some("G4") => dwell(&mut tokens),
            Some("G28") => Ok(Command::Home),
            Some("G90") => Ok(Command::SetAbsolute),
            Some("G91") => Ok(Command::SetRelative),
            Some("M1000") => start_acquisition(&mut tokens),
            Some("M1001") => Ok(Command::StopAcquisition),
            Some("M1002") => Ok(Command::StreamOn),
            Some("M1003") => Ok(Command::StreamOff),
            Some("M1004") => set_exposure(&mut tokens),
            _ => Err(ParseDiagnostic::UnknownWord(describe(&token))),
        };
        match parsed {
            Ok(command) => program.commands.push_back(command),
            Err(diagnostic) => {
                tracing::warn!(%diagnostic, "dropping command");
                program.diagnostics.push(diagnostic);
            }
        }
    }
    program
}

/// Keywords are the exact letter-plus-code spelling ("G1", never "G01").
fn keyword_of(token: &Token) -> Option<&'static str> {
    let Token::Field { letter, value } = token else {
        return None;
    };
    match (*letter, value.as_str()) {
        ('G', "0") => Some("G0"),
        ('G', "1") => Some("G1"),
        ('G', "2") => Some("G2"),
        ('G', "3") => Some("G3"),
        ('G', "4") => Some("G4"),
        ('G', "28") => Some("G28"),
        ('G', "90") => Some("G90"),
        ('G', "91") => Some("G91"),
        ('M', "1000") => Some("M1000"),
        ('M', "1001") => Some("M1001"),
        ('M', "1002") => Some("M1002"),
        ('M', "1003") => Some("M1003"),
        ('M', "1004") => Some("M1004"),
        _ => None,
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Field { letter, value } => format!("{letter}{value}"),
        Token::Quoted(text) => format!("\"{text}\""),
    }
}

fn bad(keyword: &'static str, field: &'static str) -> ParseDiagnostic {
    ParseDiagnostic::BadField { keyword, field }
}

/// Pull the next token and read it as a float field with the given letter.
fn float_field(tokens: &mut Lexer, letter: char) -> Option<f64> {
    match tokens.next() {
        Some(Token::Field { letter: got, value }) if got == letter => value.parse().ok(),
        _ => None,
    }
}

/// Pull the next token and read it as an unsigned integer field.
fn integer_field(tokens: &mut Lexer, letter: char) -> Option<u64> {
    match tokens.next() {
        Some(Token::Field { letter: got, value }) if got == letter => value.parse().ok(),
        _ => None,
    }
}

fn quoted_field(tokens: &mut Lexer) -> Option<String> {
    match tokens.next() {
        Some(Token::Quoted(text)) => Some(text),
        _ => None,
    }
}

fn rapid_move(tokens: &mut Lexer) -> Result<Command, ParseDiagnostic> {
    let x = float_field(tokens, 'X');
    let y = float_field(tokens, 'Y');
    Ok(Command::RapidMove {
        x: x.ok_or_else(|| bad("G0", "X"))?,
        y: y.ok_or_else(|| bad("G0", "Y"))?,
    })
}

fn linear_move(tokens: &mut Lexer) -> Result<Command, ParseDiagnostic> {
    let x = float_field(tokens, 'X');
    let y = float_field(tokens, 'Y');
    let feed = float_field(tokens, 'S');
    Ok(Command::LinearMove {
        x: x.ok_or_else(|| bad("G1", "X"))?,
        y: y.ok_or_else(|| bad("G1", "Y"))?,
        feed: feed.ok_or_else(|| bad("G1", "S"))?,
    })
}

fn arc_move(tokens: &mut Lexer, clockwise: bool) -> Result<Command, ParseDiagnostic> {
    let keyword = if clockwise { "G2" } else { "G3" };
    let x = float_field(tokens, 'X');
    let y = float_field(tokens, 'Y');
    let feed = float_field(tokens, 'S');
    let radius = float_field(tokens, 'R');
    Ok(Command::ArcMove {
        clockwise,
        x: x.ok_or_else(|| bad(keyword, "X"))?,
        y: y.ok_or_else(|| bad(keyword, "Y"))?,
        feed: feed.ok_or_else(|| bad(keyword, "S"))?,
        radius: radius.ok_or_else(|| bad(keyword, "R"))?,
    })
}

fn dwell(tokens: &mut Lexer) -> Result<Command, ParseDiagnostic> {
    let millis = integer_field(tokens, 'P').ok_or_else(|| bad("G4", "P"))?;
    Ok(Command::Dwell { millis })
}

fn start_acquisition(tokens: &mut Lexer) -> Result<Command, ParseDiagnostic> {
    let rate = integer_field(tokens, 'F');
    let label = quoted_field(tokens);
    let rate = rate.ok_or_else(|| bad("M1000", "F"))?;
    let rate = u32::try_from(rate).map_err(|_| bad("M1000", "F"))?;
    Ok(Command::StartAcquisition {
        pulses_per_sec: rate,
        label: label.ok_or_else(|| bad("M1000", "label"))?,
    })
}

fn set_exposure(tokens: &mut Lexer) -> Result<Command, ParseDiagnostic> {
    let microseconds = integer_field(tokens, 'E').ok_or_else(|| bad("M1004", "E"))?;
    let microseconds = u32::try_from(microseconds).map_err(|_| bad("M1004", "E"))?;
    Ok(Command::SetExposure { microseconds })
}
