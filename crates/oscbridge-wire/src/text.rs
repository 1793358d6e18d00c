//! Human-typed message syntax: `/address arg arg "quoted arg"`.
//!
//! Argument kinds are guessed from their shape: exactly one `.` and a valid
//! float is a float, a valid integer is an int, anything else is a string.

use crate::error::{Result, WireError};
use crate::message::{OscMessage, OscValue};

/// Parse one line of the form `/address arg1 arg2 ...`.
pub fn parse_message(line: &str) -> Result<OscMessage> {
    let mut tokens = line.split(' ').filter(|t| !t.is_empty());
    let address = tokens.next().unwrap_or_default();
    if !address.starts_with('/') {
        return Err(WireError::InvalidAddress(address.to_string()));
    }

    let mut args = Vec::new();
    while let Some(token) = tokens.next() {
        if let Some(opened) = token.strip_prefix('"') {
            let mut text = opened.to_string();
            let mut closed = opened.ends_with('"') && !opened.is_empty();
            while !closed {
                match tokens.next() {
                    Some(next) => {
                        text.push(' ');
                        text.push_str(next);
                        closed = next.ends_with('"');
                    }
                    None => break,
                }
            }
            if closed {
                text.pop();
            }
            args.push(OscValue::String(text));
        } else {
            args.push(guess_value(token));
        }
    }

    OscMessage::new(address, args)
}

/// Parse several lines into messages, skipping blank lines.
pub fn parse_messages<'a>(lines: impl IntoIterator<Item = &'a str>) -> Result<Vec<OscMessage>> {
    lines
        .into_iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| parse_message(line.trim()))
        .collect()
}

fn guess_value(token: &str) -> OscValue {
    if token.matches('.').count() == 1 {
        if let Ok(f) = token.parse::<f32>() {
            return OscValue::Float(f);
        }
    }
    match token.parse::<i32>() {
        Ok(i) => OscValue::Int(i),
        Err(_) => OscValue::String(token.to_string()),
    }
}
