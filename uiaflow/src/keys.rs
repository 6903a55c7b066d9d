//! Parser for the small key language accepted by `SendKeys` and dialog steps:
//! a chord (`CTRL+V`), a single named key (`ENTER`), or plain text.

use thiserror::Error;

/// Windows virtual-key code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtualKey(pub u16);

impl VirtualKey {
    pub const BACK: VirtualKey = VirtualKey(0x08);
    pub const TAB: VirtualKey = VirtualKey(0x09);
    pub const RETURN: VirtualKey = VirtualKey(0x0D);
    pub const SHIFT: VirtualKey = VirtualKey(0x10);
    pub const CONTROL: VirtualKey = VirtualKey(0x11);
    pub const MENU: VirtualKey = VirtualKey(0x12);
    pub const ESCAPE: VirtualKey = VirtualKey(0x1B);
    pub const SPACE: VirtualKey = VirtualKey(0x20);
    pub const LEFT: VirtualKey = VirtualKey(0x25);
    pub const UP: VirtualKey = VirtualKey(0x26);
    pub const RIGHT: VirtualKey = VirtualKey(0x27);
    pub const DOWN: VirtualKey = VirtualKey(0x28);
    pub const DELETE: VirtualKey = VirtualKey(0x2E);
    pub const A: VirtualKey = VirtualKey(0x41);
    pub const V: VirtualKey = VirtualKey(0x56);
    pub const LWIN: VirtualKey = VirtualKey(0x5B);
    pub const F1: VirtualKey = VirtualKey(0x70);

    pub fn is_modifier(&self) -> bool {
        matches!(
            *self,
            VirtualKey::SHIFT | VirtualKey::CONTROL | VirtualKey::MENU | VirtualKey::LWIN
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedKeys {
    Text(String),
    Key(VirtualKey),
    Chord {
        modifiers: Vec<VirtualKey>,
        key: VirtualKey,
    },
}

impl ParsedKeys {
    pub fn kind(&self) -> &'static str {
        match self {
            ParsedKeys::Text(_) => "Text",
            ParsedKeys::Key(_) => "Key",
            ParsedKeys::Chord { .. } => "Chord",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeysParseError {
    #[error("keys must be non-empty")]
    Empty,
    #[error("invalid chord")]
    InvalidChord,
    #[error("chord must contain exactly one non-modifier key")]
    MultipleKeys,
    #[error("chord must contain a non-modifier key")]
    MissingKey,
    #[error("unsupported key token: {0}")]
    UnsupportedToken(String),
}

pub fn parse(input: &str) -> Result<ParsedKeys, KeysParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(KeysParseError::Empty);
    }

    if trimmed.contains('+') {
        return parse_chord(trimmed);
    }

    if let Some(key) = parse_key_token(trimmed) {
        return Ok(ParsedKeys::Key(key));
    }

    Ok(ParsedKeys::Text(trimmed.to_string()))
}

fn parse_chord(input: &str) -> Result<ParsedKeys, KeysParseError> {
    let parts: Vec<&str> = input
        .split('+')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() < 2 {
        return Err(KeysParseError::InvalidChord);
    }

    let mut modifiers = Vec::new();
    let mut key = None;
    for part in parts {
        if let Some(modifier) = parse_modifier(part) {
            modifiers.push(modifier);
            continue;
        }
        if key.is_some() {
            return Err(KeysParseError::MultipleKeys);
        }
        key = Some(
            parse_key_token(part).ok_or_else(|| KeysParseError::UnsupportedToken(part.to_string()))?,
        );
    }

    match key {
        Some(key) => Ok(ParsedKeys::Chord { modifiers, key }),
        None => Err(KeysParseError::MissingKey),
    }
}

fn parse_modifier(token: &str) -> Option<VirtualKey> {
    match token.trim().to_ascii_uppercase().as_str() {
        "CTRL" | "CONTROL" => Some(VirtualKey::CONTROL),
        "SHIFT" => Some(VirtualKey::SHIFT),
        "ALT" => Some(VirtualKey::MENU),
        "WIN" | "META" => Some(VirtualKey::LWIN),
        _ => None,
    }
}

fn parse_key_token(token: &str) -> Option<VirtualKey> {
    let t = token.trim();
    let mut chars = t.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        let c = c.to_ascii_uppercase();
        if c.is_ascii_uppercase() || c.is_ascii_digit() {
            return Some(VirtualKey(c as u16));
        }
    }

    let upper = t.to_ascii_uppercase();
    let named = match upper.as_str() {
        "ENTER" | "RETURN" => Some(VirtualKey::RETURN),
        "TAB" => Some(VirtualKey::TAB),
        "ESC" | "ESCAPE" => Some(VirtualKey::ESCAPE),
        "BACKSPACE" | "BS" => Some(VirtualKey::BACK),
        "DEL" | "DELETE" => Some(VirtualKey::DELETE),
        "SPACE" => Some(VirtualKey::SPACE),
        "UP" => Some(VirtualKey::UP),
        "DOWN" => Some(VirtualKey::DOWN),
        "LEFT" => Some(VirtualKey::LEFT),
        "RIGHT" => Some(VirtualKey::RIGHT),
        _ => None,
    };
    if named.is_some() {
        return named;
    }

    // F1-F12
    let rest = upper.strip_prefix('F')?;
    let n: u16 = rest.parse().ok()?;
    if (1..=12).contains(&n) && rest.len() <= 2 {
        return Some(VirtualKey(VirtualKey::F1.0 + n - 1));
    }
    None
}
