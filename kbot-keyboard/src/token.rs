//! Wire format of callback tokens.
//!
//! `d<scope>.<index>` for keyboard-scoped dense ids, `g<id>` for global ids, `-` for
//! inert buttons. Numbers are lowercase base-36, so tokens stay a few bytes long.

use kbot_core::NOOP_CALLBACK;

const SCOPED_PREFIX: char = 'd';
const GLOBAL_PREFIX: char = 'g';
const SEPARATOR: char = '.';

/// Parsed callback token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    Noop,
    Scoped { scope: u64, index: usize },
    Global { id: u64 },
}

pub fn encode_scoped(scope: u64, index: usize) -> String {
    format!(
        "{}{}{}{}",
        SCOPED_PREFIX,
        to_base36(scope),
        SEPARATOR,
        to_base36(index as u64)
    )
}

pub fn encode_global(id: u64) -> String {
    format!("{}{}", GLOBAL_PREFIX, to_base36(id))
}

/// Parses a token; `None` when it was not produced by this encoder.
pub fn decode(token: &str) -> Option<Decoded> {
    if token == NOOP_CALLBACK {
        return Some(Decoded::Noop);
    }
    let mut chars = token.chars();
    match chars.next()? {
        SCOPED_PREFIX => {
            let (scope, index) = chars.as_str().split_once(SEPARATOR)?;
            Some(Decoded::Scoped {
                scope: from_base36(scope)?,
                index: usize::try_from(from_base36(index)?).ok()?,
            })
        }
        GLOBAL_PREFIX => Some(Decoded::Global {
            id: from_base36(chars.as_str())?,
        }),
        _ => None,
    }
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        // from_digit never fails for a digit below the radix
        digits.push(std::char::from_digit((n % 36) as u32, 36).unwrap_or('0'));
        n /= 36;
    }
    digits.iter().rev().collect()
}

fn from_base36(s: &str) -> Option<u64> {
    if s.is_empty() || s.chars().any(|c| c.is_ascii_uppercase()) {
        return None;
    }
    u64::from_str_radix(s, 36).ok()
}
