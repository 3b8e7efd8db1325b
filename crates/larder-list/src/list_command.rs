//! Line classification: the removal grammar and quantity affix rules.
//!
//! A trimmed line either matches the removal grammar in full or it is
//! an addition — there is no invalid-command state, free text always
//! degrades to "add an item with this name".

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
/// A classified input line.
pub enum LineCommand {
    Add { name: String, quantity: u32 },
    Remove(RemoveSpec),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Targets of a removal line.
///
/// With `except` set the selection flips: matched positions are kept
/// and everything else is dropped. A bare wildcard carries `except`
/// with no targets, which clears the whole list.
pub struct RemoveSpec {
    pub except: bool,
    pub ids: BTreeSet<u32>,
    pub ranges: Vec<(u32, u32)>,
}

impl RemoveSpec {
    /// True for the bare `*` form.
    pub fn is_clear_all(&self) -> bool {
        self.except && self.ids.is_empty() && self.ranges.is_empty()
    }

    /// Whether `position` is selected by the ids or the range.
    /// An inverted range (`low > high`) selects nothing.
    pub fn matches(&self, position: u32) -> bool {
        self.ids.contains(&position)
            || self
                .ranges
                .iter()
                .any(|(low, high)| (*low..=*high).contains(&position))
    }
}

fn leading_quantity() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)\s").expect("leading quantity pattern"))
}

fn trailing_quantity() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s(\d+)$").expect("trailing quantity pattern"))
}

/// Splits an optional leading or trailing integer quantity off `fragment`.
///
/// The leading form wins when both could apply. A run of digits with no
/// separating whitespace is part of the name, so `"47"` is a name and
/// `"monkey47"` is untouched. Unparseable or zero quantities fall back
/// to 1; the remainder is trimmed.
pub fn split_quantity(fragment: &str) -> (u32, String) {
    if let Some(captures) = leading_quantity().captures(fragment) {
        if let Some(digits) = captures.get(1) {
            let remainder = fragment[digits.end()..].trim().to_string();
            return (parse_quantity(digits.as_str()), remainder);
        }
    }
    if let Some(captures) = trailing_quantity().captures(fragment) {
        if let Some(digits) = captures.get(1) {
            let remainder = fragment[..digits.start()].trim().to_string();
            return (parse_quantity(digits.as_str()), remainder);
        }
    }
    (1, fragment.trim().to_string())
}

fn parse_quantity(digits: &str) -> u32 {
    digits
        .parse::<u32>()
        .ok()
        .filter(|quantity| *quantity >= 1)
        .unwrap_or(1)
}

/// Classifies one trimmed, non-empty line.
///
/// The removal grammar is tried first; anything that does not match it
/// in full becomes an addition carrying the literal text.
pub fn classify_line(line: &str) -> LineCommand {
    if let Some(spec) = parse_removal(line) {
        return LineCommand::Remove(spec);
    }
    let (quantity, name) = split_quantity(line);
    LineCommand::Add { name, quantity }
}

/// Full-line removal grammar: optional leading `*`, then
/// whitespace-separated integers and at most one `low-high` range, in
/// any order, nothing else.
fn parse_removal(line: &str) -> Option<RemoveSpec> {
    let (except, rest) = match line.strip_prefix('*') {
        Some(rest) => (true, rest),
        None => (false, line),
    };
    let mut spec = RemoveSpec {
        except,
        ..RemoveSpec::default()
    };
    let mut token_seen = false;
    for token in rest.split_whitespace() {
        token_seen = true;
        if let Some((low, high)) = token.split_once('-') {
            if !spec.ranges.is_empty() || !is_digits(low) || !is_digits(high) {
                return None;
            }
            spec.ranges.push((low.parse().ok()?, high.parse().ok()?));
        } else if is_digits(token) {
            spec.ids.insert(token.parse().ok()?);
        } else {
            return None;
        }
    }
    if !except && !token_seen {
        return None;
    }
    Some(spec)
}

fn is_digits(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|byte| byte.is_ascii_digit())
}
