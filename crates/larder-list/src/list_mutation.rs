//! Mutation engine: applies classified commands to an ordered list.
//!
//! Every mutation leaves positions dense (exactly 1..N), which is why
//! removal targets always refer to currently displayed positions.

use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::list_command::{classify_line, split_quantity, LineCommand, RemoveSpec};
use crate::list_entry::ListEntry;

/// Applies one trimmed, non-empty line of user input to `entries`.
pub fn apply_line(entries: &mut Vec<ListEntry>, line: &str, now: NaiveDateTime) {
    match classify_line(line) {
        LineCommand::Add { name, quantity } => add_entry(entries, &name, quantity, now),
        LineCommand::Remove(spec) => remove_entries(entries, &spec),
    }
}

/// Applies a batch of raw lines in authored order, skipping blanks.
/// Returns the number of lines applied.
pub fn apply_batch<'a, I>(entries: &mut Vec<ListEntry>, lines: I, now: NaiveDateTime) -> usize
where
    I: IntoIterator<Item = &'a str>,
{
    let mut applied = 0;
    for raw in lines {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        apply_line(entries, line, now);
        applied += 1;
    }
    applied
}

/// Appends a new entry at the end of the list.
///
/// Repeated additions of the same name create distinct entries. An
/// empty normalized name is a no-op; empty names never enter the list.
pub fn add_entry(entries: &mut Vec<ListEntry>, name: &str, quantity: u32, added: NaiveDateTime) {
    let name = name.trim();
    if name.is_empty() {
        return;
    }
    entries.push(ListEntry {
        position: entries.len() as u32 + 1,
        name: name.to_string(),
        quantity: quantity.max(1),
        added,
    });
}

/// Drops the selected positions (or, for exception removals, keeps only
/// them), then renumbers the survivors densely. Out-of-range targets
/// select nothing and are silently ignored.
pub fn remove_entries(entries: &mut Vec<ListEntry>, spec: &RemoveSpec) {
    if spec.is_clear_all() {
        entries.clear();
        return;
    }
    entries.retain(|entry| spec.matches(entry.position) == spec.except);
    renumber(entries);
}

pub(crate) fn renumber(entries: &mut [ListEntry]) {
    for (index, entry) in entries.iter_mut().enumerate() {
        entry.position = index as u32 + 1;
    }
}

fn edit_prefix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\[(\d+)]\s*").expect("edit prefix pattern"))
}

/// Renders the plain editable line form shown in the edit dialog:
/// `[position] name` with a `, quantity` suffix when above one.
pub fn render_edit_lines(entries: &[ListEntry]) -> String {
    entries
        .iter()
        .map(|entry| {
            if entry.quantity > 1 {
                format!("[{}] {}, {}", entry.position, entry.name, entry.quantity)
            } else {
                format!("[{}] {}", entry.position, entry.name)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Merges an edited line rendering back into a list.
///
/// `[position]`-prefixed lines update that entry, keeping its original
/// added date; unprefixed lines append as new entries dated `now`;
/// entries missing from the submission are dropped. Result positions
/// are dense.
pub fn apply_edited_lines(
    entries: &[ListEntry],
    text: &str,
    now: NaiveDateTime,
) -> Vec<ListEntry> {
    let mut updated: Vec<ListEntry> = Vec::new();
    let mut appended: Vec<(String, u32)> = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let Some(captures) = edit_prefix().captures(line) else {
            let (quantity, name) = split_quantity(line);
            if !name.is_empty() {
                appended.push((name, quantity));
            }
            continue;
        };
        let position: u32 = match captures[1].parse() {
            Ok(position) => position,
            Err(_) => continue,
        };
        let rest = &line[captures.get(0).map_or(0, |whole| whole.end())..];
        let (name, quantity) = split_edit_cell(rest);
        if name.is_empty() {
            continue;
        }
        let added = entries
            .iter()
            .find(|entry| entry.position == position)
            .map(|entry| entry.added)
            .unwrap_or(now);
        updated.push(ListEntry {
            position: 0,
            name,
            quantity,
            added,
        });
    }

    for (name, quantity) in appended {
        updated.push(ListEntry {
            position: 0,
            name,
            quantity,
            added: now,
        });
    }
    renumber(&mut updated);
    updated
}

/// Splits the `name, quantity` cell form; without a trailing integer
/// after the last comma the whole text goes through the quantity affix
/// rules instead.
fn split_edit_cell(text: &str) -> (String, u32) {
    if let Some((head, tail)) = text.rsplit_once(',') {
        let tail = tail.trim();
        if !tail.is_empty() && tail.bytes().all(|byte| byte.is_ascii_digit()) {
            if let Ok(quantity) = tail.parse::<u32>() {
                return (head.trim().to_string(), quantity.max(1));
            }
        }
    }
    let (quantity, name) = split_quantity(text);
    (name, quantity)
}
