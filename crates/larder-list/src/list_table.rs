//! Fenced markdown table codec: the sole persisted representation of
//! list state.
//!
//! Encoding word-wraps long item names across continuation rows; the
//! wrap is reversible, so decoding a published table (or the
//! concatenation of its chunks) reconstructs the list exactly, modulo
//! the precision of the date format. Decoding is best effort and never
//! fails: unparseable cells default, foreign lines are skipped.

use chrono::NaiveDateTime;

use larder_core::date_codec::{format_short_date, parse_short_date};
use larder_core::truncate_to_minute;

use crate::list_entry::{ChannelListConfig, ListEntry};
use crate::list_mutation::renumber;

const FENCE_OPEN: &str = "```md";
const FENCE_CLOSE: &str = "```";
const HEADER_CELLS: [&str; 4] = ["#", "ITEM", "QTY", "ADDED"];

#[derive(Clone)]
struct TableRow {
    cells: [String; 4],
    starts_entry: bool,
}

/// Encodes `entries` as one fenced table.
pub fn encode_table(entries: &[ListEntry], config: &ChannelListConfig) -> String {
    let rows = build_rows(entries, config);
    let widths = column_widths(&rows);
    render_table(&rows, &widths, true)
}

/// Encodes `entries`, splitting into several independently fenced
/// chunks when the table exceeds the channel message limit.
///
/// Chunks split only at entry boundaries: a position-bearing row stays
/// with its continuation rows. The header rows appear in the first
/// chunk only.
pub fn encode_table_chunks(entries: &[ListEntry], config: &ChannelListConfig) -> Vec<String> {
    let rows = build_rows(entries, config);
    let widths = column_widths(&rows);
    let full = render_table(&rows, &widths, true);
    if full.chars().count() <= config.message_limit {
        return vec![full];
    }

    let mut groups: Vec<Vec<TableRow>> = Vec::new();
    for row in rows {
        if row.starts_entry || groups.is_empty() {
            groups.push(Vec::new());
        }
        if let Some(group) = groups.last_mut() {
            group.push(row);
        }
    }

    let mut chunks = Vec::new();
    let mut current: Vec<TableRow> = Vec::new();
    let mut with_header = true;
    for group in groups {
        let mut candidate = current.clone();
        candidate.extend(group.iter().cloned());
        let rendered = render_table(&candidate, &widths, with_header);
        if rendered.chars().count() > config.message_limit && !current.is_empty() {
            chunks.push(render_table(&current, &widths, with_header));
            with_header = false;
            current = group;
        } else {
            current = candidate;
        }
    }
    chunks.push(render_table(&current, &widths, with_header));
    chunks
}

fn build_rows(entries: &[ListEntry], config: &ChannelListConfig) -> Vec<TableRow> {
    let mut rows = Vec::new();
    for entry in entries {
        for (index, line) in wrap_cell(&entry.name, config.max_cell_width)
            .into_iter()
            .enumerate()
        {
            if index == 0 {
                rows.push(TableRow {
                    cells: [
                        entry.position.to_string(),
                        line,
                        entry.quantity.to_string(),
                        format_short_date(entry.added, &config.date_format),
                    ],
                    starts_entry: true,
                });
            } else {
                rows.push(TableRow {
                    cells: [String::new(), line, String::new(), String::new()],
                    starts_entry: false,
                });
            }
        }
    }
    rows
}

/// Greedy word wrap for the item column.
///
/// Words join with a single space while the line stays within `width`;
/// a word that cannot fit the remaining space moves to the next line,
/// and a word longer than the space a whole line offers is hard-split
/// with a trailing `-` marking the break.
fn wrap_cell(name: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    if name.chars().count() <= width {
        return vec![name.to_string()];
    }
    let mut lines = Vec::new();
    let mut current = String::new();
    for raw_word in name.split_whitespace() {
        let mut word = raw_word.to_string();
        loop {
            let word_len = word.chars().count();
            let current_len = current.chars().count();
            if current.is_empty() {
                if word_len <= width {
                    current = word;
                    break;
                }
                let split_at = width.saturating_sub(1).max(1);
                let head: String = word.chars().take(split_at).collect();
                lines.push(format!("{head}-"));
                word = word.chars().skip(split_at).collect();
            } else if current_len + 1 + word_len <= width {
                current.push(' ');
                current.push_str(&word);
                break;
            } else if word_len <= width {
                lines.push(std::mem::take(&mut current));
            } else {
                let available = width.saturating_sub(current_len + 2);
                if available == 0 {
                    lines.push(std::mem::take(&mut current));
                    continue;
                }
                let head: String = word.chars().take(available).collect();
                current.push(' ');
                current.push_str(&head);
                current.push('-');
                lines.push(std::mem::take(&mut current));
                word = word.chars().skip(available).collect();
            }
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn column_widths(rows: &[TableRow]) -> [usize; 4] {
    let mut widths = HEADER_CELLS.map(|cell| cell.chars().count());
    for row in rows {
        for (index, cell) in row.cells.iter().enumerate() {
            widths[index] = widths[index].max(cell.chars().count());
        }
    }
    widths
}

fn render_table(rows: &[TableRow], widths: &[usize; 4], with_header: bool) -> String {
    let mut out = String::new();
    out.push_str(FENCE_OPEN);
    out.push('\n');
    if with_header {
        out.push_str(&render_header_row(widths));
        out.push('\n');
        out.push_str(&render_separator_row(widths));
        out.push('\n');
    }
    for row in rows {
        out.push_str(&render_data_row(&row.cells, widths));
        out.push('\n');
    }
    out.push_str(FENCE_CLOSE);
    out
}

fn render_header_row(widths: &[usize; 4]) -> String {
    let mut out = String::from("|");
    for (index, cell) in HEADER_CELLS.iter().enumerate() {
        let pad = widths[index].saturating_sub(cell.chars().count());
        let left = pad / 2;
        out.push(' ');
        out.push_str(&" ".repeat(left));
        out.push_str(cell);
        out.push_str(&" ".repeat(pad - left));
        out.push(' ');
        out.push('|');
    }
    out
}

fn render_separator_row(widths: &[usize; 4]) -> String {
    let mut out = String::from("|");
    for width in widths {
        out.push_str(&"-".repeat(width + 2));
        out.push('|');
    }
    out
}

fn render_data_row(cells: &[String; 4], widths: &[usize; 4]) -> String {
    let mut out = String::from("|");
    for (index, cell) in cells.iter().enumerate() {
        let pad = widths[index].saturating_sub(cell.chars().count());
        out.push(' ');
        out.push_str(cell);
        out.push_str(&" ".repeat(pad));
        out.push(' ');
        out.push('|');
    }
    out
}

/// Decodes a published table (or the concatenation of its chunks) back
/// into the ordered list.
///
/// Rows with a parseable position start a new entry; rows without one
/// are continuations whose item text extends the previous entry's name
/// (joined directly when the name ends with the `-` break marker,
/// otherwise with a single space). Positions are renumbered densely on
/// the way out.
pub fn decode_table(
    text: &str,
    config: &ChannelListConfig,
    now: NaiveDateTime,
) -> Vec<ListEntry> {
    let now = truncate_to_minute(now);
    let mut entries: Vec<ListEntry> = Vec::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with("```") || !line.starts_with('|') {
            continue;
        }
        let cells: Vec<&str> = line.split('|').collect();
        let position_cell = cells.get(1).map(|cell| cell.trim()).unwrap_or("");
        if position_cell == HEADER_CELLS[0]
            || (!position_cell.is_empty() && position_cell.bytes().all(|byte| byte == b'-'))
        {
            continue;
        }
        let item_cell = cells.get(2).map(|cell| cell.trim()).unwrap_or("");
        if position_cell.parse::<u32>().is_ok() {
            if item_cell.is_empty() {
                continue;
            }
            let quantity = cells
                .get(3)
                .and_then(|cell| cell.trim().parse::<u32>().ok())
                .filter(|quantity| *quantity >= 1)
                .unwrap_or(1);
            let added = cells
                .get(4)
                .and_then(|cell| parse_short_date(cell.trim(), &config.date_format, now))
                .unwrap_or(now);
            entries.push(ListEntry {
                position: 0,
                name: item_cell.to_string(),
                quantity,
                added,
            });
        } else if !item_cell.is_empty() {
            if let Some(last) = entries.last_mut() {
                if last.name.ends_with('-') {
                    last.name.pop();
                    last.name.push_str(item_cell);
                } else {
                    last.name.push(' ');
                    last.name.push_str(item_cell);
                }
            }
        }
    }
    renumber(&mut entries);
    entries
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn config() -> ChannelListConfig {
        let mut config = ChannelListConfig::new("123", "groceries");
        config.date_format = "%d.%m.%y".to_string();
        config
    }

    fn day(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 12, day)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .unwrap()
    }

    fn entry(position: u32, name: &str, quantity: u32, added: NaiveDateTime) -> ListEntry {
        ListEntry {
            position,
            name: name.to_string(),
            quantity,
            added,
        }
    }

    #[test]
    fn short_names_render_one_row_each() {
        let entries = vec![entry(1, "12345 12345 12345", 1, day(27))];
        let expected = "```md\n".to_string()
            + "| # |       ITEM        | QTY |  ADDED   |\n"
            + "|---|-------------------|-----|----------|\n"
            + "| 1 | 12345 12345 12345 | 1   | 27.12.23 |\n"
            + "```";
        assert_eq!(encode_table(&entries, &config()), expected);
    }

    #[test]
    fn long_names_wrap_at_word_boundaries() {
        let entries = vec![entry(1, "12345 12345 12345 12345 12345", 1, day(27))];
        let expected = "```md\n".to_string()
            + "| # |       ITEM        | QTY |  ADDED   |\n"
            + "|---|-------------------|-----|----------|\n"
            + "| 1 | 12345 12345 12345 | 1   | 27.12.23 |\n"
            + "|   | 12345 12345       |     |          |\n"
            + "```";
        assert_eq!(encode_table(&entries, &config()), expected);
    }

    #[test]
    fn oversized_single_word_hard_splits_with_hyphen() {
        let entries = vec![entry(1, "1234512345123451234512345", 1, day(27))];
        let expected = "```md\n".to_string()
            + "| # |         ITEM         | QTY |  ADDED   |\n"
            + "|---|----------------------|-----|----------|\n"
            + "| 1 | 1234512345123451234- | 1   | 27.12.23 |\n"
            + "|   | 512345               |     |          |\n"
            + "```";
        assert_eq!(encode_table(&entries, &config()), expected);
    }

    #[test]
    fn oversized_word_after_short_word_splits_at_remaining_width() {
        let entries = vec![entry(1, "12345 1234512345123451234512345", 1, day(27))];
        let expected = "```md\n".to_string()
            + "| # |         ITEM         | QTY |  ADDED   |\n"
            + "|---|----------------------|-----|----------|\n"
            + "| 1 | 12345 1234512345123- | 1   | 27.12.23 |\n"
            + "|   | 451234512345         |     |          |\n"
            + "```";
        assert_eq!(encode_table(&entries, &config()), expected);
    }

    #[test]
    fn empty_list_renders_header_only() {
        let rendered = encode_table(&[], &config());
        assert_eq!(
            rendered,
            "```md\n| # | ITEM | QTY | ADDED |\n|---|------|-----|-------|\n```"
        );
        assert!(decode_table(&rendered, &config(), day(27)).is_empty());
    }

    #[test]
    fn decode_parses_simple_tables() {
        let table = "```md\n".to_string()
            + "| # |  ITEM  | QTY |  ADDED   |\n"
            + "|---|--------|-----|----------|\n"
            + "| 1 | eggs   | 4   | 24.12.23 |\n"
            + "| 2 | coffee | 1   | 25.12.23 |\n"
            + "| 3 | bacon  | 3   | 26.12.23 |\n"
            + "| 4 | milk   | 1   | 27.12.23 |\n"
            + "```";
        let decoded = decode_table(&table, &config(), day(28));
        assert_eq!(
            decoded,
            vec![
                entry(1, "eggs", 4, day(24)),
                entry(2, "coffee", 1, day(25)),
                entry(3, "bacon", 3, day(26)),
                entry(4, "milk", 1, day(27)),
            ]
        );
    }

    #[test]
    fn decode_merges_continuation_rows_with_space() {
        let table = "```md\n".to_string()
            + "| # |     ITEM     | QTY |  ADDED   |\n"
            + "|---|--------------|-----|----------|\n"
            + "| 1 | eggs         | 4   | 24.12.23 |\n"
            + "| 2 | coffee and   | 1   | 25.12.23 |\n"
            + "|   | more coffee  |     |          |\n"
            + "```";
        let decoded = decode_table(&table, &config(), day(28));
        assert_eq!(
            decoded,
            vec![
                entry(1, "eggs", 4, day(24)),
                entry(2, "coffee and more coffee", 1, day(25)),
            ]
        );
    }

    #[test]
    fn hyphen_break_round_trips_without_inserted_space() {
        let name = "1234512345123451234512345";
        let entries = vec![entry(1, name, 1, day(27))];
        let encoded = encode_table(&entries, &config());
        let decoded = decode_table(&encoded, &config(), day(27));
        assert_eq!(decoded, entries);
    }

    #[test]
    fn round_trip_preserves_lists_at_various_widths() {
        let entries = vec![
            entry(1, "eggs", 4, day(24)),
            entry(2, "a very long shopping item name", 2, day(25)),
            entry(3, "supercalifragilisticexpialidocious", 1, day(26)),
        ];
        for width in [1, 2, 5, 20, 80] {
            let mut config = config();
            config.max_cell_width = width;
            let encoded = encode_table(&entries, &config);
            assert_eq!(
                decode_table(&encoded, &config, day(27)),
                entries,
                "width {width}"
            );
        }
    }

    #[test]
    fn decode_defaults_unparseable_quantity_and_date() {
        let table = "```md\n".to_string()
            + "| # | ITEM | QTY |  ADDED   |\n"
            + "|---|------|-----|----------|\n"
            + "| 1 | eggs | x   | nonsense |\n"
            + "| y | milk | 2   | 24.12.23 |\n"
            + "```";
        let decoded = decode_table(&table, &config(), day(28));
        // row "y" has no position: its item text continues "eggs"
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].name, "eggs milk");
        assert_eq!(decoded[0].quantity, 1);
        assert_eq!(decoded[0].added, day(28));
    }

    #[test]
    fn decode_skips_foreign_text_entirely() {
        assert!(decode_table("just some chatter", &config(), day(28)).is_empty());
        assert!(decode_table("", &config(), day(28)).is_empty());
    }

    #[test]
    fn decode_renumbers_hand_edited_positions() {
        let table = "```md\n".to_string()
            + "| # | ITEM | QTY |  ADDED   |\n"
            + "|---|------|-----|----------|\n"
            + "| 4 | eggs | 4   | 24.12.23 |\n"
            + "| 9 | milk | 2   | 25.12.23 |\n"
            + "```";
        let decoded = decode_table(&table, &config(), day(28));
        assert_eq!(
            decoded
                .iter()
                .map(|entry| entry.position)
                .collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn chunks_split_at_entry_boundaries_and_stay_decodable() {
        let mut config = config();
        config.message_limit = 200;
        let entries: Vec<ListEntry> = (1..=12)
            .map(|index| entry(index, &format!("item number {index}"), index, day(27)))
            .collect();
        let chunks = encode_table_chunks(&entries, &config);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 200, "chunk over limit: {chunk}");
            assert!(chunk.starts_with("```md\n"));
            assert!(chunk.ends_with("```"));
        }
        let combined = chunks.join("\n");
        assert_eq!(decode_table(&combined, &config, day(27)), entries);
    }

    #[test]
    fn wrapped_entries_never_split_across_chunks() {
        let mut config = config();
        config.message_limit = 160;
        let entries: Vec<ListEntry> = (1..=6)
            .map(|index| {
                entry(
                    index,
                    "a rather long grocery item description that wraps",
                    1,
                    day(27),
                )
            })
            .collect();
        let chunks = encode_table_chunks(&entries, &config);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            // every chunk must decode to whole entries only
            for decoded in decode_table(chunk, &config, day(27)) {
                assert_eq!(
                    decoded.name,
                    "a rather long grocery item description that wraps"
                );
            }
        }
        let combined = chunks.join("\n");
        assert_eq!(decode_table(&combined, &config, day(27)).len(), 6);
    }

    #[test]
    fn single_chunk_when_table_fits() {
        let entries = vec![entry(1, "eggs", 4, day(24))];
        let chunks = encode_table_chunks(&entries, &config());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], encode_table(&entries, &config()));
    }
}
