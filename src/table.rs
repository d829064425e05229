use std::borrow::Cow;
use std::io::{self, Write};

/// Horizontal placement of a column's cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

/// Render an aligned plain-text table. Columns holding only numbers (after
/// the header) are right-aligned.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let alignments = (0..headers.len())
        .map(|idx| {
            let numeric = !rows.is_empty()
                && rows
                    .iter()
                    .filter_map(|row| row.get(idx))
                    .all(|cell| cell.is_empty() || looks_numeric(cell));
            if numeric { Align::Right } else { Align::Left }
        })
        .collect::<Vec<_>>();
    render_aligned(headers, rows, &alignments)
}

pub fn render_aligned(headers: &[String], rows: &[Vec<String>], alignments: &[Align]) -> String {
    let column_count = headers.len();
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(display_width(&sanitize_cell(cell)));
        }
    }
    for width in &mut widths {
        *width = (*width).max(3);
    }

    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let lines = [
        format_row(headers, &widths, alignments),
        format_row(&separator, &widths, &[]),
    ]
    .into_iter()
    .chain(rows.iter().map(|row| format_row(row, &widths, alignments)));

    let mut output = String::new();
    for line in lines {
        output.push_str(&line);
        output.push('\n');
    }
    output
}

/// Write `title` followed by the table, or `(no data)` when `rows` is empty.
pub fn print_section<W: Write>(
    out: &mut W,
    title: &str,
    headers: &[String],
    rows: &[Vec<String>],
) -> io::Result<()> {
    writeln!(out, "{title}")?;
    if rows.is_empty() {
        writeln!(out, "  (no data)")?;
    } else {
        write!(out, "{}", render_table(headers, rows))?;
    }
    writeln!(out)
}

fn format_row(values: &[String], widths: &[usize], alignments: &[Align]) -> String {
    let mut cells = Vec::with_capacity(widths.len());
    for (idx, width) in widths.iter().enumerate() {
        let value = values.get(idx).map(String::as_str).unwrap_or_default();
        let sanitized = sanitize_cell(value);
        let padding = " ".repeat(width.saturating_sub(display_width(&sanitized)));
        let cell = match alignments.get(idx) {
            Some(Align::Right) => format!("{padding}{sanitized}"),
            _ => format!("{sanitized}{padding}"),
        };
        cells.push(cell);
    }
    cells.join("  ").trim_end().to_string()
}

fn looks_numeric(value: &str) -> bool {
    let trimmed = value.trim().trim_end_matches('%');
    let trimmed = trimmed.trim_start_matches(|c: char| c.is_alphabetic() || c == '$').trim();
    !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-' | '+'))
        && trimmed.chars().any(|c| c.is_ascii_digit())
}

fn display_width(value: &str) -> usize {
    let mut width = 0usize;
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' {
            // ANSI colour sequences take no columns.
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            width += 1;
        }
    }
    width
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
