use crate::annotate::Segment;
use crate::catalog::AgentPrompt;
use crate::pipeline::extract::{Event, EventField};

/// Byte budget per Discord message, under the 2000-char cap.
pub const MESSAGE_LIMIT: usize = 1990;

/// Widest a table cell may grow before it is cut.
const MAX_CELL_WIDTH: usize = 32;

pub const PIPELINE_DIAGRAM: &str = "```
                  ┌─► Analyzer 1 ─┐
Report (input) ───┼─► Analyzer 2 ─┼─► Consensus ───► Summary (output)
                  └─► Analyzer 3 ─┘
```";

/// Split `text` into pieces of at most `limit` bytes, preferring to break
/// after a newline, then after a space. Never splits inside a char.
pub fn split_chunks(text: &str, limit: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= limit {
            chunks.push(remaining);
            break;
        }

        let mut end = limit;
        while !remaining.is_char_boundary(end) {
            end -= 1;
        }
        let window = &remaining[..end];
        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .map(|i| i + 1)
            .unwrap_or(end);

        chunks.push(&remaining[..split_at]);
        remaining = &remaining[split_at..];
    }
    chunks
}

/// Cut `text` to `max_chars` characters, marking the cut with an ellipsis.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// Message body for a streaming step: a bold title and the text so far.
pub fn stream_preview(title: &str, text: &str) -> String {
    let header = format!("**{}**\n", title);
    let body = if text.is_empty() {
        "_waiting…_".to_string()
    } else {
        truncate_chars(text, preview_room(&header))
    };
    format!("{}{}", header, body)
}

fn preview_room(header: &str) -> usize {
    MESSAGE_LIMIT.saturating_sub(header.chars().count())
}

/// The tail of `text` that `stream_preview` cut off, if any. The preview
/// keeps everything before it, minus the ellipsis.
pub fn preview_overflow<'a>(title: &str, text: &'a str) -> Option<&'a str> {
    let room = preview_room(&format!("**{}**\n", title));
    if text.chars().count() <= room {
        return None;
    }
    let shown = room.saturating_sub(1);
    let start = text
        .char_indices()
        .nth(shown)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    Some(&text[start..])
}

pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '*' | '_' | '~' | '`' | '|' | '>') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn segment_markdown(segment: &Segment) -> String {
    let text = escape_markdown(segment.text());
    match segment.label() {
        Some(label) => format!("**{}** `{}`", text, label),
        None => text,
    }
}

/// Report text with labeled spans in bold followed by their label.
#[cfg(test)]
pub fn annotated_markdown(segments: &[Segment]) -> String {
    segments.iter().map(segment_markdown).collect()
}

/// Report text with labeled spans in bold followed by their label, split
/// into messages of at most `limit` bytes.
/// Breaks only between segments, or inside plain text that alone exceeds
/// the limit, so bold spans never straddle two messages.
pub fn annotated_chunks(segments: &[Segment], limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for segment in segments {
        let piece = segment_markdown(segment);
        if current.len() + piece.len() <= limit {
            current.push_str(&piece);
            continue;
        }
        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if piece.len() <= limit {
            current = piece;
            continue;
        }

        let mut parts = split_chunks(&piece, limit);
        if let Some(last) = parts.pop() {
            chunks.extend(parts.into_iter().map(str::to_string));
            current = last.to_string();
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Events as a fixed-width table, returned as one or more code blocks that
/// each fit in a single message.
pub fn event_table(events: &[Event]) -> Vec<String> {
    let rows: Vec<[String; 4]> = events
        .iter()
        .map(|event| {
            EventField::ALL.map(|field| {
                let value = event.field(field).unwrap_or_default().replace('\n', " ");
                truncate_chars(value.trim(), MAX_CELL_WIDTH)
            })
        })
        .collect();

    let mut widths = EventField::ALL.map(|field| field.heading().chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let format_row = |cells: [&str; 4]| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| {
                let pad = width - cell.chars().count();
                format!("{}{}", cell, " ".repeat(pad))
            })
            .collect();
        padded.join(" │ ").trim_end().to_string()
    };

    let header = format_row(EventField::ALL.map(EventField::heading));
    let rule = widths.map(|w| "─".repeat(w)).join("─┼─");

    let mut blocks = Vec::new();
    let mut block = String::new();
    for row in &rows {
        let line = format_row([&row[0], &row[1], &row[2], &row[3]].map(String::as_str));
        if !block.is_empty() && block.len() + line.len() + 5 > MESSAGE_LIMIT {
            blocks.push(format!("{}```", block));
            block.clear();
        }
        if block.is_empty() {
            block = format!("```\n{}\n{}\n", header, rule);
        }
        block.push_str(&line);
        block.push('\n');
    }
    if !block.is_empty() {
        blocks.push(format!("{}```", block));
    }
    blocks
}

/// Catalog listing: one line per prompt with the start of its text.
pub fn prompt_list(title: &str, prompts: &[AgentPrompt]) -> String {
    let mut out = format!("**{}**\n", title);
    if prompts.is_empty() {
        out.push_str("  _(none)_\n");
    }
    for p in prompts {
        let first_line = p.prompt.lines().next().unwrap_or_default();
        out.push_str(&format!(
            "  - `{}` — {}\n",
            p.name,
            escape_markdown(&truncate_chars(first_line, 80))
        ));
    }
    out
}
