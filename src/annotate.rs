use tracing::debug;

/// A span of text to highlight, with the category it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledPhrase {
    pub phrase: String,
    pub label: String,
}

impl LabeledPhrase {
    pub fn new(phrase: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            phrase: phrase.into(),
            label: label.into(),
        }
    }
}

/// One piece of annotated output: untouched source text or a labeled span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Plain(String),
    /// `text` keeps the casing found in the source, not the phrase's.
    Labeled { text: String, label: String },
}

impl Segment {
    pub fn text(&self) -> &str {
        match self {
            Segment::Plain(text) => text,
            Segment::Labeled { text, .. } => text,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Segment::Plain(_) => None,
            Segment::Labeled { label, .. } => Some(label),
        }
    }
}

/// Split `text` into plain and labeled segments.
///
/// Phrases are ranked by their first case-insensitive occurrence anywhere in
/// `text` (stable, so ties keep input order), then placed left to right from
/// a moving cursor. A phrase with no occurrence at or after the cursor is
/// dropped without producing a segment. The output always ends with a plain
/// segment holding whatever follows the last labeled span, even if empty.
///
/// Concatenating `Segment::text` over the result yields `text` unchanged.
pub fn annotate(text: &str, phrases: &[LabeledPhrase]) -> Vec<Segment> {
    let mut ranked: Vec<(Option<usize>, &LabeledPhrase)> = phrases
        .iter()
        .filter(|p| !p.phrase.is_empty())
        .map(|p| (find_ci(text, &p.phrase, 0).map(|(start, _)| start), p))
        .collect();
    // None sorts before Some: phrases absent from the text rank first and
    // are then skipped during placement.
    ranked.sort_by_key(|(first, _)| *first);

    let mut segments = Vec::with_capacity(ranked.len() * 2 + 1);
    let mut last_idx = 0;

    for (_, phrase) in ranked {
        let Some((start, end)) = find_ci(text, &phrase.phrase, last_idx) else {
            debug!(
                phrase = %phrase.phrase,
                label = %phrase.label,
                cursor = last_idx,
                "Phrase not found after cursor, skipped"
            );
            continue;
        };

        if start > last_idx {
            segments.push(Segment::Plain(text[last_idx..start].to_string()));
        }
        segments.push(Segment::Labeled {
            text: text[start..end].to_string(),
            label: phrase.label.clone(),
        });
        last_idx = end;
    }

    segments.push(Segment::Plain(text[last_idx..].to_string()));
    segments
}

/// Case-insensitive search for `needle` in `haystack[from..]`.
/// Returns the byte range of the match in `haystack`. `from` must lie on a
/// char boundary.
fn find_ci(haystack: &str, needle: &str, from: usize) -> Option<(usize, usize)> {
    let folded: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    if folded.is_empty() {
        return None;
    }

    haystack[from..].char_indices().find_map(|(offset, _)| {
        let start = from + offset;
        match_at(haystack, start, &folded).map(|end| (start, end))
    })
}

/// Match the lowercase-folded `needle` against `haystack` starting at byte
/// `start`. The match must end on a char boundary of `haystack`.
fn match_at(haystack: &str, start: usize, needle: &[char]) -> Option<usize> {
    let mut remaining = needle;

    for (offset, c) in haystack[start..].char_indices() {
        if remaining.is_empty() {
            return Some(start + offset);
        }
        for folded in c.to_lowercase() {
            let (expected, rest) = remaining.split_first()?;
            if *expected != folded {
                return None;
            }
            remaining = rest;
        }
    }

    remaining.is_empty().then_some(haystack.len())
}
