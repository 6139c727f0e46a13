//! Heading-based sectioning and slug derivation.
//!
//! Walks a pruned block list in document order. A new section begins at each
//! heading, and at the start of the document when the first block is not a
//! heading (a headerless preamble with no slug). Section content is the
//! original line span of its blocks, with a single blank line re-inserted
//! wherever source lines were skipped between kept blocks, so identical
//! input always serializes to byte-identical content.
//!
//! Heading text may carry an inline custom anchor, `Heading Text [#anchor]`;
//! the anchor token, not the heading text, is then the slug source.

use crate::markup::{Block, BlockKind};
use crate::models::SectionInput;
use std::collections::HashMap;

/// Approximate chars-per-token ratio used for section token estimates.
const CHARS_PER_TOKEN: usize = 4;

pub fn sectionize(blocks: &[Block], lines: &[String]) -> Vec<SectionInput> {
    let mut sections: Vec<(Option<String>, Vec<&Block>)> = Vec::new();

    for block in blocks {
        if block.kind == BlockKind::Heading {
            sections.push((Some(block.heading_text.clone()), vec![block]));
        } else if let Some(last) = sections.last_mut() {
            last.1.push(block);
        } else {
            // Headerless preamble.
            sections.push((None, vec![block]));
        }
    }

    let mut slug_counts: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::new();

    for (heading_raw, section_blocks) in sections {
        let content = serialize_span(&section_blocks, lines);
        let (heading, slug) = match heading_raw {
            Some(raw) => {
                let (text, anchor) = split_custom_anchor(&raw);
                let base = match anchor {
                    Some(a) => a,
                    None => slugify(&text),
                };
                let slug = dedup_slug(base, &mut slug_counts);
                (Some(text), Some(slug))
            }
            None => (None, None),
        };
        let token_count = (content.chars().count() / CHARS_PER_TOKEN) as i64;
        out.push(SectionInput {
            slug,
            heading,
            content,
            token_count,
        });
    }

    out
}

/// Re-serialize the line span covered by a run of blocks. A blank line is
/// inserted between blocks whose source lines were not adjacent (blank or
/// pruned lines sat between them).
fn serialize_span(blocks: &[&Block], lines: &[String]) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let mut prev_end: Option<usize> = None;

    for block in blocks {
        if let Some(prev) = prev_end {
            if block.start > prev + 1 {
                parts.push("");
            }
        }
        for line in &lines[block.start..=block.end] {
            parts.push(line);
        }
        prev_end = Some(block.end);
    }

    parts.join("\n").trim_end().to_string()
}

/// Split `Heading Text [#custom-anchor]` into (text, anchor).
fn split_custom_anchor(raw: &str) -> (String, Option<String>) {
    let trimmed = raw.trim();
    if let Some(open) = trimmed.rfind("[#") {
        if trimmed.ends_with(']') {
            let anchor = trimmed[open + 2..trimmed.len() - 1].trim();
            if !anchor.is_empty() {
                return (trimmed[..open].trim().to_string(), Some(anchor.to_string()));
            }
        }
    }
    (trimmed.to_string(), None)
}

/// Primary slug transform: lowercase, strip inline markup, keep
/// alphanumerics, collapse whitespace runs to single hyphens. Falls back to
/// a conservative ASCII sanitizer when the primary transform yields nothing;
/// a heading with no usable characters at all slugs as `section`.
fn slugify(text: &str) -> String {
    let stripped = strip_inline_markup(text);
    let mut slug = String::new();
    let mut pending_hyphen = false;

    for c in stripped.to_lowercase().chars() {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_hyphen = true;
        }
        // Remaining punctuation is dropped without acting as a separator.
    }

    if slug.is_empty() {
        let fallback = fallback_sanitize(text);
        if fallback.is_empty() {
            return "section".to_string();
        }
        return fallback;
    }
    slug
}

/// Conservative fallback: strip every character outside `[A-Za-z0-9 ]`,
/// then collapse space runs to single hyphens.
fn fallback_sanitize(text: &str) -> String {
    let kept: String = text
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join("-")
}

/// Remove inline emphasis/code markers and reduce links to their text.
fn strip_inline_markup(text: &str) -> String {
    let mut out = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' | '_' | '`' | '~' => {}
            '[' => {
                // `[label](target)` keeps only the label.
                let mut label = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == ']' {
                        closed = true;
                        break;
                    }
                    label.push(inner);
                }
                if closed && chars.peek() == Some(&'(') {
                    for inner in chars.by_ref() {
                        if inner == ')' {
                            break;
                        }
                    }
                    out.push_str(&label);
                } else {
                    out.push('[');
                    out.push_str(&label);
                    if closed {
                        out.push(']');
                    }
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Disambiguate duplicate slugs within one document: the n-th repeat of a
/// base slug gets an `-n` suffix.
fn dedup_slug(base: String, counts: &mut HashMap<String, usize>) -> String {
    let n = counts.entry(base.clone()).or_insert(0);
    let slug = if *n == 0 {
        base.clone()
    } else {
        format!("{}-{}", base, n)
    };
    *n += 1;
    slug
}
