//! Block-level markdown/MDX parsing.
//!
//! Splits raw document text into a flat list of typed blocks, each covering
//! a contiguous span of source lines. MDX constructs (ESM imports/exports,
//! JSX elements, comments) are recognized so they can be pruned away before
//! sectioning; the one exception is a top-level `export const meta = { … }`
//! declaration, whose literal properties are extracted as the document's
//! metadata record.
//!
//! The parser is deliberately line-oriented: headings, fences, and blank
//! lines are the only boundaries sectioning cares about, and a line scanner
//! keeps the original source spans intact for canonical re-serialization.

use crate::error::{Result, SyncError};

/// Discriminant for block nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Heading,
    Paragraph,
    List,
    BlockQuote,
    CodeFence,
    Table,
    ThematicBreak,
    EsmImport,
    EsmExport,
    Jsx,
    Comment,
}

/// One block node covering the source lines `start..=end`.
#[derive(Debug, Clone)]
pub struct Block {
    pub kind: BlockKind,
    pub start: usize,
    pub end: usize,
    /// Heading depth (1-6), only for `BlockKind::Heading`.
    pub heading_level: u8,
    /// Heading text with the leading markers stripped, only for headings.
    pub heading_text: String,
}

/// Result of parsing one document: the block list, the original source
/// lines the blocks index into, and the extracted metadata record.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub blocks: Vec<Block>,
    pub lines: Vec<String>,
    pub meta: Option<serde_json::Value>,
}

/// Parse raw document text into blocks and extract metadata.
pub fn parse(path: &str, source: &str) -> Result<ParsedDocument> {
    let lines: Vec<String> = source.lines().map(String::from).collect();
    let mut blocks = Vec::new();
    let mut meta = None;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i].as_str();

        if line.trim().is_empty() {
            i += 1;
            continue;
        }

        if let Some((fence_char, fence_len)) = fence_start(line) {
            let start = i;
            i += 1;
            let mut closed = false;
            while i < lines.len() {
                if fence_close(&lines[i], fence_char, fence_len) {
                    closed = true;
                    break;
                }
                i += 1;
            }
            if !closed {
                return Err(SyncError::Parse {
                    path: path.to_string(),
                    message: format!("unterminated code fence opened on line {}", start + 1),
                });
            }
            blocks.push(simple_block(BlockKind::CodeFence, start, i));
            i += 1;
            continue;
        }

        if let Some((level, text)) = heading(line) {
            blocks.push(Block {
                kind: BlockKind::Heading,
                start: i,
                end: i,
                heading_level: level,
                heading_text: text.to_string(),
            });
            i += 1;
            continue;
        }

        if is_thematic_break(line) {
            blocks.push(simple_block(BlockKind::ThematicBreak, i, i));
            i += 1;
            continue;
        }

        if line.starts_with("import ") || line == "import" {
            let end = consume_until_boundary(&lines, i);
            blocks.push(simple_block(BlockKind::EsmImport, i, end));
            i = end + 1;
            continue;
        }

        if line.starts_with("export ") {
            if meta.is_none() && is_meta_export(line) {
                let (end, value) = parse_meta_block(path, &lines, i)?;
                meta = value;
                blocks.push(simple_block(BlockKind::EsmExport, i, end));
                i = end + 1;
            } else {
                let end = consume_until_boundary(&lines, i);
                blocks.push(simple_block(BlockKind::EsmExport, i, end));
                i = end + 1;
            }
            continue;
        }

        if line.starts_with("{/*") {
            let mut end = i;
            while end < lines.len() && !lines[end].contains("*/}") {
                end += 1;
            }
            let end = end.min(lines.len() - 1);
            blocks.push(simple_block(BlockKind::Comment, i, end));
            i = end + 1;
            continue;
        }

        if is_jsx_start(line) {
            let end = consume_until_boundary(&lines, i);
            blocks.push(simple_block(BlockKind::Jsx, i, end));
            i = end + 1;
            continue;
        }

        if line.trim_start().starts_with('>') {
            let end = consume_until_boundary(&lines, i);
            blocks.push(simple_block(BlockKind::BlockQuote, i, end));
            i = end + 1;
            continue;
        }

        if is_list_start(line) {
            let end = consume_until_boundary(&lines, i);
            blocks.push(simple_block(BlockKind::List, i, end));
            i = end + 1;
            continue;
        }

        if line.trim_start().starts_with('|') {
            let end = consume_until_boundary(&lines, i);
            blocks.push(simple_block(BlockKind::Table, i, end));
            i = end + 1;
            continue;
        }

        // Paragraph: runs until a blank line or a line that opens another
        // block kind (headings and fences interrupt paragraphs).
        let start = i;
        i += 1;
        while i < lines.len() {
            let l = lines[i].as_str();
            if l.trim().is_empty() || interrupts_paragraph(l) {
                break;
            }
            i += 1;
        }
        blocks.push(simple_block(BlockKind::Paragraph, start, i - 1));
    }

    Ok(ParsedDocument { blocks, lines, meta })
}

/// Block kinds removed before sectioning: everything that is not prose.
const PRUNED_KINDS: &[BlockKind] = &[
    BlockKind::EsmImport,
    BlockKind::EsmExport,
    BlockKind::Jsx,
    BlockKind::Comment,
];

/// Remove blocks whose kind fails the predicate.
pub fn filter_blocks<F>(blocks: Vec<Block>, keep: F) -> Vec<Block>
where
    F: Fn(BlockKind) -> bool,
{
    blocks.into_iter().filter(|b| keep(b.kind)).collect()
}

/// Drop all non-prose blocks, yielding the tree used for sectioning.
pub fn prune(blocks: Vec<Block>) -> Vec<Block> {
    filter_blocks(blocks, |kind| !PRUNED_KINDS.contains(&kind))
}

fn simple_block(kind: BlockKind, start: usize, end: usize) -> Block {
    Block {
        kind,
        start,
        end,
        heading_level: 0,
        heading_text: String::new(),
    }
}

fn heading(line: &str) -> Option<(u8, &str)> {
    let hashes = line.bytes().take_while(|&b| b == b'#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if rest.is_empty() {
        return Some((hashes as u8, ""));
    }
    if !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    Some((hashes as u8, rest.trim()))
}

fn fence_start(line: &str) -> Option<(char, usize)> {
    let trimmed = line.trim_start();
    for c in ['`', '~'] {
        let len = trimmed.chars().take_while(|&x| x == c).count();
        if len >= 3 {
            return Some((c, len));
        }
    }
    None
}

fn fence_close(line: &str, fence_char: char, fence_len: usize) -> bool {
    let trimmed = line.trim();
    let len = trimmed.chars().take_while(|&x| x == fence_char).count();
    len >= fence_len && trimmed.chars().all(|x| x == fence_char)
}

fn is_thematic_break(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= 3
        && ['-', '*', '_']
            .iter()
            .any(|&c| trimmed.chars().all(|x| x == c))
}

fn is_jsx_start(line: &str) -> bool {
    let trimmed = line.trim_start();
    let mut chars = trimmed.chars();
    if chars.next() != Some('<') {
        return false;
    }
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '/' || c == '>')
}

fn is_list_start(line: &str) -> bool {
    let trimmed = line.trim_start();
    if trimmed.starts_with("- ") || trimmed.starts_with("* ") || trimmed.starts_with("+ ") {
        return true;
    }
    let digits = trimmed.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return false;
    }
    let rest = &trimmed[digits..];
    rest.starts_with(". ") || rest.starts_with(") ")
}

fn interrupts_paragraph(line: &str) -> bool {
    heading(line).is_some()
        || fence_start(line).is_some()
        || is_thematic_break(line)
        || line.trim_start().starts_with('>')
        || is_list_start(line)
        || is_jsx_start(line)
        || line.starts_with("import ")
        || line.starts_with("export ")
        || line.starts_with("{/*")
}

/// Consume a multi-line block: it ends before a blank line or a line that
/// opens a structurally distinct block (heading, fence, thematic break).
fn consume_until_boundary(lines: &[String], start: usize) -> usize {
    let mut end = start;
    while end + 1 < lines.len() {
        let next = lines[end + 1].as_str();
        if next.trim().is_empty()
            || heading(next).is_some()
            || fence_start(next).is_some()
            || is_thematic_break(next)
        {
            break;
        }
        end += 1;
    }
    end
}

// ───────────────────────── meta extraction ─────────────────────────

fn is_meta_export(line: &str) -> bool {
    let rest = line.trim_start_matches("export ").trim_start();
    let rest = rest.strip_prefix("const ").unwrap_or(rest).trim_start();
    rest.starts_with("meta")
        && rest[4..].trim_start().starts_with('=')
}

/// Consume the `export const meta = { … }` block and extract its literal
/// properties. Returns the last source line of the block and the record.
fn parse_meta_block(
    path: &str,
    lines: &[String],
    start: usize,
) -> Result<(usize, Option<serde_json::Value>)> {
    // Gather lines until the braces balance (brace characters inside
    // string literals are ignored by the scanner below). A declaration
    // whose value never opens a brace at all, like `export const meta =
    // makeMeta()`, is not a literal record: the export ends at the next
    // blank line and no metadata is extracted.
    let mut buf = String::new();
    let mut end = start;
    loop {
        buf.push_str(&lines[end]);
        buf.push('\n');
        if braces_balanced(&buf) {
            break;
        }
        let at_break = end + 1 >= lines.len() || lines[end + 1].trim().is_empty();
        if at_break {
            if buf.contains('{') {
                return Err(SyncError::Parse {
                    path: path.to_string(),
                    message: format!("unterminated meta declaration on line {}", start + 1),
                });
            }
            return Ok((end, None));
        }
        end += 1;
    }

    let obj_start = match buf.find('{') {
        Some(pos) => pos,
        None => return Ok((end, None)),
    };
    let value = LiteralParser::new(&buf[obj_start..]).parse_object();
    Ok((end, value))
}

fn braces_balanced(text: &str) -> bool {
    let mut depth: i32 = 0;
    let mut seen_open = false;
    let mut in_string: Option<char> = None;
    let mut escaped = false;
    for c in text.chars() {
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => in_string = Some(c),
            '{' => {
                depth += 1;
                seen_open = true;
            }
            '}' => depth -= 1,
            _ => {}
        }
    }
    seen_open && depth == 0
}

/// Recursive-descent parser for the literal subset of a JS object
/// expression: strings, numbers, booleans, null, arrays, and nested
/// objects. Properties holding anything else (identifiers, calls,
/// template interpolation) are dropped rather than failing.
struct LiteralParser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> LiteralParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn parse_object(&mut self) -> Option<serde_json::Value> {
        self.skip_ws();
        if self.chars.next() != Some('{') {
            return None;
        }
        let mut map = serde_json::Map::new();
        loop {
            self.skip_ws();
            match self.chars.peek() {
                Some('}') => {
                    self.chars.next();
                    return Some(serde_json::Value::Object(map));
                }
                Some(',') => {
                    self.chars.next();
                    continue;
                }
                None => return Some(serde_json::Value::Object(map)),
                _ => {}
            }
            let key = match self.parse_key() {
                Some(key) => key,
                None => {
                    // Spread or computed key: drop the property.
                    self.skip_expression();
                    continue;
                }
            };
            self.skip_ws();
            if self.chars.peek() != Some(&':') {
                // Shorthand property, a computed value; skip it.
                self.skip_expression();
                continue;
            }
            self.chars.next();
            match self.parse_value() {
                Some(value) => {
                    // A literal followed by an operator (`'a' + b`) is a
                    // computed value after all.
                    self.skip_ws();
                    if matches!(self.chars.peek(), Some(',') | Some('}') | None) {
                        map.insert(key, value);
                    } else {
                        self.skip_expression();
                    }
                }
                None => {
                    // Non-literal value: drop the property, not the record.
                    self.skip_expression();
                }
            }
        }
    }

    fn parse_key(&mut self) -> Option<String> {
        self.skip_ws();
        match self.chars.peek() {
            Some('"') | Some('\'') => self.parse_string(),
            Some(c) if c.is_ascii_alphanumeric() || *c == '_' || *c == '$' => {
                let mut key = String::new();
                while let Some(&c) = self.chars.peek() {
                    if !(c.is_ascii_alphanumeric() || c == '_' || c == '$') {
                        break;
                    }
                    key.push(c);
                    self.chars.next();
                }
                Some(key)
            }
            _ => None,
        }
    }

    fn parse_value(&mut self) -> Option<serde_json::Value> {
        self.skip_ws();
        match self.chars.peek()? {
            '{' => self.parse_object(),
            '[' => self.parse_array(),
            '"' | '\'' => self.parse_string().map(serde_json::Value::String),
            '`' => self.parse_template(),
            c if c.is_ascii_digit() || *c == '-' || *c == '+' => self.parse_number(),
            _ => self.parse_word(),
        }
    }

    fn parse_array(&mut self) -> Option<serde_json::Value> {
        self.chars.next(); // '['
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.chars.peek() {
                Some(']') => {
                    self.chars.next();
                    return Some(serde_json::Value::Array(items));
                }
                Some(',') => {
                    self.chars.next();
                    continue;
                }
                None => return Some(serde_json::Value::Array(items)),
                _ => {}
            }
            // An array containing a non-literal element makes the whole
            // property non-literal.
            items.push(self.parse_value()?);
        }
    }

    fn parse_string(&mut self) -> Option<String> {
        let quote = self.chars.next()?;
        let mut out = String::new();
        let mut escaped = false;
        for c in self.chars.by_ref() {
            if escaped {
                out.push(c);
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                return Some(out);
            } else {
                out.push(c);
            }
        }
        None
    }

    fn parse_template(&mut self) -> Option<serde_json::Value> {
        self.chars.next(); // '`'
        let mut out = String::new();
        let mut escaped = false;
        let mut computed = false;
        while let Some(c) = self.chars.next() {
            if escaped {
                out.push(c);
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '`' {
                // Interpolation makes the template computed, not a literal.
                // The template is still consumed so the scanner stays in sync.
                return if computed {
                    None
                } else {
                    Some(serde_json::Value::String(out))
                };
            } else if c == '$' && self.chars.peek() == Some(&'{') {
                computed = true;
                self.chars.next();
                let mut depth = 1;
                for inner in self.chars.by_ref() {
                    match inner {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                }
            } else {
                out.push(c);
            }
        }
        None
    }

    fn parse_number(&mut self) -> Option<serde_json::Value> {
        let mut raw = String::new();
        if let Some(&c @ ('-' | '+')) = self.chars.peek() {
            raw.push(c);
            self.chars.next();
        }
        while let Some(&c) = self.chars.peek() {
            if !(c.is_ascii_digit() || c == '.') {
                break;
            }
            raw.push(c);
            self.chars.next();
        }
        serde_json::from_str::<serde_json::Number>(&raw)
            .ok()
            .map(serde_json::Value::Number)
    }

    fn parse_word(&mut self) -> Option<serde_json::Value> {
        let mut word = String::new();
        while let Some(&c) = self.chars.peek() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }
            word.push(c);
            self.chars.next();
        }
        match word.as_str() {
            "true" => Some(serde_json::Value::Bool(true)),
            "false" => Some(serde_json::Value::Bool(false)),
            "null" => Some(serde_json::Value::Null),
            // Identifier reference, call, etc.
            _ => None,
        }
    }

    /// Skip the remainder of a non-literal property value: everything up to
    /// the next comma or closing brace at the current nesting depth. Stray
    /// `]`/`)` closers left by a partially consumed value are swallowed so
    /// the scanner realigns with the enclosing object.
    fn skip_expression(&mut self) {
        let mut depth: i32 = 0;
        while let Some(&c) = self.chars.peek() {
            match c {
                '{' | '[' | '(' => depth += 1,
                '}' => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                ']' | ')' => {
                    if depth > 0 {
                        depth -= 1;
                    }
                }
                ',' if depth == 0 => return,
                '"' | '\'' | '`' => {
                    let _ = self.parse_string();
                    continue;
                }
                _ => {}
            }
            self.chars.next();
        }
    }
}
