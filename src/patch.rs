//! Text patches in the diff-match-patch textual format.
//!
//! A [`Patch`] is a list of [`Hunk`]s. Each hunk carries a little context
//! around its change so it can still be located after the base text has
//! drifted; [`Patch::apply`] reports per hunk whether it found a home.
//!
//! All offsets and lengths count Unicode scalar values.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use similar::{DiffTag, TextDiff};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Context kept on each side of a change when building hunks
const PATCH_MARGIN: usize = 4;
/// How far from the expected location a hunk may be found
const MATCH_DISTANCE: usize = 1000;
/// Worst acceptable fuzzy score (0.0 is a perfect match at the expected spot)
const MATCH_THRESHOLD: f32 = 0.5;
/// Longest pattern searched for fuzzily; longer hunks are anchored by their ends
const MATCH_MAX_BITS: usize = 32;
/// Largest share of a long hunk's text that may differ from what is found
const DELETE_THRESHOLD: f32 = 0.5;
/// Upper bound on any single diff computation
const DIFF_TIMEOUT: Duration = Duration::from_secs(1);

/// Characters left literal in hunk bodies, mirroring `encodeURI` plus space
const BODY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b' ')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b';')
    .remove(b',')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b'#');

/// One diff operation inside a hunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Equal(String),
    Delete(String),
    Insert(String),
}

impl Op {
    fn text(&self) -> &str {
        match self {
            Op::Equal(text) | Op::Delete(text) | Op::Insert(text) => text,
        }
    }

    fn char_len(&self) -> usize {
        self.text().chars().count()
    }
}

/// A contiguous change region plus its surrounding context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub start1: usize,
    pub start2: usize,
    pub length1: usize,
    pub length2: usize,
    pub ops: Vec<Op>,
}

impl Hunk {
    /// Text this hunk expects to find (context and deletions)
    pub fn source_text(&self) -> String {
        self.ops
            .iter()
            .filter(|op| !matches!(op, Op::Insert(_)))
            .map(Op::text)
            .collect()
    }

    /// Text this hunk leaves behind (context and insertions)
    pub fn target_text(&self) -> String {
        self.ops
            .iter()
            .filter(|op| !matches!(op, Op::Delete(_)))
            .map(Op::text)
            .collect()
    }
}

/// An ordered list of hunks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    pub hunks: Vec<Hunk>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("invalid hunk header {0:?}")]
    InvalidHeader(String),
    #[error("invalid patch line mode {mode:?} in {line:?}")]
    InvalidLine { mode: char, line: String },
    #[error("hunk body is not valid UTF-8 once decoded: {0:?}")]
    InvalidEncoding(String),
}

/// Create a patch turning `from` into `to`
pub fn make_patch(from: &str, to: &str) -> Patch {
    if from == to {
        return Patch::default();
    }

    let old: Vec<char> = from.chars().collect();
    let new: Vec<char> = to.chars().collect();
    let diff = char_diff(from, to);

    let mut hunks = Vec::new();
    for group in diff.grouped_ops(PATCH_MARGIN) {
        let Some(first) = group.first() else {
            continue;
        };

        let mut hunk = Hunk {
            start1: first.old_range().start,
            start2: first.new_range().start,
            length1: 0,
            length2: 0,
            ops: Vec::new(),
        };
        for op in &group {
            let (tag, old_range, new_range) = op.as_tag_tuple();
            hunk.length1 += old_range.len();
            hunk.length2 += new_range.len();
            push_ops(&mut hunk.ops, tag, &old[old_range], &new[new_range]);
        }

        if hunk.ops.iter().any(|op| !matches!(op, Op::Equal(_))) {
            hunks.push(hunk);
        }
    }

    Patch { hunks }
}

/// Char diff that gives up refining once the deadline passes
fn char_diff<'a>(from: &'a str, to: &'a str) -> TextDiff<'a, 'a, 'a, str> {
    TextDiff::configure().timeout(DIFF_TIMEOUT).diff_chars(from, to)
}

/// Levenshtein distance implied by an op list
fn edit_distance(ops: &[Op]) -> usize {
    let mut distance = 0;
    let mut inserted = 0;
    let mut deleted = 0;
    for op in ops {
        match op {
            Op::Insert(_) => inserted += op.char_len(),
            Op::Delete(_) => deleted += op.char_len(),
            Op::Equal(_) => {
                distance += inserted.max(deleted);
                inserted = 0;
                deleted = 0;
            }
        }
    }
    distance + inserted.max(deleted)
}

/// Char-level diff between two strings as a flat op list
fn diff_ops(from: &str, to: &str) -> Vec<Op> {
    let old: Vec<char> = from.chars().collect();
    let new: Vec<char> = to.chars().collect();
    let diff = char_diff(from, to);

    let mut ops = Vec::new();
    for op in diff.ops() {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        push_ops(&mut ops, tag, &old[old_range], &new[new_range]);
    }
    ops
}

fn push_ops(ops: &mut Vec<Op>, tag: DiffTag, old: &[char], new: &[char]) {
    let old: String = old.iter().collect();
    let new: String = new.iter().collect();
    match tag {
        DiffTag::Equal => push_op(ops, Op::Equal(old)),
        DiffTag::Delete => push_op(ops, Op::Delete(old)),
        DiffTag::Insert => push_op(ops, Op::Insert(new)),
        DiffTag::Replace => {
            push_op(ops, Op::Delete(old));
            push_op(ops, Op::Insert(new));
        }
    }
}

fn push_op(ops: &mut Vec<Op>, op: Op) {
    if !op.text().is_empty() {
        ops.push(op);
    }
}

impl Patch {
    pub fn len(&self) -> usize {
        self.hunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    /// Render in the textual patch format
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    /// Parse the textual patch format
    pub fn from_text(text: &str) -> Result<Self, PatchError> {
        let mut hunks = Vec::new();
        let mut lines = text.split('\n').peekable();

        while let Some(line) = lines.next() {
            if line.is_empty() {
                continue;
            }
            let (start1, length1, start2, length2) = parse_header(line)?;
            let mut hunk = Hunk {
                start1,
                start2,
                length1,
                length2,
                ops: Vec::new(),
            };

            while let Some(body) = lines.next_if(|next| !next.starts_with("@@")) {
                let mut chars = body.chars();
                let Some(mode) = chars.next() else {
                    continue;
                };
                let decoded = percent_decode_str(chars.as_str())
                    .decode_utf8()
                    .map_err(|_| PatchError::InvalidEncoding(body.to_string()))?
                    .into_owned();
                let op = match mode {
                    ' ' => Op::Equal(decoded),
                    '-' => Op::Delete(decoded),
                    '+' => Op::Insert(decoded),
                    _ => {
                        return Err(PatchError::InvalidLine {
                            mode,
                            line: body.to_string(),
                        })
                    }
                };
                push_op(&mut hunk.ops, op);
            }

            hunks.push(hunk);
        }

        Ok(Self { hunks })
    }

    /// Apply every hunk to `text`, locating each one fuzzily.
    ///
    /// Returns the patched text and one flag per hunk; a hunk that cannot be
    /// placed leaves the text untouched.
    pub fn apply(&self, text: &str) -> (String, Vec<bool>) {
        let mut chars: Vec<char> = text.chars().collect();
        let mut results = Vec::with_capacity(self.hunks.len());
        let mut delta: isize = 0;

        for hunk in &self.hunks {
            let expected = (hunk.start2 as isize + delta).max(0) as usize;
            let source: Vec<char> = hunk.source_text().chars().collect();

            let Some((start, end)) = find_region(&chars, &source, expected) else {
                results.push(false);
                delta -= hunk.length2 as isize - hunk.length1 as isize;
                continue;
            };
            delta = start as isize - expected as isize;

            if chars[start..end] == source[..] {
                chars.splice(start..end, hunk.target_text().chars());
            } else {
                // Found something close: map each edit through a diff of the
                // expected text against what is actually there.
                let source_str: String = source.iter().collect();
                let found: String = chars[start..end].iter().collect();
                let drift = diff_ops(&source_str, &found);
                if source.len() > MATCH_MAX_BITS
                    && edit_distance(&drift) as f32 / source.len() as f32 > DELETE_THRESHOLD
                {
                    results.push(false);
                    continue;
                }

                let mut index1 = 0;
                for op in &hunk.ops {
                    let len = op.char_len();
                    match op {
                        Op::Insert(inserted) => {
                            let at = (start + x_index(&drift, index1)).min(chars.len());
                            chars.splice(at..at, inserted.chars());
                        }
                        Op::Delete(_) => {
                            let from = (start + x_index(&drift, index1)).min(chars.len());
                            let to = (start + x_index(&drift, index1 + len)).min(chars.len());
                            chars.drain(from..to.max(from));
                        }
                        Op::Equal(_) => {}
                    }
                    if !matches!(op, Op::Delete(_)) {
                        index1 += len;
                    }
                }
            }
            results.push(true);
        }

        (chars.into_iter().collect(), results)
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for hunk in &self.hunks {
            writeln!(
                f,
                "@@ -{} +{} @@",
                format_coords(hunk.start1, hunk.length1),
                format_coords(hunk.start2, hunk.length2)
            )?;
            for op in &hunk.ops {
                let mode = match op {
                    Op::Equal(_) => ' ',
                    Op::Delete(_) => '-',
                    Op::Insert(_) => '+',
                };
                writeln!(f, "{}{}", mode, utf8_percent_encode(op.text(), BODY_ENCODE_SET))?;
            }
        }
        Ok(())
    }
}

fn format_coords(start: usize, length: usize) -> String {
    match length {
        0 => format!("{},0", start),
        1 => format!("{}", start + 1),
        _ => format!("{},{}", start + 1, length),
    }
}

fn parse_header(line: &str) -> Result<(usize, usize, usize, usize), PatchError> {
    let invalid = || PatchError::InvalidHeader(line.to_string());

    let inner = line
        .strip_prefix("@@ -")
        .and_then(|rest| rest.strip_suffix(" @@"))
        .ok_or_else(invalid)?;
    let (old, new) = inner.split_once(" +").ok_or_else(invalid)?;
    let (start1, length1) = parse_coords(old).ok_or_else(invalid)?;
    let (start2, length2) = parse_coords(new).ok_or_else(invalid)?;
    Ok((start1, length1, start2, length2))
}

fn parse_coords(coords: &str) -> Option<(usize, usize)> {
    match coords.split_once(',') {
        None => {
            let start: usize = coords.parse().ok()?;
            Some((start.checked_sub(1)?, 1))
        }
        Some((start, "0")) => Some((start.parse().ok()?, 0)),
        Some((start, length)) => {
            let start: usize = start.parse().ok()?;
            Some((start.checked_sub(1)?, length.parse().ok()?))
        }
    }
}

/// Char range of `text` holding a hunk's source, searched from `expected`
fn find_region(text: &[char], source: &[char], expected: usize) -> Option<(usize, usize)> {
    if source.len() <= MATCH_MAX_BITS {
        let start = locate(text, source, expected)?;
        return Some((start, (start + source.len()).min(text.len())));
    }

    let start = locate(text, &source[..MATCH_MAX_BITS], expected)?;
    let tail = &source[source.len() - MATCH_MAX_BITS..];
    let end = locate(text, tail, expected + source.len() - MATCH_MAX_BITS)?;
    (start < end).then(|| (start, (end + MATCH_MAX_BITS).min(text.len())))
}

/// Find where `pattern` best sits in `text`, starting from `loc`.
///
/// `pattern` is at most `MATCH_MAX_BITS` chars long.
fn locate(text: &[char], pattern: &[char], loc: usize) -> Option<usize> {
    let loc = loc.min(text.len());
    if pattern.is_empty() || text[loc..].starts_with(pattern) {
        return Some(loc);
    }

    let lo = loc.saturating_sub(MATCH_DISTANCE);
    if text.len() >= pattern.len() {
        let last = (loc + MATCH_DISTANCE).min(text.len() - pattern.len());
        let nearest = (lo..=last)
            .filter(|&start| text[start..].starts_with(pattern))
            .min_by_key(|&start| start.abs_diff(loc));
        if nearest.is_some() {
            return nearest;
        }
    }

    let pattern: String = pattern.iter().collect();
    let pattern_len = pattern.chars().count();
    let hi = (loc + MATCH_DISTANCE).min(text.len());

    let mut best: Option<(usize, f32)> = None;
    for start in lo..=hi {
        let end = (start + pattern_len).min(text.len());
        let window: String = text[start..end].iter().collect();
        let similarity = char_diff(&pattern, &window).ratio();
        let score = (1.0 - similarity) + start.abs_diff(loc) as f32 / MATCH_DISTANCE as f32;
        if score <= MATCH_THRESHOLD && best.map_or(true, |(_, s)| score < s) {
            best = Some((start, score));
        }
    }
    best.map(|(start, _)| start)
}

/// Map a char offset in the left side of `ops` to the right side
fn x_index(ops: &[Op], loc: usize) -> usize {
    let mut chars1 = 0;
    let mut chars2 = 0;
    let mut last_chars1 = 0;
    let mut last_chars2 = 0;
    let mut landed_in_delete = false;

    for op in ops {
        let len = op.char_len();
        if !matches!(op, Op::Insert(_)) {
            chars1 += len;
        }
        if !matches!(op, Op::Delete(_)) {
            chars2 += len;
        }
        if chars1 > loc {
            landed_in_delete = matches!(op, Op::Delete(_));
            break;
        }
        last_chars1 = chars1;
        last_chars2 = chars2;
    }

    if landed_in_delete {
        last_chars2
    } else {
        last_chars2 + (loc - last_chars1)
    }
}
