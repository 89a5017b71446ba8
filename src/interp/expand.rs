//! Word Expansion Pipeline
//!
//! The staged pipeline per word: brace → tilde → parameter/command/
//! arithmetic substitution → field splitting → pathname expansion →
//! quote removal. The working representation is a list of byte segments,
//! each tagged with whether its source was quoted (steers glob-metachar
//! literalness) and whether it is an expansion result (only those
//! split). `$@` injects hard field breaks between positionals.

use crate::bytes::{self, Bytes};
use crate::interp::braces::expand_braces;
use crate::interp::engine::Executor;
use crate::interp::glob;
use crate::interp::interrupt::{Flow, Interrupt};
use crate::interp::params::{expand_param, ParamValue};
use crate::interp::state::ShellState;
use crate::interp::arith::eval_arith;
use crate::parser::ast::{HereDoc, Word, WordPart};

/// Output produced as a side effect of expansion: stderr from command
/// substitutions and the exit status of the last one (which becomes `$?`
/// for assignment-only commands).
#[derive(Debug, Default)]
pub struct ExpandSide {
    pub stderr: Bytes,
    pub last_status: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct Segment {
    pub bytes: Bytes,
    /// Quoted source: glob metacharacters are literal.
    pub quoted: bool,
    /// Expansion result: subject to field splitting.
    pub splittable: bool,
}

#[derive(Debug, Clone)]
enum Piece {
    Seg(Segment),
    /// Hard field boundary, from `$@` and `${a[@]}`.
    Break,
}

/// A field after splitting: bytes plus a parallel per-byte quoted mask.
#[derive(Debug, Clone, Default)]
pub struct Field {
    pub bytes: Bytes,
    pub mask: Vec<bool>,
}

impl Field {
    fn push_run(&mut self, run: &[u8], quoted: bool) {
        self.bytes.extend_from_slice(run);
        self.mask.extend(std::iter::repeat(quoted).take(run.len()));
    }
}

// =============================================================================
// Public entry points
// =============================================================================

/// Expand a list of words into an argv: the full pipeline, including
/// splitting and pathname expansion.
pub fn expand_words(
    ex: &Executor<'_>,
    st: &mut ShellState,
    words: &[Word],
    side: &mut ExpandSide,
) -> Flow<Vec<Bytes>> {
    let mut argv = Vec::new();
    for word in words {
        argv.extend(expand_word_fields(ex, st, word, side)?);
    }
    Ok(argv)
}

/// Expand one word into zero or more fields.
pub fn expand_word_fields(
    ex: &Executor<'_>,
    st: &mut ShellState,
    word: &Word,
    side: &mut ExpandSide,
) -> Flow<Vec<Bytes>> {
    let mut out = Vec::new();
    for brace_word in expand_braces(word)? {
        let pieces = expand_parts(ex, st, &brace_word.parts, false, side)?;
        let fields = split_fields(pieces, &st.ifs());
        for field in fields {
            ex.counters
                .borrow()
                .check_expansion_len(field.bytes.len(), ex.limits)?;
            if !st.flags.noglob
                && crate::interp::pattern::has_glob_magic(
                    &field.bytes,
                    Some(&field.mask),
                    st.options.extglob,
                )
            {
                match glob::expand_field(ex, st, &field)? {
                    Some(matches) => {
                        out.extend(matches);
                        continue;
                    }
                    None => {
                        if st.options.failglob {
                            return Err(Interrupt::glob(bytes::lossy_string(&field.bytes)));
                        }
                        if st.options.nullglob {
                            continue;
                        }
                    }
                }
            }
            out.push(field.bytes);
        }
    }
    Ok(out)
}

/// Expand a word to a single byte string: no brace expansion, no
/// splitting, no globbing. Used for assignment values, redirect targets,
/// and case scrutinees. `$@` joins with spaces here.
pub fn expand_word_single(
    ex: &Executor<'_>,
    st: &mut ShellState,
    word: &Word,
    side: &mut ExpandSide,
) -> Flow<Bytes> {
    let pieces = expand_parts(ex, st, &word.parts, false, side)?;
    let mut out = Bytes::new();
    let mut first = true;
    for piece in pieces {
        match piece {
            Piece::Seg(seg) => {
                out.extend_from_slice(&seg.bytes);
                first = false;
            }
            Piece::Break => {
                if !first {
                    out.push(b' ');
                }
            }
        }
    }
    ex.counters.borrow().check_expansion_len(out.len(), ex.limits)?;
    Ok(out)
}

/// Expand a word keeping the quoted mask, for pattern contexts
/// (case arms, trims, `${v/…}`).
pub fn expand_word_pattern(
    ex: &Executor<'_>,
    st: &mut ShellState,
    word: &Word,
    side: &mut ExpandSide,
) -> Flow<Field> {
    let pieces = expand_parts(ex, st, &word.parts, false, side)?;
    let mut field = Field::default();
    for piece in pieces {
        if let Piece::Seg(seg) = piece {
            field.push_run(&seg.bytes, seg.quoted);
        }
    }
    Ok(field)
}

/// Expand a heredoc body to the stdin bytes it provides.
pub fn expand_heredoc(
    ex: &Executor<'_>,
    st: &mut ShellState,
    doc: &HereDoc,
    side: &mut ExpandSide,
) -> Flow<Bytes> {
    let pieces = expand_parts(ex, st, &doc.body.parts, true, side)?;
    let mut out = Bytes::new();
    for piece in pieces {
        if let Piece::Seg(seg) = piece {
            out.extend_from_slice(&seg.bytes);
        }
    }
    Ok(out)
}

// =============================================================================
// Part expansion
// =============================================================================

fn seg(bytes: Bytes, quoted: bool, splittable: bool) -> Piece {
    Piece::Seg(Segment { bytes, quoted, splittable })
}

fn expand_parts(
    ex: &Executor<'_>,
    st: &mut ShellState,
    parts: &[WordPart],
    in_dquote: bool,
    side: &mut ExpandSide,
) -> Flow<Vec<Piece>> {
    let mut pieces = Vec::new();
    for part in parts {
        match part {
            WordPart::Literal(text) => {
                pieces.push(seg(text.clone().into_bytes(), in_dquote, false));
            }
            WordPart::SingleQuoted(text) => {
                pieces.push(seg(text.clone().into_bytes(), true, false));
            }
            WordPart::Escaped(c) => {
                let mut buf = [0u8; 4];
                pieces.push(seg(c.encode_utf8(&mut buf).as_bytes().to_vec(), true, false));
            }
            WordPart::Bytes(raw) => {
                pieces.push(seg(raw.clone(), true, false));
            }
            WordPart::DoubleQuoted(inner) => {
                let inner_pieces = expand_parts(ex, st, inner, true, side)?;
                if inner_pieces.iter().all(|p| matches!(p, Piece::Seg(s) if s.bytes.is_empty()))
                    && !inner_pieces.iter().any(|p| matches!(p, Piece::Break))
                {
                    // A quoted-empty expansion still contributes one
                    // empty field.
                    pieces.push(seg(Bytes::new(), true, false));
                } else {
                    pieces.extend(inner_pieces);
                }
            }
            WordPart::Param(pe) => {
                let value = expand_param(ex, st, pe, in_dquote, side)?;
                match value {
                    ParamValue::Single(bytes) => {
                        pieces.push(seg(bytes, in_dquote, !in_dquote));
                    }
                    ParamValue::Fields(items) => {
                        for (i, item) in items.into_iter().enumerate() {
                            if i > 0 {
                                pieces.push(Piece::Break);
                            }
                            pieces.push(seg(item, in_dquote, !in_dquote));
                        }
                    }
                }
            }
            WordPart::CommandSub { statements, .. } => {
                let result = ex.run_substitution(st, statements)?;
                side.stderr.extend_from_slice(&result.stderr);
                side.last_status = Some(result.exit_code);
                st.last_exit = result.exit_code;
                let stdout = bytes::trim_trailing_newlines(result.stdout);
                pieces.push(seg(stdout, in_dquote, !in_dquote));
            }
            WordPart::ArithSub(expr) => {
                let value = eval_arith(st, expr)?;
                pieces.push(seg(value.to_string().into_bytes(), in_dquote, !in_dquote));
            }
            WordPart::Tilde(user) => {
                let resolved = expand_tilde(ex, st, user.as_deref());
                pieces.push(seg(resolved, true, false));
            }
            WordPart::ProcessSub { write, statements } => {
                let path = ex.process_substitution(st, *write, statements, side)?;
                pieces.push(seg(path, true, false));
            }
        }
    }
    Ok(pieces)
}

fn expand_tilde(ex: &Executor<'_>, st: &ShellState, user: Option<&str>) -> Bytes {
    match user {
        None => st
            .scopes
            .get_scalar("HOME")
            .map(|b| b.to_vec())
            .unwrap_or_else(|| b"~".to_vec()),
        Some("+") => st.cwd.clone().into_bytes(),
        Some("-") => st.prev_dir.clone().into_bytes(),
        Some(name) => {
            let home = format!("/home/{}", name);
            if ex.fs.is_dir(&home) {
                home.into_bytes()
            } else {
                format!("~{}", name).into_bytes()
            }
        }
    }
}

// =============================================================================
// Field splitting
// =============================================================================

fn split_fields(pieces: Vec<Piece>, ifs: &[u8]) -> Vec<Field> {
    let ifs_ws: Vec<u8> = ifs.iter().copied().filter(|b| b" \t\n".contains(b)).collect();
    let ifs_other: Vec<u8> = ifs.iter().copied().filter(|b| !b" \t\n".contains(b)).collect();

    let mut fields: Vec<Field> = Vec::new();
    let mut current = Field::default();
    let mut started = false;

    for piece in pieces {
        match piece {
            Piece::Break => {
                if started {
                    fields.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            Piece::Seg(segment) => {
                if segment.splittable && !ifs.is_empty() {
                    for &b in &segment.bytes {
                        if ifs_ws.contains(&b) {
                            if started {
                                fields.push(std::mem::take(&mut current));
                                started = false;
                            }
                        } else if ifs_other.contains(&b) {
                            fields.push(std::mem::take(&mut current));
                            started = false;
                        } else {
                            current.push_run(&[b], segment.quoted);
                            started = true;
                        }
                    }
                } else {
                    current.push_run(&segment.bytes, segment.quoted);
                    started = true;
                }
            }
        }
    }
    if started {
        fields.push(current);
    }
    fields
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn split(pieces: Vec<Piece>, ifs: &[u8]) -> Vec<Bytes> {
        split_fields(pieces, ifs).into_iter().map(|f| f.bytes).collect()
    }

    fn expansion(text: &str) -> Piece {
        seg(text.as_bytes().to_vec(), false, true)
    }

    fn literal(text: &str) -> Piece {
        seg(text.as_bytes().to_vec(), false, false)
    }

    fn quoted(text: &str) -> Piece {
        seg(text.as_bytes().to_vec(), true, false)
    }

    #[test]
    fn test_split_basic() {
        assert_eq!(split(vec![expansion("a b  c")], b" \t\n"), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_split_leading_trailing_ws() {
        assert_eq!(split(vec![expansion("  a b  ")], b" \t\n"), vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn test_literal_text_does_not_split() {
        assert_eq!(split(vec![literal("a b")], b" \t\n"), vec![b"a b".to_vec()]);
    }

    #[test]
    fn test_quoted_does_not_split() {
        assert_eq!(split(vec![quoted("a b")], b" \t\n"), vec![b"a b".to_vec()]);
    }

    #[test]
    fn test_unquoted_empty_yields_zero_fields() {
        assert_eq!(split(vec![expansion("")], b" \t\n"), Vec::<Bytes>::new());
    }

    #[test]
    fn test_quoted_empty_yields_one_field() {
        assert_eq!(split(vec![quoted("")], b" \t\n"), vec![b"".to_vec()]);
    }

    #[test]
    fn test_adjacent_segments_join() {
        assert_eq!(
            split(vec![literal("pre"), expansion("fix mid"), literal("post")], b" \t\n"),
            vec![b"prefix".to_vec(), b"midpost".to_vec()]
        );
    }

    #[test]
    fn test_custom_ifs_non_whitespace() {
        assert_eq!(
            split(vec![expansion("a,b,,c")], b","),
            vec![b"a".to_vec(), b"b".to_vec(), b"".to_vec(), b"c".to_vec()]
        );
    }

    #[test]
    fn test_custom_ifs_leading_delimiter() {
        assert_eq!(split(vec![expansion(",a")], b","), vec![b"".to_vec(), b"a".to_vec()]);
    }

    #[test]
    fn test_custom_ifs_trailing_delimiter_dropped() {
        assert_eq!(split(vec![expansion("a,")], b","), vec![b"a".to_vec()]);
    }

    #[test]
    fn test_break_separates_fields() {
        let pieces = vec![quoted("a"), Piece::Break, quoted("b")];
        assert_eq!(split(pieces, b" \t\n"), vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn test_break_with_surrounding_text() {
        // "x$@y" with args (a, b) → "xa", "by".
        let pieces = vec![literal("x"), quoted("a"), Piece::Break, quoted("b"), literal("y")];
        assert_eq!(split(pieces, b" \t\n"), vec![b"xa".to_vec(), b"by".to_vec()]);
    }

    #[test]
    fn test_empty_quoted_positionals_kept() {
        // "$@" with args ("", "") → two empty fields.
        let pieces = vec![quoted(""), Piece::Break, quoted("")];
        assert_eq!(split(pieces, b" \t\n"), vec![b"".to_vec(), b"".to_vec()]);
    }

    #[test]
    fn test_raw_bytes_survive_splitting() {
        let pieces = vec![seg(vec![0xff, b' ', 0xfe], false, true)];
        assert_eq!(split(pieces, b" \t\n"), vec![vec![0xff], vec![0xfe]]);
    }

    #[test]
    fn test_empty_ifs_no_split() {
        assert_eq!(split(vec![expansion("a b")], b""), vec![b"a b".to_vec()]);
    }

    #[test]
    fn test_mask_tracks_quoting() {
        let fields = split_fields(
            vec![quoted("*"), seg(b".txt".to_vec(), false, false)],
            b" \t\n",
        );
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].bytes, b"*.txt");
        assert_eq!(fields[0].mask, vec![true, false, false, false, false]);
    }
}
