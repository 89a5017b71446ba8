//! Word Scanner
//!
//! Turns raw characters into the typed word-part structure: quoting
//! modes, escapes, ANSI-C strings, tilde prefixes, and the `${…}`
//! parameter sub-grammar. Substitution bodies (`$(…)`, backticks,
//! process substitution) are captured balanced and parsed recursively.

use crate::bytes::Bytes;
use crate::parser::ast::{
    ParamExpansion, ParamOp, ReplaceMode, Statement, Subscript, Word, WordPart,
};
use crate::parser::{parse_statements, ParseError};

/// Character cursor shared by the lexer and the word scanner.
pub struct CharStream {
    chars: Vec<char>,
    pos: usize,
    pub line: u32,
}

impl CharStream {
    pub fn new(source: &str) -> Self {
        Self { chars: source.chars().collect(), pos: 0, line: 1 }
    }

    pub fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    pub fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    pub fn advance(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied();
        if let Some(c) = c {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
            }
        }
        c
    }

    pub fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn rewind_to(&mut self, pos: usize, line: u32) {
        self.pos = pos;
        self.line = line;
    }

    /// Consume a `\` + newline line continuation if present.
    pub fn eat_continuation(&mut self) -> bool {
        if self.peek() == Some('\\') && self.peek_at(1) == Some('\n') {
            self.advance();
            self.advance();
            true
        } else {
            false
        }
    }
}

fn err(cs: &CharStream, message: impl Into<String>) -> ParseError {
    ParseError { message: message.into(), line: cs.line }
}

/// Characters that terminate an unquoted word.
pub fn is_word_end(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '|' | '&' | ';' | '<' | '>' | '(' | ')')
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Scan one word starting at a non-metacharacter.
pub fn scan_word(cs: &mut CharStream) -> Result<Word, ParseError> {
    let mut parts: Vec<WordPart> = Vec::new();
    let mut literal = String::new();
    let at_word_start = |parts: &[WordPart], lit: &str| parts.is_empty() && lit.is_empty();

    loop {
        if cs.eat_continuation() {
            continue;
        }
        let c = match cs.peek() {
            Some(c) => c,
            None => break,
        };
        if is_word_end(c) {
            // `<(` / `>(` are process substitutions, not word ends.
            if (c == '<' || c == '>') && cs.peek_at(1) == Some('(') {
                flush(&mut parts, &mut literal);
                cs.advance();
                cs.advance();
                let statements = scan_balanced_statements(cs, ')')?;
                parts.push(WordPart::ProcessSub { write: c == '>', statements });
                continue;
            }
            break;
        }
        match c {
            '\'' => {
                flush(&mut parts, &mut literal);
                cs.advance();
                parts.push(WordPart::SingleQuoted(scan_single_quoted(cs)?));
            }
            '"' => {
                flush(&mut parts, &mut literal);
                cs.advance();
                parts.push(WordPart::DoubleQuoted(scan_double_quoted(cs)?));
            }
            '\\' => {
                cs.advance();
                match cs.advance() {
                    Some(esc) => {
                        flush(&mut parts, &mut literal);
                        parts.push(WordPart::Escaped(esc));
                    }
                    None => literal.push('\\'),
                }
            }
            '$' => {
                cs.advance();
                match scan_dollar(cs, false)? {
                    Some(part) => {
                        flush(&mut parts, &mut literal);
                        parts.push(part);
                    }
                    None => literal.push('$'),
                }
            }
            '`' => {
                flush(&mut parts, &mut literal);
                cs.advance();
                parts.push(scan_backtick(cs)?);
            }
            '~' if at_word_start(&parts, &literal) => {
                cs.advance();
                let mut user = String::new();
                while let Some(n) = cs.peek() {
                    if n == '/' || is_word_end(n) || n == '\'' || n == '"' || n == '$' || n == '`' || n == '\\' {
                        break;
                    }
                    user.push(n);
                    cs.advance();
                }
                parts.push(WordPart::Tilde(if user.is_empty() { None } else { Some(user) }));
            }
            _ => {
                literal.push(c);
                cs.advance();
            }
        }
    }

    flush(&mut parts, &mut literal);
    if parts.is_empty() {
        parts.push(WordPart::Literal(String::new()));
    }
    Ok(Word { parts })
}

fn flush(parts: &mut Vec<WordPart>, literal: &mut String) {
    if !literal.is_empty() {
        parts.push(WordPart::Literal(std::mem::take(literal)));
    }
}

fn scan_single_quoted(cs: &mut CharStream) -> Result<String, ParseError> {
    let mut out = String::new();
    loop {
        match cs.advance() {
            Some('\'') => return Ok(out),
            Some(c) => out.push(c),
            None => return Err(err(cs, "syntax error: unexpected end of file looking for `''")),
        }
    }
}

/// Scan the interior of `"…"` into parts.
pub fn scan_double_quoted(cs: &mut CharStream) -> Result<Vec<WordPart>, ParseError> {
    let mut parts: Vec<WordPart> = Vec::new();
    let mut literal = String::new();
    loop {
        let c = match cs.advance() {
            Some(c) => c,
            None => return Err(err(cs, "syntax error: unexpected end of file looking for `\"'")),
        };
        match c {
            '"' => break,
            '\\' => match cs.peek() {
                Some(n @ ('$' | '`' | '"' | '\\')) => {
                    cs.advance();
                    flush(&mut parts, &mut literal);
                    parts.push(WordPart::Escaped(n));
                }
                Some('\n') => {
                    cs.advance();
                }
                _ => literal.push('\\'),
            },
            '$' => match scan_dollar(cs, true)? {
                Some(part) => {
                    flush(&mut parts, &mut literal);
                    parts.push(part);
                }
                None => literal.push('$'),
            },
            '`' => {
                flush(&mut parts, &mut literal);
                parts.push(scan_backtick(cs)?);
            }
            _ => literal.push(c),
        }
    }
    flush(&mut parts, &mut literal);
    Ok(parts)
}

/// After a consumed `$`, scan the expansion that follows (or None if the
/// dollar is literal).
fn scan_dollar(cs: &mut CharStream, in_dquote: bool) -> Result<Option<WordPart>, ParseError> {
    match cs.peek() {
        Some('\'') if !in_dquote => {
            cs.advance();
            Ok(Some(WordPart::Bytes(scan_ansi_c(cs)?)))
        }
        // Locale quoting `$"…"` behaves as plain double quotes here.
        Some('"') if !in_dquote => {
            cs.advance();
            Ok(Some(WordPart::DoubleQuoted(scan_double_quoted(cs)?)))
        }
        Some('{') => {
            cs.advance();
            scan_braced_param(cs).map(Some)
        }
        Some('(') => {
            cs.advance();
            if cs.peek() == Some('(') {
                // Try arithmetic `$((…))`; fall back to a command
                // substitution whose body starts with a subshell.
                let mark = cs.position();
                let line = cs.line;
                cs.advance();
                match scan_arith_text(cs) {
                    Ok(expr) => return Ok(Some(WordPart::ArithSub(expr))),
                    Err(_) => cs.rewind_to(mark, line),
                }
            }
            let statements = scan_balanced_statements(cs, ')')?;
            Ok(Some(WordPart::CommandSub { statements, backtick: false }))
        }
        Some(c) if is_name_start(c) => {
            let mut name = String::new();
            while let Some(n) = cs.peek() {
                if is_name_char(n) {
                    name.push(n);
                    cs.advance();
                } else {
                    break;
                }
            }
            Ok(Some(WordPart::Param(Box::new(ParamExpansion::plain(name)))))
        }
        Some(c) if c.is_ascii_digit() => {
            cs.advance();
            Ok(Some(WordPart::Param(Box::new(ParamExpansion::plain(c.to_string())))))
        }
        Some(c @ ('#' | '?' | '@' | '*' | '$' | '!' | '-' | '_')) => {
            cs.advance();
            Ok(Some(WordPart::Param(Box::new(ParamExpansion::plain(c.to_string())))))
        }
        _ => Ok(None),
    }
}

/// Decode ANSI-C `$'…'` escapes into raw bytes.
fn scan_ansi_c(cs: &mut CharStream) -> Result<Bytes, ParseError> {
    let mut out = Bytes::new();
    loop {
        let c = match cs.advance() {
            Some(c) => c,
            None => return Err(err(cs, "syntax error: unexpected end of file looking for `''")),
        };
        match c {
            '\'' => return Ok(out),
            '\\' => {
                let esc = match cs.advance() {
                    Some(e) => e,
                    None => {
                        out.push(b'\\');
                        continue;
                    }
                };
                match esc {
                    'n' => out.push(b'\n'),
                    't' => out.push(b'\t'),
                    'r' => out.push(b'\r'),
                    'a' => out.push(0x07),
                    'b' => out.push(0x08),
                    'e' | 'E' => out.push(0x1b),
                    'f' => out.push(0x0c),
                    'v' => out.push(0x0b),
                    '\\' => out.push(b'\\'),
                    '\'' => out.push(b'\''),
                    '"' => out.push(b'"'),
                    '?' => out.push(b'?'),
                    'x' => {
                        let mut value: u32 = 0;
                        let mut digits = 0;
                        while digits < 2 {
                            match cs.peek().and_then(|c| c.to_digit(16)) {
                                Some(d) => {
                                    value = value * 16 + d;
                                    cs.advance();
                                    digits += 1;
                                }
                                None => break,
                            }
                        }
                        if digits == 0 {
                            out.extend_from_slice(b"\\x");
                        } else {
                            out.push(value as u8);
                        }
                    }
                    '0'..='7' => {
                        let mut value: u32 = esc.to_digit(8).unwrap_or(0);
                        let mut digits = 1;
                        while digits < 3 {
                            match cs.peek().and_then(|c| c.to_digit(8)) {
                                Some(d) => {
                                    value = value * 8 + d;
                                    cs.advance();
                                    digits += 1;
                                }
                                None => break,
                            }
                        }
                        out.push((value & 0xff) as u8);
                    }
                    'u' | 'U' => {
                        let width = if esc == 'u' { 4 } else { 8 };
                        let mut value: u32 = 0;
                        let mut digits = 0;
                        while digits < width {
                            match cs.peek().and_then(|c| c.to_digit(16)) {
                                Some(d) => {
                                    value = value * 16 + d;
                                    cs.advance();
                                    digits += 1;
                                }
                                None => break,
                            }
                        }
                        if digits == 0 {
                            out.push(b'\\');
                            out.push(esc as u8);
                        } else if let Some(ch) = char::from_u32(value) {
                            let mut buf = [0u8; 4];
                            out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                        }
                    }
                    'c' => {
                        if let Some(ctl) = cs.advance() {
                            out.push((ctl.to_ascii_uppercase() as u8) ^ 0x40);
                        }
                    }
                    other => {
                        out.push(b'\\');
                        let mut buf = [0u8; 4];
                        out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
                    }
                }
            }
            _ => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}

/// Capture a balanced span after an opening delimiter and parse it as
/// statements. Quoted spans and nested substitutions are skipped over.
fn scan_balanced_statements(cs: &mut CharStream, close: char) -> Result<Vec<Statement>, ParseError> {
    let open = match close {
        ')' => '(',
        '}' => '{',
        _ => '(',
    };
    let text = capture_balanced(cs, open, close)?;
    parse_statements(&text)
}

/// Capture source text until the matching `close`, tracking quote state.
/// The closing delimiter is consumed but excluded from the result.
fn capture_balanced(cs: &mut CharStream, open: char, close: char) -> Result<String, ParseError> {
    let mut depth = 1usize;
    let mut out = String::new();
    loop {
        let c = match cs.advance() {
            Some(c) => c,
            None => {
                return Err(err(cs, format!("syntax error: unexpected end of file looking for `{}'", close)));
            }
        };
        if c == '\\' {
            out.push(c);
            if let Some(n) = cs.advance() {
                out.push(n);
            }
            continue;
        }
        if c == '\'' {
            out.push(c);
            loop {
                match cs.advance() {
                    Some('\'') => {
                        out.push('\'');
                        break;
                    }
                    Some(inner) => out.push(inner),
                    None => {
                        return Err(err(cs, "syntax error: unexpected end of file looking for `''"));
                    }
                }
            }
            continue;
        }
        if c == '"' {
            out.push(c);
            loop {
                match cs.advance() {
                    Some('"') => {
                        out.push('"');
                        break;
                    }
                    Some('\\') => {
                        out.push('\\');
                        if let Some(n) = cs.advance() {
                            out.push(n);
                        }
                    }
                    Some(inner) => out.push(inner),
                    None => {
                        return Err(err(cs, "syntax error: unexpected end of file looking for `\"'"));
                    }
                }
            }
            continue;
        }
        if c == '`' {
            out.push(c);
            loop {
                match cs.advance() {
                    Some('`') => {
                        out.push('`');
                        break;
                    }
                    Some('\\') => {
                        out.push('\\');
                        if let Some(n) = cs.advance() {
                            out.push(n);
                        }
                    }
                    Some(inner) => out.push(inner),
                    None => {
                        return Err(err(cs, "syntax error: unexpected end of file looking for ``'"));
                    }
                }
            }
            continue;
        }
        if c == '#' && (out.is_empty() || out.ends_with(&[' ', '\t', '\n', ';', '(', '|', '&'][..])) {
            // Comment inside a substitution: skip to end of line.
            out.push(c);
            while let Some(n) = cs.peek() {
                if n == '\n' {
                    break;
                }
                out.push(n);
                cs.advance();
            }
            continue;
        }
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Ok(out);
            }
        }
        out.push(c);
    }
}

/// Capture arithmetic text after `$((`, up to the matching `))`.
fn scan_arith_text(cs: &mut CharStream) -> Result<String, ParseError> {
    let mut depth = 0usize;
    let mut out = String::new();
    loop {
        let c = match cs.advance() {
            Some(c) => c,
            None => {
                return Err(err(cs, "syntax error: unexpected end of file looking for `))'"));
            }
        };
        match c {
            '(' => {
                depth += 1;
                out.push(c);
            }
            ')' => {
                if depth == 0 {
                    if cs.eat(')') {
                        return Ok(out);
                    }
                    return Err(err(cs, "syntax error: expected `))'"));
                }
                depth -= 1;
                out.push(c);
            }
            _ => out.push(c),
        }
    }
}

/// Scan a backtick command substitution; `\`, `` \` `` and `\$` are the
/// only escapes recognized inside.
fn scan_backtick(cs: &mut CharStream) -> Result<WordPart, ParseError> {
    let mut text = String::new();
    loop {
        let c = match cs.advance() {
            Some(c) => c,
            None => return Err(err(cs, "syntax error: unexpected end of file looking for ``'")),
        };
        match c {
            '`' => break,
            '\\' => match cs.peek() {
                Some(n @ ('`' | '\\' | '$')) => {
                    cs.advance();
                    text.push(n);
                }
                _ => text.push('\\'),
            },
            _ => text.push(c),
        }
    }
    Ok(WordPart::CommandSub { statements: parse_statements(&text)?, backtick: true })
}

// =============================================================================
// ${…} sub-grammar
// =============================================================================

fn scan_braced_param(cs: &mut CharStream) -> Result<WordPart, ParseError> {
    // ${#…}: length, unless the whole expansion is ${#}, ${#-} etc.
    if cs.peek() == Some('#') && cs.peek_at(1) != Some('}') {
        cs.advance();
        let (name, subscript) = scan_param_name(cs)?;
        if !cs.eat('}') {
            return Err(err(cs, "bad substitution"));
        }
        return Ok(WordPart::Param(Box::new(ParamExpansion { name, subscript, op: ParamOp::Length })));
    }

    // ${!…}: indirection, prefix listing, or array keys.
    if cs.peek() == Some('!') && cs.peek_at(1) != Some('}') {
        cs.advance();
        let (name, subscript) = scan_param_name(cs)?;
        if matches!(cs.peek(), Some('*' | '@')) && cs.peek_at(1) == Some('}') {
            cs.advance();
            cs.advance();
            return Ok(WordPart::Param(Box::new(ParamExpansion {
                name,
                subscript: None,
                op: ParamOp::NamesWithPrefix,
            })));
        }
        if !cs.eat('}') {
            return Err(err(cs, "bad substitution"));
        }
        let op = match subscript {
            Some(Subscript::At) | Some(Subscript::Star) => ParamOp::Keys,
            _ => ParamOp::Indirect,
        };
        return Ok(WordPart::Param(Box::new(ParamExpansion { name, subscript, op })));
    }

    let (name, subscript) = scan_param_name(cs)?;
    if name.is_empty() {
        return Err(err(cs, "bad substitution"));
    }
    if cs.eat('}') {
        return Ok(WordPart::Param(Box::new(ParamExpansion { name, subscript, op: ParamOp::Plain })));
    }

    let op = scan_param_op(cs)?;
    Ok(WordPart::Param(Box::new(ParamExpansion { name, subscript, op })))
}

fn scan_param_name(cs: &mut CharStream) -> Result<(String, Option<Subscript>), ParseError> {
    let mut name = String::new();
    match cs.peek() {
        Some(c) if is_name_start(c) => {
            while let Some(n) = cs.peek() {
                if is_name_char(n) {
                    name.push(n);
                    cs.advance();
                } else {
                    break;
                }
            }
        }
        Some(c) if c.is_ascii_digit() => {
            while let Some(n) = cs.peek() {
                if n.is_ascii_digit() {
                    name.push(n);
                    cs.advance();
                } else {
                    break;
                }
            }
        }
        Some(c @ ('#' | '?' | '@' | '*' | '$' | '!' | '-' | '_')) => {
            name.push(c);
            cs.advance();
        }
        _ => {}
    }

    let subscript = if cs.peek() == Some('[') {
        cs.advance();
        let mut depth = 1usize;
        let mut text = String::new();
        loop {
            let c = match cs.advance() {
                Some(c) => c,
                None => return Err(err(cs, "bad substitution")),
            };
            match c {
                '[' => {
                    depth += 1;
                    text.push(c);
                }
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    text.push(c);
                }
                _ => text.push(c),
            }
        }
        Some(match text.as_str() {
            "@" => Subscript::At,
            "*" => Subscript::Star,
            _ => Subscript::Index(text),
        })
    } else {
        None
    };

    Ok((name, subscript))
}

fn scan_param_op(cs: &mut CharStream) -> Result<ParamOp, ParseError> {
    let colon = cs.peek() == Some(':');
    if colon {
        cs.advance();
        match cs.peek() {
            Some('-') => {
                cs.advance();
                let word = scan_brace_arg(cs, &[])?.0;
                return Ok(ParamOp::Default { word, colon: true });
            }
            Some('=') => {
                cs.advance();
                let word = scan_brace_arg(cs, &[])?.0;
                return Ok(ParamOp::Assign { word, colon: true });
            }
            Some('?') => {
                cs.advance();
                let (word, _) = scan_brace_arg(cs, &[])?;
                let word = if word.as_plain_literal() == Some("") { None } else { Some(word) };
                return Ok(ParamOp::ErrorIf { word, colon: true });
            }
            Some('+') => {
                cs.advance();
                let word = scan_brace_arg(cs, &[])?.0;
                return Ok(ParamOp::Alternate { word, colon: true });
            }
            _ => {
                // ${name:offset} / ${name:offset:length}
                let (offset, stop) = scan_arith_arg(cs)?;
                let length = if stop == ':' { Some(scan_arith_arg(cs)?.0) } else { None };
                return Ok(ParamOp::Substring { offset, length });
            }
        }
    }

    let c = match cs.advance() {
        Some(c) => c,
        None => return Err(err(cs, "bad substitution")),
    };
    match c {
        '-' => Ok(ParamOp::Default { word: scan_brace_arg(cs, &[])?.0, colon: false }),
        '=' => Ok(ParamOp::Assign { word: scan_brace_arg(cs, &[])?.0, colon: false }),
        '?' => {
            let (word, _) = scan_brace_arg(cs, &[])?;
            let word = if word.as_plain_literal() == Some("") { None } else { Some(word) };
            Ok(ParamOp::ErrorIf { word, colon: false })
        }
        '+' => Ok(ParamOp::Alternate { word: scan_brace_arg(cs, &[])?.0, colon: false }),
        '#' => {
            let longest = cs.eat('#');
            Ok(ParamOp::TrimPrefix { pattern: scan_brace_arg(cs, &[])?.0, longest })
        }
        '%' => {
            let longest = cs.eat('%');
            Ok(ParamOp::TrimSuffix { pattern: scan_brace_arg(cs, &[])?.0, longest })
        }
        '/' => {
            let mode = match cs.peek() {
                Some('/') => {
                    cs.advance();
                    ReplaceMode::All
                }
                Some('#') => {
                    cs.advance();
                    ReplaceMode::Prefix
                }
                Some('%') => {
                    cs.advance();
                    ReplaceMode::Suffix
                }
                _ => ReplaceMode::First,
            };
            let (pattern, stop) = scan_brace_arg(cs, &['/'])?;
            let replacement = if stop == '/' { Some(scan_brace_arg(cs, &[])?.0) } else { None };
            Ok(ParamOp::Replace { pattern, replacement, mode })
        }
        '^' => {
            let all = cs.eat('^');
            let (word, _) = scan_brace_arg(cs, &[])?;
            let pattern = if word.as_plain_literal() == Some("") { None } else { Some(word) };
            Ok(ParamOp::CaseUpper { pattern, all })
        }
        ',' => {
            let all = cs.eat(',');
            let (word, _) = scan_brace_arg(cs, &[])?;
            let pattern = if word.as_plain_literal() == Some("") { None } else { Some(word) };
            Ok(ParamOp::CaseLower { pattern, all })
        }
        _ => Err(err(cs, "bad substitution")),
    }
}

/// Scan a word argument inside `${…}` until an unquoted `}` (consumed) or
/// one of `extra_stops` (consumed, returned).
fn scan_brace_arg(cs: &mut CharStream, extra_stops: &[char]) -> Result<(Word, char), ParseError> {
    let mut parts: Vec<WordPart> = Vec::new();
    let mut literal = String::new();
    let stop;
    loop {
        let c = match cs.peek() {
            Some(c) => c,
            None => return Err(err(cs, "syntax error: unexpected end of file looking for `}'")),
        };
        if c == '}' {
            cs.advance();
            stop = '}';
            break;
        }
        if extra_stops.contains(&c) {
            cs.advance();
            stop = c;
            break;
        }
        match c {
            '\'' => {
                flush(&mut parts, &mut literal);
                cs.advance();
                parts.push(WordPart::SingleQuoted(scan_single_quoted(cs)?));
            }
            '"' => {
                flush(&mut parts, &mut literal);
                cs.advance();
                parts.push(WordPart::DoubleQuoted(scan_double_quoted(cs)?));
            }
            '\\' => {
                cs.advance();
                match cs.advance() {
                    Some('\n') => {}
                    Some(esc) => {
                        flush(&mut parts, &mut literal);
                        parts.push(WordPart::Escaped(esc));
                    }
                    None => literal.push('\\'),
                }
            }
            '$' => {
                cs.advance();
                match scan_dollar(cs, false)? {
                    Some(part) => {
                        flush(&mut parts, &mut literal);
                        parts.push(part);
                    }
                    None => literal.push('$'),
                }
            }
            '`' => {
                flush(&mut parts, &mut literal);
                cs.advance();
                parts.push(scan_backtick(cs)?);
            }
            _ => {
                literal.push(c);
                cs.advance();
            }
        }
    }
    flush(&mut parts, &mut literal);
    if parts.is_empty() {
        parts.push(WordPart::Literal(String::new()));
    }
    Ok((Word { parts }, stop))
}

/// Capture arithmetic text for `${v:off:len}` until `:` or `}`.
fn scan_arith_arg(cs: &mut CharStream) -> Result<(String, char), ParseError> {
    let mut depth = 0usize;
    let mut out = String::new();
    loop {
        let c = match cs.peek() {
            Some(c) => c,
            None => return Err(err(cs, "syntax error: unexpected end of file looking for `}'")),
        };
        match c {
            '(' | '[' => {
                depth += 1;
                out.push(c);
                cs.advance();
            }
            ')' | ']' => {
                depth = depth.saturating_sub(1);
                out.push(c);
                cs.advance();
            }
            // A `?:` ternary keeps its `:` when parenthesized; a bare `:`
            // at depth 0 ends the offset.
            ':' if depth == 0 => {
                cs.advance();
                return Ok((out, ':'));
            }
            '}' if depth == 0 => {
                cs.advance();
                return Ok((out, '}'));
            }
            _ => {
                out.push(c);
                cs.advance();
            }
        }
    }
}

// =============================================================================
// Here-document bodies
// =============================================================================

/// Parse a captured heredoc body. A quoted delimiter means no expansion;
/// otherwise `$`-forms and the `\$`, `` \` ``, `\\`, `\newline` escapes
/// apply. Quotes are not special inside heredoc bodies.
pub fn parse_heredoc_body(text: &str, quoted: bool) -> Result<Word, ParseError> {
    if quoted {
        return Ok(Word { parts: vec![WordPart::SingleQuoted(text.to_string())] });
    }
    let mut cs = CharStream::new(text);
    let mut parts: Vec<WordPart> = Vec::new();
    let mut literal = String::new();
    while let Some(c) = cs.peek() {
        match c {
            '\\' => match cs.peek_at(1) {
                Some(n @ ('$' | '`' | '\\')) => {
                    cs.advance();
                    cs.advance();
                    flush(&mut parts, &mut literal);
                    parts.push(WordPart::Escaped(n));
                }
                Some('\n') => {
                    cs.advance();
                    cs.advance();
                }
                _ => {
                    literal.push('\\');
                    cs.advance();
                }
            },
            '$' => {
                cs.advance();
                match scan_dollar(&mut cs, true)? {
                    Some(part) => {
                        flush(&mut parts, &mut literal);
                        parts.push(part);
                    }
                    None => literal.push('$'),
                }
            }
            '`' => {
                cs.advance();
                flush(&mut parts, &mut literal);
                parts.push(scan_backtick(&mut cs)?);
            }
            _ => {
                literal.push(c);
                cs.advance();
            }
        }
    }
    flush(&mut parts, &mut literal);
    if parts.is_empty() {
        parts.push(WordPart::Literal(String::new()));
    }
    Ok(Word { parts })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn word(src: &str) -> Word {
        let mut cs = CharStream::new(src);
        scan_word(&mut cs).unwrap()
    }

    #[test]
    fn test_plain_word() {
        assert_eq!(word("hello").parts, vec![WordPart::Literal("hello".into())]);
    }

    #[test]
    fn test_single_quoted() {
        assert_eq!(
            word("'a b'").parts,
            vec![WordPart::SingleQuoted("a b".into())]
        );
    }

    #[test]
    fn test_mixed_quoting() {
        let w = word(r#"a'b'"c""#);
        assert_eq!(
            w.parts,
            vec![
                WordPart::Literal("a".into()),
                WordPart::SingleQuoted("b".into()),
                WordPart::DoubleQuoted(vec![WordPart::Literal("c".into())]),
            ]
        );
    }

    #[test]
    fn test_escape() {
        assert_eq!(
            word(r"a\ b").parts,
            vec![
                WordPart::Literal("a".into()),
                WordPart::Escaped(' '),
                WordPart::Literal("b".into()),
            ]
        );
    }

    #[test]
    fn test_simple_param() {
        let w = word("$foo");
        match &w.parts[0] {
            WordPart::Param(p) => {
                assert_eq!(p.name, "foo");
                assert_eq!(p.op, ParamOp::Plain);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_special_params() {
        for (src, name) in [("$?", "?"), ("$#", "#"), ("$@", "@"), ("$1", "1")] {
            let w = word(src);
            match &w.parts[0] {
                WordPart::Param(p) => assert_eq!(p.name, name),
                other => panic!("unexpected: {:?}", other),
            }
        }
    }

    #[test]
    fn test_braced_default() {
        let w = word("${x:-fallback}");
        match &w.parts[0] {
            WordPart::Param(p) => {
                assert_eq!(p.name, "x");
                match &p.op {
                    ParamOp::Default { word, colon } => {
                        assert!(*colon);
                        assert_eq!(word.as_plain_literal(), Some("fallback"));
                    }
                    other => panic!("unexpected: {:?}", other),
                }
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_length_op() {
        let w = word("${#x}");
        match &w.parts[0] {
            WordPart::Param(p) => {
                assert_eq!(p.name, "x");
                assert_eq!(p.op, ParamOp::Length);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_trim_ops() {
        let w = word("${path##*/}");
        match &w.parts[0] {
            WordPart::Param(p) => match &p.op {
                ParamOp::TrimPrefix { pattern, longest } => {
                    assert!(longest);
                    assert_eq!(pattern.as_plain_literal(), Some("*/"));
                }
                other => panic!("unexpected: {:?}", other),
            },
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_replace_op() {
        let w = word("${v/a/b}");
        match &w.parts[0] {
            WordPart::Param(p) => match &p.op {
                ParamOp::Replace { pattern, replacement, mode } => {
                    assert_eq!(*mode, ReplaceMode::First);
                    assert_eq!(pattern.as_plain_literal(), Some("a"));
                    assert_eq!(replacement.as_ref().unwrap().as_plain_literal(), Some("b"));
                }
                other => panic!("unexpected: {:?}", other),
            },
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_substring_op() {
        let w = word("${v:1:3}");
        match &w.parts[0] {
            WordPart::Param(p) => match &p.op {
                ParamOp::Substring { offset, length } => {
                    assert_eq!(offset, "1");
                    assert_eq!(length.as_deref(), Some("3"));
                }
                other => panic!("unexpected: {:?}", other),
            },
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_array_subscript() {
        let w = word("${a[2]}");
        match &w.parts[0] {
            WordPart::Param(p) => {
                assert_eq!(p.subscript, Some(Subscript::Index("2".into())));
            }
            other => panic!("unexpected: {:?}", other),
        }
        let w = word("${a[@]}");
        match &w.parts[0] {
            WordPart::Param(p) => assert_eq!(p.subscript, Some(Subscript::At)),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_command_sub() {
        let w = word("$(echo hi)");
        match &w.parts[0] {
            WordPart::CommandSub { statements, backtick } => {
                assert!(!backtick);
                assert_eq!(statements.len(), 1);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_nested_command_sub() {
        let w = word("$(echo $(echo inner))");
        assert!(matches!(w.parts[0], WordPart::CommandSub { .. }));
    }

    #[test]
    fn test_backtick() {
        let w = word("`echo hi`");
        match &w.parts[0] {
            WordPart::CommandSub { backtick, .. } => assert!(backtick),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_arith_sub() {
        let w = word("$((1 + 2))");
        assert_eq!(w.parts[0], WordPart::ArithSub("1 + 2".into()));
    }

    #[test]
    fn test_arith_sub_nested_parens() {
        let w = word("$(((1+2)*3))");
        assert_eq!(w.parts[0], WordPart::ArithSub("(1+2)*3".into()));
    }

    #[test]
    fn test_ansi_c_bytes() {
        let w = word(r"$'\x41\n\xff'");
        assert_eq!(w.parts[0], WordPart::Bytes(vec![0x41, b'\n', 0xff]));
    }

    #[test]
    fn test_ansi_c_unicode() {
        let w = word(r"$'A'");
        assert_eq!(w.parts[0], WordPart::Bytes(vec![b'A']));
    }

    #[test]
    fn test_tilde() {
        assert_eq!(word("~").parts, vec![WordPart::Tilde(None)]);
        let w = word("~/docs");
        assert_eq!(w.parts[0], WordPart::Tilde(None));
        assert_eq!(w.parts[1], WordPart::Literal("/docs".into()));
        assert_eq!(word("~alice").parts, vec![WordPart::Tilde(Some("alice".into()))]);
    }

    #[test]
    fn test_tilde_not_at_start() {
        let w = word("a~b");
        assert_eq!(w.parts, vec![WordPart::Literal("a~b".into())]);
    }

    #[test]
    fn test_double_quoted_expansion() {
        let w = word(r#""hi $name""#);
        match &w.parts[0] {
            WordPart::DoubleQuoted(inner) => {
                assert_eq!(inner[0], WordPart::Literal("hi ".into()));
                assert!(matches!(inner[1], WordPart::Param(_)));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_dollar_literal_when_not_expansion() {
        let w = word("a$");
        assert_eq!(w.parts, vec![WordPart::Literal("a$".into())]);
    }

    #[test]
    fn test_unterminated_quote_errors() {
        let mut cs = CharStream::new("'abc");
        assert!(scan_word(&mut cs).is_err());
    }

    #[test]
    fn test_heredoc_body_quoted() {
        let w = parse_heredoc_body("x $y\n", true).unwrap();
        assert_eq!(w.parts, vec![WordPart::SingleQuoted("x $y\n".into())]);
    }

    #[test]
    fn test_heredoc_body_expandable() {
        let w = parse_heredoc_body("x $y\n", false).unwrap();
        assert_eq!(w.parts[0], WordPart::Literal("x ".into()));
        assert!(matches!(w.parts[1], WordPart::Param(_)));
        assert_eq!(w.parts[2], WordPart::Literal("\n".into()));
    }

    #[test]
    fn test_process_sub() {
        let w = word("<(echo hi)");
        match &w.parts[0] {
            WordPart::ProcessSub { write, statements } => {
                assert!(!write);
                assert_eq!(statements.len(), 1);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
