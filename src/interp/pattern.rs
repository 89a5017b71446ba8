//! Shell Pattern Matching
//!
//! A byte-level matcher for shell glob patterns: `*`, `?`, `[...]`
//! classes, and the extglob forms `@( ?( *( +( !(`. Operating on bytes
//! keeps raw `$'\xff'` content matchable; `?` consumes one UTF-8 scalar
//! when the text is valid UTF-8, else one byte. A parallel literal mask
//! marks bytes that came from quoted source and must never act as
//! metacharacters.

use crate::bytes::Bytes;

#[derive(Debug, Clone, Copy, Default)]
pub struct PatternOptions {
    pub extglob: bool,
    pub casefold: bool,
}

#[derive(Debug, Clone)]
pub struct Pattern {
    toks: Vec<Tok>,
    casefold: bool,
}

#[derive(Debug, Clone)]
enum Tok {
    Lit(u8),
    Any,
    One,
    Class { neg: bool, items: Vec<ClassItem> },
    Group { kind: GroupKind, alts: Vec<Pattern> },
}

#[derive(Debug, Clone)]
enum ClassItem {
    Byte(u8),
    Range(u8, u8),
    Named(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupKind {
    /// `?(…)` — zero or one occurrence.
    Optional,
    /// `*(…)` — zero or more.
    ZeroOrMore,
    /// `+(…)` — one or more.
    OneOrMore,
    /// `@(…)` — exactly one.
    ExactlyOne,
    /// `!(…)` — anything except.
    Not,
}

/// True if the pattern bytes contain any unquoted glob metacharacter.
pub fn has_glob_magic(pattern: &[u8], literal_mask: Option<&[bool]>, extglob: bool) -> bool {
    let quoted = |i: usize| literal_mask.map(|m| m.get(i).copied().unwrap_or(false)).unwrap_or(false);
    let mut i = 0;
    while i < pattern.len() {
        if !quoted(i) {
            match pattern[i] {
                b'*' | b'?' | b'[' => return true,
                b'@' | b'+' | b'!' if extglob && pattern.get(i + 1) == Some(&b'(') && !quoted(i + 1) => {
                    return true;
                }
                _ => {}
            }
        }
        i += 1;
    }
    false
}

/// Compile a pattern. `literal_mask` parallels `pattern`; true bytes are
/// always literal.
pub fn compile(pattern: &[u8], literal_mask: Option<&[bool]>, opts: PatternOptions) -> Pattern {
    let mut compiler = Compiler { pat: pattern, mask: literal_mask, opts, pos: 0 };
    let toks = compiler.compile_until(&[]).0;
    Pattern { toks, casefold: opts.casefold }
}

struct Compiler<'a> {
    pat: &'a [u8],
    mask: Option<&'a [bool]>,
    opts: PatternOptions,
    pos: usize,
}

impl<'a> Compiler<'a> {
    fn quoted(&self, i: usize) -> bool {
        self.mask.map(|m| m.get(i).copied().unwrap_or(false)).unwrap_or(false)
    }

    /// Compile until one of `stops` appears unquoted (the stop byte is
    /// consumed and returned) or the pattern ends.
    fn compile_until(&mut self, stops: &[u8]) -> (Vec<Tok>, Option<u8>) {
        let mut toks = Vec::new();
        while self.pos < self.pat.len() {
            let b = self.pat[self.pos];
            let quoted = self.quoted(self.pos);
            if !quoted && stops.contains(&b) {
                self.pos += 1;
                return (toks, Some(b));
            }
            if quoted {
                toks.push(Tok::Lit(b));
                self.pos += 1;
                continue;
            }
            match b {
                b'*' => {
                    if self.opts.extglob && self.pat.get(self.pos + 1) == Some(&b'(') {
                        self.pos += 2;
                        toks.push(self.compile_group(GroupKind::ZeroOrMore));
                    } else {
                        // Collapse runs of `*`.
                        if !matches!(toks.last(), Some(Tok::Any)) {
                            toks.push(Tok::Any);
                        }
                        self.pos += 1;
                    }
                }
                b'?' => {
                    if self.opts.extglob && self.pat.get(self.pos + 1) == Some(&b'(') {
                        self.pos += 2;
                        toks.push(self.compile_group(GroupKind::Optional));
                    } else {
                        toks.push(Tok::One);
                        self.pos += 1;
                    }
                }
                b'+' | b'@' | b'!' if self.opts.extglob && self.pat.get(self.pos + 1) == Some(&b'(') => {
                    let kind = match b {
                        b'+' => GroupKind::OneOrMore,
                        b'@' => GroupKind::ExactlyOne,
                        _ => GroupKind::Not,
                    };
                    self.pos += 2;
                    toks.push(self.compile_group(kind));
                }
                b'[' => match self.compile_class() {
                    Some(tok) => toks.push(tok),
                    None => {
                        toks.push(Tok::Lit(b'['));
                        self.pos += 1;
                    }
                },
                b'\\' => {
                    // Backslash escapes the next pattern byte.
                    self.pos += 1;
                    if self.pos < self.pat.len() {
                        toks.push(Tok::Lit(self.pat[self.pos]));
                        self.pos += 1;
                    } else {
                        toks.push(Tok::Lit(b'\\'));
                    }
                }
                _ => {
                    toks.push(Tok::Lit(b));
                    self.pos += 1;
                }
            }
        }
        (toks, None)
    }

    fn compile_group(&mut self, kind: GroupKind) -> Tok {
        let mut alts = Vec::new();
        loop {
            let (toks, stop) = self.compile_until(&[b'|', b')']);
            alts.push(Pattern { toks, casefold: self.opts.casefold });
            match stop {
                Some(b'|') => continue,
                _ => break,
            }
        }
        Tok::Group { kind, alts }
    }

    /// Parse a `[...]` class; None when unterminated (the `[` is then a
    /// literal, as in bash).
    fn compile_class(&mut self) -> Option<Tok> {
        let start = self.pos;
        let mut i = self.pos + 1;
        let neg = matches!(self.pat.get(i), Some(b'!' | b'^'));
        if neg {
            i += 1;
        }
        let mut items = Vec::new();
        let mut first = true;
        loop {
            let b = *self.pat.get(i)?;
            if b == b']' && !first {
                self.pos = i + 1;
                return Some(Tok::Class { neg, items });
            }
            first = false;
            // [:name:] character classes.
            if b == b'[' && self.pat.get(i + 1) == Some(&b':') {
                if let Some(end) = find_subslice(&self.pat[i + 2..], b":]") {
                    let name = &self.pat[i + 2..i + 2 + end];
                    if let Some(known) = named_class(name) {
                        items.push(ClassItem::Named(known));
                        i += end + 4;
                        continue;
                    }
                }
            }
            if self.pat.get(i + 1) == Some(&b'-')
                && self.pat.get(i + 2).map(|&c| c != b']').unwrap_or(false)
            {
                let hi = self.pat[i + 2];
                items.push(ClassItem::Range(b, hi));
                i += 3;
                continue;
            }
            items.push(ClassItem::Byte(b));
            i += 1;
            if i > self.pat.len() {
                self.pos = start;
                return None;
            }
        }
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn named_class(name: &[u8]) -> Option<&'static str> {
    match name {
        b"alpha" => Some("alpha"),
        b"digit" => Some("digit"),
        b"alnum" => Some("alnum"),
        b"upper" => Some("upper"),
        b"lower" => Some("lower"),
        b"space" => Some("space"),
        b"blank" => Some("blank"),
        b"punct" => Some("punct"),
        b"xdigit" => Some("xdigit"),
        b"cntrl" => Some("cntrl"),
        b"graph" => Some("graph"),
        b"print" => Some("print"),
        _ => None,
    }
}

impl Pattern {
    /// Full-text match.
    pub fn matches(&self, text: &[u8]) -> bool {
        match_from(&self.toks, text, self.casefold)
    }

    /// Length of the shortest/longest matching prefix, if any.
    pub fn match_prefix_len(&self, text: &[u8], longest: bool) -> Option<usize> {
        let range: Vec<usize> = if longest {
            (0..=text.len()).rev().collect()
        } else {
            (0..=text.len()).collect()
        };
        range.into_iter().find(|&k| self.matches(&text[..k]))
    }

    /// Length of the shortest/longest matching suffix, if any.
    pub fn match_suffix_len(&self, text: &[u8], longest: bool) -> Option<usize> {
        let range: Vec<usize> = if longest {
            (0..=text.len()).rev().collect()
        } else {
            (0..=text.len()).collect()
        };
        range.into_iter().find(|&k| self.matches(&text[text.len() - k..]))
    }

    /// Longest match starting exactly at `text[at..]`, if any.
    fn match_at(&self, text: &[u8], at: usize) -> Option<usize> {
        let slice = &text[at..];
        (0..=slice.len()).rev().find(|&k| self.matches(&slice[..k]))
    }

    /// `${var/pat/rep}` replacement engine.
    pub fn replace(&self, text: &[u8], replacement: &[u8], all: bool) -> Bytes {
        let mut out = Bytes::new();
        let mut i = 0;
        let mut replaced = false;
        while i < text.len() {
            if (!replaced || all) && self.match_at(text, i).map(|k| k > 0).unwrap_or(false) {
                let k = self.match_at(text, i).unwrap_or(0);
                out.extend_from_slice(replacement);
                i += k;
                replaced = true;
            } else {
                out.push(text[i]);
                i += 1;
            }
        }
        // An empty subject can still match an empty-matching pattern.
        if text.is_empty() && self.matches(b"") {
            out.extend_from_slice(replacement);
        }
        out
    }

    /// Replace a matching prefix (`${v/#pat/rep}`).
    pub fn replace_prefix(&self, text: &[u8], replacement: &[u8]) -> Bytes {
        match self.match_prefix_len(text, true) {
            Some(k) => {
                let mut out = replacement.to_vec();
                out.extend_from_slice(&text[k..]);
                out
            }
            None => text.to_vec(),
        }
    }

    /// Replace a matching suffix (`${v/%pat/rep}`).
    pub fn replace_suffix(&self, text: &[u8], replacement: &[u8]) -> Bytes {
        match self.match_suffix_len(text, true) {
            Some(k) => {
                let mut out = text[..text.len() - k].to_vec();
                out.extend_from_slice(replacement);
                out
            }
            None => text.to_vec(),
        }
    }
}

fn fold(b: u8, casefold: bool) -> u8 {
    if casefold {
        b.to_ascii_lowercase()
    } else {
        b
    }
}

/// Width of the UTF-8 scalar starting at `text[0]`, or 1 for invalid
/// leading bytes.
fn char_width(text: &[u8]) -> usize {
    let b = match text.first() {
        Some(&b) => b,
        None => return 0,
    };
    let width = match b {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => 1,
    };
    if width <= text.len() && text[1..width].iter().all(|&c| (0x80..=0xbf).contains(&c)) {
        width
    } else {
        1
    }
}

fn class_matches(neg: bool, items: &[ClassItem], b: u8, casefold: bool) -> bool {
    let b = fold(b, casefold);
    let mut hit = false;
    for item in items {
        let matched = match item {
            ClassItem::Byte(c) => fold(*c, casefold) == b,
            ClassItem::Range(lo, hi) => {
                let (lo, hi) = (fold(*lo, casefold), fold(*hi, casefold));
                lo <= b && b <= hi
            }
            ClassItem::Named(name) => match *name {
                "alpha" => b.is_ascii_alphabetic(),
                "digit" => b.is_ascii_digit(),
                "alnum" => b.is_ascii_alphanumeric(),
                "upper" => b.is_ascii_uppercase(),
                "lower" => b.is_ascii_lowercase(),
                "space" => b.is_ascii_whitespace(),
                "blank" => b == b' ' || b == b'\t',
                "punct" => b.is_ascii_punctuation(),
                "xdigit" => b.is_ascii_hexdigit(),
                "cntrl" => b.is_ascii_control(),
                "graph" => b.is_ascii_graphic(),
                "print" => b.is_ascii_graphic() || b == b' ',
                _ => false,
            },
        };
        if matched {
            hit = true;
            break;
        }
    }
    hit != neg
}

fn match_from(toks: &[Tok], text: &[u8], casefold: bool) -> bool {
    match toks.first() {
        None => text.is_empty(),
        Some(Tok::Lit(p)) => match text.first() {
            Some(&t) => fold(*p, casefold) == fold(t, casefold) && match_from(&toks[1..], &text[1..], casefold),
            None => false,
        },
        Some(Tok::One) => {
            let w = char_width(text);
            w > 0 && match_from(&toks[1..], &text[w..], casefold)
        }
        Some(Tok::Any) => {
            (0..=text.len()).any(|k| match_from(&toks[1..], &text[k..], casefold))
        }
        Some(Tok::Class { neg, items }) => match text.first() {
            Some(&t) => {
                class_matches(*neg, items, t, casefold) && match_from(&toks[1..], &text[1..], casefold)
            }
            None => false,
        },
        Some(Tok::Group { kind, alts }) => match kind {
            GroupKind::ExactlyOne => (0..=text.len()).any(|k| {
                alts.iter().any(|alt| alt.matches(&text[..k]))
                    && match_from(&toks[1..], &text[k..], casefold)
            }),
            GroupKind::Optional => {
                match_from(&toks[1..], text, casefold)
                    || (0..=text.len()).any(|k| {
                        k > 0
                            && alts.iter().any(|alt| alt.matches(&text[..k]))
                            && match_from(&toks[1..], &text[k..], casefold)
                    })
            }
            GroupKind::ZeroOrMore => match_repeat(alts, &toks[1..], text, false, casefold),
            GroupKind::OneOrMore => match_repeat(alts, &toks[1..], text, true, casefold),
            GroupKind::Not => (0..=text.len()).any(|k| {
                !alts.iter().any(|alt| alt.matches(&text[..k]))
                    && match_from(&toks[1..], &text[k..], casefold)
            }),
        },
    }
}

fn match_repeat(alts: &[Pattern], rest: &[Tok], text: &[u8], need_one: bool, casefold: bool) -> bool {
    if !need_one && match_from(rest, text, casefold) {
        return true;
    }
    for k in 1..=text.len() {
        if alts.iter().any(|alt| alt.matches(&text[..k]))
            && match_repeat(alts, rest, &text[k..], false, casefold)
        {
            return true;
        }
    }
    false
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pat(p: &str) -> Pattern {
        compile(p.as_bytes(), None, PatternOptions::default())
    }

    fn pat_ext(p: &str) -> Pattern {
        compile(p.as_bytes(), None, PatternOptions { extglob: true, casefold: false })
    }

    #[test]
    fn test_literal() {
        assert!(pat("abc").matches(b"abc"));
        assert!(!pat("abc").matches(b"abd"));
        assert!(!pat("abc").matches(b"abcd"));
    }

    #[test]
    fn test_star() {
        assert!(pat("*").matches(b""));
        assert!(pat("*").matches(b"anything"));
        assert!(pat("a*c").matches(b"ac"));
        assert!(pat("a*c").matches(b"abbbc"));
        assert!(!pat("a*c").matches(b"abd"));
        assert!(pat("*.txt").matches(b"note.txt"));
        assert!(!pat("*.txt").matches(b"note.txt.bak"));
    }

    #[test]
    fn test_question() {
        assert!(pat("a?c").matches(b"abc"));
        assert!(!pat("a?c").matches(b"ac"));
        assert!(!pat("a?c").matches(b"abbc"));
    }

    #[test]
    fn test_question_multibyte() {
        // One `?` consumes one UTF-8 scalar.
        assert!(pat("a?c").matches("aéc".as_bytes()));
    }

    #[test]
    fn test_class() {
        assert!(pat("[abc]").matches(b"b"));
        assert!(!pat("[abc]").matches(b"d"));
        assert!(pat("[a-z]x").matches(b"mx"));
        assert!(pat("[!a-z]").matches(b"5"));
        assert!(!pat("[!a-z]").matches(b"m"));
        assert!(pat("[[:digit:]][[:alpha:]]").matches(b"7q"));
    }

    #[test]
    fn test_class_first_bracket_literal() {
        assert!(pat("[]a]").matches(b"]"));
        assert!(pat("[]a]").matches(b"a"));
    }

    #[test]
    fn test_unterminated_class_is_literal() {
        assert!(pat("a[b").matches(b"a[b"));
    }

    #[test]
    fn test_backslash_escapes() {
        assert!(pat("\\*").matches(b"*"));
        assert!(!pat("\\*").matches(b"x"));
    }

    #[test]
    fn test_literal_mask() {
        // A quoted `*` matches only itself.
        let mask = vec![true];
        let p = compile(b"*", Some(&mask), PatternOptions::default());
        assert!(p.matches(b"*"));
        assert!(!p.matches(b"xyz"));
    }

    #[test]
    fn test_casefold() {
        let p = compile(b"A*Z", None, PatternOptions { extglob: false, casefold: true });
        assert!(p.matches(b"abcz"));
        assert!(p.matches(b"ABCZ"));
    }

    #[test]
    fn test_raw_bytes() {
        assert!(pat("*").matches(&[0xff, 0xfe]));
        let p = compile(&[0xff], None, PatternOptions::default());
        assert!(p.matches(&[0xff]));
        assert!(!p.matches(&[0xfe]));
    }

    #[test]
    fn test_extglob_at() {
        let p = pat_ext("@(foo|bar)");
        assert!(p.matches(b"foo"));
        assert!(p.matches(b"bar"));
        assert!(!p.matches(b"foobar"));
    }

    #[test]
    fn test_extglob_optional() {
        let p = pat_ext("ab?(c)");
        assert!(p.matches(b"ab"));
        assert!(p.matches(b"abc"));
        assert!(!p.matches(b"abcc"));
    }

    #[test]
    fn test_extglob_star_plus() {
        let star = pat_ext("a*(bc)d");
        assert!(star.matches(b"ad"));
        assert!(star.matches(b"abcd"));
        assert!(star.matches(b"abcbcd"));
        let plus = pat_ext("a+(bc)d");
        assert!(!plus.matches(b"ad"));
        assert!(plus.matches(b"abcbcd"));
    }

    #[test]
    fn test_extglob_not() {
        let p = pat_ext("!(foo)");
        assert!(p.matches(b"bar"));
        assert!(!p.matches(b"foo"));
        assert!(p.matches(b""));
    }

    #[test]
    fn test_extglob_disabled_is_literal() {
        // Without extglob, `@(` is just bytes.
        assert!(pat("@(x)").matches(b"@(x)"));
    }

    #[test]
    fn test_prefix_trim_lens() {
        let p = pat("*/");
        // Shortest and longest prefix match for `a/b/c`.
        assert_eq!(p.match_prefix_len(b"a/b/c", false), Some(2));
        assert_eq!(p.match_prefix_len(b"a/b/c", true), Some(4));
        assert_eq!(pat("x").match_prefix_len(b"abc", true), None);
    }

    #[test]
    fn test_suffix_trim_lens() {
        let p = pat(".*");
        assert_eq!(p.match_suffix_len(b"a.tar.gz", false), Some(3));
        assert_eq!(p.match_suffix_len(b"a.tar.gz", true), Some(7));
    }

    #[test]
    fn test_replace() {
        assert_eq!(pat("o").replace(b"foo", b"0", false), b"f0o");
        assert_eq!(pat("o").replace(b"foo", b"0", true), b"f00");
        assert_eq!(pat("x").replace(b"foo", b"0", true), b"foo");
        assert_eq!(pat("a*c").replace(b"xabcy", b"-", false), b"x-y");
    }

    #[test]
    fn test_replace_prefix_suffix() {
        assert_eq!(pat("f*").replace_prefix(b"foobar", b"X"), b"X");
        assert_eq!(pat("ba*").replace_suffix(b"foobar", b"Y"), b"fooY");
        assert_eq!(pat("zz").replace_prefix(b"foo", b"X"), b"foo");
    }

    #[test]
    fn test_has_glob_magic() {
        assert!(has_glob_magic(b"*.txt", None, false));
        assert!(has_glob_magic(b"a?b", None, false));
        assert!(has_glob_magic(b"[ab]", None, false));
        assert!(!has_glob_magic(b"plain", None, false));
        assert!(has_glob_magic(b"@(x)", None, true));
        assert!(!has_glob_magic(b"@(x)", None, false));
        // Quoted metachars are not magic.
        let mask = vec![true, false, false, false, false];
        assert!(!has_glob_magic(b"*.txt", Some(&mask), false));
    }
}
