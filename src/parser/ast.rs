//! Abstract Syntax Tree
//!
//! The parser's only output. Statements form a sum type over simple
//! commands, pipelines, binary lists, and the compound forms; words are
//! ordered part sequences that the expansion engine consumes.

use crate::bytes::Bytes;

// =============================================================================
// Statements
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Simple(SimpleCommand),
    Pipeline(Pipeline),
    List(List),
    Subshell {
        body: Vec<Statement>,
        redirects: Vec<Redirect>,
    },
    Group {
        body: Vec<Statement>,
        redirects: Vec<Redirect>,
    },
    If {
        clauses: Vec<IfClause>,
        else_body: Option<Vec<Statement>>,
        redirects: Vec<Redirect>,
    },
    While {
        cond: Vec<Statement>,
        body: Vec<Statement>,
        /// `until` negates the condition test.
        until: bool,
        redirects: Vec<Redirect>,
    },
    For {
        var: String,
        /// None means iterate over `"$@"`.
        words: Option<Vec<Word>>,
        body: Vec<Statement>,
        redirects: Vec<Redirect>,
        line: u32,
    },
    ForArith {
        init: Option<String>,
        cond: Option<String>,
        step: Option<String>,
        body: Vec<Statement>,
        redirects: Vec<Redirect>,
    },
    Case {
        word: Word,
        arms: Vec<CaseArm>,
        redirects: Vec<Redirect>,
    },
    Select {
        var: String,
        /// None means the menu comes from `"$@"`.
        words: Option<Vec<Word>>,
        body: Vec<Statement>,
        redirects: Vec<Redirect>,
        line: u32,
    },
    Function {
        name: String,
        body: Box<Statement>,
    },
    Arithmetic {
        expr: String,
        redirects: Vec<Redirect>,
        line: u32,
    },
    /// `[[ … ]]` extended test.
    Conditional {
        expr: CondExpr,
        redirects: Vec<Redirect>,
        line: u32,
    },
}

/// Binary list: `left op right`. `right` is absent for a trailing
/// separator (`cmd ;` / `cmd &`).
#[derive(Debug, Clone, PartialEq)]
pub struct List {
    pub left: Box<Statement>,
    pub op: ListOp,
    pub right: Option<Box<Statement>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOp {
    /// `;`
    Seq,
    /// `&&`
    And,
    /// `||`
    Or,
    /// `&` — the left side runs (synchronously) as a background job.
    Background,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub stages: Vec<Statement>,
    pub negated: bool,
    /// For each `|` between stages, whether it was `|&` (stderr piped too).
    pub stderr_pipes: Vec<bool>,
    /// `time` prefix; the report lands on stderr after the pipeline.
    pub timed: bool,
    /// `time -p` POSIX report format.
    pub time_posix: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimpleCommand {
    pub assignments: Vec<Assignment>,
    pub words: Vec<Word>,
    pub redirects: Vec<Redirect>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfClause {
    pub cond: Vec<Statement>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseArm {
    pub patterns: Vec<Word>,
    pub body: Vec<Statement>,
    pub terminator: CaseTerminator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseTerminator {
    /// `;;` — stop after the first matching arm.
    Break,
    /// `;&` — fall through into the next arm's body unconditionally.
    FallThrough,
    /// `;;&` — keep testing subsequent arms.
    Continue,
}

// =============================================================================
// Assignments
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub name: String,
    /// `name[sub]=…` subscript text, evaluated at execution time.
    pub subscript: Option<String>,
    pub value: Option<Word>,
    /// `name+=value`
    pub append: bool,
    /// `name=(w1 w2 …)` array literal.
    pub array: Option<Vec<Word>>,
}

// =============================================================================
// Redirections
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Redirect {
    /// Explicit source fd (`2>`); defaults depend on the operator.
    pub fd: Option<i32>,
    pub op: RedirectOp,
    pub target: RedirectTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectOp {
    /// `<`
    Read,
    /// `>` / `>|`
    Write { clobber: bool },
    /// `>>`
    Append,
    /// `<>`
    ReadWrite,
    /// `<&`
    DupIn,
    /// `>&`
    DupOut,
    /// `<<` / `<<-`
    HereDoc,
    /// `<<<`
    HereString,
    /// `&>`
    WriteBoth,
    /// `&>>`
    AppendBoth,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RedirectTarget {
    Word(Word),
    HereDoc(HereDoc),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HereDoc {
    pub delimiter: String,
    /// Body as expandable parts, or a single quoted part when the
    /// delimiter was quoted.
    pub body: Word,
    pub strip_tabs: bool,
    pub quoted: bool,
}

// =============================================================================
// Words
// =============================================================================

/// A word is a non-empty sequence of parts; the empty argument is one
/// empty `Literal`.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub parts: Vec<WordPart>,
}

impl Word {
    pub fn literal(text: impl Into<String>) -> Self {
        Word { parts: vec![WordPart::Literal(text.into())] }
    }

    pub fn empty() -> Self {
        Word::literal("")
    }

    /// The word's text when it is a single unquoted literal.
    pub fn as_plain_literal(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [WordPart::Literal(s)] => Some(s),
            _ => None,
        }
    }

    /// Concatenated literal view spanning all statically-known parts, or
    /// None if any part requires expansion.
    pub fn static_text(&self) -> Option<String> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                WordPart::Literal(s) | WordPart::SingleQuoted(s) => out.push_str(s),
                WordPart::Escaped(c) => out.push(*c),
                WordPart::DoubleQuoted(inner) => {
                    for p in inner {
                        match p {
                            WordPart::Literal(s) => out.push_str(s),
                            WordPart::Escaped(c) => out.push(*c),
                            _ => return None,
                        }
                    }
                }
                _ => return None,
            }
        }
        Some(out)
    }

    /// True if every part is quoted (glob characters are literal).
    pub fn fully_quoted(&self) -> bool {
        self.parts.iter().all(|p| {
            matches!(
                p,
                WordPart::SingleQuoted(_)
                    | WordPart::DoubleQuoted(_)
                    | WordPart::Escaped(_)
                    | WordPart::Bytes(_)
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WordPart {
    /// Unquoted literal text.
    Literal(String),
    /// `'…'` — verbatim, never expanded or split.
    SingleQuoted(String),
    /// `"…"` — inner expansions run, no splitting or globbing.
    DoubleQuoted(Vec<WordPart>),
    /// `\c` — counts as quoted.
    Escaped(char),
    /// Raw bytes from ANSI-C quoting `$'…'`.
    Bytes(Bytes),
    /// `$var`, `${var…}`.
    Param(Box<ParamExpansion>),
    /// `$(…)` or `` `…` ``.
    CommandSub { statements: Vec<Statement>, backtick: bool },
    /// `$((…))` — expression text evaluated at expansion time.
    ArithSub(String),
    /// Leading `~` / `~user` / `~+` / `~-`.
    Tilde(Option<String>),
    /// `<(…)` / `>(…)` — fifo-like stand-in.
    ProcessSub { write: bool, statements: Vec<Statement> },
}

// =============================================================================
// Parameter expansion
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ParamExpansion {
    pub name: String,
    pub subscript: Option<Subscript>,
    pub op: ParamOp,
}

impl ParamExpansion {
    pub fn plain(name: impl Into<String>) -> Self {
        ParamExpansion { name: name.into(), subscript: None, op: ParamOp::Plain }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Subscript {
    /// `[expr]` — arithmetic for indexed arrays, raw key for associative.
    Index(String),
    /// `[@]`
    At,
    /// `[*]`
    Star,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamOp {
    Plain,
    /// `${#name}` / `${#name[@]}`
    Length,
    /// `${name:-word}` (`colon`: also treat empty as unset)
    Default { word: Word, colon: bool },
    /// `${name:=word}`
    Assign { word: Word, colon: bool },
    /// `${name:?word}`
    ErrorIf { word: Option<Word>, colon: bool },
    /// `${name:+word}`
    Alternate { word: Word, colon: bool },
    /// `${name#pat}` / `${name##pat}`
    TrimPrefix { pattern: Word, longest: bool },
    /// `${name%pat}` / `${name%%pat}`
    TrimSuffix { pattern: Word, longest: bool },
    /// `${name:off}` / `${name:off:len}` — arithmetic texts.
    Substring { offset: String, length: Option<String> },
    /// `${name/pat/rep}` family.
    Replace { pattern: Word, replacement: Option<Word>, mode: ReplaceMode },
    /// `${name^pat}` / `${name^^pat}`
    CaseUpper { pattern: Option<Word>, all: bool },
    /// `${name,pat}` / `${name,,pat}`
    CaseLower { pattern: Option<Word>, all: bool },
    /// `${!name}` — indirect through the named variable.
    Indirect,
    /// `${!prefix*}` / `${!prefix@}` — names matching a prefix.
    NamesWithPrefix,
    /// `${!name[@]}` / `${!name[*]}` — array keys.
    Keys,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceMode {
    /// `${v/pat/rep}`
    First,
    /// `${v//pat/rep}`
    All,
    /// `${v/#pat/rep}`
    Prefix,
    /// `${v/%pat/rep}`
    Suffix,
}

// =============================================================================
// Extended tests
// =============================================================================

/// `[[ … ]]` expression tree. Operands expand without word splitting or
/// pathname expansion.
#[derive(Debug, Clone, PartialEq)]
pub enum CondExpr {
    And(Box<CondExpr>, Box<CondExpr>),
    Or(Box<CondExpr>, Box<CondExpr>),
    Not(Box<CondExpr>),
    /// `-f file`, `-z str`, …
    Unary { op: char, operand: Word },
    Binary { op: CondBinaryOp, lhs: Word, rhs: Word },
    /// Bare operand: true when non-empty.
    Value(Word),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondBinaryOp {
    /// `==` / `=` — the right side is a shell pattern.
    Match,
    /// `!=`
    NotMatch,
    /// `=~` — the right side is a regular expression.
    Regex,
    /// `<` lexicographic
    Less,
    /// `>` lexicographic
    Greater,
    /// `-eq` `-ne` `-lt` `-le` `-gt` `-ge` — arithmetic comparisons.
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_as_plain_literal() {
        assert_eq!(Word::literal("echo").as_plain_literal(), Some("echo"));
        let quoted = Word { parts: vec![WordPart::SingleQuoted("x".into())] };
        assert_eq!(quoted.as_plain_literal(), None);
    }

    #[test]
    fn test_static_text() {
        let word = Word {
            parts: vec![
                WordPart::Literal("a".into()),
                WordPart::SingleQuoted("b c".into()),
                WordPart::Escaped('d'),
            ],
        };
        assert_eq!(word.static_text(), Some("ab cd".to_string()));

        let dynamic = Word {
            parts: vec![WordPart::Param(Box::new(ParamExpansion::plain("x")))],
        };
        assert_eq!(dynamic.static_text(), None);
    }

    #[test]
    fn test_fully_quoted() {
        let quoted = Word { parts: vec![WordPart::SingleQuoted("*".into())] };
        assert!(quoted.fully_quoted());
        assert!(!Word::literal("*").fully_quoted());
    }
}
