//! Lexer
//!
//! Tokenizes a whole source string up front: operators by maximal munch,
//! words via the word scanner, io-number prefixes, comments, and
//! here-document bodies (collected at the newline that ends their
//! command line). Reserved words stay ordinary words; the parser gives
//! them meaning at command position.

use crate::parser::ast::{HereDoc, RedirectOp, Word};
use crate::parser::words::{parse_heredoc_body, scan_word, CharStream};
use crate::parser::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Word { word: Word, line: u32 },
    Op { op: Op, line: u32 },
    Redirect { fd: Option<i32>, op: RedirectOp, heredoc: Option<usize>, line: u32 },
    ArithCommand { expr: String, line: u32 },
    Newline,
    Eof,
}

impl Token {
    pub fn line(&self) -> Option<u32> {
        match self {
            Token::Word { line, .. }
            | Token::Op { line, .. }
            | Token::Redirect { line, .. }
            | Token::ArithCommand { line, .. } => Some(*line),
            _ => None,
        }
    }

    /// The word's plain literal text, for reserved-word checks.
    pub fn keyword(&self) -> Option<&str> {
        match self {
            Token::Word { word, .. } => word.as_plain_literal(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Pipe,     // |
    PipeAmp,  // |&
    AndAnd,   // &&
    OrOr,     // ||
    Amp,      // &
    Semi,     // ;
    DSemi,    // ;;
    SemiAnd,  // ;&
    DSemiAnd, // ;;&
    LParen,   // (
    RParen,   // )
}

struct PendingHeredoc {
    id: usize,
    delimiter: String,
    strip_tabs: bool,
    quoted: bool,
}

/// Tokenize a complete source string. Returns the token stream
/// (terminated by `Eof`) and the resolved heredoc bodies, indexed by the
/// ids carried on `Redirect` tokens.
pub fn tokenize(source: &str) -> Result<(Vec<Token>, Vec<HereDoc>), ParseError> {
    let mut cs = CharStream::new(source);
    let mut tokens: Vec<Token> = Vec::new();
    let mut heredocs: Vec<HereDoc> = Vec::new();
    let mut pending: Vec<PendingHeredoc> = Vec::new();

    loop {
        skip_blank(&mut cs);
        let line = cs.line;
        let c = match cs.peek() {
            Some(c) => c,
            None => {
                collect_heredocs(&mut cs, &mut pending, &mut heredocs)?;
                tokens.push(Token::Eof);
                break;
            }
        };
        match c {
            '\n' => {
                cs.advance();
                collect_heredocs(&mut cs, &mut pending, &mut heredocs)?;
                tokens.push(Token::Newline);
            }
            '#' => {
                while let Some(n) = cs.peek() {
                    if n == '\n' {
                        break;
                    }
                    cs.advance();
                }
            }
            '&' => {
                cs.advance();
                if cs.eat('&') {
                    tokens.push(Token::Op { op: Op::AndAnd, line });
                } else if cs.peek() == Some('>') {
                    cs.advance();
                    let op = if cs.eat('>') { RedirectOp::AppendBoth } else { RedirectOp::WriteBoth };
                    tokens.push(Token::Redirect { fd: None, op, heredoc: None, line });
                } else {
                    tokens.push(Token::Op { op: Op::Amp, line });
                }
            }
            '|' => {
                cs.advance();
                if cs.eat('|') {
                    tokens.push(Token::Op { op: Op::OrOr, line });
                } else if cs.eat('&') {
                    tokens.push(Token::Op { op: Op::PipeAmp, line });
                } else {
                    tokens.push(Token::Op { op: Op::Pipe, line });
                }
            }
            ';' => {
                cs.advance();
                if cs.eat(';') {
                    if cs.eat('&') {
                        tokens.push(Token::Op { op: Op::DSemiAnd, line });
                    } else {
                        tokens.push(Token::Op { op: Op::DSemi, line });
                    }
                } else if cs.eat('&') {
                    tokens.push(Token::Op { op: Op::SemiAnd, line });
                } else {
                    tokens.push(Token::Op { op: Op::Semi, line });
                }
            }
            '(' => {
                if cs.peek_at(1) == Some('(') {
                    if let Some(expr) = try_arith_command(&mut cs) {
                        tokens.push(Token::ArithCommand { expr, line });
                        continue;
                    }
                }
                cs.advance();
                tokens.push(Token::Op { op: Op::LParen, line });
            }
            ')' => {
                cs.advance();
                tokens.push(Token::Op { op: Op::RParen, line });
            }
            '<' | '>' => {
                // `<(…)` / `>(…)` are process substitutions, which the
                // word scanner owns.
                if cs.peek_at(1) == Some('(') {
                    let word = scan_word(&mut cs)?;
                    tokens.push(Token::Word { word, line });
                    continue;
                }
                let next_id = heredocs.len() + pending.len();
                let token = scan_redirect(&mut cs, None, &mut pending, next_id)?;
                tokens.push(token);
            }
            d if d.is_ascii_digit() => {
                // io-number prefix: digits immediately before a redirect.
                let mut offset = 0;
                while cs.peek_at(offset).map(|c| c.is_ascii_digit()).unwrap_or(false) {
                    offset += 1;
                }
                if matches!(cs.peek_at(offset), Some('<' | '>')) {
                    let mut digits = String::new();
                    while cs.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                        if let Some(d) = cs.advance() {
                            digits.push(d);
                        }
                    }
                    let fd = digits.parse::<i32>().ok();
                    let next_id = heredocs.len() + pending.len();
                    let token = scan_redirect(&mut cs, fd, &mut pending, next_id)?;
                    tokens.push(token);
                } else {
                    let word = scan_word(&mut cs)?;
                    tokens.push(Token::Word { word, line });
                }
            }
            _ => {
                let word = scan_word(&mut cs)?;
                tokens.push(Token::Word { word, line });
            }
        }
    }

    Ok((tokens, heredocs))
}

fn skip_blank(cs: &mut CharStream) {
    loop {
        match cs.peek() {
            Some(' ' | '\t') => {
                cs.advance();
            }
            Some('\\') if cs.peek_at(1) == Some('\n') => {
                cs.advance();
                cs.advance();
            }
            _ => break,
        }
    }
}

fn scan_redirect(
    cs: &mut CharStream,
    fd: Option<i32>,
    pending: &mut Vec<PendingHeredoc>,
    next_id: usize,
) -> Result<Token, ParseError> {
    let line = cs.line;
    let c = cs.advance().unwrap_or(' ');
    let op = if c == '<' {
        if cs.eat('<') {
            if cs.eat('<') {
                RedirectOp::HereString
            } else {
                let strip_tabs = cs.eat('-');
                skip_blank(cs);
                let delim_word = scan_word(cs)?;
                let quoted = delim_word.as_plain_literal().is_none();
                let delimiter = delim_word.static_text().unwrap_or_default();
                pending.push(PendingHeredoc { id: next_id, delimiter, strip_tabs, quoted });
                return Ok(Token::Redirect {
                    fd,
                    op: RedirectOp::HereDoc,
                    heredoc: Some(next_id),
                    line,
                });
            }
        } else if cs.eat('&') {
            RedirectOp::DupIn
        } else if cs.eat('>') {
            RedirectOp::ReadWrite
        } else {
            RedirectOp::Read
        }
    } else {
        // '>'
        if cs.eat('>') {
            RedirectOp::Append
        } else if cs.eat('&') {
            RedirectOp::DupOut
        } else if cs.eat('|') {
            RedirectOp::Write { clobber: true }
        } else {
            RedirectOp::Write { clobber: false }
        }
    };
    Ok(Token::Redirect { fd, op, heredoc: None, line })
}

/// Consume pending heredoc bodies after a newline. Lenient at EOF: an
/// unterminated body runs to the end of input, as bash allows with a
/// warning.
fn collect_heredocs(
    cs: &mut CharStream,
    pending: &mut Vec<PendingHeredoc>,
    heredocs: &mut Vec<HereDoc>,
) -> Result<(), ParseError> {
    for p in pending.drain(..) {
        let mut body = String::new();
        loop {
            if cs.eof() {
                break;
            }
            let mut line_text = String::new();
            while let Some(c) = cs.peek() {
                cs.advance();
                if c == '\n' {
                    break;
                }
                line_text.push(c);
            }
            let check: &str = if p.strip_tabs {
                line_text.trim_start_matches('\t')
            } else {
                &line_text
            };
            if check == p.delimiter {
                break;
            }
            if p.strip_tabs {
                body.push_str(line_text.trim_start_matches('\t'));
            } else {
                body.push_str(&line_text);
            }
            body.push('\n');
        }
        let word = parse_heredoc_body(&body, p.quoted)?;
        // Placeholder slots keep ids stable across multiple docs per line.
        while heredocs.len() < p.id {
            heredocs.push(HereDoc {
                delimiter: String::new(),
                body: Word::empty(),
                strip_tabs: false,
                quoted: true,
            });
        }
        heredocs.push(HereDoc {
            delimiter: p.delimiter,
            body: word,
            strip_tabs: p.strip_tabs,
            quoted: p.quoted,
        });
    }
    Ok(())
}

/// Attempt to read `(( … ))` as an arithmetic command. Restores the
/// cursor and returns None when no matching `))` closes the expression.
fn try_arith_command(cs: &mut CharStream) -> Option<String> {
    let mark = cs.position();
    let line = cs.line;
    cs.advance(); // (
    cs.advance(); // (
    let mut depth = 0usize;
    let mut out = String::new();
    loop {
        let c = match cs.advance() {
            Some(c) => c,
            None => {
                cs.rewind_to(mark, line);
                return None;
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
                        return Some(out);
                    }
                    cs.rewind_to(mark, line);
                    return None;
                }
                depth -= 1;
                out.push(c);
            }
            '\n' => {
                cs.rewind_to(mark, line);
                return None;
            }
            _ => out.push(c),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Token> {
        tokenize(src).unwrap().0
    }

    fn ops_of(tokens: &[Token]) -> Vec<Op> {
        tokens
            .iter()
            .filter_map(|t| match t {
                Token::Op { op, .. } => Some(*op),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_simple_command() {
        let tokens = toks("echo hello");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].keyword(), Some("echo"));
        assert_eq!(tokens[1].keyword(), Some("hello"));
        assert_eq!(tokens[2], Token::Eof);
    }

    #[test]
    fn test_operators_maximal_munch() {
        let tokens = toks("a && b || c; d & e");
        assert_eq!(ops_of(&tokens), vec![Op::AndAnd, Op::OrOr, Op::Semi, Op::Amp]);
    }

    #[test]
    fn test_pipe_variants() {
        let tokens = toks("a | b |& c");
        assert_eq!(ops_of(&tokens), vec![Op::Pipe, Op::PipeAmp]);
    }

    #[test]
    fn test_case_terminators() {
        let tokens = toks(";; ;& ;;&");
        assert_eq!(ops_of(&tokens), vec![Op::DSemi, Op::SemiAnd, Op::DSemiAnd]);
    }

    #[test]
    fn test_redirects() {
        let tokens = toks("cmd > out 2>&1 >> log < in");
        let redirs: Vec<(Option<i32>, RedirectOp)> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Redirect { fd, op, .. } => Some((*fd, *op)),
                _ => None,
            })
            .collect();
        assert_eq!(
            redirs,
            vec![
                (None, RedirectOp::Write { clobber: false }),
                (Some(2), RedirectOp::DupOut),
                (None, RedirectOp::Append),
                (None, RedirectOp::Read),
            ]
        );
    }

    #[test]
    fn test_io_number_only_when_adjacent() {
        let tokens = toks("echo 2 > f");
        // "2" here is an argument, not an io-number.
        assert_eq!(tokens[1].keyword(), Some("2"));
    }

    #[test]
    fn test_clobber_and_both() {
        let tokens = toks("a >| f &> g &>> h");
        let redirs: Vec<RedirectOp> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Redirect { op, .. } => Some(*op),
                _ => None,
            })
            .collect();
        assert_eq!(
            redirs,
            vec![
                RedirectOp::Write { clobber: true },
                RedirectOp::WriteBoth,
                RedirectOp::AppendBoth,
            ]
        );
    }

    #[test]
    fn test_comment() {
        let tokens = toks("echo hi # trailing words\n");
        assert_eq!(tokens.len(), 4); // echo, hi, newline, eof
    }

    #[test]
    fn test_heredoc_collection() {
        let (tokens, heredocs) = tokenize("cat <<EOF\nline one\nline two\nEOF\n").unwrap();
        let id = tokens
            .iter()
            .find_map(|t| match t {
                Token::Redirect { heredoc: Some(id), .. } => Some(*id),
                _ => None,
            })
            .unwrap();
        let doc = &heredocs[id];
        assert_eq!(doc.delimiter, "EOF");
        assert!(!doc.quoted);
        assert_eq!(doc.body.static_text(), Some("line one\nline two\n".to_string()));
    }

    #[test]
    fn test_heredoc_quoted_delimiter() {
        let (_, heredocs) = tokenize("cat <<'EOF'\n$not_expanded\nEOF\n").unwrap();
        assert!(heredocs[0].quoted);
        assert_eq!(heredocs[0].body.static_text(), Some("$not_expanded\n".to_string()));
    }

    #[test]
    fn test_heredoc_strip_tabs() {
        let (_, heredocs) = tokenize("cat <<-EOF\n\tindented\n\tEOF\n").unwrap();
        assert!(heredocs[0].strip_tabs);
        assert_eq!(heredocs[0].body.static_text(), Some("indented\n".to_string()));
    }

    #[test]
    fn test_herestring() {
        let tokens = toks("cat <<< word");
        assert!(tokens.iter().any(|t| matches!(
            t,
            Token::Redirect { op: RedirectOp::HereString, .. }
        )));
    }

    #[test]
    fn test_arith_command() {
        let tokens = toks("((x = 1 + 2))");
        match &tokens[0] {
            Token::ArithCommand { expr, .. } => assert_eq!(expr, "x = 1 + 2"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_nested_subshell_not_arith() {
        // `( (echo a) )` keeps its parens as subshell tokens.
        let tokens = toks("( (echo a) )");
        assert!(matches!(tokens[0], Token::Op { op: Op::LParen, .. }));
    }

    #[test]
    fn test_line_continuation() {
        let tokens = toks("echo a \\\n b");
        assert_eq!(tokens.len(), 4); // echo, a, b, eof
    }

    #[test]
    fn test_line_numbers() {
        let tokens = toks("a\nb\nc");
        let lines: Vec<u32> = tokens.iter().filter_map(|t| t.line()).collect();
        assert_eq!(lines, vec![1, 2, 3]);
    }
}
