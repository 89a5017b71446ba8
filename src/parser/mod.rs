//! Parser
//!
//! Recursive descent over the token stream. Lists bind `&&`/`||` tighter
//! than `;`/`&`, all left-associative; reserved words are recognized only
//! at command position. Alias expansion happens between lexing and
//! parsing, one pass per token with loop prevention.
//!
//! The parser never executes anything and never touches the environment;
//! its only outputs are an AST and a diagnostic.

pub mod ast;
pub mod lexer;
pub mod words;

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use ast::{
    Assignment, CaseArm, CaseTerminator, CondBinaryOp, CondExpr, HereDoc, List, ListOp, Pipeline,
    Redirect, RedirectOp, RedirectTarget, SimpleCommand, Statement, Word, WordPart,
};
use lexer::{tokenize, Op, Token};

/// Parse failure; surfaces as exit code 2 with nothing executed.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub line: u32,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parse a script with no alias table.
pub fn parse(source: &str) -> Result<Vec<Statement>, ParseError> {
    parse_with_aliases(source, &IndexMap::new())
}

/// Parse a script, expanding aliases at command position.
pub fn parse_with_aliases(
    source: &str,
    aliases: &IndexMap<String, String>,
) -> Result<Vec<Statement>, ParseError> {
    let (tokens, heredocs) = tokenize(source)?;
    let mut parser = Parser::new(tokens, heredocs, aliases);
    parser.parse_program()
}

/// Internal entry used for substitution bodies, which carry no aliases.
pub(crate) fn parse_statements(source: &str) -> Result<Vec<Statement>, ParseError> {
    parse(source)
}

struct QueuedToken {
    token: Token,
    /// Alias names already expanded in this chain; never re-expanded.
    noexpand: Rc<HashSet<String>>,
}

struct Parser<'a> {
    tokens: VecDeque<QueuedToken>,
    heredocs: Vec<HereDoc>,
    aliases: &'a IndexMap<String, String>,
    line: u32,
}

const CLOSERS: &[&str] = &["then", "else", "elif", "fi", "do", "done", "esac", "}"];

impl<'a> Parser<'a> {
    fn new(tokens: Vec<Token>, heredocs: Vec<HereDoc>, aliases: &'a IndexMap<String, String>) -> Self {
        let empty = Rc::new(HashSet::new());
        let tokens = tokens
            .into_iter()
            .map(|token| QueuedToken { token, noexpand: empty.clone() })
            .collect();
        Self { tokens, heredocs, aliases, line: 1 }
    }

    fn peek(&self) -> &Token {
        self.tokens.front().map(|q| &q.token).unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(offset).map(|q| &q.token).unwrap_or(&Token::Eof)
    }

    fn next(&mut self) -> Token {
        match self.tokens.pop_front() {
            Some(q) => {
                if let Some(line) = q.token.line() {
                    self.line = line;
                }
                q.token
            }
            None => Token::Eof,
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Token::Newline) {
            self.next();
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError { message: message.into(), line: self.line }
    }

    fn unexpected(&self) -> ParseError {
        let what = match self.peek() {
            Token::Word { word, .. } => word
                .as_plain_literal()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "word".to_string()),
            Token::Op { op, .. } => op_symbol(*op).to_string(),
            Token::Redirect { .. } => "redirection".to_string(),
            Token::ArithCommand { .. } => "((".to_string(),
            Token::Newline => "newline".to_string(),
            Token::Eof => return self.error("syntax error: unexpected end of file"),
        };
        self.error(format!("syntax error near unexpected token `{}'", what))
    }

    /// The next token's keyword text, if it is an unquoted literal word.
    fn peek_keyword(&self) -> Option<&str> {
        self.peek().keyword()
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.peek_keyword() == Some(kw) {
            self.next();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), ParseError> {
        self.skip_newlines();
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    // ------------------------------------------------------------------
    // Alias expansion (post-lex, pre-parse)
    // ------------------------------------------------------------------

    fn maybe_expand_alias(&mut self) {
        if self.aliases.is_empty() {
            return;
        }
        // One pass per token; the chain set blocks self-recursion.
        for _ in 0..16 {
            let (name, noexpand) = match self.tokens.front() {
                Some(q) => match q.token.keyword() {
                    Some(name) if !q.noexpand.contains(name) => {
                        (name.to_string(), q.noexpand.clone())
                    }
                    _ => return,
                },
                None => return,
            };
            let Some(value) = self.aliases.get(&name) else { return };
            let Ok((mut spliced, _)) = tokenize(value) else { return };
            // Drop the terminating Eof (and a trailing newline, if any).
            while matches!(spliced.last(), Some(Token::Eof) | Some(Token::Newline)) {
                spliced.pop();
            }
            self.tokens.pop_front();
            let mut chain = (*noexpand).clone();
            chain.insert(name);
            let chain = Rc::new(chain);
            for token in spliced.into_iter().rev() {
                self.tokens.push_front(QueuedToken { token, noexpand: chain.clone() });
            }
        }
    }

    // ------------------------------------------------------------------
    // Program and lists
    // ------------------------------------------------------------------

    fn parse_program(&mut self) -> Result<Vec<Statement>, ParseError> {
        let mut statements = Vec::new();
        loop {
            self.skip_newlines();
            if matches!(self.peek(), Token::Eof) {
                break;
            }
            match self.parse_list()? {
                Some(stmt) => statements.push(stmt),
                None => return Err(self.unexpected()),
            }
        }
        Ok(statements)
    }

    fn parse_list(&mut self) -> Result<Option<Statement>, ParseError> {
        let Some(mut node) = self.parse_and_or()? else {
            return Ok(None);
        };
        loop {
            match self.peek() {
                Token::Op { op: Op::Semi, .. } => {
                    self.next();
                    match self.parse_and_or()? {
                        Some(rhs) => {
                            node = Statement::List(List {
                                left: Box::new(node),
                                op: ListOp::Seq,
                                right: Some(Box::new(rhs)),
                            });
                        }
                        None => break,
                    }
                }
                Token::Op { op: Op::Amp, .. } => {
                    self.next();
                    let rhs = self.parse_and_or()?;
                    node = Statement::List(List {
                        left: Box::new(node),
                        op: ListOp::Background,
                        right: rhs.map(Box::new),
                    });
                }
                _ => break,
            }
        }
        Ok(Some(node))
    }

    fn parse_and_or(&mut self) -> Result<Option<Statement>, ParseError> {
        let Some(mut node) = self.parse_pipeline()? else {
            return Ok(None);
        };
        loop {
            let op = match self.peek() {
                Token::Op { op: Op::AndAnd, .. } => ListOp::And,
                Token::Op { op: Op::OrOr, .. } => ListOp::Or,
                _ => break,
            };
            self.next();
            self.skip_newlines();
            let rhs = self.parse_pipeline()?.ok_or_else(|| self.unexpected())?;
            node = Statement::List(List {
                left: Box::new(node),
                op,
                right: Some(Box::new(rhs)),
            });
        }
        Ok(Some(node))
    }

    fn parse_pipeline(&mut self) -> Result<Option<Statement>, ParseError> {
        let mut timed = false;
        let mut time_posix = false;
        while self.peek_keyword() == Some("time") {
            self.next();
            timed = true;
            if self.peek_keyword() == Some("-p") {
                self.next();
                time_posix = true;
            }
        }
        let mut negated = false;
        while self.peek_keyword() == Some("!") {
            self.next();
            negated = !negated;
        }
        let Some(first) = self.parse_command()? else {
            if negated {
                return Err(self.unexpected());
            }
            if timed {
                // A bare `time` reports on an empty pipeline.
                return Ok(Some(Statement::Pipeline(Pipeline {
                    stages: vec![Statement::Simple(SimpleCommand {
                        assignments: Vec::new(),
                        words: vec![Word::literal("true")],
                        redirects: Vec::new(),
                        line: self.line,
                    })],
                    negated: false,
                    stderr_pipes: Vec::new(),
                    timed,
                    time_posix,
                })));
            }
            return Ok(None);
        };
        let mut stages = vec![first];
        let mut stderr_pipes = Vec::new();
        loop {
            let pipe_stderr = match self.peek() {
                Token::Op { op: Op::Pipe, .. } => false,
                Token::Op { op: Op::PipeAmp, .. } => true,
                _ => break,
            };
            self.next();
            self.skip_newlines();
            let stage = self.parse_command()?.ok_or_else(|| self.unexpected())?;
            stderr_pipes.push(pipe_stderr);
            stages.push(stage);
        }
        Ok(Some(Statement::Pipeline(Pipeline {
            stages,
            negated,
            stderr_pipes,
            timed,
            time_posix,
        })))
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    fn parse_command(&mut self) -> Result<Option<Statement>, ParseError> {
        self.maybe_expand_alias();
        match self.peek() {
            Token::Eof | Token::Newline => Ok(None),
            Token::Op {
                op: Op::RParen | Op::DSemi | Op::SemiAnd | Op::DSemiAnd | Op::Semi | Op::Amp,
                ..
            } => Ok(None),
            Token::Op { op: Op::AndAnd | Op::OrOr | Op::Pipe | Op::PipeAmp, .. } => {
                Err(self.unexpected())
            }
            Token::Op { op: Op::LParen, .. } => {
                self.next();
                let body = self.parse_body()?;
                if !matches!(self.peek(), Token::Op { op: Op::RParen, .. }) {
                    return Err(self.unexpected());
                }
                self.next();
                let redirects = self.parse_redirect_suffix()?;
                Ok(Some(Statement::Subshell { body, redirects }))
            }
            Token::ArithCommand { .. } => {
                let (expr, line) = match self.next() {
                    Token::ArithCommand { expr, line } => (expr, line),
                    _ => unreachable!(),
                };
                let redirects = self.parse_redirect_suffix()?;
                Ok(Some(Statement::Arithmetic { expr, redirects, line }))
            }
            Token::Redirect { .. } => self.parse_simple().map(Some),
            Token::Word { .. } => {
                match self.peek_keyword() {
                    Some(kw) if CLOSERS.contains(&kw) => Ok(None),
                    Some("if") => self.parse_if().map(Some),
                    Some("while") => self.parse_while(false).map(Some),
                    Some("until") => self.parse_while(true).map(Some),
                    Some("for") => self.parse_for().map(Some),
                    Some("select") => self.parse_select().map(Some),
                    Some("case") => self.parse_case().map(Some),
                    Some("[[") => self.parse_conditional().map(Some),
                    Some("function") => self.parse_function_keyword().map(Some),
                    Some("{") => {
                        self.next();
                        let body = self.parse_body()?;
                        if !self.eat_keyword("}") {
                            return Err(self.unexpected());
                        }
                        let redirects = self.parse_redirect_suffix()?;
                        Ok(Some(Statement::Group { body, redirects }))
                    }
                    _ => {
                        // `name()` function definition form.
                        if let Some(name) = self.peek_keyword() {
                            if crate::bytes::is_valid_name(name)
                                && matches!(self.peek_at(1), Token::Op { op: Op::LParen, .. })
                                && matches!(self.peek_at(2), Token::Op { op: Op::RParen, .. })
                            {
                                let name = name.to_string();
                                self.next();
                                self.next();
                                self.next();
                                self.skip_newlines();
                                let body =
                                    self.parse_command()?.ok_or_else(|| self.unexpected())?;
                                return Ok(Some(Statement::Function {
                                    name,
                                    body: Box::new(body),
                                }));
                            }
                        }
                        self.parse_simple().map(Some)
                    }
                }
            }
        }
    }

    /// Statements separated by newlines (and list separators) until a
    /// context closer is visible at command position.
    fn parse_body(&mut self) -> Result<Vec<Statement>, ParseError> {
        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            if matches!(self.peek(), Token::Eof) {
                break;
            }
            match self.parse_list()? {
                Some(stmt) => body.push(stmt),
                None => break,
            }
        }
        Ok(body)
    }

    fn parse_if(&mut self) -> Result<Statement, ParseError> {
        self.next(); // if
        let mut clauses = Vec::new();
        let cond = self.parse_body()?;
        self.expect_keyword("then")?;
        let then_body = self.parse_body()?;
        clauses.push(ast::IfClause { cond, body: then_body });
        let mut else_body = None;
        loop {
            self.skip_newlines();
            if self.eat_keyword("elif") {
                let cond = self.parse_body()?;
                self.expect_keyword("then")?;
                let body = self.parse_body()?;
                clauses.push(ast::IfClause { cond, body });
            } else if self.eat_keyword("else") {
                else_body = Some(self.parse_body()?);
            } else if self.eat_keyword("fi") {
                break;
            } else {
                return Err(self.unexpected());
            }
        }
        let redirects = self.parse_redirect_suffix()?;
        Ok(Statement::If { clauses, else_body, redirects })
    }

    fn parse_while(&mut self, until: bool) -> Result<Statement, ParseError> {
        self.next(); // while / until
        let cond = self.parse_body()?;
        self.expect_keyword("do")?;
        let body = self.parse_body()?;
        self.expect_keyword("done")?;
        let redirects = self.parse_redirect_suffix()?;
        Ok(Statement::While { cond, body, until, redirects })
    }

    fn parse_for(&mut self) -> Result<Statement, ParseError> {
        let line = self.line;
        self.next(); // for

        if let Token::ArithCommand { .. } = self.peek() {
            let expr = match self.next() {
                Token::ArithCommand { expr, .. } => expr,
                _ => unreachable!(),
            };
            let mut sections = expr.splitn(3, ';').map(|s| s.trim().to_string());
            let init = sections.next().filter(|s| !s.is_empty());
            let cond = sections.next().filter(|s| !s.is_empty());
            let step = sections.next().filter(|s| !s.is_empty());
            self.skip_separators();
            self.expect_keyword("do")?;
            let body = self.parse_body()?;
            self.expect_keyword("done")?;
            let redirects = self.parse_redirect_suffix()?;
            return Ok(Statement::ForArith { init, cond, step, body, redirects });
        }

        let var = match self.peek_keyword() {
            Some(name) if crate::bytes::is_valid_name(name) => {
                let name = name.to_string();
                self.next();
                name
            }
            _ => return Err(self.unexpected()),
        };

        let words = if self.eat_keyword("in") {
            let mut list = Vec::new();
            loop {
                match self.peek() {
                    Token::Word { .. } => {
                        if let Token::Word { word, .. } = self.next() {
                            list.push(word);
                        }
                    }
                    _ => break,
                }
            }
            Some(list)
        } else {
            None
        };

        self.skip_separators();
        self.expect_keyword("do")?;
        let body = self.parse_body()?;
        self.expect_keyword("done")?;
        let redirects = self.parse_redirect_suffix()?;
        Ok(Statement::For { var, words, body, redirects, line })
    }

    fn parse_select(&mut self) -> Result<Statement, ParseError> {
        let line = self.line;
        self.next(); // select

        let var = match self.peek_keyword() {
            Some(name) if crate::bytes::is_valid_name(name) => {
                let name = name.to_string();
                self.next();
                name
            }
            _ => return Err(self.unexpected()),
        };

        let words = if self.eat_keyword("in") {
            let mut list = Vec::new();
            while matches!(self.peek(), Token::Word { .. }) {
                if let Token::Word { word, .. } = self.next() {
                    list.push(word);
                }
            }
            Some(list)
        } else {
            None
        };

        self.skip_separators();
        self.expect_keyword("do")?;
        let body = self.parse_body()?;
        self.expect_keyword("done")?;
        let redirects = self.parse_redirect_suffix()?;
        Ok(Statement::Select { var, words, body, redirects, line })
    }

    // ------------------------------------------------------------------
    // [[ … ]] extended tests
    // ------------------------------------------------------------------

    fn parse_conditional(&mut self) -> Result<Statement, ParseError> {
        let line = self.line;
        self.next(); // [[
        let expr = self.parse_cond_or()?;
        self.skip_newlines();
        if !self.eat_keyword("]]") {
            return Err(self.unexpected());
        }
        let redirects = self.parse_redirect_suffix()?;
        Ok(Statement::Conditional { expr, redirects, line })
    }

    fn parse_cond_or(&mut self) -> Result<CondExpr, ParseError> {
        let mut node = self.parse_cond_and()?;
        loop {
            self.skip_newlines();
            if matches!(self.peek(), Token::Op { op: Op::OrOr, .. }) {
                self.next();
                self.skip_newlines();
                let rhs = self.parse_cond_and()?;
                node = CondExpr::Or(Box::new(node), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(node)
    }

    fn parse_cond_and(&mut self) -> Result<CondExpr, ParseError> {
        let mut node = self.parse_cond_term()?;
        loop {
            self.skip_newlines();
            if matches!(self.peek(), Token::Op { op: Op::AndAnd, .. }) {
                self.next();
                self.skip_newlines();
                let rhs = self.parse_cond_term()?;
                node = CondExpr::And(Box::new(node), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(node)
    }

    fn parse_cond_term(&mut self) -> Result<CondExpr, ParseError> {
        self.skip_newlines();
        if self.peek_keyword() == Some("!") {
            self.next();
            return Ok(CondExpr::Not(Box::new(self.parse_cond_term()?)));
        }
        if matches!(self.peek(), Token::Op { op: Op::LParen, .. }) {
            self.next();
            let inner = self.parse_cond_or()?;
            self.skip_newlines();
            if !matches!(self.peek(), Token::Op { op: Op::RParen, .. }) {
                return Err(self.unexpected());
            }
            self.next();
            return Ok(inner);
        }

        // Unary file/string tests: `-f word` and friends.
        if let Some(op) = self.cond_unary_op() {
            self.next();
            let operand = match self.next() {
                Token::Word { word, .. } => word,
                _ => return Err(self.unexpected()),
            };
            return Ok(CondExpr::Unary { op, operand });
        }

        if self.peek_keyword() == Some("]]") {
            return Err(self.unexpected());
        }
        let lhs = match self.next() {
            Token::Word { word, .. } => word,
            _ => return Err(self.unexpected()),
        };
        if let Some(op) = self.cond_binary_op() {
            self.next();
            let rhs = match op {
                CondBinaryOp::Match | CondBinaryOp::NotMatch | CondBinaryOp::Regex => {
                    self.parse_cond_pattern_word()?
                }
                _ => match self.next() {
                    Token::Word { word, .. } => word,
                    _ => return Err(self.unexpected()),
                },
            };
            return Ok(CondExpr::Binary { op, lhs, rhs });
        }
        Ok(CondExpr::Value(lhs))
    }

    /// Collect the pattern/regex operand right of `==`/`!=`/`=~`. The
    /// lexer splits `(`, `)` and `|` out of words, so extglob patterns
    /// and grouped regexes are stitched back together here.
    fn parse_cond_pattern_word(&mut self) -> Result<Word, ParseError> {
        let mut parts: Vec<WordPart> = Vec::new();
        let mut depth = 0usize;
        loop {
            match self.peek() {
                Token::Word { word, .. } => {
                    if depth == 0 && word.as_plain_literal() == Some("]]") {
                        break;
                    }
                    if let Token::Word { word, .. } = self.next() {
                        parts.extend(word.parts);
                    }
                }
                Token::Op { op: Op::LParen, .. } => {
                    depth += 1;
                    self.next();
                    parts.push(WordPart::Literal("(".to_string()));
                }
                Token::Op { op: Op::RParen, .. } => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                    self.next();
                    parts.push(WordPart::Literal(")".to_string()));
                }
                Token::Op { op: Op::Pipe, .. } => {
                    self.next();
                    parts.push(WordPart::Literal("|".to_string()));
                }
                _ => break,
            }
        }
        if parts.is_empty() {
            return Err(self.unexpected());
        }
        Ok(Word { parts })
    }

    const COND_UNARY_OPS: &'static str = "edfhLsznrwxtv";

    fn cond_unary_op(&self) -> Option<char> {
        let kw = self.peek_keyword()?;
        let mut chars = kw.chars();
        if chars.next() != Some('-') {
            return None;
        }
        let op = chars.next()?;
        if chars.next().is_some() || !Self::COND_UNARY_OPS.contains(op) {
            return None;
        }
        // An operator needs an operand word after it.
        if matches!(self.peek_at(1), Token::Word { .. }) {
            Some(op)
        } else {
            None
        }
    }

    /// The binary operator at the cursor, if any. `<` and `>` arrive as
    /// redirect tokens and mean lexicographic comparison here.
    fn cond_binary_op(&self) -> Option<CondBinaryOp> {
        match self.peek() {
            Token::Redirect { fd: None, op: RedirectOp::Read, heredoc: None, .. } => {
                return Some(CondBinaryOp::Less);
            }
            Token::Redirect { fd: None, op: RedirectOp::Write { clobber: false }, .. } => {
                return Some(CondBinaryOp::Greater);
            }
            _ => {}
        }
        match self.peek_keyword()? {
            "==" | "=" => Some(CondBinaryOp::Match),
            "!=" => Some(CondBinaryOp::NotMatch),
            "=~" => Some(CondBinaryOp::Regex),
            "-eq" => Some(CondBinaryOp::Eq),
            "-ne" => Some(CondBinaryOp::Ne),
            "-lt" => Some(CondBinaryOp::Lt),
            "-le" => Some(CondBinaryOp::Le),
            "-gt" => Some(CondBinaryOp::Gt),
            "-ge" => Some(CondBinaryOp::Ge),
            _ => None,
        }
    }

    fn parse_case(&mut self) -> Result<Statement, ParseError> {
        self.next(); // case
        let word = match self.next() {
            Token::Word { word, .. } => word,
            _ => return Err(self.unexpected()),
        };
        self.expect_keyword("in")?;

        let mut arms = Vec::new();
        loop {
            self.skip_newlines();
            if self.eat_keyword("esac") {
                break;
            }
            if matches!(self.peek(), Token::Op { op: Op::LParen, .. }) {
                self.next();
            }
            let mut patterns = Vec::new();
            loop {
                match self.next() {
                    Token::Word { word, .. } => patterns.push(word),
                    _ => return Err(self.unexpected()),
                }
                match self.peek() {
                    Token::Op { op: Op::Pipe, .. } => {
                        self.next();
                    }
                    Token::Op { op: Op::RParen, .. } => {
                        self.next();
                        break;
                    }
                    _ => return Err(self.unexpected()),
                }
            }
            let body = self.parse_body()?;
            let terminator = match self.peek() {
                Token::Op { op: Op::DSemi, .. } => {
                    self.next();
                    CaseTerminator::Break
                }
                Token::Op { op: Op::SemiAnd, .. } => {
                    self.next();
                    CaseTerminator::FallThrough
                }
                Token::Op { op: Op::DSemiAnd, .. } => {
                    self.next();
                    CaseTerminator::Continue
                }
                _ => CaseTerminator::Break,
            };
            arms.push(CaseArm { patterns, body, terminator });
        }
        let redirects = self.parse_redirect_suffix()?;
        Ok(Statement::Case { word, arms, redirects })
    }

    fn parse_function_keyword(&mut self) -> Result<Statement, ParseError> {
        self.next(); // function
        let name = match self.peek_keyword() {
            Some(name) => {
                let name = name.to_string();
                self.next();
                name
            }
            None => return Err(self.unexpected()),
        };
        // Optional `()` after the name.
        if matches!(self.peek(), Token::Op { op: Op::LParen, .. })
            && matches!(self.peek_at(1), Token::Op { op: Op::RParen, .. })
        {
            self.next();
            self.next();
        }
        self.skip_newlines();
        let body = self.parse_command()?.ok_or_else(|| self.unexpected())?;
        Ok(Statement::Function { name, body: Box::new(body) })
    }

    fn skip_separators(&mut self) {
        loop {
            match self.peek() {
                Token::Newline | Token::Op { op: Op::Semi, .. } => {
                    self.next();
                }
                _ => break,
            }
        }
    }

    // ------------------------------------------------------------------
    // Simple commands
    // ------------------------------------------------------------------

    fn parse_simple(&mut self) -> Result<Statement, ParseError> {
        let line = self.peek().line().unwrap_or(self.line);
        let mut assignments: Vec<Assignment> = Vec::new();
        let mut words: Vec<Word> = Vec::new();
        let mut redirects: Vec<Redirect> = Vec::new();

        // Leading assignments.
        loop {
            let candidate = match self.peek() {
                Token::Word { word, .. } => to_assignment(word),
                _ => None,
            };
            match candidate {
                Some(mut assign) => {
                    self.next();
                    // `name=(…)` array literal.
                    if assign.value.as_ref().and_then(|w| w.as_plain_literal()) == Some("")
                        && matches!(self.peek(), Token::Op { op: Op::LParen, .. })
                    {
                        self.next();
                        let mut elements = Vec::new();
                        loop {
                            self.skip_newlines();
                            match self.peek() {
                                Token::Op { op: Op::RParen, .. } => {
                                    self.next();
                                    break;
                                }
                                Token::Word { .. } => {
                                    if let Token::Word { word, .. } = self.next() {
                                        elements.push(word);
                                    }
                                }
                                _ => return Err(self.unexpected()),
                            }
                        }
                        assign.value = None;
                        assign.array = Some(elements);
                    }
                    assignments.push(assign);
                }
                None => break,
            }
        }

        loop {
            match self.peek() {
                Token::Word { .. } => {
                    if let Token::Word { word, .. } = self.next() {
                        words.push(word);
                    }
                }
                Token::Redirect { .. } => {
                    redirects.push(self.parse_redirect()?);
                }
                _ => break,
            }
        }

        if assignments.is_empty() && words.is_empty() && redirects.is_empty() {
            return Err(self.unexpected());
        }
        Ok(Statement::Simple(SimpleCommand { assignments, words, redirects, line }))
    }

    fn parse_redirect(&mut self) -> Result<Redirect, ParseError> {
        let (fd, op, heredoc) = match self.next() {
            Token::Redirect { fd, op, heredoc, .. } => (fd, op, heredoc),
            _ => return Err(self.unexpected()),
        };
        if op == RedirectOp::HereDoc {
            let id = heredoc.ok_or_else(|| self.error("syntax error: missing here-document"))?;
            let doc = self
                .heredocs
                .get(id)
                .cloned()
                .ok_or_else(|| self.error("syntax error: missing here-document"))?;
            return Ok(Redirect { fd, op, target: RedirectTarget::HereDoc(doc) });
        }
        match self.next() {
            Token::Word { word, .. } => Ok(Redirect { fd, op, target: RedirectTarget::Word(word) }),
            _ => Err(self.unexpected()),
        }
    }

    fn parse_redirect_suffix(&mut self) -> Result<Vec<Redirect>, ParseError> {
        let mut redirects = Vec::new();
        while matches!(self.peek(), Token::Redirect { .. }) {
            redirects.push(self.parse_redirect()?);
        }
        Ok(redirects)
    }
}

fn op_symbol(op: Op) -> &'static str {
    match op {
        Op::Pipe => "|",
        Op::PipeAmp => "|&",
        Op::AndAnd => "&&",
        Op::OrOr => "||",
        Op::Amp => "&",
        Op::Semi => ";",
        Op::DSemi => ";;",
        Op::SemiAnd => ";&",
        Op::DSemiAnd => ";;&",
        Op::LParen => "(",
        Op::RParen => ")",
    }
}

/// Split a word into an assignment when it starts with `name=`,
/// `name+=`, or `name[sub]=` at command position.
fn to_assignment(word: &Word) -> Option<Assignment> {
    let first = match word.parts.first() {
        Some(WordPart::Literal(text)) => text,
        _ => return None,
    };
    let bytes = first.as_bytes();
    let mut i = 0;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    if i == 0 || bytes[0].is_ascii_digit() {
        return None;
    }
    let name = first[..i].to_string();

    let mut subscript = None;
    if i < bytes.len() && bytes[i] == b'[' {
        let rest = &first[i + 1..];
        let close = rest.find(']')?;
        subscript = Some(rest[..close].to_string());
        i += close + 2;
    }

    let append = i < bytes.len() && bytes[i] == b'+';
    if append {
        i += 1;
    }
    if i >= bytes.len() || bytes[i] != b'=' {
        return None;
    }
    i += 1;

    let remainder = &first[i..];
    let mut value_parts: Vec<WordPart> = Vec::new();
    if !remainder.is_empty() {
        value_parts.push(WordPart::Literal(remainder.to_string()));
    }
    value_parts.extend(word.parts.iter().skip(1).cloned());
    if value_parts.is_empty() {
        value_parts.push(WordPart::Literal(String::new()));
    }
    Some(Assignment {
        name,
        subscript,
        value: Some(Word { parts: value_parts }),
        append,
        array: None,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(src: &str) -> Statement {
        let mut stmts = parse(src).unwrap();
        assert_eq!(stmts.len(), 1, "expected one statement from {:?}", src);
        stmts.pop().unwrap()
    }

    fn as_pipeline(stmt: &Statement) -> &Pipeline {
        match stmt {
            Statement::Pipeline(p) => p,
            other => panic!("expected pipeline, got {:?}", other),
        }
    }

    #[test]
    fn test_simple_command() {
        let stmt = parse_one("echo hello world");
        let pipe = as_pipeline(&stmt);
        match &pipe.stages[0] {
            Statement::Simple(cmd) => {
                assert_eq!(cmd.words.len(), 3);
                assert_eq!(cmd.words[0].as_plain_literal(), Some("echo"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_and_or_chain() {
        let stmt = parse_one("a && b || c");
        match stmt {
            Statement::List(List { op: ListOp::Or, left, right }) => {
                assert!(matches!(*left, Statement::List(List { op: ListOp::And, .. })));
                assert!(right.is_some());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_semicolon_list() {
        let stmt = parse_one("a; b");
        assert!(matches!(stmt, Statement::List(List { op: ListOp::Seq, .. })));
    }

    #[test]
    fn test_background() {
        let stmt = parse_one("sleep 1 &");
        match stmt {
            Statement::List(List { op: ListOp::Background, right, .. }) => {
                assert!(right.is_none());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_pipeline() {
        let stmt = parse_one("a | b | c");
        let pipe = as_pipeline(&stmt);
        assert_eq!(pipe.stages.len(), 3);
        assert!(!pipe.negated);
    }

    #[test]
    fn test_negated_pipeline() {
        let stmt = parse_one("! true");
        assert!(as_pipeline(&stmt).negated);
    }

    #[test]
    fn test_if_statement() {
        let stmt = parse_one("if true; then echo yes; fi");
        match stmt {
            Statement::If { clauses, else_body, .. } => {
                assert_eq!(clauses.len(), 1);
                assert!(else_body.is_none());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_if_elif_else() {
        let stmt = parse_one("if a; then b; elif c; then d; else e; fi");
        match stmt {
            Statement::If { clauses, else_body, .. } => {
                assert_eq!(clauses.len(), 2);
                assert!(else_body.is_some());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_while_loop() {
        let stmt = parse_one("while true; do echo hi; done");
        assert!(matches!(stmt, Statement::While { until: false, .. }));
    }

    #[test]
    fn test_until_loop() {
        let stmt = parse_one("until false; do echo hi; done");
        assert!(matches!(stmt, Statement::While { until: true, .. }));
    }

    #[test]
    fn test_for_loop() {
        let stmt = parse_one("for i in 1 2 3; do echo $i; done");
        match stmt {
            Statement::For { var, words, .. } => {
                assert_eq!(var, "i");
                assert_eq!(words.unwrap().len(), 3);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_for_without_in() {
        let stmt = parse_one("for arg; do echo $arg; done");
        match stmt {
            Statement::For { words, .. } => assert!(words.is_none()),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_for_arith() {
        let stmt = parse_one("for ((i=0; i<3; i++)); do echo $i; done");
        match stmt {
            Statement::ForArith { init, cond, step, .. } => {
                assert_eq!(init.as_deref(), Some("i=0"));
                assert_eq!(cond.as_deref(), Some("i<3"));
                assert_eq!(step.as_deref(), Some("i++"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_case_statement() {
        let stmt = parse_one("case $x in a|b) echo ab ;; *) echo other ;; esac");
        match stmt {
            Statement::Case { arms, .. } => {
                assert_eq!(arms.len(), 2);
                assert_eq!(arms[0].patterns.len(), 2);
                assert_eq!(arms[0].terminator, CaseTerminator::Break);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_case_fallthrough_terminators() {
        let stmt = parse_one("case x in a) b ;& c) d ;;& e) f ;; esac");
        match stmt {
            Statement::Case { arms, .. } => {
                assert_eq!(arms[0].terminator, CaseTerminator::FallThrough);
                assert_eq!(arms[1].terminator, CaseTerminator::Continue);
                assert_eq!(arms[2].terminator, CaseTerminator::Break);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_subshell_and_group() {
        assert!(matches!(parse_one("(echo a; echo b)"), Statement::Subshell { .. }));
        assert!(matches!(parse_one("{ echo a; echo b; }"), Statement::Group { .. }));
    }

    #[test]
    fn test_function_definition() {
        let stmt = parse_one("greet() { echo hi; }");
        match stmt {
            Statement::Function { name, body } => {
                assert_eq!(name, "greet");
                assert!(matches!(*body, Statement::Group { .. }));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_function_keyword_form() {
        let stmt = parse_one("function greet { echo hi; }");
        assert!(matches!(stmt, Statement::Function { .. }));
    }

    #[test]
    fn test_assignments() {
        let stmt = parse_one("FOO=bar BAZ=qux cmd arg");
        let pipe = as_pipeline(&stmt);
        match &pipe.stages[0] {
            Statement::Simple(cmd) => {
                assert_eq!(cmd.assignments.len(), 2);
                assert_eq!(cmd.assignments[0].name, "FOO");
                assert_eq!(cmd.words.len(), 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_assignment_only() {
        let stmt = parse_one("x=1");
        let pipe = as_pipeline(&stmt);
        match &pipe.stages[0] {
            Statement::Simple(cmd) => {
                assert_eq!(cmd.assignments.len(), 1);
                assert!(cmd.words.is_empty());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_append_assignment() {
        let stmt = parse_one("x+=more");
        let pipe = as_pipeline(&stmt);
        match &pipe.stages[0] {
            Statement::Simple(cmd) => assert!(cmd.assignments[0].append),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_array_assignment() {
        let stmt = parse_one("arr=(one two three)");
        let pipe = as_pipeline(&stmt);
        match &pipe.stages[0] {
            Statement::Simple(cmd) => {
                assert_eq!(cmd.assignments[0].array.as_ref().unwrap().len(), 3);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_not_an_assignment_midword() {
        // `a=b` as an argument is an ordinary word.
        let stmt = parse_one("echo a=b");
        let pipe = as_pipeline(&stmt);
        match &pipe.stages[0] {
            Statement::Simple(cmd) => {
                assert!(cmd.assignments.is_empty());
                assert_eq!(cmd.words.len(), 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_redirect_parsing() {
        let stmt = parse_one("cmd > out.txt 2>&1");
        let pipe = as_pipeline(&stmt);
        match &pipe.stages[0] {
            Statement::Simple(cmd) => {
                assert_eq!(cmd.redirects.len(), 2);
                assert_eq!(cmd.redirects[1].fd, Some(2));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_heredoc_target() {
        let stmt = parse_one("cat <<EOF\nbody\nEOF");
        let pipe = as_pipeline(&stmt);
        match &pipe.stages[0] {
            Statement::Simple(cmd) => match &cmd.redirects[0].target {
                RedirectTarget::HereDoc(doc) => {
                    assert_eq!(doc.body.static_text(), Some("body\n".to_string()));
                }
                other => panic!("unexpected: {:?}", other),
            },
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_arith_command() {
        let stmt = parse_one("(( x > 1 ))");
        assert!(matches!(stmt, Statement::Arithmetic { .. }));
    }

    #[test]
    fn test_unclosed_if_is_error() {
        assert!(parse("if true; then echo yes").is_err());
    }

    #[test]
    fn test_unclosed_paren_is_error() {
        assert!(parse("(echo a").is_err());
    }

    #[test]
    fn test_unexpected_token_error() {
        let err = parse("echo |").unwrap_err();
        assert!(err.message.contains("syntax error"));
    }

    #[test]
    fn test_reserved_word_only_at_command_position() {
        // `if` as an argument is an ordinary word.
        let stmt = parse_one("echo if fi");
        let pipe = as_pipeline(&stmt);
        match &pipe.stages[0] {
            Statement::Simple(cmd) => assert_eq!(cmd.words.len(), 3),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_alias_expansion() {
        let mut aliases = IndexMap::new();
        aliases.insert("ll".to_string(), "ls -l".to_string());
        let stmts = parse_with_aliases("ll /tmp", &aliases).unwrap();
        let pipe = as_pipeline(&stmts[0]);
        match &pipe.stages[0] {
            Statement::Simple(cmd) => {
                let texts: Vec<_> =
                    cmd.words.iter().filter_map(|w| w.as_plain_literal()).collect();
                assert_eq!(texts, vec!["ls", "-l", "/tmp"]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_alias_loop_prevention() {
        let mut aliases = IndexMap::new();
        aliases.insert("x".to_string(), "x --flag".to_string());
        let stmts = parse_with_aliases("x", &aliases).unwrap();
        let pipe = as_pipeline(&stmts[0]);
        match &pipe.stages[0] {
            Statement::Simple(cmd) => {
                assert_eq!(cmd.words[0].as_plain_literal(), Some("x"));
                assert_eq!(cmd.words[1].as_plain_literal(), Some("--flag"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_multiline_script() {
        let stmts = parse("echo one\necho two\n\necho three\n").unwrap();
        assert_eq!(stmts.len(), 3);
    }

    #[test]
    fn test_quoted_word_is_not_keyword() {
        // `"if"` quoted must not start an if statement.
        let stmt = parse_one("\"if\" x");
        let pipe = as_pipeline(&stmt);
        assert!(matches!(&pipe.stages[0], Statement::Simple(_)));
    }

    #[test]
    fn test_select_statement() {
        let stmt = parse_one("select choice in a b c; do echo $choice; done");
        match stmt {
            Statement::Select { var, words, body, .. } => {
                assert_eq!(var, "choice");
                assert_eq!(words.unwrap().len(), 3);
                assert_eq!(body.len(), 1);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_select_without_in() {
        let stmt = parse_one("select opt; do echo $opt; done");
        match stmt {
            Statement::Select { words, .. } => assert!(words.is_none()),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_conditional_unary() {
        let stmt = parse_one("[[ -f /tmp/x ]]");
        match stmt {
            Statement::Conditional { expr, .. } => match expr {
                CondExpr::Unary { op, operand } => {
                    assert_eq!(op, 'f');
                    assert_eq!(operand.as_plain_literal(), Some("/tmp/x"));
                }
                other => panic!("unexpected: {:?}", other),
            },
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_conditional_binary_ops() {
        for (src, expected) in [
            ("[[ $a == b* ]]", CondBinaryOp::Match),
            ("[[ $a = b ]]", CondBinaryOp::Match),
            ("[[ $a != b ]]", CondBinaryOp::NotMatch),
            ("[[ $a =~ ^b ]]", CondBinaryOp::Regex),
            ("[[ $a -lt 5 ]]", CondBinaryOp::Lt),
            ("[[ $a < b ]]", CondBinaryOp::Less),
            ("[[ $a > b ]]", CondBinaryOp::Greater),
        ] {
            match parse_one(src) {
                Statement::Conditional { expr: CondExpr::Binary { op, .. }, .. } => {
                    assert_eq!(op, expected, "source: {}", src);
                }
                other => panic!("unexpected for {}: {:?}", src, other),
            }
        }
    }

    #[test]
    fn test_conditional_connectives() {
        let stmt = parse_one("[[ -n $a && ! ( -z $b || $c == d ) ]]");
        match stmt {
            Statement::Conditional { expr: CondExpr::And(left, right), .. } => {
                assert!(matches!(*left, CondExpr::Unary { op: 'n', .. }));
                assert!(matches!(*right, CondExpr::Not(_)));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_conditional_bare_word() {
        let stmt = parse_one("[[ $x ]]");
        assert!(matches!(
            stmt,
            Statement::Conditional { expr: CondExpr::Value(_), .. }
        ));
    }

    #[test]
    fn test_conditional_unclosed_is_error() {
        assert!(parse("[[ -f x").is_err());
    }

    #[test]
    fn test_time_prefix() {
        let stmt = parse_one("time echo hi");
        let pipe = as_pipeline(&stmt);
        assert!(pipe.timed);
        assert!(!pipe.time_posix);

        let stmt = parse_one("time -p sleep");
        assert!(as_pipeline(&stmt).time_posix);
    }

    #[test]
    fn test_time_is_not_keyword_as_argument() {
        let stmt = parse_one("echo time");
        let pipe = as_pipeline(&stmt);
        assert!(!pipe.timed);
        match &pipe.stages[0] {
            Statement::Simple(cmd) => assert_eq!(cmd.words.len(), 2),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
