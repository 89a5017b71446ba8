//! `test` / `[`
//!
//! POSIX conditional evaluation: file tests against the virtual
//! filesystem, string and integer comparisons, `!` negation and
//! `-a`/`-o` conjunction with parentheses. Exit 0 for true, 1 for
//! false, 2 for usage errors.

use crate::bytes::{self, Bytes};
use crate::commands::{Command, CommandContext};
use crate::interp::interrupt::ExecResult;

pub struct Test;

impl Command for Test {
    fn name(&self) -> &str {
        "test"
    }

    fn execute(&self, argv: &[Bytes], ctx: &mut CommandContext<'_, '_>) -> ExecResult {
        evaluate(&argv[1..], ctx)
    }
}

pub struct Bracket;

impl Command for Bracket {
    fn name(&self) -> &str {
        "["
    }

    fn execute(&self, argv: &[Bytes], ctx: &mut CommandContext<'_, '_>) -> ExecResult {
        let args = &argv[1..];
        match args.last() {
            Some(last) if last.as_slice() == b"]" => evaluate(&args[..args.len() - 1], ctx),
            _ => ExecResult::failure("[: missing `]'", 2),
        }
    }
}

fn evaluate(args: &[Bytes], ctx: &mut CommandContext<'_, '_>) -> ExecResult {
    if args.is_empty() {
        return ExecResult::code(1);
    }
    let mut parser = TestParser { args, pos: 0, ctx };
    match parser.parse_or() {
        Ok(value) => {
            if parser.pos != args.len() {
                return ExecResult::failure("test: too many arguments", 2);
            }
            ExecResult::code(if value { 0 } else { 1 })
        }
        Err(message) => ExecResult::failure(format!("test: {}", message), 2),
    }
}

struct TestParser<'a, 'b, 'c> {
    args: &'a [Bytes],
    pos: usize,
    ctx: &'a mut CommandContext<'b, 'c>,
}

impl<'a, 'b, 'c> TestParser<'a, 'b, 'c> {
    fn peek(&self) -> Option<&[u8]> {
        self.args.get(self.pos).map(|a| a.as_slice())
    }

    fn next(&mut self) -> Option<&'a [u8]> {
        let arg = self.args.get(self.pos)?;
        self.pos += 1;
        Some(arg.as_slice())
    }

    fn parse_or(&mut self) -> Result<bool, String> {
        let mut value = self.parse_and()?;
        while self.peek() == Some(b"-o") {
            self.pos += 1;
            let rhs = self.parse_and()?;
            value = value || rhs;
        }
        Ok(value)
    }

    fn parse_and(&mut self) -> Result<bool, String> {
        let mut value = self.parse_term()?;
        while self.peek() == Some(b"-a") {
            self.pos += 1;
            let rhs = self.parse_term()?;
            value = value && rhs;
        }
        Ok(value)
    }

    fn parse_term(&mut self) -> Result<bool, String> {
        match self.peek() {
            Some(b"!") => {
                self.pos += 1;
                Ok(!self.parse_term()?)
            }
            Some(b"(") => {
                self.pos += 1;
                let value = self.parse_or()?;
                if self.next() != Some(b")") {
                    return Err("missing `)'".to_string());
                }
                Ok(value)
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<bool, String> {
        let first = self.next().ok_or_else(|| "argument expected".to_string())?;

        // Unary operators.
        if first.len() == 2 && first[0] == b'-' {
            if let Some(operand) = self.peek() {
                let operand = operand.to_vec();
                let op = first[1];
                if is_unary(op) {
                    self.pos += 1;
                    return self.apply_unary(op, &operand);
                }
            }
        }

        // Binary operators.
        if let Some(op) = self.peek() {
            let op = op.to_vec();
            if is_binary(&op) {
                self.pos += 1;
                let rhs = self
                    .next()
                    .ok_or_else(|| format!("{}: argument expected", bytes::lossy_string(&op)))?
                    .to_vec();
                return apply_binary(&op, first, &rhs);
            }
        }

        // A bare string is true when non-empty.
        Ok(!first.is_empty())
    }

    fn apply_unary(&mut self, op: u8, operand: &[u8]) -> Result<bool, String> {
        let text = bytes::lossy_string(operand);
        match op {
            b'z' => Ok(operand.is_empty()),
            b'n' => Ok(!operand.is_empty()),
            b'e' => Ok(self.stat_ok(&text, |_| true)),
            b'f' => Ok(self.stat_ok(&text, |s| s.is_file)),
            b'd' => Ok(self.stat_ok(&text, |s| s.is_directory)),
            b'h' | b'L' => {
                let path = self.ctx.resolve_path(&text);
                Ok(self.ctx.fs().lstat(&path).map(|s| s.is_symlink).unwrap_or(false))
            }
            b's' => Ok(self.stat_ok(&text, |s| s.size > 0)),
            b'r' | b'w' | b'x' => {
                // Permission bits are advisory in the sandbox.
                Ok(self.stat_ok(&text, |_| true))
            }
            b't' => Ok(false),
            b'v' => Ok(self.ctx.state.scopes.is_set(&text)),
            _ => Err(format!("-{}: unary operator expected", op as char)),
        }
    }

    fn stat_ok(&self, path: &str, check: impl Fn(&crate::fs::FileStat) -> bool) -> bool {
        let resolved = self.ctx.resolve_path(path);
        self.ctx.fs().stat(&resolved).map(|s| check(&s)).unwrap_or(false)
    }
}

fn is_unary(op: u8) -> bool {
    matches!(op, b'z' | b'n' | b'e' | b'f' | b'd' | b'h' | b'L' | b's' | b'r' | b'w' | b'x' | b't' | b'v')
}

fn is_binary(op: &[u8]) -> bool {
    matches!(
        op,
        b"=" | b"==" | b"!=" | b"<" | b">" | b"-eq" | b"-ne" | b"-lt" | b"-le" | b"-gt" | b"-ge"
    )
}

fn apply_binary(op: &[u8], lhs: &[u8], rhs: &[u8]) -> Result<bool, String> {
    match op {
        b"=" | b"==" => Ok(lhs == rhs),
        b"!=" => Ok(lhs != rhs),
        b"<" => Ok(lhs < rhs),
        b">" => Ok(lhs > rhs),
        _ => {
            let a = bytes::parse_i64(lhs)
                .ok_or_else(|| format!("{}: integer expression expected", bytes::lossy_string(lhs)))?;
            let b = bytes::parse_i64(rhs)
                .ok_or_else(|| format!("{}: integer expression expected", bytes::lossy_string(rhs)))?;
            Ok(match op {
                b"-eq" => a == b,
                b"-ne" => a != b,
                b"-lt" => a < b,
                b"-le" => a <= b,
                b"-gt" => a > b,
                b"-ge" => a >= b,
                _ => return Err("unknown operator".to_string()),
            })
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_string_ops() {
        assert_eq!(apply_binary(b"=", b"a", b"a"), Ok(true));
        assert_eq!(apply_binary(b"!=", b"a", b"b"), Ok(true));
        assert_eq!(apply_binary(b"<", b"abc", b"abd"), Ok(true));
    }

    #[test]
    fn test_binary_numeric_ops() {
        assert_eq!(apply_binary(b"-eq", b"3", b"3"), Ok(true));
        assert_eq!(apply_binary(b"-lt", b"2", b"10"), Ok(true));
        assert_eq!(apply_binary(b"-ge", b"5", b"5"), Ok(true));
        assert!(apply_binary(b"-eq", b"x", b"3").is_err());
    }

    #[test]
    fn test_operator_tables() {
        assert!(is_unary(b'f'));
        assert!(is_unary(b'z'));
        assert!(!is_unary(b'q'));
        assert!(is_binary(b"-eq"));
        assert!(is_binary(b"="));
        assert!(!is_binary(b"-zz"));
    }
}
