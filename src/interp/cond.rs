//! Extended Tests
//!
//! Evaluation of `[[ … ]]`: file and string unary tests, pattern
//! matching for `==`/`!=` (the unquoted right side is a shell pattern),
//! regular expressions for `=~` (quoted spans are literal; capture
//! groups land in `BASH_REMATCH`), lexicographic `<`/`>`, and the
//! arithmetic comparison family. Operands expand with no word splitting
//! and no pathname expansion. Exit 0 is true, 1 false, 2 an expression
//! error.

use regex_lite::Regex;

use crate::bytes::{self, Bytes};
use crate::interp::arith::eval_arith;
use crate::interp::engine::Executor;
use crate::interp::expand::{expand_word_pattern, expand_word_single, ExpandSide, Field};
use crate::interp::glob::match_pattern;
use crate::interp::interrupt::Flow;
use crate::interp::state::ShellState;
use crate::parser::ast::{CondBinaryOp, CondExpr, Word};

/// Evaluate a `[[ … ]]` expression to its exit code.
pub fn eval_cond(
    ex: &Executor<'_>,
    st: &mut ShellState,
    expr: &CondExpr,
    side: &mut ExpandSide,
) -> Flow<i32> {
    match expr {
        CondExpr::And(left, right) => {
            let code = eval_cond(ex, st, left, side)?;
            if code != 0 {
                return Ok(code);
            }
            eval_cond(ex, st, right, side)
        }
        CondExpr::Or(left, right) => {
            let code = eval_cond(ex, st, left, side)?;
            match code {
                0 => Ok(0),
                1 => eval_cond(ex, st, right, side),
                other => Ok(other),
            }
        }
        CondExpr::Not(inner) => Ok(match eval_cond(ex, st, inner, side)? {
            0 => 1,
            1 => 0,
            other => other,
        }),
        CondExpr::Value(word) => {
            let value = expand_word_single(ex, st, word, side)?;
            Ok(if value.is_empty() { 1 } else { 0 })
        }
        CondExpr::Unary { op, operand } => eval_unary(ex, st, *op, operand, side),
        CondExpr::Binary { op, lhs, rhs } => eval_binary(ex, st, *op, lhs, rhs, side),
    }
}

fn eval_unary(
    ex: &Executor<'_>,
    st: &mut ShellState,
    op: char,
    operand: &Word,
    side: &mut ExpandSide,
) -> Flow<i32> {
    let value = expand_word_single(ex, st, operand, side)?;
    let text = bytes::lossy_string(&value);
    let truth = match op {
        'z' => value.is_empty(),
        'n' => !value.is_empty(),
        'v' => st.scopes.is_set(&text),
        't' => false,
        'h' | 'L' => {
            let path = ex.fs.resolve_path(&st.cwd, &text);
            ex.fs.lstat(&path).map(|s| s.is_symlink).unwrap_or(false)
        }
        _ => {
            let path = ex.fs.resolve_path(&st.cwd, &text);
            match ex.fs.stat(&path) {
                Ok(stat) => match op {
                    'e' => true,
                    'f' => stat.is_file,
                    'd' => stat.is_directory,
                    's' => stat.size > 0,
                    // Permission bits are advisory in the sandbox.
                    'r' | 'w' | 'x' => true,
                    _ => false,
                },
                Err(_) => false,
            }
        }
    };
    Ok(if truth { 0 } else { 1 })
}

fn eval_binary(
    ex: &Executor<'_>,
    st: &mut ShellState,
    op: CondBinaryOp,
    lhs: &Word,
    rhs: &Word,
    side: &mut ExpandSide,
) -> Flow<i32> {
    match op {
        CondBinaryOp::Match | CondBinaryOp::NotMatch => {
            let subject = expand_word_single(ex, st, lhs, side)?;
            let field = expand_word_pattern(ex, st, rhs, side)?;
            let matched = match_pattern(st, &field).matches(&subject);
            let wanted = op == CondBinaryOp::Match;
            Ok(if matched == wanted { 0 } else { 1 })
        }
        CondBinaryOp::Regex => {
            let subject = expand_word_single(ex, st, lhs, side)?;
            let field = expand_word_pattern(ex, st, rhs, side)?;
            let pattern = regex_text(&field);
            let regex = match Regex::new(&pattern) {
                Ok(regex) => regex,
                Err(_) => {
                    side.stderr.extend_from_slice(
                        format!(
                            "bash: invalid regular expression: {}\n",
                            bytes::lossy_string(&field.bytes)
                        )
                        .as_bytes(),
                    );
                    return Ok(2);
                }
            };
            let text = bytes::lossy_string(&subject);
            match regex.captures(&text) {
                Some(captures) => {
                    let groups: Vec<Bytes> = (0..captures.len())
                        .map(|i| {
                            captures
                                .get(i)
                                .map(|m| m.as_str().as_bytes().to_vec())
                                .unwrap_or_default()
                        })
                        .collect();
                    let _ = st.scopes.set_array("BASH_REMATCH", groups);
                    Ok(0)
                }
                None => Ok(1),
            }
        }
        CondBinaryOp::Less | CondBinaryOp::Greater => {
            let a = expand_word_single(ex, st, lhs, side)?;
            let b = expand_word_single(ex, st, rhs, side)?;
            let truth = if op == CondBinaryOp::Less { a < b } else { a > b };
            Ok(if truth { 0 } else { 1 })
        }
        _ => {
            let a = cond_int(ex, st, lhs, side)?;
            let b = cond_int(ex, st, rhs, side)?;
            let truth = match op {
                CondBinaryOp::Eq => a == b,
                CondBinaryOp::Ne => a != b,
                CondBinaryOp::Lt => a < b,
                CondBinaryOp::Le => a <= b,
                CondBinaryOp::Gt => a > b,
                CondBinaryOp::Ge => a >= b,
                _ => false,
            };
            Ok(if truth { 0 } else { 1 })
        }
    }
}

/// Arithmetic operands of `-eq` and friends evaluate as expressions, so
/// `[[ x -eq 4 ]]` reads the variable `x`.
fn cond_int(
    ex: &Executor<'_>,
    st: &mut ShellState,
    word: &Word,
    side: &mut ExpandSide,
) -> Flow<i64> {
    let value = expand_word_single(ex, st, word, side)?;
    eval_arith(st, &bytes::lossy_string(&value))
}

/// Build the regex source: quoted spans match literally.
fn regex_text(field: &Field) -> String {
    let mut out = Bytes::with_capacity(field.bytes.len());
    for (i, &b) in field.bytes.iter().enumerate() {
        let quoted = field.mask.get(i).copied().unwrap_or(false);
        if quoted && is_regex_meta(b) {
            out.push(b'\\');
        }
        out.push(b);
    }
    bytes::lossy_string(&out)
}

fn is_regex_meta(b: u8) -> bool {
    matches!(
        b,
        b'.' | b'*' | b'+' | b'?' | b'^' | b'$' | b'{' | b'}' | b'(' | b')' | b'|' | b'[' | b']'
            | b'\\'
    )
}

// ============================================================================
// Tests
// ============================================================================
