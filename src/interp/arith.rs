//! Arithmetic Evaluator
//!
//! 64-bit signed integer expressions with C-like precedence, evaluated
//! directly from text at expansion time (variable values can themselves
//! hold expressions, so evaluation re-enters with a depth guard).
//! Assignments and ++/-- write through to the scope stack. All
//! arithmetic wraps rather than trapping.

use crate::bytes;
use crate::interp::interrupt::{Flow, Interrupt};
use crate::interp::state::ShellState;

const MAX_VALUE_RECURSION: u32 = 16;

/// Evaluate an arithmetic expression against the shell state.
pub fn eval_arith(st: &mut ShellState, expr: &str) -> Flow<i64> {
    eval_arith_depth(st, expr, 0)
}

fn eval_arith_depth(st: &mut ShellState, expr: &str, depth: u32) -> Flow<i64> {
    if depth > MAX_VALUE_RECURSION {
        return Err(Interrupt::arithmetic(
            format!("{}: expression recursion level exceeded", expr.trim()),
            false,
        ));
    }
    let mut parser = ArithParser { src: expr.as_bytes(), pos: 0, st, depth, active: true };
    parser.skip_ws();
    if parser.at_end() {
        // An empty expression evaluates to 0, as `(( ))` does.
        return Ok(0);
    }
    let value = parser.parse_comma()?;
    parser.skip_ws();
    if !parser.at_end() {
        return Err(parser.error("syntax error in expression"));
    }
    Ok(value)
}

struct ArithParser<'a, 'b> {
    src: &'a [u8],
    pos: usize,
    st: &'b mut ShellState,
    depth: u32,
    /// False inside an unevaluated branch (short-circuit, ternary arm):
    /// parsing continues but no side effects or errors fire.
    active: bool,
}

impl<'a, 'b> ArithParser<'a, 'b> {
    fn error(&self, message: impl AsRef<str>) -> Interrupt {
        let text = bytes::lossy_string(self.src);
        Interrupt::arithmetic(format!("{}: {}", text.trim(), message.as_ref()), false)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, text: &str) -> bool {
        self.skip_ws();
        let t = text.as_bytes();
        if self.src[self.pos..].starts_with(t) {
            self.pos += t.len();
            true
        } else {
            false
        }
    }

    /// Like `eat`, but refuses when the operator would be a prefix of a
    /// longer one (`<` vs `<<` vs `<<=`).
    fn eat_op(&mut self, text: &str, not_followed_by: &[u8]) -> bool {
        self.skip_ws();
        let t = text.as_bytes();
        if !self.src[self.pos..].starts_with(t) {
            return false;
        }
        if let Some(next) = self.src.get(self.pos + t.len()) {
            if not_followed_by.contains(next) {
                return false;
            }
        }
        self.pos += t.len();
        true
    }

    // ------------------------------------------------------------------
    // Precedence levels, loosest first
    // ------------------------------------------------------------------

    fn parse_comma(&mut self) -> Flow<i64> {
        let mut value = self.parse_assign()?;
        while self.eat(",") {
            value = self.parse_assign()?;
        }
        Ok(value)
    }

    fn parse_assign(&mut self) -> Flow<i64> {
        let mark = self.pos;
        self.skip_ws();
        if let Some(name) = self.try_name() {
            self.skip_ws();
            let op = self.try_assign_op();
            if let Some(op) = op {
                let rhs = self.parse_assign()?;
                if !self.active {
                    return Ok(rhs);
                }
                let value = if op.is_empty() {
                    rhs
                } else {
                    let old = self.read_var(&name)?;
                    self.apply_binary(op, old, rhs)?
                };
                self.write_var(&name, value)?;
                return Ok(value);
            }
        }
        self.pos = mark;
        self.parse_ternary()
    }

    fn try_assign_op(&mut self) -> Option<&'static str> {
        for (text, op) in [
            ("<<=", "<<"),
            (">>=", ">>"),
            ("+=", "+"),
            ("-=", "-"),
            ("*=", "*"),
            ("/=", "/"),
            ("%=", "%"),
            ("&=", "&"),
            ("|=", "|"),
            ("^=", "^"),
        ] {
            if self.eat(text) {
                return Some(op);
            }
        }
        // Plain `=`, but not `==`.
        if self.eat_op("=", b"=") {
            return Some("");
        }
        None
    }

    fn parse_ternary(&mut self) -> Flow<i64> {
        let cond = self.parse_logical_or()?;
        if !self.eat("?") {
            return Ok(cond);
        }
        let saved = self.active;
        self.active = saved && cond != 0;
        let then_value = self.parse_assign()?;
        self.active = saved;
        if !self.eat(":") {
            return Err(self.error("expected `:' in conditional expression"));
        }
        self.active = saved && cond == 0;
        let else_value = self.parse_assign()?;
        self.active = saved;
        Ok(if cond != 0 { then_value } else { else_value })
    }

    fn parse_logical_or(&mut self) -> Flow<i64> {
        let mut value = self.parse_logical_and()?;
        while self.eat("||") {
            let saved = self.active;
            self.active = saved && value == 0;
            let rhs = self.parse_logical_and()?;
            self.active = saved;
            value = if value != 0 || rhs != 0 { 1 } else { 0 };
        }
        Ok(value)
    }

    fn parse_logical_and(&mut self) -> Flow<i64> {
        let mut value = self.parse_bit_or()?;
        while self.eat("&&") {
            let saved = self.active;
            self.active = saved && value != 0;
            let rhs = self.parse_bit_or()?;
            self.active = saved;
            value = if value != 0 && rhs != 0 { 1 } else { 0 };
        }
        Ok(value)
    }

    fn parse_bit_or(&mut self) -> Flow<i64> {
        let mut value = self.parse_bit_xor()?;
        while self.eat_op("|", b"|=") {
            let rhs = self.parse_bit_xor()?;
            value |= rhs;
        }
        Ok(value)
    }

    fn parse_bit_xor(&mut self) -> Flow<i64> {
        let mut value = self.parse_bit_and()?;
        while self.eat_op("^", b"=") {
            let rhs = self.parse_bit_and()?;
            value ^= rhs;
        }
        Ok(value)
    }

    fn parse_bit_and(&mut self) -> Flow<i64> {
        let mut value = self.parse_equality()?;
        while self.eat_op("&", b"&=") {
            let rhs = self.parse_equality()?;
            value &= rhs;
        }
        Ok(value)
    }

    fn parse_equality(&mut self) -> Flow<i64> {
        let mut value = self.parse_relational()?;
        loop {
            if self.eat("==") {
                let rhs = self.parse_relational()?;
                value = (value == rhs) as i64;
            } else if self.eat("!=") {
                let rhs = self.parse_relational()?;
                value = (value != rhs) as i64;
            } else {
                break;
            }
        }
        Ok(value)
    }

    fn parse_relational(&mut self) -> Flow<i64> {
        let mut value = self.parse_shift()?;
        loop {
            if self.eat("<=") {
                let rhs = self.parse_shift()?;
                value = (value <= rhs) as i64;
            } else if self.eat(">=") {
                let rhs = self.parse_shift()?;
                value = (value >= rhs) as i64;
            } else if self.eat_op("<", b"<=") {
                let rhs = self.parse_shift()?;
                value = (value < rhs) as i64;
            } else if self.eat_op(">", b">=") {
                let rhs = self.parse_shift()?;
                value = (value > rhs) as i64;
            } else {
                break;
            }
        }
        Ok(value)
    }

    fn parse_shift(&mut self) -> Flow<i64> {
        let mut value = self.parse_additive()?;
        loop {
            if self.eat_op("<<", b"=") {
                let rhs = self.parse_additive()?;
                value = self.apply_binary("<<", value, rhs)?;
            } else if self.eat_op(">>", b"=") {
                let rhs = self.parse_additive()?;
                value = self.apply_binary(">>", value, rhs)?;
            } else {
                break;
            }
        }
        Ok(value)
    }

    fn parse_additive(&mut self) -> Flow<i64> {
        let mut value = self.parse_multiplicative()?;
        loop {
            self.skip_ws();
            // `+` / `-` but not `++x` / `--x` / `+=`.
            if self.peek() == Some(b'+') && self.peek_at(1) != Some(b'+') && self.peek_at(1) != Some(b'=') {
                self.bump();
                let rhs = self.parse_multiplicative()?;
                value = value.wrapping_add(rhs);
            } else if self.peek() == Some(b'-')
                && self.peek_at(1) != Some(b'-')
                && self.peek_at(1) != Some(b'=')
            {
                self.bump();
                let rhs = self.parse_multiplicative()?;
                value = value.wrapping_sub(rhs);
            } else {
                break;
            }
        }
        Ok(value)
    }

    fn parse_multiplicative(&mut self) -> Flow<i64> {
        let mut value = self.parse_unary()?;
        loop {
            if self.eat_op("*", b"=") {
                let rhs = self.parse_unary()?;
                value = value.wrapping_mul(rhs);
            } else if self.eat_op("/", b"=") {
                let rhs = self.parse_unary()?;
                value = self.apply_binary("/", value, rhs)?;
            } else if self.eat_op("%", b"=") {
                let rhs = self.parse_unary()?;
                value = self.apply_binary("%", value, rhs)?;
            } else {
                break;
            }
        }
        Ok(value)
    }

    fn parse_unary(&mut self) -> Flow<i64> {
        self.skip_ws();
        if self.eat("++") {
            self.skip_ws();
            let name = self.try_name().ok_or_else(|| self.error("`++' requires a variable"))?;
            let value = self.read_var(&name)?.wrapping_add(1);
            self.write_var(&name, value)?;
            return Ok(value);
        }
        if self.eat("--") {
            self.skip_ws();
            let name = self.try_name().ok_or_else(|| self.error("`--' requires a variable"))?;
            let value = self.read_var(&name)?.wrapping_sub(1);
            self.write_var(&name, value)?;
            return Ok(value);
        }
        match self.peek() {
            Some(b'!') if self.peek_at(1) != Some(b'=') => {
                self.bump();
                let value = self.parse_unary()?;
                Ok((value == 0) as i64)
            }
            Some(b'~') => {
                self.bump();
                Ok(!self.parse_unary()?)
            }
            Some(b'-') => {
                self.bump();
                Ok(self.parse_unary()?.wrapping_neg())
            }
            Some(b'+') => {
                self.bump();
                self.parse_unary()
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Flow<i64> {
        self.skip_ws();
        let mark = self.pos;
        if let Some(name) = self.try_name() {
            self.skip_ws();
            if self.src[self.pos..].starts_with(b"++") {
                self.pos += 2;
                let value = self.read_var(&name)?;
                self.write_var(&name, value.wrapping_add(1))?;
                return Ok(value);
            }
            if self.src[self.pos..].starts_with(b"--") {
                self.pos += 2;
                let value = self.read_var(&name)?;
                self.write_var(&name, value.wrapping_sub(1))?;
                return Ok(value);
            }
            self.pos = mark;
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Flow<i64> {
        self.skip_ws();
        match self.peek() {
            Some(b'(') => {
                self.bump();
                let value = self.parse_comma()?;
                self.skip_ws();
                if self.bump() != Some(b')') {
                    return Err(self.error("expected `)'"));
                }
                Ok(value)
            }
            Some(b'$') => {
                // `$name` / `${name}` reads the variable value.
                self.bump();
                if self.eat("{") {
                    let name = self.try_name().ok_or_else(|| self.error("bad substitution"))?;
                    if !self.eat("}") {
                        return Err(self.error("bad substitution"));
                    }
                    self.read_var(&name)
                } else if let Some(name) = self.try_name() {
                    self.read_var(&name)
                } else if let Some(d) = self.peek().filter(|b| b.is_ascii_digit()) {
                    self.bump();
                    let params = self.st.positional();
                    let index = (d - b'0') as usize;
                    if !self.active || index == 0 || index > params.len() {
                        Ok(0)
                    } else {
                        let text = bytes::lossy_string(&params[index - 1]);
                        Ok(text.trim().parse::<i64>().unwrap_or(0))
                    }
                } else {
                    Err(self.error("syntax error in expression"))
                }
            }
            Some(d) if d.is_ascii_digit() => self.parse_number(),
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => {
                let name = match self.try_name() {
                    Some(n) => n,
                    None => return Err(self.error("syntax error in expression")),
                };
                self.read_var(&name)
            }
            Some(b'.') => Err(self.error("floating point not supported")),
            _ => Err(self.error("operand expected")),
        }
    }

    fn parse_number(&mut self) -> Flow<i64> {
        let start = self.pos;
        while self.peek().map(|b| b.is_ascii_alphanumeric()).unwrap_or(false) {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.src[start..self.pos])
            .map_err(|_| self.error("invalid number"))?
            .to_string();

        if self.peek() == Some(b'.') {
            return Err(self.error("floating point not supported"));
        }

        // `base#digits` with base 2..=64.
        if self.peek() == Some(b'#') {
            self.bump();
            let base: u32 = text
                .parse()
                .ok()
                .filter(|b| (2..=64).contains(b))
                .ok_or_else(|| self.error(format!("invalid arithmetic base: {}", text)))?;
            let digit_start = self.pos;
            while self
                .peek()
                .map(|b| b.is_ascii_alphanumeric() || b == b'@' || b == b'_')
                .unwrap_or(false)
            {
                self.pos += 1;
            }
            let digits = &self.src[digit_start..self.pos];
            if digits.is_empty() {
                return Err(self.error("missing digits after base"));
            }
            let mut value: i64 = 0;
            for &d in digits {
                let dv = digit_value(d, base)
                    .ok_or_else(|| self.error(format!("value too great for base: {}", d as char)))?;
                value = value.wrapping_mul(base as i64).wrapping_add(dv as i64);
            }
            return Ok(value);
        }

        if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            return i64::from_str_radix(hex, 16).map_err(|_| self.error("invalid hex number"));
        }
        if text.len() > 1 && text.starts_with('0') {
            return i64::from_str_radix(&text[1..], 8)
                .map_err(|_| self.error(format!("value too great for base: {}", text)));
        }
        text.parse::<i64>().map_err(|_| self.error(format!("invalid number: {}", text)))
    }

    fn try_name(&mut self) -> Option<String> {
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => {}
            _ => return None,
        }
        while self
            .peek()
            .map(|b| b.is_ascii_alphanumeric() || b == b'_')
            .unwrap_or(false)
        {
            self.pos += 1;
        }
        std::str::from_utf8(&self.src[start..self.pos]).ok().map(|s| s.to_string())
    }

    // ------------------------------------------------------------------
    // Variables and operators
    // ------------------------------------------------------------------

    fn read_var(&mut self, name: &str) -> Flow<i64> {
        if !self.active {
            return Ok(0);
        }
        match name {
            "RANDOM" => return Ok(self.st.next_random() as i64),
            "LINENO" => return Ok(self.st.current_line as i64),
            _ => {}
        }
        match self.st.scopes.get_scalar(name) {
            Some(value) => {
                let text = bytes::lossy_string(value);
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Ok(0);
                }
                if let Ok(n) = trimmed.parse::<i64>() {
                    return Ok(n);
                }
                // Variable values may themselves be expressions.
                eval_arith_depth(self.st, trimmed, self.depth + 1)
            }
            None => {
                if self.st.flags.nounset {
                    Err(Interrupt::nounset(name))
                } else {
                    Ok(0)
                }
            }
        }
    }

    fn write_var(&mut self, name: &str, value: i64) -> Flow<()> {
        if !self.active {
            return Ok(());
        }
        if name == "RANDOM" {
            self.st.reseed_random(value as u64);
            return Ok(());
        }
        self.st
            .scopes
            .set_scalar(name, value.to_string().into_bytes())
            .map_err(|msg| Interrupt::arithmetic(msg, false))
    }

    fn apply_binary(&self, op: &str, lhs: i64, rhs: i64) -> Flow<i64> {
        Ok(match op {
            "+" => lhs.wrapping_add(rhs),
            "-" => lhs.wrapping_sub(rhs),
            "*" => lhs.wrapping_mul(rhs),
            "/" => {
                if rhs == 0 {
                    if !self.active {
                        return Ok(0);
                    }
                    return Err(self.error("division by 0"));
                }
                lhs.wrapping_div(rhs)
            }
            "%" => {
                if rhs == 0 {
                    if !self.active {
                        return Ok(0);
                    }
                    return Err(self.error("division by 0"));
                }
                lhs.wrapping_rem(rhs)
            }
            "&" => lhs & rhs,
            "|" => lhs | rhs,
            "^" => lhs ^ rhs,
            "<<" => lhs.wrapping_shl((rhs & 63) as u32),
            ">>" => lhs.wrapping_shr((rhs & 63) as u32),
            _ => return Err(self.error("unknown operator")),
        })
    }
}

fn digit_value(d: u8, base: u32) -> Option<u32> {
    let value = match d {
        b'0'..=b'9' => (d - b'0') as u32,
        b'a'..=b'z' => (d - b'a') as u32 + 10,
        b'A'..=b'Z' => {
            if base <= 36 {
                (d - b'A') as u32 + 10
            } else {
                (d - b'A') as u32 + 36
            }
        }
        b'@' => 62,
        b'_' => 63,
        _ => return None,
    };
    if value < base {
        Some(value)
    } else {
        None
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn eval(expr: &str) -> i64 {
        let mut st = ShellState::new();
        eval_arith(&mut st, expr).unwrap()
    }

    fn eval_with(st: &mut ShellState, expr: &str) -> i64 {
        eval_arith(st, expr).unwrap()
    }

    #[test]
    fn test_basic_arithmetic() {
        assert_eq!(eval("1 + 2"), 3);
        assert_eq!(eval("10 - 4 * 2"), 2);
        assert_eq!(eval("(10 - 4) * 2"), 12);
        assert_eq!(eval("7 / 2"), 3);
        assert_eq!(eval("7 % 3"), 1);
    }

    #[test]
    fn test_unary() {
        assert_eq!(eval("-5"), -5);
        assert_eq!(eval("!0"), 1);
        assert_eq!(eval("!7"), 0);
        assert_eq!(eval("~0"), -1);
        assert_eq!(eval("- -3"), 3);
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval("3 < 5"), 1);
        assert_eq!(eval("5 <= 5"), 1);
        assert_eq!(eval("5 > 7"), 0);
        assert_eq!(eval("2 == 2"), 1);
        assert_eq!(eval("2 != 2"), 0);
    }

    #[test]
    fn test_logical() {
        assert_eq!(eval("1 && 2"), 1);
        assert_eq!(eval("0 && 2"), 0);
        assert_eq!(eval("0 || 3"), 1);
        assert_eq!(eval("0 || 0"), 0);
    }

    #[test]
    fn test_bitwise() {
        assert_eq!(eval("12 & 10"), 8);
        assert_eq!(eval("12 | 10"), 14);
        assert_eq!(eval("12 ^ 10"), 6);
        assert_eq!(eval("1 << 4"), 16);
        assert_eq!(eval("256 >> 4"), 16);
    }

    #[test]
    fn test_ternary() {
        assert_eq!(eval("1 ? 10 : 20"), 10);
        assert_eq!(eval("0 ? 10 : 20"), 20);
    }

    #[test]
    fn test_ternary_is_lazy() {
        let mut st = ShellState::new();
        // The untaken branch must not assign.
        eval_with(&mut st, "1 ? (x = 5) : (y = 9)");
        assert_eq!(st.scopes.get_scalar("x"), Some(&b"5"[..]));
        assert_eq!(st.scopes.get_scalar("y"), None);
    }

    #[test]
    fn test_short_circuit_no_side_effects() {
        let mut st = ShellState::new();
        eval_with(&mut st, "0 && (x = 1)");
        assert_eq!(st.scopes.get_scalar("x"), None);
        eval_with(&mut st, "1 || (y = 1)");
        assert_eq!(st.scopes.get_scalar("y"), None);
    }

    #[test]
    fn test_short_circuit_skips_division_by_zero() {
        assert_eq!(eval("0 && 1/0"), 0);
        assert_eq!(eval("1 || 1/0"), 1);
    }

    #[test]
    fn test_variables() {
        let mut st = ShellState::new();
        st.scopes.set_scalar("a", b"6".to_vec()).unwrap();
        st.scopes.set_scalar("b", b"7".to_vec()).unwrap();
        assert_eq!(eval_with(&mut st, "a * b"), 42);
        assert_eq!(eval_with(&mut st, "$a + ${b}"), 13);
    }

    #[test]
    fn test_unset_variable_reads_zero() {
        assert_eq!(eval("nosuch + 1"), 1);
    }

    #[test]
    fn test_nounset_raises() {
        let mut st = ShellState::new();
        st.flags.nounset = true;
        assert!(eval_arith(&mut st, "missing + 1").is_err());
    }

    #[test]
    fn test_variable_holding_expression() {
        let mut st = ShellState::new();
        st.scopes.set_scalar("e", b"2 + 3".to_vec()).unwrap();
        assert_eq!(eval_with(&mut st, "e * 2"), 10);
    }

    #[test]
    fn test_assignment() {
        let mut st = ShellState::new();
        assert_eq!(eval_with(&mut st, "x = 5"), 5);
        assert_eq!(st.scopes.get_scalar("x"), Some(&b"5"[..]));
        assert_eq!(eval_with(&mut st, "x += 3"), 8);
        assert_eq!(eval_with(&mut st, "x *= 2"), 16);
        assert_eq!(eval_with(&mut st, "x <<= 1"), 32);
    }

    #[test]
    fn test_increment_decrement() {
        let mut st = ShellState::new();
        st.scopes.set_scalar("i", b"5".to_vec()).unwrap();
        assert_eq!(eval_with(&mut st, "i++"), 5);
        assert_eq!(st.scopes.get_scalar("i"), Some(&b"6"[..]));
        assert_eq!(eval_with(&mut st, "++i"), 7);
        assert_eq!(eval_with(&mut st, "i--"), 7);
        assert_eq!(eval_with(&mut st, "--i"), 5);
    }

    #[test]
    fn test_comma() {
        let mut st = ShellState::new();
        assert_eq!(eval_with(&mut st, "x = 1, y = 2, x + y"), 3);
    }

    #[test]
    fn test_bases() {
        assert_eq!(eval("0x1f"), 31);
        assert_eq!(eval("010"), 8);
        assert_eq!(eval("2#1010"), 10);
        assert_eq!(eval("16#ff"), 255);
        assert_eq!(eval("36#z"), 35);
    }

    #[test]
    fn test_bad_base_digit() {
        let mut st = ShellState::new();
        assert!(eval_arith(&mut st, "2#102").is_err());
        assert!(eval_arith(&mut st, "65#1").is_err());
    }

    #[test]
    fn test_division_by_zero() {
        let mut st = ShellState::new();
        let err = eval_arith(&mut st, "1 / 0").unwrap_err();
        assert!(String::from_utf8_lossy(&err.stderr).contains("division by 0"));
        assert!(eval_arith(&mut st, "1 % 0").is_err());
    }

    #[test]
    fn test_float_rejected() {
        let mut st = ShellState::new();
        assert!(eval_arith(&mut st, "1.5 + 1").is_err());
    }

    #[test]
    fn test_empty_expression() {
        assert_eq!(eval(""), 0);
        assert_eq!(eval("   "), 0);
    }

    #[test]
    fn test_wrapping_overflow() {
        assert_eq!(eval("9223372036854775807 + 1"), i64::MIN);
    }

    #[test]
    fn test_positional_in_expression() {
        let mut st = ShellState::new();
        st.set_positional(vec![b"11".to_vec()]);
        assert_eq!(eval_with(&mut st, "$1 + 1"), 12);
    }

    proptest! {
        #[test]
        fn additive_matches_reference(a in -1000i64..1000, b in -1000i64..1000, c in -1000i64..1000) {
            let expr = format!("{} + {} - {}", a, b, c);
            prop_assert_eq!(eval(&expr), a + b - c);
        }

        #[test]
        fn precedence_matches_reference(a in 0i64..100, b in 0i64..100, c in 1i64..100) {
            let expr = format!("{} + {} * {}", a, b, c);
            prop_assert_eq!(eval(&expr), a + b * c);
        }

        #[test]
        fn comparison_is_boolean(a in any::<i32>(), b in any::<i32>()) {
            let expr = format!("{} < {}", a, b);
            prop_assert_eq!(eval(&expr), ((a as i64) < (b as i64)) as i64);
        }
    }
}
