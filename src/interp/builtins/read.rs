//! `read`
//!
//! Consumes from the command's stdin stream up to a delimiter, applies
//! backslash processing unless `-r`, splits on IFS, and assigns; the
//! last variable takes the remainder. `-p` and `-t` are accepted and
//! inert (no terminal, no clocks in the sandbox).

use crate::bytes::{self, Bytes};
use crate::interp::builtins::BuiltinOutcome;
use crate::interp::engine::InputStream;
use crate::interp::interrupt::ExecResult;
use crate::interp::state::ShellState;

pub fn read(st: &mut ShellState, args: &[Bytes], input: &InputStream) -> BuiltinOutcome {
    let mut raw = false;
    let mut delim = b'\n';
    let mut array_name: Option<String> = None;
    let mut names: Vec<String> = Vec::new();

    let mut i = 0;
    while i < args.len() {
        let text = bytes::lossy_string(&args[i]);
        match text.as_str() {
            "-r" => raw = true,
            "-d" => {
                i += 1;
                delim = args.get(i).and_then(|a| a.first().copied()).unwrap_or(0);
            }
            "-p" | "-t" | "-n" | "-N" | "-u" => {
                // Option argument consumed and ignored in the sandbox.
                i += 1;
            }
            "-a" => {
                i += 1;
                array_name = args.get(i).map(|a| bytes::lossy_string(a));
            }
            "-s" | "-e" | "--" => {}
            _ => names.push(text),
        }
        i += 1;
    }
    if names.is_empty() && array_name.is_none() {
        names.push("REPLY".to_string());
    }
    for name in &names {
        if !bytes::is_valid_name(name) {
            return Ok(ExecResult::failure(
                format!("read: `{}': not a valid identifier", name),
                1,
            ));
        }
    }

    let (mut data, mut found_delim) = match input.read_until(delim) {
        Some(chunk) => chunk,
        None => {
            // EOF before any data: variables are cleared, status 1.
            for name in &names {
                let _ = st.scopes.set_scalar(name, Bytes::new());
            }
            return Ok(ExecResult::code(1));
        }
    };

    if !raw {
        // Backslash-newline joins lines; other backslashes quote the
        // following byte.
        while ends_with_odd_backslash(&data) && delim == b'\n' {
            data.pop();
            match input.read_until(delim) {
                Some((next, next_found)) => {
                    data.extend_from_slice(&next);
                    found_delim = next_found;
                }
                None => break,
            }
        }
        data = strip_backslashes(&data);
    }

    let ifs = st.ifs();
    if let Some(array) = array_name {
        let fields = split_all(&data, &ifs);
        if let Err(msg) = st.scopes.set_array(&array, fields) {
            return Ok(ExecResult::failure(format!("read: {}", msg), 1));
        }
        return Ok(ExecResult::code(if found_delim { 0 } else { 1 }));
    }

    let fields = split_limited(&data, &ifs, names.len());
    for (index, name) in names.iter().enumerate() {
        let value = fields.get(index).cloned().unwrap_or_default();
        if let Err(msg) = st.scopes.set_scalar(name, value) {
            return Ok(ExecResult::failure(format!("read: {}", msg), 1));
        }
    }
    Ok(ExecResult::code(if found_delim { 0 } else { 1 }))
}

fn ends_with_odd_backslash(data: &[u8]) -> bool {
    let trailing = data.iter().rev().take_while(|&&b| b == b'\\').count();
    trailing % 2 == 1
}

fn strip_backslashes(data: &[u8]) -> Bytes {
    let mut out = Bytes::new();
    let mut i = 0;
    while i < data.len() {
        if data[i] == b'\\' && i + 1 < data.len() {
            out.push(data[i + 1]);
            i += 2;
        } else if data[i] == b'\\' {
            i += 1;
        } else {
            out.push(data[i]);
            i += 1;
        }
    }
    out
}

fn is_ifs_ws(b: u8, ifs: &[u8]) -> bool {
    ifs.contains(&b) && b" \t\n".contains(&b)
}

fn is_ifs(b: u8, ifs: &[u8]) -> bool {
    ifs.contains(&b)
}

/// Split into at most `limit` fields; the last takes the remainder with
/// surrounding IFS whitespace trimmed.
fn split_limited(data: &[u8], ifs: &[u8], limit: usize) -> Vec<Bytes> {
    if limit <= 1 {
        return vec![trim_ifs_ws(data, ifs).to_vec()];
    }
    let mut fields = Vec::new();
    let mut rest = trim_ifs_ws(data, ifs);
    while fields.len() < limit - 1 {
        match rest.iter().position(|&b| is_ifs(b, ifs)) {
            Some(pos) => {
                fields.push(rest[..pos].to_vec());
                let mut next = &rest[pos..];
                // One non-whitespace separator, plus surrounding blanks.
                let mut skipped_nonws = false;
                while let Some(&b) = next.first() {
                    if is_ifs_ws(b, ifs) {
                        next = &next[1..];
                    } else if is_ifs(b, ifs) && !skipped_nonws {
                        skipped_nonws = true;
                        next = &next[1..];
                    } else {
                        break;
                    }
                }
                rest = next;
            }
            None => break,
        }
    }
    fields.push(trim_ifs_ws(rest, ifs).to_vec());
    fields
}

fn split_all(data: &[u8], ifs: &[u8]) -> Vec<Bytes> {
    let trimmed = trim_ifs_ws(data, ifs);
    if trimmed.is_empty() {
        return Vec::new();
    }
    let mut fields = Vec::new();
    let mut current = Bytes::new();
    let mut started = false;
    for &b in trimmed {
        if is_ifs_ws(b, ifs) {
            if started {
                fields.push(std::mem::take(&mut current));
                started = false;
            }
        } else if is_ifs(b, ifs) {
            fields.push(std::mem::take(&mut current));
            started = false;
        } else {
            current.push(b);
            started = true;
        }
    }
    if started {
        fields.push(current);
    }
    fields
}

fn trim_ifs_ws<'a>(data: &'a [u8], ifs: &[u8]) -> &'a [u8] {
    let start = data.iter().position(|&b| !is_ifs_ws(b, ifs)).unwrap_or(data.len());
    let end = data.iter().rposition(|&b| !is_ifs_ws(b, ifs)).map(|p| p + 1).unwrap_or(start);
    &data[start..end]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_limited() {
        assert_eq!(
            split_limited(b"a b c d", b" \t\n", 2),
            vec![b"a".to_vec(), b"b c d".to_vec()]
        );
        assert_eq!(
            split_limited(b"  x  ", b" \t\n", 1),
            vec![b"x".to_vec()]
        );
        assert_eq!(
            split_limited(b"a,b,c", b",", 2),
            vec![b"a".to_vec(), b"b,c".to_vec()]
        );
    }

    #[test]
    fn test_split_all() {
        assert_eq!(
            split_all(b" a  b ", b" \t\n"),
            vec![b"a".to_vec(), b"b".to_vec()]
        );
        assert!(split_all(b"  ", b" \t\n").is_empty());
    }

    #[test]
    fn test_strip_backslashes() {
        assert_eq!(strip_backslashes(b"a\\ b"), b"a b");
        assert_eq!(strip_backslashes(b"a\\\\b"), b"a\\b");
    }

    #[test]
    fn test_read_assigns_fields() {
        let mut st = ShellState::new();
        let input = InputStream::new(b"one two three\n".to_vec());
        let result = read(&mut st, &[b"a".to_vec(), b"b".to_vec()], &input).unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(st.scopes.get_scalar("a"), Some(&b"one"[..]));
        assert_eq!(st.scopes.get_scalar("b"), Some(&b"two three"[..]));
    }

    #[test]
    fn test_read_reply_default() {
        let mut st = ShellState::new();
        let input = InputStream::new(b"hello world\n".to_vec());
        read(&mut st, &[], &input).unwrap();
        assert_eq!(st.scopes.get_scalar("REPLY"), Some(&b"hello world"[..]));
    }

    #[test]
    fn test_read_eof_returns_one() {
        let mut st = ShellState::new();
        let input = InputStream::new(Bytes::new());
        let result = read(&mut st, &[b"x".to_vec()], &input).unwrap();
        assert_eq!(result.exit_code, 1);
    }

    #[test]
    fn test_read_consumes_progressively() {
        let mut st = ShellState::new();
        let input = InputStream::new(b"first\nsecond\n".to_vec());
        read(&mut st, &[b"a".to_vec()], &input).unwrap();
        read(&mut st, &[b"b".to_vec()], &input).unwrap();
        assert_eq!(st.scopes.get_scalar("a"), Some(&b"first"[..]));
        assert_eq!(st.scopes.get_scalar("b"), Some(&b"second"[..]));
    }

    #[test]
    fn test_read_custom_delim() {
        let mut st = ShellState::new();
        let input = InputStream::new(b"a:b\nc:rest".to_vec());
        read(&mut st, &[b"-d".to_vec(), b":".to_vec(), b"x".to_vec()], &input).unwrap();
        assert_eq!(st.scopes.get_scalar("x"), Some(&b"a"[..]));
    }

    #[test]
    fn test_read_no_trailing_delim_returns_one_but_assigns() {
        let mut st = ShellState::new();
        let input = InputStream::new(b"partial".to_vec());
        let result = read(&mut st, &[b"x".to_vec()], &input).unwrap();
        assert_eq!(result.exit_code, 1);
        assert_eq!(st.scopes.get_scalar("x"), Some(&b"partial"[..]));
    }

    #[test]
    fn test_read_array() {
        let mut st = ShellState::new();
        let input = InputStream::new(b"x y z\n".to_vec());
        read(&mut st, &[b"-a".to_vec(), b"arr".to_vec()], &input).unwrap();
        assert_eq!(st.scopes.get("arr").unwrap().value.len_elements(), 3);
    }
}
