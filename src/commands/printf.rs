//! `printf`
//!
//! Format directives: `%s %d %i %u %x %X %o %c %b %q %%` with width,
//! `-` left-justify and `0` zero-pad flags, and precision for strings.
//! The format cycles while arguments remain, as POSIX requires; `%q`
//! quotes so the output re-reads as a single shell word.

use crate::bytes::{self, Bytes};
use crate::commands::{Command, CommandContext};
use crate::interp::interrupt::ExecResult;

pub struct Printf;

impl Command for Printf {
    fn name(&self) -> &str {
        "printf"
    }

    fn execute(&self, argv: &[Bytes], _ctx: &mut CommandContext<'_, '_>) -> ExecResult {
        let mut args = argv.iter().skip(1);
        let format = match args.next() {
            Some(f) => f.clone(),
            None => {
                return ExecResult::failure("printf: usage: printf format [arguments]", 2);
            }
        };
        let rest: Vec<&Bytes> = args.collect();

        let mut out = Bytes::new();
        let mut index = 0;
        loop {
            let consumed = render(&format, &rest, &mut index, &mut out);
            // Re-run the format only while arguments remain.
            if !consumed || index >= rest.len() {
                break;
            }
        }
        ExecResult::new(out, Bytes::new(), 0)
    }
}

/// One pass over the format. Returns whether any directive consumed an
/// argument (guards the cycling rule against infinite loops).
fn render(format: &[u8], args: &[&Bytes], index: &mut usize, out: &mut Bytes) -> bool {
    let mut consumed = false;
    let mut i = 0;
    while i < format.len() {
        let b = format[i];
        if b == b'\\' && i + 1 < format.len() {
            let (decoded, len) = escape(&format[i + 1..]);
            out.extend_from_slice(&decoded);
            i += 1 + len;
            continue;
        }
        if b != b'%' {
            out.push(b);
            i += 1;
            continue;
        }
        i += 1;
        if format.get(i) == Some(&b'%') {
            out.push(b'%');
            i += 1;
            continue;
        }
        // Flags, width, precision.
        let mut left = false;
        let mut zero = false;
        while let Some(&f) = format.get(i) {
            match f {
                b'-' => left = true,
                b'0' => zero = true,
                b'+' | b' ' | b'#' => {}
                _ => break,
            }
            i += 1;
        }
        let mut width = 0usize;
        while let Some(&d) = format.get(i) {
            if d.is_ascii_digit() {
                width = width * 10 + (d - b'0') as usize;
                i += 1;
            } else {
                break;
            }
        }
        let mut precision: Option<usize> = None;
        if format.get(i) == Some(&b'.') {
            i += 1;
            let mut p = 0usize;
            while let Some(&d) = format.get(i) {
                if d.is_ascii_digit() {
                    p = p * 10 + (d - b'0') as usize;
                    i += 1;
                } else {
                    break;
                }
            }
            precision = Some(p);
        }

        let directive = match format.get(i) {
            Some(&d) => d,
            None => {
                out.push(b'%');
                break;
            }
        };
        i += 1;

        let arg: &[u8] = match args.get(*index) {
            Some(a) => {
                *index += 1;
                consumed = true;
                a
            }
            None => b"",
        };

        let rendered: Bytes = match directive {
            b's' => {
                let mut s = arg.to_vec();
                if let Some(p) = precision {
                    s.truncate(p);
                }
                s
            }
            b'b' => {
                // Like echo -e on the argument.
                let mut decoded = Bytes::new();
                let mut j = 0;
                while j < arg.len() {
                    if arg[j] == b'\\' && j + 1 < arg.len() {
                        let (d, len) = escape(&arg[j + 1..]);
                        decoded.extend_from_slice(&d);
                        j += 1 + len;
                    } else {
                        decoded.push(arg[j]);
                        j += 1;
                    }
                }
                decoded
            }
            b'q' => bytes::shell_quote(arg),
            b'c' => arg.first().map(|&b| vec![b]).unwrap_or_default(),
            b'd' | b'i' => int_value(arg).to_string().into_bytes(),
            b'u' => (int_value(arg).max(0) as u64).to_string().into_bytes(),
            b'x' => format!("{:x}", int_value(arg)).into_bytes(),
            b'X' => format!("{:X}", int_value(arg)).into_bytes(),
            b'o' => format!("{:o}", int_value(arg)).into_bytes(),
            other => {
                out.push(b'%');
                out.push(other);
                continue;
            }
        };

        pad(out, &rendered, width, left, zero && !left);
    }
    consumed
}

fn int_value(arg: &[u8]) -> i64 {
    let text = bytes::lossy_string(arg);
    let trimmed = text.trim();
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).unwrap_or(0);
    }
    // A leading quote yields the character code, as POSIX specifies.
    if let Some(stripped) = trimmed.strip_prefix('\'').or_else(|| trimmed.strip_prefix('"')) {
        return stripped.chars().next().map(|c| c as i64).unwrap_or(0);
    }
    trimmed.parse::<i64>().unwrap_or(0)
}

fn pad(out: &mut Bytes, value: &[u8], width: usize, left: bool, zero: bool) {
    if value.len() >= width {
        out.extend_from_slice(value);
        return;
    }
    let fill = width - value.len();
    if left {
        out.extend_from_slice(value);
        out.extend(std::iter::repeat(b' ').take(fill));
    } else if zero {
        // Keep a leading sign ahead of the zeros.
        if value.first() == Some(&b'-') {
            out.push(b'-');
            out.extend(std::iter::repeat(b'0').take(fill));
            out.extend_from_slice(&value[1..]);
        } else {
            out.extend(std::iter::repeat(b'0').take(fill));
            out.extend_from_slice(value);
        }
    } else {
        out.extend(std::iter::repeat(b' ').take(fill));
        out.extend_from_slice(value);
    }
}

/// Decode one backslash escape; returns the bytes and how many source
/// bytes (after the backslash) were used.
fn escape(rest: &[u8]) -> (Bytes, usize) {
    match rest.first() {
        Some(b'n') => (vec![b'\n'], 1),
        Some(b't') => (vec![b'\t'], 1),
        Some(b'r') => (vec![b'\r'], 1),
        Some(b'a') => (vec![0x07], 1),
        Some(b'b') => (vec![0x08], 1),
        Some(b'f') => (vec![0x0c], 1),
        Some(b'v') => (vec![0x0b], 1),
        Some(b'e') => (vec![0x1b], 1),
        Some(b'\\') => (vec![b'\\'], 1),
        Some(b'"') => (vec![b'"'], 1),
        Some(b'x') => {
            let mut value: u32 = 0;
            let mut used = 1;
            while used <= 2 {
                match rest.get(used).and_then(|&b| (b as char).to_digit(16)) {
                    Some(d) => {
                        value = value * 16 + d;
                        used += 1;
                    }
                    None => break,
                }
            }
            if used == 1 {
                (b"\\x".to_vec(), 1)
            } else {
                (vec![value as u8], used)
            }
        }
        Some(&d) if (b'0'..=b'7').contains(&d) => {
            let mut value: u32 = 0;
            let mut used = 0;
            while used < 3 {
                match rest.get(used) {
                    Some(&b) if (b'0'..=b'7').contains(&b) => {
                        value = value * 8 + (b - b'0') as u32;
                        used += 1;
                    }
                    _ => break,
                }
            }
            (vec![(value & 0xff) as u8], used)
        }
        Some(&other) => (vec![b'\\', other], 1),
        None => (vec![b'\\'], 0),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn run(format: &str, args: &[&str]) -> String {
        let mut out = Bytes::new();
        let owned: Vec<Bytes> = args.iter().map(|a| a.as_bytes().to_vec()).collect();
        let refs: Vec<&Bytes> = owned.iter().collect();
        let mut index = 0;
        loop {
            let consumed = render(format.as_bytes(), &refs, &mut index, &mut out);
            if !consumed || index >= refs.len() {
                break;
            }
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    #[test]
    fn test_plain_string() {
        assert_eq!(run("hello\\n", &[]), "hello\n");
    }

    #[test]
    fn test_string_directive() {
        assert_eq!(run("%s-%s\\n", &["a", "b"]), "a-b\n");
    }

    #[test]
    fn test_numeric_directives() {
        assert_eq!(run("%d", &["42"]), "42");
        assert_eq!(run("%d", &["-7"]), "-7");
        assert_eq!(run("%x", &["255"]), "ff");
        assert_eq!(run("%o", &["8"]), "10");
        assert_eq!(run("%d", &["junk"]), "0");
    }

    #[test]
    fn test_width_and_flags() {
        assert_eq!(run("%5d", &["42"]), "   42");
        assert_eq!(run("%-5d|", &["42"]), "42   |");
        assert_eq!(run("%05d", &["42"]), "00042");
        assert_eq!(run("%05d", &["-42"]), "-0042");
    }

    #[test]
    fn test_precision() {
        assert_eq!(run("%.3s", &["abcdef"]), "abc");
    }

    #[test]
    fn test_format_cycles() {
        assert_eq!(run("%s\\n", &["a", "b", "c"]), "a\nb\nc\n");
    }

    #[test]
    fn test_missing_args_are_empty() {
        assert_eq!(run("[%s][%d]", &["only"]), "[only][0]");
    }

    #[test]
    fn test_percent_literal() {
        assert_eq!(run("100%%", &[]), "100%");
    }

    #[test]
    fn test_q_quoting() {
        assert_eq!(run("%q", &["plain"]), "plain");
        assert_eq!(run("%q", &["a b"]), "'a b'");
    }

    #[test]
    fn test_char_code() {
        assert_eq!(run("%d", &["'A"]), "65");
    }

    #[test]
    fn test_b_directive() {
        assert_eq!(run("%b", &["x\\ny"]), "x\ny");
    }
}
