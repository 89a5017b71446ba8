//! `echo`
//!
//! `-n` suppresses the newline, `-e`/`-E` toggle escape interpretation,
//! and the xpg_echo option makes `-e` the default. Escape decoding
//! produces raw bytes, so `echo -e '\xff'` emits byte 0xFF.

use crate::bytes::Bytes;
use crate::commands::{Command, CommandContext};
use crate::interp::interrupt::ExecResult;

pub struct Echo;

impl Command for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn execute(&self, argv: &[Bytes], ctx: &mut CommandContext<'_, '_>) -> ExecResult {
        let mut interpret = ctx.xpg_echo();
        let mut newline = true;
        let mut start = 1;

        for arg in argv.iter().skip(1) {
            // Flag parsing stops at the first non-flag word.
            let Ok(text) = std::str::from_utf8(arg) else { break };
            if text.len() < 2 || !text.starts_with('-') {
                break;
            }
            if !text.chars().skip(1).all(|c| matches!(c, 'n' | 'e' | 'E')) {
                break;
            }
            for c in text.chars().skip(1) {
                match c {
                    'n' => newline = false,
                    'e' => interpret = true,
                    'E' => interpret = false,
                    _ => {}
                }
            }
            start += 1;
        }

        let mut out = Bytes::new();
        let mut suppress_newline = false;
        for (i, arg) in argv[start..].iter().enumerate() {
            if i > 0 {
                out.push(b' ');
            }
            if interpret {
                let (decoded, stop) = decode_escapes(arg);
                out.extend_from_slice(&decoded);
                if stop {
                    suppress_newline = true;
                    break;
                }
            } else {
                out.extend_from_slice(arg);
            }
        }
        if newline && !suppress_newline {
            out.push(b'\n');
        }
        ExecResult::new(out, Bytes::new(), 0)
    }
}

/// Decode `echo -e` escapes; the bool reports a `\c` terminator.
fn decode_escapes(arg: &[u8]) -> (Bytes, bool) {
    let mut out = Bytes::new();
    let mut i = 0;
    while i < arg.len() {
        if arg[i] != b'\\' || i + 1 >= arg.len() {
            out.push(arg[i]);
            i += 1;
            continue;
        }
        i += 1;
        match arg[i] {
            b'n' => out.push(b'\n'),
            b't' => out.push(b'\t'),
            b'r' => out.push(b'\r'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'e' | b'E' => out.push(0x1b),
            b'f' => out.push(0x0c),
            b'v' => out.push(0x0b),
            b'\\' => out.push(b'\\'),
            b'c' => return (out, true),
            b'0' => {
                let mut value: u32 = 0;
                let mut digits = 0;
                while digits < 3 && i + 1 < arg.len() && (b'0'..=b'7').contains(&arg[i + 1]) {
                    value = value * 8 + (arg[i + 1] - b'0') as u32;
                    i += 1;
                    digits += 1;
                }
                out.push((value & 0xff) as u8);
            }
            b'x' => {
                let mut value: u32 = 0;
                let mut digits = 0;
                while digits < 2 && i + 1 < arg.len() && (arg[i + 1] as char).is_ascii_hexdigit() {
                    value = value * 16 + (arg[i + 1] as char).to_digit(16).unwrap_or(0);
                    i += 1;
                    digits += 1;
                }
                if digits == 0 {
                    out.extend_from_slice(b"\\x");
                } else {
                    out.push(value as u8);
                }
            }
            other => {
                out.push(b'\\');
                out.push(other);
            }
        }
        i += 1;
    }
    (out, false)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_escapes() {
        assert_eq!(decode_escapes(b"a\\nb").0, b"a\nb");
        assert_eq!(decode_escapes(b"\\t").0, b"\t");
        assert_eq!(decode_escapes(b"\\x41").0, b"A");
        assert_eq!(decode_escapes(b"\\xff").0, vec![0xff]);
        assert_eq!(decode_escapes(b"\\0101").0, b"A");
        assert_eq!(decode_escapes(b"plain").0, b"plain");
        assert_eq!(decode_escapes(b"\\q").0, b"\\q");
    }

    #[test]
    fn test_decode_stop() {
        let (out, stop) = decode_escapes(b"ab\\cde");
        assert_eq!(out, b"ab");
        assert!(stop);
    }
}
