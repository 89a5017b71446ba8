//! Text Utilities
//!
//! The small bundled set: `cat`, `head`, `tail`, `wc`, `tr`, `seq`,
//! `sort`, `uniq`. Each consumes named files from the virtual
//! filesystem or its stdin bytes, `-` meaning stdin explicitly.

use crate::bytes::{self, Bytes};
use crate::commands::{split_flags, Command, CommandContext};
use crate::interp::interrupt::ExecResult;

/// Gather input from file operands, or stdin when none are given.
fn gather_input(
    ctx: &CommandContext<'_, '_>,
    files: &[Bytes],
    name: &str,
) -> Result<Bytes, ExecResult> {
    if files.is_empty() {
        return Ok(ctx.stdin.to_vec());
    }
    let mut data = Bytes::new();
    for file in files {
        let text = bytes::lossy_string(file);
        if text == "-" {
            data.extend_from_slice(ctx.stdin);
            continue;
        }
        let path = ctx.resolve_path(&text);
        match ctx.fs().read_file_buffer(&path) {
            Ok(content) => data.extend_from_slice(&content),
            Err(e) => {
                return Err(ExecResult::failure(
                    format!("{}: {}: {}", name, text, e.shell_message()),
                    1,
                ));
            }
        }
    }
    Ok(data)
}

fn split_lines(data: &[u8]) -> Vec<Bytes> {
    if data.is_empty() {
        return Vec::new();
    }
    let mut lines: Vec<Bytes> = data.split(|&b| b == b'\n').map(|l| l.to_vec()).collect();
    if data.last() == Some(&b'\n') {
        lines.pop();
    }
    lines
}

// ----------------------------------------------------------------------------
// cat
// ----------------------------------------------------------------------------

pub struct Cat;

impl Command for Cat {
    fn name(&self) -> &str {
        "cat"
    }

    fn execute(&self, argv: &[Bytes], ctx: &mut CommandContext<'_, '_>) -> ExecResult {
        let (flags, files) = split_flags(argv);
        let data = match gather_input(ctx, &files, "cat") {
            Ok(data) => data,
            Err(failure) => return failure,
        };
        if flags.contains(&'n') {
            let mut out = Bytes::new();
            for (i, line) in split_lines(&data).iter().enumerate() {
                out.extend_from_slice(format!("{:6}\t", i + 1).as_bytes());
                out.extend_from_slice(line);
                out.push(b'\n');
            }
            return ExecResult::new(out, Bytes::new(), 0);
        }
        ExecResult::new(data, Bytes::new(), 0)
    }
}

// ----------------------------------------------------------------------------
// head / tail
// ----------------------------------------------------------------------------

fn parse_count(argv: &[Bytes]) -> (usize, Vec<Bytes>) {
    let mut count = 10usize;
    let mut files = Vec::new();
    let mut i = 1;
    while i < argv.len() {
        let text = bytes::lossy_string(&argv[i]);
        if text == "-n" {
            if let Some(value) = argv.get(i + 1) {
                count = bytes::lossy_string(value).trim().parse().unwrap_or(10);
                i += 2;
                continue;
            }
        } else if let Some(digits) = text.strip_prefix('-') {
            if digits.chars().all(|c| c.is_ascii_digit()) && !digits.is_empty() {
                count = digits.parse().unwrap_or(10);
                i += 1;
                continue;
            }
        }
        files.push(argv[i].clone());
        i += 1;
    }
    (count, files)
}

pub struct Head;

impl Command for Head {
    fn name(&self) -> &str {
        "head"
    }

    fn execute(&self, argv: &[Bytes], ctx: &mut CommandContext<'_, '_>) -> ExecResult {
        let (count, files) = parse_count(argv);
        let data = match gather_input(ctx, &files, "head") {
            Ok(data) => data,
            Err(failure) => return failure,
        };
        let mut out = Bytes::new();
        for line in split_lines(&data).iter().take(count) {
            out.extend_from_slice(line);
            out.push(b'\n');
        }
        ExecResult::new(out, Bytes::new(), 0)
    }
}

pub struct Tail;

impl Command for Tail {
    fn name(&self) -> &str {
        "tail"
    }

    fn execute(&self, argv: &[Bytes], ctx: &mut CommandContext<'_, '_>) -> ExecResult {
        let (count, files) = parse_count(argv);
        let data = match gather_input(ctx, &files, "tail") {
            Ok(data) => data,
            Err(failure) => return failure,
        };
        let lines = split_lines(&data);
        let start = lines.len().saturating_sub(count);
        let mut out = Bytes::new();
        for line in &lines[start..] {
            out.extend_from_slice(line);
            out.push(b'\n');
        }
        ExecResult::new(out, Bytes::new(), 0)
    }
}

// ----------------------------------------------------------------------------
// wc
// ----------------------------------------------------------------------------

pub struct Wc;

impl Command for Wc {
    fn name(&self) -> &str {
        "wc"
    }

    fn execute(&self, argv: &[Bytes], ctx: &mut CommandContext<'_, '_>) -> ExecResult {
        let (flags, files) = split_flags(argv);
        let data = match gather_input(ctx, &files, "wc") {
            Ok(data) => data,
            Err(failure) => return failure,
        };
        let lines = data.iter().filter(|&&b| b == b'\n').count();
        let words = data
            .split(|b| b.is_ascii_whitespace())
            .filter(|w| !w.is_empty())
            .count();
        let chars = data.len();

        let mut counts: Vec<usize> = Vec::new();
        if flags.contains(&'l') {
            counts.push(lines);
        }
        if flags.contains(&'w') {
            counts.push(words);
        }
        if flags.contains(&'c') || flags.contains(&'m') {
            counts.push(chars);
        }
        if counts.is_empty() {
            counts = vec![lines, words, chars];
        }
        let rendered: Vec<String> = counts.iter().map(|c| c.to_string()).collect();
        let mut line = rendered.join(" ");
        if files.len() == 1 && files[0].as_slice() != b"-" {
            line.push(' ');
            line.push_str(&bytes::lossy_string(&files[0]));
        }
        line.push('\n');
        ExecResult::stdout_text(line)
    }
}

// ----------------------------------------------------------------------------
// tr
// ----------------------------------------------------------------------------

/// Expand a tr set: escapes and `a-z` ranges.
fn tr_set(spec: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < spec.len() {
        let b = spec[i];
        if b == b'\\' && i + 1 < spec.len() {
            out.push(match spec[i + 1] {
                b'n' => b'\n',
                b't' => b'\t',
                b'r' => b'\r',
                b'\\' => b'\\',
                b'0' => 0,
                other => other,
            });
            i += 2;
            continue;
        }
        if i + 2 < spec.len() && spec[i + 1] == b'-' && spec[i + 2] >= b {
            for c in b..=spec[i + 2] {
                out.push(c);
            }
            i += 3;
            continue;
        }
        out.push(b);
        i += 1;
    }
    out
}

pub struct Tr;

impl Command for Tr {
    fn name(&self) -> &str {
        "tr"
    }

    fn execute(&self, argv: &[Bytes], ctx: &mut CommandContext<'_, '_>) -> ExecResult {
        let (flags, sets) = split_flags(argv);
        let delete = flags.contains(&'d');
        let squeeze = flags.contains(&'s');

        let set1 = match sets.first() {
            Some(s) => tr_set(s),
            None => return ExecResult::failure("tr: missing operand", 1),
        };
        let set2 = sets.get(1).map(|s| tr_set(s)).unwrap_or_default();

        if !delete && set2.is_empty() && !squeeze {
            return ExecResult::failure("tr: missing operand after set", 1);
        }

        let mut out = Bytes::new();
        let mut last: Option<u8> = None;
        for &b in ctx.stdin {
            if delete {
                if set1.contains(&b) {
                    continue;
                }
                out.push(b);
                continue;
            }
            let mapped = match set1.iter().position(|&c| c == b) {
                Some(pos) => *set2.get(pos).or_else(|| set2.last()).unwrap_or(&b),
                None => b,
            };
            if squeeze && Some(mapped) == last && set1.contains(&b) {
                continue;
            }
            last = Some(mapped);
            out.push(mapped);
        }
        ExecResult::new(out, Bytes::new(), 0)
    }
}

// ----------------------------------------------------------------------------
// seq
// ----------------------------------------------------------------------------

pub struct Seq;

impl Command for Seq {
    fn name(&self) -> &str {
        "seq"
    }

    fn execute(&self, argv: &[Bytes], _ctx: &mut CommandContext<'_, '_>) -> ExecResult {
        let numbers: Vec<i64> = argv[1..]
            .iter()
            .filter_map(|a| bytes::parse_i64(a))
            .collect();
        let (first, step, last) = match numbers.as_slice() {
            [last] => (1, 1, *last),
            [first, last] => (*first, if first <= last { 1 } else { -1 }, *last),
            [first, step, last] => (*first, *step, *last),
            _ => return ExecResult::failure("seq: missing operand", 1),
        };
        if step == 0 {
            return ExecResult::failure("seq: invalid zero increment", 1);
        }
        let mut out = String::new();
        let mut value = first;
        let mut emitted = 0u64;
        while (step > 0 && value <= last) || (step < 0 && value >= last) {
            out.push_str(&value.to_string());
            out.push('\n');
            value += step;
            emitted += 1;
            if emitted > 10_000_000 {
                break;
            }
        }
        ExecResult::stdout_text(out)
    }
}

// ----------------------------------------------------------------------------
// sort / uniq
// ----------------------------------------------------------------------------

pub struct Sort;

impl Command for Sort {
    fn name(&self) -> &str {
        "sort"
    }

    fn execute(&self, argv: &[Bytes], ctx: &mut CommandContext<'_, '_>) -> ExecResult {
        let (flags, files) = split_flags(argv);
        let data = match gather_input(ctx, &files, "sort") {
            Ok(data) => data,
            Err(failure) => return failure,
        };
        let mut lines = split_lines(&data);
        if flags.contains(&'n') {
            lines.sort_by_key(|l| bytes::parse_i64(leading_number(l)).unwrap_or(0));
        } else {
            lines.sort();
        }
        if flags.contains(&'r') {
            lines.reverse();
        }
        if flags.contains(&'u') {
            lines.dedup();
        }
        let mut out = Bytes::new();
        for line in lines {
            out.extend_from_slice(&line);
            out.push(b'\n');
        }
        ExecResult::new(out, Bytes::new(), 0)
    }
}

fn leading_number(line: &[u8]) -> &[u8] {
    let start = line.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(line.len());
    let rest = &line[start..];
    let end = rest
        .iter()
        .position(|&b| !(b.is_ascii_digit() || b == b'-' || b == b'+'))
        .unwrap_or(rest.len());
    &rest[..end]
}

pub struct Uniq;

impl Command for Uniq {
    fn name(&self) -> &str {
        "uniq"
    }

    fn execute(&self, argv: &[Bytes], ctx: &mut CommandContext<'_, '_>) -> ExecResult {
        let (flags, files) = split_flags(argv);
        let count_mode = flags.contains(&'c');
        let dups_only = flags.contains(&'d');
        let data = match gather_input(ctx, &files, "uniq") {
            Ok(data) => data,
            Err(failure) => return failure,
        };
        let mut out = Bytes::new();
        let mut previous: Option<Bytes> = None;
        let mut count = 0usize;
        let mut flush = |line: &Option<Bytes>, count: usize, out: &mut Bytes| {
            if let Some(line) = line {
                if dups_only && count < 2 {
                    return;
                }
                if count_mode {
                    out.extend_from_slice(format!("{:7} ", count).as_bytes());
                }
                out.extend_from_slice(line);
                out.push(b'\n');
            }
        };
        for line in split_lines(&data) {
            if previous.as_ref() == Some(&line) {
                count += 1;
            } else {
                flush(&previous, count, &mut out);
                previous = Some(line);
                count = 1;
            }
        }
        flush(&previous, count, &mut out);
        ExecResult::new(out, Bytes::new(), 0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_lines() {
        assert_eq!(split_lines(b"a\nb\n"), vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(split_lines(b"a\nb"), vec![b"a".to_vec(), b"b".to_vec()]);
        assert!(split_lines(b"").is_empty());
    }

    #[test]
    fn test_tr_set() {
        assert_eq!(tr_set(b"abc"), b"abc");
        assert_eq!(tr_set(b"a-e"), b"abcde");
        assert_eq!(tr_set(b"\\n"), b"\n");
        assert_eq!(tr_set(b"a\\tb"), b"a\tb");
    }

    #[test]
    fn test_parse_count() {
        let argv: Vec<Bytes> = vec![b"head".to_vec(), b"-n".to_vec(), b"3".to_vec(), b"f".to_vec()];
        let (count, files) = parse_count(&argv);
        assert_eq!(count, 3);
        assert_eq!(files, vec![b"f".to_vec()]);

        let argv: Vec<Bytes> = vec![b"head".to_vec(), b"-5".to_vec()];
        let (count, files) = parse_count(&argv);
        assert_eq!(count, 5);
        assert!(files.is_empty());
    }

    #[test]
    fn test_leading_number() {
        assert_eq!(leading_number(b"42 rest"), b"42");
        assert_eq!(leading_number(b"  -7x"), b"-7");
        assert_eq!(leading_number(b"abc"), b"");
    }
}
