//! Brace Expansion
//!
//! Purely lexical, running before any variable lookup: `a{b,c}d`,
//! numeric ranges `{1..5..2}` with zero-padding, alpha ranges `{a..e}`.
//! Operates on unquoted literal parts only; quoted or expanded parts
//! pass through untouched.

use crate::interp::interrupt::{Flow, Interrupt};
use crate::parser::ast::{Word, WordPart};

const MAX_RANGE_ITEMS: i64 = 10_000;

/// Expand one word into its brace alternatives (a single-element vector
/// when there is nothing to expand).
pub fn expand_braces(word: &Word) -> Flow<Vec<Word>> {
    for (index, part) in word.parts.iter().enumerate() {
        let text = match part {
            WordPart::Literal(text) => text,
            _ => continue,
        };
        if let Some((start, end, items)) = find_brace(text)? {
            let mut results = Vec::new();
            for item in items {
                let mut parts: Vec<WordPart> = word.parts[..index].to_vec();
                let mut replaced = String::new();
                replaced.push_str(&text[..start]);
                replaced.push_str(&item);
                replaced.push_str(&text[end + 1..]);
                if !replaced.is_empty() || word.parts.len() == 1 {
                    parts.push(WordPart::Literal(replaced));
                }
                parts.extend(word.parts[index + 1..].iter().cloned());
                if parts.is_empty() {
                    parts.push(WordPart::Literal(String::new()));
                }
                // The tail may hold further brace groups.
                results.extend(expand_braces(&Word { parts })?);
            }
            return Ok(results);
        }
    }
    Ok(vec![word.clone()])
}

/// Locate the first expandable `{…}` in a literal: returns the byte
/// offsets of `{` and `}` plus the generated alternatives.
fn find_brace(text: &str) -> Flow<Option<(usize, usize, Vec<String>)>> {
    let bytes = text.as_bytes();
    for start in 0..bytes.len() {
        if bytes[start] != b'{' {
            continue;
        }
        let Some((end, commas)) = scan_group(bytes, start) else { continue };
        let inner = &text[start + 1..end];
        if !commas.is_empty() {
            let mut alts = Vec::new();
            let mut from = start + 1;
            for &comma in &commas {
                alts.push(text[from..comma].to_string());
                from = comma + 1;
            }
            alts.push(text[from..end].to_string());
            return Ok(Some((start, end, alts)));
        }
        if let Some(items) = range_items(inner)? {
            return Ok(Some((start, end, items)));
        }
    }
    Ok(None)
}

/// Find the `}` matching `bytes[open]`, with top-level comma positions.
fn scan_group(bytes: &[u8], open: usize) -> Option<(usize, Vec<usize>)> {
    let mut depth = 0usize;
    let mut commas = Vec::new();
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((i, commas));
                }
            }
            b',' if depth == 1 => commas.push(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Parse `x..y` / `x..y..step` into the generated item list, or None if
/// the content is not a range.
fn range_items(inner: &str) -> Flow<Option<Vec<String>>> {
    let mut sections = inner.split("..");
    let (Some(from), Some(to)) = (sections.next(), sections.next()) else {
        return Ok(None);
    };
    let step_text = sections.next();
    if sections.next().is_some() {
        return Ok(None);
    }

    let step = match step_text {
        Some(s) => match s.parse::<i64>() {
            Ok(n) => Some(n),
            Err(_) => return Ok(None),
        },
        None => None,
    };

    // Numeric range, with zero-padding when an endpoint carries it.
    if let (Ok(lo), Ok(hi)) = (from.parse::<i64>(), to.parse::<i64>()) {
        let pad = padded_width(from).max(padded_width(to));
        let mut step = step.unwrap_or(1).abs();
        if step == 0 {
            step = 1;
        }
        let count = (lo - hi).abs() / step + 1;
        if count > MAX_RANGE_ITEMS {
            return Err(Interrupt::brace(format!("brace expansion too large: {{{}}}", inner)));
        }
        let mut items = Vec::new();
        let mut value = lo;
        if lo <= hi {
            while value <= hi {
                items.push(pad_number(value, pad));
                value += step;
            }
        } else {
            while value >= hi {
                items.push(pad_number(value, pad));
                value -= step;
            }
        }
        return Ok(Some(items));
    }

    // Alpha range: single ASCII letters on both ends.
    let (from_ch, to_ch) = match (single_letter(from), single_letter(to)) {
        (Some(a), Some(b)) => (a, b),
        _ => return Ok(None),
    };
    if from_ch.is_ascii_lowercase() != to_ch.is_ascii_lowercase() {
        return Err(Interrupt::brace(format!(
            "bad brace range: {{{}..{}}} mixes letter case",
            from, to
        )));
    }
    let mut step = step.unwrap_or(1).abs();
    if step == 0 {
        step = 1;
    }
    let (lo, hi) = (from_ch as i64, to_ch as i64);
    let mut items = Vec::new();
    let mut value = lo;
    if lo <= hi {
        while value <= hi {
            items.push(((value as u8) as char).to_string());
            value += step;
        }
    } else {
        while value >= hi {
            items.push(((value as u8) as char).to_string());
            value -= step;
        }
    }
    Ok(Some(items))
}

fn single_letter(s: &str) -> Option<char> {
    let mut chars = s.chars();
    let c = chars.next()?;
    if chars.next().is_some() || !c.is_ascii_alphabetic() {
        return None;
    }
    Some(c)
}

fn padded_width(s: &str) -> usize {
    let digits = s.strip_prefix('-').unwrap_or(s);
    if digits.len() > 1 && digits.starts_with('0') {
        s.len()
    } else {
        0
    }
}

fn pad_number(value: i64, width: usize) -> String {
    if width == 0 {
        value.to_string()
    } else if value < 0 {
        format!("-{:0>width$}", -value, width = width.saturating_sub(1))
    } else {
        format!("{:0>width$}", value, width = width)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn expand(text: &str) -> Vec<String> {
        let words = expand_braces(&Word::literal(text)).unwrap();
        words
            .iter()
            .map(|w| w.static_text().unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_no_braces() {
        assert_eq!(expand("plain"), vec!["plain"]);
    }

    #[test]
    fn test_simple_alternatives() {
        assert_eq!(expand("a{b,c}d"), vec!["abd", "acd"]);
    }

    #[test]
    fn test_empty_alternative() {
        assert_eq!(expand("a{,b}"), vec!["a", "ab"]);
    }

    #[test]
    fn test_nested() {
        assert_eq!(expand("a{b{1,2},c}d"), vec!["ab1d", "ab2d", "acd"]);
    }

    #[test]
    fn test_multiple_groups() {
        assert_eq!(expand("{a,b}{1,2}"), vec!["a1", "a2", "b1", "b2"]);
    }

    #[test]
    fn test_numeric_range() {
        assert_eq!(expand("{1..5}"), vec!["1", "2", "3", "4", "5"]);
        assert_eq!(expand("{5..1}"), vec!["5", "4", "3", "2", "1"]);
        assert_eq!(expand("{1..5..2}"), vec!["1", "3", "5"]);
        assert_eq!(expand("{-2..2}"), vec!["-2", "-1", "0", "1", "2"]);
    }

    #[test]
    fn test_zero_padding() {
        assert_eq!(expand("{01..03}"), vec!["01", "02", "03"]);
        assert_eq!(expand("{08..10}"), vec!["08", "09", "10"]);
    }

    #[test]
    fn test_alpha_range() {
        assert_eq!(expand("{a..e}"), vec!["a", "b", "c", "d", "e"]);
        assert_eq!(expand("{e..a}"), vec!["e", "d", "c", "b", "a"]);
    }

    #[test]
    fn test_mixed_case_range_errors() {
        let word = Word::literal("{a..Z}");
        assert!(expand_braces(&word).is_err());
    }

    #[test]
    fn test_unmatched_brace_passes_through() {
        assert_eq!(expand("a{bc"), vec!["a{bc"]);
        assert_eq!(expand("a}b"), vec!["a}b"]);
    }

    #[test]
    fn test_single_item_not_expanded() {
        // `{single}` has no comma and is not a range.
        assert_eq!(expand("{single}"), vec!["{single}"]);
    }

    #[test]
    fn test_quoted_braces_untouched() {
        let word = Word { parts: vec![WordPart::SingleQuoted("{a,b}".into())] };
        let out = expand_braces(&word).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_range_too_large_errors() {
        assert!(expand_braces(&Word::literal("{1..99999999}")).is_err());
    }

    #[test]
    fn test_prefix_suffix_parts_kept() {
        let word = Word {
            parts: vec![
                WordPart::Literal("x{1,2}".into()),
                WordPart::SingleQuoted("q".into()),
            ],
        };
        let out = expand_braces(&word).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].parts.len(), 2);
        assert_eq!(out[0].parts[0], WordPart::Literal("x1".into()));
    }
}
