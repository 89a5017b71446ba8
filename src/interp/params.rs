//! Parameter Expansion Operators
//!
//! Resolution of `$name` / `${name…}` against the scope stack and the
//! special parameters, plus the operator suite: defaults, assignment,
//! error-if-unset, alternates, prefix/suffix trims, substrings, pattern
//! replacement, case modification, indirection, and array subscripts.
//! `$@`-like expansions return multiple fields; everything else is a
//! single byte string.

use crate::bytes::{self, Bytes};
use crate::interp::arith::eval_arith;
use crate::interp::engine::Executor;
use crate::interp::expand::{expand_word_pattern, expand_word_single, ExpandSide};
use crate::interp::interrupt::{Flow, Interrupt};
use crate::interp::pattern::{compile, PatternOptions};
use crate::interp::scope::VarValue;
use crate::interp::state::ShellState;
use crate::parser::ast::{ParamExpansion, ParamOp, Subscript, Word};

#[derive(Debug, Clone)]
pub enum ParamValue {
    Single(Bytes),
    Fields(Vec<Bytes>),
}

impl ParamValue {
    fn is_empty(&self) -> bool {
        match self {
            ParamValue::Single(b) => b.is_empty(),
            ParamValue::Fields(items) => items.is_empty(),
        }
    }
}

enum Resolved {
    Unset,
    Set(ParamValue),
}

pub fn expand_param(
    ex: &Executor<'_>,
    st: &mut ShellState,
    pe: &ParamExpansion,
    in_dquote: bool,
    side: &mut ExpandSide,
) -> Flow<ParamValue> {
    match &pe.op {
        ParamOp::Length => return param_length(st, pe),
        ParamOp::Keys => return Ok(array_keys(st, &pe.name)),
        ParamOp::NamesWithPrefix => {
            let names: Vec<Bytes> = st
                .scopes
                .visible()
                .into_iter()
                .map(|(name, _)| name)
                .filter(|n| n.starts_with(&pe.name))
                .map(|n| n.into_bytes())
                .collect();
            return Ok(ParamValue::Fields(names));
        }
        ParamOp::Indirect => {
            let target = match resolve(st, &pe.name, pe.subscript.as_ref(), in_dquote)? {
                Resolved::Set(ParamValue::Single(b)) => bytes::lossy_string(&b),
                Resolved::Set(ParamValue::Fields(_)) | Resolved::Unset => String::new(),
            };
            let target = target.trim().to_string();
            if target.is_empty() {
                if st.flags.nounset {
                    return Err(Interrupt::nounset(&pe.name));
                }
                return Ok(ParamValue::Single(Bytes::new()));
            }
            let inner = ParamExpansion { name: target, subscript: None, op: ParamOp::Plain };
            return expand_param(ex, st, &inner, in_dquote, side);
        }
        _ => {}
    }

    let resolved = resolve(st, &pe.name, pe.subscript.as_ref(), in_dquote)?;

    match &pe.op {
        ParamOp::Plain => match resolved {
            Resolved::Set(value) => Ok(value),
            Resolved::Unset => {
                if st.flags.nounset && !matches!(pe.name.as_str(), "@" | "*") {
                    Err(Interrupt::nounset(&pe.name))
                } else if matches!(pe.name.as_str(), "@" | "*") {
                    Ok(ParamValue::Fields(Vec::new()))
                } else {
                    Ok(ParamValue::Single(Bytes::new()))
                }
            }
        },
        ParamOp::Default { word, colon } => {
            if use_value(&resolved, *colon) {
                Ok(set_value(resolved))
            } else {
                Ok(ParamValue::Single(expand_word_single(ex, st, word, side)?))
            }
        }
        ParamOp::Assign { word, colon } => {
            if use_value(&resolved, *colon) {
                Ok(set_value(resolved))
            } else {
                let value = expand_word_single(ex, st, word, side)?;
                if !bytes::is_valid_name(&pe.name) {
                    return Err(Interrupt::bad_substitution(&pe.name));
                }
                st.scopes
                    .set_scalar(&pe.name, value.clone())
                    .map_err(|msg| Interrupt::param_error(&pe.name, &msg))?;
                Ok(ParamValue::Single(value))
            }
        }
        ParamOp::ErrorIf { word, colon } => {
            if use_value(&resolved, *colon) {
                Ok(set_value(resolved))
            } else {
                let message = match word {
                    Some(w) => bytes::lossy_string(&expand_word_single(ex, st, w, side)?),
                    None => "parameter null or not set".to_string(),
                };
                Err(Interrupt::param_error(&pe.name, &message))
            }
        }
        ParamOp::Alternate { word, colon } => {
            if use_value(&resolved, *colon) {
                Ok(ParamValue::Single(expand_word_single(ex, st, word, side)?))
            } else {
                Ok(ParamValue::Single(Bytes::new()))
            }
        }
        ParamOp::TrimPrefix { pattern, longest } => {
            let value = unset_ok(st, &pe.name, resolved)?;
            let field = expand_word_pattern(ex, st, pattern, side)?;
            let pat = compile(&field.bytes, Some(&field.mask), pattern_opts(st));
            Ok(map_value(value, |item| {
                match pat.match_prefix_len(&item, *longest) {
                    Some(k) => item[k..].to_vec(),
                    None => item,
                }
            }))
        }
        ParamOp::TrimSuffix { pattern, longest } => {
            let value = unset_ok(st, &pe.name, resolved)?;
            let field = expand_word_pattern(ex, st, pattern, side)?;
            let pat = compile(&field.bytes, Some(&field.mask), pattern_opts(st));
            Ok(map_value(value, |item| {
                match pat.match_suffix_len(&item, *longest) {
                    Some(k) => item[..item.len() - k].to_vec(),
                    None => item,
                }
            }))
        }
        ParamOp::Substring { offset, length } => {
            let value = unset_ok(st, &pe.name, resolved)?;
            let off = eval_arith(st, offset)?;
            let len = match length {
                Some(expr) => Some(eval_arith(st, expr)?),
                None => None,
            };
            match value {
                ParamValue::Fields(items) => {
                    // `${@:off:len}` slices the positional list, with $0
                    // at offset 0.
                    let mut full: Vec<Bytes> = vec![st.script_name.clone().into_bytes()];
                    full.extend(items);
                    let n = full.len() as i64;
                    let start = if off < 0 { (n + off).max(0) } else { off.min(n) };
                    let end = match len {
                        Some(l) if l >= 0 => (start + l).min(n),
                        Some(l) => (n + l).max(start),
                        None => n,
                    };
                    Ok(ParamValue::Fields(
                        full[start as usize..end.max(start) as usize].to_vec(),
                    ))
                }
                ParamValue::Single(item) => Ok(ParamValue::Single(char_slice(&item, off, len)?)),
            }
        }
        ParamOp::Replace { pattern, replacement, mode } => {
            let value = unset_ok(st, &pe.name, resolved)?;
            let field = expand_word_pattern(ex, st, pattern, side)?;
            if field.bytes.is_empty() {
                return Ok(value);
            }
            let pat = compile(&field.bytes, Some(&field.mask), pattern_opts(st));
            let rep = match replacement {
                Some(w) => expand_word_single(ex, st, w, side)?,
                None => Bytes::new(),
            };
            use crate::parser::ast::ReplaceMode;
            Ok(map_value(value, |item| match mode {
                ReplaceMode::First => pat.replace(&item, &rep, false),
                ReplaceMode::All => pat.replace(&item, &rep, true),
                ReplaceMode::Prefix => pat.replace_prefix(&item, &rep),
                ReplaceMode::Suffix => pat.replace_suffix(&item, &rep),
            }))
        }
        ParamOp::CaseUpper { pattern, all } => {
            case_modify(ex, st, resolved, pattern.as_ref(), *all, true, &pe.name, side)
        }
        ParamOp::CaseLower { pattern, all } => {
            case_modify(ex, st, resolved, pattern.as_ref(), *all, false, &pe.name, side)
        }
        // Handled above.
        ParamOp::Length | ParamOp::Keys | ParamOp::NamesWithPrefix | ParamOp::Indirect => {
            Err(Interrupt::internal("parameter operator dispatch"))
        }
    }
}

fn pattern_opts(st: &ShellState) -> PatternOptions {
    PatternOptions { extglob: st.options.extglob, casefold: st.options.nocasematch }
}

fn use_value(resolved: &Resolved, colon: bool) -> bool {
    match resolved {
        Resolved::Unset => false,
        Resolved::Set(value) => !(colon && value.is_empty()),
    }
}

fn set_value(resolved: Resolved) -> ParamValue {
    match resolved {
        Resolved::Set(value) => value,
        Resolved::Unset => ParamValue::Single(Bytes::new()),
    }
}

/// For operators that work on the value: unset under nounset errors,
/// otherwise behaves as empty.
fn unset_ok(st: &ShellState, name: &str, resolved: Resolved) -> Flow<ParamValue> {
    match resolved {
        Resolved::Set(value) => Ok(value),
        Resolved::Unset => {
            if st.flags.nounset && !matches!(name, "@" | "*") {
                Err(Interrupt::nounset(name))
            } else if matches!(name, "@" | "*") {
                Ok(ParamValue::Fields(Vec::new()))
            } else {
                Ok(ParamValue::Single(Bytes::new()))
            }
        }
    }
}

fn map_value(value: ParamValue, f: impl Fn(Bytes) -> Bytes) -> ParamValue {
    match value {
        ParamValue::Single(b) => ParamValue::Single(f(b)),
        ParamValue::Fields(items) => ParamValue::Fields(items.into_iter().map(f).collect()),
    }
}

// =============================================================================
// Resolution
// =============================================================================

fn resolve(
    st: &mut ShellState,
    name: &str,
    subscript: Option<&Subscript>,
    in_dquote: bool,
) -> Flow<Resolved> {
    // Special parameters first.
    match name {
        "@" => {
            let params = st.positional().to_vec();
            if params.is_empty() {
                return Ok(Resolved::Unset);
            }
            return Ok(Resolved::Set(ParamValue::Fields(params)));
        }
        "*" => {
            let params = st.positional().to_vec();
            if params.is_empty() {
                return Ok(Resolved::Unset);
            }
            if in_dquote {
                return Ok(Resolved::Set(ParamValue::Single(bytes::join(
                    &params,
                    &st.ifs_joiner(),
                ))));
            }
            return Ok(Resolved::Set(ParamValue::Fields(params)));
        }
        "#" => {
            return Ok(Resolved::Set(ParamValue::Single(
                st.positional().len().to_string().into_bytes(),
            )));
        }
        "?" => {
            return Ok(Resolved::Set(ParamValue::Single(
                st.last_exit.to_string().into_bytes(),
            )));
        }
        "$" => {
            return Ok(Resolved::Set(ParamValue::Single(
                st.shell_pid.to_string().into_bytes(),
            )));
        }
        "!" => {
            if st.last_bg_pid == 0 {
                return Ok(Resolved::Unset);
            }
            return Ok(Resolved::Set(ParamValue::Single(
                st.last_bg_pid.to_string().into_bytes(),
            )));
        }
        "-" => {
            return Ok(Resolved::Set(ParamValue::Single(
                st.flags.short_string().into_bytes(),
            )));
        }
        "_" => return Ok(Resolved::Set(ParamValue::Single(st.last_arg.clone()))),
        "0" => {
            return Ok(Resolved::Set(ParamValue::Single(
                st.script_name.clone().into_bytes(),
            )));
        }
        "RANDOM" => {
            let value = st.next_random();
            return Ok(Resolved::Set(ParamValue::Single(value.to_string().into_bytes())));
        }
        "LINENO" => {
            return Ok(Resolved::Set(ParamValue::Single(
                st.current_line.to_string().into_bytes(),
            )));
        }
        "SECONDS" => {
            // No wall clock in the sandbox.
            return Ok(Resolved::Set(ParamValue::Single(b"0".to_vec())));
        }
        "FUNCNAME" => {
            if st.func_stack.is_empty() {
                return Ok(Resolved::Unset);
            }
            let items: Vec<Bytes> =
                st.func_stack.iter().rev().map(|n| n.clone().into_bytes()).collect();
            return Ok(match subscript {
                Some(Subscript::At) | Some(Subscript::Star) => {
                    Resolved::Set(ParamValue::Fields(items))
                }
                _ => Resolved::Set(ParamValue::Single(items[0].clone())),
            });
        }
        _ => {}
    }

    // Positional parameters `$1`…`$NN`.
    if name.chars().all(|c| c.is_ascii_digit()) {
        let index: usize = name.parse().unwrap_or(0);
        let params = st.positional();
        if index == 0 || index > params.len() {
            return Ok(Resolved::Unset);
        }
        return Ok(Resolved::Set(ParamValue::Single(params[index - 1].clone())));
    }

    // Ordinary variables, with optional array subscripts.
    let var = match st.scopes.get(name) {
        Some(v) => v.clone(),
        None => return Ok(Resolved::Unset),
    };
    match subscript {
        None => match var.value.scalar() {
            Some(b) => Ok(Resolved::Set(ParamValue::Single(b.to_vec()))),
            None => Ok(Resolved::Unset),
        },
        Some(Subscript::At) | Some(Subscript::Star) => {
            let items: Vec<Bytes> = match &var.value {
                VarValue::Scalar(b) => vec![b.clone()],
                VarValue::Indexed(map) => map.values().cloned().collect(),
                VarValue::Assoc(map) => map.values().cloned().collect(),
            };
            if matches!(subscript, Some(Subscript::Star)) && in_dquote {
                Ok(Resolved::Set(ParamValue::Single(bytes::join(&items, &st.ifs_joiner()))))
            } else {
                Ok(Resolved::Set(ParamValue::Fields(items)))
            }
        }
        Some(Subscript::Index(expr)) => match &var.value {
            VarValue::Assoc(map) => match map.get(expr.as_bytes()) {
                Some(value) => Ok(Resolved::Set(ParamValue::Single(value.clone()))),
                None => Ok(Resolved::Unset),
            },
            VarValue::Indexed(map) => {
                let index = eval_arith(st, expr)?;
                let n = map.keys().max().map(|&k| k + 1).unwrap_or(0);
                let key = if index < 0 { n + index } else { index };
                match map.get(&key) {
                    Some(value) => Ok(Resolved::Set(ParamValue::Single(value.clone()))),
                    None => Ok(Resolved::Unset),
                }
            }
            VarValue::Scalar(b) => {
                let index = eval_arith(st, expr)?;
                if index == 0 {
                    Ok(Resolved::Set(ParamValue::Single(b.clone())))
                } else {
                    Ok(Resolved::Unset)
                }
            }
        },
    }
}

fn param_length(st: &mut ShellState, pe: &ParamExpansion) -> Flow<ParamValue> {
    let count = match pe.name.as_str() {
        "@" | "*" => st.positional().len(),
        name => match &pe.subscript {
            Some(Subscript::At) | Some(Subscript::Star) => {
                st.scopes.get(name).map(|v| v.value.len_elements()).unwrap_or(0)
            }
            Some(Subscript::Index(expr)) => {
                let expr = expr.clone();
                match resolve(st, name, Some(&Subscript::Index(expr)), false)? {
                    Resolved::Set(ParamValue::Single(b)) => char_count(&b),
                    _ => 0,
                }
            }
            None => {
                if st.flags.nounset && !st.scopes.is_set(name) {
                    return Err(Interrupt::nounset(name));
                }
                st.scopes.get_scalar(name).map(char_count).unwrap_or(0)
            }
        },
    };
    Ok(ParamValue::Single(count.to_string().into_bytes()))
}

fn array_keys(st: &ShellState, name: &str) -> ParamValue {
    let keys: Vec<Bytes> = match st.scopes.get(name).map(|v| &v.value) {
        Some(VarValue::Indexed(map)) => {
            map.keys().map(|k| k.to_string().into_bytes()).collect()
        }
        Some(VarValue::Assoc(map)) => map.keys().cloned().collect(),
        Some(VarValue::Scalar(_)) => vec![b"0".to_vec()],
        None => Vec::new(),
    };
    ParamValue::Fields(keys)
}

// =============================================================================
// Character-oriented helpers
// =============================================================================

fn char_count(value: &[u8]) -> usize {
    match std::str::from_utf8(value) {
        Ok(s) => s.chars().count(),
        Err(_) => value.len(),
    }
}

fn char_slice(value: &[u8], offset: i64, length: Option<i64>) -> Flow<Bytes> {
    match std::str::from_utf8(value) {
        Ok(s) => {
            let chars: Vec<char> = s.chars().collect();
            let n = chars.len() as i64;
            let start = if offset < 0 { (n + offset).max(0) } else { offset.min(n) };
            let end = match length {
                Some(l) if l >= 0 => (start + l).min(n),
                Some(l) => {
                    let e = n + l;
                    if e < start {
                        return Err(Interrupt::bad_substitution(format!(
                            "{}: substring expression < 0",
                            l
                        )));
                    }
                    e
                }
                None => n,
            };
            Ok(chars[start as usize..end.max(start) as usize]
                .iter()
                .collect::<String>()
                .into_bytes())
        }
        Err(_) => {
            let n = value.len() as i64;
            let start = if offset < 0 { (n + offset).max(0) } else { offset.min(n) };
            let end = match length {
                Some(l) if l >= 0 => (start + l).min(n),
                Some(l) => (n + l).max(start),
                None => n,
            };
            Ok(value[start as usize..end.max(start) as usize].to_vec())
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn case_modify(
    ex: &Executor<'_>,
    st: &mut ShellState,
    resolved: Resolved,
    pattern: Option<&Word>,
    all: bool,
    upper: bool,
    name: &str,
    side: &mut ExpandSide,
) -> Flow<ParamValue> {
    let value = unset_ok(st, name, resolved)?;
    let pat = match pattern {
        Some(word) => {
            let field = expand_word_pattern(ex, st, word, side)?;
            Some(compile(&field.bytes, Some(&field.mask), pattern_opts(st)))
        }
        None => None,
    };
    Ok(map_value(value, |item| {
        let text = match std::str::from_utf8(&item) {
            Ok(s) => s.to_string(),
            Err(_) => return item,
        };
        let mut out = String::new();
        for (i, c) in text.chars().enumerate() {
            let applies = (all || i == 0)
                && pat
                    .as_ref()
                    .map(|p| {
                        let mut buf = [0u8; 4];
                        p.matches(c.encode_utf8(&mut buf).as_bytes())
                    })
                    .unwrap_or(true);
            if applies {
                if upper {
                    out.extend(c.to_uppercase());
                } else {
                    out.extend(c.to_lowercase());
                }
            } else {
                out.push(c);
            }
        }
        out.into_bytes()
    }))
}

// ============================================================================
// Tests
// ============================================================================
