//! `getopts`
//!
//! POSIX option parsing over the positional parameters (or explicit
//! args), maintaining OPTIND/OPTARG plus an internal character index
//! for bundled options. A leading `:` in the optstring selects silent
//! error reporting.

use crate::bytes::{self, Bytes};
use crate::interp::builtins::BuiltinOutcome;
use crate::interp::interrupt::ExecResult;
use crate::interp::state::ShellState;

pub fn getopts(st: &mut ShellState, args: &[Bytes]) -> BuiltinOutcome {
    let (optstring, var_name) = match (args.first(), args.get(1)) {
        (Some(o), Some(v)) => (bytes::lossy_string(o), bytes::lossy_string(v)),
        _ => {
            return Ok(ExecResult::failure("getopts: usage: getopts optstring name [arg ...]", 2));
        }
    };
    if !bytes::is_valid_name(&var_name) {
        return Ok(ExecResult::failure(
            format!("getopts: `{}': not a valid identifier", var_name),
            2,
        ));
    }

    let silent = optstring.starts_with(':');
    let spec: Vec<char> = optstring.trim_start_matches(':').chars().collect();
    let takes_arg = |opt: char| -> Option<bool> {
        let pos = spec.iter().position(|&c| c == opt)?;
        Some(spec.get(pos + 1) == Some(&':'))
    };

    let words: Vec<Bytes> = if args.len() > 2 {
        args[2..].to_vec()
    } else {
        st.positional().to_vec()
    };

    let mut optind = st
        .scopes
        .get_string("OPTIND")
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(1)
        .max(1);
    // A user reset of OPTIND restarts the bundled-character cursor.
    if optind != st.getopts.last_optind {
        st.getopts.char_index = 0;
    }

    let finish = |st: &mut ShellState, optind: i64, char_index: usize, code: i32| {
        let _ = st.scopes.set_scalar("OPTIND", optind.to_string().into_bytes());
        st.getopts.last_optind = optind;
        st.getopts.char_index = char_index;
        ExecResult::code(code)
    };

    let set_var = |st: &mut ShellState, value: &str| {
        let _ = st.scopes.set_scalar(&var_name, value.as_bytes().to_vec());
    };

    let done = |st: &mut ShellState, optind: i64| {
        set_var(st, "?");
        let _ = st.scopes.unset("OPTARG");
        finish(st, optind, 0, 1)
    };

    // End of options?
    let index = (optind - 1) as usize;
    let word = match words.get(index) {
        Some(w) => bytes::lossy_string(w),
        None => return Ok(done(st, optind)),
    };
    if !word.starts_with('-') || word == "-" {
        return Ok(done(st, optind));
    }
    if word == "--" {
        return Ok(done(st, optind + 1));
    }

    let opts: Vec<char> = word.chars().skip(1).collect();
    let char_index = st.getopts.char_index.min(opts.len().saturating_sub(1));
    let opt = opts[char_index];
    let at_word_end = char_index + 1 >= opts.len();

    match takes_arg(opt) {
        None | Some(_) if opt == ':' => {
            // `:` can never be an option character.
            return Ok(report_bad_option(st, opt, silent, &var_name, optind, at_word_end, char_index, finish));
        }
        None => {
            return Ok(report_bad_option(st, opt, silent, &var_name, optind, at_word_end, char_index, finish));
        }
        Some(true) => {
            // Option with argument: rest of this word, or the next word.
            if !at_word_end {
                let arg: String = opts[char_index + 1..].iter().collect();
                let _ = st.scopes.set_scalar("OPTARG", arg.into_bytes());
                set_var(st, &opt.to_string());
                return Ok(finish(st, optind + 1, 0, 0));
            }
            match words.get(index + 1) {
                Some(next) => {
                    let _ = st.scopes.set_scalar("OPTARG", next.clone());
                    set_var(st, &opt.to_string());
                    Ok(finish(st, optind + 2, 0, 0))
                }
                None => {
                    if silent {
                        let _ = st.scopes.set_scalar("OPTARG", opt.to_string().into_bytes());
                        set_var(st, ":");
                        Ok(finish(st, optind + 1, 0, 0))
                    } else {
                        let _ = st.scopes.unset("OPTARG");
                        set_var(st, "?");
                        let mut result = finish(st, optind + 1, 0, 0);
                        result.stderr = format!(
                            "bash: getopts: option requires an argument -- {}\n",
                            opt
                        )
                        .into_bytes();
                        Ok(result)
                    }
                }
            }
        }
        Some(false) => {
            let _ = st.scopes.unset("OPTARG");
            set_var(st, &opt.to_string());
            if at_word_end {
                Ok(finish(st, optind + 1, 0, 0))
            } else {
                Ok(finish(st, optind, char_index + 1, 0))
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn report_bad_option(
    st: &mut ShellState,
    opt: char,
    silent: bool,
    var_name: &str,
    optind: i64,
    at_word_end: bool,
    char_index: usize,
    finish: impl Fn(&mut ShellState, i64, usize, i32) -> ExecResult,
) -> ExecResult {
    let _ = st.scopes.set_scalar(var_name, b"?".to_vec());
    if silent {
        let _ = st.scopes.set_scalar("OPTARG", opt.to_string().into_bytes());
    } else {
        let _ = st.scopes.unset("OPTARG");
    }
    let mut result = if at_word_end {
        finish(st, optind + 1, 0, 0)
    } else {
        finish(st, optind, char_index + 1, 0)
    };
    if !silent {
        result.stderr = format!("bash: getopts: illegal option -- {}\n", opt).into_bytes();
    }
    result
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn run(st: &mut ShellState, optstring: &str, args: &[&str]) -> (i32, String, String, String) {
        let mut argv: Vec<Bytes> = vec![optstring.as_bytes().to_vec(), b"opt".to_vec()];
        argv.extend(args.iter().map(|a| a.as_bytes().to_vec()));
        let result = getopts(st, &argv).unwrap();
        (
            result.exit_code,
            st.scopes.get_string("opt").unwrap_or_default(),
            st.scopes.get_string("OPTARG").unwrap_or_default(),
            st.scopes.get_string("OPTIND").unwrap_or_default(),
        )
    }

    #[test]
    fn test_simple_flags() {
        let mut st = ShellState::new();
        let (code, opt, _, optind) = run(&mut st, "ab", &["-a", "-b"]);
        assert_eq!((code, opt.as_str(), optind.as_str()), (0, "a", "2"));
        let (code, opt, _, optind) = run(&mut st, "ab", &["-a", "-b"]);
        assert_eq!((code, opt.as_str(), optind.as_str()), (0, "b", "3"));
        let (code, opt, _, _) = run(&mut st, "ab", &["-a", "-b"]);
        assert_eq!((code, opt.as_str()), (1, "?"));
    }

    #[test]
    fn test_option_with_argument() {
        let mut st = ShellState::new();
        let (code, opt, optarg, optind) = run(&mut st, "ab:", &["-b", "val"]);
        assert_eq!((code, opt.as_str(), optarg.as_str(), optind.as_str()), (0, "b", "val", "3"));
    }

    #[test]
    fn test_option_argument_attached() {
        let mut st = ShellState::new();
        let (code, opt, optarg, optind) = run(&mut st, "b:", &["-bval"]);
        assert_eq!((code, opt.as_str(), optarg.as_str(), optind.as_str()), (0, "b", "val", "2"));
    }

    #[test]
    fn test_bundled_options() {
        let mut st = ShellState::new();
        let (code, opt, _, optind) = run(&mut st, "ab", &["-ab"]);
        assert_eq!((code, opt.as_str(), optind.as_str()), (0, "a", "1"));
        let (code, opt, _, optind) = run(&mut st, "ab", &["-ab"]);
        assert_eq!((code, opt.as_str(), optind.as_str()), (0, "b", "2"));
        let (code, _, _, _) = run(&mut st, "ab", &["-ab"]);
        assert_eq!(code, 1);
    }

    #[test]
    fn test_bundled_with_trailing_argument() {
        let mut st = ShellState::new();
        // `-ab val` where b takes an argument.
        let (code, opt, _, _) = run(&mut st, "ab:", &["-ab", "val"]);
        assert_eq!((code, opt.as_str()), (0, "a"));
        let (code, opt, optarg, optind) = run(&mut st, "ab:", &["-ab", "val"]);
        assert_eq!((code, opt.as_str(), optarg.as_str(), optind.as_str()), (0, "b", "val", "3"));
    }

    #[test]
    fn test_illegal_option_loud() {
        let mut st = ShellState::new();
        let argv: Vec<Bytes> = vec![b"a".to_vec(), b"opt".to_vec(), b"-z".to_vec()];
        let result = getopts(&mut st, &argv).unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(String::from_utf8_lossy(&result.stderr).contains("illegal option"));
        assert_eq!(st.scopes.get_string("opt").unwrap(), "?");
    }

    #[test]
    fn test_illegal_option_silent() {
        let mut st = ShellState::new();
        let (code, opt, optarg, _) = run(&mut st, ":a", &["-z"]);
        assert_eq!((code, opt.as_str(), optarg.as_str()), (0, "?", "z"));
    }

    #[test]
    fn test_missing_argument_silent() {
        let mut st = ShellState::new();
        let (code, opt, optarg, _) = run(&mut st, ":b:", &["-b"]);
        assert_eq!((code, opt.as_str(), optarg.as_str()), (0, ":", "b"));
    }

    #[test]
    fn test_end_at_double_dash() {
        let mut st = ShellState::new();
        let (code, _, _, optind) = run(&mut st, "a", &["--", "rest"]);
        assert_eq!((code, optind.as_str()), (1, "2"));
    }

    #[test]
    fn test_end_at_non_option() {
        let mut st = ShellState::new();
        let (code, opt, _, _) = run(&mut st, "a", &["plain"]);
        assert_eq!((code, opt.as_str()), (1, "?"));
    }

    #[test]
    fn test_invalid_variable_name() {
        let mut st = ShellState::new();
        let result =
            getopts(&mut st, &[b"a".to_vec(), b"1bad".to_vec()]).unwrap();
        assert_eq!(result.exit_code, 2);
    }

    #[test]
    fn test_uses_positional_params() {
        let mut st = ShellState::new();
        st.set_positional(vec![b"-a".to_vec()]);
        let result = getopts(&mut st, &[b"a".to_vec(), b"opt".to_vec()]).unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(st.scopes.get_string("opt").unwrap(), "a");
    }
}
