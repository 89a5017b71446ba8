//! Pathname Expansion
//!
//! Component-wise traversal of the virtual filesystem with the byte
//! pattern matcher: `*`, `?`, classes, extglob, and `**` under
//! globstar. Hidden entries require a literal leading dot (or dotglob);
//! every directory read is metered against the glob-operations budget.

use std::collections::BTreeSet;

use crate::bytes::Bytes;
use crate::interp::engine::Executor;
use crate::interp::expand::Field;
use crate::interp::interrupt::Flow;
use crate::interp::pattern::{compile, Pattern, PatternOptions};
use crate::interp::state::ShellState;

/// Expand one glob field. `Ok(None)` means no matches (caller applies
/// the nullglob/failglob/leave-as-is policy).
pub fn expand_field(
    ex: &Executor<'_>,
    st: &ShellState,
    field: &Field,
) -> Flow<Option<Vec<Bytes>>> {
    let pattern = &field.bytes;
    let absolute = pattern.first() == Some(&b'/');
    let ends_with_slash = pattern.last() == Some(&b'/');

    // Split into components, carrying the quoted mask along.
    let mut components: Vec<(Vec<u8>, Vec<bool>)> = Vec::new();
    let mut cur_bytes = Vec::new();
    let mut cur_mask = Vec::new();
    for (i, &b) in pattern.iter().enumerate() {
        if b == b'/' {
            if !cur_bytes.is_empty() {
                components.push((std::mem::take(&mut cur_bytes), std::mem::take(&mut cur_mask)));
            }
        } else {
            cur_bytes.push(b);
            cur_mask.push(field.mask.get(i).copied().unwrap_or(false));
        }
    }
    if !cur_bytes.is_empty() {
        components.push((cur_bytes, cur_mask));
    }
    if components.is_empty() {
        return Ok(None);
    }

    let opts = PatternOptions { extglob: st.options.extglob, casefold: st.options.nocaseglob };
    let root = if absolute { "/".to_string() } else { st.cwd.clone() };

    // (display, full) candidate pairs; display is what lands in argv.
    let mut candidates: Vec<(String, String)> = vec![(String::new(), root)];

    for (index, (comp, mask)) in components.iter().enumerate() {
        let last = index == components.len() - 1;
        let globstar = st.options.globstar
            && comp.as_slice() == b"**"
            && mask.iter().all(|&q| !q);
        let mut next: Vec<(String, String)> = Vec::new();

        if globstar {
            for (display, full) in &candidates {
                if !last {
                    // `**/` matches zero or more directories.
                    next.push((display.clone(), full.clone()));
                }
                collect_recursive(ex, st, display, full, absolute, last, &mut next)?;
            }
        } else {
            let pat = compile(comp, Some(mask), opts);
            let want_hidden = st.options.dotglob || comp.first() == Some(&b'.');
            for (display, full) in &candidates {
                ex.counters.borrow_mut().tick_glob(ex.limits)?;
                let entries = match ex.fs.readdir(full) {
                    Ok(entries) => entries,
                    Err(_) => continue,
                };
                for entry in entries {
                    if entry.name.starts_with('.') && !want_hidden {
                        continue;
                    }
                    if !pat.matches(entry.name.as_bytes()) {
                        continue;
                    }
                    let child_display = join_display(display, &entry.name, absolute);
                    let child_full = join_path(full, &entry.name);
                    let is_dir = entry.is_directory
                        || (entry.is_symlink && ex.fs.is_dir(&child_full));
                    if last || is_dir {
                        next.push((child_display, child_full));
                    }
                }
            }
        }
        candidates = next;
        if candidates.is_empty() {
            return Ok(None);
        }
    }

    let mut matches: BTreeSet<String> = BTreeSet::new();
    for (display, full) in candidates {
        if ends_with_slash {
            if ex.fs.is_dir(&full) {
                matches.insert(format!("{}/", display));
            }
        } else {
            matches.insert(display);
        }
    }
    if matches.is_empty() {
        return Ok(None);
    }
    Ok(Some(matches.into_iter().map(|m| m.into_bytes()).collect()))
}

/// Gather descendants for `**`: directories always (they can extend the
/// path); files too when `**` is the final component.
fn collect_recursive(
    ex: &Executor<'_>,
    st: &ShellState,
    display: &str,
    full: &str,
    absolute: bool,
    include_files: bool,
    out: &mut Vec<(String, String)>,
) -> Flow<()> {
    ex.counters.borrow_mut().tick_glob(ex.limits)?;
    let entries = match ex.fs.readdir(full) {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };
    for entry in entries {
        if entry.name.starts_with('.') && !st.options.dotglob {
            continue;
        }
        let child_display = join_display(display, &entry.name, absolute);
        let child_full = join_path(full, &entry.name);
        if entry.is_directory {
            out.push((child_display.clone(), child_full.clone()));
            collect_recursive(ex, st, &child_display, &child_full, absolute, include_files, out)?;
        } else if include_files {
            out.push((child_display, child_full));
        }
    }
    Ok(())
}

fn join_display(prefix: &str, name: &str, absolute: bool) -> String {
    if prefix.is_empty() {
        if absolute {
            format!("/{}", name)
        } else {
            name.to_string()
        }
    } else {
        format!("{}/{}", prefix, name)
    }
}

fn join_path(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Compile a case/`[[`-style match pattern from field bytes.
pub fn match_pattern(st: &ShellState, field: &Field) -> Pattern {
    compile(
        &field.bytes,
        Some(&field.mask),
        PatternOptions { extglob: st.options.extglob, casefold: st.options.nocasematch },
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_display() {
        assert_eq!(join_display("", "a", false), "a");
        assert_eq!(join_display("", "a", true), "/a");
        assert_eq!(join_display("a", "b", false), "a/b");
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/", "x"), "/x");
        assert_eq!(join_path("/a", "x"), "/a/x");
    }
}
