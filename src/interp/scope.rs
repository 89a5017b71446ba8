//! Variables & Scope Stack
//!
//! A layered variable environment: one global frame, plus one frame per
//! function call. Lookup walks top-down; plain assignment writes to the
//! frame that already holds the binding (else the global frame); `local`
//! binds into the top frame. Subshells snapshot the whole stack by
//! cloning the interpreter state.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::bytes::{self, Bytes};

/// A variable's value: scalar, or an ordered array.
#[derive(Debug, Clone, PartialEq)]
pub enum VarValue {
    Scalar(Bytes),
    Indexed(IndexMap<i64, Bytes>),
    Assoc(IndexMap<Bytes, Bytes>),
}

impl VarValue {
    /// The scalar view: a scalar's bytes, or element 0 / the first
    /// element of an array, as bash does when an array is used unsubscripted.
    pub fn scalar(&self) -> Option<&[u8]> {
        match self {
            VarValue::Scalar(bytes) => Some(bytes),
            VarValue::Indexed(map) => map.get(&0).or_else(|| map.values().next()).map(|v| v.as_slice()),
            VarValue::Assoc(map) => map.values().next().map(|v| v.as_slice()),
        }
    }

    pub fn len_elements(&self) -> usize {
        match self {
            VarValue::Scalar(_) => 1,
            VarValue::Indexed(map) => map.len(),
            VarValue::Assoc(map) => map.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub value: VarValue,
    pub exported: bool,
    pub readonly: bool,
}

impl Variable {
    pub fn scalar(value: Bytes) -> Self {
        Self { value: VarValue::Scalar(value), exported: false, readonly: false }
    }

    pub fn exported_scalar(value: Bytes) -> Self {
        Self { value: VarValue::Scalar(value), exported: true, readonly: false }
    }
}

#[derive(Debug, Clone, Default)]
struct Frame {
    vars: HashMap<String, Variable>,
}

/// Ordered sequence of frames; index 0 is the global frame.
#[derive(Debug, Clone)]
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStack {
    pub fn new() -> Self {
        Self { frames: vec![Frame::default()] }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(Frame::default());
    }

    pub fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.frames.iter().rev().find_map(|f| f.vars.get(name))
    }

    pub fn get_scalar(&self, name: &str) -> Option<&[u8]> {
        self.get(name).and_then(|v| v.value.scalar())
    }

    /// Scalar value decoded lossily, for callers that need text.
    pub fn get_string(&self, name: &str) -> Option<String> {
        self.get_scalar(name).map(|b| bytes::lossy_string(b))
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_readonly(&self, name: &str) -> bool {
        self.get(name).map(|v| v.readonly).unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Assignment
    // ------------------------------------------------------------------

    fn frame_of_mut(&mut self, name: &str) -> Option<&mut Frame> {
        self.frames.iter_mut().rev().find(|f| f.vars.contains_key(name))
    }

    /// Plain assignment: write to the frame holding the binding, or the
    /// global frame. Fails with a message on readonly variables.
    pub fn set_scalar(&mut self, name: &str, value: Bytes) -> Result<(), String> {
        self.set_variable(name, VarValue::Scalar(value))
    }

    pub fn set_variable(&mut self, name: &str, value: VarValue) -> Result<(), String> {
        if let Some(frame) = self.frame_of_mut(name) {
            let var = frame
                .vars
                .get_mut(name)
                .ok_or_else(|| format!("{}: assignment failed", name))?;
            if var.readonly {
                return Err(format!("{}: readonly variable", name));
            }
            var.value = value;
            Ok(())
        } else {
            match self.frames.first_mut() {
                Some(global) => {
                    global.vars.insert(name.to_string(), Variable {
                        value,
                        exported: false,
                        readonly: false,
                    });
                    Ok(())
                }
                None => Err(format!("{}: no scope", name)),
            }
        }
    }

    /// Append to a scalar (`name+=value`).
    pub fn append_scalar(&mut self, name: &str, suffix: &[u8]) -> Result<(), String> {
        if self.is_readonly(name) {
            return Err(format!("{}: readonly variable", name));
        }
        let mut value = self.get_scalar(name).map(|b| b.to_vec()).unwrap_or_default();
        value.extend_from_slice(suffix);
        self.set_scalar(name, value)
    }

    /// `local name[=value]`: bind into the top frame.
    pub fn set_local(&mut self, name: &str, value: Option<Bytes>) -> Result<(), String> {
        // A readonly binding in any visible frame blocks shadowing.
        if self.is_readonly(name) {
            return Err(format!("{}: readonly variable", name));
        }
        let frame = match self.frames.last_mut() {
            Some(f) => f,
            None => return Err(format!("{}: no scope", name)),
        };
        frame.vars.insert(
            name.to_string(),
            Variable::scalar(value.unwrap_or_default()),
        );
        Ok(())
    }

    /// Set an indexed-array element, promoting a scalar if needed.
    pub fn set_index(&mut self, name: &str, index: i64, value: Bytes) -> Result<(), String> {
        if self.is_readonly(name) {
            return Err(format!("{}: readonly variable", name));
        }
        let mut map = match self.get(name).map(|v| &v.value) {
            Some(VarValue::Indexed(map)) => map.clone(),
            Some(VarValue::Scalar(existing)) => {
                let mut map = IndexMap::new();
                map.insert(0, existing.clone());
                map
            }
            Some(VarValue::Assoc(_)) => {
                return self.set_assoc(name, index.to_string().into_bytes(), value);
            }
            None => IndexMap::new(),
        };
        map.insert(index, value);
        map.sort_keys();
        self.set_variable(name, VarValue::Indexed(map))
    }

    /// Set an associative-array element.
    pub fn set_assoc(&mut self, name: &str, key: Bytes, value: Bytes) -> Result<(), String> {
        if self.is_readonly(name) {
            return Err(format!("{}: readonly variable", name));
        }
        let mut map = match self.get(name).map(|v| &v.value) {
            Some(VarValue::Assoc(map)) => map.clone(),
            _ => IndexMap::new(),
        };
        map.insert(key, value);
        self.set_variable(name, VarValue::Assoc(map))
    }

    /// Replace an indexed array wholesale (`a=(x y z)`).
    pub fn set_array(&mut self, name: &str, elements: Vec<Bytes>) -> Result<(), String> {
        if self.is_readonly(name) {
            return Err(format!("{}: readonly variable", name));
        }
        let map: IndexMap<i64, Bytes> =
            elements.into_iter().enumerate().map(|(i, v)| (i as i64, v)).collect();
        self.set_variable(name, VarValue::Indexed(map))
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    pub fn set_exported(&mut self, name: &str, exported: bool) {
        if let Some(frame) = self.frame_of_mut(name) {
            if let Some(var) = frame.vars.get_mut(name) {
                var.exported = exported;
                return;
            }
        }
        if exported {
            // Mark-for-export of an unset name creates an empty binding.
            if let Some(global) = self.frames.first_mut() {
                global
                    .vars
                    .entry(name.to_string())
                    .or_insert_with(|| Variable::scalar(Bytes::new()))
                    .exported = true;
            }
        }
    }

    pub fn set_readonly(&mut self, name: &str) {
        if let Some(frame) = self.frame_of_mut(name) {
            if let Some(var) = frame.vars.get_mut(name) {
                var.readonly = true;
                return;
            }
        }
        if let Some(global) = self.frames.first_mut() {
            global
                .vars
                .entry(name.to_string())
                .or_insert_with(|| Variable::scalar(Bytes::new()))
                .readonly = true;
        }
    }

    pub fn unset(&mut self, name: &str) -> Result<(), String> {
        if self.is_readonly(name) {
            return Err(format!("{}: cannot unset: readonly variable", name));
        }
        for frame in self.frames.iter_mut().rev() {
            if frame.vars.remove(name).is_some() {
                return Ok(());
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// All visible bindings, innermost shadowing outermost, sorted.
    pub fn visible(&self) -> Vec<(String, &Variable)> {
        let mut seen: HashMap<&str, &Variable> = HashMap::new();
        for frame in self.frames.iter().rev() {
            for (name, var) in &frame.vars {
                seen.entry(name.as_str()).or_insert(var);
            }
        }
        let mut out: Vec<(String, &Variable)> =
            seen.into_iter().map(|(n, v)| (n.to_string(), v)).collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Exported name → lossy string map, for command environments and
    /// the host-facing result snapshot.
    pub fn exported_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        for (name, var) in self.visible() {
            if var.exported {
                if let Some(value) = var.value.scalar() {
                    env.insert(name, bytes::lossy_string(value));
                }
            }
        }
        env
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_set_get() {
        let mut scopes = ScopeStack::new();
        scopes.set_scalar("x", b"1".to_vec()).unwrap();
        assert_eq!(scopes.get_scalar("x"), Some(&b"1"[..]));
        assert!(scopes.is_set("x"));
        assert!(!scopes.is_set("y"));
    }

    #[test]
    fn test_local_shadows_global() {
        let mut scopes = ScopeStack::new();
        scopes.set_scalar("x", b"outer".to_vec()).unwrap();
        scopes.push_frame();
        scopes.set_local("x", Some(b"inner".to_vec())).unwrap();
        assert_eq!(scopes.get_scalar("x"), Some(&b"inner"[..]));
        scopes.pop_frame();
        assert_eq!(scopes.get_scalar("x"), Some(&b"outer"[..]));
    }

    #[test]
    fn test_assignment_writes_to_binding_frame() {
        let mut scopes = ScopeStack::new();
        scopes.set_scalar("x", b"outer".to_vec()).unwrap();
        scopes.push_frame();
        scopes.set_local("x", Some(b"inner".to_vec())).unwrap();
        // Plain assignment inside the function hits the local binding.
        scopes.set_scalar("x", b"changed".to_vec()).unwrap();
        scopes.pop_frame();
        assert_eq!(scopes.get_scalar("x"), Some(&b"outer"[..]));
    }

    #[test]
    fn test_assignment_without_local_hits_global() {
        let mut scopes = ScopeStack::new();
        scopes.push_frame();
        scopes.set_scalar("y", b"v".to_vec()).unwrap();
        scopes.pop_frame();
        assert_eq!(scopes.get_scalar("y"), Some(&b"v"[..]));
    }

    #[test]
    fn test_readonly_blocks_write_and_unset() {
        let mut scopes = ScopeStack::new();
        scopes.set_scalar("r", b"v".to_vec()).unwrap();
        scopes.set_readonly("r");
        assert!(scopes.set_scalar("r", b"other".to_vec()).is_err());
        assert!(scopes.unset("r").is_err());
    }

    #[test]
    fn test_append() {
        let mut scopes = ScopeStack::new();
        scopes.set_scalar("s", b"ab".to_vec()).unwrap();
        scopes.append_scalar("s", b"cd").unwrap();
        assert_eq!(scopes.get_scalar("s"), Some(&b"abcd"[..]));
        scopes.append_scalar("fresh", b"x").unwrap();
        assert_eq!(scopes.get_scalar("fresh"), Some(&b"x"[..]));
    }

    #[test]
    fn test_indexed_array() {
        let mut scopes = ScopeStack::new();
        scopes.set_array("a", vec![b"x".to_vec(), b"y".to_vec()]).unwrap();
        scopes.set_index("a", 5, b"z".to_vec()).unwrap();
        match &scopes.get("a").unwrap().value {
            VarValue::Indexed(map) => {
                assert_eq!(map.get(&0), Some(&b"x".to_vec()));
                assert_eq!(map.get(&5), Some(&b"z".to_vec()));
                assert_eq!(map.len(), 3);
            }
            other => panic!("unexpected: {:?}", other),
        }
        // Unsubscripted use yields element 0.
        assert_eq!(scopes.get_scalar("a"), Some(&b"x"[..]));
    }

    #[test]
    fn test_scalar_promotes_to_array() {
        let mut scopes = ScopeStack::new();
        scopes.set_scalar("a", b"first".to_vec()).unwrap();
        scopes.set_index("a", 1, b"second".to_vec()).unwrap();
        match &scopes.get("a").unwrap().value {
            VarValue::Indexed(map) => {
                assert_eq!(map.get(&0), Some(&b"first".to_vec()));
                assert_eq!(map.get(&1), Some(&b"second".to_vec()));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_exported_env() {
        let mut scopes = ScopeStack::new();
        scopes.set_scalar("VISIBLE", b"1".to_vec()).unwrap();
        scopes.set_scalar("HIDDEN", b"2".to_vec()).unwrap();
        scopes.set_exported("VISIBLE", true);
        let env = scopes.exported_env();
        assert_eq!(env.get("VISIBLE"), Some(&"1".to_string()));
        assert!(!env.contains_key("HIDDEN"));
    }

    #[test]
    fn test_unset_removes_innermost() {
        let mut scopes = ScopeStack::new();
        scopes.set_scalar("x", b"g".to_vec()).unwrap();
        scopes.push_frame();
        scopes.set_local("x", Some(b"l".to_vec())).unwrap();
        scopes.unset("x").unwrap();
        // The global binding shows through again.
        assert_eq!(scopes.get_scalar("x"), Some(&b"g"[..]));
    }

    #[test]
    fn test_raw_bytes_survive() {
        let mut scopes = ScopeStack::new();
        scopes.set_scalar("raw", vec![0xff, 0x00]).unwrap();
        assert_eq!(scopes.get_scalar("raw"), Some(&[0xff, 0x00][..]));
    }
}
