//! Run-scoped variable store with nested scopes for loop bodies

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};

/// `{{identifier}}` placeholders; anything else is left verbatim
static PLACEHOLDER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([A-Za-z_][A-Za-z0-9_]*)\}\}").unwrap());

static IDENTIFIER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Whether `name` can be referenced from a `{{...}}` placeholder
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER_PATTERN.is_match(name)
}

/// Handle to a scope inside a [`VariableStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

#[derive(Debug, Clone, Default)]
struct Scope {
    parent: Option<ScopeId>,
    values: HashMap<String, Value>,
}

/// Arena of scopes linked by parent pointers.
///
/// The root scope holds the run inputs and everything steps write. Loop
/// iterations push a child scope where the item/index bindings live; reads
/// fall through to the parents, writes land in the nearest scope that already
/// defines the name (or the root when none does).
#[derive(Debug, Clone)]
pub struct VariableStore {
    scopes: Vec<Scope>,
}

impl Default for VariableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableStore {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    /// Create a store whose root scope is seeded with the run inputs
    pub fn with_inputs(inputs: Map<String, Value>) -> Self {
        let mut store = Self::new();
        store.scopes[0].values.extend(inputs);
        store
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Open a child scope of `parent`
    pub fn push_scope(&mut self, parent: ScopeId) -> ScopeId {
        self.scopes.push(Scope {
            parent: Some(parent),
            values: HashMap::new(),
        });
        ScopeId(self.scopes.len() - 1)
    }

    /// Discard `scope` and every scope opened after it. The root is never popped.
    pub fn pop_scope(&mut self, scope: ScopeId) {
        if scope.0 > 0 && scope.0 < self.scopes.len() {
            self.scopes.truncate(scope.0);
        }
    }

    /// Look a name up in `scope` and then its ancestors
    pub fn get(&self, scope: ScopeId, name: &str) -> Option<&Value> {
        let mut current = Some(scope);

        while let Some(id) = current {
            let frame = self.scopes.get(id.0)?;

            if let Some(value) = frame.values.get(name) {
                return Some(value);
            }
            current = frame.parent;
        }

        None
    }

    pub fn contains(&self, scope: ScopeId, name: &str) -> bool {
        self.get(scope, name).is_some()
    }

    /// Write through to the nearest scope defining `name`, else to the root
    pub fn set(&mut self, scope: ScopeId, name: impl Into<String>, value: Value) {
        let name = name.into();
        let target = self.defining_scope(scope, &name).unwrap_or(ScopeId(0));

        if let Some(frame) = self.scopes.get_mut(target.0) {
            frame.values.insert(name, value);
        }
    }

    /// Bind `name` in `scope` only, shadowing any outer definition
    pub fn bind(&mut self, scope: ScopeId, name: impl Into<String>, value: Value) {
        if let Some(frame) = self.scopes.get_mut(scope.0) {
            frame.values.insert(name.into(), value);
        }
    }

    /// Flattened view of everything visible from `scope`, inner bindings winning
    pub fn snapshot(&self, scope: ScopeId) -> Map<String, Value> {
        let mut chain = Vec::new();
        let mut current = Some(scope);

        while let Some(id) = current {
            match self.scopes.get(id.0) {
                Some(frame) => {
                    chain.push(frame);
                    current = frame.parent;
                }
                None => break,
            }
        }

        let mut merged = Map::new();
        for frame in chain.into_iter().rev() {
            for (name, value) in &frame.values {
                merged.insert(name.clone(), value.clone());
            }
        }
        merged
    }

    /// Replace every `{{name}}` whose name resolves from `scope`.
    ///
    /// Single pass: substituted text is never re-scanned, and unresolved
    /// placeholders are kept as written.
    pub fn interpolate(&self, scope: ScopeId, template: &str) -> String {
        PLACEHOLDER_PATTERN
            .replace_all(template, |caps: &Captures| match self.get(scope, &caps[1]) {
                Some(value) => render_value(value),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// Interpolate every string nested inside a JSON value
    pub fn interpolate_value(&self, scope: ScopeId, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.interpolate(scope, s)),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.interpolate_value(scope, item))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.interpolate_value(scope, v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn defining_scope(&self, scope: ScopeId, name: &str) -> Option<ScopeId> {
        let mut current = Some(scope);

        while let Some(id) = current {
            let frame = self.scopes.get(id.0)?;

            if frame.values.contains_key(name) {
                return Some(id);
            }
            current = frame.parent;
        }

        None
    }
}

/// Textual form of a value when spliced into a template
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),

        // For arrays and objects, use JSON representation
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
