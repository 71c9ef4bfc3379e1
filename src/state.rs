//! Host collaborators: the variable store and the passage repository.
//!
//! The engine only ever talks to these through the [`VariableStore`] and [`PassageStore`] traits. The
//! in-memory [`Variables`] and [`Story`] types are what [`Engine::with_defaults`](crate::Engine::with_defaults)
//! uses and what tests run against.

use crate::Value;
use std::collections::{BTreeMap, HashMap};

/// A variable name split into its namespace and bare name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarName<'a> {
    /// `$name`: persistent story variable.
    Story(&'a str),
    /// `_name`: temporary variable, scoped to the current moment.
    Temporary(&'a str),
}

impl<'a> VarName<'a> {
    /// Splits a sigiled name (`$gold`, `_i`). Returns `None` when the name is not a variable reference.
    pub fn parse(name: &'a str) -> Option<Self> {
        if !is_variable_name(name) {
            return None;
        }
        match name.as_bytes()[0] {
            b'$' => Some(VarName::Story(&name[1..])),
            b'_' => Some(VarName::Temporary(&name[1..])),
            _ => None,
        }
    }
}

/// True when `name` is a full, sigiled variable name like `$gold` or `_i`.
pub fn is_variable_name(name: &str) -> bool {
    regex!(r"^[$_][$A-Z_a-z][$0-9A-Z_a-z]*$").is_match(name)
}

/// Storage for story (`$`) and temporary (`_`) variables.
///
/// Names passed to every method carry their sigil.
pub trait VariableStore {
    fn get(&self, name: &str) -> Option<Value>;

    fn set(&mut self, name: &str, value: Value);

    /// Deletes a binding, returning its previous value.
    fn remove(&mut self, name: &str) -> Option<Value>;

    fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// In-memory variable store.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    story: BTreeMap<String, Value>,
    temporary: BTreeMap<String, Value>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every temporary variable.
    pub fn clear_temporary(&mut self) {
        self.temporary.clear();
    }

    pub fn story_names(&self) -> impl Iterator<Item = &str> {
        self.story.keys().map(String::as_str)
    }
}

impl VariableStore for Variables {
    fn get(&self, name: &str) -> Option<Value> {
        match VarName::parse(name)? {
            VarName::Story(bare) => self.story.get(bare).cloned(),
            VarName::Temporary(bare) => self.temporary.get(bare).cloned(),
        }
    }

    fn set(&mut self, name: &str, value: Value) {
        match VarName::parse(name) {
            Some(VarName::Story(bare)) => {
                self.story.insert(bare.to_string(), value);
            }
            Some(VarName::Temporary(bare)) => {
                self.temporary.insert(bare.to_string(), value);
            }
            None => tracing::debug!(name, "ignoring assignment to a non-variable name"),
        }
    }

    fn remove(&mut self, name: &str) -> Option<Value> {
        match VarName::parse(name)? {
            VarName::Story(bare) => self.story.remove(bare),
            VarName::Temporary(bare) => self.temporary.remove(bare),
        }
    }
}

/// A story passage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passage {
    pub title: String,
    pub tags: Vec<String>,
    pub text: String,
}

impl Passage {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Passage { title: title.into(), tags: Vec::new(), text: text.into() }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Read access to the story's passages.
pub trait PassageStore {
    fn get(&self, title: &str) -> Option<&Passage>;

    fn has(&self, title: &str) -> bool {
        self.get(title).is_some()
    }
}

/// In-memory passage repository.
#[derive(Debug, Clone, Default)]
pub struct Story {
    passages: HashMap<String, Passage>,
}

impl Story {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, passage: Passage) -> &mut Self {
        self.passages.insert(passage.title.clone(), passage);
        self
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

impl FromIterator<Passage> for Story {
    fn from_iter<I: IntoIterator<Item = Passage>>(iter: I) -> Self {
        let mut story = Story::new();
        for passage in iter {
            story.add(passage);
        }
        story
    }
}

impl PassageStore for Story {
    fn get(&self, title: &str) -> Option<&Passage> {
        self.passages.get(title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variables_keep_namespaces_apart() {
        let mut vars = Variables::new();
        vars.set("$x", Value::Number(1.0));
        vars.set("_x", Value::Number(2.0));

        assert_eq!(vars.get("$x"), Some(Value::Number(1.0)));
        assert_eq!(vars.get("_x"), Some(Value::Number(2.0)));
        assert_eq!(vars.get("x"), None);

        vars.clear_temporary();
        assert!(!vars.has("_x"));
        assert_eq!(vars.remove("$x"), Some(Value::Number(1.0)));
        assert!(!vars.has("$x"));
    }

    #[test]
    fn var_name_requires_sigil_and_identifier() {
        assert_eq!(VarName::parse("$gold"), Some(VarName::Story("gold")));
        assert_eq!(VarName::parse("_i"), Some(VarName::Temporary("i")));
        assert_eq!(VarName::parse("$"), None);
        assert_eq!(VarName::parse("$1up"), None);
        assert_eq!(VarName::parse("gold"), None);
    }

    #[test]
    fn story_lookup() {
        let story: Story = [Passage::new("Start", "Hello"), Passage::new("Cave", "Dark").with_tags(&["dark"])]
            .into_iter()
            .collect();

        assert!(story.has("Start"));
        assert!(!story.has("start"));
        assert!(story.get("Cave").is_some_and(|p| p.has_tag("dark")));
        assert_eq!(story.len(), 2);
    }
}
