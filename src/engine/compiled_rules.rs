//! Grammar rule registry and profile compilation.
//!
//! This module holds the *static* side of the engine: the ordered list of registered grammar rules and
//! the profiles compiled from it.
//!
//! A profile is a subset of the rules joined into one alternation, one capture group per rule, in
//! registration order:
//!
//! ```text
//! rules:    macro  "<<"       link  "\[\[[^\[]"      lineBreak  "\n|<[Bb][Rr]\s*/?>"
//! profile:  (?m)(<<)|(\[\[[^\[])|(\n|<[Bb][Rr]\s*/?>)
//!              group 1    group 2        group 3
//! ```
//!
//! The scan loop identifies the rule that fired by the index of the group that participated in the match.
//! Leftmost match wins; among rules matching at the same offset, the earlier registration wins.
//!
//! ## Invariants
//!
//! - Rule fragments contain no capturing groups of their own, so group `i + 1` always belongs to
//!   `Profile::rules[i]`. [`ParserRegistry::register`] rejects fragments that break this.
//! - A compiled profile never changes. Registering or removing rules after compilation has no effect on it
//!   until [`ParserRegistry::invalidate`] drops the cache.

use crate::GrammarRule;
use crate::error::RegistryError;
use regex::Regex;
use std::collections::HashMap;
use std::rc::Rc;

bitflags::bitflags! {
    /// Profiles a rule belongs to. The empty set means every profile.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ProfileSet: u8 {
        /// Inline rules valid anywhere.
        const CORE  = 1 << 0;
        /// Line-oriented rules (headings, lists, block quotes).
        const BLOCK = 1 << 1;
    }
}

/// Name of a compiled profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProfileName {
    /// Rules with no declared profile plus those declaring `CORE`.
    Core,
    /// Rules with no declared profile plus those declaring `BLOCK`.
    Block,
    /// Every registered rule.
    #[default]
    All,
}

impl ProfileName {
    pub fn as_str(self) -> &'static str {
        match self {
            ProfileName::Core => "core",
            ProfileName::Block => "block",
            ProfileName::All => "all",
        }
    }

    fn includes(self, rule: &GrammarRule) -> bool {
        match self {
            ProfileName::All => true,
            ProfileName::Core => rule.profiles.is_empty() || rule.profiles.contains(ProfileSet::CORE),
            ProfileName::Block => rule.profiles.is_empty() || rule.profiles.contains(ProfileSet::BLOCK),
        }
    }
}

impl std::str::FromStr for ProfileName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "core" => Ok(ProfileName::Core),
            "block" => Ok(ProfileName::Block),
            "all" => Ok(ProfileName::All),
            other => Err(format!("unknown profile '{other}'")),
        }
    }
}

/// A compiled profile: its rules in registration order and their combined pattern.
#[derive(Debug)]
pub struct Profile {
    pub name: ProfileName,
    pub rules: Vec<Rc<GrammarRule>>,
    /// `None` when the profile has no rules.
    pub regex: Option<Regex>,
}

/// Ordered collection of grammar rules plus the cache of compiled profiles.
#[derive(Debug, Default)]
pub struct ParserRegistry {
    rules: Vec<Rc<GrammarRule>>,
    profiles: HashMap<ProfileName, Rc<Profile>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule. Fails on a duplicate name or an unusable match fragment.
    pub fn register(&mut self, rule: GrammarRule) -> Result<(), RegistryError> {
        if self.has(&rule.name) {
            return Err(RegistryError::Duplicate { kind: "grammar rule", name: rule.name });
        }

        let invalid = |reason: String| RegistryError::InvalidRule { name: rule.name.clone(), reason };
        if rule.pattern.is_empty() {
            return Err(invalid("empty match fragment".into()));
        }
        let re = Regex::new(&rule.pattern).map_err(|err| invalid(err.to_string()))?;
        if re.captures_len() != 1 {
            return Err(invalid("match fragments must not contain capturing groups".into()));
        }

        self.rules.push(Rc::new(rule));
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> Option<Rc<GrammarRule>> {
        let idx = self.rules.iter().position(|r| r.name == name)?;
        Some(self.rules.remove(idx))
    }

    pub fn get(&self, name: &str) -> Option<Rc<GrammarRule>> {
        self.rules.iter().find(|r| r.name == name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.rules.iter().any(|r| r.name == name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name.as_str())
    }

    /// Returns the cached profile, compiling it on first use.
    pub fn compile(&mut self, name: ProfileName) -> Result<Rc<Profile>, RegistryError> {
        if let Some(profile) = self.profiles.get(&name) {
            return Ok(Rc::clone(profile));
        }

        let rules: Vec<Rc<GrammarRule>> = self.rules.iter().filter(|r| name.includes(r)).cloned().collect();
        let regex = if rules.is_empty() {
            None
        } else {
            let alternation: Vec<String> = rules.iter().map(|r| format!("({})", r.pattern)).collect();
            let pattern = format!("(?m){}", alternation.join("|"));
            let re = Regex::new(&pattern).map_err(|err| RegistryError::InvalidRule {
                name: format!("profile {}", name.as_str()),
                reason: err.to_string(),
            })?;
            Some(re)
        };

        tracing::debug!(profile = name.as_str(), rules = rules.len(), "compiled parser profile");

        let profile = Rc::new(Profile { name, rules, regex });
        self.profiles.insert(name, Rc::clone(&profile));
        Ok(profile)
    }

    pub fn is_compiled(&self, name: ProfileName) -> bool {
        self.profiles.contains_key(&name)
    }

    /// Drops every compiled profile so the next use recompiles from the current rule list.
    pub fn invalidate(&mut self) {
        self.profiles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, pattern: &str, profiles: ProfileSet) -> GrammarRule {
        GrammarRule::new(name, pattern, |_, _| Ok(())).with_profiles(profiles)
    }

    #[test]
    fn rejects_duplicates_and_bad_fragments() {
        let mut reg = ParserRegistry::new();
        reg.register(rule("a", "x", ProfileSet::empty())).unwrap();

        assert!(matches!(reg.register(rule("a", "y", ProfileSet::empty())), Err(RegistryError::Duplicate { .. })));
        assert!(matches!(reg.register(rule("b", "", ProfileSet::empty())), Err(RegistryError::InvalidRule { .. })));
        assert!(matches!(reg.register(rule("c", "(x)", ProfileSet::empty())), Err(RegistryError::InvalidRule { .. })));
        assert!(matches!(reg.register(rule("d", "[", ProfileSet::empty())), Err(RegistryError::InvalidRule { .. })));
        assert!(reg.register(rule("e", "(?:x)", ProfileSet::empty())).is_ok());
    }

    #[test]
    fn profiles_filter_by_membership() {
        let mut reg = ParserRegistry::new();
        reg.register(rule("anywhere", "a", ProfileSet::empty())).unwrap();
        reg.register(rule("inline", "b", ProfileSet::CORE)).unwrap();
        reg.register(rule("line", "^c", ProfileSet::BLOCK)).unwrap();

        let names = |p: &Profile| p.rules.iter().map(|r| r.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(&reg.compile(ProfileName::Core).unwrap()), vec!["anywhere", "inline"]);
        assert_eq!(names(&reg.compile(ProfileName::Block).unwrap()), vec!["anywhere", "line"]);
        assert_eq!(names(&reg.compile(ProfileName::All).unwrap()), vec!["anywhere", "inline", "line"]);
    }

    #[test]
    fn group_index_identifies_the_rule() {
        let mut reg = ParserRegistry::new();
        reg.register(rule("bold", "''", ProfileSet::empty())).unwrap();
        reg.register(rule("dash", "--", ProfileSet::empty())).unwrap();

        let profile = reg.compile(ProfileName::All).unwrap();
        let caps = profile.regex.as_ref().unwrap().captures("x -- ''").unwrap();
        let idx = (1..caps.len()).find(|&i| caps.get(i).is_some()).unwrap();
        assert_eq!(profile.rules[idx - 1].name, "dash");
    }

    #[test]
    fn compiled_profiles_are_frozen_until_invalidated() {
        let mut reg = ParserRegistry::new();
        reg.register(rule("a", "a", ProfileSet::empty())).unwrap();
        let first = reg.compile(ProfileName::All).unwrap();

        reg.register(rule("b", "b", ProfileSet::empty())).unwrap();
        reg.unregister("a");
        assert!(Rc::ptr_eq(&first, &reg.compile(ProfileName::All).unwrap()));
        assert_eq!(first.rules.len(), 1);

        reg.invalidate();
        let second = reg.compile(ProfileName::All).unwrap();
        assert_eq!(second.rules.len(), 1);
        assert_eq!(second.rules[0].name, "b");
    }

    #[test]
    fn empty_profile_has_no_pattern() {
        let mut reg = ParserRegistry::new();
        assert!(reg.compile(ProfileName::Core).unwrap().regex.is_none());
    }
}
