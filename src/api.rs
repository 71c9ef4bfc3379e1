use crate::engine::{Engine, ProfileName, ScanMetrics};
use crate::error::Result;
use crate::output::Document;
use std::time::Duration;

/// Engine-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Suppress `<br>` for line breaks everywhere.
    pub nobr: bool,
    /// Maximum wikify nesting before an inline error replaces the nested output.
    pub max_call_depth: usize,
    /// Iteration cap for `<<for>>` loops.
    pub max_loop_iterations: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config { nobr: false, max_call_depth: 100, max_loop_iterations: 1000 }
    }
}

/// Options in effect for one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Options {
    /// Which grammar rules are active.
    pub profile: ProfileName,
    /// Line breaks produce nothing instead of `<br>`.
    pub nobr: bool,
    /// Terminator patterns match case-insensitively (used for HTML closing tags).
    pub ignore_terminator_case: bool,
}

impl Options {
    /// Overwrites every option the overrides set.
    pub fn apply(&mut self, overrides: &OptionOverrides) {
        if let Some(profile) = overrides.profile {
            self.profile = profile;
        }
        if let Some(nobr) = overrides.nobr {
            self.nobr = nobr;
        }
        if let Some(ignore) = overrides.ignore_terminator_case {
            self.ignore_terminator_case = ignore;
        }
    }
}

/// Partial [`Options`], as pushed on the engine's option stack or passed to `sub_wikify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptionOverrides {
    pub profile: Option<ProfileName>,
    pub nobr: Option<bool>,
    pub ignore_terminator_case: Option<bool>,
}

impl OptionOverrides {
    pub fn nobr() -> Self {
        OptionOverrides { nobr: Some(true), ..Default::default() }
    }

    /// `self` with every field `other` sets replaced.
    pub fn merged(&self, other: &OptionOverrides) -> Self {
        OptionOverrides {
            profile: other.profile.or(self.profile),
            nobr: other.nobr.or(self.nobr),
            ignore_terminator_case: other.ignore_terminator_case.or(self.ignore_terminator_case),
        }
    }
}

/// Result from [`wikify`] and [`wikify_with`].
#[derive(Debug, Clone)]
pub struct WikifyResult {
    /// The wikified source text.
    pub text: String,
    pub document: Document,
    /// The document serialized as HTML.
    pub html: String,
    /// Messages of the inline error markers, in document order.
    pub errors: Vec<String>,
    pub elapsed: Duration,
}

/// How often one grammar rule or macro ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleHit {
    pub name: String,
    pub count: usize,
}

/// Additional details returned by [`wikify_verbose`] and [`wikify_verbose_with`].
#[derive(Debug, Clone)]
pub struct WikifyDetails {
    pub total: Duration,
    /// Grammar rules that fired, most frequent first.
    pub rule_hits: Vec<RuleHit>,
    /// Macros that ran, most frequent first.
    pub macro_calls: Vec<RuleHit>,
    /// Scan loops run, nested ones included.
    pub scans: usize,
    pub max_depth: usize,
    /// Names of the grammar rules registered on the engine, in registration order.
    pub active_rules: Vec<String>,
}

/// Result from [`wikify_verbose`] and [`wikify_verbose_with`].
#[derive(Debug, Clone)]
pub struct WikifyResultVerbose {
    pub result: WikifyResult,
    pub details: WikifyDetails,
}

/// Wikify `text` with a default engine (in-memory store, no passages, built-in rules and macros).
///
/// # Example
/// ```
/// use storymark::wikify;
///
/// let out = wikify("''bold'' <<set $n to 2>><<print $n * 2>>").unwrap();
/// assert_eq!(out.html, "<strong>bold</strong> 4");
/// ```
pub fn wikify(text: &str) -> Result<WikifyResult> {
    wikify_with(&Engine::with_defaults()?, text)
}

/// Wikify `text` with the provided engine.
pub fn wikify_with(engine: &Engine, text: &str) -> Result<WikifyResult> {
    let (document, metrics) = engine.wikify_verbose(text)?;
    Ok(into_result(text, document, &metrics))
}

pub fn wikify_verbose(text: &str) -> Result<WikifyResultVerbose> {
    wikify_verbose_with(&Engine::with_defaults()?, text)
}

/// Wikify `text` with `engine` and return rule and macro statistics.
pub fn wikify_verbose_with(engine: &Engine, text: &str) -> Result<WikifyResultVerbose> {
    let (document, metrics) = engine.wikify_verbose(text)?;

    let details = WikifyDetails {
        total: metrics.total,
        rule_hits: ranked(&metrics.rule_hits),
        macro_calls: ranked(&metrics.macro_calls),
        scans: metrics.scans,
        max_depth: metrics.max_depth,
        active_rules: engine.grammar_rule_names(),
    };

    Ok(WikifyResultVerbose { result: into_result(text, document, &metrics), details })
}

fn into_result(text: &str, document: Document, metrics: &ScanMetrics) -> WikifyResult {
    let root = document.root();
    WikifyResult {
        text: text.to_string(),
        html: document.to_html(root),
        errors: document.errors(root),
        document,
        elapsed: metrics.total,
    }
}

fn ranked(counts: &std::collections::BTreeMap<String, usize>) -> Vec<RuleHit> {
    let mut hits: Vec<RuleHit> = counts.iter().map(|(name, &count)| RuleHit { name: name.clone(), count }).collect();
    hits.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wikify_returns_html_and_errors() {
        let res = wikify("plain <<nosuchmacro>> text").unwrap();

        assert_eq!(res.text, "plain <<nosuchmacro>> text");
        assert!(res.elapsed >= Duration::ZERO);
        assert_eq!(res.errors, vec!["macro <<nosuchmacro>> does not exist"]);
        assert!(res.html.starts_with("plain <mark class=\"error\""));
        assert!(res.html.ends_with(" text"));
    }

    #[test]
    fn wikify_verbose_ranks_hits() {
        let res = wikify_verbose("a\nb\nc ''d''").unwrap();

        assert_eq!(res.details.rule_hits[0], RuleHit { name: "lineBreak".into(), count: 2 });
        assert!(res.details.total <= res.result.elapsed || res.details.total == res.result.elapsed);
        assert!(res.details.active_rules.iter().any(|r| r == "macro"));
        assert_eq!(res.details.max_depth, 1);
    }

    #[test]
    fn overrides_merge_later_over_earlier() {
        let base = OptionOverrides { profile: Some(ProfileName::Core), nobr: Some(false), ..Default::default() };
        let merged = base.merged(&OptionOverrides::nobr());
        assert_eq!(merged.profile, Some(ProfileName::Core));
        assert_eq!(merged.nobr, Some(true));

        let mut options = Options::default();
        options.apply(&merged);
        assert!(options.nobr);
        assert_eq!(options.profile, ProfileName::Core);
        assert!(!options.ignore_terminator_case);
    }
}
