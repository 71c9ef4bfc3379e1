//! The scan loop.
//!
//! A [`Wikifier`] walks one source string and appends to a [`Document`]. Each iteration looks for the
//! nearest of two things from the current position:
//!
//! - a match of the active profile's combined pattern (some grammar rule wants to handle the text there);
//! - a match of the current terminator (the construct being scanned ends there).
//!
//! ```text
//! source:  "''bold //and italic// text'' after"
//!           ^^ formatByChar fires, sub_wikify(<strong>, terminator "''")
//!                 ^^ formatByChar fires again, sub_wikify(<em>, terminator "//")
//!                              ^^ terminator "//": return to the <strong> scan
//!                                        ^^ terminator "''": return to the top-level scan
//! ```
//!
//! A terminator match wins ties with a rule match at the same offset. Text between matches is emitted as
//! plain text nodes.
//!
//! ## Abort signal
//!
//! Loop macros set [`ScanAbort`](super::ScanAbort) on the engine. The loop checks it after every handler;
//! once set, every enclosing scan stops as well (removing a trailing `<br>` it may have left) until the
//! loop macro takes the signal.
//!
//! ## Restoration
//!
//! `sub_wikify` swaps the output node and the options for the duration of the nested scan and puts them
//! back on every exit path, errors included.

use crate::api::{OptionOverrides, Options};
use crate::error::{Error, Result};
use crate::output::{Document, NodeId};
use crate::{Engine, GrammarRule};
use regex::Regex;
use std::rc::Rc;

/// Scan state handed to grammar rule handlers.
pub struct Wikifier<'a> {
    engine: &'a Engine,
    doc: &'a mut Document,
    source: &'a str,
    options: Options,
    output: NodeId,
    /// Where scanning resumes once the current handler returns.
    pub next_match: usize,
    /// Offset of the match being handled.
    pub match_start: usize,
    pub match_length: usize,
}

impl<'a> Wikifier<'a> {
    pub(crate) fn new(
        engine: &'a Engine,
        doc: &'a mut Document,
        source: &'a str,
        options: Options,
        output: NodeId,
    ) -> Self {
        Wikifier { engine, doc, source, options, output, next_match: 0, match_start: 0, match_length: 0 }
    }

    pub fn engine(&self) -> &'a Engine {
        self.engine
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    pub fn doc(&mut self) -> &mut Document {
        &mut *self.doc
    }

    pub fn document(&self) -> &Document {
        &*self.doc
    }

    /// The node currently being appended to.
    pub fn output(&self) -> NodeId {
        self.output
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Text of the match being handled.
    pub fn match_text(&self) -> &'a str {
        &self.source[self.match_start..self.match_start + self.match_length]
    }

    /// Scans from `next_match` into `output` until `terminator` matches or the source ends.
    ///
    /// `overrides` are merged over the current options (and the engine's option stack) for this scan only.
    pub fn sub_wikify(
        &mut self,
        output: NodeId,
        terminator: Option<&str>,
        overrides: Option<&OptionOverrides>,
    ) -> Result<()> {
        let old_output = std::mem::replace(&mut self.output, output);
        let old_options = self.options;

        self.options.apply(&self.engine.option_overrides());
        if let Some(overrides) = overrides {
            self.options.apply(overrides);
        }

        let result = self.scan(terminator);

        self.output = old_output;
        self.options = old_options;
        result
    }

    fn scan(&mut self, terminator: Option<&str>) -> Result<()> {
        let profile = self.engine.compile_profile(self.options.profile)?;
        let terminator = match terminator {
            Some(pattern) => Some(self.engine.terminator_regex(pattern, self.options.ignore_terminator_case)?),
            None => None,
        };
        self.engine.record_scan();

        loop {
            let terminator_match = terminator.as_ref().and_then(|re| re.find_at(self.source, self.next_match));
            let rule_match = profile.regex.as_ref().and_then(|re| re.captures_at(self.source, self.next_match));

            if let Some(term) = terminator_match {
                if rule_match.as_ref().and_then(|caps| caps.get(0)).is_none_or(|m| term.start() <= m.start()) {
                    if term.start() > self.next_match {
                        self.output_text(self.output, self.next_match, term.start());
                    }
                    self.match_start = term.start();
                    self.match_length = term.len();
                    self.next_match = term.end();
                    return Ok(());
                }
            }

            let Some(caps) = rule_match else {
                if self.next_match < self.source.len() {
                    self.output_text(self.output, self.next_match, self.source.len());
                    self.next_match = self.source.len();
                }
                return Ok(());
            };

            let Some(whole) = caps.get(0) else { return Ok(()) };
            if whole.start() > self.next_match {
                self.output_text(self.output, self.next_match, whole.start());
            }
            self.match_start = whole.start();
            self.match_length = whole.len();
            self.next_match = whole.end();

            let Some(index) = (1..caps.len()).find(|&i| caps.get(i).is_some()) else {
                return Err(Error::handler("profile match without a participating rule group"));
            };
            let rule: Rc<GrammarRule> = Rc::clone(&profile.rules[index - 1]);
            tracing::trace!(rule = %rule.name, at = self.match_start, text = self.match_text(), "rule matched");
            self.engine.record_rule_hit(&rule.name);

            (rule.handler)(self, &*rule)?;

            if self.engine.abort_signal().is_some() {
                self.doc.remove_last_child_if(self.output, "br");
                return Ok(());
            }

            // An empty match the handler did not move past is taken as one character of text.
            if self.match_length == 0 && self.next_match <= self.match_start {
                let Some(c) = self.source[self.match_start..].chars().next() else { return Ok(()) };
                let end = self.match_start + c.len_utf8();
                self.output_text(self.output, self.match_start, end);
                self.next_match = end;
            }
        }
    }

    /// Appends `source[start..end]` as a text node under `dest`.
    pub fn output_text(&mut self, dest: NodeId, start: usize, end: usize) {
        self.doc.append_text(dest, &self.source[start..end]);
    }

    /// Wikifies an unrelated source string into `dest` with fresh options.
    pub fn wikify_into(&mut self, dest: NodeId, source: &str) -> Result<()> {
        let options = self.engine.default_options();
        self.engine.run_wikifier(&mut *self.doc, dest, source, options)
    }

    /// Appends an inline error marker to `dest`.
    pub fn error(&mut self, dest: NodeId, message: &str, source: &str) -> NodeId {
        tracing::debug!(message, source, "inline markup error");
        self.engine.record_error();
        self.doc.append_error(dest, message, source)
    }
}

/// `(?m)(?:terminator)`, case-insensitive on request.
pub(crate) fn compile_terminator(pattern: &str, ignore_case: bool) -> Result<Regex> {
    let flags = if ignore_case { "(?mi)" } else { "(?m)" };
    Regex::new(&format!("{flags}(?:{pattern})"))
        .map_err(|err| Error::handler(format!("invalid terminator pattern \"{pattern}\": {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ScanAbort;
    use crate::{OptionOverrides, ProfileName};
    use std::cell::RefCell;

    /// Engine without built-in rules, plus a few rules that make the scan loop observable.
    fn engine() -> Engine {
        let engine = Engine::builder().bare().build().unwrap();
        engine
            .register_grammar_rule(rule! {
                name: "bold",
                pattern: "''",
                terminator: "''",
                handler: |w, r| {
                    let out = w.output();
                    let el = w.doc().create_element(out, "strong");
                    w.sub_wikify(el, r.terminator, None)
                }
            })
            .unwrap();
        engine
            .register_grammar_rule(rule! {
                name: "stop",
                pattern: "!stop",
                handler: |w, _r| {
                    w.engine().signal_abort(ScanAbort::Break);
                    Ok(())
                }
            })
            .unwrap();
        engine
            .register_grammar_rule(rule! {
                name: "br",
                pattern: "\\n",
                handler: |w, _r| {
                    let out = w.output();
                    w.doc().create_element(out, "br");
                    Ok(())
                }
            })
            .unwrap();
        engine
    }

    #[test]
    fn text_without_matches_is_one_text_node() {
        let doc = engine().wikify("just words").unwrap();
        assert_eq!(doc.to_html(doc.root()), "just words");
    }

    #[test]
    fn handlers_recurse_with_a_terminator() {
        let doc = engine().wikify("a ''b'' c").unwrap();
        assert_eq!(doc.to_html(doc.root()), "a <strong>b</strong> c");
    }

    #[test]
    fn unterminated_construct_runs_to_the_end() {
        let doc = engine().wikify("a ''b").unwrap();
        assert_eq!(doc.to_html(doc.root()), "a <strong>b</strong>");
    }

    #[test]
    fn abort_stops_enclosing_scans_and_drops_a_trailing_break() {
        let engine = engine();
        let doc = engine.wikify("one\n''two\n!stop three'' four").unwrap();
        assert_eq!(doc.to_html(doc.root()), "one<br><strong>two</strong>");
        assert_eq!(engine.take_abort(), Some(ScanAbort::Break));
    }

    #[test]
    fn terminator_wins_ties() {
        let engine = Engine::builder().bare().build().unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_in = Rc::clone(&seen);
        engine
            .register_grammar_rule(GrammarRule::new("open", "\\(", |w, _| {
                let out = w.output();
                let el = w.doc().create_element(out, "span");
                w.sub_wikify(el, Some("\\)"), None)
            }))
            .unwrap();
        engine
            .register_grammar_rule(GrammarRule::new("close", "\\)", move |w, _| {
                seen_in.borrow_mut().push(w.match_start);
                Ok(())
            }))
            .unwrap();

        let doc = engine.wikify("(x) )").unwrap();
        assert_eq!(doc.to_html(doc.root()), "<span>x</span> ");
        assert_eq!(*seen.borrow(), vec![4]);
    }

    #[test]
    fn zero_length_matches_advance() {
        let engine = Engine::builder().bare().build().unwrap();
        engine.register_grammar_rule(GrammarRule::new("empty", "(?:)", |_, _| Ok(()))).unwrap();
        let doc = engine.wikify("abc").unwrap();
        assert_eq!(doc.text_content(doc.root()), "abc");
    }

    #[test]
    fn options_are_restored_after_a_failing_handler() {
        let engine = Engine::builder().bare().build().unwrap();
        engine
            .register_grammar_rule(GrammarRule::new("fail", "#", |w, _| {
                let overrides = OptionOverrides { nobr: Some(true), ..Default::default() };
                let out = w.output();
                w.sub_wikify(out, Some("\\$"), Some(&overrides))?;
                Err(crate::Error::handler("boom"))
            }))
            .unwrap();

        let mut doc = Document::new();
        let root = doc.root();
        let mut w = Wikifier::new(&engine, &mut doc, "#x$", engine.default_options(), root);
        assert!(w.sub_wikify(root, None, None).is_err());
        assert!(!w.options().nobr);
        assert_eq!(w.options().profile, ProfileName::All);
        assert_eq!(w.output(), root);
    }

    #[test]
    fn case_insensitive_terminators() {
        let re = compile_terminator("</b\\s*>", true).unwrap();
        assert!(re.is_match("text</B >"));
        assert!(!compile_terminator("</b\\s*>", false).unwrap().is_match("</B>"));
        assert!(compile_terminator("(", false).is_err());
    }
}
