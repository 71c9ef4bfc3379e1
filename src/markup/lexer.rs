//! State-function lexer shared by the argument and square-bracket lexers.
//!
//! Each state is a function that consumes some input, optionally emits items, and returns the next state
//! (or `None` to stop). The lexer keeps a `start..pos` window over the source: `emit` turns the window into an
//! item and moves `start` up to `pos`.
//!
//! ```text
//! source: [[Go|Cave]]
//!         ^start  ^pos      emit(Text) -> Item { text: "Go", start: 2, pos: 4 }
//! ```

/// Next-state function. Wrapped in a struct so the type can refer to itself.
pub(crate) struct StateFn<'a, K, D>(pub fn(&mut Lexer<'a, K, D>) -> Option<StateFn<'a, K, D>>);

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Item<'a, K> {
    pub kind: K,
    pub text: &'a str,
    pub start: usize,
    pub pos: usize,
    /// Set on error items.
    pub message: Option<String>,
}

pub(crate) struct Lexer<'a, K, D> {
    pub source: &'a str,
    pub start: usize,
    pub pos: usize,
    /// Bracket nesting depth.
    pub depth: i32,
    pub items: Vec<Item<'a, K>>,
    /// Per-lexer scratch state.
    pub data: D,
    /// Byte width of the last character returned by `next`, zero at end of input.
    width: usize,
}

impl<'a, K: Copy, D> Lexer<'a, K, D> {
    pub fn new(source: &'a str, data: D) -> Self {
        Lexer { source, start: 0, pos: 0, depth: 0, items: Vec::new(), data, width: 0 }
    }

    /// Starts lexing at byte offset `at` instead of the beginning.
    pub fn starting_at(mut self, at: usize) -> Self {
        self.start = at;
        self.pos = at;
        self
    }

    /// Runs states until one returns `None`, then hands back the emitted items.
    pub fn run(&mut self, initial: StateFn<'a, K, D>) -> &[Item<'a, K>] {
        let mut state = Some(initial);
        while let Some(StateFn(f)) = state {
            state = f(self);
        }
        &self.items
    }

    /// Consumes and returns the next character, or `None` at end of input.
    pub fn next(&mut self) -> Option<char> {
        match self.source[self.pos..].chars().next() {
            Some(ch) => {
                self.width = ch.len_utf8();
                self.pos += self.width;
                Some(ch)
            }
            None => {
                self.width = 0;
                None
            }
        }
    }

    pub fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    /// Steps back over the character returned by the last `next`.
    pub fn backup(&mut self) {
        self.pos -= self.width;
        self.width = 0;
    }

    /// Skips `n` characters.
    pub fn forward(&mut self, n: usize) {
        for _ in 0..n {
            if self.next().is_none() {
                break;
            }
        }
    }

    /// Drops the current window without emitting it.
    pub fn ignore(&mut self) {
        self.start = self.pos;
    }

    /// Consumes the next character if it is one of `valid`.
    pub fn accept(&mut self, valid: &str) -> bool {
        match self.next() {
            Some(ch) if valid.contains(ch) => true,
            Some(_) => {
                self.backup();
                false
            }
            None => false,
        }
    }

    /// Consumes a run of characters from `valid`.
    pub fn accept_run(&mut self, valid: &str) {
        while let Some(ch) = self.next() {
            if !valid.contains(ch) {
                self.backup();
                return;
            }
        }
    }

    /// The current window.
    pub fn window(&self) -> &'a str {
        &self.source[self.start..self.pos]
    }

    pub fn emit(&mut self, kind: K) {
        self.items.push(Item { kind, text: self.window(), start: self.start, pos: self.pos, message: None });
        self.start = self.pos;
    }

    /// Emits an error item and stops the lexer.
    pub fn error(&mut self, kind: K, message: impl Into<String>) -> Option<StateFn<'a, K, D>> {
        self.items.push(Item {
            kind,
            text: self.window(),
            start: self.start,
            pos: self.pos,
            message: Some(message.into()),
        });
        None
    }
}
