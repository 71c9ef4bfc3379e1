//! Square-bracketed link and image markup.
//!
//! ```text
//! [[Text|Link][Setter]]        [[Link<-Text]]       [[Text->Link]]      [[~Link]]
//! [img[Title|Source][Link][Setter]]                 [<img[Source]]      [>img[Source]]
//! ```
//!
//! The lexer reads one such construct starting at a byte offset and reports its components plus the offset
//! just past it. Quoted runs inside components may contain delimiters and brackets.

use super::lexer::{Lexer, StateFn};
use crate::error::LexError;
use crate::value::Align;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Item {
    Error,
    /// `|` or `->`
    DelimLtr,
    /// `<-`
    DelimRtl,
    /// `][`
    InnerMeta,
    /// `[img[`, `[<img[` or `[>img[`
    ImageMeta,
    /// `[[`
    LinkMeta,
    Link,
    /// `]]`
    RightMeta,
    Setter,
    Source,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delim {
    None,
    Ltr,
    Rtl,
}

#[derive(Debug, Default)]
struct Data {
    is_link: bool,
}

impl Data {
    fn what(&self) -> &'static str {
        if self.is_link { "link" } else { "image" }
    }
}

type State<'a> = Option<StateFn<'a, Item, Data>>;
type BracketLexer<'a> = Lexer<'a, Item, Data>;

/// Components of one square-bracketed construct.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SquareBracketMarkup {
    pub is_link: bool,
    pub is_image: bool,
    pub align: Option<Align>,
    pub link: Option<String>,
    /// The link was written `~Link`: never treat it as external.
    pub force_internal: bool,
    pub text: Option<String>,
    pub setter: Option<String>,
    pub source: Option<String>,
    /// Byte offset just past the construct.
    pub pos: usize,
}

/// Lexes the construct starting at `start` in `source`.
pub fn parse_square_bracketed(source: &str, start: usize) -> Result<SquareBracketMarkup, LexError> {
    let mut lexer = Lexer::new(source, Data::default()).starting_at(start);
    lexer.run(StateFn(lex_left_meta));

    if let Some(last) = lexer.items.last().filter(|item| item.kind == Item::Error) {
        return Err(lex_error(last.message.clone().unwrap_or_default()));
    }

    let mut markup = SquareBracketMarkup { pos: lexer.pos, ..Default::default() };
    for item in &lexer.items {
        let text = item.text.trim();
        match item.kind {
            Item::ImageMeta => {
                markup.is_image = true;
                markup.align = match text.as_bytes().get(1) {
                    Some(b'<') => Some(Align::Left),
                    Some(b'>') => Some(Align::Right),
                    _ => None,
                };
            }
            Item::LinkMeta => markup.is_link = true,
            Item::Link => match text.strip_prefix('~') {
                Some(rest) => {
                    markup.force_internal = true;
                    markup.link = Some(rest.to_string());
                }
                None => markup.link = Some(text.to_string()),
            },
            Item::Setter => markup.setter = Some(text.to_string()),
            Item::Source => markup.source = Some(text.to_string()),
            Item::Text => markup.text = Some(text.to_string()),
            Item::Error | Item::DelimLtr | Item::DelimRtl | Item::InnerMeta | Item::RightMeta => {}
        }
    }

    Ok(markup)
}

fn lex_error(message: String) -> LexError {
    if let Some(rest) = message.strip_prefix("unterminated ") {
        LexError::Unterminated(rest.to_string())
    } else if let Some(rest) = message.strip_prefix("malformed ") {
        LexError::Malformed(rest.to_string())
    } else {
        LexError::Malformed(message)
    }
}

/// Consumes a quoted run whose opening quote was just read. Returns false when it is unterminated.
pub(crate) fn slurp_quote<K: Copy, D>(lexer: &mut Lexer<'_, K, D>, end_quote: char) -> bool {
    loop {
        match lexer.next() {
            Some('\\') => match lexer.next() {
                None | Some('\n') => return false,
                Some(_) => {}
            },
            None | Some('\n') => return false,
            Some(ch) if ch == end_quote => return true,
            Some(_) => {}
        }
    }
}

fn lex_left_meta<'a>(lexer: &mut BracketLexer<'a>) -> State<'a> {
    if !lexer.accept("[") {
        return lexer.error(Item::Error, "malformed square-bracketed markup");
    }

    if lexer.accept("[") {
        lexer.data.is_link = true;
        lexer.emit(Item::LinkMeta);
    } else {
        lexer.accept("<>");
        if !lexer.accept("Ii") || !lexer.accept("Mm") || !lexer.accept("Gg") || !lexer.accept("[") {
            return lexer.error(Item::Error, "malformed square-bracketed markup");
        }
        lexer.data.is_link = false;
        lexer.emit(Item::ImageMeta);
    }

    lexer.depth = 2;
    Some(StateFn(lex_core_components))
}

/// Emits the component before `][` or `]]` and the meta token itself.
fn close_component<'a>(lexer: &mut BracketLexer<'a>, kind: Item, meta: Item) {
    lexer.backup();
    lexer.emit(kind);
    lexer.forward(2);
    lexer.emit(meta);
}

fn lex_core_components<'a>(lexer: &mut BracketLexer<'a>) -> State<'a> {
    let what = lexer.data.what();
    let primary = if lexer.data.is_link { Item::Link } else { Item::Source };
    let mut delim = Delim::None;

    loop {
        match lexer.next() {
            None | Some('\n') => return lexer.error(Item::Error, format!("unterminated {what} markup")),
            Some('"') => {
                if !slurp_quote(lexer, '"') {
                    return lexer.error(Item::Error, format!("unterminated double quoted string in {what} markup"));
                }
            }
            Some('|') if delim == Delim::None => {
                delim = Delim::Ltr;
                lexer.backup();
                lexer.emit(Item::Text);
                lexer.forward(1);
                lexer.emit(Item::DelimLtr);
            }
            Some('-') if delim == Delim::None && lexer.peek() == Some('>') => {
                delim = Delim::Ltr;
                lexer.backup();
                lexer.emit(Item::Text);
                lexer.forward(2);
                lexer.emit(Item::DelimLtr);
            }
            Some('<') if delim == Delim::None && lexer.peek() == Some('-') => {
                delim = Delim::Rtl;
                lexer.backup();
                lexer.emit(primary);
                lexer.forward(2);
                lexer.emit(Item::DelimRtl);
            }
            Some('[') => lexer.depth += 1,
            Some(']') => {
                lexer.depth -= 1;
                if lexer.depth == 1 {
                    let component = if delim == Delim::Rtl { Item::Text } else { primary };
                    match lexer.peek() {
                        Some('[') => {
                            lexer.depth += 1;
                            close_component(lexer, component, Item::InnerMeta);
                            let next: fn(&mut BracketLexer<'a>) -> State<'a> =
                                if lexer.data.is_link { lex_setter } else { lex_image_link };
                            return Some(StateFn(next));
                        }
                        Some(']') => {
                            lexer.depth -= 1;
                            close_component(lexer, component, Item::RightMeta);
                            return None;
                        }
                        _ => return lexer.error(Item::Error, format!("malformed {what} markup")),
                    }
                }
            }
            Some(_) => {}
        }
    }
}

fn lex_image_link<'a>(lexer: &mut BracketLexer<'a>) -> State<'a> {
    let what = lexer.data.what();

    loop {
        match lexer.next() {
            None | Some('\n') => return lexer.error(Item::Error, format!("unterminated {what} markup")),
            Some('"') => {
                if !slurp_quote(lexer, '"') {
                    return lexer
                        .error(Item::Error, format!("unterminated double quoted string in {what} markup link component"));
                }
            }
            Some('[') => lexer.depth += 1,
            Some(']') => {
                lexer.depth -= 1;
                if lexer.depth == 1 {
                    match lexer.peek() {
                        Some('[') => {
                            lexer.depth += 1;
                            close_component(lexer, Item::Link, Item::InnerMeta);
                            return Some(StateFn(lex_setter));
                        }
                        Some(']') => {
                            lexer.depth -= 1;
                            close_component(lexer, Item::Link, Item::RightMeta);
                            return None;
                        }
                        _ => return lexer.error(Item::Error, format!("malformed {what} markup")),
                    }
                }
            }
            Some(_) => {}
        }
    }
}

fn lex_setter<'a>(lexer: &mut BracketLexer<'a>) -> State<'a> {
    let what = lexer.data.what();

    loop {
        match lexer.next() {
            None | Some('\n') => return lexer.error(Item::Error, format!("unterminated {what} markup")),
            Some(quote @ ('"' | '\'')) => {
                if !slurp_quote(lexer, quote) {
                    let kind = if quote == '"' { "double" } else { "single" };
                    return lexer.error(
                        Item::Error,
                        format!("unterminated {kind} quoted string in {what} markup setter component"),
                    );
                }
            }
            Some('[') => lexer.depth += 1,
            Some(']') => {
                lexer.depth -= 1;
                if lexer.depth == 1 {
                    if lexer.peek() != Some(']') {
                        return lexer.error(Item::Error, format!("malformed {what} markup"));
                    }
                    lexer.depth -= 1;
                    close_component(lexer, Item::Setter, Item::RightMeta);
                    return None;
                }
            }
            Some(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> SquareBracketMarkup {
        parse_square_bracketed(src, 0).unwrap()
    }

    #[test]
    fn simple_link() {
        let m = parse("[[Cave]]");
        assert!(m.is_link);
        assert_eq!(m.link.as_deref(), Some("Cave"));
        assert_eq!(m.text, None);
        assert_eq!(m.pos, 8);
    }

    #[test]
    fn link_delimiters() {
        let pipe = parse("[[Go in|Cave]]");
        assert_eq!((pipe.text.as_deref(), pipe.link.as_deref()), (Some("Go in"), Some("Cave")));

        let arrow = parse("[[Go in->Cave]]");
        assert_eq!((arrow.text.as_deref(), arrow.link.as_deref()), (Some("Go in"), Some("Cave")));

        let back = parse("[[Cave<-Go in]]");
        assert_eq!((back.text.as_deref(), back.link.as_deref()), (Some("Go in"), Some("Cave")));
    }

    #[test]
    fn link_with_setter_and_force_internal() {
        let m = parse("[[Go|~http://x][$x to 1]]");
        assert_eq!(m.link.as_deref(), Some("http://x"));
        assert!(m.force_internal);
        assert_eq!(m.setter.as_deref(), Some("$x to 1"));
    }

    #[test]
    fn quoted_text_may_contain_delimiters() {
        let m = parse(r#"[["a|b"|Cave]]"#);
        assert_eq!(m.text.as_deref(), Some("\"a|b\""));
        assert_eq!(m.link.as_deref(), Some("Cave"));
    }

    #[test]
    fn image_with_alignment_link_and_setter() {
        let m = parse("[<img[A cat|cat.png][Cave][$seen to true]]");
        assert!(m.is_image);
        assert_eq!(m.align, Some(Align::Left));
        assert_eq!(m.text.as_deref(), Some("A cat"));
        assert_eq!(m.source.as_deref(), Some("cat.png"));
        assert_eq!(m.link.as_deref(), Some("Cave"));
        assert_eq!(m.setter.as_deref(), Some("$seen to true"));
    }

    #[test]
    fn starts_at_an_offset() {
        let src = "see [[Cave]] now";
        let m = parse_square_bracketed(src, 4).unwrap();
        assert_eq!(m.pos, 12);
    }

    #[test]
    fn malformed_and_unterminated() {
        assert_eq!(parse_square_bracketed("[[Cave", 0), Err(LexError::Unterminated("link markup".into())));
        assert_eq!(parse_square_bracketed("[[Cave]x", 0), Err(LexError::Malformed("link markup".into())));
        assert!(matches!(parse_square_bracketed("[im[x]]", 0), Err(LexError::Malformed(_))));
    }
}
