//! Macro tag recognition and body collection.
//!
//! ```text
//! <<if $a>>X<<elseif $b>>Y<<else>>Z<</if>>
//! └─open─┘ └────────── match_body ─────────┘
//!
//! payload: [ if    "$a"  contents "X" ]
//!          [ elseif "$b" contents "Y" ]
//!          [ else   ""   contents "Z" ]
//! ```
//!
//! The opening tag is recognized with a hand-written scanner rather than one big pattern: arguments may
//! contain comments, quoted strings and `[[...]]` markup, and each of those is allowed to contain `>>`.

use crate::error::MarkupError;
use crate::markup::ArgList;

/// A recognized `<<name args>>` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenTag<'a> {
    /// Tag name, including a leading `/` for closing tags.
    pub name: &'a str,
    /// Argument text after the name and any separating whitespace.
    pub args: &'a str,
    /// The whole tag, `<<` to `>>`.
    pub source: &'a str,
    pub start: usize,
    /// Offset just past the closing `>>`.
    pub end: usize,
}

impl OpenTag<'_> {
    pub fn has_args(&self) -> bool {
        !self.args.trim().is_empty()
    }
}

/// One clause of a macro body.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadClause {
    pub name: String,
    pub raw_args: String,
    pub args: ArgList,
    /// The tag that opened this clause.
    pub source: String,
    /// Text between this clause's tag and the next one.
    pub contents: String,
}

/// Recognizes one macro tag starting exactly at `pos`. Returns `None` when the text there is not tag shaped.
pub fn match_open_tag(source: &str, pos: usize) -> Option<OpenTag<'_>> {
    if !source.get(pos..)?.starts_with("<<") {
        return None;
    }

    let name_start = pos + 2;
    let name = regex!(r"^(?:/?[A-Za-z][\w-]*|[=-])").find(&source[name_start..])?;
    let name_end = name_start + name.end();

    let bytes = source.as_bytes();
    let mut i = name_end;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    let args_start = i;

    loop {
        if i >= bytes.len() {
            return None;
        }
        if bytes[i..].starts_with(b">>") {
            return Some(OpenTag {
                name: &source[name_start..name_end],
                args: &source[args_start..i],
                source: &source[pos..i + 2],
                start: pos,
                end: i + 2,
            });
        }
        i = skip_argument_piece(source, i);
    }
}

/// Length-aware skip over one argument construct at `i`. Unterminated constructs consume a single character.
fn skip_argument_piece(source: &str, i: usize) -> usize {
    let rest = &source[i..];
    let one_char = i + rest.chars().next().map_or(1, char::len_utf8);

    if let Some(body) = rest.strip_prefix("/*") {
        return body.find("*/").map_or(one_char, |end| i + 2 + end + 2);
    }
    if rest.starts_with("//") {
        return rest.find('\n').map_or(one_char, |end| i + end + 1);
    }
    match rest.as_bytes()[0] {
        quote @ (b'"' | b'\'' | b'`') => skip_quoted(rest, quote).map_or(one_char, |len| i + len),
        b'[' => skip_bracketed(rest).map_or(one_char, |len| i + len),
        _ => one_char,
    }
}

/// Length of a quoted run including both delimiters; backslash escapes any character.
fn skip_quoted(rest: &str, quote: u8) -> Option<usize> {
    let bytes = rest.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

/// Length of `[[...]]` or `[img[...]]` up to the first `]]` on the same line, plus any further `]`.
fn skip_bracketed(rest: &str) -> Option<usize> {
    let head = regex!(r"^\[(?:[<>]?[Ii][Mm][Gg])?\[").find(rest)?;
    let line_end = rest[head.end()..].find(['\r', '\n']).map_or(rest.len(), |n| head.end() + n);
    let close = rest[head.end()..line_end].find("]]")? + head.end();
    let mut end = close + 2;
    while rest[end..].starts_with(']') {
        end += 1;
    }
    Some(end)
}

/// Collects the body of the macro opened by `open`, splitting it into clauses at `child_tags`.
///
/// `make_args(tag_name, raw_args)` builds each clause's argument list. On success returns the clauses and
/// the offset just past the closing tag.
pub fn match_body<F>(
    source: &str,
    open: &OpenTag<'_>,
    child_tags: Option<&[String]>,
    mut make_args: F,
) -> Result<(Vec<PayloadClause>, usize), MarkupError>
where
    F: FnMut(&str, &str) -> Result<ArgList, MarkupError>,
{
    let close_tag = format!("/{}", open.name);
    let close_alt = format!("end{}", open.name);

    let mut payload = Vec::new();
    let mut opened = 1usize;
    let mut cur_source = open.source;
    let mut cur_name = open.name;
    let mut cur_args = open.args;
    let mut content_start = open.end;
    let mut pos = open.end;

    while let Some(found) = source[pos..].find("<<") {
        let tag_begin = pos + found;
        let Some(tag) = match_open_tag(source, tag_begin) else {
            pos = tag_begin + 2;
            continue;
        };
        pos = tag.end;

        if tag.name == open.name {
            opened += 1;
        } else if tag.name == close_tag || tag.name == close_alt {
            if tag.has_args() {
                return Err(MarkupError::MalformedMacroTag {
                    tag: tag.source.to_string(),
                    resume_at: tag_begin + 2 + tag.name.len(),
                });
            }
            opened -= 1;
        } else if tag.has_args() && (tag.name.starts_with('/') || tag.name.starts_with("end")) {
            pos = tag_begin + 2 + tag.name.len();
            continue;
        } else if opened == 1 && child_tags.is_some_and(|tags| tags.iter().any(|t| t == tag.name)) {
            payload.push(PayloadClause {
                name: cur_name.to_string(),
                raw_args: cur_args.to_string(),
                args: make_args(cur_name, cur_args)?,
                source: cur_source.to_string(),
                contents: source[content_start..tag_begin].to_string(),
            });
            cur_source = tag.source;
            cur_name = tag.name;
            cur_args = tag.args;
            content_start = tag.end;
        }

        if opened == 0 {
            payload.push(PayloadClause {
                name: cur_name.to_string(),
                raw_args: cur_args.to_string(),
                args: make_args(cur_name, cur_args)?,
                source: cur_source.to_string(),
                contents: source[content_start..tag_begin].to_string(),
            });
            return Ok((payload, tag.end));
        }
    }

    Err(MarkupError::UnclosedMacro(open.name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_args(_: &str, raw: &str) -> Result<ArgList, MarkupError> {
        Ok(ArgList::new(Vec::new(), raw))
    }

    fn body(source: &str, child_tags: &[&str]) -> Result<(Vec<PayloadClause>, usize), MarkupError> {
        let open = match_open_tag(source, 0).unwrap();
        let tags: Vec<String> = child_tags.iter().map(|t| t.to_string()).collect();
        match_body(source, &open, Some(&tags), raw_args)
    }

    fn contents(clauses: &[PayloadClause]) -> Vec<(&str, &str, &str)> {
        clauses.iter().map(|c| (c.name.as_str(), c.raw_args.as_str(), c.contents.as_str())).collect()
    }

    #[test]
    fn open_tag_shapes() {
        let tag = match_open_tag("x <<set $a to 1>> y", 2).unwrap();
        assert_eq!((tag.name, tag.args, tag.source), ("set", "$a to 1", "<<set $a to 1>>"));
        assert_eq!(tag.end, 17);

        assert_eq!(match_open_tag("<</if>>", 0).unwrap().name, "/if");
        assert_eq!(match_open_tag("<<=$x>>", 0).unwrap().args, "$x");
        assert_eq!(match_open_tag("<<- 1>>", 0).unwrap().name, "-");

        for bad in ["<< if>>", "<<1x>>", "<<if", "<if>>", "<<$x>>"] {
            assert!(match_open_tag(bad, 0).is_none(), "{bad}");
        }
    }

    #[test]
    fn arguments_may_contain_closing_brackets() {
        let cases = [
            (r#"<<print "a >> b">>"#, r#""a >> b""#),
            ("<<print 'x>>y'>>", "'x>>y'"),
            ("<<print `1 >> 2`>>", "`1 >> 2`"),
            ("<<link [[Go>>|Cave]]>>", "[[Go>>|Cave]]"),
            ("<<print /* >> */ 1>>", "/* >> */ 1"),
            ("<<print // >>\n1>>", "// >>\n1"),
            ("<<print 2 > 1>>", "2 > 1"),
            (r#"<<print "a\"b">>"#, r#""a\"b""#),
        ];
        for (src, args) in cases {
            let tag = match_open_tag(src, 0).unwrap_or_else(|| panic!("no tag in {src}"));
            assert_eq!(tag.args, args, "{src}");
            assert_eq!(tag.end, src.len(), "{src}");
        }
    }

    #[test]
    fn unterminated_quote_falls_back_to_plain_characters() {
        let tag = match_open_tag(r#"<<print "oops>>"#, 0).unwrap();
        assert_eq!(tag.args, r#""oops"#);
    }

    #[test]
    fn single_clause_body() {
        let src = "<<capture $x>>inner text<</capture>> after";
        let (clauses, end) = body(src, &[]).unwrap();
        assert_eq!(contents(&clauses), vec![("capture", "$x", "inner text")]);
        assert_eq!(&src[end..], " after");
    }

    #[test]
    fn child_tags_split_clauses() {
        let src = "<<if A>>X<<elseif B>>Y<<else>>Z<</if>>";
        let (clauses, end) = body(src, &["elseif", "else"]).unwrap();
        assert_eq!(contents(&clauses), vec![("if", "A", "X"), ("elseif", "B", "Y"), ("else", "", "Z")]);
        assert_eq!(clauses[1].source, "<<elseif B>>");
        assert_eq!(end, src.len());
    }

    #[test]
    fn same_name_nesting_is_balanced() {
        let src = "<<widget>><<widget>>inner<</widget>><</widget>>tail";
        let (clauses, end) = body(src, &[]).unwrap();
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].contents, "<<widget>>inner<</widget>>");
        assert_eq!(&src[end..], "tail");
    }

    #[test]
    fn child_tags_of_nested_calls_do_not_split() {
        let src = "<<if A>><<if B>>1<<else>>2<</if>><<else>>3<</if>>";
        let (clauses, _) = body(src, &["elseif", "else"]).unwrap();
        assert_eq!(contents(&clauses), vec![("if", "A", "<<if B>>1<<else>>2<</if>>"), ("else", "", "3")]);
    }

    #[test]
    fn end_prefixed_close() {
        let (clauses, _) = body("<<silently>>x<<endsilently>>", &[]).unwrap();
        assert_eq!(clauses[0].contents, "x");
    }

    #[test]
    fn closing_tag_with_arguments_is_malformed() {
        let src = "<<if A>>X<</if B>>";
        match body(src, &[]) {
            Err(MarkupError::MalformedMacroTag { tag, resume_at }) => {
                assert_eq!(tag, "<</if B>>");
                assert_eq!(&src[resume_at..], " B>>");
            }
            other => panic!("expected a malformed tag error, got {other:?}"),
        }
    }

    #[test]
    fn alien_closing_tags_with_arguments_are_skipped() {
        let (clauses, _) = body("<<if A>>a<</other junk>>b<</if>>", &[]).unwrap();
        assert_eq!(clauses[0].contents, "a<</other junk>>b");
    }

    #[test]
    fn missing_close_is_unclosed() {
        assert_eq!(body("<<if A>>never closed", &[]), Err(MarkupError::UnclosedMacro("if".into())));
        assert_eq!(body("<<if A>><<if B>><</if>>", &[]), Err(MarkupError::UnclosedMacro("if".into())));
    }

    #[test]
    fn stray_angle_brackets_in_body_are_ignored() {
        let (clauses, _) = body("<<nobr>>a << b<</nobr>>", &[]).unwrap();
        assert_eq!(clauses[0].contents, "a << b");
    }
}
