use crate::{Config, Engine, NodeKind, Passage, Story, Value};

fn engine() -> Engine {
    let story: Story = [
        Passage::new("Cave", "It is dark."),
        Passage::new("lamp.png", "data:image/png;base64,AAAA").with_tags(&["Twine.image"]),
    ]
    .into_iter()
    .collect();
    Engine::builder().story(story).build().unwrap()
}

fn html(engine: &Engine, source: &str) -> String {
    let doc = engine.wikify(source).unwrap();
    doc.to_html(doc.root())
}

#[test]
fn character_formatting() {
    let engine = engine();
    assert_eq!(
        html(&engine, "''b'' //i// __u__ ^^sup^^ ~~sub~~ ==s== {{{x < y}}}"),
        "<strong>b</strong> <em>i</em> <u>u</u> <sup>sup</sup> <sub>sub</sub> <s>s</s> <code>x &lt; y</code>"
    );
    assert_eq!(html(&engine, "a -- b"), "a \u{2014} b");
}

#[test]
fn headings_and_lists() {
    let engine = engine();
    assert_eq!(html(&engine, "!!Title\nbody"), "<h2>Title</h2>body");
    assert_eq!(html(&engine, "* a\n* b\n"), "<ul><li> a</li><li> b</li></ul>");
    assert_eq!(html(&engine, "# one\n## sub\n"), "<ol><li> one</li><ol><li> sub</li></ol></ol>");
}

#[test]
fn block_rules_need_a_block_context() {
    let engine = engine();
    assert_eq!(html(&engine, "x !not a heading"), "x !not a heading");
}

#[test]
fn line_quotes() {
    let engine = engine();
    assert_eq!(html(&engine, ">a\n>>b\n"), "<blockquote>a<br><blockquote>b<br></blockquote></blockquote>");
}

#[test]
fn code_blocks_and_verbatim() {
    let engine = engine();
    assert_eq!(html(&engine, "{{{\n''raw''\n}}}\n"), "<pre><code>''raw''\n</code></pre>");
    assert_eq!(html(&engine, "\"\"\"''no''\"\"\""), "<span class=\"verbatim\">''no''</span>");
}

#[test]
fn comments_are_dropped() {
    let engine = engine();
    assert_eq!(html(&engine, "a/* hidden */b<!-- x -->c/% y %/d"), "abcd");
}

#[test]
fn line_breaks_and_continuations() {
    let engine = engine();
    assert_eq!(html(&engine, "a\nb"), "a<br>b");
    assert_eq!(html(&engine, "a \\\nb"), "a b");

    let quiet = Engine::builder().config(Config { nobr: true, ..Config::default() }).build().unwrap();
    assert_eq!(html(&quiet, "a\nb"), "ab");
}

#[test]
fn naked_variables() {
    let engine = engine();
    engine.set_variable("$gold", Value::Number(5.0));
    engine.set_variable("$who", Value::str("//Ann//"));

    assert_eq!(html(&engine, "$gold coins, $$ sign, $missing, $who"), "5 coins, $ sign, $missing, <em>Ann</em>");
}

#[test]
fn square_bracket_links() {
    let engine = engine();
    assert_eq!(
        html(&engine, "[[Cave]] [[Run->Lost]]"),
        "<a class=\"link-internal\" data-passage=\"Cave\">Cave</a> \
         <a class=\"link-broken\" data-passage=\"Lost\">Run</a>"
    );
}

#[test]
fn link_setters_run_on_activation() {
    let engine = engine();
    let doc = engine.wikify("[[Enter|Cave][$seen to true]]").unwrap();
    let link = doc.find_all(doc.root(), "a")[0];

    assert_eq!(engine.variable("$seen"), None);
    assert!(doc.activate(link, &engine).unwrap());
    assert_eq!(engine.variable("$seen"), Some(Value::Bool(true)));
}

#[test]
fn image_passages() {
    let engine = engine();
    assert_eq!(
        html(&engine, "[>img[Lamp|lamp.png][Cave]]"),
        "<a class=\"link-internal link-image\" data-passage=\"Cave\">\
         <img align=\"right\" data-passage=\"lamp.png\" src=\"data:image/png;base64,AAAA\" title=\"Lamp\"></a>"
    );
}

#[test]
fn html_elements() {
    let engine = engine();
    engine.set_variable("$cls", Value::str("hot"));

    assert_eq!(html(&engine, "<span class=\"x\">''a''</span>"), "<span class=\"x\"><strong>a</strong></span>");
    assert_eq!(html(&engine, "<div @class=\"$cls\">a</DIV>"), "<div class=\"hot\">a</div>");
    assert_eq!(html(&engine, "<ul>\n<li>a</li>\n</ul>"), "<ul><li>a</li></ul>");

    let doc = engine.wikify("<div>oops").unwrap();
    assert_eq!(doc.errors(doc.root()), vec!["cannot find a closing tag for HTML <div>"]);
}

#[test]
fn data_passage_attributes_become_links() {
    let engine = engine();
    assert_eq!(
        html(&engine, "<span data-passage=\"Cave\">go</span>"),
        "<span class=\"link-internal\" data-passage=\"Cave\">go</span>"
    );
}

#[test]
fn unknown_macro_sits_between_text_nodes() {
    let engine = engine();
    let doc = engine.wikify("plain <<nosuchmacro>> text").unwrap();
    let kinds: Vec<&NodeKind> = doc.children(doc.root()).iter().map(|&id| doc.kind(id)).collect();

    assert_eq!(kinds.len(), 3);
    assert_eq!(kinds[0], &NodeKind::Text("plain ".into()));
    assert_eq!(
        kinds[1],
        &NodeKind::Error { message: "macro <<nosuchmacro>> does not exist".into(), source: "<<nosuchmacro>>".into() }
    );
    assert_eq!(kinds[2], &NodeKind::Text(" text".into()));
}

#[test]
fn unclosed_macro_is_reported_inline() {
    let engine = engine();
    let doc = engine.wikify("a <<if true>>never closed").unwrap();
    let kinds: Vec<&NodeKind> = doc.children(doc.root()).iter().map(|&id| doc.kind(id)).collect();

    assert_eq!(
        kinds,
        vec![
            &NodeKind::Text("a ".into()),
            &NodeKind::Error {
                message: "cannot find a closing tag for macro <<if>>".into(),
                source: "<<if true>>\u{2026}".into(),
            },
            &NodeKind::Text("never closed".into()),
        ]
    );
}

#[test]
fn orphan_child_tag_names_its_parent() {
    let engine = engine();
    let doc = engine.wikify("x <<else>> y").unwrap();
    let kinds: Vec<&NodeKind> = doc.children(doc.root()).iter().map(|&id| doc.kind(id)).collect();

    assert_eq!(
        kinds,
        vec![
            &NodeKind::Text("x ".into()),
            &NodeKind::Error {
                message: "child tag <<else>> was found outside of a call to its parent macro <<if>>".into(),
                source: "<<else>>".into(),
            },
            &NodeKind::Text(" y".into()),
        ]
    );
}

#[test]
fn nested_macros_of_the_same_name() {
    let engine = engine();
    assert_eq!(html(&engine, "<<if true>>[<<if false>>a<<else>>b<</if>>]<</if>>"), "[b]");
}

#[test]
fn malformed_closing_tag_is_reported_inline() {
    let engine = engine();
    let doc = engine.wikify("<<if true>>X<</if B>>").unwrap();

    assert_eq!(
        doc.errors(doc.root()),
        vec!["cannot execute macro <<if>>: malformed closing tag: \"<</if B>>\""]
    );
    assert_eq!(doc.text_content(doc.root()), " B>>");
}

#[test]
fn backquoted_arguments_are_evaluated() {
    let engine = engine();
    assert_eq!(
        html(&engine, "<<button `\"a\" + \"b\"`>><</button>>"),
        "<button class=\"macro-button link-internal\">ab</button>"
    );
}

#[test]
fn custom_styles() {
    let engine = engine();
    assert_eq!(html(&engine, "@@plain@@"), "<span class=\"marked\">plain</span>");
    assert_eq!(html(&engine, "@@.big;x@@"), "<span class=\"big\">x</span>");
}

#[test]
fn horizontal_rules() {
    let engine = engine();
    assert_eq!(html(&engine, "a\n----\nb"), "a<br><hr>b");
}
