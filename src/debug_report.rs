use storymark::{Document, NodeId, NodeKind, RuleHit, WikifyResultVerbose};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

const TOP_HITS: usize = 8;
const PREVIEW_CHARS: usize = 40;

pub fn print_run(res: &WikifyResultVerbose, color: bool) {
    let palette = ansi::Palette::new(color);
    let result = &res.result;
    let details = &res.details;

    println!("\n{}", palette.bold(palette.paint(format!("⚙  Wikifying: \"{}\"", preview(&result.text)), ansi::CYAN)));

    println!("\n{}", palette.paint("━━━ Output ━━━", ansi::GRAY));
    let doc = &result.document;
    if doc.children(doc.root()).is_empty() {
        println!("{}", palette.dim("  (empty)"));
    } else {
        for &child in doc.children(doc.root()) {
            print_node(doc, child, 1, &palette);
        }
    }

    println!("\n{}", palette.paint("━━━ HTML ━━━", ansi::GRAY));
    println!("  {}", result.html);

    println!("\n{}", palette.paint("━━━ Rules ━━━", ansi::GRAY));
    print_hits(&details.rule_hits, ansi::BLUE, &palette);

    if !details.macro_calls.is_empty() {
        println!("\n{}", palette.paint("━━━ Macros ━━━", ansi::GRAY));
        print_hits(&details.macro_calls, ansi::CYAN, &palette);
    }

    if !result.errors.is_empty() {
        println!("\n{}", palette.paint("━━━ Errors ━━━", ansi::GRAY));
        for (idx, err) in result.errors.iter().enumerate() {
            println!("  {} {}", palette.paint(format!("[{idx}]"), ansi::GRAY), palette.paint(err, ansi::RED));
        }
    }

    println!("\n{}", palette.paint("━━━ Timing ━━━", ansi::GRAY));
    println!(
        "  Total: {}  │  Scans: {}  │  Max depth: {}  │  Rules: {}",
        palette.paint(format!("{:?}", details.total), ansi::GREEN),
        palette.paint(details.scans.to_string(), ansi::CYAN),
        palette.paint(details.max_depth.to_string(), ansi::YELLOW),
        palette.dim(details.active_rules.len().to_string()),
    );
    println!();
}

fn print_hits(hits: &[RuleHit], color: &str, palette: &ansi::Palette) {
    if hits.is_empty() {
        println!("  {}", palette.dim("No rules matched"));
        return;
    }
    for hit in hits.iter().take(TOP_HITS) {
        println!("  {} {}", palette.paint(format!("{:<24}", hit.name), color), palette.paint(hit.count.to_string(), ansi::YELLOW));
    }
    if hits.len() > TOP_HITS {
        println!("  {}", palette.dim(format!("... +{} more", hits.len() - TOP_HITS)));
    }
}

fn print_node(doc: &Document, id: NodeId, depth: usize, palette: &ansi::Palette) {
    let indent = "  ".repeat(depth);
    match doc.kind(id) {
        NodeKind::Fragment => println!("{indent}{}", palette.dim("#fragment")),
        NodeKind::Text(text) => println!("{indent}{}", palette.paint(format!("{:?}", preview(text)), ansi::GREEN)),
        NodeKind::Markup(html) => println!("{indent}{} {}", palette.dim("markup"), preview(html)),
        NodeKind::Error { message, source } => println!(
            "{indent}{} {} {}",
            palette.paint("✗", ansi::RED),
            palette.paint(message, ansi::RED),
            palette.dim(format!("│ {}", preview(source)))
        ),
        NodeKind::Element { tag, attrs } => {
            let attrs: Vec<String> = attrs.iter().map(|(name, value)| format!("{name}={value:?}")).collect();
            let action = if doc.has_action(id) { palette.paint(" ⚡", ansi::YELLOW) } else { String::new() };
            println!("{indent}{}{}{action}", palette.paint(format!("<{tag}>"), ansi::BLUE), palette.dim(if attrs.is_empty() {
                String::new()
            } else {
                format!(" {}", attrs.join(" "))
            }));
        }
    }
    for &child in doc.children(id) {
        print_node(doc, child, depth + 1, palette);
    }
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        out.push('…');
    }
    out
}
