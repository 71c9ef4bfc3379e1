#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}

#[macro_export]
macro_rules! rule {
    (
        name: $name:expr,
        pattern: $pattern:expr
        $(, profiles: $profiles:expr)?
        $(, lookahead: $lookahead:literal)?
        $(, terminator: $terminator:expr)?
        , handler: |$w:ident, $r:ident| $body:block
        $(,)?
    ) => {{
        $crate::GrammarRule {
            name: ::std::string::String::from($name),
            pattern: ::std::string::String::from($pattern),
            profiles: { $crate::ProfileSet::empty() $(| $profiles)? },
            lookahead: { None::<regex::Regex> $(.or(Some(regex::Regex::new($lookahead).unwrap())))? },
            terminator: { None::<&'static str> $(.or(Some($terminator)))? },
            handler: Box::new(move |$w: &mut $crate::Wikifier<'_>, $r: &$crate::GrammarRule| $body),
        }
    }};
}
