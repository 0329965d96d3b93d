//! Signature-name templates.
//!
//! A template is free text with `{name}`, `{module}` and `{qualname}`
//! placeholders. A backslash in front of a brace escapes it, so `\{` and `\}`
//! come out as literal braces once the template is resolved.
//!
//! ```
//! use callprobe::interceptor::FunctionDescriptor;
//! use callprobe::interceptor::template::NameTemplate;
//!
//! let template = NameTemplate::parse(r"{module}::{name} \{hot\}").unwrap();
//! let descriptor = FunctionDescriptor::new("fib", "app::math", "fib");
//! assert_eq!(template.resolve(&descriptor), "app::math::fib {hot}");
//! ```

use std::fmt;
use std::str::FromStr;

use super::FunctionDescriptor;
use crate::error::{Error, Result};

/// Template used when none is configured.
pub const DEFAULT_TEMPLATE: &str = "{name}";

const EXPECTED_KEYS: &str = "{name}, {module}, {qualname}";

/// A recognized placeholder key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// Simple function name.
    Name,
    /// Defining module path.
    Module,
    /// Qualified name, e.g. `Parser::parse`.
    Qualname,
}

impl Placeholder {
    /// All placeholders, in documentation order.
    pub const ALL: [Placeholder; 3] = [
        Placeholder::Name,
        Placeholder::Module,
        Placeholder::Qualname,
    ];

    /// Key written between the braces.
    pub fn key(self) -> &'static str {
        match self {
            Placeholder::Name => "name",
            Placeholder::Module => "module",
            Placeholder::Qualname => "qualname",
        }
    }

    /// Looks a key up; `None` for anything outside the fixed set.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.key() == key)
    }

    fn value(self, descriptor: &FunctionDescriptor) -> &str {
        match self {
            Placeholder::Name => descriptor.name(),
            Placeholder::Module => descriptor.module(),
            Placeholder::Qualname => descriptor.qualname(),
        }
    }
}

/// Piece of a template: either literal text (still escaped) or the raw key
/// found between an unescaped `{` and the next unescaped `}`.
#[derive(Debug, PartialEq)]
enum Span<'a> {
    Text(&'a str),
    Field(&'a str),
}

fn is_escaped(bytes: &[u8], i: usize) -> bool {
    i > 0 && bytes[i - 1] == b'\\'
}

fn find_close(bytes: &[u8], from: usize) -> Option<usize> {
    (from..bytes.len()).find(|&j| bytes[j] == b'}' && !is_escaped(bytes, j))
}

// Braces and backslashes are ASCII, so every index we slice at is a char boundary.
fn spans(template: &str) -> Vec<Span<'_>> {
    let bytes = template.as_bytes();
    let mut spans = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'{' && !is_escaped(bytes, i) {
            if let Some(close) = find_close(bytes, i + 1) {
                if text_start < i {
                    spans.push(Span::Text(&template[text_start..i]));
                }
                spans.push(Span::Field(&template[i + 1..close]));
                i = close + 1;
                text_start = i;
                continue;
            }
        }
        i += 1;
    }

    if text_start < bytes.len() {
        spans.push(Span::Text(&template[text_start..]));
    }
    spans
}

fn push_unescaped(out: &mut String, text: &str) {
    out.push_str(&text.replace("\\{", "{").replace("\\}", "}"));
}

fn check_balance(template: &str) -> std::result::Result<(), String> {
    let bytes = template.as_bytes();
    let mut depth: usize = 0;

    for (i, &byte) in bytes.iter().enumerate() {
        if is_escaped(bytes, i) {
            continue;
        }
        match byte {
            b'{' => depth += 1,
            b'}' => {
                if depth == 0 {
                    return Err(format!("unmatched '}}' at byte {}", i));
                }
                depth -= 1;
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(format!("{} unclosed '{{'", depth));
    }
    Ok(())
}

/// Checks a template, reporting why it is rejected.
///
/// Braces must balance (escaped ones are ignored) and every placeholder key
/// must be one of `name`, `module`, `qualname`.
pub fn check(template: &str) -> Result<()> {
    let invalid = |reason: String| Error::InvalidTemplate {
        template: template.to_string(),
        reason,
    };

    check_balance(template).map_err(invalid)?;

    for span in spans(template) {
        if let Span::Field(key) = span {
            if Placeholder::from_key(key).is_none() {
                return Err(invalid(format!(
                    "unknown placeholder {{{}}}, expected one of {}",
                    key, EXPECTED_KEYS
                )));
            }
        }
    }
    Ok(())
}

/// Returns `true` when `template` passes [`check`].
pub fn validate(template: &str) -> bool {
    check(template).is_ok()
}

/// Substitutes the placeholders of `template` with the descriptor's fields.
///
/// Unknown keys are kept verbatim as `{key}`; escaped braces in the template
/// text are turned into literal braces. Substituted values are not unescaped.
pub fn resolve(template: &str, descriptor: &FunctionDescriptor) -> String {
    let mut out = String::with_capacity(template.len());

    for span in spans(template) {
        match span {
            Span::Text(text) => push_unescaped(&mut out, text),
            Span::Field(key) => match Placeholder::from_key(key) {
                Some(placeholder) => out.push_str(placeholder.value(descriptor)),
                None => {
                    out.push('{');
                    push_unescaped(&mut out, key);
                    out.push('}');
                }
            },
        }
    }
    out
}

/// A template that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTemplate(String);

impl NameTemplate {
    /// Validates and wraps `template`.
    pub fn parse(template: &str) -> Result<Self> {
        check(template)?;
        Ok(Self(template.to_string()))
    }

    /// The template text as configured.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolves the template for one function.
    pub fn resolve(&self, descriptor: &FunctionDescriptor) -> String {
        resolve(&self.0, descriptor)
    }
}

impl Default for NameTemplate {
    fn default() -> Self {
        Self(DEFAULT_TEMPLATE.to_string())
    }
}

impl FromStr for NameTemplate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for NameTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fib() -> FunctionDescriptor {
        FunctionDescriptor::new("fib", "app::math", "Solver::fib")
    }

    #[test]
    fn test_default_template_is_name() {
        let template = NameTemplate::default();
        assert_eq!(template.as_str(), "{name}");
        assert_eq!(template.resolve(&fib()), "fib");
    }

    #[test]
    fn test_resolve_all_placeholders() {
        let template = NameTemplate::parse("{module} | {qualname} | {name}").unwrap();
        assert_eq!(template.resolve(&fib()), "app::math | Solver::fib | fib");
    }

    #[test]
    fn test_resolve_unescapes_literal_braces() {
        let template = NameTemplate::parse(r"\{{name}\}").unwrap();
        assert_eq!(template.resolve(&fib()), "{fib}");

        let template = NameTemplate::parse(r"\{literal\}").unwrap();
        assert_eq!(template.resolve(&fib()), "{literal}");
    }

    #[test]
    fn test_plain_text_template() {
        let template = NameTemplate::parse("static label").unwrap();
        assert_eq!(template.resolve(&fib()), "static label");
        assert!(validate(""));
        assert_eq!(resolve("", &fib()), "");
    }

    #[test]
    fn test_validate_rejects_unbalanced_braces() {
        assert!(!validate("{name"));
        assert!(!validate("name}"));
        assert!(!validate("}{name"));
        assert!(!validate("{name}}"));
        // An escaped opening brace does not open anything.
        assert!(!validate(r"\{name}"));
    }

    #[test]
    fn test_escaped_open_with_unescaped_close_is_rejected() {
        // Only unescaped braces count, so the plain `}` has nothing to close.
        assert!(!validate(r"{name} and \{other}"));
        assert!(!validate(r"\{other {name} other}"));
        assert!(validate(r"{name} and \{other\}"));
    }

    #[test]
    fn test_validate_rejects_unknown_keys() {
        assert!(!validate("{foo}"));
        assert!(!validate("{name} {file}"));
        assert!(!validate("{}"));
        assert!(!validate("{{name}}"));
        assert!(!validate("{Name}"));
    }

    #[test]
    fn test_check_reports_reason() {
        let err = check("{foo}").unwrap_err();
        match err {
            Error::InvalidTemplate { template, reason } => {
                assert_eq!(template, "{foo}");
                assert!(reason.contains("{foo}"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = check("}").unwrap_err();
        assert!(err.to_string().contains("unmatched"));
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(NameTemplate::parse("{qualname").is_err());
        assert!("{module}".parse::<NameTemplate>().is_ok());
    }

    #[test]
    fn test_resolve_keeps_unknown_keys_verbatim() {
        assert_eq!(resolve("{foo} {name}", &fib()), "{foo} fib");
        assert_eq!(resolve(r"{a\}b}", &fib()), "{a}b}");
    }

    #[test]
    fn test_resolve_unclosed_brace_stays_literal() {
        assert_eq!(resolve("{name} {", &fib()), "fib {");
    }

    #[test]
    fn test_resolve_does_not_unescape_values() {
        let descriptor = FunctionDescriptor::new(r"odd\{", "m", "q");
        assert_eq!(resolve("{name}", &descriptor), r"odd\{");
    }

    #[test]
    fn test_non_ascii_text_around_placeholders() {
        let template = NameTemplate::parse("→ {name} ←").unwrap();
        assert_eq!(template.resolve(&fib()), "→ fib ←");
    }

    #[test]
    fn test_spans_split() {
        assert_eq!(
            spans("a{name}b"),
            vec![Span::Text("a"), Span::Field("name"), Span::Text("b")]
        );
        assert_eq!(spans(r"\{x}"), vec![Span::Text(r"\{x}")]);
    }
}
