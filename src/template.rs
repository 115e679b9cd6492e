//! Interpolation scanning and text helpers
//!
//! Strings written into the document may embed `${{ ... }}` interpolations.
//! This module tokenizes them in a single pass to recover the context paths
//! they reference, so that plain strings are validated like expressions.

use std::iter::Peekable;
use std::ops::Range;
use std::str::CharIndices;

/// Token representing a parsed template fragment
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Literal text (stores range in original string)
    Literal(Range<usize>),
    /// Body of a `${{ ... }}` interpolation, trimmed
    Interpolation(String),
}

/// Split a string into literal text and interpolation bodies.
///
/// An unterminated `${{` is kept as literal text.
pub fn tokenize(template: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut literal_start = 0;
    let mut search = 0;
    while let Some(offset) = template[search..].find("${{") {
        let open = search + offset;
        let Some(close) = template[open + 3..].find("}}") else {
            break;
        };
        let close = open + 3 + close;
        if open > literal_start {
            tokens.push(Token::Literal(literal_start..open));
        }
        tokens.push(Token::Interpolation(
            template[open + 3..close].trim().to_string(),
        ));
        literal_start = close + 2;
        search = literal_start;
    }
    if literal_start < template.len() {
        tokens.push(Token::Literal(literal_start..template.len()));
    }
    tokens
}

/// Context paths referenced by the interpolations of a string.
pub fn references(template: &str) -> Vec<Vec<String>> {
    tokenize(template)
        .into_iter()
        .filter_map(|token| match token {
            Token::Interpolation(body) => Some(formula_paths(&body)),
            Token::Literal(_) => None,
        })
        .flatten()
        .collect()
}

const KEYWORDS: &[&str] = &["true", "false", "null"];

/// Extract the context paths of an expression body such as
/// `steps.build.outcome == 'success' && contains(github.ref, 'main')`.
pub fn formula_paths(body: &str) -> Vec<Vec<String>> {
    let mut paths = Vec::new();
    let mut chars = body.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        if c == '\'' {
            skip_string(&mut chars);
        } else if c.is_ascii_alphabetic() || c == '_' {
            let name = take_identifier(body, start, &mut chars);
            skip_spaces(&mut chars);
            if matches!(chars.peek(), Some((_, '('))) || KEYWORDS.contains(&name.as_str()) {
                continue;
            }
            let mut path = vec![name];
            extend_path(body, &mut chars, &mut path);
            paths.push(path);
        } else if c.is_ascii_digit() {
            while matches!(chars.peek(), Some((_, d)) if d.is_ascii_alphanumeric() || *d == '.') {
                chars.next();
            }
        } else {
            chars.next();
        }
    }
    paths
}

type Chars<'a> = Peekable<CharIndices<'a>>;

fn take_identifier(body: &str, start: usize, chars: &mut Chars<'_>) -> String {
    let mut end = start;
    while let Some(&(i, c)) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            end = i + c.len_utf8();
            chars.next();
        } else {
            break;
        }
    }
    body[start..end].to_string()
}

fn skip_spaces(chars: &mut Chars<'_>) {
    while matches!(chars.peek(), Some((_, c)) if c.is_whitespace()) {
        chars.next();
    }
}

/// Consume a quoted literal, returning its unescaped content.
fn skip_string(chars: &mut Chars<'_>) -> String {
    let mut text = String::new();
    chars.next();
    while let Some((_, c)) = chars.next() {
        if c == '\'' {
            if matches!(chars.peek(), Some((_, '\''))) {
                chars.next();
                text.push('\'');
                continue;
            }
            break;
        }
        text.push(c);
    }
    text
}

/// Follow `.name`, `.*` and `[literal]` accessors.
fn extend_path(body: &str, chars: &mut Chars<'_>, path: &mut Vec<String>) {
    loop {
        match chars.peek() {
            Some(&(_, '.')) => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '*')) => {
                        chars.next();
                        path.push("*".to_string());
                    }
                    Some(&(start, c)) if c.is_ascii_alphanumeric() || c == '_' => {
                        path.push(take_identifier(body, start, chars));
                    }
                    _ => return,
                }
            }
            Some(&(_, '[')) => {
                chars.next();
                skip_spaces(chars);
                match chars.peek() {
                    Some(&(_, '\'')) => {
                        let key = skip_string(chars);
                        path.push(key);
                    }
                    Some(&(start, c)) if c.is_ascii_digit() => {
                        path.push(take_identifier(body, start, chars));
                    }
                    Some(&(_, '*')) => {
                        chars.next();
                        path.push("*".to_string());
                    }
                    _ => return,
                }
                skip_spaces(chars);
                if matches!(chars.peek(), Some((_, ']'))) {
                    chars.next();
                } else {
                    return;
                }
            }
            _ => return,
        }
    }
}

/// Trim blank edge lines and remove common indentation.
///
/// Only spaces and tabs count as indentation, and the margin is the longest
/// prefix shared by every non-blank line, so `"\t  a"` and `"  \tb"` share
/// nothing.
pub fn dedent(text: &str) -> String {
    const INDENT: [char; 2] = [' ', '\t'];
    fn blank(line: &str) -> bool {
        line.trim_matches(INDENT).is_empty()
    }
    fn indent(line: &str) -> &str {
        &line[..line.len() - line.trim_start_matches(INDENT).len()]
    }

    let lines: Vec<&str> = text.lines().collect();
    let first = lines.iter().position(|line| !blank(line));
    let last = lines.iter().rposition(|line| !blank(line));
    let (Some(first), Some(last)) = (first, last) else {
        return String::new();
    };
    let lines = &lines[first..=last];
    let margin = lines
        .iter()
        .copied()
        .filter(|line| !blank(line))
        .map(indent)
        .reduce(|common, next| {
            let shared = common
                .bytes()
                .zip(next.bytes())
                .take_while(|(a, b)| a == b)
                .count();
            &common[..shared]
        })
        .map_or(0, str::len);
    lines
        .iter()
        .map(|line| if blank(line) { "" } else { &line[margin..] })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(paths: Vec<Vec<String>>) -> Vec<String> {
        paths.into_iter().map(|path| path.join(".")).collect()
    }

    #[test]
    fn test_tokenize_simple_literal() {
        let tokens = tokenize("simple text");
        assert_eq!(tokens, vec![Token::Literal(0..11)]);
    }

    #[test]
    fn test_tokenize_interpolation() {
        let tokens = tokenize("<${{ x.a }}>");
        assert_eq!(
            tokens,
            vec![
                Token::Literal(0..1),
                Token::Interpolation("x.a".to_string()),
                Token::Literal(11..12),
            ]
        );
    }

    #[test]
    fn test_tokenize_unterminated() {
        let tokens = tokenize("echo ${{ oops");
        assert_eq!(tokens, vec![Token::Literal(0..13)]);
    }

    #[test]
    fn test_references_from_string() {
        let refs = references("echo ${{ inputs.foo }} and ${{ matrix.x }}");
        assert_eq!(joined(refs), vec!["inputs.foo", "matrix.x"]);
    }

    #[test]
    fn test_formula_paths_skip_functions_and_literals() {
        let refs = formula_paths("contains(inputs.i, 'failed') && github.ref == 'a.b' || true");
        assert_eq!(joined(refs), vec!["inputs.i", "github.ref"]);
    }

    #[test]
    fn test_formula_paths_indexing_and_wildcard() {
        let refs = formula_paths("job.services.redis.ports[6379] && steps.*.outcome && x['a-b'].c");
        assert_eq!(
            joined(refs),
            vec!["job.services.redis.ports.6379", "steps.*.outcome", "x.a-b.c"]
        );
    }

    #[test]
    fn test_formula_paths_dashed_ids() {
        let refs = formula_paths("steps.step-1.outputs.my_out");
        assert_eq!(joined(refs), vec!["steps.step-1.outputs.my_out"]);
    }

    #[test]
    fn test_dedent() {
        let text = "\n        echo one\n          echo two\n\n        echo three\n    ";
        assert_eq!(dedent(text), "echo one\n  echo two\n\necho three");
    }

    #[test]
    fn test_dedent_single_line() {
        assert_eq!(dedent("make test"), "make test");
        assert_eq!(dedent("   "), "");
    }

    #[test]
    fn test_dedent_keeps_non_ascii_whitespace() {
        let text = "\u{a0}echo a\n echo b";
        assert_eq!(dedent(text), text);
    }

    #[test]
    fn test_dedent_mixed_tabs_and_spaces() {
        assert_eq!(dedent("\t  one\n\t  two\n\t three"), " one\n two\nthree");
        assert_eq!(dedent(" \tx\n\t y"), " \tx\n\t y");
    }
}
