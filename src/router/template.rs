//! Route template parsing
//!
//! Templates are literal text with `<name>` placeholders and `[...]` optional
//! sections, e.g. `/products[/<page>]`. The same syntax serves match patterns
//! and reverse templates.

use indexmap::IndexMap;

use super::error::RouterError;

/// Default character class of a placeholder without a constraint
pub const DEFAULT_PARAM_CLASS: &str = "[^/]+";

/// A parsed template piece
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Text copied verbatim
    Literal(String),
    /// `<name>` placeholder
    Param(String),
    /// `[...]` section, dropped as a whole when its params are absent
    Optional(Vec<Token>),
}

/// Parsed route template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    tokens: Vec<Token>,
    params: Vec<String>,
}

impl Template {
    /// Parse a template string
    pub fn parse(source: &str) -> Result<Self, RouterError> {
        let mut stack: Vec<Vec<Token>> = vec![Vec::new()];
        let mut literal = String::new();
        let mut params: Vec<String> = Vec::new();
        let mut chars = source.char_indices();

        while let Some((pos, c)) = chars.next() {
            match c {
                '<' => {
                    flush_literal(&mut literal, &mut stack);

                    let mut name = String::new();
                    let mut closed = false;
                    for (_, next) in chars.by_ref() {
                        if next == '>' {
                            closed = true;
                            break;
                        }
                        name.push(next);
                    }

                    if !closed {
                        return Err(RouterError::syntax(
                            source,
                            format!("unclosed placeholder at position {}", pos),
                        ));
                    }
                    if !is_identifier(&name) {
                        return Err(RouterError::syntax(
                            source,
                            format!("invalid placeholder name '{}'", name),
                        ));
                    }
                    if params.contains(&name) {
                        return Err(RouterError::syntax(
                            source,
                            format!("placeholder '<{}>' is used more than once", name),
                        ));
                    }

                    params.push(name.clone());
                    push_token(&mut stack, Token::Param(name));
                }
                '>' => {
                    return Err(RouterError::syntax(
                        source,
                        format!("unexpected '>' at position {}", pos),
                    ));
                }
                '[' => {
                    flush_literal(&mut literal, &mut stack);
                    stack.push(Vec::new());
                }
                ']' => {
                    flush_literal(&mut literal, &mut stack);
                    if stack.len() == 1 {
                        return Err(RouterError::syntax(
                            source,
                            format!("unmatched ']' at position {}", pos),
                        ));
                    }
                    if let Some(section) = stack.pop() {
                        push_token(&mut stack, Token::Optional(section));
                    }
                }
                _ => literal.push(c),
            }
        }

        flush_literal(&mut literal, &mut stack);
        if stack.len() != 1 {
            return Err(RouterError::syntax(source, "unclosed '['"));
        }

        Ok(Self {
            source: source.to_string(),
            tokens: stack.pop().unwrap_or_default(),
            params,
        })
    }

    /// Catch-all reverse template `/<name>`
    pub(crate) fn catch_all(name: &str) -> Self {
        Self {
            source: format!("/<{}>", name),
            tokens: vec![
                Token::Literal("/".to_string()),
                Token::Param(name.to_string()),
            ],
            params: vec![name.to_string()],
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Placeholder names in order of appearance
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Compile into an anchored regular expression source.
    ///
    /// A trailing `/` in the template is dropped and, when
    /// `optional_trailing_slash` is set, re-added as `/?`. The root
    /// template always compiles to `^/$`.
    pub fn to_regex(
        &self,
        constraints: &IndexMap<String, String>,
        optional_trailing_slash: bool,
    ) -> String {
        let mut tokens = self.tokens.clone();
        if let Some(Token::Literal(last)) = tokens.last_mut() {
            if last.ends_with('/') {
                last.pop();
                if last.is_empty() {
                    tokens.pop();
                }
            }
        }

        let mut body = String::new();
        write_regex(&tokens, constraints, &mut body);

        if body.is_empty() {
            "^/$".to_string()
        } else if optional_trailing_slash {
            format!("^{}/?$", body)
        } else {
            format!("^{}$", body)
        }
    }
}

/// Placeholder names nested anywhere inside `tokens`
pub(crate) fn collect_params<'t>(tokens: &'t [Token], out: &mut Vec<&'t str>) {
    for token in tokens {
        match token {
            Token::Literal(_) => {}
            Token::Param(name) => out.push(name),
            Token::Optional(inner) => collect_params(inner, out),
        }
    }
}

fn write_regex(tokens: &[Token], constraints: &IndexMap<String, String>, out: &mut String) {
    for token in tokens {
        match token {
            Token::Literal(text) => out.push_str(&regex::escape(text)),
            Token::Param(name) => {
                let class = constraints
                    .get(name)
                    .map(String::as_str)
                    .unwrap_or(DEFAULT_PARAM_CLASS);
                out.push_str(&format!("(?P<{}>{})", name, class));
            }
            Token::Optional(inner) => {
                out.push_str("(?:");
                write_regex(inner, constraints, out);
                out.push_str(")?");
            }
        }
    }
}

fn flush_literal(literal: &mut String, stack: &mut [Vec<Token>]) {
    if literal.is_empty() {
        return;
    }
    if let Some(top) = stack.last_mut() {
        top.push(Token::Literal(std::mem::take(literal)));
    }
}

fn push_token(stack: &mut [Vec<Token>], token: Token) {
    if let Some(top) = stack.last_mut() {
        top.push(token);
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
