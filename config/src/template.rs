//! # Templating
//!
//! Two levels of template resolution:
//!
//! - [`interpolate_idents`]: plain `{{ VAR }}` substitution used over config
//!   documents at load time.
//! - [`render`]: the expression grammar used for YAML-source values:
//!   identifiers, string literals, `'fmt'.format(...)`, `lookup('file', PATH)`
//!   and the `from_json` / `to_json` pipe filters.
//!
//! The engine is pure: the only I/O is reading files named by `lookup`.

use regex::Regex;
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("missing variable '{name}' for template interpolation")]
    UndefinedVariable { name: String },

    #[error("template syntax error: {message}")]
    Syntax { message: String },

    #[error("unknown lookup plugin '{plugin}'")]
    UnknownPlugin { plugin: String },

    #[error("lookup('file', '{path}') failed: {source}")]
    Lookup {
        path: String,
        #[source]
        source: std::io::Error
    },

    #[error("format string expects {expected} arguments, got {given}")]
    FormatArity { expected: usize, given: usize },

    #[error("invalid JSON in template expression: {message}")]
    Json { message: String }
}

impl TemplateError {
    /// Name of the missing variable, when that is what went wrong.
    pub fn var_name(&self) -> Option<&str> {
        match self {
            Self::UndefinedVariable { name } => Some(name),
            _ => None
        }
    }
}

pub type TemplateResult<T> = Result<T, TemplateError>;

/// Evaluation context: the merged variable map plus the directory used to
/// resolve relative `lookup` paths.
pub struct TemplateContext<'a> {
    pub vars: &'a HashMap<String, String>,
    pub base_dir: Option<&'a Path>
}

fn var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap())
}

/// Substitute `{{ IDENT }}` placeholders from `vars`. Anything that is not a
/// plain identifier is left in place for the totality check to reject.
pub fn interpolate_idents(text: &str, vars: &HashMap<String, String>) -> TemplateResult<String> {
    if !text.contains("{{") {
        return Ok(text.to_string());
    }

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in var_pattern().captures_iter(text) {
        let whole = caps.get(0).expect("capture 0 always present");
        let name = &caps[1];
        let value = vars
            .get(name)
            .ok_or_else(|| TemplateError::UndefinedVariable {
                name: name.to_string()
            })?;
        out.push_str(&text[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}

/// True when the string still carries an unresolved `{{` marker.
pub fn has_placeholder(text: &str) -> bool {
    text.contains("{{")
}

/// Render a string through the full expression grammar.
pub fn render(text: &str, ctx: &TemplateContext<'_>) -> TemplateResult<String> {
    if !text.contains("{{") {
        return Ok(text.to_string());
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| TemplateError::Syntax {
            message: format!("unclosed '{{{{' in '{text}'")
        })?;
        let expr = &after[..end];
        let value = eval_expression(expr, ctx)?;
        out.push_str(&value.into_output());
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Recursively render every string scalar of a YAML document.
pub fn render_value(value: Value, ctx: &TemplateContext<'_>) -> TemplateResult<Value> {
    match value {
        Value::String(s) => Ok(Value::String(render(&s, ctx)?)),
        Value::Sequence(items) => Ok(Value::Sequence(
            items
                .into_iter()
                .map(|v| render_value(v, ctx))
                .collect::<TemplateResult<_>>()?
        )),
        Value::Mapping(map) => {
            let mut out = serde_yaml::Mapping::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k, render_value(v, ctx)?);
            }
            Ok(Value::Mapping(out))
        }
        other => Ok(other)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum EvalValue {
    Str(String),
    Json(serde_json::Value)
}

impl EvalValue {
    fn into_output(self) -> String {
        match self {
            Self::Str(s) => s,
            Self::Json(serde_json::Value::String(s)) => s,
            Self::Json(v) => v.to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    LParen,
    RParen,
    Comma,
    Dot,
    Pipe
}

fn tokenize(src: &str) -> TemplateResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            ',' => tokens.push(Token::Comma),
            '.' => tokens.push(Token::Dot),
            '|' => tokens.push(Token::Pipe),
            '\'' => {
                let mut literal = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '\'' {
                        closed = true;
                        break;
                    }
                    literal.push(c);
                }
                if !closed {
                    return Err(TemplateError::Syntax {
                        message: format!("unterminated string literal in '{src}'")
                    });
                }
                tokens.push(Token::Str(literal));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = i + c.len_utf8();
                while let Some(&(j, n)) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        end = j + n.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(src[i..end].to_string()));
            }
            other => {
                return Err(TemplateError::Syntax {
                    message: format!("unexpected character '{other}' in '{src}'")
                });
            }
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone)]
enum Expr {
    Ident(String),
    Str(String),
    Format { fmt: Box<Expr>, args: Vec<Expr> },
    Lookup { plugin: Box<Expr>, arg: Box<Expr> },
    Pipe { inner: Box<Expr>, filter: Filter }
}

#[derive(Debug, Clone, Copy)]
enum Filter {
    FromJson,
    ToJson
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> TemplateResult<()> {
        match self.next() {
            Some(ref token) if token == expected => Ok(()),
            other => Err(TemplateError::Syntax {
                message: format!("expected {expected:?}, found {other:?}")
            })
        }
    }

    fn parse(mut self) -> TemplateResult<Expr> {
        let expr = self.pipeline()?;
        if self.pos != self.tokens.len() {
            return Err(TemplateError::Syntax {
                message: "trailing tokens after expression".to_string()
            });
        }
        Ok(expr)
    }

    fn pipeline(&mut self) -> TemplateResult<Expr> {
        let mut expr = self.postfix()?;
        while matches!(self.peek(), Some(Token::Pipe)) {
            self.next();
            let filter = match self.next() {
                Some(Token::Ident(name)) if name == "from_json" => Filter::FromJson,
                Some(Token::Ident(name)) if name == "to_json" => Filter::ToJson,
                other => {
                    return Err(TemplateError::Syntax {
                        message: format!("unknown filter {other:?}")
                    });
                }
            };
            expr = Expr::Pipe {
                inner: Box::new(expr),
                filter
            };
        }
        Ok(expr)
    }

    fn postfix(&mut self) -> TemplateResult<Expr> {
        let mut expr = self.primary()?;
        while matches!(self.peek(), Some(Token::Dot)) {
            self.next();
            match self.next() {
                Some(Token::Ident(method)) if method == "format" => {
                    self.expect(&Token::LParen)?;
                    let args = self.arguments()?;
                    expr = Expr::Format {
                        fmt: Box::new(expr),
                        args
                    };
                }
                other => {
                    return Err(TemplateError::Syntax {
                        message: format!("unsupported method {other:?}")
                    });
                }
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> TemplateResult<Expr> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    if name != "lookup" {
                        return Err(TemplateError::Syntax {
                            message: format!("unknown function '{name}'")
                        });
                    }
                    self.next();
                    let args = self.arguments()?;
                    if args.len() != 2 {
                        return Err(TemplateError::Syntax {
                            message: format!("lookup expects 2 arguments, got {}", args.len())
                        });
                    }
                    let mut args = args.into_iter();
                    let plugin = args.next().expect("length checked");
                    let arg = args.next().expect("length checked");
                    Ok(Expr::Lookup {
                        plugin: Box::new(plugin),
                        arg: Box::new(arg)
                    })
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            other => Err(TemplateError::Syntax {
                message: format!("expected expression, found {other:?}")
            })
        }
    }

    /// Comma-separated expressions up to and including the closing paren.
    fn arguments(&mut self) -> TemplateResult<Vec<Expr>> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.next();
            return Ok(args);
        }
        loop {
            args.push(self.pipeline()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                other => {
                    return Err(TemplateError::Syntax {
                        message: format!("expected ',' or ')', found {other:?}")
                    });
                }
            }
        }
        Ok(args)
    }
}

fn eval_expression(src: &str, ctx: &TemplateContext<'_>) -> TemplateResult<EvalValue> {
    let expr = Parser::new(tokenize(src)?).parse()?;
    eval(&expr, ctx)
}

fn eval(expr: &Expr, ctx: &TemplateContext<'_>) -> TemplateResult<EvalValue> {
    match expr {
        Expr::Str(s) => Ok(EvalValue::Str(s.clone())),
        Expr::Ident(name) => ctx
            .vars
            .get(name)
            .map(|v| EvalValue::Str(v.clone()))
            .ok_or_else(|| TemplateError::UndefinedVariable { name: name.clone() }),
        Expr::Format { fmt, args } => {
            let fmt = eval(fmt, ctx)?.into_output();
            let values: Vec<String> = args
                .iter()
                .map(|a| eval(a, ctx).map(EvalValue::into_output))
                .collect::<TemplateResult<_>>()?;
            apply_format(&fmt, &values)
        }
        Expr::Lookup { plugin, arg } => {
            let plugin = eval(plugin, ctx)?.into_output();
            if plugin != "file" {
                return Err(TemplateError::UnknownPlugin { plugin });
            }
            let path = eval(arg, ctx)?.into_output();
            let resolved = resolve_lookup_path(&path, ctx.base_dir);
            let contents =
                std::fs::read_to_string(&resolved).map_err(|source| TemplateError::Lookup {
                    path: resolved.display().to_string(),
                    source
                })?;
            Ok(EvalValue::Str(contents))
        }
        Expr::Pipe { inner, filter } => {
            let value = eval(inner, ctx)?;
            match filter {
                Filter::FromJson => {
                    let text = value.into_output();
                    let parsed =
                        serde_json::from_str(&text).map_err(|e| TemplateError::Json {
                            message: e.to_string()
                        })?;
                    Ok(EvalValue::Json(parsed))
                }
                Filter::ToJson => {
                    let json = match value {
                        EvalValue::Str(s) => serde_json::Value::String(s),
                        EvalValue::Json(v) => v
                    };
                    Ok(EvalValue::Str(json.to_string()))
                }
            }
        }
    }
}

fn apply_format(fmt: &str, args: &[String]) -> TemplateResult<EvalValue> {
    let expected = fmt.matches("{}").count();
    if expected > args.len() {
        return Err(TemplateError::FormatArity {
            expected,
            given: args.len()
        });
    }

    let mut out = String::with_capacity(fmt.len());
    let mut parts = fmt.split("{}");
    if let Some(first) = parts.next() {
        out.push_str(first);
    }
    for (part, arg) in parts.zip(args.iter()) {
        out.push_str(arg);
        out.push_str(part);
    }
    Ok(EvalValue::Str(out))
}

fn resolve_lookup_path(path: &str, base_dir: Option<&Path>) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        return candidate.to_path_buf();
    }
    match base_dir {
        Some(dir) => dir.join(candidate),
        None => candidate.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn ctx<'a>(vars: &'a HashMap<String, String>) -> TemplateContext<'a> {
        TemplateContext {
            vars,
            base_dir: None
        }
    }

    #[test]
    fn test_interpolate_idents() {
        let vars = vars(&[("ENV", "dev")]);
        assert_eq!(
            interpolate_idents("/app/{{ ENV }}/db", &vars).unwrap(),
            "/app/dev/db"
        );
        assert_eq!(interpolate_idents("plain", &vars).unwrap(), "plain");
    }

    #[test]
    fn test_interpolate_missing_var_fails() {
        let err = interpolate_idents("{{ NOPE }}", &vars(&[])).unwrap_err();
        assert_eq!(err.var_name(), Some("NOPE"));
    }

    #[test]
    fn test_render_ident_and_literal() {
        let vars = vars(&[("ENV", "prod")]);
        assert_eq!(render("{{ ENV }}", &ctx(&vars)).unwrap(), "prod");
        assert_eq!(render("{{ 'hi' }}", &ctx(&vars)).unwrap(), "hi");
        assert_eq!(render("a {{ ENV }} b", &ctx(&vars)).unwrap(), "a prod b");
    }

    #[test]
    fn test_render_format() {
        let vars = vars(&[("HOST", "db.internal"), ("PORT", "5432")]);
        assert_eq!(
            render("{{ 'postgres://{}:{}/app'.format(HOST, PORT) }}", &ctx(&vars)).unwrap(),
            "postgres://db.internal:5432/app"
        );
    }

    #[test]
    fn test_format_arity_error() {
        let vars = vars(&[]);
        let err = render("{{ '{} {}'.format('one') }}", &ctx(&vars)).unwrap_err();
        assert!(matches!(err, TemplateError::FormatArity { expected: 2, given: 1 }));
    }

    #[test]
    fn test_lookup_reads_file_relative_to_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("token.txt")).unwrap();
        write!(f, "s3cret").unwrap();

        let vars = vars(&[]);
        let ctx = TemplateContext {
            vars: &vars,
            base_dir: Some(dir.path())
        };
        assert_eq!(render("{{ lookup('file', 'token.txt') }}", &ctx).unwrap(), "s3cret");
    }

    #[test]
    fn test_lookup_missing_file_fails() {
        let vars = vars(&[]);
        let err = render("{{ lookup('file', '/no/such/file') }}", &ctx(&vars)).unwrap_err();
        assert!(matches!(err, TemplateError::Lookup { .. }));
    }

    #[test]
    fn test_unknown_plugin_fails() {
        let vars = vars(&[]);
        let err = render("{{ lookup('vault', 'x') }}", &ctx(&vars)).unwrap_err();
        assert!(matches!(err, TemplateError::UnknownPlugin { .. }));
    }

    #[test]
    fn test_json_filters_chain() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("creds.json"), r#"{"user": "svc", "pass": "x"}"#).unwrap();

        let vars = vars(&[]);
        let ctx = TemplateContext {
            vars: &vars,
            base_dir: Some(dir.path())
        };
        let out = render(
            "{{ lookup('file', 'creds.json') | from_json | to_json }}",
            &ctx
        )
        .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["user"], "svc");
    }

    #[test]
    fn test_to_json_quotes_strings() {
        let vars = vars(&[("V", "plain")]);
        assert_eq!(render("{{ V | to_json }}", &ctx(&vars)).unwrap(), "\"plain\"");
    }

    #[test]
    fn test_unclosed_placeholder_is_syntax_error() {
        let vars = vars(&[]);
        let err = render("{{ ENV", &ctx(&vars)).unwrap_err();
        assert!(matches!(err, TemplateError::Syntax { .. }));
    }

    #[test]
    fn test_render_is_deterministic() {
        let vars = vars(&[("A", "1")]);
        let first = render("{{ 'x-{}'.format(A) }}", &ctx(&vars)).unwrap();
        let second = render("{{ 'x-{}'.format(A) }}", &ctx(&vars)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_render_value_walks_structures() {
        let vars = vars(&[("ENV", "dev")]);
        let doc: Value = serde_yaml::from_str("a:\n  - '{{ ENV }}'\n  - plain\n").unwrap();
        let rendered = render_value(doc, &ctx(&vars)).unwrap();
        let list = rendered.get("a").unwrap().as_sequence().unwrap();
        assert_eq!(list[0], Value::String("dev".to_string()));
    }
}
