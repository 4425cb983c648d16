//! `@@include` expansion for HTML templates.
//!
//! Syntax: `@@include('path')` or `@@include('path', {"key": "value"})`.
//! Paths are relative to the file containing the directive. Keys of the
//! JSON object are available as `@@key` inside the included file and in
//! everything it includes in turn.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

const DIRECTIVE: &str = "@@include(";

/// Maximum include nesting.
pub const MAX_DEPTH: usize = 32;

static VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@@([A-Za-z_][A-Za-z0-9_]*)").expect("Invalid variable regex"));

/// Errors that can occur while expanding includes.
#[derive(Debug, thiserror::Error)]
pub enum IncludeError {
    #[error("Failed to read {path}: {message}")]
    ReadError { path: String, message: String },

    #[error("Malformed @@include in {file}: {message}")]
    SyntaxError { file: String, message: String },

    #[error("Include cycle through {0}")]
    Cycle(String),

    #[error("Includes nested deeper than {MAX_DEPTH} levels at {0}")]
    TooDeep(String),
}

/// Read `path` and expand every include directive in it.
pub fn expand_file(path: &Path) -> Result<String, IncludeError> {
    let source = fs::read_to_string(path).map_err(|e| IncludeError::ReadError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let mut stack = vec![identity(path)];
    expand(&source, path, &Map::new(), &mut stack)
}

/// Expand directives in `source`, which was read from `file`.
pub fn expand_str(source: &str, file: &Path) -> Result<String, IncludeError> {
    let mut stack = vec![identity(file)];
    expand(source, file, &Map::new(), &mut stack)
}

fn expand(
    source: &str,
    file: &Path,
    vars: &Map<String, Value>,
    stack: &mut Vec<PathBuf>,
) -> Result<String, IncludeError> {
    let source = substitute(source, vars);
    let dir = file.parent().unwrap_or(Path::new(""));

    let mut out = String::with_capacity(source.len());
    let mut rest = source.as_str();

    while let Some(pos) = rest.find(DIRECTIVE) {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + DIRECTIVE.len()..];

        let directive = parse_directive(after).map_err(|message| IncludeError::SyntaxError {
            file: file.display().to_string(),
            message,
        })?;

        let target = dir.join(&directive.path);
        let key = identity(&target);

        if stack.contains(&key) {
            return Err(IncludeError::Cycle(target.display().to_string()));
        }
        if stack.len() >= MAX_DEPTH {
            return Err(IncludeError::TooDeep(target.display().to_string()));
        }

        let content = fs::read_to_string(&target).map_err(|e| IncludeError::ReadError {
            path: target.display().to_string(),
            message: e.to_string(),
        })?;

        let mut scoped = vars.clone();
        scoped.extend(directive.vars);

        stack.push(key);
        let expanded = expand(&content, &target, &scoped, stack)?;
        stack.pop();

        out.push_str(&expanded);
        rest = &after[directive.consumed..];
    }

    out.push_str(rest);
    Ok(out)
}

#[derive(Debug)]
struct Directive {
    path: String,
    vars: Map<String, Value>,
    /// Bytes consumed after `@@include(`, including the closing paren
    consumed: usize,
}

/// Parse `'path'[, {json}])` from the text following `@@include(`.
fn parse_directive(input: &str) -> Result<Directive, String> {
    let mut pos = skip_ws(input, 0);

    let quote = input[pos..]
        .chars()
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or_else(|| "expected a quoted path".to_string())?;
    pos += 1;

    let len = input[pos..]
        .find(quote)
        .ok_or_else(|| "unterminated path".to_string())?;
    let path = input[pos..pos + len].to_string();
    pos = skip_ws(input, pos + len + 1);

    let mut vars = Map::new();
    if input[pos..].starts_with(',') {
        pos = skip_ws(input, pos + 1);

        let mut values = serde_json::Deserializer::from_str(&input[pos..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(Value::Object(map))) => vars = map,
            Some(Ok(_)) => return Err("include context must be a JSON object".to_string()),
            Some(Err(e)) => return Err(format!("invalid include context: {}", e)),
            None => return Err("missing include context".to_string()),
        }
        pos = skip_ws(input, pos + values.byte_offset());
    }

    if !input[pos..].starts_with(')') {
        return Err("expected ')'".to_string());
    }

    Ok(Directive {
        path,
        vars,
        consumed: pos + 1,
    })
}

fn skip_ws(input: &str, from: usize) -> usize {
    let trimmed = input[from..].trim_start();
    input.len() - trimmed.len()
}

/// Replace `@@key` with the value of `key` for every known key.
fn substitute(source: &str, vars: &Map<String, Value>) -> String {
    if vars.is_empty() {
        return source.to_string();
    }

    VARIABLE
        .replace_all(source, |caps: &Captures| {
            let name = &caps[1];
            match vars.get(name) {
                Some(Value::String(s)) if name != "include" => s.clone(),
                Some(value) if name != "include" => value.to_string(),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn identity(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
