//! A small logic-light template language for scheduler job files.
//!
//! Syntax:
//! - `${name}` - value, optionally filtered: `${name|quote}`, `${name|ident}`
//! - `${#each list}...${/each}` - repeat for every item, fields as `${item.field}`
//! - `${#if flag}...${/if}` - render when the flag is non-empty and not `false`
//!
//! A newline directly after a block tag is dropped, so block tags can sit on
//! lines of their own. Anything unknown is an error naming the offending
//! field; nothing is silently left unrendered.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use thiserror::Error;

// Regex for matching ${...} tags
static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([^}]*)\}").unwrap());

static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*(\.[a-zA-Z_][a-zA-Z0-9_]*)*$").unwrap());

/// Template failure, naming the field that could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("template field '{field}': {message}")]
pub struct TemplateError {
    pub field: String,
    pub message: String,
}

impl TemplateError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// One list item: field name to value.
pub type Item = BTreeMap<String, String>;

/// Values and lists a template is rendered with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateContext {
    values: BTreeMap<String, String>,
    lists: BTreeMap<String, Vec<Item>>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn set_list(&mut self, name: impl Into<String>, items: Vec<Item>) -> &mut Self {
        self.lists.insert(name.into(), items);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Value { name: String, filters: Vec<String> },
    Each { list: String, body: Vec<Node> },
    If { flag: String, body: Vec<Node> },
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    nodes: Vec<Node>,
}

enum Open {
    Each(String),
    If(String),
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        // Each stack frame is an open block and the nodes collected inside it.
        let mut stack: Vec<(Option<Open>, Vec<Node>)> = vec![(None, Vec::new())];
        let mut last = 0;
        let mut skip_newline = false;

        for caps in TAG_REGEX.captures_iter(source) {
            let Some(whole) = caps.get(0) else { continue };
            let mut text = &source[last..whole.start()];
            if skip_newline {
                text = text.strip_prefix('\n').unwrap_or(text);
            }
            push_text(&mut stack, text);
            last = whole.end();
            skip_newline = false;

            let tag = caps[1].trim();
            if let Some(rest) = tag.strip_prefix('#') {
                let (keyword, arg) = rest.split_once(' ').unwrap_or((rest, ""));
                let arg = arg.trim();
                check_name(arg)?;
                let open = match keyword {
                    "each" => Open::Each(arg.to_string()),
                    "if" => Open::If(arg.to_string()),
                    other => {
                        return Err(TemplateError::new(tag, format!("unknown block '{}'", other)));
                    }
                };
                stack.push((Some(open), Vec::new()));
                skip_newline = true;
            } else if let Some(keyword) = tag.strip_prefix('/') {
                let (open, body) = match stack.pop() {
                    Some((Some(open), body)) => (open, body),
                    _ => return Err(TemplateError::new(tag, "closing tag without an open block")),
                };
                let node = match (open, keyword) {
                    (Open::Each(list), "each") => Node::Each { list, body },
                    (Open::If(flag), "if") => Node::If { flag, body },
                    (Open::Each(name), _) | (Open::If(name), _) => {
                        return Err(TemplateError::new(
                            name,
                            format!("block closed by '${{{}}}'", tag),
                        ));
                    }
                };
                if let Some((_, nodes)) = stack.last_mut() {
                    nodes.push(node);
                }
                skip_newline = true;
            } else {
                let mut parts = tag.split('|').map(str::trim);
                let name = parts.next().unwrap_or_default();
                check_name(name)?;
                let filters: Vec<String> = parts.map(str::to_string).collect();
                for filter in &filters {
                    if !FILTERS.contains(&filter.as_str()) {
                        return Err(TemplateError::new(
                            format!("{}|{}", name, filter),
                            "unknown filter",
                        ));
                    }
                }
                if let Some((_, nodes)) = stack.last_mut() {
                    nodes.push(Node::Value {
                        name: name.to_string(),
                        filters,
                    });
                }
            }
        }

        let mut text = &source[last..];
        if skip_newline {
            text = text.strip_prefix('\n').unwrap_or(text);
        }
        push_text(&mut stack, text);

        match stack.pop() {
            Some((None, nodes)) if stack.is_empty() => Ok(Self { nodes }),
            Some((Some(Open::Each(name)), _)) | Some((Some(Open::If(name)), _)) => {
                Err(TemplateError::new(name, "block is never closed"))
            }
            _ => Err(TemplateError::new("<template>", "unbalanced blocks")),
        }
    }

    pub fn render(&self, ctx: &TemplateContext) -> Result<String, TemplateError> {
        let mut out = String::new();
        render_nodes(&self.nodes, ctx, None, &mut out)?;
        Ok(out)
    }
}

const FILTERS: [&str; 3] = ["quote", "capitalize", "ident"];

fn check_name(name: &str) -> Result<(), TemplateError> {
    if NAME_REGEX.is_match(name) {
        Ok(())
    } else {
        Err(TemplateError::new(name, "invalid name"))
    }
}

fn push_text(stack: &mut [(Option<Open>, Vec<Node>)], text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some((_, nodes)) = stack.last_mut() {
        nodes.push(Node::Text(text.to_string()));
    }
}

fn lookup<'a>(name: &str, ctx: &'a TemplateContext, item: Option<&'a Item>) -> Option<&'a str> {
    match (name.strip_prefix("item."), item) {
        (Some(field), Some(item)) => item.get(field).map(|s| s.as_str()),
        _ => ctx.get(name),
    }
}

fn render_nodes(
    nodes: &[Node],
    ctx: &TemplateContext,
    item: Option<&Item>,
    out: &mut String,
) -> Result<(), TemplateError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Value { name, filters } => {
                let value = lookup(name, ctx, item)
                    .ok_or_else(|| TemplateError::new(name, "no such value"))?;
                let mut value = value.to_string();
                for filter in filters {
                    value = apply_filter(filter, &value);
                }
                out.push_str(&value);
            }
            Node::Each { list, body } => {
                let items = ctx
                    .lists
                    .get(list)
                    .ok_or_else(|| TemplateError::new(list, "no such list"))?;
                for entry in items {
                    render_nodes(body, ctx, Some(entry), out)?;
                }
            }
            Node::If { flag, body } => {
                let value = lookup(flag, ctx, item)
                    .ok_or_else(|| TemplateError::new(flag, "no such value"))?;
                if is_truthy(value) {
                    render_nodes(body, ctx, item, out)?;
                }
            }
        }
    }
    Ok(())
}

fn is_truthy(value: &str) -> bool {
    !value.is_empty() && !value.eq_ignore_ascii_case("false")
}

fn apply_filter(filter: &str, value: &str) -> String {
    match filter {
        "quote" => quote(value),
        "capitalize" => capitalize(value),
        "ident" => ident(value),
        _ => value.to_string(),
    }
}

/// Double-quoted string literal, valid in both JSON and Python.
pub fn quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

pub fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Identifier-safe form: every character outside `[A-Za-z0-9_]` becomes `_`,
/// and a leading digit gets a `_` prefix.
pub fn ident(value: &str) -> String {
    let mut out: String = value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}
