/// Template scanning and path selection
///
/// Templates are `{{ path }}` markers inside strings. A path is a root name
/// followed by accessors: `step_1.body.items[0]`, `trigger['x y']`,
/// `connections['slack'].access_token`. Selection below the root is delegated to
/// `jsonpath_lib`.

use serde_json::Value;

/// One `{{ ... }}` occurrence inside a string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSpan {
    /// Byte offset of the opening `{{`
    pub start: usize,
    /// Byte offset just past the closing `}}`
    pub end: usize,
    /// Trimmed text between the braces
    pub expression: String,
}

/// One hop of a template path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    Key(String),
    Index(usize),
}

/// Find every template in `text`, left to right
///
/// An opening `{{` without a matching `}}` is left as literal text.
pub fn find_templates(text: &str) -> Vec<TemplateSpan> {
    let mut spans = Vec::new();
    let mut offset = 0;
    while let Some(open) = text[offset..].find("{{") {
        let start = offset + open;
        let Some(close) = text[start + 2..].find("}}") else {
            break;
        };
        let end = start + 2 + close + 2;
        spans.push(TemplateSpan {
            start,
            end,
            expression: text[start + 2..end - 2].trim().to_string(),
        });
        offset = end;
    }
    spans
}

/// Expression of a string that consists of exactly one template
pub fn single_template(text: &str) -> Option<String> {
    let spans = find_templates(text);
    match spans.as_slice() {
        [only] if only.start == 0 && only.end == text.len() => Some(only.expression.clone()),
        _ => None,
    }
}

/// Parse a template path into accessors
pub fn parse_path(expression: &str) -> anyhow::Result<Vec<Accessor>> {
    let chars: Vec<char> = expression.trim().chars().collect();
    let mut accessors = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '.' if !accessors.is_empty() => {
                i += 1;
                let (ident, next) = read_identifier(&chars, i);
                if ident.is_empty() {
                    return Err(anyhow::anyhow!("Expected a name after '.' in '{}'", expression));
                }
                accessors.push(Accessor::Key(ident));
                i = next;
            }
            '[' => {
                let (accessor, next) = read_bracket(&chars, i + 1, expression)?;
                accessors.push(accessor);
                i = next;
            }
            c if accessors.is_empty() && is_identifier_char(c) => {
                let (ident, next) = read_identifier(&chars, i);
                accessors.push(Accessor::Key(ident));
                i = next;
            }
            c => {
                return Err(anyhow::anyhow!("Unexpected '{}' at position {} in '{}'", c, i, expression));
            }
        }
    }

    if accessors.is_empty() {
        return Err(anyhow::anyhow!("Empty template path"));
    }
    Ok(accessors)
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn read_identifier(chars: &[char], start: usize) -> (String, usize) {
    let mut end = start;
    while end < chars.len() && is_identifier_char(chars[end]) {
        end += 1;
    }
    (chars[start..end].iter().collect(), end)
}

/// Parse the inside of `[...]`, `start` points just past the `[`
fn read_bracket(chars: &[char], start: usize, expression: &str) -> anyhow::Result<(Accessor, usize)> {
    let quote = chars.get(start).copied();
    if let Some(q @ ('\'' | '"')) = quote {
        let mut key = String::new();
        let mut i = start + 1;
        while i < chars.len() && chars[i] != q {
            // Backslash escapes the next character
            if chars[i] == '\\' && i + 1 < chars.len() {
                i += 1;
            }
            key.push(chars[i]);
            i += 1;
        }
        if chars.get(i) != Some(&q) || chars.get(i + 1) != Some(&']') {
            return Err(anyhow::anyhow!("Unterminated quoted key in '{}'", expression));
        }
        return Ok((Accessor::Key(key), i + 2));
    }

    let mut i = start;
    while i < chars.len() && chars[i] != ']' {
        i += 1;
    }
    if i >= chars.len() {
        return Err(anyhow::anyhow!("Missing ']' in '{}'", expression));
    }
    let raw: String = chars[start..i].iter().collect();
    let index = raw
        .trim()
        .parse::<usize>()
        .map_err(|_| anyhow::anyhow!("Invalid index '{}' in '{}'", raw, expression))?;
    Ok((Accessor::Index(index), i + 1))
}

/// Select the value addressed by `accessors` below `root`
///
/// Returns `None` when any hop is missing.
pub fn select(root: &Value, accessors: &[Accessor]) -> Option<Value> {
    if accessors.is_empty() {
        return Some(root.clone());
    }

    // jsonpath_lib has no escape syntax for quotes inside bracket keys
    let quoted = accessors
        .iter()
        .any(|a| matches!(a, Accessor::Key(k) if k.contains('\'') || k.contains('\\')));
    if quoted {
        return walk(root, accessors);
    }

    let path = to_json_path(accessors);
    match jsonpath_lib::select(root, &path) {
        Ok(found) => match found.first() {
            Some(value) => Some((*value).clone()),
            None => walk(root, accessors),
        },
        Err(e) => {
            tracing::debug!("🔍 JSONPath '{}' rejected: {:?}", path, e);
            walk(root, accessors)
        }
    }
}

fn to_json_path(accessors: &[Accessor]) -> String {
    let mut path = String::from("$");
    for accessor in accessors {
        match accessor {
            Accessor::Key(key) => path.push_str(&format!("['{}']", key)),
            Accessor::Index(index) => path.push_str(&format!("[{}]", index)),
        }
    }
    path
}

fn walk(root: &Value, accessors: &[Accessor]) -> Option<Value> {
    let mut current = root;
    for accessor in accessors {
        current = match (accessor, current) {
            (Accessor::Key(key), Value::Object(map)) => map.get(key)?,
            (Accessor::Index(index), Value::Array(items)) => items.get(*index)?,
            _ => return None,
        };
    }
    Some(current.clone())
}
