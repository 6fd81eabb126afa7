//! Dotted/bracketed path addressing into JSON values
//!
//! Paths look like `data.items[0].name`. The root is written `.`. A key that
//! itself contains `.` or `[` can be addressed with a quoted bracket segment,
//! e.g. `meta["content.type"]`.

use serde_json::Value;

/// Root path marker
pub const ROOT: &str = ".";

/// One step of a parsed path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Whether an expectation key should be treated as a path rather than a literal key
///
/// Any key containing `.` or `[` is a path. There is no way to address a literal
/// dotted key through plain dotted syntax; use a quoted bracket segment instead.
pub fn looks_like_path(key: &str) -> bool {
    key.contains('.') || key.contains('[')
}

/// Whether an expectation object should be evaluated as path-addressed assertions
///
/// True when the value is a non-empty object and at least one of its keys looks
/// like a path. Plain keys in such an object are resolved as single-segment paths.
pub fn is_path_expectation(expected: &Value) -> bool {
    match expected {
        Value::Object(map) => map.keys().any(|k| looks_like_path(k)),
        _ => false,
    }
}

/// Parse a path string into segments
pub fn parse(path: &str) -> Result<Vec<Segment>, String> {
    let path = path.trim();
    let path = path.strip_prefix('$').unwrap_or(path);
    let mut segments = Vec::new();
    let chars: Vec<char> = path.chars().collect();
    let mut i = 0;
    let mut key = String::new();

    while i < chars.len() {
        match chars[i] {
            '.' => {
                if !key.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut key)));
                }
                i += 1;
            }
            '[' => {
                if !key.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut key)));
                }
                let close = chars[i..]
                    .iter()
                    .position(|&c| c == ']')
                    .map(|p| p + i)
                    .ok_or_else(|| format!("unclosed '[' in path '{path}'"))?;
                let inner: String = chars[i + 1..close].iter().collect();
                segments.push(parse_bracket(&inner, path)?);
                i = close + 1;
            }
            c => {
                key.push(c);
                i += 1;
            }
        }
    }
    if !key.is_empty() {
        segments.push(Segment::Key(key));
    }
    Ok(segments)
}

fn parse_bracket(inner: &str, path: &str) -> Result<Segment, String> {
    let inner = inner.trim();
    for quote in ['"', '\''] {
        if let Some(rest) = inner.strip_prefix(quote) {
            return rest
                .strip_suffix(quote)
                .map(|k| Segment::Key(k.to_string()))
                .ok_or_else(|| format!("unterminated quoted key in path '{path}'"));
        }
    }
    inner
        .parse::<usize>()
        .map(Segment::Index)
        .map_err(|_| format!("invalid index '[{inner}]' in path '{path}'"))
}

/// Resolve parsed segments against a value
pub fn resolve<'a>(value: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    segments.iter().try_fold(value, |current, segment| match segment {
        Segment::Key(key) => current.as_object()?.get(key),
        Segment::Index(index) => current.as_array()?.get(*index),
    })
}

/// Parse and resolve in one step; `None` when the path is invalid or absent
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    parse(path).ok().and_then(|segments| resolve(value, &segments))
}

/// Path of an object member under `parent`
pub fn child_key(parent: &str, key: &str) -> String {
    let segment = if looks_like_path(key) || key.is_empty() {
        format!("[\"{key}\"]")
    } else {
        key.to_string()
    };
    if parent == ROOT {
        segment
    } else if segment.starts_with('[') {
        format!("{parent}{segment}")
    } else {
        format!("{parent}.{segment}")
    }
}

/// Path of an array element under `parent`
pub fn child_index(parent: &str, index: usize) -> String {
    if parent == ROOT {
        format!("[{index}]")
    } else {
        format!("{parent}[{index}]")
    }
}

/// Nest a path reported relative to some sub-value under `prefix`
pub fn prefixed(prefix: &str, path: &str) -> String {
    if path == ROOT {
        prefix.to_string()
    } else if prefix == ROOT || prefix.is_empty() {
        path.to_string()
    } else if path.starts_with('[') {
        format!("{prefix}{path}")
    } else {
        format!("{prefix}.{path}")
    }
}

/// Convert a JSON pointer (`/data/0/name`) into dotted path form (`data[0].name`)
pub fn from_json_pointer(pointer: &str) -> String {
    let mut path = ROOT.to_string();
    for raw in pointer.split('/').skip(1) {
        let token = raw.replace("~1", "/").replace("~0", "~");
        path = match token.parse::<usize>() {
            Ok(index) => child_index(&path, index),
            Err(_) => child_key(&path, &token),
        };
    }
    path
}
