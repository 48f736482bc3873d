// vartree
// SPDX-License-Identifier: MPL-2.0

//! Binding path grammar and resolution (spec.md §4.4). Paths are immutable
//! once parsed and are cached by source string via `PathCache`.
//!
//! Design Notes §9 re-architects the original's reflection-based field and
//! method access as a small interface: plain property/index lookups
//! traverse JSON directly, and a `methods` callback supplied by the caller
//! stands in for "the mutator surfaces values as uniform JSON documents and
//! binds methods via a name→closure table".

use std::collections::HashMap;
use std::sync::Arc;

use vartree_core::sync::RwLock;
use vartree_core::{trace_read_lock, trace_write_lock};
use vartree_types::{Value, VartreeError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// `@name`, only valid as the first segment.
    Standard(String),
    /// Property lookup on the current value (the default token kind).
    Property(String),
    /// 1-based index into an ordered sequence.
    Index(usize),
    /// Zero-arg method call on the current value.
    Method(String),
    /// `..`, parent traversal.
    Parent,
}

/// A compiled path. Immutable and cheap to clone (behind `Arc` via
/// `PathCache`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    source: String,
    segments: Vec<Segment>,
}

impl Path {
    pub fn parse(source: &str) -> Result<Path, VartreeError> {
        if source.is_empty() {
            return Err(VartreeError::BadRequest("empty path".to_owned()));
        }
        let tokens: Vec<&str> = source.split('.').collect();
        let mut segments = Vec::new();
        for (i, token) in tokens.iter().enumerate() {
            if token.is_empty() {
                return Err(VartreeError::BadRequest(format!(
                    "empty path segment in {source:?}"
                )));
            }
            segments.extend(parse_token(token, i == 0, source)?);
        }
        for (i, seg) in segments.iter().enumerate() {
            if matches!(seg, Segment::Standard(_)) && i != 0 {
                return Err(VartreeError::BadRequest(format!(
                    "@name is only valid as the first segment in {source:?}"
                )));
            }
        }
        Ok(Path {
            source: source.to_owned(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

fn parse_token(token: &str, is_first: bool, source: &str) -> Result<Vec<Segment>, VartreeError> {
    if is_first {
        if let Some(name) = token.strip_prefix('@') {
            if name.is_empty() {
                return Err(VartreeError::BadRequest(format!(
                    "empty standard-variable name in {source:?}"
                )));
            }
            return Ok(vec![Segment::Standard(name.to_owned())]);
        }
    }
    if token == ".." {
        return Ok(vec![Segment::Parent]);
    }
    if is_decimal_index(token) {
        return Ok(vec![Segment::Index(parse_index(token, source)?)]);
    }
    if let Some(ident) = token.strip_suffix("()") {
        if !ident.is_empty() && is_identifier(ident) {
            return Ok(vec![Segment::Method(ident.to_owned())]);
        }
    }
    if let Some(bracket_pos) = token.find('[') {
        let ident = &token[..bracket_pos];
        let mut segs = Vec::new();
        if !ident.is_empty() {
            segs.push(Segment::Property(ident.to_owned()));
        }
        let mut rest = &token[bracket_pos..];
        while !rest.is_empty() {
            if !rest.starts_with('[') {
                return Err(VartreeError::BadRequest(format!(
                    "malformed index suffix in {source:?}"
                )));
            }
            let close = rest.find(']').ok_or_else(|| {
                VartreeError::BadRequest(format!("unterminated index suffix in {source:?}"))
            })?;
            segs.push(Segment::Index(parse_index(&rest[1..close], source)?));
            rest = &rest[close + 1..];
        }
        return Ok(segs);
    }
    Ok(vec![Segment::Property(token.to_owned())])
}

fn is_decimal_index(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

fn parse_index(raw: &str, source: &str) -> Result<usize, VartreeError> {
    let n: usize = raw
        .parse()
        .map_err(|_| VartreeError::BadRequest(format!("invalid index in {source:?}")))?;
    if n == 0 {
        return Err(VartreeError::BadRequest(format!(
            "index 0 is invalid, indices are 1-based in {source:?}"
        )));
    }
    Ok(n)
}

fn is_identifier(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parsed paths are cached by source string (spec.md §3, §4.4).
#[derive(Default)]
pub struct PathCache {
    cache: RwLock<HashMap<String, Arc<Path>>>,
}

impl PathCache {
    pub fn new() -> Self {
        PathCache::default()
    }

    pub fn get_or_parse(&self, source: &str) -> Result<Arc<Path>, VartreeError> {
        if let Some(p) = trace_read_lock!(self.cache).get(source) {
            return Ok(p.clone());
        }
        let parsed = Arc::new(Path::parse(source)?);
        trace_write_lock!(self.cache).insert(source.to_owned(), parsed.clone());
        Ok(parsed)
    }
}

/// Context supplied by the caller for segments the navigator cannot
/// resolve on its own: `@name` standard-variable lookups, `..` parent
/// traversal, and zero-arg method calls (spec.md §4.4; Design Notes §9).
pub struct ResolveContext<'a> {
    /// Values of enclosing variables, innermost last, consumed one per
    /// `..` segment encountered.
    pub ancestors: &'a [Value],
    pub standards: &'a dyn Fn(&str) -> Option<Value>,
    pub methods: &'a dyn Fn(&Value, &str) -> Option<Value>,
}

impl<'a> ResolveContext<'a> {
    pub fn none() -> ResolveContext<'static> {
        ResolveContext {
            ancestors: &[],
            standards: &|_| None,
            methods: &|_, _| None,
        }
    }
}

/// Resolves `path` against `root` for reading (spec.md §4.4). Encountering
/// `null` before the end of the path fails with "cannot navigate nil".
pub fn resolve(root: &Value, path: &Path, ctx: &ResolveContext) -> Result<Value, VartreeError> {
    let mut current = root.clone();
    let mut ancestor_idx = ctx.ancestors.len();

    for seg in path.segments() {
        if current.is_null() && !matches!(seg, Segment::Standard(_)) {
            return Err(VartreeError::Validation("cannot navigate nil".to_owned()));
        }
        current = match seg {
            Segment::Standard(name) => (ctx.standards)(name).ok_or_else(|| {
                VartreeError::Validation(format!("unknown standard variable @{name}"))
            })?,
            Segment::Parent => {
                if ancestor_idx == 0 {
                    return Err(VartreeError::Validation(
                        "no parent context available".to_owned(),
                    ));
                }
                ancestor_idx -= 1;
                ctx.ancestors[ancestor_idx].clone()
            }
            Segment::Property(name) => match &current {
                Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Null),
                other => {
                    return Err(VartreeError::Validation(format!(
                        "cannot read property {name:?} of {other:?}"
                    )))
                }
            },
            Segment::Index(i) => match &current {
                Value::Array(items) => items.get(i - 1).cloned().unwrap_or(Value::Null),
                other => {
                    return Err(VartreeError::Validation(format!(
                        "cannot index {other:?} with [{i}]"
                    )))
                }
            },
            Segment::Method(name) => (ctx.methods)(&current, name).ok_or_else(|| {
                VartreeError::Validation(format!("method {name:?} not found"))
            })?,
        };
    }
    Ok(current)
}

/// Where a write should land: the container holding the final segment, and
/// the key or 1-based index within it. The last segment must be a property
/// or index (spec.md §4.4); `Parent`/`Standard`/`Method` segments may only
/// appear before the last one, and only the variable store (not this
/// module) resolves which *variable* they point into before delegating the
/// remaining suffix here as a fresh JSON sub-path.
pub enum WriteTarget<'a> {
    Property(&'a mut Value, String),
    Index(&'a mut Value, usize),
}

pub fn resolve_for_write<'a>(
    root: &'a mut Value,
    path: &Path,
) -> Result<WriteTarget<'a>, VartreeError> {
    let segments = path.segments();
    let (last, init) = segments
        .split_last()
        .ok_or_else(|| VartreeError::BadRequest("empty path".to_owned()))?;

    let mut current = root;
    for seg in init {
        current = match seg {
            Segment::Property(name) => {
                if !current.is_object() {
                    *current = Value::Object(Default::default());
                }
                current
                    .as_object_mut()
                    .expect("just normalized to object")
                    .entry(name.clone())
                    .or_insert(Value::Null)
            }
            Segment::Index(i) => {
                if !current.is_array() {
                    *current = Value::Array(Vec::new());
                }
                let arr = current.as_array_mut().expect("just normalized to array");
                while arr.len() < *i {
                    arr.push(Value::Null);
                }
                &mut arr[*i - 1]
            }
            Segment::Parent | Segment::Standard(_) | Segment::Method(_) => {
                return Err(VartreeError::Validation(
                    "parent/standard/method segments are not supported mid-path for writes"
                        .to_owned(),
                ));
            }
        };
    }

    match last {
        Segment::Property(name) => Ok(WriteTarget::Property(current, name.clone())),
        Segment::Index(i) => Ok(WriteTarget::Index(current, *i)),
        _ => Err(VartreeError::Validation(
            "the last path segment must be a property or index".to_owned(),
        )),
    }
}
