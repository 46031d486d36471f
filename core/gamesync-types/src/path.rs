//! Dot-path addressing into JSON state trees.
//!
//! A path such as `players[0].money` is a sequence of object keys and array
//! indices. The empty path addresses the root of the tree.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// One step of a [`StatePath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    /// Object member access.
    Key(String),
    /// Array element access.
    Index(usize),
}

/// A parsed location in the state tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatePath {
    segments: Vec<PathSegment>,
}

impl StatePath {
    /// The root path (addresses the whole tree).
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses a dot-path like `board.spaces[3].owner`.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidPath {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        if raw.is_empty() {
            return Ok(Self { segments });
        }

        for (n, part) in raw.split('.').enumerate() {
            if part.is_empty() {
                return Err(invalid("empty segment"));
            }
            let (key, mut rest) = match part.find('[') {
                Some(i) => (&part[..i], &part[i..]),
                None => (part, ""),
            };
            if key.contains(']') {
                return Err(invalid("unbalanced `]`"));
            }
            if key.is_empty() {
                // Only a leading segment may start with an index (`[0].name`).
                if n > 0 {
                    return Err(invalid("empty key before index"));
                }
            } else {
                segments.push(PathSegment::Key(key.to_string()));
            }

            while !rest.is_empty() {
                if !rest.starts_with('[') {
                    return Err(invalid("unexpected characters after index"));
                }
                let close = rest.find(']').ok_or_else(|| invalid("unterminated `[`"))?;
                let index: usize = rest[1..close]
                    .parse()
                    .map_err(|_| invalid("index is not a non-negative integer"))?;
                segments.push(PathSegment::Index(index));
                rest = &rest[close + 1..];
            }
        }

        Ok(Self { segments })
    }

    /// Returns the path segments.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Returns true if this path addresses the whole tree.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Appends a relative path (e.g. a batch member key) to this one.
    pub fn join(&self, relative: &str) -> Result<Self> {
        let tail = Self::parse(relative)?;
        let mut segments = self.segments.clone();
        segments.extend(tail.segments);
        Ok(Self { segments })
    }

    /// Returns the value at this path, if present.
    #[must_use]
    pub fn get<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.segments.iter().try_fold(root, |node, seg| match seg {
            PathSegment::Key(k) => node.get(k.as_str()),
            PathSegment::Index(i) => node.get(*i),
        })
    }

    /// Returns a mutable reference to the value at this path, if present.
    pub fn get_mut<'a>(&self, root: &'a mut Value) -> Option<&'a mut Value> {
        self.segments.iter().try_fold(root, |node, seg| match seg {
            PathSegment::Key(k) => node.get_mut(k.as_str()),
            PathSegment::Index(i) => node.get_mut(*i),
        })
    }

    /// Writes `value` at this path.
    ///
    /// Missing object members are created along the way; a null parent is
    /// promoted to an object or array as needed. An array index may address an
    /// existing element or the slot one past the end (append).
    pub fn set(&self, root: &mut Value, value: Value) -> Result<()> {
        let rendered = self.to_string();
        set_in(root, &self.segments, value, &rendered)
    }

    /// Removes the value at this path and returns it.
    ///
    /// Returns `Ok(None)` when nothing is stored there. Removing the root
    /// replaces the tree with `null`.
    pub fn remove(&self, root: &mut Value) -> Result<Option<Value>> {
        let Some((last, parents)) = self.segments.split_last() else {
            return Ok(Some(std::mem::take(root)));
        };
        let parent_path = Self {
            segments: parents.to_vec(),
        };
        let Some(parent) = parent_path.get_mut(root) else {
            return Ok(None);
        };
        match (last, parent) {
            (PathSegment::Key(k), Value::Object(obj)) => Ok(obj.remove(k.as_str())),
            (PathSegment::Index(i), Value::Array(arr)) if *i < arr.len() => Ok(Some(arr.remove(*i))),
            (PathSegment::Index(_), Value::Array(_)) => Ok(None),
            (PathSegment::Key(_), _) => Err(Error::TypeMismatch {
                path: self.to_string(),
                expected: "object",
            }),
            (PathSegment::Index(_), _) => Err(Error::TypeMismatch {
                path: self.to_string(),
                expected: "array",
            }),
        }
    }
}

fn set_in(target: &mut Value, segments: &[PathSegment], value: Value, path: &str) -> Result<()> {
    let Some((first, rest)) = segments.split_first() else {
        *target = value;
        return Ok(());
    };

    match first {
        PathSegment::Key(k) => {
            if target.is_null() {
                *target = Value::Object(Map::new());
            }
            let obj = target.as_object_mut().ok_or_else(|| Error::TypeMismatch {
                path: path.to_string(),
                expected: "object",
            })?;
            if rest.is_empty() {
                obj.insert(k.clone(), value);
                return Ok(());
            }
            let child = obj.entry(k.clone()).or_insert(Value::Null);
            set_in(child, rest, value, path)
        }
        PathSegment::Index(i) => {
            if target.is_null() {
                *target = Value::Array(Vec::new());
            }
            let arr = target.as_array_mut().ok_or_else(|| Error::TypeMismatch {
                path: path.to_string(),
                expected: "array",
            })?;
            if *i == arr.len() {
                arr.push(Value::Null);
            } else if *i > arr.len() {
                return Err(Error::PathNotFound(path.to_string()));
            }
            set_in(&mut arr[*i], rest, value, path)
        }
    }
}

impl fmt::Display for StatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (n, seg) in self.segments.iter().enumerate() {
            match seg {
                PathSegment::Key(k) if n == 0 => f.write_str(k)?,
                PathSegment::Key(k) => write!(f, ".{k}")?,
                PathSegment::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

impl FromStr for StatePath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for StatePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StatePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
