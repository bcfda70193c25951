//! Structural diff between two JSON trees.
//!
//! The comparison is positional: objects are matched key by key, arrays
//! index by index, and anything else is either equal or replaced wholesale.
//! There is no move or reorder detection, which keeps the result linear in
//! the size of the inputs and fully determined by them.
//!
//! Operations are reported in a fixed order so that two runs over the same
//! inputs produce identical diffs, regardless of how the underlying map
//! orders its keys:
//!
//! - object keys are visited in lexicographic order;
//! - array elements present in both sides come first, ascending, then
//!   trailing removals in descending index order, then trailing additions in
//!   ascending order.
//!
//! The latter ordering means the report can be applied front to back as an
//! RFC 6902 JSON Patch, which is how the history backend persists revisions.

use std::collections::BTreeSet;
use std::fmt::Display;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// One step into a document tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

/// Location in a document tree, from the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path(Vec<PathStep>);

impl Path {
    pub fn root() -> Path {
        Path(Vec::new())
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// RFC 6901 JSON Pointer rendering, e.g. `/servers/0/host`.
    pub fn to_pointer(&self) -> String {
        let mut s = String::new();
        for step in &self.0 {
            s.push('/');
            match step {
                PathStep::Key(k) => s.push_str(&k.replace('~', "~0").replace('/', "~1")),
                PathStep::Index(i) => s.push_str(&i.to_string()),
            }
        }
        s
    }
}

impl<S: Into<String>> FromIterator<S> for Path {
    /// Build a path of object keys only.
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Path(iter.into_iter().map(|k| PathStep::Key(k.into())).collect())
    }
}

impl From<Vec<PathStep>> for Path {
    fn from(steps: Vec<PathStep>) -> Self {
        Path(steps)
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_root() {
            f.write_str("/")
        } else {
            f.write_str(&self.to_pointer())
        }
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_pointer())
    }
}

/// A single change. Serializes as an RFC 6902 operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum DiffOp {
    Add { path: Path, value: Value },
    Remove { path: Path },
    Replace { path: Path, value: Value },
    /// Never produced by [`diff`]; part of the report vocabulary so that
    /// diffs from other producers can be represented.
    Move { from: Path, path: Path },
}

impl DiffOp {
    pub fn path(&self) -> &Path {
        match self {
            DiffOp::Add { path, .. }
            | DiffOp::Remove { path }
            | DiffOp::Replace { path, .. }
            | DiffOp::Move { path, .. } => path,
        }
    }
}

impl Display for DiffOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffOp::Add { path, value } => write!(f, "add {} = {}", path, value),
            DiffOp::Remove { path } => write!(f, "remove {}", path),
            DiffOp::Replace { path, value } => write!(f, "replace {} = {}", path, value),
            DiffOp::Move { from, path } => write!(f, "move {} -> {}", from, path),
        }
    }
}

/// Ordered list of changes turning one document into another.
///
/// An empty diff means the two documents are equal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct Diff(Vec<DiffOp>);

impl Diff {
    pub fn empty() -> Diff {
        Diff(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn ops(&self) -> &[DiffOp] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DiffOp> {
        self.0.iter()
    }

    pub fn into_ops(self) -> Vec<DiffOp> {
        self.0
    }

    /// Convert into a `json-patch` document with the same operations.
    pub fn to_json_patch(&self) -> Result<json_patch::Patch> {
        let value = serde_json::to_value(self)
            .map_err(|e| Error::malformed(format!("could not serialize diff: {}", e)))?;
        serde_json::from_value(value)
            .map_err(|e| Error::malformed(format!("diff is not a valid JSON patch: {}", e)))
    }
}

impl From<Vec<DiffOp>> for Diff {
    fn from(ops: Vec<DiffOp>) -> Self {
        Diff(ops)
    }
}

impl IntoIterator for Diff {
    type Item = DiffOp;
    type IntoIter = std::vec::IntoIter<DiffOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diff {
    type Item = &'a DiffOp;
    type IntoIter = std::slice::Iter<'a, DiffOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Compute the changes that turn `current` into `latest`.
pub fn diff(current: &Value, latest: &Value) -> Diff {
    let mut walker = Walker {
        path: Vec::new(),
        ops: Vec::new(),
    };
    walker.value(current, latest);
    Diff(walker.ops)
}

struct Walker {
    /// Path of the node being compared; pushed and popped while descending
    path: Vec<PathStep>,
    ops: Vec<DiffOp>,
}

impl Walker {
    fn here(&self) -> Path {
        Path(self.path.clone())
    }

    fn child(&self, step: PathStep) -> Path {
        let mut steps = self.path.clone();
        steps.push(step);
        Path(steps)
    }

    fn value(&mut self, a: &Value, b: &Value) {
        match (a, b) {
            (Value::Object(a), Value::Object(b)) => self.object(a, b),
            (Value::Array(a), Value::Array(b)) => self.array(a, b),
            _ if a == b => {}
            _ => self.ops.push(DiffOp::Replace {
                path: self.here(),
                value: b.clone(),
            }),
        }
    }

    fn object(&mut self, a: &Map<String, Value>, b: &Map<String, Value>) {
        let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
        for key in keys {
            match (a.get(key), b.get(key)) {
                (Some(av), Some(bv)) => {
                    self.path.push(PathStep::Key(key.clone()));
                    self.value(av, bv);
                    self.path.pop();
                }
                (Some(_), None) => self.ops.push(DiffOp::Remove {
                    path: self.child(PathStep::Key(key.clone())),
                }),
                (None, Some(bv)) => self.ops.push(DiffOp::Add {
                    path: self.child(PathStep::Key(key.clone())),
                    value: bv.clone(),
                }),
                (None, None) => unreachable!("key comes from one of the maps"),
            }
        }
    }

    fn array(&mut self, a: &[Value], b: &[Value]) {
        let shared = a.len().min(b.len());
        for i in 0..shared {
            self.path.push(PathStep::Index(i));
            self.value(&a[i], &b[i]);
            self.path.pop();
        }
        for i in (shared..a.len()).rev() {
            self.ops.push(DiffOp::Remove {
                path: self.child(PathStep::Index(i)),
            });
        }
        for (i, bv) in b.iter().enumerate().skip(shared) {
            self.ops.push(DiffOp::Add {
                path: self.child(PathStep::Index(i)),
                value: bv.clone(),
            });
        }
    }
}
