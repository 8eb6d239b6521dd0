//! # Claim Tree
//!
//! A credential's disclosable claims held as a labelled tree of object, array
//! and scalar nodes, independent of the encoding the credential arrived in.
//!
//! Claims are addressed using DCQL claims path pointers: a sequence of object
//! member names, array indices, and `null` (all elements of an array).

use std::fmt::{self, Display, Formatter};

use serde::de::{self, Deserializer};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A node in a credential's claim tree.
#[derive(Clone, Debug, PartialEq)]
pub enum ClaimNode {
    /// A leaf value: `null`, a boolean, a number or a string.
    Scalar(Value),

    /// Named members, in the order they appear in the credential.
    Object(Vec<(String, ClaimNode)>),

    /// Ordered elements.
    Array(Vec<ClaimNode>),
}

impl ClaimNode {
    /// Exact structural lookup of a concrete path.
    ///
    /// Returns `None` when any step is absent, when a step does not fit the
    /// node it is applied to, or when the path contains a wildcard.
    #[must_use]
    pub fn get(&self, path: &ClaimPath) -> Option<&Self> {
        path.steps().iter().try_fold(self, |node, step| match (node, step) {
            (Self::Object(members), PathStep::Key(key)) => {
                members.iter().find(|(name, _)| name == key).map(|(_, child)| child)
            }
            (Self::Array(elements), PathStep::Index(index)) => elements.get(*index),
            _ => None,
        })
    }

    /// Resolve a path that may contain wildcard steps, returning every node
    /// it selects along with that node's concrete path.
    pub(crate) fn select(&self, path: &ClaimPath) -> Vec<(ClaimPath, &Self)> {
        let mut selected = vec![(ClaimPath::default(), self)];

        for step in path.steps() {
            let mut next = vec![];
            for (at, node) in selected {
                match (node, step) {
                    (Self::Object(members), PathStep::Key(key)) => {
                        if let Some((_, child)) = members.iter().find(|(name, _)| name == key) {
                            next.push((at.child(step.clone()), child));
                        }
                    }
                    (Self::Array(elements), PathStep::Index(index)) => {
                        if let Some(child) = elements.get(*index) {
                            next.push((at.child(step.clone()), child));
                        }
                    }
                    (Self::Array(elements), PathStep::Wildcard) => {
                        for (index, child) in elements.iter().enumerate() {
                            next.push((at.child(PathStep::Index(index)), child));
                        }
                    }
                    // shape mismatch: the path does not exist here
                    _ => {}
                }
            }
            selected = next;
        }

        selected
    }

    /// The scalar value held by a leaf node.
    #[must_use]
    pub const fn as_scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// Convert the node back to JSON, preserving member order.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Scalar(value) => value.clone(),
            Self::Object(members) => Value::Object(
                members.iter().map(|(name, child)| (name.clone(), child.to_value())).collect(),
            ),
            Self::Array(elements) => Value::Array(elements.iter().map(Self::to_value).collect()),
        }
    }
}

impl From<&Value> for ClaimNode {
    fn from(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self::from(map),
            Value::Array(elements) => Self::Array(elements.iter().map(Self::from).collect()),
            scalar => Self::Scalar(scalar.clone()),
        }
    }
}

impl From<&Map<String, Value>> for ClaimNode {
    fn from(map: &Map<String, Value>) -> Self {
        Self::Object(map.iter().map(|(name, value)| (name.clone(), Self::from(value))).collect())
    }
}

/// A single step in a claims path pointer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathStep {
    /// Select an object member by name.
    Key(String),

    /// Select an array element by position.
    Index(usize),

    /// Select every element of an array (`null` in DCQL).
    Wildcard,
}

/// A claims path pointer: the location of one or more claims in a
/// credential.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClaimPath(Vec<PathStep>);

impl ClaimPath {
    /// Create a path from its steps.
    #[must_use]
    pub const fn new(steps: Vec<PathStep>) -> Self {
        Self(steps)
    }

    /// The path's steps, root first.
    #[must_use]
    pub fn steps(&self) -> &[PathStep] {
        &self.0
    }

    /// Number of steps in the path.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the path has no steps (the root).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the path identifies at most one node.
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        !self.0.contains(&PathStep::Wildcard)
    }

    /// Whether `prefix` is this path or one of its ancestors.
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// A new path one step below this one.
    #[must_use]
    pub fn child(&self, step: PathStep) -> Self {
        let mut steps = self.0.clone();
        steps.push(step);
        Self(steps)
    }
}

impl From<Vec<PathStep>> for ClaimPath {
    fn from(steps: Vec<PathStep>) -> Self {
        Self(steps)
    }
}

impl<const N: usize> From<[&str; N]> for ClaimPath {
    fn from(keys: [&str; N]) -> Self {
        Self(keys.iter().map(|key| PathStep::Key((*key).to_string())).collect())
    }
}

impl FromIterator<PathStep> for ClaimPath {
    fn from_iter<I: IntoIterator<Item = PathStep>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Display for ClaimPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, step) in self.0.iter().enumerate() {
            match step {
                PathStep::Key(key) if i == 0 => write!(f, "{key}")?,
                PathStep::Key(key) => write!(f, ".{key}")?,
                PathStep::Index(index) => write!(f, "[{index}]")?,
                PathStep::Wildcard => write!(f, "[*]")?,
            }
        }
        Ok(())
    }
}

// Serialized as a DCQL claims path pointer: `["degree", null, 0]`.
impl Serialize for ClaimPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for step in &self.0 {
            match step {
                PathStep::Key(key) => seq.serialize_element(key)?,
                PathStep::Index(index) => seq.serialize_element(index)?,
                PathStep::Wildcard => seq.serialize_element(&Value::Null)?,
            }
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ClaimPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let elements = Vec::<Value>::deserialize(deserializer)?;
        elements
            .into_iter()
            .map(|element| match element {
                Value::String(key) => Ok(PathStep::Key(key)),
                Value::Null => Ok(PathStep::Wildcard),
                Value::Number(n) => n
                    .as_u64()
                    .and_then(|index| usize::try_from(index).ok())
                    .map(PathStep::Index)
                    .ok_or_else(|| de::Error::custom(format!("invalid array index `{n}`"))),
                other => Err(de::Error::custom(format!("invalid path element `{other}`"))),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn degree() -> ClaimNode {
        ClaimNode::from(&json!({
            "type": ["VerifiableCredential", "ExampleDegree"],
            "credentialSubject": {
                "degree": {"type": "Bachelor", "name": "Bachelor of Science"},
                "address": {"city": "X"},
                "languages": [{"name": "en"}, {"name": "ja"}, "fr"]
            }
        }))
    }

    #[test]
    fn exact_lookup() {
        let tree = degree();
        let node = tree.get(&ClaimPath::from(["credentialSubject", "degree", "type"]));
        assert_eq!(node.and_then(ClaimNode::as_scalar), Some(&json!("Bachelor")));

        let index = ClaimPath::from(["type"]).child(PathStep::Index(1));
        assert_eq!(tree.get(&index).and_then(ClaimNode::as_scalar), Some(&json!("ExampleDegree")));
    }

    #[test]
    fn shape_mismatch_is_absent() {
        let tree = degree();

        // key step applied to a string
        assert!(tree.get(&ClaimPath::from(["credentialSubject", "degree", "type", "x"])).is_none());
        // index step applied to an object
        let path = ClaimPath::from(["credentialSubject"]).child(PathStep::Index(0));
        assert!(tree.get(&path).is_none());
        // wildcards are never resolved by exact lookup
        let path = ClaimPath::from(["credentialSubject", "languages"]).child(PathStep::Wildcard);
        assert!(tree.get(&path).is_none());
    }

    #[test]
    fn wildcard_selects_elements() {
        let tree = degree();
        let path = ClaimPath::from(["credentialSubject", "languages"])
            .child(PathStep::Wildcard)
            .child(PathStep::Key("name".to_string()));

        let selected = tree.select(&path);
        let paths = selected.iter().map(|(p, _)| p.to_string()).collect::<Vec<_>>();
        assert_eq!(
            paths,
            ["credentialSubject.languages[0].name", "credentialSubject.languages[1].name"]
        );
    }

    #[test]
    fn preserves_member_order() {
        let value = json!({"z": 1, "a": {"y": true, "b": null}});
        let tree = ClaimNode::from(&value);
        assert_eq!(serde_json::to_string(&tree.to_value()).unwrap(), value.to_string());
    }

    #[test]
    fn path_pointer_serde() {
        let path: ClaimPath = serde_json::from_value(json!(["items", null, 2])).unwrap();
        assert_eq!(path.to_string(), "items[*][2]");
        assert!(!path.is_concrete());
        assert_eq!(serde_json::to_value(&path).unwrap(), json!(["items", null, 2]));

        assert!(serde_json::from_value::<ClaimPath>(json!(["items", -1])).is_err());
        assert!(serde_json::from_value::<ClaimPath>(json!([true])).is_err());
    }
}
