use chrono::NaiveDate;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Resolved configuration tree. Aliases are already expanded, so every
/// subtree is owned and value-equal to the anchor it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    Str(String),
    Seq(Vec<Node>),
    Map(Mapping),
}

/// Mapping with unique string keys that keeps declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    entries: Vec<(String, Node)>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Node> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Inserts or replaces in place; a replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: Node) -> Option<Node> {
        let key = key.into();
        if let Some(slot) = self.get_mut(&key) {
            return Some(std::mem::replace(slot, value));
        }
        self.entries.push((key, value));
        None
    }

    pub fn remove(&mut self, key: &str) -> Option<Node> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl FromIterator<(String, Node)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (String, Node)>>(iter: I) -> Self {
        let mut mapping = Mapping::new();
        for (key, value) in iter {
            mapping.insert(key, value);
        }
        mapping
    }
}

impl IntoIterator for Mapping {
    type Item = (String, Node);
    type IntoIter = std::vec::IntoIter<(String, Node)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Node {
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Bool(_) => "bool",
            Node::Int(_) => "int",
            Node::Float(_) => "float",
            Node::Date(_) => "date",
            Node::Str(_) => "string",
            Node::Seq(_) => "sequence",
            Node::Map(_) => "mapping",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Map(mapping) => mapping.get(key),
            _ => None,
        }
    }

    /// Dotted lookup; numeric segments index into sequences (`task.record.0.class`).
    pub fn get_path(&self, path: &str) -> Option<&Node> {
        let mut current = self;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            current = match current {
                Node::Map(mapping) => mapping.get(segment)?,
                Node::Seq(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Node::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Node::Int(v) => Some(*v as f64),
            Node::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Node::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Node]> {
        match self {
            Node::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Mapping> {
        match self {
            Node::Map(mapping) => Some(mapping),
            _ => None,
        }
    }

    /// JSON projection; dates become `YYYY-MM-DD` strings, non-finite floats become null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Node::Null => serde_json::Value::Null,
            Node::Bool(b) => serde_json::Value::Bool(*b),
            Node::Int(v) => serde_json::Value::from(*v),
            Node::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Node::Date(d) => serde_json::Value::String(d.format(DATE_FORMAT).to_string()),
            Node::Str(s) => serde_json::Value::String(s.clone()),
            Node::Seq(items) => serde_json::Value::Array(items.iter().map(Node::to_json).collect()),
            Node::Map(mapping) => serde_json::Value::Object(
                mapping
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::Str(value.to_string())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::Str(value)
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Node::Int(value)
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Node::Bool(value)
    }
}

impl From<Mapping> for Node {
    fn from(value: Mapping) -> Self {
        Node::Map(value)
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Null => serializer.serialize_unit(),
            Node::Bool(b) => serializer.serialize_bool(*b),
            Node::Int(v) => serializer.serialize_i64(*v),
            Node::Float(v) => serializer.serialize_f64(*v),
            Node::Date(d) => serializer.serialize_str(&d.format(DATE_FORMAT).to_string()),
            Node::Str(s) => serializer.serialize_str(s),
            Node::Seq(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Node::Map(mapping) => {
                let mut map = serializer.serialize_map(Some(mapping.len()))?;
                for (key, value) in mapping.iter() {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Mapping, Node};
    use chrono::NaiveDate;

    fn sample() -> Node {
        let mut kwargs = Mapping::new();
        kwargs.insert("topk", Node::Int(50));
        let mut strategy = Mapping::new();
        strategy.insert("class", Node::from("TopkDropoutStrategy"));
        strategy.insert("kwargs", Node::Map(kwargs));
        let mut root = Mapping::new();
        root.insert("strategy", Node::Map(strategy));
        root.insert(
            "segments",
            Node::Seq(vec![Node::Date(
                NaiveDate::from_ymd_opt(2008, 1, 1).expect("date"),
            )]),
        );
        Node::Map(root)
    }

    #[test]
    fn get_path_walks_mappings_and_sequences() {
        let node = sample();
        assert_eq!(
            node.get_path("strategy.kwargs.topk").and_then(Node::as_i64),
            Some(50)
        );
        assert!(node.get_path("segments.0").and_then(Node::as_date).is_some());
        assert!(node.get_path("segments.1").is_none());
        assert!(node.get_path("strategy.class.inner").is_none());
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut mapping = Mapping::new();
        mapping.insert("a", Node::Int(1));
        mapping.insert("b", Node::Int(2));
        let old = mapping.insert("a", Node::Int(3));
        assert_eq!(old, Some(Node::Int(1)));
        assert_eq!(mapping.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(mapping.get("a"), Some(&Node::Int(3)));
    }

    #[test]
    fn json_projection_formats_dates_and_keeps_numbers() {
        let json = sample().to_json();
        assert_eq!(json["segments"][0], "2008-01-01");
        assert_eq!(json["strategy"]["kwargs"]["topk"], 50);
        assert_eq!(Node::Float(f64::NAN).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn as_f64_widens_ints() {
        assert_eq!(Node::Int(5).as_f64(), Some(5.0));
        assert_eq!(Node::Float(0.5).as_f64(), Some(0.5));
        assert_eq!(Node::from("x").as_f64(), None);
    }
}
