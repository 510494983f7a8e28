use super::error::ParseError;
use super::events::{Event, EventReader, Properties, Scalar};
use super::scalar::{format_float, resolve_plain};
use crate::value_objects::mark::Mark;
use crate::value_objects::node::{Mapping, Node, DATE_FORMAT};
use std::collections::HashMap;

/// Collections nested deeper than this are rejected instead of recursing further.
const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorInfo {
    pub name: String,
    pub line: usize,
    pub kind: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub root: Node,
    pub anchors: Vec<AnchorInfo>,
}

enum Anchor {
    /// Opened on a collection whose end has not been reached yet.
    Open { line: usize },
    Done { node: Node, line: usize },
}

/// Builds a [`Node`] tree from the libyaml event stream, resolving aliases
/// into copies and enforcing the anchor and key rules on top.
pub(crate) struct Parser<'a> {
    events: EventReader<'a>,
    anchors: HashMap<String, Anchor>,
    anchor_order: Vec<AnchorInfo>,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(src: &'a str) -> Result<Self, ParseError> {
        Ok(Self {
            events: EventReader::new(src)?,
            anchors: HashMap::new(),
            anchor_order: Vec::new(),
        })
    }

    pub(crate) fn parse(mut self) -> Result<Document, ParseError> {
        let (event, mark) = self.events.next_event()?;
        if event != Event::StreamStart {
            return Err(ParseError::syntax("expected the start of a document stream", mark));
        }

        let root = match self.events.next_event()? {
            (Event::StreamEnd, _) => Node::Null,
            (Event::DocumentStart, _) => {
                let (event, mark) = self.events.next_event()?;
                let root = self.node(event, mark, 0)?;
                let (event, mark) = self.events.next_event()?;
                if event != Event::DocumentEnd {
                    return Err(ParseError::syntax("expected the end of the document", mark));
                }
                match self.events.next_event()? {
                    (Event::StreamEnd, _) => {}
                    (Event::DocumentStart, mark) => {
                        return Err(ParseError::syntax(
                            "only one document per file is supported",
                            mark,
                        ))
                    }
                    (_, mark) => {
                        return Err(ParseError::syntax("expected the end of the stream", mark))
                    }
                }
                root
            }
            (_, mark) => return Err(ParseError::syntax("expected a document", mark)),
        };

        Ok(Document {
            root,
            anchors: self.anchor_order,
        })
    }

    fn node(&mut self, event: Event, mark: Mark, depth: usize) -> Result<Node, ParseError> {
        match event {
            Event::Alias(name) => self.alias(name, mark),
            Event::Scalar(scalar) => {
                check_tag(&scalar.props, mark)?;
                let node = scalar_node(&scalar);
                if let Some(name) = &scalar.props.anchor {
                    let slot = self.open_anchor(name, mark)?;
                    self.close_anchor(name, slot, &node);
                }
                Ok(node)
            }
            Event::SequenceStart(props) => {
                check_tag(&props, mark)?;
                let depth = enter(depth, mark)?;
                let slot = self.open_props(&props, mark)?;
                let mut items = Vec::new();
                loop {
                    let (event, item_mark) = self.events.next_event()?;
                    if event == Event::SequenceEnd {
                        break;
                    }
                    items.push(self.node(event, item_mark, depth)?);
                }
                let node = Node::Seq(items);
                self.close_props(&props, slot, &node);
                Ok(node)
            }
            Event::MappingStart(props) => {
                check_tag(&props, mark)?;
                let depth = enter(depth, mark)?;
                let slot = self.open_props(&props, mark)?;
                let mut builder = MapBuilder::default();
                loop {
                    let (event, key_mark) = self.events.next_event()?;
                    if event == Event::MappingEnd {
                        break;
                    }
                    let (key, mergeable) = self.key(event, key_mark)?;
                    let (event, value_mark) = self.events.next_event()?;
                    let value = self.node(event, value_mark, depth)?;
                    builder.add(key, mergeable, value, key_mark)?;
                }
                let node = Node::Map(builder.finish());
                self.close_props(&props, slot, &node);
                Ok(node)
            }
            other => Err(ParseError::syntax(
                format!("unexpected {other:?} where a value was expected"),
                mark,
            )),
        }
    }

    /// Mapping keys are scalars (or aliases to scalars); `<<` only merges when plain.
    fn key(&mut self, event: Event, mark: Mark) -> Result<(String, bool), ParseError> {
        match event {
            Event::Scalar(scalar) => {
                check_tag(&scalar.props, mark)?;
                if let Some(name) = &scalar.props.anchor {
                    let slot = self.open_anchor(name, mark)?;
                    self.close_anchor(name, slot, &scalar_node(&scalar));
                }
                let mergeable = scalar.style.is_plain() && scalar.value == "<<";
                Ok((scalar.value, mergeable))
            }
            Event::Alias(name) => {
                let node = self.alias(name, mark)?;
                let key = key_text(&node).ok_or_else(|| {
                    ParseError::syntax(
                        format!("mapping keys must be scalars, found {}", node.kind()),
                        mark,
                    )
                })?;
                Ok((key, false))
            }
            Event::SequenceStart(_) | Event::MappingStart(_) => Err(ParseError::syntax(
                "mapping keys must be scalars",
                mark,
            )),
            other => Err(ParseError::syntax(
                format!("unexpected {other:?} where a key was expected"),
                mark,
            )),
        }
    }

    fn alias(&self, name: String, mark: Mark) -> Result<Node, ParseError> {
        match self.anchors.get(&name) {
            Some(Anchor::Done { node, .. }) => Ok(node.clone()),
            Some(Anchor::Open { .. }) => Err(ParseError::RecursiveAlias {
                name,
                line: mark.line,
                column: mark.column,
            }),
            None => Err(ParseError::UndefinedAlias {
                name,
                line: mark.line,
                column: mark.column,
            }),
        }
    }

    fn open_props(&mut self, props: &Properties, mark: Mark) -> Result<Option<usize>, ParseError> {
        match &props.anchor {
            Some(name) => self.open_anchor(name, mark).map(Some),
            None => Ok(None),
        }
    }

    fn close_props(&mut self, props: &Properties, slot: Option<usize>, node: &Node) {
        if let (Some(name), Some(slot)) = (&props.anchor, slot) {
            self.close_anchor(name, slot, node);
        }
    }

    /// Reserves the anchor's place in definition order; returns its index.
    fn open_anchor(&mut self, name: &str, mark: Mark) -> Result<usize, ParseError> {
        if let Some(existing) = self.anchors.get(name) {
            let first_line = match existing {
                Anchor::Open { line } | Anchor::Done { line, .. } => *line,
            };
            return Err(ParseError::DuplicateAnchor {
                name: name.to_string(),
                line: mark.line,
                first_line,
            });
        }
        self.anchors
            .insert(name.to_string(), Anchor::Open { line: mark.line });
        self.anchor_order.push(AnchorInfo {
            name: name.to_string(),
            line: mark.line,
            kind: "",
        });
        Ok(self.anchor_order.len() - 1)
    }

    fn close_anchor(&mut self, name: &str, slot: usize, node: &Node) {
        let line = self.anchor_order[slot].line;
        self.anchor_order[slot].kind = node.kind();
        self.anchors.insert(
            name.to_string(),
            Anchor::Done {
                node: node.clone(),
                line,
            },
        );
    }
}

fn enter(depth: usize, mark: Mark) -> Result<usize, ParseError> {
    if depth >= MAX_DEPTH {
        return Err(ParseError::syntax(
            format!("collections nested deeper than {MAX_DEPTH} levels"),
            mark,
        ));
    }
    Ok(depth + 1)
}

fn check_tag(props: &Properties, mark: Mark) -> Result<(), ParseError> {
    match &props.tag {
        Some(tag) => Err(ParseError::syntax(
            format!("tags are not supported (found '{tag}')"),
            mark,
        )),
        None => Ok(()),
    }
}

/// Plain scalars are typed; quoted and block scalars always stay strings.
fn scalar_node(scalar: &Scalar) -> Node {
    if scalar.style.is_plain() {
        resolve_plain(&scalar.value)
    } else {
        Node::Str(scalar.value.clone())
    }
}

fn key_text(node: &Node) -> Option<String> {
    match node {
        Node::Null => Some(String::new()),
        Node::Bool(b) => Some(b.to_string()),
        Node::Int(i) => Some(i.to_string()),
        Node::Float(f) => Some(format_float(*f)),
        Node::Date(d) => Some(d.format(DATE_FORMAT).to_string()),
        Node::Str(s) => Some(s.clone()),
        Node::Seq(_) | Node::Map(_) => None,
    }
}

/// Collects mapping entries, applying `<<` merges once the mapping is complete.
#[derive(Default)]
struct MapBuilder {
    explicit: Mapping,
    first_seen: HashMap<String, usize>,
    merged: Vec<Mapping>,
}

impl MapBuilder {
    fn add(&mut self, key: String, mergeable: bool, value: Node, mark: Mark) -> Result<(), ParseError> {
        if mergeable {
            return self.merge(value, mark);
        }
        if let Some(first_line) = self.first_seen.get(&key) {
            return Err(ParseError::DuplicateKey {
                key,
                line: mark.line,
                first_line: *first_line,
            });
        }
        self.first_seen.insert(key.clone(), mark.line);
        self.explicit.insert(key, value);
        Ok(())
    }

    fn merge(&mut self, value: Node, mark: Mark) -> Result<(), ParseError> {
        match value {
            Node::Map(mapping) => self.merged.push(mapping),
            Node::Seq(items) => {
                for item in items {
                    match item {
                        Node::Map(mapping) => self.merged.push(mapping),
                        other => {
                            return Err(ParseError::syntax(
                                format!("merge key expects mappings, found {}", other.kind()),
                                mark,
                            ))
                        }
                    }
                }
            }
            other => {
                return Err(ParseError::syntax(
                    format!(
                        "merge key expects a mapping or a list of mappings, found {}",
                        other.kind()
                    ),
                    mark,
                ))
            }
        }
        Ok(())
    }

    fn finish(self) -> Mapping {
        if self.merged.is_empty() {
            return self.explicit;
        }
        let mut result = Mapping::new();
        for source in self.merged {
            for (key, value) in source {
                if !result.contains_key(&key) {
                    result.insert(key, value);
                }
            }
        }
        for (key, value) in self.explicit {
            result.insert(key, value);
        }
        result
    }
}
