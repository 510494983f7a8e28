use super::scalar::{format_float, is_plain_safe, quote};
use crate::value_objects::node::{Mapping, Node, DATE_FORMAT};

const INDENT: usize = 2;

pub(crate) fn emit(node: &Node) -> String {
    let mut out = String::new();
    match node {
        Node::Map(mapping) if !mapping.is_empty() => emit_map(mapping, 0, &mut out),
        Node::Seq(items) if !items.is_empty() => emit_seq(items, 0, &mut out),
        scalar => {
            out.push_str(&inline_repr(scalar));
            out.push('\n');
        }
    }
    out
}

fn emit_map(mapping: &Mapping, indent: usize, out: &mut String) {
    for (key, value) in mapping.iter() {
        push_indent(out, indent);
        out.push_str(&key_repr(key));
        out.push(':');
        match value {
            Node::Map(nested) if !nested.is_empty() => {
                out.push('\n');
                emit_map(nested, indent + INDENT, out);
            }
            Node::Seq(items) if !items.is_empty() => {
                out.push('\n');
                emit_seq(items, indent + INDENT, out);
            }
            scalar => {
                out.push(' ');
                out.push_str(&inline_repr(scalar));
                out.push('\n');
            }
        }
    }
}

fn emit_seq(items: &[Node], indent: usize, out: &mut String) {
    for item in items {
        push_indent(out, indent);
        out.push('-');
        match item {
            Node::Map(nested) if !nested.is_empty() => {
                let mut block = String::new();
                emit_map(nested, indent + INDENT, &mut block);
                out.push(' ');
                out.push_str(&block[indent + INDENT..]);
            }
            Node::Seq(nested) if !nested.is_empty() => {
                let mut block = String::new();
                emit_seq(nested, indent + INDENT, &mut block);
                out.push(' ');
                out.push_str(&block[indent + INDENT..]);
            }
            scalar => {
                out.push(' ');
                out.push_str(&inline_repr(scalar));
                out.push('\n');
            }
        }
    }
}

fn push_indent(out: &mut String, indent: usize) {
    out.extend(std::iter::repeat(' ').take(indent));
}

fn key_repr(key: &str) -> String {
    if key != "<<" && is_plain_safe(key) {
        key.to_string()
    } else {
        quote(key)
    }
}

fn inline_repr(node: &Node) -> String {
    match node {
        Node::Null => "null".to_string(),
        Node::Bool(v) => v.to_string(),
        Node::Int(v) => v.to_string(),
        Node::Float(v) => format_float(*v),
        Node::Date(d) => d.format(DATE_FORMAT).to_string(),
        Node::Str(s) if is_plain_safe(s) => s.clone(),
        Node::Str(s) => quote(s),
        Node::Seq(_) => "[]".to_string(),
        Node::Map(_) => "{}".to_string(),
    }
}
