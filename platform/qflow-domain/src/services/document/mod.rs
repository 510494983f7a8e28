//! Configuration document reader and writer.
//!
//! The reader drives the libyaml event stream, resolves anchors and aliases
//! while building the tree and returns a plain [`Node`]. Duplicate anchors,
//! duplicate keys and recursive aliases are rejected here rather than by the
//! scanner. The writer produces block-style text that reads back to a
//! value-equal tree.

mod emitter;
mod error;
mod events;
mod parser;
pub mod scalar;

use crate::value_objects::node::Node;

pub use error::{ParseError, ParseErrorKind};
pub use parser::{AnchorInfo, Document};

pub fn parse_document(src: &str) -> Result<Node, ParseError> {
    parse_document_with_anchors(src).map(|doc| doc.root)
}

/// Parses `src` and also reports every anchor defined, in definition order.
pub fn parse_document_with_anchors(src: &str) -> Result<Document, ParseError> {
    parser::Parser::new(src)?.parse()
}

pub fn emit_document(node: &Node) -> String {
    emitter::emit(node)
}

#[cfg(test)]
mod tests {
    use super::{emit_document, parse_document, parse_document_with_anchors, ParseError, ParseErrorKind};
    use crate::value_objects::node::Node;
    use chrono::NaiveDate;

    fn parse(src: &str) -> Node {
        parse_document(src).expect("document should parse")
    }

    fn fail(src: &str) -> ParseError {
        parse_document(src).expect_err("document should fail")
    }

    #[test]
    fn resolves_anchors_into_copies() {
        let doc = parse(
            "market: &market csi300\n\
             benchmark: &benchmark SH000300\n\
             handler: &handler\n\
             \x20 start_time: 2008-01-01\n\
             \x20 instruments: *market\n\
             backtest:\n\
             \x20 benchmark: *benchmark\n\
             \x20 handler: *handler\n",
        );
        assert_eq!(doc.get_path("handler.instruments"), Some(&Node::from("csi300")));
        assert_eq!(doc.get_path("backtest.benchmark"), Some(&Node::from("SH000300")));
        assert_eq!(doc.get_path("backtest.handler"), doc.get("handler"));
        assert_eq!(
            doc.get_path("backtest.handler.start_time").and_then(Node::as_date),
            NaiveDate::from_ymd_opt(2008, 1, 1)
        );
    }

    #[test]
    fn reports_anchor_definitions_in_order() {
        let doc = parse_document_with_anchors("a: &x 1\nb: &y\n  c: 2\nd: [&z q]\n").expect("parse");
        let names: Vec<_> = doc.anchors.iter().map(|a| (a.name.as_str(), a.line, a.kind)).collect();
        assert_eq!(names, vec![("x", 1, "int"), ("y", 2, "mapping"), ("z", 4, "string")]);
    }

    #[test]
    fn sequences_of_compact_mappings() {
        let doc = parse(
            "record:\n\
             \x20 - class: SignalRecord\n\
             \x20   module_path: qlib.workflow.record_temp\n\
             \x20   kwargs: {}\n\
             \x20 - class: PortAnaRecord\n\
             \x20   kwargs:\n\
             \x20     config: 1\n\
             segments:\n\
             \x20 train: [2008-01-01, 2014-12-31]\n",
        );
        let records = doc.get("record").and_then(Node::as_seq).expect("records");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("class"), Some(&Node::from("SignalRecord")));
        assert_eq!(records[0].get("kwargs").and_then(Node::as_map).map(|m| m.len()), Some(0));
        assert_eq!(records[1].get_path("kwargs.config"), Some(&Node::Int(1)));
        assert_eq!(doc.get_path("segments.train.1").and_then(Node::as_date), NaiveDate::from_ymd_opt(2014, 12, 31));
    }

    #[test]
    fn sequence_at_parent_indent_and_nested_items() {
        let doc = parse("items:\n- a\n- - b\n  - c\nnext: 1\n");
        assert_eq!(
            doc.get("items"),
            Some(&Node::Seq(vec![
                Node::from("a"),
                Node::Seq(vec![Node::from("b"), Node::from("c")]),
            ]))
        );
        assert_eq!(doc.get("next"), Some(&Node::Int(1)));
    }

    #[test]
    fn comments_and_quotes() {
        let doc = parse(
            "# header\n\
             a: 'x # not a comment'  # trailing\n\
             b: \"tab\\there\"\n\
             c: value#hash\n\
             'quoted key': 3\n",
        );
        assert_eq!(doc.get("a"), Some(&Node::from("x # not a comment")));
        assert_eq!(doc.get("b"), Some(&Node::from("tab\there")));
        assert_eq!(doc.get("c"), Some(&Node::from("value#hash")));
        assert_eq!(doc.get("quoted key"), Some(&Node::Int(3)));
    }

    #[test]
    fn flow_collections_span_lines() {
        let doc = parse("label: [\"Ref($close, -2)/Ref($close, -1) - 1\",\n  LABEL0]\nm: {a: 1, b: [x, y], c}\n");
        assert_eq!(
            doc.get("label"),
            Some(&Node::Seq(vec![
                Node::from("Ref($close, -2)/Ref($close, -1) - 1"),
                Node::from("LABEL0"),
            ]))
        );
        assert_eq!(doc.get_path("m.b.1"), Some(&Node::from("y")));
        assert_eq!(doc.get_path("m.c"), Some(&Node::Null));
    }

    #[test]
    fn block_scalars_follow_chomping() {
        let doc = parse("lit: |\n  one\n  two\n\nkeep: |+\n  x\n\nstrip: >-\n  folded\n  text\nend: 1\n");
        assert_eq!(doc.get("lit"), Some(&Node::from("one\ntwo\n")));
        assert_eq!(doc.get("keep"), Some(&Node::from("x\n\n")));
        assert_eq!(doc.get("strip"), Some(&Node::from("folded text")));
        assert_eq!(doc.get("end"), Some(&Node::Int(1)));
    }

    #[test]
    fn merge_keys_fill_missing_entries() {
        let doc = parse(
            "base: &base\n  a: 1\n  b: 2\nother: &other\n  c: 3\nderived:\n  b: 20\n  <<: [*base, *other]\n",
        );
        let derived = doc.get("derived").and_then(Node::as_map).expect("derived");
        let keys: Vec<_> = derived.keys().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(derived.get("b"), Some(&Node::Int(20)));
    }

    #[test]
    fn multi_line_plain_scalars_fold() {
        let doc = parse("expr: Ref($close, 1)\n  / $close\n");
        assert_eq!(doc.get("expr"), Some(&Node::from("Ref($close, 1) / $close")));
    }

    #[test]
    fn document_markers_are_optional() {
        assert_eq!(parse("---\na: 1\n...\n").get("a"), Some(&Node::Int(1)));
        assert_eq!(parse("# only comments\n"), Node::Null);
        assert_eq!(fail("a: 1\n---\nb: 2\n").kind(), ParseErrorKind::Syntax);
    }

    #[test]
    fn undefined_alias_names_the_alias() {
        let err = fail("a: 1\nb: *missing\n");
        assert_eq!(err.kind(), ParseErrorKind::UndefinedAlias);
        assert_eq!(err.line(), 2);
        assert!(err.to_string().contains("*missing"));
    }

    #[test]
    fn alias_before_its_anchor_is_undefined() {
        assert_eq!(fail("a: *x\nb: &x 1\n").kind(), ParseErrorKind::UndefinedAlias);
    }

    #[test]
    fn duplicate_anchor_and_key() {
        let err = fail("a: &x 1\nb: &x 2\n");
        assert_eq!(
            err,
            ParseError::DuplicateAnchor { name: "x".to_string(), line: 2, first_line: 1 }
        );
        let err = fail("a: 1\nb: 2\na: 3\n");
        assert_eq!(
            err,
            ParseError::DuplicateKey { key: "a".to_string(), line: 3, first_line: 1 }
        );
    }

    #[test]
    fn recursive_alias_is_rejected() {
        let err = fail("a: &loop\n  b: *loop\n");
        assert_eq!(err.kind(), ParseErrorKind::RecursiveAlias);
        assert_eq!(err.line(), 2);
    }

    #[test]
    fn syntax_errors_carry_positions() {
        let err = fail("a:\n\tb: 1\n");
        assert_eq!(err.kind(), ParseErrorKind::Syntax);
        assert_eq!(err.line(), 2);

        assert!(fail("a: b: c\n").to_string().contains("mapping values are not allowed"));
        assert!(fail("a: [1, 2\n").to_string().contains("flow sequence"));
        assert!(fail("a: \"open\n").to_string().contains("quoted scalar"));
        assert!(fail("a: !!str 1\n").to_string().contains("tags"));
        assert!(fail("? [a, b]\n: 1\n").to_string().contains("mapping keys must be scalars"));
        assert_eq!(fail("a:\n    b: 1\n  c: 2\n").line(), 3);
    }

    #[test]
    fn quote_inside_plain_scalar_does_not_hide_comment() {
        let doc = parse("k: a 'b #c'\nj: x \"y #z\n");
        assert_eq!(doc.get("k"), Some(&Node::from("a 'b")));
        assert_eq!(doc.get("j"), Some(&Node::from("x \"y")));
    }

    #[test]
    fn anchor_before_implicit_key_names_the_key() {
        let doc = parse_document_with_anchors("a:\n  - &x key: v\n  - *x\n").expect("parse");
        assert_eq!(
            doc.root.to_json(),
            serde_json::json!({"a": [{"key": "v"}, "key"]})
        );
        assert_eq!(doc.anchors.len(), 1);
        assert_eq!((doc.anchors[0].line, doc.anchors[0].kind), (2, "string"));
    }

    #[test]
    fn literal_block_keeps_spaces_on_blank_lines() {
        let doc = parse("a: |\n  one\n    \n  two\n");
        assert_eq!(doc.get("a"), Some(&Node::from("one\n  \ntwo\n")));
    }

    #[test]
    fn quoted_scalars_may_span_lines() {
        let doc = parse("a: \"first\n  second\"\nb: 'x\n\n  y'\n");
        assert_eq!(doc.get("a"), Some(&Node::from("first second")));
        assert_eq!(doc.get("b"), Some(&Node::from("x\ny")));
    }

    #[test]
    fn nested_anchors_keep_definition_order() {
        let doc = parse_document_with_anchors("outer: &o\n  inner: &i [1]\nuse: *i\n").expect("parse");
        let names: Vec<_> = doc.anchors.iter().map(|a| (a.name.as_str(), a.kind)).collect();
        assert_eq!(names, vec![("o", "mapping"), ("i", "sequence")]);
        assert_eq!(doc.root.get("use"), Some(&Node::Seq(vec![Node::Int(1)])));
    }

    #[test]
    fn quoted_merge_key_is_an_ordinary_key() {
        let doc = parse("base: &b {x: 1}\nm:\n  '<<': *b\n");
        assert_eq!(doc.get_path("m.<<.x"), Some(&Node::Int(1)));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let src = format!("a: {}{}\n", "[".repeat(200), "]".repeat(200));
        let err = fail(&src);
        assert_eq!(err.kind(), ParseErrorKind::Syntax);
        assert!(err.to_string().contains("nested deeper"), "{err}");
    }

    #[test]
    fn emitted_text_reads_back_equal() {
        let src = "a: &a\n  s: 'true'\n  n: ~\n  f: 0.095\n  d: 2020-08-01\n  l: [1, '2', {k: v}]\n  t: \"line\\nbreak\"\nb: *a\nc: []\n";
        let doc = parse(src);
        let text = emit_document(&doc);
        assert_eq!(parse(&text), doc);
    }
}
