//! Safe event stream over the libyaml port.
//!
//! Scanning, indentation, comments, quoting and block scalars are handled by
//! `unsafe_libyaml`; this module only copies each event out of the C-style
//! structs before they are freed.

use super::error::ParseError;
use crate::value_objects::mark::Mark;
use std::ffi::CStr;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr::NonNull;
use std::slice;
use unsafe_libyaml as sys;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Event {
    StreamStart,
    StreamEnd,
    DocumentStart,
    DocumentEnd,
    Alias(String),
    Scalar(Scalar),
    SequenceStart(Properties),
    SequenceEnd,
    MappingStart(Properties),
    MappingEnd,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Scalar {
    pub props: Properties,
    pub value: String,
    pub style: ScalarStyle,
}

/// Node properties written in front of a node (`&anchor`, `!tag`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Properties {
    pub anchor: Option<String>,
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScalarStyle {
    Plain,
    SingleQuoted,
    DoubleQuoted,
    Literal,
    Folded,
}

impl ScalarStyle {
    pub(crate) fn is_plain(self) -> bool {
        self == ScalarStyle::Plain
    }
}

pub(crate) struct EventReader<'input> {
    // Boxed so the parser state never moves while libyaml holds pointers into it.
    parser: Box<MaybeUninit<sys::yaml_parser_t>>,
    input: PhantomData<&'input [u8]>,
}

impl<'input> EventReader<'input> {
    pub(crate) fn new(input: &'input str) -> Result<Self, ParseError> {
        let input = input.as_bytes();
        let mut parser = Box::new(MaybeUninit::<sys::yaml_parser_t>::uninit());
        unsafe {
            let raw = parser.as_mut_ptr();
            if sys::yaml_parser_initialize(raw).fail {
                return Err(parse_error(raw));
            }
            sys::yaml_parser_set_encoding(raw, sys::YAML_UTF8_ENCODING);
            sys::yaml_parser_set_input_string(raw, input.as_ptr(), input.len() as u64);
        }
        Ok(Self {
            parser,
            input: PhantomData,
        })
    }

    /// Next event and the position where it starts.
    pub(crate) fn next_event(&mut self) -> Result<(Event, Mark), ParseError> {
        let mut event = MaybeUninit::<sys::yaml_event_t>::uninit();
        unsafe {
            let parser = self.parser.as_mut_ptr();
            if (&(*parser)).error != sys::YAML_NO_ERROR {
                return Err(parse_error(parser));
            }
            let event = event.as_mut_ptr();
            if sys::yaml_parser_parse(parser, event).fail {
                return Err(parse_error(parser));
            }
            let converted = convert_event(&*event);
            let start = (*event).start_mark;
            sys::yaml_event_delete(event);
            let mark = to_mark(start);
            converted.map(|event| (event, mark)).ok_or_else(|| {
                ParseError::syntax("unsupported event in document stream", mark)
            })
        }
    }
}

impl Drop for EventReader<'_> {
    fn drop(&mut self) {
        unsafe { sys::yaml_parser_delete(self.parser.as_mut_ptr()) }
    }
}

fn to_mark(mark: sys::yaml_mark_t) -> Mark {
    Mark::new(mark.line as usize + 1, mark.column as usize + 1)
}

unsafe fn convert_event(event: &sys::yaml_event_t) -> Option<Event> {
    let converted = match event.type_ {
        sys::YAML_STREAM_START_EVENT => Event::StreamStart,
        sys::YAML_STREAM_END_EVENT => Event::StreamEnd,
        sys::YAML_DOCUMENT_START_EVENT => Event::DocumentStart,
        sys::YAML_DOCUMENT_END_EVENT => Event::DocumentEnd,
        sys::YAML_ALIAS_EVENT => Event::Alias(unsafe { c_text(event.data.alias.anchor) }?),
        sys::YAML_SCALAR_EVENT => {
            let data = unsafe { event.data.scalar };
            let bytes = if data.value.is_null() {
                &[][..]
            } else {
                unsafe { slice::from_raw_parts(data.value, data.length as usize) }
            };
            let style = match data.style {
                sys::YAML_PLAIN_SCALAR_STYLE => ScalarStyle::Plain,
                sys::YAML_SINGLE_QUOTED_SCALAR_STYLE => ScalarStyle::SingleQuoted,
                sys::YAML_DOUBLE_QUOTED_SCALAR_STYLE => ScalarStyle::DoubleQuoted,
                sys::YAML_LITERAL_SCALAR_STYLE => ScalarStyle::Literal,
                sys::YAML_FOLDED_SCALAR_STYLE => ScalarStyle::Folded,
                _ => return None,
            };
            Event::Scalar(Scalar {
                props: Properties {
                    anchor: unsafe { c_text(data.anchor) },
                    tag: unsafe { c_text(data.tag) },
                },
                value: String::from_utf8_lossy(bytes).into_owned(),
                style,
            })
        }
        sys::YAML_SEQUENCE_START_EVENT => {
            let data = unsafe { event.data.sequence_start };
            Event::SequenceStart(Properties {
                anchor: unsafe { c_text(data.anchor) },
                tag: unsafe { c_text(data.tag) },
            })
        }
        sys::YAML_SEQUENCE_END_EVENT => Event::SequenceEnd,
        sys::YAML_MAPPING_START_EVENT => {
            let data = unsafe { event.data.mapping_start };
            Event::MappingStart(Properties {
                anchor: unsafe { c_text(data.anchor) },
                tag: unsafe { c_text(data.tag) },
            })
        }
        sys::YAML_MAPPING_END_EVENT => Event::MappingEnd,
        _ => return None,
    };
    Some(converted)
}

unsafe fn c_text(ptr: *const u8) -> Option<String> {
    let ptr = NonNull::new(ptr as *mut u8)?;
    let text = unsafe { CStr::from_ptr(ptr.as_ptr().cast()) };
    Some(String::from_utf8_lossy(text.to_bytes()).into_owned())
}

unsafe fn parse_error(parser: *const sys::yaml_parser_t) -> ParseError {
    let problem = unsafe { c_text((&(*parser)).problem.cast()) }
        .unwrap_or_else(|| "malformed document".to_string());
    let message = match unsafe { c_text((&(*parser)).context.cast()) } {
        Some(context) => format!("{problem} ({context})"),
        None => problem,
    };
    ParseError::syntax(message, to_mark(unsafe { (&(*parser)).problem_mark }))
}
