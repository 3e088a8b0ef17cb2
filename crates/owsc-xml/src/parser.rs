use std::borrow::Cow;

use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::ParseError;
use crate::line_index::LineIndex;
use crate::tree::Element;
use crate::tree::Node;
use crate::tree::XmlDocument;

/// Deepest element nesting accepted by [`parse`].
///
/// Trees are dropped, cloned and compared recursively, so depth has to stay
/// well within a thread's stack.
pub const MAX_DEPTH: usize = 256;

/// Parse a complete XML document from raw bytes.
///
/// The source must be UTF-8, contain exactly one root element and nest no
/// deeper than [`MAX_DEPTH`]. Whitespace
/// between elements is dropped, comments, processing instructions and the
/// doctype are skipped, and CDATA sections become plain text.
pub fn parse(source: &[u8]) -> Result<XmlDocument, ParseError> {
    let index = LineIndex::new(source);
    let fail = |message: String, offset: usize| {
        ParseError::new(message, index.to_line_col(source, offset))
    };

    let text = std::str::from_utf8(source).map_err(|err| {
        fail("document is not valid UTF-8".to_string(), err.valid_up_to())
    })?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let bom_len = source.len() - text.len();

    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let position = |reader: &Reader<&[u8]>| to_offset(reader.buffer_position()) + bom_len;

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(err) => {
                let offset = to_offset(reader.error_position()) + bom_len;
                return Err(fail(err.to_string(), offset));
            }
        };

        match event {
            Event::Start(start) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(fail(
                        format!("element nesting exceeds {MAX_DEPTH} levels"),
                        position(&reader),
                    ));
                }
                if root.is_some() && stack.is_empty() {
                    return Err(fail(
                        "document has more than one root element".to_string(),
                        position(&reader),
                    ));
                }
                let element =
                    start_element(&start).map_err(|message| fail(message, position(&reader)))?;
                stack.push(element);
            }
            Event::Empty(start) => {
                let element =
                    start_element(&start).map_err(|message| fail(message, position(&reader)))?;
                match stack.last_mut() {
                    Some(parent) => parent.push_child(Node::Element(element)),
                    None if root.is_none() => root = Some(element),
                    None => {
                        return Err(fail(
                            "document has more than one root element".to_string(),
                            position(&reader),
                        ))
                    }
                }
            }
            Event::End(_) => {
                // End names are checked against the open element by the reader.
                let Some(element) = stack.pop() else {
                    return Err(fail(
                        "unexpected closing tag".to_string(),
                        position(&reader),
                    ));
                };
                match stack.last_mut() {
                    Some(parent) => parent.push_child(Node::Element(element)),
                    None => root = Some(element),
                }
            }
            Event::Text(content) => {
                let content = content
                    .unescape()
                    .map_err(|err| fail(err.to_string(), position(&reader)))?;
                push_text(&mut stack, content)
                    .map_err(|message| fail(message, position(&reader)))?;
            }
            Event::CData(content) => {
                let bytes = content.into_inner();
                push_text(&mut stack, String::from_utf8_lossy(&bytes))
                    .map_err(|message| fail(message, position(&reader)))?;
            }
            Event::Eof => break,
            Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(fail(
            format!(
                "unexpected end of document, element <{}> is not closed",
                open.name()
            ),
            source.len(),
        ));
    }

    root.map(|root| XmlDocument::new(root, source.len()))
        .ok_or_else(|| fail("document has no root element".to_string(), source.len()))
}

fn start_element(start: &BytesStart<'_>) -> Result<Element, String> {
    let qname = start.name();
    let name = String::from_utf8_lossy(qname.local_name().as_ref()).into_owned();
    let prefix = qname
        .prefix()
        .map(|prefix| String::from_utf8_lossy(prefix.as_ref()).into_owned());

    let mut element = Element::new(name).with_prefix(prefix);
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|err| err.to_string())?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|err| err.to_string())?
            .into_owned();
        element.push_attribute(key, value);
    }
    Ok(element)
}

fn push_text(stack: &mut [Element], content: Cow<'_, str>) -> Result<(), String> {
    if content.trim().is_empty() {
        return Ok(());
    }
    match stack.last_mut() {
        Some(parent) => {
            parent.push_child(Node::Text(content.into_owned()));
            Ok(())
        }
        None => Err("text outside of the root element".to_string()),
    }
}

fn to_offset<T>(position: T) -> usize
where
    usize: TryFrom<T>,
{
    usize::try_from(position).unwrap_or(usize::MAX)
}
