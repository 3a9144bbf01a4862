//! Renders an assembled element tree back into XML text.

use std::io::Write;

use quick_xml::Writer;
use quick_xml::events::{BytesCData, BytesEnd, BytesPI, BytesStart, BytesText, Event};

use crate::binxml::assemble::{XmlElement, XmlNode};
use crate::err::{DecodeError, DecodeResult};

/// Serialize a tree to indented XML, without a document declaration.
///
/// Character and entity references survive verbatim; regular text and
/// attribute values are escaped. Childless elements collapse to the
/// self-closing form, the way rendered event XML presents them.
pub(crate) fn render_xml(roots: &[XmlNode]) -> DecodeResult<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    for node in roots {
        write_node(&mut writer, node)?;
    }

    String::from_utf8(writer.into_inner()).map_err(|source| DecodeError::XmlOutput {
        message: source.to_string(),
    })
}

fn xml_error(source: impl std::fmt::Display) -> DecodeError {
    DecodeError::XmlOutput {
        message: source.to_string(),
    }
}

fn write_node<W: Write>(writer: &mut Writer<W>, node: &XmlNode) -> DecodeResult<()> {
    match node {
        XmlNode::Element(element) => write_element(writer, element),
        XmlNode::Value(value) => writer
            .write_event(Event::Text(BytesText::new(&value.as_cow_str())))
            .map_err(xml_error),
        XmlNode::CharRef(n) => writer
            .write_event(Event::Text(BytesText::from_escaped(format!("&#{n};"))))
            .map_err(xml_error),
        XmlNode::EntityRef(name) => writer
            .write_event(Event::Text(BytesText::from_escaped(format!("&{name};"))))
            .map_err(xml_error),
        XmlNode::CData(text) => writer
            .write_event(Event::CData(BytesCData::new(text.as_str())))
            .map_err(xml_error),
        XmlNode::PI { target, data } => {
            let content = if data.is_empty() {
                target.clone()
            } else {
                format!("{target} {data}")
            };
            writer
                .write_event(Event::PI(BytesPI::new(content)))
                .map_err(xml_error)
        }
    }
}

fn write_element<W: Write>(writer: &mut Writer<W>, element: &XmlElement) -> DecodeResult<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for attribute in &element.attributes {
        let value = attribute.value.as_cow_str();
        if !value.is_empty() {
            start.push_attribute((attribute.name.as_str(), value.as_ref()));
        }
    }

    if element.children.is_empty() {
        return writer.write_event(Event::Empty(start)).map_err(xml_error);
    }

    writer.write_event(Event::Start(start)).map_err(xml_error)?;
    for child in &element.children {
        write_node(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(xml_error)
}
