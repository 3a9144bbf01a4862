//! Turns a flat token stream into an element tree: template instances and
//! nested fragments are spliced inline first, then open/close tokens drive a
//! builder stack.
//!
//! Assembly is total. Streams with stray or unbalanced tokens produce the
//! best tree they can; whether that tree is good enough is decided by the
//! record extraction layer, not here.

use std::borrow::Cow;

use log::debug;

use crate::binxml::tokens::BinXmlToken;
use crate::binxml::value::BinXmlValue;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum XmlNode {
    Element(XmlElement),
    Value(BinXmlValue),
    CharRef(u16),
    EntityRef(String),
    CData(String),
    PI { target: String, data: String },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct XmlAttribute {
    pub(crate) name: String,
    pub(crate) value: BinXmlValue,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct XmlElement {
    pub(crate) name: String,
    pub(crate) attributes: Vec<XmlAttribute>,
    pub(crate) children: Vec<XmlNode>,
}

impl XmlElement {
    pub(crate) fn attribute(&self, name: &str) -> Option<&BinXmlValue> {
        self.attributes
            .iter()
            .find(|attribute| attribute.name == name)
            .map(|attribute| &attribute.value)
    }

    /// Child elements, in document order.
    pub(crate) fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|child| match child {
            XmlNode::Element(element) => Some(element),
            _ => None,
        })
    }

    pub(crate) fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|element| element.name == name)
    }

    /// The first typed value among the children, if any.
    pub(crate) fn value(&self) -> Option<&BinXmlValue> {
        self.children.iter().find_map(|child| match child {
            XmlNode::Value(value) => Some(value),
            _ => None,
        })
    }

    /// The text content of this element, character and entity references
    /// decoded, child elements skipped.
    pub(crate) fn text(&self) -> Cow<'_, str> {
        if let [XmlNode::Value(value)] = self.children.as_slice() {
            return value.as_cow_str();
        }

        let mut out = String::new();
        for child in &self.children {
            append_text_piece(&mut out, child);
        }
        Cow::Owned(out)
    }
}

fn append_text_piece(out: &mut String, node: &XmlNode) {
    match node {
        XmlNode::Value(value) => out.push_str(&value.as_cow_str()),
        XmlNode::CharRef(n) => match char::from_u32(u32::from(*n)) {
            Some(c) => out.push(c),
            None => out.push_str(&format!("&#{n};")),
        },
        XmlNode::EntityRef(name) => match expand_entity(name) {
            Some(c) => out.push(c),
            None => {
                out.push('&');
                out.push_str(name);
                out.push(';');
            }
        },
        XmlNode::CData(text) => out.push_str(text),
        XmlNode::Element(_) | XmlNode::PI { .. } => {}
    }
}

fn expand_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => None,
    }
}

/// Splice template instances, substitutions and nested fragments into a flat
/// stream of structural tokens.
pub(crate) fn expand_tokens(tokens: Vec<BinXmlToken>) -> Vec<BinXmlToken> {
    let mut expanded = Vec::with_capacity(tokens.len());
    for token in tokens {
        expand_token(token, None, &mut expanded);
    }
    expanded
}

fn expand_token(
    token: BinXmlToken,
    substitutions: Option<&[BinXmlValue]>,
    out: &mut Vec<BinXmlToken>,
) {
    match token {
        BinXmlToken::Value(BinXmlValue::BinXml(tokens)) => {
            // A nested fragment carries its own template instances; outer
            // substitutions do not reach inside it.
            for token in tokens {
                expand_token(token, None, out);
            }
        }
        BinXmlToken::TemplateInstance(instance) => {
            // Definitions are shared between records, so their tokens are
            // cloned into the stream.
            for token in instance.definition.tokens.iter().cloned() {
                expand_token(token, Some(&instance.substitutions), out);
            }
        }
        BinXmlToken::Substitution { index, ignore } => {
            if ignore {
                return;
            }
            match substitutions.and_then(|values| values.get(usize::from(index))) {
                Some(value) => expand_token(BinXmlToken::Value(value.clone()), None, out),
                None => {
                    debug!("substitution slot {index} has no value");
                    out.push(BinXmlToken::Value(BinXmlValue::Null));
                }
            }
        }
        _ => out.push(token),
    }
}

struct ElementBuilder {
    name: String,
    attributes: Vec<XmlAttribute>,
    children: Vec<XmlNode>,
    pending_attribute: Option<(String, Vec<XmlNode>)>,
}

impl ElementBuilder {
    fn new(name: String) -> Self {
        ElementBuilder {
            name,
            attributes: Vec::new(),
            children: Vec::new(),
            pending_attribute: None,
        }
    }

    fn start_attribute(&mut self, name: String) {
        self.finish_attribute();
        self.pending_attribute = Some((name, Vec::new()));
    }

    /// Close out the attribute under construction. Null valued and valueless
    /// attributes are dropped, matching how rendered event XML omits them.
    fn finish_attribute(&mut self) {
        if let Some((name, pieces)) = self.pending_attribute.take() {
            if let Some(value) = collapse_attribute_pieces(pieces) {
                self.attributes.push(XmlAttribute { name, value });
            }
        }
    }

    fn push_content(&mut self, node: XmlNode) {
        match &mut self.pending_attribute {
            Some((_, pieces)) => pieces.push(node),
            None => self.children.push(node),
        }
    }

    fn into_element(mut self) -> XmlElement {
        self.finish_attribute();
        XmlElement {
            name: self.name,
            attributes: self.attributes,
            children: self.children,
        }
    }
}

fn collapse_attribute_pieces(pieces: Vec<XmlNode>) -> Option<BinXmlValue> {
    let mut pieces = pieces
        .into_iter()
        .filter(|piece| !matches!(piece, XmlNode::Value(BinXmlValue::Null)));

    let first = pieces.next()?;
    match pieces.next() {
        None => match first {
            XmlNode::Value(value) => Some(value),
            other => {
                let mut text = String::new();
                append_text_piece(&mut text, &other);
                Some(BinXmlValue::String(text))
            }
        },
        Some(second) => {
            let mut text = String::new();
            append_text_piece(&mut text, &first);
            append_text_piece(&mut text, &second);
            for piece in pieces {
                append_text_piece(&mut text, &piece);
            }
            Some(BinXmlValue::String(text))
        }
    }
}

/// Build an element tree from an expanded stream.
pub(crate) fn assemble_tree(tokens: Vec<BinXmlToken>) -> Vec<XmlNode> {
    let mut roots: Vec<XmlNode> = Vec::new();
    let mut stack: Vec<ElementBuilder> = Vec::new();
    let mut pending_pi_target: Option<String> = None;

    fn attach(node: XmlNode, stack: &mut [ElementBuilder], roots: &mut Vec<XmlNode>) {
        match stack.last_mut() {
            Some(parent) => parent.push_content(node),
            None => roots.push(node),
        }
    }

    for token in tokens {
        match token {
            BinXmlToken::FragmentHeader | BinXmlToken::EndOfStream => {}
            BinXmlToken::OpenStart { name } => stack.push(ElementBuilder::new(name)),
            BinXmlToken::Attribute { name } => match stack.last_mut() {
                Some(builder) => builder.start_attribute(name),
                None => debug!("attribute `{name}` outside any element"),
            },
            BinXmlToken::CloseStart => {
                if let Some(builder) = stack.last_mut() {
                    builder.finish_attribute();
                }
            }
            BinXmlToken::CloseEmpty | BinXmlToken::Close => match stack.pop() {
                Some(builder) => {
                    attach(XmlNode::Element(builder.into_element()), &mut stack, &mut roots)
                }
                None => debug!("close token without a matching open"),
            },
            BinXmlToken::Value(value) => {
                attach(XmlNode::Value(value), &mut stack, &mut roots)
            }
            BinXmlToken::CharRef(n) => attach(XmlNode::CharRef(n), &mut stack, &mut roots),
            BinXmlToken::EntityRef { name } => {
                attach(XmlNode::EntityRef(name), &mut stack, &mut roots)
            }
            BinXmlToken::CData(text) => attach(XmlNode::CData(text), &mut stack, &mut roots),
            BinXmlToken::PITarget { name } => pending_pi_target = Some(name),
            BinXmlToken::PIData(data) => match pending_pi_target.take() {
                Some(target) => {
                    attach(XmlNode::PI { target, data }, &mut stack, &mut roots)
                }
                None => debug!("processing instruction data without a target"),
            },
            BinXmlToken::TemplateInstance(_) | BinXmlToken::Substitution { .. } => {
                debug!("unexpanded token reached tree assembly")
            }
        }
    }

    // Truncated streams leave elements open. Close them so the partial
    // content survives.
    while let Some(builder) = stack.pop() {
        attach(XmlNode::Element(builder.into_element()), &mut stack, &mut roots);
    }

    roots
}
