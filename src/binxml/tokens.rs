//! The token stream model, plus readers for every token that carries more
//! than its tag byte.

use std::rc::Rc;

use log::{debug, trace, warn};

use crate::binxml::BinXmlContext;
use crate::binxml::deserializer::read_tokens;
use crate::binxml::name::read_name_ref;
use crate::binxml::value::BinXmlValue;
use crate::err::{DecodeError, DecodeResult};
use crate::guid::Guid;
use crate::utils::ByteCursor;

/// One decoded token from a binary XML stream.
///
/// Name references are resolved to owned strings at read time, so a token
/// stream carries no chunk-relative offsets and stays valid after its chunk
/// buffer is reused.
#[derive(Debug, Clone, PartialOrd, PartialEq)]
pub(crate) enum BinXmlToken {
    FragmentHeader,
    OpenStart { name: String },
    CloseStart,
    CloseEmpty,
    Close,
    Value(BinXmlValue),
    Attribute { name: String },
    CData(String),
    CharRef(u16),
    EntityRef { name: String },
    PITarget { name: String },
    PIData(String),
    TemplateInstance(TemplateInstance),
    Substitution { index: u16, ignore: bool },
    EndOfStream,
}

/// A parsed template definition: the token skeleton shared by every record
/// that instantiates it.
#[derive(Debug, Clone, PartialOrd, PartialEq)]
pub(crate) struct TemplateDefinition {
    pub(crate) guid: Guid,
    pub(crate) data_size: u32,
    pub(crate) tokens: Vec<BinXmlToken>,
}

/// A template reference together with the values this record substitutes
/// into its placeholder slots.
#[derive(Debug, Clone, PartialOrd, PartialEq)]
pub(crate) struct TemplateInstance {
    pub(crate) definition: Rc<TemplateDefinition>,
    pub(crate) substitutions: Vec<BinXmlValue>,
}

/// Size of the fixed definition header preceding the token bytes:
/// next-template link, guid, and declared data size.
const TEMPLATE_DEFINITION_HEADER_SIZE: usize = 24;

pub(crate) fn read_open_start_element(
    cursor: &mut ByteCursor<'_>,
    ctx: &mut BinXmlContext<'_>,
    has_attributes: bool,
) -> DecodeResult<BinXmlToken> {
    trace!("OpenStartElement at {}", cursor.position());

    // Dependency identifier, unused here.
    let _ = cursor.u16_named("element.dependency_id")?;
    // Declared element extent. The stream is framed by its tokens, so this
    // is informational only.
    let _data_size = cursor.u32_named("element.data_size")?;

    let name = read_name_ref(cursor, ctx.names)?;

    if has_attributes {
        let _attribute_list_size = cursor.u32_named("element.attribute_list_size")?;
    }

    Ok(BinXmlToken::OpenStart { name })
}

pub(crate) fn read_attribute(
    cursor: &mut ByteCursor<'_>,
    ctx: &mut BinXmlContext<'_>,
) -> DecodeResult<BinXmlToken> {
    let name = read_name_ref(cursor, ctx.names)?;
    Ok(BinXmlToken::Attribute { name })
}

pub(crate) fn read_entity_ref(
    cursor: &mut ByteCursor<'_>,
    ctx: &mut BinXmlContext<'_>,
) -> DecodeResult<BinXmlToken> {
    let name = read_name_ref(cursor, ctx.names)?;
    Ok(BinXmlToken::EntityRef { name })
}

pub(crate) fn read_pi_target(
    cursor: &mut ByteCursor<'_>,
    ctx: &mut BinXmlContext<'_>,
) -> DecodeResult<BinXmlToken> {
    let name = read_name_ref(cursor, ctx.names)?;
    Ok(BinXmlToken::PITarget { name })
}

pub(crate) fn read_pi_data(cursor: &mut ByteCursor<'_>) -> DecodeResult<BinXmlToken> {
    let data = cursor
        .len_prefixed_utf16_string(false, "pi_data")?
        .unwrap_or_default();
    Ok(BinXmlToken::PIData(data))
}

pub(crate) fn read_cdata(cursor: &mut ByteCursor<'_>) -> DecodeResult<BinXmlToken> {
    let text = cursor
        .len_prefixed_utf16_string(false, "cdata")?
        .unwrap_or_default();
    Ok(BinXmlToken::CData(text))
}

/// Consume the three bytes following a start-of-stream tag.
pub(crate) fn read_fragment_header(cursor: &mut ByteCursor<'_>) -> DecodeResult<BinXmlToken> {
    let major = cursor.u8_named("fragment.major_version")?;
    let minor = cursor.u8_named("fragment.minor_version")?;
    let flags = cursor.u8_named("fragment.flags")?;
    trace!("fragment header v{major}.{minor}, flags {flags:#x}");
    Ok(BinXmlToken::FragmentHeader)
}

/// Read a substitution placeholder from a template definition body.
///
/// An optional substitution declared with the null type marks a slot that was
/// deleted from the template; nothing is rendered for it.
pub(crate) fn read_substitution(
    cursor: &mut ByteCursor<'_>,
    optional: bool,
) -> DecodeResult<BinXmlToken> {
    let index = cursor.u16_named("substitution.index")?;
    let value_type = cursor.u8_named("substitution.value_type")?;
    let ignore = optional && value_type == 0x00;

    Ok(BinXmlToken::Substitution { index, ignore })
}

pub(crate) fn read_template_definition(
    cursor: &mut ByteCursor<'_>,
    ctx: &mut BinXmlContext<'_>,
) -> DecodeResult<TemplateDefinition> {
    let _next_template_offset = cursor.u32_named("template.next_offset")?;
    let guid = Guid::read(cursor)?;
    // Counts the token bytes only, not this 24 byte header.
    let data_size = cursor.u32_named("template.data_size")?;

    trace!("template definition {guid}, {data_size} token bytes");

    let tokens = read_tokens(cursor, ctx, Some(data_size as usize))?;

    Ok(TemplateDefinition {
        guid,
        data_size,
        tokens,
    })
}

/// Read a template instance: resolve its definition through the cache, then
/// bind the substitution values the record supplies.
pub(crate) fn read_template_instance(
    cursor: &mut ByteCursor<'_>,
    ctx: &mut BinXmlContext<'_>,
) -> DecodeResult<BinXmlToken> {
    trace!("TemplateInstance at {}", cursor.position());

    let _ = cursor.u8_named("template.unknown")?;
    let template_id = cursor.u32_named("template.id")?;
    let definition_offset = cursor.u32_named("template.definition_offset")?;

    let definition = resolve_definition(cursor, ctx, template_id, definition_offset)?;

    let substitution_count = cursor.u32_named("template.substitution_count")?;
    // Four bytes per descriptor. A count the buffer cannot hold is
    // corruption, caught before it sizes any allocation.
    if substitution_count as usize > cursor.remaining() / 4 {
        return Err(DecodeError::Truncated {
            what: "substitution descriptors",
            offset: cursor.position(),
            need: substitution_count as usize * 4,
            have: cursor.remaining(),
        });
    }

    let mut descriptors = Vec::with_capacity(substitution_count as usize);
    for _ in 0..substitution_count {
        let size = cursor.u16_named("descriptor.size")?;
        let value_type = cursor.u8_named("descriptor.value_type")?;
        let _ = cursor.u8_named("descriptor.padding")?;
        descriptors.push((size, value_type));
    }

    let mut substitutions = Vec::with_capacity(descriptors.len());
    for (size, value_type) in descriptors {
        let slot_start = cursor.pos();
        let slot_end = slot_start.saturating_add(usize::from(size));
        trace!("substitution type {value_type:#04x}, {size} bytes at {slot_start}");

        let value =
            BinXmlValue::read_tagged(value_type, slot_start as u64, cursor, ctx, Some(size))?;

        // A null descriptor reserves its declared bytes without encoding a
        // value. Anything else landing off the slot boundary drifted.
        if value_type != 0x00 && cursor.pos() != slot_end {
            warn!(
                "substitution of type {value_type:#04x} consumed {} of {size} declared bytes",
                cursor.pos() - slot_start
            );
        }
        cursor.set_pos(slot_end.min(cursor.buf().len()), "substitution slot")?;

        substitutions.push(value);
    }

    Ok(BinXmlToken::TemplateInstance(TemplateInstance {
        definition,
        substitutions,
    }))
}

/// Fetch a definition through the file-scoped cache.
///
/// Identifiers are reused across files and can collide across chunks, so a
/// cache hit is only trusted when the guid stored at the referenced offset
/// matches the cached one.
fn resolve_definition(
    cursor: &mut ByteCursor<'_>,
    ctx: &mut BinXmlContext<'_>,
    template_id: u32,
    definition_offset: u32,
) -> DecodeResult<Rc<TemplateDefinition>> {
    let inline = u64::from(definition_offset) == cursor.position();
    let cached = ctx.templates.get(template_id);
    let on_disk_guid = peek_definition_guid(cursor.buf(), definition_offset);

    if let Some(definition) = cached {
        match on_disk_guid {
            Some(ref guid) if *guid == definition.guid => {
                trace!(
                    "cache hit for template {template_id:#x} at offset {definition_offset}"
                );
                if inline {
                    // Hop over the inline copy of a definition we already hold.
                    cursor.advance(
                        TEMPLATE_DEFINITION_HEADER_SIZE + definition.data_size as usize,
                        "cached template definition",
                    )?;
                }
                return Ok(definition);
            }
            Some(_) => {
                debug!(
                    "template {template_id:#x} at offset {definition_offset} does not match \
                     the cached guid; re-reading"
                );
            }
            None => {
                // The reference points outside the chunk; the cached entry is
                // all we have.
                debug!(
                    "template {template_id:#x} reference {definition_offset} is unreadable; \
                     using cached definition"
                );
                return Ok(definition);
            }
        }
    }

    let definition = if inline {
        let start = cursor.pos();
        let definition = Rc::new(read_template_definition(cursor, ctx)?);
        // The definition is framed by its declared size, not by where its
        // token stream happened to end.
        let end = start + TEMPLATE_DEFINITION_HEADER_SIZE + definition.data_size as usize;
        if cursor.pos() != end {
            debug!(
                "template tokens ended at {}, declared extent ends at {end}",
                cursor.pos()
            );
        }
        cursor.set_pos(end.min(cursor.buf().len()), "template definition")?;
        definition
    } else {
        trace!("detour to offset {definition_offset} for template {template_id:#x}");
        let mut detour = ByteCursor::with_pos(cursor.buf(), definition_offset as usize)?;
        Rc::new(read_template_definition(&mut detour, ctx)?)
    };

    ctx.templates.insert(template_id, Rc::clone(&definition));
    Ok(definition)
}

/// The guid field of the definition header at `offset`, if the buffer holds
/// one.
fn peek_definition_guid(buf: &[u8], offset: u32) -> Option<Guid> {
    let start = (offset as usize).checked_add(4)?;
    let bytes: [u8; 16] = buf.get(start..start.checked_add(16)?)?.try_into().ok()?;
    Some(Guid::from_bytes(&bytes))
}
