//! The token loop: drives one binary XML stream from its first tag byte to
//! its end-of-stream marker or declared extent.

use log::trace;

use crate::binxml::tokens::{
    read_attribute, read_cdata, read_entity_ref, read_fragment_header, read_open_start_element,
    read_pi_data, read_pi_target, read_substitution, read_template_instance,
};
use crate::binxml::value::BinXmlValue;
use crate::binxml::{BinXmlContext, MAX_BINXML_NESTING, tokens::BinXmlToken};
use crate::err::{DecodeError, DecodeResult};
use crate::utils::ByteCursor;

/// Read tokens until an end-of-stream marker, or until `data_size` bytes have
/// been consumed.
///
/// The cursor must span the whole chunk: name and template references inside
/// the stream are chunk-relative. Errors abandon the stream; the caller
/// decides whether that fails a record or routes it to heuristic extraction.
pub(crate) fn read_tokens(
    cursor: &mut ByteCursor<'_>,
    ctx: &mut BinXmlContext<'_>,
    data_size: Option<usize>,
) -> DecodeResult<Vec<BinXmlToken>> {
    if ctx.depth >= MAX_BINXML_NESTING {
        return Err(DecodeError::NestingTooDeep {
            limit: MAX_BINXML_NESTING,
        });
    }

    ctx.depth += 1;
    let tokens = read_tokens_inner(cursor, ctx, data_size);
    ctx.depth -= 1;

    tokens
}

fn read_tokens_inner(
    cursor: &mut ByteCursor<'_>,
    ctx: &mut BinXmlContext<'_>,
    data_size: Option<usize>,
) -> DecodeResult<Vec<BinXmlToken>> {
    let start = cursor.pos();
    let mut tokens = Vec::new();

    loop {
        if let Some(limit) = data_size {
            if cursor.pos() - start >= limit {
                trace!("stream extent of {limit} bytes consumed");
                break;
            }
        }

        let token_offset = cursor.position();
        let tag = cursor.u8_named("token")?;
        trace!("token {tag:#04x} at {token_offset}");

        let token = read_token(tag, token_offset, cursor, ctx)?;
        let end_of_stream = token == BinXmlToken::EndOfStream;
        tokens.push(token);

        if end_of_stream {
            break;
        }
    }

    Ok(tokens)
}

/// Dispatch on a tag byte. Bit 0x40 marks tokens that announce trailing
/// data, which only matters for open-start elements.
fn read_token(
    tag: u8,
    token_offset: u64,
    cursor: &mut ByteCursor<'_>,
    ctx: &mut BinXmlContext<'_>,
) -> DecodeResult<BinXmlToken> {
    match tag {
        0x00 => Ok(BinXmlToken::EndOfStream),
        0x01 | 0x41 => read_open_start_element(cursor, ctx, tag == 0x41),
        0x02 => Ok(BinXmlToken::CloseStart),
        0x03 => Ok(BinXmlToken::CloseEmpty),
        0x04 => Ok(BinXmlToken::Close),
        0x05 | 0x45 => Ok(BinXmlToken::Value(BinXmlValue::read(cursor, ctx, None)?)),
        0x06 | 0x46 => read_attribute(cursor, ctx),
        0x07 | 0x47 => read_cdata(cursor),
        0x08 | 0x48 => Ok(BinXmlToken::CharRef(cursor.u16_named("char_ref")?)),
        0x09 | 0x49 => read_entity_ref(cursor, ctx),
        0x0a => read_pi_target(cursor, ctx),
        0x0b => read_pi_data(cursor),
        0x0c => read_template_instance(cursor, ctx),
        0x0d => read_substitution(cursor, false),
        0x0e => read_substitution(cursor, true),
        0x0f => read_fragment_header(cursor),
        _ => Err(DecodeError::InvalidToken {
            value: tag,
            offset: token_offset,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binxml::name::NameCache;
    use crate::template_cache::TemplateCache;
    use pretty_assertions::assert_eq;

    fn name_struct(name: &str) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0xbeefu16.to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend(name.encode_utf16().flat_map(u16::to_le_bytes));
        out.extend_from_slice(&[0, 0]);
        out
    }

    fn utf16_with_len(text: &str) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(text.encode_utf16().count() as u16).to_le_bytes());
        out.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
        out
    }

    #[test]
    fn full_fragment_produces_the_expected_token_list() {
        let mut data = Vec::new();
        data.extend_from_slice(&[0x0f, 0x01, 0x01, 0x00]);
        data.push(0x01);
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        let name_offset = (data.len() + 4) as u32;
        data.extend_from_slice(&name_offset.to_le_bytes());
        data.extend(name_struct("Data"));
        data.push(0x02);
        data.push(0x05);
        data.push(0x01);
        data.extend(utf16_with_len("hi"));
        data.push(0x04);
        data.push(0x00);

        let mut names = NameCache::new();
        let mut templates = TemplateCache::new();
        let mut ctx =
            BinXmlContext::new(&mut names, &mut templates, encoding::all::WINDOWS_1252);
        let mut cursor = ByteCursor::new(&data);

        let tokens = read_tokens(&mut cursor, &mut ctx, Some(data.len())).unwrap();

        assert_eq!(
            tokens,
            vec![
                BinXmlToken::FragmentHeader,
                BinXmlToken::OpenStart {
                    name: "Data".to_string()
                },
                BinXmlToken::CloseStart,
                BinXmlToken::Value(BinXmlValue::String("hi".to_string())),
                BinXmlToken::Close,
                BinXmlToken::EndOfStream,
            ]
        );
        assert_eq!(cursor.pos(), data.len());
    }

    #[test]
    fn declared_extent_stops_the_loop_before_the_buffer_ends() {
        let data = [0x0f, 0x01, 0x01, 0x00, 0x02, 0x02, 0x02];

        let mut names = NameCache::new();
        let mut templates = TemplateCache::new();
        let mut ctx =
            BinXmlContext::new(&mut names, &mut templates, encoding::all::WINDOWS_1252);
        let mut cursor = ByteCursor::new(&data);

        let tokens = read_tokens(&mut cursor, &mut ctx, Some(4)).unwrap();

        assert_eq!(tokens, vec![BinXmlToken::FragmentHeader]);
        assert_eq!(cursor.pos(), 4);
    }

    #[test]
    fn end_of_stream_stops_the_loop_before_the_declared_extent() {
        let data = [0x00, 0xff, 0xff];

        let mut names = NameCache::new();
        let mut templates = TemplateCache::new();
        let mut ctx =
            BinXmlContext::new(&mut names, &mut templates, encoding::all::WINDOWS_1252);
        let mut cursor = ByteCursor::new(&data);

        let tokens = read_tokens(&mut cursor, &mut ctx, Some(data.len())).unwrap();

        assert_eq!(tokens, vec![BinXmlToken::EndOfStream]);
        assert_eq!(cursor.pos(), 1);
    }

    #[test]
    fn unrecognized_token_is_an_error() {
        let data = [0x0f, 0x01, 0x01, 0x00, 0xf3];

        let mut names = NameCache::new();
        let mut templates = TemplateCache::new();
        let mut ctx =
            BinXmlContext::new(&mut names, &mut templates, encoding::all::WINDOWS_1252);
        let mut cursor = ByteCursor::new(&data);

        let err = read_tokens(&mut cursor, &mut ctx, Some(data.len())).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidToken { value: 0xf3, .. }
        ));
    }

    #[test]
    fn nesting_past_the_limit_is_cut_off() {
        let data = [0x00];

        let mut names = NameCache::new();
        let mut templates = TemplateCache::new();
        let mut ctx =
            BinXmlContext::new(&mut names, &mut templates, encoding::all::WINDOWS_1252);
        ctx.depth = MAX_BINXML_NESTING;
        let mut cursor = ByteCursor::new(&data);

        let err = read_tokens(&mut cursor, &mut ctx, None).unwrap_err();
        assert!(matches!(err, DecodeError::NestingTooDeep { .. }));
    }
}
