//! The binary XML layer: token stream deserialization, value decoding, name
//! and template resolution, and assembly of token streams into an element
//! tree.

pub mod assemble;
pub mod deserializer;
pub mod name;
pub mod tokens;
pub mod value;

use encoding::EncodingRef;

use crate::binxml::name::NameCache;
use crate::template_cache::TemplateCache;

/// Everything token and value readers need besides the cursor itself.
///
/// The name cache is chunk-scoped (name offsets are chunk-relative), the
/// template cache is file-scoped. `depth` guards recursion through nested
/// binxml fragments and template instances.
pub(crate) struct BinXmlContext<'a> {
    pub(crate) names: &'a mut NameCache,
    pub(crate) templates: &'a mut TemplateCache,
    pub(crate) ansi_codec: EncodingRef,
    pub(crate) depth: u8,
}

/// Nested fragments and template instances deeper than this are treated as
/// corruption rather than followed.
pub(crate) const MAX_BINXML_NESTING: u8 = 10;

impl<'a> BinXmlContext<'a> {
    pub(crate) fn new(
        names: &'a mut NameCache,
        templates: &'a mut TemplateCache,
        ansi_codec: EncodingRef,
    ) -> Self {
        BinXmlContext {
            names,
            templates,
            ansi_codec,
            depth: 0,
        }
    }
}
