use std::rc::Rc;

use hashbrown::HashMap;

use crate::binxml::tokens::TemplateDefinition;

/// Parsed template definitions, keyed by the 32 bit identifier records use
/// to reference them.
///
/// The cache lives for one file parse and is shared by every chunk in it.
/// Identifiers can collide across chunks, so callers verify a hit against
/// the on-disk definition guid before trusting it.
#[derive(Debug, Default)]
pub(crate) struct TemplateCache {
    map: HashMap<u32, Rc<TemplateDefinition>>,
}

impl TemplateCache {
    pub(crate) fn new() -> Self {
        TemplateCache {
            map: HashMap::new(),
        }
    }

    pub(crate) fn get(&self, template_id: u32) -> Option<Rc<TemplateDefinition>> {
        self.map.get(&template_id).map(Rc::clone)
    }

    /// Insert or replace the definition for `template_id`.
    pub(crate) fn insert(&mut self, template_id: u32, definition: Rc<TemplateDefinition>) {
        self.map.insert(template_id, definition);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }
}
