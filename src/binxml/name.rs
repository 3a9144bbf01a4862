use hashbrown::HashMap;
use log::{debug, trace};

use crate::err::DecodeResult;
use crate::utils::ByteCursor;

/// Link header preceding every name struct: a chunk-relative offset to the
/// next name in the same hash bucket, and the name's hash.
struct NameLink {
    next_string: Option<u32>,
}

const NAME_LINK_SIZE: u32 = 6;

impl NameLink {
    fn read(cursor: &mut ByteCursor<'_>) -> DecodeResult<NameLink> {
        let next_string = cursor.u32_named("name.next_string")?;
        let _hash = cursor.u16_named("name.hash")?;

        Ok(NameLink {
            next_string: if next_string > 0 {
                Some(next_string)
            } else {
                None
            },
        })
    }
}

#[derive(Debug, Clone)]
struct NameEntry {
    name: String,
    /// Total size of the struct as stored, link header included. Used to hop
    /// over inline definitions on cache hits.
    data_size: u32,
}

/// Element and attribute names for one chunk, keyed by the chunk-relative
/// offset of their name struct.
#[derive(Debug, Default)]
pub(crate) struct NameCache {
    map: HashMap<u32, NameEntry>,
}

impl NameCache {
    pub(crate) fn new() -> Self {
        NameCache {
            map: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    /// Seed the cache from the chunk header's common string table, following
    /// each bucket's chain. Unreadable entries end their chain quietly, a
    /// damaged table must not take the chunk down with it.
    pub(crate) fn populate(&mut self, data: &[u8], offsets: &[u32]) {
        for &offset in offsets.iter().filter(|&&offset| offset > 0) {
            let mut next = offset;
            loop {
                // Chains in corrupted chunks can loop back on themselves.
                if self.map.contains_key(&next) {
                    break;
                }

                let mut cursor = match ByteCursor::with_pos(data, next as usize) {
                    Ok(cursor) => cursor,
                    Err(err) => {
                        debug!("string table entry at {next} is unreadable: {err}");
                        break;
                    }
                };

                match read_name_struct(&mut cursor) {
                    Ok(entry) => {
                        trace!("common string {:?} at offset {next}", entry.0.name);
                        let next_string = entry.1;
                        self.map.insert(next, entry.0);
                        match next_string {
                            Some(offset) => next = offset,
                            None => break,
                        }
                    }
                    Err(err) => {
                        debug!("string table entry at {next} is unreadable: {err}");
                        break;
                    }
                }
            }
        }
    }

    fn get(&self, offset: u32) -> Option<&NameEntry> {
        self.map.get(&offset)
    }

    fn insert(&mut self, offset: u32, entry: NameEntry) {
        self.map.insert(offset, entry);
    }
}

/// Parse the name struct under the cursor (link header included) and return
/// it along with the chained next-string offset.
fn read_name_struct(cursor: &mut ByteCursor<'_>) -> DecodeResult<(NameEntry, Option<u32>)> {
    let link = NameLink::read(cursor)?;

    let position_before_read = cursor.position();
    let name = cursor
        .len_prefixed_utf16_string(true, "name")?
        .unwrap_or_default();
    let position_after_read = cursor.position();

    let data_size = (position_after_read - position_before_read) as u32 + NAME_LINK_SIZE;

    Ok((NameEntry { name, data_size }, link.next_string))
}

/// Resolve a name reference: a `u32` chunk-relative offset to a name struct,
/// which is stored inline exactly once (at its own offset) and referenced
/// from everywhere else.
pub(crate) fn read_name_ref(
    cursor: &mut ByteCursor<'_>,
    names: &mut NameCache,
) -> DecodeResult<String> {
    // The offset refers to where the name struct begins.
    let name_offset = cursor.u32_named("name_offset")?;

    if let Some(cached) = names.get(name_offset) {
        let name = cached.name.clone();
        // Hop over the inline definition; back-references carry no payload.
        if u64::from(name_offset) == cursor.position() {
            cursor.advance(cached.data_size as usize, "cached name")?;
        }
        return Ok(name);
    }

    if u64::from(name_offset) == cursor.position() {
        trace!("name is inline at {name_offset}");
        let (entry, _) = read_name_struct(cursor)?;
        let name = entry.name.clone();
        names.insert(name_offset, entry);
        Ok(name)
    } else {
        // Out-of-line definition the string table did not cover: parse it
        // where it lives and come back.
        let mut detour = ByteCursor::with_pos(cursor.buf(), name_offset as usize)?;
        let (entry, _) = read_name_struct(&mut detour)?;
        let name = entry.name.clone();
        names.insert(name_offset, entry);
        Ok(name)
    }
}
