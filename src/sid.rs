use std::fmt::{self, Debug, Display};

use crate::err::DecodeResult;
use crate::utils::ByteCursor;

/// A Windows security identifier.
///
/// Wire layout: revision byte, sub-authority count byte, 48-bit big-endian
/// identifier authority, then `count` little-endian `u32` sub-authorities.
#[derive(PartialOrd, PartialEq, Eq, Clone, Hash)]
pub struct Sid {
    revision: u8,
    authority: u64,
    sub_authorities: Vec<u32>,
}

impl Sid {
    pub(crate) fn read(cursor: &mut ByteCursor<'_>) -> DecodeResult<Sid> {
        let revision = cursor.u8_named("sid.revision")?;
        let sub_authority_count = cursor.u8_named("sid.sub_authority_count")?;

        let authority_bytes = cursor.array::<6>("sid.authority")?;
        let mut authority = 0u64;
        for byte in authority_bytes {
            authority = (authority << 8) | u64::from(byte);
        }

        let mut sub_authorities = Vec::with_capacity(usize::from(sub_authority_count));
        for _ in 0..sub_authority_count {
            sub_authorities.push(cursor.u32_named("sid.sub_authority")?);
        }

        Ok(Sid {
            revision,
            authority,
            sub_authorities,
        })
    }
}

impl Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}-{}", self.revision, self.authority)?;
        for sub in &self.sub_authorities {
            write!(f, "-{sub}")?;
        }
        Ok(())
    }
}

impl Debug for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}
