use std::fmt::{self, Debug, Display};

use crate::err::DecodeResult;
use crate::utils::ByteCursor;

/// A Windows GUID.
///
/// The first three fields are stored little-endian on disk, the trailing
/// eight bytes are stored as-is. Rendered uppercase without braces, the way
/// provider identifiers appear in rendered event XML.
#[derive(PartialOrd, PartialEq, Eq, Clone, Hash)]
pub struct Guid {
    data1: u32,
    data2: u16,
    data3: u16,
    data4: [u8; 8],
}

impl Guid {
    pub fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Guid {
        Guid {
            data1,
            data2,
            data3,
            data4,
        }
    }

    pub(crate) fn read(cursor: &mut ByteCursor<'_>) -> DecodeResult<Guid> {
        let data1 = cursor.u32_named("guid.data1")?;
        let data2 = cursor.u16_named("guid.data2")?;
        let data3 = cursor.u16_named("guid.data3")?;
        let data4 = cursor.array::<8>("guid.data4")?;
        Ok(Guid::new(data1, data2, data3, data4))
    }

    pub(crate) fn from_bytes(bytes: &[u8; 16]) -> Guid {
        let mut cursor = ByteCursor::new(bytes);
        Guid::read(&mut cursor).expect("16 bytes always hold a full guid")
    }
}

impl Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7]
        )
    }
}

impl Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}
