use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};

use super::descriptor::{put_u32, truncated};
use super::DescriptorError;

const SID_HEADER_LEN: usize = 8;
const MAX_SUB_AUTHORITIES: usize = 15;

/// Binary security identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sid {
    pub revision: u8,
    /// 48-bit identifier authority
    pub authority: u64,
    pub sub_authorities: Vec<u32>,
}

impl Sid {
    /// Parses a SID from the start of `data`, ignoring trailing bytes.
    /// A SID without sub-authorities names no principal and is rejected.
    pub fn parse(data: &[u8]) -> Result<Self, DescriptorError> {
        let mut rdr = Cursor::new(data);
        let revision = rdr.read_u8().map_err(truncated("SID header"))?;
        let count = rdr.read_u8().map_err(truncated("SID header"))? as usize;
        let authority = rdr
            .read_u48::<BigEndian>()
            .map_err(truncated("SID header"))?;
        if count == 0 || count > MAX_SUB_AUTHORITIES {
            return Err(DescriptorError::SubAuthorityCount(count));
        }

        let mut sub_authorities = Vec::with_capacity(count);
        for _ in 0..count {
            sub_authorities.push(
                rdr.read_u32::<LittleEndian>()
                    .map_err(truncated("SID sub-authorities"))?,
            );
        }

        Ok(Self {
            revision,
            authority,
            sub_authorities,
        })
    }

    pub fn encoded_len(&self) -> usize {
        SID_HEADER_LEN + self.sub_authorities.len() * 4
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.push(self.revision);
        out.push(self.sub_authorities.len() as u8);
        out.resize(SID_HEADER_LEN, 0);
        BigEndian::write_u48(&mut out[2..SID_HEADER_LEN], self.authority);
        for sub in &self.sub_authorities {
            put_u32(&mut out, *sub);
        }
        out
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}-{}", self.revision, self.authority)?;
        for sub in &self.sub_authorities {
            write!(f, "-{sub}")?;
        }
        Ok(())
    }
}

impl FromStr for Sid {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DescriptorError::InvalidSid(s.to_owned());
        let mut parts = s.split('-');
        if parts.next() != Some("S") {
            return Err(invalid());
        }
        let revision = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let authority: u64 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        if authority >= 1 << 48 {
            return Err(invalid());
        }
        let sub_authorities = parts
            .map(|p| p.parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        if sub_authorities.is_empty() || sub_authorities.len() > MAX_SUB_AUTHORITIES {
            return Err(invalid());
        }
        Ok(Self {
            revision,
            authority,
            sub_authorities,
        })
    }
}
