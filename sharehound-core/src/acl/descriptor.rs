use std::fmt;
use std::io::{self, Cursor};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use thiserror::Error;

use super::Sid;

const HEADER_LEN: usize = 20;
const ACL_HEADER_LEN: usize = 8;
const ACE_HEADER_LEN: usize = 4;
/// ACE header plus the access mask
const MASK_ACE_MIN_LEN: usize = 8;

pub const SE_DACL_PRESENT: u16 = 0x0004;
pub const SE_SACL_PRESENT: u16 = 0x0010;
pub const SE_SELF_RELATIVE: u16 = 0x8000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("security descriptor is {0} bytes, shorter than its header")]
    TooShort(usize),
    #[error("DACL offset {offset} is past the end of a {len}-byte descriptor")]
    DaclOutOfBounds { offset: usize, len: usize },
    #[error("DACL header at offset {0} does not fit in the descriptor")]
    DaclHeaderTruncated(usize),
    #[error("ACL claims {size} bytes but {available} are available")]
    AclSize { size: usize, available: usize },
    #[error("truncated {0}")]
    Truncated(&'static str),
    #[error("SID has {0} sub-authorities")]
    SubAuthorityCount(usize),
    #[error("invalid SID string: {0}")]
    InvalidSid(String),
}

pub(super) fn truncated(what: &'static str) -> impl Fn(io::Error) -> DescriptorError {
    move |_| DescriptorError::Truncated(what)
}

pub(super) fn put_u16(out: &mut Vec<u8>, value: u16) {
    let at = out.len();
    out.resize(at + 2, 0);
    LittleEndian::write_u16(&mut out[at..], value);
}

pub(super) fn put_u32(out: &mut Vec<u8>, value: u32) {
    let at = out.len();
    out.resize(at + 4, 0);
    LittleEndian::write_u32(&mut out[at..], value);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AceType {
    Allowed,
    Denied,
    Other(u8),
}

impl AceType {
    pub fn code(&self) -> u8 {
        match self {
            AceType::Allowed => 0,
            AceType::Denied => 1,
            AceType::Other(code) => *code,
        }
    }
}

impl From<u8> for AceType {
    fn from(code: u8) -> Self {
        match code {
            0 => AceType::Allowed,
            1 => AceType::Denied,
            other => AceType::Other(other),
        }
    }
}

impl fmt::Display for AceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AceType::Allowed => write!(f, "ACCESS_ALLOWED"),
            AceType::Denied => write!(f, "ACCESS_DENIED"),
            AceType::Other(code) => write!(f, "ACE_TYPE_{code}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ace {
    pub ace_type: AceType,
    pub flags: u8,
    pub mask: u32,
    /// Absent when the ACE carries no SID or the SID is malformed
    pub sid: Option<Sid>,
}

impl Ace {
    pub fn allowed(sid: Sid, mask: u32) -> Self {
        Self {
            ace_type: AceType::Allowed,
            flags: 0,
            mask,
            sid: Some(sid),
        }
    }

    pub fn denied(sid: Sid, mask: u32) -> Self {
        Self {
            ace_type: AceType::Denied,
            flags: 0,
            mask,
            sid: Some(sid),
        }
    }

    /// `None` when the header is unreadable or the declared size does not
    /// fit, which ends ACE parsing for the ACL
    fn parse(data: &[u8]) -> Option<(Self, usize)> {
        let mut rdr = Cursor::new(data);
        let ace_type = AceType::from(rdr.read_u8().ok()?);
        let flags = rdr.read_u8().ok()?;
        let size = rdr.read_u16::<LittleEndian>().ok()? as usize;
        if size < ACE_HEADER_LEN || data.len() < size {
            return None;
        }

        let mut mask = 0;
        let mut sid = None;
        // Allowed, denied, audit and alarm ACEs share the mask + SID body
        if ace_type.code() <= 3 && size >= MASK_ACE_MIN_LEN {
            mask = rdr.read_u32::<LittleEndian>().ok()?;
            sid = Sid::parse(&data[MASK_ACE_MIN_LEN..size]).ok();
        }

        Some((
            Self {
                ace_type,
                flags,
                mask,
                sid,
            },
            size,
        ))
    }

    fn encode(&self, out: &mut Vec<u8>) {
        let sid = self.sid.as_ref().map(Sid::to_bytes).unwrap_or_default();
        out.push(self.ace_type.code());
        out.push(self.flags);
        put_u16(out, (MASK_ACE_MIN_LEN + sid.len()) as u16);
        put_u32(out, self.mask);
        out.extend_from_slice(&sid);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Acl {
    pub revision: u8,
    pub aces: Vec<Ace>,
}

impl Acl {
    pub fn new(aces: Vec<Ace>) -> Self {
        Self { revision: 2, aces }
    }

    /// Parses the ACL at the start of `data`. ACEs are read from within
    /// the declared ACL size only.
    fn parse(data: &[u8]) -> Result<Self, DescriptorError> {
        let mut rdr = Cursor::new(data);
        let revision = rdr.read_u8().map_err(truncated("ACL header"))?;
        let _sbz1 = rdr.read_u8().map_err(truncated("ACL header"))?;
        let size = rdr
            .read_u16::<LittleEndian>()
            .map_err(truncated("ACL header"))? as usize;
        let count = rdr
            .read_u16::<LittleEndian>()
            .map_err(truncated("ACL header"))? as usize;
        if size < ACL_HEADER_LEN || size > data.len() {
            return Err(DescriptorError::AclSize {
                size,
                available: data.len(),
            });
        }
        let data = &data[..size];

        let mut aces = Vec::with_capacity(count.min(64));
        let mut offset = ACL_HEADER_LEN;
        while aces.len() < count && offset < data.len() {
            let Some((ace, ace_size)) = Ace::parse(&data[offset..]) else {
                break;
            };
            aces.push(ace);
            offset += ace_size;
        }
        Ok(Self { revision, aces })
    }

    fn encode(&self) -> Vec<u8> {
        let mut body = vec![];
        for ace in &self.aces {
            ace.encode(&mut body);
        }
        let mut out = Vec::with_capacity(ACL_HEADER_LEN + body.len());
        out.push(self.revision);
        out.push(0);
        put_u16(&mut out, (ACL_HEADER_LEN + body.len()) as u16);
        put_u16(&mut out, self.aces.len() as u16);
        put_u16(&mut out, 0);
        out.extend_from_slice(&body);
        out
    }
}

/// Parsed self-relative security descriptor. Only the DACL is decoded,
/// the SACL is never requested from servers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecurityDescriptor {
    pub revision: u8,
    pub control: u16,
    pub owner: Option<Sid>,
    pub group: Option<Sid>,
    pub dacl: Option<Acl>,
}

fn optional_sid(data: &[u8], offset: usize) -> Option<Sid> {
    if offset == 0 || offset >= data.len() {
        return None;
    }
    Sid::parse(&data[offset..]).ok()
}

impl SecurityDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, DescriptorError> {
        if data.len() < HEADER_LEN {
            return Err(DescriptorError::TooShort(data.len()));
        }

        let header = truncated("descriptor header");
        let mut rdr = Cursor::new(data);
        let revision = rdr.read_u8().map_err(&header)?;
        let _sbz1 = rdr.read_u8().map_err(&header)?;
        let control = rdr.read_u16::<LittleEndian>().map_err(&header)?;
        let owner_offset = rdr.read_u32::<LittleEndian>().map_err(&header)? as usize;
        let group_offset = rdr.read_u32::<LittleEndian>().map_err(&header)? as usize;
        let _sacl_offset = rdr.read_u32::<LittleEndian>().map_err(&header)?;
        let dacl_offset = rdr.read_u32::<LittleEndian>().map_err(&header)? as usize;

        let dacl = if dacl_offset > 0 && control & SE_DACL_PRESENT != 0 {
            if dacl_offset >= data.len() {
                return Err(DescriptorError::DaclOutOfBounds {
                    offset: dacl_offset,
                    len: data.len(),
                });
            }
            if data.len() - dacl_offset < ACL_HEADER_LEN {
                return Err(DescriptorError::DaclHeaderTruncated(dacl_offset));
            }
            Some(Acl::parse(&data[dacl_offset..])?)
        } else {
            None
        };

        Ok(Self {
            revision,
            control,
            owner: optional_sid(data, owner_offset),
            group: optional_sid(data, group_offset),
            dacl,
        })
    }

    /// Builds a self-relative descriptor with the DACL first, then owner
    /// and group
    pub fn new(owner: Option<Sid>, group: Option<Sid>, dacl: Option<Acl>) -> Self {
        let mut control = SE_SELF_RELATIVE;
        if dacl.is_some() {
            control |= SE_DACL_PRESENT;
        }
        Self {
            revision: 1,
            control,
            owner,
            group,
            dacl,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = vec![];
        let offset_of = |bytes: Vec<u8>, body: &mut Vec<u8>| {
            let at = HEADER_LEN + body.len();
            body.extend_from_slice(&bytes);
            at as u32
        };

        let dacl_offset = self
            .dacl
            .as_ref()
            .map(|acl| offset_of(acl.encode(), &mut body))
            .unwrap_or(0);
        let owner_offset = self
            .owner
            .as_ref()
            .map(|sid| offset_of(sid.to_bytes(), &mut body))
            .unwrap_or(0);
        let group_offset = self
            .group
            .as_ref()
            .map(|sid| offset_of(sid.to_bytes(), &mut body))
            .unwrap_or(0);

        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.push(self.revision);
        out.push(0);
        put_u16(&mut out, self.control);
        put_u32(&mut out, owner_offset);
        put_u32(&mut out, group_offset);
        put_u32(&mut out, 0);
        put_u32(&mut out, dacl_offset);
        out.extend_from_slice(&body);
        out
    }
}
