//! Self-relative security descriptor parsing and DACL decoding

mod descriptor;
mod rights;
mod sid;

pub use descriptor::{Ace, AceType, Acl, DescriptorError, SecurityDescriptor};
pub use rights::{
    decode_dacl, describe_descriptor, rights_for_mask, rights_from_descriptor, RightsMap,
    ACCESS_MASK_RIGHTS,
};
pub use sid::Sid;
