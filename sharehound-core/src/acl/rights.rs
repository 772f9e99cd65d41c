use std::collections::BTreeMap;
use std::fmt::Write;

use sharehound_common::kinds::RightKind;

use super::{AceType, Acl, DescriptorError, SecurityDescriptor};

/// Principal SID to the edge kinds it was granted, in ACE order.
/// Duplicates are kept here and dropped when edges are emitted.
pub type RightsMap = BTreeMap<String, Vec<RightKind>>;

pub static ACCESS_MASK_RIGHTS: [(u32, &str, RightKind); 17] = [
    (0x0000_0001, "DS_CREATE_CHILD", RightKind::CanDsCreateChild),
    (0x0000_0002, "DS_DELETE_CHILD", RightKind::CanDsDeleteChild),
    (0x0000_0004, "DS_LIST_CONTENTS", RightKind::CanDsListContents),
    (0x0000_0008, "DS_WRITE_PROPERTY_EXTENDED", RightKind::CanDsWriteExtendedProperties),
    (0x0000_0010, "DS_READ_PROPERTY", RightKind::CanDsReadProperty),
    (0x0000_0020, "DS_WRITE_PROPERTY", RightKind::CanDsWriteProperty),
    (0x0000_0040, "DS_DELETE_TREE", RightKind::CanDsDeleteTree),
    (0x0000_0080, "DS_LIST_OBJECT", RightKind::CanDsListObject),
    (0x0000_0100, "DS_CONTROL_ACCESS", RightKind::CanDsControlAccess),
    (0x0001_0000, "DELETE", RightKind::CanDelete),
    (0x0002_0000, "READ_CONTROL", RightKind::CanReadControl),
    (0x0004_0000, "WRITE_DAC", RightKind::CanWriteDacl),
    (0x0008_0000, "WRITE_OWNER", RightKind::CanWriteOwner),
    (0x1000_0000, "GENERIC_ALL", RightKind::CanGenericAll),
    (0x2000_0000, "GENERIC_EXECUTE", RightKind::CanGenericExecute),
    (0x4000_0000, "GENERIC_WRITE", RightKind::CanGenericWrite),
    (0x8000_0000, "GENERIC_READ", RightKind::CanGenericRead),
];

/// Edge kinds granted by an access mask, in table order
pub fn rights_for_mask(mask: u32) -> impl Iterator<Item = RightKind> {
    ACCESS_MASK_RIGHTS
        .iter()
        .filter(move |(bit, _, _)| mask & bit != 0)
        .map(|(_, _, kind)| *kind)
}

fn mask_flag_names(mask: u32) -> Vec<&'static str> {
    ACCESS_MASK_RIGHTS
        .iter()
        .filter(|(bit, _, _)| mask & bit != 0)
        .map(|(_, name, _)| *name)
        .collect()
}

/// Only explicit allow grants count. Denied and object ACEs are ignored,
/// so this is not an effective-access computation.
pub fn decode_dacl(dacl: &Acl) -> RightsMap {
    let mut rights = RightsMap::new();
    for ace in &dacl.aces {
        let Some(sid) = &ace.sid else {
            continue;
        };
        if ace.ace_type != AceType::Allowed {
            continue;
        }
        let principal = sid.to_string();
        if principal.is_empty() {
            continue;
        }
        let granted: Vec<_> = rights_for_mask(ace.mask).collect();
        if granted.is_empty() {
            continue;
        }
        rights.entry(principal).or_default().extend(granted);
    }
    rights
}

/// Empty and DACL-less descriptors decode to an empty map
pub fn rights_from_descriptor(bytes: Option<&[u8]>) -> Result<RightsMap, DescriptorError> {
    let Some(bytes) = bytes.filter(|b| !b.is_empty()) else {
        return Ok(RightsMap::new());
    };
    let descriptor = SecurityDescriptor::parse(bytes)?;
    Ok(descriptor.dacl.as_ref().map(decode_dacl).unwrap_or_default())
}

/// Multi-line rendering for debug logs. `name` maps a SID string to a
/// display name.
pub fn describe_descriptor<F>(descriptor: &SecurityDescriptor, name: F) -> String
where
    F: Fn(&str) -> String,
{
    let mut out = String::new();
    let sid_name = |sid: &Option<super::Sid>| match sid {
        Some(sid) => name(&sid.to_string()),
        None => "-".to_owned(),
    };
    let _ = writeln!(out, "Owner: {}", sid_name(&descriptor.owner));
    let _ = writeln!(out, "Group: {}", sid_name(&descriptor.group));

    let Some(dacl) = &descriptor.dacl else {
        let _ = writeln!(out, "DACL: (none)");
        return out;
    };
    let _ = writeln!(out, "DACL: {} ACE(s)", dacl.aces.len());
    for ace in &dacl.aces {
        if !matches!(ace.ace_type, AceType::Allowed | AceType::Denied) {
            continue;
        }
        let flags = mask_flag_names(ace.mask);
        let _ = writeln!(
            out,
            "  {} {} mask=0x{:08x} [{}]",
            ace.ace_type,
            sid_name(&ace.sid),
            ace.mask,
            flags.join(", "),
        );
    }
    out
}
