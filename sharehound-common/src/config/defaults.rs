use std::time::Duration;

pub(crate) const fn _default_false() -> bool {
    false
}

pub(crate) const fn _default_smb_port() -> u16 {
    445
}

pub(crate) const fn _default_max_workers() -> usize {
    64
}

#[inline]
pub(crate) fn _default_timeout() -> Duration {
    Duration::from_millis(2500)
}

#[inline]
pub(crate) fn _default_negotiate_timeout() -> Duration {
    Duration::from_secs(30)
}

#[inline]
pub(crate) fn _default_source_kind() -> String {
    crate::kinds::NODE_KIND_NETWORK_SHARE_BASE.to_owned()
}
