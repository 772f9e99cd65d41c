use std::fmt;

/// NT status code as returned by the server
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NtStatus(pub u32);

impl NtStatus {
    pub const SUCCESS: Self = Self(0x0000_0000);
    pub const ACCESS_DENIED: Self = Self(0xc000_0022);
    pub const OBJECT_NAME_NOT_FOUND: Self = Self(0xc000_0034);
    pub const LOGON_FAILURE: Self = Self(0xc000_006d);
    pub const ACCOUNT_RESTRICTION: Self = Self(0xc000_006e);
    pub const INVALID_LOGON_HOURS: Self = Self(0xc000_006f);
    pub const INVALID_WORKSTATION: Self = Self(0xc000_0070);
    pub const PASSWORD_EXPIRED: Self = Self(0xc000_0071);
    pub const ACCOUNT_DISABLED: Self = Self(0xc000_0072);
    pub const NOT_SUPPORTED: Self = Self(0xc000_00bb);
    pub const BAD_NETWORK_NAME: Self = Self(0xc000_00cc);
    pub const ACCOUNT_LOCKED_OUT: Self = Self(0xc000_0234);
    pub const CONNECTION_REFUSED: Self = Self(0xc000_0236);
    pub const NETWORK_UNREACHABLE: Self = Self(0xc000_023c);
    pub const HOST_UNREACHABLE: Self = Self(0xc000_023d);

    pub fn name(&self) -> Option<&'static str> {
        Some(match *self {
            Self::SUCCESS => "STATUS_SUCCESS",
            Self::ACCESS_DENIED => "STATUS_ACCESS_DENIED",
            Self::OBJECT_NAME_NOT_FOUND => "STATUS_OBJECT_NAME_NOT_FOUND",
            Self::LOGON_FAILURE => "STATUS_LOGON_FAILURE",
            Self::ACCOUNT_RESTRICTION => "STATUS_ACCOUNT_RESTRICTION",
            Self::INVALID_LOGON_HOURS => "STATUS_INVALID_LOGON_HOURS",
            Self::INVALID_WORKSTATION => "STATUS_INVALID_WORKSTATION",
            Self::PASSWORD_EXPIRED => "STATUS_PASSWORD_EXPIRED",
            Self::ACCOUNT_DISABLED => "STATUS_ACCOUNT_DISABLED",
            Self::NOT_SUPPORTED => "STATUS_NOT_SUPPORTED",
            Self::BAD_NETWORK_NAME => "STATUS_BAD_NETWORK_NAME",
            Self::ACCOUNT_LOCKED_OUT => "STATUS_ACCOUNT_LOCKED_OUT",
            Self::CONNECTION_REFUSED => "STATUS_CONNECTION_REFUSED",
            Self::NETWORK_UNREACHABLE => "STATUS_NETWORK_UNREACHABLE",
            Self::HOST_UNREACHABLE => "STATUS_HOST_UNREACHABLE",
            _ => return None,
        })
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}({:#010x})", self.0),
            None => write!(f, "{:#010x}", self.0),
        }
    }
}

impl fmt::Debug for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
