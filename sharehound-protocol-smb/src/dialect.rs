use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Let the server pick the highest dialect both sides support
    Auto,
    Smb30,
    Smb21,
    Smb202,
    Smb1,
}

impl Dialect {
    /// Negotiation order, newest first
    pub const PREFERENCE: [Dialect; 5] = [
        Dialect::Auto,
        Dialect::Smb30,
        Dialect::Smb21,
        Dialect::Smb202,
        Dialect::Smb1,
    ];
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto-negotiate",
            Self::Smb30 => "SMB 3.0",
            Self::Smb21 => "SMB 2.1",
            Self::Smb202 => "SMB 2.0",
            Self::Smb1 => "SMB 1.0",
        })
    }
}
