use std::fmt;

use data_encoding::HEXLOWER_PERMISSIVE;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::{Secret, ShareHoundError};

/// LM hash of the empty password, used when only the NT half is supplied
pub const EMPTY_LM_HASH: &str = "aad3b435b51404eeaad3b435b51404ee";
/// NT hash of the empty password, used when only the LM half is supplied
pub const EMPTY_NT_HASH: &str = "31d6cfe0d16ae931b73c59d7e0c089c0";

static HASH_PAIR: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^([0-9a-f]{32})?(:)?([0-9a-f]{32})?$").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Password,
    PassTheHash,
    Kerberos,
}

#[derive(Clone, PartialEq, Eq)]
pub struct NtlmHashes {
    lm: Secret<Vec<u8>>,
    nt: Secret<Vec<u8>>,
}

impl NtlmHashes {
    pub fn lm(&self) -> &[u8] {
        self.lm.expose_secret()
    }

    pub fn nt(&self) -> &[u8] {
        self.nt.expose_secret()
    }
}

impl fmt::Debug for NtlmHashes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NtlmHashes(<secret>)")
    }
}

impl std::str::FromStr for NtlmHashes {
    type Err = ShareHoundError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((lm, nt)) = parse_lm_nt_hashes(s)? else {
            return Err(ShareHoundError::InvalidHash("empty hash string".into()));
        };
        let decode = |v: &str| {
            HEXLOWER_PERMISSIVE
                .decode(v.as_bytes())
                .map_err(|e| ShareHoundError::InvalidHash(e.to_string()))
        };
        Ok(Self {
            lm: Secret::new(decode(&lm)?),
            nt: Secret::new(decode(&nt)?),
        })
    }
}

impl<'de> Deserialize<'de> for NtlmHashes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let v: String = Deserialize::deserialize::<D>(deserializer)?;
        v.parse().map_err(serde::de::Error::custom)
    }
}

/// Splits an `LM:NT`, `:NT` or `LM:` string into its hex halves, filling a
/// missing half with the empty-password hash. Returns `None` for an empty
/// string.
pub fn parse_lm_nt_hashes(value: &str) -> Result<Option<(String, String)>, ShareHoundError> {
    let value = value.trim().to_lowercase();
    if value.is_empty() {
        return Ok(None);
    }

    let Some(captures) = HASH_PAIR.captures(&value) else {
        return Err(ShareHoundError::InvalidHash(value));
    };

    let lm = captures.get(1).map(|m| m.as_str().to_owned());
    let nt = captures.get(3).map(|m| m.as_str().to_owned());

    Ok(match (lm, nt) {
        (None, None) => None,
        (None, Some(nt)) => Some((EMPTY_LM_HASH.to_owned(), nt)),
        (Some(lm), None) => Some((lm, EMPTY_NT_HASH.to_owned())),
        (Some(lm), Some(nt)) => Some((lm, nt)),
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Secret<String>,
    #[serde(default)]
    pub hashes: Option<NtlmHashes>,
    #[serde(default)]
    pub use_kerberos: bool,
    #[serde(default)]
    pub aes_key: Option<Secret<String>>,
    #[serde(default)]
    pub kdc_host: Option<String>,
}

impl Credentials {
    pub fn new<D: Into<String>, U: Into<String>>(domain: D, username: U) -> Self {
        Self {
            domain: domain.into(),
            username: username.into(),
            ..Default::default()
        }
    }

    pub fn with_password<P: Into<String>>(mut self, password: P) -> Self {
        self.password = Secret::new(password.into());
        self
    }

    pub fn with_hashes(mut self, hashes: &str) -> Result<Self, ShareHoundError> {
        self.hashes = match parse_lm_nt_hashes(hashes)? {
            Some(_) => Some(hashes.parse()?),
            None => None,
        };
        Ok(self)
    }

    pub fn with_kerberos(mut self, aes_key: Option<String>, kdc_host: Option<String>) -> Self {
        self.use_kerberos = true;
        self.aes_key = aes_key.map(Secret::new);
        self.kdc_host = kdc_host;
        self
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty()
    }

    pub fn auth_scheme(&self) -> AuthScheme {
        if self.use_kerberos {
            AuthScheme::Kerberos
        } else if self.hashes.is_some() {
            AuthScheme::PassTheHash
        } else {
            AuthScheme::Password
        }
    }

    pub fn safe_description(&self) -> String {
        format!("<Credentials for '{}\\{}'>", self.domain, self.username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NT: &str = "8846f7eaee8fb117ad06bdd830b7586c";

    #[test]
    fn test_full_pair() {
        let lm = "01fc5a6be7bc6929aad3b435b51404ee";
        let parsed = parse_lm_nt_hashes(&format!("{lm}:{NT}")).unwrap();
        assert_eq!(parsed, Some((lm.to_owned(), NT.to_owned())));
    }

    #[test]
    fn test_only_nt_fills_lm() {
        let parsed = parse_lm_nt_hashes(&format!(":{}", NT.to_uppercase())).unwrap();
        assert_eq!(parsed, Some((EMPTY_LM_HASH.to_owned(), NT.to_owned())));
    }

    #[test]
    fn test_only_lm_fills_nt() {
        let parsed = parse_lm_nt_hashes(&format!("{NT}:")).unwrap();
        assert_eq!(parsed, Some((NT.to_owned(), EMPTY_NT_HASH.to_owned())));
    }

    #[test]
    fn test_empty_and_garbage() {
        assert_eq!(parse_lm_nt_hashes("  ").unwrap(), None);
        assert!(parse_lm_nt_hashes("not-a-hash").is_err());
    }

    #[test]
    fn test_auth_scheme_follows_credential_shape() {
        let creds = Credentials::new("CORP", "alice").with_password("pw");
        assert_eq!(creds.auth_scheme(), AuthScheme::Password);

        let creds = creds.with_hashes(&format!(":{NT}")).unwrap();
        assert_eq!(creds.auth_scheme(), AuthScheme::PassTheHash);
        assert_eq!(creds.hashes.as_ref().unwrap().nt().len(), 16);

        let creds = creds.with_kerberos(None, Some("dc01.corp.local".into()));
        assert_eq!(creds.auth_scheme(), AuthScheme::Kerberos);
    }

    #[test]
    fn test_description_hides_password() {
        let creds = Credentials::new("CORP", "alice").with_password("hunter2");
        assert_eq!(creds.safe_description(), "<Credentials for 'CORP\\alice'>");
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
