use std::collections::HashMap;

const WELL_KNOWN_SIDS: &[(&str, &str)] = &[
    ("S-1-0-0", "Null SID"),
    ("S-1-1-0", "Everyone"),
    ("S-1-2-0", "Local"),
    ("S-1-2-1", "Console Logon"),
    ("S-1-3-0", "Creator Owner"),
    ("S-1-3-1", "Creator Group"),
    ("S-1-5-1", "Dialup"),
    ("S-1-5-2", "Network"),
    ("S-1-5-3", "Batch"),
    ("S-1-5-4", "Interactive"),
    ("S-1-5-6", "Service"),
    ("S-1-5-7", "Anonymous"),
    ("S-1-5-9", "Enterprise Domain Controllers"),
    ("S-1-5-10", "Principal Self"),
    ("S-1-5-11", "Authenticated Users"),
    ("S-1-5-12", "Restricted Code"),
    ("S-1-5-13", "Terminal Server Users"),
    ("S-1-5-14", "Remote Interactive Logon"),
    ("S-1-5-18", "Local System"),
    ("S-1-5-19", "NT Authority\\Local Service"),
    ("S-1-5-20", "NT Authority\\Network Service"),
    ("S-1-5-32-544", "BUILTIN\\Administrators"),
    ("S-1-5-32-545", "BUILTIN\\Users"),
    ("S-1-5-32-546", "BUILTIN\\Guests"),
    ("S-1-5-32-547", "BUILTIN\\Power Users"),
    ("S-1-5-32-548", "BUILTIN\\Account Operators"),
    ("S-1-5-32-549", "BUILTIN\\Server Operators"),
    ("S-1-5-32-550", "BUILTIN\\Print Operators"),
    ("S-1-5-32-551", "BUILTIN\\Backup Operators"),
    ("S-1-5-32-552", "BUILTIN\\Replicators"),
];

pub fn well_known_sid_name(sid: &str) -> Option<&'static str> {
    WELL_KNOWN_SIDS
        .iter()
        .find(|(s, _)| *s == sid)
        .map(|(_, name)| *name)
}

/// Per-session SID to display name cache. Names are only used for
/// diagnostics.
#[derive(Debug, Default)]
pub struct SidResolver {
    cache: HashMap<String, String>,
}

impl SidResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// SIDs that are neither cached nor well-known, in input order,
    /// without duplicates
    pub fn unresolved<'a, I: IntoIterator<Item = &'a str>>(&self, sids: I) -> Vec<String> {
        let mut pending: Vec<String> = vec![];
        for sid in sids {
            if sid.is_empty()
                || self.cache.contains_key(sid)
                || well_known_sid_name(sid).is_some()
                || pending.iter().any(|p| p == sid)
            {
                continue;
            }
            pending.push(sid.to_owned());
        }
        pending
    }

    pub fn insert(&mut self, sid: String, name: String) {
        self.cache.insert(sid, name);
    }

    /// Resolved name, or the SID itself when unknown
    pub fn display_name(&self, sid: &str) -> String {
        if let Some(name) = self.cache.get(sid) {
            return name.clone();
        }
        well_known_sid_name(sid).unwrap_or(sid).to_owned()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
