//! Share-relative path handling. Paths are stored without a leading
//! separator, `\` separated, with `.` and `..` resolved.

pub const SEPARATOR: char = '\\';

/// Normalizes separators, collapses repeats and resolves `.`/`..`.
/// `..` above the share root is dropped.
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = vec![];
    for component in path.split(['\\', '/']) {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            c => parts.push(c),
        }
    }
    parts.join("\\")
}

pub fn is_absolute(path: &str) -> bool {
    path.starts_with(['\\', '/'])
}

/// Resolves `path` against `cwd` unless it is absolute
pub fn resolve(cwd: &str, path: &str) -> String {
    if is_absolute(path) {
        normalize(path)
    } else {
        normalize(&join(cwd, path))
    }
}

pub fn join(base: &str, name: &str) -> String {
    let base = base.trim_end_matches(SEPARATOR);
    let name = name.trim_start_matches(SEPARATOR);
    match (base.is_empty(), name.is_empty()) {
        (true, _) => name.to_owned(),
        (_, true) => base.to_owned(),
        _ => format!("{base}{SEPARATOR}{name}"),
    }
}

/// Directory listing pattern for a share-relative directory
pub fn list_pattern(dir: &str) -> String {
    join(&normalize(dir), "*")
}

pub fn file_name(path: &str) -> &str {
    path.rsplit(SEPARATOR).next().unwrap_or(path)
}

pub fn parent(path: &str) -> &str {
    path.rsplit_once(SEPARATOR).map(|(p, _)| p).unwrap_or("")
}

/// `\\host\share\path`
pub fn unc_path(host: &str, share: &str, path: &str) -> String {
    let path = normalize(path);
    if path.is_empty() {
        format!(r"\\{host}\{share}")
    } else {
        format!(r"\\{host}\{share}\{path}")
    }
}
