//! Path handling for media lookups.

/// Deepest directory level the cursor may descend to.
pub const MAX_DEPTH: usize = 14;

/// Split a path into its non-empty `/`-separated segments.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Upper-case a file name and append a `.` if it has no extension.
pub fn file_name(name: &str) -> String {
    let mut name = name.to_ascii_uppercase();
    if !name.contains('.') {
        name.push('.');
    }
    name
}

pub fn dir_name(name: &str) -> String {
    name.to_ascii_uppercase()
}

/// Compare a directory entry with a normalized lookup name. A trailing `.`
/// on the lookup name also matches an entry without an extension.
pub fn names_match(entry: &str, wanted: &str) -> bool {
    if entry.eq_ignore_ascii_case(wanted) {
        return true;
    }
    match wanted.strip_suffix('.') {
        Some(bare) => !entry.contains('.') && entry.eq_ignore_ascii_case(bare),
        None => false,
    }
}

/// True if `dirs` names the same directory as `cursor`, segment by segment.
pub fn same_dir<S: AsRef<str>>(dirs: &[&str], cursor: &[S]) -> bool {
    dirs.len() == cursor.len()
        && dirs
            .iter()
            .zip(cursor)
            .all(|(a, b)| a.eq_ignore_ascii_case(b.as_ref()))
}

/// Cache key of a normalized path: `n = n * 131 + byte`, wrapping.
pub fn hash_path(path: &str) -> u32 {
    path.bytes()
        .fold(0u32, |n, c| n.wrapping_mul(131).wrapping_add(c as u32))
}
