//! Glob matching for cache keys.
//!
//! Only `*` is special: it matches any run of characters, including none.

/// Checks if a cache key matches a glob pattern.
///
/// # Examples
///
/// ```
/// use repokit_core::cache::pattern_matches;
///
/// assert!(pattern_matches("Order:item:42", "Order:item:42"));
/// assert!(pattern_matches("Order:query:*", "Order:query:Lines|Lines.Product"));
/// assert!(pattern_matches("*:item:42", "Customer:item:42"));
/// assert!(!pattern_matches("Order:*", "Customer:item:42"));
/// ```
pub fn pattern_matches(pattern: &str, key: &str) -> bool {
    if pattern.is_empty() {
        return key.is_empty();
    }

    let segments: Vec<&str> = pattern.split('*').collect();
    if segments.len() == 1 {
        return pattern == key;
    }

    let anchored_start = !pattern.starts_with('*');
    let anchored_end = !pattern.ends_with('*');
    let last = segments.len() - 1;
    let mut remaining = key;

    for (i, segment) in segments.iter().enumerate() {
        // Adjacent or leading/trailing wildcards leave empty segments.
        if segment.is_empty() {
            continue;
        }

        if i == 0 && anchored_start {
            match remaining.strip_prefix(segment) {
                Some(rest) => remaining = rest,
                None => return false,
            }
        } else if i == last && anchored_end {
            return remaining.ends_with(segment);
        } else {
            match remaining.find(segment) {
                Some(pos) => remaining = &remaining[pos + segment.len()..],
                None => return false,
            }
        }
    }

    true
}
