//! Retention selection over a newest-first file listing

/// The first `keep` records of `ordered`, or all of them when `keep` is unset
pub fn select_retained<T>(ordered: &[T], keep: Option<usize>) -> &[T] {
    match keep {
        Some(count) => &ordered[..count.min(ordered.len())],
        None => ordered,
    }
}
