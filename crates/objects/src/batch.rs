//! Size-bounded chunking of ordered command lists.

/// Splits `items` into contiguous segments of at most `max_per_segment`.
///
/// Order is preserved and nothing is deduplicated. An input no larger than the
/// limit (including an empty one) comes back as a single segment. A limit of
/// zero is treated as one.
pub fn split<T>(items: Vec<T>, max_per_segment: usize) -> Vec<Vec<T>> {
    let max = max_per_segment.max(1);
    if items.len() <= max {
        return vec![items];
    }
    let mut segments = Vec::with_capacity(items.len().div_ceil(max));
    let mut rest = items.into_iter().peekable();
    while rest.peek().is_some() {
        segments.push(rest.by_ref().take(max).collect());
    }
    segments
}
