//! Watermark comparison of a newest-first list.

/// What a newest-first list holds beyond a stored watermark.
#[derive(Debug, PartialEq, Eq)]
pub enum Scan<'a, T> {
    /// Nothing to announce or persist.
    Unchanged,
    /// No watermark yet: record the newest id without announcing history.
    Baseline(&'a T),
    /// Items newer than the watermark, newest first. Never empty.
    Fresh(&'a [T]),
}

/// Compare `items` (newest first) against `watermark`.
///
/// A watermark that is no longer in the list (pruned past the page size)
/// makes the whole list fresh.
pub fn scan<'a, T, F>(items: &'a [T], watermark: Option<&str>, id: F) -> Scan<'a, T>
where
    F: Fn(&T) -> &str,
{
    let Some(newest) = items.first() else {
        return Scan::Unchanged;
    };
    let Some(watermark) = watermark else {
        return Scan::Baseline(newest);
    };
    let cut = items
        .iter()
        .position(|item| id(item) == watermark)
        .unwrap_or(items.len());
    if cut == 0 {
        Scan::Unchanged
    } else {
        Scan::Fresh(&items[..cut])
    }
}
