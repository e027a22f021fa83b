//! Date precision expansion.

/// Expand date values into their less precise prefixes, so that a query for
/// `1952` matches a stored `1952-10-07` and vice versa.
///
/// A value longer than a given precision contributes its year, year-month,
/// and day prefixes. The input values are always kept.
pub fn expand_dates<S: AsRef<str>>(dates: &[S]) -> Vec<String> {
    const PRECISIONS: &[usize] = &[10, 7, 4];
    let mut expanded: Vec<String> = Vec::new();
    for date in dates {
        let date = date.as_ref();
        if !expanded.iter().any(|d| d == date) {
            expanded.push(date.to_string());
        }
        for precision in PRECISIONS {
            if date.len() > *precision {
                if let Some(prefix) = date.get(0..*precision) {
                    if !expanded.iter().any(|d| d == prefix) {
                        expanded.push(prefix.to_string());
                    }
                }
            }
        }
    }
    expanded
}
