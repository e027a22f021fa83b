//! Representative-name selection for candidate generation.
//!
//! An entity submitted with hundreds of aliases would make the candidate
//! query prohibitively large. This picks a few names that cover the variety
//! of the alias set: a centroid, then the names least similar to what has
//! been picked already.

use strsim::levenshtein;

use crate::normalize::comparison_form;

/// Pick up to `limit` names to search for. With `limit` or fewer inputs the
/// names are returned unchanged.
pub fn pick_names(names: &[&str], limit: usize) -> Vec<String> {
    if names.len() <= limit {
        return names.iter().map(|n| n.to_string()).collect();
    }

    let normalized: Vec<String> = {
        let mut out: Vec<String> = Vec::new();
        for name in names {
            let form = comparison_form(name);
            if !form.is_empty() && !out.contains(&form) {
                out.push(form);
            }
        }
        out
    };
    if normalized.len() <= limit {
        return normalized;
    }

    let mut picked: Vec<String> = Vec::with_capacity(limit);

    // Centroid: the name with the smallest total edit distance to the rest.
    let centroid = normalized
        .iter()
        .min_by_key(|candidate| {
            normalized.iter().map(|other| levenshtein(candidate, other)).sum::<usize>()
        })
        .cloned();
    if let Some(centroid) = centroid {
        picked.push(centroid);
    }

    // Then repeatedly add the name farthest from everything picked so far.
    while picked.len() < limit {
        let next = normalized
            .iter()
            .filter(|candidate| !picked.contains(candidate))
            .max_by_key(|candidate| {
                picked.iter().map(|p| levenshtein(candidate, p)).sum::<usize>()
            })
            .cloned();
        match next {
            Some(name) => picked.push(name),
            None => break,
        }
    }
    picked
}
