//! Destination filenames for the items of one job.

use std::collections::HashSet;

use super::sanitize::sanitize_component;
use crate::job_store::RequestedItem;

/// Used when neither the hint nor the URL yields a usable name.
const DEFAULT_FILENAME: &str = "download.bin";

/// Last non-empty path segment of `url`, if any.
pub fn filename_from_url_path(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path().split('/').filter(|s| !s.is_empty()).last()?;
    if segment == "." || segment == ".." {
        return None;
    }
    Some(segment.to_string())
}

/// Filename for one item: the sanitized hint, else the URL's last path segment.
pub fn item_filename(item: &RequestedItem) -> String {
    let candidate = item
        .destination_hint
        .as_deref()
        .map(sanitize_component)
        .filter(|s| !s.is_empty())
        .or_else(|| filename_from_url_path(&item.url).map(|s| sanitize_component(&s)))
        .filter(|s| !s.is_empty());
    candidate.unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}

fn with_suffix(name: &str, n: usize) -> String {
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{}-{}{}", &name[..dot], n, &name[dot..]),
        _ => format!("{name}-{n}"),
    }
}

/// De-duplicate names in order: the first keeps its name, later collisions get
/// `-1`, `-2`, ... inserted before the extension.
pub fn unique_filenames<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let names: Vec<String> = names.into_iter().map(Into::into).collect();
    let mut taken: HashSet<String> = HashSet::with_capacity(names.len());
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let mut candidate = name.clone();
        let mut n = 1;
        while taken.contains(&candidate) {
            candidate = with_suffix(&name, n);
            n += 1;
        }
        taken.insert(candidate.clone());
        out.push(candidate);
    }
    out
}

/// Filenames for every item of a job, index-aligned and unique within the job.
pub fn plan_filenames(items: &[RequestedItem]) -> Vec<String> {
    unique_filenames(items.iter().map(item_filename))
}
