//! Species names derived from raster file names.
//!
//! Model outputs are named after the species plus a tag for the model or
//! dataset that produced them, e.g. `Puma_concolor_10_MAXENT.tif` or
//! `Puma_concolor_veg.tif`. Both map to `Puma concolor`.

use std::collections::BTreeSet;
use std::path::Path;

/// Model/dataset tags stripped before the extension, most specific first
const SUFFIX_TAGS: [&str; 5] = ["_10_MAXENT", "_veg", "_pub", "_con", "_exp"];

/// Longest first so `.tiff` is not left as `f`
const EXTENSIONS: [&str; 2] = [".tiff", ".tif"];

const INFIX_TAG: &str = "_pub1";

/// Canonical species name for a raster file name.
///
/// Idempotent: `canonicalize(&canonicalize(x)) == canonicalize(x)`.
pub fn canonicalize(raw: &str) -> String {
    let mut current = canonicalize_once(raw);
    loop {
        let next = canonicalize_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Canonical species name for a raster path, using its file name
pub fn species_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_else(|| path.to_string_lossy());
    canonicalize(&file_name)
}

/// Canonicalize, deduplicate and sort a collection of raw names.
///
/// Names that canonicalize to an empty string are dropped.
pub fn canonical_species<I, S>(raw_names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw_names
        .into_iter()
        .map(|raw| canonicalize(raw.as_ref()))
        .filter(|name| !name.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn canonicalize_once(raw: &str) -> String {
    let stripped = strip_suffixes(raw);
    stripped
        .replace(INFIX_TAG, " ")
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_suffixes(raw: &str) -> &str {
    let mut name = raw;
    for tag in SUFFIX_TAGS {
        for ext in EXTENSIONS {
            if let Some(head) = strip_extension(name, ext).and_then(|h| h.strip_suffix(tag)) {
                name = head;
            }
        }
    }
    for ext in EXTENSIONS {
        if let Some(head) = strip_extension(name, ext) {
            name = head;
        }
    }
    name
}

/// `name` without a trailing `ext`, compared ASCII case-insensitively
fn strip_extension<'a>(name: &'a str, ext: &str) -> Option<&'a str> {
    let split = name.len().checked_sub(ext.len())?;
    if !name.is_char_boundary(split) {
        return None;
    }
    let (head, tail) = name.split_at(split);
    tail.eq_ignore_ascii_case(ext).then_some(head)
}
