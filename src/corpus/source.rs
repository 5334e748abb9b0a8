//! On-disk document collections.
//!
//! ```text
//! <collection>/
//!     metadata.json    array of objects, entry i describes text i (optional)
//!     texts/0          cleaned text of document 0
//!     texts/1.txt      extensions are ignored
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::corpus::RawDocument;
use crate::error::{Error, Result};
use crate::storage::schema::check_metadata_fields;

pub const TEXTS_DIR: &str = "texts";
pub const METADATA_FILE: &str = "metadata.json";

/// Load a collection ordered by text position.
///
/// Documents with fewer than `min_tokens` whitespace tokens are dropped, so
/// document ids are dense over the kept documents. Metadata keys of the
/// kept documents must be usable as column names.
pub fn load_collection(collection: &Path, min_tokens: usize) -> Result<Vec<RawDocument>> {
    let texts_dir = collection.join(TEXTS_DIR);
    let mut entries: Vec<(usize, PathBuf)> = Vec::new();
    for entry in fs::read_dir(&texts_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        match position_of(&path) {
            Some(pos) => entries.push((pos, path)),
            None => warn!(
                target: "topic_explorer::source",
                path = %path.display(),
                "Skipping text file without a numeric name"
            ),
        }
    }
    entries.sort_by_key(|(pos, _)| *pos);

    let metadata = read_metadata(&collection.join(METADATA_FILE))?;

    let loaded: Vec<Option<RawDocument>> = entries
        .par_iter()
        .map(|(pos, path)| -> Result<Option<RawDocument>> {
            let text = fs::read_to_string(path)?;
            if text.split_whitespace().count() < min_tokens {
                return Ok(None);
            }
            let metadata = metadata.get(*pos).cloned().unwrap_or_default();
            Ok(Some(RawDocument { text, metadata }))
        })
        .collect::<Result<_>>()?;

    let total = loaded.len();
    let docs: Vec<RawDocument> = loaded.into_iter().flatten().collect();
    let fields: BTreeSet<&String> = docs.iter().flat_map(|d| d.metadata.keys()).collect();
    check_metadata_fields(&fields.into_iter().cloned().collect::<Vec<_>>())?;
    info!(
        target: "topic_explorer::source",
        collection = %collection.display(),
        loaded = docs.len(),
        dropped = total - docs.len(),
        min_tokens,
        "Collection loaded"
    );
    Ok(docs)
}

fn position_of(path: &Path) -> Option<usize> {
    path.file_stem()?.to_str()?.parse().ok()
}

fn read_metadata(path: &Path) -> Result<Vec<IndexMap<String, String>>> {
    if !path.exists() {
        debug!(target: "topic_explorer::source", "No metadata file");
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_str(&fs::read_to_string(path)?)?;
    let Value::Array(items) = value else {
        return Err(Error::configuration(format!(
            "{} must hold a JSON array of objects",
            path.display()
        )));
    };
    Ok(items.into_iter().map(flatten_object).collect())
}

/// Flatten one metadata object into string fields.
/// Nulls are dropped, nested values keep their JSON text.
fn flatten_object(value: Value) -> IndexMap<String, String> {
    let Value::Object(map) = value else {
        return IndexMap::new();
    };
    map.into_iter()
        .filter_map(|(field, value)| {
            let text = match value {
                Value::Null => return None,
                Value::String(s) => s,
                other => other.to_string(),
            };
            Some((field, text))
        })
        .collect()
}
