//! On-disk cache for a parsed [`DefinitionStore`], keyed by a fingerprint of
//! the input headers and the configuration that produced it. A cache hit
//! skips tokenizing, preprocessing, and declaration parsing entirely.

use crate::config::ParserConfig;
use crate::error::{ParseError, ParseResult};
use crate::store::DefinitionStore;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// Format of the cache file itself. Bumped whenever [`CachedStore`]'s shape
/// changes incompatibly.
const CACHE_FORMAT_VERSION: u32 = 1;

/// Bumped whenever parsing semantics change in a way that should invalidate
/// every existing cache entry even if the inputs are byte-identical.
const PARSER_VERSION: u32 = 1;

/// Identifies the inputs a cached store was built from, independent of the
/// store's own content. A cache entry is valid only when both the format
/// version and both fingerprints match what's on disk now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheHeader {
    pub format_version: u32,
    pub parser_version: u32,
    pub input_fingerprint: u64,
    pub config_fingerprint: u64,
}

#[derive(Serialize, Deserialize)]
struct CachedStore {
    header: CacheHeader,
    store: DefinitionStore,
}

/// One header file's contribution to the input fingerprint: its resolved
/// path and its contents.
pub struct InputFile<'a> {
    pub path: &'a Path,
    pub contents: &'a str,
}

/// Fingerprint a set of header inputs. Order-independent: paths are sorted
/// before hashing so the same set of headers fingerprints identically
/// regardless of the order they were supplied in.
pub fn fingerprint_inputs(inputs: &[InputFile<'_>]) -> u64 {
    let mut paths: Vec<&InputFile<'_>> = inputs.iter().collect();
    paths.sort_by_key(|f| f.path);
    let mut hasher = DefaultHasher::new();
    for file in paths {
        file.path.hash(&mut hasher);
        file.contents.hash(&mut hasher);
    }
    hasher.finish()
}

/// Fingerprint a parser configuration. Relies on [`ParserConfig`]'s
/// `PartialEq`-comparable fields all being stable under JSON round-trip,
/// since a derived `Hash` isn't available for a struct holding a `HashMap`.
pub fn fingerprint_config(config: &ParserConfig) -> u64 {
    let mut hasher = DefaultHasher::new();
    // serde_json::to_string on a HashMap-bearing struct still hashes
    // deterministically here because ParserConfig's only HashMap
    // (`replacements`) is small and keyed by plain strings; mismatched
    // insertion order would only cause an unnecessary cache miss, never a
    // false hit, so no canonicalization beyond this is needed.
    let rendered = serde_json::to_string(config).unwrap_or_default();
    rendered.hash(&mut hasher);
    hasher.finish()
}

fn expected_header(inputs: &[InputFile<'_>], config: &ParserConfig) -> CacheHeader {
    CacheHeader {
        format_version: CACHE_FORMAT_VERSION,
        parser_version: PARSER_VERSION,
        input_fingerprint: fingerprint_inputs(inputs),
        config_fingerprint: fingerprint_config(config),
    }
}

/// Load a cached store from `path` if it exists and its header matches the
/// fingerprint of `inputs`/`config`. Returns `Ok(None)` on any mismatch or
/// missing file; a corrupt cache file is treated the same way rather than
/// surfaced as an error, since re-parsing is always a safe fallback.
pub fn load(path: &Path, inputs: &[InputFile<'_>], config: &ParserConfig) -> ParseResult<Option<DefinitionStore>> {
    if !path.is_file() {
        return Ok(None);
    }
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => return Err(ParseError::IoError(path.to_path_buf(), err)),
    };
    let cached: CachedStore = match serde_json::from_str(&raw) {
        Ok(cached) => cached,
        Err(_) => return Ok(None),
    };
    let expected = expected_header(inputs, config);
    if cached.header != expected {
        return Ok(None);
    }
    Ok(Some(cached.store))
}

/// Write `store` to `path` under a header fingerprinted from `inputs` and
/// `config`, so a later [`load`] call with the same inputs hits.
pub fn save(path: &Path, inputs: &[InputFile<'_>], config: &ParserConfig, store: &DefinitionStore) -> ParseResult<()> {
    let cached = CachedStore {
        header: expected_header(inputs, config),
        store: store.clone(),
    };
    let rendered = serde_json::to_string(&cached)
        .map_err(|err| ParseError::CacheError(err.to_string()))?;
    std::fs::write(path, rendered).map_err(|err| ParseError::IoError(path.to_path_buf(), err))
}
