//! Parser configuration surface.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Text encoding of input header files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    Utf8,
    Latin1,
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding::Utf8
    }
}

/// Configuration passed into every parser entry point: search paths,
/// encoding, the primitive/qualifier/modifier keyword lists, the
/// attribute-macro replacement table, and the macro expansion depth cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Directories searched when a caller supplies a bare header name.
    pub header_search_paths: Vec<PathBuf>,

    /// Text encoding for input files.
    pub encoding: Encoding,

    /// Recognized primitive type spellings (beyond the built-in C keywords).
    pub primitive_types: Vec<String>,

    /// Recognized type-qualifier keywords, e.g. `const`, `volatile`, and any
    /// platform-specific additions.
    pub type_qualifiers: Vec<String>,

    /// Recognized modifier keywords: calling conventions (`__stdcall`),
    /// platform pointer classes (`near`, `far`), and similar.
    pub modifiers: Vec<String>,

    /// Attribute-macro replacement table, e.g. `__declspec(x)` -> `""`,
    /// `DL_EXPORT(x)` -> `x`. Applied to the token stream before the
    /// declaration parser sees it.
    pub replacements: HashMap<String, String>,

    /// Cap on the number of rescans performed per macro expansion before
    /// giving up and keeping the partial result.
    pub max_expansion: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            header_search_paths: Vec::new(),
            encoding: Encoding::default(),
            primitive_types: Vec::new(),
            type_qualifiers: Vec::new(),
            modifiers: Vec::new(),
            replacements: HashMap::new(),
            max_expansion: 4096,
        }
    }
}

impl ParserConfig {
    /// Configuration tuned for Win32-style headers: `__stdcall`,
    /// `__declspec`, `near`/`far` all become recognized modifiers.
    pub fn for_windows() -> Self {
        let mut cfg = Self::default();
        cfg.modifiers.extend(
            [
                "__stdcall",
                "__cdecl",
                "__fastcall",
                "WINAPI",
                "CALLBACK",
                "near",
                "far",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        cfg.replacements
            .insert("__declspec(x)".to_string(), String::new());
        cfg
    }

    /// Add a directory to the header search path.
    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.header_search_paths.push(path.into());
        self
    }

    /// Register a primitive type spelling recognized as a type-specifier.
    pub fn with_primitive_type(mut self, name: impl Into<String>) -> Self {
        self.primitive_types.push(name.into());
        self
    }

    /// Register a token-replacement rule for attribute-wrapper macros.
    pub fn with_replacement(mut self, pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        self.replacements.insert(pattern.into(), replacement.into());
        self
    }

    /// Set the maximum macro expansion rescan depth.
    pub fn with_max_expansion(mut self, max_expansion: usize) -> Self {
        self.max_expansion = max_expansion;
        self
    }

    /// Resolve a header name against the configured search path, falling
    /// back to treating it as already-resolved if no search path matches.
    pub fn resolve_header(&self, name: &str) -> PathBuf {
        for dir in &self.header_search_paths {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return candidate;
            }
        }
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_expansion_cap() {
        let cfg = ParserConfig::default();
        assert_eq!(cfg.encoding, Encoding::Utf8);
        assert!(cfg.max_expansion > 0);
    }

    #[test]
    fn windows_config_registers_calling_conventions() {
        let cfg = ParserConfig::for_windows();
        assert!(cfg.modifiers.iter().any(|m| m == "__stdcall"));
        assert!(cfg.replacements.contains_key("__declspec(x)"));
    }

    #[test]
    fn resolve_header_falls_back_to_bare_name() {
        let cfg = ParserConfig::default();
        assert_eq!(cfg.resolve_header("foo.h"), PathBuf::from("foo.h"));
    }
}
