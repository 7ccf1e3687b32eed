//! Parses C header files into a structured, queryable model of macros,
//! typedefs, enums, structs, unions, functions and variables.
//!
//! The pipeline per file is: [`token::tokenize_source`] ->
//! [`preprocessor::Preprocessor`] (directives, conditional inclusion,
//! `#pragma pack`) -> [`declparser::parse_declarations`] over the
//! macro-substituted token stream -> folded into a [`store::DefinitionStore`].
//! [`cache`] lets repeated parses of an unchanged header set skip all of
//! that and load the store straight from disk.

pub mod cache;
pub mod config;
pub mod declparser;
pub mod error;
pub mod eval;
pub mod macros;
pub mod preprocessor;
pub mod record;
pub mod store;
pub mod token;
pub mod types;
pub mod value;

use cache::InputFile;
use config::{Encoding, ParserConfig};
use error::{Diagnostic, Diagnostics, ParseError, ParseResult};
use preprocessor::Preprocessor;
use store::DefinitionStore;
use std::path::Path;

/// Drives the tokenize/preprocess/declare pipeline across one or more
/// files, accumulating everything into a single [`DefinitionStore`].
///
/// One [`Preprocessor`] is shared across every file passed to [`Self::parse_str`]
/// so macros and `#pragma pack` state defined in an earlier header remain
/// visible to a later one, matching how a real translation unit chains
/// `#include`s.
pub struct HeaderParser {
    config: ParserConfig,
    preprocessor: Preprocessor,
    store: DefinitionStore,
    diagnostics: Diagnostics,
}

impl HeaderParser {
    pub fn new(config: ParserConfig) -> Self {
        let preprocessor = Preprocessor::new(config.max_expansion);
        Self {
            config,
            preprocessor,
            store: DefinitionStore::default(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Parse one file's already-decoded text. Directive lines update the
    /// shared preprocessor state; non-directive lines (while an including
    /// conditional branch) are macro-substituted, collected across the
    /// whole file, and handed to the declaration parser as a single token
    /// stream, since a declaration can span many logical lines.
    pub fn parse_str(&mut self, text: &str, file: Option<&Path>) -> ParseResult<()> {
        let initial_pack = self.preprocessor.pack.current();
        let mut unit_tokens = Vec::new();
        for line in token::tokenize_source(text) {
            if let Some(tokens) = self.preprocessor.process_line(&line, file, &mut self.diagnostics) {
                unit_tokens.extend(tokens);
            }
        }
        if self.preprocessor.has_unterminated_conditionals() {
            self.diagnostics.warn(
                error::SourceLocation::new(file.map(|p| p.to_path_buf()), 0),
                "unterminated conditional directive at end of file",
            );
        }

        let defs = declparser::parse_declarations(&unit_tokens, &self.config, file, &mut self.diagnostics, initial_pack);
        self.store.absorb_definitions(defs);
        self.store.absorb_macros(&self.preprocessor.macros);
        Ok(())
    }

    /// Read and parse a file from disk, decoding it per [`ParserConfig::encoding`].
    pub fn parse_file(&mut self, path: &Path) -> ParseResult<()> {
        let bytes = std::fs::read(path).map_err(|err| ParseError::IoError(path.to_path_buf(), err))?;
        let text = decode(&bytes, self.config.encoding)
            .ok_or_else(|| ParseError::EncodingError(path.to_path_buf(), self.config.encoding))?;
        self.parse_str(&text, Some(path))
    }

    /// Consume the parser, returning the accumulated store and diagnostics.
    pub fn finish(self) -> (DefinitionStore, Vec<Diagnostic>) {
        (self.store, self.diagnostics.into_vec())
    }
}

fn decode(bytes: &[u8], encoding: Encoding) -> Option<String> {
    match encoding {
        Encoding::Utf8 => String::from_utf8(bytes.to_vec()).ok(),
        Encoding::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
    }
}

/// Parse a set of headers, reusing a cached store from `cache_path` when its
/// fingerprint still matches every input file's contents and `config`.
/// Otherwise parses from scratch and overwrites `cache_path` with the fresh
/// result.
pub fn load_or_parse(
    config: &ParserConfig,
    headers: &[impl AsRef<Path>],
    cache_path: &Path,
) -> ParseResult<(DefinitionStore, Vec<Diagnostic>)> {
    let mut contents = Vec::with_capacity(headers.len());
    for header in headers {
        let path = header.as_ref();
        let bytes = std::fs::read(path).map_err(|err| ParseError::IoError(path.to_path_buf(), err))?;
        let text = decode(&bytes, config.encoding)
            .ok_or_else(|| ParseError::EncodingError(path.to_path_buf(), config.encoding))?;
        contents.push((path.to_path_buf(), text));
    }
    let inputs: Vec<InputFile<'_>> = contents
        .iter()
        .map(|(path, text)| InputFile { path, contents: text })
        .collect();

    if let Some(store) = cache::load(cache_path, &inputs, config)? {
        return Ok((store, Vec::new()));
    }

    let mut parser = HeaderParser::new(config.clone());
    for (path, text) in &contents {
        parser.parse_str(text, Some(path))?;
    }
    let (store, diagnostics) = parser.finish();
    cache::save(cache_path, &inputs, config, &store)?;
    Ok((store, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_typedef_and_struct_across_macro_substitution() {
        let mut parser = HeaderParser::new(ParserConfig::default());
        parser
            .parse_str(
                "#define EXPORT\ntypedef struct point { int x; int y; } EXPORT point_t;",
                None,
            )
            .unwrap();
        let (store, diags) = parser.finish();
        assert!(diags.is_empty());
        assert!(store.types.get("point_t").is_some());
        assert!(store.structs.get("point").is_some());
    }

    #[test]
    fn conditional_exclusion_hides_declarations() {
        let mut parser = HeaderParser::new(ParserConfig::default());
        parser
            .parse_str("#if 0\nint excluded;\n#endif\nint included;", None)
            .unwrap();
        let (store, _) = parser.finish();
        assert!(store.variables.get("included").is_some());
        assert!(store.variables.get("excluded").is_none());
    }

    #[test]
    fn macros_persist_across_multiple_parse_str_calls() {
        let mut parser = HeaderParser::new(ParserConfig::default());
        parser.parse_str("#define VERSION 2", None).unwrap();
        parser.parse_str("int v = VERSION;", None).unwrap();
        let (store, _) = parser.finish();
        assert_eq!(store.eval("v"), Some(&value::Value::Int64(2)));
    }
}
