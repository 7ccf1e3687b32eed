//! Hand-written recursive-descent declaration parser.
//!
//! Consumes the fully macro-substituted token stream for one header and
//! produces a flat list of top-level [`Definition`]s: typedefs, struct,
//! union and enum tags (including anonymous aggregates promoted to a
//! synthetic id), function prototypes/definitions (bodies are scanned and
//! discarded), and variables. Declaration-specifiers parsing intentionally
//! accepts any unrecognized identifier as a named type — this parser has
//! no symbol table of "known type names" to consult, so unknown type
//! names are carried through verbatim rather than rejected.

use crate::config::ParserConfig;
use crate::error::{Diagnostics, SourceLocation};
use crate::eval::{eval_expr, EnumEnv};
use crate::macros::MacroTable;
use crate::record::{AggregateRecord, Definition, EnumMember, EnumRecord, FunctionRecord, StructField, TypedefRecord, VariableRecord};
use crate::token::{Token, TokenKind};
use crate::types::{BaseType, Modifier, Param, Qualifier, TypeRef};
use std::collections::HashMap;
use std::path::Path;

const PRIMITIVE_KEYWORDS: &[&str] = &[
    "void", "char", "short", "int", "long", "float", "double", "signed", "unsigned", "_Bool",
];

struct MapEnv<'a>(&'a HashMap<String, i64>);
impl<'a> EnumEnv for MapEnv<'a> {
    fn lookup(&self, name: &str) -> Option<i64> {
        self.0.get(name).copied()
    }
}

enum DeclaratorCore {
    Name(Option<String>),
    Nested(Box<DeclaratorNode>),
}

struct DeclaratorNode {
    pointers: usize,
    core: DeclaratorCore,
    suffixes: Vec<Modifier>,
}

fn declarator_name(node: &DeclaratorNode) -> Option<String> {
    match &node.core {
        DeclaratorCore::Name(n) => n.clone(),
        DeclaratorCore::Nested(inner) => declarator_name(inner),
    }
}

fn flatten_declarator(node: &DeclaratorNode) -> Vec<Modifier> {
    // This node's own pointers bind nearest the base type, its own suffixes
    // ([]/()) bind nearest its core — a parenthesized sub-declarator's
    // suffixes (and pointers) therefore apply to the base *before* whatever
    // the sub-declarator itself contributes, since the sub-declarator's core
    // is closer to the identifier than anything wrapped around the parens.
    let mut result: Vec<Modifier> = std::iter::repeat(Modifier::Pointer).take(node.pointers).collect();
    result.extend(node.suffixes.iter().cloned());
    if let DeclaratorCore::Nested(inner) = &node.core {
        result.extend(flatten_declarator(inner));
    }
    result
}

pub struct DeclParser<'a> {
    tokens: &'a [Token],
    pos: usize,
    config: &'a ParserConfig,
    file: Option<&'a Path>,
    diagnostics: &'a mut Diagnostics,
    definitions: Vec<Definition>,
    enum_values: HashMap<String, i64>,
    anon_counter: usize,
    empty_macros: MacroTable,
    current_pack: u32,
}

/// Parse an entire (already macro-substituted) header's tokens into a flat
/// list of top-level definitions. `config.replacements` is applied to the
/// stream first. `initial_pack` is the `#pragma pack` alignment in effect
/// before the first token of this stream (the preprocessor splices
/// [`TokenKind::Pack`] markers in at every subsequent change).
pub fn parse_declarations(
    tokens: &[Token],
    config: &ParserConfig,
    file: Option<&Path>,
    diagnostics: &mut Diagnostics,
    initial_pack: u32,
) -> Vec<Definition> {
    let replaced = apply_replacements(tokens, config);
    let mut parser = DeclParser {
        tokens: &replaced,
        pos: 0,
        config,
        file,
        diagnostics,
        definitions: Vec::new(),
        enum_values: HashMap::new(),
        anon_counter: 0,
        empty_macros: MacroTable::new(),
        current_pack: initial_pack,
    };
    parser.parse_translation_unit();
    parser.definitions
}

struct ReplacementPattern {
    name: String,
    /// `Some(param)` when the key has the shape `NAME(param)`; bare keys
    /// (no parens) match a plain identifier with no following arguments.
    param: Option<String>,
    value: String,
}

fn parse_replacement_key(key: &str) -> ReplacementPattern {
    if let Some(open) = key.find('(') {
        let name = key[..open].to_string();
        let inner = key[open + 1..].trim_end_matches(')').trim().to_string();
        let param = if inner.is_empty() { None } else { Some(inner) };
        ReplacementPattern { name, param, value: String::new() }
    } else {
        ReplacementPattern {
            name: key.to_string(),
            param: None,
            value: String::new(),
        }
    }
}

fn find_close_free(tokens: &[Token], open_idx: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (i, tok) in tokens.iter().enumerate().skip(open_idx) {
        if tok.kind == TokenKind::Punct && tok.text == "(" {
            depth += 1;
        } else if tok.kind == TokenKind::Punct && tok.text == ")" {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Apply the configured attribute-wrapper replacement table to a token
/// stream. A key like `__declspec(x)` matches `NAME(...)` call-shaped
/// spans: an empty replacement value drops the whole span (the common
/// `__declspec(dllexport)` -> nothing case); a value equal to the
/// parameter name unwraps to the call's own argument tokens (`DL_EXPORT(x)`
/// -> `x`); any other value is substituted verbatim as a single identifier.
/// Keys with no parentheses match a bare identifier the same way.
pub fn apply_replacements(tokens: &[Token], config: &ParserConfig) -> Vec<Token> {
    if config.replacements.is_empty() {
        return tokens.to_vec();
    }
    let patterns: Vec<ReplacementPattern> = config
        .replacements
        .iter()
        .map(|(k, v)| {
            let mut p = parse_replacement_key(k);
            p.value = v.clone();
            p
        })
        .collect();

    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let tok = &tokens[i];
        let found = if tok.kind == TokenKind::Ident {
            patterns.iter().find(|p| p.name == tok.text)
        } else {
            None
        };
        let Some(pat) = found else {
            out.push(tok.clone());
            i += 1;
            continue;
        };

        if pat.param.is_some() {
            if matches!(tokens.get(i + 1), Some(n) if n.is_punct("(")) {
                if let Some(close) = find_close_free(tokens, i + 1) {
                    let inner_tokens = &tokens[i + 2..close];
                    if pat.value.is_empty() {
                        // drop the whole NAME(...) span
                    } else if Some(pat.value.as_str()) == pat.param.as_deref() {
                        out.extend(inner_tokens.iter().cloned());
                    } else {
                        out.push(Token::new(TokenKind::Ident, pat.value.clone(), tok.line, tok.spaced));
                    }
                    i = close + 1;
                    continue;
                }
            }
            // Not actually followed by a call; leave untouched.
            out.push(tok.clone());
            i += 1;
            continue;
        }

        if pat.value.is_empty() {
            i += 1;
            continue;
        }
        out.push(Token::new(TokenKind::Ident, pat.value.clone(), tok.line, tok.spaced));
        i += 1;
    }
    out
}

impl<'a> DeclParser<'a> {
    fn loc(&self) -> SourceLocation {
        let line = self.tokens.get(self.pos).map(|t| t.line).unwrap_or(0);
        SourceLocation::new(self.file.map(|p| p.to_path_buf()), line)
    }

    fn at_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn bump(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat_punct(&mut self, s: &str) -> bool {
        if matches!(self.peek(), Some(t) if t.kind == TokenKind::Punct && t.text == s) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_ident(&mut self, s: &str) -> bool {
        if matches!(self.peek(), Some(t) if t.kind == TokenKind::Ident && t.text == s) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, s: &str) {
        if !self.eat_punct(s) {
            self.diagnostics.warn(self.loc(), format!("expected `{s}`"));
        }
    }

    fn next_anon_id(&mut self, kind: &str) -> String {
        self.anon_counter += 1;
        format!("__anon_{kind}_{}", self.anon_counter)
    }

    /// Collect tokens up to (not including) the next top-level `,`, `;` or
    /// `}`, respecting `(`/`[`/`{` nesting. Used for bit-widths, array
    /// sizes, and initializer expressions.
    fn take_until_stop(&mut self) -> Vec<Token> {
        let mut depth = 0i32;
        let start = self.pos;
        while let Some(tok) = self.peek() {
            match (&tok.kind, tok.text.as_str()) {
                (TokenKind::Punct, "(" | "[" | "{") => depth += 1,
                (TokenKind::Punct, ")" | "]" | "}") if depth > 0 => depth -= 1,
                (TokenKind::Punct, "," | ";" | "}") if depth == 0 => break,
                _ => {}
            }
            self.pos += 1;
        }
        self.tokens[start..self.pos].to_vec()
    }

    fn find_close(&self, open_idx: usize, open: &str, close: &str) -> Option<usize> {
        let mut depth = 0i32;
        for (i, tok) in self.tokens.iter().enumerate().skip(open_idx) {
            if tok.kind == TokenKind::Punct && tok.text == open {
                depth += 1;
            } else if tok.kind == TokenKind::Punct && tok.text == close {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
        }
        None
    }

    fn with_subslice<R>(&mut self, sub: &'a [Token], f: impl FnOnce(&mut Self) -> R) -> R {
        let saved_tokens = self.tokens;
        let saved_pos = self.pos;
        self.tokens = sub;
        self.pos = 0;
        let result = f(self);
        self.tokens = saved_tokens;
        self.pos = saved_pos;
        result
    }

    fn eval_const(&mut self, tokens: &[Token]) -> crate::value::Value {
        let local = self.enum_values.clone();
        let env = MapEnv(&local);
        eval_expr(tokens, &self.empty_macros, &env, false, self.config.max_expansion, self.diagnostics, &self.loc())
    }

    // ---- top level ----

    fn parse_translation_unit(&mut self) {
        while !self.at_eof() {
            if self.consume_pack_marker() {
                continue;
            }
            self.parse_external_declaration();
        }
    }

    /// Consume a leading `#pragma pack` marker, if the next token is one,
    /// updating the alignment aggregates declared from here on will be
    /// stamped with.
    fn consume_pack_marker(&mut self) -> bool {
        if let Some(Token { kind: TokenKind::Pack(value), .. }) = self.peek() {
            self.current_pack = *value;
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_external_declaration(&mut self) {
        let is_typedef = self.eat_ident("typedef");
        let start_pos = self.pos;
        let (base, qualifiers) = self.parse_decl_specifiers();

        if base.is_none() && self.pos == start_pos {
            // Couldn't make sense of this token at all; skip it to avoid
            // looping forever on malformed input.
            self.diagnostics.warn(self.loc(), "unable to parse declaration; skipping token");
            self.bump();
            return;
        }

        if self.eat_punct(";") {
            // A bare tag declaration (`struct Foo { ... };`) — already
            // recorded by parse_decl_specifiers, nothing further to do.
            return;
        }

        // Set when a branch already consumed its own terminator (a function
        // body's closing brace takes no trailing `;`), so the final
        // `expect_punct(";")` below isn't run against it spuriously.
        let mut already_terminated = false;
        loop {
            let node = self.parse_declarator();
            let name = declarator_name(&node);
            let modifiers = flatten_declarator(&node);
            let ty = TypeRef {
                base: base.clone(),
                modifiers,
                qualifiers: qualifiers.clone(),
            };
            already_terminated = false;

            if is_typedef {
                if let Some(name) = name {
                    self.definitions.push(Definition::Typedef(
                        name,
                        TypedefRecord {
                            target: ty,
                            location: self.loc(),
                        },
                    ));
                } else {
                    self.diagnostics.warn(self.loc(), "typedef with no name");
                }
            } else if matches!(ty.modifiers.last(), Some(Modifier::Function { .. })) {
                let Some(Modifier::Function { params, variadic }) = ty.modifiers.last().cloned() else {
                    unreachable!()
                };
                let mut return_type = ty.clone();
                return_type.modifiers.pop();
                if self.peek_punct("{") {
                    self.skip_brace_block();
                    already_terminated = true;
                }
                if let Some(name) = name {
                    self.definitions.push(Definition::Function(
                        name,
                        FunctionRecord {
                            return_type,
                            params,
                            variadic,
                            location: self.loc(),
                        },
                    ));
                }
            } else {
                let initializer = if self.eat_punct("=") {
                    let toks = self.take_until_stop();
                    Some(self.eval_const(&toks))
                } else {
                    None
                };
                if let Some(name) = name {
                    self.definitions.push(Definition::Variable(
                        name,
                        VariableRecord {
                            ty,
                            initializer,
                            location: self.loc(),
                        },
                    ));
                }
            }

            if !already_terminated && self.eat_punct(",") {
                continue;
            }
            break;
        }
        if !already_terminated {
            self.expect_punct(";");
        }
    }

    fn peek_punct(&self, s: &str) -> bool {
        matches!(self.peek(), Some(t) if t.kind == TokenKind::Punct && t.text == s)
    }

    fn skip_brace_block(&mut self) {
        if !self.eat_punct("{") {
            return;
        }
        let mut depth = 1i32;
        while depth > 0 {
            match self.bump() {
                Some(t) if t.kind == TokenKind::Punct && t.text == "{" => depth += 1,
                Some(t) if t.kind == TokenKind::Punct && t.text == "}" => depth -= 1,
                Some(_) => {}
                None => break,
            }
        }
    }

    // ---- declaration-specifiers ----

    fn is_qualifier_keyword(&self, text: &str) -> Option<Qualifier> {
        match text {
            "const" => Some(Qualifier::Const),
            "volatile" => Some(Qualifier::Volatile),
            "static" => Some(Qualifier::Static),
            "extern" => Some(Qualifier::Extern),
            "inline" | "__inline" | "__inline__" => Some(Qualifier::Inline),
            "restrict" | "__restrict" => Some(Qualifier::Restrict),
            "register" | "auto" => None, // accepted, not tracked
            other
                if self.config.type_qualifiers.iter().any(|q| q == other)
                    || self.config.modifiers.iter().any(|q| q == other) =>
            {
                Some(Qualifier::Named(other.to_string()))
            }
            _ => None,
        }
    }

    /// Returns the base type, if any was found, along with any qualifier
    /// keywords collected alongside it.
    fn parse_decl_specifiers(&mut self) -> (Option<BaseType>, Vec<Qualifier>) {
        let mut base: Option<BaseType> = None;
        let mut primitive_words: Vec<String> = Vec::new();
        let mut qualifiers = Vec::new();

        loop {
            let Some(tok) = self.peek() else { break };
            if tok.kind != TokenKind::Ident {
                break;
            }
            let text = tok.text.clone();

            if let Some(q) = self.is_qualifier_keyword(&text) {
                qualifiers.push(q);
                self.pos += 1;
                continue;
            }
            if matches!(text.as_str(), "register" | "auto") {
                self.pos += 1;
                continue;
            }

            if base.is_none() && primitive_words.is_empty() {
                if text == "struct" {
                    self.pos += 1;
                    base = Some(self.parse_aggregate(Aggregate::Struct));
                    continue;
                }
                if text == "union" {
                    self.pos += 1;
                    base = Some(self.parse_aggregate(Aggregate::Union));
                    continue;
                }
                if text == "enum" {
                    self.pos += 1;
                    base = Some(self.parse_enum());
                    continue;
                }
            }

            if base.is_none() && PRIMITIVE_KEYWORDS.contains(&text.as_str()) {
                primitive_words.push(text);
                self.pos += 1;
                continue;
            }
            if base.is_none() && self.config.primitive_types.iter().any(|p| p == &text) {
                primitive_words.push(text);
                self.pos += 1;
                continue;
            }

            if base.is_none() && primitive_words.is_empty() {
                // The first identifier we don't otherwise recognize is
                // treated as a (possibly unknown) named type.
                self.pos += 1;
                base = Some(BaseType::Named(text));
                continue;
            }

            break;
        }

        if !primitive_words.is_empty() {
            base = Some(BaseType::Primitive(primitive_words.join(" ")));
        }
        (base, qualifiers)
    }

    fn parse_aggregate(&mut self, kind: Aggregate) -> BaseType {
        let tag = match self.peek() {
            Some(t) if t.kind == TokenKind::Ident => {
                let name = t.text.clone();
                self.pos += 1;
                Some(name)
            }
            _ => None,
        };

        if !self.peek_punct("{") {
            // Reference to a previously (or later) defined tag, no body here.
            return BaseType::Named(tag.unwrap_or_else(|| "struct".to_string()));
        }

        self.eat_punct("{");
        let mut fields = Vec::new();
        while !self.peek_punct("}") && !self.at_eof() {
            if self.consume_pack_marker() {
                continue;
            }
            self.parse_field(&mut fields);
        }
        self.eat_punct("}");

        let record = AggregateRecord {
            fields,
            pack: self.current_pack,
            location: self.loc(),
        };
        let name = tag.unwrap_or_else(|| self.next_anon_id(kind.label()));
        match kind {
            Aggregate::Struct => self.definitions.push(Definition::Struct(name.clone(), record)),
            Aggregate::Union => self.definitions.push(Definition::Union(name.clone(), record)),
        }
        BaseType::Named(name)
    }

    fn parse_field(&mut self, fields: &mut Vec<StructField>) {
        let (base, qualifiers) = self.parse_decl_specifiers();
        if base.is_none() {
            self.diagnostics.warn(self.loc(), "field with no recognizable type");
            self.eat_punct(";");
            return;
        }
        if self.peek_punct(";") {
            // Anonymous nested aggregate used directly as a member.
            self.eat_punct(";");
            fields.push(StructField {
                name: None,
                ty: TypeRef {
                    base,
                    modifiers: Vec::new(),
                    qualifiers,
                },
                bit_width: None,
                default: None,
            });
            return;
        }
        loop {
            let node = self.parse_declarator();
            let name = declarator_name(&node);
            let modifiers = flatten_declarator(&node);
            let ty = TypeRef {
                base: base.clone(),
                modifiers,
                qualifiers: qualifiers.clone(),
            };
            let bit_width = if self.eat_punct(":") {
                let toks = self.take_until_stop();
                self.eval_const(&toks).as_i64()
            } else {
                None
            };
            let default = if self.eat_punct("=") {
                let toks = self.take_until_stop();
                Some(self.eval_const(&toks))
            } else {
                None
            };
            fields.push(StructField {
                name,
                ty,
                bit_width,
                default,
            });
            if self.eat_punct(",") {
                continue;
            }
            break;
        }
        self.expect_punct(";");
    }

    fn parse_enum(&mut self) -> BaseType {
        let tag = match self.peek() {
            Some(t) if t.kind == TokenKind::Ident => {
                let name = t.text.clone();
                self.pos += 1;
                Some(name)
            }
            _ => None,
        };

        if !self.peek_punct("{") {
            return BaseType::Named(tag.unwrap_or_else(|| "enum".to_string()));
        }
        self.eat_punct("{");

        let mut members = Vec::new();
        let mut running = 0i64;
        while !self.peek_punct("}") && !self.at_eof() {
            let Some(name_tok) = self.peek().cloned() else { break };
            if name_tok.kind != TokenKind::Ident {
                self.diagnostics.warn(self.loc(), "expected enumerator name");
                self.bump();
                continue;
            }
            self.pos += 1;
            let value = if self.eat_punct("=") {
                let toks = self.take_until_stop();
                self.eval_const(&toks).as_i64().unwrap_or(running)
            } else {
                running
            };
            running = value + 1;
            self.enum_values.insert(name_tok.text.clone(), value);
            members.push(EnumMember {
                name: name_tok.text,
                value,
            });
            if !self.eat_punct(",") {
                break;
            }
        }
        self.eat_punct("}");

        let record = EnumRecord {
            members,
            location: self.loc(),
        };
        let name = tag.unwrap_or_else(|| self.next_anon_id("enum"));
        self.definitions.push(Definition::Enum(name.clone(), record));
        BaseType::Named(name)
    }

    // ---- declarators ----

    fn parse_declarator(&mut self) -> DeclaratorNode {
        let mut pointers = 0usize;
        while self.eat_punct("*") {
            pointers += 1;
            while let Some(tok) = self.peek() {
                if tok.kind == TokenKind::Ident && self.is_qualifier_keyword(&tok.text).is_some() {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }

        // A `(` here can only open a parenthesized sub-declarator `( declarator )`
        // — a parameter-list suffix never appears before a core has been
        // established. The one exception is `()`/`(void)` directly in core
        // position, an abstract function-type suffix applied to an anonymous
        // core (e.g. a bare `int ()` parameter type); that's the only shape
        // where what follows `(` is neither an identifier nor `*`/`(`.
        let core = if self.peek_punct("(")
            && matches!(self.peek_at(1), Some(t) if t.is_punct("*") || t.is_punct("(") || t.kind == TokenKind::Ident)
        {
            self.eat_punct("(");
            let inner = self.parse_declarator();
            self.expect_punct(")");
            DeclaratorCore::Nested(Box::new(inner))
        } else if let Some(t) = self.peek() {
            if t.kind == TokenKind::Ident {
                let name = t.text.clone();
                self.pos += 1;
                DeclaratorCore::Name(Some(name))
            } else {
                DeclaratorCore::Name(None)
            }
        } else {
            DeclaratorCore::Name(None)
        };

        let mut suffixes = Vec::new();
        loop {
            if self.eat_punct("[") {
                if self.peek_punct("]") {
                    suffixes.push(Modifier::Array(None));
                } else {
                    let start = self.pos;
                    while !self.peek_punct("]") && !self.at_eof() {
                        self.pos += 1;
                    }
                    let size_tokens = self.tokens[start..self.pos].to_vec();
                    let size = self.eval_const(&size_tokens).as_i64();
                    suffixes.push(Modifier::Array(size));
                }
                self.expect_punct("]");
                continue;
            }
            if self.eat_punct("(") {
                let open = self.pos - 1;
                let Some(close) = self.find_close(open, "(", ")") else {
                    self.diagnostics.warn(self.loc(), "unterminated parameter list");
                    break;
                };
                let param_tokens = &self.tokens[self.pos..close];
                let (params, variadic) = self.parse_param_list(param_tokens);
                self.pos = close;
                self.expect_punct(")");
                suffixes.push(Modifier::Function { params, variadic });
                continue;
            }
            break;
        }

        DeclaratorNode {
            pointers,
            core,
            suffixes,
        }
    }

    fn parse_param_list(&mut self, tokens: &'a [Token]) -> (Vec<Param>, bool) {
        if tokens.is_empty() {
            return (Vec::new(), false);
        }
        if tokens.len() == 1 && tokens[0].kind == TokenKind::Ident && tokens[0].text == "void" {
            return (Vec::new(), false);
        }
        self.with_subslice(tokens, |p| {
            let mut params = Vec::new();
            let mut variadic = false;
            loop {
                if p.at_eof() {
                    break;
                }
                if p.eat_punct("...") {
                    variadic = true;
                    break;
                }
                let (base, qualifiers) = p.parse_decl_specifiers();
                let node = p.parse_declarator();
                let name = declarator_name(&node);
                let modifiers = flatten_declarator(&node);
                params.push(Param {
                    name,
                    ty: TypeRef { base, modifiers, qualifiers },
                });
                if !p.eat_punct(",") {
                    break;
                }
            }
            (params, variadic)
        })
    }
}

#[derive(Clone, Copy)]
enum Aggregate {
    Struct,
    Union,
}

impl Aggregate {
    fn label(self) -> &'static str {
        match self {
            Aggregate::Struct => "struct",
            Aggregate::Union => "union",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tokenize_source;

    fn parse(src: &str) -> (Vec<Definition>, Diagnostics) {
        let config = ParserConfig::default();
        let tokens: Vec<Token> = tokenize_source(src).into_iter().flat_map(|l| l.tokens).collect();
        let mut diags = Diagnostics::new();
        let defs = parse_declarations(&tokens, &config, None, &mut diags, crate::preprocessor::DEFAULT_PACK);
        (defs, diags)
    }

    #[test]
    fn parses_simple_typedef() {
        let (defs, _) = parse("typedef unsigned long ulong_t;");
        assert_eq!(defs.len(), 1);
        match &defs[0] {
            Definition::Typedef(name, rec) => {
                assert_eq!(name, "ulong_t");
                assert_eq!(rec.target.base, Some(BaseType::Primitive("unsigned long".into())));
            }
            _ => panic!("expected typedef"),
        }
    }

    #[test]
    fn parses_pointer_to_array_vs_array_of_pointers() {
        let (defs, _) = parse("int (*p)[4]; int *q[4];");
        assert_eq!(defs.len(), 2);
        let Definition::Variable(_, p) = &defs[0] else { panic!() };
        assert_eq!(p.ty.modifiers, vec![Modifier::Array(Some(4)), Modifier::Pointer]);
        let Definition::Variable(_, q) = &defs[1] else { panic!() };
        assert_eq!(q.ty.modifiers, vec![Modifier::Pointer, Modifier::Array(Some(4))]);
    }

    #[test]
    fn parses_function_prototype_and_definition() {
        let (defs, _) = parse("int add(int a, int b); int sub(int a, int b) { return a - b; }");
        assert_eq!(defs.len(), 2);
        for def in &defs {
            let Definition::Function(_, rec) = def else { panic!("expected function") };
            assert_eq!(rec.params.len(), 2);
            assert!(!rec.variadic);
        }
    }

    #[test]
    fn parses_variadic_function() {
        let (defs, _) = parse("int printf(const char *fmt, ...);");
        let Definition::Function(_, rec) = &defs[0] else { panic!() };
        assert!(rec.variadic);
        assert_eq!(rec.params.len(), 1);
    }

    #[test]
    fn parses_struct_with_bitfields_and_defaults() {
        let (defs, _) = parse("struct Flags { unsigned a : 1; unsigned b : 2; };");
        let Definition::Struct(name, rec) = &defs[0] else { panic!() };
        assert_eq!(name, "Flags");
        assert_eq!(rec.fields[0].bit_width, Some(1));
        assert_eq!(rec.fields[1].bit_width, Some(2));
    }

    #[test]
    fn parses_anonymous_nested_struct_member() {
        let (defs, _) = parse("struct Outer { struct { int x; int y; }; int z; };");
        assert!(defs.iter().any(|d| matches!(d, Definition::Struct(n, _) if n.starts_with("__anon_struct_"))));
        let Some(Definition::Struct(_, outer)) = defs.iter().find(|d| matches!(d, Definition::Struct(n, _) if n == "Outer")) else {
            panic!("missing Outer");
        };
        assert_eq!(outer.fields.len(), 2);
        assert!(outer.fields[0].name.is_none());
    }

    #[test]
    fn parses_enum_with_explicit_and_implicit_values() {
        let (defs, _) = parse("enum Color { RED, GREEN = 5, BLUE };");
        let Definition::Enum(_, rec) = &defs[0] else { panic!() };
        assert_eq!(rec.members[0].value, 0);
        assert_eq!(rec.members[1].value, 5);
        assert_eq!(rec.members[2].value, 6);
    }

    #[test]
    fn parses_typedef_of_anonymous_struct() {
        let (defs, _) = parse("typedef struct { int x; int y; } Point;");
        assert!(defs.iter().any(|d| matches!(d, Definition::Struct(n, _) if n.starts_with("__anon_struct_"))));
        assert!(defs.iter().any(|d| matches!(d, Definition::Typedef(n, _) if n == "Point")));
    }

    #[test]
    fn parses_function_pointer_typedef() {
        let (defs, _) = parse("typedef void (*Callback)(int code, void *ctx);");
        let Definition::Typedef(name, rec) = &defs[0] else { panic!() };
        assert_eq!(name, "Callback");
        assert!(matches!(&rec.target.modifiers[0], Modifier::Function { params, .. } if params.len() == 2));
        assert_eq!(rec.target.modifiers[1], Modifier::Pointer);
    }

    #[test]
    fn unknown_type_name_is_accepted_verbatim() {
        let (defs, diags) = parse("FooHandle make_handle();");
        assert!(diags.is_empty());
        let Definition::Function(_, rec) = &defs[0] else { panic!() };
        assert_eq!(rec.return_type.base, Some(BaseType::Named("FooHandle".into())));
    }

    #[test]
    fn parses_array_with_constant_expression_size() {
        // Macro names are already expanded upstream by the preprocessor
        // before these tokens ever reach the declaration parser; here we
        // just check a literal arithmetic size expression resolves.
        let (defs, _) = parse("int table[4 * 2];");
        let Definition::Variable(_, rec) = &defs[0] else { panic!() };
        assert_eq!(rec.ty.modifiers[0], Modifier::Array(Some(8)));
    }

    #[test]
    fn replacement_table_drops_declspec_and_unwraps_dl_export() {
        let mut config = ParserConfig::default();
        config.replacements.insert("__declspec(x)".to_string(), String::new());
        config.replacements.insert("DL_EXPORT(x)".to_string(), "x".to_string());
        let tokens: Vec<Token> = tokenize_source("__declspec(dllexport) DL_EXPORT(int) foo(void);")
            .into_iter()
            .flat_map(|l| l.tokens)
            .collect();
        let mut diags = Diagnostics::new();
        let defs = parse_declarations(&tokens, &config, None, &mut diags, crate::preprocessor::DEFAULT_PACK);
        let Definition::Function(name, rec) = &defs[0] else { panic!() };
        assert_eq!(name, "foo");
        assert_eq!(rec.return_type.base, Some(BaseType::Primitive("int".into())));
    }

    #[test]
    fn parses_variable_with_initializer() {
        let (defs, _) = parse("int count = 1 + 2;");
        let Definition::Variable(_, rec) = &defs[0] else { panic!() };
        assert_eq!(rec.initializer, Some(crate::value::Value::Int64(3)));
    }

    #[test]
    fn pack_marker_updates_alignment_stamped_on_following_struct() {
        let config = ParserConfig::default();
        let tokens: Vec<Token> = tokenize_source("struct S { int x; };")
            .into_iter()
            .flat_map(|l| l.tokens)
            .collect();
        let mut with_marker = vec![Token::new(TokenKind::Pack(4), "#pragma pack", 0, true)];
        with_marker.extend(tokens);
        let mut diags = Diagnostics::new();
        let defs = parse_declarations(&with_marker, &config, None, &mut diags, crate::preprocessor::DEFAULT_PACK);
        let Definition::Struct(_, rec) = &defs[0] else { panic!() };
        assert_eq!(rec.pack, 4);
    }

    #[test]
    fn skips_function_body_contents() {
        let (defs, _) = parse("int f(void) { int local = 1; return local; } int after;");
        assert_eq!(defs.len(), 2);
        assert!(matches!(&defs[0], Definition::Function(n, _) if n == "f"));
        assert!(matches!(&defs[1], Definition::Variable(n, _) if n == "after"));
    }
}
