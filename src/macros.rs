//! Macro table and token-level substitution.
//!
//! Holds the set of currently-defined object-like and function-like macros
//! and performs rescanning substitution over a token stream. Replacement
//! lists are stored unexpanded; expansion happens lazily at the point of
//! use.

use crate::error::{Diagnostics, SourceLocation};
use crate::token::{Token, TokenKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Macro {
    Object {
        name: String,
        replacement: Vec<Token>,
        location: SourceLocation,
    },
    Function {
        name: String,
        params: Vec<String>,
        replacement: Vec<Token>,
        variadic: bool,
        location: SourceLocation,
    },
}

impl Macro {
    pub fn name(&self) -> &str {
        match self {
            Macro::Object { name, .. } => name,
            Macro::Function { name, .. } => name,
        }
    }

    pub fn location(&self) -> &SourceLocation {
        match self {
            Macro::Object { location, .. } => location,
            Macro::Function { location, .. } => location,
        }
    }
}

/// The live set of macro definitions. Preserves insertion order for
/// iteration (used by the definition store's `macros`/`fnmacros` kinds).
#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    order: Vec<String>,
    table: HashMap<String, Macro>,
}

/// An immutable snapshot of a [`MacroTable`], used to save/restore state
/// around a region whose macro visibility must not leak (not currently
/// exercised by the directive processor but available for callers that
/// need scoped macro visibility).
#[derive(Debug, Clone)]
pub struct MacroSnapshot {
    order: Vec<String>,
    table: HashMap<String, Macro>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a macro. Redefinition silently replaces the prior
    /// definition (order position is preserved on redefinition).
    pub fn define(&mut self, macro_def: Macro) {
        let name = macro_def.name().to_string();
        if !self.table.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.table.insert(name, macro_def);
    }

    pub fn undef(&mut self, name: &str) -> bool {
        if self.table.remove(name).is_some() {
            self.order.retain(|n| n != name);
            true
        } else {
            false
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Macro> {
        self.table.get(name)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Macro)> {
        self.order
            .iter()
            .map(|name| (name.as_str(), self.table.get(name).unwrap()))
    }

    pub fn snapshot(&self) -> MacroSnapshot {
        MacroSnapshot {
            order: self.order.clone(),
            table: self.table.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: MacroSnapshot) {
        self.order = snapshot.order;
        self.table = snapshot.table;
    }
}

/// Split a function-like macro's argument list on top-level commas,
/// respecting nested parentheses. `tokens` is the slice strictly between
/// the invocation's `(` and matching `)`.
fn split_args(tokens: &[Token]) -> Vec<Vec<Token>> {
    if tokens.is_empty() {
        return Vec::new();
    }
    let mut args = Vec::new();
    let mut current = Vec::new();
    let mut depth = 0i32;
    for tok in tokens {
        match tok.kind {
            TokenKind::Punct if tok.text == "(" => {
                depth += 1;
                current.push(tok.clone());
            }
            TokenKind::Punct if tok.text == ")" => {
                depth -= 1;
                current.push(tok.clone());
            }
            TokenKind::Punct if tok.text == "," && depth == 0 => {
                args.push(std::mem::take(&mut current));
            }
            _ => current.push(tok.clone()),
        }
    }
    args.push(current);
    args
}

/// Find the index just past a balanced `(...)` group starting at `open_idx`
/// (which must point at the `(`).
fn find_matching_paren(tokens: &[Token], open_idx: usize) -> Option<usize> {
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

/// Substitute macro invocations in `tokens` against `table`, rescanning the
/// result until no further substitution happens or `max_expansion` rescans
/// have been performed on a given token range.
pub fn substitute(
    tokens: &[Token],
    table: &MacroTable,
    max_expansion: usize,
    diagnostics: &mut Diagnostics,
    location: &SourceLocation,
) -> Vec<Token> {
    substitute_inner(tokens, table, max_expansion, diagnostics, location, &HashSet::new())
}

fn substitute_inner(
    tokens: &[Token],
    table: &MacroTable,
    max_expansion: usize,
    diagnostics: &mut Diagnostics,
    location: &SourceLocation,
    active: &HashSet<String>,
) -> Vec<Token> {
    let mut result = Vec::with_capacity(tokens.len());
    let mut i = 0;
    let mut rescans = 0usize;

    while i < tokens.len() {
        let tok = &tokens[i];
        if tok.kind != TokenKind::Ident {
            result.push(tok.clone());
            i += 1;
            continue;
        }

        let Some(def) = table.lookup(&tok.text) else {
            result.push(tok.clone());
            i += 1;
            continue;
        };

        // A macro once substituted from itself is not re-expanded in the
        // same scan, preventing infinite recursion on self-reference.
        if active.contains(&tok.text) {
            result.push(tok.clone());
            i += 1;
            continue;
        }

        match def {
            Macro::Object { name, replacement, .. } => {
                if rescans >= max_expansion {
                    diagnostics.warn(
                        location.clone(),
                        format!("macro expansion depth exceeded while expanding `{name}`"),
                    );
                    result.push(tok.clone());
                    i += 1;
                    continue;
                }
                rescans += 1;
                log::trace!("expanding object-like macro `{name}` at {location}");
                let mut nested_active = active.clone();
                nested_active.insert(name.clone());
                let expanded =
                    substitute_inner(replacement, table, max_expansion, diagnostics, location, &nested_active);
                result.extend(expanded);
                i += 1;
            }
            Macro::Function {
                name,
                params,
                replacement,
                ..
            } => {
                // Look ahead (skipping nothing — whitespace is already
                // elided by the tokenizer) for an opening paren.
                if tokens.get(i + 1).map(|t| t.kind == TokenKind::Punct && t.text == "(") != Some(true) {
                    // Not an invocation; leave the identifier untouched.
                    result.push(tok.clone());
                    i += 1;
                    continue;
                }
                let open = i + 1;
                let Some(close) = find_matching_paren(tokens, open) else {
                    diagnostics.warn(
                        location.clone(),
                        format!("unterminated invocation of function-like macro `{name}`"),
                    );
                    result.push(tok.clone());
                    i += 1;
                    continue;
                };

                let arg_tokens = &tokens[open + 1..close];
                let raw_args = split_args(arg_tokens);
                let arity_ok = if params.is_empty() {
                    raw_args.is_empty() || (raw_args.len() == 1 && raw_args[0].is_empty())
                } else {
                    raw_args.len() == params.len()
                };

                if !arity_ok {
                    diagnostics.warn(
                        location.clone(),
                        format!(
                            "macro `{name}` invoked with {} argument(s), expected {}",
                            raw_args.len(),
                            params.len()
                        ),
                    );
                    // Leave the invocation untouched rather than guess.
                    result.push(tok.clone());
                    i += 1;
                    continue;
                }

                if rescans >= max_expansion {
                    diagnostics.warn(
                        location.clone(),
                        format!("macro expansion depth exceeded while expanding `{name}`"),
                    );
                    result.push(tok.clone());
                    i += 1;
                    continue;
                }
                rescans += 1;
                log::trace!("expanding function-like macro `{name}` at {location}");

                // Each argument is first macro-expanded ...
                let expanded_args: Vec<Vec<Token>> = raw_args
                    .iter()
                    .map(|a| substitute_inner(a, table, max_expansion, diagnostics, location, active))
                    .collect();

                // ... then substituted for its parameter marker.
                let mut param_map: HashMap<&str, &Vec<Token>> = HashMap::new();
                for (p, a) in params.iter().zip(expanded_args.iter()) {
                    param_map.insert(p.as_str(), a);
                }
                let mut body = Vec::new();
                for rt in replacement {
                    if rt.kind == TokenKind::Ident {
                        if let Some(arg) = param_map.get(rt.text.as_str()) {
                            body.extend((*arg).clone());
                            continue;
                        }
                    }
                    body.push(rt.clone());
                }

                let mut nested_active = active.clone();
                nested_active.insert(name.clone());
                let rescanned =
                    substitute_inner(&body, table, max_expansion, diagnostics, location, &nested_active);
                result.extend(rescanned);
                i = close + 1;
            }
        }
    }

    result
}
