//! Directive processing: `#define`/`#undef`, the conditional-inclusion
//! stack (`#if`/`#ifdef`/`#ifndef`/`#elif`/`#else`/`#endif`), and the
//! `#pragma pack` stack. Non-directive lines are macro-substituted and
//! handed back to the caller only while every enclosing conditional is
//! currently including.

use crate::error::{Diagnostics, SourceLocation};
use crate::eval::{eval_expr, NoEnums};
use crate::macros::{substitute, Macro, MacroTable};
use crate::token::{SourceLine, Token, TokenKind};

pub const DEFAULT_PACK: u32 = 8;

/// One level of the `#if`/`#elif`/`#else`/`#endif` stack.
#[derive(Debug, Clone, Copy)]
struct ConditionalFrame {
    /// Whether this frame's currently active branch is being included.
    including: bool,
    /// Whether any branch in this frame has been taken yet (governs what
    /// an `#elif` is still allowed to test).
    any_taken: bool,
    /// Whether an `#else` has already been seen at this level.
    seen_else: bool,
}

#[derive(Debug, Default)]
struct ConditionalStack(Vec<ConditionalFrame>);

impl ConditionalStack {
    /// True while every enclosing frame (and the active one) is including.
    fn is_including(&self) -> bool {
        self.0.iter().all(|f| f.including)
    }

    fn push(&mut self, taken: bool) {
        // A branch nested inside an already-excluded region is never
        // included regardless of its own condition.
        let parent_including = self.is_including();
        let including = parent_including && taken;
        self.0.push(ConditionalFrame {
            including,
            any_taken: including,
            seen_else: false,
        });
        log::debug!("conditional push: depth={} including={}", self.0.len(), including);
    }

    /// Whether every frame *enclosing* the current one is including — the
    /// ceiling that an `#elif`/`#else` branch inside it can't rise above.
    fn parent_including(&self) -> bool {
        match self.0.len() {
            0 => true,
            n => self.0[..n - 1].iter().all(|f| f.including),
        }
    }

    fn elif(&mut self, taken: bool, location: &SourceLocation, diagnostics: &mut Diagnostics) {
        let parent_including = self.parent_including();
        let Some(frame) = self.0.last_mut() else {
            diagnostics.warn(location.clone(), "#elif without matching #if");
            return;
        };
        if frame.seen_else {
            diagnostics.warn(location.clone(), "#elif after #else");
            return;
        }
        if frame.any_taken {
            frame.including = false;
        } else {
            frame.including = parent_including && taken;
            frame.any_taken = frame.including;
        }
    }

    fn else_branch(&mut self, location: &SourceLocation, diagnostics: &mut Diagnostics) {
        let parent_including = self.parent_including();
        let Some(frame) = self.0.last_mut() else {
            diagnostics.warn(location.clone(), "#else without matching #if");
            return;
        };
        if frame.seen_else {
            diagnostics.warn(location.clone(), "duplicate #else");
            return;
        }
        frame.seen_else = true;
        frame.including = parent_including && !frame.any_taken;
        frame.any_taken = true;
    }

    fn pop(&mut self, location: &SourceLocation, diagnostics: &mut Diagnostics) {
        if self.0.pop().is_none() {
            diagnostics.warn(location.clone(), "#endif without matching #if");
        } else {
            log::debug!("conditional pop: depth={}", self.0.len());
        }
    }

    fn unterminated(&self) -> bool {
        !self.0.is_empty()
    }
}

/// One `#pragma pack` stack entry: an optional label and the alignment
/// value that was active before the corresponding push.
#[derive(Debug, Clone)]
struct PackEntry {
    label: Option<String>,
    value: u32,
}

#[derive(Debug)]
pub struct PackStack {
    current: u32,
    entries: Vec<PackEntry>,
}

impl Default for PackStack {
    fn default() -> Self {
        Self {
            current: DEFAULT_PACK,
            entries: Vec::new(),
        }
    }
}

impl PackStack {
    pub fn current(&self) -> u32 {
        self.current
    }

    fn reset(&mut self) {
        self.current = DEFAULT_PACK;
        log::debug!("pack stack: reset to default={DEFAULT_PACK}");
    }

    fn set(&mut self, value: u32) {
        self.current = value;
        log::debug!("pack stack: set current={value}");
    }

    fn push(&mut self, label: Option<String>, value: Option<u32>) {
        self.entries.push(PackEntry {
            label: label.clone(),
            value: self.current,
        });
        if let Some(v) = value {
            self.current = v;
        }
        log::debug!("pack stack: push label={label:?} current={}", self.current);
    }

    fn pop(&mut self, label: Option<String>) -> bool {
        let popped = match label {
            Some(want) => {
                if let Some(idx) = self.entries.iter().rposition(|e| e.label.as_deref() == Some(want.as_str())) {
                    let restored = self.entries[idx].value;
                    self.entries.truncate(idx);
                    self.current = restored;
                    true
                } else {
                    false
                }
            }
            None => {
                if let Some(entry) = self.entries.pop() {
                    self.current = entry.value;
                    true
                } else {
                    false
                }
            }
        };
        if popped {
            log::debug!("pack stack: pop current={}", self.current);
        }
        popped
    }
}

/// Tracks directive state across a header's logical lines: the macro
/// table, the conditional-inclusion stack, and the `#pragma pack` stack.
pub struct Preprocessor {
    pub macros: MacroTable,
    conditionals: ConditionalStack,
    pub pack: PackStack,
    max_expansion: usize,
}

impl Preprocessor {
    pub fn new(max_expansion: usize) -> Self {
        Self {
            macros: MacroTable::new(),
            conditionals: ConditionalStack::default(),
            pack: PackStack::default(),
            max_expansion,
        }
    }

    pub fn is_including(&self) -> bool {
        self.conditionals.is_including()
    }

    /// Any conditional directives left open at end of input.
    pub fn has_unterminated_conditionals(&self) -> bool {
        self.conditionals.unterminated()
    }

    /// Process one logical source line. Directive lines are consumed and
    /// update internal state; non-directive lines are macro-substituted
    /// (while including) and returned for the declaration parser. Lines in
    /// an excluded conditional branch yield `None`.
    pub fn process_line(
        &mut self,
        line: &SourceLine,
        file: Option<&std::path::Path>,
        diagnostics: &mut Diagnostics,
    ) -> Option<Vec<Token>> {
        let location = SourceLocation::new(file.map(|p| p.to_path_buf()), line.line);

        if line.is_directive {
            let is_pragma_pack = self.is_including()
                && matches!(line.tokens.get(1), Some(t) if t.kind == TokenKind::Ident && t.text == "pragma")
                && matches!(line.tokens.get(2), Some(t) if t.kind == TokenKind::Ident && t.text == "pack");
            self.process_directive(line, &location, diagnostics);
            if is_pragma_pack {
                // Splice a marker carrying the now-current alignment into the
                // declaration token stream, so the declaration parser can
                // stamp it onto whatever aggregate follows.
                return Some(vec![Token::new(TokenKind::Pack(self.pack.current()), "#pragma pack", line.line, true)]);
            }
            return None;
        }

        if !self.is_including() {
            return None;
        }

        Some(substitute(
            &line.tokens,
            &self.macros,
            self.max_expansion,
            diagnostics,
            &location,
        ))
    }

    fn process_directive(&mut self, line: &SourceLine, location: &SourceLocation, diagnostics: &mut Diagnostics) {
        // tokens[0] is `#`; tokens[1], if present, names the directive.
        let Some(name_tok) = line.tokens.get(1) else {
            return;
        };
        if name_tok.kind != TokenKind::Ident {
            if self.is_including() {
                diagnostics.warn(location.clone(), "malformed preprocessor directive");
            }
            return;
        }
        let rest = &line.tokens[2.min(line.tokens.len())..];

        match name_tok.text.as_str() {
            "define" => {
                if self.is_including() {
                    self.handle_define(rest, location, diagnostics);
                }
            }
            "undef" => {
                if self.is_including() {
                    if let Some(ident) = rest.first() {
                        self.macros.undef(&ident.text);
                    }
                }
            }
            "ifdef" => {
                let taken = rest.first().is_some_and(|t| self.macros.is_defined(&t.text));
                self.conditionals.push(taken);
            }
            "ifndef" => {
                let taken = !rest.first().is_some_and(|t| self.macros.is_defined(&t.text));
                self.conditionals.push(taken);
            }
            "if" => {
                let taken = self.is_including() && self.eval_condition(rest, location, diagnostics);
                self.conditionals.push(taken);
            }
            "elif" => {
                let parent_including = self.conditionals.parent_including();
                let taken = parent_including && self.eval_condition(rest, location, diagnostics);
                self.conditionals.elif(taken, location, diagnostics);
            }
            "else" => {
                self.conditionals.else_branch(location, diagnostics);
            }
            "endif" => {
                self.conditionals.pop(location, diagnostics);
            }
            "pragma" => {
                if self.is_including() {
                    self.handle_pragma(rest, location, diagnostics);
                }
            }
            "include" => {
                // Header inclusion is resolved by the caller, which drives
                // the tokenizer per file; nothing to do at this layer.
            }
            "error" => {
                if self.is_including() {
                    let msg: String = rest.iter().map(|t| t.text.clone()).collect::<Vec<_>>().join(" ");
                    diagnostics.error(location.clone(), format!("#error {msg}"));
                }
            }
            "warning" => {
                if self.is_including() {
                    let msg: String = rest.iter().map(|t| t.text.clone()).collect::<Vec<_>>().join(" ");
                    diagnostics.warn(location.clone(), format!("#warning {msg}"));
                }
            }
            "line" => {
                // Source-line renumbering is not tracked; accepted silently.
            }
            other => {
                if self.is_including() {
                    diagnostics.warn(location.clone(), format!("unknown preprocessor directive `#{other}`"));
                }
            }
        }
    }

    fn eval_condition(&self, tokens: &[Token], location: &SourceLocation, diagnostics: &mut Diagnostics) -> bool {
        let value = eval_expr(tokens, &self.macros, &NoEnums, true, self.max_expansion, diagnostics, location);
        value.as_i64().unwrap_or(0) != 0
    }

    fn handle_define(&mut self, tokens: &[Token], location: &SourceLocation, diagnostics: &mut Diagnostics) {
        let Some(name_tok) = tokens.first() else {
            diagnostics.warn(location.clone(), "#define missing macro name");
            return;
        };
        if name_tok.kind != TokenKind::Ident {
            diagnostics.warn(location.clone(), "#define macro name must be an identifier");
            return;
        }
        let name = name_tok.text.clone();

        // Function-like iff `(` immediately follows the name with no
        // intervening whitespace.
        if let Some(paren) = tokens.get(1) {
            if paren.kind == TokenKind::Punct && paren.text == "(" && !paren.spaced {
                let Some(close) = find_close_paren(tokens, 1) else {
                    diagnostics.warn(location.clone(), format!("unterminated parameter list for macro `{name}`"));
                    return;
                };
                let (params, variadic) = parse_params(&tokens[2..close]);
                let replacement = tokens[close + 1..].to_vec();
                self.macros.define(Macro::Function {
                    name,
                    params,
                    replacement,
                    variadic,
                    location: location.clone(),
                });
                return;
            }
        }

        let replacement = tokens.get(1..).unwrap_or(&[]).to_vec();
        self.macros.define(Macro::Object {
            name,
            replacement,
            location: location.clone(),
        });
    }

    fn handle_pragma(&mut self, tokens: &[Token], location: &SourceLocation, diagnostics: &mut Diagnostics) {
        let Some(first) = tokens.first() else { return };
        if !(first.kind == TokenKind::Ident && first.text == "pack") {
            // Unrecognized pragmas are silently ignored, per the C standard's
            // leave-implementation-defined-pragmas-alone convention.
            return;
        }
        let Some(open) = tokens.get(1) else {
            self.pack.reset();
            return;
        };
        if !(open.kind == TokenKind::Punct && open.text == "(") {
            return;
        }
        let Some(close) = find_close_paren(tokens, 1) else {
            diagnostics.warn(location.clone(), "malformed #pragma pack");
            return;
        };
        let args = &tokens[2..close];
        if args.is_empty() {
            self.pack.reset();
            return;
        }

        let parts: Vec<&[Token]> = split_top_level_commas(args);
        let first_word = parts[0].first().map(|t| t.text.as_str());

        match first_word {
            Some("push") => {
                let mut label = None;
                let mut value = None;
                for part in &parts[1..] {
                    if let Some(tok) = part.first() {
                        if matches!(tok.kind, TokenKind::IntLit { .. }) {
                            value = tok.text.parse::<u32>().ok();
                        } else if tok.kind == TokenKind::Ident {
                            label = Some(tok.text.clone());
                        }
                    }
                }
                self.pack.push(label, value);
            }
            Some("pop") => {
                let mut label = None;
                let mut value = None;
                for part in &parts[1..] {
                    if let Some(tok) = part.first() {
                        if matches!(tok.kind, TokenKind::IntLit { .. }) {
                            value = tok.text.parse::<u32>().ok();
                        } else if tok.kind == TokenKind::Ident {
                            label = Some(tok.text.clone());
                        }
                    }
                }
                if !self.pack.pop(label) {
                    diagnostics.warn(location.clone(), "#pragma pack(pop) with no matching push");
                }
                if let Some(v) = value {
                    self.pack.set(v);
                }
            }
            _ => {
                // `pack(N)`: the first part is the alignment value itself.
                if let Some(tok) = parts[0].first() {
                    if let Ok(v) = tok.text.parse::<u32>() {
                        self.pack.set(v);
                    }
                }
            }
        }
    }
}

fn find_close_paren(tokens: &[Token], open_idx: usize) -> Option<usize> {
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

fn parse_params(tokens: &[Token]) -> (Vec<String>, bool) {
    let mut params = Vec::new();
    let mut variadic = false;
    for part in split_top_level_commas(tokens) {
        if let Some(tok) = part.first() {
            if tok.kind == TokenKind::Punct && tok.text == "..." {
                variadic = true;
            } else if tok.kind == TokenKind::Ident {
                params.push(tok.text.clone());
            }
        }
    }
    (params, variadic)
}

fn split_top_level_commas(tokens: &[Token]) -> Vec<&[Token]> {
    if tokens.is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, tok) in tokens.iter().enumerate() {
        match tok.kind {
            TokenKind::Punct if tok.text == "(" => depth += 1,
            TokenKind::Punct if tok.text == ")" => depth -= 1,
            TokenKind::Punct if tok.text == "," && depth == 0 => {
                parts.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&tokens[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tokenize_source;

    fn run(src: &str) -> (Vec<Vec<Token>>, Diagnostics) {
        let mut pp = Preprocessor::new(64);
        let mut diags = Diagnostics::new();
        let mut out = Vec::new();
        for line in tokenize_source(src) {
            if let Some(toks) = pp.process_line(&line, None, &mut diags) {
                out.push(toks);
            }
        }
        (out, diags)
    }

    fn flat_text(lines: &[Vec<Token>]) -> String {
        lines
            .iter()
            .flat_map(|l| l.iter().map(|t| t.text.clone()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn object_macro_defines_and_expands() {
        let (out, _) = run("#define N 42\nint x = N;");
        assert_eq!(flat_text(&out), "int x = 42 ;");
    }

    #[test]
    fn function_like_define_detects_adjacency() {
        let (out, _) = run("#define SQ(x) ((x)*(x))\nint y = SQ(3);");
        assert_eq!(flat_text(&out), "int y = ( ( 3 ) * ( 3 ) ) ;");
    }

    #[test]
    fn object_macro_replacement_may_start_with_paren() {
        let (out, _) = run("#define PI (3)\nint z = PI;");
        assert_eq!(flat_text(&out), "int z = ( 3 ) ;");
    }

    #[test]
    fn conditional_inclusion_basic_if_else() {
        let (out, _) = run("#define FEATURE 1\n#if FEATURE\nint a;\n#else\nint b;\n#endif\n");
        assert_eq!(flat_text(&out), "int a ;");
    }

    #[test]
    fn conditional_inclusion_elif_chain() {
        let src = "#define V 2\n#if V == 1\nint a;\n#elif V == 2\nint b;\n#else\nint c;\n#endif\n";
        let (out, _) = run(src);
        assert_eq!(flat_text(&out), "int b ;");
    }

    #[test]
    fn nested_conditional_respects_outer_exclusion() {
        let src = "#if 0\n#if 1\nint inner;\n#endif\n#endif\nint outer;\n";
        let (out, _) = run(src);
        assert_eq!(flat_text(&out), "int outer ;");
    }

    #[test]
    fn ifdef_and_ifndef() {
        let src = "#define HAVE_X\n#ifdef HAVE_X\nint a;\n#endif\n#ifndef HAVE_Y\nint b;\n#endif\n";
        let (out, _) = run(src);
        assert_eq!(flat_text(&out), "int a ; int b ;");
    }

    #[test]
    fn unknown_directive_warns_but_continues() {
        let (out, diags) = run("#foo bar\nint a;\n");
        assert_eq!(flat_text(&out), "int a ;");
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn endif_without_if_warns() {
        let (_, diags) = run("#endif\n");
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn pragma_pack_push_pop_and_label() {
        let mut pp = Preprocessor::new(64);
        let mut diags = Diagnostics::new();
        for line in tokenize_source("#pragma pack(push, mylabel, 1)\n#pragma pack(4)\n#pragma pack(pop, mylabel)\n") {
            pp.process_line(&line, None, &mut diags);
        }
        assert_eq!(pp.pack.current(), DEFAULT_PACK);
        assert!(diags.is_empty());
    }

    #[test]
    fn pragma_pack_default_and_reset() {
        let mut pp = Preprocessor::new(64);
        let mut diags = Diagnostics::new();
        for line in tokenize_source("#pragma pack(2)\n#pragma pack()\n") {
            pp.process_line(&line, None, &mut diags);
        }
        assert_eq!(pp.pack.current(), DEFAULT_PACK);
    }

    #[test]
    fn pragma_pack_unmatched_pop_warns() {
        let mut pp = Preprocessor::new(64);
        let mut diags = Diagnostics::new();
        for line in tokenize_source("#pragma pack(pop)\n") {
            pp.process_line(&line, None, &mut diags);
        }
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn pragma_pack_emits_marker_token_with_current_alignment() {
        let mut pp = Preprocessor::new(64);
        let mut diags = Diagnostics::new();
        let mut markers = Vec::new();
        for line in tokenize_source("#pragma pack(4)\nstruct S { int x; };\n") {
            if let Some(toks) = pp.process_line(&line, None, &mut diags) {
                markers.extend(toks);
            }
        }
        assert!(markers.iter().any(|t| matches!(t.kind, TokenKind::Pack(4))));
    }

    #[test]
    fn unrecognized_pragma_is_ignored() {
        let (_, diags) = run("#pragma comment(lib, \"foo\")\n");
        assert!(diags.is_empty());
    }
}
