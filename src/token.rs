//! Tokenizer: splices backslash-newlines, strips comments while preserving
//! string/char literals, and lexes the result into a sequence of logical
//! source lines, each carrying its tokens and original line number.
//!
//! Directives are recognized at this layer only by position (`#` as the
//! first non-whitespace token of a logical line) — their semantics belong
//! to the preprocessor.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IntSuffix {
    pub unsigned: bool,
    pub long: bool,
    pub long_long: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntBase {
    Decimal,
    Octal,
    Hex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenKind {
    Ident,
    IntLit { base: IntBase, suffix: IntSuffix },
    FloatLit,
    CharLit,
    StrLit,
    Punct,
    /// `#` that introduces a directive (first token on its logical line).
    Hash,
    /// Synthetic marker the preprocessor splices into the token stream in
    /// place of a `#pragma pack` directive, carrying the alignment value
    /// active immediately after it. Never produced by the lexer itself.
    Pack(u32),
    Eof,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    /// Original source spelling. For string/char literals this includes the
    /// surrounding quotes; for int/float literals, including any suffix.
    pub text: String,
    pub line: u32,
    /// Whether whitespace (or the start of line) preceded this token. Used
    /// to tell a function-like macro's parameter list — `NAME(` with no gap
    /// — from an object-like macro whose replacement merely starts with a
    /// parenthesized expression, e.g. `#define PI (3.14159)`.
    pub spaced: bool,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, line: u32, spaced: bool) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
            spaced,
        }
    }

    pub fn is_ident(&self, name: &str) -> bool {
        matches!(self.kind, TokenKind::Ident) && self.text == name
    }

    pub fn is_punct(&self, s: &str) -> bool {
        matches!(self.kind, TokenKind::Punct) && self.text == s
    }
}

/// One logical (backslash-spliced) source line after comment stripping.
#[derive(Debug, Clone)]
pub struct SourceLine {
    pub line: u32,
    pub is_directive: bool,
    pub tokens: Vec<Token>,
}

/// Group physical lines into logical lines by joining any line ending in a
/// trailing `\` with the line that follows it (backslash dropped). Each
/// logical line remembers the 1-based number of its *first* physical line,
/// so later line-sensitive tracking (e.g. `#pragma pack` line tracking)
/// stays accurate across splices.
fn splice_lines(src: &str) -> Vec<(u32, String)> {
    let physical: Vec<&str> = src.split('\n').collect();
    let mut groups = Vec::new();
    let mut i = 0;
    while i < physical.len() {
        let start_line = (i + 1) as u32;
        let mut joined = String::new();
        loop {
            let line = physical[i];
            let continued = line.ends_with('\\');
            if continued {
                joined.push_str(&line[..line.len() - 1]);
            } else {
                joined.push_str(line);
            }
            i += 1;
            if !continued || i >= physical.len() {
                break;
            }
        }
        groups.push((start_line, joined));
    }
    groups
}

/// Strip `//` and `/* */` comments, preserving literal contents and line
/// numbers (comment bodies are replaced with a single space per line so
/// embedded newlines still advance the line counter).
fn strip_comments(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let bytes: Vec<char> = src.chars().collect();
    let mut i = 0;
    let mut in_string: Option<char> = None; // active quote char, if any
    while i < bytes.len() {
        let c = bytes[i];
        if let Some(quote) = in_string {
            out.push(c);
            if c == '\\' && i + 1 < bytes.len() {
                out.push(bytes[i + 1]);
                i += 2;
                continue;
            }
            if c == quote {
                in_string = None;
            }
            i += 1;
            continue;
        }
        match c {
            '"' | '\'' => {
                in_string = Some(c);
                out.push(c);
                i += 1;
            }
            '/' if bytes.get(i + 1) == Some(&'/') => {
                while i < bytes.len() && bytes[i] != '\n' {
                    i += 1;
                }
            }
            '/' if bytes.get(i + 1) == Some(&'*') => {
                i += 2;
                out.push(' ');
                while i < bytes.len() && !(bytes[i] == '*' && bytes.get(i + 1) == Some(&'/')) {
                    if bytes[i] == '\n' {
                        out.push('\n');
                    }
                    i += 1;
                }
                i += 2; // skip closing */
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Lex one physical (already spliced, comment-stripped) line into tokens.
fn lex_line(text: &str, line: u32) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let n = chars.len();
    // The start of a logical line counts as preceded by whitespace, so a
    // macro name at column 0 followed directly by `(` is still treated
    // correctly relative to a following, truly adjacent `(`.
    let mut spaced = true;

    while i < n {
        let c = chars[i];
        if c.is_whitespace() {
            spaced = true;
            i += 1;
            continue;
        }

        if c == '#' {
            tokens.push(Token::new(TokenKind::Hash, "#", line, spaced));
            spaced = false;
            i += 1;
            continue;
        }

        if is_ident_start(c) {
            let start = i;
            i += 1;
            while i < n && is_ident_continue(chars[i]) {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            tokens.push(Token::new(TokenKind::Ident, text, line, spaced));
            spaced = false;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()))
        {
            let start = i;
            let (base, mut j) = if c == '0' && matches!(chars.get(i + 1), Some('x') | Some('X')) {
                (IntBase::Hex, i + 2)
            } else if c == '0' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()) {
                (IntBase::Octal, i + 1)
            } else {
                (IntBase::Decimal, i)
            };

            let is_hex = base == IntBase::Hex;
            let digit_ok = |ch: char| if is_hex { ch.is_ascii_hexdigit() } else { ch.is_ascii_digit() };
            while j < n && digit_ok(chars[j]) {
                j += 1;
            }

            let mut is_float = false;
            if !is_hex && j < n && chars[j] == '.' {
                is_float = true;
                j += 1;
                while j < n && chars[j].is_ascii_digit() {
                    j += 1;
                }
            }
            if !is_hex && j < n && matches!(chars[j], 'e' | 'E') {
                let mut k = j + 1;
                if k < n && matches!(chars[k], '+' | '-') {
                    k += 1;
                }
                if k < n && chars[k].is_ascii_digit() {
                    is_float = true;
                    j = k;
                    while j < n && chars[j].is_ascii_digit() {
                        j += 1;
                    }
                }
            }

            if is_float {
                if j < n && matches!(chars[j], 'f' | 'F' | 'l' | 'L') {
                    j += 1;
                }
                let text: String = chars[start..j].iter().collect();
                tokens.push(Token::new(TokenKind::FloatLit, text, line, spaced));
                spaced = false;
                i = j;
                continue;
            }

            let mut suffix = IntSuffix::default();
            loop {
                match chars.get(j) {
                    Some('u') | Some('U') => {
                        suffix.unsigned = true;
                        j += 1;
                    }
                    Some('l') | Some('L') => {
                        if suffix.long {
                            suffix.long_long = true;
                        }
                        suffix.long = true;
                        j += 1;
                    }
                    _ => break,
                }
            }
            let text: String = chars[start..j].iter().collect();
            tokens.push(Token::new(TokenKind::IntLit { base, suffix }, text, line, spaced));
            spaced = false;
            i = j;
            continue;
        }

        if c == '"' {
            let start = i;
            i += 1;
            while i < n && chars[i] != '"' {
                if chars[i] == '\\' && i + 1 < n {
                    i += 2;
                } else {
                    i += 1;
                }
            }
            if i < n {
                i += 1; // closing quote
            }
            let text: String = chars[start..i].iter().collect();
            tokens.push(Token::new(TokenKind::StrLit, text, line, spaced));
            spaced = false;
            continue;
        }

        if c == '\'' {
            let start = i;
            i += 1;
            while i < n && chars[i] != '\'' {
                if chars[i] == '\\' && i + 1 < n {
                    i += 2;
                } else {
                    i += 1;
                }
            }
            if i < n {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            tokens.push(Token::new(TokenKind::CharLit, text, line, spaced));
            spaced = false;
            continue;
        }

        // Multi-character punctuators, longest match first.
        const THREE: &[&str] = &["<<=", ">>=", "...", "->*"];
        const TWO: &[&str] = &[
            "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "->", "++", "--", "+=", "-=", "*=",
            "/=", "%=", "&=", "|=", "^=", "::",
        ];
        let rest: String = chars[i..n.min(i + 3)].iter().collect();
        if let Some(m) = THREE.iter().find(|p| rest.starts_with(*p)) {
            tokens.push(Token::new(TokenKind::Punct, *m, line, spaced));
            spaced = false;
            i += m.len();
            continue;
        }
        let rest2: String = chars[i..n.min(i + 2)].iter().collect();
        if let Some(m) = TWO.iter().find(|p| rest2 == **p) {
            tokens.push(Token::new(TokenKind::Punct, *m, line, spaced));
            spaced = false;
            i += m.len();
            continue;
        }

        tokens.push(Token::new(TokenKind::Punct, c.to_string(), line, spaced));
        spaced = false;
        i += 1;
    }

    tokens
}

/// Strip comments, splice backslash-newline continuations, and lex an
/// entire header's text into logical lines, each tagged with whether it is
/// a preprocessor directive.
pub fn tokenize_source(src: &str) -> Vec<SourceLine> {
    let stripped = strip_comments(src);
    let groups = splice_lines(&stripped);

    groups
        .into_iter()
        .filter_map(|(line_no, text)| {
            let tokens = lex_line(&text, line_no);
            if tokens.is_empty() {
                None
            } else {
                let is_directive = matches!(tokens.first(), Some(t) if t.kind == TokenKind::Hash);
                Some(SourceLine {
                    line: line_no,
                    is_directive,
                    tokens,
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splices_backslash_newline() {
        let src = "#define X \\\n  1\nint y;";
        let lines = tokenize_source(src);
        // The #define directive and its continuation collapse into one
        // logical line numbered at the first physical line (1); `int y;`
        // is line 3.
        assert_eq!(lines[0].line, 1);
        assert!(lines[0].tokens.iter().any(|t| t.text == "1"));
        assert_eq!(lines.last().unwrap().line, 3);
    }

    #[test]
    fn strips_line_and_block_comments_preserving_strings() {
        let src = r#"int a; // comment
int b; /* block
   comment */ int c;
char *s = "not // a comment";
"#;
        let lines = tokenize_source(src);
        let all_text: Vec<String> = lines
            .iter()
            .flat_map(|l| l.tokens.iter().map(|t| t.text.clone()))
            .collect();
        assert!(all_text.contains(&"not // a comment".to_string()) || all_text.iter().any(|t| t.contains("not")));
        assert!(!all_text.iter().any(|t| t.contains("comment")));
    }

    #[test]
    fn recognizes_directive_lines() {
        let src = "#define FOO 1\nint x = FOO;";
        let lines = tokenize_source(src);
        assert!(lines[0].is_directive);
        assert!(!lines[1].is_directive);
    }

    #[test]
    fn lexes_integer_suffixes_and_bases() {
        let src = "int a = 0x1Fu; int b = 010; int c = 123ULL;";
        let lines = tokenize_source(src);
        let ints: Vec<&Token> = lines[0]
            .tokens
            .iter()
            .filter(|t| matches!(t.kind, TokenKind::IntLit { .. }))
            .collect();
        assert_eq!(ints[0].text, "0x1Fu");
        if let TokenKind::IntLit { base, suffix } = &ints[0].kind {
            assert_eq!(*base, IntBase::Hex);
            assert!(suffix.unsigned);
        } else {
            panic!("expected int literal");
        }
    }

    #[test]
    fn lexes_float_literals() {
        let src = "double d = 3.14e10;";
        let lines = tokenize_source(src);
        let float = lines[0]
            .tokens
            .iter()
            .find(|t| matches!(t.kind, TokenKind::FloatLit))
            .unwrap();
        assert_eq!(float.text, "3.14e10");
    }

    #[test]
    fn lexes_string_and_char_literals_with_escapes() {
        let src = r#"char *s = "a\"b"; char c = '\n';"#;
        let lines = tokenize_source(src);
        let str_tok = lines[0]
            .tokens
            .iter()
            .find(|t| matches!(t.kind, TokenKind::StrLit))
            .unwrap();
        assert_eq!(str_tok.text, r#""a\"b""#);
        let char_tok = lines[0]
            .tokens
            .iter()
            .find(|t| matches!(t.kind, TokenKind::CharLit))
            .unwrap();
        assert_eq!(char_tok.text, r"'\n'");
    }

    #[test]
    fn lexes_multi_char_punctuators() {
        let src = "a <<= b; c->d; e...f;";
        let lines = tokenize_source(src);
        let puncts: Vec<&str> = lines[0]
            .tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Punct)
            .map(|t| t.text.as_str())
            .collect();
        assert!(puncts.contains(&"<<="));
        assert!(puncts.contains(&"->"));
    }
}
