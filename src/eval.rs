//! Constant expression evaluator.
//!
//! Evaluates preprocessor conditions (`#if`/`#elif`, with `defined`) and
//! declaration-context constant expressions (enum values, initializers)
//! against the current macro table and, optionally, an enum-member
//! environment. Integer arithmetic is 64-bit two's complement; unresolvable
//! expressions become [`Value::Symbolic`] rather than raising, except in
//! `#if`/`#elif` context where an undefined identifier evaluates to 0, per
//! the usual C preprocessor convention.

use crate::error::{Diagnostics, SourceLocation};
use crate::macros::{substitute, MacroTable};
use crate::token::{IntBase, Token, TokenKind};
use crate::value::Value;

/// Looks up the integer value of an enum member, when evaluating inside a
/// declaration context that has one (e.g. a later enumerator referring to
/// an earlier one — not required by the grammar but harmless to support).
pub trait EnumEnv {
    fn lookup(&self, name: &str) -> Option<i64>;
}

pub struct NoEnums;
impl EnumEnv for NoEnums {
    fn lookup(&self, _name: &str) -> Option<i64> {
        None
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    macros: &'a MacroTable,
    enums: &'a dyn EnumEnv,
    in_preprocessor: bool,
    diagnostics: &'a mut Diagnostics,
    location: SourceLocation,
    max_expansion: usize,
}

/// Evaluate a constant expression token slice to a [`Value`].
pub fn eval_expr(
    tokens: &[Token],
    macros: &MacroTable,
    enums: &dyn EnumEnv,
    in_preprocessor: bool,
    max_expansion: usize,
    diagnostics: &mut Diagnostics,
    location: &SourceLocation,
) -> Value {
    if tokens.is_empty() {
        diagnostics.warn(location.clone(), "empty constant expression");
        return Value::Int64(0);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        macros,
        enums,
        in_preprocessor,
        diagnostics,
        location: location.clone(),
        max_expansion,
    };
    let value = parser.parse_ternary();
    if parser.pos != parser.tokens.len() {
        // Trailing tokens we couldn't consume: preserve the original text.
        return Value::Symbolic(tokens.to_vec());
    }
    value
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
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

    fn as_i64(&mut self, v: &Value) -> i64 {
        match v {
            Value::Int64(x) => *x,
            Value::UInt64(x) => *x as i64,
            Value::Float(x) => *x as i64,
            _ => {
                self.diagnostics
                    .warn(self.location.clone(), "expected integer in constant expression");
                0
            }
        }
    }

    fn is_float(v: &Value) -> bool {
        matches!(v, Value::Float(_))
    }

    fn is_unsigned(v: &Value) -> bool {
        matches!(v, Value::UInt64(_))
    }

    fn parse_ternary(&mut self) -> Value {
        let cond = self.parse_logical_or();
        if self.eat_punct("?") {
            let then_v = self.parse_ternary();
            self.eat_punct(":");
            let else_v = self.parse_ternary();
            return if self.as_i64(&cond) != 0 { then_v } else { else_v };
        }
        cond
    }

    fn parse_logical_or(&mut self) -> Value {
        let mut lhs = self.parse_logical_and();
        while self.eat_punct("||") {
            let rhs = self.parse_logical_and();
            let v = (self.as_i64(&lhs) != 0) || (self.as_i64(&rhs) != 0);
            lhs = Value::Int64(v as i64);
        }
        lhs
    }

    fn parse_logical_and(&mut self) -> Value {
        let mut lhs = self.parse_bitor();
        while self.eat_punct("&&") {
            let rhs = self.parse_bitor();
            let v = (self.as_i64(&lhs) != 0) && (self.as_i64(&rhs) != 0);
            lhs = Value::Int64(v as i64);
        }
        lhs
    }

    fn parse_bitor(&mut self) -> Value {
        let mut lhs = self.parse_bitxor();
        loop {
            if matches!(self.peek(), Some(t) if t.kind==TokenKind::Punct && t.text=="|") {
                self.pos += 1;
                let rhs = self.parse_bitxor();
                lhs = self.int_binop(lhs, rhs, |a, b| a | b);
            } else {
                break;
            }
        }
        lhs
    }

    fn parse_bitxor(&mut self) -> Value {
        let mut lhs = self.parse_bitand();
        while self.eat_punct("^") {
            let rhs = self.parse_bitand();
            lhs = self.int_binop(lhs, rhs, |a, b| a ^ b);
        }
        lhs
    }

    fn parse_bitand(&mut self) -> Value {
        let mut lhs = self.parse_equality();
        loop {
            if matches!(self.peek(), Some(t) if t.kind==TokenKind::Punct && t.text=="&") {
                self.pos += 1;
                let rhs = self.parse_equality();
                lhs = self.int_binop(lhs, rhs, |a, b| a & b);
            } else {
                break;
            }
        }
        lhs
    }

    fn parse_equality(&mut self) -> Value {
        let mut lhs = self.parse_relational();
        loop {
            let op = match self.peek() {
                Some(t) if t.kind == TokenKind::Punct && t.text == "==" => "==",
                Some(t) if t.kind == TokenKind::Punct && t.text == "!=" => "!=",
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_relational();
            let (a, b) = (self.as_i64(&lhs), self.as_i64(&rhs));
            let v = if op == "==" { a == b } else { a != b };
            lhs = Value::Int64(v as i64);
        }
        lhs
    }

    fn parse_relational(&mut self) -> Value {
        let mut lhs = self.parse_shift();
        loop {
            let op = match self.peek() {
                Some(t) if t.kind == TokenKind::Punct && t.text == "<" => "<",
                Some(t) if t.kind == TokenKind::Punct && t.text == "<=" => "<=",
                Some(t) if t.kind == TokenKind::Punct && t.text == ">" => ">",
                Some(t) if t.kind == TokenKind::Punct && t.text == ">=" => ">=",
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_shift();
            let (a, b) = (self.as_i64(&lhs), self.as_i64(&rhs));
            let v = match op {
                "<" => a < b,
                "<=" => a <= b,
                ">" => a > b,
                _ => a >= b,
            };
            lhs = Value::Int64(v as i64);
        }
        lhs
    }

    fn parse_shift(&mut self) -> Value {
        let mut lhs = self.parse_additive();
        loop {
            let op = match self.peek() {
                Some(t) if t.kind == TokenKind::Punct && t.text == "<<" => "<<",
                Some(t) if t.kind == TokenKind::Punct && t.text == ">>" => ">>",
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_additive();
            let shift = self.as_i64(&rhs) as u32 & 63;
            lhs = self.int_binop(lhs, rhs, move |a, _| if op == "<<" { a.wrapping_shl(shift) } else { a.wrapping_shr(shift) });
        }
        lhs
    }

    fn parse_additive(&mut self) -> Value {
        let mut lhs = self.parse_multiplicative();
        loop {
            let op = match self.peek() {
                Some(t) if t.kind == TokenKind::Punct && t.text == "+" => '+',
                Some(t) if t.kind == TokenKind::Punct && t.text == "-" => '-',
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative();
            lhs = self.arith_binop(lhs, rhs, op);
        }
        lhs
    }

    fn parse_multiplicative(&mut self) -> Value {
        let mut lhs = self.parse_unary();
        loop {
            let op = match self.peek() {
                Some(t) if t.kind == TokenKind::Punct && t.text == "*" => '*',
                Some(t) if t.kind == TokenKind::Punct && t.text == "/" => '/',
                Some(t) if t.kind == TokenKind::Punct && t.text == "%" => '%',
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_unary();
            lhs = self.arith_binop(lhs, rhs, op);
        }
        lhs
    }

    fn int_binop(&mut self, lhs: Value, rhs: Value, f: impl Fn(i64, i64) -> i64) -> Value {
        let unsigned = Self::is_unsigned(&lhs) || Self::is_unsigned(&rhs);
        let a = self.as_i64(&lhs);
        let b = self.as_i64(&rhs);
        let r = f(a, b);
        if unsigned {
            Value::UInt64(r as u64)
        } else {
            Value::Int64(r)
        }
    }

    fn arith_binop(&mut self, lhs: Value, rhs: Value, op: char) -> Value {
        if Self::is_float(&lhs) || Self::is_float(&rhs) {
            let a = match lhs {
                Value::Float(f) => f,
                other => self.as_i64(&other) as f64,
            };
            let b = match rhs {
                Value::Float(f) => f,
                other => self.as_i64(&other) as f64,
            };
            return Value::Float(match op {
                '+' => a + b,
                '-' => a - b,
                '*' => a * b,
                '/' => {
                    if b == 0.0 {
                        self.diagnostics.warn(self.location.clone(), "division by zero");
                        0.0
                    } else {
                        a / b
                    }
                }
                _ => unreachable!(),
            });
        }
        let unsigned = Self::is_unsigned(&lhs) || Self::is_unsigned(&rhs);
        let a = self.as_i64(&lhs);
        let b = self.as_i64(&rhs);
        let r = match op {
            '+' => a.wrapping_add(b),
            '-' => a.wrapping_sub(b),
            '*' => a.wrapping_mul(b),
            '/' => {
                if b == 0 {
                    self.diagnostics.warn(self.location.clone(), "division by zero");
                    0
                } else {
                    a.wrapping_div(b)
                }
            }
            '%' => {
                if b == 0 {
                    self.diagnostics.warn(self.location.clone(), "division by zero");
                    0
                } else {
                    a.wrapping_rem(b)
                }
            }
            _ => unreachable!(),
        };
        if unsigned {
            Value::UInt64(r as u64)
        } else {
            Value::Int64(r)
        }
    }

    fn parse_unary(&mut self) -> Value {
        if let Some(t) = self.peek() {
            if t.kind == TokenKind::Punct && matches!(t.text.as_str(), "+" | "-" | "!" | "~") {
                let op = t.text.clone();
                self.pos += 1;
                let v = self.parse_unary();
                return match op.as_str() {
                    "+" => v,
                    "-" => match v {
                        Value::Float(f) => Value::Float(-f),
                        other => Value::Int64(-self.as_i64(&other)),
                    },
                    "!" => Value::Int64((self.as_i64(&v) == 0) as i64),
                    "~" => Value::Int64(!self.as_i64(&v)),
                    _ => unreachable!(),
                };
            }
            // C-style cast: `( type-name ) unary-expr`. The cast target is
            // parsed but mostly ignored except for int/float coercion.
            if t.kind == TokenKind::Punct && t.text == "(" && self.looks_like_cast() {
                let save = self.pos;
                self.pos += 1; // '('
                let mut is_float_cast = false;
                let mut depth = 1i32;
                while depth > 0 {
                    match self.bump() {
                        Some(tok) if tok.kind == TokenKind::Punct && tok.text == "(" => depth += 1,
                        Some(tok) if tok.kind == TokenKind::Punct && tok.text == ")" => depth -= 1,
                        Some(tok) if tok.kind == TokenKind::Ident && matches!(tok.text.as_str(), "float" | "double") => {
                            is_float_cast = true;
                        }
                        Some(_) => {}
                        None => break,
                    }
                }
                if depth == 0 {
                    let v = self.parse_unary();
                    return if is_float_cast {
                        Value::Float(match v {
                            Value::Float(f) => f,
                            other => self.as_i64(&other) as f64,
                        })
                    } else {
                        match v {
                            Value::Float(f) => Value::Int64(f as i64),
                            other => other,
                        }
                    };
                }
                self.pos = save;
            }
        }
        self.parse_primary()
    }

    /// Heuristic: treat `(` as the start of a cast if the next token is a
    /// known type keyword rather than a value-producing sub-expression.
    fn looks_like_cast(&self) -> bool {
        const TYPE_KEYWORDS: &[&str] = &[
            "int", "unsigned", "signed", "char", "short", "long", "float", "double", "void",
            "const", "volatile", "struct", "union", "enum", "size_t", "ssize_t",
        ];
        matches!(self.tokens.get(self.pos + 1), Some(t) if t.kind == TokenKind::Ident && TYPE_KEYWORDS.contains(&t.text.as_str()))
    }

    fn parse_primary(&mut self) -> Value {
        let Some(tok) = self.bump().cloned() else {
            self.diagnostics
                .warn(self.location.clone(), "unexpected end of expression");
            return Value::Int64(0);
        };

        match tok.kind {
            TokenKind::IntLit { base, suffix } => {
                let digits = strip_int_suffix(&tok.text);
                let radix = match base {
                    IntBase::Decimal => 10,
                    IntBase::Octal => 8,
                    IntBase::Hex => 16,
                };
                let digits = match base {
                    IntBase::Hex => digits.trim_start_matches("0x").trim_start_matches("0X"),
                    _ => digits,
                };
                let parsed = u64::from_str_radix(digits, radix).unwrap_or(0);
                if suffix.unsigned {
                    Value::UInt64(parsed)
                } else {
                    Value::Int64(parsed as i64)
                }
            }
            TokenKind::FloatLit => {
                let cleaned = tok.text.trim_end_matches(['f', 'F', 'l', 'L']);
                Value::Float(cleaned.parse().unwrap_or(0.0))
            }
            TokenKind::StrLit => {
                let mut combined = unescape_string(&tok.text);
                while matches!(self.peek(), Some(t) if t.kind == TokenKind::StrLit) {
                    let next = self.bump().unwrap();
                    combined.push_str(&unescape_string(&next.text));
                }
                Value::Str(combined)
            }
            TokenKind::CharLit => Value::Int64(char_literal_value(&tok.text)),
            TokenKind::Punct if tok.text == "(" => {
                let v = self.parse_ternary();
                self.eat_punct(")");
                v
            }
            TokenKind::Ident if tok.text == "defined" && self.in_preprocessor => {
                let name = if self.eat_punct("(") {
                    let n = self.bump().map(|t| t.text.clone()).unwrap_or_default();
                    self.eat_punct(")");
                    n
                } else {
                    self.bump().map(|t| t.text.clone()).unwrap_or_default()
                };
                Value::Int64(self.macros.is_defined(&name) as i64)
            }
            TokenKind::Ident => self.eval_identifier(&tok),
            _ => {
                self.diagnostics
                    .warn(self.location.clone(), format!("unexpected token `{}`", tok.text));
                Value::Symbolic(vec![tok])
            }
        }
    }

    fn eval_identifier(&mut self, tok: &Token) -> Value {
        if let Some(v) = self.enums.lookup(&tok.text) {
            return Value::Int64(v);
        }
        if let Some(def) = self.macros.lookup(&tok.text) {
            if let crate::macros::Macro::Object { replacement, .. } = def {
                let expanded = substitute(
                    replacement,
                    self.macros,
                    self.max_expansion,
                    self.diagnostics,
                    &self.location,
                );
                return eval_expr(
                    &expanded,
                    self.macros,
                    self.enums,
                    self.in_preprocessor,
                    self.max_expansion,
                    self.diagnostics,
                    &self.location,
                );
            }
        }
        if self.in_preprocessor {
            // Standard cpp behavior: an undefined identifier in a `#if`
            // expression evaluates to 0.
            Value::Int64(0)
        } else {
            Value::Symbolic(vec![tok.clone()])
        }
    }
}

fn strip_int_suffix(text: &str) -> &str {
    text.trim_end_matches(['u', 'U', 'l', 'L'])
}

fn char_literal_value(text: &str) -> i64 {
    let inner = text.trim_matches('\'');
    let unescaped = unescape_string(&format!("\"{inner}\""));
    unescaped.chars().next().map(|c| c as i64).unwrap_or(0)
}

fn unescape_string(text: &str) -> String {
    let inner = text.trim_matches('"');
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('0') => out.push('\0'),
                Some('\\') => out.push('\\'),
                Some('\'') => out.push('\''),
                Some('"') => out.push('"'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macros::{Macro, MacroTable};
    use crate::token::tokenize_source;

    fn toks(src: &str) -> Vec<Token> {
        tokenize_source(src).into_iter().flat_map(|l| l.tokens).collect()
    }

    fn eval(src: &str, table: &MacroTable, in_preprocessor: bool) -> Value {
        let mut diags = Diagnostics::new();
        eval_expr(&toks(src), table, &NoEnums, in_preprocessor, 64, &mut diags, &SourceLocation::new(None, 1))
    }

    #[test]
    fn evaluates_arithmetic_with_precedence() {
        let table = MacroTable::new();
        assert_eq!(eval("1+2*3", &table, false), Value::Int64(7));
        assert_eq!(eval("(1+2)*3", &table, false), Value::Int64(9));
    }

    #[test]
    fn evaluates_bitwise_and_shift() {
        let table = MacroTable::new();
        assert_eq!(eval("1 << 4", &table, false), Value::Int64(16));
        assert_eq!(eval("(128|1)", &table, false), Value::Int64(129));
    }

    #[test]
    fn evaluates_ternary_and_logical() {
        let table = MacroTable::new();
        assert_eq!(eval("1 && 0 ? 1 : 2", &table, false), Value::Int64(2));
    }

    #[test]
    fn division_by_zero_warns_and_yields_zero() {
        let table = MacroTable::new();
        let mut diags = Diagnostics::new();
        let v = eval_expr(&toks("1/0"), &table, &NoEnums, false, 64, &mut diags, &SourceLocation::new(None, 1));
        assert_eq!(v, Value::Int64(0));
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn defined_only_valid_in_preprocessor_mode() {
        let mut table = MacroTable::new();
        table.define(Macro::Object {
            name: "M".into(),
            replacement: toks("1"),
            location: SourceLocation::new(None, 1),
        });
        assert_eq!(eval("defined M", &table, true), Value::Int64(1));
        assert_eq!(eval("defined(N)", &table, true), Value::Int64(0));
    }

    #[test]
    fn undefined_identifier_in_preprocessor_mode_is_zero() {
        let table = MacroTable::new();
        assert_eq!(eval("UNKNOWN", &table, true), Value::Int64(0));
    }

    #[test]
    fn undefined_identifier_in_declaration_context_is_symbolic() {
        let table = MacroTable::new();
        let v = eval("SOME_RUNTIME_CONST", &table, false);
        assert!(v.is_symbolic());
    }

    #[test]
    fn macro_reduces_to_literal() {
        let mut table = MacroTable::new();
        table.define(Macro::Object {
            name: "V".into(),
            replacement: toks("128"),
            location: SourceLocation::new(None, 1),
        });
        assert_eq!(eval("V", &table, false), Value::Int64(128));
    }

    #[test]
    fn string_literal_concatenation() {
        let table = MacroTable::new();
        assert_eq!(eval(r#""foo" "bar""#, &table, false), Value::Str("foobar".to_string()));
    }
}
