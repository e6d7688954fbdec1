//! Tokenizing A32 assembly.
//!
//! This module holds the tokens that characterize A32 assembly ([`Token`]).
//! This module is used by the parser to facilitate the conversion of
//! assembly source code into an AST.
//!
//! Statements are separated by either a new line or a semicolon.
//! Comments start with `@` or `//` and span until the end of the statement.

use std::num::IntErrorKind;

use logos::{Lexer, Logos};

/// A unit of information in A32 source code.
#[derive(Debug, Logos, PartialEq, Eq, Clone)]
#[logos(skip r"([ \t\f]+|@[^;\r\n]*|//[^;\r\n]*)", error = LexErr)]
pub enum Token {
    // Like the numeric literals, this regex spans over tokens that are technically invalid
    // (e.g., #12qq). These are collected as one unit and validated by the callback.

    /// An immediate value (e.g., `#9`, `#-14`, `#0x7F`, etc.)
    #[regex(r"#[+-]?\w*", lex_imm)]
    Imm(i64),

    /// A bare numeric value (e.g., `9`, `-14`, `0xFF00`), used by directives, literals and branch targets.
    #[regex(r"\d\w*", lex_num)]
    #[regex(r"-\d\w*", lex_num)]
    Num(i64),

    /// An identifier.
    ///
    /// This can refer to a label, a register, a mnemonic or a shift operator.
    /// The parser determines which one it is from context.
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lx| lx.slice().to_string())]
    Ident(String),

    /// A directive (e.g., `.word`).
    #[regex(r"\.[A-Za-z_]\w*", |lx| lx.slice()[1..].to_ascii_lowercase())]
    Directive(String),

    /// A colon, which appears after labels.
    #[token(":")]
    Colon,

    /// A comma, which delineates operands of an instruction.
    #[token(",")]
    Comma,

    /// The literal pool marker (`ldr r0, =value`).
    #[token("=")]
    Equals,

    /// Opening bracket of a memory address.
    #[token("[")]
    LBracket,

    /// Closing bracket of a memory address.
    #[token("]")]
    RBracket,

    /// Opening brace of a register list.
    #[token("{")]
    LBrace,

    /// Closing brace of a register list.
    #[token("}")]
    RBrace,

    /// Write-back marker.
    #[token("!")]
    Bang,

    /// A minus sign (register ranges and subtracted register offsets).
    #[token("-")]
    Minus,

    /// A plus sign (added register offsets).
    #[token("+")]
    Plus,

    /// A statement separator: a new line or a semicolon.
    #[regex(r";|\r?\n|\r")]
    Sep
}

/// Any errors raised in attempting to tokenize an input stream.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum LexErr {
    /// Numeric literal does not fit in a 32-bit word (signed or unsigned).
    DoesNotFitWord,
    /// Hex literal (starting with 0x) has invalid hex digits.
    InvalidHex,
    /// Binary literal (starting with 0b) has invalid binary digits.
    InvalidBin,
    /// Numeric literal could not be parsed as a decimal literal because it has invalid digits (i.e., not 0-9).
    InvalidNumeric,
    /// Numeric literal does not have any digits (it's just `#`, `#-`, or `0x`).
    InvalidNumEmpty,
    /// Int parsing failed but the reason why is unknown.
    UnknownIntErr,
    /// A symbol was used which is not allowed in A32 assembly files.
    #[default]
    InvalidSymbol
}
impl std::fmt::Display for LexErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexErr::DoesNotFitWord  => f.write_str("numeric token does not fit in a 32-bit word"),
            LexErr::InvalidHex      => f.write_str("invalid hex literal"),
            LexErr::InvalidBin      => f.write_str("invalid binary literal"),
            LexErr::InvalidNumeric  => f.write_str("invalid decimal literal"),
            LexErr::InvalidNumEmpty => f.write_str("numeric literal has no digits"),
            LexErr::UnknownIntErr   => f.write_str("could not parse integer"),
            LexErr::InvalidSymbol   => f.write_str("unrecognized symbol"),
        }
    }
}
impl std::error::Error for LexErr {}
impl crate::err::Error for LexErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            LexErr::DoesNotFitWord  => Some(format!("the range for a word is [{}, {}]", i32::MIN, u32::MAX).into()),
            LexErr::InvalidHex      => Some("a hex literal starts with '0x' and consists of 0-9, A-F".into()),
            LexErr::InvalidBin      => Some("a binary literal starts with '0b' and consists of 0 and 1".into()),
            LexErr::InvalidNumeric  => Some("a decimal literal only consists of digits 0-9".into()),
            LexErr::InvalidNumEmpty => Some("there should be digits here".into()),
            LexErr::UnknownIntErr   => None,
            LexErr::InvalidSymbol   => Some("this char does not occur in any token in A32 assembly".into()),
        }
    }
}

/// Helper that converts an int error kind to its corresponding LexErr, based on the provided inputs.
fn convert_int_error(e: &IntErrorKind, invalid_digits_err: LexErr) -> LexErr {
    match e {
        IntErrorKind::Empty        => LexErr::InvalidNumEmpty,
        IntErrorKind::InvalidDigit => invalid_digits_err,
        IntErrorKind::PosOverflow  => LexErr::DoesNotFitWord,
        IntErrorKind::NegOverflow  => LexErr::DoesNotFitWord,
        _ => LexErr::UnknownIntErr,
    }
}

/// Parses a (possibly signed) decimal, hex (`0x`), or binary (`0b`) literal.
///
/// The result must be representable as either an `i32` or a `u32`.
pub(crate) fn parse_int(src: &str) -> Result<i64, LexErr> {
    let (negative, digits) = match src.as_bytes().first() {
        Some(b'-') => (true, &src[1..]),
        Some(b'+') => (false, &src[1..]),
        _ => (false, src),
    };

    let magnitude = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
            .map_err(|e| convert_int_error(e.kind(), LexErr::InvalidHex))?
    } else if let Some(bin) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        u64::from_str_radix(bin, 2)
            .map_err(|e| convert_int_error(e.kind(), LexErr::InvalidBin))?
    } else {
        digits.parse::<u64>()
            .map_err(|e| convert_int_error(e.kind(), LexErr::InvalidNumeric))?
    };

    let value = match negative {
        true  => -i64::try_from(magnitude).map_err(|_| LexErr::DoesNotFitWord)?,
        false => i64::try_from(magnitude).map_err(|_| LexErr::DoesNotFitWord)?,
    };
    match (i64::from(i32::MIN)..=i64::from(u32::MAX)).contains(&value) {
        true  => Ok(value),
        false => Err(LexErr::DoesNotFitWord)
    }
}
fn lex_imm(lx: &Lexer<'_, Token>) -> Result<i64, LexErr> {
    parse_int(&lx.slice()[1..])
}
fn lex_num(lx: &Lexer<'_, Token>) -> Result<i64, LexErr> {
    parse_int(lx.slice())
}
