//! Parsing A32 assembly source into an AST.
//!
//! The entry point is [`parse_ast`], which converts source text into a list of [`Stmt`]s.
//!
//! ```
//! use armsim_harness::parse::parse_ast;
//!
//! let stmts = parse_ast("start: mov r0, #5; add r0, r0, #1").unwrap();
//! assert_eq!(stmts.len(), 2);
//! assert_eq!(stmts[0].labels, ["start"]);
//! assert_eq!(stmts[1].line, 2);
//! ```
pub mod lex;

use std::borrow::Cow;
use std::ops::Range;

use logos::Logos;

use crate::ast::{AddrMode, AsmInstr, Cond, DpOp, Literal, MemOffset, Operand2, Reg, ShiftKind, Stmt, StmtKind, Target};
use crate::err::ErrSpan;
use self::lex::{LexErr, Token};

/// Kinds of errors that can occur while parsing a statement.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParseErrKind {
    /// A token could not be lexed.
    Lex(LexErr),
    /// The instruction mnemonic is not recognized.
    UnknownMnemonic,
    /// The directive is not recognized.
    UnknownDirective,
    /// A statement has to start with a label, an instruction, or a directive.
    ExpectedStatement,
    /// The instruction was given the wrong number of operands.
    WrongOperandCount,
    /// Expected a register here.
    ExpectedReg,
    /// Expected an immediate value here.
    ExpectedImm,
    /// Expected a label or address here.
    ExpectedTarget,
    /// Expected a `[rn, ...]` memory address here.
    ExpectedAddress,
    /// Expected a `{...}` register list here.
    ExpectedRegList,
    /// Expected a register or an immediate value here.
    ExpectedFlexOperand,
    /// Shift amount is out of range for the shift operator.
    InvalidShift,
    /// The operand could not be understood.
    InvalidOperand,
}
impl std::fmt::Display for ParseErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lex(e)              => e.fmt(f),
            Self::UnknownMnemonic     => f.write_str("unknown instruction"),
            Self::UnknownDirective    => f.write_str("unknown directive"),
            Self::ExpectedStatement   => f.write_str("expected label, instruction, or directive"),
            Self::WrongOperandCount   => f.write_str("wrong number of operands"),
            Self::ExpectedReg         => f.write_str("expected register"),
            Self::ExpectedImm         => f.write_str("expected immediate value"),
            Self::ExpectedTarget      => f.write_str("expected label or address"),
            Self::ExpectedAddress     => f.write_str("expected memory address"),
            Self::ExpectedRegList     => f.write_str("expected register list"),
            Self::ExpectedFlexOperand => f.write_str("expected register or immediate value"),
            Self::InvalidShift        => f.write_str("invalid shift"),
            Self::InvalidOperand      => f.write_str("invalid operand"),
        }
    }
}

impl ParseErrKind {
    /// A help message for this kind of error.
    pub fn help(&self) -> Option<Cow<'static, str>> {
        match *self {
            ParseErrKind::Lex(e)              => crate::err::Error::help(&e).map(|h| Cow::Owned(h.into_owned())),
            ParseErrKind::UnknownMnemonic     => Some("supported instructions are data processing, mul/mla, b/bl/bx, ldr/str(b), push/pop, svc and nop".into()),
            ParseErrKind::UnknownDirective    => Some("the only supported directive is .word".into()),
            ParseErrKind::ExpectedStatement   => None,
            ParseErrKind::WrongOperandCount   => None,
            ParseErrKind::ExpectedReg         => Some("registers are r0-r15, sp, lr, and pc".into()),
            ParseErrKind::ExpectedImm         => Some("immediate values start with '#'".into()),
            ParseErrKind::ExpectedTarget      => None,
            ParseErrKind::ExpectedAddress     => Some("addresses look like [rn], [rn, #imm], or [rn, rm]".into()),
            ParseErrKind::ExpectedRegList     => Some("register lists look like {r4-r6, lr}".into()),
            ParseErrKind::ExpectedFlexOperand => None,
            ParseErrKind::InvalidShift        => Some("lsl takes #0-#31, lsr/asr take #1-#32, ror takes #1-#31".into()),
            ParseErrKind::InvalidOperand      => None,
        }
    }
}

/// Error from parsing assembly source.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ParseErr {
    /// The kind of error.
    pub kind: ParseErrKind,
    /// The 1-based index of the statement this error occurred in.
    pub line: usize,
    /// The span in the source associated with this error.
    pub span: ErrSpan
}
impl std::fmt::Display for ParseErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)
    }
}
impl std::error::Error for ParseErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ParseErrKind::Lex(e) => Some(e),
            _ => None
        }
    }
}
impl crate::err::Error for ParseErr {
    fn span(&self) -> Option<ErrSpan> {
        Some(self.span.clone())
    }

    fn help(&self) -> Option<std::borrow::Cow<str>> {
        self.kind.help()
    }
}

/// Parses assembly source into a list of statements.
///
/// Statements which have neither labels nor an instruction are dropped;
/// the `line` field of every kept statement still reflects its position in the source.
pub fn parse_ast(src: &str) -> Result<Vec<Stmt>, ParseErr> {
    let mut stmts = vec![];
    let mut current: Vec<(Token, Range<usize>)> = vec![];
    let mut line = 1;

    for (m_tok, span) in Token::lexer(src).spanned() {
        let token = m_tok.map_err(|e| ParseErr { kind: ParseErrKind::Lex(e), line, span: span.clone() })?;

        match token {
            Token::Sep => {
                let tokens = std::mem::take(&mut current);
                if let Some(stmt) = parse_stmt(&tokens, line)? {
                    stmts.push(stmt);
                }
                line += 1;
            },
            t => current.push((t, span)),
        }
    }
    if let Some(stmt) = parse_stmt(&current, line)? {
        stmts.push(stmt);
    }

    Ok(stmts)
}

/// Error context for the statement being parsed.
struct StmtCtx {
    line: usize,
    stmt_span: Range<usize>,
}
impl StmtCtx {
    fn err(&self, kind: ParseErrKind, span: Range<usize>) -> ParseErr {
        ParseErr { kind, line: self.line, span }
    }
    fn err_stmt(&self, kind: ParseErrKind) -> ParseErr {
        self.err(kind, self.stmt_span.clone())
    }
}

fn parse_stmt(tokens: &[(Token, Range<usize>)], line: usize) -> Result<Option<Stmt>, ParseErr> {
    let (Some((_, first)), Some((_, last))) = (tokens.first(), tokens.last()) else { return Ok(None) };

    let span = first.start..last.end;
    let ctx = StmtCtx { line, stmt_span: span.clone() };

    let mut labels = vec![];
    let mut rest = tokens;
    while let [(Token::Ident(label), _), (Token::Colon, _), tail @ ..] = rest {
        labels.push(label.clone());
        rest = tail;
    }

    let kind = match rest {
        [] => None,
        [(Token::Directive(d), dspan), operands @ ..] => match &**d {
            "word" => {
                let groups = split_operands(operands);
                match &*groups {
                    [[(Token::Num(n) | Token::Imm(n), _)]] => Some(StmtKind::Word(*n as u32)),
                    [[(_, s), ..]] => return Err(ctx.err(ParseErrKind::ExpectedImm, s.clone())),
                    _ => return Err(ctx.err(ParseErrKind::WrongOperandCount, dspan.clone())),
                }
            },
            _ => return Err(ctx.err(ParseErrKind::UnknownDirective, dspan.clone())),
        },
        [(Token::Ident(mnemonic), mspan), operands @ ..] => {
            let (base, cond, set_flags) = split_mnemonic(mnemonic)
                .ok_or_else(|| ctx.err(ParseErrKind::UnknownMnemonic, mspan.clone()))?;

            let operands = split_operands(operands)
                .into_iter()
                .map(|group| parse_operand(&ctx, group))
                .collect::<Result<Vec<_>, _>>()?;

            Some(StmtKind::Instr(build_instr(&ctx, base, cond, set_flags, operands)?))
        },
        [(_, s), ..] => return Err(ctx.err(ParseErrKind::ExpectedStatement, s.clone())),
    };

    Ok(Some(Stmt { labels, kind, line, span }))
}

/// Instruction families, before operands are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Base {
    Dp(DpOp),
    Mul,
    Mla,
    B,
    Bl,
    Bx,
    Ldr,
    Str,
    Ldrb,
    Strb,
    Push,
    Pop,
    Svc,
    Nop,
}
impl Base {
    fn allows_s(self) -> bool {
        match self {
            Base::Dp(op) => !op.is_test(),
            Base::Mul | Base::Mla => true,
            _ => false
        }
    }
}

const MNEMONICS: &[(&str, Base)] = &[
    ("and", Base::Dp(DpOp::And)), ("eor", Base::Dp(DpOp::Eor)),
    ("sub", Base::Dp(DpOp::Sub)), ("rsb", Base::Dp(DpOp::Rsb)),
    ("add", Base::Dp(DpOp::Add)), ("adc", Base::Dp(DpOp::Adc)),
    ("sbc", Base::Dp(DpOp::Sbc)), ("rsc", Base::Dp(DpOp::Rsc)),
    ("tst", Base::Dp(DpOp::Tst)), ("teq", Base::Dp(DpOp::Teq)),
    ("cmp", Base::Dp(DpOp::Cmp)), ("cmn", Base::Dp(DpOp::Cmn)),
    ("orr", Base::Dp(DpOp::Orr)), ("mov", Base::Dp(DpOp::Mov)),
    ("bic", Base::Dp(DpOp::Bic)), ("mvn", Base::Dp(DpOp::Mvn)),
    ("mul", Base::Mul), ("mla", Base::Mla),
    ("b", Base::B), ("bl", Base::Bl), ("bx", Base::Bx),
    ("ldr", Base::Ldr), ("str", Base::Str), ("ldrb", Base::Ldrb), ("strb", Base::Strb),
    ("push", Base::Push), ("pop", Base::Pop),
    ("svc", Base::Svc), ("swi", Base::Svc),
    ("nop", Base::Nop),
];

/// Splits a mnemonic like `addseq` or `bls` into its base, condition, and S flag.
fn split_mnemonic(mnemonic: &str) -> Option<(Base, Cond, bool)> {
    let lower = mnemonic.to_ascii_lowercase();

    fn split_suffix(rest: &str, allows_s: bool) -> Option<(Cond, bool)> {
        if let Some(cond) = Cond::from_suffix(rest) {
            return Some((cond, false));
        }
        if !allows_s { return None };

        // UAL (adds, addseq) and pre-UAL (addeqs) orders are both accepted
        rest.strip_prefix('s')
            .and_then(Cond::from_suffix)
            .or_else(|| rest.strip_suffix('s').and_then(Cond::from_suffix))
            .map(|cond| (cond, true))
    }

    MNEMONICS.iter()
        .filter_map(|&(name, base)| {
            let rest = lower.strip_prefix(name)?;
            let (cond, s) = split_suffix(rest, base.allows_s())?;
            Some((base, cond, s))
        })
        .next()
}

/// Splits operand tokens at every top-level comma.
fn split_operands(tokens: &[(Token, Range<usize>)]) -> Vec<&[(Token, Range<usize>)]> {
    if tokens.is_empty() { return vec![] };

    let mut groups = vec![];
    let mut depth = 0usize;
    let mut start = 0;
    for (i, (tok, _)) in tokens.iter().enumerate() {
        match tok {
            Token::LBracket | Token::LBrace => depth += 1,
            Token::RBracket | Token::RBrace => depth = depth.saturating_sub(1),
            Token::Comma if depth == 0 => {
                groups.push(&tokens[start..i]);
                start = i + 1;
            },
            _ => {}
        }
    }
    groups.push(&tokens[start..]);
    groups
}

/// A parsed operand, before it is checked against its instruction.
#[derive(Debug, Clone)]
enum Operand {
    Reg(Reg),
    Imm(i64),
    Num(i64),
    Label(String),
    Shift(ShiftKind, u8),
    Literal(Literal),
    Mem { rn: Reg, offset: Option<MemOffset>, writeback: bool },
    RegList(u16),
}

fn parse_operand(ctx: &StmtCtx, group: &[(Token, Range<usize>)]) -> Result<(Operand, Range<usize>), ParseErr> {
    let span = match group {
        [] => return Err(ctx.err_stmt(ParseErrKind::InvalidOperand)),
        [(_, first), .., (_, last)] => first.start..last.end,
        [(_, only)] => only.clone(),
    };
    let err = |kind| ctx.err(kind, span.clone());

    let operand = match group {
        [(Token::Ident(id), _)] => match Reg::from_name(id) {
            Some(r) => Operand::Reg(r),
            None    => Operand::Label(id.clone()),
        },
        [(Token::Imm(n), _)] => Operand::Imm(*n),
        [(Token::Num(n), _)] => Operand::Num(*n),
        [(Token::Ident(sh), _), (Token::Imm(n), _)] => {
            let kind = ShiftKind::from_name(sh).ok_or_else(|| err(ParseErrKind::InvalidOperand))?;
            let valid = match kind {
                ShiftKind::Lsl => (0..=31).contains(n),
                ShiftKind::Lsr | ShiftKind::Asr => (1..=32).contains(n),
                ShiftKind::Ror => (1..=31).contains(n),
            };
            if !valid { return Err(err(ParseErrKind::InvalidShift)) };
            Operand::Shift(kind, *n as u8)
        },
        [(Token::Equals, _), (Token::Num(n) | Token::Imm(n), _)] => Operand::Literal(Literal::Imm(*n as u32)),
        [(Token::Equals, _), (Token::Ident(l), _)] => Operand::Literal(Literal::Label(l.clone())),
        [(Token::LBracket, _), inner @ .., (Token::RBracket, _)] => parse_address(inner, false).ok_or_else(|| err(ParseErrKind::ExpectedAddress))?,
        [(Token::LBracket, _), inner @ .., (Token::RBracket, _), (Token::Bang, _)] => parse_address(inner, true).ok_or_else(|| err(ParseErrKind::ExpectedAddress))?,
        [(Token::LBrace, _), inner @ .., (Token::RBrace, _)] => Operand::RegList(parse_reg_list(inner).ok_or_else(|| err(ParseErrKind::ExpectedRegList))?),
        _ => return Err(err(ParseErrKind::InvalidOperand)),
    };

    Ok((operand, span))
}

fn parse_address(inner: &[(Token, Range<usize>)], writeback: bool) -> Option<Operand> {
    let reg = |t: &Token| match t {
        Token::Ident(id) => Reg::from_name(id),
        _ => None
    };

    let (rn, offset) = match inner {
        [(base, _)] => (reg(base)?, None),
        [(base, _), (Token::Comma, _), (Token::Imm(n), _)] => {
            (reg(base)?, Some(MemOffset::Imm(i32::try_from(*n).ok()?)))
        },
        [(base, _), (Token::Comma, _), (rm, _)] => {
            (reg(base)?, Some(MemOffset::Reg { rm: reg(rm)?, subtract: false }))
        },
        [(base, _), (Token::Comma, _), (Token::Plus, _), (rm, _)] => {
            (reg(base)?, Some(MemOffset::Reg { rm: reg(rm)?, subtract: false }))
        },
        [(base, _), (Token::Comma, _), (Token::Minus, _), (rm, _)] => {
            (reg(base)?, Some(MemOffset::Reg { rm: reg(rm)?, subtract: true }))
        },
        _ => return None
    };

    Some(Operand::Mem { rn, offset, writeback })
}

fn parse_reg_list(inner: &[(Token, Range<usize>)]) -> Option<u16> {
    let reg = |t: &Token| match t {
        Token::Ident(id) => Reg::from_name(id),
        _ => None
    };

    let mut mask = 0u16;
    for item in split_operands(inner) {
        match item {
            [(r, _)] => mask |= reg(r)?.mask(),
            [(lo, _), (Token::Minus, _), (hi, _)] => {
                let (lo, hi) = (reg(lo)?.reg_no(), reg(hi)?.reg_no());
                if lo > hi { return None };
                for n in lo..=hi {
                    mask |= 1 << n;
                }
            },
            _ => return None
        }
    }

    (mask != 0).then_some(mask)
}

fn build_instr(
    ctx: &StmtCtx,
    base: Base,
    cond: Cond,
    set_flags: bool,
    operands: Vec<(Operand, Range<usize>)>
) -> Result<AsmInstr, ParseErr> {
    let count_err = || ctx.err_stmt(ParseErrKind::WrongOperandCount);
    let expect_reg = |(op, span): &(Operand, Range<usize>)| match op {
        Operand::Reg(r) => Ok(*r),
        _ => Err(ctx.err(ParseErrKind::ExpectedReg, span.clone()))
    };
    let flex = |ops: &[(Operand, Range<usize>)]| -> Result<Operand2, ParseErr> {
        match ops {
            [(Operand::Imm(n), _)] => Ok(Operand2::Imm(*n as u32)),
            [(Operand::Reg(rm), _)] => Ok(Operand2::Reg(*rm, ShiftKind::Lsl, 0)),
            [(Operand::Reg(rm), _), (Operand::Shift(kind, amt), _)] => Ok(Operand2::Reg(*rm, *kind, *amt)),
            [(_, span), ..] => Err(ctx.err(ParseErrKind::ExpectedFlexOperand, span.clone())),
            [] => Err(count_err()),
        }
    };

    let instr = match base {
        Base::Dp(op) if op.is_move() => {
            let [first, rest @ ..] = &*operands else { return Err(count_err()) };
            AsmInstr::Dp { op, cond, set_flags, rd: expect_reg(first)?, rn: Reg(0), op2: flex(rest)? }
        },
        Base::Dp(op) if op.is_test() => {
            let [first, rest @ ..] = &*operands else { return Err(count_err()) };
            AsmInstr::Dp { op, cond, set_flags: true, rd: Reg(0), rn: expect_reg(first)?, op2: flex(rest)? }
        },
        Base::Dp(op) => {
            let (rd, rn, rest) = match &*operands {
                // two-operand shorthand: add r0, #1 == add r0, r0, #1
                [first, second @ (Operand::Imm(_), _)] => {
                    let rd = expect_reg(first)?;
                    (rd, rd, std::slice::from_ref(second))
                },
                [first, second @ (Operand::Reg(_), _)] => {
                    let rd = expect_reg(first)?;
                    (rd, rd, std::slice::from_ref(second))
                },
                [first, second, rest @ ..] => (expect_reg(first)?, expect_reg(second)?, rest),
                _ => return Err(count_err())
            };
            AsmInstr::Dp { op, cond, set_flags, rd, rn, op2: flex(rest)? }
        },
        Base::Mul => {
            let [rd, rm, rs] = &*operands else { return Err(count_err()) };
            AsmInstr::Mul { cond, set_flags, rd: expect_reg(rd)?, rm: expect_reg(rm)?, rs: expect_reg(rs)?, acc: None }
        },
        Base::Mla => {
            let [rd, rm, rs, rn] = &*operands else { return Err(count_err()) };
            AsmInstr::Mul { cond, set_flags, rd: expect_reg(rd)?, rm: expect_reg(rm)?, rs: expect_reg(rs)?, acc: Some(expect_reg(rn)?) }
        },
        Base::B | Base::Bl => {
            let [(target, span)] = &*operands else { return Err(count_err()) };
            let target = match target {
                Operand::Label(l) => Target::Label(l.clone()),
                Operand::Num(n) | Operand::Imm(n) => Target::Addr(*n as u32),
                _ => return Err(ctx.err(ParseErrKind::ExpectedTarget, span.clone()))
            };
            AsmInstr::Branch { cond, link: base == Base::Bl, target }
        },
        Base::Bx => {
            let [rm] = &*operands else { return Err(count_err()) };
            AsmInstr::Bx { cond, rm: expect_reg(rm)? }
        },
        Base::Ldr | Base::Str | Base::Ldrb | Base::Strb => {
            let load = matches!(base, Base::Ldr | Base::Ldrb);
            let byte = matches!(base, Base::Ldrb | Base::Strb);

            match &*operands {
                [rd, (Operand::Literal(value), span)] => {
                    if base != Base::Ldr {
                        return Err(ctx.err(ParseErrKind::ExpectedAddress, span.clone()));
                    }
                    AsmInstr::LdrLit { cond, rd: expect_reg(rd)?, value: value.clone() }
                },
                [rd, (Operand::Mem { rn, offset, writeback }, _)] => {
                    let offset = offset.unwrap_or(MemOffset::Imm(0));
                    let addr = match *writeback {
                        true  => AddrMode::PreIndex(*rn, offset),
                        false => AddrMode::Offset(*rn, offset),
                    };
                    AsmInstr::Mem { cond, load, byte, rd: expect_reg(rd)?, addr }
                },
                [rd, (Operand::Mem { rn, offset: None, writeback: false }, _), (post, span)] => {
                    let offset = match post {
                        Operand::Imm(n) => MemOffset::Imm(i32::try_from(*n).map_err(|_| ctx.err(ParseErrKind::ExpectedImm, span.clone()))?),
                        Operand::Reg(rm) => MemOffset::Reg { rm: *rm, subtract: false },
                        _ => return Err(ctx.err(ParseErrKind::ExpectedImm, span.clone()))
                    };
                    AsmInstr::Mem { cond, load, byte, rd: expect_reg(rd)?, addr: AddrMode::PostIndex(*rn, offset) }
                },
                [_, (_, span), ..] => return Err(ctx.err(ParseErrKind::ExpectedAddress, span.clone())),
                _ => return Err(count_err())
            }
        },
        Base::Push | Base::Pop => {
            let [(list, span)] = &*operands else { return Err(count_err()) };
            let Operand::RegList(regs) = list else {
                return Err(ctx.err(ParseErrKind::ExpectedRegList, span.clone()));
            };
            match base {
                Base::Push => AsmInstr::Push { cond, regs: *regs },
                _          => AsmInstr::Pop { cond, regs: *regs },
            }
        },
        Base::Svc => {
            let [(imm, span)] = &*operands else { return Err(count_err()) };
            match imm {
                Operand::Imm(n) | Operand::Num(n) if (0..=0xFF_FFFF).contains(n) => AsmInstr::Svc { cond, imm: *n as u32 },
                _ => return Err(ctx.err(ParseErrKind::ExpectedImm, span.clone()))
            }
        },
        Base::Nop => {
            if !operands.is_empty() { return Err(count_err()) };
            AsmInstr::Dp { op: DpOp::Mov, cond, set_flags: false, rd: Reg(0), rn: Reg(0), op2: Operand2::Reg(Reg(0), ShiftKind::Lsl, 0) }
        },
    };

    Ok(instr)
}

#[cfg(test)]
mod tests {
    use crate::ast::reg_consts::{LR, PC, R0, R1, R2, R3, R4, R5, R6, SP};
    use crate::ast::{AddrMode, AsmInstr, Cond, DpOp, Literal, MemOffset, Operand2, ShiftKind, StmtKind, Target};

    use super::{parse_ast, ParseErrKind};

    fn instr(src: &str) -> AsmInstr {
        let mut stmts = parse_ast(src).unwrap();
        assert_eq!(stmts.len(), 1, "expected one statement in {src:?}");
        match stmts.remove(0).kind {
            Some(StmtKind::Instr(i)) => i,
            k => panic!("expected instruction, got {k:?}")
        }
    }
    fn parse_err(src: &str) -> ParseErrKind {
        parse_ast(src).unwrap_err().kind
    }

    #[test]
    fn test_mnemonic_suffixes() {
        assert!(matches!(instr("adds r0, r1, r2"), AsmInstr::Dp { op: DpOp::Add, cond: Cond::AL, set_flags: true, .. }));
        assert!(matches!(instr("addeq r0, r1, r2"), AsmInstr::Dp { op: DpOp::Add, cond: Cond::EQ, set_flags: false, .. }));
        assert!(matches!(instr("addseq r0, r1, r2"), AsmInstr::Dp { cond: Cond::EQ, set_flags: true, .. }));
        assert!(matches!(instr("addeqs r0, r1, r2"), AsmInstr::Dp { cond: Cond::EQ, set_flags: true, .. }));
        assert!(matches!(instr("bls x"), AsmInstr::Branch { cond: Cond::LS, link: false, .. }));
        assert!(matches!(instr("blt x"), AsmInstr::Branch { cond: Cond::LT, link: false, .. }));
        assert!(matches!(instr("bleq x"), AsmInstr::Branch { cond: Cond::EQ, link: true, .. }));
        assert!(matches!(instr("BL x"), AsmInstr::Branch { cond: Cond::AL, link: true, .. }));
        assert!(matches!(instr("bxne lr"), AsmInstr::Bx { cond: Cond::NE, rm: LR }));
        assert!(matches!(instr("cmp r0, #1"), AsmInstr::Dp { op: DpOp::Cmp, set_flags: true, rn: R0, .. }));
        assert_eq!(parse_err("blx r0"), ParseErrKind::UnknownMnemonic);
        assert_eq!(parse_err("cmps r0, #1"), ParseErrKind::UnknownMnemonic);
    }

    #[test]
    fn test_data_processing_operands() {
        assert_eq!(instr("mov r0, #5"), AsmInstr::Dp { op: DpOp::Mov, cond: Cond::AL, set_flags: false, rd: R0, rn: R0, op2: Operand2::Imm(5) });
        assert_eq!(instr("add r0, r0, r1"), AsmInstr::Dp { op: DpOp::Add, cond: Cond::AL, set_flags: false, rd: R0, rn: R0, op2: Operand2::Reg(R1, ShiftKind::Lsl, 0) });
        assert_eq!(instr("add r2, #1"), AsmInstr::Dp { op: DpOp::Add, cond: Cond::AL, set_flags: false, rd: R2, rn: R2, op2: Operand2::Imm(1) });
        assert_eq!(instr("sub r0, r1, r2, lsr #3"), AsmInstr::Dp { op: DpOp::Sub, cond: Cond::AL, set_flags: false, rd: R0, rn: R1, op2: Operand2::Reg(R2, ShiftKind::Lsr, 3) });
        assert_eq!(instr("mvn r0, #-1"), AsmInstr::Dp { op: DpOp::Mvn, cond: Cond::AL, set_flags: false, rd: R0, rn: R0, op2: Operand2::Imm(u32::MAX) });
        assert_eq!(parse_err("add r0, r1, r2, lsl #40"), ParseErrKind::InvalidShift);
        assert_eq!(parse_err("mov #1, r0"), ParseErrKind::ExpectedReg);
        assert_eq!(parse_err("mov r0"), ParseErrKind::WrongOperandCount);
    }

    #[test]
    fn test_memory_operands() {
        assert_eq!(instr("ldr r0, [r1]"), AsmInstr::Mem { cond: Cond::AL, load: true, byte: false, rd: R0, addr: AddrMode::Offset(R1, MemOffset::Imm(0)) });
        assert_eq!(instr("strb r0, [sp, #-4]!"), AsmInstr::Mem { cond: Cond::AL, load: false, byte: true, rd: R0, addr: AddrMode::PreIndex(SP, MemOffset::Imm(-4)) });
        assert_eq!(instr("ldr r3, [r4], #8"), AsmInstr::Mem { cond: Cond::AL, load: true, byte: false, rd: R3, addr: AddrMode::PostIndex(R4, MemOffset::Imm(8)) });
        assert_eq!(instr("ldr r3, [r4, -r5]"), AsmInstr::Mem { cond: Cond::AL, load: true, byte: false, rd: R3, addr: AddrMode::Offset(R4, MemOffset::Reg { rm: R5, subtract: true }) });
        assert_eq!(instr("ldr r0, =0xFF00"), AsmInstr::LdrLit { cond: Cond::AL, rd: R0, value: Literal::Imm(0xFF00) });
        assert_eq!(instr("ldr r0, =msg"), AsmInstr::LdrLit { cond: Cond::AL, rd: R0, value: Literal::Label("msg".to_string()) });
        assert_eq!(parse_err("str r0, =msg"), ParseErrKind::ExpectedAddress);
        assert_eq!(parse_err("ldr r0, [r1, #4"), ParseErrKind::InvalidOperand);
    }

    #[test]
    fn test_misc_instructions() {
        assert_eq!(instr("push {r4-r6, lr}"), AsmInstr::Push { cond: Cond::AL, regs: R4.mask() | R5.mask() | R6.mask() | LR.mask() });
        assert_eq!(instr("pop {r4, pc}"), AsmInstr::Pop { cond: Cond::AL, regs: R4.mask() | PC.mask() });
        assert_eq!(instr("svc #0x0e"), AsmInstr::Svc { cond: Cond::AL, imm: 0x0E });
        assert_eq!(instr("swi 25"), AsmInstr::Svc { cond: Cond::AL, imm: 25 });
        assert_eq!(instr("bl 0xFF00"), AsmInstr::Branch { cond: Cond::AL, link: true, target: Target::Addr(0xFF00) });
        assert_eq!(instr("mla r0, r1, r2, r3"), AsmInstr::Mul { cond: Cond::AL, set_flags: false, rd: R0, rm: R1, rs: R2, acc: Some(R3) });
        assert_eq!(parse_err("push {r6-r4}"), ParseErrKind::ExpectedRegList);
        assert_eq!(parse_err("svc #0x1000000"), ParseErrKind::ExpectedImm);
    }

    #[test]
    fn test_statements_and_lines() {
        let stmts = parse_ast("a:b:mov r0, #1;;loop:\nb loop\n.word 0x12345678").unwrap();
        assert_eq!(stmts.len(), 4);
        assert_eq!(stmts[0].labels, ["a", "b"]);
        assert_eq!(stmts[0].line, 1);
        assert_eq!(stmts[1].labels, ["loop"]);
        assert_eq!(stmts[1].kind, None);
        assert_eq!(stmts[1].line, 3);
        assert_eq!(stmts[2].line, 4);
        assert_eq!(stmts[3].kind, Some(StmtKind::Word(0x1234_5678)));
        assert_eq!(stmts[3].line, 5);

        let err = parse_ast("mov r0, #1\nfoo r1").unwrap_err();
        assert_eq!(err.kind, ParseErrKind::UnknownMnemonic);
        assert_eq!(err.line, 2);
        assert_eq!(parse_err(".byte 1"), ParseErrKind::UnknownDirective);
    }

    #[test]
    fn test_nop() {
        assert_eq!(instr("nop"), AsmInstr::Dp { op: DpOp::Mov, cond: Cond::AL, set_flags: false, rd: R0, rn: R0, op2: Operand2::Reg(R0, ShiftKind::Lsl, 0) });
    }
}
