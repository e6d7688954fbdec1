//! Assembling A32 source into machine code.
//!
//! This module is used to convert source text (or source ASTs, `Vec<`[`Stmt`]`>`) into
//! little-endian machine code that can be loaded into the simulator.
//!
//! The assembler module notably consists of:
//! - [`Assembler`]: the contract the simulator uses to assemble source text,
//! - [`A32Assembler`]: the assembler for the supported A32 subset,
//! - [`assemble`]: the two-pass assembly of a parsed AST,
//! - [`SymbolTable`]: the label addresses computed by the first pass.

pub mod encoding;

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::ast::{AsmInstr, Literal, Stmt, StmtKind};
use crate::err::ErrSpan;
use crate::parse::{parse_ast, ParseErr, ParseErrKind};

/// Converts source text into machine code.
///
/// The simulator only relies on this contract, so any assembler can be plugged into it.
pub trait Assembler {
    /// Assembles `src` as though its first statement is located at `base`.
    ///
    /// The result is the little-endian byte image of the program, starting at `base`.
    fn assemble(&self, src: &str, base: u32) -> Result<Vec<u8>, AsmErr>;
}

/// The assembler for the supported subset of A32.
///
/// # Example
/// ```
/// use armsim_harness::asm::{A32Assembler, Assembler};
///
/// let bytes = A32Assembler.assemble("mov r0, #5; bx lr", 0x1000).unwrap();
/// assert_eq!(bytes, [0x05, 0x00, 0xA0, 0xE3, 0x1E, 0xFF, 0x2F, 0xE1]);
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct A32Assembler;
impl Assembler for A32Assembler {
    fn assemble(&self, src: &str, base: u32) -> Result<Vec<u8>, AsmErr> {
        let ast = parse_ast(src)?;
        assemble(&ast, base)
    }
}

/// Assembles a parsed source AST into machine code located at `base`.
///
/// Literals created by `ldr rd, =value` are placed in a pool after the last statement,
/// in the order they appear.
///
/// # Example
/// ```
/// use armsim_harness::parse::parse_ast;
/// use armsim_harness::asm::assemble;
///
/// let ast = parse_ast("ldr r0, =0x12345678").unwrap();
/// let bytes = assemble(&ast, 0x1000).unwrap();
///
/// // one instruction and one literal
/// assert_eq!(bytes.len(), 8);
/// assert_eq!(&bytes[4..], 0x12345678u32.to_le_bytes());
/// ```
pub fn assemble(stmts: &[Stmt], base: u32) -> Result<Vec<u8>, AsmErr> {
    let sym = SymbolTable::new(stmts, base)?;

    let mut code = Vec::with_capacity(sym.code_len() as usize);
    let mut pool = vec![];
    for stmt in stmts {
        let Some(kind) = &stmt.kind else { continue };
        let addr = base.wrapping_add(code.len() as u32);

        let word = match kind {
            StmtKind::Word(w) => Ok(*w),
            StmtKind::Instr(AsmInstr::LdrLit { cond, rd, value }) => {
                let literal_addr = sym.code_end().wrapping_add(4 * pool.len() as u32);
                let value = match value {
                    Literal::Imm(v) => Some(*v),
                    Literal::Label(label) => sym.lookup_label(label),
                };

                match value {
                    Some(v) => {
                        pool.push(v);
                        encoding::encode_ldr_literal(*cond, *rd, addr, literal_addr)
                    },
                    None => Err(AsmErrKind::CouldNotFindLabel)
                }
            },
            StmtKind::Instr(instr) => encoding::encode_instr(instr, addr, &sym),
        }.map_err(|kind| AsmErr::new(kind, stmt.line, stmt.span.clone()))?;

        code.extend(word.to_le_bytes());
    }
    code.extend(pool.into_iter().flat_map(u32::to_le_bytes));

    Ok(code)
}

/// Kinds of errors that can occur from assembling given assembly code.
///
/// See [`AsmErr`] for this error type with location information included.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AsmErrKind {
    /// The source could not be parsed.
    Parse(ParseErrKind),
    /// There were multiple labels of the same name at different addresses (pass 1).
    OverlappingLabels,
    /// Label did not have an assigned address (pass 2).
    CouldNotFindLabel,
    /// Immediate cannot be expressed as a rotated 8-bit value (pass 2).
    ImmNotEncodable,
    /// Load/store offset does not fit in 12 bits (pass 2).
    OffsetOutOfRange,
    /// Branch target is further than 32 MiB away (pass 2).
    BranchOutOfRange,
    /// Branch target is not word-aligned (pass 2).
    MisalignedBranch,
    /// Operand cannot be encoded in this position (pass 2).
    InvalidOperand,
}
impl std::fmt::Display for AsmErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(e)          => e.fmt(f),
            Self::OverlappingLabels => f.write_str("label was defined multiple times"),
            Self::CouldNotFindLabel => f.write_str("label could not be found"),
            Self::ImmNotEncodable   => f.write_str("immediate value cannot be encoded"),
            Self::OffsetOutOfRange  => f.write_str("offset is out of range"),
            Self::BranchOutOfRange  => f.write_str("branch target is out of range"),
            Self::MisalignedBranch  => f.write_str("branch target is not word-aligned"),
            Self::InvalidOperand    => f.write_str("invalid operand"),
        }
    }
}

/// Error from assembling given assembly code.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct AsmErr {
    /// The kind of error.
    pub kind: AsmErrKind,
    /// The 1-based index of the statement which caused this error.
    pub stmt: usize,
    /// The span in the source associated with this error.
    pub span: ErrSpan
}
impl AsmErr {
    /// Creates a new [`AsmErr`].
    pub fn new(kind: AsmErrKind, stmt: usize, span: ErrSpan) -> Self {
        AsmErr { kind, stmt, span }
    }
}
impl From<ParseErr> for AsmErr {
    fn from(value: ParseErr) -> Self {
        AsmErr::new(AsmErrKind::Parse(value.kind), value.line, value.span)
    }
}
impl std::fmt::Display for AsmErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)
    }
}
impl std::error::Error for AsmErr {}
impl crate::err::Error for AsmErr {
    fn span(&self) -> Option<ErrSpan> {
        Some(self.span.clone())
    }

    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match &self.kind {
            AsmErrKind::Parse(e)          => e.help(),
            AsmErrKind::OverlappingLabels => Some("labels must be unique within a file, try renaming one of the labels".into()),
            AsmErrKind::CouldNotFindLabel => Some("try adding this label before an instruction or directive".into()),
            AsmErrKind::ImmNotEncodable   => Some("immediates must be an 8-bit value rotated by an even amount; try ldr rd, =value".into()),
            AsmErrKind::OffsetOutOfRange  => Some("load/store offsets must be within [-4095, 4095]".into()),
            AsmErrKind::BranchOutOfRange  => Some("branch targets must be within 32 MiB of the branch".into()),
            AsmErrKind::MisalignedBranch  => Some("branch targets must be a multiple of 4".into()),
            AsmErrKind::InvalidOperand    => None,
        }
    }
}

/// The symbol table created in the first assembler pass,
/// which maps labels to the memory addresses they refer to.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SymbolTable {
    label_map: HashMap<String, u32>,
    base: u32,
    code_len: u32,
}
impl SymbolTable {
    /// Creates a new symbol table.
    ///
    /// This performs the first assembler pass, calculating the memory address of
    /// labels at each provided statement.
    ///
    /// A label defined more than once is only an error if its definitions resolve to different addresses.
    ///
    /// ## Example
    /// ```
    /// use armsim_harness::parse::parse_ast;
    /// use armsim_harness::asm::SymbolTable;
    ///
    /// let src = "
    ///     start: mov r0, #0
    ///     loop:
    ///         add r0, r0, #1
    ///         b loop
    /// ";
    /// let ast = parse_ast(src).unwrap();
    ///
    /// let sym = SymbolTable::new(&ast, 0x1000).unwrap();
    /// assert_eq!(sym.lookup_label("start"), Some(0x1000));
    /// assert_eq!(sym.lookup_label("loop"), Some(0x1004));
    /// assert_eq!(sym.lookup_label("LOOP"), None);
    /// ```
    pub fn new(stmts: &[Stmt], base: u32) -> Result<Self, AsmErr> {
        let mut label_map = HashMap::new();
        let mut lc = 0u32;

        for stmt in stmts {
            let addr = base.wrapping_add(lc);
            for label in &stmt.labels {
                match label_map.entry(label.clone()) {
                    // Two labels with different addresses. Conflict.
                    Entry::Occupied(e) if *e.get() != addr => {
                        return Err(AsmErr::new(AsmErrKind::OverlappingLabels, stmt.line, stmt.span.clone()));
                    },
                    Entry::Occupied(_) => {},
                    Entry::Vacant(e) => { e.insert(addr); },
                }
            }

            if let Some(kind) = &stmt.kind {
                lc = lc.wrapping_add(kind.size());
            }
        }

        Ok(SymbolTable { label_map, base, code_len: lc })
    }

    /// Gets the memory address of a given label (if it exists).
    pub fn lookup_label(&self, label: &str) -> Option<u32> {
        self.label_map.get(label).copied()
    }

    /// Gets the label at a given memory address (if it exists).
    ///
    /// If several labels share the address, the alphabetically first one is returned.
    pub fn rev_lookup_label(&self, addr: u32) -> Option<&str> {
        self.label_map.iter()
            .filter(|&(_, &a)| a == addr)
            .map(|(label, _)| &**label)
            .min()
    }

    /// The number of bytes occupied by statements (excluding the literal pool).
    pub fn code_len(&self) -> u32 {
        self.code_len
    }

    /// The address just past the last statement, where the literal pool begins.
    pub fn code_end(&self) -> u32 {
        self.base.wrapping_add(self.code_len)
    }
}

#[cfg(test)]
mod tests {
    use crate::parse::{parse_ast, ParseErrKind};

    use super::{A32Assembler, AsmErr, AsmErrKind, Assembler, SymbolTable};

    fn words(src: &str, base: u32) -> Result<Vec<u32>, AsmErr> {
        let bytes = A32Assembler.assemble(src, base)?;
        Ok(bytes.chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
    fn word(src: &str) -> u32 {
        let w = words(src, 0x1000).unwrap();
        assert_eq!(w.len(), 1, "expected a single word from {src:?}");
        w[0]
    }
    fn assert_asm_fail(src: &str, kind: AsmErrKind) {
        assert_eq!(words(src, 0x1000).unwrap_err().kind, kind, "for {src:?}");
    }

    #[test]
    fn test_data_processing() {
        assert_eq!(word("mov r0, #5"), 0xE3A0_0005);
        assert_eq!(word("mov r1, #10"), 0xE3A0_100A);
        assert_eq!(word("add r0, r0, r1"), 0xE080_0001);
        assert_eq!(word("subs r0, r0, #1"), 0xE250_0001);
        assert_eq!(word("add r0, r1, r2, lsl #2"), 0xE081_0102);
        assert_eq!(word("movs r0, r1, lsr #32"), 0xE1B0_0021);
        assert_eq!(word("cmp r0, #0"), 0xE350_0000);
        assert_eq!(word("tst r1, r2"), 0xE111_0002);
        assert_eq!(word("moveq r0, #0xFF000000"), 0x03A0_04FF);
        assert_eq!(word("nop"), 0xE1A0_0000);
    }

    #[test]
    fn test_immediate_substitution() {
        // mov r0, #-1 == mvn r0, #0
        assert_eq!(word("mov r0, #-1"), 0xE3E0_0000);
        // add r0, r0, #-4 == sub r0, r0, #4
        assert_eq!(word("add r0, r0, #-4"), 0xE240_0004);
        // cmp r0, #-1 == cmn r0, #1
        assert_eq!(word("cmp r0, #-1"), 0xE370_0001);
        // and r0, r0, #0xFFFFFF00 == bic r0, r0, #0xFF
        assert_eq!(word("and r0, r0, #0xFFFFFF00"), 0xE3C0_00FF);

        assert_asm_fail("mov r0, #0x1234", AsmErrKind::ImmNotEncodable);
        assert_asm_fail("orr r0, r0, #0xFFFFFF00", AsmErrKind::ImmNotEncodable);
    }

    #[test]
    fn test_multiply_and_misc() {
        assert_eq!(word("mul r0, r1, r2"), 0xE000_0291);
        assert_eq!(word("mla r3, r1, r2, r0"), 0xE023_0291);
        assert_eq!(word("bx lr"), 0xE12F_FF1E);
        assert_eq!(word("push {r4, lr}"), 0xE92D_4010);
        assert_eq!(word("pop {r4, pc}"), 0xE8BD_8010);
        assert_eq!(word("svc #0"), 0xEF00_0000);
        assert_eq!(word("svc #0x19"), 0xEF00_0019);
        assert_eq!(word(".word 0xDEADBEEF"), 0xDEAD_BEEF);
    }

    #[test]
    fn test_load_store() {
        assert_eq!(word("ldr r0, [r1, #4]"), 0xE591_0004);
        assert_eq!(word("ldr r0, [r1]"), 0xE591_0000);
        assert_eq!(word("str r0, [sp, #-4]!"), 0xE52D_0004);
        assert_eq!(word("ldr r0, [sp], #4"), 0xE49D_0004);
        assert_eq!(word("ldrb r0, [r1]"), 0xE5D1_0000);
        assert_eq!(word("strb r2, [r1, r3]"), 0xE7C1_2003);
        assert_eq!(word("ldr r2, [r1, -r3]"), 0xE711_2003);

        assert_asm_fail("ldr r0, [r1, #4096]", AsmErrKind::OffsetOutOfRange);
    }

    #[test]
    fn test_branches() {
        // branch to self
        assert_eq!(words("loop: b loop", 0x1000).unwrap(), [0xEAFF_FFFE]);
        // forward branch and link
        assert_eq!(words("bl f; nop; f: bx lr", 0x1000).unwrap()[0], 0xEB00_0000);
        // absolute target
        assert_eq!(words("bl 0xFF00", 0x1000).unwrap(), [0xEB00_3BBE]);
        // conditional backwards branch
        assert_eq!(words("l: nop; bne l", 0x1000).unwrap()[1], 0x1AFF_FFFD);

        assert_asm_fail("b nowhere", AsmErrKind::CouldNotFindLabel);
        assert_asm_fail("b 0x1002", AsmErrKind::MisalignedBranch);
        assert_asm_fail("b 0x8000000", AsmErrKind::BranchOutOfRange);
    }

    #[test]
    fn test_literal_pool() {
        let w = words("ldr r0, =0x12345678; ldr r1, =msg; msg: .word 7", 0x1000).unwrap();
        // pool is placed after the three statements (0x100C)
        assert_eq!(w, [0xE59F_0004, 0xE59F_1004, 7, 0x1234_5678, 0x1008]);

        assert_asm_fail("ldr r0, =missing", AsmErrKind::CouldNotFindLabel);
    }

    #[test]
    fn test_sym_basic() {
        let ast = parse_ast("a: nop; b: c: nop;; d:").unwrap();
        let sym = SymbolTable::new(&ast, 0x2000).unwrap();
        assert_eq!(sym.lookup_label("a"), Some(0x2000));
        assert_eq!(sym.lookup_label("b"), Some(0x2004));
        assert_eq!(sym.lookup_label("c"), Some(0x2004));
        assert_eq!(sym.lookup_label("d"), Some(0x2008));
        assert_eq!(sym.rev_lookup_label(0x2004), Some("b"));
        assert_eq!(sym.rev_lookup_label(0x2002), None);
        assert_eq!(sym.code_end(), 0x2008);
    }

    #[test]
    fn test_duplicate_labels() {
        // same address is fine
        assert!(words("a: a: nop", 0x1000).is_ok());

        let err = words("a: nop\na: nop", 0x1000).unwrap_err();
        assert_eq!(err.kind, AsmErrKind::OverlappingLabels);
        assert_eq!(err.stmt, 2);
    }

    #[test]
    fn test_parse_errors_are_located() {
        let err = words("mov r0, #1\nmov r1, #2\nfrob r2", 0x1000).unwrap_err();
        assert_eq!(err.kind, AsmErrKind::Parse(ParseErrKind::UnknownMnemonic));
        assert_eq!(err.stmt, 3);
        assert_eq!(err.span, 22..26);
    }
}
