//! Components relating to the abstract syntax trees (ASTs)
//! used in representing A32 assembly statements.
//!
//! The key types here are:
//! - [`Reg`]: one of the sixteen core registers,
//! - [`Cond`]: the condition under which an instruction executes,
//! - [`AsmInstr`]: a parsed instruction, ready to be encoded,
//! - [`Stmt`]: a statement (labels plus an optional instruction or directive).

use std::num::TryFromIntError;
use std::ops::Range;

/// A register. Must be between 0 and 15.
///
/// This `Reg` struct can either be constructed by selecting a register from [`reg_consts`],
/// with [`Reg::try_from`], or from its assembly name with [`Reg::from_name`].
///
/// ## Examples
///
/// ```text
/// add r0, r1, r2
///     ~~  ~~  ~~
/// ldr r3, [sp, #4]
///     ~~   ~~
/// bx lr
///    ~~
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub struct Reg(pub(crate) u8);

/// Register constants!
pub mod reg_consts {
    use super::Reg;

    /// General purpose register 0 (also the syscall result register).
    pub const R0: Reg = Reg(0);
    /// General purpose register 1 (also the syscall argument register).
    pub const R1: Reg = Reg(1);
    /// General purpose register 2.
    pub const R2: Reg = Reg(2);
    /// General purpose register 3.
    pub const R3: Reg = Reg(3);
    /// General purpose register 4.
    pub const R4: Reg = Reg(4);
    /// General purpose register 5.
    pub const R5: Reg = Reg(5);
    /// General purpose register 6.
    pub const R6: Reg = Reg(6);
    /// General purpose register 7.
    pub const R7: Reg = Reg(7);
    /// General purpose register 8.
    pub const R8: Reg = Reg(8);
    /// General purpose register 9.
    pub const R9: Reg = Reg(9);
    /// General purpose register 10.
    pub const R10: Reg = Reg(10);
    /// General purpose register 11 (frame pointer).
    pub const R11: Reg = Reg(11);
    /// General purpose register 12 (intra-procedure scratch).
    pub const R12: Reg = Reg(12);
    /// The stack pointer (register 13).
    pub const SP: Reg = Reg(13);
    /// The link register (register 14).
    pub const LR: Reg = Reg(14);
    /// The program counter (register 15).
    pub const PC: Reg = Reg(15);
}
impl Reg {
    /// Gets the register number of this [`Reg`]. This is always between 0 and 15.
    pub fn reg_no(self) -> u8 {
        self.0
    }

    /// Parses a register from its assembly name (case-insensitive).
    ///
    /// Accepts `r0`-`r15` as well as the aliases `fp`, `ip`, `sp`, `lr`, and `pc`.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        let no = match &*name {
            "fp" => 11,
            "ip" => 12,
            "sp" => 13,
            "lr" => 14,
            "pc" => 15,
            _ => {
                let digits = name.strip_prefix('r')?;
                // reject r01, r+1, etc.
                if digits.len() > 1 && digits.starts_with('0') { return None };
                digits.parse::<u8>().ok().filter(|&n| n < 16)?
            }
        };
        Some(Reg(no))
    }

    /// The bit of this register in a register list (`push`/`pop`).
    pub(crate) fn mask(self) -> u16 {
        1 << self.0
    }
}
impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            13 => f.write_str("sp"),
            14 => f.write_str("lr"),
            15 => f.write_str("pc"),
            n  => write!(f, "r{n}")
        }
    }
}
impl From<Reg> for usize {
    fn from(value: Reg) -> Self {
        usize::from(value.0)
    }
}
impl From<Reg> for u32 {
    fn from(value: Reg) -> Self {
        u32::from(value.0)
    }
}
impl TryFrom<u8> for Reg {
    type Error = TryFromIntError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0..=15 => Ok(Reg(value)),
            // HACKy, but there's no other way to create this error
            _      => u8::try_from(256).map(|_| unreachable!("should've been TryFromIntError")),
        }
    }
}

/// A condition code, held in the top four bits of every A32 instruction.
///
/// | suffix         | code   | passes when    |
/// |----------------|--------|----------------|
/// | `eq`           | `0000` | Z              |
/// | `ne`           | `0001` | !Z             |
/// | `cs`/`hs`      | `0010` | C              |
/// | `cc`/`lo`      | `0011` | !C             |
/// | `mi`           | `0100` | N              |
/// | `pl`           | `0101` | !N             |
/// | `vs`           | `0110` | V              |
/// | `vc`           | `0111` | !V             |
/// | `hi`           | `1000` | C && !Z        |
/// | `ls`           | `1001` | !C \|\| Z      |
/// | `ge`           | `1010` | N == V         |
/// | `lt`           | `1011` | N != V         |
/// | `gt`           | `1100` | !Z && N == V   |
/// | `le`           | `1101` | Z \|\| N != V  |
/// | `al` (or none) | `1110` | always         |
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
#[allow(missing_docs)]
pub enum Cond {
    EQ = 0b0000, NE = 0b0001, CS = 0b0010, CC = 0b0011,
    MI = 0b0100, PL = 0b0101, VS = 0b0110, VC = 0b0111,
    HI = 0b1000, LS = 0b1001, GE = 0b1010, LT = 0b1011,
    GT = 0b1100, LE = 0b1101,
    #[default]
    AL = 0b1110,
}
impl Cond {
    /// Parses a condition suffix (case-insensitive). The empty suffix is `AL`.
    pub fn from_suffix(s: &str) -> Option<Self> {
        let cond = match &*s.to_ascii_lowercase() {
            "eq" => Cond::EQ,
            "ne" => Cond::NE,
            "cs" | "hs" => Cond::CS,
            "cc" | "lo" => Cond::CC,
            "mi" => Cond::MI,
            "pl" => Cond::PL,
            "vs" => Cond::VS,
            "vc" => Cond::VC,
            "hi" => Cond::HI,
            "ls" => Cond::LS,
            "ge" => Cond::GE,
            "lt" => Cond::LT,
            "gt" => Cond::GT,
            "le" => Cond::LE,
            "al" | "" => Cond::AL,
            _ => return None
        };
        Some(cond)
    }

    /// The 4-bit encoding of this condition.
    pub fn bits(self) -> u32 {
        self as u32
    }
}

/// A barrel shifter operation applied to a register operand.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
#[allow(missing_docs)]
pub enum ShiftKind {
    Lsl = 0b00,
    Lsr = 0b01,
    Asr = 0b10,
    Ror = 0b11,
}
impl ShiftKind {
    /// Parses a shift mnemonic (case-insensitive).
    pub fn from_name(s: &str) -> Option<Self> {
        match &*s.to_ascii_lowercase() {
            "lsl" | "asl" => Some(ShiftKind::Lsl),
            "lsr" => Some(ShiftKind::Lsr),
            "asr" => Some(ShiftKind::Asr),
            "ror" => Some(ShiftKind::Ror),
            _ => None
        }
    }
}

/// The flexible second operand of a data processing instruction.
///
/// ## Examples
/// ```text
/// mov r0, #255
///         ~~~~
/// add r0, r1, r2
///             ~~
/// add r0, r1, r2, lsl #2
///             ~~~~~~~~~~
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Operand2 {
    /// An immediate value, before it is encoded into the rotated 8-bit form.
    Imm(u32),
    /// A register, shifted by an immediate amount (`0..32`).
    Reg(Reg, ShiftKind, u8),
}

/// Data processing opcodes, in encoding order.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
#[allow(missing_docs)]
pub enum DpOp {
    And = 0x0, Eor = 0x1, Sub = 0x2, Rsb = 0x3,
    Add = 0x4, Adc = 0x5, Sbc = 0x6, Rsc = 0x7,
    Tst = 0x8, Teq = 0x9, Cmp = 0xA, Cmn = 0xB,
    Orr = 0xC, Mov = 0xD, Bic = 0xE, Mvn = 0xF,
}
impl DpOp {
    /// Every data processing opcode.
    pub const ALL: [DpOp; 16] = [
        DpOp::And, DpOp::Eor, DpOp::Sub, DpOp::Rsb,
        DpOp::Add, DpOp::Adc, DpOp::Sbc, DpOp::Rsc,
        DpOp::Tst, DpOp::Teq, DpOp::Cmp, DpOp::Cmn,
        DpOp::Orr, DpOp::Mov, DpOp::Bic, DpOp::Mvn,
    ];

    /// Decodes the opcode field of a data processing instruction.
    pub fn from_bits(bits: u32) -> Self {
        Self::ALL[(bits & 0xF) as usize]
    }

    /// The mnemonic of this opcode.
    pub fn mnemonic(self) -> &'static str {
        match self {
            DpOp::And => "and", DpOp::Eor => "eor", DpOp::Sub => "sub", DpOp::Rsb => "rsb",
            DpOp::Add => "add", DpOp::Adc => "adc", DpOp::Sbc => "sbc", DpOp::Rsc => "rsc",
            DpOp::Tst => "tst", DpOp::Teq => "teq", DpOp::Cmp => "cmp", DpOp::Cmn => "cmn",
            DpOp::Orr => "orr", DpOp::Mov => "mov", DpOp::Bic => "bic", DpOp::Mvn => "mvn",
        }
    }

    /// Whether this opcode only sets flags and has no destination register.
    pub fn is_test(self) -> bool {
        matches!(self, DpOp::Tst | DpOp::Teq | DpOp::Cmp | DpOp::Cmn)
    }

    /// Whether this opcode ignores its first source register.
    pub fn is_move(self) -> bool {
        matches!(self, DpOp::Mov | DpOp::Mvn)
    }
}

/// The destination of a branch.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Target {
    /// A label, resolved during assembly.
    Label(String),
    /// An absolute address (e.g., a syscall trampoline).
    Addr(u32),
}

/// The offset part of a load/store address.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum MemOffset {
    /// An immediate byte offset (`-4095..=4095`).
    Imm(i32),
    /// A register offset, added or subtracted.
    Reg {
        /// The offset register.
        rm: Reg,
        /// Whether the register is subtracted from the base.
        subtract: bool
    },
}

/// The addressing mode of a load/store.
///
/// ```text
/// ldr r0, [r1, #4]      ; Offset
/// ldr r0, [r1, #4]!     ; PreIndex
/// ldr r0, [r1], #4      ; PostIndex
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum AddrMode {
    /// `[rn, offset]`
    Offset(Reg, MemOffset),
    /// `[rn, offset]!`
    PreIndex(Reg, MemOffset),
    /// `[rn], offset`
    PostIndex(Reg, MemOffset),
}

/// The value loaded by an `ldr rd, =value` pseudo-instruction.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Literal {
    /// A constant.
    Imm(u32),
    /// The address of a label.
    Label(String),
}

/// An assembly instruction, after parsing but before encoding.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum AsmInstr {
    /// Data processing (`mov`, `add`, `cmp`, ...).
    Dp {
        #[allow(missing_docs)]
        op: DpOp,
        #[allow(missing_docs)]
        cond: Cond,
        /// Whether the instruction updates the condition flags.
        set_flags: bool,
        #[allow(missing_docs)]
        rd: Reg,
        #[allow(missing_docs)]
        rn: Reg,
        #[allow(missing_docs)]
        op2: Operand2,
    },
    /// `mul rd, rm, rs` or `mla rd, rm, rs, rn`.
    Mul {
        #[allow(missing_docs)]
        cond: Cond,
        #[allow(missing_docs)]
        set_flags: bool,
        #[allow(missing_docs)]
        rd: Reg,
        #[allow(missing_docs)]
        rm: Reg,
        #[allow(missing_docs)]
        rs: Reg,
        /// The accumulator register (`mla` only).
        acc: Option<Reg>,
    },
    /// `b` or `bl`.
    Branch {
        #[allow(missing_docs)]
        cond: Cond,
        /// Whether the return address is written to `lr`.
        link: bool,
        #[allow(missing_docs)]
        target: Target,
    },
    /// `bx rm`.
    Bx {
        #[allow(missing_docs)]
        cond: Cond,
        #[allow(missing_docs)]
        rm: Reg,
    },
    /// `ldr`, `str`, `ldrb`, `strb`.
    Mem {
        #[allow(missing_docs)]
        cond: Cond,
        #[allow(missing_docs)]
        load: bool,
        #[allow(missing_docs)]
        byte: bool,
        #[allow(missing_docs)]
        rd: Reg,
        #[allow(missing_docs)]
        addr: AddrMode,
    },
    /// `ldr rd, =literal`.
    LdrLit {
        #[allow(missing_docs)]
        cond: Cond,
        #[allow(missing_docs)]
        rd: Reg,
        #[allow(missing_docs)]
        value: Literal,
    },
    /// `push {...}` (`stmdb sp!, {...}`).
    Push {
        #[allow(missing_docs)]
        cond: Cond,
        #[allow(missing_docs)]
        regs: u16,
    },
    /// `pop {...}` (`ldmia sp!, {...}`).
    Pop {
        #[allow(missing_docs)]
        cond: Cond,
        #[allow(missing_docs)]
        regs: u16,
    },
    /// `svc #imm24`.
    Svc {
        #[allow(missing_docs)]
        cond: Cond,
        #[allow(missing_docs)]
        imm: u32,
    },
}

/// The payload of a statement.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum StmtKind {
    /// An instruction.
    Instr(AsmInstr),
    /// A `.word` directive.
    Word(u32),
}
impl StmtKind {
    /// Number of bytes this statement occupies in the code section.
    ///
    /// Literal pool entries created by `ldr rd, =value` are not included.
    pub fn size(&self) -> u32 {
        4
    }

    /// The literal this statement places in the literal pool, if any.
    pub fn literal(&self) -> Option<&Literal> {
        match self {
            StmtKind::Instr(AsmInstr::LdrLit { value, .. }) => Some(value),
            _ => None
        }
    }
}

/// A statement: labels, followed by an optional instruction or directive.
///
/// ```text
/// loop: subs r0, r0, #1
/// ~~~~~ ~~~~~~~~~~~~~~~
/// labels   kind
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Stmt {
    /// Labels defined at this statement.
    pub labels: Vec<String>,
    /// The instruction or directive, if any.
    pub kind: Option<StmtKind>,
    /// The 1-based index of this statement in its source.
    ///
    /// Once line endings are normalized into `;`, this is also the source line.
    pub line: usize,
    /// Span of the statement in the source.
    pub span: Range<usize>,
}
