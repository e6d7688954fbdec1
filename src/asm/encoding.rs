//! Encoding A32 instructions into machine words.
//!
//! Every instruction in the supported subset is a single little-endian 32-bit word.
//! The layouts used here are:
//!
//! ```text
//! data processing   cond 00 I oooo S nnnn dddd <operand 2 (12)>
//! multiply          cond 000000 A S dddd nnnn ssss 1001 mmmm
//! branch            cond 101 L <offset (24)>
//! branch exchange   cond 0001 0010 1111 1111 1111 0001 mmmm
//! load/store        cond 01 I P U B W L nnnn dddd <offset (12)>
//! push/pop          cond 100 P U 0 W L 1101 <register list (16)>
//! supervisor call   cond 1111 <comment (24)>
//! ```

use crate::ast::{AddrMode, AsmInstr, Cond, DpOp, MemOffset, Operand2, Reg, ShiftKind, Target};

use super::{AsmErrKind, SymbolTable};

/// `bx lr`, the placeholder written at every syscall trampoline.
pub const BX_LR: u32 = 0xE12F_FF1E;

/// Attempts to encode a value into the 12-bit rotated immediate form
/// (an 8-bit value rotated right by an even amount).
///
/// ```
/// use armsim_harness::asm::encoding::encode_imm;
///
/// assert_eq!(encode_imm(5), Some(0x005));
/// assert_eq!(encode_imm(0xFF00_0000), Some(0x4FF));
/// assert_eq!(encode_imm(0x101), None);
/// ```
pub fn encode_imm(value: u32) -> Option<u32> {
    (0..16).find_map(|rot| {
        let imm8 = value.rotate_left(2 * rot);
        (imm8 <= 0xFF).then_some((rot << 8) | imm8)
    })
}

/// Expands a 12-bit rotated immediate into its value.
///
/// This also computes the shifter carry-out, which is only defined when the rotation is nonzero.
pub fn expand_imm(imm12: u32) -> (u32, Option<bool>) {
    let rot = (imm12 >> 8) & 0xF;
    let value = (imm12 & 0xFF).rotate_right(2 * rot);
    let carry = (rot != 0).then_some(value >> 31 != 0);
    (value, carry)
}

/// For a data processing op with an unencodable immediate,
/// the equivalent op and transformed immediate that may be encodable instead.
fn substitute(op: DpOp, value: u32) -> Option<(DpOp, u32)> {
    match op {
        DpOp::Mov => Some((DpOp::Mvn, !value)),
        DpOp::Mvn => Some((DpOp::Mov, !value)),
        DpOp::Add => Some((DpOp::Sub, value.wrapping_neg())),
        DpOp::Sub => Some((DpOp::Add, value.wrapping_neg())),
        DpOp::Cmp => Some((DpOp::Cmn, value.wrapping_neg())),
        DpOp::Cmn => Some((DpOp::Cmp, value.wrapping_neg())),
        DpOp::And => Some((DpOp::Bic, !value)),
        DpOp::Bic => Some((DpOp::And, !value)),
        _ => None
    }
}

fn encode_shifted_reg(rm: Reg, kind: ShiftKind, amount: u8) -> u32 {
    // lsr #32 and asr #32 are encoded with a shift amount of 0
    let amount = u32::from(amount) & 0x1F;
    (amount << 7) | ((kind as u32) << 5) | u32::from(rm)
}

fn encode_dp(op: DpOp, cond: Cond, set_flags: bool, rd: Reg, rn: Reg, op2: Operand2) -> Result<u32, AsmErrKind> {
    let (op, rn, operand) = match op2 {
        Operand2::Imm(value) => {
            let (op, imm12) = match encode_imm(value) {
                Some(imm12) => (op, imm12),
                None => substitute(op, value)
                    .and_then(|(sop, svalue)| Some((sop, encode_imm(svalue)?)))
                    .ok_or(AsmErrKind::ImmNotEncodable)?,
            };
            (op, rn, (1 << 25) | imm12)
        },
        Operand2::Reg(rm, kind, amount) => (op, rn, encode_shifted_reg(rm, kind, amount)),
    };

    let rn = if op.is_move() { 0 } else { u32::from(rn) };
    let rd = if op.is_test() { 0 } else { u32::from(rd) };
    let s = u32::from(set_flags || op.is_test());

    Ok((cond.bits() << 28) | ((op as u32) << 21) | (s << 20) | (rn << 16) | (rd << 12) | operand)
}

fn encode_mem(cond: Cond, load: bool, byte: bool, rd: Reg, addr: AddrMode) -> Result<u32, AsmErrKind> {
    let (rn, offset, p, w) = match addr {
        AddrMode::Offset(rn, off)    => (rn, off, 1, 0),
        AddrMode::PreIndex(rn, off)  => (rn, off, 1, 1),
        AddrMode::PostIndex(rn, off) => (rn, off, 0, 0),
    };
    let (i, u, field) = match offset {
        MemOffset::Imm(n) => {
            let magnitude = n.unsigned_abs();
            if magnitude > 0xFFF { return Err(AsmErrKind::OffsetOutOfRange) };
            (0, u32::from(n >= 0), magnitude)
        },
        MemOffset::Reg { rm, subtract } => (1, u32::from(!subtract), u32::from(rm)),
    };

    Ok((cond.bits() << 28)
        | (1 << 26)
        | (i << 25)
        | (p << 24)
        | (u << 23)
        | (u32::from(byte) << 22)
        | (w << 21)
        | (u32::from(load) << 20)
        | (u32::from(rn) << 16)
        | (u32::from(rd) << 12)
        | field
    )
}

/// Encodes `ldr rd, [pc, #offset]`, loading the literal at `literal_addr` from an instruction at `addr`.
pub fn encode_ldr_literal(cond: Cond, rd: Reg, addr: u32, literal_addr: u32) -> Result<u32, AsmErrKind> {
    let offset = i64::from(literal_addr) - (i64::from(addr) + 8);
    let offset = i32::try_from(offset).map_err(|_| AsmErrKind::OffsetOutOfRange)?;
    encode_mem(cond, true, false, rd, AddrMode::Offset(crate::ast::reg_consts::PC, MemOffset::Imm(offset)))
}

fn encode_branch(cond: Cond, link: bool, addr: u32, target: u32) -> Result<u32, AsmErrKind> {
    let offset = i64::from(target) - (i64::from(addr) + 8);
    if offset % 4 != 0 { return Err(AsmErrKind::MisalignedBranch) };

    let words = offset / 4;
    if !(-(1 << 23)..(1 << 23)).contains(&words) { return Err(AsmErrKind::BranchOutOfRange) };

    Ok((cond.bits() << 28) | (0b101 << 25) | (u32::from(link) << 24) | (words as u32 & 0x00FF_FFFF))
}

/// Encodes an instruction located at `addr`.
///
/// Labels are resolved through the symbol table.
/// `ldr rd, =value` must be encoded with [`encode_ldr_literal`] instead,
/// because it depends on where the literal pool is placed.
pub fn encode_instr(instr: &AsmInstr, addr: u32, sym: &SymbolTable) -> Result<u32, AsmErrKind> {
    match *instr {
        AsmInstr::Dp { op, cond, set_flags, rd, rn, op2 } => encode_dp(op, cond, set_flags, rd, rn, op2),
        AsmInstr::Mul { cond, set_flags, rd, rm, rs, acc } => {
            let (a, rn) = match acc {
                Some(rn) => (1, u32::from(rn)),
                None     => (0, 0),
            };
            Ok((cond.bits() << 28)
                | (a << 21)
                | (u32::from(set_flags) << 20)
                | (u32::from(rd) << 16)
                | (rn << 12)
                | (u32::from(rs) << 8)
                | 0x90
                | u32::from(rm)
            )
        },
        AsmInstr::Branch { cond, link, ref target } => {
            let target = match target {
                Target::Label(label) => sym.lookup_label(label).ok_or(AsmErrKind::CouldNotFindLabel)?,
                Target::Addr(a) => *a,
            };
            encode_branch(cond, link, addr, target)
        },
        AsmInstr::Bx { cond, rm } => Ok((cond.bits() << 28) | 0x012F_FF10 | u32::from(rm)),
        AsmInstr::Mem { cond, load, byte, rd, addr: mode } => encode_mem(cond, load, byte, rd, mode),
        AsmInstr::LdrLit { .. } => Err(AsmErrKind::InvalidOperand),
        AsmInstr::Push { cond, regs } => Ok((cond.bits() << 28) | 0x092D_0000 | u32::from(regs)),
        AsmInstr::Pop { cond, regs }  => Ok((cond.bits() << 28) | 0x08BD_0000 | u32::from(regs)),
        AsmInstr::Svc { cond, imm }   => Ok((cond.bits() << 28) | 0x0F00_0000 | (imm & 0x00FF_FFFF)),
    }
}
