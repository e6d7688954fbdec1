//! A reference interpreter for the supported subset of A32.
//!
//! The [`Interpreter`] decodes and executes one instruction at a time,
//! honouring the full [`Engine`] contract.
//! Instructions outside of the subset raise [`FaultKind::UndefinedInstruction`].
//!
//! The program counter reads as the address of the current instruction plus 8,
//! as it does on hardware.

use std::collections::HashSet;

use crate::asm::encoding::expand_imm;
use crate::ast::DpOp;

use super::{Engine, EngineFault, FaultKind, HookAction, Hooks, Machine, RegId};

const FLAG_N: u32 = 1 << 31;
const FLAG_Z: u32 = 1 << 30;
const FLAG_C: u32 = 1 << 29;
const FLAG_V: u32 = 1 << 28;

/// User mode, all flags clear.
const CPSR_RESET: u32 = 0x0000_0010;

/// Register bank and memory of the interpreter.
///
/// This is kept apart from the watch list so that it can be lent to callbacks
/// while the interpreter is running.
#[derive(Debug, Clone)]
struct Core {
    regs: [u32; 16],
    cpsr: u32,
    mem: Vec<u8>,
}

/// The reference [`Engine`].
///
/// # Example
/// ```
/// use armsim_harness::asm::{A32Assembler, Assembler};
/// use armsim_harness::engine::{Engine, Interpreter, Machine, NoHooks, RegId};
///
/// let code = A32Assembler.assemble("mov r0, #5; add r0, r0, #1", 0x100).unwrap();
/// let mut engine = Interpreter::new(0x1000);
/// engine.mem_write(0x100, &code).unwrap();
///
/// let end = engine.start(0x100, 0x108, 0, &mut NoHooks).unwrap();
/// assert_eq!(end, 0x108);
/// assert_eq!(engine.reg_read(RegId::R0), 6);
/// ```
#[derive(Debug, Clone)]
pub struct Interpreter {
    core: Core,
    watched: HashSet<u32>,
}

impl Machine for Core {
    fn reg_read(&self, reg: RegId) -> u32 {
        match reg.index() {
            Some(i) => self.regs[i],
            None => self.cpsr,
        }
    }

    fn reg_write(&mut self, reg: RegId, value: u32) {
        match reg.index() {
            Some(i) => self.regs[i] = value,
            None => self.cpsr = value,
        }
    }

    fn mem_read(&self, addr: u32, buf: &mut [u8]) -> Result<(), EngineFault> {
        let range = self.mem_range(addr, buf.len())?;
        buf.copy_from_slice(&self.mem[range]);
        Ok(())
    }

    fn mem_write(&mut self, addr: u32, data: &[u8]) -> Result<(), EngineFault> {
        let range = self.mem_range(addr, data.len())?;
        self.mem[range].copy_from_slice(data);
        Ok(())
    }
}

impl Core {
    fn mem_range(&self, addr: u32, len: usize) -> Result<std::ops::Range<usize>, EngineFault> {
        let start = addr as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.mem.len() => Ok(start..end),
            _ => Err(EngineFault { address: addr, kind: FaultKind::UnmappedAccess(addr) }),
        }
    }

    fn flag(&self, mask: u32) -> bool {
        self.cpsr & mask != 0
    }
    fn set_flag(&mut self, mask: u32, value: bool) {
        match value {
            true  => self.cpsr |= mask,
            false => self.cpsr &= !mask,
        }
    }
    fn set_nz(&mut self, result: u32) {
        self.set_flag(FLAG_N, result >> 31 != 0);
        self.set_flag(FLAG_Z, result == 0);
    }

    fn cond_passed(&self, cond: u32) -> bool {
        let (n, z, c, v) = (self.flag(FLAG_N), self.flag(FLAG_Z), self.flag(FLAG_C), self.flag(FLAG_V));
        match cond {
            0x0 => z,
            0x1 => !z,
            0x2 => c,
            0x3 => !c,
            0x4 => n,
            0x5 => !n,
            0x6 => v,
            0x7 => !v,
            0x8 => c && !z,
            0x9 => !c || z,
            0xA => n == v,
            0xB => n != v,
            0xC => !z && n == v,
            0xD => z || n != v,
            _ => true,
        }
    }

    /// Reads a register as an operand of the instruction at `pc`.
    fn operand(&self, r: u32, pc: u32) -> u32 {
        match r {
            15 => pc.wrapping_add(8),
            r  => self.regs[r as usize & 0xF],
        }
    }

    fn read_word(&self, addr: u32) -> Result<u32, EngineFault> {
        let mut buf = [0; 4];
        self.mem_read(addr, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Executes the instruction at `pc`, returning the address of the next instruction.
    fn step(&mut self, pc: u32, hooks: &mut dyn Hooks) -> Result<u32, EngineFault> {
        let word = self.read_word(pc)?;
        let undefined = EngineFault { address: pc, kind: FaultKind::UndefinedInstruction(word) };
        let at_pc = |f: EngineFault| EngineFault { address: pc, ..f };

        let cond = word >> 28;
        if cond == 0xF { return Err(undefined) };
        if !self.cond_passed(cond) { return Ok(pc.wrapping_add(4)) };

        let next = if word & 0x0FFF_FFF0 == 0x012F_FF10 {
            // bx
            self.operand(word & 0xF, pc) & !1
        } else if word & 0x0FC0_00F0 == 0x0000_0090 {
            self.exec_multiply(word, pc)
        } else {
            match (word >> 25) & 0b111 {
                0b000 | 0b001 => self.exec_data_processing(word, pc).ok_or(undefined)?,
                0b010 | 0b011 => self.exec_load_store(word, pc, hooks).map_err(at_pc)?.ok_or(undefined)?,
                0b100 => self.exec_block_transfer(word, pc, hooks).map_err(at_pc)?.ok_or(undefined)?,
                0b101 => {
                    let offset = (((word & 0x00FF_FFFF) << 8) as i32 >> 6) as u32;
                    if word & (1 << 24) != 0 {
                        self.regs[14] = pc.wrapping_add(4);
                    }
                    pc.wrapping_add(8).wrapping_add(offset)
                },
                0b111 if word & (1 << 24) != 0 => {
                    hooks.on_supervisor_call(self, word & 0x00FF_FFFF)
                        .map_err(|kind| EngineFault { address: pc, kind })?;
                    pc.wrapping_add(4)
                },
                _ => return Err(undefined),
            }
        };

        Ok(next)
    }

    /// Applies an immediate shift, returning the result and the shifter carry-out.
    fn shift_imm(&self, value: u32, kind: u32, amount: u32) -> (u32, bool) {
        let c = self.flag(FLAG_C);
        let bit = |n: u32| (value >> n) & 1 != 0;
        match (kind, amount) {
            (0b00, 0) => (value, c),
            (0b00, n) => (value << n, bit(32 - n)),
            (0b01, 0) => (0, bit(31)),
            (0b01, n) => (value >> n, bit(n - 1)),
            (0b10, 0) => (((value as i32) >> 31) as u32, bit(31)),
            (0b10, n) => (((value as i32) >> n) as u32, bit(n - 1)),
            // rrx
            (_, 0)    => ((u32::from(c) << 31) | (value >> 1), bit(0)),
            (_, n)    => (value.rotate_right(n), bit(n - 1)),
        }
    }

    fn exec_data_processing(&mut self, word: u32, pc: u32) -> Option<u32> {
        let op = DpOp::from_bits(word >> 21);
        let set_flags = word & (1 << 20) != 0;
        let rn = (word >> 16) & 0xF;
        let rd = (word >> 12) & 0xF;

        // mrs/msr and friends occupy the test opcodes without S
        if op.is_test() && !set_flags { return None };
        // flag-setting writes to pc restore the saved status register, which does not exist in user mode
        if set_flags && rd == 15 && !op.is_test() { return None };

        let (op2, shifter_carry) = if word & (1 << 25) != 0 {
            let (value, carry) = expand_imm(word & 0xFFF);
            (value, carry.unwrap_or(self.flag(FLAG_C)))
        } else {
            // register-shifted register operands are not supported
            if word & 0x10 != 0 { return None };
            let rm = self.operand(word & 0xF, pc);
            self.shift_imm(rm, (word >> 5) & 0b11, (word >> 7) & 0x1F)
        };
        let a = self.operand(rn, pc);
        let c = u32::from(self.flag(FLAG_C));

        let (result, arith) = match op {
            DpOp::And | DpOp::Tst => (a & op2, None),
            DpOp::Eor | DpOp::Teq => (a ^ op2, None),
            DpOp::Orr => (a | op2, None),
            DpOp::Mov => (op2, None),
            DpOp::Bic => (a & !op2, None),
            DpOp::Mvn => (!op2, None),
            DpOp::Sub | DpOp::Cmp => add_with_carry(a, !op2, 1),
            DpOp::Rsb => add_with_carry(op2, !a, 1),
            DpOp::Add | DpOp::Cmn => add_with_carry(a, op2, 0),
            DpOp::Adc => add_with_carry(a, op2, c),
            DpOp::Sbc => add_with_carry(a, !op2, c),
            DpOp::Rsc => add_with_carry(op2, !a, c),
        };

        if set_flags {
            self.set_nz(result);
            match arith {
                Some((carry, overflow)) => {
                    self.set_flag(FLAG_C, carry);
                    self.set_flag(FLAG_V, overflow);
                },
                None => self.set_flag(FLAG_C, shifter_carry),
            }
        }

        match (op.is_test(), rd) {
            (true, _) => Some(pc.wrapping_add(4)),
            (false, 15) => Some(result & !3),
            (false, rd) => {
                self.regs[rd as usize] = result;
                Some(pc.wrapping_add(4))
            }
        }
    }

    fn exec_multiply(&mut self, word: u32, pc: u32) -> u32 {
        let rd = ((word >> 16) & 0xF) as usize;
        let rn = (word >> 12) & 0xF;
        let rs = (word >> 8) & 0xF;
        let rm = word & 0xF;

        let mut result = self.operand(rm, pc).wrapping_mul(self.operand(rs, pc));
        if word & (1 << 21) != 0 {
            result = result.wrapping_add(self.operand(rn, pc));
        }
        if word & (1 << 20) != 0 {
            self.set_nz(result);
        }
        self.regs[rd] = result;

        pc.wrapping_add(4)
    }

    /// Executes `ldr`, `str`, `ldrb`, `strb`.
    ///
    /// This returns `Ok(None)` if the word is not a supported load/store.
    fn exec_load_store(&mut self, word: u32, pc: u32, hooks: &mut dyn Hooks) -> Result<Option<u32>, EngineFault> {
        let reg_offset = word & (1 << 25) != 0;
        if reg_offset && word & 0x10 != 0 { return Ok(None) };

        let pre = word & (1 << 24) != 0;
        let up = word & (1 << 23) != 0;
        let byte = word & (1 << 22) != 0;
        let writeback = word & (1 << 21) != 0;
        let load = word & (1 << 20) != 0;
        let rn = (word >> 16) & 0xF;
        let rd = (word >> 12) & 0xF;

        let offset = match reg_offset {
            true  => self.shift_imm(self.operand(word & 0xF, pc), (word >> 5) & 0b11, (word >> 7) & 0x1F).0,
            false => word & 0xFFF,
        };
        let base = self.operand(rn, pc);
        let offset_addr = match up {
            true  => base.wrapping_add(offset),
            false => base.wrapping_sub(offset),
        };
        let addr = if pre { offset_addr } else { base };

        let mut next = pc.wrapping_add(4);
        if load {
            let value = match byte {
                true => {
                    let mut buf = [0];
                    self.mem_read(addr, &mut buf)?;
                    hooks.on_mem_read(addr, &buf);
                    u32::from(buf[0])
                },
                false => {
                    let value = self.read_word(addr)?;
                    hooks.on_mem_read(addr, &value.to_le_bytes());
                    value
                }
            };
            if (!pre || writeback) && rn != 15 {
                self.regs[rn as usize] = offset_addr;
            }
            match rd {
                15 => next = value & !3,
                rd => self.regs[rd as usize] = value,
            }
        } else {
            let value = self.operand(rd, pc);
            let bytes = value.to_le_bytes();
            let data = if byte { &bytes[..1] } else { &bytes[..] };
            self.mem_write(addr, data)?;
            hooks.on_mem_write(addr, data);
            if (!pre || writeback) && rn != 15 {
                self.regs[rn as usize] = offset_addr;
            }
        }

        Ok(Some(next))
    }

    /// Executes `ldm`/`stm` (which includes `push` and `pop`).
    ///
    /// This returns `Ok(None)` if the word is not a supported block transfer.
    fn exec_block_transfer(&mut self, word: u32, pc: u32, hooks: &mut dyn Hooks) -> Result<Option<u32>, EngineFault> {
        // user-bank transfers
        if word & (1 << 22) != 0 { return Ok(None) };

        let pre = word & (1 << 24) != 0;
        let up = word & (1 << 23) != 0;
        let writeback = word & (1 << 21) != 0;
        let load = word & (1 << 20) != 0;
        let rn = (word >> 16) & 0xF;
        let list = word & 0xFFFF;
        if list == 0 || rn == 15 { return Ok(None) };

        let base = self.regs[rn as usize];
        let size = 4 * list.count_ones();
        let start = match (pre, up) {
            (false, true)  => base,
            (true, true)   => base.wrapping_add(4),
            (false, false) => base.wrapping_sub(size).wrapping_add(4),
            (true, false)  => base.wrapping_sub(size),
        };
        let final_base = match up {
            true  => base.wrapping_add(size),
            false => base.wrapping_sub(size),
        };

        let regs = (0..16).filter(|r| list & (1 << r) != 0);
        let mut next = pc.wrapping_add(4);
        if load {
            if writeback {
                self.regs[rn as usize] = final_base;
            }
            for (i, r) in regs.enumerate() {
                let addr = start.wrapping_add(4 * i as u32);
                let value = self.read_word(addr)?;
                hooks.on_mem_read(addr, &value.to_le_bytes());
                match r {
                    15 => next = value & !3,
                    r  => self.regs[r as usize] = value,
                }
            }
        } else {
            for (i, r) in regs.enumerate() {
                let addr = start.wrapping_add(4 * i as u32);
                let bytes = self.operand(r, pc).to_le_bytes();
                self.mem_write(addr, &bytes)?;
                hooks.on_mem_write(addr, &bytes);
            }
            if writeback {
                self.regs[rn as usize] = final_base;
            }
        }

        Ok(Some(next))
    }
}

/// Computes `x + y + carry_in`, returning the result and the `(carry, overflow)` flags.
fn add_with_carry(x: u32, y: u32, carry_in: u32) -> (u32, Option<(bool, bool)>) {
    let unsigned = u64::from(x) + u64::from(y) + u64::from(carry_in);
    let signed = i64::from(x as i32) + i64::from(y as i32) + i64::from(carry_in);
    let result = unsigned as u32;

    (result, Some((unsigned >> 32 != 0, i64::from(result as i32) != signed)))
}

impl Machine for Interpreter {
    fn reg_read(&self, reg: RegId) -> u32 {
        self.core.reg_read(reg)
    }

    fn reg_write(&mut self, reg: RegId, value: u32) {
        self.core.reg_write(reg, value)
    }

    fn mem_read(&self, addr: u32, buf: &mut [u8]) -> Result<(), EngineFault> {
        self.core.mem_read(addr, buf)
    }

    fn mem_write(&mut self, addr: u32, data: &[u8]) -> Result<(), EngineFault> {
        self.core.mem_write(addr, data)
    }
}

impl Engine for Interpreter {
    fn new(memory_size: u32) -> Self {
        Self {
            core: Core {
                regs: [0; 16],
                cpsr: CPSR_RESET,
                mem: vec![0; memory_size as usize],
            },
            watched: HashSet::new(),
        }
    }

    fn watch_address(&mut self, addr: u32) {
        self.watched.insert(addr);
    }

    fn start(&mut self, begin: u32, until: u32, count: usize, hooks: &mut dyn Hooks) -> Result<u32, EngineFault> {
        let mut pc = begin;
        let mut executed = 0;

        while pc != until {
            let mut action = hooks.on_instruction(&mut self.core, pc);
            if action == HookAction::Continue && self.watched.contains(&pc) {
                action = hooks.on_watched(&mut self.core, pc);
            }

            pc = match action {
                HookAction::Stop => break,
                HookAction::Resume(addr) => addr,
                HookAction::Continue => self.core.step(pc, hooks)?,
            };
            self.core.regs[15] = pc;

            executed += 1;
            if count != 0 && executed >= count { break };
        }

        Ok(pc)
    }
}
