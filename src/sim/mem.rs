//! Memory handling for the simulator.
//!
//! This module consists of:
//! - [`MemoryChunk`]: A contiguous run of written memory.
//! - [`MemoryModel`]: The harness-side mirror of the engine's memory.
//! - [`RegisterFile`]: The register file, which keeps its own program counter.

use std::collections::BTreeMap;

use crate::ast::reg_consts::PC;
use crate::ast::Reg;
use crate::engine::{Machine, RegId};

/// A contiguous range of bytes which have been written to.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MemoryChunk {
    start: u32,
    data: Vec<u8>,
}
impl MemoryChunk {
    /// The address of the first byte of this chunk.
    pub fn start(&self) -> u32 {
        self.start
    }
    /// The address just past the last byte of this chunk.
    ///
    /// A chunk may end at the very top of the address space, so this does not fit in a `u32`.
    pub fn end(&self) -> u64 {
        u64::from(self.start) + self.data.len() as u64
    }
    /// The bytes of this chunk.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// The harness's view of memory.
///
/// Memory is stored as a set of [`MemoryChunk`]s, which are created lazily when first written to
/// and which grow as bytes adjacent to them are written.
/// Two chunks never overlap and never touch (touching chunks are merged).
///
/// Addresses are reduced modulo the size of the memory region, so accesses never fail.
/// A size of 0 covers the whole 32-bit address space.
/// Reading a byte that was never written produces 0.
///
/// # Example
/// ```
/// use armsim_harness::sim::mem::MemoryModel;
///
/// let mut mem = MemoryModel::new(0x1000);
/// mem.set_bytes(0x100, &[0x78, 0x56, 0x34, 0x12]);
///
/// assert_eq!(mem.get_word(0x100), 0x1234_5678);
/// assert_eq!(mem.get_half_word(0x102), 0x1234);
/// assert_eq!(mem.get_byte(0x104), 0);
///
/// // addresses wrap around the memory region
/// assert_eq!(mem.get_byte(0x1100), 0x78);
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MemoryModel {
    chunks: BTreeMap<u32, MemoryChunk>,
    size: u32,
}
impl MemoryModel {
    /// Creates an empty memory model covering `size` bytes.
    pub fn new(size: u32) -> Self {
        Self { chunks: BTreeMap::new(), size }
    }

    /// The size of the memory region.
    pub fn size(&self) -> u32 {
        self.size
    }

    fn reduce(&self, addr: u32) -> u32 {
        addr.checked_rem(self.size).unwrap_or(addr)
    }

    /// Gets the chunk containing `addr` (which has already been reduced), if one exists.
    fn chunk_at(&self, addr: u32) -> Option<&MemoryChunk> {
        self.chunks.range(..=addr)
            .next_back()
            .map(|(_, chunk)| chunk)
            .filter(|chunk| u64::from(addr) < chunk.end())
    }

    /// Reads a byte.
    pub fn get_byte(&self, addr: u32) -> u8 {
        let addr = self.reduce(addr);
        self.chunk_at(addr)
            .map_or(0, |chunk| chunk.data[(addr - chunk.start) as usize])
    }

    /// Reads a little-endian half-word.
    pub fn get_half_word(&self, addr: u32) -> u16 {
        u16::from_le_bytes([
            self.get_byte(addr),
            self.get_byte(addr.wrapping_add(1)),
        ])
    }

    /// Reads a little-endian word.
    pub fn get_word(&self, addr: u32) -> u32 {
        u32::from_le_bytes([
            self.get_byte(addr),
            self.get_byte(addr.wrapping_add(1)),
            self.get_byte(addr.wrapping_add(2)),
            self.get_byte(addr.wrapping_add(3)),
        ])
    }

    /// Writes a byte, creating or extending a chunk if necessary.
    pub fn set_byte(&mut self, addr: u32, value: u8) {
        let addr = self.reduce(addr);

        // Chunk which starts at or before this address:
        let extended = match self.chunks.range_mut(..=addr).next_back() {
            Some((_, chunk)) if u64::from(addr) < chunk.end() => {
                chunk.data[(addr - chunk.start) as usize] = value;
                return;
            },
            Some((_, chunk)) if u64::from(addr) == chunk.end() => {
                chunk.data.push(value);
                Some(chunk.start)
            },
            _ => None
        };

        // never merge across the top of the address space
        let after = addr.checked_add(1);

        if let Some(start) = extended {
            // extending may cause this chunk to touch the next one
            if let Some(next) = after.and_then(|a| self.chunks.remove(&a)) {
                if let Some(chunk) = self.chunks.get_mut(&start) {
                    chunk.data.extend(next.data);
                }
            }
            return;
        }

        // Chunk which starts right after this address:
        let data = match after.and_then(|a| self.chunks.remove(&a)) {
            Some(next) => std::iter::once(value).chain(next.data).collect(),
            None => vec![value],
        };
        self.chunks.insert(addr, MemoryChunk { start: addr, data });
    }

    /// Writes a sequence of bytes starting at `addr`.
    pub fn set_bytes(&mut self, addr: u32, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            self.set_byte(addr.wrapping_add(i as u32), byte);
        }
    }

    /// Writes a little-endian word.
    pub fn set_word(&mut self, addr: u32, value: u32) {
        self.set_bytes(addr, &value.to_le_bytes());
    }

    /// Iterates over every chunk, in address order.
    pub fn chunks(&self) -> impl Iterator<Item=&MemoryChunk> + '_ {
        self.chunks.values()
    }
}

/// The register file.
///
/// Registers `r0`-`lr` are held by the engine, so reads and writes are delegated to its register bank.
/// The program counter is held here instead. It is only updated by the simulator
/// (at every instruction boundary, after a run or step, and on reset),
/// so it always points at the instruction that is about to execute.
///
/// # Example
/// ```
/// use armsim_harness::ast::reg_consts::{PC, R0};
/// use armsim_harness::engine::{Engine, Interpreter};
/// use armsim_harness::sim::mem::RegisterFile;
///
/// let mut bank = Interpreter::new(0x100);
/// let mut regs = RegisterFile::new(0x1000);
///
/// regs.set(&mut bank, R0, 11);
/// assert_eq!(regs.get(&bank, R0), 11);
/// assert_eq!(regs.get(&bank, PC), 0x1000);
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct RegisterFile {
    pc: u32,
}
impl RegisterFile {
    /// Creates a register file with the program counter at `pc`.
    pub fn new(pc: u32) -> Self {
        Self { pc }
    }

    /// Reads a register.
    pub fn get(&self, bank: &dyn Machine, reg: Reg) -> u32 {
        match reg {
            PC => self.pc,
            r  => bank.reg_read(RegId::from(r)),
        }
    }

    /// Writes a register.
    pub fn set(&mut self, bank: &mut dyn Machine, reg: Reg, value: u32) {
        match reg {
            PC => self.pc = value,
            r  => bank.reg_write(RegId::from(r), value),
        }
    }

    /// The program counter.
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Sets the program counter.
    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }
}
