//! The adapter between the simulator and its execution engine.
//!
//! The [`Cpu`] owns the engine and drives it. It keeps track of:
//! - the program counter (which is never read back from the engine),
//! - whether a run is in progress and whether the program has finished,
//! - the system call routines and their trampolines.
//!
//! While the engine runs, the `Cpu` observes every instruction boundary and every memory access
//! and uses them to keep the [`MemoryModel`] consistent with the engine's memory.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::ast::Reg;
use crate::engine::{Engine, EngineFault, FaultKind, HookAction, Hooks, Machine, RegId};

use super::io::Console;
use super::mem::{MemoryModel, RegisterFile};
use super::syscall::{SyscallCtx, SyscallRegistry};
use super::SimConfig;

/// A handle which can stop a running simulation from another thread.
///
/// The simulation stops at the next instruction boundary after [`Interrupter::interrupt`] is called.
/// An interrupt requested while nothing is running is discarded once the next run begins.
///
/// # Example
/// ```
/// use armsim_harness::sim::{Simulator, SimConfig};
///
/// let sim = Simulator::new(SimConfig::default());
/// let interrupter = sim.interrupter();
///
/// std::thread::spawn(move || interrupter.interrupt());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Interrupter(Arc<AtomicBool>);
impl Interrupter {
    /// Creates a new interrupter.
    pub fn new() -> Self {
        Default::default()
    }

    /// Requests that the simulation stop.
    pub fn interrupt(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether an interrupt was requested and not yet handled.
    pub fn is_pending(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    /// Clears the request, returning whether there was one.
    fn take(&self) -> bool {
        self.0.swap(false, Ordering::Relaxed)
    }
}

/// The execution engine adapter.
///
/// Its states are idle, running, and finished.
/// It starts idle and not finished.
#[derive(Debug)]
pub struct Cpu<E> {
    engine: E,
    regs: RegisterFile,
    syscalls: SyscallRegistry,
    console: Console,
    interrupter: Interrupter,

    start_address: u32,
    end_address: u32,
    running: bool,
    finished: bool,
}

impl<E: Engine> Cpu<E> {
    /// Creates a new engine, installing the system call routines into it and into memory.
    pub fn new(config: &SimConfig, mem: &mut MemoryModel, console: Console, interrupter: Interrupter) -> Self {
        let mut engine = E::new(config.memory_size);
        let syscalls = SyscallRegistry::install(config.trampoline_base, mem);
        for (addr, _) in syscalls.trampolines() {
            engine.watch_address(addr);
        }

        Self {
            engine,
            regs: RegisterFile::new(config.start_address),
            syscalls,
            console,
            interrupter,
            start_address: config.start_address,
            end_address: config.start_address,
            running: false,
            finished: false,
        }
    }

    /// Copies every chunk of the memory model into the engine's memory.
    fn sync_memory(&mut self, mem: &MemoryModel) -> Result<(), EngineFault> {
        for chunk in mem.chunks() {
            self.engine.mem_write(chunk.start(), chunk.data())?;
        }
        Ok(())
    }

    /// Mirrors memory into the engine, then executes with the CPU's callbacks installed.
    fn execute(&mut self, mem: &mut MemoryModel, begin: u32, until: u32, count: usize) -> Result<u32, EngineFault> {
        self.sync_memory(mem)?;

        let Self { engine, regs, syscalls, console, interrupter, running, finished, .. } = self;
        let mut hooks = CpuHooks { mem, regs, syscalls, console, interrupter, running, finished };
        engine.start(begin, until, count, &mut hooks)
    }

    /// Runs from the program counter until the end of the program.
    ///
    /// This also stops early at an empty (all zero) word, or when interrupted.
    /// Afterwards, the program counter points to the next instruction to execute.
    ///
    /// If the engine faults, the program counter is left at the faulting instruction.
    /// In any case, the simulation is considered finished once this returns.
    pub fn run_to_completion(&mut self, mem: &mut MemoryModel) -> Result<(), EngineFault> {
        self.interrupter.clear();
        self.running = true;
        self.finished = false;

        let (pc, end) = (self.regs.pc(), self.end_address);
        let result = self.execute(mem, pc, end, 0);

        self.running = false;
        self.finished = true;
        self.regs.set_pc(result?);
        Ok(())
    }

    /// Executes the instruction at the program counter.
    ///
    /// Afterwards, the program counter points to the next instruction to execute
    /// (the one after it, or the target of a taken branch).
    /// If the instruction is an empty word, nothing is executed and the simulation finishes.
    pub fn run_single_step(&mut self, mem: &mut MemoryModel) -> Result<(), EngineFault> {
        self.interrupter.clear();
        self.running = true;
        self.finished = false;

        let pc = self.regs.pc();
        let result = self.execute(mem, pc, pc.wrapping_add(4), 1);

        self.running = false;
        match result {
            Ok(resume) => {
                self.regs.set_pc(resume);
                Ok(())
            },
            Err(e) => {
                self.finished = true;
                Err(e)
            }
        }
    }

    /// Reads a register (`r0`-`pc`).
    pub fn register(&self, reg: Reg) -> u32 {
        self.regs.get(&self.engine, reg)
    }
    /// Writes a register (`r0`-`pc`).
    pub fn set_register(&mut self, reg: Reg, value: u32) {
        self.regs.set(&mut self.engine, reg, value);
    }
    /// The program counter.
    pub fn pc(&self) -> u32 {
        self.regs.pc()
    }
    /// Moves the program counter back to the start address.
    pub fn reset_pc(&mut self) {
        self.regs.set_pc(self.start_address);
    }
    /// The engine's current program status register.
    pub fn cpsr(&self) -> u32 {
        self.engine.reg_read(RegId::Cpsr)
    }

    /// The address where a run to completion stops.
    pub fn end_address(&self) -> u32 {
        self.end_address
    }
    /// Sets the address where a run to completion stops.
    pub fn set_end_address(&mut self, end: u32) {
        self.end_address = end;
    }

    /// Whether the engine is currently executing.
    pub fn is_running(&self) -> bool {
        self.running && !self.finished
    }
    /// Whether the last run completed (or was aborted).
    pub fn has_finished(&self) -> bool {
        self.finished
    }

    /// The console system calls print to.
    pub fn console(&self) -> &Console {
        &self.console
    }
    /// Replaces the console system calls print to.
    pub fn set_console(&mut self, console: Console) {
        self.console = console;
    }
    /// The interrupter which stops this CPU.
    pub fn interrupter(&self) -> &Interrupter {
        &self.interrupter
    }
}

/// The callbacks the engine calls into while the CPU runs.
struct CpuHooks<'a> {
    mem: &'a mut MemoryModel,
    regs: &'a mut RegisterFile,
    syscalls: &'a SyscallRegistry,
    console: &'a Console,
    interrupter: &'a Interrupter,
    running: &'a mut bool,
    finished: &'a mut bool,
}
impl Hooks for CpuHooks<'_> {
    fn on_instruction(&mut self, _m: &mut dyn Machine, addr: u32) -> HookAction {
        self.regs.set_pc(addr);

        // trampolines are handled by their own callback
        if self.syscalls.is_trampoline(addr) {
            return HookAction::Continue;
        }

        if self.mem.get_word(addr) == 0 {
            tracing::info!("reached empty word at {addr:#010X}, halting");
            *self.finished = true;
            *self.running = false;
            return HookAction::Stop;
        }

        if self.interrupter.take() {
            tracing::info!("execution interrupted at {addr:#010X}");
            return HookAction::Stop;
        }

        HookAction::Continue
    }

    fn on_watched(&mut self, m: &mut dyn Machine, addr: u32) -> HookAction {
        let mut ctx = SyscallCtx { machine: &mut *m, mem: &mut *self.mem, console: self.console };
        match self.syscalls.call_trampoline(addr, &mut ctx) {
            Some(()) => HookAction::Resume(m.reg_read(RegId::Lr)),
            None => HookAction::Continue,
        }
    }

    fn on_mem_read(&mut self, addr: u32, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            let a = addr.wrapping_add(i as u32);
            if self.mem.get_byte(a) != byte {
                self.mem.set_byte(a, byte);
            }
        }
    }

    fn on_mem_write(&mut self, addr: u32, data: &[u8]) {
        self.mem.set_bytes(addr, data);
    }

    fn on_supervisor_call(&mut self, m: &mut dyn Machine, number: u32) -> Result<(), FaultKind> {
        let mut ctx = SyscallCtx { machine: m, mem: &mut *self.mem, console: self.console };
        self.syscalls.call_number(number, &mut ctx)
            .ok_or(FaultKind::UnhandledSupervisorCall(number))
    }
}
