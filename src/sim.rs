//! Simulating execution of assembled A32 code.
//!
//! This module is focused on loading programs from source and driving an [`Engine`] over them.
//!
//! This module consists of:
//! - [`Simulator`]: The struct that loads and simulates programs.
//! - [`mem`]: The module handling memory and registers.
//! - [`cpu`]: The module which drives the engine and tracks the run state.
//! - [`syscall`]: The module holding the software-simulated system calls.
//! - [`lines`]: The module correlating addresses with source lines.
//! - [`io`]: The module handling where system calls print to.
//!
//! # Usage
//!
//! To simulate some code, you need to instantiate a Simulator and load a program into it:
//!
//! ```
//! use armsim_harness::ast::reg_consts::R0;
//! use armsim_harness::sim::{Simulator, SimConfig};
//!
//! let mut sim = Simulator::new(SimConfig::default());
//! sim.set_program("mov r0, #5\nmov r1, #10\nadd r0, r0, r1").unwrap();
//! sim.run().unwrap();
//!
//! assert_eq!(sim.register_value(R0), 15);
//! assert!(sim.has_finished());
//! ```
//!
//! ## Configuration
//!
//! Here, we define `sim` to have the default configuration.
//! We could also configure where programs are loaded by editing the configuration:
//!
//! ```
//! # use armsim_harness::sim::{Simulator, SimConfig};
//! let mut sim = Simulator::new(SimConfig { start_address: 0x8000, ..Default::default() });
//! ```
//!
//! All of the available options can be found in [`SimConfig`].
//!
//! ## Execution
//!
//! Beyond [`Simulator::run`] (which runs until the end of the program),
//! there is also [`Simulator::run_step`], which executes one instruction at a time:
//!
//! ```
//! use armsim_harness::sim::{Simulator, SimConfig};
//!
//! let mut sim = Simulator::new(SimConfig::default());
//! sim.set_program("mov r0, #1\nmov r1, #2\nadd r2, r0, r1").unwrap();
//!
//! assert_eq!(sim.current_line(), 1);
//! sim.run_step().unwrap();
//! assert_eq!(sim.current_line(), 2);
//! sim.run_step().unwrap();
//! assert_eq!(sim.current_line(), 3);
//! ```
//!
//! Execution stops early if the simulator reaches a word which is all zeroes,
//! which is treated as the end of the program.
//!
//! A run can be stopped from another thread through an [`Interrupter`]
//! (see [`Simulator::interrupter`]).
//!
//! ## System calls
//!
//! Programs can call the routines in [`syscall`] either with `svc #K`
//! or by branching with link to the routine's trampoline address.
//! Their output goes to the simulator's [`Console`].

pub mod mem;
pub mod cpu;
pub mod syscall;
pub mod lines;
pub mod io;

use std::borrow::Cow;
use std::ops::Range;

use crate::asm::{A32Assembler, AsmErr, Assembler};
use crate::ast::Reg;
use crate::engine::{Engine, EngineFault, FaultKind, Interpreter};

pub use self::cpu::Interrupter;
use self::cpu::Cpu;
use self::io::Console;
use self::lines::AddressLineMap;
use self::mem::MemoryModel;

/// Errors that can occur while loading or simulating a program.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum SimErr {
    /// A line of the program failed to assemble.
    Assembly {
        /// The (1-based) line which failed to assemble.
        line: usize,
        /// The error raised by the assembler.
        err: AsmErr
    },
    /// The program failed to assemble, but the failure could not be traced to a single line
    /// (e.g., labels defined twice).
    Load(AsmErr),
    /// The engine faulted while executing.
    Runtime(RuntimeFault),
}
impl std::fmt::Display for SimErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimErr::Assembly { line, err } => write!(f, "line {line}: {err}"),
            SimErr::Load(err)              => write!(f, "could not load program: {err}"),
            SimErr::Runtime(fault)         => fault.fmt(f),
        }
    }
}
impl std::error::Error for SimErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimErr::Assembly { err, .. } => Some(err),
            SimErr::Load(err)            => Some(err),
            SimErr::Runtime(fault)       => Some(fault),
        }
    }
}
impl crate::err::Error for SimErr {
    fn help(&self) -> Option<Cow<str>> {
        use crate::err::Error;

        match self {
            SimErr::Assembly { err, .. } => err.help(),
            SimErr::Load(err)            => err.help(),
            SimErr::Runtime(fault)       => match fault.reason {
                FaultKind::UndefinedInstruction(_) => Some("execution may have run into data, check that every path of the program ends".into()),
                FaultKind::UnmappedAccess(_)       => Some("this address is outside of the simulated memory".into()),
                FaultKind::UnhandledSupervisorCall(_) => {
                    let supported: Vec<_> = syscall::SYSCALLS.iter()
                        .map(|call| format!("{:#04X} ({})", call.number, call.name))
                        .collect();
                    Some(format!("the supported supervisor calls are {}", supported.join(", ")).into())
                },
            }
        }
    }
}

/// A fault which aborted a run.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct RuntimeFault {
    /// The address the engine reported the fault at.
    pub address: u32,
    /// The program counter when the fault occurred.
    pub pc: u32,
    /// The source line of the program counter (or 0 if it is not in the program).
    pub line: usize,
    /// What went wrong.
    pub reason: FaultKind,
}
impl std::fmt::Display for RuntimeFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ Instruction [Address={:#x}, Line={}]", self.reason, self.pc, self.line)
    }
}
impl std::error::Error for RuntimeFault {}

/// Configuration for the simulator.
///
/// These are fixed when the [`Simulator`] is created and survive [`Simulator::reset_state`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SimConfig {
    /// The address programs are loaded at (and where execution starts).
    ///
    /// By default, this is `0x1000`.
    pub start_address: u32,

    /// The size of the memory region (mapped at address 0).
    ///
    /// By default, this is 2 MiB.
    pub memory_size: u32,

    /// The address of the first system call trampoline.
    ///
    /// By default, this is `0xFF00`.
    pub trampoline_base: u32,
}
impl Default for SimConfig {
    fn default() -> Self {
        Self {
            start_address: 0x1000,
            memory_size: 2 * 1024 * 1024,
            trampoline_base: 0xFF00,
        }
    }
}

/// A view of the condition flags of the status register.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct Flags(u32);
impl Flags {
    /// Decodes the flags from the value of the status register.
    pub fn from_cpsr(cpsr: u32) -> Self {
        Flags(cpsr)
    }

    fn bit(self, n: u32) -> bool {
        (self.0 >> n) & 1 != 0
    }
    /// The negative flag (N).
    pub fn negative(self) -> bool {
        self.bit(31)
    }
    /// The zero flag (Z).
    pub fn zero(self) -> bool {
        self.bit(30)
    }
    /// The carry flag (C).
    pub fn carry(self) -> bool {
        self.bit(29)
    }
    /// The overflow flag (V).
    pub fn overflow(self) -> bool {
        self.bit(28)
    }
    /// The saturation flag (Q).
    pub fn saturation(self) -> bool {
        self.bit(27)
    }
}

/// Executes A32 programs.
///
/// A `Simulator` is built from an [`Engine`] (which executes instructions)
/// and an [`Assembler`] (which turns source into machine code).
/// By default, these are [`Interpreter`] and [`A32Assembler`].
///
/// All mutation goes through `&mut self`, so the simulator cannot be mutated from two threads at once.
/// The only exception is stopping a run, which can be done through an [`Interrupter`].
#[derive(Debug)]
pub struct Simulator<E = Interpreter, A = A32Assembler> {
    config: SimConfig,
    assembler: A,
    mem: MemoryModel,
    cpu: Cpu<E>,
    line_map: AddressLineMap,
    program: Range<u32>,
}

impl Simulator {
    /// Creates a new simulator with the default engine and assembler.
    pub fn new(config: SimConfig) -> Self {
        Self::with_assembler(config, A32Assembler)
    }
}
impl<E: Engine, A: Assembler> Simulator<E, A> {
    /// Creates a new simulator which uses the given assembler to load programs.
    pub fn with_assembler(config: SimConfig, assembler: A) -> Self {
        let mut mem = MemoryModel::new(config.memory_size);
        let cpu = Cpu::new(&config, &mut mem, Console::default(), Interrupter::new());
        let start = config.start_address;

        Self {
            config,
            assembler,
            mem,
            cpu,
            line_map: AddressLineMap::default(),
            program: start..start,
        }
    }

    /// Loads a program from source.
    ///
    /// The program is assembled and written into memory at the start address,
    /// and its address line map is rebuilt.
    /// This does not move the program counter.
    ///
    /// If the program fails to assemble, memory is not modified.
    pub fn set_program(&mut self, src: &str) -> Result<(), SimErr> {
        let src = normalize_lines(src);
        let start = self.config.start_address;

        let bytes = match self.assembler.assemble(&src, start) {
            Ok(bytes) => bytes,
            Err(err) => {
                // the line map is assembled line by line, so it can point out which line failed
                let located = AddressLineMap::build(&self.assembler, &src, start).err();
                return Err(located.unwrap_or(SimErr::Load(err)));
            }
        };
        let line_map = AddressLineMap::build(&self.assembler, &src, start)?;

        self.mem.set_bytes(start, &bytes);
        let end = start.wrapping_add(bytes.len() as u32);
        self.cpu.set_end_address(end);
        self.program = start..end;
        self.line_map = line_map;

        tracing::debug!("loaded {} bytes of program at {start:#010X}", bytes.len());
        Ok(())
    }

    fn check_fault(&self, result: Result<(), EngineFault>) -> Result<(), SimErr> {
        result.map_err(|e| {
            let pc = self.cpu.pc();
            let fault = RuntimeFault {
                address: e.address,
                pc,
                line: self.line_map.line_of(pc),
                reason: e.kind,
            };

            tracing::error!("[ERROR] {fault}");
            tracing::error!("[ERROR] EMULATION ABORTED!");
            SimErr::Runtime(fault)
        })
    }

    /// Runs from the program counter until the end of the program.
    ///
    /// This stops early at an empty word or when interrupted.
    /// Once this returns, the simulator is considered finished.
    ///
    /// If the engine faults, the run is aborted and the fault is returned.
    pub fn run(&mut self) -> Result<(), SimErr> {
        let result = self.cpu.run_to_completion(&mut self.mem);
        self.check_fault(result)
    }

    /// Executes a single instruction.
    ///
    /// If the engine faults, the fault is returned and the simulator is considered finished.
    pub fn run_step(&mut self) -> Result<(), SimErr> {
        let result = self.cpu.run_single_step(&mut self.mem);
        self.check_fault(result)
    }

    /// Moves the program counter back to the start address.
    ///
    /// Memory and other registers are untouched.
    pub fn reset_run(&mut self) {
        self.cpu.reset_pc();
    }

    /// Discards memory and the engine, replacing them with fresh ones.
    ///
    /// The loaded program is discarded along with memory.
    /// The configuration, console, and interrupter are kept.
    pub fn reset_state(&mut self) {
        let console = self.cpu.console().clone();
        let interrupter = self.cpu.interrupter().clone();
        let start = self.config.start_address;

        self.mem = MemoryModel::new(self.config.memory_size);
        self.cpu = Cpu::new(&self.config, &mut self.mem, console, interrupter);
        self.line_map = AddressLineMap::default();
        self.program = start..start;
    }

    /// Reads a register.
    ///
    /// The program counter (`pc`) is the address of the next instruction to execute.
    pub fn register_value(&self, reg: Reg) -> u32 {
        self.cpu.register(reg)
    }
    /// Writes a register.
    pub fn set_register_value(&mut self, reg: Reg, value: u32) {
        self.cpu.set_register(reg, value);
    }

    /// Reads a byte from memory.
    pub fn ram_byte(&self, addr: u32) -> u8 {
        self.mem.get_byte(addr)
    }
    /// Reads a half-word from memory.
    pub fn ram_half_word(&self, addr: u32) -> u16 {
        self.mem.get_half_word(addr)
    }
    /// Reads a word from memory.
    pub fn ram_word(&self, addr: u32) -> u32 {
        self.mem.get_word(addr)
    }
    /// The memory of the simulator.
    pub fn mem(&self) -> &MemoryModel {
        &self.mem
    }

    /// The condition flags.
    pub fn flags(&self) -> Flags {
        Flags::from_cpsr(self.cpu.cpsr())
    }
    /// The negative flag.
    pub fn n(&self) -> bool {
        self.flags().negative()
    }
    /// The zero flag.
    pub fn z(&self) -> bool {
        self.flags().zero()
    }
    /// The carry flag.
    pub fn c(&self) -> bool {
        self.flags().carry()
    }
    /// The overflow flag.
    pub fn v(&self) -> bool {
        self.flags().overflow()
    }
    /// The saturation flag.
    pub fn q(&self) -> bool {
        self.flags().saturation()
    }

    /// Whether the simulator is currently running.
    pub fn is_running(&self) -> bool {
        self.cpu.is_running()
    }
    /// Whether the last run completed (or was aborted).
    pub fn has_finished(&self) -> bool {
        self.cpu.has_finished()
    }

    /// The source line of the instruction the program counter points to,
    /// or 0 if the program counter is not in the program.
    pub fn current_line(&self) -> usize {
        self.line_map.line_of(self.cpu.pc())
    }

    /// Requests that the current run stop at the next instruction.
    ///
    /// Since this requires `&mut self`, it cannot be called while a run is in progress
    /// on another thread. Use [`Simulator::interrupter`] for that instead.
    /// A request made while idle is discarded when the next run or step begins.
    pub fn interrupt_execution_flow(&mut self) {
        self.cpu.interrupter().interrupt();
    }
    /// Gets a handle which can interrupt runs from another thread.
    pub fn interrupter(&self) -> Interrupter {
        self.cpu.interrupter().clone()
    }

    /// The console system calls print to.
    pub fn console(&self) -> &Console {
        self.cpu.console()
    }
    /// Replaces the console system calls print to.
    pub fn set_console(&mut self, console: impl Into<Console>) {
        self.cpu.set_console(console.into());
    }

    /// The range of addresses the loaded program occupies.
    pub fn program_range(&self) -> Range<u32> {
        self.program.clone()
    }
    /// The address line map of the loaded program.
    pub fn line_map(&self) -> &AddressLineMap {
        &self.line_map
    }
    /// The configuration of this simulator.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }
}

/// Replaces every line ending (`\r\n`, `\r`, or `\n`) with `;`.
fn normalize_lines(src: &str) -> String {
    src.replace("\r\n", ";")
        .replace(['\r', '\n'], ";")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use crate::asm::AsmErrKind;
    use crate::ast::reg_consts::{PC, R0, R1, R2, R3, R5, SP};
    use crate::ast::Reg;
    use crate::engine::FaultKind;

    use super::io::BufferedConsole;
    use super::*;

    fn init_logging() {
        // set RUST_LOG to see simulator logs
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn load(src: &str) -> Simulator {
        init_logging();
        let mut sim = Simulator::new(SimConfig::default());
        sim.set_console(BufferedConsole::new());
        sim.set_program(src).unwrap();
        sim
    }

    #[test]
    fn test_basic_run() {
        let mut sim = load("mov r0, #5;mov r1, #10;add r0, r0, r1;");
        assert!(!sim.has_finished());
        assert!(!sim.is_running());

        sim.run().unwrap();
        assert_eq!(sim.register_value(R0), 15);
        assert!(sim.has_finished());
        assert!(!sim.is_running());
        assert_eq!(sim.register_value(PC), 0x100C);
    }

    #[test]
    fn test_line_endings() {
        let sim = load("mov r0, #5\r\nmov r1, #10\radd r0, r0, r1\n");
        assert_eq!(sim.line_map().iter().collect::<Vec<_>>(), [(0x1000, 1), (0x1004, 2), (0x1008, 3)]);
        assert_eq!(sim.program_range(), 0x1000..0x100C);

        assert_eq!(normalize_lines("a\r\nb\n\rc\r\n"), "a;b;;c;");
    }

    #[test]
    fn test_reset_run() {
        let mut sim = load("mov r1, #0x4000\nmov r0, #7\nstr r0, [r1]");
        sim.run().unwrap();
        assert_eq!(sim.ram_word(0x4000), 7);
        assert_eq!(sim.current_line(), 0);

        sim.reset_run();
        assert_eq!(sim.current_line(), 1);
        assert_eq!(sim.register_value(PC), 0x1000);
        assert_eq!(sim.ram_word(0x4000), 7);
        assert_eq!(sim.register_value(R0), 7);

        // and it can run again
        sim.run().unwrap();
        assert_eq!(sim.register_value(PC), 0x100C);

        // registers written from outside are seen by the next run
        sim.reset_run();
        sim.set_register_value(PC, 0x1004);
        sim.set_register_value(R1, 0x4002);
        assert_eq!(sim.current_line(), 2);
        sim.run().unwrap();
        assert_eq!(sim.register_value(R1), 0x4002);
        assert_eq!(sim.ram_word(0x4000), 0x0007_0007);
        assert_eq!(sim.ram_half_word(0x4002), 7);
        assert_eq!(sim.ram_byte(0x4001), 0);
        assert_eq!(sim.ram_byte(0x4002), 7);
    }

    #[test]
    fn test_sentinel_halt() {
        let mut sim = load("mov r0, #1\n.word 0\nmov r0, #2");
        sim.run().unwrap();

        assert!(sim.has_finished());
        assert!(!sim.is_running());
        assert_eq!(sim.register_value(PC), 0x1004);
        assert_eq!(sim.register_value(R0), 1);
        assert_eq!(sim.current_line(), 2);

        // jumping into unloaded memory also halts
        let mut sim = load("mov r0, #1\nb 0x2000");
        sim.run().unwrap();
        assert!(sim.has_finished());
        assert_eq!(sim.register_value(PC), 0x2000);
        assert_eq!(sim.current_line(), 0);
    }

    #[test]
    fn test_step_run_equivalence() {
        let src = "
            mov sp, #0x10000
            mov r0, #0
            mov r1, #10
            mov r4, #0x4000
        loop:
            add r0, r0, r1
            str r0, [r4], #4
            subs r1, r1, #1
            bne loop
            push {r0, r4}
            bl double
            pop {r2, r3}
            cmp r0, #200
            b done
        double:
            add r0, r0, r0
            bx lr
        done:
            movgt r5, r0
        ";

        let mut run = load(src);
        run.run().unwrap();

        let mut step = load(src);
        let mut steps = 0;
        while step.program_range().contains(&step.register_value(PC)) {
            step.run_step().unwrap();
            steps += 1;
            assert!(steps < 1000, "program did not terminate");
        }

        for i in 0..16 {
            let reg = Reg::try_from(i).unwrap();
            assert_eq!(run.register_value(reg), step.register_value(reg), "{reg} differs");
        }
        assert_eq!(run.flags(), step.flags());
        assert_eq!(run.mem(), step.mem());

        assert_eq!(run.register_value(R0), 110);
        assert_eq!(run.register_value(R2), 55);
        assert_eq!(run.register_value(R3), 0x4028);
        assert_eq!(run.register_value(R5), 0);
        assert_eq!(run.register_value(SP), 0x10000);
        assert_eq!(run.ram_word(0x4024), 55);
        assert!(run.n());
    }

    #[test]
    fn test_flags() {
        let mut sim = load("mov r0, #1\nsubs r0, r0, #1");
        sim.run().unwrap();
        assert!(sim.z());
        assert!(sim.c());
        assert!(!sim.n());
        assert!(!sim.v());
        assert!(!sim.q());

        let mut sim = load("mov r0, #0x80000000\nsubs r0, r0, #1");
        sim.run().unwrap();
        assert!(!sim.z());
        assert!(sim.c());
        assert!(!sim.n());
        assert!(sim.v());

        let flags = Flags::from_cpsr(0xF800_0010);
        assert!(flags.negative() && flags.zero() && flags.carry() && flags.overflow() && flags.saturation());
    }

    #[test]
    fn test_syscalls() {
        let mut sim = Simulator::new(SimConfig::default());
        let out = BufferedConsole::new();
        sim.set_console(out.clone());

        sim.set_program("
            mov r1, #0x4000
            mov r0, #0x48
            orr r0, r0, #0x6900
            orr r0, r0, #0x210000
            orr r0, r0, #0x0A000000
            str r0, [r1]
            mov r0, #0
            str r0, [r1, #4]
            mov r0, #7
            svc #0x04
            mov r2, r0
            mov r0, #7
            add r1, r1, #1
            bl 0xFF00
            mov r3, r0
        ").unwrap();
        sim.run().unwrap();

        assert_eq!(out.contents(), "Hi!\ni");
        assert_eq!(sim.ram_byte(0x4000), b'H');
        assert_eq!(sim.ram_half_word(0x4002), 0x0A21);
        assert_eq!(sim.register_value(R2), 0);
        assert_eq!(sim.register_value(R3), 0);
        assert!(sim.has_finished());
        assert_eq!(sim.register_value(PC), sim.program_range().end);
    }

    #[test]
    fn test_syscall_failure() {
        // remove a file which has an empty name
        let mut sim = load("mov r1, #0x4000\nmov r0, #5\nsvc #0x0E");
        sim.run().unwrap();
        assert_eq!(sim.register_value(R0), -1i32 as u32);
    }

    #[test]
    fn test_runtime_faults() {
        let mut sim = load("mov r0, #1\nsvc #0x7F\nmov r0, #2");
        let err = sim.run().unwrap_err();
        assert_eq!(err, SimErr::Runtime(RuntimeFault {
            address: 0x1004,
            pc: 0x1004,
            line: 2,
            reason: FaultKind::UnhandledSupervisorCall(0x7F),
        }));
        assert!(sim.has_finished());
        assert!(!sim.is_running());
        assert_eq!(sim.register_value(R0), 1);
        assert!(crate::err::Error::help(&err).is_some());

        let mut sim = load("nop\nnop\n.word 0xE7F000F0");
        sim.run_step().unwrap();
        sim.run_step().unwrap();
        assert!(!sim.has_finished());
        let Err(SimErr::Runtime(fault)) = sim.run_step() else { panic!("expected runtime fault") };
        assert_eq!(fault.reason, FaultKind::UndefinedInstruction(0xE7F0_00F0));
        assert_eq!(fault.line, 3);
        assert!(sim.has_finished());
        assert_eq!(
            fault.to_string(),
            "undefined instruction 0xE7F000F0 @ Instruction [Address=0x1008, Line=3]"
        );
    }

    #[test]
    fn test_load_errors() {
        let mut sim = Simulator::new(SimConfig::default());
        let err = sim.set_program("mov r0, #1\nmov r1, #2\nfrob r2").unwrap_err();
        assert!(matches!(err, SimErr::Assembly { line: 3, .. }), "unexpected error {err:?}");
        assert_eq!(sim.ram_word(0x1000), 0);
        assert!(sim.line_map().is_empty());

        // not attributable to any line
        let err = sim.set_program("a: mov r0, #1\na: mov r0, #2").unwrap_err();
        let SimErr::Load(err) = err else { panic!("expected load error, got {err:?}") };
        assert_eq!(err.kind, AsmErrKind::OverlappingLabels);
        assert_eq!(sim.ram_word(0x1000), 0);
    }

    #[test]
    fn test_reset_state() {
        let mut sim = load("mov r0, #1\nsubs r0, r0, #1\nmov r1, #0x4000\nstr r1, [r1]");
        let console = sim.console().clone();
        sim.run().unwrap();
        assert!(sim.z());

        sim.reset_state();
        assert_eq!(sim.register_value(R1), 0);
        assert_eq!(sim.register_value(PC), 0x1000);
        assert_eq!(sim.ram_word(0x4000), 0);
        assert_eq!(sim.ram_word(0x1000), 0);
        assert!(!sim.z());
        assert!(!sim.has_finished());
        assert_eq!(sim.program_range(), 0x1000..0x1000);
        assert_eq!(sim.current_line(), 0);
        assert_eq!(sim.config(), &SimConfig::default());
        assert!(matches!((&console, sim.console()), (Console::Buffered(_), Console::Buffered(_))));

        // trampolines are reinstalled
        assert_eq!(sim.ram_word(0xFF00), crate::asm::encoding::BX_LR);
    }

    #[test]
    fn test_interrupt() {
        let mut sim = load("mov r0, #0\nloop: add r0, r0, #1\nb loop");
        let interrupter = sim.interrupter();
        let done = Arc::new(AtomicBool::new(false));

        let handle = std::thread::spawn({
            let done = Arc::clone(&done);
            move || while !done.load(Ordering::Relaxed) {
                interrupter.interrupt();
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
        });
        sim.run().unwrap();
        done.store(true, Ordering::Relaxed);
        handle.join().unwrap();

        assert!(sim.has_finished());
        assert!(!sim.is_running());
        assert!(sim.program_range().contains(&sim.register_value(PC)));
        assert_ne!(sim.current_line(), 0);
    }

    #[test]
    fn test_idle_interrupt_discarded() {
        let mut sim = load("mov r0, #1\nmov r0, #2\nmov r0, #3");
        sim.interrupt_execution_flow();
        sim.run().unwrap();
        assert_eq!(sim.register_value(R0), 3);
        assert_eq!(sim.register_value(PC), 0x100C);

        sim.reset_run();
        sim.interrupter().interrupt();
        sim.run_step().unwrap();
        sim.run_step().unwrap();
        assert_eq!(sim.register_value(R0), 2);
    }

    #[test]
    fn test_custom_start() {
        let mut sim = Simulator::new(SimConfig { start_address: 0x8000, ..Default::default() });
        sim.set_console(BufferedConsole::new());
        sim.set_program("mov r0, #3\nbl 0xFF0C").unwrap();

        assert_eq!(sim.register_value(PC), 0x8000);
        sim.run().unwrap();
        assert_eq!(sim.register_value(R0), 0);
        assert_eq!(sim.register_value(PC), 0x8008);
        assert_eq!(sim.ram_word(0x8000), 0xE3A0_0003);
    }
}
