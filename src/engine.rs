//! The execution engine contract.
//!
//! The simulator does not execute instructions itself. It delegates to an [`Engine`],
//! which owns the CPU register bank and a flat memory region, and which reports back
//! to the simulator through the callbacks of a [`Hooks`] implementation:
//!
//! | callback                         | fires                                                  |
//! |----------------------------------|--------------------------------------------------------|
//! | [`Hooks::on_instruction`]        | before every instruction                               |
//! | [`Hooks::on_watched`]            | before executing an address registered with [`Engine::watch_address`] |
//! | [`Hooks::on_mem_read`]           | after every data load                                  |
//! | [`Hooks::on_mem_write`]          | after every data store                                 |
//! | [`Hooks::on_supervisor_call`]    | when an `svc` instruction executes                     |
//!
//! Callbacks steer the engine by returning a [`HookAction`].
//!
//! This crate provides [`Interpreter`], a reference engine for the A32 subset
//! accepted by [`A32Assembler`](crate::asm::A32Assembler).

pub mod interp;

pub use interp::Interpreter;

/// A symbolic register identifier.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
#[allow(missing_docs)]
pub enum RegId {
    R0, R1, R2, R3, R4, R5, R6, R7, R8, R9, R10, R11, R12,
    Sp, Lr, Pc,
    /// The current program status register.
    Cpsr,
}
impl RegId {
    /// Gets the identifier of a core register from its index (0-15).
    pub fn from_index(index: u8) -> Option<Self> {
        const CORE: [RegId; 16] = [
            RegId::R0, RegId::R1, RegId::R2, RegId::R3,
            RegId::R4, RegId::R5, RegId::R6, RegId::R7,
            RegId::R8, RegId::R9, RegId::R10, RegId::R11,
            RegId::R12, RegId::Sp, RegId::Lr, RegId::Pc,
        ];
        CORE.get(usize::from(index)).copied()
    }

    /// The core register index (0-15) of this identifier, or `None` for the status register.
    pub fn index(self) -> Option<usize> {
        match self {
            RegId::Cpsr => None,
            r => Some(r as usize)
        }
    }
}
impl From<crate::ast::Reg> for RegId {
    fn from(value: crate::ast::Reg) -> Self {
        // Reg is always 0-15
        RegId::from_index(value.reg_no()).unwrap_or(RegId::Pc)
    }
}

/// What the engine should do after a callback returns.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub enum HookAction {
    /// Proceed as normal.
    #[default]
    Continue,
    /// Stop before executing the current instruction.
    ///
    /// The engine reports the current instruction's address as the resume address.
    Stop,
    /// Skip the current instruction and continue execution from the given address.
    Resume(u32),
}

/// The kind of fault an engine raised.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum FaultKind {
    /// The word does not decode to a supported instruction.
    UndefinedInstruction(u32),
    /// An access fell outside of the mapped memory region.
    UnmappedAccess(u32),
    /// A supervisor call has no handler.
    UnhandledSupervisorCall(u32),
}
impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultKind::UndefinedInstruction(w)    => write!(f, "undefined instruction {w:#010X}"),
            FaultKind::UnmappedAccess(a)          => write!(f, "access of unmapped memory at {a:#010X}"),
            FaultKind::UnhandledSupervisorCall(n) => write!(f, "unhandled supervisor call {n:#X}"),
        }
    }
}

/// A fault raised by the engine, which aborts execution.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct EngineFault {
    /// The address of the instruction which faulted.
    pub address: u32,
    /// The kind of fault.
    pub kind: FaultKind,
}
impl std::fmt::Display for EngineFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (at {:#010X})", self.kind, self.address)
    }
}
impl std::error::Error for EngineFault {}

/// Register and memory access to the machine an engine runs.
///
/// This is the view that callbacks receive while execution is suspended.
pub trait Machine {
    /// Reads a register.
    fn reg_read(&self, reg: RegId) -> u32;
    /// Writes a register.
    fn reg_write(&mut self, reg: RegId, value: u32);
    /// Reads `buf.len()` bytes starting at `addr`.
    fn mem_read(&self, addr: u32, buf: &mut [u8]) -> Result<(), EngineFault>;
    /// Writes `data` starting at `addr`.
    fn mem_write(&mut self, addr: u32, data: &[u8]) -> Result<(), EngineFault>;
}

/// A CPU emulation engine.
pub trait Engine: Machine {
    /// Creates a new engine with a zeroed memory region of `memory_size` bytes mapped at address 0.
    fn new(memory_size: u32) -> Self where Self: Sized;

    /// Registers an address for which [`Hooks::on_watched`] fires.
    fn watch_address(&mut self, addr: u32);

    /// Executes from `begin` until the instruction at `until` would execute,
    /// until `count` instructions have executed (0 for no limit),
    /// or until a callback stops execution.
    ///
    /// This returns the address at which execution would resume.
    fn start(&mut self, begin: u32, until: u32, count: usize, hooks: &mut dyn Hooks) -> Result<u32, EngineFault>;
}

/// Callbacks an engine invokes while executing.
///
/// All callbacks have default implementations that do nothing.
pub trait Hooks {
    /// Called before the instruction at `addr` executes.
    fn on_instruction(&mut self, _m: &mut dyn Machine, _addr: u32) -> HookAction {
        HookAction::Continue
    }

    /// Called before the instruction at a watched `addr` executes (after [`Hooks::on_instruction`]).
    fn on_watched(&mut self, _m: &mut dyn Machine, _addr: u32) -> HookAction {
        HookAction::Continue
    }

    /// Called after data is loaded from memory.
    fn on_mem_read(&mut self, _addr: u32, _data: &[u8]) {}

    /// Called after data is stored into memory.
    fn on_mem_write(&mut self, _addr: u32, _data: &[u8]) {}

    /// Called when `svc #number` executes. Execution continues with the next instruction.
    fn on_supervisor_call(&mut self, _m: &mut dyn Machine, number: u32) -> Result<(), FaultKind> {
        Err(FaultKind::UnhandledSupervisorCall(number))
    }
}

/// Hooks which never intervene.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;
impl Hooks for NoHooks {}
