//! Software-simulated system calls.
//!
//! Every routine in [`SYSCALLS`] is bound to a trampoline address.
//! Trampolines are placed sequentially (one word apart) starting at a configurable base.
//! Each trampoline holds a `bx lr` placeholder, so a program can reach a routine
//! either with `svc #K` or with a direct `bl` to its trampoline.
//!
//! | K      | name     | effect                                                        |
//! |--------|----------|---------------------------------------------------------------|
//! | `0x03` | `writec` | prints the byte at `[r1]`                                     |
//! | `0x04` | `write0` | prints the NUL-terminated string at `r1`                      |
//! | `0x0E` | `remove` | deletes the host file whose name is described by `[r1]`       |
//! | `0x19` | `hello`  | prints `First syscall o/`                                     |
//!
//! All routines set `r0` to 0 on success and to -1 on failure.

use std::collections::HashMap;
use std::io;

use crate::asm::encoding::BX_LR;
use crate::engine::{Machine, RegId};

use super::io::{Console, ConsoleDevice};
use super::mem::MemoryModel;

/// The longest string a routine will read out of guest memory.
const MAX_STRING_LEN: u32 = 0x1_0000;

/// What a routine has access to while it runs.
pub struct SyscallCtx<'a> {
    /// The engine's registers (and memory).
    pub machine: &'a mut dyn Machine,
    /// The memory mirror.
    pub mem: &'a mut MemoryModel,
    /// Where output is printed.
    pub console: &'a Console,
}
impl SyscallCtx<'_> {
    fn reg(&self, reg: RegId) -> u32 {
        self.machine.reg_read(reg)
    }

    fn print(&self, data: &[u8]) -> io::Result<()> {
        match self.console.write_bytes(data) {
            true  => Ok(()),
            false => Err(io::Error::new(io::ErrorKind::BrokenPipe, "console is unavailable")),
        }
    }
}

/// A system call routine.
#[derive(Clone, Copy)]
pub struct Syscall {
    /// The supervisor call number which invokes this routine.
    pub number: u32,
    /// The name of the routine.
    pub name: &'static str,
    effect: fn(&mut SyscallCtx<'_>) -> io::Result<()>,
}
impl std::fmt::Debug for Syscall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Syscall")
            .field("number", &self.number)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Every system call routine, in trampoline order.
pub const SYSCALLS: &[Syscall] = &[
    Syscall { number: 0x03, name: "writec", effect: writec },
    Syscall { number: 0x04, name: "write0", effect: write0 },
    Syscall { number: 0x0E, name: "remove", effect: remove },
    Syscall { number: 0x19, name: "hello",  effect: hello },
];

fn writec(ctx: &mut SyscallCtx<'_>) -> io::Result<()> {
    let byte = ctx.mem.get_byte(ctx.reg(RegId::R1));
    ctx.print(&[byte])
}

fn write0(ctx: &mut SyscallCtx<'_>) -> io::Result<()> {
    let start = ctx.reg(RegId::R1);
    let string: Vec<_> = (0..MAX_STRING_LEN)
        .map(|i| ctx.mem.get_byte(start.wrapping_add(i)))
        .take_while(|&b| b != 0)
        .collect();

    if string.len() as u32 == MAX_STRING_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "string is not terminated"));
    }
    ctx.print(&string)
}

fn remove(ctx: &mut SyscallCtx<'_>) -> io::Result<()> {
    let block = ctx.reg(RegId::R1);
    let ptr = ctx.mem.get_word(block);
    let len = ctx.mem.get_word(block.wrapping_add(4));
    if len > MAX_STRING_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "file name is too long"));
    }

    let name: Vec<_> = (0..len)
        .map(|i| ctx.mem.get_byte(ptr.wrapping_add(i)))
        .collect();
    let name = String::from_utf8(name)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    std::fs::remove_file(name)
}

fn hello(ctx: &mut SyscallCtx<'_>) -> io::Result<()> {
    ctx.print(b"First syscall o/\n")
}

/// The table of installed routines and their trampolines.
#[derive(Debug, Clone)]
pub struct SyscallRegistry {
    by_number: HashMap<u32, Syscall>,
    by_trampoline: HashMap<u32, Syscall>,
}
impl SyscallRegistry {
    /// Installs every routine of [`SYSCALLS`], with trampolines starting at `base`.
    ///
    /// This writes the placeholder instruction of every trampoline into memory.
    pub fn install(base: u32, mem: &mut MemoryModel) -> Self {
        let mut by_number = HashMap::new();
        let mut by_trampoline = HashMap::new();

        for (i, &call) in SYSCALLS.iter().enumerate() {
            let addr = base.wrapping_add(4 * i as u32);
            mem.set_word(addr, BX_LR);
            by_number.insert(call.number, call);
            by_trampoline.insert(addr, call);
        }

        Self { by_number, by_trampoline }
    }

    /// Whether `addr` is a trampoline address.
    pub fn is_trampoline(&self, addr: u32) -> bool {
        self.by_trampoline.contains_key(&addr)
    }

    /// All trampoline addresses, paired with their routines.
    pub fn trampolines(&self) -> impl Iterator<Item=(u32, &Syscall)> + '_ {
        self.by_trampoline.iter().map(|(&addr, call)| (addr, call))
    }

    /// The trampoline address of the routine with the given number.
    pub fn trampoline_of(&self, number: u32) -> Option<u32> {
        self.trampolines()
            .find(|(_, call)| call.number == number)
            .map(|(addr, _)| addr)
    }

    /// Runs the routine with the given supervisor call number.
    ///
    /// This returns `None` if there is no such routine.
    pub fn call_number(&self, number: u32, ctx: &mut SyscallCtx<'_>) -> Option<()> {
        let call = self.by_number.get(&number)?;
        run(call, ctx);
        Some(())
    }

    /// Runs the routine bound to the trampoline at `addr`.
    ///
    /// This returns `None` if `addr` is not a trampoline.
    pub fn call_trampoline(&self, addr: u32, ctx: &mut SyscallCtx<'_>) -> Option<()> {
        let call = self.by_trampoline.get(&addr)?;
        run(call, ctx);
        Some(())
    }
}

fn run(call: &Syscall, ctx: &mut SyscallCtx<'_>) {
    tracing::trace!("dispatching syscall {} ({:#04X})", call.name, call.number);

    let result = match (call.effect)(ctx) {
        Ok(()) => 0,
        Err(e) => {
            tracing::warn!("syscall {} failed: {e}", call.name);
            -1i32 as u32
        }
    };
    ctx.machine.reg_write(RegId::R0, result);
}

#[cfg(test)]
mod tests {
    use crate::engine::{Engine, Interpreter, Machine, RegId};
    use crate::sim::io::{BufferedConsole, Console};
    use crate::sim::mem::MemoryModel;

    use super::{SyscallCtx, SyscallRegistry, SYSCALLS};

    const MEM_SIZE: u32 = 0x2_0000;

    struct Fixture {
        machine: Interpreter,
        mem: MemoryModel,
        out: BufferedConsole,
        console: Console,
        registry: SyscallRegistry,
    }
    impl Fixture {
        fn new() -> Self {
            let mut mem = MemoryModel::new(MEM_SIZE);
            let registry = SyscallRegistry::install(0xFF00, &mut mem);
            let out = BufferedConsole::new();
            Self {
                machine: Interpreter::new(MEM_SIZE),
                mem,
                console: out.clone().into(),
                out,
                registry,
            }
        }

        fn call(&mut self, number: u32) -> u32 {
            let mut ctx = SyscallCtx {
                machine: &mut self.machine,
                mem: &mut self.mem,
                console: &self.console,
            };
            self.registry.call_number(number, &mut ctx).unwrap();
            self.machine.reg_read(RegId::R0)
        }
    }

    #[test]
    fn test_install() {
        let mut mem = MemoryModel::new(MEM_SIZE);
        let registry = SyscallRegistry::install(0xFF00, &mut mem);

        let mut addrs: Vec<_> = registry.trampolines().map(|(addr, _)| addr).collect();
        addrs.sort_unstable();
        assert_eq!(addrs, [0xFF00, 0xFF04, 0xFF08, 0xFF0C]);

        for addr in addrs {
            assert!(registry.is_trampoline(addr));
            assert_eq!(mem.get_word(addr), 0xE12F_FF1E, "trampoline {addr:#X} is missing its placeholder");
        }
        assert!(!registry.is_trampoline(0xFF10));

        // every number maps to exactly one trampoline
        for call in SYSCALLS {
            let addr = registry.trampoline_of(call.number).unwrap();
            assert_eq!(registry.trampolines().filter(|(_, c)| c.number == call.number).count(), 1);
            assert!(registry.is_trampoline(addr));
        }
        assert_eq!(registry.trampoline_of(0x7F), None);
    }

    #[test]
    fn test_print() {
        let mut fx = Fixture::new();
        fx.machine.reg_write(RegId::R0, 0xDEAD);
        assert_eq!(fx.call(0x19), 0);
        assert_eq!(fx.out.contents(), "First syscall o/\n");

        fx.mem.set_bytes(0x2000, b"hi!\0ignored");
        fx.machine.reg_write(RegId::R1, 0x2002);
        assert_eq!(fx.call(0x03), 0);
        fx.machine.reg_write(RegId::R1, 0x2000);
        assert_eq!(fx.call(0x04), 0);
        assert_eq!(fx.out.contents(), "First syscall o/\n!hi!");
    }

    #[test]
    fn test_console_failure() {
        let mut fx = Fixture::new();
        fx.console = Console::Empty;
        assert_eq!(fx.call(0x19), -1i32 as u32);
    }

    #[test]
    fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("victim.txt");
        std::fs::write(&path, "delete me").unwrap();
        let name = path.to_str().unwrap().as_bytes();

        let mut fx = Fixture::new();
        // r1 -> { ptr, len }
        fx.mem.set_word(0x3000, 0x3100);
        fx.mem.set_word(0x3004, name.len() as u32);
        fx.mem.set_bytes(0x3100, name);
        fx.machine.reg_write(RegId::R1, 0x3000);

        assert_eq!(fx.call(0x0E), 0);
        assert!(!path.exists());

        // deleting it again fails
        assert_eq!(fx.call(0x0E), -1i32 as u32);
    }

    #[test]
    fn test_remove_long_name() {
        let mut fx = Fixture::new();
        fx.mem.set_word(0x3000, 0x3100);
        fx.mem.set_word(0x3004, u32::MAX);
        fx.machine.reg_write(RegId::R1, 0x3000);
        assert_eq!(fx.call(0x0E), -1i32 as u32);

        // one past the limit is also rejected
        fx.mem.set_word(0x3004, 0x1_0001);
        fx.machine.reg_write(RegId::R0, 0);
        assert_eq!(fx.call(0x0E), -1i32 as u32);
    }

    #[test]
    fn test_unknown() {
        let mut fx = Fixture::new();
        let mut ctx = SyscallCtx {
            machine: &mut fx.machine,
            mem: &mut fx.mem,
            console: &fx.console,
        };
        assert_eq!(fx.registry.call_number(0x7F, &mut ctx), None);
        assert_eq!(fx.registry.call_trampoline(0x1000, &mut ctx), None);
        assert_eq!(fx.registry.call_trampoline(0xFF0C, &mut ctx), Some(()));
    }
}
