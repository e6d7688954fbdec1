//! Console output for system calls.
//!
//! The interface for an output sink is defined with the [`ConsoleDevice`] trait.
//! This is exposed to the simulator with the [`Console`] enum.
//!
//! Besides those two key items, this module also includes:
//! - [`StdoutConsole`]: A `ConsoleDevice` which prints to the host's standard output.
//! - [`BufferedConsole`]: A `ConsoleDevice` which appends to a shared buffer.
//! - [`ChannelConsole`]: A `ConsoleDevice` which sends output through a channel.

use std::io::Write;
use std::sync::{Arc, RwLock, RwLockWriteGuard, TryLockError};

use crossbeam_channel as cbc;

/// A sink that system calls can print to.
pub trait ConsoleDevice {
    /// Writes the bytes to the console.
    ///
    /// This returns whether the write was successful or not.
    fn write_bytes(&self, data: &[u8]) -> bool;
}
impl dyn ConsoleDevice {} // assert ConsoleDevice is dyn safe

/// No output. All writes are unsuccessful.
pub struct EmptyConsole;
impl ConsoleDevice for EmptyConsole {
    fn write_bytes(&self, _data: &[u8]) -> bool {
        false
    }
}

/// Output to the host's standard output.
///
/// This flushes stdout after every write.
pub struct StdoutConsole;
impl ConsoleDevice for StdoutConsole {
    fn write_bytes(&self, data: &[u8]) -> bool {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(data).and_then(|()| stdout.flush()).is_ok()
    }
}

/// Output which is appended to a buffer.
///
/// The buffer can be accessed in code via [`BufferedConsole::get_output`].
///
/// Note that while a lock guard to the buffer is held elsewhere,
/// the buffer is inaccessible to the simulator and writes fail.
/// Thus, a lock guard should never be leaked.
#[derive(Clone, Default)]
pub struct BufferedConsole {
    output: Arc<RwLock<Vec<u8>>>
}
impl BufferedConsole {
    /// Creates a new BufferedConsole.
    pub fn new() -> Self {
        Default::default()
    }
    /// Creates a new BufferedConsole from an already defined buffer.
    pub fn with_buf(output: Arc<RwLock<Vec<u8>>>) -> Self {
        Self { output }
    }

    fn try_output(&self) -> Option<RwLockWriteGuard<'_, Vec<u8>>> {
        match self.output.try_write() {
            Ok(g) => Some(g),
            Err(TryLockError::Poisoned(e)) => Some(e.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Gets a reference to the output buffer.
    pub fn get_output(&self) -> &Arc<RwLock<Vec<u8>>> {
        &self.output
    }

    /// Copies the current contents of the output buffer into a string (lossily).
    pub fn contents(&self) -> String {
        let buf = match self.output.read() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        };
        String::from_utf8_lossy(&buf).into_owned()
    }
}
impl ConsoleDevice for BufferedConsole {
    fn write_bytes(&self, data: &[u8]) -> bool {
        match self.try_output() {
            Some(mut out) => {
                out.extend_from_slice(data);
                true
            },
            None => false
        }
    }
}

/// Output which is sent byte-by-byte through a channel.
///
/// This allows another thread (e.g., a UI) to drain output
/// while the simulator is blocked in a run.
#[derive(Clone)]
pub struct ChannelConsole {
    tx: cbc::Sender<u8>
}
impl ChannelConsole {
    /// Creates a channel console which sends to the given sender.
    pub fn new(tx: cbc::Sender<u8>) -> Self {
        Self { tx }
    }

    /// Creates a channel console with an unbounded channel,
    /// returning the console and the receiving end of the channel.
    pub fn unbounded() -> (Self, cbc::Receiver<u8>) {
        let (tx, rx) = cbc::unbounded();
        (Self::new(tx), rx)
    }
}
impl ConsoleDevice for ChannelConsole {
    fn write_bytes(&self, data: &[u8]) -> bool {
        // this fails once the receiver has been dropped
        data.iter().all(|&b| self.tx.send(b).is_ok())
    }
}

/// All the variants of console output accepted by the Simulator.
#[derive(Clone, Default)]
pub enum Console {
    /// No output. This corresponds to the implementation of [`EmptyConsole`].
    Empty,
    /// Host standard output. See [`StdoutConsole`].
    #[default]
    Stdout,
    /// A buffered implementation. See [`BufferedConsole`].
    Buffered(BufferedConsole),
    /// A channel implementation. See [`ChannelConsole`].
    Channel(ChannelConsole)
}
impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Console::Empty       => "Empty",
            Console::Stdout      => "Stdout",
            Console::Buffered(_) => "Buffered",
            Console::Channel(_)  => "Channel",
        };
        f.debug_tuple("Console")
            .field(&name)
            .finish()
    }
}
impl From<EmptyConsole> for Console {
    fn from(_value: EmptyConsole) -> Self {
        Console::Empty
    }
}
impl From<StdoutConsole> for Console {
    fn from(_value: StdoutConsole) -> Self {
        Console::Stdout
    }
}
impl From<BufferedConsole> for Console {
    fn from(value: BufferedConsole) -> Self {
        Console::Buffered(value)
    }
}
impl From<ChannelConsole> for Console {
    fn from(value: ChannelConsole) -> Self {
        Console::Channel(value)
    }
}
impl ConsoleDevice for Console {
    fn write_bytes(&self, data: &[u8]) -> bool {
        match self {
            Console::Empty => EmptyConsole.write_bytes(data),
            Console::Stdout => StdoutConsole.write_bytes(data),
            Console::Buffered(c) => c.write_bytes(data),
            Console::Channel(c) => c.write_bytes(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered() {
        let console = BufferedConsole::new();
        let sim_side = Console::from(console.clone());

        assert!(sim_side.write_bytes(b"hello"));
        assert!(sim_side.write_bytes(b", world"));
        assert_eq!(console.contents(), "hello, world");

        // holding the lock prevents writes
        let guard = console.get_output().write().unwrap();
        assert!(!sim_side.write_bytes(b"!"));
        std::mem::drop(guard);

        assert!(sim_side.write_bytes(b"!"));
        assert_eq!(console.contents(), "hello, world!");
    }

    #[test]
    fn test_shared_buffer() {
        let buf = Arc::new(RwLock::new(b"> ".to_vec()));
        let console = BufferedConsole::with_buf(Arc::clone(&buf));

        assert!(Console::from(console.clone()).write_bytes(b"ok"));
        assert_eq!(console.contents(), "> ok");
        assert!(Arc::ptr_eq(console.get_output(), &buf));
    }

    #[test]
    fn test_channel() {
        let (console, rx) = ChannelConsole::unbounded();
        let sim_side = Console::from(console);

        let handle = std::thread::spawn(move || rx.iter().collect::<Vec<_>>());
        assert!(sim_side.write_bytes(b"o/"));
        std::mem::drop(sim_side);

        assert_eq!(handle.join().unwrap(), b"o/");
    }

    #[test]
    fn test_channel_disconnected() {
        let (console, rx) = ChannelConsole::unbounded();
        std::mem::drop(rx);
        assert!(!console.write_bytes(b"x"));
    }

    #[test]
    fn test_empty() {
        assert!(!Console::Empty.write_bytes(b"x"));
    }
}
