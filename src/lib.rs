//! An ARM (A32) assembler and execution harness for teaching.
//!
//! This is meant to be the backend of a debugger UI: it loads a program from source,
//! executes it on an engine instruction by instruction (or all at once),
//! and exposes registers, flags, memory, and the source line being executed.
//!
//! # Usage
//!
//! Source code can be parsed and assembled directly:
//! ```
//! use armsim_harness::parse::parse_ast;
//! use armsim_harness::asm::assemble;
//!
//! let code = "
//!     mov r0, #0
//! loop:
//!     add r0, r0, #1
//!     cmp r0, #10
//!     bne loop
//! ";
//! let ast = parse_ast(code).unwrap();
//! let bytes = assemble(&ast, 0x1000).unwrap();
//! assert_eq!(bytes.len(), 16);
//! ```
//!
//! More commonly, source is handed to the simulator, which assembles and loads it:
//! ```
//! use armsim_harness::ast::reg_consts::R0;
//! use armsim_harness::sim::Simulator;
//!
//! let mut simulator = Simulator::new(Default::default());
//! simulator.set_program("mov r0, #0\nloop: add r0, r0, #1\ncmp r0, #10\nbne loop").unwrap();
//! simulator.run().unwrap(); // <-- Result can be handled accordingly
//!
//! assert_eq!(simulator.register_value(R0), 10);
//! ```
//!
//! Instructions are executed by an [`engine::Engine`]. This crate provides [`engine::Interpreter`],
//! but any engine implementing the contract can be used.
//! See the [`sim`] module for more details.
#![warn(missing_docs)]

pub mod parse;
pub mod ast;
pub mod asm;
pub mod engine;
pub mod sim;
pub mod err;
