//! Error interface for this crate.
//!
//! Errors produced from source text (lexing and assembling) carry a byte span
//! into the source they were produced from, as well as an optional help message.
//! Both are exposed through the [`Error`] trait.
use std::borrow::Cow;
use std::ops::Range;

pub use crate::parse::lex::LexErr;
pub use crate::asm::{AsmErr, AsmErrKind};
pub use crate::engine::{EngineFault, FaultKind};
pub use crate::sim::{SimErr, RuntimeFault};

/// The byte range in the source associated with an error.
pub type ErrSpan = Range<usize>;

/// Error interface for errors which originate from source code.
pub trait Error: std::error::Error {
    /// The span in the source associated with this error, if any.
    fn span(&self) -> Option<ErrSpan> {
        None
    }

    /// A help message that can be displayed to the user.
    fn help(&self) -> Option<Cow<str>>;
}
