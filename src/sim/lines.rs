//! Correlating machine addresses with source lines.
//!
//! The [`AddressLineMap`] is computed by walking the source line by line
//! and re-assembling each line on its own at the address it would occupy.
//! To make sure every line assembles in isolation (even if it refers to a label defined elsewhere),
//! every label of the program is prepended to the line, so all labels resolve.

use std::collections::{BTreeMap, HashMap};

use logos::Logos;

use crate::asm::Assembler;
use crate::parse::lex::Token;

use super::SimErr;

/// A map from addresses to the (1-based) source line which produced them.
///
/// # Example
/// ```
/// use armsim_harness::asm::A32Assembler;
/// use armsim_harness::sim::lines::AddressLineMap;
///
/// let map = AddressLineMap::build(&A32Assembler, "mov r0, #1;loop:;b loop", 0x1000).unwrap();
/// assert_eq!(map.line_of(0x1000), 1);
/// assert_eq!(map.line_of(0x1004), 3);
/// assert_eq!(map.line_of(0x1008), 0);
/// assert_eq!(map.addr_of(3), Some(0x1004));
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct AddressLineMap {
    lines: BTreeMap<u32, usize>,
    addrs: HashMap<usize, u32>,
}

impl AddressLineMap {
    /// Builds the map for the given source, assembled at `base`.
    ///
    /// Lines are separated by `;`.
    /// Lines which are blank still count toward the line number, but do not appear in the map.
    ///
    /// If any line fails to assemble, this fails with [`SimErr::Assembly`],
    /// carrying the line's number.
    pub fn build<A: Assembler + ?Sized>(asm: &A, src: &str, base: u32) -> Result<Self, SimErr> {
        let prefix = label_prefix(src);
        let mut lines = BTreeMap::new();

        let mut addr = base;
        for (i, line) in src.split(';').enumerate() {
            let lno = i + 1;
            if line.trim().is_empty() { continue; }

            let body = strip_labels(line);
            let bytes = asm.assemble(&format!("{prefix}{body}"), addr)
                .map_err(|err| SimErr::Assembly { line: lno, err })?;

            lines.insert(addr, lno);

            // literal pool entries are not placed at this address
            let len = bytes.len() as u32;
            let len = match line.contains('=') {
                true  => len.saturating_sub(4),
                false => len,
            };
            addr = addr.wrapping_add(len);
        }

        let addrs = lines.iter().map(|(&addr, &lno)| (lno, addr)).collect();
        tracing::debug!("built address line map with {} entries", lines.len());

        Ok(Self { lines, addrs })
    }

    /// Gets the line which produced the instruction at `addr`, or 0 if there is none.
    pub fn line_of(&self, addr: u32) -> usize {
        self.lines.get(&addr).copied().unwrap_or(0)
    }

    /// Gets the address of the instruction produced by `line`.
    ///
    /// Lines whose instruction was overshadowed by a later line
    /// (e.g., label-only lines) have no address.
    pub fn addr_of(&self, line: usize) -> Option<u32> {
        self.addrs.get(&line).copied()
    }

    /// Iterates over every (address, line) pair, in address order.
    pub fn iter(&self) -> impl Iterator<Item=(u32, usize)> + '_ {
        self.lines.iter().map(|(&addr, &lno)| (addr, lno))
    }

    /// The number of entries in this map.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether this map is empty.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Collects every label definition (`name:`) in the source into one string,
/// each label appearing once, in order of first appearance.
fn label_prefix(src: &str) -> String {
    let tokens: Vec<_> = Token::lexer(src).map(Result::ok).collect();

    let mut seen = std::collections::HashSet::new();
    let mut prefix = String::new();
    for pair in tokens.windows(2) {
        if let [Some(Token::Ident(name)), Some(Token::Colon)] = pair {
            if seen.insert(name.as_str()) {
                prefix.push_str(name);
                prefix.push_str(": ");
            }
        }
    }
    prefix
}

/// Strips any label definitions at the start of a line.
fn strip_labels(line: &str) -> &str {
    let mut lexer = Token::lexer(line);
    let mut rest = 0;

    // consume `ident :` pairs
    loop {
        let Some(Ok(Token::Ident(_))) = lexer.next() else { break };
        let Some(Ok(Token::Colon)) = lexer.next() else { break };
        rest = lexer.span().end;
    }
    &line[rest..]
}

#[cfg(test)]
mod tests {
    use crate::asm::{A32Assembler, AsmErrKind};
    use crate::sim::SimErr;

    use super::{label_prefix, strip_labels, AddressLineMap};

    fn build(src: &str) -> AddressLineMap {
        AddressLineMap::build(&A32Assembler, src, 0x1000).unwrap()
    }

    #[test]
    fn test_label_helpers() {
        assert_eq!(label_prefix("a: mov r0, r1;b:;c: d: b a;a:"), "a: b: c: d: ");
        assert_eq!(label_prefix("mov r0, r1"), "");

        assert_eq!(strip_labels("loop: add r0, r0, #1"), " add r0, r0, #1");
        assert_eq!(strip_labels("a: b: bx lr"), " bx lr");
        assert_eq!(strip_labels("  mov r0, r1"), "  mov r0, r1");
        assert_eq!(strip_labels("x:"), "");
        assert_eq!(strip_labels(""), "");
    }

    #[test]
    fn test_sequential() {
        let map = build("mov r0, #5;mov r1, #10;add r0, r0, r1;");
        assert_eq!(map.iter().collect::<Vec<_>>(), [(0x1000, 1), (0x1004, 2), (0x1008, 3)]);
        assert_eq!(map.line_of(0x0FFC), 0);
        assert_eq!(map.addr_of(2), Some(0x1004));
        assert_eq!(map.addr_of(4), None);
    }

    #[test]
    fn test_labels_and_blanks() {
        let src = [
            "start:",           // 1: replaced by line 2
            "    mov r0, #0",   // 2
            "",                 // 3
            "loop: add r0, r0, #1", // 4
            "    cmp r0, #10",  // 5
            "    bne loop",     // 6
            "  ",               // 7
            "    b end",        // 8
            "end: mov r1, r0",  // 9
        ].join(";");
        let map = build(&src);

        assert_eq!(map.iter().collect::<Vec<_>>(), [
            (0x1000, 2),
            (0x1004, 4),
            (0x1008, 5),
            (0x100C, 6),
            (0x1010, 8),
            (0x1014, 9),
        ]);
        assert_eq!(map.addr_of(1), None);
        assert_eq!(map.addr_of(3), None);
    }

    #[test]
    fn test_literal_lines() {
        // the pool entry of an `=` line does not advance the address
        let map = build("ldr r0, =0x12345678;ldr r1, =label;label: mov r2, r0");
        assert_eq!(map.iter().collect::<Vec<_>>(), [(0x1000, 1), (0x1004, 2), (0x1008, 3)]);
    }

    #[test]
    fn test_strictly_increasing() {
        let src = "a: mov r0, #1;;b a;push {r0, lr};.word 7;ldr r3, =c;c: pop {r0, pc};svc #0x19";
        let map = build(src);

        let entries: Vec<_> = map.iter().collect();
        for pair in entries.windows(2) {
            let [(a0, l0), (a1, l1)] = pair else { unreachable!() };
            assert_eq!(a1 - a0, 4, "instructions are not sequential");
            assert!(l1 > l0, "line numbers do not increase");
        }
        assert_eq!(entries.first(), Some(&(0x1000, 1)));
        assert_eq!(entries.last(), Some(&(0x1018, 8)));
    }

    #[test]
    fn test_failure_reports_line() {
        let err = AddressLineMap::build(&A32Assembler, "mov r0, #1;;mov r0, #0x101;nop", 0x1000).unwrap_err();
        let SimErr::Assembly { line, err } = err else { panic!("expected assembly error, got {err:?}") };
        assert_eq!(line, 3);
        assert_eq!(err.kind, AsmErrKind::ImmNotEncodable);

        let err = AddressLineMap::build(&A32Assembler, "mov r0, #1;frob r1", 0x1000).unwrap_err();
        assert!(matches!(err, SimErr::Assembly { line: 2, .. }));
    }
}
