//! Declaration scanners for HDL source files.
//!
//! Unit extraction only needs declaration boundaries and the names a unit
//! refers to, so each language family gets a lightweight token scanner
//! instead of a grammar:
//! - [`Scanner::Vhdl`] finds entities, packages, architectures, package
//!   bodies, context clauses and instantiations
//! - [`Scanner::Verilog`] finds modules and the instances inside them
//!
//! Both are built on `logos` lexers that drop comments and string literals
//! before any pattern is matched.

mod verilog;
mod vhdl;

use crate::ident::Name;
use crate::unit::{Language, UnitKind, UnitReference};
use logos::Logos;

/// A primary unit declared in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// Declared name.
    pub name: Name,
    /// Entity, package or module.
    pub kind: UnitKind,
    /// True for an entity without a port clause or a module without ports.
    pub testbench: bool,
    /// Names referenced by the declaration and its context clause.
    pub references: Vec<UnitReference>,
}

/// A secondary unit (architecture or package body) belonging to a primary
/// unit that may live in another file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    /// Name of the primary unit this body implements.
    pub owner: Name,
    /// Names referenced inside the body and its context clause.
    pub references: Vec<UnitReference>,
}

/// Everything a scanner found in one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scanned {
    pub units: Vec<Declaration>,
    pub bodies: Vec<Body>,
}

impl Scanned {
    fn finish(mut self) -> Self {
        for unit in &mut self.units {
            dedup(&mut unit.references);
        }
        for body in &mut self.bodies {
            dedup(&mut body.references);
        }
        self
    }
}

/// A per-language declaration scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scanner {
    Vhdl,
    Verilog,
}

impl Scanner {
    /// The scanner for a language.
    #[must_use]
    pub fn for_language(language: Language) -> Self {
        match language {
            Language::Vhdl => Self::Vhdl,
            Language::Verilog => Self::Verilog,
        }
    }

    /// Scan source text for declarations.
    #[must_use]
    pub fn scan(self, source: &str) -> Scanned {
        match self {
            Self::Vhdl => vhdl::scan(source),
            Self::Verilog => verilog::scan(source),
        }
        .finish()
    }
}

/// A token together with the text it was lexed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Lexeme<'s, K> {
    kind: K,
    text: &'s str,
}

/// Run a logos lexer to completion, dropping anything it cannot classify.
///
/// Operators and other punctuation never start a declaration, so lexing
/// errors are discarded rather than reported.
fn tokenize<'s, K>(source: &'s str) -> Vec<Lexeme<'s, K>>
where
    K: Logos<'s, Source = str, Error = ()>,
    K::Extras: Default,
{
    let mut lexer = K::lexer(source);
    let mut tokens = Vec::new();
    while let Some(result) = lexer.next() {
        if let Ok(kind) = result {
            tokens.push(Lexeme {
                kind,
                text: lexer.slice(),
            });
        }
    }
    tokens
}

/// Remove repeated references, keeping first occurrences in order.
fn dedup(references: &mut Vec<UnitReference>) {
    let mut seen = Vec::with_capacity(references.len());
    references.retain(|r| {
        if seen.contains(r) {
            false
        } else {
            seen.push(r.clone());
            true
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::ReferenceKind;

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let adder = UnitReference::instance(None, "adder");
        let pkg = UnitReference::package(Some("work"), "types");
        let mut refs = vec![adder.clone(), pkg.clone(), adder.clone()];
        dedup(&mut refs);
        assert_eq!(refs, vec![adder, pkg]);
    }

    #[test]
    fn test_scanner_dispatch() {
        let vhdl = Scanner::for_language(Language::Vhdl).scan("entity a is end entity;");
        assert_eq!(vhdl.units[0].kind, UnitKind::Entity);

        let vlog = Scanner::for_language(Language::Verilog).scan("module a; endmodule");
        assert_eq!(vlog.units[0].kind, UnitKind::Module);
    }

    #[test]
    fn test_references_are_deduplicated() {
        let scanned = Scanner::Verilog.scan(
            "module top(input a); adder u0(.a(a)); adder u1(.a(a)); endmodule",
        );
        assert_eq!(scanned.units[0].references.len(), 1);
        assert_eq!(scanned.units[0].references[0].kind, ReferenceKind::Instance);
    }
}
