//! Verilog and SystemVerilog declaration scanner.

use super::{tokenize, Declaration, Lexeme, Scanned};
use crate::ident::Name;
use crate::unit::{UnitKind, UnitReference};
use logos::Logos;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
#[logos(skip r#""([^"\\\n]|\\.)*""#)]
#[logos(skip r"`[A-Za-z_][A-Za-z0-9_]*")]
#[logos(skip r"[0-9][0-9_]*")]
#[logos(skip r"'[sS]?[bBoOdDhH][ \t]*[0-9a-fA-FxXzZ_?]+")]
enum Token {
    #[token("module")]
    #[token("macromodule")]
    Module,
    #[token("endmodule")]
    EndModule,

    #[regex(r"[A-Za-z_][A-Za-z0-9_$]*")]
    Ident,

    #[token("#")]
    Hash,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semi,
    #[token("=")]
    Assign,
    #[token(".")]
    Dot,
}

/// Reserved words that may be followed by `name (` without being an
/// instantiation.
const KEYWORDS: &[&str] = &[
    "always", "always_comb", "always_ff", "always_latch", "and", "assert", "assign", "automatic",
    "begin", "bit", "buf", "bufif0", "bufif1", "byte", "case", "casex", "casez", "class", "cmos",
    "deassign", "default", "defparam", "disable", "edge", "else", "end", "endcase", "endclass",
    "endclocking", "endfunction", "endgenerate", "endinterface", "endpackage", "endprimitive",
    "endproperty", "endsequence", "endspecify", "endtable", "endtask", "enum", "event", "export",
    "for", "force", "forever", "fork",
    "function", "generate", "genvar", "if", "import", "initial", "inout", "input", "int",
    "integer", "interface", "join", "localparam", "logic", "longint", "nand", "negedge", "nmos",
    "nor", "not", "notif0", "notif1", "or", "output", "package", "parameter", "pmos", "posedge",
    "primitive", "property", "pulldown", "pullup", "rcmos", "real", "realtime", "reg", "release",
    "repeat", "return", "rnmos", "rpmos", "rtran", "rtranif0", "rtranif1", "scalared",
    "shortint", "signed", "specify", "specparam", "string", "struct", "supply0", "supply1",
    "table", "task", "time", "tran", "tranif0", "tranif1", "tri", "tri0", "tri1", "triand",
    "trior", "trireg", "typedef", "unsigned", "vectored", "void", "wait", "wand", "while",
    "wire", "wor", "xnor", "xor",
];

/// Keywords after which a new module item may start, besides every `end*`
/// keyword.
const ITEM_STARTERS: &[&str] = &["begin", "else", "generate"];

fn is_keyword(text: &str) -> bool {
    KEYWORDS.contains(&text)
}

struct State<'s> {
    tokens: Vec<Lexeme<'s, Token>>,
    out: Scanned,
    /// Index of the module whose body is being scanned.
    module: Option<usize>,
}

pub(super) fn scan(source: &str) -> Scanned {
    let mut state = State {
        tokens: tokenize(source),
        out: Scanned::default(),
        module: None,
    };

    let mut i = 0;
    while i < state.tokens.len() {
        i = state.step(i);
    }
    state.out
}

impl<'s> State<'s> {
    fn kind(&self, i: usize) -> Option<Token> {
        self.tokens.get(i).map(|t| t.kind)
    }

    fn text(&self, i: usize) -> &'s str {
        self.tokens[i].text
    }

    fn is(&self, i: usize, kind: Token) -> bool {
        self.kind(i) == Some(kind)
    }

    fn step(&mut self, i: usize) -> usize {
        match self.kind(i) {
            Some(Token::Module) => self.module(i),
            Some(Token::EndModule) => {
                self.module = None;
                i + 1
            }
            Some(Token::Ident) if self.module.is_some() && self.starts_item(i) => {
                self.instance(i)
            }
            _ => i + 1,
        }
    }

    /// Index just past the bracket group opened at `i`.
    fn skip_group(&self, i: usize, open: Token, close: Token) -> usize {
        let mut depth = 0usize;
        let mut j = i;
        while let Some(kind) = self.kind(j) {
            if kind == open {
                depth += 1;
            } else if kind == close {
                depth -= 1;
                if depth == 0 {
                    return j + 1;
                }
            }
            j += 1;
        }
        j
    }

    /// `module name [#(params)] [(ports)];`
    fn module(&mut self, i: usize) -> usize {
        if !self.is(i + 1, Token::Ident) {
            return i + 1;
        }
        let name = Name::new(self.text(i + 1));

        let mut j = i + 2;
        if self.is(j, Token::Hash) && self.is(j + 1, Token::LParen) {
            j = self.skip_group(j + 1, Token::LParen, Token::RParen);
        }
        // a testbench has no port list, or an empty one
        let mut testbench = true;
        if self.is(j, Token::LParen) {
            testbench = self.is(j + 1, Token::RParen);
            j = self.skip_group(j, Token::LParen, Token::RParen);
        }

        self.module = Some(self.out.units.len());
        self.out.units.push(Declaration {
            name,
            kind: UnitKind::Module,
            testbench,
            references: Vec::new(),
        });
        j
    }

    fn starts_item(&self, i: usize) -> bool {
        match i.checked_sub(1).and_then(|p| self.kind(p)) {
            Some(Token::Semi) => true,
            Some(Token::Ident) => {
                let previous = self.text(i - 1);
                ITEM_STARTERS.contains(&previous) || (previous.starts_with("end") && is_keyword(previous))
            }
            _ => false,
        }
    }

    /// `type [#(params)] name [range] (`
    fn instance(&mut self, i: usize) -> usize {
        let module_type = self.text(i);
        if is_keyword(module_type) {
            return i + 1;
        }

        let mut j = i + 1;
        if self.is(j, Token::Hash) {
            if self.is(j + 1, Token::LParen) {
                j = self.skip_group(j + 1, Token::LParen, Token::RParen);
            } else {
                // `#delay` with a numeric delay leaves only the hash
                j += 1;
            }
        }
        if !self.is(j, Token::Ident) || is_keyword(self.text(j)) {
            return i + 1;
        }
        j += 1;
        if self.is(j, Token::LBracket) {
            j = self.skip_group(j, Token::LBracket, Token::RBracket);
        }
        if !self.is(j, Token::LParen) {
            return i + 1;
        }

        if let Some(module) = self.module {
            self.out.units[module]
                .references
                .push(UnitReference::instance(None, module_type));
        }
        self.skip_group(j, Token::LParen, Token::RParen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_with_ports() {
        let scanned = scan(
            "// module ghost;\nmodule adder #(parameter W = 8) (\n  input [W-1:0] a, b,\n  output [W:0] s\n);\n  assign s = a + b;\nendmodule\n",
        );
        assert_eq!(scanned.units.len(), 1);
        let unit = &scanned.units[0];
        assert_eq!(unit.name.as_str(), "adder");
        assert_eq!(unit.kind, UnitKind::Module);
        assert!(!unit.testbench);
        assert!(unit.references.is_empty());
    }

    #[test]
    fn test_module_without_ports_is_testbench() {
        let scanned = scan("module adder_tb;\n  reg clk = 0;\nendmodule\nmodule empty_tb();\nendmodule");
        assert!(scanned.units[0].testbench);
        assert!(scanned.units[1].testbench);
    }

    #[test]
    fn test_instances() {
        let scanned = scan(
            r#"
`timescale 1ns/1ps
module top(input clk, output [8:0] s);
  wire [7:0] x = 8'hFF;
  adder #(.W(8)) u_add (.a(x), .b(x), .s(s));
  counter cnt [3:0] (.clk(clk));
  fifo u_fifo(.clk(clk));
  and g1 (y, a, b);
  always @(posedge clk) begin
    $display("adder fake(1)");
  end
  assign y = helper(x);
endmodule
"#,
        );
        let names: Vec<&str> = scanned.units[0]
            .references
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["adder", "counter", "fifo"]);
    }

    #[test]
    fn test_instances_after_end_keywords() {
        let scanned = scan(
            r#"
module top(input a, output y);
  function f; input x; f = x; endfunction
  adder u0 (.a(a));
  task t; begin end endtask
  counter u1 (.clk(a));
  always @(a) case (a) 1'b0: ; default: ; endcase
  specify (a => y) = 1; endspecify
  fifo u2 (.clk(a));
endmodule
"#,
        );
        let names: Vec<&str> = scanned.units[0]
            .references
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["adder", "counter", "fifo"]);
    }

    #[test]
    fn test_instances_outside_modules_are_ignored() {
        let scanned = scan("adder u0 (.a(1));\nmodule m; endmodule");
        assert_eq!(scanned.units.len(), 1);
        assert!(scanned.units[0].references.is_empty());
    }

    #[test]
    fn test_generate_block_instance() {
        let scanned = scan(
            "module top(input a);\n genvar i;\n generate for (i = 0; i < 4; i = i + 1) begin\n  cell c (.a(a));\n end endgenerate\nendmodule",
        );
        let names: Vec<&str> = scanned.units[0]
            .references
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["cell"]);
    }
}
