//! VHDL declaration scanner.

use super::{tokenize, Body, Declaration, Lexeme, Scanned};
use crate::ident::Name;
use crate::unit::{UnitKind, UnitReference};
use logos::Logos;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"--[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
#[logos(skip r#""([^"\n]|"")*""#)]
#[logos(skip r"'[^'\n]'")]
enum Token {
    #[token("entity", ignore(ascii_case))]
    Entity,
    #[token("architecture", ignore(ascii_case))]
    Architecture,
    #[token("package", ignore(ascii_case))]
    Package,
    #[token("body", ignore(ascii_case))]
    Body,
    #[token("configuration", ignore(ascii_case))]
    Configuration,
    #[token("component", ignore(ascii_case))]
    Component,
    #[token("library", ignore(ascii_case))]
    Library,
    #[token("use", ignore(ascii_case))]
    Use,
    #[token("of", ignore(ascii_case))]
    Of,
    #[token("is", ignore(ascii_case))]
    Is,
    #[token("begin", ignore(ascii_case))]
    Begin,
    #[token("end", ignore(ascii_case))]
    End,
    #[token("port", ignore(ascii_case))]
    Port,
    #[token("generic", ignore(ascii_case))]
    Generic,
    #[token("map", ignore(ascii_case))]
    Map,
    #[token("all", ignore(ascii_case))]
    All,
    #[token("function", ignore(ascii_case))]
    Function,
    #[token("procedure", ignore(ascii_case))]
    Procedure,

    #[regex(r"[A-Za-z][A-Za-z0-9_]*")]
    Ident,

    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
}

/// Where references found at the current position belong.
#[derive(Debug, Clone, Copy)]
enum Target {
    Unit(usize),
    Body(usize),
    /// A configuration; its references are not tracked.
    Discard,
}

#[derive(Debug)]
struct Scope<'s> {
    target: Target,
    /// Name that may follow `end` to close the scope.
    label: &'s str,
}

struct State<'s> {
    tokens: Vec<Lexeme<'s, Token>>,
    out: Scanned,
    /// Context clause waiting for the next design unit.
    context: Vec<UnitReference>,
    scope: Option<Scope<'s>>,
    /// Entity whose port clause may still appear.
    header: Option<usize>,
    /// Open subprogram bodies inside the current scope, innermost last.
    subprograms: Vec<&'s str>,
}

pub(super) fn scan(source: &str) -> Scanned {
    let mut state = State {
        tokens: tokenize(source),
        out: Scanned::default(),
        context: Vec::new(),
        scope: None,
        header: None,
        subprograms: Vec::new(),
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

    /// Handle the token at `i` and return the index of the next one.
    fn step(&mut self, i: usize) -> usize {
        let Some(kind) = self.kind(i) else {
            return i + 1;
        };

        match kind {
            Token::Library => {
                // Library clauses only appear in a context clause.
                self.close_scope();
                self.header = None;
                self.skip_past_semi(i)
            }
            Token::Use => self.use_clause(i),
            Token::Entity => self.entity(i),
            Token::Package => self.package(i),
            Token::Architecture => self.architecture(i),
            Token::Configuration => {
                if self.is(i + 1, Token::Ident) && self.is(i + 2, Token::Of) {
                    self.context.clear();
                    self.subprograms.clear();
                    self.scope = Some(Scope {
                        target: Target::Discard,
                        label: self.text(i + 1),
                    });
                    return i + 2;
                }
                i + 1
            }
            Token::Port => {
                if let Some(unit) = self.header {
                    self.out.units[unit].testbench = false;
                }
                i + 1
            }
            Token::Begin => {
                self.header = None;
                i + 1
            }
            Token::Function | Token::Procedure => {
                self.subprogram(i);
                i + 1
            }
            Token::End => {
                self.header = None;
                self.end(i)
            }
            Token::Ident if self.is(i + 1, Token::Colon) => self.component_instance(i),
            _ => i + 1,
        }
    }

    fn skip_past_semi(&self, mut i: usize) -> usize {
        while i < self.tokens.len() && !self.is(i, Token::Semi) {
            i += 1;
        }
        i + 1
    }

    /// `use lib.pkg.item, lib2.pkg2.all;`
    fn use_clause(&mut self, i: usize) -> usize {
        let mut j = i + 1;
        let mut segments: Vec<&'s str> = Vec::new();
        loop {
            match self.kind(j) {
                Some(Token::Ident | Token::All) => segments.push(self.text(j)),
                Some(Token::Dot) => {}
                Some(Token::Comma) => self.selected_package(&mut segments),
                Some(Token::Semi) => {
                    self.selected_package(&mut segments);
                    return j + 1;
                }
                // `use entity ...` inside a configuration, or malformed text
                _ => return j,
            }
            j += 1;
        }
    }

    fn selected_package(&mut self, segments: &mut Vec<&'s str>) {
        if let [library, package, ..] = segments.as_slice() {
            let reference = UnitReference::package(Some(*library), package);
            if self.scope.is_some() {
                self.record(reference);
            } else {
                self.context.push(reference);
            }
        }
        segments.clear();
    }

    /// `entity name is` declares an entity; `label : entity lib.name` instantiates one.
    fn entity(&mut self, i: usize) -> usize {
        if self.is(i + 1, Token::Ident) && self.is(i + 2, Token::Is) {
            let index = self.out.units.len();
            let references = std::mem::take(&mut self.context);
            self.out.units.push(Declaration {
                name: Name::new(self.text(i + 1)),
                kind: UnitKind::Entity,
                // an entity becomes a design once a port clause shows up
                testbench: true,
                references,
            });
            self.subprograms.clear();
            self.scope = Some(Scope {
                target: Target::Unit(index),
                label: self.text(i + 1),
            });
            self.header = Some(index);
            return i + 3;
        }

        let instantiated = i >= 2 && self.is(i - 1, Token::Colon) && self.is(i - 2, Token::Ident);
        if instantiated && self.is(i + 1, Token::Ident) {
            let reference = if self.is(i + 2, Token::Dot) && self.is(i + 3, Token::Ident) {
                UnitReference::instance(Some(self.text(i + 1)), self.text(i + 3))
            } else {
                UnitReference::instance(None, self.text(i + 1))
            };
            self.record(reference);
        }
        i + 1
    }

    /// `package name is` or `package body name is`.
    fn package(&mut self, i: usize) -> usize {
        if self.is(i + 1, Token::Body) && self.is(i + 2, Token::Ident) {
            let owner = self.text(i + 2);
            self.open_body(owner, owner);
            return i + 3;
        }
        if self.is(i + 1, Token::Ident) && self.is(i + 2, Token::Is) {
            let index = self.out.units.len();
            let references = std::mem::take(&mut self.context);
            self.out.units.push(Declaration {
                name: Name::new(self.text(i + 1)),
                kind: UnitKind::Package,
                testbench: false,
                references,
            });
            self.subprograms.clear();
            self.scope = Some(Scope {
                target: Target::Unit(index),
                label: self.text(i + 1),
            });
            self.header = None;
            return i + 3;
        }
        i + 1
    }

    /// `architecture arch of entity is`
    fn architecture(&mut self, i: usize) -> usize {
        if self.is(i + 1, Token::Ident) && self.is(i + 2, Token::Of) && self.is(i + 3, Token::Ident) {
            let label = self.text(i + 1);
            let owner = self.text(i + 3);
            self.open_body(owner, label);
            return i + 4;
        }
        i + 1
    }

    fn open_body(&mut self, owner: &'s str, label: &'s str) {
        let index = self.out.bodies.len();
        let references = std::mem::take(&mut self.context);
        self.out.bodies.push(Body {
            owner: Name::new(owner),
            references,
        });
        self.subprograms.clear();
        self.scope = Some(Scope {
            target: Target::Body(index),
            label,
        });
        self.header = None;
    }

    /// `function name [(params)] return type is` opens a body that ends with
    /// its own `end`; a declaration ends at `;` instead.
    fn subprogram(&mut self, i: usize) {
        if self.scope.is_none() {
            return;
        }
        // operator names are string literals, which the lexer skips
        let label = if self.is(i + 1, Token::Ident) { self.text(i + 1) } else { "" };

        let mut depth = 0usize;
        let mut j = i + 1;
        while let Some(kind) = self.kind(j) {
            match kind {
                Token::LParen => depth += 1,
                Token::RParen => depth = depth.saturating_sub(1),
                Token::Semi if depth == 0 => return,
                Token::Is if depth == 0 => {
                    // `function f is new g generic map (...)` instantiates
                    let instantiation =
                        self.is(j + 1, Token::Ident) && self.text(j + 1).eq_ignore_ascii_case("new");
                    if !instantiation {
                        self.subprograms.push(label);
                    }
                    return;
                }
                _ => {}
            }
            j += 1;
        }
    }

    /// Closes the innermost subprogram body if the `end` at `i` belongs to it.
    fn end_subprogram(&mut self, i: usize) -> Option<usize> {
        let label = *self.subprograms.last()?;
        let next = match self.kind(i + 1) {
            Some(Token::Semi) => i + 2,
            Some(Token::Function | Token::Procedure) => self.skip_past_semi(i),
            Some(Token::Ident)
                if self.is(i + 2, Token::Semi) && self.text(i + 1).eq_ignore_ascii_case(label) =>
            {
                i + 3
            }
            _ => return None,
        };
        self.subprograms.pop();
        Some(next)
    }

    /// `end [entity|architecture|package [body]|configuration] [name];`
    fn end(&mut self, i: usize) -> usize {
        if let Some(next) = self.end_subprogram(i) {
            return next;
        }
        match self.kind(i + 1) {
            Some(Token::Entity | Token::Architecture | Token::Package | Token::Configuration) => {
                self.close_scope();
                i + 2
            }
            Some(Token::Semi) => {
                self.close_scope();
                i + 2
            }
            Some(Token::Ident) if self.is(i + 2, Token::Semi) => {
                let closes = self
                    .scope
                    .as_ref()
                    .is_some_and(|s| s.label.eq_ignore_ascii_case(self.text(i + 1)));
                if closes {
                    self.close_scope();
                }
                i + 3
            }
            _ => i + 1,
        }
    }

    fn close_scope(&mut self) {
        self.scope = None;
        self.subprograms.clear();
    }

    /// `label : [component] name (generic|port) map`
    fn component_instance(&mut self, i: usize) -> usize {
        let mut j = i + 2;
        if self.is(j, Token::Component) {
            j += 1;
        }
        let mapped = self.is(j, Token::Ident)
            && matches!(self.kind(j + 1), Some(Token::Generic | Token::Port))
            && self.is(j + 2, Token::Map);
        if mapped {
            let reference = UnitReference::instance(None, self.text(j));
            self.record(reference);
            return j + 3;
        }
        i + 1
    }

    fn record(&mut self, reference: UnitReference) {
        match self.scope.as_ref().map(|s| s.target) {
            Some(Target::Unit(index)) => self.out.units[index].references.push(reference),
            Some(Target::Body(index)) => self.out.bodies[index].references.push(reference),
            Some(Target::Discard) | None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::ReferenceKind;

    const ADDER: &str = r#"
library ieee;
use ieee.std_logic_1164.all;

-- entity fake is
entity adder is
    generic (WIDTH : natural := 8);
    port (
        a, b : in  std_logic_vector(WIDTH-1 downto 0);
        s    : out std_logic_vector(WIDTH downto 0)
    );
end entity adder;

architecture rtl of adder is
begin
    s <= std_logic_vector(resize(unsigned(a), WIDTH+1) + unsigned(b));
end architecture;
"#;

    const TOP: &str = r#"
library ieee;
use ieee.std_logic_1164.all;
library math;
use math.types_pkg.all;

entity TOP_LEVEL is
    port (clk : in std_logic);
end;

architecture Structural of TOP_LEVEL is
    component adder is
        port (a, b : in std_logic_vector(7 downto 0); s : out std_logic_vector(8 downto 0));
    end component;
    signal x : std_logic_vector(7 downto 0);
begin
    u_add : adder port map (a => x, b => x, s => open);
    u_sub : entity work.subtractor(rtl) generic map (WIDTH => 8) port map (x, x);
    u_mul : entity multiplier port map (x);
    report "u_fake : fake port map";
end Structural;
"#;

    #[test]
    fn test_entity_with_ports_is_not_testbench() {
        let scanned = scan(ADDER);
        assert_eq!(scanned.units.len(), 1);
        let unit = &scanned.units[0];
        assert_eq!(unit.name.as_str(), "adder");
        assert_eq!(unit.kind, UnitKind::Entity);
        assert!(!unit.testbench);
        assert_eq!(
            unit.references,
            vec![UnitReference::package(Some("ieee"), "std_logic_1164")]
        );
        assert_eq!(scanned.bodies.len(), 1);
        assert!(scanned.bodies[0].owner.eq_str("ADDER"));
        assert!(scanned.bodies[0].references.is_empty());
    }

    #[test]
    fn test_architecture_instances() {
        let scanned = scan(TOP);
        assert_eq!(scanned.units[0].name.as_str(), "TOP_LEVEL");
        assert_eq!(scanned.units[0].references.len(), 2);

        let body = &scanned.bodies[0];
        assert!(body.owner.eq_str("top_level"));
        let names: Vec<String> = body
            .references
            .iter()
            .map(|r| format!("{}{}", r.library.as_ref().map_or(String::new(), |l| format!("{l}.")), r.name))
            .collect();
        assert_eq!(names, vec!["adder", "work.subtractor", "multiplier"]);
        assert!(body.references.iter().all(|r| r.kind == ReferenceKind::Instance));
    }

    #[test]
    fn test_entity_without_port_clause_is_testbench() {
        let scanned = scan(
            "entity adder_tb is\nend entity;\narchitecture sim of adder_tb is\nbegin\n  dut : entity work.adder port map (open);\nend architecture;",
        );
        assert!(scanned.units[0].testbench);
        assert_eq!(
            scanned.bodies[0].references,
            vec![UnitReference::instance(Some("work"), "adder")]
        );
    }

    #[test]
    fn test_component_port_does_not_clear_testbench() {
        let scanned = scan(
            "entity tb is end tb;\narchitecture a of tb is\n component dut port (x : bit); end component;\nbegin\nend a;",
        );
        assert!(scanned.units[0].testbench);
    }

    #[test]
    fn test_package_and_body() {
        let scanned = scan(
            "library ieee; use ieee.numeric_std.all;\npackage Types_Pkg is\n constant W : natural := 8;\nend package;\n\npackage body types_pkg is\nend package body;",
        );
        assert_eq!(scanned.units.len(), 1);
        assert_eq!(scanned.units[0].kind, UnitKind::Package);
        assert!(!scanned.units[0].testbench);
        assert_eq!(scanned.bodies.len(), 1);
        assert!(scanned.bodies[0].owner.eq_str("types_pkg"));
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let scanned = scan("ENTITY Counter IS PORT (clk : IN bit); END ENTITY;");
        assert_eq!(scanned.units[0].name.as_str(), "Counter");
        assert!(!scanned.units[0].testbench);
    }

    #[test]
    fn test_context_applies_to_next_unit_only() {
        let scanned = scan(
            "use work.a_pkg.all;\nentity first is end first;\n\nuse work.b_pkg.all;\nentity second is end second;",
        );
        assert_eq!(
            scanned.units[0].references,
            vec![UnitReference::package(Some("work"), "a_pkg")]
        );
        assert_eq!(
            scanned.units[1].references,
            vec![UnitReference::package(Some("work"), "b_pkg")]
        );
    }

    #[test]
    fn test_unlabeled_end_closes_unit() {
        let scanned = scan(
            "entity first is port (a : in bit); end;\n\nuse work.b_pkg.all;\nentity second is port (a : in bit); end;",
        );
        assert!(scanned.units[0].references.is_empty());
        assert_eq!(
            scanned.units[1].references,
            vec![UnitReference::package(Some("work"), "b_pkg")]
        );
    }

    #[test]
    fn test_subprogram_end_keeps_body_open() {
        let scanned = scan(
            r#"
architecture rtl of top is
    function inv(x : bit) return bit is
    begin
        if x = '1' then return '0'; end if;
        return '1';
    end;
    procedure noop(signal s : out bit; v : in bit) is begin s <= v; end procedure noop;
    function decl(x : bit) return bit;
begin
    u0 : adder port map (a);
end;

use work.later_pkg.all;
entity later is port (a : in bit); end;
"#,
        );
        assert_eq!(
            scanned.bodies[0].references,
            vec![UnitReference::instance(None, "adder")]
        );
        assert_eq!(scanned.units[0].name.as_str(), "later");
        assert_eq!(
            scanned.units[0].references,
            vec![UnitReference::package(Some("work"), "later_pkg")]
        );
    }

    #[test]
    fn test_comments_and_strings_are_ignored() {
        let scanned = scan("-- entity ghost is\n/* entity phantom is */\nentity real_one is end;");
        assert_eq!(scanned.units.len(), 1);
        assert_eq!(scanned.units[0].name.as_str(), "real_one");
    }
}
