// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use indexmap::IndexMap;
use crate::config::Config;
use crate::{TermId, VarId};

/// A terminal reference: a literal or a token, by registry index.
///
/// The ordering (literals before tokens, both by creation order) matches the
/// terminal ordinal scheme used by the parsing tables.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Term {
    Lit(TermId),
    Tok(TermId),
}

/// A grammar symbol: terminal or non-terminal.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Sym {
    T(Term),
    Nt(VarId),
}

impl Sym {
    pub fn is_t(&self) -> bool {
        matches!(self, Sym::T(_))
    }

    pub fn is_nt(&self) -> bool {
        matches!(self, Sym::Nt(_))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Assoc { Left, Right, NonAssoc }

impl Display for Assoc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Assoc::Left => write!(f, "%left"),
            Assoc::Right => write!(f, "%right"),
            Assoc::NonAssoc => write!(f, "%nonassoc"),
        }
    }
}

// ---------------------------------------------------------------------------------------------

/// Self-representing terminal. `name` is the quoted form as written in the
/// grammar, `value` the unescaped text the scanner matches.
#[derive(Clone, Debug)]
pub struct Lit {
    pub name: String,
    pub value: String,
    pub prec: Option<u16>,
    pub used: bool,
    pub screened: bool,
}

/// Named terminal with a regular-expression pattern.
#[derive(Clone, Debug)]
pub struct Token {
    pub name: String,
    pub pattern: String,
    pub prec: Option<u16>,
    pub used: bool,
    /// Literal values this token screens: exact match promotes to the literal.
    pub screen: BTreeMap<String, TermId>,
}

#[derive(Clone, Debug)]
pub struct NonTerm {
    pub name: String,
}

/// One precedence group: all its terminals share the group's level index and
/// associativity.
#[derive(Clone, Debug)]
pub struct PrecGroup {
    pub assoc: Assoc,
    pub terms: Vec<Term>,
}

// ---------------------------------------------------------------------------------------------

#[derive(Clone, PartialEq, Debug)]
pub enum SymbolError {
    InvalidName { kind: &'static str, name: String },
    NameClash { name: String },
    InvalidPattern { name: String, error: String },
    EmptyMatch { name: String },
    DuplicatePrecedence { name: String },
    EmptyPrecedence,
    UnknownSymbol { name: String },
    TooManySymbols { kind: &'static str },
    BadEscape { text: String },
}

impl Display for SymbolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolError::InvalidName { kind, name } => write!(f, "invalid {kind} name {name:?}"),
            SymbolError::NameClash { name } => write!(f, "'{name}' is already defined in another name space"),
            SymbolError::InvalidPattern { name, error } => write!(f, "invalid pattern for token '{name}': {error}"),
            SymbolError::EmptyMatch { name } => write!(f, "pattern for token '{name}' matches the empty string"),
            SymbolError::DuplicatePrecedence { name } => write!(f, "{name} already has a precedence"),
            SymbolError::EmptyPrecedence => write!(f, "empty precedence group"),
            SymbolError::UnknownSymbol { name } => write!(f, "unknown symbol '{name}'"),
            SymbolError::TooManySymbols { kind } => write!(f, "too many {kind} symbols"),
            SymbolError::BadEscape { text } => write!(f, "bad escape in literal {text:?}"),
        }
    }
}

impl Error for SymbolError {}

// ---------------------------------------------------------------------------------------------

/// Registers all the symbols of one grammar: literals, tokens, non-terminals,
/// and the precedence groups over terminals.
///
/// Factories are idempotent: asking again for a known name returns the
/// existing symbol. Two reserved terminals exist from the start, the
/// end-of-input literal (`$eof`, empty name) and the error token (`$error`,
/// empty name) used by the LR engine for recovery.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    lits: IndexMap<String, Lit>,
    toks: IndexMap<String, Token>,
    nts: IndexMap<String, NonTerm>,
    groups: Vec<PrecGroup>,
}

impl SymbolTable {
    /// Reserved end-of-input literal.
    pub const EOF: Term = Term::Lit(0);
    /// Reserved error token, only meaningful to the LR engine.
    pub const ERROR: Term = Term::Tok(0);

    pub fn new() -> Self {
        let mut table = SymbolTable::default();
        table.lits.insert(String::new(), Lit {
            name: String::new(),
            value: String::new(),
            prec: None,
            used: false,
            screened: false,
        });
        table.toks.insert(String::new(), Token {
            name: String::new(),
            pattern: String::new(),
            prec: None,
            used: false,
            screen: BTreeMap::new(),
        });
        table
    }

    // -------------------------------------------------------------------------
    // factories

    /// Returns the literal written as `text` (quoted form), registering it if
    /// new. The stored value is the unescaped inner text.
    pub fn lit(&mut self, cfg: &Config, text: &str) -> Result<Term, SymbolError> {
        if let Some(id) = self.lits.get_index_of(text) {
            return Ok(Term::Lit(id as TermId));
        }
        if !cfg.lits.is_match(text) {
            return Err(SymbolError::InvalidName { kind: "literal", name: text.to_string() });
        }
        let value = unescape_literal(&text[1..text.len() - 1])?;
        let id = TermId::try_from(self.lits.len())
            .map_err(|_| SymbolError::TooManySymbols { kind: "literal" })?;
        self.lits.insert(text.to_string(), Lit {
            name: text.to_string(),
            value,
            prec: None,
            used: false,
            screened: false,
        });
        Ok(Term::Lit(id))
    }

    /// Returns the token `name`, registering it with `pattern` if new.
    ///
    /// The pattern must compile and must not match the empty string.
    pub fn token(&mut self, cfg: &Config, name: &str, pattern: &str) -> Result<Term, SymbolError> {
        if let Some(id) = self.toks.get_index_of(name) {
            return Ok(Term::Tok(id as TermId));
        }
        if !cfg.tokens.is_match(name) {
            return Err(SymbolError::InvalidName { kind: "token", name: name.to_string() });
        }
        if self.nts.contains_key(name) {
            return Err(SymbolError::NameClash { name: name.to_string() });
        }
        let re = regex::Regex::new(pattern)
            .map_err(|e| SymbolError::InvalidPattern { name: name.to_string(), error: e.to_string() })?;
        if re.is_match("") {
            return Err(SymbolError::EmptyMatch { name: name.to_string() });
        }
        let id = TermId::try_from(self.toks.len())
            .map_err(|_| SymbolError::TooManySymbols { kind: "token" })?;
        self.toks.insert(name.to_string(), Token {
            name: name.to_string(),
            pattern: pattern.to_string(),
            prec: None,
            used: false,
            screen: BTreeMap::new(),
        });
        Ok(Term::Tok(id))
    }

    /// Returns the non-terminal `name`, registering it if new.
    pub fn nt(&mut self, cfg: &Config, name: &str) -> Result<VarId, SymbolError> {
        if let Some(id) = self.nts.get_index_of(name) {
            return Ok(id as VarId);
        }
        if !cfg.nts.is_match(name) {
            return Err(SymbolError::InvalidName { kind: "non-terminal", name: name.to_string() });
        }
        if self.toks.contains_key(name) {
            return Err(SymbolError::NameClash { name: name.to_string() });
        }
        self.add_nt_unchecked(name)
    }

    /// Registers a synthesized non-terminal, bypassing the name filter.
    /// Used by the EBNF → BNF translation for its `$-`-prefixed helpers.
    pub(crate) fn add_nt_unchecked(&mut self, name: &str) -> Result<VarId, SymbolError> {
        let id = VarId::try_from(self.nts.len())
            .map_err(|_| SymbolError::TooManySymbols { kind: "non-terminal" })?;
        self.nts.insert(name.to_string(), NonTerm { name: name.to_string() });
        Ok(id)
    }

    /// Creates the next precedence group over `terms`. Each terminal may
    /// belong to at most one group; the group index is the precedence level.
    pub fn precedence(&mut self, assoc: Assoc, terms: &[Term]) -> Result<u16, SymbolError> {
        if terms.is_empty() {
            return Err(SymbolError::EmptyPrecedence);
        }
        let level = self.groups.len() as u16;
        for &t in terms {
            if self.term_prec(t).is_some() {
                return Err(SymbolError::DuplicatePrecedence { name: self.term_name(t) });
            }
        }
        for &t in terms {
            match t {
                Term::Lit(id) => self.lits[id as usize].prec = Some(level),
                Term::Tok(id) => self.toks[id as usize].prec = Some(level),
            }
        }
        self.groups.push(PrecGroup { assoc, terms: terms.to_vec() });
        Ok(level)
    }

    // -------------------------------------------------------------------------
    // lookups

    pub fn num_lits(&self) -> usize {
        self.lits.len()
    }

    pub fn num_toks(&self) -> usize {
        self.toks.len()
    }

    pub fn num_nts(&self) -> usize {
        self.nts.len()
    }

    pub fn num_terms(&self) -> usize {
        self.lits.len() + self.toks.len()
    }

    pub fn get_lit(&self, id: TermId) -> &Lit {
        &self.lits[id as usize]
    }

    pub fn get_tok(&self, id: TermId) -> &Token {
        &self.toks[id as usize]
    }

    pub fn get_tok_mut(&mut self, id: TermId) -> &mut Token {
        &mut self.toks[id as usize]
    }

    pub fn get_nt(&self, id: VarId) -> &NonTerm {
        &self.nts[id as usize]
    }

    pub fn lits(&self) -> impl Iterator<Item = (TermId, &Lit)> {
        self.lits.values().enumerate().map(|(id, l)| (id as TermId, l))
    }

    pub fn toks(&self) -> impl Iterator<Item = (TermId, &Token)> {
        self.toks.values().enumerate().map(|(id, t)| (id as TermId, t))
    }

    pub fn nts(&self) -> impl Iterator<Item = (VarId, &NonTerm)> {
        self.nts.values().enumerate().map(|(id, nt)| (id as VarId, nt))
    }

    pub fn groups(&self) -> &[PrecGroup] {
        &self.groups
    }

    /// Finds a terminal by name: the quoted form for literals, the identifier
    /// for tokens. `$error` resolves to the reserved error token.
    pub fn find_term(&self, name: &str) -> Option<Term> {
        if name == "$error" {
            return Some(Self::ERROR);
        }
        if let Some(id) = self.lits.get_index_of(name) {
            return Some(Term::Lit(id as TermId));
        }
        self.toks.get_index_of(name).map(|id| Term::Tok(id as TermId))
    }

    pub fn find_nt(&self, name: &str) -> Option<VarId> {
        self.nts.get_index_of(name).map(|id| id as VarId)
    }

    pub fn mark_used(&mut self, t: Term) {
        match t {
            Term::Lit(id) => self.lits[id as usize].used = true,
            Term::Tok(id) => self.toks[id as usize].used = true,
        }
    }

    pub fn mark_screened(&mut self, id: TermId) {
        self.lits[id as usize].screened = true;
    }

    pub fn term_prec(&self, t: Term) -> Option<(u16, Assoc)> {
        let level = match t {
            Term::Lit(id) => self.lits[id as usize].prec,
            Term::Tok(id) => self.toks[id as usize].prec,
        }?;
        Some((level, self.groups[level as usize].assoc))
    }

    // -------------------------------------------------------------------------
    // ordinals and names

    /// Unique terminal ordinal: literals first by creation order, then tokens.
    pub fn term_ord(&self, t: Term) -> u16 {
        match t {
            Term::Lit(id) => id,
            Term::Tok(id) => self.lits.len() as u16 + id,
        }
    }

    /// Symbol ordinal: terminals first, then non-terminals.
    pub fn sym_ord(&self, s: Sym) -> u16 {
        match s {
            Sym::T(t) => self.term_ord(t),
            Sym::Nt(v) => self.num_terms() as u16 + v,
        }
    }

    pub fn term_of_ord(&self, ord: u16) -> Option<Term> {
        let nl = self.lits.len() as u16;
        if ord < nl {
            Some(Term::Lit(ord))
        } else if (ord as usize) < self.num_terms() {
            Some(Term::Tok(ord - nl))
        } else {
            None
        }
    }

    /// Display name of a terminal: the quoted form or the token identifier;
    /// the reserved symbols print as `$eof` and `$error`.
    pub fn term_name(&self, t: Term) -> String {
        match t {
            Term::Lit(0) => "$eof".to_string(),
            Term::Tok(0) => "$error".to_string(),
            Term::Lit(id) => self.lits[id as usize].name.clone(),
            Term::Tok(id) => self.toks[id as usize].name.clone(),
        }
    }

    pub fn nt_name(&self, v: VarId) -> String {
        self.nts.get_index(v as usize).map(|(n, _)| n.clone()).unwrap_or(format!("NT({v}?)"))
    }

    pub fn sym_name(&self, s: Sym) -> String {
        match s {
            Sym::T(t) => self.term_name(t),
            Sym::Nt(v) => self.nt_name(v),
        }
    }
}

// ---------------------------------------------------------------------------------------------
// literal escapes

/// Unescapes the inner text of a quoted literal. Recognized escapes:
/// `\' \\ \b \f \n \r \t \v \xHH \uHHHH`; any other `\c` yields `c`.
pub fn unescape_literal(inner: &str) -> Result<String, SymbolError> {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(esc) = chars.next() else {
            return Err(SymbolError::BadEscape { text: inner.to_string() });
        };
        match esc {
            'b' => out.push('\u{0008}'),
            'f' => out.push('\u{000c}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\u{000b}'),
            'x' => out.push(hex_escape(&mut chars, 2, inner)?),
            'u' => out.push(hex_escape(&mut chars, 4, inner)?),
            other => out.push(other),
        }
    }
    Ok(out)
}

fn hex_escape(chars: &mut std::str::Chars<'_>, len: usize, full: &str) -> Result<char, SymbolError> {
    let mut code = 0u32;
    for _ in 0..len {
        let digit = chars.next()
            .and_then(|c| c.to_digit(16))
            .ok_or(SymbolError::BadEscape { text: full.to_string() })?;
        code = code * 16 + digit;
    }
    char::from_u32(code).ok_or(SymbolError::BadEscape { text: full.to_string() })
}

// ---------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_symbols() {
        let table = SymbolTable::new();
        assert_eq!(table.num_lits(), 1);
        assert_eq!(table.num_toks(), 1);
        assert_eq!(table.term_name(SymbolTable::EOF), "$eof");
        assert_eq!(table.term_name(SymbolTable::ERROR), "$error");
        assert_eq!(table.find_term("$error"), Some(SymbolTable::ERROR));
    }

    #[test]
    fn factories_are_idempotent() {
        let cfg = Config::default();
        let mut table = SymbolTable::new();
        let plus = table.lit(&cfg, "'+'").unwrap();
        assert_eq!(table.lit(&cfg, "'+'").unwrap(), plus);
        let num = table.token(&cfg, "Number", "[0-9]+").unwrap();
        assert_eq!(table.token(&cfg, "Number", "ignored").unwrap(), num);
        let expr = table.nt(&cfg, "expr").unwrap();
        assert_eq!(table.nt(&cfg, "expr").unwrap(), expr);
    }

    #[test]
    fn name_spaces_are_disjoint() {
        let cfg = Config::default();
        let mut table = SymbolTable::new();
        table.token(&cfg, "Number", "[0-9]+").unwrap();
        assert_eq!(table.nt(&cfg, "Number"), Err(SymbolError::NameClash { name: "Number".to_string() }));
        table.nt(&cfg, "expr").unwrap();
        assert!(matches!(table.token(&cfg, "expr", "x"), Err(SymbolError::NameClash { .. })));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let cfg = Config::default();
        let mut table = SymbolTable::new();
        assert!(matches!(table.lit(&cfg, "plus"), Err(SymbolError::InvalidName { .. })));
        assert!(matches!(table.token(&cfg, "3rd", "x"), Err(SymbolError::InvalidName { .. })));
        assert!(matches!(table.nt(&cfg, "'q'"), Err(SymbolError::InvalidName { .. })));
    }

    #[test]
    fn empty_matching_pattern_is_rejected() {
        let cfg = Config::default();
        let mut table = SymbolTable::new();
        assert_eq!(table.token(&cfg, "Bad", "[0-9]*"),
                   Err(SymbolError::EmptyMatch { name: "Bad".to_string() }));
    }

    #[test]
    fn term_ordinals() {
        let cfg = Config::default();
        let mut table = SymbolTable::new();
        let plus = table.lit(&cfg, "'+'").unwrap();
        let num = table.token(&cfg, "Number", "[0-9]+").unwrap();
        assert_eq!(table.term_ord(SymbolTable::EOF), 0);
        assert_eq!(table.term_ord(plus), 1);
        assert_eq!(table.term_ord(SymbolTable::ERROR), 2);
        assert_eq!(table.term_ord(num), 3);
        assert_eq!(table.term_of_ord(3), Some(num));
    }

    #[test]
    fn precedence_levels() {
        let cfg = Config::default();
        let mut table = SymbolTable::new();
        let plus = table.lit(&cfg, "'+'").unwrap();
        let star = table.lit(&cfg, "'*'").unwrap();
        assert_eq!(table.precedence(Assoc::Left, &[plus]).unwrap(), 0);
        assert_eq!(table.precedence(Assoc::Left, &[star]).unwrap(), 1);
        assert_eq!(table.term_prec(star), Some((1, Assoc::Left)));
        assert!(matches!(table.precedence(Assoc::Right, &[plus]),
                         Err(SymbolError::DuplicatePrecedence { .. })));
    }

    #[test]
    fn literal_escapes() {
        assert_eq!(unescape_literal(r"a\'b").unwrap(), "a'b");
        assert_eq!(unescape_literal(r"\\").unwrap(), "\\");
        assert_eq!(unescape_literal(r"\n\t\r\b\f\v").unwrap(), "\n\t\r\u{8}\u{c}\u{b}");
        assert_eq!(unescape_literal(r"\x41B").unwrap(), "AB");
        assert_eq!(unescape_literal(r"\q").unwrap(), "q");
        assert!(unescape_literal(r"\x4").is_err());
    }
}
