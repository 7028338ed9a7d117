// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.

mod tests;

use std::collections::{BTreeSet, HashMap};
use std::fmt::{Display, Formatter};
use crate::config::Config;
use crate::ebnf::TermSet;
use crate::log::{BufLog, Logger};
use crate::lr::State;
use crate::symbols::{Assoc, Sym, SymbolTable, Term};
use crate::{CollectJoin, GrammarError, VarId};

/// One ordered-pair rule `lhs → rhs`, with the flags computed by
/// [`check()`](Bnf::check).
#[derive(Clone, Debug)]
pub struct Rule {
    pub lhs: VarId,
    pub rhs: Vec<Sym>,
    /// Explicit `%prec` terminal; without it the precedence defaults to the
    /// rightmost right-hand-side terminal carrying one.
    pub prec: Option<Term>,
    pub first: TermSet,
    pub empty: bool,
    pub reached: bool,
    pub finite: bool,
    pub reduced: bool,
}

/// How reductions of a synthesized non-terminal rebuild their value, so that
/// actions see the same shapes as in the EBNF form.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum SynthKind {
    /// `[…]` helper: empty rule yields null, others their phrase value.
    Maybe,
    /// `{…}` item helper: yields the phrase value.
    Item,
    /// `{…}` list helper: flattens the left operand list.
    List,
}

// ---------------------------------------------------------------------------------------------

/// BNF grammar: ordered rules over shared symbols, analyzed into
/// first/follow sets and the SLR(1) state collection by
/// [`check()`](Bnf::check).
pub struct Bnf {
    pub cfg: Config,
    pub syms: SymbolTable,
    pub log: BufLog,
    pub(crate) rules: Vec<Rule>,
    pub(crate) by_lhs: Vec<Vec<usize>>,
    start: Option<VarId>,
    accept_var: Option<VarId>,
    pub(crate) nt_first: Vec<TermSet>,
    pub(crate) nt_follow: Vec<TermSet>,
    pub(crate) nt_empty: Vec<bool>,
    nt_finite: Vec<bool>,
    nt_reached: Vec<bool>,
    pub(crate) states: Vec<State>,
    /// Shift/reduce conflicts counted during table construction.
    pub sr: u32,
    /// Reduce/reduce conflicts counted during table construction.
    pub rr: u32,
    synth: HashMap<VarId, SynthKind>,
    checked: bool,
}

impl Bnf {
    pub fn new() -> Self {
        Bnf::with_config(Config::default())
    }

    pub fn with_config(cfg: Config) -> Self {
        Bnf::from_parts(cfg, SymbolTable::new())
    }

    /// Builds an empty grammar over an existing symbol table (used by the
    /// EBNF translation, which copies the tokens and precedences over).
    pub fn from_parts(cfg: Config, syms: SymbolTable) -> Self {
        Bnf {
            cfg,
            syms,
            log: BufLog::new(),
            rules: Vec::new(),
            by_lhs: Vec::new(),
            start: None,
            accept_var: None,
            nt_first: Vec::new(),
            nt_follow: Vec::new(),
            nt_empty: Vec::new(),
            nt_finite: Vec::new(),
            nt_reached: Vec::new(),
            states: Vec::new(),
            sr: 0,
            rr: 0,
            synth: HashMap::new(),
            checked: false,
        }
    }

    // -------------------------------------------------------------------------
    // construction

    pub fn token(&mut self, name: &str, pattern: &str) -> Result<Term, GrammarError> {
        self.assert_open()?;
        Ok(self.syms.token(&self.cfg, name, pattern)?)
    }

    pub fn precedence(&mut self, assoc: Assoc, names: &[&str]) -> Result<u16, GrammarError> {
        self.assert_open()?;
        let mut terms = Vec::new();
        for name in names {
            terms.push(self.resolve_term(name)?);
        }
        Ok(self.syms.precedence(assoc, &terms)?)
    }

    pub fn resolve_term(&mut self, name: &str) -> Result<Term, GrammarError> {
        if name.starts_with('\'') {
            Ok(self.syms.lit(&self.cfg, name)?)
        } else {
            self.syms.find_term(name)
                .ok_or(GrammarError::Symbol(crate::symbols::SymbolError::UnknownSymbol { name: name.to_string() }))
        }
    }

    /// Adds a rule. A non-terminal may own several rules; their order is the
    /// source order used to break reduce/reduce ties.
    pub fn rule(&mut self, name: &str, rhs: Vec<Sym>) -> Result<usize, GrammarError> {
        self.add_rule(name, rhs, None)
    }

    /// Adds a rule with an explicit `%prec` terminal.
    pub fn rule_prec(&mut self, name: &str, rhs: Vec<Sym>, prec: Term) -> Result<usize, GrammarError> {
        self.add_rule(name, rhs, Some(prec))
    }

    fn add_rule(&mut self, name: &str, rhs: Vec<Sym>, prec: Option<Term>) -> Result<usize, GrammarError> {
        self.assert_open()?;
        let lhs = self.syms.nt(&self.cfg, name)?;
        self.add_rule_var(lhs, rhs, prec)
    }

    pub(crate) fn add_rule_var(&mut self, lhs: VarId, rhs: Vec<Sym>, prec: Option<Term>) -> Result<usize, GrammarError> {
        for sym in &rhs {
            if let Sym::T(t) = sym {
                self.syms.mark_used(*t);
            }
        }
        self.rules.push(Rule {
            lhs,
            rhs,
            prec,
            first: TermSet::new(),
            empty: false,
            reached: false,
            finite: false,
            reduced: false,
        });
        Ok(self.rules.len() - 1)
    }

    /// Adds a rule from symbol names: quoted forms are literals (created on
    /// first use), known token names and `$error` are terminals, anything
    /// else refers to a non-terminal.
    pub fn rule_named(&mut self, name: &str, rhs_names: &[&str]) -> Result<usize, GrammarError> {
        let mut rhs = Vec::with_capacity(rhs_names.len());
        for n in rhs_names {
            rhs.push(self.resolve_sym(n)?);
        }
        self.rule(name, rhs)
    }

    pub fn resolve_sym(&mut self, name: &str) -> Result<Sym, GrammarError> {
        if name.starts_with('\'') {
            return Ok(Sym::T(self.syms.lit(&self.cfg, name)?));
        }
        if let Some(t) = self.syms.find_term(name) {
            return Ok(Sym::T(t));
        }
        Ok(Sym::Nt(self.syms.nt(&self.cfg, name)?))
    }

    pub(crate) fn set_synth(&mut self, v: VarId, kind: SynthKind) {
        self.synth.insert(v, kind);
    }

    fn assert_open(&self) -> Result<(), GrammarError> {
        if self.checked { Err(GrammarError::Frozen) } else { Ok(()) }
    }

    // -------------------------------------------------------------------------
    // access

    pub fn num_rules(&self) -> usize {
        self.rules.len()
    }

    pub fn rule_at(&self, index: usize) -> &Rule {
        &self.rules[index]
    }

    pub fn rules(&self) -> impl Iterator<Item = (usize, &Rule)> {
        self.rules.iter().enumerate()
    }

    pub fn start(&self) -> Option<VarId> {
        self.start
    }

    pub fn accept_var(&self) -> Option<VarId> {
        self.accept_var
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn state(&self, index: usize) -> &State {
        &self.states[index]
    }

    pub fn is_checked(&self) -> bool {
        self.checked
    }

    pub fn synth_kind(&self, v: VarId) -> Option<SynthKind> {
        self.synth.get(&v).copied()
    }

    pub fn nt_follow_of(&self, v: VarId) -> &TermSet {
        &self.nt_follow[v as usize]
    }

    pub fn nt_first_of(&self, v: VarId) -> &TermSet {
        &self.nt_first[v as usize]
    }

    /// Effective precedence of a rule: the explicit `%prec` terminal or the
    /// rightmost right-hand-side terminal carrying a precedence.
    pub fn rule_precedence(&self, index: usize) -> Option<(u16, Assoc)> {
        let rule = &self.rules[index];
        if let Some(t) = rule.prec {
            return self.syms.term_prec(t);
        }
        rule.rhs.iter().rev().find_map(|s| match s {
            Sym::T(t) => self.syms.term_prec(*t),
            Sym::Nt(_) => None,
        })
    }

    pub fn rule_to_str(&self, index: usize) -> String {
        let rule = &self.rules[index];
        let rhs = if rule.rhs.is_empty() {
            "<empty>".to_string()
        } else {
            rule.rhs.iter().map(|s| self.syms.sym_name(*s)).join(" ")
        };
        let prec = match rule.prec {
            Some(t) => format!(" %prec {}", self.syms.term_name(t)),
            None => String::new(),
        };
        format!("{} -> {rhs}{prec}", self.syms.nt_name(rule.lhs))
    }

    pub fn set_to_str(&self, set: &TermSet) -> String {
        set.iter().map(|t| self.syms.term_name(*t)).join(", ")
    }

    // -------------------------------------------------------------------------
    // analysis

    /// Synthesizes rule 0 `$accept → start $eof`, computes the
    /// reached/finite/empty flags and the first/follow sets, then builds the
    /// canonical LR(0) collection and its message table. Conflicts are
    /// counted and logged as warnings; structural problems are errors.
    pub fn check(&mut self, start: &str) -> Result<(), GrammarError> {
        self.assert_open()?;
        if self.rules.is_empty() {
            return Err(GrammarError::NoRules);
        }
        let errors_before = self.log.num_errors();
        let Some(start_var) = self.syms.find_nt(start) else {
            self.log.add_error(format!("start symbol '{start}' is not defined"));
            return Err(GrammarError::Check { errors: 1 });
        };
        self.start = Some(start_var);
        // rule 0: $accept -> start $eof
        let accept = self.syms.add_nt_unchecked("$accept")?;
        self.accept_var = Some(accept);
        self.rules.insert(0, Rule {
            lhs: accept,
            rhs: vec![Sym::Nt(start_var), Sym::T(SymbolTable::EOF)],
            prec: None,
            first: TermSet::new(),
            empty: false,
            reached: false,
            finite: false,
            reduced: false,
        });

        let num_nts = self.syms.num_nts();
        self.by_lhs = vec![Vec::new(); num_nts];
        for (i, rule) in self.rules.iter().enumerate() {
            self.by_lhs[rule.lhs as usize].push(i);
        }
        self.nt_first = vec![TermSet::new(); num_nts];
        self.nt_follow = vec![TermSet::new(); num_nts];
        self.nt_empty = vec![false; num_nts];
        self.nt_finite = vec![false; num_nts];
        self.nt_reached = vec![false; num_nts];

        self.validate_defined();
        if self.log.num_errors() > errors_before {
            return Err(GrammarError::Check { errors: self.log.num_errors() - errors_before });
        }
        self.calc_reached();
        self.calc_finite();
        self.calc_empty();
        self.calc_first();
        self.calc_follow();
        self.validate_shape();
        if self.log.num_errors() > errors_before {
            return Err(GrammarError::Check { errors: self.log.num_errors() - errors_before });
        }

        crate::lr::build_states(self);
        if self.sr + self.rr > 0 {
            self.log.add_warning(format!(
                "{} shift/reduce and {} reduce/reduce conflict(s)", self.sr, self.rr));
        }
        for i in 0..self.rules.len() {
            if self.rules[i].reached && !self.rules[i].reduced {
                let msg = format!("rule {} is never reduced: {}", i, self.rule_to_str(i));
                self.log.add_warning(msg);
            }
        }
        self.checked = true;
        Ok(())
    }

    fn validate_defined(&mut self) {
        let mut missing = BTreeSet::new();
        for rule in &self.rules {
            for sym in &rule.rhs {
                if let Sym::Nt(v) = sym {
                    if self.by_lhs[*v as usize].is_empty() {
                        missing.insert(*v);
                    }
                }
            }
        }
        for v in missing {
            let msg = format!("non-terminal '{}' is used but not defined", self.syms.nt_name(v));
            self.log.add_error(msg);
        }
    }

    fn calc_reached(&mut self) {
        let accept = self.accept_var.unwrap();
        self.nt_reached[accept as usize] = true;
        let mut change = true;
        while change {
            change = false;
            for i in 0..self.rules.len() {
                if !self.nt_reached[self.rules[i].lhs as usize] || self.rules[i].reached {
                    continue;
                }
                self.rules[i].reached = true;
                change = true;
                let rhs = self.rules[i].rhs.clone();
                for sym in rhs {
                    if let Sym::Nt(v) = sym {
                        self.nt_reached[v as usize] = true;
                    }
                }
            }
        }
    }

    fn calc_finite(&mut self) {
        let mut change = true;
        while change {
            change = false;
            for i in 0..self.rules.len() {
                if self.rules[i].finite {
                    continue;
                }
                let finite = self.rules[i].rhs.iter().all(|s| match s {
                    Sym::T(_) => true,
                    Sym::Nt(v) => self.nt_finite[*v as usize],
                });
                if finite {
                    self.rules[i].finite = true;
                    self.nt_finite[self.rules[i].lhs as usize] = true;
                    change = true;
                }
            }
        }
    }

    fn calc_empty(&mut self) {
        // rule.empty is the direct form; nt_empty is the transitive one used
        // by the set computations
        let mut derives = vec![false; self.rules.len()];
        for i in 0..self.rules.len() {
            self.rules[i].empty = self.rules[i].rhs.is_empty();
        }
        let mut change = true;
        while change {
            change = false;
            for i in 0..self.rules.len() {
                if derives[i] {
                    continue;
                }
                let empty = self.rules[i].rhs.iter().all(|s| match s {
                    Sym::T(_) => false,
                    Sym::Nt(v) => self.nt_empty[*v as usize],
                });
                if empty {
                    derives[i] = true;
                    self.nt_empty[self.rules[i].lhs as usize] = true;
                    change = true;
                }
            }
        }
    }

    fn calc_first(&mut self) {
        let mut change = true;
        while change {
            change = false;
            for i in 0..self.rules.len() {
                let mut first = TermSet::new();
                for sym in &self.rules[i].rhs {
                    match sym {
                        Sym::T(t) => {
                            first.insert(*t);
                            break;
                        }
                        Sym::Nt(v) => {
                            first.extend(self.nt_first[*v as usize].iter().cloned());
                            if !self.nt_empty[*v as usize] {
                                break;
                            }
                        }
                    }
                }
                if first.len() > self.rules[i].first.len() {
                    self.rules[i].first = first.clone();
                    change = true;
                }
                let lhs = self.rules[i].lhs as usize;
                let before = self.nt_first[lhs].len();
                self.nt_first[lhs].extend(first);
                change |= self.nt_first[lhs].len() > before;
            }
        }
    }

    fn calc_follow(&mut self) {
        let mut change = true;
        while change {
            change = false;
            for i in 0..self.rules.len() {
                let lhs = self.rules[i].lhs;
                let rhs = self.rules[i].rhs.clone();
                for (pos, sym) in rhs.iter().enumerate() {
                    let Sym::Nt(v) = sym else { continue };
                    // first(suffix), and follow(lhs) if the suffix derives empty
                    let mut add = TermSet::new();
                    let mut empty_suffix = true;
                    for s in &rhs[pos + 1..] {
                        match s {
                            Sym::T(t) => {
                                add.insert(*t);
                                empty_suffix = false;
                                break;
                            }
                            Sym::Nt(w) => {
                                add.extend(self.nt_first[*w as usize].iter().cloned());
                                if !self.nt_empty[*w as usize] {
                                    empty_suffix = false;
                                    break;
                                }
                            }
                        }
                    }
                    if empty_suffix {
                        let f = self.nt_follow[lhs as usize].clone();
                        add.extend(f);
                    }
                    let target = &mut self.nt_follow[*v as usize];
                    let before = target.len();
                    target.extend(add);
                    change |= target.len() > before;
                }
            }
        }
    }

    fn validate_shape(&mut self) {
        let mut msgs = Vec::new();
        for v in 0..self.syms.num_nts() as VarId {
            if self.by_lhs[v as usize].is_empty() {
                continue;
            }
            let name = self.syms.nt_name(v);
            if !self.nt_reached[v as usize] {
                msgs.push(format!("rule '{name}' is unreachable"));
            } else if !self.nt_finite[v as usize] {
                msgs.push(format!("non-terminal '{name}' derives no finite phrase"));
            }
        }
        for msg in msgs {
            self.log.add_error(msg);
        }
    }

    // -------------------------------------------------------------------------
    // dumps

    /// Renders every state with its marks and messages, for table debugging.
    pub fn dump_states(&self) -> String {
        let mut out = String::new();
        for (i, state) in self.states.iter().enumerate() {
            out.push_str(&format!("state {i}:\n"));
            for (n, mark) in state.marks.iter().enumerate() {
                let kernel = if n < state.core { "" } else { "  +" };
                out.push_str(&format!("  {}{kernel}\n", self.mark_to_str(mark)));
            }
            for (ord, msg) in &state.msgs {
                let name = match self.syms.term_of_ord(*ord) {
                    Some(t) => self.syms.term_name(t),
                    None => self.syms.nt_name(*ord - self.syms.num_terms() as u16),
                };
                out.push_str(&format!("  {name}: {msg}\n"));
            }
        }
        out
    }

    pub fn mark_to_str(&self, mark: &crate::lr::Mark) -> String {
        let rule = &self.rules[mark.rule];
        let mut parts = rule.rhs.iter().map(|s| self.syms.sym_name(*s)).to_vec();
        parts.insert(mark.pos, ".".to_string());
        format!("{} -> {}", self.syms.nt_name(rule.lhs), parts.join(" "))
    }
}

impl Default for Bnf {
    fn default() -> Self {
        Bnf::new()
    }
}

impl Display for Bnf {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for group in self.syms.groups() {
            let terms = group.terms.iter().map(|t| self.syms.term_name(*t)).join(" ");
            writeln!(f, "{} {};", group.assoc, terms)?;
        }
        for i in 0..self.rules.len() {
            writeln!(f, "{};", self.rule_to_str(i))?;
        }
        Ok(())
    }
}
