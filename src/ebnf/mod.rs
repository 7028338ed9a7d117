// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.


use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use crate::config::Config;
use crate::log::{BufLog, Logger};
use crate::symbols::{Assoc, SymbolTable, Term};
use crate::{CollectJoin, GrammarError, VarId};

pub type NodeId = usize;
pub type TermSet = BTreeSet<Term>;

/// One node of the EBNF tree. The tree lives in a flat arena owned by the
/// grammar; children are arena indices.
///
/// `Alt`, `Opt` and `Plus` have the same structure (a list of `Seq`
/// alternatives) and differ in semantics: choice, zero-or-one, one-or-more.
#[derive(Clone, PartialEq, Debug)]
pub enum Node {
    T(Term),
    Nt(VarId),
    Seq { items: Vec<NodeId>, prec: Option<Term> },
    Alt(Vec<NodeId>),
    Opt(Vec<NodeId>),
    Plus(Vec<NodeId>),
}

impl Node {
    pub fn is_opt(&self) -> bool {
        matches!(self, Node::Opt(_))
    }

    /// Label used by the analysis and parse traces.
    pub fn label(&self) -> &'static str {
        match self {
            Node::T(_) => "term",
            Node::Nt(_) => "nt",
            Node::Seq { .. } => "seq",
            Node::Alt(_) => "alt",
            Node::Opt(_) => "opt",
            Node::Plus(_) => "some",
        }
    }
}

// ---------------------------------------------------------------------------------------------

/// EBNF grammar: rules over a node arena, with the `expect`/`follow` sets
/// computed by [`expect()`](Ebnf::expect) and validated by
/// [`check()`](Ebnf::check).
///
/// A non-terminal owns at most one rule; the start rule is the first one
/// defined. The grammar is frozen once analyzed.
pub struct Ebnf {
    pub cfg: Config,
    pub syms: SymbolTable,
    pub log: BufLog,
    nodes: Vec<Node>,
    rules: Vec<Option<NodeId>>,
    rule_order: Vec<VarId>,
    expect: Vec<TermSet>,
    follow: Vec<TermSet>,
    reached: Vec<bool>,
    recursive: Vec<bool>,
    analyzed: bool,
    checked: bool,
}

impl Ebnf {
    pub fn new() -> Self {
        Ebnf::with_config(Config::default())
    }

    pub fn with_config(cfg: Config) -> Self {
        Ebnf {
            cfg,
            syms: SymbolTable::new(),
            log: BufLog::new(),
            nodes: Vec::new(),
            rules: Vec::new(),
            rule_order: Vec::new(),
            expect: Vec::new(),
            follow: Vec::new(),
            reached: Vec::new(),
            recursive: Vec::new(),
            analyzed: false,
            checked: false,
        }
    }

    // -------------------------------------------------------------------------
    // construction

    pub fn token(&mut self, name: &str, pattern: &str) -> Result<Term, GrammarError> {
        self.assert_open()?;
        Ok(self.syms.token(&self.cfg, name, pattern)?)
    }

    /// Creates the next precedence group from terminal names (quoted form for
    /// literals, identifiers for tokens).
    pub fn precedence(&mut self, assoc: Assoc, names: &[&str]) -> Result<u16, GrammarError> {
        self.assert_open()?;
        let mut terms = Vec::new();
        for name in names {
            terms.push(self.resolve_term(name)?);
        }
        Ok(self.syms.precedence(assoc, &terms)?)
    }

    /// Resolves a terminal name, creating the literal if it is new.
    pub fn resolve_term(&mut self, name: &str) -> Result<Term, GrammarError> {
        if name.starts_with('\'') {
            Ok(self.syms.lit(&self.cfg, name)?)
        } else {
            self.syms.find_term(name)
                .ok_or(GrammarError::Symbol(crate::symbols::SymbolError::UnknownSymbol { name: name.to_string() }))
        }
    }

    fn add(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Leaf for the literal written as `text`, creating the symbol if new.
    pub fn lit(&mut self, text: &str) -> Result<NodeId, GrammarError> {
        let t = self.syms.lit(&self.cfg, text)?;
        self.syms.mark_used(t);
        Ok(self.add(Node::T(t)))
    }

    /// Leaf for an existing token.
    pub fn tok(&mut self, name: &str) -> Result<NodeId, GrammarError> {
        let t = self.syms.find_term(name)
            .ok_or(GrammarError::Symbol(crate::symbols::SymbolError::UnknownSymbol { name: name.to_string() }))?;
        self.syms.mark_used(t);
        Ok(self.add(Node::T(t)))
    }

    pub fn term(&mut self, t: Term) -> NodeId {
        self.syms.mark_used(t);
        self.add(Node::T(t))
    }

    /// Leaf referring to the non-terminal `name` (registered on first use,
    /// defined later by its rule).
    pub fn nt(&mut self, name: &str) -> Result<NodeId, GrammarError> {
        let v = self.syms.nt(&self.cfg, name)?;
        Ok(self.add(Node::Nt(v)))
    }

    pub fn seq(&mut self, items: Vec<NodeId>) -> NodeId {
        self.add(Node::Seq { items, prec: None })
    }

    pub fn seq_prec(&mut self, items: Vec<NodeId>, prec: Term) -> NodeId {
        self.add(Node::Seq { items, prec: Some(prec) })
    }

    pub fn alt(&mut self, seqs: Vec<NodeId>) -> NodeId {
        self.add(Node::Alt(seqs))
    }

    pub fn opt(&mut self, seqs: Vec<NodeId>) -> NodeId {
        self.add(Node::Opt(seqs))
    }

    pub fn plus(&mut self, seqs: Vec<NodeId>) -> NodeId {
        self.add(Node::Plus(seqs))
    }

    /// Attaches `body` as the defining rule of non-terminal `name`. The first
    /// rule defined becomes the start rule. Bodies that are not already an
    /// `Alt` are wrapped, so `rule("x", seq)` and `rule("x", leaf)` work.
    pub fn rule(&mut self, name: &str, body: NodeId) -> Result<VarId, GrammarError> {
        self.assert_open()?;
        let v = self.syms.nt(&self.cfg, name)?;
        if self.rules.len() <= v as usize {
            self.rules.resize(v as usize + 1, None);
        }
        if self.rules[v as usize].is_some() {
            return Err(GrammarError::DuplicateRule(name.to_string()));
        }
        let body = match self.nodes[body] {
            Node::Alt(_) => body,
            Node::Seq { .. } => self.alt(vec![body]),
            Node::T(_) | Node::Nt(_) | Node::Opt(_) | Node::Plus(_) => {
                let s = self.seq(vec![body]);
                self.alt(vec![s])
            }
        };
        self.rules[v as usize] = Some(body);
        self.rule_order.push(v);
        Ok(v)
    }

    fn assert_open(&self) -> Result<(), GrammarError> {
        if self.analyzed { Err(GrammarError::Frozen) } else { Ok(()) }
    }

    // -------------------------------------------------------------------------
    // access

    pub fn start(&self) -> Option<VarId> {
        self.rule_order.first().copied()
    }

    pub fn rule_order(&self) -> &[VarId] {
        &self.rule_order
    }

    pub fn rule_node(&self, v: VarId) -> Option<NodeId> {
        self.rules.get(v as usize).copied().flatten()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn expect_of(&self, id: NodeId) -> &TermSet {
        &self.expect[id]
    }

    pub fn follow_of(&self, id: NodeId) -> &TermSet {
        &self.follow[id]
    }

    pub fn is_reached(&self, v: VarId) -> bool {
        self.reached.get(v as usize).copied().unwrap_or(false)
    }

    pub fn is_recursive(&self, v: VarId) -> bool {
        self.recursive.get(v as usize).copied().unwrap_or(false)
    }

    pub fn is_checked(&self) -> bool {
        self.checked
    }

    pub fn set_to_str(&self, set: &TermSet) -> String {
        set.iter().map(|t| self.syms.term_name(*t)).join(", ")
    }

    // -------------------------------------------------------------------------
    // analysis

    /// Computes the `expect` and `follow` sets of every node, in three passes:
    /// shallow (first-of, detects left recursion), deep (reachability), and
    /// the iterative follow fixpoint. May only run once; later calls are
    /// no-ops.
    pub fn expect(&mut self) -> Result<(), GrammarError> {
        if self.analyzed {
            return Ok(());
        }
        if self.rule_order.is_empty() {
            return Err(GrammarError::NoRules);
        }
        let errors_before = self.log.num_errors();
        self.validate_refs();
        if self.log.num_errors() > errors_before {
            return Err(GrammarError::Check { errors: self.log.num_errors() - errors_before });
        }
        self.expect = vec![TermSet::new(); self.nodes.len()];
        self.follow = vec![TermSet::new(); self.nodes.len()];
        self.reached = vec![false; self.rules.len()];
        self.recursive = vec![false; self.rules.len()];
        self.analyzed = true;

        // 1. shallow: first-of, left-to-right
        let mut busy = vec![false; self.rules.len()];
        let mut done = vec![false; self.nodes.len()];
        for &v in &self.rule_order.clone() {
            self.shallow_rule(v, &mut busy, &mut done);
        }
        // 2. deep: reachability from the start rule, right-to-left
        let mut visited = vec![false; self.rules.len()];
        self.deep_rule(self.rule_order[0], &mut visited);
        // 3. follow: iterative fixpoint, seeded with the empty set on the
        // start rule
        loop {
            let mut changed = false;
            for &v in &self.rule_order.clone() {
                if !self.reached[v as usize] {
                    continue;
                }
                let root = self.rules[v as usize].unwrap();
                let seed = self.follow[root].clone();
                changed |= self.follow_node(root, seed);
            }
            if self.cfg.trace.follow {
                self.log.add_note(format!("follow: pass {}", if changed { "changed, again" } else { "stable" }));
            }
            if !changed {
                break;
            }
        }
        Ok(())
    }

    fn validate_refs(&mut self) {
        // undefined non-terminals and all-optional sequences are reported
        // before the set computation, which relies on both
        let mut msgs = Vec::new();
        for node in &self.nodes {
            match node {
                Node::Nt(v) => {
                    if self.rule_node(*v).is_none() {
                        let msg = format!("non-terminal '{}' is used but not defined", self.syms.nt_name(*v));
                        if !msgs.contains(&msg) {
                            msgs.push(msg);
                        }
                    }
                }
                Node::Seq { items, .. } => {
                    if !items.is_empty() && items.iter().all(|i| self.nodes[*i].is_opt()) {
                        msgs.push("sequence with only optional phrases".to_string());
                    }
                    if items.is_empty() {
                        msgs.push("empty sequence".to_string());
                    }
                }
                _ => {}
            }
        }
        for msg in msgs {
            self.log.add_error(msg);
        }
    }

    fn shallow_rule(&mut self, v: VarId, busy: &mut Vec<bool>, done: &mut Vec<bool>) -> TermSet {
        if busy[v as usize] {
            // second nested entry: left recursion
            self.recursive[v as usize] = true;
            return TermSet::new();
        }
        let root = self.rules[v as usize].unwrap();
        if done[root] {
            return self.expect[root].clone();
        }
        if self.cfg.trace.shallow {
            self.log.add_note(format!("shallow: enter rule {}", self.syms.nt_name(v)));
        }
        busy[v as usize] = true;
        let set = self.shallow_node(root, busy, done);
        busy[v as usize] = false;
        if self.cfg.trace.shallow {
            self.log.add_note(format!("shallow: exit rule {} -> {{{}}}", self.syms.nt_name(v), self.set_to_str(&set)));
        }
        set
    }

    fn shallow_node(&mut self, id: NodeId, busy: &mut Vec<bool>, done: &mut Vec<bool>) -> TermSet {
        if done[id] {
            return self.expect[id].clone();
        }
        let node = self.nodes[id].clone();
        let set = match node {
            Node::T(t) => TermSet::from([t]),
            Node::Nt(v) => self.shallow_rule(v, busy, done),
            Node::Seq { items, .. } => {
                // accumulate until the first non-optional item, but compute
                // the set of every item
                let sets = items.iter().map(|i| self.shallow_node(*i, busy, done)).to_vec();
                let mut acc = TermSet::new();
                for (i, s) in items.iter().zip(sets) {
                    acc.extend(s);
                    if !self.nodes[*i].is_opt() {
                        break;
                    }
                }
                acc
            }
            Node::Alt(ch) | Node::Opt(ch) | Node::Plus(ch) => {
                let mut acc = TermSet::new();
                for c in ch {
                    acc.extend(self.shallow_node(c, busy, done));
                }
                acc
            }
        };
        self.expect[id] = set.clone();
        done[id] = true;
        set
    }

    fn deep_rule(&mut self, v: VarId, visited: &mut Vec<bool>) {
        if visited[v as usize] {
            return;
        }
        visited[v as usize] = true;
        self.reached[v as usize] = true;
        if self.cfg.trace.deep {
            self.log.add_note(format!("deep: rule {}", self.syms.nt_name(v)));
        }
        let root = self.rules[v as usize].unwrap();
        self.deep_node(root, visited);
    }

    fn deep_node(&mut self, id: NodeId, visited: &mut Vec<bool>) {
        match self.nodes[id].clone() {
            Node::T(_) => {}
            Node::Nt(v) => self.deep_rule(v, visited),
            Node::Seq { items, .. } => {
                for &i in items.iter().rev() {
                    self.deep_node(i, visited);
                }
            }
            Node::Alt(ch) | Node::Opt(ch) | Node::Plus(ch) => {
                for c in ch {
                    self.deep_node(c, visited);
                }
            }
        }
    }

    /// Imports `acc` into the node's follow set and pushes it down, returning
    /// whether any set grew.
    fn follow_node(&mut self, id: NodeId, acc: TermSet) -> bool {
        let mut changed = union_into(&mut self.follow[id], &acc);
        match self.nodes[id].clone() {
            Node::T(_) => {}
            Node::Nt(v) => {
                // what follows the reference follows the rule
                let root = self.rules[v as usize].unwrap();
                let f = self.follow[id].clone();
                changed |= union_into(&mut self.follow[root], &f);
            }
            Node::Seq { items, .. } => {
                // push the accumulator right-to-left; an optional item
                // carries its expect over to its left neighbour
                let mut acc = self.follow[id].clone();
                for &i in items.iter().rev() {
                    changed |= self.follow_node(i, acc.clone());
                    if self.nodes[i].is_opt() {
                        let e = self.expect[i].clone();
                        acc.extend(e);
                    } else {
                        acc = self.expect[i].clone();
                    }
                }
            }
            Node::Alt(ch) | Node::Opt(ch) => {
                let f = self.follow[id].clone();
                for c in ch {
                    changed |= self.follow_node(c, f.clone());
                }
            }
            Node::Plus(ch) => {
                // a repetition may be followed by another turn of itself
                let mut f = self.follow[id].clone();
                let e = self.expect[id].clone();
                f.extend(e);
                for c in ch {
                    changed |= self.follow_node(c, f.clone());
                }
            }
        }
        changed
    }

    // -------------------------------------------------------------------------
    // check

    /// Runs [`expect()`](Ebnf::expect) and validates the grammar: no left
    /// recursion, no unreachable rule, and unambiguous lookahead for every
    /// alternative, optional and repeated phrase.
    pub fn check(&mut self) -> Result<(), GrammarError> {
        let was_checked = self.checked;
        self.expect()?;
        if was_checked {
            return Ok(());
        }
        let errors_before = self.log.num_errors();
        let mut msgs = Vec::new();
        for &v in &self.rule_order {
            let name = self.syms.nt_name(v);
            if self.recursive[v as usize] {
                msgs.push(format!("rule '{name}' is left-recursive"));
            } else if !self.reached[v as usize] {
                msgs.push(format!("rule '{name}' is unreachable"));
            }
        }
        for id in 0..self.nodes.len() {
            match &self.nodes[id] {
                Node::Alt(ch) | Node::Opt(ch) | Node::Plus(ch) => {
                    let ch = ch.clone();
                    for i in 0..ch.len() {
                        for j in i + 1..ch.len() {
                            let common = self.expect[ch[i]].intersection(&self.expect[ch[j]])
                                .cloned().collect::<TermSet>();
                            if !common.is_empty() {
                                msgs.push(format!(
                                    "ambiguous, lookahead can select more than one alternative: {}",
                                    self.set_to_str(&common)));
                            }
                        }
                    }
                    if !matches!(self.nodes[id], Node::Alt(_)) {
                        let common = self.expect[id].intersection(&self.follow[id])
                            .cloned().collect::<TermSet>();
                        if !common.is_empty() {
                            let what = if self.nodes[id].is_opt() { "optional" } else { "repeated" };
                            msgs.push(format!(
                                "ambiguous, {what} phrase can start with what may follow it: {}",
                                self.set_to_str(&common)));
                        }
                    }
                }
                _ => {}
            }
        }
        for msg in msgs {
            self.log.add_error(msg);
        }
        self.checked = true;
        let errors = self.log.num_errors() - errors_before;
        if errors > 0 {
            Err(GrammarError::Check { errors })
        } else {
            Ok(())
        }
    }

    // -------------------------------------------------------------------------
    // rendering

    pub fn node_to_str(&self, id: NodeId) -> String {
        match &self.nodes[id] {
            Node::T(t) => self.syms.term_name(*t),
            Node::Nt(v) => self.syms.nt_name(*v),
            Node::Seq { items, prec } => {
                let mut s = items.iter().map(|i| self.node_to_str(*i)).join(" ");
                if let Some(p) = prec {
                    s.push_str(&format!(" %prec {}", self.syms.term_name(*p)));
                }
                s
            }
            Node::Alt(ch) => ch.iter().map(|c| self.node_to_str(*c)).join(" | "),
            Node::Opt(ch) => format!("[ {} ]", ch.iter().map(|c| self.node_to_str(*c)).join(" | ")),
            Node::Plus(ch) => format!("{{ {} }}", ch.iter().map(|c| self.node_to_str(*c)).join(" | ")),
        }
    }

    pub fn rule_to_str(&self, v: VarId) -> String {
        match self.rule_node(v) {
            Some(root) => format!("{}: {};", self.syms.nt_name(v), self.node_to_str(root)),
            None => format!("{}: <undefined>;", self.syms.nt_name(v)),
        }
    }
}

impl Default for Ebnf {
    fn default() -> Self {
        Ebnf::new()
    }
}

impl Display for Ebnf {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for group in self.syms.groups() {
            let terms = group.terms.iter().map(|t| self.syms.term_name(*t)).join(" ");
            writeln!(f, "{} {};", group.assoc, terms)?;
        }
        for &v in &self.rule_order {
            writeln!(f, "{}", self.rule_to_str(v))?;
        }
        Ok(())
    }
}

fn union_into(dst: &mut TermSet, src: &TermSet) -> bool {
    let before = dst.len();
    dst.extend(src.iter().cloned());
    dst.len() > before
}
