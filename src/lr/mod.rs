// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.

mod tests;
pub mod parser;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{Display, Formatter};
use crate::bnf::Bnf;
use crate::log::Logger;
use crate::symbols::{Assoc, Sym, SymbolTable};

pub use parser::{LrOutcome, LrParser};

/// A marked rule: `pos` is the dot position in the right-hand side,
/// `pos == |rhs|` means the mark is complete.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Mark {
    pub rule: usize,
    pub pos: usize,
}

impl Mark {
    pub fn complete(&self, g: &Bnf) -> bool {
        self.pos == g.rule_at(self.rule).rhs.len()
    }

    /// The symbol right after the dot, if any.
    pub fn sym_after(&self, g: &Bnf) -> Option<Sym> {
        g.rule_at(self.rule).rhs.get(self.pos).copied()
    }

    pub fn advanced(&self) -> Mark {
        Mark { rule: self.rule, pos: self.pos + 1 }
    }
}

/// Table entry directing the LR parser.
#[derive(Clone, PartialEq, Debug)]
pub enum Message {
    Shift(usize),
    Goto(usize),
    Reduce(usize),
    Accept,
    /// Entry removed by a non-associative conflict: hitting it is a syntax
    /// error with this explanation.
    Error(String),
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Shift(s) => write!(f, "shift {s}"),
            Message::Goto(s) => write!(f, "goto {s}"),
            Message::Reduce(r) => write!(f, "reduce {r}"),
            Message::Accept => write!(f, "accept"),
            Message::Error(msg) => write!(f, "error ({msg})"),
        }
    }
}

/// One state of the canonical collection: the kernel marks (the first `core`
/// entries), their closure, and the message map keyed by symbol ordinal.
///
/// Two states are the same state iff their kernels hold the same set of
/// marks.
#[derive(Clone, Debug)]
pub struct State {
    pub marks: Vec<Mark>,
    pub core: usize,
    pub msgs: BTreeMap<u16, Message>,
}

// ---------------------------------------------------------------------------------------------

/// Builds the canonical LR(0) collection and fills the message maps,
/// resolving conflicts by precedence and counting the rest in `g.sr`/`g.rr`.
/// Also sets each rule's `reduced` flag.
pub(crate) fn build_states(g: &mut Bnf) {
    const VERBOSE: bool = false;
    let eof_ord = g.syms.term_ord(SymbolTable::EOF);
    let mut states = vec![make_state(g, vec![Mark { rule: 0, pos: 0 }])];
    let mut by_core = HashMap::<BTreeSet<Mark>, usize>::new();
    by_core.insert(BTreeSet::from([Mark { rule: 0, pos: 0 }]), 0);

    let mut i = 0;
    while i < states.len() {
        let marks = states[i].marks.clone();
        if VERBOSE {
            println!("state {i}: {} mark(s)", marks.len());
        }
        // every symbol after a dot gets an entry; completes fill in reduces
        let mut pending = BTreeMap::<u16, Option<Message>>::new();
        for mark in &marks {
            if let Some(sym) = mark.sym_after(g) {
                pending.entry(g.syms.sym_ord(sym)).or_insert(None);
            }
        }
        for mark in &marks {
            if !mark.complete(g) {
                continue;
            }
            let r = mark.rule;
            let lhs = g.rule_at(r).lhs;
            let follow = g.nt_follow_of(lhs).clone();
            for t in follow {
                let ord = g.syms.term_ord(t);
                match pending.get(&ord).cloned() {
                    None => {
                        pending.insert(ord, Some(Message::Reduce(r)));
                    }
                    Some(None) => {
                        // shift/reduce: try precedence, else count and shift
                        match (g.rule_precedence(r), g.syms.term_prec(t)) {
                            (Some((rp, _)), Some((tp, assoc))) => {
                                if rp > tp {
                                    pending.insert(ord, Some(Message::Reduce(r)));
                                } else if rp == tp {
                                    match assoc {
                                        Assoc::Left => {
                                            pending.insert(ord, Some(Message::Reduce(r)));
                                        }
                                        Assoc::Right => {}
                                        Assoc::NonAssoc => {
                                            pending.insert(ord, Some(Message::Error(
                                                format!("{} is non-associative", g.syms.term_name(t)))));
                                        }
                                    }
                                }
                                // rp < tp: keep the shift
                            }
                            _ => {
                                g.sr += 1;
                                let msg = format!(
                                    "state {i}: shift/reduce conflict on {} with rule {}, shifting",
                                    g.syms.term_name(t), g.rule_to_str(r));
                                g.log.add_warning(msg);
                            }
                        }
                    }
                    Some(Some(Message::Reduce(r2))) => {
                        // reduce/reduce: keep the rule earlier in source order
                        g.rr += 1;
                        let msg = format!(
                            "state {i}: reduce/reduce conflict on {} between rules {} and {}, keeping rule {}",
                            g.syms.term_name(t), r2, r, r2.min(r));
                        g.log.add_warning(msg);
                        if r < r2 {
                            pending.insert(ord, Some(Message::Reduce(r)));
                        }
                    }
                    Some(Some(_)) => {}
                }
            }
        }
        // remaining null entries become accept, shifts and gotos
        let symbols = pending.iter()
            .filter_map(|(ord, slot)| if slot.is_none() { Some(*ord) } else { None })
            .collect::<Vec<_>>();
        for ord in symbols {
            if ord == eof_ord {
                pending.insert(ord, Some(Message::Accept));
                continue;
            }
            let is_nt = ord as usize >= g.syms.num_terms();
            let core = marks.iter()
                .filter(|m| m.sym_after(g).map(|s| g.syms.sym_ord(s)) == Some(ord))
                .map(|m| m.advanced())
                .collect::<BTreeSet<_>>();
            let target = match by_core.get(&core).copied() {
                Some(t) => t,
                None => {
                    let t = states.len();
                    states.push(make_state(g, core.iter().cloned().collect()));
                    by_core.insert(core, t);
                    t
                }
            };
            let msg = if is_nt { Message::Goto(target) } else { Message::Shift(target) };
            pending.insert(ord, Some(msg));
        }
        states[i].msgs = pending.into_iter()
            .map(|(ord, slot)| (ord, slot.expect("every entry was filled")))
            .collect();
        // reduce and accept entries mark their rule as reduced
        let reduced = states[i].msgs.values().filter_map(|m| match m {
            Message::Reduce(r) => Some(*r),
            Message::Accept => Some(0),
            _ => None,
        }).collect::<Vec<_>>();
        for r in reduced {
            g.rules[r].reduced = true;
        }
        i += 1;
    }
    g.states = states;
}

/// New state from a kernel: the closure adds `(rule, 0)` for every rule of a
/// non-terminal sitting after a dot, in discovery order.
fn make_state(g: &Bnf, core: Vec<Mark>) -> State {
    let core_len = core.len();
    let mut marks = core;
    let mut seen = marks.iter().cloned().collect::<BTreeSet<_>>();
    let mut i = 0;
    while i < marks.len() {
        if let Some(Sym::Nt(v)) = marks[i].sym_after(g) {
            for &r in &g.by_lhs[v as usize] {
                let mark = Mark { rule: r, pos: 0 };
                if seen.insert(mark) {
                    marks.push(mark);
                }
            }
        }
        i += 1;
    }
    State { marks, core: core_len, msgs: BTreeMap::new() }
}
