// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.

//! EBNF → BNF translation.
//!
//! Optional and iterated constructs are rewritten into fresh auxiliary
//! non-terminals under the grammar's `uniq` prefix:
//!
//! * `[S₁ | S₂]` becomes `U → ε | S₁ | S₂`,
//! * `{S₁ | S₂}` becomes `U1 → S₁ | S₂` and `U2 → U1 | U2 U1`,
//! * the zero-or-more idiom `[{S}]` merges both into `U1 → S` and
//!   `U2 → ε | U1 | U2 U1`,
//!
//! and, when error recovery is requested, iteration lists also accept the
//! `$error` token: `U2 → $error | U2 $error`. The value-flattening kinds
//! recorded for the fresh non-terminals give actions the same argument
//! shapes as the EBNF parse.

use crate::bnf::{Bnf, SynthKind};
use crate::ebnf::{Ebnf, Node, NodeId};
use crate::symbols::{Sym, SymbolTable, Term};
use crate::{GrammarError, VarId};

/// Translates an EBNF grammar into a checked BNF grammar; the start symbol
/// is the first original rule's left-hand side.
pub fn from_ebnf(g: &Ebnf) -> Result<Bnf, GrammarError> {
    translate(g, false)
}

/// Like [`from_ebnf`], with `$error` alternatives added to every iteration
/// list for panic-mode recovery.
pub fn from_ebnf_with_error(g: &Ebnf) -> Result<Bnf, GrammarError> {
    translate(g, true)
}

fn translate(g: &Ebnf, error_mode: bool) -> Result<Bnf, GrammarError> {
    let start = g.start().ok_or(GrammarError::NoRules)?;
    let mut lower = Lower {
        g,
        out: Bnf::from_parts(g.cfg.clone(), g.syms.clone()),
        fresh: 0,
        error_mode,
    };
    for &v in g.rule_order() {
        let root = g.rule_node(v).expect("rule order lists defined rules");
        lower.rule_body(v, root)?;
    }
    let mut out = lower.out;
    let start_name = g.syms.nt_name(start);
    out.check(&start_name)?;
    Ok(out)
}

struct Lower<'g> {
    g: &'g Ebnf,
    out: Bnf,
    fresh: usize,
    error_mode: bool,
}

impl<'g> Lower<'g> {
    fn fresh_nt(&mut self) -> Result<VarId, GrammarError> {
        self.fresh += 1;
        let name = format!("{}{}", self.g.cfg.uniq, self.fresh);
        Ok(self.out.syms.add_nt_unchecked(&name)?)
    }

    fn rule_body(&mut self, lhs: VarId, root: NodeId) -> Result<(), GrammarError> {
        let Node::Alt(ch) = self.g.node(root) else {
            panic!("rule body must be an alternative node");
        };
        for &seq in &ch.clone() {
            let (rhs, prec) = self.seq(seq)?;
            self.out.add_rule_var(lhs, rhs, prec)?;
        }
        Ok(())
    }

    fn seq(&mut self, seq: NodeId) -> Result<(Vec<Sym>, Option<Term>), GrammarError> {
        let Node::Seq { items, prec } = self.g.node(seq) else {
            panic!("alternatives must be sequences");
        };
        let (items, prec) = (items.clone(), *prec);
        let mut rhs = Vec::with_capacity(items.len());
        for i in items {
            let sym = match self.g.node(i) {
                Node::T(t) => Sym::T(*t),
                Node::Nt(v) => Sym::Nt(*v),
                Node::Opt(ch) => Sym::Nt(self.opt(&ch.clone())?),
                Node::Plus(ch) => Sym::Nt(self.plus(&ch.clone())?),
                other => panic!("unexpected {} node in a sequence", other.label()),
            };
            rhs.push(sym);
        }
        Ok((rhs, prec))
    }

    fn opt(&mut self, ch: &[NodeId]) -> Result<VarId, GrammarError> {
        // [{S}] collapses into a possibly-empty iteration list
        if ch.len() == 1 {
            if let Node::Seq { items, prec: None } = self.g.node(ch[0]) {
                if items.len() == 1 {
                    if let Node::Plus(pch) = self.g.node(items[0]) {
                        return self.iteration(&pch.clone(), true);
                    }
                }
            }
        }
        let u = self.fresh_nt()?;
        self.out.set_synth(u, SynthKind::Maybe);
        self.out.add_rule_var(u, Vec::new(), None)?;
        for &seq in ch {
            let (rhs, prec) = self.seq(seq)?;
            self.out.add_rule_var(u, rhs, prec)?;
        }
        Ok(u)
    }

    fn plus(&mut self, ch: &[NodeId]) -> Result<VarId, GrammarError> {
        self.iteration(ch, false)
    }

    /// `U1` holds one turn of the iteration, `U2` the left-recursive list;
    /// `may_be_empty` adds the `U2 → ε` alternative of the `[{S}]` idiom.
    fn iteration(&mut self, ch: &[NodeId], may_be_empty: bool) -> Result<VarId, GrammarError> {
        let u1 = self.fresh_nt()?;
        self.out.set_synth(u1, SynthKind::Item);
        for &seq in ch {
            let (rhs, prec) = self.seq(seq)?;
            self.out.add_rule_var(u1, rhs, prec)?;
        }
        let u2 = self.fresh_nt()?;
        self.out.set_synth(u2, SynthKind::List);
        if may_be_empty {
            self.out.add_rule_var(u2, Vec::new(), None)?;
        }
        self.out.add_rule_var(u2, vec![Sym::Nt(u1)], None)?;
        self.out.add_rule_var(u2, vec![Sym::Nt(u2), Sym::Nt(u1)], None)?;
        if self.error_mode {
            let err = Sym::T(SymbolTable::ERROR);
            self.out.add_rule_var(u2, vec![err], None)?;
            self.out.add_rule_var(u2, vec![Sym::Nt(u2), err], None)?;
        }
        Ok(u2)
    }
}
