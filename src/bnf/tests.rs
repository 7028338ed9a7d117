#![cfg(test)]

use crate::bnf::Bnf;
use crate::symbols::{Assoc, Sym, SymbolTable};
use crate::{rhs, sym, GrammarError};

/// `expr -> expr '+' term | term; term -> Number`
fn sample() -> Bnf {
    let mut g = Bnf::new();
    g.token("Number", "[0-9]+").unwrap();
    g.rule_named("expr", &["expr", "'+'", "term"]).unwrap();
    g.rule_named("expr", &["term"]).unwrap();
    g.rule_named("term", &["Number"]).unwrap();
    g
}

#[test]
fn rule_zero_is_synthesized() {
    let mut g = sample();
    g.check("expr").unwrap();
    let rule0 = g.rule_at(0);
    assert_eq!(rule0.lhs, g.accept_var().unwrap());
    assert_eq!(rule0.rhs.len(), 2);
    assert_eq!(rule0.rhs[1], Sym::T(SymbolTable::EOF));
    assert_eq!(g.syms.nt_name(rule0.lhs), "$accept");
    assert!(rule0.reduced, "the accept entry marks rule 0 reduced");
}

#[test]
fn first_and_follow_sets() {
    let mut g = sample();
    g.check("expr").unwrap();
    let number = g.syms.find_term("Number").unwrap();
    let plus = g.syms.find_term("'+'").unwrap();
    let expr = g.syms.find_nt("expr").unwrap();
    let term = g.syms.find_nt("term").unwrap();
    assert_eq!(g.nt_first_of(expr).iter().copied().collect::<Vec<_>>(), vec![number]);
    let expr_follow = g.nt_follow_of(expr).iter().copied().collect::<Vec<_>>();
    assert_eq!(expr_follow, vec![SymbolTable::EOF, plus]);
    assert!(g.nt_follow_of(term).contains(&SymbolTable::EOF));
    assert!(g.nt_follow_of(term).contains(&plus));
}

#[test]
fn flags_are_computed() {
    let mut g = sample();
    g.check("expr").unwrap();
    for (i, rule) in g.rules() {
        assert!(rule.reached, "rule {i} reached");
        assert!(rule.finite, "rule {i} finite");
        assert!(rule.reduced, "rule {i} reduced");
        assert!(!rule.empty);
    }
}

#[test]
fn empty_rules_and_empty_nonterminals() {
    let mut g = Bnf::new();
    g.token("Name", "[a-z]+").unwrap();
    g.rule_named("item", &["opt", "Name"]).unwrap();
    g.rule("opt", rhs![]).unwrap();
    g.rule_named("opt", &["'*'"]).unwrap();
    g.check("item").unwrap();
    // direct emptiness is a rule flag, transitive emptiness feeds first
    let opt_rules: Vec<_> = g.rules().filter(|(_, r)| g.syms.nt_name(r.lhs) == "opt").collect();
    assert!(opt_rules.iter().any(|(_, r)| r.empty));
    let item = g.syms.find_nt("item").unwrap();
    let star = g.syms.find_term("'*'").unwrap();
    let name = g.syms.find_term("Name").unwrap();
    let first: Vec<_> = g.nt_first_of(item).iter().copied().collect();
    assert_eq!(first, vec![star, name]);
}

#[test]
fn undefined_nonterminal_is_an_error() {
    let mut g = Bnf::new();
    g.rule_named("s", &["missing"]).unwrap();
    assert!(matches!(g.check("s"), Err(GrammarError::Check { .. })));
    let msg = g.log.errors().next().unwrap().text().to_string();
    assert!(msg.contains("'missing' is used but not defined"), "{msg}");
}

#[test]
fn unreachable_rule_is_an_error() {
    let mut g = sample();
    g.rule_named("dead", &["Number"]).unwrap();
    assert!(g.check("expr").is_err());
    let msg = g.log.errors().next().unwrap().text().to_string();
    assert!(msg.contains("unreachable"), "{msg}");
}

#[test]
fn non_finite_nonterminal_is_an_error() {
    // loop: a -> b; b -> a; never derives a finite phrase
    let mut g = Bnf::new();
    g.rule_named("s", &["a"]).unwrap();
    g.rule_named("a", &["b"]).unwrap();
    g.rule_named("b", &["a"]).unwrap();
    assert!(g.check("s").is_err());
    let msg = g.log.errors().next().unwrap().text().to_string();
    assert!(msg.contains("finite"), "{msg}");
}

#[test]
fn rule_precedence_defaults_to_rightmost_terminal() {
    let mut g = Bnf::new();
    g.token("Number", "[0-9]+").unwrap();
    g.precedence(Assoc::Left, &["'+'"]).unwrap();
    g.precedence(Assoc::Left, &["'*'"]).unwrap();
    let plus = g.syms.find_term("'+'").unwrap();
    let i = g.rule_named("expr", &["expr", "'+'", "expr"]).unwrap();
    let j = g.rule_named("expr", &["expr", "'*'", "expr"]).unwrap();
    g.rule_named("expr", &["Number"]).unwrap();
    // an explicit %prec overrides the default
    let k = g.rule_prec("expr", rhs![], plus).unwrap();
    assert_eq!(g.rule_precedence(i), Some((0, Assoc::Left)));
    assert_eq!(g.rule_precedence(j), Some((1, Assoc::Left)));
    assert_eq!(g.rule_precedence(k), Some((0, Assoc::Left)));
}

#[test]
fn dump_states_lists_marks_and_messages() {
    let mut g = sample();
    g.check("expr").unwrap();
    let dump = g.dump_states();
    assert!(dump.starts_with("state 0:\n  $accept -> . expr $eof\n"), "{dump}");
    assert!(dump.contains("shift"), "{dump}");
    assert!(dump.contains("goto"), "{dump}");
    assert!(dump.contains("reduce"), "{dump}");
    assert!(dump.contains("accept"), "{dump}");
}

#[test]
fn grammar_is_frozen_after_check() {
    let mut g = sample();
    g.check("expr").unwrap();
    assert_eq!(g.rule_named("late", &["Number"]), Err(GrammarError::Frozen));
}

#[test]
fn renders_rules_with_sym_macros() {
    let mut g = Bnf::new();
    g.token("Number", "[0-9]+").unwrap();
    let plus = g.resolve_term("'+'").unwrap();
    let e = g.syms.nt(&g.cfg.clone(), "expr").unwrap();
    g.add_rule_var(e, vec![Sym::Nt(e), Sym::T(plus), sym!(t 1)], None).unwrap();
    assert_eq!(g.rule_to_str(0), "expr -> expr '+' Number");
}
