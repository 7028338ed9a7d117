#![cfg(test)]

use crate::ebnf::Ebnf;
use crate::ll::{ActionError, Actions, LlParser, ParseError, Val};
use crate::scan::{Scanner, Tuple};
use crate::GrammarError;

/// `list: sum [{ ',' sum }]; sum: Number [{ '+' Number }];`
fn sum_grammar() -> Ebnf {
    let mut g = Ebnf::new();
    g.token("Number", "[0-9]+").unwrap();
    // list: sum [{ ',' sum }];
    let sum1 = g.nt("sum").unwrap();
    let comma = g.lit("','").unwrap();
    let sum2 = g.nt("sum").unwrap();
    let turn = g.seq(vec![comma, sum2]);
    let more = g.plus(vec![turn]);
    let more_seq = g.seq(vec![more]);
    let tail = g.opt(vec![more_seq]);
    let body = g.seq(vec![sum1, tail]);
    g.rule("list", body).unwrap();
    // sum: Number [{ '+' Number }];
    let n1 = g.tok("Number").unwrap();
    let plus = g.lit("'+'").unwrap();
    let n2 = g.tok("Number").unwrap();
    let turn = g.seq(vec![plus, n2]);
    let more = g.plus(vec![turn]);
    let more_seq = g.seq(vec![more]);
    let tail = g.opt(vec![more_seq]);
    let body = g.seq(vec![n1, tail]);
    g.rule("sum", body).unwrap();
    g.check().unwrap();
    g
}

fn scan(g: &mut Ebnf, input: &str) -> Vec<Tuple> {
    let scanner = Scanner::new(&mut g.syms, &g.cfg).unwrap();
    scanner.scan(&g.syms, input)
}

/// Actions summing `Number ('+' Number)*` and collecting the sums in a list.
fn sum_actions() -> Actions {
    let mut actions = Actions::new();
    actions.add("sum", |vals| {
        let mut total = vals[0].text().unwrap().parse::<i64>().unwrap();
        if let Some(turns) = vals[1].list() {
            for turn in turns {
                let pair = turn.list().unwrap();
                total += pair[1].text().unwrap().parse::<i64>().unwrap();
            }
        }
        Ok(Val::Int(total))
    });
    actions.add("list", |vals| {
        let mut sums = vec![vals[0].clone()];
        if let Some(turns) = vals[1].list() {
            for turn in turns {
                sums.push(turn.list().unwrap()[1].clone());
            }
        }
        Ok(Val::List(sums))
    });
    actions
}

#[test]
fn sums_and_lists() {
    let mut g = sum_grammar();
    let tuples = scan(&mut g, "1+2, 3");
    let mut parser = LlParser::new(&g);
    let value = parser.parse(&tuples, &sum_actions()).unwrap();
    assert_eq!(value, Val::List(vec![Val::Int(3), Val::Int(3)]));
    assert_eq!(parser.errors, 0);
}

#[test]
fn single_element_list() {
    let mut g = sum_grammar();
    let tuples = scan(&mut g, "40+2");
    let mut parser = LlParser::new(&g);
    let value = parser.parse(&tuples, &sum_actions()).unwrap();
    assert_eq!(value, Val::List(vec![Val::Int(42)]));
}

#[test]
fn reports_unexpected_lookahead() {
    let mut g = sum_grammar();
    let tuples = scan(&mut g, "1+,2");
    let mut parser = LlParser::new(&g);
    let result = parser.parse(&tuples, &sum_actions());
    assert!(matches!(result, Err(ParseError::Syntax { line: 1, .. })));
    // the diagnostic names the active rules
    let msg = parser.log.errors().next().unwrap().text().to_string();
    assert!(msg.contains("list > sum"), "{msg}");
}

#[test]
fn empty_input_reports_expectation() {
    let mut g = sum_grammar();
    let tuples = scan(&mut g, "  ");
    let mut parser = LlParser::new(&g);
    let result = parser.parse(&tuples, &sum_actions());
    assert!(matches!(result, Err(ParseError::Syntax { .. })));
    let msg = parser.log.errors().next().unwrap().text().to_string();
    assert!(msg.contains("end of input"), "{msg}");
}

#[test]
fn illegal_characters_are_reported_and_skipped() {
    let mut g = sum_grammar();
    let tuples = scan(&mut g, "1?+2");
    let mut parser = LlParser::new(&g);
    let value = parser.parse(&tuples, &sum_actions()).unwrap();
    assert_eq!(value, Val::List(vec![Val::Int(3)]));
    assert_eq!(parser.errors, 1);
}

#[test]
fn soft_action_error_continues() {
    let mut g = sum_grammar();
    let tuples = scan(&mut g, "1, 2");
    let mut actions = sum_actions();
    actions.add("sum", |_| Err(ActionError::Soft("sum overflow".to_string())));
    let mut parser = LlParser::new(&g);
    let result = parser.parse(&tuples, &actions);
    assert!(result.is_ok());
    assert_eq!(parser.errors, 2);
}

#[test]
fn fatal_action_error_aborts() {
    let mut g = sum_grammar();
    let tuples = scan(&mut g, "1");
    let mut actions = sum_actions();
    actions.add("list", |_| Err(ActionError::Fatal("give up".to_string())));
    let mut parser = LlParser::new(&g);
    assert_eq!(parser.parse(&tuples, &actions), Err(ParseError::Fatal("give up".to_string())));
}

#[test]
fn arity_mismatch_is_reported() {
    let mut g = sum_grammar();
    let tuples = scan(&mut g, "1");
    let mut actions = sum_actions();
    actions.add_with_arity("sum", 3, |vals| Ok(Val::wrap(vals)));
    let mut parser = LlParser::new(&g);
    parser.parse(&tuples, &actions).unwrap();
    assert_eq!(parser.errors, 1);
}

#[test]
fn noargs_suppresses_arity_checks() {
    let mut g = sum_grammar();
    g.cfg.noargs = true;
    let tuples = scan(&mut g, "1");
    let mut actions = sum_actions();
    actions.add_with_arity("sum", 3, |vals| Ok(Val::wrap(vals)));
    let mut parser = LlParser::new(&g);
    parser.parse(&tuples, &actions).unwrap();
    assert_eq!(parser.errors, 0);
}

#[test]
fn actions_compose_by_override() {
    let mut base = Actions::new();
    base.add("a", |_| Ok(Val::Int(1)));
    base.add("b", |_| Ok(Val::Int(2)));
    let mut derived = base.clone();
    derived.add("b", |_| Ok(Val::Int(20)));
    // the base table is unchanged, the derived one overrides one entry
    let mut g = sum_grammar();
    let tuples = scan(&mut g, "5");
    let mut parser = LlParser::new(&g);
    assert!(parser.parse(&tuples, &base).is_ok());
}

// ---------------------------------------------------------------------------------------------
// grammar checks

#[test]
fn ambiguous_alternatives_are_rejected() {
    // s: 'a' | 'a' 'b';
    let mut g = Ebnf::new();
    let a1 = g.lit("'a'").unwrap();
    let s1 = g.seq(vec![a1]);
    let a2 = g.lit("'a'").unwrap();
    let b = g.lit("'b'").unwrap();
    let s2 = g.seq(vec![a2, b]);
    let body = g.alt(vec![s1, s2]);
    g.rule("s", body).unwrap();
    assert!(matches!(g.check(), Err(GrammarError::Check { .. })));
    let msg = g.log.errors().next().unwrap().text().to_string();
    assert!(msg.contains("ambiguous, lookahead can select more than one alternative"), "{msg}");
}

#[test]
fn left_recursion_is_detected() {
    // x: x 'a' | 'b';
    let mut g = Ebnf::new();
    let x = g.nt("x").unwrap();
    let a = g.lit("'a'").unwrap();
    let s1 = g.seq(vec![x, a]);
    let b = g.lit("'b'").unwrap();
    let s2 = g.seq(vec![b]);
    let body = g.alt(vec![s1, s2]);
    g.rule("x", body).unwrap();
    assert!(g.check().is_err());
    assert!(g.is_recursive(0));
    let msg = g.log.errors().next().unwrap().text().to_string();
    assert!(msg.contains("left-recursive"), "{msg}");
}

#[test]
fn undefined_nonterminal_is_detected() {
    let mut g = Ebnf::new();
    let y = g.nt("y").unwrap();
    let s = g.seq(vec![y]);
    g.rule("x", s).unwrap();
    assert!(g.check().is_err());
    let msg = g.log.errors().next().unwrap().text().to_string();
    assert!(msg.contains("'y' is used but not defined"), "{msg}");
}

#[test]
fn unreachable_rule_is_detected() {
    let mut g = Ebnf::new();
    let a = g.lit("'a'").unwrap();
    let s = g.seq(vec![a]);
    g.rule("x", s).unwrap();
    let b = g.lit("'b'").unwrap();
    let s = g.seq(vec![b]);
    g.rule("dead", s).unwrap();
    assert!(g.check().is_err());
    let msg = g.log.errors().next().unwrap().text().to_string();
    assert!(msg.contains("unreachable"), "{msg}");
}

#[test]
fn duplicate_rule_is_rejected() {
    let mut g = Ebnf::new();
    let a = g.lit("'a'").unwrap();
    let s = g.seq(vec![a]);
    g.rule("x", s).unwrap();
    let b = g.lit("'b'").unwrap();
    let s = g.seq(vec![b]);
    assert_eq!(g.rule("x", s), Err(GrammarError::DuplicateRule("x".to_string())));
}

#[test]
fn ambiguous_option_is_rejected() {
    // x: [ 'a' ] 'a';
    let mut g = Ebnf::new();
    let a1 = g.lit("'a'").unwrap();
    let s1 = g.seq(vec![a1]);
    let opt = g.opt(vec![s1]);
    let a2 = g.lit("'a'").unwrap();
    let body = g.seq(vec![opt, a2]);
    g.rule("x", body).unwrap();
    assert!(g.check().is_err());
    let msg = g.log.errors().next().unwrap().text().to_string();
    assert!(msg.contains("ambiguous"), "{msg}");
}

#[test]
fn grammar_is_frozen_after_analysis() {
    let mut g = sum_grammar();
    let a = g.lit("'a'");
    assert!(a.is_ok());                         // nodes may still be created
    let s = g.seq(vec![a.unwrap()]);
    assert_eq!(g.rule("late", s), Err(GrammarError::Frozen));
}
