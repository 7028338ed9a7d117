// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.

//! Built-in meta-grammars.
//!
//! Two hand-built EBNF grammars describe the accepted grammar text, one for
//! EBNF rules with `[...]`/`{...}`, one for plain BNF rules (which may use
//! `$error`), and their actions materialize the symbols, rules and
//! precedence groups of a fresh user grammar:
//!
//! ```text
//! grammar: [{ level }] { rule };
//! level:   ('%left'|'%right'|'%nonassoc') { term } ';';
//! rule:    Token ':' alt ';';
//! alt:     seq [{ '|' seq }];
//! seq:     { lit | ref | opt | some } [ '%prec' term ];
//! term:    lit | ref;
//! opt:     '[' alt ']';
//! some:    '{' alt '}';
//! ```
//!
//! The meta-grammars are built programmatically, not parsed, which avoids
//! any bootstrap circularity; they are constructed once per process.
//!
//! [`parse_ebnf`] returns an unchecked grammar: run [`Ebnf::check`] before
//! LL parsing, or hand it to [`lower::from_ebnf`](crate::lower::from_ebnf)
//! for the LR engine (which accepts constructs the LL check rejects, such
//! as left recursion). [`parse_bnf`] checks the result with the first
//! rule's left-hand side as start symbol.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::OnceLock;
use crate::bnf::Bnf;
use crate::ebnf::{Ebnf, Node, NodeId};
use crate::ll::{ActionError, Actions, LlParser, Val};
use crate::log::{BufLog, Logger};
use crate::scan::Scanner;
use crate::symbols::Assoc;
use crate::GrammarError;

struct Meta {
    g: Ebnf,
    scanner: Scanner,
}

static EBNF_META: OnceLock<Meta> = OnceLock::new();
static BNF_META: OnceLock<Meta> = OnceLock::new();

/// The meta-grammar accepting EBNF grammar text.
pub fn ebnf_meta() -> &'static Ebnf {
    &EBNF_META.get_or_init(|| build_meta(true)).g
}

/// The meta-grammar accepting BNF grammar text (no `[...]`/`{...}`, `$error`
/// allowed as a terminal).
pub fn bnf_meta() -> &'static Ebnf {
    &BNF_META.get_or_init(|| build_meta(false)).g
}

fn build_meta(with_ebnf: bool) -> Meta {
    let mut g = Ebnf::new();
    g.token("Lit", r"'(?:[^'\\]|\\['\\])+'").expect("meta token");
    g.token("Token", r"[A-Za-z][A-Za-z0-9_]*|\$error").expect("meta token");

    // grammar: [{ level }] { rule };
    let level = g.nt("level").unwrap();
    let seq = g.seq(vec![level]);
    let levels = g.plus(vec![seq]);
    let seq = g.seq(vec![levels]);
    let levels_opt = g.opt(vec![seq]);
    let rule = g.nt("rule").unwrap();
    let seq = g.seq(vec![rule]);
    let rules = g.plus(vec![seq]);
    let body = g.seq(vec![levels_opt, rules]);
    g.rule("grammar", body).unwrap();

    // level: '%left' { term } ';' | '%right' { term } ';' | '%nonassoc' { term } ';';
    let mut alts = Vec::new();
    for tag in ["'%left'", "'%right'", "'%nonassoc'"] {
        let tag = g.lit(tag).unwrap();
        let term = g.nt("term").unwrap();
        let seq = g.seq(vec![term]);
        let terms = g.plus(vec![seq]);
        let semi = g.lit("';'").unwrap();
        alts.push(g.seq(vec![tag, terms, semi]));
    }
    let body = g.alt(alts);
    g.rule("level", body).unwrap();

    // rule: Token ':' alt ';';
    let name = g.tok("Token").unwrap();
    let colon = g.lit("':'").unwrap();
    let alt = g.nt("alt").unwrap();
    let semi = g.lit("';'").unwrap();
    let body = g.seq(vec![name, colon, alt, semi]);
    g.rule("rule", body).unwrap();

    // alt: seq [{ '|' seq }];
    let seq1 = g.nt("seq").unwrap();
    let bar = g.lit("'|'").unwrap();
    let seq2 = g.nt("seq").unwrap();
    let turn = g.seq(vec![bar, seq2]);
    let turns = g.plus(vec![turn]);
    let seq = g.seq(vec![turns]);
    let turns_opt = g.opt(vec![seq]);
    let body = g.seq(vec![seq1, turns_opt]);
    g.rule("alt", body).unwrap();

    // seq: { lit | ref | opt | some } [ '%prec' term ];
    let mut items = Vec::new();
    for item in ["lit", "ref"] {
        let nt = g.nt(item).unwrap();
        items.push(g.seq(vec![nt]));
    }
    if with_ebnf {
        for item in ["opt", "some"] {
            let nt = g.nt(item).unwrap();
            items.push(g.seq(vec![nt]));
        }
    }
    let items = g.plus(items);
    let prec = g.lit("'%prec'").unwrap();
    let term = g.nt("term").unwrap();
    let seq = g.seq(vec![prec, term]);
    let prec_opt = g.opt(vec![seq]);
    let body = g.seq(vec![items, prec_opt]);
    g.rule("seq", body).unwrap();

    // term: lit | ref;
    let lit = g.nt("lit").unwrap();
    let s1 = g.seq(vec![lit]);
    let refr = g.nt("ref").unwrap();
    let s2 = g.seq(vec![refr]);
    let body = g.alt(vec![s1, s2]);
    g.rule("term", body).unwrap();

    // lit: Lit;   ref: Token;
    let leaf = g.tok("Lit").unwrap();
    let body = g.seq(vec![leaf]);
    g.rule("lit", body).unwrap();
    let leaf = g.tok("Token").unwrap();
    let body = g.seq(vec![leaf]);
    g.rule("ref", body).unwrap();

    if with_ebnf {
        // opt: '[' alt ']';   some: '{' alt '}';
        let open = g.lit("'['").unwrap();
        let alt = g.nt("alt").unwrap();
        let close = g.lit("']'").unwrap();
        let body = g.seq(vec![open, alt, close]);
        g.rule("opt", body).unwrap();
        let open = g.lit("'{'").unwrap();
        let alt = g.nt("alt").unwrap();
        let close = g.lit("'}'").unwrap();
        let body = g.seq(vec![open, alt, close]);
        g.rule("some", body).unwrap();
    }

    g.check().expect("the meta-grammar is consistent");
    let scanner = Scanner::new(&mut g.syms, &g.cfg).expect("the meta-grammar scans");
    Meta { g, scanner }
}

// ---------------------------------------------------------------------------------------------
// EBNF text

/// Parses EBNF grammar text into a fresh, unchecked grammar. `tokens` are
/// the named terminals the text may reference, as `(name, pattern)` pairs.
pub fn parse_ebnf(text: &str, tokens: &[(&str, &str)]) -> Result<Ebnf, GrammarError> {
    let (result, log) = try_parse_ebnf(text, tokens);
    match result {
        Ok(mut g) => {
            g.log.extend(log);
            Ok(g)
        }
        Err(e) => Err(e),
    }
}

/// Like [`parse_ebnf`], also returning the parse diagnostics.
pub fn try_parse_ebnf(text: &str, tokens: &[(&str, &str)]) -> (Result<Ebnf, GrammarError>, BufLog) {
    let meta = EBNF_META.get_or_init(|| build_meta(true));
    let mut user = Ebnf::new();
    for (name, pattern) in tokens {
        if let Err(e) = user.token(name, pattern) {
            return (Err(e), BufLog::new());
        }
    }
    let shared = Rc::new(RefCell::new(user));
    let actions = ebnf_actions(&shared);
    let tuples = meta.scanner.scan(&meta.g.syms, text);
    let mut parser = LlParser::new(&meta.g);
    let outcome = parser.parse(&tuples, &actions);
    let mut log = std::mem::take(&mut parser.log);
    let errors = parser.errors;
    drop(actions);
    match outcome {
        Ok(_) if errors == 0 => {
            let user = Rc::try_unwrap(shared).ok().expect("the actions were dropped").into_inner();
            (Ok(user), log)
        }
        Ok(_) => (Err(GrammarError::Check { errors: errors as usize }), log),
        Err(e) => {
            log.add_error(format!("grammar text rejected: {e}"));
            (Err(GrammarError::Check { errors: (errors as usize).max(1) }), log)
        }
    }
}

/// A `(name, node)` pair travelling through the meta parse.
fn pair(name: &str, node: NodeId) -> Val {
    Val::List(vec![Val::Text(name.to_string()), Val::Int(node as i64)])
}

fn pair_name(v: &Val) -> Result<String, ActionError> {
    v.list()
        .and_then(|l| l.first())
        .and_then(|n| n.text())
        .map(str::to_string)
        .ok_or(ActionError::Fatal("malformed term".to_string()))
}

fn pair_node(v: &Val) -> Result<NodeId, ActionError> {
    v.list()
        .and_then(|l| l.get(1))
        .and_then(|n| n.int())
        .map(|n| n as NodeId)
        .ok_or(ActionError::Fatal("malformed item".to_string()))
}

fn fatal(e: GrammarError) -> ActionError {
    ActionError::Fatal(e.to_string())
}

fn assoc_of(tag: &str) -> Assoc {
    match tag {
        "%left" => Assoc::Left,
        "%right" => Assoc::Right,
        _ => Assoc::NonAssoc,
    }
}

fn ebnf_actions(shared: &Rc<RefCell<Ebnf>>) -> Actions {
    let mut actions = Actions::new();

    let g = shared.clone();
    actions.add("lit", move |vals| {
        let lexeme = vals[0].text().expect("Lit carries its text").to_string();
        let node = g.borrow_mut().lit(&lexeme).map_err(fatal)?;
        Ok(pair(&lexeme, node))
    });

    let g = shared.clone();
    actions.add("ref", move |vals| {
        let lexeme = vals[0].text().expect("Token carries its text").to_string();
        if lexeme == "$error" {
            return Err(ActionError::Fatal("$error is only meaningful to the LR engine".to_string()));
        }
        let mut g = g.borrow_mut();
        let node = if g.syms.find_term(&lexeme).is_some() {
            g.tok(&lexeme).map_err(fatal)?
        } else {
            g.nt(&lexeme).map_err(fatal)?
        };
        Ok(pair(&lexeme, node))
    });

    actions.add("term", |mut vals| Ok(vals.pop().expect("term wraps one item")));

    let g = shared.clone();
    actions.add("opt", move |vals| {
        let node = vals[1].int().ok_or(ActionError::Fatal("malformed option".to_string()))? as NodeId;
        let mut g = g.borrow_mut();
        let Node::Alt(ch) = g.node(node).clone() else {
            return Err(ActionError::Fatal("malformed option".to_string()));
        };
        Ok(Val::Int(g.opt(ch) as i64))
    });

    let g = shared.clone();
    actions.add("some", move |vals| {
        let node = vals[1].int().ok_or(ActionError::Fatal("malformed repetition".to_string()))? as NodeId;
        let mut g = g.borrow_mut();
        let Node::Alt(ch) = g.node(node).clone() else {
            return Err(ActionError::Fatal("malformed repetition".to_string()));
        };
        Ok(Val::Int(g.plus(ch) as i64))
    });

    let g = shared.clone();
    actions.add("seq", move |vals| {
        let mut g = g.borrow_mut();
        let mut items = Vec::new();
        if let Some(turns) = vals[0].list() {
            for turn in turns {
                // items are (name, node) pairs; opt/some yield bare nodes
                let node = match turn {
                    Val::Int(n) => *n as NodeId,
                    other => pair_node(other)?,
                };
                items.push(node);
            }
        }
        let node = match &vals[1] {
            Val::Null => g.seq(items),
            prec => {
                let shape = prec.list().ok_or(ActionError::Fatal("malformed %prec".to_string()))?;
                let name = pair_name(&shape[1])?;
                let term = g.resolve_term(&name).map_err(fatal)?;
                g.seq_prec(items, term)
            }
        };
        Ok(Val::Int(node as i64))
    });

    let g = shared.clone();
    actions.add("alt", move |vals| {
        let mut g = g.borrow_mut();
        let mut seqs = vec![vals[0].int().ok_or(ActionError::Fatal("malformed alternative".to_string()))? as NodeId];
        if let Some(turns) = vals[1].list() {
            for turn in turns {
                let turn = turn.list().ok_or(ActionError::Fatal("malformed alternative".to_string()))?;
                seqs.push(turn[1].int().ok_or(ActionError::Fatal("malformed alternative".to_string()))? as NodeId);
            }
        }
        Ok(Val::Int(g.alt(seqs) as i64))
    });

    let g = shared.clone();
    actions.add("rule", move |vals| {
        let name = vals[0].text().expect("rule name is a Token").to_string();
        let node = vals[2].int().ok_or(ActionError::Fatal("malformed rule".to_string()))? as NodeId;
        g.borrow_mut().rule(&name, node).map_err(fatal)?;
        Ok(Val::Null)
    });

    let g = shared.clone();
    actions.add("level", move |vals| {
        let tag = vals[0].text().expect("level tag is a literal").to_string();
        let mut names = Vec::new();
        if let Some(turns) = vals[1].list() {
            for turn in turns {
                names.push(pair_name(turn)?);
            }
        }
        let mut g = g.borrow_mut();
        let names = names.iter().map(String::as_str).collect::<Vec<_>>();
        g.precedence(assoc_of(&tag), &names).map_err(fatal)?;
        Ok(Val::Null)
    });

    actions.add("grammar", |_| Ok(Val::Null));
    actions
}

// ---------------------------------------------------------------------------------------------
// BNF text

/// Parses BNF grammar text into a checked grammar; the start symbol is the
/// first rule's left-hand side. `$error` may appear as a terminal.
pub fn parse_bnf(text: &str, tokens: &[(&str, &str)]) -> Result<Bnf, GrammarError> {
    let (result, log) = try_parse_bnf(text, tokens);
    match result {
        Ok(mut g) => {
            let own = std::mem::take(&mut g.log);
            g.log = log;
            g.log.extend(own);
            Ok(g)
        }
        Err(e) => Err(e),
    }
}

/// Like [`parse_bnf`], also returning the parse diagnostics.
pub fn try_parse_bnf(text: &str, tokens: &[(&str, &str)]) -> (Result<Bnf, GrammarError>, BufLog) {
    let meta = BNF_META.get_or_init(|| build_meta(false));
    let mut user = Bnf::new();
    for (name, pattern) in tokens {
        if let Err(e) = user.token(name, pattern) {
            return (Err(e), BufLog::new());
        }
    }
    let shared = Rc::new(RefCell::new(BnfBuild { g: user, first: None }));
    let actions = bnf_actions(&shared);
    let tuples = meta.scanner.scan(&meta.g.syms, text);
    let mut parser = LlParser::new(&meta.g);
    let outcome = parser.parse(&tuples, &actions);
    let mut log = std::mem::take(&mut parser.log);
    let errors = parser.errors;
    drop(actions);
    match outcome {
        Ok(_) if errors == 0 => {
            let build = Rc::try_unwrap(shared).ok().expect("the actions were dropped").into_inner();
            let BnfBuild { mut g, first } = build;
            let Some(start) = first else {
                return (Err(GrammarError::NoRules), log);
            };
            match g.check(&start) {
                Ok(()) => (Ok(g), log),
                Err(e) => {
                    log.extend(g.log.clone());
                    (Err(e), log)
                }
            }
        }
        Ok(_) => (Err(GrammarError::Check { errors: errors as usize }), log),
        Err(e) => {
            log.add_error(format!("grammar text rejected: {e}"));
            (Err(GrammarError::Check { errors: (errors as usize).max(1) }), log)
        }
    }
}

struct BnfBuild {
    g: Bnf,
    first: Option<String>,
}

fn bnf_actions(shared: &Rc<RefCell<BnfBuild>>) -> Actions {
    let mut actions = Actions::new();

    actions.add("lit", |mut vals| Ok(vals.pop().expect("Lit carries its text")));
    actions.add("ref", |mut vals| Ok(vals.pop().expect("Token carries its text")));
    actions.add("term", |mut vals| Ok(vals.pop().expect("term wraps one item")));

    // seq: [[item names...], prec name or null]
    actions.add("seq", |vals| {
        let mut items = Vec::new();
        if let Some(turns) = vals[0].list() {
            for turn in turns {
                let name = turn.text().ok_or(ActionError::Fatal("malformed item".to_string()))?;
                items.push(Val::Text(name.to_string()));
            }
        }
        let prec = match &vals[1] {
            Val::Null => Val::Null,
            prec => {
                let shape = prec.list().ok_or(ActionError::Fatal("malformed %prec".to_string()))?;
                shape[1].clone()
            }
        };
        Ok(Val::List(vec![Val::List(items), prec]))
    });

    actions.add("alt", |vals| {
        let mut seqs = vec![vals[0].clone()];
        if let Some(turns) = vals[1].list() {
            for turn in turns {
                let turn = turn.list().ok_or(ActionError::Fatal("malformed alternative".to_string()))?;
                seqs.push(turn[1].clone());
            }
        }
        Ok(Val::List(seqs))
    });

    let b = shared.clone();
    actions.add("rule", move |vals| {
        let name = vals[0].text().expect("rule name is a Token").to_string();
        let mut b = b.borrow_mut();
        if b.first.is_none() {
            b.first = Some(name.clone());
        }
        let alts = vals[2].list().ok_or(ActionError::Fatal("malformed rule".to_string()))?;
        for shape in alts {
            let shape = shape.list().ok_or(ActionError::Fatal("malformed rule".to_string()))?;
            let mut rhs = Vec::new();
            for item in shape[0].list().unwrap_or(&[]) {
                let sym = b.g.resolve_sym(item.text().unwrap()).map_err(fatal)?;
                rhs.push(sym);
            }
            match &shape[1] {
                Val::Null => {
                    b.g.rule(&name, rhs).map_err(fatal)?;
                }
                prec => {
                    let term = b.g.resolve_term(prec.text().unwrap()).map_err(fatal)?;
                    b.g.rule_prec(&name, rhs, term).map_err(fatal)?;
                }
            }
        }
        Ok(Val::Null)
    });

    let b = shared.clone();
    actions.add("level", move |vals| {
        let tag = vals[0].text().expect("level tag is a literal").to_string();
        let mut names = Vec::new();
        if let Some(turns) = vals[1].list() {
            for turn in turns {
                names.push(turn.text().ok_or(ActionError::Fatal("malformed term".to_string()))?.to_string());
            }
        }
        let mut b = b.borrow_mut();
        let names = names.iter().map(String::as_str).collect::<Vec<_>>();
        b.g.precedence(assoc_of(&tag), &names).map_err(fatal)?;
        Ok(Val::Null)
    });

    actions.add("grammar", |_| Ok(Val::Null));
    actions
}
