// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.

mod tests;

use std::cell::RefCell;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;
use crate::ebnf::{Ebnf, Node, NodeId};
use crate::log::{BufLog, Logger};
use crate::scan::Tuple;
use crate::symbols::{SymbolTable, Term};
use crate::{CollectJoin, VarId};

// ---------------------------------------------------------------------------------------------

/// Dynamic value produced by a parse: terminals yield their text, sequences
/// collect their items, actions replace collected lists by anything.
#[derive(Clone, PartialEq, Debug)]
pub enum Val {
    Null,
    Text(String),
    Int(i64),
    List(Vec<Val>),
}

impl Val {
    /// A sequence of one value is that value; longer sequences are lists.
    pub fn wrap(mut vals: Vec<Val>) -> Val {
        if vals.len() == 1 {
            vals.pop().unwrap()
        } else {
            Val::List(vals)
        }
    }

    pub fn text(&self) -> Option<&str> {
        if let Val::Text(s) = self { Some(s) } else { None }
    }

    pub fn int(&self) -> Option<i64> {
        if let Val::Int(n) = self { Some(*n) } else { None }
    }

    pub fn list(&self) -> Option<&[Val]> {
        if let Val::List(v) = self { Some(v) } else { None }
    }
}

impl Display for Val {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Val::Null => write!(f, "null"),
            Val::Text(s) => write!(f, "{s:?}"),
            Val::Int(n) => write!(f, "{n}"),
            Val::List(v) => write!(f, "[{}]", v.iter().join(", ")),
        }
    }
}

// ---------------------------------------------------------------------------------------------

/// Raised by semantic actions: a soft error is reported and counted, parsing
/// continues; a fatal error unwinds the parse.
#[derive(Clone, PartialEq, Debug)]
pub enum ActionError {
    Soft(String),
    Fatal(String),
}

pub type ActionFn = Rc<RefCell<dyn FnMut(Vec<Val>) -> Result<Val, ActionError>>>;

#[derive(Clone)]
struct ActionEntry {
    arity: Option<usize>,
    f: ActionFn,
}

/// Semantic actions by rule name.
///
/// Base tables are composed by cloning and overriding entries, which replaces
/// inheritance between action providers.
#[derive(Clone, Default)]
pub struct Actions {
    map: HashMap<String, ActionEntry>,
}

impl Actions {
    pub fn new() -> Self {
        Actions::default()
    }

    pub fn add<F>(&mut self, name: &str, f: F)
        where F: FnMut(Vec<Val>) -> Result<Val, ActionError> + 'static
    {
        self.map.insert(name.to_string(), ActionEntry { arity: None, f: Rc::new(RefCell::new(f)) });
    }

    /// Registers an action with a declared arity, verified against the
    /// collected values unless the grammar's `noargs` option is set.
    pub fn add_with_arity<F>(&mut self, name: &str, arity: usize, f: F)
        where F: FnMut(Vec<Val>) -> Result<Val, ActionError> + 'static
    {
        self.map.insert(name.to_string(), ActionEntry { arity: Some(arity), f: Rc::new(RefCell::new(f)) });
    }

    pub fn remove(&mut self, name: &str) {
        self.map.remove(name);
    }

    pub(crate) fn get(&self, name: &str) -> Option<(Option<usize>, ActionFn)> {
        self.map.get(name).map(|e| (e.arity, e.f.clone()))
    }
}

// ---------------------------------------------------------------------------------------------

#[derive(Clone, PartialEq, Debug)]
pub enum ParseError {
    /// Unexpected lookahead; the diagnostic went to the parser log.
    Syntax { line: u32, msg: String },
    /// A semantic action aborted the parse.
    Fatal(String),
    /// Input remains after the start rule completed.
    ExtraInput { line: u32 },
    /// The grammar was not validated by `check()` before parsing.
    NotChecked,
    /// Error recovery ran out of stack or input.
    Irrecoverable,
    /// The input ended before `$eof` (missing batch for a chunked parse).
    Incomplete,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Syntax { line, msg } => write!(f, "syntax error, line {line}: {msg}"),
            ParseError::Fatal(msg) => write!(f, "fatal action error: {msg}"),
            ParseError::ExtraInput { line } => write!(f, "extra input after end of parsing, line {line}"),
            ParseError::NotChecked => write!(f, "the grammar must pass check() before parsing"),
            ParseError::Irrecoverable => write!(f, "irrecoverable syntax error"),
            ParseError::Incomplete => write!(f, "input exhausted before end of parsing"),
        }
    }
}

impl Error for ParseError {}

// ---------------------------------------------------------------------------------------------

/// Predictive recursive-descent interpreter of an analyzed EBNF grammar.
///
/// Diagnostics are written to the parser's own log; `errors` counts the
/// recoverable problems (unrecognizable characters, soft action errors). A
/// parse succeeds only if the whole tuple stream is consumed up to `$eof`.
pub struct LlParser<'g> {
    g: &'g Ebnf,
    pub log: BufLog,
    pub errors: u32,
    tuples: Vec<Tuple>,
    pos: usize,
    stack: Vec<String>,
}

impl<'g> LlParser<'g> {
    pub fn new(g: &'g Ebnf) -> Self {
        LlParser { g, log: BufLog::new(), errors: 0, tuples: Vec::new(), pos: 0, stack: Vec::new() }
    }

    pub fn parse(&mut self, tuples: &[Tuple], actions: &Actions) -> Result<Val, ParseError> {
        if !self.g.is_checked() {
            return Err(ParseError::NotChecked);
        }
        self.errors = 0;
        self.pos = 0;
        self.stack.clear();
        // scan errors are reported up front, the parser never sees them
        self.tuples = Vec::with_capacity(tuples.len());
        for t in tuples {
            if t.is_illegal() {
                self.log.add_error(format!("line {}: unrecognizable input {:?}", t.line, t.text));
                self.errors += 1;
            } else {
                self.tuples.push(t.clone());
            }
        }
        if self.tuples.last().map(|t| t.is_eof()) != Some(true) {
            self.tuples.push(Tuple { line: 0, term: Some(SymbolTable::EOF), text: String::new() });
        }
        let start = self.g.start().expect("checked grammar has a start rule");
        let value = self.parse_rule(start, actions)?;
        let last = self.cur().clone();
        if !last.is_eof() {
            self.log.add_error(format!("line {}: extra input {:?} after end of parsing", last.line, last.text));
            return Err(ParseError::ExtraInput { line: last.line });
        }
        if self.errors > 0 {
            self.log.add_note(format!("parsing ended with {} error(s)", self.errors));
        }
        Ok(value)
    }

    // -------------------------------------------------------------------------

    fn cur(&self) -> &Tuple {
        &self.tuples[self.pos.min(self.tuples.len() - 1)]
    }

    fn cur_term(&self) -> Term {
        self.cur().term.expect("illegal tuples were filtered out")
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tuples.len() {
            self.pos += 1;
        }
    }

    fn fail(&mut self, expected: &str) -> ParseError {
        let tuple = self.cur().clone();
        let found = if tuple.is_eof() { "end of input".to_string() } else { format!("'{}'", tuple.text) };
        let msg = format!("found {found} instead of {expected} while parsing {}", self.stack.join(" > "));
        self.log.add_error(format!("line {}: {msg}", tuple.line));
        self.errors += 1;
        ParseError::Syntax { line: tuple.line, msg }
    }

    fn parse_rule(&mut self, v: VarId, actions: &Actions) -> Result<Val, ParseError> {
        let name = self.g.syms.nt_name(v);
        if self.g.cfg.trace.parse {
            self.log.add_note(format!("parse: enter {name}"));
        }
        self.stack.push(name.clone());
        let root = self.g.rule_node(v).expect("checked grammar defines every rule");
        let vals = match self.g.node(root) {
            Node::Alt(_) => self.parse_alternatives(root, actions)?,
            _ => panic!("rule body must be an alternative node"),
        };
        let value = self.apply_action(actions, &name, vals)?;
        self.stack.pop();
        if self.g.cfg.trace.parse {
            self.log.add_note(format!("parse: exit {name} -> {value}"));
        }
        Ok(value)
    }

    /// Alt dispatch: parses the unique alternative whose expect set contains
    /// the lookahead and returns its item values.
    fn parse_alternatives(&mut self, id: NodeId, actions: &Actions) -> Result<Vec<Val>, ParseError> {
        let (Node::Alt(ch) | Node::Opt(ch) | Node::Plus(ch)) = self.g.node(id) else {
            panic!("not an alternative node");
        };
        let ch = ch.clone();
        let la = self.cur_term();
        if self.g.cfg.trace.lookahead {
            self.log.add_note(format!("lookahead: {} for {}", self.g.syms.term_name(la), self.g.node(id).label()));
        }
        for c in ch {
            if self.g.expect_of(c).contains(&la) {
                return self.parse_seq_vals(c, actions);
            }
        }
        let expected = self.g.set_to_str(self.g.expect_of(id));
        Err(self.fail(&expected))
    }

    fn parse_seq_vals(&mut self, id: NodeId, actions: &Actions) -> Result<Vec<Val>, ParseError> {
        let Node::Seq { items, .. } = self.g.node(id) else {
            panic!("alternatives must be sequences");
        };
        let items = items.clone();
        let mut vals = Vec::with_capacity(items.len());
        for i in items {
            let la = self.cur_term();
            if self.g.expect_of(i).contains(&la) {
                vals.push(self.parse_node(i, actions)?);
            } else if self.g.node(i).is_opt() {
                vals.push(Val::Null);
            } else {
                let expected = self.g.set_to_str(self.g.expect_of(i));
                return Err(self.fail(&expected));
            }
        }
        Ok(vals)
    }

    fn parse_node(&mut self, id: NodeId, actions: &Actions) -> Result<Val, ParseError> {
        match self.g.node(id).clone() {
            Node::T(t) => {
                if self.cur_term() == t {
                    let text = self.cur().text.clone();
                    if self.g.cfg.trace.parse {
                        self.log.add_note(format!("parse: match {} {:?}", self.g.syms.term_name(t), text));
                    }
                    self.advance();
                    Ok(Val::Text(text))
                } else {
                    let expected = self.g.syms.term_name(t);
                    Err(self.fail(&expected))
                }
            }
            Node::Nt(v) => self.parse_rule(v, actions),
            Node::Seq { .. } => {
                let vals = self.parse_seq_vals(id, actions)?;
                Ok(Val::wrap(vals))
            }
            Node::Alt(_) => {
                let vals = self.parse_alternatives(id, actions)?;
                Ok(Val::wrap(vals))
            }
            Node::Opt(_) => {
                let la = self.cur_term();
                if self.g.expect_of(id).contains(&la) {
                    let vals = self.parse_alternatives(id, actions)?;
                    Ok(Val::wrap(vals))
                } else {
                    Ok(Val::Null)
                }
            }
            Node::Plus(_) => {
                let mut turns = Vec::new();
                let vals = self.parse_alternatives(id, actions)?;
                turns.push(Val::wrap(vals));
                while self.g.expect_of(id).contains(&self.cur_term()) {
                    let vals = self.parse_alternatives(id, actions)?;
                    turns.push(Val::wrap(vals));
                }
                Ok(Val::List(turns))
            }
        }
    }

    fn apply_action(&mut self, actions: &Actions, name: &str, vals: Vec<Val>) -> Result<Val, ParseError> {
        let Some((arity, f)) = actions.get(name) else {
            return Ok(Val::wrap(vals));
        };
        if !self.g.cfg.noargs {
            if let Some(n) = arity {
                if n != vals.len() {
                    self.log.add_error(format!(
                        "action '{name}' expects {n} argument(s), got {}", vals.len()));
                    self.errors += 1;
                }
            }
        }
        if self.g.cfg.trace.actions {
            self.log.add_note(format!("action: {name}({})", vals.iter().join(", ")));
        }
        let saved = vals.clone();
        let result = match (&mut *f.borrow_mut())(vals) {
            Ok(value) => Ok(value),
            Err(ActionError::Soft(msg)) => {
                self.log.add_error(format!("action '{name}': {msg}"));
                self.errors += 1;
                Ok(Val::wrap(saved))
            }
            Err(ActionError::Fatal(msg)) => {
                self.log.add_error(format!("action '{name}' aborted: {msg}"));
                Err(ParseError::Fatal(msg))
            }
        };
        result
    }
}
