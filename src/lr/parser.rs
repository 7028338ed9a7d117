// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.

use crate::bnf::{Bnf, SynthKind};
use crate::ll::{ActionError, Actions, ParseError, Val};
use crate::log::{BufLog, Logger};
use crate::lr::Message;
use crate::scan::Tuple;
use crate::symbols::{Sym, SymbolTable};
use crate::CollectJoin;

/// Result of feeding one batch of tuples to the parser.
#[derive(Clone, PartialEq, Debug)]
pub enum LrOutcome {
    /// The start rule was accepted; the value is the single value left on
    /// the value stack.
    Done(Val),
    /// The batch is exhausted before `$eof`; feed more input to continue.
    More,
}

/// Table-driven stack parser over an analyzed BNF grammar.
///
/// The state stack always holds at least the initial state; the value stack
/// runs parallel to the shifted and goto-ed symbols. Missing table entries
/// trigger panic-mode recovery around the `$error` token. Input may arrive
/// in several batches through [`feed()`](LrParser::feed); error counters
/// reset when a parse starts, so a grammar serves one parse at a time.
pub struct LrParser<'g> {
    g: &'g Bnf,
    pub log: BufLog,
    pub errors: u32,
    trace: bool,
    states: Vec<usize>,
    values: Vec<Val>,
    recovering: bool,
}

impl<'g> LrParser<'g> {
    pub fn new(g: &'g Bnf) -> Self {
        let trace = g.cfg.trace.parse;
        LrParser { g, log: BufLog::new(), errors: 0, trace, states: vec![0], values: Vec::new(), recovering: false }
    }

    pub fn set_trace(&mut self, on: bool) {
        self.trace = on;
    }

    /// Parses a complete tuple stream (ending in `$eof`).
    pub fn parse(&mut self, tuples: &[Tuple], actions: &Actions) -> Result<Val, ParseError> {
        self.start()?;
        match self.feed(tuples, actions)? {
            LrOutcome::Done(value) => {
                if self.errors > 0 {
                    self.log.add_note(format!("parsing ended with {} error(s)", self.errors));
                }
                Ok(value)
            }
            LrOutcome::More => Err(ParseError::Incomplete),
        }
    }

    /// Resets the stacks and error counters for a new parse.
    pub fn start(&mut self) -> Result<(), ParseError> {
        if !self.g.is_checked() {
            return Err(ParseError::NotChecked);
        }
        self.errors = 0;
        self.states = vec![0];
        self.values.clear();
        self.recovering = false;
        Ok(())
    }

    /// Processes one batch of tuples. Returns [`LrOutcome::More`] when the
    /// batch ends before the parse does; call again with the next batch.
    pub fn feed(&mut self, tuples: &[Tuple], actions: &Actions) -> Result<LrOutcome, ParseError> {
        let mut idx = 0;
        loop {
            let Some(tuple) = tuples.get(idx) else {
                return Ok(LrOutcome::More);
            };
            if tuple.is_illegal() {
                self.log.add_error(format!("line {}: unrecognizable input {:?}", tuple.line, tuple.text));
                self.errors += 1;
                idx += 1;
                continue;
            }
            let term = tuple.term.unwrap();
            let ord = self.g.syms.term_ord(term);
            let state = *self.states.last().unwrap();
            match self.g.state(state).msgs.get(&ord) {
                Some(Message::Shift(target)) => {
                    let target = *target;
                    self.trace_msg(state, tuple, "shift", &format!("to {target}"), "");
                    if self.recovering {
                        self.recovering = false;
                        self.log.add_note(format!("line {}: resynchronized on '{}'", tuple.line, tuple.text));
                    }
                    self.states.push(target);
                    self.values.push(Val::Text(tuple.text.clone()));
                    idx += 1;
                }
                Some(Message::Reduce(r)) => {
                    let r = *r;
                    self.reduce(state, tuple, r, actions)?;
                }
                Some(Message::Accept) => {
                    self.trace_msg(state, tuple, "accept", "", "");
                    let value = self.values.pop().unwrap_or(Val::Null);
                    return Ok(LrOutcome::Done(value));
                }
                Some(Message::Goto(_)) => panic!("terminal {ord} cannot drive a goto"),
                Some(Message::Error(_)) | None => {
                    idx = self.recover(tuples, idx, actions)?;
                }
            }
        }
    }

    // -------------------------------------------------------------------------

    fn reduce(&mut self, state: usize, tuple: &Tuple, r: usize, actions: &Actions) -> Result<(), ParseError> {
        let rule = self.g.rule_at(r);
        let lhs = rule.lhs;
        let n = rule.rhs.len();
        let vals = self.values.split_off(self.values.len() - n);
        let value = match self.g.synth_kind(lhs) {
            Some(kind) => flatten(kind, &rule.rhs, lhs, vals),
            None => self.apply_action(actions, &self.g.syms.nt_name(lhs), vals)?,
        };
        self.trace_msg(state, tuple, "reduce", &self.g.rule_to_str(r), &value.to_string());
        self.values.push(value);
        self.states.truncate(self.states.len() - n);
        let top = *self.states.last().unwrap();
        let goto_ord = self.g.syms.sym_ord(Sym::Nt(lhs));
        match self.g.state(top).msgs.get(&goto_ord) {
            Some(Message::Goto(target)) => self.states.push(*target),
            other => panic!("state {top}: missing goto for {}, found {other:?}", self.g.syms.nt_name(lhs)),
        }
        Ok(())
    }

    fn apply_action(&mut self, actions: &Actions, name: &str, vals: Vec<Val>) -> Result<Val, ParseError> {
        let Some((arity, f)) = actions.get(name) else {
            return Ok(Val::wrap(vals));
        };
        if !self.g.cfg.noargs {
            if let Some(expected) = arity {
                if expected != vals.len() {
                    self.log.add_error(format!(
                        "action '{name}' expects {expected} argument(s), got {}", vals.len()));
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

    // -------------------------------------------------------------------------
    // error recovery

    /// Panic mode around the `$error` token: report once, then look for a
    /// state with a shift on `$error` (popping one state and one value at a
    /// time), shift it, and discard input until the current tuple can be
    /// processed again. An empty stack or the end of input while discarding
    /// is irrecoverable.
    fn recover(&mut self, tuples: &[Tuple], mut idx: usize, actions: &Actions) -> Result<usize, ParseError> {
        let tuple = &tuples[idx];
        let state = *self.states.last().unwrap();
        let expected = self.expected_terms(state);
        let found = if tuple.is_eof() { "end of input".to_string() } else { format!("'{}'", tuple.text) };
        self.log.add_error(format!("line {}: found {found}, expected: {expected}", tuple.line));
        self.errors += 1;
        self.recovering = true;
        let err_ord = self.g.syms.term_ord(SymbolTable::ERROR);
        loop {
            let state = *self.states.last().unwrap();
            if let Some(Message::Shift(target)) = self.g.state(state).msgs.get(&err_ord) {
                let target = *target;
                self.trace_msg(state, &tuples[idx.min(tuples.len() - 1)], "shift", "$error", "");
                self.states.push(target);
                self.values.push(Val::Null);
                // discard input until the current tuple means something here
                loop {
                    let Some(tuple) = tuples.get(idx) else {
                        return Ok(idx);    // batch exhausted while recovering
                    };
                    if tuple.is_illegal() {
                        idx += 1;
                        continue;
                    }
                    let ord = self.g.syms.term_ord(tuple.term.unwrap());
                    let top = *self.states.last().unwrap();
                    match self.g.state(top).msgs.get(&ord) {
                        Some(Message::Shift(_)) | Some(Message::Accept) => {
                            return Ok(idx);    // the main loop takes it from here
                        }
                        Some(Message::Reduce(r)) => {
                            let r = *r;
                            self.reduce(top, tuple, r, actions)?;
                        }
                        _ => {
                            if tuple.is_eof() {
                                self.log.add_note("irrecoverable error, reached end of input".to_string());
                                return Err(ParseError::Irrecoverable);
                            }
                            self.trace_msg(top, tuple, "discard", "", "");
                            idx += 1;
                        }
                    }
                }
            }
            if self.states.len() == 1 {
                self.log.add_note("irrecoverable error, parse stack exhausted".to_string());
                return Err(ParseError::Irrecoverable);
            }
            self.states.pop();
            self.values.pop();
        }
    }

    /// Terminals the current state accepts, for the diagnostic.
    fn expected_terms(&self, state: usize) -> String {
        self.g.state(state).msgs.iter()
            .filter(|(_, m)| !matches!(m, Message::Goto(_) | Message::Error(_)))
            .filter_map(|(ord, _)| self.g.syms.term_of_ord(*ord))
            .filter(|t| *t != SymbolTable::ERROR)
            .map(|t| self.g.syms.term_name(t))
            .join(", ")
    }

    fn trace_msg(&mut self, state: usize, tuple: &Tuple, verb: &str, info: &str, result: &str) {
        if self.trace {
            let text = if tuple.is_eof() { "$eof".to_string() } else { format!("{:?}", tuple.text) };
            self.log.add_note(format!("{state:>4}  {text:<12}  {verb:<8}  {info:<32}  {result}"));
        }
    }
}

// ---------------------------------------------------------------------------------------------

/// Value building for synthesized non-terminals: the reductions flatten so
/// that actions see the same shapes as the EBNF parse.
fn flatten(kind: SynthKind, rhs: &[Sym], lhs: crate::VarId, mut vals: Vec<Val>) -> Val {
    match kind {
        SynthKind::Maybe => {
            if rhs.is_empty() { Val::Null } else { Val::wrap(vals) }
        }
        SynthKind::Item => Val::wrap(vals),
        SynthKind::List => {
            if rhs.is_empty() {
                Val::Null
            } else if rhs.first() == Some(&Sym::Nt(lhs)) {
                // two-element rule: flatten the left operand list
                let right = Val::wrap(vals.split_off(1));
                match vals.pop().unwrap() {
                    Val::List(mut items) => {
                        items.push(right);
                        Val::List(items)
                    }
                    Val::Null => Val::List(vec![right]),
                    other => Val::List(vec![other, right]),
                }
            } else {
                Val::List(vec![Val::wrap(vals)])
            }
        }
    }
}
