// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.


use std::error::Error;
use std::fmt::{Display, Formatter};
use regex::Regex;
use crate::config::Config;
use crate::symbols::{SymbolTable, Term};
use crate::TermId;

/// One scanned input element: the line it starts on, the matched terminal
/// (`None` for a span of unrecognizable characters), and the matched text.
#[derive(Clone, PartialEq, Debug)]
pub struct Tuple {
    pub line: u32,
    pub term: Option<Term>,
    pub text: String,
}

impl Tuple {
    pub fn is_eof(&self) -> bool {
        self.term == Some(SymbolTable::EOF)
    }

    pub fn is_illegal(&self) -> bool {
        self.term.is_none()
    }
}

impl Display for Tuple {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.term {
            Some(_) => write!(f, "({}, {:?})", self.line, self.text),
            None => write!(f, "({}, <illegal> {:?})", self.line, self.text),
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub enum ScanError {
    /// A literal is screened by two or more tokens.
    DoubleScreen { lit: String, first: String, second: String },
    /// The assembled master pattern did not compile.
    Master(String),
}

impl Display for ScanError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::DoubleScreen { lit, first, second } =>
                write!(f, "literal {lit} is screened by both '{first}' and '{second}'"),
            ScanError::Master(e) => write!(f, "master pattern: {e}"),
        }
    }
}

impl Error for ScanError {}

// ---------------------------------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
enum Target {
    Skip,
    Tok(TermId),
    Lit(TermId),
}

/// Tokenizer assembled from the grammar's terminals.
///
/// The master pattern is one alternation: the skip pattern first, then the
/// used token patterns sorted by name, then the used, non-screened literals
/// sorted by decreasing value length. Input between matches becomes a single
/// illegal-character tuple; the stream always ends with a `$eof` tuple.
pub struct Scanner {
    master: Regex,
    targets: Vec<Target>,
}

impl Scanner {
    /// Builds the scanner and records the screening relations in the symbol
    /// table (token patterns that exactly match a literal's value promote
    /// their matches to that literal).
    pub fn new(syms: &mut SymbolTable, cfg: &Config) -> Result<Scanner, ScanError> {
        let lits = syms.lits()
            .filter(|(_, l)| l.used && !l.value.is_empty())
            .map(|(id, l)| (id, l.value.clone()))
            .collect::<Vec<_>>();
        let mut sorted_lits = lits.clone();
        sorted_lits.sort_by(|(_, a), (_, b)| b.len().cmp(&a.len()));
        let mut toks = syms.toks()
            .filter(|(_, t)| t.used && !t.pattern.is_empty())
            .map(|(id, t)| (id, t.name.clone(), t.pattern.clone()))
            .collect::<Vec<_>>();
        toks.sort_by(|(_, a, _), (_, b, _)| a.cmp(b));

        // screening
        let mut screener = vec![None::<TermId>; syms.num_lits()];
        for (tok_id, tok_name, pattern) in &toks {
            let full = match Regex::new(&format!(r"\A(?:{pattern})\z")) {
                Ok(re) => re,
                Err(_) => continue,     // pattern was validated at token creation
            };
            for (lit_id, value) in &lits {
                if full.is_match(value) {
                    if let Some(first) = screener[*lit_id as usize] {
                        return Err(ScanError::DoubleScreen {
                            lit: syms.get_lit(*lit_id).name.clone(),
                            first: syms.get_tok(first).name.clone(),
                            second: tok_name.clone(),
                        });
                    }
                    screener[*lit_id as usize] = Some(*tok_id);
                    syms.get_tok_mut(*tok_id).screen.insert(value.clone(), *lit_id);
                    syms.mark_screened(*lit_id);
                }
            }
        }

        // master pattern: skip, tokens, non-screened literals
        let mut alternatives = Vec::new();
        let mut targets = Vec::new();
        let skip = if cfg.skip.is_empty() { r"[^\s\S]".to_string() } else { cfg.skip.clone() };
        alternatives.push(skip);
        targets.push(Target::Skip);
        for (tok_id, _, pattern) in &toks {
            alternatives.push(pattern.clone());
            targets.push(Target::Tok(*tok_id));
        }
        for (lit_id, value) in &sorted_lits {
            if screener[*lit_id as usize].is_none() {
                alternatives.push(regex::escape(value));
                targets.push(Target::Lit(*lit_id));
            }
        }
        let pattern = alternatives.iter().enumerate()
            .map(|(i, alt)| format!("(?P<g{i}>{alt})"))
            .collect::<Vec<_>>().join("|");
        let master = Regex::new(&pattern).map_err(|e| ScanError::Master(e.to_string()))?;
        Ok(Scanner { master, targets })
    }

    /// Scans `text` into tuples. Ignored input produces no tuple but advances
    /// the line count; a gap the master pattern cannot match produces one
    /// illegal-character tuple covering the whole gap.
    pub fn scan(&self, syms: &SymbolTable, text: &str) -> Vec<Tuple> {
        let mut tuples = Vec::new();
        let mut line: u32 = 1;
        let mut last_end = 0;
        for caps in self.master.captures_iter(text) {
            let whole = caps.get(0).unwrap();
            if whole.start() > last_end {
                let gap = &text[last_end..whole.start()];
                tuples.push(Tuple { line, term: None, text: gap.to_string() });
                line += gap.matches('\n').count() as u32;
            }
            let (target, matched) = self.targets.iter().enumerate()
                .find_map(|(i, target)| {
                    caps.name(&format!("g{i}")).map(|m| (*target, m.as_str()))
                })
                .expect("one master alternative must have matched");
            match target {
                Target::Skip => {}
                Target::Tok(id) => {
                    // screening: exact literal values take over the token match
                    let term = match syms.get_tok(id).screen.get(matched) {
                        Some(lit) => Term::Lit(*lit),
                        None => Term::Tok(id),
                    };
                    tuples.push(Tuple { line, term: Some(term), text: matched.to_string() });
                }
                Target::Lit(id) => {
                    tuples.push(Tuple { line, term: Some(Term::Lit(id)), text: matched.to_string() });
                }
            }
            line += matched.matches('\n').count() as u32;
            last_end = whole.end();
        }
        if last_end < text.len() {
            let gap = &text[last_end..];
            tuples.push(Tuple { line, term: None, text: gap.to_string() });
            line += gap.matches('\n').count() as u32;
        }
        tuples.push(Tuple { line, term: Some(SymbolTable::EOF), text: String::new() });
        tuples
    }
}
