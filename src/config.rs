// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.

use regex::Regex;

/// Per-grammar configuration.
///
/// The name filters restrict what the symbol factories accept; `uniq` prefixes
/// the non-terminals synthesized by the EBNF → BNF translation; `skip` is the
/// leading alternative of the scanner's master pattern.
#[derive(Clone, Debug)]
pub struct Config {
    /// Name filter for literals (quoted form).
    pub lits: Regex,
    /// Name filter for tokens.
    pub tokens: Regex,
    /// Name filter for non-terminals.
    pub nts: Regex,
    /// Prefix of synthesized non-terminal names.
    pub uniq: String,
    /// Suppresses action arity checks.
    pub noargs: bool,
    /// Pattern of the input to ignore between terminals.
    pub skip: String,
    /// Analysis and parse trace toggles.
    pub trace: Trace,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Trace {
    pub shallow: bool,
    pub deep: bool,
    pub follow: bool,
    pub lookahead: bool,
    pub parse: bool,
    pub actions: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            lits: Regex::new(r"^'(?:[^'\\]|\\.)+'$").unwrap(),
            tokens: Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap(),
            nts: Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap(),
            uniq: "$-".to_string(),
            noargs: false,
            skip: r"\s+".to_string(),
            trace: Trace::default(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Config::default()
    }
}
