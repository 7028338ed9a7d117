// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.

//! Grammar analysis toolkit.
//!
//! The crate builds grammars from text or programmatically, analyzes them, and
//! interprets them over a token stream:
//!
//! * [`symbols`]: literals, tokens, non-terminals and precedence groups,
//! * [`scan`]: the tuple scanner assembled from the grammar's terminals,
//! * [`ebnf`] + [`ll`]: the EBNF model with `[...]`/`{...}` constructs and its
//!   predictive recursive-descent parser,
//! * [`bnf`] + [`lr`]: the BNF model and the SLR(1) table parser with
//!   `$error` recovery,
//! * [`lower`]: the EBNF to BNF translation,
//! * [`vm`]: the stack machine executing compiled programs,
//! * [`meta`]: the built-in meta-grammars that parse user grammar text.

pub mod log;
pub mod config;
pub mod symbols;
pub mod scan;
pub mod ebnf;
pub mod ll;
pub mod bnf;
pub mod lr;
pub mod lower;
pub mod vm;
pub mod meta;

pub use config::Config;
pub use symbols::{Assoc, Sym, SymbolTable, Term};

// package name & version
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// ID of a literal or token within its own registry
pub type TermId = u16;
/// ID of a nonterminal
pub type VarId = u16;

/// Construction and analysis errors shared by the grammar models.
///
/// Detailed per-problem messages go to the grammar's log; `Check` only
/// carries the error count of a failed analysis.
#[derive(Clone, PartialEq, Debug)]
pub enum GrammarError {
    Symbol(symbols::SymbolError),
    Scan(scan::ScanError),
    DuplicateRule(String),
    RuleBody(String),
    Frozen,
    NoRules,
    Check { errors: usize },
}

impl std::fmt::Display for GrammarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GrammarError::Symbol(e) => write!(f, "{e}"),
            GrammarError::Scan(e) => write!(f, "{e}"),
            GrammarError::DuplicateRule(name) => write!(f, "rule '{name}' is already defined"),
            GrammarError::RuleBody(name) => write!(f, "rule '{name}' has an invalid body"),
            GrammarError::Frozen => write!(f, "the grammar is frozen after analysis"),
            GrammarError::NoRules => write!(f, "the grammar defines no rule"),
            GrammarError::Check { errors } => write!(f, "{errors} error(s) found by the grammar check"),
        }
    }
}

impl std::error::Error for GrammarError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GrammarError::Symbol(e) => Some(e),
            GrammarError::Scan(e) => Some(e),
            _ => None,
        }
    }
}

impl From<symbols::SymbolError> for GrammarError {
    fn from(e: symbols::SymbolError) -> Self {
        GrammarError::Symbol(e)
    }
}

impl From<scan::ScanError> for GrammarError {
    fn from(e: scan::ScanError) -> Self {
        GrammarError::Scan(e)
    }
}

pub trait CollectJoin {
    fn join(&mut self, separator: &str) -> String
        where Self: Iterator,
              <Self as Iterator>::Item: ToString
    {
        self.map(|x| x.to_string()).collect::<Vec<_>>().join(separator)
    }

    fn to_vec(self) -> Vec<<Self as Iterator>::Item>
        where Self: Iterator + Sized
    {
        self.collect::<Vec<_>>()
    }
}

impl<I: Iterator> CollectJoin for I {}

// ---------------------------------------------------------------------------------------------
// Macros

pub mod macros {
    /// Generates a [`Sym`](crate::symbols::Sym) instance.
    ///
    /// # Examples
    /// ```
    /// # use gramlab::sym;
    /// # use gramlab::symbols::{Sym, Term};
    /// assert_eq!(sym!(l 2), Sym::T(Term::Lit(2)));
    /// assert_eq!(sym!(t 1), Sym::T(Term::Tok(1)));
    /// assert_eq!(sym!(nt 3), Sym::Nt(3));
    /// assert_eq!(sym!(end), Sym::T(Term::Lit(0)));
    /// assert_eq!(sym!(err), Sym::T(Term::Tok(0)));
    /// ```
    #[macro_export]
    macro_rules! sym {
        (l $id:expr) => { $crate::symbols::Sym::T($crate::symbols::Term::Lit($id as $crate::TermId)) };
        (t $id:expr) => { $crate::symbols::Sym::T($crate::symbols::Term::Tok($id as $crate::TermId)) };
        (nt $id:expr) => { $crate::symbols::Sym::Nt($id as $crate::VarId) };
        (end) => { $crate::symbols::Sym::T($crate::symbols::SymbolTable::EOF) };
        (err) => { $crate::symbols::Sym::T($crate::symbols::SymbolTable::ERROR) };
    }

    /// Generates a right-hand side: a `Vec<Sym>` from symbols separated by a comma.
    ///
    /// # Example
    /// ```
    /// # use gramlab::{rhs, sym};
    /// # use gramlab::symbols::{Sym, Term};
    /// assert_eq!(rhs!(nt 1, l 2, t 0), vec![sym!(nt 1), sym!(l 2), sym!(t 0)]);
    /// let empty: Vec<Sym> = rhs!();
    /// assert_eq!(empty, Vec::<Sym>::new());
    /// ```
    #[macro_export]
    macro_rules! rhs {
        () => { std::vec![] };
        ($($a:ident $($b:expr)?,)+) => { rhs![$($a $($b)?),+] };
        ($($a:ident $($b:expr)?),*) => { std::vec![$($crate::sym!($a $($b)?)),*] };
    }
}
