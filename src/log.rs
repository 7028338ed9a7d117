// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.

use std::fmt::{Display, Formatter};

/// Common log functionalities for a message producer.
///
/// The trait is object-safe so that grammars and parsers can hold any sink;
/// in practice they own a [`BufLog`] and callers inspect or drain it.
pub trait Logger {
    fn add_note(&mut self, msg: String);
    fn add_warning(&mut self, msg: String);
    fn add_error(&mut self, msg: String);
}

#[derive(Clone, PartialEq, Debug)]
pub enum LogMsg { Note(String), Warning(String), Error(String) }

impl LogMsg {
    pub fn text(&self) -> &str {
        match self {
            LogMsg::Note(s) | LogMsg::Warning(s) | LogMsg::Error(s) => s.as_str()
        }
    }
}

impl Display for LogMsg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogMsg::Note(s) =>    write!(f, "Note   : {s}"),
            LogMsg::Warning(s) => write!(f, "Warning: {s}"),
            LogMsg::Error(s) =>   write!(f, "ERROR  : {s}"),
        }
    }
}

// ---------------------------------------------------------------------------------------------

/// Log system that stores the messages.
#[derive(Clone, Debug, Default)]
pub struct BufLog {
    messages: Vec<LogMsg>,
    num_warnings: usize,
    num_errors: usize,
}

impl BufLog {
    pub fn new() -> Self {
        BufLog::default()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn num_warnings(&self) -> usize {
        self.num_warnings
    }

    pub fn num_errors(&self) -> usize {
        self.num_errors
    }

    pub fn has_no_errors(&self) -> bool {
        self.num_errors == 0
    }

    pub fn messages(&self) -> impl Iterator<Item = &LogMsg> {
        self.messages.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &LogMsg> {
        self.messages.iter().filter(|m| matches!(m, LogMsg::Error(_)))
    }

    /// Clears all messages and counts.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.num_warnings = 0;
        self.num_errors = 0;
    }

    /// Extends the messages with another log's messages.
    pub fn extend(&mut self, other: BufLog) {
        self.num_warnings += other.num_warnings;
        self.num_errors += other.num_errors;
        self.messages.extend(other.messages);
    }

    /// Sends every stored message to a line consumer, in order.
    pub fn report(&self, mut out: impl FnMut(&str)) {
        for msg in &self.messages {
            out(&msg.to_string());
        }
    }
}

impl Logger for BufLog {
    fn add_note(&mut self, msg: String) {
        self.messages.push(LogMsg::Note(msg));
    }

    fn add_warning(&mut self, msg: String) {
        self.messages.push(LogMsg::Warning(msg));
        self.num_warnings += 1;
    }

    fn add_error(&mut self, msg: String) {
        self.messages.push(LogMsg::Error(msg));
        self.num_errors += 1;
    }
}

impl Display for BufLog {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for msg in &self.messages {
            writeln!(f, "- {msg}")?;
        }
        writeln!(f, "{} warning(s), {} error(s)", self.num_warnings, self.num_errors)
    }
}

// ---------------------------------------------------------------------------------------------

/// Basic log system that prints out messages to stderr without storing them.
#[derive(Clone, Debug, Default)]
pub struct PrintLog {
    num_warnings: usize,
    num_errors: usize,
}

impl PrintLog {
    pub fn new() -> Self {
        PrintLog::default()
    }

    pub fn num_warnings(&self) -> usize {
        self.num_warnings
    }

    pub fn num_errors(&self) -> usize {
        self.num_errors
    }
}

impl Logger for PrintLog {
    fn add_note(&mut self, msg: String) {
        eprintln!("NOTE:    {msg}");
    }

    fn add_warning(&mut self, msg: String) {
        eprintln!("WARNING: {msg}");
        self.num_warnings += 1;
    }

    fn add_error(&mut self, msg: String) {
        eprintln!("ERROR:   {msg}");
        self.num_errors += 1;
    }
}
