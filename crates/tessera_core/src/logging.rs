//! Scope-indented logging.
//!
//! Log output goes through the `log` facade. Pipeline stages open a
//! [`LogIndenter`] so nested messages are visually grouped; the CLI's
//! formatter prefixes each record with [`indentation`].

use std::sync::atomic::{AtomicUsize, Ordering};

static DEPTH: AtomicUsize = AtomicUsize::new(0);

const INDENT_WIDTH: usize = 2;

/// RAII guard that indents log output while alive.
#[must_use = "the indentation ends when the guard is dropped"]
pub struct LogIndenter;

impl LogIndenter {
    pub fn new() -> Self {
        DEPTH.fetch_add(1, Ordering::Relaxed);
        LogIndenter
    }
}

impl Default for LogIndenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LogIndenter {
    fn drop(&mut self) {
        DEPTH.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Current indentation depth.
pub fn depth() -> usize {
    DEPTH.load(Ordering::Relaxed)
}

/// Whitespace prefix for the current depth.
pub fn indentation() -> String {
    " ".repeat(depth() * INDENT_WIDTH)
}
