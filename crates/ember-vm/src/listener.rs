//! Host-facing events raised while a script runs.

use crate::error::{RuntimeError, RuntimeWarning};

pub trait RuntimeListener {
    fn on_print(&mut self, text: &str);

    fn on_error(&mut self, _error: &RuntimeError) {}

    fn on_warning(&mut self, _warning: &RuntimeWarning) {}
}

/// Prints to stdout; errors and warnings go to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutListener;

impl RuntimeListener for StdoutListener {
    fn on_print(&mut self, text: &str) {
        println!("{}", text);
    }

    fn on_error(&mut self, error: &RuntimeError) {
        eprintln!("{}", error);
    }

    fn on_warning(&mut self, warning: &RuntimeWarning) {
        eprintln!("{}", warning);
    }
}

/// Records every event, for tests and embedding tools.
#[derive(Debug, Default, Clone)]
pub struct CollectingListener {
    pub printed: Vec<String>,
    pub errors: Vec<RuntimeError>,
    pub warnings: Vec<RuntimeWarning>,
}

impl RuntimeListener for CollectingListener {
    fn on_print(&mut self, text: &str) {
        self.printed.push(text.to_string());
    }

    fn on_error(&mut self, error: &RuntimeError) {
        self.errors.push(error.clone());
    }

    fn on_warning(&mut self, warning: &RuntimeWarning) {
        self.warnings.push(warning.clone());
    }
}
