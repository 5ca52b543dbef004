//! `TerminalReporter` — Presentation-layer implementation of `ProgressReporter`.
//!
//! Wraps `&OutputContext` and implements the `application::ports::ProgressReporter`
//! trait so application services can emit progress events without depending on
//! any presentation type directly.
//!
//! On a TTY each step is a spinner (`[i/n] name...`) that finishes with `✓`
//! or `✗`; elsewhere every event is one plain line.

use std::cell::RefCell;

use indicatif::ProgressBar;
use owo_colors::OwoColorize as _;

use crate::application::ports::ProgressReporter;
use crate::output::{OutputContext, progress};

pub struct TerminalReporter<'a> {
    ctx: &'a OutputContext,
    current: RefCell<Option<ProgressBar>>,
}

impl<'a> TerminalReporter<'a> {
    /// Create a new `TerminalReporter` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self {
            ctx,
            current: RefCell::new(None),
        }
    }

    /// Print through the active spinner so lines land above it.
    fn print_above(&self, f: impl FnOnce()) {
        match self.current.borrow().as_ref() {
            Some(pb) => pb.suspend(f),
            None => f(),
        }
    }
}

fn label(index: usize, total: usize, name: &str) -> String {
    format!("[{index}/{total}] {name}")
}

impl ProgressReporter for TerminalReporter<'_> {
    fn step_started(&self, index: usize, total: usize, name: &str) {
        if self.ctx.quiet {
            return;
        }
        let text = format!("{}...", label(index, total, name));
        if self.ctx.show_progress() {
            *self.current.borrow_mut() = Some(progress::spinner(&text));
        } else {
            println!("  {text}");
        }
    }

    fn step_succeeded(&self, index: usize, total: usize, name: &str) {
        let mark = "✓".style(self.ctx.styles.success).to_string();
        match self.current.borrow_mut().take() {
            Some(pb) => progress::finish_with(&pb, &mark, &label(index, total, name)),
            None if !self.ctx.quiet => println!("  {mark} {}", label(index, total, name)),
            None => {}
        }
    }

    fn step_failed(&self, index: usize, total: usize, name: &str, error: &str) {
        if let Some(pb) = self.current.borrow_mut().take() {
            pb.finish_and_clear();
        }
        self.ctx
            .error(&format!("{}: {error}", label(index, total, name)));
    }

    fn waiting(&self, message: &str) {
        match self.current.borrow().as_ref() {
            Some(pb) => pb.set_message(message.to_string()),
            None => self.ctx.info(message),
        }
    }

    fn warn(&self, message: &str) {
        self.print_above(|| self.ctx.warn(message));
    }

    fn info(&self, message: &str) {
        self.print_above(|| self.ctx.info(message));
    }
}
