//! Progress and outcome reporting.
//!
//! Reporting is observational only: nothing here can change the course
//! of a run.

use crate::error::ShrinkError;
use crate::shrink::{Outcome, Step};
use crate::timing::Timer;

/// Receives one notification per step transition and a final summary.
pub trait Reporter {
    fn step_started(&mut self, step: Step);
    fn step_succeeded(&mut self, step: Step);
    fn step_failed(&mut self, step: Step, error: &ShrinkError);
    /// Extra information about the step in progress.
    fn detail(&mut self, message: &str);
    fn warn(&mut self, message: &str);
    fn finished(&mut self, result: Result<&Outcome, &ShrinkError>);
}

/// Prints progress to stdout.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    timer: Option<Timer>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn elapsed(&mut self) -> String {
        self.timer
            .take()
            .map(Timer::finish)
            .unwrap_or_default()
    }
}

impl Reporter for ConsoleReporter {
    fn step_started(&mut self, step: Step) {
        println!("  → {}...", step);
        self.timer = Some(Timer::start());
    }

    fn step_succeeded(&mut self, step: Step) {
        let elapsed = self.elapsed();
        println!("  ✓ [ OK ] {} {}", step, elapsed);
    }

    fn step_failed(&mut self, step: Step, error: &ShrinkError) {
        let elapsed = self.elapsed();
        println!("  ✗ [FAIL] {} {}: {}", step, elapsed, error.chain());
    }

    fn detail(&mut self, message: &str) {
        println!("           {}", message);
    }

    fn warn(&mut self, message: &str) {
        println!("  ⚠ [WARN] {}", message);
    }

    fn finished(&mut self, result: Result<&Outcome, &ShrinkError>) {
        println!();
        match result {
            Ok(outcome) => println!("{}", outcome),
            Err(e) => println!("Shrink failed at step '{}'.", e.step()),
        }
    }
}
