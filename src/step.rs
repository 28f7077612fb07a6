//! Idempotent step runner.
//!
//! Each bootstrap component is a [`Step`]: a named check-then-act pair. The
//! [`Runner`] executes steps in registration order, skips the ones whose
//! check reports the desired state already holds, and aborts on the first
//! failure. Re-invoking the runner after a failure resumes at the failed
//! step because everything before it checks out as satisfied.

use crate::error::Result;

/// Outcome of a step's idempotency check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// Desired state already holds; `apply` will be skipped.
    Satisfied,
    /// Work is required; the string says what `apply` will do.
    Needed(String),
}

/// A single idempotent provisioning step.
pub trait Step {
    /// Short human-facing name, used in logs.
    fn name(&self) -> &str;

    /// Reports whether the desired state already holds.
    ///
    /// Must not mutate anything.
    ///
    /// # Errors
    ///
    /// Propagates failures of the probes the check relies on.
    fn check(&self) -> Result<StepStatus>;

    /// Brings the desired state about. Only called when [`Step::check`]
    /// returned [`StepStatus::Needed`].
    ///
    /// # Errors
    ///
    /// Propagates the underlying tool or I/O failure; the runner aborts.
    fn apply(&self) -> Result<()>;
}

/// Executes steps in order, fail-fast.
pub struct Runner {
    steps: Vec<Box<dyn Step>>,
    dry_run: bool,
}

impl Runner {
    /// Creates an empty runner.
    #[must_use]
    pub fn new(dry_run: bool) -> Self {
        Self {
            steps: Vec::new(),
            dry_run,
        }
    }

    /// Registers a step. Order of registration is execution order.
    #[must_use]
    pub fn with(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Runs all steps. Stops at the first error; already-applied state is
    /// left in place so a re-run continues from the failure point.
    ///
    /// # Errors
    ///
    /// Returns the first step error encountered.
    pub fn run(&self) -> Result<()> {
        for step in &self.steps {
            match step.check()? {
                StepStatus::Satisfied => {
                    tracing::info!(step = step.name(), "Already satisfied, skipping");
                }
                StepStatus::Needed(what) => {
                    if self.dry_run {
                        tracing::info!(step = step.name(), action = %what, "Dry run, would apply");
                        continue;
                    }
                    tracing::info!(step = step.name(), action = %what, "Applying");
                    step.apply()?;
                }
            }
        }
        Ok(())
    }
}
