//! [`Interlock`] – hardware ordering rules between features.
//!
//! Before the engine applies a [`Transition`], it passes it through
//! [`Interlock::verify`] together with a [`PowerState`] read from the
//! registers in the same tick.  Every registered [`Rule`] is evaluated in
//! order; the first violation returns [`TuneError::UnsafeTransition`] and the
//! write is **not** issued.
//!
//! One built-in rule is provided:
//! - [`ProcHotInterlock`] – refuses disabling PROCHOT while Turbo Boost is
//!   enabled.

use cputune_types::{Feature, TuneError};
use tracing::debug;

/// A requested change of one feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub feature: Feature,
    /// `true` to enable, `false` to disable.
    pub enable: bool,
}

impl Transition {
    pub fn enable(feature: Feature) -> Self {
        Self {
            feature,
            enable: true,
        }
    }

    pub fn disable(feature: Feature) -> Self {
        Self {
            feature,
            enable: false,
        }
    }
}

/// Live hardware facts the rules may depend on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PowerState {
    /// Turbo Boost enabled according to `IA32_MISC_ENABLE` right now.
    pub turbo_enabled: bool,
}

/// A single ordering constraint.
pub trait Rule: Send + Sync {
    /// Human-readable name used in diagnostics.
    fn name(&self) -> &str;

    /// Whether this rule has an opinion on `transition` at all.
    fn applies_to(&self, _transition: &Transition) -> bool {
        true
    }

    /// `Ok(())` when `transition` is safe in `state`.
    fn check(&self, transition: &Transition, state: &PowerState) -> Result<(), TuneError>;
}

/// Rule engine evaluated before every feature transition.
///
/// # Example
///
/// ```
/// use cputune_kernel::interlock::{Interlock, PowerState, Transition};
/// use cputune_types::Feature;
///
/// let interlock = Interlock::with_default_rules();
/// let turbo_on = PowerState { turbo_enabled: true };
///
/// assert!(interlock.verify(&Transition::enable(Feature::ProcHot), &turbo_on).is_ok());
/// assert!(interlock.verify(&Transition::disable(Feature::ProcHot), &turbo_on).is_err());
/// ```
#[derive(Default)]
pub struct Interlock {
    rules: Vec<Box<dyn Rule>>,
}

impl Interlock {
    /// Create an interlock with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an interlock carrying every built-in rule.
    pub fn with_default_rules() -> Self {
        let mut interlock = Self::new();
        interlock.add_rule(Box::new(ProcHotInterlock));
        interlock
    }

    /// Register a new [`Rule`].  Rules are evaluated in insertion order.
    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    /// Whether any rule could object to `transition`.  Lets the caller skip
    /// reading [`PowerState`] registers when no rule cares.
    pub fn guards(&self, transition: &Transition) -> bool {
        self.rules.iter().any(|rule| rule.applies_to(transition))
    }

    /// Validate `transition` against every registered rule.
    pub fn verify(&self, transition: &Transition, state: &PowerState) -> Result<(), TuneError> {
        for rule in &self.rules {
            if let Err(e) = rule.check(transition, state) {
                debug!(rule = rule.name(), feature = %transition.feature, "transition refused");
                return Err(e);
            }
        }
        Ok(())
    }
}

/// Disabling PROCHOT while Turbo Boost is active lets the package run past
/// its thermal envelope; the disable must wait until Turbo Boost is off.
pub struct ProcHotInterlock;

impl Rule for ProcHotInterlock {
    fn name(&self) -> &str {
        "prochot_interlock"
    }

    fn applies_to(&self, transition: &Transition) -> bool {
        transition.feature == Feature::ProcHot && !transition.enable
    }

    fn check(&self, transition: &Transition, state: &PowerState) -> Result<(), TuneError> {
        if self.applies_to(transition) && state.turbo_enabled {
            return Err(TuneError::UnsafeTransition {
                feature: Feature::ProcHot,
                details: "cannot disable PROCHOT while turboboost is active".to_string(),
            });
        }
        Ok(())
    }
}
