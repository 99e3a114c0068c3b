//! One-shot latches for write-once hardware bits.
//!
//! `IA32_PM_ENABLE` bit 0 can be set once from its reset value; afterwards
//! writes to it are ignored until the next hardware reset.  [`LatchSet`]
//! remembers which such features the engine has already enabled so it never
//! attempts the enable again.  A latch only ever goes from open to fired.

use std::collections::BTreeSet;

use cputune_types::Feature;

use crate::descriptor::descriptor;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LatchSet {
    fired: BTreeSet<Feature>,
}

impl LatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `feature` has already been enabled once.  Always `false` for
    /// features without a write-once bit.
    pub fn is_fired(&self, feature: Feature) -> bool {
        self.fired.contains(&feature)
    }

    /// Record an enabling action for `feature`.
    ///
    /// Returns `true` if this call fired the latch.  Features without a
    /// write-once bit are ignored.
    pub fn fire(&mut self, feature: Feature) -> bool {
        if !descriptor(feature).latch_once {
            return false;
        }
        self.fired.insert(feature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_open() {
        let latches = LatchSet::new();
        for feature in Feature::ALL {
            assert!(!latches.is_fired(feature));
        }
    }

    #[test]
    fn fires_once() {
        let mut latches = LatchSet::new();
        assert!(latches.fire(Feature::SpeedShift));
        assert!(!latches.fire(Feature::SpeedShift));
        assert!(latches.is_fired(Feature::SpeedShift));
    }

    #[test]
    fn non_latching_features_are_ignored() {
        let mut latches = LatchSet::new();
        assert!(!latches.fire(Feature::TurboBoost));
        assert!(!latches.is_fired(Feature::TurboBoost));
    }
}
