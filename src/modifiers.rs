//! Live state of the two Command keys.

use std::cell::Cell;

use bitflags::bitflags;

bitflags! {
    /// Which physical instances of the dispatch modifier are held down.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ModifierState: u8 {
        /// Left Command.
        const PRIMARY = 0b01;
        /// Right Command.
        const SECONDARY = 0b10;
    }
}

impl ModifierState {
    /// Shortcuts fire on the secondary instance alone; the primary instance
    /// (alone or together with the secondary) is left to the system.
    pub fn triggers_dispatch(self) -> bool {
        self == ModifierState::SECONDARY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierSide {
    Primary,
    Secondary,
}

impl ModifierSide {
    fn flag(self) -> ModifierState {
        match self {
            ModifierSide::Primary => ModifierState::PRIMARY,
            ModifierSide::Secondary => ModifierState::SECONDARY,
        }
    }
}

/// Tracks modifier transitions for one tap session.
///
/// Lives on the tap thread only, so plain interior mutability is enough.
#[derive(Debug, Default)]
pub struct ModifierTracker {
    state: Cell<ModifierState>,
}

impl ModifierTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, side: ModifierSide, pressed: bool) {
        let mut state = self.state.get();
        state.set(side.flag(), pressed);
        self.state.set(state);
    }

    pub fn state(&self) -> ModifierState {
        self.state.get()
    }

    /// Forget every held modifier, e.g. after transitions may have been missed.
    pub fn reset(&self) {
        self.state.set(ModifierState::empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_truth_table() {
        let cases = [
            (false, false, false),
            (true, false, false),
            (false, true, true),
            (true, true, false),
        ];

        for (primary, secondary, expected) in cases {
            let tracker = ModifierTracker::new();
            tracker.update(ModifierSide::Primary, primary);
            tracker.update(ModifierSide::Secondary, secondary);
            assert_eq!(
                tracker.state().triggers_dispatch(),
                expected,
                "primary={} secondary={}",
                primary,
                secondary
            );
        }
    }

    #[test]
    fn test_release_clears_only_that_side() {
        let tracker = ModifierTracker::new();
        tracker.update(ModifierSide::Primary, true);
        tracker.update(ModifierSide::Secondary, true);
        tracker.update(ModifierSide::Primary, false);

        assert_eq!(tracker.state(), ModifierState::SECONDARY);
        assert!(tracker.state().triggers_dispatch());
    }

    #[test]
    fn test_reset_releases_everything() {
        let tracker = ModifierTracker::new();
        tracker.update(ModifierSide::Primary, true);
        tracker.update(ModifierSide::Secondary, true);

        tracker.reset();

        assert!(tracker.state().is_empty());
    }
}
