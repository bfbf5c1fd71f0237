//! Shortcut dispatch
//!
//! Decides, for every classified keyboard event, whether the event is claimed
//! by a shortcut (swallowed) or passed through untouched.

use crate::config::ConfigHandle;
use crate::keymap::KeyId;
use crate::launcher::LaunchQueue;
use crate::modifiers::{ModifierSide, ModifierState, ModifierTracker};

/// A keyboard event the tap cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    ModifierChanged { side: ModifierSide, pressed: bool },
    KeyDown(i64),
}

/// What the tap does with the event it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Pass the event on unmodified.
    Forward,
    /// Keep the event from reaching any application.
    Swallow,
}

impl Disposition {
    pub fn swallows(self) -> bool {
        self == Disposition::Swallow
    }
}

/// Resolves key-downs against the published shortcut table.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    config: ConfigHandle,
    launches: LaunchQueue,
}

impl Dispatcher {
    pub fn new(config: ConfigHandle, launches: LaunchQueue) -> Self {
        Dispatcher { config, launches }
    }

    pub fn key_down(&self, keycode: i64, modifiers: ModifierState) -> Disposition {
        let Some(key) = KeyId::from_keycode(keycode) else {
            return Disposition::Forward;
        };

        if !modifiers.triggers_dispatch() {
            if !modifiers.is_empty() {
                tracing::trace!(?modifiers, %key, "command combination not claimed");
            }
            return Disposition::Forward;
        }

        // The whole right-Command layer is reserved, mapped or not.
        let config = self.config.current();
        match config.shortcuts.get(key) {
            Some(target) => {
                tracing::debug!(%key, %target, "shortcut triggered");
                self.launches.request(target.clone());
            }
            None => tracing::debug!(%key, "no shortcut configured"),
        }
        Disposition::Swallow
    }
}

/// Per-session event handler: modifier tracking plus dispatch.
///
/// A new router is built for every tap session so no modifier state leaks
/// from one session into the next.
#[derive(Debug)]
pub struct EventRouter {
    modifiers: ModifierTracker,
    dispatcher: Dispatcher,
}

impl EventRouter {
    pub fn new(dispatcher: Dispatcher) -> Self {
        EventRouter {
            modifiers: ModifierTracker::new(),
            dispatcher,
        }
    }

    pub fn route(&self, event: KeyEvent) -> Disposition {
        match event {
            KeyEvent::ModifierChanged { side, pressed } => {
                self.modifiers.update(side, pressed);
                tracing::trace!(?side, pressed, "command key changed");
                Disposition::Forward
            }
            KeyEvent::KeyDown(keycode) => self.dispatcher.key_down(keycode, self.modifiers.state()),
        }
    }

    /// Treat both Command keys as released.
    pub fn reset(&self) {
        self.modifiers.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, LaunchTarget, ShortcutTable};
    use crate::launcher::LaunchQueue;
    use crossbeam::channel::Receiver;

    const KEY_G: i64 = 5;
    const KEY_K: i64 = 40;
    const KEY_SEMICOLON: i64 = 41;
    const KEY_RETURN: i64 = 36;

    fn table() -> ShortcutTable {
        ShortcutTable::new()
            .with(KeyId::parse("g").unwrap(), LaunchTarget::new("/Applications/Ghostty.app"))
            .with(KeyId::parse(";").unwrap(), LaunchTarget::new("/Applications/Notes.app"))
    }

    fn router_with(table: ShortcutTable) -> (EventRouter, ConfigHandle, Receiver<LaunchTarget>) {
        let handle = ConfigHandle::new(Config {
            shortcuts: table,
            ..Config::default()
        });
        let (queue, rx) = LaunchQueue::bounded(16);
        let router = EventRouter::new(Dispatcher::new(handle.clone(), queue));
        (router, handle, rx)
    }

    fn press(router: &EventRouter, side: ModifierSide, pressed: bool) -> Disposition {
        router.route(KeyEvent::ModifierChanged { side, pressed })
    }

    fn drain(rx: &Receiver<LaunchTarget>) -> Vec<String> {
        rx.try_iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_mapped_key_launches_once_and_swallows() {
        let (router, _handle, rx) = router_with(table());
        press(&router, ModifierSide::Secondary, true);

        assert_eq!(router.route(KeyEvent::KeyDown(KEY_G)), Disposition::Swallow);
        assert_eq!(drain(&rx), vec!["/Applications/Ghostty.app".to_string()]);

        assert_eq!(router.route(KeyEvent::KeyDown(KEY_SEMICOLON)), Disposition::Swallow);
        assert_eq!(drain(&rx), vec!["/Applications/Notes.app".to_string()]);
    }

    #[test]
    fn test_unmapped_key_swallowed_without_launch() {
        let (router, _handle, rx) = router_with(table());
        press(&router, ModifierSide::Secondary, true);

        assert_eq!(router.route(KeyEvent::KeyDown(KEY_K)), Disposition::Swallow);
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn test_keys_outside_vocabulary_pass_through() {
        let (router, _handle, rx) = router_with(table());
        press(&router, ModifierSide::Secondary, true);

        assert_eq!(router.route(KeyEvent::KeyDown(KEY_RETURN)), Disposition::Forward);
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn test_trigger_requires_secondary_only() {
        let cases = [
            (false, false, Disposition::Forward),
            (true, false, Disposition::Forward),
            (false, true, Disposition::Swallow),
            (true, true, Disposition::Forward),
        ];

        for (primary, secondary, expected) in cases {
            let (router, _handle, rx) = router_with(table());
            press(&router, ModifierSide::Primary, primary);
            press(&router, ModifierSide::Secondary, secondary);

            assert_eq!(
                router.route(KeyEvent::KeyDown(KEY_G)),
                expected,
                "primary={} secondary={}",
                primary,
                secondary
            );
            let launches = drain(&rx).len();
            assert_eq!(launches, usize::from(expected.swallows()));
        }
    }

    #[test]
    fn test_modifier_changes_never_swallowed() {
        let (router, _handle, _rx) = router_with(table());

        for side in [ModifierSide::Primary, ModifierSide::Secondary] {
            assert_eq!(press(&router, side, true), Disposition::Forward);
            assert_eq!(press(&router, side, false), Disposition::Forward);
        }
    }

    #[test]
    fn test_release_ends_dispatch() {
        let (router, _handle, rx) = router_with(table());
        press(&router, ModifierSide::Secondary, true);
        press(&router, ModifierSide::Secondary, false);

        assert_eq!(router.route(KeyEvent::KeyDown(KEY_G)), Disposition::Forward);
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn test_dispatch_sees_republished_table() {
        let (router, handle, rx) = router_with(table());
        press(&router, ModifierSide::Secondary, true);

        let replacement = ShortcutTable::new()
            .with(KeyId::parse("k").unwrap(), LaunchTarget::new("/Applications/Kitty.app"));
        handle.publish(std::sync::Arc::new(Config {
            shortcuts: replacement,
            ..Config::default()
        }));

        assert_eq!(router.route(KeyEvent::KeyDown(KEY_K)), Disposition::Swallow);
        assert_eq!(router.route(KeyEvent::KeyDown(KEY_G)), Disposition::Swallow);
        assert_eq!(drain(&rx), vec!["/Applications/Kitty.app".to_string()]);
    }

    #[test]
    fn test_fresh_router_starts_released() {
        let (first, _handle, rx) = router_with(table());
        press(&first, ModifierSide::Secondary, true);
        let dispatcher = first.dispatcher.clone();
        drop(first);

        let second = EventRouter::new(dispatcher);
        assert_eq!(second.route(KeyEvent::KeyDown(KEY_G)), Disposition::Forward);

        press(&second, ModifierSide::Secondary, true);
        assert_eq!(second.route(KeyEvent::KeyDown(KEY_G)), Disposition::Swallow);
        assert_eq!(drain(&rx), vec!["/Applications/Ghostty.app".to_string()]);
    }
}
