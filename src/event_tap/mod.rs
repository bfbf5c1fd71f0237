//! Global keyboard event tap
//!
//! The platform tap hands every key-down and flags-changed event to
//! [`handle_event`], which classifies it and asks the session's
//! [`EventRouter`] whether to swallow it.

#[cfg(target_os = "macos")]
mod macos;
#[cfg(not(target_os = "macos"))]
mod unsupported;

#[cfg(target_os = "macos")]
pub use macos::EventTap;
#[cfg(not(target_os = "macos"))]
pub use unsupported::EventTap;

use std::panic::{self, AssertUnwindSafe};

use crate::dispatch::{Disposition, EventRouter, KeyEvent};
use crate::keymap::{LEFT_COMMAND_KEYCODE, RIGHT_COMMAND_KEYCODE};
use crate::modifiers::ModifierSide;

/// Device-dependent flag bits (IOLLEvent.h) telling the two Command keys apart.
const DEVICE_LEFT_COMMAND: u64 = 0x0000_0008;
const DEVICE_RIGHT_COMMAND: u64 = 0x0000_0010;

/// The fields of an OS keyboard event that matter to us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEvent {
    FlagsChanged { keycode: i64, flags: u64 },
    KeyDown { keycode: i64 },
    /// The system disabled the tap; modifier transitions may have been lost.
    Disabled,
}

pub fn classify(raw: RawEvent) -> Option<KeyEvent> {
    match raw {
        RawEvent::FlagsChanged { keycode, flags } => {
            let (side, mask) = match keycode {
                LEFT_COMMAND_KEYCODE => (ModifierSide::Primary, DEVICE_LEFT_COMMAND),
                RIGHT_COMMAND_KEYCODE => (ModifierSide::Secondary, DEVICE_RIGHT_COMMAND),
                _ => return None,
            };
            Some(KeyEvent::ModifierChanged {
                side,
                pressed: flags & mask != 0,
            })
        }
        RawEvent::KeyDown { keycode } => Some(KeyEvent::KeyDown(keycode)),
        RawEvent::Disabled => None,
    }
}

/// Body of the tap callback. Never panics across the FFI boundary: a panic
/// while routing is logged and the event is passed through.
pub fn handle_event(router: &EventRouter, raw: RawEvent) -> Disposition {
    if raw == RawEvent::Disabled {
        router.reset();
        return Disposition::Forward;
    }

    let Some(event) = classify(raw) else {
        return Disposition::Forward;
    };

    match panic::catch_unwind(AssertUnwindSafe(|| router.route(event))) {
        Ok(disposition) => disposition,
        Err(_) => {
            tracing::error!(?event, "panic while handling key event, passing it through");
            Disposition::Forward
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ConfigHandle};
    use crate::dispatch::Dispatcher;
    use crate::launcher::LaunchQueue;

    const COMMAND_FLAG: u64 = 0x0010_0000;

    #[test]
    fn test_classify_command_keys() {
        let right_down = RawEvent::FlagsChanged {
            keycode: RIGHT_COMMAND_KEYCODE,
            flags: COMMAND_FLAG | DEVICE_RIGHT_COMMAND,
        };
        assert_eq!(
            classify(right_down),
            Some(KeyEvent::ModifierChanged {
                side: ModifierSide::Secondary,
                pressed: true
            })
        );

        let left_down = RawEvent::FlagsChanged {
            keycode: LEFT_COMMAND_KEYCODE,
            flags: COMMAND_FLAG | DEVICE_LEFT_COMMAND,
        };
        assert_eq!(
            classify(left_down),
            Some(KeyEvent::ModifierChanged {
                side: ModifierSide::Primary,
                pressed: true
            })
        );
    }

    #[test]
    fn test_release_while_other_command_held() {
        // Right Command released while left is still down: the generic
        // Command flag stays set, the right-hand device bit does not.
        let right_up = RawEvent::FlagsChanged {
            keycode: RIGHT_COMMAND_KEYCODE,
            flags: COMMAND_FLAG | DEVICE_LEFT_COMMAND,
        };
        assert_eq!(
            classify(right_up),
            Some(KeyEvent::ModifierChanged {
                side: ModifierSide::Secondary,
                pressed: false
            })
        );
    }

    #[test]
    fn test_other_modifiers_ignored() {
        // Shift, Option, Control.
        for keycode in [56, 58, 59, 60, 61, 62] {
            assert_eq!(classify(RawEvent::FlagsChanged { keycode, flags: 0 }), None);
        }
    }

    #[test]
    fn test_handle_event_forwards_modifiers() {
        let (queue, _rx) = LaunchQueue::bounded(4);
        let router = EventRouter::new(Dispatcher::new(ConfigHandle::new(Config::seed()), queue));

        let right_down = RawEvent::FlagsChanged {
            keycode: RIGHT_COMMAND_KEYCODE,
            flags: COMMAND_FLAG | DEVICE_RIGHT_COMMAND,
        };
        assert_eq!(handle_event(&router, right_down), Disposition::Forward);
        // 'g'
        assert_eq!(handle_event(&router, RawEvent::KeyDown { keycode: 5 }), Disposition::Swallow);
    }

    #[test]
    fn test_disabled_tap_releases_held_command() {
        let (queue, rx) = LaunchQueue::bounded(4);
        let router = EventRouter::new(Dispatcher::new(ConfigHandle::new(Config::seed()), queue));

        let right_down = RawEvent::FlagsChanged {
            keycode: RIGHT_COMMAND_KEYCODE,
            flags: COMMAND_FLAG | DEVICE_RIGHT_COMMAND,
        };
        handle_event(&router, right_down);
        // The release happens while the tap is off and is never seen.
        assert_eq!(handle_event(&router, RawEvent::Disabled), Disposition::Forward);

        assert_eq!(handle_event(&router, RawEvent::KeyDown { keycode: 5 }), Disposition::Forward);
        assert!(rx.try_recv().is_err());
    }
}
