//! Menu bar status item

use std::sync::Arc;

use crate::config::ConfigStore;
use crate::error::{KeyBoyError, Result};

const STATUS_TITLE: &str = "⌨";
const RELOAD_TITLE: &str = "Reload Config";
const QUIT_TITLE: &str = "Quit KeyBoy";

/// Re-read the shortcut file on request. The previous table stays live if
/// the file does not parse.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub fn reload_config(store: &ConfigStore) -> bool {
    match store.reload() {
        Ok(config) => {
            tracing::info!(shortcuts = config.shortcuts.len(), "configuration reloaded from menu");
            true
        }
        Err(_) => false,
    }
}

#[cfg(target_os = "macos")]
static MENU_STORE: std::sync::OnceLock<Arc<ConfigStore>> = std::sync::OnceLock::new();

#[cfg(target_os = "macos")]
extern "C" fn reload_config_action(
    _this: &objc::runtime::Object,
    _sel: objc::runtime::Sel,
    _sender: cocoa::base::id,
) {
    let _ = std::panic::catch_unwind(|| {
        if let Some(store) = MENU_STORE.get() {
            reload_config(store);
        }
    });
}

/// Target object for menu actions that are not handled by `NSApplication`.
#[cfg(target_os = "macos")]
fn menu_target_class() -> Result<&'static objc::runtime::Class> {
    use cocoa::base::id;
    use objc::declare::ClassDecl;
    use objc::runtime::{Class, Object, Sel};
    use objc::{class, sel, sel_impl};

    const CLASS_NAME: &str = "KeyBoyMenuTarget";

    match ClassDecl::new(CLASS_NAME, class!(NSObject)) {
        Some(mut decl) => unsafe {
            decl.add_method(
                sel!(reloadConfig:),
                reload_config_action as extern "C" fn(&Object, Sel, id),
            );
            Ok(decl.register())
        },
        None => Class::get(CLASS_NAME)
            .ok_or_else(|| KeyBoyError::MenuBar(format!("class {} unavailable", CLASS_NAME))),
    }
}

/// Install the status item and run the application loop on the main thread.
/// Returns once the app has been asked to terminate.
#[cfg(target_os = "macos")]
pub fn run_with_menu_bar(store: Arc<ConfigStore>) -> Result<()> {
    use cocoa::appkit::{NSApplication, NSApplicationActivationPolicy, NSStatusBar};
    use cocoa::base::{id, nil};
    use cocoa::foundation::NSString;
    use objc::{class, msg_send, sel, sel_impl};

    let _ = MENU_STORE.set(store);
    let target_class = menu_target_class()?;

    unsafe {
        let app = NSApplication::sharedApplication(nil);
        if app == nil {
            return Err(KeyBoyError::MenuBar(
                "NSApplication is not available".to_string(),
            ));
        }
        app.setActivationPolicy_(
            NSApplicationActivationPolicy::NSApplicationActivationPolicyAccessory,
        );

        let status_bar = NSStatusBar::systemStatusBar(nil);
        let status_item: id = msg_send![status_bar, statusItemWithLength: -1.0f64];
        if status_item == nil {
            return Err(KeyBoyError::MenuBar(
                "could not create status item".to_string(),
            ));
        }

        let button: id = msg_send![status_item, button];
        let title = NSString::alloc(nil).init_str(STATUS_TITLE);
        let _: () = msg_send![button, setTitle: title];

        let menu: id = msg_send![class!(NSMenu), alloc];
        let menu: id = msg_send![menu, init];

        // Menu items hold their target weakly; this one lives for the process.
        let target: id = msg_send![target_class, new];
        let reload_title = NSString::alloc(nil).init_str(RELOAD_TITLE);
        let reload_key = NSString::alloc(nil).init_str("r");
        let reload_item: id = msg_send![class!(NSMenuItem), alloc];
        let reload_item: id = msg_send![reload_item, initWithTitle: reload_title action: sel!(reloadConfig:) keyEquivalent: reload_key];
        let _: () = msg_send![reload_item, setTarget: target];
        let _: () = msg_send![menu, addItem: reload_item];

        let separator: id = msg_send![class!(NSMenuItem), separatorItem];
        let _: () = msg_send![menu, addItem: separator];

        let quit_title = NSString::alloc(nil).init_str(QUIT_TITLE);
        let quit_key = NSString::alloc(nil).init_str("q");
        let quit_item: id = msg_send![class!(NSMenuItem), alloc];
        let quit_item: id = msg_send![quit_item, initWithTitle: quit_title action: sel!(terminate:) keyEquivalent: quit_key];
        let _: () = msg_send![menu, addItem: quit_item];

        let _: () = msg_send![status_item, setMenu: menu];
        // Owned by the status bar for the lifetime of the process.
        let _: id = msg_send![status_item, retain];

        tracing::info!("menu bar item installed");
        app.run();
    }

    Ok(())
}

#[cfg(not(target_os = "macos"))]
pub fn run_with_menu_bar(_store: Arc<ConfigStore>) -> Result<()> {
    Err(KeyBoyError::MenuBar(
        "Menu bar mode is only supported on macOS".to_string(),
    ))
}
