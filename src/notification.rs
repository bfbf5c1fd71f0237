use std::process::Command;

const SOUND_NAME: &str = "Funk";

/// Post a user notification through AppleScript.
pub fn notify(title: &str, message: &str, play_sound: bool) {
    let script = notification_script(title, message, play_sound);

    let result = Command::new("osascript").arg("-e").arg(&script).output();

    if let Err(e) = result {
        tracing::error!("Failed to send notification: {}", e);
    }
}

fn notification_script(title: &str, message: &str, play_sound: bool) -> String {
    let mut script = format!(
        "display notification \"{}\" with title \"{}\"",
        escape_applescript_string(message),
        escape_applescript_string(title)
    );
    if play_sound {
        script.push_str(&format!(" sound name \"{}\"", SOUND_NAME));
    }
    script
}

fn escape_applescript_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_escapes_quotes() {
        let script = notification_script("KeyBoy", r#"could not open "/Apps/A\B.app""#, false);
        assert_eq!(
            script,
            r#"display notification "could not open \"/Apps/A\\B.app\"" with title "KeyBoy""#
        );
    }

    #[test]
    fn test_script_with_sound() {
        let script = notification_script("KeyBoy", "failed", true);
        assert!(script.ends_with(r#"sound name "Funk""#));
    }
}
