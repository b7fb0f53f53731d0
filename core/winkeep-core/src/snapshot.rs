//! Pre-launch window snapshot used to tell new windows from existing ones.

use std::collections::HashSet;

use crate::types::WindowRecord;

const TITLE_KEY_CHARS: usize = 50;
const HANDLE_KEY_CHARS: usize = 4;

/// Identity key: `pid:title[..50]:last4(handle)`.
pub fn window_key(window: &WindowRecord) -> String {
    let title: String = window.title.chars().take(TITLE_KEY_CHARS).collect();
    let handle_chars: Vec<char> = window.id.chars().collect();
    let start = handle_chars.len().saturating_sub(HANDLE_KEY_CHARS);
    let handle_suffix: String = handle_chars[start..].iter().collect();
    format!("{}:{}:{}", window.pid, title, handle_suffix)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowSnapshot {
    keys: HashSet<String>,
}

impl WindowSnapshot {
    pub fn capture(windows: &[WindowRecord]) -> Self {
        Self {
            keys: windows.iter().map(window_key).collect(),
        }
    }

    pub fn contains(&self, window: &WindowRecord) -> bool {
        self.keys.contains(&window_key(window))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Windows absent from the snapshot, in listing order.
    pub fn new_windows<'a>(&self, windows: &'a [WindowRecord]) -> Vec<&'a WindowRecord> {
        windows
            .iter()
            .filter(|window| !self.contains(window))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(id: &str, pid: u32, title: &str) -> WindowRecord {
        WindowRecord {
            id: id.to_string(),
            pid,
            x: 0,
            y: 0,
            width: 800,
            height: 600,
            desktop: 0,
            title: title.to_string(),
        }
    }

    #[test]
    fn key_uses_pid_truncated_title_and_handle_suffix() {
        let long_title = "x".repeat(80);
        let key = window_key(&window("0x03a00007", 42, &long_title));
        assert_eq!(key, format!("42:{}:0007", "x".repeat(50)));

        let short = window_key(&window("0x7", 1, "ab"));
        assert_eq!(short, "1:ab:0x7");
    }

    #[test]
    fn key_truncates_multibyte_titles_on_char_boundaries() {
        let title = "é".repeat(60);
        let key = window_key(&window("0x01", 9, &title));
        assert_eq!(key, format!("9:{}:0x01", "é".repeat(50)));
    }

    #[test]
    fn new_windows_excludes_snapshot_members() {
        let before = vec![window("0x01", 10, "Editor"), window("0x02", 11, "Browser")];
        let snapshot = WindowSnapshot::capture(&before);
        assert_eq!(snapshot.len(), 2);

        let after = vec![
            window("0x01", 10, "Editor"),
            window("0x03", 12, "Terminal"),
            window("0x02", 11, "Browser"),
        ];
        let fresh = snapshot.new_windows(&after);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].id, "0x03");
    }

    #[test]
    fn retitled_window_counts_as_new() {
        let snapshot = WindowSnapshot::capture(&[window("0x01", 10, "Loading…")]);
        let after = vec![window("0x01", 10, "Document - Editor")];
        assert_eq!(snapshot.new_windows(&after).len(), 1);
    }
}
