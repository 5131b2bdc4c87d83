//! Keyboard shortcut mapping.
//!
//! Maps key + modifier combos to semantic `ShortcutAction`s. The map lives
//! in Rust so the browser bridge and native hosts share it.

/// Actions that keyboard shortcuts can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutAction {
    // ── Tool switching ──
    ToolSelect,
    ToolRectangle,
    ToolCircle,
    ToolDiamond,
    ToolConnect,

    // ── Edit ──
    Undo,
    Redo,
    Delete,

    // ── View ──
    ZoomIn,
    ZoomOut,
    CenterView,

    /// Back to the select tool, dropping any half-made connection.
    Cancel,
}

/// Resolves key events into shortcut actions.
///
/// On macOS `meta` is ⌘; elsewhere `ctrl` plays the same role.
pub struct ShortcutMap;

impl ShortcutMap {
    /// Resolve a key event to an action.
    ///
    /// `key` is the `KeyboardEvent.key` value (e.g. `"z"`, `"Delete"`).
    /// Returns `None` if the combo has no binding.
    pub fn resolve(
        key: &str,
        ctrl: bool,
        shift: bool,
        _alt: bool,
        meta: bool,
    ) -> Option<ShortcutAction> {
        let cmd = ctrl || meta;

        if cmd && shift {
            return match key {
                "z" | "Z" => Some(ShortcutAction::Redo),
                _ => None,
            };
        }

        if cmd {
            return match key {
                "z" | "Z" => Some(ShortcutAction::Undo),
                "y" | "Y" => Some(ShortcutAction::Redo),
                _ => None,
            };
        }

        match key {
            // `+` needs shift on most layouts.
            "+" | "=" => Some(ShortcutAction::ZoomIn),
            "-" | "_" => Some(ShortcutAction::ZoomOut),
            _ if shift => None,
            "0" => Some(ShortcutAction::CenterView),
            "v" | "V" => Some(ShortcutAction::ToolSelect),
            "r" | "R" => Some(ShortcutAction::ToolRectangle),
            "c" | "C" => Some(ShortcutAction::ToolCircle),
            "d" | "D" => Some(ShortcutAction::ToolDiamond),
            "a" | "A" => Some(ShortcutAction::ToolConnect),
            "Delete" | "Backspace" => Some(ShortcutAction::Delete),
            "Escape" => Some(ShortcutAction::Cancel),
            _ => None,
        }
    }
}
