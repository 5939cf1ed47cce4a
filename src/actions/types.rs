//! Semantic action types emitted by the action synthesizer (§4.7): the
//! vocabulary of high-level user operations a replay collapses thousands
//! of raw key/pointer transitions into.

use serde::Serialize;

pub const BUTTON_LEFT: u8 = 1 << 0;
pub const BUTTON_MIDDLE: u8 = 1 << 1;
pub const BUTTON_RIGHT: u8 = 1 << 2;
pub const BUTTON_SCROLL_UP: u8 = 1 << 3;
pub const BUTTON_SCROLL_DOWN: u8 = 1 << 4;
pub const BUTTON_SCROLL_LEFT: u8 = 1 << 5;
pub const BUTTON_SCROLL_RIGHT: u8 = 1 << 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl MouseButton {
    /// The button implicated by a non-scroll mask, preferring the
    /// lowest-numbered bit when more than one happens to be set.
    pub fn from_mask(mask: u8) -> Option<MouseButton> {
        if mask & BUTTON_LEFT != 0 {
            Some(MouseButton::Left)
        } else if mask & BUTTON_MIDDLE != 0 {
            Some(MouseButton::Middle)
        } else if mask & BUTTON_RIGHT != 0 {
            Some(MouseButton::Right)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClickKind {
    Single,
    Double,
    Triple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

/// One synthesized user operation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", content = "params", rename_all = "snake_case")]
pub enum Action {
    MouseMove {
        x: u16,
        y: u16,
    },
    MouseClick {
        button: MouseButton,
        kind: ClickKind,
        x: u16,
        y: u16,
    },
    MouseDrag {
        button: MouseButton,
        start_x: u16,
        start_y: u16,
        end_x: u16,
        end_y: u16,
    },
    MouseScroll {
        direction: ScrollDirection,
        repeats: u32,
        x: u16,
        y: u16,
    },
    Type {
        text: String,
    },
    KeyPress {
        keysym: u32,
        name: String,
    },
    KeyboardShortcut {
        keysyms: Vec<u32>,
        names: Vec<String>,
    },
}

/// One synthesized action plus its timestamp relative to the first
/// observed replay step.
#[derive(Debug, Clone, Serialize)]
pub struct ActionStep {
    pub relative_ns: u64,
    pub relative: String,
    pub action: Action,
}

/// Formats a relative nanosecond offset as `HH:MM:SS.mmm`, hours taken
/// modulo 100 per SPEC_FULL §4.7 (a benchmark recording never runs long
/// enough for this to matter in practice).
pub fn format_relative_timestamp(relative_ns: u64) -> String {
    let total_ms = relative_ns / 1_000_000;
    let ms = total_ms % 1000;
    let total_s = total_ms / 1000;
    let s = total_s % 60;
    let total_m = total_s / 60;
    let m = total_m % 60;
    let h = (total_m / 60) % 100;
    format!("{:02}:{:02}:{:02}.{:03}", h, m, s, ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_relative_timestamp_with_modulo_hours() {
        assert_eq!(format_relative_timestamp(0), "00:00:00.000");
        assert_eq!(format_relative_timestamp(150_000_000), "00:00:00.150");
        assert_eq!(
            format_relative_timestamp(3_661_001_000_000),
            "01:01:01.001"
        );
    }

    #[test]
    fn mouse_button_prefers_lowest_bit() {
        assert_eq!(MouseButton::from_mask(BUTTON_LEFT), Some(MouseButton::Left));
        assert_eq!(
            MouseButton::from_mask(BUTTON_RIGHT),
            Some(MouseButton::Right)
        );
        assert_eq!(MouseButton::from_mask(0), None);
    }
}
