//! The action synthesizer (§4.7): consumes a finite sequence of replay
//! steps `(timestamp_ns, Option<RawEvent>)` and collapses the low-level
//! key/pointer transitions into semantic actions — typed text, key
//! presses, keyboard shortcuts, clicks (single/double/triple), drags,
//! and scroll bursts — with timestamps relative to the first step.
//!
//! No teacher analogue exists for this layer; the state machine below is
//! built directly from SPEC_FULL §4.7's rules and reproduces all seven
//! literal end-to-end scenarios in §8.

use std::collections::HashSet;

use crate::keysym;
use crate::session::RawEvent;

use super::types::{
    format_relative_timestamp, Action, ActionStep, ClickKind, MouseButton, ScrollDirection,
    BUTTON_SCROLL_DOWN, BUTTON_SCROLL_LEFT, BUTTON_SCROLL_RIGHT, BUTTON_SCROLL_UP,
};

/// Multi-click window: releases more than this far apart start a new run.
const MULTI_CLICK_MAX_INTERVAL_NS: u64 = 50_000_000;
/// Multi-click displacement: releases further apart than this (in either
/// axis) start a new run.
const MULTI_CLICK_MAX_MOVE_PX: i32 = 4;
/// A drag candidate that never moved further than this in either axis
/// degrades to a click instead.
const DRAG_MIN_MOVE_PX: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum MouseActionKind {
    #[default]
    Idle,
    Move,
    Drag,
    ClickOrDblClickOrDrag,
    ClickOrDblClick,
    PotentiallyScrollingDown,
    PotentiallyScrollingUp,
}

#[derive(Default)]
struct KeyboardState {
    pressed: HashSet<u32>,
    primary_modifier: Option<u32>,
}

#[derive(Default)]
struct ShortcutState {
    /// Buffered keysyms since the primary modifier went down, primary
    /// modifier first.
    keys: Vec<u32>,
    start_ns: Option<u64>,
    /// True while every non-modifier key buffered so far under a Shift
    /// primary modifier has been printable — the "Shift + printable run"
    /// special case that defers to a `Type` action on Shift release
    /// instead of emitting a shortcut per key.
    shift_run_all_printable: bool,
}

#[derive(Default)]
struct TypingState {
    keysyms: Vec<u32>,
    text: String,
    start_ns: Option<u64>,
}

#[derive(Default)]
struct MouseState {
    buttons: u8,
    x: u16,
    y: u16,
    kind: MouseActionKind,
    action_start_ns: u64,
    press_x: u16,
    press_y: u16,
    active_button: Option<MouseButton>,
}

#[derive(Default)]
struct MouseClickState {
    /// Releases accumulated so far in the current run (0, 1, or 2 — a
    /// third valid release flushes immediately as a triple).
    pending_count: u8,
    button: Option<MouseButton>,
    last_release_ns: Option<u64>,
    last_release_x: Option<u16>,
    last_release_y: Option<u16>,
    /// Timestamp of the first press in the run; every click emitted from
    /// this run carries this timestamp, per §8's "timestamp of the first
    /// press" rule.
    click_start_ns: Option<u64>,
}

#[derive(Default)]
struct MouseScrollState {
    count: u32,
    start_ns: Option<u64>,
    x: u16,
    y: u16,
}

/// Owns the keyboard/mouse state machines for one synthesizer pass.
/// Discarded once `finish` is called.
pub struct ActionSynthesizer {
    first_ns: Option<u64>,
    actions: Vec<ActionStep>,
    /// `(x, y, timestamp, index in `actions`)` of the most recently
    /// emitted `MouseMove`, used by the move+click dedup rule.
    last_move: Option<(u16, u16, u64, usize)>,
    keyboard: KeyboardState,
    shortcut: ShortcutState,
    typing: TypingState,
    mouse: MouseState,
    click: MouseClickState,
    scroll: MouseScrollState,
}

impl ActionSynthesizer {
    pub fn new() -> ActionSynthesizer {
        ActionSynthesizer {
            first_ns: None,
            actions: Vec::new(),
            last_move: None,
            keyboard: KeyboardState::default(),
            shortcut: ShortcutState::default(),
            typing: TypingState::default(),
            mouse: MouseState::default(),
            click: MouseClickState::default(),
            scroll: MouseScrollState::default(),
        }
    }

    /// Feeds one replay step. `event` is `None` for framebuffer-only
    /// steps, which carry no input and are otherwise ignored here (the
    /// screenshot mapper is the consumer that cares about those).
    pub fn step(&mut self, timestamp_ns: u64, event: Option<RawEvent>) {
        self.first_ns.get_or_insert(timestamp_ns);
        match event {
            Some(RawEvent::Key { down, keysym }) => self.process_key_event(down, keysym, timestamp_ns),
            Some(RawEvent::Pointer {
                button_mask,
                x,
                y,
            }) => self.process_pointer_event(button_mask, x, y, timestamp_ns),
            None => {}
        }
    }

    /// Flushes all pending state in termination order (typing, pending
    /// click run, pending scroll burst) and returns the synthesized
    /// actions. Any shortcut/shift state still open when the stream ends
    /// is discarded with a warning rather than guessed at.
    pub fn finish(mut self) -> Vec<ActionStep> {
        self.flush_typing();
        match self.click.pending_count {
            1 => self.flush_click(ClickKind::Single),
            2 => self.flush_click(ClickKind::Double),
            _ => {}
        }
        match self.mouse.kind {
            MouseActionKind::PotentiallyScrollingDown if self.scroll.count > 0 => {
                self.flush_scroll(ScrollDirection::Down)
            }
            MouseActionKind::PotentiallyScrollingUp if self.scroll.count > 0 => {
                self.flush_scroll(ScrollDirection::Up)
            }
            _ => {}
        }
        if !self.shortcut.keys.is_empty() {
            warn!(
                "action synthesizer: discarding incomplete modifier state at end of stream: {:?}",
                self.shortcut.keys
            );
        }
        self.actions
    }

    fn relative(&self, ts: u64) -> u64 {
        ts.saturating_sub(self.first_ns.unwrap_or(ts))
    }

    fn push_action(&mut self, action: Action, ts: u64) {
        let relative_ns = self.relative(ts);
        self.actions.push(ActionStep {
            relative_ns,
            relative: format_relative_timestamp(relative_ns),
            action,
        });
    }

    // ---- keyboard ----

    fn process_key_event(&mut self, down: bool, keysym: u32, ts: u64) {
        if keysym::is_modifier(keysym) {
            self.process_modifier_key_event(down, keysym, ts);
        } else if self.keyboard.primary_modifier.is_some() {
            self.process_key_event_while_modifier_down(down, keysym, ts);
        } else {
            self.process_key_event_while_modifier_not_down(down, keysym, ts);
        }
        if down {
            self.keyboard.pressed.insert(keysym);
        } else {
            self.keyboard.pressed.remove(&keysym);
        }
    }

    fn process_modifier_key_event(&mut self, down: bool, keysym: u32, ts: u64) {
        if down {
            if self.keyboard.primary_modifier.is_none() {
                self.flush_typing();
                self.keyboard.primary_modifier = Some(keysym);
                self.shortcut.keys = vec![keysym];
                self.shortcut.start_ns = Some(ts);
                self.shortcut.shift_run_all_printable =
                    keysym == keysym::SHIFT_L || keysym == keysym::SHIFT_R;
            } else if !self.shortcut.keys.contains(&keysym) {
                self.shortcut.keys.push(keysym);
            }
        } else if Some(keysym) == self.keyboard.primary_modifier {
            self.finish_shortcut_or_shift_run();
            self.keyboard.primary_modifier = None;
            self.shortcut.keys.clear();
            self.shortcut.start_ns = None;
        } else {
            self.shortcut.keys.retain(|&k| k != keysym);
        }
    }

    /// A modifier is down; `keysym` is some other key. Shortcut keys
    /// accumulate on down and, unless this is a deferred Shift-typing
    /// run, emit a `KeyboardShortcut` on release (popped from the buffer
    /// so the same held modifier can start a fresh shortcut immediately,
    /// per §8 scenario 6).
    fn process_key_event_while_modifier_down(&mut self, down: bool, keysym: u32, ts: u64) {
        if down {
            if !self.shortcut.keys.contains(&keysym) {
                self.shortcut.keys.push(keysym);
            }
            if !crate::keysym::is_printable(keysym) {
                self.shortcut.shift_run_all_printable = false;
            }
        } else if self.shortcut.keys.contains(&keysym) {
            if self.shortcut.shift_run_all_printable {
                // Deferred: resolved into a `Type` action when the
                // primary modifier itself releases.
            } else {
                let start = self.shortcut.start_ns.unwrap_or(ts);
                let keysyms = self.shortcut.keys.clone();
                let names = keysyms.iter().map(|&k| keysym::name(k)).collect();
                self.push_action(Action::KeyboardShortcut { keysyms, names }, start);
                self.shortcut.keys.retain(|&k| k != keysym);
            }
        }
    }

    fn process_key_event_while_modifier_not_down(&mut self, down: bool, keysym: u32, ts: u64) {
        if !down {
            return;
        }
        if crate::keysym::is_printable(keysym) {
            self.typing.start_ns.get_or_insert(ts);
            self.typing.keysyms.push(keysym);
            if let Some(c) = crate::keysym::to_char(keysym) {
                self.typing.text.push(c);
            }
        } else {
            self.flush_typing();
            self.push_action(
                Action::KeyPress {
                    keysym,
                    name: keysym::name(keysym),
                },
                ts,
            );
        }
    }

    fn finish_shortcut_or_shift_run(&mut self) {
        if self.shortcut.shift_run_all_printable && self.shortcut.keys.len() > 1 {
            let text: String = self.shortcut.keys[1..]
                .iter()
                .filter_map(|&k| crate::keysym::to_char(k))
                .map(|c| {
                    if c.is_ascii_alphabetic() {
                        c.to_ascii_uppercase()
                    } else {
                        c
                    }
                })
                .collect();
            if !text.is_empty() {
                let ts = self.shortcut.start_ns.unwrap();
                self.push_action(Action::Type { text }, ts);
            }
        }
    }

    fn flush_typing(&mut self) {
        if !self.typing.keysyms.is_empty() {
            let ts = self.typing.start_ns.unwrap();
            let text = std::mem::take(&mut self.typing.text);
            self.typing.keysyms.clear();
            self.typing.start_ns = None;
            self.push_action(Action::Type { text }, ts);
        }
    }

    // ---- pointer ----

    fn process_pointer_event(&mut self, buttons: u8, x: u16, y: u16, ts: u64) {
        // Mouse activity always ends an in-progress typing run.
        self.flush_typing();

        let prev = self.mouse.buttons;
        if buttons == prev {
            self.process_same_buttons(buttons, x, y, ts);
        } else if prev == 0 {
            self.process_new_button_pressed(buttons, x, y, ts);
        } else if buttons == 0 {
            self.process_all_buttons_released(x, y, ts);
        } else {
            self.process_new_button_pressed(buttons, x, y, ts);
        }
        self.mouse.buttons = buttons;
        self.mouse.x = x;
        self.mouse.y = y;
    }

    fn process_same_buttons(&mut self, buttons: u8, x: u16, y: u16, ts: u64) {
        if buttons == 0 {
            self.flush_burst_if_scrolling(x, y);
            self.mouse.kind = MouseActionKind::Move;
            self.emit_move(x, y, ts);
        } else {
            self.mouse.kind = MouseActionKind::Drag;
        }
    }

    fn process_new_button_pressed(&mut self, buttons: u8, x: u16, y: u16, ts: u64) {
        match buttons {
            BUTTON_SCROLL_DOWN => {
                if self.mouse.kind == MouseActionKind::PotentiallyScrollingUp && self.scroll.count > 0 {
                    self.flush_scroll(ScrollDirection::Up);
                }
                if self.mouse.kind != MouseActionKind::PotentiallyScrollingDown {
                    self.scroll.count = 0;
                    self.scroll.start_ns = None;
                }
                self.scroll.count += 1;
                self.scroll.start_ns.get_or_insert(ts);
                self.scroll.x = x;
                self.scroll.y = y;
                self.mouse.kind = MouseActionKind::PotentiallyScrollingDown;
            }
            BUTTON_SCROLL_UP => {
                if self.mouse.kind == MouseActionKind::PotentiallyScrollingDown && self.scroll.count > 0 {
                    self.flush_scroll(ScrollDirection::Down);
                }
                if self.mouse.kind != MouseActionKind::PotentiallyScrollingUp {
                    self.scroll.count = 0;
                    self.scroll.start_ns = None;
                }
                self.scroll.count += 1;
                self.scroll.start_ns.get_or_insert(ts);
                self.scroll.x = x;
                self.scroll.y = y;
                self.mouse.kind = MouseActionKind::PotentiallyScrollingUp;
            }
            BUTTON_SCROLL_LEFT | BUTTON_SCROLL_RIGHT => {
                self.flush_burst_if_scrolling(x, y);
                let direction = if buttons == BUTTON_SCROLL_LEFT {
                    ScrollDirection::Left
                } else {
                    ScrollDirection::Right
                };
                self.push_action(
                    Action::MouseScroll {
                        direction,
                        repeats: 1,
                        x,
                        y,
                    },
                    ts,
                );
                self.mouse.kind = MouseActionKind::Idle;
            }
            _ => {
                if self.mouse.kind == MouseActionKind::ClickOrDblClick
                    && self.click_run_should_flush(buttons, x, y, ts)
                {
                    self.flush_pending_click_run();
                }
                self.flush_burst_if_scrolling(x, y);
                self.mouse.kind = MouseActionKind::ClickOrDblClickOrDrag;
                self.mouse.press_x = x;
                self.mouse.press_y = y;
                self.mouse.active_button = MouseButton::from_mask(buttons);
            }
        }
        self.mouse.action_start_ns = ts;
    }

    fn process_all_buttons_released(&mut self, x: u16, y: u16, ts: u64) {
        match self.mouse.kind {
            MouseActionKind::Drag => {
                let dx = (x as i32 - self.mouse.press_x as i32).abs();
                let dy = (y as i32 - self.mouse.press_y as i32).abs();
                let button = self.mouse.active_button.unwrap_or(MouseButton::Left);
                if dx < DRAG_MIN_MOVE_PX && dy < DRAG_MIN_MOVE_PX {
                    self.maybe_drop_dedup_move(self.mouse.press_x, self.mouse.press_y, self.mouse.action_start_ns);
                    self.push_action(
                        Action::MouseClick {
                            button,
                            kind: ClickKind::Single,
                            x: self.mouse.press_x,
                            y: self.mouse.press_y,
                        },
                        self.mouse.action_start_ns,
                    );
                } else {
                    self.push_action(
                        Action::MouseDrag {
                            button,
                            start_x: self.mouse.press_x,
                            start_y: self.mouse.press_y,
                            end_x: x,
                            end_y: y,
                        },
                        self.mouse.action_start_ns,
                    );
                }
                self.mouse.kind = MouseActionKind::Move;
            }
            MouseActionKind::ClickOrDblClickOrDrag => {
                self.mouse.kind = MouseActionKind::ClickOrDblClick;
                self.record_click_release(x, y, ts);
            }
            _ => {}
        }
    }

    fn click_run_should_flush(&self, buttons: u8, x: u16, y: u16, ts: u64) -> bool {
        if MouseButton::from_mask(buttons) != self.click.button {
            return true;
        }
        !self.within_multi_click_window(x, y, ts)
    }

    fn within_multi_click_window(&self, x: u16, y: u16, ts: u64) -> bool {
        let ns_ok = self
            .click
            .last_release_ns
            .map(|last| ts.saturating_sub(last) <= MULTI_CLICK_MAX_INTERVAL_NS)
            .unwrap_or(false);
        let px_ok = match (self.click.last_release_x, self.click.last_release_y) {
            (Some(lx), Some(ly)) => {
                let dx = (x as i32 - lx as i32).abs();
                let dy = (y as i32 - ly as i32).abs();
                dx.max(dy) <= MULTI_CLICK_MAX_MOVE_PX
            }
            _ => false,
        };
        ns_ok && px_ok
    }

    fn record_click_release(&mut self, x: u16, y: u16, ts: u64) {
        let button = self.mouse.active_button;
        match self.click.pending_count {
            0 => self.start_click_run(button, x, y, ts),
            1 => {
                if self.within_multi_click_window(x, y, ts) {
                    self.click.pending_count = 2;
                    self.click.last_release_ns = Some(ts);
                    self.click.last_release_x = Some(x);
                    self.click.last_release_y = Some(y);
                } else {
                    self.flush_click(ClickKind::Single);
                    self.start_click_run(button, x, y, ts);
                }
            }
            _ => {
                if self.within_multi_click_window(x, y, ts) {
                    self.click.last_release_x = Some(x);
                    self.click.last_release_y = Some(y);
                    self.flush_click(ClickKind::Triple);
                } else {
                    self.flush_click(ClickKind::Double);
                    self.start_click_run(button, x, y, ts);
                }
            }
        }
    }

    fn start_click_run(&mut self, button: Option<MouseButton>, x: u16, y: u16, ts: u64) {
        self.click.pending_count = 1;
        self.click.button = button;
        self.click.last_release_ns = Some(ts);
        self.click.last_release_x = Some(x);
        self.click.last_release_y = Some(y);
        self.click.click_start_ns = Some(self.mouse.action_start_ns);
    }

    fn flush_pending_click_run(&mut self) {
        match self.click.pending_count {
            1 => self.flush_click(ClickKind::Single),
            2 => self.flush_click(ClickKind::Double),
            _ => {}
        }
    }

    fn flush_click(&mut self, kind: ClickKind) {
        let x = match self.click.last_release_x {
            Some(x) => x,
            None => return,
        };
        let y = match self.click.last_release_y {
            Some(y) => y,
            None => return,
        };
        let ts = self.click.click_start_ns.unwrap_or(self.mouse.action_start_ns);
        let button = self.click.button.unwrap_or(MouseButton::Left);
        self.maybe_drop_dedup_move(x, y, ts);
        self.push_action(Action::MouseClick { button, kind, x, y }, ts);
        self.click.pending_count = 0;
    }

    fn emit_move(&mut self, x: u16, y: u16, ts: u64) {
        self.push_action(Action::MouseMove { x, y }, ts);
        self.last_move = Some((x, y, ts, self.actions.len() - 1));
    }

    /// Drops the immediately preceding `MouseMove` if it landed at the
    /// same position within the multi-click window of the click about to
    /// be emitted — §8 scenario 7.
    fn maybe_drop_dedup_move(&mut self, x: u16, y: u16, ts: u64) {
        if let Some((mx, my, mts, idx)) = self.last_move {
            let adjacent = idx + 1 == self.actions.len();
            let same_pos = mx == x && my == y;
            let delta = ts.abs_diff(mts);
            if adjacent && same_pos && delta <= MULTI_CLICK_MAX_INTERVAL_NS {
                self.actions.remove(idx);
                self.last_move = None;
            }
        }
    }

    fn flush_burst_if_scrolling(&mut self, _x: u16, _y: u16) {
        match self.mouse.kind {
            MouseActionKind::PotentiallyScrollingDown if self.scroll.count > 0 => {
                self.flush_scroll(ScrollDirection::Down);
            }
            MouseActionKind::PotentiallyScrollingUp if self.scroll.count > 0 => {
                self.flush_scroll(ScrollDirection::Up);
            }
            _ => {}
        }
    }

    fn flush_scroll(&mut self, direction: ScrollDirection) {
        let ts = self.scroll.start_ns.take().unwrap_or(self.mouse.action_start_ns);
        let repeats = self.scroll.count;
        self.scroll.count = 0;
        self.push_action(
            Action::MouseScroll {
                direction,
                repeats,
                x: self.scroll.x,
                y: self.scroll.y,
            },
            ts,
        );
    }
}

impl Default for ActionSynthesizer {
    fn default() -> Self {
        ActionSynthesizer::new()
    }
}

/// Runs the synthesizer over a finite sequence of `(timestamp_ns, event)`
/// pairs and returns the synthesized actions in order.
pub fn synthesize<I>(steps: I) -> Vec<ActionStep>
where
    I: IntoIterator<Item = (u64, Option<RawEvent>)>,
{
    let mut synth = ActionSynthesizer::new();
    for (ts, event) in steps {
        synth.step(ts, event);
    }
    synth.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keysym;

    const LEFT: u8 = super::super::types::BUTTON_LEFT;
    const SCROLL_DOWN: u8 = super::super::types::BUTTON_SCROLL_DOWN;

    fn key(down: bool, ks: u32) -> Option<RawEvent> {
        Some(RawEvent::Key { down, keysym: ks })
    }

    fn ptr(buttons: u8, x: u16, y: u16) -> Option<RawEvent> {
        Some(RawEvent::Pointer {
            button_mask: buttons,
            x,
            y,
        })
    }

    fn only_action(steps: Vec<(u64, Option<RawEvent>)>) -> Action {
        let actions = synthesize(steps);
        assert_eq!(actions.len(), 1, "expected exactly one action: {:?}", actions);
        actions.into_iter().next().unwrap().action
    }

    #[test]
    fn double_click_recognition() {
        let steps = vec![
            (0, ptr(LEFT, 100, 100)),
            (10_000_000, ptr(0, 100, 100)),
            (40_000_000, ptr(LEFT, 100, 100)),
            (48_000_000, ptr(0, 100, 100)),
        ];
        let actions = synthesize(steps);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].relative, "00:00:00.000");
        match &actions[0].action {
            Action::MouseClick { button, kind, x, y } => {
                assert_eq!(*button, MouseButton::Left);
                assert_eq!(*kind, ClickKind::Double);
                assert_eq!((*x, *y), (100, 100));
            }
            other => panic!("expected double click, got {:?}", other),
        }
    }

    #[test]
    fn triple_click_becomes_triple() {
        let steps = vec![
            (0, ptr(LEFT, 100, 100)),
            (10_000_000, ptr(0, 100, 100)),
            (40_000_000, ptr(LEFT, 100, 100)),
            (48_000_000, ptr(0, 100, 100)),
            (80_000_000, ptr(LEFT, 101, 100)),
            (92_000_000, ptr(0, 101, 100)),
        ];
        let action = only_action(steps);
        match action {
            Action::MouseClick { kind, x, y, .. } => {
                assert_eq!(kind, ClickKind::Triple);
                assert_eq!((x, y), (101, 100));
            }
            other => panic!("expected triple click, got {:?}", other),
        }
    }

    #[test]
    fn failed_triple_degrades_to_double_and_single() {
        let steps = vec![
            (0, ptr(LEFT, 100, 100)),
            (10_000_000, ptr(0, 100, 100)),
            (40_000_000, ptr(LEFT, 100, 100)),
            (48_000_000, ptr(0, 100, 100)),
            (150_000_000, ptr(LEFT, 100, 100)),
            (200_000_000, ptr(0, 100, 100)),
        ];
        let actions = synthesize(steps);
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].relative, "00:00:00.000");
        assert!(matches!(
            actions[0].action,
            Action::MouseClick { kind: ClickKind::Double, .. }
        ));
        assert_eq!(actions[1].relative, "00:00:00.150");
        assert!(matches!(
            actions[1].action,
            Action::MouseClick { kind: ClickKind::Single, .. }
        ));
    }

    #[test]
    fn scroll_burst_aggregation() {
        let steps = vec![
            (0, ptr(SCROLL_DOWN, 50, 50)),
            (1_000_000, ptr(0, 50, 50)),
            (8_000_000, ptr(SCROLL_DOWN, 50, 50)),
            (9_000_000, ptr(0, 50, 50)),
            (16_000_000, ptr(SCROLL_DOWN, 50, 50)),
            (17_000_000, ptr(0, 50, 50)),
            (23_000_000, ptr(SCROLL_DOWN, 50, 50)),
            (24_000_000, ptr(0, 50, 50)),
            (30_000_000, ptr(SCROLL_DOWN, 50, 50)),
            (31_000_000, ptr(0, 50, 50)),
            (60_000_000, ptr(0, 60, 60)),
        ];
        let actions = synthesize(steps);
        assert_eq!(actions.len(), 2);
        match &actions[0].action {
            Action::MouseScroll {
                direction,
                repeats,
                x,
                y,
            } => {
                assert_eq!(*direction, ScrollDirection::Down);
                assert_eq!(*repeats, 5);
                assert_eq!((*x, *y), (50, 50));
            }
            other => panic!("expected scroll burst, got {:?}", other),
        }
        assert_eq!(actions[0].relative, "00:00:00.000");
        assert!(matches!(
            actions[1].action,
            Action::MouseMove { x: 60, y: 60 }
        ));
    }

    #[test]
    fn shift_typed_capital_letters() {
        let steps = vec![
            (0, key(true, keysym::SHIFT_L)),
            (1_000_000, key(true, 'a' as u32)),
            (2_000_000, key(false, 'a' as u32)),
            (3_000_000, key(true, 'b' as u32)),
            (4_000_000, key(false, 'b' as u32)),
            (5_000_000, key(false, keysym::SHIFT_L)),
        ];
        let action = only_action(steps);
        match action {
            Action::Type { text } => assert_eq!(text, "AB"),
            other => panic!("expected Type(\"AB\"), got {:?}", other),
        }
    }

    #[test]
    fn ctrl_shortcut_without_releasing_ctrl() {
        let steps = vec![
            (0, key(true, keysym::CONTROL_L)),
            (1_000_000, key(true, 'c' as u32)),
            (2_000_000, key(false, 'c' as u32)),
            (3_000_000, key(true, 'f' as u32)),
            (4_000_000, key(false, 'f' as u32)),
            (5_000_000, key(false, keysym::CONTROL_L)),
        ];
        let actions = synthesize(steps);
        assert_eq!(actions.len(), 2);
        for a in &actions {
            assert_eq!(a.relative_ns, 0);
        }
        match &actions[0].action {
            Action::KeyboardShortcut { keysyms, .. } => {
                assert_eq!(keysyms, &vec![keysym::CONTROL_L, 'c' as u32]);
            }
            other => panic!("expected shortcut, got {:?}", other),
        }
        match &actions[1].action {
            Action::KeyboardShortcut { keysyms, .. } => {
                assert_eq!(keysyms, &vec![keysym::CONTROL_L, 'f' as u32]);
            }
            other => panic!("expected shortcut, got {:?}", other),
        }
    }

    #[test]
    fn move_then_click_dedups_the_move() {
        let steps = vec![
            (0, ptr(0, 200, 200)),
            (5_000_000, ptr(LEFT, 200, 200)),
            (15_000_000, ptr(0, 200, 200)),
        ];
        let action = only_action(steps);
        match action {
            Action::MouseClick { x, y, kind, .. } => {
                assert_eq!((x, y), (200, 200));
                assert_eq!(kind, ClickKind::Single);
            }
            other => panic!("expected single click, got {:?}", other),
        }
    }
}
