//! X11 keysym constants and conversions.
//!
//! ASCII printable characters (0x20..=0x7E) and Latin-1 (0xA0..=0xFF) share
//! their codepoint with the keysym value; anything else above that range
//! uses the X11 "Unicode keysym" convention `0x01000000 + codepoint`. Named
//! keys (modifiers, function keys, navigation) have no character
//! representation and are listed as named constants below, the same way
//! `keysymdef.h` lists them upstream.

/// Start of the X11 Unicode keysym range: keysym = 0x01000000 + codepoint.
pub const UNICODE_KEYSYM_BASE: u32 = 0x0100_0000;

pub const SHIFT_L: u32 = 0xFFE1;
pub const SHIFT_R: u32 = 0xFFE2;
pub const CONTROL_L: u32 = 0xFFE3;
pub const CONTROL_R: u32 = 0xFFE4;
pub const ALT_L: u32 = 0xFFE9;
pub const ALT_R: u32 = 0xFFEA;
pub const SUPER_L: u32 = 0xFFEB;
pub const SUPER_R: u32 = 0xFFEC;

pub const RETURN: u32 = 0xFF0D;
pub const BACKSPACE: u32 = 0xFF08;
pub const TAB: u32 = 0xFF09;
pub const ESCAPE: u32 = 0xFF1B;
pub const DELETE: u32 = 0xFFFF;
pub const HOME: u32 = 0xFF50;
pub const LEFT: u32 = 0xFF51;
pub const UP: u32 = 0xFF52;
pub const RIGHT: u32 = 0xFF53;
pub const DOWN: u32 = 0xFF54;
pub const END: u32 = 0xFF57;
pub const F1: u32 = 0xFFBE;

/// Characters for which the original does not trust the server to promote
/// the base keysym under `Shift`, so the client wraps them in an explicit
/// `Shift_L` press/release. Kept as a standalone table (rather than inline
/// matches) so a future configuration layer can override it per server.
pub const SHIFT_AUGMENTED_CHARS: &[char] = &[
    '~', '!', '@', '#', '$', '%', '^', '&', '*', '(', ')', '_', '+', ':', '<', '>', '?', '|', '{',
    '}', '"',
];

pub fn needs_shift(c: char) -> bool {
    SHIFT_AUGMENTED_CHARS.contains(&c)
}

/// Maps a Unicode scalar value to its X11 keysym, per the ASCII/Latin-1/
/// Unicode-keysym rules above. This mapping never fails: any `char` has a
/// representable keysym.
pub fn from_char(c: char) -> u32 {
    let cp = c as u32;
    if (0x20..=0x7E).contains(&cp) || (0xA0..=0xFF).contains(&cp) {
        cp
    } else {
        UNICODE_KEYSYM_BASE + cp
    }
}

/// Reverses `from_char`. Returns `None` for named (non-printable) keysyms.
pub fn to_char(keysym: u32) -> Option<char> {
    if (0x20..=0x7E).contains(&keysym) || (0xA0..=0xFF).contains(&keysym) {
        char::from_u32(keysym)
    } else if keysym >= UNICODE_KEYSYM_BASE {
        char::from_u32(keysym - UNICODE_KEYSYM_BASE)
    } else {
        None
    }
}

/// True for keysyms classified as ASCII-printable, Latin-1, or
/// X11-Unicode: the set the action synthesizer buffers into a typing run
/// while no modifier is held.
pub fn is_printable(keysym: u32) -> bool {
    (0x20..=0x7E).contains(&keysym)
        || (0xA0..=0xFF).contains(&keysym)
        || keysym >= UNICODE_KEYSYM_BASE
}

/// True for the eight modifier keysyms (Shift/Control/Alt/Super, left and
/// right). `Super` stands in for the "Function" modifier class named in
/// the design: no single X11 keysym is universally "Function", so the
/// left/right Super keysyms are used as that slot.
pub fn is_modifier(keysym: u32) -> bool {
    matches!(
        keysym,
        SHIFT_L | SHIFT_R | CONTROL_L | CONTROL_R | ALT_L | ALT_R | SUPER_L | SUPER_R
    )
}

/// Human-readable name for a keysym, used when labeling synthesized
/// `KeyboardShortcut`/`KeyPress` actions. Printable keysyms render as
/// their character; named keysyms render as their conventional
/// `keysymdef.h` name.
pub fn name(keysym: u32) -> String {
    match keysym {
        SHIFT_L => "Shift_L".to_string(),
        SHIFT_R => "Shift_R".to_string(),
        CONTROL_L => "Control_L".to_string(),
        CONTROL_R => "Control_R".to_string(),
        ALT_L => "Alt_L".to_string(),
        ALT_R => "Alt_R".to_string(),
        SUPER_L => "Super_L".to_string(),
        SUPER_R => "Super_R".to_string(),
        RETURN => "Return".to_string(),
        BACKSPACE => "BackSpace".to_string(),
        TAB => "Tab".to_string(),
        ESCAPE => "Escape".to_string(),
        DELETE => "Delete".to_string(),
        HOME => "Home".to_string(),
        LEFT => "Left".to_string(),
        UP => "Up".to_string(),
        RIGHT => "Right".to_string(),
        DOWN => "Down".to_string(),
        END => "End".to_string(),
        k if (F1..=F1 + 11).contains(&k) => format!("F{}", k - F1 + 1),
        k => match to_char(k) {
            Some(c) => c.to_string(),
            None => format!("0x{:08x}", k),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_round_trips() {
        for c in ' '..='~' {
            let ks = from_char(c);
            assert_eq!(ks, c as u32);
            assert_eq!(to_char(ks), Some(c));
            assert!(is_printable(ks));
        }
    }

    #[test]
    fn unicode_round_trips() {
        let c = '\u{1F600}';
        let ks = from_char(c);
        assert_eq!(ks, UNICODE_KEYSYM_BASE + c as u32);
        assert_eq!(to_char(ks), Some(c));
        assert!(is_printable(ks));
    }

    #[test]
    fn shift_table_matches_spec_literal_list() {
        assert!(needs_shift('~'));
        assert!(needs_shift('"'));
        assert!(!needs_shift('a'));
        assert!(!needs_shift('5'));
    }

    #[test]
    fn modifiers_are_not_printable() {
        assert!(is_modifier(SHIFT_L));
        assert!(is_modifier(CONTROL_R));
        assert!(!is_printable(SHIFT_L));
    }
}
