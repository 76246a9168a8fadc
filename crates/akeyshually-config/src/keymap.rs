//! Key-name table shared by the parser and the matching engine.
//!
//! The table is fixed and case-insensitive. Key specs in the configuration
//! are resolved against it at load time (unknown names fail the load), and
//! the engine uses the reverse direction to build canonical combo strings
//! from kernel key codes.
//!
//! Every code has exactly one canonical name; aliases (`esc`, `enter`,
//! `printscreen`, ...) normalize to it before lookup so that a combo built
//! from a key code always matches a combo built from any spelling of the
//! same key in the config.

use evdev::Key;

/// Normalize a single key or modifier name to its canonical spelling.
///
/// Covers modifier aliases (`mod`/`meta`/`win`/`cmd`, `control`/`ctl`,
/// `sft`) and key aliases (`esc`, `ret`, `del`, `ins`, `prt`, `bksp`,
/// media shorthands). Unknown names pass through unchanged so the caller
/// can report them against the key table.
pub fn normalize(name: &str) -> String {
    let name = name.trim().to_lowercase();

    let canonical = match name.as_str() {
        // Modifier aliases
        "mod" | "meta" | "win" | "cmd" => "super",
        "control" | "ctl" => "ctrl",
        "sft" => "shift",
        // Key aliases
        "enter" | "ret" => "return",
        "esc" => "escape",
        "del" => "delete",
        "ins" => "insert",
        "prt" | "prtsc" | "printscreen" => "print",
        "bksp" => "backspace",
        "pgup" => "pageup",
        "pgdn" | "pgdown" => "pagedown",
        // Media aliases
        "play" => "playpause",
        "next" => "nextsong",
        "previous" | "prev" => "previoussong",
        "calculator" => "calc",
        other => other,
    };

    canonical.to_string()
}

/// True if `name` (canonical form) is one of the four combo modifiers.
pub fn is_modifier_name(name: &str) -> bool {
    matches!(name, "super" | "ctrl" | "alt" | "shift")
}

/// The left and right key codes of a modifier name, if it is one.
///
/// Both variants map to the same shortcut: a tap bound to `super` fires
/// for either meta key.
pub fn modifier_codes(name: &str) -> Option<[u16; 2]> {
    let pair = match name {
        "super" => [Key::KEY_LEFTMETA, Key::KEY_RIGHTMETA],
        "ctrl" => [Key::KEY_LEFTCTRL, Key::KEY_RIGHTCTRL],
        "alt" => [Key::KEY_LEFTALT, Key::KEY_RIGHTALT],
        "shift" => [Key::KEY_LEFTSHIFT, Key::KEY_RIGHTSHIFT],
        _ => return None,
    };
    Some([pair[0].code(), pair[1].code()])
}

/// True if the key code is a left or right super/ctrl/alt/shift key.
pub fn is_modifier_code(code: u16) -> bool {
    let key = Key::new(code);
    matches!(
        key,
        Key::KEY_LEFTMETA
            | Key::KEY_RIGHTMETA
            | Key::KEY_LEFTCTRL
            | Key::KEY_RIGHTCTRL
            | Key::KEY_LEFTALT
            | Key::KEY_RIGHTALT
            | Key::KEY_LEFTSHIFT
            | Key::KEY_RIGHTSHIFT
    )
}

/// True if the key code is a media key (volume, brightness, playback).
///
/// With `disable_media_keys` set these are forwarded untouched so the
/// desktop environment keeps handling them.
pub fn is_media_key(code: u16) -> bool {
    let key = Key::new(code);
    matches!(
        key,
        Key::KEY_VOLUMEUP
            | Key::KEY_VOLUMEDOWN
            | Key::KEY_MUTE
            | Key::KEY_BRIGHTNESSUP
            | Key::KEY_BRIGHTNESSDOWN
            | Key::KEY_PLAYPAUSE
            | Key::KEY_NEXTSONG
            | Key::KEY_PREVIOUSSONG
            | Key::KEY_STOPCD
            | Key::KEY_PLAYCD
            | Key::KEY_PAUSECD
    )
}

/// Resolve a canonical key name to its kernel key code.
///
/// Callers should [`normalize`] first; this function only knows canonical
/// spellings. Modifier names are not key names here, they are resolved
/// through [`modifier_codes`].
pub fn code(name: &str) -> Option<u16> {
    let key = match name {
        "a" => Key::KEY_A,
        "b" => Key::KEY_B,
        "c" => Key::KEY_C,
        "d" => Key::KEY_D,
        "e" => Key::KEY_E,
        "f" => Key::KEY_F,
        "g" => Key::KEY_G,
        "h" => Key::KEY_H,
        "i" => Key::KEY_I,
        "j" => Key::KEY_J,
        "k" => Key::KEY_K,
        "l" => Key::KEY_L,
        "m" => Key::KEY_M,
        "n" => Key::KEY_N,
        "o" => Key::KEY_O,
        "p" => Key::KEY_P,
        "q" => Key::KEY_Q,
        "r" => Key::KEY_R,
        "s" => Key::KEY_S,
        "t" => Key::KEY_T,
        "u" => Key::KEY_U,
        "v" => Key::KEY_V,
        "w" => Key::KEY_W,
        "x" => Key::KEY_X,
        "y" => Key::KEY_Y,
        "z" => Key::KEY_Z,

        "0" => Key::KEY_0,
        "1" => Key::KEY_1,
        "2" => Key::KEY_2,
        "3" => Key::KEY_3,
        "4" => Key::KEY_4,
        "5" => Key::KEY_5,
        "6" => Key::KEY_6,
        "7" => Key::KEY_7,
        "8" => Key::KEY_8,
        "9" => Key::KEY_9,

        "return" => Key::KEY_ENTER,
        "space" => Key::KEY_SPACE,
        "tab" => Key::KEY_TAB,
        "escape" => Key::KEY_ESC,
        "backspace" => Key::KEY_BACKSPACE,
        "print" => Key::KEY_SYSRQ,

        "f1" => Key::KEY_F1,
        "f2" => Key::KEY_F2,
        "f3" => Key::KEY_F3,
        "f4" => Key::KEY_F4,
        "f5" => Key::KEY_F5,
        "f6" => Key::KEY_F6,
        "f7" => Key::KEY_F7,
        "f8" => Key::KEY_F8,
        "f9" => Key::KEY_F9,
        "f10" => Key::KEY_F10,
        "f11" => Key::KEY_F11,
        "f12" => Key::KEY_F12,
        "f13" => Key::KEY_F13,
        "f14" => Key::KEY_F14,
        "f15" => Key::KEY_F15,
        "f16" => Key::KEY_F16,
        "f17" => Key::KEY_F17,
        "f18" => Key::KEY_F18,
        "f19" => Key::KEY_F19,
        "f20" => Key::KEY_F20,
        "f21" => Key::KEY_F21,
        "f22" => Key::KEY_F22,
        "f23" => Key::KEY_F23,
        "f24" => Key::KEY_F24,

        "left" => Key::KEY_LEFT,
        "right" => Key::KEY_RIGHT,
        "up" => Key::KEY_UP,
        "down" => Key::KEY_DOWN,
        "home" => Key::KEY_HOME,
        "end" => Key::KEY_END,
        "pageup" => Key::KEY_PAGEUP,
        "pagedown" => Key::KEY_PAGEDOWN,
        "delete" => Key::KEY_DELETE,
        "insert" => Key::KEY_INSERT,

        "volumeup" => Key::KEY_VOLUMEUP,
        "volumedown" => Key::KEY_VOLUMEDOWN,
        "mute" => Key::KEY_MUTE,
        "brightnessup" => Key::KEY_BRIGHTNESSUP,
        "brightnessdown" => Key::KEY_BRIGHTNESSDOWN,
        "playpause" => Key::KEY_PLAYPAUSE,
        "nextsong" => Key::KEY_NEXTSONG,
        "previoussong" => Key::KEY_PREVIOUSSONG,
        "calc" => Key::KEY_CALC,

        _ => return None,
    };
    Some(key.code())
}

/// Canonical name of a kernel key code, for building combo strings.
///
/// The inverse of [`code`]: every name returned here resolves back to the
/// same code, so combos survive a round trip through either direction.
pub fn name(code: u16) -> Option<&'static str> {
    let name = match Key::new(code) {
        Key::KEY_A => "a",
        Key::KEY_B => "b",
        Key::KEY_C => "c",
        Key::KEY_D => "d",
        Key::KEY_E => "e",
        Key::KEY_F => "f",
        Key::KEY_G => "g",
        Key::KEY_H => "h",
        Key::KEY_I => "i",
        Key::KEY_J => "j",
        Key::KEY_K => "k",
        Key::KEY_L => "l",
        Key::KEY_M => "m",
        Key::KEY_N => "n",
        Key::KEY_O => "o",
        Key::KEY_P => "p",
        Key::KEY_Q => "q",
        Key::KEY_R => "r",
        Key::KEY_S => "s",
        Key::KEY_T => "t",
        Key::KEY_U => "u",
        Key::KEY_V => "v",
        Key::KEY_W => "w",
        Key::KEY_X => "x",
        Key::KEY_Y => "y",
        Key::KEY_Z => "z",

        Key::KEY_0 => "0",
        Key::KEY_1 => "1",
        Key::KEY_2 => "2",
        Key::KEY_3 => "3",
        Key::KEY_4 => "4",
        Key::KEY_5 => "5",
        Key::KEY_6 => "6",
        Key::KEY_7 => "7",
        Key::KEY_8 => "8",
        Key::KEY_9 => "9",

        Key::KEY_ENTER => "return",
        Key::KEY_SPACE => "space",
        Key::KEY_TAB => "tab",
        Key::KEY_ESC => "escape",
        Key::KEY_BACKSPACE => "backspace",
        Key::KEY_SYSRQ => "print",

        Key::KEY_F1 => "f1",
        Key::KEY_F2 => "f2",
        Key::KEY_F3 => "f3",
        Key::KEY_F4 => "f4",
        Key::KEY_F5 => "f5",
        Key::KEY_F6 => "f6",
        Key::KEY_F7 => "f7",
        Key::KEY_F8 => "f8",
        Key::KEY_F9 => "f9",
        Key::KEY_F10 => "f10",
        Key::KEY_F11 => "f11",
        Key::KEY_F12 => "f12",
        Key::KEY_F13 => "f13",
        Key::KEY_F14 => "f14",
        Key::KEY_F15 => "f15",
        Key::KEY_F16 => "f16",
        Key::KEY_F17 => "f17",
        Key::KEY_F18 => "f18",
        Key::KEY_F19 => "f19",
        Key::KEY_F20 => "f20",
        Key::KEY_F21 => "f21",
        Key::KEY_F22 => "f22",
        Key::KEY_F23 => "f23",
        Key::KEY_F24 => "f24",

        Key::KEY_LEFT => "left",
        Key::KEY_RIGHT => "right",
        Key::KEY_UP => "up",
        Key::KEY_DOWN => "down",
        Key::KEY_HOME => "home",
        Key::KEY_END => "end",
        Key::KEY_PAGEUP => "pageup",
        Key::KEY_PAGEDOWN => "pagedown",
        Key::KEY_DELETE => "delete",
        Key::KEY_INSERT => "insert",

        Key::KEY_VOLUMEUP => "volumeup",
        Key::KEY_VOLUMEDOWN => "volumedown",
        Key::KEY_MUTE => "mute",
        Key::KEY_BRIGHTNESSUP => "brightnessup",
        Key::KEY_BRIGHTNESSDOWN => "brightnessdown",
        Key::KEY_PLAYPAUSE => "playpause",
        Key::KEY_NEXTSONG => "nextsong",
        Key::KEY_PREVIOUSSONG => "previoussong",
        Key::KEY_CALC => "calc",

        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_modifier_aliases() {
        assert_eq!(normalize("Mod"), "super");
        assert_eq!(normalize("meta"), "super");
        assert_eq!(normalize("WIN"), "super");
        assert_eq!(normalize("cmd"), "super");
        assert_eq!(normalize("control"), "ctrl");
        assert_eq!(normalize("ctl"), "ctrl");
        assert_eq!(normalize("sft"), "shift");
        assert_eq!(normalize("alt"), "alt");
    }

    #[test]
    fn test_normalize_key_aliases() {
        assert_eq!(normalize("esc"), "escape");
        assert_eq!(normalize("enter"), "return");
        assert_eq!(normalize("ret"), "return");
        assert_eq!(normalize("printscreen"), "print");
        assert_eq!(normalize("prtsc"), "print");
        assert_eq!(normalize("del"), "delete");
        assert_eq!(normalize("ins"), "insert");
        assert_eq!(normalize("bksp"), "backspace");
        assert_eq!(normalize("pgdn"), "pagedown");
        assert_eq!(normalize("play"), "playpause");
        assert_eq!(normalize("prev"), "previoussong");
    }

    #[test]
    fn test_code_lookup() {
        assert_eq!(code("a"), Some(Key::KEY_A.code()));
        assert_eq!(code("return"), Some(Key::KEY_ENTER.code()));
        assert_eq!(code("escape"), Some(Key::KEY_ESC.code()));
        assert_eq!(code("print"), Some(Key::KEY_SYSRQ.code()));
        assert_eq!(code("f24"), Some(Key::KEY_F24.code()));
        assert_eq!(code("volumeup"), Some(Key::KEY_VOLUMEUP.code()));
        assert_eq!(code("nosuchkey"), None);
        // Modifiers are not bare key names
        assert_eq!(code("super"), None);
    }

    #[test]
    fn test_name_is_inverse_of_code() {
        for n in [
            "a", "z", "5", "return", "escape", "print", "space", "tab", "f1", "f24", "up",
            "pagedown", "delete", "volumeup", "playpause", "calc",
        ] {
            let c = code(n).unwrap();
            assert_eq!(name(c), Some(n), "canonical round trip for {n}");
        }
    }

    #[test]
    fn test_alias_and_canonical_agree() {
        // A combo written with an alias must land on the same code as the
        // canonical spelling the engine derives from the kernel event.
        assert_eq!(code(&normalize("esc")), code("escape"));
        assert_eq!(code(&normalize("enter")), code("return"));
        assert_eq!(code(&normalize("printscreen")), code("print"));
    }

    #[test]
    fn test_modifier_codes() {
        assert_eq!(
            modifier_codes("super"),
            Some([Key::KEY_LEFTMETA.code(), Key::KEY_RIGHTMETA.code()])
        );
        assert_eq!(
            modifier_codes("shift"),
            Some([Key::KEY_LEFTSHIFT.code(), Key::KEY_RIGHTSHIFT.code()])
        );
        assert_eq!(modifier_codes("a"), None);
    }

    #[test]
    fn test_is_modifier_code() {
        assert!(is_modifier_code(Key::KEY_LEFTMETA.code()));
        assert!(is_modifier_code(Key::KEY_RIGHTSHIFT.code()));
        assert!(!is_modifier_code(Key::KEY_A.code()));
    }

    #[test]
    fn test_is_media_key() {
        assert!(is_media_key(Key::KEY_VOLUMEUP.code()));
        assert!(is_media_key(Key::KEY_PLAYPAUSE.code()));
        assert!(!is_media_key(Key::KEY_A.code()));
    }
}
