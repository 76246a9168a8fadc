//! Device discovery, classification, grabbing and virtual clones.
//!
//! Scans `/dev/input/event*`, classifies each device from its advertised
//! capabilities, grabs the selected keyboards exclusively and pairs each
//! with a uinput clone that re-emits whatever the dispatcher forwards.
//! Mice are opened read-only; their clicks only feed tap cancellation.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, Device, EventType, Key};

/// Marker appended to every virtual clone's name. Devices carrying it are
/// skipped during discovery so a restarted daemon never grabs its own
/// clones.
pub const DAEMON_MARKER: &str = "akeyshually";

/// Known software remappers. When one of these owns the physical
/// keyboards, its virtual device is the one to grab.
const REMAPPER_MARKERS: [&str; 4] = ["keyd", "kanata", "kmonad", "xremap"];

/// Hardware buttons that identify a button device (phone buttons, media
/// strips) even though it has no full keyboard layout.
const BUTTON_KEYS: [Key; 6] = [
    Key::KEY_VOLUMEUP,
    Key::KEY_VOLUMEDOWN,
    Key::KEY_POWER,
    Key::KEY_MUTE,
    Key::KEY_BRIGHTNESSUP,
    Key::KEY_BRIGHTNESSDOWN,
];

/// What a device looks like to the selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    /// Virtual keyboard of a known remapper (keyd, kanata, ...).
    RemapperVirtual,
    /// Full physical keyboard: keys, autorepeat, A-Z row.
    Keyboard,
    /// Hardware buttons without autorepeat (volume, power, brightness).
    Button,
    /// Pointer device with at least a left button.
    Mouse,
    /// Nothing we listen to.
    Ignored,
}

/// Capability facts extracted from one evdev device.
#[derive(Debug, Clone)]
pub struct DeviceCaps {
    pub name: String,
    pub has_key: bool,
    pub has_repeat: bool,
    pub has_alphabet: bool,
    pub has_button_key: bool,
    pub has_left_button: bool,
}

impl DeviceCaps {
    fn of(device: &Device) -> Self {
        let name = device.name().unwrap_or("Unknown").to_string();
        let has_key = device.supported_events().contains(EventType::KEY);
        let has_repeat = device.supported_events().contains(EventType::REPEAT);

        let (has_alphabet, has_button_key, has_left_button) = match device.supported_keys() {
            Some(keys) => (
                (Key::KEY_A.code()..=Key::KEY_Z.code()).all(|c| keys.contains(Key::new(c))),
                BUTTON_KEYS.iter().any(|k| keys.contains(*k)),
                keys.contains(Key::BTN_LEFT),
            ),
            None => (false, false, false),
        };

        Self {
            name,
            has_key,
            has_repeat,
            has_alphabet,
            has_button_key,
            has_left_button,
        }
    }
}

/// Classification rules, applied in order. Remappers come first because
/// their virtual devices do not always advertise autorepeat.
pub fn classify(caps: &DeviceCaps) -> DeviceClass {
    let name_lower = caps.name.to_lowercase();

    if name_lower.contains(DAEMON_MARKER) {
        return DeviceClass::Ignored;
    }

    if REMAPPER_MARKERS.iter().any(|m| name_lower.contains(m)) && caps.has_key && caps.has_alphabet
    {
        return DeviceClass::RemapperVirtual;
    }

    if caps.has_key && !caps.has_repeat && caps.has_button_key {
        return DeviceClass::Button;
    }

    if caps.has_key && caps.has_repeat && caps.has_alphabet {
        return DeviceClass::Keyboard;
    }

    if caps.has_key && !caps.has_repeat && caps.has_left_button {
        return DeviceClass::Mouse;
    }

    DeviceClass::Ignored
}

/// A grabbed physical keyboard and its virtual output clone.
pub struct KeyboardPair {
    pub name: String,
    pub physical: Device,
    pub output: VirtualDevice,
}

/// A read-only mouse handle.
pub struct MouseDevice {
    pub name: String,
    pub device: Device,
}

/// Everything discovery produced.
pub struct Discovery {
    pub keyboards: Vec<KeyboardPair>,
    pub mice: Vec<MouseDevice>,
}

/// Enumerate, classify, select and grab input devices.
///
/// Selection policy: when any remapper-virtual keyboard exists, plain
/// physical keyboards are closed (the remapper already owns them) and the
/// remappers plus button devices are grabbed. Otherwise physical
/// keyboards plus button devices are grabbed. Mice are never grabbed.
///
/// # Errors
///
/// Fails when `/dev/input` cannot be read or when not a single keyboard
/// could be grabbed and cloned.
pub fn discover() -> Result<Discovery> {
    let mut remappers: Vec<Device> = Vec::new();
    let mut keyboards: Vec<Device> = Vec::new();
    let mut buttons: Vec<Device> = Vec::new();
    let mut mice: Vec<MouseDevice> = Vec::new();

    let mut permission_denied = false;

    for path in event_device_paths()? {
        let device = match Device::open(&path) {
            Ok(device) => device,
            Err(e) => {
                if is_permission_denied(&e) {
                    permission_denied = true;
                }
                tracing::debug!("could not open {}: {}", path.display(), e);
                continue;
            }
        };

        let caps = DeviceCaps::of(&device);
        let class = classify(&caps);
        tracing::debug!(
            "{} at {} classified as {:?}",
            caps.name,
            path.display(),
            class
        );

        match class {
            DeviceClass::RemapperVirtual => remappers.push(device),
            DeviceClass::Keyboard => keyboards.push(device),
            DeviceClass::Button => buttons.push(device),
            DeviceClass::Mouse => mice.push(MouseDevice {
                name: caps.name,
                device,
            }),
            DeviceClass::Ignored => {}
        }
    }

    let Some(to_grab) = select(remappers, keyboards, buttons) else {
        bail!(no_devices_error("no keyboards detected", permission_denied));
    };

    let mut pairs = Vec::with_capacity(to_grab.len());
    for mut device in to_grab {
        let name = device.name().unwrap_or("Unknown").to_string();

        if let Err(e) = device.grab() {
            if is_permission_denied(&e) {
                permission_denied = true;
            }
            tracing::warn!("failed to grab {}: {}", name, e);
            continue;
        }

        match clone_device(&device, &name) {
            Ok(output) => pairs.push(KeyboardPair {
                name,
                physical: device,
                output,
            }),
            Err(e) => {
                tracing::warn!("failed to clone {}: {}", name, e);
                let _ = device.ungrab();
            }
        }
    }

    if pairs.is_empty() {
        bail!(no_devices_error(
            "no keyboards could be grabbed",
            permission_denied
        ));
    }

    Ok(Discovery {
        keyboards: pairs,
        mice,
    })
}

/// Selection policy over classified devices. A remapper's virtual
/// keyboard means the remapper already owns the physical keyboards, so
/// those are dropped and the remappers are grabbed instead. Button
/// devices are always included. `None` when nothing is left to grab.
fn select<T>(remappers: Vec<T>, keyboards: Vec<T>, buttons: Vec<T>) -> Option<Vec<T>> {
    let selected: Vec<T> = if remappers.is_empty() {
        keyboards.into_iter().chain(buttons).collect()
    } else {
        drop(keyboards);
        remappers.into_iter().chain(buttons).collect()
    };

    if selected.is_empty() {
        None
    } else {
        Some(selected)
    }
}

/// The input-group hint only helps when the failure actually was a
/// permission error; a machine with no keyboards gets the bare message.
fn no_devices_error(cause: &str, permission_denied: bool) -> String {
    if permission_denied {
        format!(
            "{cause}. Permission denied on input devices; add your user to \
             the input group:\n  sudo usermod -aG input $USER\nthen log out \
             and back in."
        )
    } else {
        cause.to_string()
    }
}

fn is_permission_denied(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(nix::libc::EACCES)
}

fn event_device_paths() -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    let entries =
        std::fs::read_dir("/dev/input").context("failed to list input devices in /dev/input")?;
    for entry in entries {
        let path = entry?.path();
        let is_event = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("event"))
            .unwrap_or(false);
        if is_event {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Create the uinput clone for a grabbed device: same key capabilities,
/// name suffixed with the daemon marker.
fn clone_device(physical: &Device, name: &str) -> Result<VirtualDevice> {
    let clone_name = format!("{name} ({DAEMON_MARKER})");

    let fallback: AttributeSet<Key>;
    let keys = match physical.supported_keys() {
        Some(keys) => keys,
        None => {
            let mut set = AttributeSet::<Key>::new();
            for code in 0..0x300u16 {
                set.insert(Key::new(code));
            }
            fallback = set;
            &fallback
        }
    };

    let device = VirtualDeviceBuilder::new()
        .context("failed to open /dev/uinput")?
        .name(&clone_name)
        .with_keys(keys)
        .context("failed to declare key capabilities")?
        .build()
        .context("failed to create virtual device")?;

    Ok(device)
}

/// True when an I/O error means the device is gone (unplugged).
pub fn is_disconnect(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(nix::libc::ENODEV)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(name: &str) -> DeviceCaps {
        DeviceCaps {
            name: name.to_string(),
            has_key: false,
            has_repeat: false,
            has_alphabet: false,
            has_button_key: false,
            has_left_button: false,
        }
    }

    fn full_keyboard(name: &str) -> DeviceCaps {
        DeviceCaps {
            has_key: true,
            has_repeat: true,
            has_alphabet: true,
            ..caps(name)
        }
    }

    #[test]
    fn test_classify_physical_keyboard() {
        assert_eq!(
            classify(&full_keyboard("AT Translated Set 2 keyboard")),
            DeviceClass::Keyboard
        );
    }

    #[test]
    fn test_classify_skips_own_virtual_devices() {
        let c = full_keyboard("AT Translated Set 2 keyboard (akeyshually)");
        assert_eq!(classify(&c), DeviceClass::Ignored);
    }

    #[test]
    fn test_classify_remapper_virtual() {
        // keyd's virtual keyboard often lacks EV_REP
        let c = DeviceCaps {
            has_key: true,
            has_alphabet: true,
            ..caps("keyd virtual keyboard")
        };
        assert_eq!(classify(&c), DeviceClass::RemapperVirtual);

        for name in ["Kanata Output", "kmonad output", "xremap"] {
            let c = DeviceCaps {
                has_key: true,
                has_alphabet: true,
                ..caps(name)
            };
            assert_eq!(classify(&c), DeviceClass::RemapperVirtual, "{name}");
        }
    }

    #[test]
    fn test_classify_button_device() {
        let c = DeviceCaps {
            has_key: true,
            has_button_key: true,
            ..caps("gpio-keys")
        };
        assert_eq!(classify(&c), DeviceClass::Button);
    }

    #[test]
    fn test_button_check_precedes_keyboard_check() {
        // A device with buttons and autorepeat counts as a keyboard only
        // if it has the alphabet; with repeat but no alphabet it is
        // ignored rather than treated as a button device.
        let c = DeviceCaps {
            has_key: true,
            has_repeat: true,
            has_button_key: true,
            ..caps("weird media panel")
        };
        assert_eq!(classify(&c), DeviceClass::Ignored);
    }

    #[test]
    fn test_classify_mouse() {
        let c = DeviceCaps {
            has_key: true,
            has_left_button: true,
            ..caps("Logitech USB Optical Mouse")
        };
        assert_eq!(classify(&c), DeviceClass::Mouse);
    }

    #[test]
    fn test_classify_ignores_the_rest() {
        assert_eq!(classify(&caps("Power Button")), DeviceClass::Ignored);

        let c = DeviceCaps {
            has_key: true,
            ..caps("Sleep Button")
        };
        assert_eq!(classify(&c), DeviceClass::Ignored);
    }

    #[test]
    fn test_keyboard_without_repeat_is_not_a_keyboard() {
        let c = DeviceCaps {
            has_key: true,
            has_alphabet: true,
            ..caps("no-rep board")
        };
        // Without EV_REP and without button keys or BTN_LEFT: ignored
        assert_eq!(classify(&c), DeviceClass::Ignored);
    }

    #[test]
    fn test_select_prefers_remappers_over_keyboards() {
        let selected = select(vec!["keyd"], vec!["laptop kbd"], vec!["gpio-keys"]);
        assert_eq!(selected, Some(vec!["keyd", "gpio-keys"]));
    }

    #[test]
    fn test_select_keeps_keyboards_without_remappers() {
        let selected = select(Vec::<&str>::new(), vec!["laptop kbd"], vec!["gpio-keys"]);
        assert_eq!(selected, Some(vec!["laptop kbd", "gpio-keys"]));
    }

    #[test]
    fn test_select_always_includes_buttons() {
        // Buttons alone are enough to run
        let selected = select(Vec::<&str>::new(), Vec::new(), vec!["gpio-keys"]);
        assert_eq!(selected, Some(vec!["gpio-keys"]));
    }

    #[test]
    fn test_select_nothing_to_grab() {
        assert_eq!(select(Vec::<&str>::new(), Vec::new(), Vec::new()), None);
        // Remappers present but nothing else still selects the remappers
        assert_eq!(
            select(vec!["keyd"], Vec::new(), Vec::new()),
            Some(vec!["keyd"])
        );
    }

    #[test]
    fn test_no_devices_error_hint_requires_permission_failure() {
        let plain = no_devices_error("no keyboards detected", false);
        assert_eq!(plain, "no keyboards detected");
        assert!(!plain.contains("usermod"));

        let denied = no_devices_error("no keyboards detected", true);
        assert!(denied.starts_with("no keyboards detected"));
        assert!(denied.contains("usermod -aG input"));
    }

    #[test]
    fn test_error_kind_probes() {
        let enodev = std::io::Error::from_raw_os_error(nix::libc::ENODEV);
        assert!(is_disconnect(&enodev));
        assert!(!is_permission_denied(&enodev));

        let eacces = std::io::Error::from_raw_os_error(nix::libc::EACCES);
        assert!(!is_disconnect(&eacces));
        assert!(is_permission_denied(&eacces));
    }
}
