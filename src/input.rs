use gilrs::{Button as PadButton, GamepadId, Gilrs};
use log::{info, warn};
use rawhost_core::input::{Button, ButtonSet, InputSource, RawInput};

/// Pad buttons in the order they are read, and what they report as.
const PAD_MAP: [(PadButton, Button); 13] = [
    (PadButton::DPadUp, Button::Up),
    (PadButton::DPadDown, Button::Down),
    (PadButton::DPadLeft, Button::Left),
    (PadButton::DPadRight, Button::Right),
    (PadButton::South, Button::A),
    (PadButton::East, Button::B),
    (PadButton::West, Button::C),
    (PadButton::North, Button::Z),
    (PadButton::LeftTrigger, Button::L),
    (PadButton::RightTrigger, Button::R),
    (PadButton::Start, Button::Start),
    (PadButton::Select, Button::Select),
    (PadButton::Mode, Button::Quit),
];

/// Translate the pressed state of a pad into runtime buttons.
pub fn map_pad(pressed: impl Fn(PadButton) -> bool) -> ButtonSet {
    let mut buttons = ButtonSet::EMPTY;
    for (pad, button) in PAD_MAP {
        buttons.set(button, pressed(pad));
    }
    buttons
}

/// First connected gamepad, read through gilrs. Reads as idle when gilrs
/// could not be initialized or no pad is attached.
pub struct GamepadInput {
    gilrs: Option<Gilrs>,
    active: Option<GamepadId>,
}

impl GamepadInput {
    pub fn new() -> Self {
        let gilrs = match Gilrs::new() {
            Ok(g) => Some(g),
            Err(e) => {
                warn!("Failed to initialize gamepad support: {e}; input is idle");
                None
            }
        };
        let active = gilrs
            .as_ref()
            .and_then(|g| g.gamepads().next().map(|(id, _)| id));
        if let (Some(g), Some(id)) = (gilrs.as_ref(), active) {
            info!("Using gamepad {}", g.gamepad(id).name());
        }
        Self { gilrs, active }
    }

    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }
}

impl Default for GamepadInput {
    fn default() -> Self {
        Self::new()
    }
}

impl InputSource for GamepadInput {
    fn read(&mut self) -> RawInput {
        let Some(gilrs) = self.gilrs.as_mut() else {
            return RawInput::default();
        };

        while let Some(event) = gilrs.next_event() {
            match event.event {
                gilrs::EventType::Connected if self.active.is_none() => {
                    info!("Gamepad {} connected", event.id);
                    self.active = Some(event.id);
                }
                gilrs::EventType::Disconnected if self.active == Some(event.id) => {
                    info!("Gamepad {} disconnected", event.id);
                    self.active = gilrs
                        .gamepads()
                        .map(|(id, _)| id)
                        .find(|&id| id != event.id);
                }
                _ => {}
            }
        }

        let Some(id) = self.active else {
            return RawInput::default();
        };
        let gamepad = gilrs.gamepad(id);
        let buttons = map_pad(|button| gamepad.is_pressed(button));
        RawInput {
            buttons,
            key: None,
            quit_requested: buttons.contains(Button::Quit),
        }
    }
}
