#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Left,
        Direction::Right,
        Direction::Up,
        Direction::Down,
    ];

    pub const fn mask(self) -> u8 {
        match self {
            Direction::Left => 0x01,
            Direction::Right => 0x02,
            Direction::Up => 0x04,
            Direction::Down => 0x08,
        }
    }

    fn button(self) -> Button {
        match self {
            Direction::Left => Button::Left,
            Direction::Right => Button::Right,
            Direction::Up => Button::Up,
            Direction::Down => Button::Down,
        }
    }
}

/// Normalized controller state read by the interpreter.
///
/// Overwritten by every poll. Latched fields stay set until the interpreter
/// clears them through `input_mut`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlayerInput {
    pub dir_mask: u8,
    pub button: bool,
    pub code: bool,
    pub pause: bool,
    pub quit: bool,
    pub save: bool,
    pub load: bool,
    pub fast_mode: bool,
    /// Requested save-state slot change, -1, 0 or +1.
    pub state_slot: i8,
    pub last_char: Option<char>,
}

impl PlayerInput {
    pub fn holds(&self, dir: Direction) -> bool {
        self.dir_mask & dir.mask() != 0
    }
}

/// Logical buttons a backend reports. Device-specific keys and pads are
/// mapped onto these by the [`InputSource`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Button {
    Up,
    Down,
    Left,
    Right,
    A,
    B,
    C,
    X,
    Y,
    Z,
    Start,
    Select,
    L,
    R,
    Touch,
    Save,
    Load,
    Code,
    Pause,
    Fast,
    SlotUp,
    SlotDown,
    Quit,
}

impl Button {
    #[inline]
    pub const fn bit(self) -> u32 {
        1 << self as u32
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ButtonSet(u32);

impl ButtonSet {
    pub const EMPTY: ButtonSet = ButtonSet(0);

    pub const fn of(buttons: &[Button]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < buttons.len() {
            bits |= buttons[i].bit();
            i += 1;
        }
        ButtonSet(bits)
    }

    pub fn insert(&mut self, button: Button) {
        self.0 |= button.bit();
    }

    pub fn set(&mut self, button: Button, pressed: bool) {
        if pressed {
            self.0 |= button.bit();
        } else {
            self.0 &= !button.bit();
        }
    }

    pub fn contains(self, button: Button) -> bool {
        self.0 & button.bit() != 0
    }

    pub fn intersects(self, other: ButtonSet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Raw device snapshot produced by a backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawInput {
    pub buttons: ButtonSet,
    /// Character of a key pressed since the last read.
    pub key: Option<char>,
    /// Window close or equivalent host request.
    pub quit_requested: bool,
}

/// Backend seam for reading the raw device state.
pub trait InputSource {
    fn read(&mut self) -> RawInput;
}

/// Source with no device attached.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoInput;

impl InputSource for NoInput {
    fn read(&mut self) -> RawInput {
        RawInput::default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// Follows the button: set while held, cleared on release.
    Level,
    /// Set on press and left set until the interpreter clears it.
    Latch,
    /// Set only on the poll where the button goes down.
    Edge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Button,
    Code,
    Pause,
    Save,
    Load,
    FastMode,
    SlotUp,
    SlotDown,
    Quit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Binding {
    pub action: Action,
    pub buttons: ButtonSet,
    pub trigger: Trigger,
}

impl Binding {
    pub const fn new(action: Action, buttons: &[Button], trigger: Trigger) -> Self {
        Self {
            action,
            buttons: ButtonSet::of(buttons),
            trigger,
        }
    }
}

/// How a backend turns its buttons into actions. Directions are always
/// level-triggered; `dir_aliases` lets extra buttons hold a direction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ButtonPolicy {
    pub name: &'static str,
    pub bindings: Vec<Binding>,
    pub dir_aliases: Vec<(Button, Direction)>,
}

impl ButtonPolicy {
    /// Console pad: any face button acts, Start pauses and Z enters a code.
    pub fn console_pad() -> Self {
        use Button::*;
        Self {
            name: "console-pad",
            bindings: vec![
                Binding::new(Action::Button, &[A, B, C], Trigger::Level),
                Binding::new(Action::Pause, &[Start], Trigger::Latch),
                Binding::new(Action::Code, &[Z], Trigger::Latch),
            ],
            dir_aliases: Vec::new(),
        }
    }

    /// Handheld: A acts and B jumps, shoulders request save/load, the touch
    /// screen quits.
    pub fn handheld() -> Self {
        use Button::*;
        Self {
            name: "handheld",
            bindings: vec![
                Binding::new(Action::Button, &[A], Trigger::Level),
                Binding::new(Action::Save, &[R], Trigger::Latch),
                Binding::new(Action::Load, &[L], Trigger::Latch),
                Binding::new(Action::Pause, &[Start], Trigger::Latch),
                Binding::new(Action::Code, &[Select], Trigger::Latch),
                Binding::new(Action::Quit, &[Touch], Trigger::Edge),
            ],
            dir_aliases: vec![(B, Direction::Up)],
        }
    }

    pub fn keyboard() -> Self {
        use Button::*;
        Self {
            name: "keyboard",
            bindings: vec![
                Binding::new(Action::Button, &[A], Trigger::Level),
                Binding::new(Action::Code, &[Code], Trigger::Latch),
                Binding::new(Action::Pause, &[Pause], Trigger::Latch),
                Binding::new(Action::Save, &[Save], Trigger::Latch),
                Binding::new(Action::Load, &[Load], Trigger::Latch),
                Binding::new(Action::FastMode, &[Fast], Trigger::Latch),
                Binding::new(Action::SlotUp, &[SlotUp], Trigger::Edge),
                Binding::new(Action::SlotDown, &[SlotDown], Trigger::Edge),
                Binding::new(Action::Quit, &[Quit], Trigger::Edge),
            ],
            dir_aliases: Vec::new(),
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "console-pad" | "pad" => Some(Self::console_pad()),
            "handheld" => Some(Self::handheld()),
            "keyboard" => Some(Self::keyboard()),
            _ => None,
        }
    }
}

impl Default for ButtonPolicy {
    fn default() -> Self {
        Self::keyboard()
    }
}

/// Derives a [`PlayerInput`] from each raw snapshot according to a policy.
pub struct InputNormalizer {
    policy: ButtonPolicy,
    state: PlayerInput,
    previous: ButtonSet,
}

impl InputNormalizer {
    pub fn new(policy: ButtonPolicy) -> Self {
        Self {
            policy,
            state: PlayerInput::default(),
            previous: ButtonSet::EMPTY,
        }
    }

    pub fn policy(&self) -> &ButtonPolicy {
        &self.policy
    }

    /// Re-derive the snapshot from `raw`. Directions and the last key are
    /// rebuilt from scratch; other fields follow their binding's trigger.
    pub fn poll(&mut self, raw: &RawInput) -> PlayerInput {
        let mut dir_mask = 0;
        for dir in Direction::ALL {
            if raw.buttons.contains(dir.button()) {
                dir_mask |= dir.mask();
            }
        }
        for &(button, dir) in &self.policy.dir_aliases {
            if raw.buttons.contains(button) {
                dir_mask |= dir.mask();
            }
        }
        self.state.dir_mask = dir_mask;
        self.state.last_char = raw.key;
        self.state.state_slot = 0;

        for binding in &self.policy.bindings {
            let pressed = raw.buttons.intersects(binding.buttons);
            let went_down = pressed && !self.previous.intersects(binding.buttons);
            let value = match binding.trigger {
                Trigger::Level => Some(pressed),
                Trigger::Latch => pressed.then_some(true),
                Trigger::Edge => Some(went_down),
            };
            let Some(value) = value else {
                continue;
            };
            match binding.action {
                Action::Button => self.state.button = value,
                Action::Code => self.state.code = value,
                Action::Pause => self.state.pause = value,
                Action::Save => self.state.save = value,
                Action::Load => self.state.load = value,
                Action::FastMode => self.state.fast_mode = value,
                Action::SlotUp if value => self.state.state_slot = 1,
                Action::SlotDown if value => self.state.state_slot = -1,
                Action::SlotUp | Action::SlotDown => {}
                // Quit stays raised until consumed.
                Action::Quit if value => self.state.quit = true,
                Action::Quit => {}
            }
        }
        if raw.quit_requested && !self.state.quit {
            log::info!("quit requested by host");
            self.state.quit = true;
        }

        self.previous = raw.buttons;
        self.state
    }

    /// Consume a pending quit request.
    pub fn take_quit(&mut self) -> bool {
        std::mem::take(&mut self.state.quit)
    }

    pub fn input(&self) -> &PlayerInput {
        &self.state
    }

    pub fn input_mut(&mut self) -> &mut PlayerInput {
        &mut self.state
    }
}
