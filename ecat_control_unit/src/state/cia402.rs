//! CiA 402 drive state classification and control word transitions.
//!
//! Both functions are pure table lookups. The classification table is
//! evaluated top to bottom and the first matching `(mask, value)` pair wins;
//! a status word matching no row is `UnknownState`, which is never operational.

use std::fmt;

/// CiA 402 power drive system state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Cia402State {
    /// Initial value before the first status word was evaluated.
    #[default]
    Start = 0,
    NotReadyToSwitchOn = 1,
    SwitchOnDisabled = 2,
    ReadyToSwitchOn = 3,
    SwitchOn = 4,
    OperationEnabled = 5,
    QuickStopActive = 6,
    FaultReactionActive = 7,
    Fault = 8,
    /// Status word matched no row of the classification table.
    UnknownState = 9,
}

impl Cia402State {
    /// Only OPERATION_ENABLED authorises nonzero actuation.
    #[inline]
    pub const fn is_operational(self) -> bool {
        matches!(self, Self::OperationEnabled)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::NotReadyToSwitchOn => "NOT_READY_TO_SWITCH_ON",
            Self::SwitchOnDisabled => "SWITCH_ON_DISABLED",
            Self::ReadyToSwitchOn => "READY_TO_SWITCH_ON",
            Self::SwitchOn => "SWITCH_ON",
            Self::OperationEnabled => "OPERATION_ENABLED",
            Self::QuickStopActive => "QUICK_STOP_ACTIVE",
            Self::FaultReactionActive => "FAULT_REACTION_ACTIVE",
            Self::Fault => "FAULT",
            Self::UnknownState => "UNKNOWN_STATE",
        }
    }
}

impl fmt::Display for Cia402State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Classification ─────────────────────────────────────────────────

const MASK_SHORT: u16 = 0b0100_1111;
const MASK_LONG: u16 = 0b0110_1111;

/// `(mask, expected, state)` rows in priority order.
const STATE_TABLE: [(u16, u16, Cia402State); 8] = [
    (MASK_SHORT, 0b0000_0000, Cia402State::NotReadyToSwitchOn),
    (MASK_SHORT, 0b0100_0000, Cia402State::SwitchOnDisabled),
    (MASK_LONG, 0b0010_0001, Cia402State::ReadyToSwitchOn),
    (MASK_LONG, 0b0010_0011, Cia402State::SwitchOn),
    (MASK_LONG, 0b0010_0111, Cia402State::OperationEnabled),
    (MASK_LONG, 0b0000_0111, Cia402State::QuickStopActive),
    (MASK_SHORT, 0b0000_1111, Cia402State::FaultReactionActive),
    (MASK_SHORT, 0b0000_1000, Cia402State::Fault),
];

/// Classify a status word into its CiA 402 state.
pub fn derive_state(status_word: u16) -> Cia402State {
    STATE_TABLE
        .iter()
        .find(|(mask, expected, _)| status_word & mask == *expected)
        .map_or(Cia402State::UnknownState, |&(_, _, state)| state)
}

// ─── Transitions ────────────────────────────────────────────────────

/// Control word that advances a drive in `state` towards OPERATION_ENABLED.
///
/// States without a transition of their own return `control_word` unchanged.
pub const fn transition_to_state(state: Cia402State, control_word: u16) -> u16 {
    match state {
        Cia402State::SwitchOnDisabled => (control_word & 0b0111_1110) | 0b0000_0110,
        Cia402State::ReadyToSwitchOn => (control_word & 0b0111_0111) | 0b0000_0111,
        Cia402State::SwitchOn => (control_word & 0b0111_1111) | 0b0000_1111,
        Cia402State::QuickStopActive => (control_word & 0b0111_1111) | 0b0000_1111,
        Cia402State::Fault => (control_word & 0b1111_1111) | 0b1000_0000,
        Cia402State::Start
        | Cia402State::NotReadyToSwitchOn
        | Cia402State::OperationEnabled
        | Cia402State::FaultReactionActive
        | Cia402State::UnknownState => control_word,
    }
}
