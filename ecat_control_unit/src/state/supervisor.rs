//! Per-drive supervisor state, advanced once per control cycle.

use ecat_common::drive::{ControlWord, StatusWord};
use serde::{Deserialize, Serialize};

use super::cia402::{Cia402State, derive_state, transition_to_state};

/// Control word policy applied on top of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrivePolicy {
    /// Force the control word to `0x0080` (fault reset only) whenever the
    /// status word reports fault with all enable bits clear.
    pub fault_reset_override: bool,
}

impl Default for DrivePolicy {
    fn default() -> Self {
        Self {
            fault_reset_override: true,
        }
    }
}

/// Result of one supervisor evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveEvaluation {
    /// Control word to write back for this drive.
    pub control_word: u16,
    /// State derived from the status word.
    pub state: Cia402State,
    /// State before this evaluation (for change logging).
    pub previous_state: Cia402State,
}

impl DriveEvaluation {
    #[inline]
    pub fn state_changed(&self) -> bool {
        self.state != self.previous_state
    }
}

/// Supervisor memory for a single drive. Never shared between drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriveSupervisorState {
    pub previous_control_word: u16,
    pub previous_state: Cia402State,
    pub is_operational: bool,
}

impl DriveSupervisorState {
    pub const fn new() -> Self {
        Self {
            previous_control_word: 0,
            previous_state: Cia402State::Start,
            is_operational: false,
        }
    }

    /// Evaluate one status word and update all fields exactly once.
    ///
    /// While OPERATION_ENABLED the previous control word is kept; otherwise the
    /// transition table result is used, subject to the fault-reset override.
    pub fn evaluate(&mut self, status_word: u16, policy: &DrivePolicy) -> DriveEvaluation {
        let state = derive_state(status_word);

        let mut control_word = transition_to_state(state, self.previous_control_word);
        if policy.fault_reset_override
            && StatusWord::from_bits_retain(status_word).is_fault_latched()
        {
            control_word = ControlWord::FAULT_RESET.bits();
        }

        let evaluation = DriveEvaluation {
            control_word,
            state,
            previous_state: self.previous_state,
        };

        self.previous_control_word = control_word;
        self.previous_state = state;
        self.is_operational = state.is_operational();

        evaluation
    }
}
