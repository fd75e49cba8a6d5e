//! Which controller states survive a schedule install.
//!
//! Pulse actions (calls, force-offs) are always retracted before a new
//! schedule goes in. A sustained action (hold, omits) is left alone when the
//! new schedule asks for it again from time zero and the controller already
//! has it asserted, so the physical state never bounces.

use crate::command::{ActionKind, Command};

const CLEAR_ORDER: [ActionKind; 6] = [
    ActionKind::HoldVeh,
    ActionKind::OmitVeh,
    ActionKind::OmitPed,
    ActionKind::CallVeh,
    ActionKind::CallPed,
    ActionKind::ForceOff,
];

/// Return the actions that must be cleared before installing `commands`.
///
/// `asserted_bits` reports the controller's current register for an action;
/// it is consulted only for sustained actions the new schedule continues.
pub fn plan_clears<F>(commands: &[Command], mut asserted_bits: F) -> Vec<ActionKind>
where
    F: FnMut(ActionKind) -> u8,
{
    CLEAR_ORDER
        .iter()
        .copied()
        .filter(|action| {
            if !action.is_sustained() {
                return true;
            }
            let continues = commands
                .iter()
                .any(|c| c.action == *action && c.start_time == 0.0);
            !(continues && asserted_bits(*action) > 0)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn hold_from_zero() -> Vec<Command> {
        vec![Command::new(ActionKind::HoldVeh, vec![2, 6], 0.0, 20.0)]
    }

    #[test]
    fn active_hold_continued_from_zero_is_kept() {
        let clears = plan_clears(&hold_from_zero(), |action| match action {
            ActionKind::HoldVeh => 0b0010_0010,
            _ => 0,
        });
        assert!(!clears.contains(&ActionKind::HoldVeh));
        assert!(clears.contains(&ActionKind::OmitVeh));
        assert!(clears.contains(&ActionKind::OmitPed));
    }

    #[test]
    fn inactive_hold_is_cleared_even_if_requested_from_zero() {
        let clears = plan_clears(&hold_from_zero(), |_| 0);
        assert!(clears.contains(&ActionKind::HoldVeh));
    }

    #[test]
    fn active_hold_starting_later_is_cleared() {
        let commands = vec![Command::new(ActionKind::HoldVeh, vec![2], 3.0, 20.0)];
        let clears = plan_clears(&commands, |_| 0xff);
        assert!(clears.contains(&ActionKind::HoldVeh));
    }

    #[test]
    fn pulse_actions_are_always_cleared() {
        let commands = vec![
            Command::new(ActionKind::CallVeh, vec![1], 0.0, 5.0),
            Command::new(ActionKind::CallPed, vec![1], 0.0, 5.0),
            Command::new(ActionKind::ForceOff, vec![1], 0.0, 5.0),
        ];
        let clears = plan_clears(&commands, |_| 0xff);
        for action in [ActionKind::CallVeh, ActionKind::CallPed, ActionKind::ForceOff] {
            assert!(clears.contains(&action), "{action} must be cleared");
        }
    }

    #[test]
    fn controller_is_queried_only_for_continued_sustained_actions() {
        let mut queried = Vec::new();
        plan_clears(&hold_from_zero(), |action| {
            queried.push(action);
            0
        });
        assert_eq!(queried, vec![ActionKind::HoldVeh]);
    }

    #[test]
    fn empty_schedule_clears_everything() {
        let clears = plan_clears(&[], |_| 0xff);
        assert_eq!(clears, CLEAR_ORDER.to_vec());
    }
}
