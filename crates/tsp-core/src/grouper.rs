//! Command grouping.
//!
//! Commands sharing a start time and action collapse into one bitmask-encoded
//! [`GroupCommand`]. A group ends at the earliest member end time; members that
//! run longer are split into residual commands that form their own groups on a
//! later pass. Every windowed group also schedules one clear of its action at
//! the latest member end time, unless another group of the same action
//! already writes the register at that instant.

use crate::command::{phase_bit, Command, GroupCommand};

/// Resolve a normalized command sequence into an install plan.
///
/// The plan lists windowed groups in resolution order, followed by the clears
/// ordered by time. No two clears share the same `(action, time)`.
pub fn group_commands(commands: Vec<Command>) -> Vec<GroupCommand> {
    let mut pending = commands;
    sort_by_start(&mut pending);

    let mut plan = Vec::new();
    let mut clears: Vec<GroupCommand> = Vec::new();

    while !pending.is_empty() {
        let leader = pending.remove(0);
        let mut members = vec![leader];
        let mut i = 0;
        while i < pending.len() {
            if pending[i].start_time == members[0].start_time
                && pending[i].action == members[0].action
            {
                members.push(pending.remove(i));
            } else {
                i += 1;
            }
        }

        let group = formulate_group(&members);

        for member in &members {
            if member.end_time > group.end_time {
                pending.push(Command::new(
                    member.action,
                    member.phases.clone(),
                    group.end_time,
                    member.end_time,
                ));
            }
        }

        // An explicit clear group is its own retraction.
        if !group.is_clear() {
            let max_end = members
                .iter()
                .map(|m| m.end_time)
                .fold(f64::NEG_INFINITY, f64::max);
            let already_pending = clears
                .iter()
                .any(|c| c.action == group.action && c.start_time == max_end);
            if !already_pending {
                clears.push(GroupCommand::clear(group.action, max_end));
            }
        }

        sort_by_start(&mut pending);
        plan.push(group);
    }

    // Any group already writing this register at that instant supersedes the
    // clear, whether it is a window opening or an explicit clear group.
    clears.retain(|c| {
        !plan
            .iter()
            .any(|g| g.action == c.action && g.start_time == c.start_time)
    });
    clears.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    plan.extend(clears);
    plan
}

/// Encode one group. Members must share start time and action.
///
/// When the leader's phase list is exactly `[0]` the whole group is a clear,
/// regardless of the phases carried by the other members.
pub fn formulate_group(members: &[Command]) -> GroupCommand {
    let leader = &members[0];
    let phase_bitmask = if leader.is_explicit_clear() {
        0
    } else {
        members
            .iter()
            .flat_map(|m| m.phases.iter())
            .fold(0u8, |mask, p| mask | phase_bit(*p))
    };
    let end_time = members
        .iter()
        .map(|m| m.end_time)
        .fold(f64::INFINITY, f64::min);

    GroupCommand {
        action: leader.action,
        phase_bitmask,
        start_time: leader.start_time,
        end_time,
    }
}

fn sort_by_start(commands: &mut [Command]) {
    commands.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
