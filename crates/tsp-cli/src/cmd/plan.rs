use crate::output::{print_json, Table};
use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use tsp_core::command::GroupCommand;
use tsp_core::grouper::group_commands;
use tsp_core::schedule::parse_schedule;

#[derive(Serialize)]
struct PlanEntry {
    kind: &'static str,
    action: String,
    phases: Vec<u8>,
    phase_bitmask: u8,
    start_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_time: Option<f64>,
}

impl From<&GroupCommand> for PlanEntry {
    fn from(g: &GroupCommand) -> Self {
        let clear = g.is_clear();
        Self {
            kind: if clear { "clear" } else { "window" },
            action: g.action.to_string(),
            phases: g.phases(),
            phase_bitmask: g.phase_bitmask,
            start_time: g.start_time,
            end_time: (!clear).then_some(g.end_time),
        }
    }
}

pub fn run(file: &Path, json: bool) -> anyhow::Result<()> {
    let data = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let commands = parse_schedule(&data).context("invalid schedule document")?;
    let plan = group_commands(commands);
    let entries: Vec<PlanEntry> = plan.iter().map(PlanEntry::from).collect();

    if json {
        return print_json(&serde_json::json!({ "plan": entries }));
    }

    if entries.is_empty() {
        println!("Empty schedule: every action is cleared and nothing is installed.");
        return Ok(());
    }

    let mut table = Table::new(&["KIND", "ACTION", "PHASES", "START", "END"]);
    for e in &entries {
        table.push(vec![
            e.kind.to_string(),
            e.action.clone(),
            format_phases(&e.phases),
            format!("{:.1}", e.start_time),
            e.end_time
                .map(|t| format!("{t:.1}"))
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }
    table.print();
    Ok(())
}

fn format_phases(phases: &[u8]) -> String {
    if phases.is_empty() {
        return "-".to_string();
    }
    phases
        .iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
