use crate::output::{format_time, print_json, Table};
use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use tsp_core::command::PHASE_COUNT;
use tsp_core::spat::{SpatSnapshot, SpatTracker, TranslationConfig};

#[derive(Serialize)]
struct SpatTimes {
    vehicle_min: [f64; PHASE_COUNT],
    vehicle_max: [f64; PHASE_COUNT],
    pedestrian_min: [f64; PHASE_COUNT],
    pedestrian_max: [f64; PHASE_COUNT],
    served: Vec<u8>,
}

pub fn run(translation: &Path, snapshot: &Path, elapsed_ds: i64, json: bool) -> anyhow::Result<()> {
    let config = TranslationConfig::load(translation)
        .with_context(|| format!("failed to load translation {}", translation.display()))?;
    let data = std::fs::read_to_string(snapshot)
        .with_context(|| format!("failed to read {}", snapshot.display()))?;
    let snap: SpatSnapshot = serde_json::from_str(&data).context("invalid phase snapshot")?;

    let mut tracker = SpatTracker::new();
    tracker.initialize_at(&config, 0)?;
    tracker.update_at(&snap, elapsed_ds);

    let times = SpatTimes {
        vehicle_min: tracker.vehicle_min_times(&snap),
        vehicle_max: tracker.vehicle_max_times(&snap),
        pedestrian_min: tracker.pedestrian_min_times(&snap),
        pedestrian_max: tracker.pedestrian_max_times(&snap),
        served: tracker.served_at_least_once().iter().copied().collect(),
    };

    if json {
        return print_json(&times);
    }

    let mut table = Table::new(&["PHASE", "STATE", "VEH MIN", "VEH MAX", "PED MIN", "PED MAX"]);
    for i in 0..PHASE_COUNT {
        table.push(vec![
            (i + 1).to_string(),
            format!("{:?}", snap.vehicle_states[i]).to_lowercase(),
            format_time(times.vehicle_min[i]),
            format_time(times.vehicle_max[i]),
            format_time(times.pedestrian_min[i]),
            format_time(times.pedestrian_max[i]),
        ]);
    }
    table.print();
    Ok(())
}
