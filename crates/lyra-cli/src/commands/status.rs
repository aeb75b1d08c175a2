use lyra_core::{EntityKind, Store};
use serde::Serialize;

use crate::commands::common::{format_status_line, print_json};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct KindStatus {
    pub kind: EntityKind,
    #[serde(flatten)]
    pub summary: lyra_core::models::StatusSummary,
    /// Pull checkpoint; absent for push-only kinds
    pub checkpoint: Option<i64>,
}

pub fn collect_status(store: &Store) -> Result<Vec<KindStatus>, CliError> {
    EntityKind::ALL
        .into_iter()
        .map(|kind| -> Result<KindStatus, CliError> {
            let checkpoint = if kind.is_pulled() {
                Some(store.checkpoint(kind)?)
            } else {
                None
            };
            Ok(KindStatus {
                kind,
                summary: store.status_summary(kind)?,
                checkpoint,
            })
        })
        .collect()
}

pub fn run_status(store: &Store, as_json: bool) -> Result<(), CliError> {
    let statuses = collect_status(store)?;

    if as_json {
        return print_json(&statuses);
    }
    for status in &statuses {
        println!(
            "{}",
            format_status_line(status.kind.as_str(), &status.summary, status.checkpoint)
        );
    }

    let outstanding: usize = statuses
        .iter()
        .map(|status| status.summary.outstanding())
        .sum();
    if outstanding > 0 {
        println!("{outstanding} changes waiting for `lyra sync`");
    }
    Ok(())
}
