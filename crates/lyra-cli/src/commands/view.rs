use lyra_core::{ContentType, Store};

use crate::commands::common::{format_view_lines, print_json, resolve_content_type};
use crate::error::CliError;

pub fn run_view(
    store: &Store,
    content_id: &str,
    content_type: Option<ContentType>,
) -> Result<(), CliError> {
    let content_type = resolve_content_type(content_type, content_id);
    let entry = store.record_view(content_type, content_id)?;
    println!("Recorded view of {} ({})", entry.content_id, entry.content_type);
    Ok(())
}

pub fn run_view_list(store: &Store, limit: usize, as_json: bool) -> Result<(), CliError> {
    let entries = store.viewed_content(limit)?;

    if as_json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No views recorded.");
        return Ok(());
    }
    for line in format_view_lines(&entries) {
        println!("{line}");
    }
    Ok(())
}
