use lyra_core::{ContentType, Store};

use crate::commands::common::{format_search_lines, print_json, resolve_content_type};
use crate::error::CliError;

pub fn run_search_add(
    store: &Store,
    query: &str,
    content_id: &str,
    content_type: Option<ContentType>,
) -> Result<(), CliError> {
    let content_type = resolve_content_type(content_type, content_id);
    let entry = store.add_search(query, content_type, content_id)?;
    println!("Saved search \"{}\"", entry.query);
    Ok(())
}

pub fn run_search_list(store: &Store, limit: usize, as_json: bool) -> Result<(), CliError> {
    let entries = store.search_history(limit)?;

    if as_json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("Search history is empty.");
        return Ok(());
    }
    for line in format_search_lines(&entries) {
        println!("{line}");
    }
    Ok(())
}

pub fn run_search_clear(store: &Store) -> Result<(), CliError> {
    let removed = store.clear_search_history()?;
    println!("Removed {removed} search history entries");
    Ok(())
}
