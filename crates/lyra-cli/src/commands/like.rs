use lyra_core::{ContentType, Store};

use crate::commands::common::{format_like_line, print_json, resolve_content_type};
use crate::error::CliError;

pub fn run_like(
    store: &Store,
    content_id: &str,
    content_type: Option<ContentType>,
    is_liked: bool,
    as_json: bool,
) -> Result<(), CliError> {
    let content_type = resolve_content_type(content_type, content_id);
    let record = store.set_liked(content_id, content_type, is_liked)?;

    if as_json {
        return print_json(&record);
    }
    println!("{}", format_like_line(&record));
    Ok(())
}
