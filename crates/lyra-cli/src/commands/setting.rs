use lyra_core::{SettingKey, Store, UserSetting};

use crate::commands::common::{format_setting_line, print_json, setting_to_item, SettingItem};
use crate::error::CliError;

pub fn setting_item(store: &Store, key: SettingKey) -> Result<SettingItem, CliError> {
    let record = store.setting(key)?;
    let value = record
        .as_ref()
        .map_or_else(|| key.default_setting(), |record| record.payload);
    Ok(setting_to_item(value, record.as_ref()))
}

pub fn run_setting_get(store: &Store, key: SettingKey, as_json: bool) -> Result<(), CliError> {
    let item = setting_item(store, key)?;

    if as_json {
        return print_json(&item);
    }
    println!("{}", format_setting_line(&item));
    Ok(())
}

pub fn run_setting_set(store: &Store, key: SettingKey, value: &str) -> Result<(), CliError> {
    let setting = UserSetting::from_key_value(key.as_str(), value.trim())?;
    let record = store.set_setting(setting)?;
    println!("{} = {}", key, record.payload.value_to_string());
    Ok(())
}

pub fn run_setting_reset(store: &Store, key: SettingKey) -> Result<(), CliError> {
    let record = store.reset_setting(key)?;
    println!(
        "{} reset to {} (pending sync)",
        key,
        record.payload.value_to_string()
    );
    Ok(())
}

pub fn run_setting_list(store: &Store, as_json: bool) -> Result<(), CliError> {
    let items = SettingKey::ALL
        .into_iter()
        .map(|key| setting_item(store, key))
        .collect::<Result<Vec<_>, _>>()?;

    if as_json {
        return print_json(&items);
    }
    for item in &items {
        println!("{}", format_setting_line(item));
    }
    Ok(())
}
