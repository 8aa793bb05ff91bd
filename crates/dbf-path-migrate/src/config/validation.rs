//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};
use crate::paths::{clean_relative, normalize_target_base, parse_drive_letter};

/// Parse a drive setting: `C`, `c`, `C:` or `C:\`.
pub fn parse_drive(value: &str, key: &str) -> Result<char> {
    let trimmed = value.trim().trim_end_matches(&['\\', '/'][..]).trim_end_matches(':');
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), None) => parse_drive_letter(letter)
            .map_err(|_| MigrateError::Config(format!("{} must be a drive letter, got '{}'", key, value))),
        _ => Err(MigrateError::Config(format!(
            "{} must be a drive letter, got '{}'",
            key, value
        ))),
    }
}

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Install validation
    parse_drive(&config.install.drive, "install.drive")?;
    if clean_relative(&config.install.base_path).is_empty() {
        return Err(MigrateError::Config("install.base_path is required".into()));
    }

    // Target validation
    if let Some(drive) = &config.target.drive {
        parse_drive(drive, "target.drive")?;
    }
    if let Some(base) = &config.target.base {
        if normalize_target_base(base).is_empty() {
            return Err(MigrateError::Config("target.base must not be empty".into()));
        }
    }

    // Catalog validation
    if config.catalog.table.trim().is_empty() {
        return Err(MigrateError::Config("catalog.table is required".into()));
    }
    if config.catalog.entity_path_field.trim().is_empty() {
        return Err(MigrateError::Config(
            "catalog.entity_path_field is required".into(),
        ));
    }
    if config.catalog.rewrite && config.catalog.columns.is_empty() {
        return Err(MigrateError::Config(
            "catalog.columns must not be empty when catalog.rewrite is set".into(),
        ));
    }

    // Table validation
    if config.tables.is_empty() {
        return Err(MigrateError::Config("at least one table is required".into()));
    }
    for (i, table) in config.tables.iter().enumerate() {
        if table.name.trim().is_empty() {
            return Err(MigrateError::Config(format!("tables[{}].name is required", i)));
        }
        if table.columns.is_empty() || table.columns.iter().any(|c| c.trim().is_empty()) {
            return Err(MigrateError::Config(format!(
                "tables[{}] ({}) needs a non-empty column list",
                i, table.name
            )));
        }
        if config.tables[..i]
            .iter()
            .any(|t| t.name.eq_ignore_ascii_case(&table.name))
        {
            return Err(MigrateError::Config(format!(
                "table {} is listed twice",
                table.name
            )));
        }
    }

    Ok(())
}
