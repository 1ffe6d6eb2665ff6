use anyhow::Context;
use log::{debug, warn};
use std::collections::HashMap;
use std::path::Path;

use crate::constants::{PREFERENCES_SECTION, PREFERENCES_UNIQUE_PORT_KEY};

/// Section and key names are matched case-insensitively, the way the client reads them.
pub fn read_flag(path: &Path, section: &str, key: &str) -> anyhow::Result<Option<bool>> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path).format(config::FileFormat::Ini))
        .build()
        .context(format!("Could not read {}", path.display()))?;

    let sections = settings
        .try_deserialize::<HashMap<String, config::Value>>()
        .context(format!("Could not parse {}", path.display()))?;

    let Some(table) = sections
        .into_iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(section))
        .and_then(|(_, value)| value.into_table().ok())
    else {
        debug!("No [{}] section in {}", section, path.display());
        return Ok(None);
    };

    let value = table
        .into_iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .and_then(|(_, value)| value.into_string().ok());

    Ok(value.map(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        )
    }))
}

/// A missing file or key counts as disabled.
pub fn unique_port_enabled(path: &Path) -> bool {
    if !path.is_file() {
        debug!("Preferences file {} does not exist", path.display());
        return false;
    }

    match read_flag(path, PREFERENCES_SECTION, PREFERENCES_UNIQUE_PORT_KEY) {
        Ok(flag) => flag.unwrap_or(false),
        Err(e) => {
            warn!("{:#}", e);
            false
        }
    }
}
