//! `callscribe config` subcommands.

use std::path::Path;

use cs_domain::config::{Config, ConfigSeverity};

/// Validate the config file. Returns `true` when no errors were found
/// (warnings alone still pass).
pub fn validate(config: &Config, path: &Path) -> bool {
    let issues = config.validate();
    if issues.is_empty() {
        println!("{}: OK", path.display());
        return true;
    }

    for issue in &issues {
        eprintln!("{issue}");
    }
    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if errors > 0 {
        eprintln!("{errors} error(s) found");
        false
    } else {
        println!("{}: OK ({} warning(s))", path.display(), issues.len());
        true
    }
}

/// Dump the resolved configuration (defaults applied) as TOML.
pub fn show(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => eprintln!("failed to render config: {e}"),
    }
}
