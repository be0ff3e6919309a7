use clap::Subcommand;

use dayflow_core::CoreConfig;

use crate::common::config_path;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the active configuration
    Show,
    /// Set a configuration value
    Set {
        /// One of: scheduling_zone, day_start, day_end, min_break_minutes
        key: String,
        value: String,
    },
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path();
    match action {
        ConfigAction::Show => {
            let config = CoreConfig::load_or_default(&path);
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Set { key, value } => {
            let mut config = CoreConfig::load_or_default(&path);
            match key.as_str() {
                "scheduling_zone" => config.scheduling_zone = value.parse()?,
                "day_start" => config.day_start = value,
                "day_end" => config.day_end = value,
                "min_break_minutes" => config.min_break_minutes = value.parse()?,
                other => return Err(format!("unknown configuration key '{other}'").into()),
            }
            config.validate()?;
            config.save(&path)?;
            println!("configuration updated");
        }
    }
    Ok(())
}
