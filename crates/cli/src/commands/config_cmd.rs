//! `codeloop config`: Print the default configuration or its path.

use codeloop_config::AppConfig;

pub fn run(path: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path {
        let config_path = AppConfig::config_dir().join("config.toml");
        println!("{}", config_path.display());
        return Ok(());
    }

    println!("# {}", AppConfig::config_dir().join("config.toml").display());
    println!("{}", AppConfig::default_toml());
    Ok(())
}
