use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "discord-waifu", version, about = "Daily random partners for Discord guilds")]
pub struct Args {
    /// Path to the YAML config file.
    #[arg(short, long, env = "CONFIG_PATH", default_value = "config.yaml")]
    pub config: PathBuf,
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::Args;

    #[test]
    fn command_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn config_path_can_be_given() {
        let args = Args::try_parse_from(["discord-waifu", "--config", "/etc/waifu.yaml"]).unwrap();
        assert_eq!(args.config.to_str(), Some("/etc/waifu.yaml"));
    }
}
