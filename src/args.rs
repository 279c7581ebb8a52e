use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about = "Chat engagement bot: activity points, gifts and a boost shop")]
pub struct Cli {
    /// Read `MODBOT_*` variables from this file before the process environment
    #[arg(short, long)]
    pub env_file: Option<PathBuf>,

    /// Apply pending migrations, then exit
    #[arg(long)]
    pub migrate_only: bool,
}

pub fn parse_cli_args() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from(["modbot", "--env-file", "prod.env", "--migrate-only"]).unwrap();
        assert_eq!(cli.env_file, Some(PathBuf::from("prod.env")));
        assert!(cli.migrate_only);

        let bare = Cli::try_parse_from(["modbot"]).unwrap();
        assert!(bare.env_file.is_none());
        assert!(!bare.migrate_only);
    }
}
