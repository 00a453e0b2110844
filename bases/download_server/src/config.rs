// bases/download_server/src/config.rs
use clap::Parser;
use std::path::PathBuf;

/// Serve tagged audio downloads over a WebSocket surface
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8090)]
    pub port: u16,

    /// Scratch directory for all temporary files
    #[arg(long, default_value = "tmp")]
    pub scratch_dir: PathBuf,

    /// Directory holding bundled tool binaries
    #[arg(long, default_value = "bin")]
    pub bin_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub scratch_dir: PathBuf,
    pub bin_dir: PathBuf,
}

impl Config {
    pub fn from_args(args: CliArgs) -> Self {
        Self {
            port: args.port,
            scratch_dir: args.scratch_dir,
            bin_dir: args.bin_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::parse_from(["download_server"]);
        let config = Config::from_args(args);

        assert_eq!(config.port, 8090);
        assert_eq!(config.scratch_dir, PathBuf::from("tmp"));
    }

    #[test]
    fn test_overrides() {
        let args = CliArgs::parse_from([
            "download_server",
            "--port",
            "9000",
            "--scratch-dir",
            "/var/scratch",
        ]);
        let config = Config::from_args(args);

        assert_eq!(config.port, 9000);
        assert_eq!(config.scratch_dir, PathBuf::from("/var/scratch"));
    }
}
