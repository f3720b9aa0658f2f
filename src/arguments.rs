/// Command-line argument handling
///
/// The CLI surface is fixed and flag-only, so everything is parsed in one
/// pass into an immutable `Args` snapshot. The first access parses the
/// process arguments; tests call `Args::parse` directly.
use std::env;
use std::sync::OnceLock;

const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, Clone, Default)]
pub struct Args {
    /// `--help` / `-h`: print usage and exit
    pub help: bool,
    /// `--version`: print the crate version and exit
    pub version: bool,
    /// `--validate`: load and validate the configuration, then exit
    pub validate: bool,
    /// `--run`: start the collector
    pub run: bool,
    /// `--once`: run a single tick and exit, even with an interval set
    pub once: bool,
    /// `--config <path>`
    pub config_path: Option<String>,
    /// `--interval <spec>`: overrides the config file value
    pub interval: Option<String>,
}

static ARGS: OnceLock<Args> = OnceLock::new();

/// Parsed arguments for this process.
pub fn get() -> &'static Args {
    ARGS.get_or_init(|| Args::parse(&env::args().collect::<Vec<_>>()))
}

impl Args {
    /// One pass over the argument list; `--config` and `--interval` consume
    /// the following argument, unknown flags are ignored.
    pub fn parse(argv: &[String]) -> Self {
        let mut args = Self::default();

        let mut iter = argv.iter().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--help" | "-h" => args.help = true,
                "--version" => args.version = true,
                "--validate" => args.validate = true,
                "--run" => args.run = true,
                "--once" => args.once = true,
                "--config" => args.config_path = iter.next().cloned(),
                "--interval" => args.interval = iter.next().cloned(),
                _ => {}
            }
        }

        args
    }

    /// Configuration file path, with the default applied.
    pub fn config_path(&self) -> &str {
        self.config_path.as_deref().unwrap_or(DEFAULT_CONFIG_PATH)
    }
}

/// Print usage information
pub fn print_help() {
    println!("BalanceBot - ERC-20 wallet balance collector");
    println!();
    println!("USAGE:");
    println!("    balancebot --run [OPTIONS]");
    println!();
    println!("MODES:");
    println!("    --run                 Start the collector");
    println!("    --validate            Validate the configuration and exit");
    println!("    --version             Print version and exit");
    println!("    --help, -h            Show this help");
    println!();
    println!("OPTIONS:");
    println!("    --config <path>       Config file path (default: config.json)");
    println!("    --interval <spec>     Override the configured interval:");
    println!("                          a duration (30s, 5m, 1h) or a cron");
    println!("                          expression (\"*/5 * * * *\")");
    println!("    --once                Run a single tick and exit");
    println!();
    println!("ENVIRONMENT:");
    println!("    DATABASE_URL          PostgreSQL DSN (required)");
    println!("    BALANCEBOT_*          Override config file options, e.g.");
    println!("                          BALANCEBOT_RPC_URLS, BALANCEBOT_WALLETS");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        std::iter::once("balancebot")
            .chain(parts.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_flags_and_values() {
        let args = Args::parse(&argv(&[
            "--run",
            "--config",
            "custom.json",
            "--interval",
            "5m",
        ]));

        assert!(args.run);
        assert!(!args.once);
        assert!(!args.validate);
        assert_eq!(args.config_path(), "custom.json");
        assert_eq!(args.interval.as_deref(), Some("5m"));
    }

    #[test]
    fn test_parse_defaults() {
        let args = Args::parse(&argv(&[]));
        assert!(!args.run);
        assert_eq!(args.config_path(), "config.json");
        assert_eq!(args.interval, None);
    }

    #[test]
    fn test_value_flag_at_end_has_no_value() {
        let args = Args::parse(&argv(&["--run", "--config"]));
        assert!(args.run);
        assert_eq!(args.config_path(), "config.json");
    }

    #[test]
    fn test_unknown_flags_ignored() {
        let args = Args::parse(&argv(&["--run", "--frobnicate", "--once"]));
        assert!(args.run);
        assert!(args.once);
    }
}
