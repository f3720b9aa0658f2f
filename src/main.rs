use balancebot::{
    arguments::{self, print_help},
    logger::{self, log, LogTag},
    run,
};

/// Routes execution based on command-line arguments:
/// - `--help` / `--version`: print and exit
/// - `--validate`: load and validate the configuration, then exit
/// - `--run [--once]`: start the collector
#[tokio::main]
async fn main() {
    // Default level until the config installs the real one
    logger::init("info");

    let args = arguments::get();

    if args.help {
        print_help();
        std::process::exit(0);
    }

    if args.version {
        println!("balancebot {}", env!("CARGO_PKG_VERSION"));
        std::process::exit(0);
    }

    if args.validate {
        match run::load_config() {
            Ok(_) => {
                log(LogTag::Config, "SUCCESS", "Configuration is valid");
                std::process::exit(0);
            }
            Err(e) => {
                log(LogTag::Config, "ERROR", &format!("{:#}", e));
                std::process::exit(1);
            }
        }
    }

    if !args.run {
        log(LogTag::System, "ERROR", "No execution mode specified");
        print_help();
        std::process::exit(1);
    }

    match run::run_tracker().await {
        Ok(()) => {
            log(LogTag::System, "SUCCESS", "BalanceBot finished");
        }
        Err(e) => {
            log(LogTag::System, "ERROR", &format!("BalanceBot failed: {:#}", e));
            std::process::exit(1);
        }
    }
}
