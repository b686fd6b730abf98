use clap::Parser;
use libvirt_discover::{provider::Discover, DiscoverError};
use tracing::{debug, Dispatch};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Discover ip addresses of tagged libvirt domains", long_about = None)]
struct Cli {
    /// Provider config, e.g. "provider=libvirt qemu_uri=qemu:///system metadata_key=role metadata_value=web"
    config: Option<String>,

    /// Print the options of every provider and exit
    #[arg(long)]
    help_providers: bool,

    /// Discard provider log output
    #[arg(short, long)]
    quiet: bool,

    /// Enable debug output
    #[arg(short, long)]
    verbose: bool,
}

fn run(cli: &Cli) -> Result<(), DiscoverError> {
    let discover = Discover::with_default_providers();

    let config = match (&cli.config, cli.help_providers) {
        (Some(config), false) => config,
        _ => {
            println!("{}", discover.help());
            return Ok(());
        }
    };

    let logger = (!cli.quiet).then(|| tracing::dispatcher::get_default(Dispatch::clone));
    debug!("config: {}", config);

    let addrs = discover.addrs(config, logger.as_ref())?;
    println!("{}", addrs.join(" "));
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
