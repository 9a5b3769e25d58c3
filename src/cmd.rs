use clap::{Parser, Subcommand};

#[derive(Debug, Parser, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the remote control server
    Serve {
        #[arg(short, long, default_value = None, help = "Path to the TOML configuration file")]
        config: Option<String>,
        #[arg(
            short = 'H',
            long,
            help = "Bind host, overrides the configuration file"
        )]
        host: Option<String>,
        #[arg(short, long, help = "Bind port, overrides the configuration file")]
        port: Option<u16>,
        #[arg(
            short,
            long,
            num_args = 2,
            help = "Two 64-bit seed words for the random stream, overrides the configuration file"
        )]
        seed: Option<Vec<u64>>,
    },
    /// Parse a textual IPv4/IPv6 address and print its canonical form
    Parse {
        /// Address to parse, optionally with a /len suffix
        address: String,
        #[arg(long, default_value_t = false, help = "Accept IPv4 input only")]
        v4: bool,
        #[arg(long, default_value_t = false, help = "Accept IPv6 input only")]
        v6: bool,
        #[arg(
            short,
            long,
            default_value_t = false,
            help = "Accept CIDR network syntax"
        )]
        network: bool,
    },
    /// Print values from the deterministic random stream
    Rand {
        #[arg(
            short = 'n',
            long,
            default_value_t = 4,
            help = "Number of values to print"
        )]
        count: u32,
        #[arg(
            short,
            long,
            num_args = 2,
            default_values_t = vec![1u64, 2u64],
            help = "Two 64-bit seed words"
        )]
        seed: Vec<u64>,
    },
}
