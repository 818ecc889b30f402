use std::net::IpAddr;

use clap::Parser;
use huddle_core::RelayConfig;

/// LAN chat and file relay server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Address to listen on. Overrides the config file.
    #[arg(long)]
    pub host: Option<IpAddr>,

    /// Port to listen on. Use 0 for an ephemeral port.
    #[arg(long)]
    pub port: Option<u16>,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded config
    pub fn apply(&self, config: &mut RelayConfig) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
    }
}
