use serde::Deserialize;
use std::collections::HashMap;

use crate::addr::{parse_ip, ParseFlags};
use crate::structs::PortConfig;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 22022;
/// Fixed default seed; override it in the configuration when independent
/// deployments must not share a stream.
pub const DEFAULT_SEED: (u64, u64) = (0x853c_49e6_748f_ea9b, 0x0da3_e39c_b94b_95bd);

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    control: Option<ControlToml>,
    random: Option<RandomToml>,
    #[serde(default)]
    ports: Vec<PortToml>,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct ControlToml {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct RandomToml {
    seed: Option<[u64; 2]>,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct PortToml {
    id: u16,
    count: Option<u64>,
    size: Option<u16>,
    rate: Option<u8>,
    sport: Option<u16>,
    dport: Option<u16>,
    src: Option<String>,
    dst: Option<String>,
}

impl From<PortToml> for PortConfig {
    fn from(p: PortToml) -> PortConfig {
        let mut config = PortConfig::default();
        if let Some(count) = p.count {
            config.count = count;
        }
        if let Some(size) = p.size {
            config.size = size;
        }
        if let Some(rate) = p.rate {
            config.rate = rate;
        }
        if let Some(sport) = p.sport {
            config.sport = sport;
        }
        if let Some(dport) = p.dport {
            config.dport = dport;
        }
        if let Some(src) = p.src {
            config.src = parse_ip(&src, ParseFlags::ANY).expect("Cannot parse the source address");
        }
        if let Some(dst) = p.dst {
            config.dst =
                parse_ip(&dst, ParseFlags::ANY).expect("Cannot parse the destination address");
        }
        config
    }
}

/// Runtime configuration of the control plane.
#[derive(Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub seed: (u64, u64),
    pub ports: HashMap<u16, PortConfig>,
}

impl Default for Config {
    fn default() -> Config {
        let mut ports = HashMap::new();
        ports.insert(0, PortConfig::default());
        Config {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            seed: DEFAULT_SEED,
            ports,
        }
    }
}

/// Import a configuration from a TOML string.
pub fn import_config(config: &str) -> Config {
    let parsed: ConfigToml = toml::from_str(config).expect("Ill-formed configuration file");

    let mut ports: HashMap<u16, PortConfig> = HashMap::new();
    for port in parsed.ports {
        let id = port.id;
        if ports.insert(id, port.into()).is_some() {
            log::warn!("port {id} defined twice, keeping the last definition");
        }
    }
    if ports.is_empty() {
        ports.insert(0, PortConfig::default());
    }

    let control = parsed.control.unwrap_or(ControlToml {
        host: None,
        port: None,
    });
    let seed = parsed
        .random
        .and_then(|r| r.seed)
        .map_or(DEFAULT_SEED, |s| (s[0], s[1]));

    let config = Config {
        host: control.host.unwrap_or_else(|| DEFAULT_HOST.into()),
        port: control.port.unwrap_or(DEFAULT_PORT),
        seed,
        ports,
    };
    log::trace!("Configuration: {config:?}");
    config
}
