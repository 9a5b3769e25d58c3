use std::collections::HashMap;

use crate::addr::{self, ParseFlags};
use crate::rnd::Xorshift128Plus;
use crate::structs::*;

/// A script execution backend for the control server.
///
/// `Ok(Some(text))` is reply payload for the operator, `Err` is an error
/// raised by the script itself. Implementations must never panic on
/// malformed input.
pub trait ScriptEngine: Send {
    fn execute(&mut self, script: &str) -> Result<Option<String>, String>;
}

/// Interprets control scripts against the generator port table.
///
/// Scripts are newline-separated commands; blank lines and `#` comments are
/// ignored. The first failing command aborts the rest of the unit. The
/// engine owns the single deterministic random stream of the generating
/// context; serialization of concurrent callers is the server's business.
#[derive(Debug)]
pub struct GeneratorEngine {
    ports: HashMap<u16, PortConfig>,
    rng: Xorshift128Plus,
}

impl GeneratorEngine {
    pub fn new(seed: (u64, u64)) -> GeneratorEngine {
        GeneratorEngine {
            ports: HashMap::new(),
            rng: Xorshift128Plus::new(seed.0, seed.1),
        }
    }

    pub fn add_port(&mut self, id: u16, config: PortConfig) {
        self.ports.insert(id, config);
    }

    pub fn port(&self, id: u16) -> Option<&PortConfig> {
        self.ports.get(&id)
    }

    /// Draw one value from the generator's random stream. This is the hook
    /// the packet path uses to vary field values.
    pub fn draw(&mut self) -> u64 {
        self.rng.next()
    }

    fn port_mut(&mut self, id: u16) -> Result<&mut PortConfig, String> {
        self.ports
            .get_mut(&id)
            .ok_or_else(|| format!("unknown port {id}"))
    }

    fn set_active(&mut self, target: &str, active: bool) -> Result<(), String> {
        if target == "all" {
            for config in self.ports.values_mut() {
                config.active = active;
            }
            return Ok(());
        }
        let id = parse_port(target)?;
        self.port_mut(id)?.active = active;
        log::debug!("port {id} {}", if active { "started" } else { "stopped" });
        Ok(())
    }

    fn run_line(&mut self, line: &str) -> Result<Option<String>, String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["seed", s0, s1] => {
                let s0 = parse_u64(s0)?;
                let s1 = parse_u64(s1)?;
                self.rng.reseed(s0, s1);
                Ok(None)
            }
            ["start", target] => self.set_active(target, true).map(|()| None),
            ["stop", target] => self.set_active(target, false).map(|()| None),
            ["show", port] => {
                let id = parse_port(port)?;
                let config = self
                    .ports
                    .get(&id)
                    .ok_or_else(|| format!("unknown port {id}"))?;
                Ok(Some(describe(id, config)))
            }
            ["set", port, "ip", which, address] => {
                let id = parse_port(port)?;
                let parsed = addr::parse_ip(address, ParseFlags::ANY)
                    .map_err(|e| format!("{address:?}: {e}"))?;
                let config = self.port_mut(id)?;
                match *which {
                    "src" => config.src = parsed,
                    "dst" => config.dst = parsed,
                    _ => return Err(format!("expected src or dst, got {which:?}")),
                }
                Ok(None)
            }
            ["set", port, "rnd", idx, offset, template] => {
                let id = parse_port(port)?;
                let idx = parse_u64(idx)? as usize;
                let offset = parse_u64(offset)? as usize;
                self.port_mut(id)?.rnd.set_spec(idx, offset, template)?;
                Ok(None)
            }
            ["set", port, key, value] => {
                let id = parse_port(port)?;
                let value = parse_u64(value)?;
                let config = self.port_mut(id)?;
                match *key {
                    "count" => config.count = value,
                    "size" => {
                        let size = u16::try_from(value)
                            .map_err(|_| format!("size {value} out of range"))?;
                        if size < MIN_PKT_SIZE {
                            return Err(format!("size must be at least {MIN_PKT_SIZE}"));
                        }
                        config.size = size;
                    }
                    "rate" => {
                        if value == 0 || value > 100 {
                            return Err("rate is a percentage between 1 and 100".into());
                        }
                        config.rate = value as u8;
                    }
                    "sport" => {
                        config.sport = u16::try_from(value)
                            .map_err(|_| format!("port number {value} out of range"))?;
                    }
                    "dport" => {
                        config.dport = u16::try_from(value)
                            .map_err(|_| format!("port number {value} out of range"))?;
                    }
                    _ => return Err(format!("unknown setting {key:?}")),
                }
                Ok(None)
            }
            _ => Err(format!("unknown command {line:?}")),
        }
    }
}

impl ScriptEngine for GeneratorEngine {
    fn execute(&mut self, script: &str) -> Result<Option<String>, String> {
        let mut reply = String::new();
        for (lineno, raw) in script.lines().enumerate() {
            let line = raw.split_once('#').map_or(raw, |(code, _)| code).trim();
            if line.is_empty() {
                continue;
            }
            match self.run_line(line) {
                Ok(Some(out)) => {
                    reply.push_str(&out);
                    if !out.ends_with('\n') {
                        reply.push('\n');
                    }
                }
                Ok(None) => {}
                Err(e) => return Err(format!("line {}: {e}", lineno + 1)),
            }
        }
        if reply.is_empty() {
            Ok(None)
        } else {
            Ok(Some(reply))
        }
    }
}

fn describe(id: u16, config: &PortConfig) -> String {
    format!(
        "port {id}: count={} size={} rate={}% sport={} dport={} src={} dst={} rnd={} {}",
        config.count,
        config.size,
        config.rate,
        config.sport,
        config.dport,
        config.src,
        config.dst,
        config.rnd.active_count(),
        if config.active { "active" } else { "idle" }
    )
}

fn parse_port(text: &str) -> Result<u16, String> {
    text.parse()
        .map_err(|_| format!("invalid port id {text:?}"))
}

fn parse_u64(text: &str) -> Result<u64, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|_| format!("invalid number {text:?}"))
}
