use pktforge::addr::{parse_ip, ParseFlags};
use pktforge::config;
use pktforge::control;
use pktforge::engine::GeneratorEngine;
use pktforge::rnd::Xorshift128Plus;
mod cmd;

use std::fs;
use std::net::Ipv4Addr;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use clap::Parser;
use pnet::{datalink, ipnetwork::IpNetwork};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = cmd::Args::parse();

    match args.command {
        cmd::Command::Serve {
            config,
            host,
            port,
            seed,
        } => serve(config, host, port, seed),
        cmd::Command::Parse {
            address,
            v4,
            v6,
            network,
        } => {
            let mut flags = match (v4, v6) {
                (true, false) => ParseFlags::V4,
                (false, true) => ParseFlags::V6,
                _ => ParseFlags::V4 | ParseFlags::V6,
            };
            if network {
                flags = flags | ParseFlags::NETWORK;
            }
            match parse_ip(&address, flags) {
                Ok(parsed) => println!("{parsed}"),
                Err(e) => {
                    log::error!("cannot parse {address:?}: {e}");
                    process::exit(1);
                }
            }
        }
        cmd::Command::Rand { count, seed } => {
            let mut rng = Xorshift128Plus::new(seed[0], seed[1]);
            for _ in 0..count {
                println!("{:#018x}", rng.next());
            }
        }
    };
}

fn serve(
    config_path: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    seed: Option<Vec<u64>>,
) {
    let mut config = match &config_path {
        Some(path) => {
            let config_str =
                fs::read_to_string(path).expect("Cannot access the configuration file.");
            config::import_config(&config_str)
        }
        None => config::Config::default(),
    };
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(seed) = seed {
        config.seed = (seed[0], seed[1]);
    }

    // Extract all IPv4 local interfaces (except loopback)
    let extract_addr = |iface: datalink::NetworkInterface| {
        iface
            .ips
            .into_iter()
            .filter(IpNetwork::is_ipv4)
            .map(|i| match i {
                IpNetwork::V4(data) => data.ip(),
                _ => unreachable!(),
            })
    };
    let local_interfaces: Vec<Ipv4Addr> = datalink::interfaces()
        .into_iter()
        .flat_map(extract_addr)
        .filter(|i| !i.is_loopback())
        .collect();
    log::debug!("IPv4 interfaces: {:?}", &local_interfaces);

    if let Ok(bind_ip) = config.host.parse::<Ipv4Addr>() {
        if !bind_ip.is_loopback() && !bind_ip.is_unspecified() && !local_interfaces.contains(&bind_ip)
        {
            log::warn!("{bind_ip} is not the address of a local interface");
        }
    }
    if config.host != "localhost" && !config.host.starts_with("127.") {
        log::warn!("the control channel has no authentication, avoid exposing it");
    }

    let mut engine = GeneratorEngine::new(config.seed);
    for (id, port_config) in config.ports {
        engine.add_port(id, port_config);
    }
    let engine = Arc::new(Mutex::new(engine));

    let mut server = match control::start(&config.host, config.port, engine) {
        Ok(server) => server,
        Err(e) => {
            log::error!("cannot start the control server: {e}");
            process::exit(1);
        }
    };

    // Handle ctrl+C
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        if r.load(Ordering::Relaxed) {
            log::warn!("Stopping the control server, please wait a few seconds");
            r.store(false, Ordering::Relaxed);
        } else {
            log::warn!("Ending immediately");
            process::abort();
        }
    })
    .expect("Error setting Ctrl-C handler");

    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(200));
    }
    server.stop();
}
