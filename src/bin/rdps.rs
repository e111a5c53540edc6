use std::fs::File;
use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;

use rdp::sender;
use rdp::trace::Logger;
use rdp::transport::Transport;

fn usage() -> ! {
    eprintln!("usage: rdps <local_ip> <local_port> <peer_ip> <peer_port> <input_file>");
    std::process::exit(2);
}

fn parse_addr(ip: Option<String>, port: Option<String>) -> Option<SocketAddr> {
    let ip: IpAddr = ip?.parse().ok()?;
    let port: u16 = port?.parse().ok()?;
    Some(SocketAddr::new(ip, port))
}

fn main() -> ExitCode {
    Logger::install(log::LevelFilter::Info);

    let mut args = std::env::args().skip(1);
    let local = parse_addr(args.next(), args.next()).unwrap_or_else(|| usage());
    let peer = parse_addr(args.next(), args.next()).unwrap_or_else(|| usage());
    let path = match args.next() {
        Some(path) => path,
        None => usage(),
    };

    let file = match File::open(&path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("rdps: {path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let transport = match Transport::bind(local) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("rdps: {e}");
            return ExitCode::FAILURE;
        }
    };

    match sender::run(&transport, file, peer, sender::DEFAULT_ISS) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("rdps: {e}");
            ExitCode::FAILURE
        }
    }
}
