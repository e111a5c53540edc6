use std::fs::File;
use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;

use rdp::receiver;
use rdp::trace::Logger;
use rdp::transport::Transport;

fn usage() -> ! {
    eprintln!("usage: rdpr <local_ip> <local_port> <output_file>");
    std::process::exit(2);
}

fn main() -> ExitCode {
    Logger::install(log::LevelFilter::Info);

    let mut args = std::env::args().skip(1);
    let (ip, port, path) = match (args.next(), args.next(), args.next()) {
        (Some(ip), Some(port), Some(path)) => (ip, port, path),
        _ => usage(),
    };

    let ip: IpAddr = match ip.parse() {
        Ok(ip) => ip,
        Err(_) => usage(),
    };
    let port: u16 = match port.parse() {
        Ok(p) => p,
        Err(_) => usage(),
    };
    let local = SocketAddr::new(ip, port);

    let file = match File::create(&path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("rdpr: {path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let transport = match Transport::bind(local) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("rdpr: {e}");
            return ExitCode::FAILURE;
        }
    };

    match receiver::run(&transport, file) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("rdpr: {e}");
            ExitCode::FAILURE
        }
    }
}
