//
// Echo every datagram received from a peer back to it through the transport's managed buffers.
//
// Run a peer, e.g.:
//   socat - UDP:127.0.0.1:5000,sourceport=5001
// and then:
//   cargo run --example loopback -- --port 5001 --local-port 5000
//
use std::net::UdpSocket;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use structopt::StructOpt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use udpzc::hints::Hints;
use udpzc::{Transport, TransportOptions, UdpEndpoint};

#[derive(Default, Debug, Clone, Copy)]
struct Stats {
    rx_packets: usize,
    tx_packets: usize,
    rx_bytes: usize,
    send_timeouts: usize,
}

#[derive(StructOpt, Debug)]
#[structopt(name = "loopback")]
struct Opt {
    #[structopt(long, default_value = "127.0.0.1")]
    addr: String,

    #[structopt(long, default_value = "5001")]
    port: u16,

    /// Bind to this local port instead of an ephemeral one
    #[structopt(long)]
    local_port: Option<u16>,

    /// Transport hints, e.g. num_recv_frames=64,recv_frame_size=9000
    #[structopt(long, default_value = "")]
    hints: String,

    #[structopt(long, default_value = "100")]
    timeout_ms: u64,

    /// Stop after this many seconds
    #[structopt(long, default_value = "300")]
    seconds: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opt = Opt::from_args();

    let transport = match opt.local_port {
        None => Transport::<UdpEndpoint>::connect_udp(&opt.addr, &opt.port.to_string(), &opt.hints),
        Some(local_port) => {
            let hints = Hints::parse(&opt.hints).unwrap_or_else(|err| panic!("bad hints: {}", err));
            let options = TransportOptions::from_hints(&hints)
                .unwrap_or_else(|err| panic!("bad hints: {}", err));

            let socket = UdpSocket::bind(("0.0.0.0", local_port)).unwrap();
            socket.connect((opt.addr.as_str(), opt.port)).unwrap();
            Transport::new(UdpEndpoint::from_socket(socket).unwrap(), options)
        }
    };
    let transport = match transport {
        Ok(t) => t,
        Err(err) => panic!("no transport for you: {}", err),
    };

    info!(
        recv_frames = transport.num_recv_frames(),
        recv_frame_size = transport.recv_frame_size(),
        send_frames = transport.num_send_frames(),
        send_frame_size = transport.send_frame_size(),
        "transport ready"
    );

    //
    // Start a thread to print stats
    //
    let (sender, receiver): (Sender<Stats>, Receiver<Stats>) = bounded(100);

    thread::spawn(move || loop {
        select! {
            recv(receiver) -> msg => {
                match msg {
                    Ok(s) => info!(?s, "stats"),
                    Err(_) => break,
                }
            }
        }
    });

    //
    // The loop
    //
    let timeout = Duration::from_millis(opt.timeout_ms);
    let end = Instant::now() + Duration::from_secs(opt.seconds);
    let mut last = Instant::now();
    let mut stats: Stats = Default::default();

    loop {
        let now = Instant::now();
        if now >= end {
            break;
        }
        if now.duration_since(last) > Duration::from_secs(1) {
            if let Err(err) = sender.send(stats) {
                error!(%err, "stats channel closed");
            }
            last = now;
        }

        let rx = match transport.get_recv_buf(timeout) {
            Some(buf) => buf,
            None => continue,
        };
        stats.rx_packets += 1;
        stats.rx_bytes += rx.len();

        let mut tx = match transport.get_send_buf(timeout) {
            Some(buf) => buf,
            None => {
                stats.send_timeouts += 1;
                continue;
            }
        };

        let len = rx.len().min(tx.len());
        tx[..len].copy_from_slice(&rx[..len]);
        rx.release();
        tx.commit(len);
        stats.tx_packets += 1;
    }

    info!(?stats, "done");
}
