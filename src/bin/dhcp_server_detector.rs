//! Thin CLI sending DHCP DISCOVERs on one or more interfaces and printing
//! every response as JSON. Grounded on `server_detector.py`'s
//! `DHCPServerDetector`: one send-forever task and one receive loop per
//! interface, fanning responses into a shared channel with an overall
//! deadline.

use clap::Parser;
use rtnl_core::dhcp::codec::{self, DhcpMessage, Frame, MessageType, DHCP_CLIENT_PORT, DHCP_SERVER_PORT};
use rtnl_core::dhcp::raw::RawSocket;
use std::net::Ipv4Addr;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(about = "Send DHCP DISCOVER messages and collect responses, printed as JSON")]
struct Args {
    /// Interface(s) to DISCOVER on.
    #[arg(required = true)]
    interface: Vec<String>,

    /// Seconds spent collecting responses.
    #[arg(short = 'd', long, default_value_t = 30.0)]
    duration: f64,

    /// Interval in seconds between DISCOVERs.
    #[arg(short = 'i', long, default_value_t = 4.0)]
    interval: f64,

    /// Exit as soon as a response is received.
    #[arg(short = '1', long)]
    exit_on_first_offer: bool,

    /// Log level, 0-4+.
    #[arg(short = 'l', long, default_value_t = 1)]
    log_level: u64,

    /// Restrict raw socket filters to 802.1Q-tagged frames on this VID,
    /// applied to every interface given.
    #[arg(long)]
    vlan: Option<u16>,
}

fn default_parameters() -> Vec<u8> {
    vec![codec::option::SUBNET_MASK, codec::option::ROUTER, codec::option::BROADCAST_ADDRESS, codec::option::NAME_SERVER]
}

struct Response {
    interface: String,
    message_type: MessageType,
    yiaddr: Ipv4Addr,
    server_id: Option<Ipv4Addr>,
}

async fn send_forever(raw: std::rc::Rc<RawSocket>, chaddr: mac_address::MacAddress, xid: u32, interval: Duration) {
    loop {
        let mut msg = DhcpMessage::new_request(xid, chaddr, MessageType::Discover);
        msg.options.set(codec::option::PARAMETER_LIST, default_parameters());
        let frame = Frame {
            eth_dst: mac_address::MacAddress::new([0xff; 6]),
            eth_src: chaddr,
            ip_src: Ipv4Addr::UNSPECIFIED,
            ip_dst: Ipv4Addr::BROADCAST,
            udp_src: DHCP_CLIENT_PORT,
            udp_dst: DHCP_SERVER_PORT,
            message: msg,
        };
        log::info!("sending DISCOVER (xid {xid:#x})");
        if let Err(err) = raw.send(&frame.encode()).await {
            log::warn!("send failed: {err}");
        }
        tokio::time::sleep(interval).await;
    }
}

async fn recv_forever(raw: std::rc::Rc<RawSocket>, interface: String, xid: u32, tx: mpsc::UnboundedSender<Response>) {
    loop {
        let raw_frame = match raw.recv().await {
            Ok(f) => f,
            Err(err) => {
                log::warn!("[{interface}] recv failed: {err}");
                continue;
            }
        };
        let frame = match Frame::decode(&raw_frame) {
            Ok(f) => f,
            Err(_) => continue,
        };
        if frame.udp_dst != DHCP_CLIENT_PORT || frame.message.xid != xid {
            continue;
        }
        let Some(message_type) = frame.message.message_type() else { continue };
        let server_id = frame.message.options.get_ipv4(codec::option::SERVER_ID);
        log::info!("[{interface}] <- {message_type:?}");
        let _ = tx.send(Response { interface: interface.clone(), message_type, yiaddr: frame.message.yiaddr, server_id });
    }
}

async fn detect(args: Args) -> usize {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut tasks = Vec::new();
    for ifname in &args.interface {
        let chaddr = match mac_address::mac_address_by_name(ifname) {
            Ok(Some(mac)) => mac,
            _ => {
                eprintln!("skipping {ifname}: no hardware address");
                continue;
            }
        };
        let raw = match RawSocket::open(ifname, args.vlan) {
            Ok(raw) => std::rc::Rc::new(raw),
            Err(err) => {
                eprintln!("skipping {ifname}: {err}");
                continue;
            }
        };
        let xid = rand::random::<u32>() | 0xFF;
        let interval = Duration::from_secs_f64(args.interval);
        tasks.push(tokio::task::spawn_local(send_forever(raw.clone(), chaddr, xid, interval)));
        tasks.push(tokio::task::spawn_local(recv_forever(raw, ifname.clone(), xid, tx.clone())));
    }
    drop(tx);

    let mut count = 0usize;
    let deadline = tokio::time::sleep(Duration::from_secs_f64(args.duration));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            received = rx.recv() => {
                let Some(response) = received else { break };
                count += 1;
                let payload = serde_json::json!({
                    "interface": response.interface,
                    "message_type": format!("{:?}", response.message_type),
                    "yiaddr": response.yiaddr.to_string(),
                    "server_id": response.server_id.map(|ip| ip.to_string()),
                });
                println!("{}", serde_json::to_string_pretty(&payload).unwrap());
                if args.exit_on_first_offer {
                    break;
                }
            }
        }
    }
    for task in tasks {
        task.abort();
    }
    count
}

fn main() -> ExitCode {
    let args = Args::parse();
    if rtnl_core::logging::init("dhcp-server-detector", args.log_level).is_err() {
        eprintln!("failed to initialize logging");
    }
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };
    let local = tokio::task::LocalSet::new();
    let count = local.block_on(&runtime, detect(args));
    if count > 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
