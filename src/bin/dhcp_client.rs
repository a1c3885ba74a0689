//! Thin CLI wrapping `rtnl_core::dhcp::client`. Mirrors `cli.py`'s argument
//! surface: interface, `--lease-type`, repeatable `--hook`,
//! `--exit-on-timeout`, `--log-level`, `--write-pidfile`, `--no-release`.

use clap::Parser;
use rtnl_core::dhcp::client::{Client, ClientConfig};
use rtnl_core::dhcp::fsm::State;
use rtnl_core::dhcp::hooks::{ConfigureDefaultRoute, ConfigureIp, Hook, HookRegistry};
use rtnl_core::dhcp::lease::LeaseSink;
use rtnl_core::dhcp::raw::RawSocket;
use rtnl_core::dhcp::transport::Transport;
use rtnl_core::netlink::socket::{ensure_socket, Family};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(about = "Acquire and maintain a DHCP lease on one interface")]
struct Args {
    /// Interface to run the client on.
    interface: String,

    /// Where to persist the lease: `file` (default) or `stdout`.
    #[arg(long, default_value = "file")]
    lease_type: String,

    /// Hook to run on bind/release; repeatable. One of: configure-ip,
    /// configure-default-route.
    #[arg(long = "hook")]
    hooks: Vec<String>,

    /// Exit with status 1 if no lease is bound within N seconds.
    #[arg(long)]
    exit_on_timeout: Option<f64>,

    /// Verbosity, 0-4+ (repeat `-v` style via a number for CLI simplicity).
    #[arg(long, default_value_t = 2)]
    log_level: u64,

    /// Write the process pid to this file once running.
    #[arg(long)]
    write_pidfile: Option<std::path::PathBuf>,

    /// Skip sending a RELEASE on shutdown.
    #[arg(long)]
    no_release: bool,

    /// Restrict the raw socket filter to 802.1Q-tagged frames on this VID,
    /// for interfaces carrying DHCP traffic over a VLAN subinterface's
    /// parent link.
    #[arg(long)]
    vlan: Option<u16>,
}

fn resolve_hook(name: &str) -> Option<Box<dyn Hook>> {
    match name {
        "configure-ip" => Some(Box::new(ConfigureIp)),
        "configure-default-route" => Some(Box::new(ConfigureDefaultRoute)),
        _ => None,
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    if rtnl_core::logging::init("dhcp-client", args.log_level).is_err() {
        eprintln!("failed to initialize logging");
    }

    let lease_sink = match args.lease_type.as_str() {
        "stdout" => LeaseSink::Stdout,
        "file" => LeaseSink::File,
        other => {
            eprintln!("unknown --lease-type {other}, expected `file` or `stdout`");
            return ExitCode::FAILURE;
        }
    };

    let mut hooks = HookRegistry::new();
    for name in &args.hooks {
        match resolve_hook(name) {
            Some(hook) => hooks.register(hook),
            None => {
                eprintln!("unknown --hook {name}");
                return ExitCode::FAILURE;
            }
        }
    }
    if args.hooks.is_empty() {
        hooks.register(Box::new(ConfigureIp));
        hooks.register(Box::new(ConfigureDefaultRoute));
    }

    if let Some(path) = &args.write_pidfile {
        if let Err(err) = std::fs::write(path, std::process::id().to_string()) {
            log::warn!("failed to write pidfile {}: {err}", path.display());
        }
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, run(args, lease_sink, hooks))
}

async fn run(args: Args, lease_sink: LeaseSink, hooks: HookRegistry) -> ExitCode {
    let mut config = ClientConfig::new(args.interface.clone());
    config.lease_sink = lease_sink;

    let chaddr = match mac_address::mac_address_by_name(&args.interface) {
        Ok(Some(mac)) => mac,
        Ok(None) => {
            eprintln!("interface {} has no hardware address", args.interface);
            return ExitCode::FAILURE;
        }
        Err(err) => {
            eprintln!("failed to look up {} hardware address: {err}", args.interface);
            return ExitCode::FAILURE;
        }
    };

    let rtnl = match ensure_socket(Family::Route) {
        Ok(socket) => socket,
        Err(err) => {
            eprintln!("failed to open rtnetlink socket: {err}");
            return ExitCode::FAILURE;
        }
    };

    let raw = match RawSocket::open(&args.interface, args.vlan) {
        Ok(raw) => raw,
        Err(err) => {
            eprintln!("failed to open raw socket on {}: {err}", args.interface);
            return ExitCode::FAILURE;
        }
    };

    let client = Client::new(config, rtnl, chaddr, hooks);
    let raw: std::rc::Rc<dyn Transport> = std::rc::Rc::new(raw);

    let run_client = client.clone();
    let run_task = tokio::task::spawn_local(async move { run_client.run(raw).await });

    if let Some(timeout_secs) = args.exit_on_timeout {
        let wait_bound = client.wait_for_state(State::Bound);
        if tokio::time::timeout(Duration::from_secs_f64(timeout_secs), wait_bound).await.is_err() {
            eprintln!("no lease bound within {timeout_secs} seconds");
            let _ = client.shutdown(!args.no_release).await;
            run_task.abort();
            return ExitCode::FAILURE;
        }
    }

    tokio::select! {
        result = run_task => {
            match result {
                Ok(Ok(())) => ExitCode::SUCCESS,
                Ok(Err(err)) => {
                    eprintln!("client error: {err}");
                    ExitCode::FAILURE
                }
                Err(_) => ExitCode::SUCCESS, // aborted by ctrl-c shutdown below
            }
        }
        _ = tokio::signal::ctrl_c() => {
            let _ = client.shutdown(!args.no_release).await;
            ExitCode::SUCCESS
        }
    }
}
