//! The DHCP client itself (C10): ties the FSM, codec, raw socket and lease
//! timers into sender/receiver/timer tasks sharing one `LocalSet`, matching
//! the single-threaded cooperative model the rest of this crate uses.
//! Orchestration is grounded on `client.py`'s `AsyncDHCPClient`
//! (`_send_forever`/`_recv_forever`/`transition`/the `*_received` handlers),
//! adapted from asyncio tasks + queues to `tokio::sync::mpsc` + a
//! `LocalSet`.

use crate::dhcp::codec::{self, DhcpMessage, Frame, MessageType, DHCP_CLIENT_PORT, DHCP_SERVER_PORT};
use crate::dhcp::fsm::{State, StateCell, TimeoutConfig, Trigger};
use crate::dhcp::hooks::HookRegistry;
use crate::dhcp::lease::{Lease, LeaseSink};
use crate::dhcp::transport::Transport;
use crate::dhcp::timers::{Backoff, LeaseTimers};
use crate::dhcp::xid::Xid;
use crate::dhcp::Error;
use crate::netlink::socket::NetlinkSocket;
use mac_address::MacAddress;
use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::watch;

/// Parameters the client asks the server for via option 55, per
/// `ClientConfig.requested_parameters`.
pub fn default_requested_parameters() -> Vec<u8> {
    vec![
        codec::option::SUBNET_MASK,
        codec::option::ROUTER,
        codec::option::NAME_SERVER,
        codec::option::DOMAIN_NAME,
        codec::option::LEASE_TIME,
        codec::option::RENEWAL_TIME,
        codec::option::REBINDING_TIME,
    ]
}

pub struct ClientConfig {
    pub interface: String,
    pub lease_sink: LeaseSink,
    pub lease_directory: PathBuf,
    pub requested_parameters: Vec<u8>,
    pub timeouts: TimeoutConfig,
}

impl ClientConfig {
    pub fn new(interface: impl Into<String>) -> ClientConfig {
        ClientConfig {
            interface: interface.into(),
            lease_sink: LeaseSink::File,
            lease_directory: std::env::current_dir().unwrap_or_default(),
            requested_parameters: default_requested_parameters(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// A message queued for (re)transmission, or `None` to stop retransmitting
/// whatever was queued before.
type QueuedMessage = Option<DhcpMessage>;

/// An async DHCP client bound to one interface.
pub struct Client {
    config: ClientConfig,
    rtnl: Rc<RefCell<NetlinkSocket>>,
    hooks: HookRegistry,
    chaddr: MacAddress,
    state: RefCell<StateCell>,
    lease: RefCell<Option<Lease>>,
    xid: RefCell<Xid>,
    last_state_change: RefCell<std::time::Instant>,
    lease_timers: RefCell<LeaseTimers>,
    send_tx: mpsc::UnboundedSender<QueuedMessage>,
    send_rx: RefCell<Option<mpsc::UnboundedReceiver<QueuedMessage>>>,
    state_watch: watch::Sender<State>,
}

impl Client {
    pub fn new(config: ClientConfig, rtnl: Rc<RefCell<NetlinkSocket>>, chaddr: MacAddress, hooks: HookRegistry) -> Rc<Client> {
        let (send_tx, send_rx) = mpsc::unbounded_channel();
        let (state_watch, _) = watch::channel(State::Off);
        Rc::new(Client {
            config,
            rtnl,
            hooks,
            chaddr,
            state: RefCell::new(StateCell::new(State::Off)),
            lease: RefCell::new(None),
            xid: RefCell::new(Xid::random()),
            last_state_change: RefCell::new(std::time::Instant::now()),
            lease_timers: RefCell::new(LeaseTimers::default()),
            send_tx,
            send_rx: RefCell::new(Some(send_rx)),
            state_watch,
        })
    }

    pub fn state(&self) -> State {
        self.state.borrow().get()
    }

    pub fn lease(&self) -> Option<Lease> {
        self.lease.borrow().clone()
    }

    pub async fn wait_for_state(&self, target: State) {
        let mut rx = self.state_watch.subscribe();
        if *rx.borrow() == target {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() == target {
                return;
            }
        }
    }

    /// Runs the client's sender and receiver loops on the given transport
    /// (a real [`crate::dhcp::raw::RawSocket`] or a
    /// [`crate::dhcp::transport::MockTransport`] in tests) until
    /// transitioned to `State::Off`. Intended to run inside a
    /// `tokio::task::LocalSet` alongside other per-thread Rc-based state.
    pub async fn run(self: &Rc<Self>, raw: Rc<dyn Transport>) -> Result<(), Error> {
        let loaded = self.config.lease_sink.load(&self.config.lease_directory, &self.config.interface);
        if let Some(lease) = loaded {
            *self.lease.borrow_mut() = Some(lease);
            self.transition(State::InitReboot, None).await?;
        } else {
            self.transition(State::Init, None).await?;
        }

        let send_rx = self.send_rx.borrow_mut().take().expect("run() called twice");

        let sender = self.clone().send_forever(raw.clone(), send_rx);
        let receiver = self.clone().recv_forever(raw.clone());
        self.bootstrap().await?;

        tokio::try_join!(sender, receiver)?;
        Ok(())
    }

    /// Sends the initial DISCOVER (from INIT) or REQUEST (from INIT_REBOOT),
    /// mirroring `bootstrap`'s state guard.
    async fn bootstrap(self: &Rc<Self>) -> Result<(), Error> {
        match self.state() {
            State::Init => {
                let msg = DhcpMessage::new_request(0, self.chaddr, MessageType::Discover);
                self.send_with_parameters(msg, State::Selecting).await
            }
            State::InitReboot => {
                let lease = self.lease().ok_or_else(|| Error::Resource("cannot init_reboot without a lease".into()))?;
                let msg = self.request_for_lease(&lease);
                self.send_with_parameters(msg, State::Rebooting).await
            }
            other => Err(Error::Resource(format!("cannot bootstrap from {other:?}"))),
        }
    }

    fn request_for_lease(&self, lease: &Lease) -> DhcpMessage {
        let mut msg = DhcpMessage::new_request(0, self.chaddr, MessageType::Request);
        msg.options.set(codec::option::REQUESTED_IP, lease.ip.octets().to_vec());
        if let Some(server_id) = lease.server_id {
            msg.options.set(codec::option::SERVER_ID, server_id.octets().to_vec());
        }
        msg
    }

    async fn send_with_parameters(self: &Rc<Self>, mut msg: DhcpMessage, to: State) -> Result<(), Error> {
        msg.options.set(codec::option::PARAMETER_LIST, self.config.requested_parameters.clone());
        self.transition(to, Some(msg)).await
    }

    async fn transition(self: &Rc<Self>, to: State, send: Option<DhcpMessage>) -> Result<(), Error> {
        let weak = Rc::downgrade(self);
        let timeouts = self.config.timeouts;
        self.state.borrow_mut().transition(to, &timeouts, move || {
            if let Some(client) = weak.upgrade() {
                tokio::task::spawn_local(async move {
                    log::warn!("state watchdog fired, resetting");
                    let _ = client.reset(Duration::ZERO).await;
                });
            }
        })?;
        *self.last_state_change.borrow_mut() = std::time::Instant::now();
        let _ = self.state_watch.send(to);
        let _ = self.send_tx.send(send);
        Ok(())
    }

    async fn reset(self: &Rc<Self>, delay: Duration) -> Result<(), Error> {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
            log::warn!("resetting after {:.1} seconds", delay.as_secs_f64());
        }
        self.transition(State::Init, None).await?;
        *self.lease.borrow_mut() = None;
        self.lease_timers.borrow_mut().cancel();
        *self.xid.borrow_mut() = Xid::random();
        self.bootstrap().await
    }

    async fn send_forever(self: Rc<Self>, raw: Rc<dyn Transport>, mut send_rx: mpsc::UnboundedReceiver<QueuedMessage>) -> Result<(), Error> {
        let mut current: Option<DhcpMessage> = None;
        let mut backoff: Option<Backoff> = None;

        loop {
            if self.state() == State::Off {
                return Ok(());
            }

            let sleep_for = match backoff.as_mut().and_then(|b| b.next()) {
                Some(d) => d,
                None => Duration::from_secs(999_999),
            };

            tokio::select! {
                received = send_rx.recv() => {
                    match received {
                        Some(Some(msg)) => {
                            current = Some(msg);
                            backoff = Some(Backoff::standard());
                        }
                        Some(None) => {
                            current = None;
                            backoff = None;
                        }
                        None => return Ok(()),
                    }
                }
                _ = tokio::time::sleep(sleep_for), if current.is_some() => {}
            }

            if let Some(msg) = current.as_mut() {
                let elapsed = self.last_state_change.borrow().elapsed().as_secs();
                msg.secs = elapsed.min(0xFFFF as u64) as u16;
                msg.xid = self.xid.borrow().for_state(self.state()).raw();
                let frame = outgoing_frame(self.chaddr, msg.clone());
                log::info!("sending {:?} (xid {:#x})", msg.message_type(), msg.xid);
                raw.send(&frame.encode()).await?;
            }
        }
    }

    async fn recv_forever(self: Rc<Self>, raw: Rc<dyn Transport>) -> Result<(), Error> {
        loop {
            if self.state() == State::Off {
                return Ok(());
            }
            let raw_frame = raw.recv().await?;
            let frame = match Frame::decode(&raw_frame) {
                Ok(f) => f,
                Err(err) => {
                    log::debug!("discarding unparseable frame: {err}");
                    continue;
                }
            };
            if frame.udp_dst != DHCP_CLIENT_PORT {
                continue;
            }
            let Some(message_type) = frame.message.message_type() else {
                continue;
            };
            let received_xid = Xid::from_raw(frame.message.xid);
            if !self.xid.borrow().matches(received_xid) {
                log::error!("incorrect xid {:#x}, discarding", frame.message.xid);
                continue;
            }
            log::info!("received {message_type:?}");
            if let Err(err) = self.handle(message_type, frame, received_xid).await {
                log::warn!("error handling {message_type:?}: {err}");
            }
        }
    }

    async fn handle(self: &Rc<Self>, message_type: MessageType, frame: Frame, xid: Xid) -> Result<(), Error> {
        match message_type {
            MessageType::Offer if self.state() == State::Selecting => self.on_offer(frame).await,
            MessageType::Ack
                if matches!(self.state(), State::Requesting | State::Rebooting | State::Renewing | State::Rebinding) =>
            {
                self.on_ack(frame, xid).await
            }
            MessageType::Nak
                if matches!(self.state(), State::Requesting | State::Rebooting | State::Renewing | State::Rebinding) =>
            {
                self.reset(Duration::ZERO).await
            }
            _ => {
                log::debug!("{message_type:?} not handled in state {:?}", self.state());
                Ok(())
            }
        }
    }

    async fn on_offer(self: &Rc<Self>, frame: Frame) -> Result<(), Error> {
        let server_id = frame.message.options.get_ipv4(codec::option::SERVER_ID);
        let mut msg = DhcpMessage::new_request(0, self.chaddr, MessageType::Request);
        msg.options.set(codec::option::REQUESTED_IP, frame.message.yiaddr.octets().to_vec());
        if let Some(server_id) = server_id {
            msg.options.set(codec::option::SERVER_ID, server_id.octets().to_vec());
        }
        self.send_with_parameters(msg, State::Requesting).await
    }

    async fn on_ack(self: &Rc<Self>, frame: Frame, xid: Xid) -> Result<(), Error> {
        let lease = Lease::from_ack(&frame.message, &self.config.interface, frame.eth_src)?;
        log::info!("got lease for {} from {:?}", lease.ip, lease.server_id);

        self.arm_lease_timers(&lease);
        self.config.lease_sink.dump(&lease, &self.config.lease_directory)?;
        *self.lease.borrow_mut() = Some(lease.clone());

        self.transition(State::Bound, None).await?;

        let request_state = xid.request_state();
        let trigger = request_state.and_then(Trigger::from_completing_state);
        match trigger {
            Some(_) => self.hooks.run_bound(&self.rtnl, &lease).await,
            None => log::warn!("invalid request state {request_state:?} in xid"),
        }
        Ok(())
    }

    fn arm_lease_timers(self: &Rc<Self>, lease: &Lease) {
        let renewal = self.clone();
        let rebinding = self.clone();
        let expiration = self.clone();
        let expiration_in = lease.expiration_in().unwrap_or_else(|err| {
            log::warn!("lease has no expiration: {err}");
            None
        });
        self.lease_timers.borrow_mut().arm(
            lease.renewal_in(),
            lease.rebinding_in(),
            expiration_in,
            move || {
                tokio::task::spawn_local(async move {
                    let _ = renewal.on_renewal_timer().await;
                });
            },
            move || {
                tokio::task::spawn_local(async move {
                    let _ = rebinding.on_rebinding_timer().await;
                });
            },
            move || {
                tokio::task::spawn_local(async move {
                    let _ = expiration.on_expiration_timer().await;
                });
            },
        );
    }

    async fn on_renewal_timer(self: &Rc<Self>) -> Result<(), Error> {
        let lease = self.lease().ok_or_else(|| Error::Resource("cannot renew without an existing lease".into()))?;
        log::info!("renewal timer expired");
        let msg = self.request_for_lease(&lease);
        self.send_with_parameters(msg, State::Renewing).await
    }

    async fn on_rebinding_timer(self: &Rc<Self>) -> Result<(), Error> {
        let lease = self.lease().ok_or_else(|| Error::Resource("cannot rebind without an existing lease".into()))?;
        log::info!("rebinding timer expired");
        let msg = self.request_for_lease(&lease);
        self.send_with_parameters(msg, State::Rebinding).await
    }

    async fn on_expiration_timer(self: &Rc<Self>) -> Result<(), Error> {
        log::info!("lease expired");
        if let Some(lease) = self.lease() {
            self.hooks.run_unbound(&self.rtnl, &lease).await;
        }
        self.reset(Duration::ZERO).await
    }

    /// Shuts the client down: sends a RELEASE if `send_release` and there's
    /// a live, unexpired lease, runs the unbound hooks, and stops the
    /// sender/receiver loops. `send_release` is threaded from the CLI's
    /// `--no-release` flag.
    pub async fn shutdown(self: &Rc<Self>, send_release: bool) -> Result<(), Error> {
        self.lease_timers.borrow_mut().cancel();
        if let Some(lease) = self.lease() {
            self.hooks.run_unbound(&self.rtnl, &lease).await;
            if send_release && !lease.expired() {
                let mut msg = DhcpMessage::new_request(0, self.chaddr, MessageType::Release);
                msg.options.set(codec::option::REQUESTED_IP, lease.ip.octets().to_vec());
                if let Some(server_id) = lease.server_id {
                    msg.options.set(codec::option::SERVER_ID, server_id.octets().to_vec());
                }
                let _ = self.send_tx.send(Some(msg));
            }
        }
        self.transition(State::Off, None).await
    }
}

fn outgoing_frame(chaddr: MacAddress, message: DhcpMessage) -> Frame {
    let ciaddr = message.ciaddr;
    let (ip_src, ip_dst, eth_dst) = if ciaddr != Ipv4Addr::UNSPECIFIED {
        (ciaddr, Ipv4Addr::BROADCAST, MacAddress::new([0xff; 6]))
    } else {
        (Ipv4Addr::UNSPECIFIED, Ipv4Addr::BROADCAST, MacAddress::new([0xff; 6]))
    };
    Frame {
        eth_dst,
        eth_src: chaddr,
        ip_src,
        ip_dst,
        udp_src: DHCP_CLIENT_PORT,
        udp_dst: DHCP_SERVER_PORT,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_requested_parameters_includes_lease_timers() {
        let params = default_requested_parameters();
        assert!(params.contains(&codec::option::LEASE_TIME));
        assert!(params.contains(&codec::option::RENEWAL_TIME));
        assert!(params.contains(&codec::option::REBINDING_TIME));
    }

    #[test]
    fn outgoing_frame_uses_broadcast_before_bound() {
        let msg = DhcpMessage::new_request(1, MacAddress::new([1; 6]), MessageType::Discover);
        let frame = outgoing_frame(MacAddress::new([1; 6]), msg);
        assert_eq!(frame.ip_dst, Ipv4Addr::BROADCAST);
        assert_eq!(frame.udp_dst, DHCP_SERVER_PORT);
    }
}
