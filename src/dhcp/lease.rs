//! Lease model: derives renewal/rebinding/expiration timers from a DHCP ACK,
//! and persists leases as JSON. Grounded on `leases.py`'s `Lease` dataclass
//! and its `JSONStdoutLease`/`JSONFileLease` subclasses.

use crate::dhcp::codec::{option, DhcpMessage};
use crate::dhcp::Error;
use chrono::{DateTime, Utc};
use mac_address::MacAddress;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

/// A lease obtained through DHCP: the ACK that granted it, plus the
/// bookkeeping needed to know when to renew, rebind, or expire it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    pub ip: Ipv4Addr,
    pub subnet_mask: Option<Ipv4Addr>,
    pub routers: Vec<Ipv4Addr>,
    pub name_servers: Vec<Ipv4Addr>,
    pub broadcast_address: Option<Ipv4Addr>,
    pub mtu: Option<u32>,
    pub domain_name: Option<String>,
    pub server_id: Option<Ipv4Addr>,
    pub lease_time: Option<u32>,
    pub renewal_time: Option<u32>,
    pub rebinding_time: Option<u32>,
    pub interface: String,
    pub server_mac: MacAddress,
    pub obtained: DateTime<Utc>,
}

impl Lease {
    /// Builds a lease from a server's ACK message. Fails if the ACK doesn't
    /// carry a `yiaddr`, since that's the one field this client cannot
    /// function without.
    pub fn from_ack(ack: &DhcpMessage, interface: &str, server_mac: MacAddress) -> Result<Lease, Error> {
        if ack.yiaddr.is_unspecified() {
            return Err(Error::OptionMissing("yiaddr"));
        }
        Ok(Lease {
            ip: ack.yiaddr,
            subnet_mask: ack.options.get_ipv4(option::SUBNET_MASK),
            routers: ack.options.get_ipv4_list(option::ROUTER).unwrap_or_default(),
            name_servers: ack.options.get_ipv4_list(option::NAME_SERVER).unwrap_or_default(),
            broadcast_address: ack.options.get_ipv4(option::BROADCAST_ADDRESS),
            mtu: ack.options.get_u32(option::INTERFACE_MTU).map(|v| v & 0xFFFF),
            domain_name: ack.options.get_string(option::DOMAIN_NAME),
            server_id: ack.options.get_ipv4(option::SERVER_ID),
            lease_time: ack.options.get_u32(option::LEASE_TIME),
            renewal_time: ack.options.get_u32(option::RENEWAL_TIME),
            rebinding_time: ack.options.get_u32(option::REBINDING_TIME),
            interface: interface.to_string(),
            server_mac,
            obtained: Utc::now(),
        })
    }

    pub fn default_gateway(&self) -> Option<Ipv4Addr> {
        self.routers.first().copied()
    }

    /// RFC 2132 section 9.2: a lease/renewal/rebinding time of `0xFFFFFFFF`
    /// on the wire means "infinite", distinct from the option being absent.
    const INFINITE: u32 = u32::MAX;

    fn seconds_til(&self, value: u32) -> f64 {
        (self.obtained + chrono::Duration::seconds(value as i64) - Utc::now()).num_milliseconds() as f64 / 1000.0
    }

    /// Seconds before the lease expires. `Ok(None)` means the server granted
    /// an infinite lease (option 51 == `0xFFFFFFFF`); `Err` means the ACK
    /// didn't carry a lease time at all, which this client cannot assume a
    /// default for and treats as a protocol violation, matching `leases.py`
    /// letting a missing lease time raise uncaught here (unlike
    /// `renewal_in`/`rebinding_in`, which catch it for their fuzzy-fraction
    /// fallback).
    pub fn expiration_in(&self) -> Result<Option<f64>, Error> {
        match self.lease_time {
            None => Err(Error::OptionMissing("lease_time")),
            Some(Self::INFINITE) => Ok(None),
            Some(seconds) => Ok(Some(self.seconds_til(seconds))),
        }
    }

    pub fn expired(&self) -> bool {
        matches!(self.expiration_in(), Ok(Some(seconds)) if seconds <= 0.0)
    }

    /// Seconds before we should renew. Falls back to a random fraction
    /// (0.4-0.6) of the expiration window per RFC 2131 section 4.4.5 when
    /// the server didn't send an explicit renewal time; `None` if the lease
    /// (or the renewal time itself) is infinite, or if there's no
    /// expiration window to fall back to either.
    pub fn renewal_in(&self) -> Option<f64> {
        match self.renewal_time {
            Some(Self::INFINITE) => None,
            Some(seconds) => Some(self.seconds_til(seconds)),
            None => match self.expiration_in() {
                Ok(Some(exp)) => Some(exp * rand::thread_rng().gen_range(0.4..0.6)),
                Ok(None) | Err(_) => None,
            },
        }
    }

    /// Seconds before we should rebind. Falls back to a random fraction
    /// (0.75-0.90) of the expiration window when unset, with the same
    /// infinite/missing handling as `renewal_in`.
    pub fn rebinding_in(&self) -> Option<f64> {
        match self.rebinding_time {
            Some(Self::INFINITE) => None,
            Some(seconds) => Some(self.seconds_til(seconds)),
            None => match self.expiration_in() {
                Ok(Some(exp)) => Some(exp * rand::thread_rng().gen_range(0.75..0.90)),
                Ok(None) | Err(_) => None,
            },
        }
    }
}

/// Where a bound lease should be written, mirroring `leases.py`'s two
/// concrete sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseSink {
    /// Log the lease as JSON at info level; never persisted.
    Stdout,
    /// Read/write `<interface>.lease.json` in the given directory.
    File,
}

impl LeaseSink {
    pub fn dump(self, lease: &Lease, directory: &Path) -> Result<(), Error> {
        match self {
            LeaseSink::Stdout => {
                let json = serde_json::to_string_pretty(lease)
                    .map_err(|e| Error::ProtocolError(format!("failed to serialize lease: {e}")))?;
                log::info!("new lease:\n{json}");
                Ok(())
            }
            LeaseSink::File => {
                let path = lease_path(directory, &lease.interface);
                log::info!("writing lease for {} to {}", lease.interface, path.display());
                let json = serde_json::to_string_pretty(lease)
                    .map_err(|e| Error::ProtocolError(format!("failed to serialize lease: {e}")))?;
                std::fs::write(&path, json)?;
                Ok(())
            }
        }
    }

    pub fn load(self, directory: &Path, interface: &str) -> Option<Lease> {
        if self == LeaseSink::Stdout {
            return None;
        }
        let path = lease_path(directory, interface);
        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(lease) => {
                    log::info!("loaded lease for {interface} from {}", path.display());
                    Some(lease)
                }
                Err(err) => {
                    log::warn!("error loading lease from {}: {err}", path.display());
                    None
                }
            },
            Err(_) => {
                log::info!("no existing lease at {} for {interface}", path.display());
                None
            }
        }
    }
}

fn lease_path(directory: &Path, interface: &str) -> PathBuf {
    directory.join(format!("{interface}.lease.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dhcp::codec::MessageType;

    fn ack_with_lease_time(seconds: u32) -> DhcpMessage {
        let mut msg = DhcpMessage::new_request(1, MacAddress::new([0; 6]), MessageType::Ack);
        msg.yiaddr = Ipv4Addr::new(192, 168, 1, 50);
        msg.options.set(option::LEASE_TIME, seconds.to_be_bytes().to_vec());
        msg
    }

    #[test]
    fn from_ack_requires_yiaddr() {
        let msg = DhcpMessage::new_request(1, MacAddress::new([0; 6]), MessageType::Ack);
        let err = Lease::from_ack(&msg, "eth0", MacAddress::new([0; 6])).unwrap_err();
        assert!(matches!(err, Error::OptionMissing("yiaddr")));
    }

    #[test]
    fn renewal_falls_back_to_fuzzy_fraction_of_expiration() {
        let ack = ack_with_lease_time(1000);
        let lease = Lease::from_ack(&ack, "eth0", MacAddress::new([0; 6])).unwrap();
        let renewal = lease.renewal_in().unwrap();
        let expiration = lease.expiration_in().unwrap().unwrap();
        assert!(renewal > expiration * 0.35 && renewal < expiration * 0.65);
    }

    #[test]
    fn expired_is_false_for_fresh_lease() {
        let ack = ack_with_lease_time(3600);
        let lease = Lease::from_ack(&ack, "eth0", MacAddress::new([0; 6])).unwrap();
        assert!(!lease.expired());
    }

    #[test]
    fn infinite_lease_time_is_not_an_expiration_error() {
        let ack = ack_with_lease_time(u32::MAX);
        let lease = Lease::from_ack(&ack, "eth0", MacAddress::new([0; 6])).unwrap();
        assert_eq!(lease.expiration_in().unwrap(), None);
        assert!(!lease.expired());
        assert_eq!(lease.renewal_in(), None);
        assert_eq!(lease.rebinding_in(), None);
    }

    #[test]
    fn missing_lease_time_is_an_error_but_renewal_falls_back() {
        let mut msg = DhcpMessage::new_request(1, MacAddress::new([0; 6]), MessageType::Ack);
        msg.yiaddr = Ipv4Addr::new(192, 168, 1, 50);
        let lease = Lease::from_ack(&msg, "eth0", MacAddress::new([0; 6])).unwrap();
        assert!(matches!(lease.expiration_in(), Err(Error::OptionMissing("lease_time"))));
        assert_eq!(lease.renewal_in(), None);
        assert_eq!(lease.rebinding_in(), None);
    }
}
