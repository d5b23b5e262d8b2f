//! Deep packet inspection: turns raw frames into [`FlowEvent`]s.
//!
//! The worker drains the bounded raw-packet queue filled by the capture
//! thread, decodes L3/L4 headers, applies the L7 upgrades (HTTP host, TLS
//! SNI + JA3, DNS query), and publishes the result on the event bus.
//!
//! Parsing is strictly best-effort: a failed L7 decode aborts only the
//! upgrade, and the event is still emitted with its base protocol. Non-IP
//! frames and ICMP are dropped silently.

pub mod dns;
pub mod http;
pub mod tls;

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use log::{debug, info};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::udp::UdpPacket;
use pnet::packet::Packet;
use tokio::sync::{mpsc, watch};

use crate::bus::EventBus;
use crate::capture::RawPacket;
use crate::events::{meta, FlowEvent, Protocol};

const DNS_PORTS: [u16; 2] = [53, 5353];

/// Decode one captured frame into a flow event.
pub fn dissect(packet: &RawPacket) -> Option<FlowEvent> {
    let eth = EthernetPacket::new(&packet.data)?;
    match eth.get_ethertype() {
        EtherTypes::Ipv4 => {
            let ip = Ipv4Packet::new(eth.payload())?;
            dissect_transport(
                IpAddr::V4(ip.get_source()),
                IpAddr::V4(ip.get_destination()),
                ip.get_next_level_protocol(),
                ip.payload(),
                packet,
            )
        }
        EtherTypes::Ipv6 => {
            let ip = Ipv6Packet::new(eth.payload())?;
            dissect_transport(
                IpAddr::V6(ip.get_source()),
                IpAddr::V6(ip.get_destination()),
                ip.get_next_header(),
                ip.payload(),
                packet,
            )
        }
        _ => None,
    }
}

fn dissect_transport(
    source_ip: IpAddr,
    destination_ip: IpAddr,
    next: IpNextHeaderProtocol,
    transport: &[u8],
    packet: &RawPacket,
) -> Option<FlowEvent> {
    let mut metadata = HashMap::new();

    let (protocol, source_port, destination_port, payload_len) = match next {
        IpNextHeaderProtocols::Tcp => {
            let tcp = TcpPacket::new(transport)?;
            let payload = tcp.payload();
            let mut protocol = Protocol::Tcp;

            if tcp.get_destination() == 80 && !payload.is_empty() {
                if let Some(info) = http::inspect(payload) {
                    if let Some(host) = info.host {
                        metadata.insert(meta::HOST.to_string(), host);
                        protocol = Protocol::Http;
                    }
                    if let Some(ua) = info.user_agent {
                        metadata.insert(meta::USER_AGENT.to_string(), ua);
                    }
                }
            } else if tcp.get_destination() == 443 && !payload.is_empty() {
                protocol = Protocol::Https;
                if let Some(info) = tls::inspect(payload) {
                    if let Some(sni) = info.sni {
                        metadata.insert(meta::SNI.to_string(), sni);
                    }
                    if let Some(ja3) = info.ja3 {
                        metadata.insert(meta::JA3_HASH.to_string(), ja3);
                    }
                }
            }

            (
                protocol,
                tcp.get_source(),
                tcp.get_destination(),
                payload.len(),
            )
        }
        IpNextHeaderProtocols::Udp => {
            let udp = UdpPacket::new(transport)?;
            let payload = udp.payload();
            let mut protocol = Protocol::Udp;

            let on_dns_port = DNS_PORTS.contains(&udp.get_source())
                || DNS_PORTS.contains(&udp.get_destination());
            if on_dns_port {
                if let Some(query) = dns::query_name(payload) {
                    metadata.insert(meta::DNS_QUERY.to_string(), query);
                    protocol = Protocol::Dns;
                }
            }

            (
                protocol,
                udp.get_source(),
                udp.get_destination(),
                payload.len(),
            )
        }
        // ICMP and anything else is out of scope.
        _ => return None,
    };

    Some(FlowEvent {
        source_ip,
        destination_ip,
        source_port,
        destination_port,
        protocol,
        bytes_sent: payload_len as u64,
        bytes_received: 0,
        timestamp: packet.timestamp,
        metadata,
    })
}

/// Drain the raw-packet queue until it closes or shutdown is signalled,
/// publishing decoded events on the bus.
pub async fn run_worker(
    mut queue: mpsc::Receiver<RawPacket>,
    bus: Arc<EventBus<FlowEvent>>,
    topic: String,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut decoded: u64 = 0;
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            packet = queue.recv() => {
                match packet {
                    Some(packet) => {
                        if let Some(event) = dissect(&packet) {
                            decoded += 1;
                            if decoded % 50 == 0 {
                                debug!("dpi worker decoded {} flows", decoded);
                            }
                            bus.publish(&topic, event).await;
                        }
                    }
                    // Capture side is gone; nothing more will arrive.
                    None => break,
                }
            }
        }
    }
    info!("dpi worker stopped after {} flows", decoded);
}
