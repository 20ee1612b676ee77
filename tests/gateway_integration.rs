//! End-to-end exercise of the ingress pipeline: feed a scripted byte
//! stream (with arbitrary chunk boundaries, the way bytes actually
//! arrive off a serial device) through the public API and check the
//! decoded events and projected state it produces.

use dart_gateway::events::{EventBus, GatewayEvent};
use dart_gateway::{DecodedTransaction, ProtocolEngine};

fn crc_frame(address: u8, control: u8, body: &[u8]) -> Vec<u8> {
    let mut header = vec![address, control];
    header.extend_from_slice(body);
    let crc = dart_gateway::crc::crc16_ccitt(&header);
    let (hi, lo) = dart_gateway::crc::split_be(crc);
    header.push(hi);
    header.push(lo);
    header.push(0x03);
    header.push(0xFA);
    header
}

/// DC1 + out-of-range DC3 in the same frame. Only the DC1 is ever
/// surfaced; structural decode still runs both transactions but the
/// price-range clamp drops the DC3.
#[test]
fn dc1_plus_out_of_range_dc3_surfaces_only_status() {
    // DC1(status=2, AUTHORIZED) + DC3(price way above [0.5,10.0]).
    let body = [0x01, 0x01, 0x02, 0x03, 0x04, 0x03, 0x04, 0x00, 0x13];
    let frame = crc_frame(0x50, 0x36, &body);

    let bus = EventBus::new();
    let mut rx = bus.subscribe();
    let mut engine = ProtocolEngine::new(bus);

    // Feed it one byte at a time, as a real serial read loop would.
    for &b in &frame {
        engine.process_inbound(&[b]);
    }

    let mut pump_messages = Vec::new();
    while let Ok(evt) = rx.try_recv() {
        if let GatewayEvent::PumpMessage { transaction, .. } = evt {
            pump_messages.push(transaction);
        }
    }
    assert_eq!(pump_messages, vec![DecodedTransaction::Status(2)]);
    assert_eq!(engine.projector().get(0x50).unwrap().status, 2);
}

/// A single frame delivered in byte-at-a-time chunks yields exactly one
/// extracted, decoded frame and no leftover remainder.
#[test]
fn byte_split_ingress_yields_one_decode() {
    let frame = crc_frame(0x51, 0x00, &[0x01, 0x01, 0x05]);

    let bus = EventBus::new();
    let mut rx = bus.subscribe();
    let mut engine = ProtocolEngine::new(bus);

    for &b in &frame {
        engine.process_inbound(&[b]);
    }

    let mut statuses = Vec::new();
    while let Ok(evt) = rx.try_recv() {
        if let GatewayEvent::PumpMessage {
            transaction: DecodedTransaction::Status(s),
            address,
            ..
        } = evt
        {
            statuses.push((address, s));
        }
    }
    assert_eq!(statuses, vec![(0x51, 5)]);
}

/// Heartbeat traffic interleaved with a real frame: the heartbeat must
/// never surface as a pump_message, and must not corrupt reassembly of
/// the frame that follows it.
#[test]
fn heartbeat_interleaved_with_real_frame() {
    let mut stream = vec![0x50, 0x20, 0xFA]; // heartbeat
    stream.extend(crc_frame(0x50, 0x34, &[0x01, 0x01, 0x06])); // AUTHORIZE status

    let bus = EventBus::new();
    let mut rx = bus.subscribe();
    let mut engine = ProtocolEngine::new(bus);
    engine.process_inbound(&stream);

    let mut pump_messages = Vec::new();
    while let Ok(evt) = rx.try_recv() {
        if matches!(evt, GatewayEvent::PumpMessage { .. }) {
            pump_messages.push(evt);
        }
    }
    assert_eq!(pump_messages.len(), 1);
}

/// Anti-flap convergence end-to-end: idle alternation
/// between status 0 and 5 across several frames converges to 5 and
/// stays there.
#[test]
fn idle_alternation_converges_through_the_full_pipeline() {
    let bus = EventBus::new();
    let mut engine = ProtocolEngine::new(bus);
    for &s in &[0u8, 5, 0, 5, 0, 5] {
        let frame = crc_frame(0x52, 0x00, &[0x01, 0x01, s]);
        engine.process_inbound(&frame);
    }
    assert_eq!(engine.projector().get(0x52).unwrap().status, 5);
}
