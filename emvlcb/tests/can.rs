mod common;

use common::{Harness, OWN_ADDRESS, PEER_ADDRESS, msg};
use emvlcb::config::Layout;
use emvlcb::core::{BusAddress, opcodes};
use emvlcb::frame::{Data, Frame, Header, Id};
use emvlcb::service::{CanService, MinimumNodeService, Service};
use emvlcb::time::Duration;

fn services() -> [Service<'static>; 2] {
    [MinimumNodeService::new().into(), CanService::new().into()]
}

fn normal_node() -> Harness {
    let mut harness = Harness::normal(300, Layout::new(4, 8, 2), services());
    harness.node.config_mut().set_heartbeat(false);
    harness
}

fn answer(harness: &mut Harness, address: u8) {
    let header = Header::new(BusAddress::new(address).unwrap());
    harness
        .driver
        .push_received(Frame::new(header, Data::default()))
        .unwrap();
}

#[test]
fn test_enumeration_claims_lowest_free_address() {
    let mut harness = normal_node();
    harness.inject(&msg(opcodes::ENUM, 300, &[]));
    harness.run_for(Duration::from_millis(5));

    let frames = harness.frames();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].remote);
    assert_eq!(frames[0].header().unwrap().address.into_u8(), OWN_ADDRESS);

    for address in [1, 2, 4] {
        answer(&mut harness, address);
    }
    harness.run_for(Duration::from_millis(100));

    assert_eq!(harness.node.config().bus_address().into_u8(), 3);
    // Peer-requested enumerations are acknowledged
    assert_eq!(harness.sent(), [msg(opcodes::NNACK, 300, &[])]);
}

#[test]
fn test_enumeration_is_not_reentrant() {
    let mut harness = normal_node();
    harness.inject(&msg(opcodes::ENUM, 300, &[]));
    harness.run_for(Duration::from_millis(5));
    harness.inject(&msg(opcodes::ENUM, 300, &[]));
    harness.run_for(Duration::from_millis(5));

    let requests = harness.frames().iter().filter(|frame| frame.remote).count();
    assert_eq!(requests, 1);
}

#[test]
fn test_second_request_joins_running_enumeration() {
    let mut harness = normal_node();
    harness.inject(&msg(opcodes::ENUM, 300, &[]));
    harness.run_for(Duration::from_millis(30));
    answer(&mut harness, 1);
    harness.run_for(Duration::from_millis(20));

    harness.inject(&msg(opcodes::ENUM, 300, &[]));
    harness.run_for(Duration::from_millis(10));
    answer(&mut harness, 2);

    // Window still counts from the first request and both answers are kept
    harness.run_for(Duration::from_millis(45));
    assert_eq!(harness.node.config().bus_address().into_u8(), 3);
    let requests = harness.frames().iter().filter(|frame| frame.remote).count();
    assert_eq!(requests, 1);
}

#[test]
fn test_remote_request_is_answered() {
    let mut harness = normal_node();
    harness
        .driver
        .push_received(Frame::new_remote(Header::new(
            BusAddress::new(PEER_ADDRESS).unwrap(),
        )))
        .unwrap();
    harness.run_for(Duration::from_millis(5));

    let frames = harness.frames();
    assert_eq!(frames.len(), 1);
    assert!(!frames[0].remote);
    assert!(frames[0].data.is_empty());
    assert_eq!(frames[0].header().unwrap().address.into_u8(), OWN_ADDRESS);
}

#[test]
fn test_unassigned_node_does_not_answer_remote_request() {
    let mut harness = Harness::new(Layout::new(4, 8, 2), services());
    harness
        .driver
        .push_received(Frame::new_remote(Header::new(
            BusAddress::new(PEER_ADDRESS).unwrap(),
        )))
        .unwrap();
    harness.run_for(Duration::from_millis(5));
    assert!(harness.frames().is_empty());
}

#[test]
fn test_address_conflict_triggers_enumeration() {
    let mut harness = normal_node();
    harness.inject_from(OWN_ADDRESS, &[opcodes::ACON, 0, 1, 0, 2]);
    harness.run_for(Duration::from_millis(5));

    let frames = harness.frames();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].remote);

    harness.run_for(Duration::from_millis(100));
    assert_eq!(harness.node.config().bus_address().into_u8(), 1);
    assert!(harness.sent().is_empty());
}

#[test]
fn test_extended_frames_are_ignored() {
    let mut harness = normal_node();
    let frame = Frame {
        id: Id::Extended(0x1234),
        remote: false,
        data: Data::new(&[opcodes::QNN]).unwrap(),
    };
    harness.driver.push_received(frame).unwrap();
    harness.run_for(Duration::from_millis(20));
    assert!(harness.frames().is_empty());
}

#[test]
fn test_set_bus_address() {
    let mut harness = normal_node();
    let sent = harness.exchange(&msg(opcodes::CANID, 300, &[42]));
    assert_eq!(
        sent,
        [
            msg(opcodes::WRACK, 300, &[]),
            msg(opcodes::GRSP, 300, &[opcodes::CANID, 3, 0]),
        ]
    );
    assert_eq!(harness.node.config().bus_address().into_u8(), 42);

    let sent = harness.exchange(&msg(opcodes::CANID, 300, &[100]));
    assert_eq!(
        sent,
        [
            msg(opcodes::CMDERR, 300, &[7]),
            msg(opcodes::GRSP, 300, &[opcodes::CANID, 3, 0xfb]),
        ]
    );
    assert_eq!(harness.node.config().bus_address().into_u8(), 42);
}
