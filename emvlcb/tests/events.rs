mod common;

use common::{Harness, msg};
use emvlcb::config::Layout;
use emvlcb::core::opcodes;
use emvlcb::node::ServiceError;
use emvlcb::params;
use emvlcb::service::{
    CanService, EventAckService, EventConsumerService, EventProducerService,
    EventTeachingService, MinimumNodeService, ProduceError, Service,
};
use emvlcb::time::Duration;

const NN: u16 = 0x0104;
const TEACHING: u8 = 4;

fn node_with(layout: Layout, consumer: EventConsumerService) -> Harness {
    let services: [Service<'static>; 6] = [
        MinimumNodeService::new().into(),
        CanService::new().into(),
        EventTeachingService::new().into(),
        consumer.into(),
        EventProducerService::new().into(),
        EventAckService::new().into(),
    ];
    let mut harness = Harness::normal(NN, layout, services);
    harness.node.config_mut().set_heartbeat(false);
    harness
}

fn node() -> Harness {
    node_with(Layout::new(4, 8, 2), EventConsumerService::new())
}

/// EVLRN args: event node number, event number, variable index, value
fn evlrn(node_number: u16, event_number: u16, index: u8, value: u8) -> Vec<u8> {
    let [en_hi, en_lo] = event_number.to_be_bytes();
    msg(opcodes::EVLRN, node_number, &[en_hi, en_lo, index, value])
}

fn event(opcode: u8, node_number: u16, event_number: u16, data: &[u8]) -> Vec<u8> {
    let [en_hi, en_lo] = event_number.to_be_bytes();
    let mut args = vec![en_hi, en_lo];
    args.extend_from_slice(data);
    msg(opcode, node_number, &args)
}

fn teach(harness: &mut Harness, node_number: u16, event_number: u16, index: u8, value: u8) {
    harness.exchange(&msg(opcodes::NNLRN, NN, &[]));
    let sent = harness.exchange(&evlrn(node_number, event_number, index, value));
    assert_eq!(sent[0], msg(opcodes::WRACK, NN, &[]));
    harness.exchange(&msg(opcodes::NNULN, NN, &[]));
}

#[test]
fn test_teach_and_read_back() {
    let mut harness = node();
    assert!(harness.exchange(&msg(opcodes::NNLRN, NN, &[])).is_empty());
    assert!(harness.node.config().learn());

    let sent = harness.exchange(&evlrn(5, 6, 1, 42));
    assert_eq!(
        sent,
        [
            msg(opcodes::WRACK, NN, &[]),
            msg(opcodes::GRSP, NN, &[opcodes::EVLRN, TEACHING, 0]),
        ]
    );

    let sent = harness.exchange(&event(opcodes::REQEV, 5, 6, &[1]));
    assert_eq!(sent, [event(opcodes::EVANS, 5, 6, &[1, 42])]);

    // Other variables of a new event start cleared
    let sent = harness.exchange(&event(opcodes::REQEV, 5, 6, &[2]));
    assert_eq!(sent, [event(opcodes::EVANS, 5, 6, &[2, 0])]);

    let sent = harness.exchange(&event(opcodes::REQEV, 5, 6, &[0]));
    assert_eq!(
        sent,
        [
            event(opcodes::EVANS, 5, 6, &[0, 2]),
            event(opcodes::EVANS, 5, 6, &[1, 42]),
            event(opcodes::EVANS, 5, 6, &[2, 0]),
        ]
    );
}

#[test]
fn test_learning_requires_learn_mode() {
    let mut harness = node();
    assert!(harness.exchange(&evlrn(5, 6, 1, 42)).is_empty());
    assert_eq!(harness.node.config().stored_event_count(), 0);
    // Event-addressed requests are ignored outside learn mode
    assert!(harness.exchange(&event(opcodes::EVULN, 5, 6, &[])).is_empty());
    assert!(harness.exchange(&event(opcodes::REQEV, 5, 6, &[1])).is_empty());

    let sent = harness.exchange(&msg(opcodes::NNCLR, NN, &[]));
    assert_eq!(
        sent,
        [
            msg(opcodes::CMDERR, NN, &[2]),
            msg(opcodes::GRSP, NN, &[opcodes::NNCLR, TEACHING, 2]),
        ]
    );
}

#[test]
fn test_learn_mode_transitions() {
    let mut harness = node();
    harness.exchange(&msg(opcodes::MODE, NN, &[0x08]));
    assert!(harness.node.config().learn());
    harness.exchange(&msg(opcodes::MODE, NN, &[0x09]));
    assert!(!harness.node.config().learn());

    harness.exchange(&msg(opcodes::NNLRN, NN, &[]));
    assert!(harness.node.config().learn());
    // Another node entering learn mode takes over
    harness.exchange(&msg(opcodes::NNLRN, NN + 1, &[]));
    assert!(!harness.node.config().learn());
}

#[test]
fn test_learn_errors() {
    let mut harness = node_with(Layout::new(4, 2, 2), EventConsumerService::new());
    harness.exchange(&msg(opcodes::NNLRN, NN, &[]));

    let sent = harness.exchange(&evlrn(5, 6, 3, 1));
    assert_eq!(
        sent,
        [
            msg(opcodes::CMDERR, NN, &[6]),
            msg(opcodes::GRSP, NN, &[opcodes::EVLRN, TEACHING, 6]),
        ]
    );

    harness.exchange(&evlrn(5, 1, 1, 1));
    harness.exchange(&evlrn(5, 2, 1, 1));
    // Updating a learned event needs no free slot
    let sent = harness.exchange(&evlrn(5, 2, 2, 7));
    assert_eq!(sent[0], msg(opcodes::WRACK, NN, &[]));

    let sent = harness.exchange(&evlrn(5, 3, 1, 1));
    assert_eq!(
        sent,
        [
            msg(opcodes::CMDERR, NN, &[4]),
            msg(opcodes::GRSP, NN, &[opcodes::EVLRN, TEACHING, 4]),
        ]
    );
}

#[test]
fn test_unlearn() {
    let mut harness = node();
    harness.exchange(&msg(opcodes::NNLRN, NN, &[]));
    harness.exchange(&evlrn(5, 6, 1, 42));

    let sent = harness.exchange(&event(opcodes::EVULN, 5, 6, &[]));
    assert_eq!(
        sent,
        [
            msg(opcodes::WRACK, NN, &[]),
            msg(opcodes::GRSP, NN, &[opcodes::EVULN, TEACHING, 0]),
        ]
    );
    assert_eq!(harness.node.config().stored_event_count(), 0);

    let sent = harness.exchange(&event(opcodes::EVULN, 5, 6, &[]));
    assert_eq!(
        sent,
        [
            msg(opcodes::CMDERR, NN, &[5]),
            msg(opcodes::GRSP, NN, &[opcodes::EVULN, TEACHING, 5]),
        ]
    );
}

#[test]
fn test_table_queries() {
    let mut harness = node();
    harness.exchange(&msg(opcodes::NNLRN, NN, &[]));
    harness.exchange(&evlrn(5, 1, 1, 11));
    harness.exchange(&evlrn(5, 2, 1, 12));
    harness.exchange(&evlrn(5, 3, 2, 13));
    harness.exchange(&event(opcodes::EVULN, 5, 2, &[]));
    harness.exchange(&msg(opcodes::NNULN, NN, &[]));

    assert_eq!(
        harness.exchange(&msg(opcodes::NNEVN, NN, &[])),
        [msg(opcodes::EVNLF, NN, &[6])]
    );
    assert_eq!(
        harness.exchange(&msg(opcodes::RQEVN, NN, &[])),
        [msg(opcodes::NUMEV, NN, &[2])]
    );

    // Free slots are skipped
    assert_eq!(
        harness.exchange(&msg(opcodes::NERD, NN, &[])),
        [
            msg(opcodes::ENRSP, NN, &[0, 5, 0, 1, 0]),
            msg(opcodes::ENRSP, NN, &[0, 5, 0, 3, 2]),
        ]
    );

    assert_eq!(
        harness.exchange(&msg(opcodes::NENRD, NN, &[2])),
        [msg(opcodes::ENRSP, NN, &[0, 5, 0, 3, 2])]
    );
    assert_eq!(
        harness.exchange(&msg(opcodes::NENRD, NN, &[1])),
        [
            msg(opcodes::CMDERR, NN, &[8]),
            msg(opcodes::GRSP, NN, &[opcodes::NENRD, TEACHING, 8]),
        ]
    );

    assert_eq!(
        harness.exchange(&msg(opcodes::REVAL, NN, &[2, 2])),
        [msg(opcodes::NEVAL, NN, &[2, 2, 13])]
    );
    assert_eq!(
        harness.exchange(&msg(opcodes::REVAL, NN, &[0, 0])),
        [
            msg(opcodes::NEVAL, NN, &[0, 0, 2]),
            msg(opcodes::NEVAL, NN, &[0, 1, 11]),
            msg(opcodes::NEVAL, NN, &[0, 2, 0]),
        ]
    );
}

#[test]
fn test_clear_all_events() {
    let mut harness = node();
    harness.exchange(&msg(opcodes::NNLRN, NN, &[]));
    harness.exchange(&evlrn(5, 1, 1, 11));
    harness.exchange(&evlrn(5, 2, 1, 12));

    let sent = harness.exchange(&msg(opcodes::NNCLR, NN, &[]));
    assert_eq!(
        sent,
        [
            msg(opcodes::WRACK, NN, &[]),
            msg(opcodes::GRSP, NN, &[opcodes::NNCLR, TEACHING, 0]),
        ]
    );
    assert_eq!(harness.node.config().free_slot_count(), 8);
}

#[test]
fn test_consumer() {
    let mut harness = node();
    teach(&mut harness, 7, 8, 1, 1);
    teach(&mut harness, 0, 9, 1, 1);

    harness.exchange(&event(opcodes::ACON, 7, 8, &[]));
    let consumed = harness.node.take_consumed_event().unwrap();
    assert_eq!(consumed.slot, 0);
    assert!(consumed.on);
    assert!(!consumed.short);
    assert_eq!(harness.node.take_consumed_event(), None);

    // Short events match events learned with node number 0
    harness.exchange(&event(opcodes::ASOF1, 33, 9, &[0x5a]));
    let consumed = harness.node.take_consumed_event().unwrap();
    assert_eq!(consumed.slot, 1);
    assert!(!consumed.on);
    assert!(consumed.short);
    assert_eq!(consumed.node_number, 33);
    assert_eq!(consumed.data(), [0x5a]);

    // Unknown events and long events from other producers are not consumed
    harness.exchange(&event(opcodes::ACON, 7, 9, &[]));
    harness.exchange(&event(opcodes::ACON, 33, 9, &[]));
    assert_eq!(harness.node.take_consumed_event(), None);
}

#[test]
fn test_producer() {
    let mut harness = node();
    teach(&mut harness, 7, 8, 1, 1);
    teach(&mut harness, 0, 9, 1, 1);

    let now = harness.now;
    harness.node.produce_event(now, 0, true, &[1, 2]).unwrap();
    harness.node.produce_event(now, 1, false, &[]).unwrap();
    harness.run_for(Duration::from_millis(10));
    assert_eq!(
        harness.sent(),
        [
            event(opcodes::ACON2, 7, 8, &[1, 2]),
            event(opcodes::ASOF, NN, 9, &[]),
        ]
    );

    assert_eq!(
        harness.node.produce_event(now, 2, true, &[]),
        Err(ServiceError::Produce(ProduceError::EmptySlot))
    );
    assert_eq!(
        harness.node.produce_event(now, 0, true, &[1, 2, 3, 4]),
        Err(ServiceError::Produce(ProduceError::TooMuchData))
    );
    // Own events are not consumed unless configured
    assert_eq!(harness.node.take_consumed_event(), None);
}

#[test]
fn test_consume_own_events() {
    let mut harness = node_with(Layout::new(4, 8, 2), EventConsumerService::with_own_events());
    let flags = harness.node.parameters().flags(emvlcb::core::Mode::Normal, false);
    assert_ne!(flags & params::flags::CONSUME_OWN_EVENTS, 0);

    teach(&mut harness, 7, 8, 1, 1);
    let now = harness.now;
    harness.node.produce_event(now, 0, true, &[]).unwrap();
    harness.run_for(Duration::from_millis(10));

    let consumed = harness.node.take_consumed_event().unwrap();
    assert_eq!((consumed.node_number, consumed.event_number), (7, 8));
}

#[test]
fn test_event_acknowledge() {
    let mut harness = node();
    teach(&mut harness, 7, 8, 1, 1);
    assert!(harness.exchange(&event(opcodes::ACON, 7, 8, &[])).is_empty());

    harness.exchange(&msg(opcodes::MODE, NN, &[0x0a]));
    assert!(harness.node.config().event_ack_enabled());
    assert_eq!(
        harness.exchange(&event(opcodes::ACON, 7, 8, &[])),
        [msg(opcodes::ENRSP, NN, &[0, 7, 0, 8, 0])]
    );

    harness.exchange(&msg(opcodes::MODE, NN, &[0x0b]));
    assert!(harness.exchange(&event(opcodes::ACOF, 7, 8, &[])).is_empty());
}

#[test]
fn test_producer_requires_registration() {
    let services: [Service<'static>; 2] =
        [MinimumNodeService::new().into(), CanService::new().into()];
    let mut harness = Harness::normal(NN, Layout::new(4, 8, 2), services);
    let now = harness.now;
    assert_eq!(
        harness.node.produce_event(now, 0, true, &[]),
        Err(ServiceError::NotRegistered)
    );
}
