mod common;

use common::{Harness, msg};
use emvlcb::config::Layout;
use emvlcb::core::opcodes;
use emvlcb::service::{CanService, MinimumNodeService, NodeVariableService, Service};
use emvlcb::time::Duration;

const NN: u16 = 0x0104;

fn node() -> Harness {
    let services: [Service<'static>; 3] = [
        MinimumNodeService::new().into(),
        CanService::new().into(),
        NodeVariableService::new().into(),
    ];
    let mut harness = Harness::normal(NN, Layout::new(4, 8, 2), services);
    harness.node.config_mut().set_heartbeat(false);
    harness
}

#[test]
fn test_out_of_range_write_is_rejected() {
    let mut harness = node();
    let sent = harness.exchange(&msg(opcodes::NVSET, NN, &[7, 99]));
    assert_eq!(
        sent,
        [
            msg(opcodes::CMDERR, NN, &[10]),
            msg(opcodes::GRSP, NN, &[opcodes::NVSET, 2, 10]),
        ]
    );
    for index in 1..=4 {
        assert_eq!(harness.node.config().read_node_variable(index), 0);
    }

    let sent = harness.exchange(&msg(opcodes::NVSET, NN, &[0, 99]));
    assert_eq!(sent[0], msg(opcodes::CMDERR, NN, &[10]));
}

#[test]
fn test_write_and_read() {
    let mut harness = node();
    let sent = harness.exchange(&msg(opcodes::NVSET, NN, &[2, 55]));
    assert_eq!(sent, [msg(opcodes::WRACK, NN, &[])]);
    assert_eq!(harness.node.config().read_node_variable(2), 55);

    let sent = harness.exchange(&msg(opcodes::NVRD, NN, &[2]));
    assert_eq!(sent, [msg(opcodes::NVANS, NN, &[2, 55])]);

    let sent = harness.exchange(&msg(opcodes::NVSETRD, NN, &[3, 9]));
    assert_eq!(sent, [msg(opcodes::NVANS, NN, &[3, 9])]);

    let sent = harness.exchange(&msg(opcodes::NVRD, NN, &[5]));
    assert_eq!(
        sent,
        [
            msg(opcodes::CMDERR, NN, &[10]),
            msg(opcodes::GRSP, NN, &[opcodes::NVRD, 2, 10]),
        ]
    );
}

#[test]
fn test_read_all_is_paced() {
    let mut harness = node();
    harness.node.config_mut().write_node_variable(4, 0xaa);

    harness.inject(&msg(opcodes::NVRD, NN, &[0]));
    harness.run_for(Duration::from_millis(5));
    assert_eq!(
        harness.sent(),
        [msg(opcodes::NVANS, NN, &[0, 4]), msg(opcodes::NVANS, NN, &[1, 0])]
    );

    harness.run_for(Duration::from_millis(40));
    assert_eq!(
        harness.sent(),
        [
            msg(opcodes::NVANS, NN, &[2, 0]),
            msg(opcodes::NVANS, NN, &[3, 0]),
            msg(opcodes::NVANS, NN, &[4, 0xaa]),
        ]
    );
}

#[test]
fn test_other_nodes_are_ignored() {
    let mut harness = node();
    assert!(harness.exchange(&msg(opcodes::NVSET, NN + 1, &[1, 1])).is_empty());
    assert_eq!(harness.node.config().read_node_variable(1), 0);
}
