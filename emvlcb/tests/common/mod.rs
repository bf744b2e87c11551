#![allow(dead_code)]

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use emvlcb::config::{Layout, NodeConfig};
use emvlcb::core::{BusAddress, Mode};
use emvlcb::frame::{Data, Frame, Header};
use emvlcb::link::{DriverPort, Link};
use emvlcb::node::{Coordinator, Timing};
use emvlcb::params::ModuleInfo;
use emvlcb::service::Service;
use emvlcb::store::{RamStore, Restart};
use emvlcb::time::{Duration, Instant};
use std::boxed::Box;
use std::vec::Vec;

pub const LINK_CAPACITY: usize = 128;
pub const PEER_ADDRESS: u8 = 20;
pub const OWN_ADDRESS: u8 = 5;

pub type TestLink = Link<CriticalSectionRawMutex, LINK_CAPACITY, LINK_CAPACITY>;
pub type TestDriver = DriverPort<'static, CriticalSectionRawMutex, LINK_CAPACITY, LINK_CAPACITY>;

pub struct PanicRestart;

impl Restart for PanicRestart {
    fn restart(&mut self) -> ! {
        panic!("restart requested")
    }
}

/// Node with a formatted RAM store, driven by a simulated clock in 1 ms steps
pub struct Harness {
    pub node: Coordinator<'static>,
    pub driver: TestDriver,
    pub now: Instant,
}

impl Harness {
    pub fn new(layout: Layout, services: impl IntoIterator<Item = Service<'static>>) -> Self {
        let store = Box::leak(Box::new(RamStore::<1024>::new()));
        let link = Box::leak(Box::new(TestLink::new()));
        let (driver, port) = link.split();
        let port = Box::leak(Box::new(port));
        let restart = Box::leak(Box::new(PanicRestart));

        let mut config = NodeConfig::new(store, layout).unwrap();
        config.factory_reset();
        let mut node = Coordinator::new(
            config,
            port,
            restart,
            &ModuleInfo::default(),
            Timing::default(),
            services,
        )
        .unwrap();
        node.begin();

        Self {
            node,
            driver,
            now: Instant::from_millis(0),
        }
    }

    /// Creates a node that already owns a node number and a bus address.
    pub fn normal(
        node_number: u16,
        layout: Layout,
        services: impl IntoIterator<Item = Service<'static>>,
    ) -> Self {
        let mut harness = Self::new(layout, services);
        let config = harness.node.config_mut();
        config.set_node_number(node_number);
        config.set_bus_address(BusAddress::new(OWN_ADDRESS).unwrap());
        config.set_mode(Mode::Normal);
        harness
    }

    pub fn step(&mut self) {
        self.node.process(self.now);
        self.now += Duration::from_millis(1);
    }

    pub fn run_for(&mut self, duration: Duration) {
        let end = self.now + duration;
        while self.now < end {
            self.step();
        }
    }

    /// Queues a message from a peer node.
    pub fn inject(&mut self, bytes: &[u8]) {
        self.inject_from(PEER_ADDRESS, bytes);
    }

    pub fn inject_from(&mut self, address: u8, bytes: &[u8]) {
        let header = Header::new(BusAddress::new(address).unwrap());
        self.driver
            .push_received(Frame::new(header, Data::new(bytes).unwrap()))
            .unwrap();
    }

    /// Injects a message and lets the node settle.
    pub fn exchange(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.inject(bytes);
        self.run_for(Duration::from_millis(50));
        self.sent()
    }

    pub fn frames(&mut self) -> Vec<Frame> {
        core::iter::from_fn(|| self.driver.pop_outgoing()).collect()
    }

    /// Payloads of the data frames sent since the last call
    pub fn sent(&mut self) -> Vec<Vec<u8>> {
        self.frames()
            .into_iter()
            .filter(|frame| !frame.remote && !frame.data.is_empty())
            .map(|frame| frame.data.to_vec())
            .collect()
    }
}

/// `[opcode, nn_hi, nn_lo, args...]`
pub fn msg(opcode: u8, node_number: u16, args: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::from([opcode]);
    bytes.extend_from_slice(&node_number.to_be_bytes());
    bytes.extend_from_slice(args);
    bytes
}
