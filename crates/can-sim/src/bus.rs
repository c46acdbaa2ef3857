//! In-memory CAN bus implementing the driver contract
//!
//! Each opened channel has an inbox of frames waiting to be received and its
//! own set of simulated nodes. `receive` hands out injected frames first, then
//! any node whose period has elapsed, and otherwise sleeps on a condition
//! variable until something is due or the timeout expires.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use can_frame::{
    validate_channel, BusConfig, CanDriver, ChannelHandle, Direction, DriverError, Frame,
    Timestamp,
};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::node::{SimConfigError, SimNode, SimNodeConfig};

/// Virtual bus settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualBusConfig {
    /// Echo sent frames back as received traffic
    #[serde(default)]
    pub loopback: bool,
    /// Nodes started on every opened channel
    #[serde(default)]
    pub nodes: Vec<SimNodeConfig>,
}

#[derive(Debug)]
struct ChannelState {
    bus: Option<BusConfig>,
    inbox: VecDeque<Frame>,
    nodes: Vec<SimNode>,
    fail_send: Option<DriverError>,
    fail_receive: Option<DriverError>,
}

#[derive(Debug, Default)]
struct BusState {
    channels: HashMap<u8, ChannelState>,
    sent: Vec<Frame>,
}

/// Simulated multi-channel CAN interface
#[derive(Debug)]
pub struct VirtualBus {
    config: VirtualBusConfig,
    state: Mutex<BusState>,
    wake: Condvar,
    origin: Instant,
}

impl VirtualBus {
    /// Create a bus with the given settings
    pub fn new(config: VirtualBusConfig) -> Result<Self, SimConfigError> {
        for node in &config.nodes {
            node.validate()?;
        }
        Ok(Self {
            config,
            state: Mutex::new(BusState::default()),
            wake: Condvar::new(),
            origin: Instant::now(),
        })
    }

    /// Bus with no nodes and no loopback
    pub fn quiet() -> Self {
        Self {
            config: VirtualBusConfig::default(),
            state: Mutex::new(BusState::default()),
            wake: Condvar::new(),
            origin: Instant::now(),
        }
    }

    fn now(&self) -> Timestamp {
        Timestamp::from_micros(self.origin.elapsed().as_micros() as u64)
    }

    /// Queue a frame for the next `receive` on `channel`
    ///
    /// Returns false when the channel is not open.
    pub fn inject(&self, channel: u8, frame: Frame) -> bool {
        let mut state = self.state.lock();
        let Some(ch) = state.channels.get_mut(&channel) else {
            return false;
        };
        ch.inbox.push_back(frame);
        self.wake.notify_all();
        true
    }

    /// Make the next send on `channel` fail with `error`
    pub fn fail_next_send(&self, channel: u8, error: DriverError) -> bool {
        let mut state = self.state.lock();
        match state.channels.get_mut(&channel) {
            Some(ch) => {
                ch.fail_send = Some(error);
                true
            }
            None => false,
        }
    }

    /// Make the next receive on `channel` fail with `error`
    pub fn fail_receive(&self, channel: u8, error: DriverError) -> bool {
        let mut state = self.state.lock();
        match state.channels.get_mut(&channel) {
            Some(ch) => {
                ch.fail_receive = Some(error);
                self.wake.notify_all();
                true
            }
            None => false,
        }
    }

    /// Every frame accepted by `send`, in order
    pub fn sent_frames(&self) -> Vec<Frame> {
        self.state.lock().sent.clone()
    }

    /// Whether `channel` is open
    pub fn is_open(&self, channel: u8) -> bool {
        self.state.lock().channels.contains_key(&channel)
    }

    /// Bus configuration applied to `channel`
    pub fn bus_config(&self, channel: u8) -> Option<BusConfig> {
        self.state
            .lock()
            .channels
            .get(&channel)
            .and_then(|ch| ch.bus)
    }
}

impl CanDriver for VirtualBus {
    fn open(&self, channel: u8) -> Result<ChannelHandle, DriverError> {
        validate_channel(channel)?;
        let mut state = self.state.lock();
        if state.channels.contains_key(&channel) {
            return Err(DriverError::ChannelUnavailable(channel));
        }

        let now = Instant::now();
        let nodes = self
            .config
            .nodes
            .iter()
            .cloned()
            .map(|node| SimNode::new(node, now))
            .collect();
        state.channels.insert(
            channel,
            ChannelState {
                bus: None,
                inbox: VecDeque::new(),
                nodes,
                fail_send: None,
                fail_receive: None,
            },
        );

        info!("Virtual channel {} opened", channel);
        Ok(ChannelHandle(channel))
    }

    fn configure(&self, handle: ChannelHandle, config: &BusConfig) -> Result<(), DriverError> {
        if config.fd != config.fd_bitrate.is_some() {
            return Err(DriverError::Config(
                "data bitrate must be set exactly when FD is enabled".into(),
            ));
        }

        let mut state = self.state.lock();
        let ch = state
            .channels
            .get_mut(&handle.channel())
            .ok_or(DriverError::NotOpen)?;
        ch.bus = Some(*config);
        debug!(
            "Virtual channel {} configured at {} (fd: {})",
            handle.channel(),
            config.bitrate,
            config.fd
        );
        Ok(())
    }

    fn send(&self, handle: ChannelHandle, frame: &Frame) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        let ch = state
            .channels
            .get_mut(&handle.channel())
            .ok_or(DriverError::NotOpen)?;

        if let Some(error) = ch.fail_send.take() {
            warn!("Virtual channel {} send fault: {}", handle.channel(), error);
            return Err(error);
        }
        let bus = ch
            .bus
            .ok_or_else(|| DriverError::Config("channel not configured".into()))?;
        if frame.is_fd() && !bus.fd {
            return Err(DriverError::Hardware("FD frame on a classic CAN bus".into()));
        }

        if self.config.loopback {
            let echo = Frame::new(
                frame.id(),
                frame.data().to_vec(),
                frame.flags(),
                Direction::Rx,
                self.now(),
            );
            if let Ok(echo) = echo {
                ch.inbox.push_back(echo);
                self.wake.notify_all();
            }
        }

        state.sent.push(frame.clone());
        Ok(())
    }

    fn receive(
        &self,
        handle: ChannelHandle,
        timeout: Duration,
    ) -> Result<Option<Frame>, DriverError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();

        loop {
            let now = Instant::now();
            let timestamp = self.now();
            let ch = state
                .channels
                .get_mut(&handle.channel())
                .ok_or(DriverError::NotOpen)?;

            if let Some(error) = ch.fail_receive.take() {
                warn!("Virtual channel {} receive fault: {}", handle.channel(), error);
                return Err(error);
            }
            if let Some(frame) = ch.inbox.pop_front() {
                return Ok(Some(frame));
            }
            if let Some(node) = ch
                .nodes
                .iter_mut()
                .filter(|node| node.is_due(now))
                .min_by_key(|node| node.next_due())
            {
                return Ok(Some(node.emit(timestamp)));
            }

            if now >= deadline {
                return Ok(None);
            }
            let wake_at = ch
                .nodes
                .iter()
                .map(SimNode::next_due)
                .min()
                .map_or(deadline, |due| due.min(deadline));
            self.wake.wait_until(&mut state, wake_at);
        }
    }

    fn close(&self, handle: ChannelHandle) {
        let mut state = self.state.lock();
        if state.channels.remove(&handle.channel()).is_some() {
            info!("Virtual channel {} closed", handle.channel());
        }
        self.wake.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::PayloadPattern;
    use can_frame::{Bitrate, CanId, FdBitrate, FrameFlags, FrameTemplate};

    fn frame(id: u32, data: &[u8], flags: FrameFlags) -> Frame {
        Frame::new(
            CanId::standard(id).unwrap(),
            data.to_vec(),
            flags,
            Direction::Tx,
            Timestamp::default(),
        )
        .unwrap()
    }

    fn open_classic(bus: &VirtualBus, channel: u8) -> ChannelHandle {
        let handle = bus.open(channel).unwrap();
        bus.configure(handle, &BusConfig::classic(Bitrate::Kbps500))
            .unwrap();
        handle
    }

    #[test]
    fn test_open_validates_channel() {
        let bus = VirtualBus::quiet();
        assert_eq!(bus.open(0), Err(DriverError::ChannelUnavailable(0)));
        assert_eq!(bus.open(5), Err(DriverError::ChannelUnavailable(5)));

        bus.open(1).unwrap();
        assert_eq!(bus.open(1), Err(DriverError::ChannelUnavailable(1)));
        assert!(bus.is_open(1));
    }

    #[test]
    fn test_configure_checks_fd_rates() {
        let bus = VirtualBus::quiet();
        let handle = bus.open(2).unwrap();

        let bad = BusConfig {
            bitrate: Bitrate::Kbps500,
            fd: true,
            fd_bitrate: None,
        };
        assert!(matches!(bus.configure(handle, &bad), Err(DriverError::Config(_))));

        let fd = BusConfig::fd(Bitrate::Kbps500, FdBitrate::Mbps2);
        bus.configure(handle, &fd).unwrap();
        assert_eq!(bus.bus_config(2), Some(fd));

        bus.close(handle);
        assert_eq!(bus.configure(handle, &fd), Err(DriverError::NotOpen));
    }

    #[test]
    fn test_send_records_and_rejects_fd_on_classic() {
        let bus = VirtualBus::quiet();
        let handle = open_classic(&bus, 1);

        bus.send(handle, &frame(0x100, &[1, 2], FrameFlags::CLASSIC))
            .unwrap();
        assert!(matches!(
            bus.send(handle, &frame(0x100, &[0; 12], FrameFlags::FD)),
            Err(DriverError::Hardware(_))
        ));
        assert_eq!(bus.sent_frames().len(), 1);
    }

    #[test]
    fn test_injected_frames_come_first() {
        let bus = VirtualBus::quiet();
        let handle = open_classic(&bus, 1);

        assert!(bus.inject(1, frame(0x200, &[9], FrameFlags::CLASSIC)));
        assert!(!bus.inject(3, frame(0x200, &[9], FrameFlags::CLASSIC)));

        let received = bus.receive(handle, Duration::from_millis(10)).unwrap();
        assert_eq!(received.unwrap().id().raw(), 0x200);
        assert_eq!(bus.receive(handle, Duration::from_millis(10)).unwrap(), None);
    }

    #[test]
    fn test_loopback_echoes_as_rx() {
        let bus = VirtualBus::new(VirtualBusConfig {
            loopback: true,
            nodes: Vec::new(),
        })
        .unwrap();
        let handle = open_classic(&bus, 1);

        bus.send(handle, &frame(0x321, &[7], FrameFlags::CLASSIC))
            .unwrap();
        let echo = bus
            .receive(handle, Duration::from_millis(10))
            .unwrap()
            .unwrap();
        assert_eq!(echo.direction(), Direction::Rx);
        assert_eq!(echo.data(), &[7]);
    }

    #[test]
    fn test_nodes_emit_on_their_period() {
        let template =
            FrameTemplate::new(CanId::standard(0x0C0).unwrap(), vec![0], FrameFlags::CLASSIC)
                .unwrap();
        let bus = VirtualBus::new(VirtualBusConfig {
            loopback: false,
            nodes: vec![SimNodeConfig {
                name: "engine".into(),
                template,
                period_ms: 5,
                pattern: PayloadPattern::Counter { index: 0 },
            }],
        })
        .unwrap();
        let handle = open_classic(&bus, 1);

        let first = bus.receive(handle, Duration::from_secs(1)).unwrap().unwrap();
        let second = bus.receive(handle, Duration::from_secs(1)).unwrap().unwrap();
        assert_eq!(first.data(), &[0]);
        assert_eq!(second.data(), &[1]);
        assert_eq!(first.direction(), Direction::Rx);
    }

    #[test]
    fn test_fault_injection() {
        let bus = VirtualBus::quiet();
        let handle = open_classic(&bus, 1);

        assert!(bus.fail_next_send(1, DriverError::Hardware("bus-off".into())));
        assert_eq!(
            bus.send(handle, &frame(0x1, &[], FrameFlags::CLASSIC)),
            Err(DriverError::Hardware("bus-off".into()))
        );
        // One-shot
        bus.send(handle, &frame(0x1, &[], FrameFlags::CLASSIC))
            .unwrap();

        bus.fail_receive(1, DriverError::Io("unplugged".into()));
        assert_eq!(
            bus.receive(handle, Duration::from_millis(10)),
            Err(DriverError::Io("unplugged".into()))
        );
    }

    #[test]
    fn test_close_wakes_receiver() {
        let bus = std::sync::Arc::new(VirtualBus::quiet());
        let handle = open_classic(&bus, 1);

        let reader = {
            let bus = bus.clone();
            std::thread::spawn(move || bus.receive(handle, Duration::from_secs(5)))
        };
        std::thread::sleep(Duration::from_millis(20));
        bus.close(handle);

        assert_eq!(reader.join().unwrap(), Err(DriverError::NotOpen));
    }

    #[test]
    fn test_zero_period_node_rejected() {
        let template =
            FrameTemplate::new(CanId::standard(0x10).unwrap(), vec![], FrameFlags::CLASSIC)
                .unwrap();
        let result = VirtualBus::new(VirtualBusConfig {
            loopback: false,
            nodes: vec![SimNodeConfig {
                name: "broken".into(),
                template,
                period_ms: 0,
                pattern: PayloadPattern::Fixed,
            }],
        });
        assert!(matches!(result, Err(SimConfigError::ZeroPeriod(_))));
    }
}
