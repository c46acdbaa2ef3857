//! CAN Bus Simulation Library
//!
//! This crate provides a simulated CAN interface for exercising the pipeline
//! without hardware. It includes:
//!
//! - **VirtualBus**: an in-memory [`CanDriver`](can_frame::CanDriver) with up
//!   to four channels, optional loopback and fault injection
//! - **SimNode**: a simulated participant broadcasting a frame on a period
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use can_frame::{Bitrate, BusConfig, CanDriver};
//! use can_sim::{SimNodeConfig, VirtualBus, VirtualBusConfig};
//!
//! let bus = VirtualBus::new(VirtualBusConfig {
//!     loopback: false,
//!     nodes: SimNodeConfig::demo_nodes(),
//! })
//! .unwrap();
//!
//! let handle = bus.open(1).unwrap();
//! bus.configure(handle, &BusConfig::classic(Bitrate::Kbps500)).unwrap();
//!
//! // The engine node fires every 100 ms
//! let frame = bus.receive(handle, Duration::from_secs(1)).unwrap();
//! assert!(frame.is_some());
//! ```

pub mod bus;
pub mod node;

pub use bus::{VirtualBus, VirtualBusConfig};
pub use node::{PayloadPattern, SimConfigError, SimNode, SimNodeConfig};
