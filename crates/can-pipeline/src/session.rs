//! Driver session and blocking receive loop
//!
//! A session owns one open channel. Its receive loop runs on a dedicated OS
//! thread because `CanDriver::receive` blocks; frames and faults are handed
//! to the actor over a bounded channel tagged with the session id, so the
//! actor can ignore anything a closed session still had in flight.
//!
//! Closing a session joins the receive thread, so a later session on the same
//! channel never shares the driver with a loop from an earlier one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use can_frame::{validate_channel, BusConfig, CanDriver, ChannelHandle, DriverError, Frame};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// Back-off while the actor's receive queue is full
const FULL_QUEUE_BACKOFF: Duration = Duration::from_millis(1);

/// Run a blocking driver call from async code
///
/// On a multi-thread runtime the worker is handed off for the duration of
/// the call so timers and other tasks keep running.
pub(crate) fn driver_call<T>(call: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(call),
        _ => call(),
    }
}

/// Message from a receive loop to the actor
#[derive(Debug)]
pub(crate) enum ReceiverMessage {
    /// Frame read from the bus
    Frame {
        session: u64,
        frame: Frame,
    },
    /// The driver failed; the loop has exited
    Fault {
        session: u64,
        error: DriverError,
    },
}

/// An open, configured channel with its receive loop
pub(crate) struct Session {
    id: u64,
    handle: ChannelHandle,
    config: BusConfig,
    stop: Arc<AtomicBool>,
    receiver: JoinHandle<()>,
}

impl Session {
    /// Open and configure `channel`, then start receiving
    pub(crate) fn open(
        driver: Arc<dyn CanDriver>,
        id: u64,
        channel: u8,
        config: BusConfig,
        receive_timeout: Duration,
        tx: mpsc::Sender<ReceiverMessage>,
    ) -> Result<Self, DriverError> {
        validate_channel(channel)?;
        let handle = driver.open(channel)?;
        if let Err(e) = driver.configure(handle, &config) {
            driver.close(handle);
            return Err(e);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let loop_stop = stop.clone();
        let loop_driver = driver.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("can-rx-{}", channel))
            .spawn(move || receive_loop(loop_driver, handle, id, receive_timeout, loop_stop, tx));

        let receiver = match spawned {
            Ok(receiver) => receiver,
            Err(e) => {
                driver.close(handle);
                return Err(DriverError::Io(e.to_string()));
            }
        };

        info!("Session {} opened channel {} at {}", id, channel, config.bitrate);
        Ok(Self {
            id,
            handle,
            config,
            stop,
            receiver,
        })
    }

    /// Session id
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Driver handle
    pub(crate) fn handle(&self) -> ChannelHandle {
        self.handle
    }

    /// Channel number
    pub(crate) fn channel(&self) -> u8 {
        self.handle.channel()
    }

    /// Bus configuration in effect
    pub(crate) fn config(&self) -> BusConfig {
        self.config
    }

    /// Stop the receive loop, close the channel and wait for the loop to exit
    ///
    /// The loop notices the stop flag once its current receive call returns,
    /// so a driver that does not wake receivers on close delays this by up to
    /// one receive timeout.
    pub(crate) fn close(self, driver: &dyn CanDriver) {
        self.stop.store(true, Ordering::Release);
        driver.close(self.handle);
        if self.receiver.join().is_err() {
            warn!("Receive loop on channel {} panicked", self.handle.channel());
        }
        info!("Session {} closed channel {}", self.id, self.handle.channel());
    }
}

fn receive_loop(
    driver: Arc<dyn CanDriver>,
    handle: ChannelHandle,
    session: u64,
    timeout: Duration,
    stop: Arc<AtomicBool>,
    tx: mpsc::Sender<ReceiverMessage>,
) {
    debug!("Receive loop started on channel {}", handle.channel());

    while !stop.load(Ordering::Acquire) && !tx.is_closed() {
        match driver.receive(handle, timeout) {
            Ok(Some(frame)) => {
                if !forward(&tx, &stop, ReceiverMessage::Frame { session, frame }) {
                    break;
                }
            }
            Ok(None) => {}
            Err(error) => {
                forward(&tx, &stop, ReceiverMessage::Fault { session, error });
                break;
            }
        }
    }

    debug!("Receive loop ended on channel {}", handle.channel());
}

/// Hand a message to the actor; false once the session is stopping
///
/// Never blocks indefinitely: the actor may be waiting in `close` for this
/// thread while its queue is full.
fn forward(
    tx: &mpsc::Sender<ReceiverMessage>,
    stop: &AtomicBool,
    mut message: ReceiverMessage,
) -> bool {
    loop {
        if stop.load(Ordering::Acquire) {
            return false;
        }
        match tx.try_send(message) {
            Ok(()) => return true,
            Err(TrySendError::Closed(_)) => return false,
            Err(TrySendError::Full(rejected)) => {
                message = rejected;
                std::thread::sleep(FULL_QUEUE_BACKOFF);
            }
        }
    }
}
