#![allow(dead_code)]

use remote_uart::domain::params::ConnectionParams;
use remote_uart::infrastructure::serial::{DeviceOpener, SerialDevice};
use remote_uart::{RemoteUartError, RemoteUartResult};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Observable state of a mock device, shared between the test and the
/// session driving it.
#[derive(Debug, Default)]
pub struct DeviceState {
    pub pending: VecDeque<Vec<u8>>,
    pub written: Vec<u8>,
    pub writes: usize,
    pub reads: usize,
    pub close_count: usize,
    pub fail_writes: bool,
}

pub type SharedDevice = Arc<Mutex<DeviceState>>;

pub fn device_state() -> SharedDevice {
    Arc::new(Mutex::new(DeviceState::default()))
}

/// Queue bytes for the device to "receive" on its next read.
pub fn feed(state: &SharedDevice, data: &[u8]) {
    state.lock().unwrap().pending.push_back(data.to_vec());
}

pub fn written(state: &SharedDevice) -> Vec<u8> {
    state.lock().unwrap().written.clone()
}

pub fn close_count(state: &SharedDevice) -> usize {
    state.lock().unwrap().close_count
}

pub struct MockDevice {
    state: SharedDevice,
    closed: bool,
}

impl MockDevice {
    pub fn new(state: SharedDevice) -> Self {
        Self {
            state,
            closed: false,
        }
    }
}

impl SerialDevice for MockDevice {
    fn read_available(&mut self) -> RemoteUartResult<Vec<u8>> {
        if self.closed {
            return Err(RemoteUartError::DeviceIo("closed".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        state.reads += 1;
        Ok(state.pending.pop_front().unwrap_or_default())
    }

    fn write(&mut self, data: &[u8]) -> RemoteUartResult<()> {
        let mut state = self.state.lock().unwrap();
        if self.closed {
            return Err(RemoteUartError::DeviceIo("closed".to_string()));
        }
        if state.fail_writes {
            return Err(RemoteUartError::DeviceIo("Input/output error (os error 5)".to_string()));
        }
        state.writes += 1;
        state.written.extend_from_slice(data);
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.lock().unwrap().close_count += 1;
        }
    }
}

/// Hands out [`MockDevice`]s and records every open attempt.
#[derive(Default)]
pub struct MockOpener {
    devices: Mutex<HashMap<String, SharedDevice>>,
    missing: Mutex<HashSet<String>>,
    opens: AtomicUsize,
    open_delay: Option<Duration>,
}

impl MockOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opening takes `delay`, widening the window for concurrent dispatches.
    pub fn with_open_delay(delay: Duration) -> Self {
        Self {
            open_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Make every open of `device` fail as if it did not exist.
    pub fn fail(self, device: &str) -> Self {
        self.missing.lock().unwrap().insert(device.to_string());
        self
    }

    /// The state behind `device`, created on first use.
    pub fn device(&self, device: &str) -> SharedDevice {
        self.devices
            .lock()
            .unwrap()
            .entry(device.to_string())
            .or_insert_with(device_state)
            .clone()
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl DeviceOpener for MockOpener {
    fn open(&self, params: &ConnectionParams) -> RemoteUartResult<Box<dyn SerialDevice>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.open_delay {
            std::thread::sleep(delay);
        }

        let name = params.device.as_str();
        if self.missing.lock().unwrap().contains(name) {
            return Err(RemoteUartError::DeviceUnavailable {
                device: name.to_string(),
                reason: "No such file or directory".to_string(),
            });
        }
        Ok(Box::new(MockDevice::new(self.device(name))))
    }
}
