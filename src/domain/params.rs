use crate::domain::error::{RemoteUartError, RemoteUartResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Query parameter naming the serial device.
pub const DEVICE_PARAM: &str = "uartPort";
/// Query parameter carrying the baud rate.
pub const BAUD_RATE_PARAM: &str = "baudrate";

/// Stable name of a local serial device (e.g. `/dev/ttyUSB0` or `COM3`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for DeviceId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Parameters an inbound connection carries in its request target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub device: DeviceId,
    pub baud_rate: u32,
}

impl ConnectionParams {
    pub fn new(device: impl Into<DeviceId>, baud_rate: u32) -> RemoteUartResult<Self> {
        let device = device.into();
        if device.as_str().is_empty() {
            return Err(RemoteUartError::Protocol(format!(
                "parameter '{}' must not be empty",
                DEVICE_PARAM
            )));
        }
        if baud_rate == 0 {
            return Err(RemoteUartError::Protocol(format!(
                "parameter '{}' must be a positive integer",
                BAUD_RATE_PARAM
            )));
        }
        Ok(Self { device, baud_rate })
    }

    /// Parse the request target of an inbound connection.
    ///
    /// Accepts `/?uartPort=..&baudrate=..` as well as the form without the
    /// `?` separator (`/uartPort=..&baudrate=..`). Values are percent-decoded.
    pub fn from_request_target(target: &str) -> RemoteUartResult<Self> {
        let query = match target.split_once('?') {
            Some((_, query)) => query,
            None => target.trim_start_matches('/'),
        };

        let mut device = None;
        let mut baud_rate = None;
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                DEVICE_PARAM if device.is_none() => device = Some(value.into_owned()),
                BAUD_RATE_PARAM if baud_rate.is_none() => baud_rate = Some(value.into_owned()),
                _ => {}
            }
        }

        let device = device.ok_or_else(|| {
            RemoteUartError::Protocol(format!("missing parameter '{}'", DEVICE_PARAM))
        })?;
        let baud_rate = baud_rate.ok_or_else(|| {
            RemoteUartError::Protocol(format!("missing parameter '{}'", BAUD_RATE_PARAM))
        })?;
        let baud_rate = baud_rate.trim().parse::<u32>().map_err(|_| {
            RemoteUartError::Protocol(format!(
                "parameter '{}' must be a positive integer, got '{}'",
                BAUD_RATE_PARAM, baud_rate
            ))
        })?;

        Self::new(device, baud_rate)
    }

    /// Build the client URL for these parameters.
    pub fn to_url(&self, host: &str, port: u16) -> RemoteUartResult<url::Url> {
        // Bare IPv6 literals need brackets in the authority.
        let authority = match host.parse::<std::net::Ipv6Addr>() {
            Ok(_) => format!("[{}]:{}", host, port),
            Err(_) => format!("{}:{}", host, port),
        };
        let mut url = url::Url::parse(&format!("ws://{}/", authority))
            .map_err(|e| RemoteUartError::InvalidInput(format!("Invalid host '{}': {}", host, e)))?;
        url.query_pairs_mut()
            .append_pair(DEVICE_PARAM, self.device.as_str())
            .append_pair(BAUD_RATE_PARAM, &self.baud_rate.to_string());
        Ok(url)
    }
}
