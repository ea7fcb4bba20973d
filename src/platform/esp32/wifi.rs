//! Station-mode WiFi over ESP-IDF.
//!
//! The driver is used without the blocking wrapper: `connect` returns as
//! soon as ESP-IDF accepted the request and the link state is polled.
//! The reason of the last station disconnect is taken from the system event
//! loop, so an attempt rejected by the access point or one that finds no
//! access point reports a failure instead of waiting for the timeout.

use super::esp_error;
use crate::platform::{DriverError, WifiDriver};
use crate::provisioning::WifiLinkStatus;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi, WifiEvent};
use esp_idf_sys::EspError;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

/// [`WifiDriver`] backed by [`EspWifi`].
pub struct EspWifiDriver<'a> {
    wifi: EspWifi<'a>,
    attempting: bool,
    was_connected: bool,
    /// Reason of the last station disconnect, `0` if none since the last request.
    last_disconnect: Arc<AtomicU16>,
    _disconnect_subscription: EspSubscription<'static, System>,
}

impl<'a> EspWifiDriver<'a> {
    /// Take the modem and bring up the WiFi driver (not yet started).
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
    ) -> Result<Self, EspError> {
        let last_disconnect = Arc::new(AtomicU16::new(0));
        let reason = last_disconnect.clone();
        let subscription = sysloop.subscribe::<WifiEvent, _>(move |event| {
            if let WifiEvent::StaDisconnected(info) = event {
                reason.store(u16::from(info.reason()), Ordering::Relaxed);
            }
        })?;

        let wifi = EspWifi::new(modem, sysloop, nvs)?;
        Ok(Self {
            wifi,
            attempting: false,
            was_connected: false,
            last_disconnect,
            _disconnect_subscription: subscription,
        })
    }

    fn is_up(&self) -> bool {
        self.wifi.is_up().unwrap_or(false)
    }
}

impl WifiDriver for EspWifiDriver<'_> {
    fn status(&mut self) -> WifiLinkStatus {
        if self.is_up() {
            self.attempting = false;
            self.was_connected = true;
            WifiLinkStatus::Connected
        } else if self.was_connected {
            WifiLinkStatus::ConnectionLost
        } else if self.attempting {
            let reason = self.last_disconnect.load(Ordering::Relaxed);
            match WifiLinkStatus::from_disconnect_reason(reason) {
                Some(failure) => {
                    debug!("WiFi attempt ended with disconnect reason {}", reason);
                    failure
                }
                None => WifiLinkStatus::Idle,
            }
        } else {
            WifiLinkStatus::Disconnected
        }
    }

    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), DriverError> {
        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        let config = Configuration::Client(ClientConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| DriverError::InvalidArgument("SSID too long".into()))?,
            password: password
                .try_into()
                .map_err(|_| DriverError::InvalidArgument("password too long".into()))?,
            auth_method,
            ..Default::default()
        });

        self.last_disconnect.store(0, Ordering::Relaxed);
        self.wifi.set_configuration(&config).map_err(esp_error)?;
        if !self.wifi.is_started().map_err(esp_error)? {
            self.wifi.start().map_err(esp_error)?;
        }
        self.wifi.connect().map_err(esp_error)?;

        info!("WiFi connect requested for {}", ssid);
        self.attempting = true;
        self.was_connected = false;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), DriverError> {
        self.attempting = false;
        self.was_connected = false;
        self.last_disconnect.store(0, Ordering::Relaxed);
        if !self.wifi.is_started().map_err(esp_error)? {
            debug!("WiFi not started; nothing to disconnect");
            return Ok(());
        }
        if let Err(e) = self.wifi.disconnect() {
            warn!("WiFi disconnect: {:?}", e);
        }
        Ok(())
    }

    fn rssi(&self) -> i32 {
        if !self.is_up() {
            return 0;
        }
        let mut ap_info = esp_idf_sys::wifi_ap_record_t::default();
        let rc = unsafe { esp_idf_sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
        if rc == esp_idf_sys::ESP_OK {
            i32::from(ap_info.rssi)
        } else {
            0
        }
    }
}
