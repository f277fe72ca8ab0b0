//! User-facing session operations.
//!
//! A [`CompanionSession`] wraps an established [`Connection`] and expresses
//! every operation as an OPACK request: pairing, re-authentication, HID
//! button presses, media commands, app launching, and event subscriptions.

use companion_core::error::{CodecError, Result};
use companion_core::{Credentials, FrameType};
use companion_opack::Value;
use companion_pairing::{PairSetup, PairVerify};
use rand::Rng;
use std::net::SocketAddr;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::commands::{ButtonState, HidButton, MediaControlCommand};
use crate::connection::Connection;
use crate::events::EventReceiver;

/// How we introduce ourselves in `_systemInfo`.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    /// Display name shown in the device's remote list.
    pub name: String,
    /// Model string, e.g. `"iPhone14,3"`.
    pub model: String,
    /// Public identifier (MAC-style string).
    pub public_id: String,
    /// IDS identifier (UUID string).
    pub ids_id: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "companion-rs".to_string(),
            model: "iPhone14,3".to_string(),
            public_id: "aa:bb:cc:dd:ee:ff".to_string(),
            ids_id: Uuid::new_v4().to_string().to_uppercase(),
        }
    }
}

/// A launchable application reported by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct App {
    pub bundle_identifier: String,
    pub name: String,
}

/// High-level Companion session.
pub struct CompanionSession {
    connection: Connection,
    info: ClientInfo,
    service_session_id: StdMutex<Option<u64>>,
}

/// Service type used for remote-control sessions.
const REMOTE_SERVICE: &str = "com.apple.tvremoteservices";

impl CompanionSession {
    /// Connect to a device's companion port.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::connect_with_info(addr, ClientInfo::default()).await
    }

    /// Connect with custom client info.
    pub async fn connect_with_info(addr: SocketAddr, info: ClientInfo) -> Result<Self> {
        let connection = Connection::connect(addr).await?;
        Ok(Self {
            connection,
            info,
            service_session_id: StdMutex::new(None),
        })
    }

    /// Connect with a custom request timeout (mainly for tests).
    pub async fn connect_with_timeout(addr: SocketAddr, timeout: Duration) -> Result<Self> {
        let connection = Connection::connect_with_timeout(addr, timeout).await?;
        Ok(Self {
            connection,
            info: ClientInfo::default(),
            service_session_id: StdMutex::new(None),
        })
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Take the receiver for unsolicited device events.
    pub fn events(&self) -> Option<EventReceiver> {
        self.connection.take_events()
    }

    /// Run PIN-based Pair-Setup, producing long-term credentials.
    ///
    /// The credentials must be persisted by the caller; pairing again later
    /// requires user interaction on the device.
    pub async fn pair_setup(&self, pin: &str) -> Result<Credentials> {
        let mut setup = PairSetup::new(pin);
        setup.set_device_name(self.info.name.clone());
        info!("starting pair-setup");

        let m1 = setup.generate_m1()?;
        let m2 = self
            .connection
            .exchange_auth(FrameType::PairSetupStart, m1, vec![("_pwTy", Value::Int(1))])
            .await?;
        setup.process_m2(&m2)?;

        let m3 = setup.generate_m3()?;
        let m4 = self
            .connection
            .exchange_auth(FrameType::PairSetupNext, m3, vec![])
            .await?;
        setup.process_m4(&m4)?;

        let m5 = setup.generate_m5()?;
        let m6 = self
            .connection
            .exchange_auth(FrameType::PairSetupNext, m5, vec![])
            .await?;
        let credentials = setup.process_m6(&m6)?;

        info!("pair-setup complete");
        Ok(credentials)
    }

    /// Run Pair-Verify with stored credentials and switch the transport to
    /// authenticated encryption.
    pub async fn verify(&self, credentials: &Credentials) -> Result<()> {
        let mut verify = PairVerify::new(credentials.clone());
        info!("starting pair-verify");

        let m1 = verify.generate_m1()?;
        let m2 = self
            .connection
            .exchange_auth(FrameType::PairVerifyStart, m1, vec![("_auTy", Value::Int(4))])
            .await?;
        verify.process_m2(&m2)?;

        let m3 = verify.generate_m3()?;
        let m4 = self
            .connection
            .exchange_auth(FrameType::PairVerifyNext, m3, vec![])
            .await?;
        let keys = verify.process_m4(&m4)?;

        self.connection.install_session_keys(keys);
        info!("pair-verify complete, channel encrypted");
        Ok(())
    }

    /// Exchange `_systemInfo` with the device.
    pub async fn system_info(&self) -> Result<Value> {
        let content = Value::dict([
            ("_bf", Value::Int(0)),
            ("_cf", Value::Int(512)),
            ("_clFl", Value::Int(128)),
            ("_i", "cafecafecafe".into()),
            ("_idsID", self.info.ids_id.as_str().into()),
            ("_pubID", self.info.public_id.as_str().into()),
            ("_sf", Value::Int(256)),
            ("_sv", "170.18".into()),
            ("model", self.info.model.as_str().into()),
            ("name", self.info.name.as_str().into()),
        ]);
        self.connection.request("_systemInfo", content).await
    }

    /// Start a remote-control service session.
    pub async fn session_start(&self) -> Result<u64> {
        let local_sid: u32 = rand::thread_rng().gen();
        let content = Value::dict([
            ("_srvT", REMOTE_SERVICE.into()),
            ("_sid", Value::Int(local_sid as u64)),
        ]);
        let response = self.connection.request("_sessionStart", content).await?;

        let remote_sid = response
            .get("_c")
            .and_then(|c| c.get("_sid"))
            .and_then(Value::as_u64)
            .ok_or(CodecError::MissingField("_sid"))?;

        // The effective session id combines both halves.
        let sid = (remote_sid << 32) | local_sid as u64;
        *self.service_session_id.lock().expect("sid lock poisoned") = Some(sid);
        debug!(sid, "service session started");
        Ok(sid)
    }

    /// Stop the remote-control service session.
    pub async fn session_stop(&self) -> Result<()> {
        let sid = self
            .service_session_id
            .lock()
            .expect("sid lock poisoned")
            .take()
            .unwrap_or(0);
        let content = Value::dict([
            ("_srvT", REMOTE_SERVICE.into()),
            ("_sid", Value::Int(sid)),
        ]);
        self.connection.request("_sessionStop", content).await?;
        debug!("service session stopped");
        Ok(())
    }

    /// Begin a touch interaction, declaring the virtual trackpad size.
    pub async fn touch_start(&self, width: u32, height: u32) -> Result<()> {
        let content = Value::dict([
            ("_width", Value::Int(width as u64)),
            ("_height", Value::Int(height as u64)),
            ("_tFl", Value::Int(0)),
        ]);
        self.connection.request("_touchStart", content).await?;
        Ok(())
    }

    /// End the current touch interaction.
    pub async fn touch_stop(&self) -> Result<()> {
        self.connection
            .request("_touchStop", Value::dict::<&str, _>([]))
            .await?;
        Ok(())
    }

    /// Press and release a button.
    pub async fn press_button(&self, button: HidButton) -> Result<()> {
        self.button_event(button, ButtonState::Down).await?;
        self.button_event(button, ButtonState::Up).await?;
        Ok(())
    }

    async fn button_event(&self, button: HidButton, state: ButtonState) -> Result<()> {
        let content = Value::dict([
            ("_hBtS", Value::Int(state as u64)),
            ("_hidC", Value::Int(button.code() as u64)),
        ]);
        self.connection.request("_hidC", content).await?;
        Ok(())
    }

    /// Send a media control command.
    pub async fn media_command(&self, command: MediaControlCommand) -> Result<Value> {
        let content = Value::dict([("_mcc", Value::Int(command.code() as u64))]);
        self.connection.request("_mcc", content).await
    }

    /// Launch an app by bundle identifier.
    pub async fn launch_app(&self, bundle_identifier: &str) -> Result<()> {
        let content = Value::dict([("_bundleID", bundle_identifier.into())]);
        self.connection.request("_launchApp", content).await?;
        Ok(())
    }

    /// Subscribe to a named event stream.
    pub async fn subscribe_event(&self, event: &str) -> Result<()> {
        let content = Value::dict([("_regEvents", Value::array([event.into()]))]);
        self.connection.send_event("_interest", content).await
    }

    /// Unsubscribe from a named event stream.
    pub async fn unsubscribe_event(&self, event: &str) -> Result<()> {
        let content = Value::dict([("_deRegEvents", Value::array([event.into()]))]);
        self.connection.send_event("_interest", content).await
    }

    /// Query the device's attention (wake) state.
    pub async fn fetch_attention_state(&self) -> Result<Value> {
        let response = self
            .connection
            .request("FetchAttentionState", Value::dict::<&str, _>([]))
            .await?;
        Ok(response.get("_c").cloned().unwrap_or(Value::Null))
    }

    /// List apps that can be launched on the device.
    pub async fn fetch_launchable_applications(&self) -> Result<Vec<App>> {
        let response = self
            .connection
            .request("FetchLaunchableApplicationsEvent", Value::dict::<&str, _>([]))
            .await?;

        let content = response
            .get("_c")
            .and_then(Value::as_dict)
            .ok_or(CodecError::MissingField("_c"))?;

        Ok(content
            .iter()
            .filter_map(|(bundle, name)| {
                name.as_str().map(|n| App {
                    bundle_identifier: bundle.clone(),
                    name: n.to_string(),
                })
            })
            .collect())
    }

    /// Disconnect, failing any in-flight request.
    pub fn close(&self) {
        self.connection.close();
    }
}
