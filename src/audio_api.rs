use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use jack::{AsyncClient, AudioOut, Client, ClientOptions, ClientStatus, Control, Port, ProcessScope};
use log::{debug, info, warn};
use thiserror::Error;

use crate::parameters::{ParameterSnapshot, SharedParameters, try_snapshot};

#[derive(Debug, Error)]
pub enum AudioApiError {
    #[error("unable to connect to the JACK server")]
    CannotConnectToServer(#[source] jack::Error),
    #[error("cannot activate the JACK client")]
    CannotEnableClient(#[source] jack::Error),
    #[error("cannot deactivate the JACK client")]
    CannotDisableClient(#[source] jack::Error),
    #[error("no JACK client is open")]
    ClientIsNull,
    #[error("output port {name:?} cannot be created")]
    OutputPortCannotBeCreated {
        name: String,
        #[source]
        source: jack::Error,
    },
    #[error("output port renaming to {name:?} failed")]
    OutputPortRenamingFailed {
        name: String,
        #[source]
        source: jack::Error,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Left,
    Right,
}

impl Channel {
    pub fn suffix(self) -> &'static str {
        match self {
            Channel::Left => "L",
            Channel::Right => "R",
        }
    }
}

/// `"<instance> > <voice> > L"`.
pub fn port_name(instance: &str, voice: &str, channel: Channel) -> String {
    format!("{instance} > {voice} > {}", channel.suffix())
}

pub fn stereo_port_names(instance: &str, voice: &str) -> (String, String) {
    (
        port_name(instance, voice, Channel::Left),
        port_name(instance, voice, Channel::Right),
    )
}

/// Position of a stereo pair in registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StereoPortId(usize);

struct StereoPort {
    left: Port<AudioOut>,
    right: Port<AudioOut>,
}

type SharedPorts = Arc<Mutex<Vec<StereoPort>>>;

struct Process {
    ports: SharedPorts,
    parameters: SharedParameters,
    snapshot: ParameterSnapshot,
    gains: (f32, f32),
}

impl Process {
    fn new(ports: SharedPorts, parameters: SharedParameters) -> Self {
        let snapshot = try_snapshot(&parameters).unwrap_or_default();
        Self {
            ports,
            parameters,
            gains: snapshot.stereo_gains(),
            snapshot,
        }
    }

    /// Picks up knob changes when the UI isn't holding the parameters.
    fn follow_parameters(&mut self) {
        if let Some(snapshot) = try_snapshot(&self.parameters)
            && snapshot.revision != self.snapshot.revision
        {
            self.gains = snapshot.stereo_gains();
            self.snapshot = snapshot;
        }
    }
}

/// Silence through the voice's output gain.
fn write_silence(buffer: &mut [f32], gain: f32) {
    buffer.fill(0.0);
    for sample in buffer.iter_mut() {
        *sample *= gain;
    }
}

impl jack::ProcessHandler for Process {
    fn process(&mut self, _: &Client, scope: &ProcessScope) -> Control {
        self.follow_parameters();
        let (left_gain, right_gain) = self.gains;
        // Port registration holds the lock briefly; skip the cycle rather
        // than wait on it.
        if let Ok(mut ports) = self.ports.try_lock() {
            for port in ports.iter_mut() {
                write_silence(port.left.as_mut_slice(scope), left_gain);
                write_silence(port.right.as_mut_slice(scope), right_gain);
            }
        }
        Control::Continue
    }
}

struct Notifications {
    server_down: Arc<AtomicBool>,
}

impl jack::NotificationHandler for Notifications {
    unsafe fn shutdown(&mut self, _status: ClientStatus, reason: &str) {
        warn!("JACK server has shut down: {reason}");
        self.server_down.store(true, Ordering::Release);
    }

    fn port_rename(&mut self, _: &Client, _port_id: jack::PortId, old_name: &str, new_name: &str) -> Control {
        debug!("{old_name} renamed to {new_name}");
        Control::Continue
    }
}

/// Output side of the application on the JACK graph.
pub struct AudioApi {
    client: Option<AsyncClient<Notifications, Process>>,
    ports: SharedPorts,
    server_down: Arc<AtomicBool>,
}

impl AudioApi {
    /// Handle with no client; every call reports [`AudioApiError::ClientIsNull`].
    pub fn disconnected() -> Self {
        Self {
            client: None,
            ports: Arc::new(Mutex::new(Vec::new())),
            server_down: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn open_client(client_name: &str, parameters: SharedParameters) -> Result<Self, AudioApiError> {
        let (client, status) = Client::new(client_name, ClientOptions::NO_START_SERVER)
            .map_err(AudioApiError::CannotConnectToServer)?;
        debug!("JACK client {:?} opened with status {status:?}", client.name());

        let mut api = Self::disconnected();
        let process = Process::new(api.ports.clone(), parameters);
        let notifications = Notifications {
            server_down: api.server_down.clone(),
        };
        let active = client
            .activate_async(notifications, process)
            .map_err(AudioApiError::CannotEnableClient)?;
        info!("JACK client {client_name:?} active");
        api.client = Some(active);
        Ok(api)
    }

    pub fn is_open(&self) -> bool {
        self.client.is_some()
    }

    pub fn server_down(&self) -> bool {
        self.server_down.load(Ordering::Acquire)
    }

    pub fn register_stereo_port(&self, name_left: &str, name_right: &str) -> Result<StereoPortId, AudioApiError> {
        let client = self.client.as_ref().ok_or(AudioApiError::ClientIsNull)?.as_client();
        let register = |name: &str| {
            client
                .register_port(name, AudioOut::default())
                .map_err(|source| AudioApiError::OutputPortCannotBeCreated {
                    name: name.to_owned(),
                    source,
                })
        };
        let left = register(name_left)?;
        let right = register(name_right)?;
        let mut ports = self.ports.lock().unwrap_or_else(PoisonError::into_inner);
        ports.push(StereoPort { left, right });
        info!("registered output ports {name_left:?} / {name_right:?}");
        Ok(StereoPortId(ports.len() - 1))
    }

    /// Renames both channels of `port` to `"<instance> > <voice> > L|R"`.
    pub fn rename_port(&self, port: StereoPortId, instance: &str, voice: &str) -> Result<(), AudioApiError> {
        if self.client.is_none() {
            return Err(AudioApiError::ClientIsNull);
        }
        let (left_name, right_name) = stereo_port_names(instance, voice);
        let mut ports = self.ports.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(pair) = ports.get_mut(port.0) else {
            return Err(AudioApiError::OutputPortRenamingFailed {
                name: left_name,
                source: jack::Error::PortNamingError,
            });
        };
        pair.left
            .set_name(&left_name)
            .map_err(|source| AudioApiError::OutputPortRenamingFailed {
                name: left_name.clone(),
                source,
            })?;
        pair.right
            .set_name(&right_name)
            .map_err(|source| AudioApiError::OutputPortRenamingFailed {
                name: right_name.clone(),
                source,
            })?;
        debug!("output ports now {left_name:?} / {right_name:?}");
        Ok(())
    }

    /// Deactivates and closes the client. Closing a handle with no client is
    /// a no-op.
    pub fn close_client(&mut self) -> Result<(), AudioApiError> {
        let Some(active) = self.client.take() else {
            return Ok(());
        };
        self.ports.lock().unwrap_or_else(PoisonError::into_inner).clear();
        let (client, _, _) = active.deactivate().map_err(AudioApiError::CannotDisableClient)?;
        info!("JACK client {:?} closed", client.name());
        Ok(())
    }
}

impl Drop for AudioApi {
    fn drop(&mut self) {
        if let Err(err) = self.close_client() {
            warn!("{err}");
        }
    }
}
