use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError, mpsc},
    time::Duration,
};

use log::{debug, info, warn};
use tokio::{runtime::Runtime, task::JoinHandle};

use crate::{
    audio_api::{AudioApi, AudioApiError, StereoPortId, stereo_port_names},
    fileutils::{NumberedEntries, count_instances, physical_memory_kib, proc_memory_usage, recursive_mkdir},
    interactive_list::RecordTable,
    thread_control::ThreadControl,
};

pub const NAME_STRIDE: usize = 32;
const MEMORY_PROBE_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceCommand {
    Rescan,
    Create,
    SelectInstance(usize),
    SelectVoice(usize),
    Shutdown,
}

/// What the worker last did, for the status line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstancesStatus {
    pub active_instance: Option<usize>,
    pub active_voice: Option<usize>,
    pub memory_usage: Option<f64>,
    pub last_error: Option<String>,
}

pub type SharedStatus = Arc<Mutex<InstancesStatus>>;
pub type SharedAudio = Arc<Mutex<AudioApi>>;

/// Tables and gates the UI lists bind to. Both tables are rewritten under the
/// instance gate, which the voice control shares.
#[derive(Clone)]
pub struct InstanceTables {
    pub instances: Arc<RecordTable>,
    pub voices: Arc<RecordTable>,
    pub instance_control: Arc<ThreadControl>,
    pub voice_control: Arc<ThreadControl>,
}

impl InstanceTables {
    pub fn new() -> Self {
        let instance_control = ThreadControl::private();
        let voice_control = ThreadControl::shared_with(&instance_control);
        Self {
            instances: RecordTable::new(NAME_STRIDE),
            voices: RecordTable::new(NAME_STRIDE),
            instance_control,
            voice_control,
        }
    }
}

impl Default for InstanceTables {
    fn default() -> Self {
        Self::new()
    }
}

pub struct InstancesWorker {
    root: PathBuf,
    tables: InstanceTables,
    status: SharedStatus,
    audio: SharedAudio,
    instances: NumberedEntries,
    voices: NumberedEntries,
    output_port: Option<StereoPortId>,
}

impl InstancesWorker {
    pub fn new(root: PathBuf, tables: InstanceTables, status: SharedStatus, audio: SharedAudio) -> Self {
        Self {
            root,
            tables,
            status,
            audio,
            instances: NumberedEntries::default(),
            voices: NumberedEntries::default(),
            output_port: None,
        }
    }

    /// Returns `false` once the worker should stop.
    pub fn handle(&mut self, command: InstanceCommand) -> bool {
        let result = match command {
            InstanceCommand::Rescan => self.rescan(),
            InstanceCommand::Create => self.create(),
            InstanceCommand::SelectInstance(index) => self.select_instance(index),
            InstanceCommand::SelectVoice(index) => self.select_voice(index),
            InstanceCommand::Shutdown => return false,
        };
        match result {
            Ok(()) => self.status().last_error = None,
            Err(err) => {
                warn!("{command:?} failed: {err:#}");
                self.status().last_error = Some(format!("{err:#}"));
            }
        }
        true
    }

    fn status(&self) -> std::sync::MutexGuard<'_, InstancesStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rescan(&mut self) -> anyhow::Result<()> {
        recursive_mkdir(&self.root)?;
        let mut entries = count_instances(&self.root)?;
        if entries.count() == 0 {
            create_instance(&self.root, 1)?;
            entries = count_instances(&self.root)?;
        }
        info!("{} instance(s) under {}", entries.count(), self.root.display());
        let control = &self.tables.instance_control;
        {
            let _held = control.lock();
            self.tables.instances.replace(entries.ids.iter().map(u32::to_string));
            control.request_update();
        }
        control.set_ready(true);
        self.instances = entries;
        Ok(())
    }

    fn create(&mut self) -> anyhow::Result<()> {
        let id = self.instances.last_id() + 1;
        create_instance(&self.root, id)?;
        info!("created instance {id}");
        self.rescan()
    }

    fn select_instance(&mut self, index: usize) -> anyhow::Result<()> {
        let Some(id) = self.instances.ids.get(index).copied() else {
            anyhow::bail!("no instance at position {index}");
        };
        let directory = self.root.join(id.to_string());
        let mut voices = count_instances(&directory)?;
        if voices.count() == 0 {
            recursive_mkdir(&directory.join("1"))?;
            voices = count_instances(&directory)?;
        }
        let control = &self.tables.voice_control;
        {
            let _held = control.lock();
            self.tables.voices.replace(voices.ids.iter().map(u32::to_string));
            control.request_update();
        }
        control.set_ready(true);
        self.voices = voices;
        let mut status = self.status();
        status.active_instance = Some(index);
        status.active_voice = None;
        debug!("instance {id} active");
        Ok(())
    }

    fn select_voice(&mut self, index: usize) -> anyhow::Result<()> {
        let Some(voice) = self.voices.ids.get(index).copied() else {
            anyhow::bail!("no voice at position {index}");
        };
        let instance = self
            .status()
            .active_instance
            .and_then(|position| self.instances.ids.get(position).copied())
            .unwrap_or_default();
        self.status().active_voice = Some(index);
        match self.route_output(&instance.to_string(), &voice.to_string()) {
            Ok(()) | Err(AudioApiError::ClientIsNull) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn route_output(&mut self, instance: &str, voice: &str) -> Result<(), AudioApiError> {
        let audio = self.audio.lock().unwrap_or_else(PoisonError::into_inner);
        match self.output_port {
            Some(port) => audio.rename_port(port, instance, voice),
            None => {
                let (left, right) = stereo_port_names(instance, voice);
                self.output_port = Some(audio.register_stereo_port(&left, &right)?);
                Ok(())
            }
        }
    }
}

fn create_instance(root: &Path, id: u32) -> std::io::Result<()> {
    recursive_mkdir(&root.join(id.to_string()).join("1"))
}

pub struct InstancesHandle {
    pub tables: InstanceTables,
    pub status: SharedStatus,
    sender: mpsc::Sender<InstanceCommand>,
    worker: JoinHandle<()>,
    memory_probe: JoinHandle<()>,
}

impl InstancesHandle {
    pub fn sender(&self) -> mpsc::Sender<InstanceCommand> {
        self.sender.clone()
    }

    pub fn send(&self, command: InstanceCommand) -> bool {
        self.sender.send(command).is_ok()
    }

    pub fn status_snapshot(&self) -> InstancesStatus {
        self.status.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Stops the memory probe and asks the worker to exit after its current
    /// command.
    pub fn shutdown(self) {
        self.memory_probe.abort();
        if self.sender.send(InstanceCommand::Shutdown).is_err() {
            debug!("instances worker already stopped");
        }
        drop(self.worker);
    }
}

pub fn spawn_instances(runtime: &Runtime, root: PathBuf, audio: SharedAudio) -> InstancesHandle {
    let (sender, receiver) = mpsc::channel();
    let tables = InstanceTables::new();
    let status: SharedStatus = Arc::new(Mutex::new(InstancesStatus::default()));
    let mut worker = InstancesWorker::new(root, tables.clone(), status.clone(), audio);

    let worker = runtime.spawn_blocking(move || {
        while let Ok(command) = receiver.recv() {
            if !worker.handle(command) {
                break;
            }
        }
        debug!("instances worker stopped");
    });
    let memory_probe = runtime.spawn(probe_memory(status.clone()));

    for command in [
        InstanceCommand::Rescan,
        InstanceCommand::SelectInstance(0),
        InstanceCommand::SelectVoice(0),
    ] {
        if sender.send(command).is_err() {
            debug!("instances worker gone before {command:?}");
        }
    }

    InstancesHandle {
        tables,
        status,
        sender,
        worker,
        memory_probe,
    }
}

async fn probe_memory(status: SharedStatus) {
    let physical = physical_memory_kib();
    if physical.is_none() {
        warn!("physical memory size unavailable, memory usage will not be shown");
        return;
    }
    let mut ticker = tokio::time::interval(MEMORY_PROBE_PERIOD);
    loop {
        ticker.tick().await;
        let usage = physical.and_then(proc_memory_usage);
        status.lock().unwrap_or_else(PoisonError::into_inner).memory_usage = usage;
    }
}
