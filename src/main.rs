mod audio_api;
mod fileutils;
mod geometry;
mod input;
mod instances;
mod interactive_list;
mod panel;
mod parameters;
mod render;
mod settings;
mod thread_control;
mod widgets;

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use anyhow::Context;
use audio_api::AudioApi;
use fileutils::count_process;
use instances::{InstanceCommand, InstancesStatus, SharedAudio, spawn_instances};
use log::{error, info, trace, warn};
use macroquad::prelude::*;
use panel::Panel;
use parameters::shared_parameters;
use render::{Background, MacroquadBackend, render_frame};
use settings::{APPLICATION_NAME, Settings, VIEWPORT_HEIGHT, VIEWPORT_WIDTH};
use tokio::runtime::Runtime;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run().await {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn window_conf() -> Conf {
    Conf {
        window_title: "DSANDGRAINS".into(),
        fullscreen: false,
        sample_count: 1,
        window_width: VIEWPORT_WIDTH as i32,
        window_height: VIEWPORT_HEIGHT as i32,
        window_resizable: false,
        high_dpi: false,
        ..Default::default()
    }
}

async fn run() -> anyhow::Result<()> {
    let settings = Settings::from_env();
    info!(
        "{APPLICATION_NAME} starting, instances under {}",
        settings.instances_root.display()
    );
    if count_process(APPLICATION_NAME) > 1 {
        warn!("another {APPLICATION_NAME} process is already running for this user");
    }

    let runtime = Runtime::new().context("cannot start the worker runtime")?;
    let parameters = shared_parameters();
    let audio = match AudioApi::open_client(APPLICATION_NAME, parameters.clone()) {
        Ok(audio) => audio,
        Err(err) => {
            warn!("{err}, continuing without audio output");
            AudioApi::disconnected()
        }
    };
    let audio: SharedAudio = Arc::new(Mutex::new(audio));
    let instances = spawn_instances(&runtime, settings.instances_root.clone(), audio.clone());

    let mut panel = Panel::new(&instances.tables, instances.sender(), parameters);
    let mut dispatch = panel.build_dispatch();
    let mut background = Background::load(&settings.background).await;
    panel.decorate(&mut background);
    let mut backend = MacroquadBackend::new();

    prevent_quit();
    while !is_quit_requested() {
        std::thread::sleep(settings.frame_period);

        for event in input::poll_pointer_events() {
            dispatch.dispatch(event, &mut panel);
        }
        if let Some((notches, point)) = input::poll_wheel() {
            panel.handle_wheel(notches, point);
        }
        if is_key_pressed(KeyCode::N) {
            instances.send(InstanceCommand::Create);
        }
        if is_key_pressed(KeyCode::R) {
            instances.send(InstanceCommand::Rescan);
        }

        let status = instances.status_snapshot();
        let audio_status = audio_state(&audio);
        panel.follow_status(&status);
        panel.set_status(&status_text(&status, audio_status));
        if panel.update(&mut backend) {
            trace!("widgets changed");
        }

        render_frame(&mut backend, &background, &panel.batches());
        next_frame().await;
    }

    info!("window closed, shutting down");
    instances.shutdown();
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    if let Err(err) = audio
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .close_client()
    {
        warn!("{err}");
    }
    info!("{APPLICATION_NAME} stopped");
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AudioState {
    Online,
    Offline,
    ServerDown,
}

fn audio_state(audio: &SharedAudio) -> AudioState {
    let audio = audio.lock().unwrap_or_else(PoisonError::into_inner);
    match (audio.is_open(), audio.server_down()) {
        (_, true) => AudioState::ServerDown,
        (true, false) => AudioState::Online,
        (false, false) => AudioState::Offline,
    }
}

fn status_text(status: &InstancesStatus, audio: AudioState) -> String {
    let position = |index: Option<usize>| index.map_or_else(|| "-".to_owned(), |i| (i + 1).to_string());
    let mut text = format!(
        "INSTANCE {}  VOICE {}",
        position(status.active_instance),
        position(status.active_voice)
    );
    if let Some(usage) = status.memory_usage {
        text.push_str(&format!("  MEM {usage:.1}%"));
    }
    match audio {
        AudioState::Online => {}
        AudioState::Offline => text.push_str("  JACK OFFLINE"),
        AudioState::ServerDown => text.push_str("  JACK SERVER DOWN"),
    }
    if let Some(err) = &status.last_error {
        text.push_str("  ");
        text.push_str(err);
    }
    text
}
