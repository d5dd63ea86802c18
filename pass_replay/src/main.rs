//! Pass replay tool
//!
//! Drives the scene-pass selector with a scripted command stream on the
//! synthetic backend and prints the final selector snapshot as RON.
//!
//! ```text
//! pass_replay [steady|churn|reload|weather|msaa|fault] [FRAMES] [--config selector.toml]
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ash::vk;
use clap::{Parser, ValueEnum};
use prehud_core::backend::synthetic::{FaultMode, SyntheticCompositor, SyntheticDevice};
use prehud_core::foundation::logging;
use prehud_core::prelude::*;

const WIDTH: u32 = 1920;
const HEIGHT: u32 = 1080;

const BACK_BUFFER: u64 = 1;
const SCENE_DEPTH: u64 = 2;
const SCENE_COLOR: u64 = 3;
const HUD_ATLAS: u64 = 4;
const SHADOW_MAP: u64 = 5;
const MSAA_COLOR: u64 = 6;
/// Handles from here up are per-frame swapchain images in the churn scenario
const CHURN_BASE: u64 = 1000;

#[derive(thiserror::Error, Debug)]
enum ReplayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Snapshot serialization failed: {0}")]
    Snapshot(#[from] ron::Error),
}

/// Scripted workload
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Scenario {
    /// Shadow pass, scene passes and HUD, same resources every frame
    Steady,
    /// Scene render target detours plus a new swapchain image every frame
    Churn,
    /// Effects reloaded every 90 frames
    Reload,
    /// Weather change signalled every 300 frames
    Weather,
    /// Multisampled scene target
    Msaa,
    /// Effect rendering panics on the first call
    Fault,
}

#[derive(Parser, Debug)]
#[command(name = "pass_replay", version, about = "Replay a scripted command stream through the scene-pass selector")]
struct Cli {
    /// Workload to replay
    #[arg(value_enum, default_value_t = Scenario::Steady)]
    scenario: Scenario,

    /// Frames to present
    #[arg(default_value_t = 600)]
    frames: u64,

    /// Selector configuration (.toml or .ron)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    /// Inject on the first qualifying pass after a request
    #[arg(long, default_value_t = false)]
    no_defer: bool,

    /// Turn the auto-request fallback off
    #[arg(long, default_value_t = false)]
    no_auto_request: bool,

    /// Turn depth binding off
    #[arg(long, default_value_t = false)]
    no_depth: bool,
}

impl Cli {
    fn selector_config(&self) -> Result<SelectorConfig, ReplayError> {
        let mut config = match &self.config {
            Some(path) => SelectorConfig::load_from_file(path)?,
            None => SelectorConfig::default(),
        };
        if let Some(level) = &self.log_level {
            config = config.with_log_level(level.as_str());
        }
        if self.no_defer {
            config = config.with_defer_first_pass(false);
        }
        if self.no_auto_request {
            config = config.with_auto_request(false);
        }
        if self.no_depth {
            config = config.with_depth_binding(false);
        }
        Ok(config)
    }
}

/// One render pass of the script
struct ScriptedPass {
    targets: Vec<ResourceView>,
    depth: Option<ResourceView>,
}

impl ScriptedPass {
    fn new(target: u64, depth: Option<u64>) -> Self {
        Self {
            targets: vec![ResourceView(target)],
            depth: depth.map(ResourceView),
        }
    }
}

struct Replay {
    scenario: Scenario,
    engine: SelectionEngine,
    device: SyntheticDevice,
    compositor: SyntheticCompositor,
    trigger: TriggerHandle,
    now: Instant,
    injections: u64,
}

impl Replay {
    fn new(scenario: Scenario, config: SelectorConfig) -> Result<Self, ReplayError> {
        let color = ResourceDesc::texture_2d(WIDTH, HEIGHT, vk::Format::B8G8R8A8_UNORM);
        let mut device = SyntheticDevice::new();
        device.add_texture(BACK_BUFFER, color);
        device.add_texture(SCENE_DEPTH, ResourceDesc::texture_2d(WIDTH, HEIGHT, vk::Format::D24_UNORM_S8_UINT));
        device.add_texture(SCENE_COLOR, color);
        device.add_texture(HUD_ATLAS, ResourceDesc::texture_2d(1024, 512, vk::Format::R8G8B8A8_UNORM));
        device.add_texture(SHADOW_MAP, ResourceDesc::texture_2d(2048, 2048, vk::Format::D32_SFLOAT));
        device.add_texture(MSAA_COLOR, color.with_samples(vk::SampleCountFlags::TYPE_4));

        let mut compositor = SyntheticCompositor::new(Resource(BACK_BUFFER));
        match scenario {
            Scenario::Msaa => compositor.set_back_buffer(Resource(MSAA_COLOR)),
            Scenario::Fault => compositor.set_fault_mode(FaultMode::Panic),
            _ => {}
        }

        let engine = SelectionEngine::new(config, Arc::new(SelectorShared::new()))?;
        let trigger = engine.trigger();
        Ok(Self {
            scenario,
            engine,
            device,
            compositor,
            trigger,
            now: Instant::now(),
            injections: 0,
        })
    }

    fn script(&mut self, frame: u64) -> Vec<ScriptedPass> {
        let scene_target = match self.scenario {
            Scenario::Msaa => MSAA_COLOR,
            Scenario::Churn => SCENE_COLOR,
            _ => BACK_BUFFER,
        };

        let mut passes = vec![ScriptedPass::new(HUD_ATLAS, Some(SHADOW_MAP))];
        if self.scenario == Scenario::Churn {
            let image = CHURN_BASE + frame % 3;
            self.device
                .add_texture(image, ResourceDesc::texture_2d(WIDTH, HEIGHT, vk::Format::B8G8R8A8_UNORM));
            self.compositor.set_back_buffer(Resource(image));
            // Short detour onto the swapchain image with the scene depth
            if frame % 50 < 2 {
                passes.push(ScriptedPass::new(image, Some(SCENE_DEPTH)));
            }
        }
        passes.extend((0..3).map(|_| ScriptedPass::new(scene_target, Some(SCENE_DEPTH))));
        passes.extend((0..8).map(|_| ScriptedPass::new(HUD_ATLAS, None)));
        passes
    }

    fn run(&mut self, frames: u64) {
        self.engine.on_init();
        for frame in 1..=frames {
            self.now += Duration::from_micros(16_667);
            self.engine.on_present(&mut self.device, &mut self.compositor, self.now);

            match self.scenario {
                Scenario::Reload if frame % 90 == 0 => {
                    let decision = self.engine.on_reloaded_effects();
                    log::info!("Reload at frame {}: {:?}", frame, decision);
                }
                Scenario::Weather if frame % 300 == 0 => {
                    self.trigger.notify_weather_change(u32::try_from(frame / 300).unwrap_or(u32::MAX));
                }
                _ => {}
            }
            self.trigger.request_injection();

            for pass in self.script(frame) {
                self.engine.on_bind_render_targets(&self.device, &self.compositor, &pass.targets, pass.depth);
                let outcome = self.engine.on_begin_render_pass(
                    &mut self.device,
                    &mut self.compositor,
                    CommandList(1),
                    &pass.targets,
                    pass.depth,
                );
                if matches!(outcome, PassOutcome::Injected { .. }) {
                    self.injections += 1;
                }
            }
        }
    }

    fn finish(mut self) -> SelectorSnapshot {
        let snapshot = self.engine.snapshot();
        self.engine.on_destroy(&mut self.device);
        log::info!(
            "Replay finished: {} injections, {} render calls, {} live depth views after destroy",
            self.injections,
            self.compositor.render_calls().len(),
            self.device.live_created_views()
        );
        snapshot
    }
}

fn main() -> Result<(), ReplayError> {
    let cli = Cli::parse();
    let config = cli.selector_config()?;
    logging::init(&config.logging);
    log::info!("Replaying {:?} for {} frames", cli.scenario, cli.frames);

    let mut replay = Replay::new(cli.scenario, config)?;
    replay.run(cli.frames);
    let snapshot = replay.finish();

    let text = ron::ser::to_string_pretty(&snapshot, ron::ser::PrettyConfig::default())?;
    println!("{}", text);
    Ok(())
}
