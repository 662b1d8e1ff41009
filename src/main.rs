#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info, warn};
use tracing_subscriber::FmtSubscriber;

use avatar_settings::config;
use avatar_settings::{
    AudioChannel, BodyPart, CoordinatorOptions, Rgba, RuntimeConfig, ScaleTarget, SettingsCoordinator,
    UserSettingsRepository,
};

#[derive(Parser, Debug)]
#[command(name = "avatar-settings", about = "Inspect and edit persisted avatar and audio settings")]
struct Cli {
    /// Directory holding user_settings.json (overrides AVATAR_SETTINGS_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current settings summary
    Show,
    /// Print the settings file location
    Path,
    /// Set a body part color from RRGGBB or AARRGGBB hex
    SetColor { part: BodyPart, color: Rgba },
    /// Set a scale; snapped to 0.1 steps within 0.5..=1.5
    SetScale {
        target: ScaleTarget,
        #[arg(allow_hyphen_values = true)]
        value: f32,
    },
    /// Step a scale by 0.1
    Scale { target: ScaleTarget, direction: Direction },
    /// Set a channel volume; clamped to 0..=1
    SetVolume {
        channel: AudioChannel,
        #[arg(allow_hyphen_values = true)]
        value: f32,
    },
    Mute { channel: AudioChannel, state: MuteState },
    /// Mute everything, or unmute everything if anything is muted
    MuteAll,
    Randomize { scope: RandomScope },
    /// Sweep a volume in small steps and let autosave persist the result
    Slide {
        channel: AudioChannel,
        from: f32,
        to: f32,
        #[arg(long, default_value_t = 5)]
        steps: u32,
        #[arg(long, default_value_t = 200)]
        interval_ms: u64,
    },
    /// Restore defaults and save
    Reset,
    /// Delete the settings file and restore defaults in memory
    Delete,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MuteState {
    On,
    Off,
    Toggle,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RandomScope {
    Character,
    Audio,
    All,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Subscriber first so config parsing problems are reported
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config::log_level_from_env())
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("installing tracing subscriber")?;

    let config = RuntimeConfig::from_env(cli.data_dir.clone());

    debug!(config = ?config, "Resolved runtime config");

    if let Command::Path = cli.command {
        println!("{}", config.settings_file().display());
        return Ok(());
    }

    let repository = Arc::new(UserSettingsRepository::new(config.settings_file()));
    let coordinator = SettingsCoordinator::new(
        repository,
        CoordinatorOptions {
            autosave_delay: config.autosave_delay,
        },
    );
    coordinator.initialize().await;

    let outcome = run(&coordinator, &config, cli.command).await;
    coordinator.shutdown();
    outcome?;

    let summary = serde_json::to_string_pretty(&coordinator.get_summary()).context("formatting settings summary")?;
    println!("{summary}");
    Ok(())
}

async fn run(coordinator: &SettingsCoordinator, config: &RuntimeConfig, command: Command) -> Result<()> {
    match command {
        Command::Show | Command::Path => return Ok(()),
        Command::SetColor { part, color } => {
            coordinator.update_body_part_color(part, color);
            info!(part = ?part, color = %color, "Color updated");
        }
        Command::SetScale { target, value } => {
            let applied = coordinator.update_scale(target, value);
            info!(scale_target = ?target, requested = value, applied, "Scale updated");
        }
        Command::Scale { target, direction } => {
            let applied = match (target, direction) {
                (ScaleTarget::Head, Direction::Up) => coordinator.increase_head_scale(),
                (ScaleTarget::Head, Direction::Down) => coordinator.decrease_head_scale(),
                (ScaleTarget::Foot, Direction::Up) => coordinator.increase_foot_scale(),
                (ScaleTarget::Foot, Direction::Down) => coordinator.decrease_foot_scale(),
            };
            info!(scale_target = ?target, applied, "Scale stepped");
        }
        Command::SetVolume { channel, value } => {
            let applied = coordinator.update_audio_volume(channel, value);
            info!(channel = ?channel, requested = value, applied, "Volume updated");
        }
        Command::Mute { channel, state } => {
            let muted = match state {
                MuteState::On => {
                    coordinator.update_audio_mute(channel, true);
                    true
                }
                MuteState::Off => {
                    coordinator.update_audio_mute(channel, false);
                    false
                }
                MuteState::Toggle => coordinator.toggle_mute(channel),
            };
            info!(channel = ?channel, muted, "Mute updated");
        }
        Command::MuteAll => {
            let muted = coordinator.toggle_all_mute();
            info!(muted, "All channels updated");
        }
        Command::Randomize { scope } => {
            let mut rng = rand::thread_rng();
            if matches!(scope, RandomScope::Character | RandomScope::All) {
                coordinator.randomize_character(&mut rng);
            }
            if matches!(scope, RandomScope::Audio | RandomScope::All) {
                coordinator.randomize_audio(&mut rng);
            }
        }
        Command::Slide {
            channel,
            from,
            to,
            steps,
            interval_ms,
        } => {
            slide(coordinator, config, channel, from, to, steps, interval_ms).await?;
            return Ok(());
        }
        Command::Reset => {
            coordinator.reset_to_default().await.context("resetting settings")?;
            return Ok(());
        }
        Command::Delete => {
            coordinator.delete_settings().await.context("deleting settings")?;
            return Ok(());
        }
    }

    coordinator.save().await.context("saving settings")
}

async fn slide(
    coordinator: &SettingsCoordinator,
    config: &RuntimeConfig,
    channel: AudioChannel,
    from: f32,
    to: f32,
    steps: u32,
    interval_ms: u64,
) -> Result<()> {
    let steps = steps.max(1);
    let interval = Duration::from_millis(interval_ms);

    for step in 0..=steps {
        let value = from + (to - from) * step as f32 / steps as f32;
        let applied = coordinator.update_audio_volume(channel, value);
        debug!(channel = ?channel, step, applied, "Slide step");
        if step < steps {
            tokio::time::sleep(interval).await;
        }
    }

    info!(
        channel = ?channel,
        wait_ms = config.autosave_delay.as_millis() as u64,
        "Waiting for autosave"
    );
    tokio::time::sleep(config.autosave_delay + Duration::from_millis(250)).await;

    if coordinator.is_dirty() {
        warn!("Autosave did not complete, saving now");
        coordinator.save().await.context("saving settings after slide")?;
    }
    Ok(())
}
