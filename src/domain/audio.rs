//! Audio settings: per-channel volume and mute flags

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::volume;
use crate::reactive::{self, CompositeSubscription, ReactiveProperty, Subscription};

/// Audio channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum AudioChannel {
    Bgm,
    Se,
    Voice,
}

impl AudioChannel {
    pub const ALL: [AudioChannel; 3] = [AudioChannel::Bgm, AudioChannel::Se, AudioChannel::Voice];
}

/// Plain value form of [`AudioSettings`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioData {
    pub bgm_volume: f32,
    pub se_volume: f32,
    pub voice_volume: f32,
    pub is_bgm_muted: bool,
    pub is_se_muted: bool,
    pub is_voice_muted: bool,
}

impl Default for AudioData {
    fn default() -> Self {
        Self {
            bgm_volume: volume::DEFAULT,
            se_volume: volume::DEFAULT,
            voice_volume: volume::DEFAULT,
            is_bgm_muted: false,
            is_se_muted: false,
            is_voice_muted: false,
        }
    }
}

impl AudioData {
    pub fn volume(&self, channel: AudioChannel) -> f32 {
        match channel {
            AudioChannel::Bgm => self.bgm_volume,
            AudioChannel::Se => self.se_volume,
            AudioChannel::Voice => self.voice_volume,
        }
    }

    pub fn is_muted(&self, channel: AudioChannel) -> bool {
        match channel {
            AudioChannel::Bgm => self.is_bgm_muted,
            AudioChannel::Se => self.is_se_muted,
            AudioChannel::Voice => self.is_voice_muted,
        }
    }

    pub fn effective_volume(&self, channel: AudioChannel) -> f32 {
        effective(self.volume(channel), self.is_muted(channel))
    }
}

fn effective(volume: f32, muted: bool) -> f32 {
    if muted { 0.0 } else { volume }
}

/// Reactive audio settings
///
/// Volumes are clamped to [0, 1] on write; reads never clamp.
#[derive(Debug)]
pub struct AudioSettings {
    bgm_volume: ReactiveProperty<f32>,
    se_volume: ReactiveProperty<f32>,
    voice_volume: ReactiveProperty<f32>,
    is_bgm_muted: ReactiveProperty<bool>,
    is_se_muted: ReactiveProperty<bool>,
    is_voice_muted: ReactiveProperty<bool>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSettings {
    pub fn new() -> Self {
        let defaults = AudioData::default();
        Self {
            bgm_volume: ReactiveProperty::new(defaults.bgm_volume),
            se_volume: ReactiveProperty::new(defaults.se_volume),
            voice_volume: ReactiveProperty::new(defaults.voice_volume),
            is_bgm_muted: ReactiveProperty::new(defaults.is_bgm_muted),
            is_se_muted: ReactiveProperty::new(defaults.is_se_muted),
            is_voice_muted: ReactiveProperty::new(defaults.is_voice_muted),
        }
    }

    pub fn volume_property(&self, channel: AudioChannel) -> &ReactiveProperty<f32> {
        match channel {
            AudioChannel::Bgm => &self.bgm_volume,
            AudioChannel::Se => &self.se_volume,
            AudioChannel::Voice => &self.voice_volume,
        }
    }

    pub fn mute_property(&self, channel: AudioChannel) -> &ReactiveProperty<bool> {
        match channel {
            AudioChannel::Bgm => &self.is_bgm_muted,
            AudioChannel::Se => &self.is_se_muted,
            AudioChannel::Voice => &self.is_voice_muted,
        }
    }

    pub fn volume(&self, channel: AudioChannel) -> f32 {
        self.volume_property(channel).get()
    }

    /// Store `clamp01(raw)` and return it
    pub fn set_volume(&self, channel: AudioChannel, raw: f32) -> f32 {
        let property = self.volume_property(channel);
        let stored = if raw.is_nan() {
            debug!(channel = ?channel, "Ignoring NaN volume, keeping current value");
            property.get()
        } else {
            raw.clamp(volume::MIN, volume::MAX)
        };
        property.set(stored);
        stored
    }

    pub fn is_muted(&self, channel: AudioChannel) -> bool {
        self.mute_property(channel).get()
    }

    pub fn set_mute(&self, channel: AudioChannel, muted: bool) {
        self.mute_property(channel).set(muted);
    }

    pub fn toggle_mute(&self, channel: AudioChannel) -> bool {
        self.mute_property(channel).update(|muted| !muted)
    }

    /// If any channel is muted, unmute all; otherwise mute all
    pub fn toggle_all_mute(&self) -> bool {
        let any_muted = AudioChannel::ALL.iter().any(|c| self.is_muted(*c));
        let next = !any_muted;
        for channel in AudioChannel::ALL {
            self.set_mute(channel, next);
        }
        next
    }

    /// Volume after applying the mute flag
    pub fn effective_volume(&self, channel: AudioChannel) -> f32 {
        effective(self.volume(channel), self.is_muted(channel))
    }

    pub fn subscribe_volume(
        &self,
        channel: AudioChannel,
        observer: impl Fn(&f32) + Send + Sync + 'static,
    ) -> Subscription {
        self.volume_property(channel).subscribe(observer)
    }

    pub fn subscribe_mute(
        &self,
        channel: AudioChannel,
        observer: impl Fn(&bool) + Send + Sync + 'static,
    ) -> Subscription {
        self.mute_property(channel).subscribe(observer)
    }

    /// Observe the effective volume, recomputed when either volume or mute changes
    pub fn subscribe_effective_volume(
        &self,
        channel: AudioChannel,
        observer: impl Fn(&f32) + Send + Sync + 'static,
    ) -> CompositeSubscription {
        reactive::combine_latest(
            self.volume_property(channel),
            self.mute_property(channel),
            |volume, muted| effective(*volume, *muted),
            observer,
        )
    }

    /// Restore defaults; every field notifies once
    pub fn reset_to_default(&self) {
        let defaults = AudioData::default();
        self.bgm_volume.set(defaults.bgm_volume);
        self.se_volume.set(defaults.se_volume);
        self.voice_volume.set(defaults.voice_volume);
        self.is_bgm_muted.set(defaults.is_bgm_muted);
        self.is_se_muted.set(defaults.is_se_muted);
        self.is_voice_muted.set(defaults.is_voice_muted);
    }

    pub fn to_data(&self) -> AudioData {
        AudioData {
            bgm_volume: self.bgm_volume.get(),
            se_volume: self.se_volume.get(),
            voice_volume: self.voice_volume.get(),
            is_bgm_muted: self.is_bgm_muted.get(),
            is_se_muted: self.is_se_muted.get(),
            is_voice_muted: self.is_voice_muted.get(),
        }
    }

    /// Push `data` through the setters so volume clamping is re-enforced
    pub fn apply_data(&self, data: &AudioData) {
        for channel in AudioChannel::ALL {
            self.set_volume(channel, data.volume(channel));
        }
        for channel in AudioChannel::ALL {
            self.set_mute(channel, data.is_muted(channel));
        }
    }
}
