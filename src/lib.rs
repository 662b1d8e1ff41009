//! Persisted avatar appearance and audio settings
//!
//! Two observable stores ([`CharacterAppearance`], [`AudioSettings`]) hold the
//! live values. [`SettingsCoordinator`] loads them on start, tracks changes,
//! saves on demand and autosaves after a quiet window.

#![forbid(unsafe_code)]

pub mod color;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod reactive;
pub mod snapshot;

pub use color::Rgba;
pub use config::RuntimeConfig;
pub use coordinator::{CoordinatorOptions, SettingsCoordinator, SettingsSummary};
pub use domain::{
    AudioChannel, AudioData, AudioSettings, BodyPart, CharacterAppearance, CharacterData, ScaleTarget,
};
pub use error::{DecodeError, SettingsError};
pub use persistence::{SettingsPersistence, UserSettingsRepository};
pub use reactive::{CompositeSubscription, ReactiveProperty, Subscription, combine_latest};
pub use snapshot::SettingsSnapshot;
