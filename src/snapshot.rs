//! Serializable settings snapshot and the pure codec around it
//!
//! A snapshot is built transiently for each save/load and never retained.
//! Decoding does not clamp scales or volumes; that happens when the decoded
//! values are pushed back through the domain setters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::snapshot::CURRENT_VERSION;
use crate::domain::{AudioData, AudioSettings, CharacterAppearance, CharacterData};
use crate::error::DecodeError;

/// Flat persisted form of all settings plus schema metadata
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSnapshot {
    pub character: CharacterData,
    pub audio: AudioData,
    pub version: u32,
    /// Unix epoch milliseconds (UTC); 0 until first saved
    pub last_saved_at: i64,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            character: CharacterData::default(),
            audio: AudioData::default(),
            version: CURRENT_VERSION,
            last_saved_at: 0,
        }
    }
}

impl SettingsSnapshot {
    /// `None` for a snapshot that was never saved
    pub fn last_saved_datetime(&self) -> Option<DateTime<Utc>> {
        if self.last_saved_at <= 0 {
            return None;
        }
        DateTime::from_timestamp_millis(self.last_saved_at)
    }

    pub fn stamp_now(&mut self) {
        self.last_saved_at = now_millis();
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Capture the current domain state
pub fn encode(character: &CharacterAppearance, audio: &AudioSettings) -> SettingsSnapshot {
    SettingsSnapshot {
        character: character.to_data(),
        audio: audio.to_data(),
        version: CURRENT_VERSION,
        last_saved_at: now_millis(),
    }
}

/// Validate a snapshot and split it into domain values
pub fn decode(snapshot: &SettingsSnapshot) -> Result<(CharacterData, AudioData), DecodeError> {
    validate(snapshot)?;
    Ok((snapshot.character, snapshot.audio))
}

/// Check the schema version and that every number is finite
///
/// JSON has no encoding for NaN or infinity, so a snapshot failing this check
/// would not load back.
pub fn validate(snapshot: &SettingsSnapshot) -> Result<(), DecodeError> {
    if snapshot.version == 0 || snapshot.version > CURRENT_VERSION {
        return Err(DecodeError::UnsupportedVersion {
            found: snapshot.version,
            supported: CURRENT_VERSION,
        });
    }

    let character = &snapshot.character;
    let colors = [
        ("character.rightHandColor", character.right_hand_color),
        ("character.leftHandColor", character.left_hand_color),
        ("character.rightFootColor", character.right_foot_color),
        ("character.leftFootColor", character.left_foot_color),
    ];
    for (field, color) in colors {
        if !color.is_finite() {
            return Err(DecodeError::NonFinite { field });
        }
    }

    let audio = &snapshot.audio;
    let scalars = [
        ("character.headScale", character.head_scale),
        ("character.footScale", character.foot_scale),
        ("audio.bgmVolume", audio.bgm_volume),
        ("audio.seVolume", audio.se_volume),
        ("audio.voiceVolume", audio.voice_volume),
    ];
    for (field, value) in scalars {
        if !value.is_finite() {
            return Err(DecodeError::NonFinite { field });
        }
    }

    Ok(())
}

/// Parse the on-disk text form
pub fn parse(text: &str) -> Result<SettingsSnapshot, DecodeError> {
    Ok(serde_json::from_str(text)?)
}

/// Render the on-disk text form
pub fn to_json(snapshot: &SettingsSnapshot) -> serde_json::Result<String> {
    serde_json::to_string_pretty(snapshot)
}
