//! Reactive domain models
//!
//! - **character**: body-part colors and head/foot scale
//! - **audio**: channel volumes and mute flags

pub mod audio;
pub mod character;

pub use audio::{AudioChannel, AudioData, AudioSettings};
pub use character::{BodyPart, CharacterAppearance, CharacterData, ScaleTarget};
