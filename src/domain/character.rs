//! Character appearance: body-part colors and body scales

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::color::Rgba;
use crate::constants::scale;
use crate::reactive::{ReactiveProperty, Subscription};

/// Colorable body parts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum BodyPart {
    RightHand,
    LeftHand,
    RightFoot,
    LeftFoot,
}

impl BodyPart {
    pub const ALL: [BodyPart; 4] = [
        BodyPart::RightHand,
        BodyPart::LeftHand,
        BodyPart::RightFoot,
        BodyPart::LeftFoot,
    ];
}

/// Scalable body regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum ScaleTarget {
    Head,
    Foot,
}

impl ScaleTarget {
    pub const ALL: [ScaleTarget; 2] = [ScaleTarget::Head, ScaleTarget::Foot];
}

/// Plain value form of a [`CharacterAppearance`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterData {
    pub right_hand_color: Rgba,
    pub left_hand_color: Rgba,
    pub right_foot_color: Rgba,
    pub left_foot_color: Rgba,
    pub head_scale: f32,
    pub foot_scale: f32,
}

impl Default for CharacterData {
    fn default() -> Self {
        Self {
            right_hand_color: Rgba::WHITE,
            left_hand_color: Rgba::WHITE,
            right_foot_color: Rgba::WHITE,
            left_foot_color: Rgba::WHITE,
            head_scale: scale::DEFAULT,
            foot_scale: scale::DEFAULT,
        }
    }
}

/// Clamp to [MIN, MAX] then round to the nearest STEP (half away from zero)
///
/// NaN has no meaningful position in the range and yields `None`.
pub fn quantize_scale(raw: f32) -> Option<f32> {
    if raw.is_nan() {
        return None;
    }
    let clamped = raw.clamp(scale::MIN, scale::MAX);
    Some((clamped * scale::STEPS_PER_UNIT).round() / scale::STEPS_PER_UNIT)
}

/// Reactive character appearance
///
/// Every setter notifies observers, including writes of an unchanged value.
#[derive(Debug)]
pub struct CharacterAppearance {
    right_hand_color: ReactiveProperty<Rgba>,
    left_hand_color: ReactiveProperty<Rgba>,
    right_foot_color: ReactiveProperty<Rgba>,
    left_foot_color: ReactiveProperty<Rgba>,
    head_scale: ReactiveProperty<f32>,
    foot_scale: ReactiveProperty<f32>,
}

impl Default for CharacterAppearance {
    fn default() -> Self {
        Self::new()
    }
}

impl CharacterAppearance {
    pub fn new() -> Self {
        let defaults = CharacterData::default();
        Self {
            right_hand_color: ReactiveProperty::new(defaults.right_hand_color),
            left_hand_color: ReactiveProperty::new(defaults.left_hand_color),
            right_foot_color: ReactiveProperty::new(defaults.right_foot_color),
            left_foot_color: ReactiveProperty::new(defaults.left_foot_color),
            head_scale: ReactiveProperty::new(defaults.head_scale),
            foot_scale: ReactiveProperty::new(defaults.foot_scale),
        }
    }

    pub fn color_property(&self, part: BodyPart) -> &ReactiveProperty<Rgba> {
        match part {
            BodyPart::RightHand => &self.right_hand_color,
            BodyPart::LeftHand => &self.left_hand_color,
            BodyPart::RightFoot => &self.right_foot_color,
            BodyPart::LeftFoot => &self.left_foot_color,
        }
    }

    pub fn scale_property(&self, target: ScaleTarget) -> &ReactiveProperty<f32> {
        match target {
            ScaleTarget::Head => &self.head_scale,
            ScaleTarget::Foot => &self.foot_scale,
        }
    }

    pub fn color(&self, part: BodyPart) -> Rgba {
        self.color_property(part).get()
    }

    pub fn set_color(&self, part: BodyPart, color: Rgba) {
        self.color_property(part).set(color);
    }

    pub fn scale(&self, target: ScaleTarget) -> f32 {
        self.scale_property(target).get()
    }

    /// Store the clamped, quantized scale and return it
    pub fn set_scale(&self, target: ScaleTarget, raw: f32) -> f32 {
        let property = self.scale_property(target);
        let stored = quantize_scale(raw).unwrap_or_else(|| {
            debug!(scale_target = ?target, "Ignoring NaN scale, keeping current value");
            property.get()
        });
        property.set(stored);
        stored
    }

    pub fn increase_scale(&self, target: ScaleTarget) -> f32 {
        self.set_scale(target, self.scale(target) + scale::STEP)
    }

    pub fn decrease_scale(&self, target: ScaleTarget) -> f32 {
        self.set_scale(target, self.scale(target) - scale::STEP)
    }

    /// Subscribe (replay-latest) to a body part color
    pub fn subscribe_color(
        &self,
        part: BodyPart,
        observer: impl Fn(&Rgba) + Send + Sync + 'static,
    ) -> Subscription {
        self.color_property(part).subscribe(observer)
    }

    /// Subscribe (replay-latest) to a body scale
    pub fn subscribe_scale(
        &self,
        target: ScaleTarget,
        observer: impl Fn(&f32) + Send + Sync + 'static,
    ) -> Subscription {
        self.scale_property(target).subscribe(observer)
    }

    /// Restore defaults; every field notifies once
    pub fn reset_to_default(&self) {
        let defaults = CharacterData::default();
        self.right_hand_color.set(defaults.right_hand_color);
        self.left_hand_color.set(defaults.left_hand_color);
        self.right_foot_color.set(defaults.right_foot_color);
        self.left_foot_color.set(defaults.left_foot_color);
        self.head_scale.set(defaults.head_scale);
        self.foot_scale.set(defaults.foot_scale);
    }

    pub fn to_data(&self) -> CharacterData {
        CharacterData {
            right_hand_color: self.right_hand_color.get(),
            left_hand_color: self.left_hand_color.get(),
            right_foot_color: self.right_foot_color.get(),
            left_foot_color: self.left_foot_color.get(),
            head_scale: self.head_scale.get(),
            foot_scale: self.foot_scale.get(),
        }
    }

    /// Push `data` through the setters so scale invariants are re-enforced
    pub fn apply_data(&self, data: &CharacterData) {
        self.set_color(BodyPart::RightHand, data.right_hand_color);
        self.set_color(BodyPart::LeftHand, data.left_hand_color);
        self.set_color(BodyPart::RightFoot, data.right_foot_color);
        self.set_color(BodyPart::LeftFoot, data.left_foot_color);
        self.set_scale(ScaleTarget::Head, data.head_scale);
        self.set_scale(ScaleTarget::Foot, data.foot_scale);
    }
}
