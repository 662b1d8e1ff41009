//! Settings facade: load-on-start, manual save, debounced autosave, reset, delete
//!
//! The coordinator owns the live [`CharacterAppearance`] and [`AudioSettings`]
//! and watches all twelve of their fields. Any write marks the state dirty and
//! (re)starts the autosave quiet window; when the window elapses without
//! further writes and the state is still dirty, the snapshot is saved.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::color::Rgba;
use crate::constants::{autosave, scale};
use crate::domain::{
    AudioChannel, AudioData, AudioSettings, BodyPart, CharacterAppearance, CharacterData, ScaleTarget,
};
use crate::error::SettingsError;
use crate::persistence::SettingsPersistence;
use crate::reactive::{CompositeSubscription, ReactiveProperty};
use crate::snapshot;

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Quiet window after the last change before autosave fires
    pub autosave_delay: Duration,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            autosave_delay: autosave::QUIET_WINDOW,
        }
    }
}

/// Read-only view of coordinator + store state for display/debugging
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSummary {
    pub file_exists: bool,
    pub file_size_bytes: u64,
    pub is_dirty: bool,
    pub character: CharacterData,
    pub audio: AudioData,
}

/// Dirty flag plus a generation counter bumped on every mutation
///
/// A save only clears the flag if no mutation arrived after its snapshot was taken.
/// The counter is only touched under the flag's lock, so a check-and-clear never
/// interleaves with a mark.
struct DirtyTracker {
    dirty: ReactiveProperty<bool>,
    generation: AtomicU64,
    ticks: mpsc::UnboundedSender<()>,
}

impl DirtyTracker {
    fn new(ticks: mpsc::UnboundedSender<()>) -> Self {
        Self {
            dirty: ReactiveProperty::new(false),
            generation: AtomicU64::new(0),
            ticks,
        }
    }

    fn mark(&self) {
        self.dirty.set_if(|_| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            Some(true)
        });
        // Receiver only goes away after shutdown
        let _ = self.ticks.send(());
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    fn clear(&self) {
        self.dirty.set(false);
    }

    fn clear_if_unchanged(&self, generation: u64) -> bool {
        self.dirty.set_if(|_| (self.generation() == generation).then_some(false))
    }
}

struct Shared {
    character: CharacterAppearance,
    audio: AudioSettings,
    persistence: Arc<dyn SettingsPersistence>,
    tracker: Arc<DirtyTracker>,
    shutdown: CancellationToken,
}

impl Shared {
    async fn cancellable<F: Future>(&self, cancel: &CancellationToken, fut: F) -> Result<F::Output, SettingsError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SettingsError::Cancelled),
            _ = self.shutdown.cancelled() => Err(SettingsError::Cancelled),
            output = fut => Ok(output),
        }
    }

    async fn save(&self, cancel: &CancellationToken) -> Result<(), SettingsError> {
        let generation = self.tracker.generation();
        let snapshot = snapshot::encode(&self.character, &self.audio);
        snapshot::validate(&snapshot)?;

        self.cancellable(cancel, self.persistence.save(snapshot)).await??;

        if !self.tracker.clear_if_unchanged(generation) {
            debug!("Settings changed while saving, staying dirty");
        }
        Ok(())
    }
}

/// Public facade over the settings store, codec and persistence
pub struct SettingsCoordinator {
    shared: Arc<Shared>,
    _change_detection: CompositeSubscription,
}

impl SettingsCoordinator {
    /// Build the coordinator and start its autosave task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(persistence: Arc<dyn SettingsPersistence>, options: CoordinatorOptions) -> Self {
        let (ticks_tx, ticks_rx) = mpsc::unbounded_channel();
        let tracker = Arc::new(DirtyTracker::new(ticks_tx));

        let shared = Arc::new(Shared {
            character: CharacterAppearance::new(),
            audio: AudioSettings::new(),
            persistence,
            tracker,
            shutdown: CancellationToken::new(),
        });

        let change_detection = watch_for_changes(&shared);
        debug!(channels = change_detection.len(), "Change detection wired");

        tokio::spawn(run_autosave(Arc::clone(&shared), ticks_rx, options.autosave_delay));

        Self {
            shared,
            _change_detection: change_detection,
        }
    }

    pub fn character(&self) -> &CharacterAppearance {
        &self.shared.character
    }

    pub fn audio(&self) -> &AudioSettings {
        &self.shared.audio
    }

    /// Observable dirty flag
    pub fn dirty(&self) -> &ReactiveProperty<bool> {
        &self.shared.tracker.dirty
    }

    pub fn is_dirty(&self) -> bool {
        self.shared.tracker.is_dirty()
    }

    pub fn settings_path(&self) -> &Path {
        self.shared.persistence.path()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Load stored settings into the live stores; never fails outward
    pub async fn initialize(&self) {
        self.initialize_with_cancel(&self.shared.shutdown).await;
    }

    pub async fn initialize_with_cancel(&self, cancel: &CancellationToken) {
        info!(path = %self.settings_path().display(), "Initializing settings");

        let loaded = match self.shared.cancellable(cancel, self.shared.persistence.load()).await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(error = %e, "Settings initialization interrupted, keeping defaults");
                return;
            }
        };

        let (character, audio) = match snapshot::decode(&loaded) {
            Ok(decoded) => decoded,
            Err(e) => {
                error!(error = %e, "Stored settings are invalid, keeping defaults");
                return;
            }
        };

        self.shared.character.apply_data(&character);
        self.shared.audio.apply_data(&audio);
        self.shared.tracker.clear();

        match loaded.last_saved_datetime() {
            Some(saved_at) => info!(version = loaded.version, last_saved_at = %saved_at, "Settings initialized"),
            None => info!(version = loaded.version, "Settings initialized, never saved"),
        }
    }

    /// Persist the current state; clears the dirty flag on success
    pub async fn save(&self) -> Result<(), SettingsError> {
        self.save_with_cancel(&self.shared.shutdown).await
    }

    pub async fn save_with_cancel(&self, cancel: &CancellationToken) -> Result<(), SettingsError> {
        self.shared.save(cancel).await.inspect_err(|e| {
            error!(error = %e, "Manual save failed");
        })?;
        info!("Settings saved");
        Ok(())
    }

    /// Restore defaults in memory, then save immediately
    pub async fn reset_to_default(&self) -> Result<(), SettingsError> {
        info!("Resetting settings to defaults");
        self.shared.character.reset_to_default();
        self.shared.audio.reset_to_default();
        self.save().await
    }

    /// Delete the stored file and reset memory
    ///
    /// The in-memory reset happens even when the delete fails; the delete
    /// error is still returned.
    pub async fn delete_settings(&self) -> Result<(), SettingsError> {
        self.delete_settings_with_cancel(&self.shared.shutdown).await
    }

    pub async fn delete_settings_with_cancel(&self, cancel: &CancellationToken) -> Result<(), SettingsError> {
        let result = self
            .shared
            .cancellable(cancel, self.shared.persistence.delete())
            .await
            .and_then(|deleted| deleted);

        self.shared.character.reset_to_default();
        self.shared.audio.reset_to_default();
        self.shared.tracker.clear();

        match &result {
            Ok(()) => info!("Settings deleted"),
            Err(e) => error!(error = %e, "Failed to delete settings file, memory was reset anyway"),
        }
        result
    }

    pub fn get_summary(&self) -> SettingsSummary {
        let persistence = &self.shared.persistence;
        SettingsSummary {
            file_exists: persistence.exists(),
            file_size_bytes: persistence.file_size_bytes(),
            is_dirty: self.is_dirty(),
            character: self.shared.character.to_data(),
            audio: self.shared.audio.to_data(),
        }
    }

    /// Cancel the autosave task and any pending quiet window
    ///
    /// Changes not yet saved are lost. Later I/O calls that use the
    /// coordinator's own token return [`SettingsError::Cancelled`].
    pub fn shutdown(&self) {
        if !self.shared.shutdown.is_cancelled() {
            info!(dirty = self.is_dirty(), "Shutting down settings coordinator");
            self.shared.shutdown.cancel();
        }
    }

    // ------------------------------------------------------------------
    // Character updates
    // ------------------------------------------------------------------

    pub fn update_right_hand_color(&self, color: Rgba) {
        self.update_body_part_color(BodyPart::RightHand, color);
    }

    pub fn update_left_hand_color(&self, color: Rgba) {
        self.update_body_part_color(BodyPart::LeftHand, color);
    }

    pub fn update_right_foot_color(&self, color: Rgba) {
        self.update_body_part_color(BodyPart::RightFoot, color);
    }

    pub fn update_left_foot_color(&self, color: Rgba) {
        self.update_body_part_color(BodyPart::LeftFoot, color);
    }

    pub fn update_body_part_color(&self, part: BodyPart, color: Rgba) {
        self.shared.character.set_color(part, color);
    }

    pub fn update_head_scale(&self, raw: f32) -> f32 {
        self.shared.character.set_scale(ScaleTarget::Head, raw)
    }

    pub fn update_foot_scale(&self, raw: f32) -> f32 {
        self.shared.character.set_scale(ScaleTarget::Foot, raw)
    }

    pub fn update_scale(&self, target: ScaleTarget, raw: f32) -> f32 {
        self.shared.character.set_scale(target, raw)
    }

    pub fn increase_head_scale(&self) -> f32 {
        self.shared.character.increase_scale(ScaleTarget::Head)
    }

    pub fn decrease_head_scale(&self) -> f32 {
        self.shared.character.decrease_scale(ScaleTarget::Head)
    }

    pub fn increase_foot_scale(&self) -> f32 {
        self.shared.character.increase_scale(ScaleTarget::Foot)
    }

    pub fn decrease_foot_scale(&self) -> f32 {
        self.shared.character.decrease_scale(ScaleTarget::Foot)
    }

    /// Both hands share one color, both feet another
    pub fn update_character_settings(&self, hand_color: Rgba, foot_color: Rgba, head_scale: f32, foot_scale: f32) {
        let character = &self.shared.character;
        character.set_color(BodyPart::RightHand, hand_color);
        character.set_color(BodyPart::LeftHand, hand_color);
        character.set_color(BodyPart::RightFoot, foot_color);
        character.set_color(BodyPart::LeftFoot, foot_color);
        character.set_scale(ScaleTarget::Head, head_scale);
        character.set_scale(ScaleTarget::Foot, foot_scale);
    }

    pub fn randomize_character<R: Rng + ?Sized>(&self, rng: &mut R) {
        let palette = &Rgba::PALETTE;
        let hand_color = palette[rng.gen_range(0..palette.len())];
        let foot_color = palette[rng.gen_range(0..palette.len())];
        let head_scale = rng.gen_range(scale::MIN..scale::MAX);
        let foot_scale = rng.gen_range(scale::MIN..scale::MAX);
        self.update_character_settings(hand_color, foot_color, head_scale, foot_scale);
    }

    // ------------------------------------------------------------------
    // Audio updates
    // ------------------------------------------------------------------

    pub fn update_bgm_volume(&self, raw: f32) -> f32 {
        self.update_audio_volume(AudioChannel::Bgm, raw)
    }

    pub fn update_se_volume(&self, raw: f32) -> f32 {
        self.update_audio_volume(AudioChannel::Se, raw)
    }

    pub fn update_voice_volume(&self, raw: f32) -> f32 {
        self.update_audio_volume(AudioChannel::Voice, raw)
    }

    pub fn update_audio_volume(&self, channel: AudioChannel, raw: f32) -> f32 {
        self.shared.audio.set_volume(channel, raw)
    }

    pub fn update_bgm_mute(&self, muted: bool) {
        self.update_audio_mute(AudioChannel::Bgm, muted);
    }

    pub fn update_se_mute(&self, muted: bool) {
        self.update_audio_mute(AudioChannel::Se, muted);
    }

    pub fn update_voice_mute(&self, muted: bool) {
        self.update_audio_mute(AudioChannel::Voice, muted);
    }

    pub fn update_audio_mute(&self, channel: AudioChannel, muted: bool) {
        self.shared.audio.set_mute(channel, muted);
    }

    pub fn toggle_mute(&self, channel: AudioChannel) -> bool {
        self.shared.audio.toggle_mute(channel)
    }

    pub fn toggle_all_mute(&self) -> bool {
        self.shared.audio.toggle_all_mute()
    }

    pub fn update_audio_settings(&self, data: &AudioData) {
        self.shared.audio.apply_data(data);
    }

    pub fn update_all_volumes(&self, raw: f32) {
        for channel in AudioChannel::ALL {
            self.shared.audio.set_volume(channel, raw);
        }
    }

    pub fn randomize_audio<R: Rng + ?Sized>(&self, rng: &mut R) {
        let data = AudioData {
            bgm_volume: rng.gen_range(0.0..1.0),
            se_volume: rng.gen_range(0.0..1.0),
            voice_volume: rng.gen_range(0.0..1.0),
            is_bgm_muted: rng.gen_bool(0.5),
            is_se_muted: rng.gen_bool(0.5),
            is_voice_muted: rng.gen_bool(0.5),
        };
        self.update_audio_settings(&data);
    }
}

impl Drop for SettingsCoordinator {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

/// Subscribe to every mutable field (without replay) and mark dirty on each write
fn watch_for_changes(shared: &Shared) -> CompositeSubscription {
    let mut subscriptions = CompositeSubscription::new();

    for part in BodyPart::ALL {
        let tracker = Arc::clone(&shared.tracker);
        subscriptions.add(shared.character.color_property(part).observe_changes(move |_| tracker.mark()));
    }
    for target in ScaleTarget::ALL {
        let tracker = Arc::clone(&shared.tracker);
        subscriptions.add(shared.character.scale_property(target).observe_changes(move |_| tracker.mark()));
    }
    for channel in AudioChannel::ALL {
        let tracker = Arc::clone(&shared.tracker);
        subscriptions.add(shared.audio.volume_property(channel).observe_changes(move |_| tracker.mark()));
        let tracker = Arc::clone(&shared.tracker);
        subscriptions.add(shared.audio.mute_property(channel).observe_changes(move |_| tracker.mark()));
    }

    subscriptions
}

/// Debounce loop: each dirty tick restarts the quiet window
async fn run_autosave(shared: Arc<Shared>, mut ticks: mpsc::UnboundedReceiver<()>, delay: Duration) {
    let shutdown = shared.shutdown.clone();
    debug!(delay_ms = delay.as_millis() as u64, "Autosave task started");

    'outer: loop {
        tokio::select! {
            _ = shutdown.cancelled() => break 'outer,
            tick = ticks.recv() => {
                if tick.is_none() {
                    break 'outer;
                }
            }
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Pending autosave cancelled");
                    break 'outer;
                }
                tick = ticks.recv() => {
                    if tick.is_none() {
                        break 'outer;
                    }
                }
                _ = tokio::time::sleep(delay) => break,
            }
        }

        if !shared.tracker.is_dirty() {
            debug!("Quiet window elapsed but settings are clean, skipping autosave");
            continue;
        }

        match shared.save(&shutdown).await {
            Ok(()) => info!("Autosave completed"),
            Err(SettingsError::Cancelled) => debug!("Autosave cancelled mid-write"),
            Err(e) => error!(error = %e, "Autosave failed, will retry after next change"),
        }
    }

    debug!("Autosave task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::UserSettingsRepository;
    use crate::snapshot::SettingsSnapshot;
    use async_trait::async_trait;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicBool;
    use tokio::time::{Instant, sleep};

    /// In-memory persistence that records every save
    #[derive(Default)]
    struct RecordingPersistence {
        stored: Mutex<Option<SettingsSnapshot>>,
        saves: Mutex<Vec<(Instant, SettingsSnapshot)>>,
        fail_saves: AtomicBool,
        fail_deletes: AtomicBool,
        save_delay: Option<Duration>,
        path: PathBuf,
    }

    impl RecordingPersistence {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn with_stored(snapshot: SettingsSnapshot) -> Arc<Self> {
            let persistence = Self::default();
            *persistence.stored.lock().unwrap() = Some(snapshot);
            Arc::new(persistence)
        }

        fn with_save_delay(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                save_delay: Some(delay),
                ..Self::default()
            })
        }

        fn save_count(&self) -> usize {
            self.saves.lock().unwrap().len()
        }

        fn last_save(&self) -> Option<(Instant, SettingsSnapshot)> {
            self.saves.lock().unwrap().last().copied()
        }
    }

    #[async_trait]
    impl SettingsPersistence for RecordingPersistence {
        async fn load(&self) -> SettingsSnapshot {
            (*self.stored.lock().unwrap()).unwrap_or_default()
        }

        async fn save(&self, snapshot: SettingsSnapshot) -> Result<(), SettingsError> {
            if let Some(delay) = self.save_delay {
                sleep(delay).await;
            }
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(SettingsError::io(
                    "write",
                    "memory",
                    std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
                ));
            }
            let mut snapshot = snapshot;
            snapshot.stamp_now();
            *self.stored.lock().unwrap() = Some(snapshot);
            self.saves.lock().unwrap().push((Instant::now(), snapshot));
            Ok(())
        }

        async fn delete(&self) -> Result<(), SettingsError> {
            if self.fail_deletes.load(Ordering::SeqCst) {
                return Err(SettingsError::io(
                    "delete",
                    "memory",
                    std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked"),
                ));
            }
            *self.stored.lock().unwrap() = None;
            Ok(())
        }

        fn exists(&self) -> bool {
            self.stored.lock().unwrap().is_some()
        }

        fn file_size_bytes(&self) -> u64 {
            (*self.stored.lock().unwrap())
                .map(|s| snapshot::to_json(&s).unwrap().len() as u64)
                .unwrap_or(0)
        }

        fn path(&self) -> &Path {
            &self.path
        }
    }

    fn coordinator(persistence: &Arc<RecordingPersistence>) -> SettingsCoordinator {
        SettingsCoordinator::new(persistence.clone(), CoordinatorOptions::default())
    }

    fn assert_close(actual: f32, expected: f32) {
        assert!((actual - expected).abs() < 0.001, "expected {expected}, got {actual}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_without_stored_settings_is_clean_defaults() {
        let persistence = RecordingPersistence::new();
        let coordinator = coordinator(&persistence);

        coordinator.initialize().await;

        assert!(!coordinator.is_dirty());
        let summary = coordinator.get_summary();
        assert_eq!(summary.character, CharacterData::default());
        assert_eq!(summary.audio, AudioData::default());
        assert!(!summary.file_exists);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_applies_and_requantizes_stored_values() {
        let mut stored = SettingsSnapshot::default();
        stored.character.head_scale = 0.851;
        stored.character.left_foot_color = Rgba::BLUE;
        stored.audio.voice_volume = 1.7;
        stored.audio.is_se_muted = true;
        let persistence = RecordingPersistence::with_stored(stored);
        let coordinator = coordinator(&persistence);

        coordinator.initialize().await;

        assert_close(coordinator.character().scale(ScaleTarget::Head), 0.9);
        assert_eq!(coordinator.character().color(BodyPart::LeftFoot), Rgba::BLUE);
        assert_eq!(coordinator.audio().volume(AudioChannel::Voice), 1.0);
        assert!(coordinator.audio().is_muted(AudioChannel::Se));
        assert!(!coordinator.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_does_not_trigger_autosave() {
        let mut stored = SettingsSnapshot::default();
        stored.audio.bgm_volume = 0.5;
        let persistence = RecordingPersistence::with_stored(stored);
        let coordinator = coordinator(&persistence);

        coordinator.initialize().await;
        sleep(Duration::from_secs(10)).await;

        assert_eq!(persistence.save_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_with_invalid_snapshot_keeps_defaults() {
        let mut stored = SettingsSnapshot::default();
        stored.version = 99;
        stored.audio.bgm_volume = 0.1;
        let persistence = RecordingPersistence::with_stored(stored);
        let coordinator = coordinator(&persistence);

        coordinator.initialize().await;

        assert_eq!(coordinator.get_summary().audio, AudioData::default());
        assert!(!coordinator.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_cancelled_keeps_defaults() {
        let mut stored = SettingsSnapshot::default();
        stored.audio.se_volume = 0.3;
        let persistence = RecordingPersistence::with_stored(stored);
        let coordinator = coordinator(&persistence);
        let cancel = CancellationToken::new();
        cancel.cancel();

        coordinator.initialize_with_cancel(&cancel).await;

        assert_eq!(coordinator.audio().volume(AudioChannel::Se), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dirty_lifecycle() {
        let persistence = RecordingPersistence::new();
        let coordinator = coordinator(&persistence);
        coordinator.initialize().await;
        assert!(!coordinator.is_dirty());

        coordinator.update_head_scale(1.2);
        assert!(coordinator.is_dirty());

        coordinator.save().await.unwrap();
        assert!(!coordinator.is_dirty());
        let (_, saved) = persistence.last_save().unwrap();
        assert_close(saved.character.head_scale, 1.2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_field_marks_dirty() {
        let persistence = RecordingPersistence::new();
        let coordinator = coordinator(&persistence);
        coordinator.initialize().await;

        let updates: Vec<Box<dyn Fn(&SettingsCoordinator)>> = vec![
            Box::new(|c: &SettingsCoordinator| c.update_right_hand_color(Rgba::RED)),
            Box::new(|c: &SettingsCoordinator| c.update_left_hand_color(Rgba::RED)),
            Box::new(|c: &SettingsCoordinator| c.update_right_foot_color(Rgba::RED)),
            Box::new(|c: &SettingsCoordinator| c.update_left_foot_color(Rgba::RED)),
            Box::new(|c: &SettingsCoordinator| {
                c.update_head_scale(0.7);
            }),
            Box::new(|c: &SettingsCoordinator| {
                c.update_foot_scale(0.7);
            }),
            Box::new(|c: &SettingsCoordinator| {
                c.update_bgm_volume(0.2);
            }),
            Box::new(|c: &SettingsCoordinator| {
                c.update_se_volume(0.2);
            }),
            Box::new(|c: &SettingsCoordinator| {
                c.update_voice_volume(0.2);
            }),
            Box::new(|c: &SettingsCoordinator| c.update_bgm_mute(true)),
            Box::new(|c: &SettingsCoordinator| c.update_se_mute(true)),
            Box::new(|c: &SettingsCoordinator| c.update_voice_mute(true)),
        ];

        for update in updates {
            coordinator.save().await.unwrap();
            assert!(!coordinator.is_dirty());
            update(&coordinator);
            assert!(coordinator.is_dirty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_writing_unchanged_value_still_marks_dirty() {
        let persistence = RecordingPersistence::new();
        let coordinator = coordinator(&persistence);
        coordinator.initialize().await;

        coordinator.update_bgm_volume(1.0);

        assert!(coordinator.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_updates_autosave_once_after_quiet_window() {
        let persistence = RecordingPersistence::new();
        let coordinator = coordinator(&persistence);
        coordinator.initialize().await;

        let mut last_update = Instant::now();
        for volume in [0.9, 0.7, 0.5, 0.3, 0.1] {
            coordinator.update_bgm_volume(volume);
            last_update = Instant::now();
            sleep(Duration::from_millis(200)).await;
        }
        sleep(Duration::from_secs(5)).await;

        assert_eq!(persistence.save_count(), 1);
        let (saved_at, saved) = persistence.last_save().unwrap();
        assert!(saved_at.duration_since(last_update) >= Duration::from_secs(3));
        assert_close(saved.audio.bgm_volume, 0.1);
        assert!(!coordinator.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_change_restarts_quiet_window() {
        let persistence = RecordingPersistence::new();
        let coordinator = coordinator(&persistence);
        coordinator.initialize().await;

        coordinator.update_se_volume(0.4);
        sleep(Duration::from_secs(2)).await;
        coordinator.update_se_volume(0.6);
        sleep(Duration::from_secs(2)).await;
        assert_eq!(persistence.save_count(), 0);

        sleep(Duration::from_millis(1500)).await;
        assert_eq!(persistence.save_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_autosave_delay() {
        let persistence = RecordingPersistence::new();
        let coordinator = SettingsCoordinator::new(
            persistence.clone(),
            CoordinatorOptions {
                autosave_delay: Duration::from_millis(500),
            },
        );
        coordinator.initialize().await;

        coordinator.toggle_all_mute();
        sleep(Duration::from_millis(600)).await;

        assert_eq!(persistence.save_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_autosave() {
        let persistence = RecordingPersistence::new();
        let coordinator = coordinator(&persistence);
        coordinator.initialize().await;

        coordinator.update_voice_volume(0.2);
        sleep(Duration::from_secs(1)).await;
        coordinator.shutdown();
        sleep(Duration::from_secs(10)).await;

        assert_eq!(persistence.save_count(), 0);
        assert!(matches!(coordinator.save().await, Err(SettingsError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_autosave() {
        let persistence = RecordingPersistence::new();
        {
            let coordinator = coordinator(&persistence);
            coordinator.initialize().await;
            coordinator.update_foot_scale(0.6);
        }
        sleep(Duration::from_secs(10)).await;

        assert_eq!(persistence.save_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_manual_save_keeps_dirty() {
        let persistence = RecordingPersistence::new();
        persistence.fail_saves.store(true, Ordering::SeqCst);
        let coordinator = coordinator(&persistence);
        coordinator.initialize().await;

        coordinator.update_left_hand_color(Rgba::GRAY);
        let err = coordinator.save().await.unwrap_err();

        assert!(matches!(err, SettingsError::Io { .. }));
        assert!(coordinator.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_autosave_retries_after_next_change() {
        let persistence = RecordingPersistence::new();
        persistence.fail_saves.store(true, Ordering::SeqCst);
        let coordinator = coordinator(&persistence);
        coordinator.initialize().await;

        coordinator.update_bgm_volume(0.5);
        sleep(Duration::from_secs(4)).await;
        assert!(coordinator.is_dirty());
        assert_eq!(persistence.save_count(), 0);

        persistence.fail_saves.store(false, Ordering::SeqCst);
        coordinator.update_bgm_volume(0.6);
        sleep(Duration::from_secs(4)).await;

        assert_eq!(persistence.save_count(), 1);
        assert!(!coordinator.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_cancelled_by_token_keeps_dirty() {
        let persistence = RecordingPersistence::with_save_delay(Duration::from_secs(1));
        let coordinator = coordinator(&persistence);
        coordinator.initialize().await;
        coordinator.update_se_mute(true);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let result = coordinator.save_with_cancel(&cancel).await;

        assert!(matches!(result, Err(SettingsError::Cancelled)));
        assert!(coordinator.is_dirty());
        assert_eq!(persistence.save_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_during_save_keeps_dirty() {
        let persistence = RecordingPersistence::with_save_delay(Duration::from_secs(1));
        let coordinator = Arc::new(coordinator(&persistence));
        coordinator.initialize().await;
        coordinator.update_bgm_volume(0.3);

        let saver = Arc::clone(&coordinator);
        let save = tokio::spawn(async move { saver.save().await });
        sleep(Duration::from_millis(100)).await;
        coordinator.update_bgm_volume(0.4);
        save.await.unwrap().unwrap();

        assert!(coordinator.is_dirty());
        let (_, saved) = persistence.last_save().unwrap();
        assert_close(saved.audio.bgm_volume, 0.3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_to_default_saves_and_summary_shows_defaults() {
        let persistence = RecordingPersistence::new();
        let coordinator = coordinator(&persistence);
        coordinator.initialize().await;
        coordinator.update_right_foot_color(Rgba::BLACK);
        coordinator.update_head_scale(0.5);
        coordinator.update_all_volumes(0.2);
        coordinator.toggle_all_mute();

        coordinator.reset_to_default().await.unwrap();
        let summary = coordinator.get_summary();

        assert_eq!(summary.character, CharacterData::default());
        assert_eq!(summary.audio, AudioData::default());
        assert!(!summary.is_dirty);
        assert!(summary.file_exists);
        assert!(summary.file_size_bytes > 0);
        assert_eq!(persistence.last_save().unwrap().1.audio, AudioData::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_settings_resets_memory() {
        let persistence = RecordingPersistence::new();
        let coordinator = coordinator(&persistence);
        coordinator.initialize().await;
        coordinator.update_se_volume(0.1);
        coordinator.save().await.unwrap();

        coordinator.delete_settings().await.unwrap();

        let summary = coordinator.get_summary();
        assert!(!summary.file_exists);
        assert_eq!(summary.file_size_bytes, 0);
        assert_eq!(summary.audio, AudioData::default());
        assert!(!summary.is_dirty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_failure_still_resets_memory() {
        let persistence = RecordingPersistence::new();
        let coordinator = coordinator(&persistence);
        coordinator.initialize().await;
        coordinator.update_head_scale(1.4);
        persistence.fail_deletes.store(true, Ordering::SeqCst);

        let result = coordinator.delete_settings().await;

        assert!(matches!(result, Err(SettingsError::Io { .. })));
        assert_close(coordinator.character().scale(ScaleTarget::Head), 1.0);
        assert!(!coordinator.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_character_settings_and_body_part_dispatch() {
        let persistence = RecordingPersistence::new();
        let coordinator = coordinator(&persistence);

        coordinator.update_character_settings(Rgba::RED, Rgba::GREEN, 1.26, 0.1);
        coordinator.update_body_part_color(BodyPart::LeftFoot, Rgba::CYAN);

        let data = coordinator.get_summary().character;
        assert_eq!(data.right_hand_color, Rgba::RED);
        assert_eq!(data.left_hand_color, Rgba::RED);
        assert_eq!(data.right_foot_color, Rgba::GREEN);
        assert_eq!(data.left_foot_color, Rgba::CYAN);
        assert_close(data.head_scale, 1.3);
        assert_close(data.foot_scale, 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scale_steps_through_coordinator() {
        let persistence = RecordingPersistence::new();
        let coordinator = coordinator(&persistence);

        assert_close(coordinator.increase_head_scale(), 1.1);
        assert_close(coordinator.decrease_head_scale(), 1.0);
        coordinator.update_foot_scale(1.5);
        assert_close(coordinator.increase_foot_scale(), 1.5);
        assert_close(coordinator.decrease_foot_scale(), 1.4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_randomize_respects_invariants() {
        let persistence = RecordingPersistence::new();
        let coordinator = coordinator(&persistence);
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..50 {
            coordinator.randomize_character(&mut rng);
            coordinator.randomize_audio(&mut rng);
            let summary = coordinator.get_summary();
            for value in [summary.character.head_scale, summary.character.foot_scale] {
                assert!((scale::MIN..=scale::MAX).contains(&value));
                assert_close(value * 10.0, (value * 10.0).round());
            }
            assert!(Rgba::PALETTE.contains(&summary.character.right_hand_color));
            assert_eq!(summary.character.right_hand_color, summary.character.left_hand_color);
            for channel in AudioChannel::ALL {
                assert!((0.0..=1.0).contains(&summary.audio.volume(channel)));
            }
        }
        assert!(coordinator.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dirty_flag_is_observable() {
        let persistence = RecordingPersistence::new();
        let coordinator = coordinator(&persistence);
        coordinator.initialize().await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = coordinator.dirty().subscribe(move |d| sink.lock().unwrap().push(*d));

        coordinator.update_voice_mute(true);
        coordinator.save().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![false, true, false]);
    }

    #[tokio::test]
    async fn test_file_backed_roundtrip_between_sessions() {
        let dir = tempfile::TempDir::new().unwrap();
        {
            let repository = Arc::new(UserSettingsRepository::in_dir(dir.path()));
            let coordinator = SettingsCoordinator::new(repository, CoordinatorOptions::default());
            coordinator.initialize().await;
            coordinator.update_right_hand_color(Rgba::new(0.1, 0.2, 0.3, 0.4));
            coordinator.update_foot_scale(0.749);
            coordinator.update_voice_volume(0.65);
            coordinator.update_bgm_mute(true);
            coordinator.save().await.unwrap();
        }

        let repository = Arc::new(UserSettingsRepository::in_dir(dir.path()));
        let coordinator = SettingsCoordinator::new(repository, CoordinatorOptions::default());
        coordinator.initialize().await;

        let summary = coordinator.get_summary();
        assert!(summary.file_exists);
        assert!(!summary.is_dirty);
        assert_eq!(summary.character.right_hand_color, Rgba::new(0.1, 0.2, 0.3, 0.4));
        assert_close(summary.character.foot_scale, 0.7);
        assert_eq!(summary.audio.voice_volume, 0.65);
        assert!(summary.audio.is_bgm_muted);
        assert_eq!(coordinator.audio().effective_volume(AudioChannel::Bgm), 0.0);
    }

    #[tokio::test]
    async fn test_non_finite_color_is_not_saved_and_keeps_stored_settings() {
        let dir = tempfile::TempDir::new().unwrap();
        {
            let repository = Arc::new(UserSettingsRepository::in_dir(dir.path()));
            let coordinator = SettingsCoordinator::new(repository, CoordinatorOptions::default());
            coordinator.initialize().await;
            coordinator.update_bgm_volume(0.3);
            coordinator.save().await.unwrap();

            coordinator.update_right_hand_color(Rgba::new(f32::NAN, 0.0, 0.0, 1.0));
            let result = coordinator.save().await;

            assert!(matches!(result, Err(SettingsError::Invalid(_))));
            assert!(coordinator.is_dirty());
        }

        let repository = Arc::new(UserSettingsRepository::in_dir(dir.path()));
        let coordinator = SettingsCoordinator::new(repository, CoordinatorOptions::default());
        coordinator.initialize().await;

        assert_eq!(coordinator.audio().volume(AudioChannel::Bgm), 0.3);
        assert_eq!(coordinator.character().color(BodyPart::RightHand), Rgba::WHITE);
    }

    #[test]
    fn test_mark_racing_clear_is_never_lost() {
        let (ticks, _rx) = mpsc::unbounded_channel();
        let tracker = DirtyTracker::new(ticks);
        let mut last_cleared = 0;

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..20_000 {
                    tracker.mark();
                }
            });
            for _ in 0..20_000 {
                let generation = tracker.generation();
                if tracker.clear_if_unchanged(generation) {
                    last_cleared = generation;
                }
            }
        });

        assert_eq!(tracker.is_dirty(), tracker.generation() != last_cleared);
    }
}
