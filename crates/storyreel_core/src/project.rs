use crate::error::{CoreError, Result};
use crate::types::*;
use std::path::{Path, PathBuf};

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            min_clip_duration_us: TimeUs(500_000),
            extension_cap_us: TimeUs(12_000_000),
            extend_increment_us: TimeUs(3_000_000),
            reorder_epsilon_us: TimeUs(10_000),
            default_total_duration_us: TimeUs(120_000_000),
            default_zoom: 50.0,
            new_clip_duration_us: TimeUs(4_000_000),
            playback_tick_us: TimeUs(100_000),
            generation_delay_us: TimeUs(5_000_000),
            narration_us_per_char: TimeUs(250_000),
            narration_max_duration_us: TimeUs(10_000_000),
        }
    }
}

impl EditorSettings {
    /// Save settings as pretty-printed JSON.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let settings: EditorSettings = serde_json::from_str(&data)?;
        if settings.min_clip_duration_us <= TimeUs::ZERO {
            return Err(CoreError::InvalidOperation(
                "min_clip_duration_us must be positive".into(),
            ));
        }
        Ok(settings)
    }
}

const FIXTURE_LEN: usize = 10;

const VIDEO_PROMPTS: [&str; FIXTURE_LEN] = [
    "Istanbul at dawn, the Blue Mosque half hidden in morning mist, gulls circling over the Bosphorus.",
    "The great dome of Hagia Sophia, sunlight falling through stained glass onto old marble floors.",
    "The crowded Grand Bazaar, spices piled high in every colour, woven carpets covering the walls.",
    "Anglers along the Galata Bridge, the Golden Horn glittering behind them under the city skyline.",
    "The dim Basilica Cistern, rows of stone columns mirrored in still water, a Medusa head watching.",
    "The courtyards of Topkapi Palace in tulip season, the Sea of Marmara shining beyond the walls.",
    "A red vintage tram rolling down Istiklal Avenue between crowds and old European facades.",
    "A ferry on the Bosphorus, the bridge between Europe and Asia glowing in the setting sun.",
    "Ruins of the ancient land walls, ivy growing through the cracks of Byzantine and Ottoman stone.",
    "Istanbul at night, the city lit up, minarets sharp against the dark sky.",
];

const NARRATION: [&str; FIXTURE_LEN] = [
    "In 667 BC Greek settlers from Megara founded Byzantium here, and the story of the city began.",
    "In 330 Constantine moved his capital here and named it Constantinople, the new heart of Rome.",
    "Under Justinian, Hagia Sophia rose as the summit of Byzantine architecture.",
    "In 1204 the Fourth Crusade sacked Constantinople, and the empire never fully recovered.",
    "In 1453 Mehmed the Second took the city, the Byzantine Empire fell, and Istanbul was born.",
    "Under Suleiman the Magnificent the Ottoman Empire peaked, and Istanbul led the Islamic world.",
    "In the nineteenth century the Tanzimat reforms gave the city a blend of East and West.",
    "In 1923 the Republic moved its capital to Ankara, yet Istanbul remained the nation's heart.",
    "Today Istanbul spans two continents, the only great city to stand in both Europe and Asia.",
    "Here the weight of history meets modern life, and the city keeps telling its story.",
];

/// The editor's startup content: ten video clips over ten narration clips,
/// four seconds each, laid end to end from zero.
pub fn seed_state(settings: &EditorSettings) -> EditorState {
    let mut state = EditorState::new(settings);
    let length = TimeUs(4_000_000);

    for i in 0..FIXTURE_LEN {
        let start = length * i as i64;

        let mut video = Clip::new(TrackKind::Video, start, length);
        video.original_duration_us = TimeUs(10_000_000);
        video.content = format!("/videos/{}.mp4", i + 1);
        video.prompt = Some(VIDEO_PROMPTS[i].to_string());

        let mut narration = Clip::new(TrackKind::Subtitle, start, length);
        narration.content = NARRATION[i].to_string();
        narration.prompt = Some(NARRATION[i].to_string());

        state.clips.push(video);
        state.clips.push(narration);
    }

    let end = crate::collision::max_end(&state.clips);
    state.total_duration_us = state.total_duration_us.max(end);
    state
}

/// Save a clip collection as a pretty-printed JSON array.
/// Automatically appends `.storyreel` extension if not present.
pub fn save_clips_to_file(clips: &[Clip], path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = ensure_extension(path.as_ref());
    let json = serde_json::to_string_pretty(clips)?;
    std::fs::write(&path, json)?;
    tracing::debug!(path = %path.display(), clips = clips.len(), "saved clip document");
    Ok(path)
}

/// Load a clip collection saved by [`save_clips_to_file`].
pub fn load_clips_from_file(path: impl AsRef<Path>) -> Result<Vec<Clip>> {
    let data = std::fs::read_to_string(path.as_ref())?;
    let clips: Vec<Clip> = serde_json::from_str(&data)?;
    Ok(clips)
}

fn ensure_extension(path: &Path) -> PathBuf {
    if path.extension().and_then(|e| e.to_str()) == Some("storyreel") {
        path.to_path_buf()
    } else {
        let mut p = path.to_path_buf();
        let mut name = p.file_name().unwrap_or_default().to_os_string();
        name.push(".storyreel");
        p.set_file_name(name);
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::overlapping_pairs;
    use crate::store::{Command, Store};
    use tempfile::TempDir;

    #[test]
    fn default_settings_values() {
        let s = EditorSettings::default();
        assert_eq!(s.min_clip_duration_us, TimeUs::from_seconds(0.5));
        assert_eq!(s.extension_cap_us, TimeUs::from_seconds(12.0));
        assert_eq!(s.extend_increment_us, TimeUs::from_seconds(3.0));
        assert_eq!(s.reorder_epsilon_us, TimeUs::from_seconds(0.01));
        assert_eq!(s.default_total_duration_us, TimeUs::from_seconds(120.0));
        assert_eq!(s.playback_tick_us, TimeUs::from_seconds(0.1));
    }

    #[test]
    fn settings_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = EditorSettings::default();
        settings.generation_delay_us = TimeUs::from_seconds(1.5);
        settings.save_to_file(&path).unwrap();

        let loaded = EditorSettings::load_from_file(&path).unwrap();
        assert_eq!(settings, loaded);
    }

    #[test]
    fn partial_settings_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "extension_cap_us": 8000000 }"#).unwrap();

        let loaded = EditorSettings::load_from_file(&path).unwrap();
        assert_eq!(loaded.extension_cap_us, TimeUs(8_000_000));
        assert_eq!(loaded.extend_increment_us, TimeUs(3_000_000));
    }

    #[test]
    fn settings_keys_are_field_names_in_microseconds() {
        let json = serde_json::to_value(EditorSettings::default()).unwrap();
        assert_eq!(json["narration_us_per_char"], 250_000);
        assert_eq!(json["narration_max_duration_us"], 10_000_000);
        assert_eq!(json["min_clip_duration_us"], 500_000);
        assert_eq!(json["playback_tick_us"], 100_000);
        assert!(json.get("narration_seconds_per_char").is_none());
    }

    #[test]
    fn settings_with_zero_minimum_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "min_clip_duration_us": 0 }"#).unwrap();

        assert!(matches!(
            EditorSettings::load_from_file(&path),
            Err(CoreError::InvalidOperation(_))
        ));
    }

    #[test]
    fn load_nonexistent_settings_returns_error() {
        let result = EditorSettings::load_from_file("/tmp/does_not_exist_storyreel_settings.json");
        assert!(matches!(result, Err(CoreError::Io(_))));
    }

    #[test]
    fn seed_state_layout() {
        let settings = EditorSettings::default();
        let state = seed_state(&settings);

        assert_eq!(state.clips.len(), 20);
        assert_eq!(state.total_duration_us, TimeUs::from_seconds(120.0));
        assert_eq!(state.zoom, 50.0);

        let video = state.track_clips(TrackKind::Video);
        let narration = state.track_clips(TrackKind::Subtitle);
        assert_eq!(video.len(), 10);
        assert_eq!(narration.len(), 10);

        assert_eq!(video[3].start_us, TimeUs::from_seconds(12.0));
        assert_eq!(video[3].original_duration_us, TimeUs::from_seconds(10.0));
        assert_eq!(video[3].content, "/videos/4.mp4");
        assert_eq!(narration[9].end_us(), TimeUs::from_seconds(40.0));
        assert_eq!(narration[9].original_duration_us, TimeUs::from_seconds(4.0));
        assert!(state.clips.iter().all(|c| c.prompt.is_some()));

        assert!(overlapping_pairs(&state.clips, TrackKind::Video).is_empty());
        assert!(overlapping_pairs(&state.clips, TrackKind::Subtitle).is_empty());
    }

    #[test]
    fn clips_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reel.storyreel");

        let state = seed_state(&EditorSettings::default());
        let written = save_clips_to_file(&state.clips, &path).unwrap();
        assert_eq!(written, path);

        let loaded = load_clips_from_file(&path).unwrap();
        assert_eq!(loaded, state.clips);
    }

    #[test]
    fn loaded_clips_restore_losslessly() {
        let dir = TempDir::new().unwrap();
        let settings = EditorSettings::default();
        let mut store = Store::new(seed_state(&settings), settings.clone());
        let saved = store.state().clips.clone();
        let path = save_clips_to_file(&saved, dir.path().join("before")).unwrap();

        let first = saved[0].id;
        store.dispatch(Command::DeleteClip(first));
        assert_eq!(store.state().clips.len(), 19);

        store.dispatch(Command::RestoreClips(load_clips_from_file(&path).unwrap()));
        assert_eq!(store.state().clips, saved);
    }

    #[test]
    fn extension_appended_if_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("no_ext");

        let written = save_clips_to_file(&[], &path).unwrap();
        let expected_path = dir.path().join("no_ext.storyreel");
        assert_eq!(written, expected_path);
        assert!(expected_path.exists());
        assert!(load_clips_from_file(&expected_path).unwrap().is_empty());
    }

    #[test]
    fn malformed_clip_document_returns_json_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.storyreel");
        std::fs::write(&path, "[{ \"track\": \"audio\" }]").unwrap();

        assert!(matches!(load_clips_from_file(&path), Err(CoreError::Json(_))));
    }
}
