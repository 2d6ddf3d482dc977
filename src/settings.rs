use std::path::{Path, PathBuf};

use crate::components::history::HistoryManager;
use crate::ops::ai::{SegmentModel, SegmentSettings};
use crate::ops::compose::RenderOptions;

// ============================================================================
// EDITOR SETTINGS: persisted as key=value lines
// ============================================================================

/// Per-user directory for the settings file and the session log, created on
/// first use.
pub(crate) fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let dir = std::env::var("APPDATA")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .map(|d| PathBuf::from(d).join("CutoutFE"));
    #[cfg(target_os = "macos")]
    let dir = std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join("Library/Application Support/CutoutFE"));
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    let dir = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok()
        .map(|d| d.join("cutoutfe"));

    let dir = dir?;
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    pub max_undo_steps: usize,
    /// History memory cap in MiB; 0 disables the cap.
    pub max_history_mib: usize,
    pub wand_tolerance: f32,
    /// Brush diameter in view pixels.
    pub brush_size: f32,
    pub checkerboard_brightness: f32,
    pub checker_size: u32,
    pub segmentation: SegmentSettings,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            max_undo_steps: HistoryManager::DEFAULT_MAX_STEPS,
            max_history_mib: HistoryManager::DEFAULT_MAX_MEMORY / (1024 * 1024),
            wand_tolerance: 10.0,
            brush_size: 20.0,
            checkerboard_brightness: 1.0,
            checker_size: 40,
            segmentation: SegmentSettings::default(),
        }
    }
}

impl EditorSettings {
    pub(crate) fn settings_path() -> Option<PathBuf> {
        config_dir().map(|d| d.join("cutoutfe_settings.cfg"))
    }

    /// History memory cap in bytes, or `None` when disabled.
    pub fn history_memory_bytes(&self) -> Option<usize> {
        (self.max_history_mib > 0).then(|| self.max_history_mib * 1024 * 1024)
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            checker_size: self.checker_size.max(1),
            checker_brightness: self.checkerboard_brightness,
            show_original: false,
        }
    }

    fn to_config(&self) -> String {
        let seg = &self.segmentation;
        format!(
            "max_undo_steps={}\n\
             max_history_mib={}\n\
             wand_tolerance={}\n\
             brush_size={}\n\
             checkerboard_brightness={}\n\
             checker_size={}\n\
             segment_model={}\n\
             alpha_matting={}\n\
             alpha_matting_fg_threshold={}\n\
             alpha_matting_bg_threshold={}\n\
             alpha_matting_erode_size={}\n",
            self.max_undo_steps,
            self.max_history_mib,
            self.wand_tolerance,
            self.brush_size,
            self.checkerboard_brightness,
            self.checker_size,
            seg.model.name(),
            seg.alpha_matting,
            seg.fg_threshold,
            seg.bg_threshold,
            seg.erode_size,
        )
    }

    /// Parse `key=value` lines. Unknown keys are ignored and malformed or
    /// out-of-range values keep their defaults.
    pub fn parse(content: &str) -> Self {
        let d = Self::default();
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "max_undo_steps" => {
                    s.max_undo_steps = val.parse().ok().filter(|&n| n >= 1).unwrap_or(d.max_undo_steps);
                }
                "max_history_mib" => {
                    s.max_history_mib = val.parse().unwrap_or(d.max_history_mib);
                }
                "wand_tolerance" => {
                    s.wand_tolerance = val
                        .parse()
                        .ok()
                        .filter(|t: &f32| (0.0..=100.0).contains(t))
                        .unwrap_or(d.wand_tolerance);
                }
                "brush_size" => {
                    s.brush_size = val
                        .parse()
                        .ok()
                        .filter(|b: &f32| (1.0..=500.0).contains(b))
                        .unwrap_or(d.brush_size);
                }
                "checkerboard_brightness" => {
                    s.checkerboard_brightness = val
                        .parse()
                        .ok()
                        .filter(|b: &f32| b.is_finite() && *b >= 0.0)
                        .unwrap_or(d.checkerboard_brightness);
                }
                "checker_size" => {
                    s.checker_size = val.parse().ok().filter(|&c| c >= 1).unwrap_or(d.checker_size);
                }
                "segment_model" => {
                    s.segmentation.model = SegmentModel::from_name(val).unwrap_or_default();
                }
                "alpha_matting" => {
                    s.segmentation.alpha_matting = val == "true";
                }
                "alpha_matting_fg_threshold" => {
                    s.segmentation.fg_threshold = val.parse().unwrap_or(d.segmentation.fg_threshold);
                }
                "alpha_matting_bg_threshold" => {
                    s.segmentation.bg_threshold = val.parse().unwrap_or(d.segmentation.bg_threshold);
                }
                "alpha_matting_erode_size" => {
                    s.segmentation.erode_size = val.parse().unwrap_or(d.segmentation.erode_size);
                }
                _ => {}
            }
        }
        s
    }

    /// Load settings from `path` (returns default if file missing or corrupt)
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_config())
    }

    /// Load from the platform settings file.
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        Self::load_from(&path)
    }

    /// Save to the platform settings file. Failures are logged, not fatal.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            crate::log_warn!("failed to save settings to {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cutoutfe_settings.cfg");
        let mut s = EditorSettings::default();
        s.max_undo_steps = 7;
        s.wand_tolerance = 33.5;
        s.segmentation.model = SegmentModel::IsNetAnime;
        s.segmentation.alpha_matting = true;
        s.save_to(&path).unwrap();
        assert_eq!(EditorSettings::load_from(&path), s);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            EditorSettings::load_from(&dir.path().join("nope.cfg")),
            EditorSettings::default()
        );
    }

    #[test]
    fn malformed_values_fall_back() {
        let s = EditorSettings::parse(
            "max_undo_steps=abc\n\
             wand_tolerance=150\n\
             brush_size=0\n\
             unknown_key=1\n\
             no equals sign\n\
             segment_model=silueta\n\
             checker_size= 16 \n",
        );
        let d = EditorSettings::default();
        assert_eq!(s.max_undo_steps, d.max_undo_steps);
        assert_eq!(s.wand_tolerance, d.wand_tolerance);
        assert_eq!(s.brush_size, d.brush_size);
        assert_eq!(s.segmentation.model, SegmentModel::Silueta);
        assert_eq!(s.checker_size, 16);
    }

    #[test]
    fn zero_mib_disables_memory_cap() {
        let mut s = EditorSettings::default();
        assert_eq!(s.history_memory_bytes(), Some(512 * 1024 * 1024));
        s.max_history_mib = 0;
        assert_eq!(s.history_memory_bytes(), None);
    }

    #[test]
    fn render_options_follow_settings() {
        let mut s = EditorSettings::default();
        s.checker_size = 8;
        s.checkerboard_brightness = 0.5;
        let opts = s.render_options();
        assert_eq!(opts.checker_size, 8);
        assert_eq!(opts.checker_brightness, 0.5);
        assert!(!opts.show_original);
    }
}
