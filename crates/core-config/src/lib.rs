//! Configuration loading and parsing.
//!
//! Parses `reflow.toml` (or an override path provided by the binary):
//!
//! ```toml
//! [layout]
//! line_height = 16.0
//! tab_size = 4
//! wrap = true
//! alignment = "left"   # left | center | right
//! cell_width = 1.0
//!
//! [background]
//! budget_ms = 200
//! debounce_ms = 2000
//!
//! [viewport]
//! cache = true
//! ```
//!
//! Every field is optional. A missing file or one that fails to parse yields
//! the defaults. The raw parsed values are retained; `Config::apply_context`
//! derives the effective values for a given viewport (clamping what cannot
//! be laid out) so a resize can re-derive them.

use anyhow::Result;
use serde::Deserialize;
use std::{fs, path::PathBuf, time::Duration};
use tracing::{info, warn};

/// Horizontal alignment as written in the config file.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LayoutConfig {
    #[serde(default = "LayoutConfig::default_line_height")]
    pub line_height: f64,
    #[serde(default = "LayoutConfig::default_tab_size")]
    pub tab_size: u16,
    #[serde(default = "LayoutConfig::default_wrap")]
    pub wrap: bool,
    #[serde(default)]
    pub alignment: Alignment,
    #[serde(default = "LayoutConfig::default_cell_width")]
    pub cell_width: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            line_height: Self::default_line_height(),
            tab_size: Self::default_tab_size(),
            wrap: Self::default_wrap(),
            alignment: Alignment::default(),
            cell_width: Self::default_cell_width(),
        }
    }
}

impl LayoutConfig {
    const fn default_line_height() -> f64 {
        16.0
    }
    const fn default_tab_size() -> u16 {
        4
    }
    const fn default_wrap() -> bool {
        true
    }
    const fn default_cell_width() -> f64 {
        1.0
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct BackgroundConfig {
    #[serde(default = "BackgroundConfig::default_budget_ms")]
    pub budget_ms: u64,
    #[serde(default = "BackgroundConfig::default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            budget_ms: Self::default_budget_ms(),
            debounce_ms: Self::default_debounce_ms(),
        }
    }
}

impl BackgroundConfig {
    const fn default_budget_ms() -> u64 {
        200
    }
    const fn default_debounce_ms() -> u64 {
        2000
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ViewportConfig {
    #[serde(default = "ViewportConfig::default_cache")]
    pub cache: bool,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            cache: Self::default_cache(),
        }
    }
}

impl ViewportConfig {
    const fn default_cache() -> bool {
        true
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct ConfigFile {
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub background: BackgroundConfig,
    #[serde(default)]
    pub viewport: ViewportConfig,
}

/// Geometry the effective values are derived against.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConfigContext {
    /// Visible width in the same unit as `cell_width`.
    pub viewport_width: f64,
}

impl ConfigContext {
    pub fn new(viewport_width: f64) -> Self {
        Self { viewport_width }
    }

    /// Width of `columns` cells of `cell_width` each.
    pub fn from_columns(columns: u16, cell_width: f64) -> Self {
        Self::new(f64::from(columns) * cell_width)
    }
}

/// Values the layout engine is configured with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveLayout {
    pub line_height: f64,
    pub cell_width: f64,
    pub tab_size: u16,
    pub wrap: bool,
    pub alignment: Alignment,
    pub wrap_width: f64,
    pub budget: Duration,
    pub debounce: Duration,
    pub cache_visuals: bool,
}

const MAX_TAB_SIZE: u16 = 16;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub raw: Option<String>,                // original file string (optional)
    pub file: ConfigFile,                   // parsed (or default) data
    pub effective: Option<EffectiveLayout>, // set by apply_context
}

/// Best-effort config path following platform conventions (XDG / AppData Roaming).
pub fn discover() -> PathBuf {
    // Prefer the working directory before the platform config dir.
    let local = PathBuf::from("reflow.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("reflow").join("reflow.toml");
    }
    PathBuf::from("reflow.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    let Ok(content) = fs::read_to_string(&path) else {
        return Ok(Config::default());
    };
    match toml::from_str::<ConfigFile>(&content) {
        Ok(file) => {
            info!(target: "config", path = %path.display(), "config_loaded");
            Ok(Config {
                raw: Some(content),
                file,
                effective: None,
            })
        }
        Err(e) => {
            warn!(target: "config", path = %path.display(), error = %e, "config_parse_failed");
            Ok(Config::default())
        }
    }
}

impl Config {
    /// Derive effective values for `ctx`, logging every clamp.
    pub fn apply_context(&mut self, ctx: ConfigContext) -> EffectiveLayout {
        let effective = self.derive(ctx);
        self.effective = Some(effective);
        effective
    }

    /// Re-derive after a viewport change. `Some` only when the result changed.
    pub fn recompute_with_context(&mut self, ctx: ConfigContext) -> Option<EffectiveLayout> {
        let prev = self.effective;
        let current = self.apply_context(ctx);
        if prev != Some(current) { Some(current) } else { None }
    }

    fn derive(&self, ctx: ConfigContext) -> EffectiveLayout {
        let layout = &self.file.layout;
        let line_height = positive_or(
            "line_height",
            layout.line_height,
            LayoutConfig::default_line_height(),
        );
        let cell_width = positive_or(
            "cell_width",
            layout.cell_width,
            LayoutConfig::default_cell_width(),
        );
        let tab_size = layout.tab_size.clamp(1, MAX_TAB_SIZE);
        if tab_size != layout.tab_size {
            info!(
                target: "config",
                raw = layout.tab_size,
                clamped = tab_size,
                max = MAX_TAB_SIZE,
                "tab_size_clamped"
            );
        }
        let wrap_width = if ctx.viewport_width.is_finite() {
            ctx.viewport_width.max(0.0)
        } else {
            0.0
        };
        if wrap_width < cell_width {
            info!(
                target: "config",
                viewport_width = ctx.viewport_width,
                cell_width,
                "wrap_width_below_one_cell"
            );
        }
        EffectiveLayout {
            line_height,
            cell_width,
            tab_size,
            wrap: layout.wrap,
            alignment: layout.alignment,
            wrap_width,
            budget: Duration::from_millis(self.file.background.budget_ms),
            debounce: Duration::from_millis(self.file.background.debounce_ms),
            cache_visuals: self.file.viewport.cache,
        }
    }
}

fn positive_or(field: &'static str, raw: f64, default: f64) -> f64 {
    if raw.is_finite() && raw > 0.0 {
        return raw;
    }
    info!(target: "config", field, raw, clamped = default, "value_clamped");
    default
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex, MutexGuard};
    use tracing::Level;
    use tracing::subscriber::with_default;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone)]
    struct BufferWriter {
        inner: Arc<Mutex<Vec<u8>>>,
    }

    impl BufferWriter {
        fn new() -> (Self, Arc<Mutex<Vec<u8>>>) {
            let buf = Arc::new(Mutex::new(Vec::new()));
            (Self { inner: buf.clone() }, buf)
        }
    }

    struct LockedWriter<'a> {
        guard: MutexGuard<'a, Vec<u8>>,
    }

    impl<'a> Write for LockedWriter<'a> {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.guard.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for BufferWriter {
        type Writer = LockedWriter<'a>;

        fn make_writer(&'a self) -> Self::Writer {
            LockedWriter {
                guard: self.inner.lock().expect("log buffer poisoned"),
            }
        }
    }

    fn load_str(content: &str) -> Config {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), content).unwrap();
        load_from(Some(tmp.path().to_path_buf())).unwrap()
    }

    #[test]
    fn default_config_when_missing_file() {
        let cfg = load_from(Some(PathBuf::from("__nonexistent_hopefully__.toml"))).unwrap();
        assert!(cfg.raw.is_none());
        assert_eq!(cfg.file, ConfigFile::default());
        assert_eq!(cfg.file.layout.line_height, 16.0);
        assert_eq!(cfg.file.layout.tab_size, 4);
        assert_eq!(cfg.file.background.budget_ms, 200);
        assert_eq!(cfg.file.background.debounce_ms, 2000);
        assert!(cfg.file.viewport.cache);
    }

    #[test]
    fn parses_all_sections() {
        let cfg = load_str(
            "[layout]\nline_height = 20.0\ntab_size = 8\nwrap = false\nalignment = \"center\"\n\
             [background]\nbudget_ms = 50\n[viewport]\ncache = false\n",
        );
        assert_eq!(cfg.file.layout.line_height, 20.0);
        assert_eq!(cfg.file.layout.tab_size, 8);
        assert!(!cfg.file.layout.wrap);
        assert_eq!(cfg.file.layout.alignment, Alignment::Center);
        assert_eq!(cfg.file.background.budget_ms, 50);
        assert_eq!(cfg.file.background.debounce_ms, 2000);
        assert!(!cfg.file.viewport.cache);
    }

    #[test]
    fn unparsable_file_falls_back_to_defaults() {
        let cfg = load_str("[layout]\nalignment = \"justify\"\n");
        assert!(cfg.raw.is_none());
        assert_eq!(cfg.file.layout.alignment, Alignment::Left);
    }

    #[test]
    fn apply_context_derives_wrap_width() {
        let mut cfg = load_str("[layout]\ncell_width = 8.0\n");
        let eff = cfg.apply_context(ConfigContext::from_columns(80, 8.0));
        assert_eq!(eff.wrap_width, 640.0);
        assert_eq!(eff.budget, Duration::from_millis(200));
        assert_eq!(cfg.effective, Some(eff));
    }

    #[test]
    fn recompute_reports_only_changes() {
        let mut cfg = Config::default();
        cfg.apply_context(ConfigContext::new(80.0));
        assert_eq!(cfg.recompute_with_context(ConfigContext::new(80.0)), None);
        let changed = cfg.recompute_with_context(ConfigContext::new(40.0));
        assert_eq!(changed.map(|e| e.wrap_width), Some(40.0));
    }

    #[test]
    fn clamp_logging_uses_config_target() {
        let mut cfg = load_str("[layout]\nline_height = -3.0\ntab_size = 0\n");
        let (writer, buffer) = BufferWriter::new();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_target(true)
            .with_ansi(false)
            .without_time()
            .with_writer(writer)
            .finish();

        let eff = with_default(subscriber, || cfg.apply_context(ConfigContext::new(80.0)));

        let log_output = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(log_output.contains("INFO config:"));
        assert!(log_output.contains("value_clamped"));
        assert!(log_output.contains("tab_size_clamped"));
        assert_eq!(eff.line_height, 16.0);
        assert_eq!(eff.tab_size, 1);
    }
}
