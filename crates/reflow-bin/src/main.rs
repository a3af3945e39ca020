//! Reflow entrypoint.
//!
//! Loads a text file, lays out the requested viewport, applies scripted edits
//! through the incremental path, completes layout in background slices on a
//! cooperative host loop and prints the visible lines.
use anyhow::{Context, Result, bail};
use clap::Parser;
use core_config::{Alignment, Config, ConfigContext, EffectiveLayout, load_from};
use core_layout::{
    LayoutEvent, LayoutSession, LayoutSettings, LineRecord, SystemClock, TickResult, Viewport,
};
use core_text::{
    Document, LineProperties, TextAlignment, TextWrapping, WrapBreaker, WrapConstraints,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "reflow", version, about = "Incremental text layout driver")]
struct Args {
    /// UTF-8 text file to lay out.
    pub path: PathBuf,
    /// Viewport width in cells.
    #[arg(long, default_value_t = 80)]
    pub width: u16,
    /// Optional configuration file path (overrides discovery of `reflow.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
    /// First visible line.
    #[arg(long, default_value_t = 0)]
    pub top: usize,
    /// Visible line count.
    #[arg(long, default_value_t = 24)]
    pub rows: usize,
    /// Insert TEXT at OFFSET (`OFFSET:TEXT`). Applied in order, before deletions.
    #[arg(long = "insert", value_parser = parse_insert)]
    pub inserts: Vec<(usize, String)>,
    /// Delete COUNT positions at OFFSET (`OFFSET:COUNT`). Applied in order.
    #[arg(long = "delete", value_parser = parse_delete)]
    pub deletes: Vec<(usize, usize)>,
    /// Background slice budget in milliseconds (overrides config).
    #[arg(long = "budget-ms")]
    pub budget_ms: Option<u64>,
}

fn parse_insert(s: &str) -> Result<(usize, String), String> {
    let (offset, text) = s
        .split_once(':')
        .ok_or_else(|| format!("expected OFFSET:TEXT, got `{s}`"))?;
    let offset = offset
        .parse::<usize>()
        .map_err(|e| format!("bad offset `{offset}`: {e}"))?;
    Ok((offset, text.replace("\\n", "\n")))
}

fn parse_delete(s: &str) -> Result<(usize, usize), String> {
    let (offset, count) = s
        .split_once(':')
        .ok_or_else(|| format!("expected OFFSET:COUNT, got `{s}`"))?;
    let offset = offset
        .parse::<usize>()
        .map_err(|e| format!("bad offset `{offset}`: {e}"))?;
    let count = count
        .parse::<usize>()
        .map_err(|e| format!("bad count `{count}`: {e}"))?;
    Ok((offset, count))
}

struct AppStartup {
    log_guard: Option<WorkerGuard>,
}

impl AppStartup {
    fn new() -> Self {
        Self { log_guard: None }
    }

    fn run(&mut self, args: Args) -> Result<Driver> {
        self.configure_logging()?;
        Self::install_panic_hook();
        info!(target: "runtime", "startup");

        let document = Document::open(&args.path)
            .with_context(|| format!("opening {}", args.path.display()))?;
        let mut config = load_from(args.config.clone())?;
        let mut effective = apply_width(&mut config, args.width);
        if let Some(ms) = args.budget_ms {
            effective.budget = std::time::Duration::from_millis(ms);
        }
        info!(
            target: "runtime.startup",
            path = %args.path.display(),
            chars = document.len_chars(),
            config_override = args.config.is_some(),
            wrap_width = effective.wrap_width,
            budget_ms = effective.budget.as_millis() as u64,
            "bootstrap_complete"
        );
        Ok(Driver::new(args, document, effective))
    }

    fn configure_logging(&mut self) -> Result<()> {
        let log_dir = Path::new(".");
        let log_path = log_dir.join("reflow.log");
        if log_path.exists() {
            let _ = std::fs::remove_file(&log_path);
        }

        let file_appender = tracing_appender::rolling::never(log_dir, "reflow.log");
        let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
        match tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(nb_writer)
            .with_ansi(false)
            .try_init()
        {
            Ok(_) => {
                self.log_guard = Some(guard);
            }
            Err(_err) => {
                // Global tracing subscriber already installed; drop guard so writer shuts down.
            }
        }

        Ok(())
    }

    fn install_panic_hook() {
        static HOOK: Once = Once::new();
        HOOK.call_once(|| {
            let default_panic = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                tracing::error!(target: "runtime.panic", ?info, "panic");
                default_panic(info);
            }));
        });
    }
}

fn apply_width(config: &mut Config, columns: u16) -> EffectiveLayout {
    let cell_width = config.file.layout.cell_width;
    let cell_width = if cell_width.is_finite() && cell_width > 0.0 {
        cell_width
    } else {
        1.0
    };
    config.apply_context(ConfigContext::from_columns(columns, cell_width))
}

fn settings_from(effective: &EffectiveLayout) -> LayoutSettings {
    LayoutSettings {
        properties: LineProperties {
            line_height: effective.line_height,
            tab_size: effective.tab_size,
            wrapping: if effective.wrap {
                TextWrapping::Wrap
            } else {
                TextWrapping::NoWrap
            },
            alignment: match effective.alignment {
                Alignment::Left => TextAlignment::Left,
                Alignment::Center => TextAlignment::Center,
                Alignment::Right => TextAlignment::Right,
            },
        },
        background_budget: effective.budget,
        input_debounce: effective.debounce,
        cache_visuals: effective.cache_visuals,
    }
}

/// Visual for one line. Offsets are not stored: a cached line keeps its
/// visual when an edit above it shifts its offset.
#[derive(Debug, Clone)]
struct LineVisual {
    text: String,
}

impl LineVisual {
    fn build(document: &Document, record: &LineRecord) -> Self {
        Self {
            text: document.slice(record.offset, record.offset + record.content_length),
        }
    }
}

struct PrintedLine {
    offset: usize,
    x: f64,
    text: String,
}

struct Driver {
    args: Args,
    document: Document,
    effective: EffectiveLayout,
    session: LayoutSession<WrapBreaker, LineVisual>,
}

impl Driver {
    fn new(args: Args, document: Document, effective: EffectiveLayout) -> Self {
        let session = LayoutSession::new(
            WrapBreaker::new(effective.cell_width),
            WrapConstraints::uniform(effective.wrap_width),
            settings_from(&effective),
        );
        Self {
            args,
            document,
            effective,
            session,
        }
    }

    fn viewport(&self) -> Viewport {
        let line_height = self.effective.line_height;
        Viewport::new(
            self.args.top as f64 * line_height,
            self.args.rows as f64 * line_height,
            self.effective.wrap_width,
        )
    }

    async fn run(&mut self, out: &mut impl Write) -> Result<()> {
        let viewport = self.viewport();
        if viewport.is_degenerate() {
            bail!("viewport needs a positive width and at least one row");
        }
        self.session.measure(&self.document, viewport);
        self.arrange(viewport);

        self.apply_edits();
        self.session.measure(&self.document, viewport);

        self.complete_layout().await;
        let lines = self.arrange(viewport);
        self.log_events();
        self.print(out, &lines)
    }

    fn apply_edits(&mut self) {
        for (offset, text) in &self.args.inserts {
            let change = self.document.insert(*offset, text);
            self.session.notify_text_change(change);
        }
        for &(offset, count) in &self.args.deletes {
            let change = self.document.remove(offset, offset.saturating_add(count));
            self.session.notify_text_change(change);
        }
    }

    /// Host idle loop: one budgeted slice per scheduler turn.
    async fn complete_layout(&mut self) {
        loop {
            match self.session.background_tick(&self.document, &SystemClock) {
                TickResult::Done => break,
                TickResult::Yielded { lines } => {
                    debug!(target: "runtime.layout", lines, "background_yield");
                    tokio::task::yield_now().await;
                }
                TickResult::Throttled { remaining } => {
                    tokio::time::sleep(remaining).await;
                }
            }
        }
    }

    fn arrange(&mut self, viewport: Viewport) -> Vec<PrintedLine> {
        let document = &self.document;
        let output = self
            .session
            .arrange(viewport, |_, record| LineVisual::build(document, record));
        debug!(
            target: "runtime.layout",
            placed = output.placements.len(),
            detached = output.detached.len(),
            "arrange_complete"
        );
        output
            .placements
            .iter()
            .filter_map(|p| {
                let record = self.session.table().get(p.line)?;
                let visual = self.session.visual(p.line)?;
                Some(PrintedLine {
                    offset: record.offset,
                    x: p.x,
                    text: visual.text.clone(),
                })
            })
            .collect()
    }

    fn log_events(&mut self) {
        for event in self.session.drain_events() {
            match event {
                LayoutEvent::LinesChanged(changes) => debug!(
                    target: "runtime.layout",
                    start = changes.start,
                    removed = changes.removed,
                    inserted = changes.inserted,
                    changed = changes.changed.len(),
                    "lines_changed"
                ),
                LayoutEvent::ContentSizeChanged(size) => debug!(
                    target: "runtime.layout",
                    width = size.width,
                    height = size.height,
                    "content_size_changed"
                ),
                LayoutEvent::LayoutReset => debug!(target: "runtime.layout", "layout_reset"),
            }
        }
    }

    fn print(&self, out: &mut impl Write, lines: &[PrintedLine]) -> Result<()> {
        let cell = self.effective.cell_width;
        for line in lines {
            let indent = (line.x / cell).round() as usize;
            writeln!(
                out,
                "{:>7} | {:indent$}{}",
                line.offset,
                "",
                line.text.trim_end_matches(['\n', '\r'])
            )?;
        }
        let size = self.session.content_size();
        let m = self.session.metrics();
        writeln!(
            out,
            "-- {} lines, content {}x{}, formatted {}, incremental {}, reused {}, fallbacks {}",
            self.session.table().len(),
            size.width,
            size.height,
            m.lines_formatted,
            m.incremental_passes,
            m.lines_reused,
            m.invariant_fallbacks
        )?;
        Ok(())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut startup = AppStartup::new();
    let mut driver = startup.run(args)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    driver.run(&mut out).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(path: PathBuf, extra: &[&str]) -> Args {
        let mut argv = vec!["reflow".to_string(), path.display().to_string()];
        argv.extend(extra.iter().map(|s| s.to_string()));
        Args::parse_from(argv)
    }

    fn effective(width: u16) -> EffectiveLayout {
        apply_width(&mut Config::default(), width)
    }

    #[test]
    fn parses_scripted_edits() {
        assert_eq!(parse_insert("4:ab\\nc"), Ok((4, "ab\nc".to_string())));
        assert_eq!(parse_insert("0:"), Ok((0, String::new())));
        assert!(parse_insert("x:ab").is_err());
        assert_eq!(parse_delete("3:2"), Ok((3, 2)));
        assert!(parse_delete("3").is_err());
    }

    #[test]
    fn settings_follow_config() {
        let mut cfg = Config::default();
        cfg.file.layout.alignment = Alignment::Right;
        cfg.file.layout.wrap = false;
        let eff = apply_width(&mut cfg, 40);
        let s = settings_from(&eff);
        assert_eq!(s.properties.alignment, TextAlignment::Right);
        assert_eq!(s.properties.wrapping, TextWrapping::NoWrap);
        assert_eq!(s.background_budget, std::time::Duration::from_millis(200));
        assert_eq!(eff.wrap_width, 40.0);
    }

    #[tokio::test]
    async fn driver_prints_wrapped_lines_after_edits() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "AAAA BBBB CCCC\nsecond line\n").unwrap();
        let a = args(
            tmp.path().to_path_buf(),
            &["--width", "9", "--insert", "15:new "],
        );
        let document = Document::open(&a.path).unwrap();
        let mut driver = Driver::new(a, document, effective(9));
        let mut out = Vec::new();
        driver.run(&mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "      0 | AAAA BBBB ");
        assert_eq!(lines[1], "     10 | CCCC");
        assert_eq!(lines[2], "     15 | new ");
        assert_eq!(lines[3], "     19 | second ");
        assert_eq!(lines[4], "     26 | line");
        assert!(lines[5].starts_with("-- 5 lines"));
        assert!(driver.session.is_complete(&driver.document));
        assert_eq!(driver.session.metrics().incremental_passes, 1);
    }
}
