use std::path::{Path, PathBuf};

use recast::pipeline::{convert, ConversionReport, ConvertOptions};
use recast::{ColorPolicy, PlacementPolicy, Rgb, TableStrategy};
use regex::Regex;

use crate::prelude::{eprintln, *};

#[derive(Debug, clap::Parser)]
#[command(name = "run")]
#[command(about = "Convert every matching document of a directory")]
pub struct App {
    /// Directory holding the source documents
    #[arg(long, env = "DOCRECAST_SOURCE_DIR")]
    source_dir: PathBuf,

    /// Directory receiving one folder per converted document
    #[arg(long, env = "DOCRECAST_OUTPUT_DIR")]
    output_dir: PathBuf,

    /// Regex matched against file names without their extension
    #[arg(long, default_value = ".*")]
    pattern: String,

    /// Color used for fill colors with no RGB equivalent (e.g. "0,0,0")
    #[arg(long, conflicts_with = "strict_colors")]
    color_fallback: Option<String>,

    /// Fail on fill colors with no RGB equivalent
    #[arg(long)]
    strict_colors: bool,

    /// Which placements of a repeated image are restored
    #[arg(long, value_enum, default_value_t = Placements::All)]
    placements: Placements,

    /// How tables are detected
    #[arg(long, value_enum, default_value_t = Tables::Lines)]
    tables: Tables,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Placements {
    All,
    First,
}

impl From<Placements> for PlacementPolicy {
    fn from(value: Placements) -> Self {
        match value {
            Placements::All => PlacementPolicy::All,
            Placements::First => PlacementPolicy::FirstOnly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Tables {
    Lines,
    Text,
    None,
}

impl From<Tables> for TableStrategy {
    fn from(value: Tables) -> Self {
        match value {
            Tables::Lines => TableStrategy::Lines,
            Tables::Text => TableStrategy::Text,
            Tables::None => TableStrategy::None,
        }
    }
}

/// Resolved settings of a batch run.
#[derive(Debug)]
pub struct RunConfig {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub pattern: Regex,
    pub options: ConvertOptions,
}

impl TryFrom<App> for RunConfig {
    type Error = Error;

    fn try_from(app: App) -> std::result::Result<Self, Self::Error> {
        if !app.source_dir.is_dir() {
            return Err(Error::SourceDirNotFound(
                app.source_dir.display().to_string(),
            ));
        }

        let pattern = Regex::new(&app.pattern).map_err(|e| Error::InvalidPattern {
            pattern: app.pattern.clone(),
            reason: e.to_string(),
        })?;

        let color_policy = match (&app.color_fallback, app.strict_colors) {
            (_, true) => ColorPolicy::Strict,
            (Some(color), false) => ColorPolicy::Fallback(
                color
                    .parse::<Rgb>()
                    .map_err(|_| Error::InvalidColor(color.clone()))?,
            ),
            (None, false) => ColorPolicy::default(),
        };

        Ok(RunConfig {
            source_dir: app.source_dir,
            output_dir: app.output_dir,
            pattern,
            options: ConvertOptions {
                color_policy,
                placement_policy: app.placements.into(),
                table_strategy: app.tables.into(),
                ..ConvertOptions::default()
            },
        })
    }
}

/// What to do with a directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Selection {
    Convert(PathBuf),
    Unsupported(PathBuf),
}

/// Files of `dir` whose stem matches `pattern`, sorted by name.
///
/// Subdirectories are not entered. Office documents are reported as
/// unsupported; every other extension is ignored.
fn select_files(dir: &Path, pattern: &Regex) -> Result<Vec<Selection>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| f!("cannot list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut selected = Vec::new();
    for path in paths {
        let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        if !pattern.is_match(&stem) {
            continue;
        }
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "pdf" => selected.push(Selection::Convert(path)),
            "docx" | "pptx" => selected.push(Selection::Unsupported(path)),
            _ => log::debug!("ignoring {}", path.display()),
        }
    }
    Ok(selected)
}

fn print_summary(reports: &[ConversionReport]) {
    let mut table = new_table();
    table.add_row(prettytable::row![
        "Output", "Pages", "Spans", "Images", "Tables"
    ]);
    for report in reports {
        table.add_row(prettytable::row![
            report.pdf_path.display(),
            report.pages,
            report.spans,
            report.images,
            report.tables
        ]);
    }
    table.printstd();
}

pub fn run(app: App, _global: crate::Global) -> Result<()> {
    let config = RunConfig::try_from(app)?;

    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| f!("cannot create {}", config.output_dir.display()))?;

    let mut reports = Vec::new();
    for selection in select_files(&config.source_dir, &config.pattern)? {
        match selection {
            Selection::Convert(path) => {
                let report = convert(&path, &config.output_dir, &config.options)
                    .with_context(|| f!("failed to convert {}", path.display()))?;
                reports.push(report);
            }
            Selection::Unsupported(path) => {
                log::info!("skipping {}: only PDF documents are converted", path.display());
            }
        }
    }

    if reports.is_empty() {
        eprintln!(
            "No PDF in {} matches '{}'",
            config.source_dir.display(),
            config.pattern
        );
        return Ok(());
    }

    print_summary(&reports);
    Ok(())
}
