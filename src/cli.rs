// ============================================================================
// CutoutFE CLI: headless cutout batch processing via command-line arguments
// ============================================================================
//
// Usage examples:
//   cutoutfe -i photo.jpg --mask photo_mask.png -o cutout.png
//   cutoutfe -i photo.jpg --wand 5,5 --tolerance 12 -o cutout.png
//   cutoutfe -i "shots/*.jpg" --remove-color 0,255,0 --output-dir out/
//   cutoutfe -i portrait.png --crop 100,50,900,1250 --fill 255,255,255 -o id.jpg
//
// Each input becomes one Document. Operations run in a fixed order:
// mask, crop, color removal, magic wand, fill. The export buffer is saved.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use image::Rgb;

use crate::document::Document;
use crate::error::EditOutcome;
use crate::io::{load_image, save_export, SaveFormat};
use crate::ops::compose::export_buffer;
use crate::settings::EditorSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// CutoutFE headless background remover.
#[derive(Parser, Debug)]
#[command(
    name = "cutoutfe",
    about = "CutoutFE headless background removal and cutout editing",
    long_about = "Apply cutout edits to image files without opening the editor.\n\
                  Operations run in order: --mask, --crop, --remove-color, --wand, --fill.\n\n\
                  Example:\n  \
                  cutoutfe -i photo.jpg --wand 5,5 --tolerance 12 -o cutout.png\n  \
                  cutoutfe -i \"*.jpg\" --remove-color 0,255,0 --output-dir out/"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output file path. Only valid for single-file input.
    /// For batch input use --output-dir instead.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpeg, bmp, tga, tiff.
    /// When omitted, the format is inferred from --output's extension, defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// Grayscale mask file used as the initial cutout (e.g. a segmentation result).
    #[arg(long, value_name = "FILE")]
    pub mask: Option<PathBuf>,

    /// Crop to the rectangle between two corners.
    #[arg(long, value_name = "X1,Y1,X2,Y2", value_parser = parse_rect)]
    pub crop: Option<(i64, i64, i64, i64)>,

    /// Remove every pixel close to this color.
    #[arg(long, value_name = "R,G,B", value_parser = parse_rgb)]
    pub remove_color: Option<[u8; 3]>,

    /// Magic wand seed pixel. Removes the region unless --wand-keep is given.
    #[arg(long, value_name = "X,Y", value_parser = parse_point)]
    pub wand: Option<(u32, u32)>,

    /// Keep only the wand region instead of removing it.
    #[arg(long, requires = "wand", conflicts_with = "wand_remove")]
    pub wand_keep: bool,

    /// Remove the wand region (default).
    #[arg(long, requires = "wand")]
    pub wand_remove: bool,

    /// Color tolerance for --wand and --remove-color (0-100).
    /// Defaults to the saved editor setting.
    #[arg(short, long, value_name = "0-100")]
    pub tolerance: Option<f32>,

    /// Composite this background color under the cutout.
    #[arg(long, value_name = "R,G,B", value_parser = parse_rgb)]
    pub fill: Option<[u8; 3]>,

    /// Print per-file timing and mirror log lines to stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Edits applied to every input.
#[derive(Clone, Debug, Default)]
pub struct EditPlan {
    pub mask: Option<PathBuf>,
    pub crop: Option<(i64, i64, i64, i64)>,
    pub remove_color: Option<[u8; 3]>,
    pub wand: Option<(u32, u32)>,
    pub wand_keep: bool,
    pub tolerance: f32,
    pub fill: Option<[u8; 3]>,
}

impl EditPlan {
    pub fn from_args(args: &CliArgs, settings: &EditorSettings) -> Self {
        Self {
            mask: args.mask.clone(),
            crop: args.crop,
            remove_color: args.remove_color,
            wand: args.wand,
            wand_keep: args.wand_keep,
            tolerance: args.tolerance.unwrap_or(settings.wand_tolerance),
            fill: args.fill,
        }
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }
    if inputs.len() > 1 && args.mask.is_some() {
        eprintln!("error: --mask only applies to a single input file.");
        return ExitCode::FAILURE;
    }

    let settings = EditorSettings::load();
    let plan = EditPlan::from_args(&args, &settings);
    let save_format = match parse_format(args.format.as_deref(), args.output.as_deref()) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!(
            "error: could not create output directory '{}': {}",
            dir.display(),
            e
        );
        return ExitCode::FAILURE;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }

        let file_start = Instant::now();

        let Some(output_path) = build_output_path(
            input_path,
            args.output.as_deref(),
            args.output_dir.as_deref(),
            save_format,
        ) else {
            eprintln!(
                "  error: cannot determine output path for '{}'.",
                input_path.display()
            );
            any_failure = true;
            continue;
        };

        match run_one(input_path, &output_path, save_format, &plan, &settings) {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  -> {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                crate::log_err!("{}: {}", input_path.display(), e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

/// Load, edit and save one file as `format`, whatever `output`'s extension.
pub fn run_one(
    input: &Path,
    output: &Path,
    format: SaveFormat,
    plan: &EditPlan,
    settings: &EditorSettings,
) -> Result<(), String> {
    let doc = process(input, plan, settings)?;
    save_export(&export_buffer(&doc), output, format, doc.fill_color())
        .map_err(|e| format!("save failed: {}", e))
}

/// Load `input` and apply `plan`, returning the edited document.
pub fn process(input: &Path, plan: &EditPlan, settings: &EditorSettings) -> Result<Document, String> {
    // -- Step 1: Load ----------------------------------------------------
    let image = load_image(input).map_err(|e| format!("load failed: {}", e))?;
    let mut doc = match &plan.mask {
        Some(mask_path) => {
            let mask = image::open(mask_path)
                .map_err(|e| format!("mask load failed: {}", e))?
                .to_luma8();
            Document::with_alpha(&image, mask).map_err(|e| format!("mask rejected: {}", e))?
        }
        None => Document::from_rgba(&image),
    };
    doc = doc
        .with_path(input.to_path_buf())
        .with_history_limits(settings.max_undo_steps, settings.history_memory_bytes());

    // -- Step 2: Crop ----------------------------------------------------
    if let Some((x1, y1, x2, y2)) = plan.crop {
        doc.begin_crop().map_err(|e| e.to_string())?;
        doc.set_crop_rect((x1, y1), (x2, y2)).map_err(|e| e.to_string())?;
        doc.apply_crop().map_err(|e| format!("crop failed: {}", e))?;
    }

    // -- Step 3: Color key -----------------------------------------------
    if let Some(color) = plan.remove_color {
        let outcome = doc
            .remove_color(color, plan.tolerance)
            .map_err(|e| format!("color removal failed: {}", e))?;
        if outcome == EditOutcome::Unchanged {
            crate::log_info!("{}: no pixels matched {:?}", doc.name, color);
        }
    }

    // -- Step 4: Magic wand ----------------------------------------------
    if let Some((x, y)) = plan.wand {
        let selected = doc
            .select_at(x, y, plan.tolerance)
            .map_err(|e| format!("wand failed: {}", e))?;
        if selected == 0 {
            return Err(format!("wand seed ({}, {}) lies outside the image", x, y));
        }
        let applied = if plan.wand_keep {
            doc.keep_selected()
        } else {
            doc.remove_selected()
        };
        applied.map_err(|e| format!("wand failed: {}", e))?;
    }

    // -- Step 5: Fill ----------------------------------------------------
    if let Some(c) = plan.fill {
        doc.set_fill(Rgb(c)).map_err(|e| e.to_string())?;
    }

    Ok(doc)
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Choose the [`SaveFormat`] from the `--format` string or infer it from the
/// output file extension. Defaults to PNG when neither is given; an unknown
/// `--format` is an error.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>) -> Result<SaveFormat, String> {
    if let Some(f) = format_arg {
        return SaveFormat::from_path(Path::new(&format!("x.{}", f)))
            .ok_or_else(|| format!("unsupported output format '{}'", f));
    }
    Ok(output.and_then(SaveFormat::from_path).unwrap_or_default())
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: next to the input as `<stem>_cutout.<ext>`
fn build_output_path(
    input: &Path,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    format: SaveFormat,
) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = format.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    Some(parent.join(format!("{}_cutout.{}", stem, ext)))
}

fn parse_numbers<T: std::str::FromStr>(s: &str, count: usize) -> Result<Vec<T>, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != count {
        return Err(format!("expected {} comma-separated values, got '{}'", count, s));
    }
    parts
        .iter()
        .map(|p| p.parse::<T>().map_err(|_| format!("invalid number '{}'", p)))
        .collect()
}

fn parse_rgb(s: &str) -> Result<[u8; 3], String> {
    let v = parse_numbers::<u8>(s, 3)?;
    Ok([v[0], v[1], v[2]])
}

fn parse_point(s: &str) -> Result<(u32, u32), String> {
    let v = parse_numbers::<u32>(s, 2)?;
    Ok((v[0], v[1]))
}

fn parse_rect(s: &str) -> Result<(i64, i64, i64, i64), String> {
    let v = parse_numbers::<i64>(s, 4)?;
    Ok((v[0], v[1], v[2], v[3]))
}
