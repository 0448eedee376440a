//! unlayout CLI - rebuild document structure from extracted fragments

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use unlayout::render::{self, RenderOptions};
use unlayout::{
    detect, reconstruct_batch, EngineOptions, FootnoteZonePolicy, JsonFormat, LayoutEngine,
    PageSelection, Reconstruction, Thresholds,
};

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "unlayout")]
#[command(author = "iyulab")]
#[command(version)]
#[command(
    about = "Rebuild chapters, sections, paragraphs and lists from positioned text fragments",
    long_about = None
)]
struct Cli {
    /// Input fragment file (JSON document, page array or JSON lines)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Output directory
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options shared by every command that runs the engine.
#[derive(clap::Args, Clone)]
struct EngineArgs {
    /// Page range (e.g., "1-10", "1,3,5")
    #[arg(long)]
    pages: Option<String>,

    /// JSON file overriding any subset of the thresholds
    #[arg(long, value_name = "FILE", env = "UNLAYOUT_CONFIG")]
    config: Option<PathBuf>,

    /// How narrow lines near the page bottom are treated
    #[arg(long, value_enum, default_value = "propagate-narrow")]
    footnotes: FootnoteMode,

    /// Do not bind image and table fragments into the tree
    #[arg(long)]
    no_media: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the structure tree as JSON
    Build {
        /// Input fragment file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output compact JSON
        #[arg(long)]
        compact: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Render a Markdown preview of the structure
    #[command(alias = "md")]
    Markdown {
        /// Input fragment file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Maximum heading level (1-6)
        #[arg(long, default_value = "6")]
        max_heading: u8,

        /// Append container ids to headings
        #[arg(long)]
        ids: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Print an indented outline of the structure
    Outline {
        /// Input fragment file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Show source page, top and flow index
        #[arg(short, long)]
        provenance: bool,

        /// Deepest level to print
        #[arg(long)]
        depth: Option<usize>,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Write the QA report as JSON
    Report {
        /// Input fragment file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output compact JSON
        #[arg(long)]
        compact: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Show document information
    Info {
        /// Input fragment file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Process many documents into a directory
    Batch {
        /// Input fragment files
        #[arg(value_name = "FILES", required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,

        /// Process documents one at a time
        #[arg(long)]
        sequential: bool,

        /// Output compact JSON
        #[arg(long)]
        compact: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Show version information
    Version,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum FootnoteMode {
    /// Narrow lines below a full-width line in the footnote zone become full width
    PropagateNarrow,
    /// Only lines that are themselves wide are full width
    RequireWide,
}

impl From<FootnoteMode> for FootnoteZonePolicy {
    fn from(mode: FootnoteMode) -> Self {
        match mode {
            FootnoteMode::PropagateNarrow => FootnoteZonePolicy::PropagateNarrow,
            FootnoteMode::RequireWide => FootnoteZonePolicy::RequireWide,
        }
    }
}

impl EngineArgs {
    fn options(&self) -> CliResult<EngineOptions> {
        let pages = match &self.pages {
            Some(p) => PageSelection::parse(p).map_err(|e| format!("Invalid page range: {}", e))?,
            None => PageSelection::All,
        };
        let thresholds = match &self.config {
            Some(path) => Thresholds::from_path(path)?,
            None => Thresholds::default(),
        };
        Ok(EngineOptions::new()
            .with_pages(pages)
            .with_thresholds(thresholds)
            .with_footnote_policy(self.footnotes.into())
            .with_media_binding(!self.no_media))
    }

    fn run(&self, input: &Path) -> CliResult<Reconstruction> {
        log::debug!("reading {}", input.display());
        let raw = detect::read_document(input)?;
        let engine = LayoutEngine::new(self.options()?)?;
        Ok(engine.run(raw)?)
    }
}

fn json_format(compact: bool) -> JsonFormat {
    if compact {
        JsonFormat::Compact
    } else {
        JsonFormat::Pretty
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Build {
            input,
            output,
            compact,
            engine,
        }) => cmd_build(&input, output.as_deref(), compact, &engine),
        Some(Commands::Markdown {
            input,
            output,
            max_heading,
            ids,
            engine,
        }) => cmd_markdown(&input, output.as_deref(), max_heading, ids, &engine),
        Some(Commands::Outline {
            input,
            provenance,
            depth,
            engine,
        }) => cmd_outline(&input, provenance, depth, &engine),
        Some(Commands::Report {
            input,
            output,
            compact,
            engine,
        }) => cmd_report(&input, output.as_deref(), compact, &engine),
        Some(Commands::Info { input, engine }) => cmd_info(&input, &engine),
        Some(Commands::Batch {
            inputs,
            output,
            sequential,
            compact,
            engine,
        }) => cmd_batch(&inputs, &output, sequential, compact, &engine),
        Some(Commands::Version) => {
            cmd_version();
            Ok(())
        }
        None => {
            // Default behavior: convert if input is provided
            if let Some(input) = cli.input {
                cmd_convert(&input, cli.output.as_deref())
            } else {
                println!("{}", "Usage: unlayout <FILE> [OUTPUT]".yellow());
                println!("       unlayout --help for more information");
                Ok(())
            }
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn write_or_print(output: Option<&Path>, content: &str) -> CliResult {
    if let Some(path) = output {
        fs::write(path, content)?;
        println!("{} {}", "Saved to".green(), path.display());
    } else {
        println!("{}", content);
    }
    Ok(())
}

fn bar_style() -> CliResult<ProgressStyle> {
    Ok(ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
        .progress_chars("#>-"))
}

fn cmd_convert(input: &Path, output: Option<&Path>) -> CliResult {
    let output_dir = output.map(|p| p.to_path_buf()).unwrap_or_else(|| {
        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        PathBuf::from(format!("{}_structure", stem))
    });
    fs::create_dir_all(&output_dir)?;

    let pb = ProgressBar::new(4);
    pb.set_style(bar_style()?);

    pb.set_message("Reconstructing...");
    let result = unlayout::reconstruct_file(input)?;
    pb.inc(1);

    pb.set_message("Writing tree...");
    let json = render::to_json(&result.tree, JsonFormat::Pretty)?;
    fs::write(output_dir.join("structure.json"), &json)?;
    pb.inc(1);

    pb.set_message("Writing preview...");
    let markdown = render::to_markdown(&result.tree, &RenderOptions::default())?;
    fs::write(output_dir.join("preview.md"), &markdown)?;
    pb.inc(1);

    pb.set_message("Writing report...");
    let report = render::report_to_json(result.report(), JsonFormat::Pretty)?;
    fs::write(output_dir.join("report.json"), &report)?;
    pb.inc(1);

    pb.finish_with_message("Done!");

    println!("\n{}", "Output files:".green().bold());
    println!("  {} structure.json", "├─".dimmed());
    println!("  {} preview.md", "├─".dimmed());
    println!("  {} report.json", "└─".dimmed());
    print_qa_summary(&result);

    Ok(())
}

fn cmd_build(input: &Path, output: Option<&Path>, compact: bool, engine: &EngineArgs) -> CliResult {
    let result = engine.run(input)?;
    let json = render::to_json(&result.tree, json_format(compact))?;
    write_or_print(output, &json)?;
    if output.is_some() {
        print_qa_summary(&result);
    }
    Ok(())
}

fn cmd_markdown(
    input: &Path,
    output: Option<&Path>,
    max_heading: u8,
    ids: bool,
    engine: &EngineArgs,
) -> CliResult {
    let result = engine.run(input)?;
    let options = RenderOptions::new()
        .with_max_heading(max_heading)
        .with_ids(ids);
    let markdown = render::to_markdown(&result.tree, &options)?;
    write_or_print(output, &markdown)
}

fn cmd_outline(
    input: &Path,
    provenance: bool,
    depth: Option<usize>,
    engine: &EngineArgs,
) -> CliResult {
    let result = engine.run(input)?;
    let mut options = RenderOptions::new().with_provenance(provenance);
    if let Some(depth) = depth {
        options = options.with_max_depth(depth);
    }
    println!("{}", render::to_outline(&result.tree, &options)?);
    Ok(())
}

fn cmd_report(
    input: &Path,
    output: Option<&Path>,
    compact: bool,
    engine: &EngineArgs,
) -> CliResult {
    let result = engine.run(input)?;
    let json = render::report_to_json(result.report(), json_format(compact))?;
    write_or_print(output, &json)
}

fn cmd_info(input: &Path, engine: &EngineArgs) -> CliResult {
    let format = detect::detect_format_from_path(input)?;
    let result = engine.run(input)?;
    let report = result.report();
    let fonts = &result.fonts;

    println!("{}", "Document Information".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    println!("{}: {}", "File".bold(), input.display());
    println!("{}: {}", "Format".bold(), format);
    println!("{}: {}", "Pages".bold(), report.pages);
    println!("{}: {}", "Fragments".bold(), report.fragments);
    println!("{}: {}", "Blocks".bold(), report.blocks);

    println!();
    println!("{}", "Font Tiers".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    println!("{}: {:.1}", "Body size".bold(), fonts.body_size);
    println!(
        "{}: >= {:.1}{}",
        "Chapter tier".bold(),
        fonts.chapter_threshold,
        if fonts.thin_chapter_tier {
            " (thin, fallback used)".yellow().to_string()
        } else {
            String::new()
        }
    );
    if let Some(size) = fonts.chapter_size {
        println!("{}: {:.1}", "Chapter size".bold(), size);
    }
    println!("{}: >= {:.1}", "Section tier".bold(), fonts.section_threshold);

    println!();
    println!("{}", "Columns per Page".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    for layout in &result.layouts {
        println!(
            "  {} {:>4}: {} column(s), {} row(s)",
            "page".dimmed(),
            layout.page,
            layout.column_count(),
            layout.rows.len()
        );
    }

    println!();
    println!("{}", "Structure".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    let s = &report.summary;
    println!("{}: {}", "Chapters".bold(), s.chapters);
    println!("{}: {}", "Sections".bold(), s.sections);
    println!("{}: {}", "Paragraphs".bold(), s.paragraphs);
    println!("{}: {} ({} items)", "Lists".bold(), s.lists, s.list_items);
    println!("{}: {}", "Figures".bold(), s.figures);
    println!("{}: {}", "Tables".bold(), s.tables);
    println!("{}: {}", "Captions".bold(), s.captions);
    println!("{}: {}", "Sidebars".bold(), s.sidebars);
    print_qa_summary(&result);

    Ok(())
}

fn cmd_batch(
    inputs: &[PathBuf],
    output: &Path,
    sequential: bool,
    compact: bool,
    engine: &EngineArgs,
) -> CliResult {
    fs::create_dir_all(output)?;
    let options = engine.options()?.with_parallel(!sequential);

    let pb = ProgressBar::new(inputs.len() as u64);
    pb.set_style(bar_style()?);

    pb.set_message("Reading...");
    let mut docs = Vec::with_capacity(inputs.len());
    for input in inputs {
        docs.push(detect::read_document(input)?);
        pb.inc(1);
    }

    pb.set_position(0);
    pb.set_message("Reconstructing...");
    let results = reconstruct_batch(&docs, &options);

    let mut failed = 0;
    for (input, result) in inputs.iter().zip(results) {
        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        pb.set_message(stem.to_string());
        match result {
            Ok(result) => {
                let json = render::to_json(&result.tree, json_format(compact))?;
                fs::write(output.join(format!("{}.json", stem)), json)?;
                let report = render::report_to_json(result.report(), json_format(compact))?;
                fs::write(output.join(format!("{}.report.json", stem)), report)?;
            }
            Err(e) => {
                failed += 1;
                pb.println(format!("{} {}: {}", "Failed".red(), input.display(), e));
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message("Done!");

    println!(
        "\n{} {} document(s) written to {}",
        "Done!".green().bold(),
        inputs.len() - failed,
        output.display()
    );
    if failed > 0 {
        return Err(format!("{} document(s) failed", failed).into());
    }
    Ok(())
}

fn print_qa_summary(result: &Reconstruction) {
    let report = result.report();
    println!();
    if report.is_clean() {
        println!("{}", "QA: clean".green());
        return;
    }
    println!("{}", "QA".yellow().bold());
    println!("  {}: {}", "Ambiguities".bold(), report.ambiguities.len());
    println!("  {}: {}", "Dense pages".bold(), report.dense_pages.len());
    println!(
        "  {}: {}",
        "Sectionless chapters".bold(),
        report.sectionless_chapters.len()
    );
    println!(
        "  {}: {}",
        "Unresolved media".bold(),
        report.unresolved_media.len()
    );
}

fn cmd_version() {
    println!("{} {}", "unlayout".cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!("Document structure reconstruction from positioned fragments");
    println!();
    println!("Repository: {}", "https://github.com/iyulab/unlayout".dimmed());
    println!("License: MIT");
}
