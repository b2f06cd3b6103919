//! PLayout 命令行入口
//! 加载版面模板，按需迭代图集要素，导出 PDF / PNG / 显示列表

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use playout_core::atlas::AtlasMode;
use playout_core::composition::Composition;
use playout_core::config::CompositionConfig;
use playout_core::paint::DisplayList;
use playout_core::template::SubstitutionMap;
use playout_render::{world_file_path, write_world_file, PdfDevice, RgbaImage};

#[derive(Parser, Debug)]
#[command(name = "playout", version, about = "Print layout composer", arg_required_else_help = true)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a template and export it
    Export(ExportArgs),
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Layout template (.qpt)
    #[arg(value_name = "TEMPLATE")]
    template: PathBuf,
    /// Output file
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,
    /// Output format, inferred from the output extension when omitted
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,
    /// Export a single page (1-based)
    #[arg(long, value_name = "N")]
    page: Option<usize>,
    /// Print resolution override
    #[arg(long, value_name = "DPI")]
    dpi: Option<u32>,
    /// Template substitution, may be repeated
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    substitutions: Vec<(String, String)>,
    /// Composition configuration (JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Atlas coverage (JSON); one output per feature
    #[arg(long, value_name = "FILE")]
    atlas: Option<PathBuf>,
    /// Write a world file next to raster output
    #[arg(long)]
    world_file: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Pdf,
    Png,
    Json,
}

impl OutputFormat {
    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Png => "png",
            OutputFormat::Json => "json",
        }
    }

    fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(OutputFormat::Pdf),
            "png" => Some(OutputFormat::Png),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

/// `base` 后附加 `_suffix`，扩展名替换为 `ext`
fn suffixed_path(base: &Path, suffix: Option<String>, ext: &str) -> PathBuf {
    let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    let name = match suffix {
        Some(suffix) => format!("{}_{}.{}", stem, suffix, ext),
        None => format!("{}.{}", stem, ext),
    };
    base.with_file_name(name)
}

struct Exporter {
    format: OutputFormat,
    page: Option<usize>,
    world_file: bool,
}

impl Exporter {
    fn pages(&self, composition: &Composition) -> Result<Vec<usize>> {
        match self.page {
            Some(page) if page >= 1 && page <= composition.num_pages() => Ok(vec![page - 1]),
            Some(page) => bail!("page {} out of range (layout has {} pages)", page, composition.num_pages()),
            None => Ok((0..composition.num_pages()).collect()),
        }
    }

    /// 导出当前状态；返回写出的文件
    fn export(&self, composition: &mut Composition, output: &Path) -> Result<Vec<PathBuf>> {
        let ext = self.format.extension();
        let pages = self.pages(composition)?;
        let mut written = Vec::new();

        match self.format {
            OutputFormat::Pdf => {
                let path = suffixed_path(output, None, ext);
                let mut device = PdfDevice::new();
                composition
                    .export_as_pdf(&path, &mut device)
                    .with_context(|| format!("exporting {}", path.display()))?;
                written.push(path);
            }
            OutputFormat::Png => {
                let multi = pages.len() > 1;
                let world_page = composition
                    .world_file_map()
                    .and_then(|id| composition.item_page_number(id));
                for page in pages {
                    let path = suffixed_path(output, multi.then(|| (page + 1).to_string()), ext);
                    let image: RgbaImage = composition
                        .print_page_as_raster(page)
                        .ok_or_else(|| anyhow!("cannot rasterize page {}", page + 1))?;
                    image.save_png(&path, Some(composition.print_resolution()))?;

                    if (self.world_file || composition.generate_world_file()) && world_page == Some(page) {
                        if let Some(params) = composition.compute_world_file_parameters() {
                            write_world_file(&world_file_path(&path), &params)?;
                        }
                    }
                    written.push(path);
                }
            }
            OutputFormat::Json => {
                let path = suffixed_path(output, None, ext);
                let mut lists = Vec::new();
                for page in pages {
                    let mut list = DisplayList::new();
                    composition.render_page(&mut list, page)?;
                    lists.push(list);
                }
                std::fs::write(&path, serde_json::to_string_pretty(&lists)?)
                    .with_context(|| format!("writing {}", path.display()))?;
                written.push(path);
            }
        }
        Ok(written)
    }
}

fn load_composition(args: &ExportArgs) -> Result<Composition> {
    let config = match &args.config {
        Some(path) => playout_file::load_config(path).with_context(|| format!("reading {}", path.display()))?,
        None => CompositionConfig::default(),
    };
    let mut composition = Composition::new(config);

    let substitutions: SubstitutionMap = args.substitutions.iter().cloned().collect();
    playout_file::load_template(&mut composition, &args.template, &substitutions, false)
        .with_context(|| format!("loading template {}", args.template.display()))?;

    if let Some(dpi) = args.dpi {
        composition.set_print_resolution(dpi);
    }
    Ok(composition)
}

fn export(args: ExportArgs) -> Result<()> {
    let format = args
        .format
        .or_else(|| OutputFormat::from_path(&args.output))
        .unwrap_or(OutputFormat::Pdf);
    let exporter = Exporter {
        format,
        page: args.page,
        world_file: args.world_file,
    };
    let mut composition = load_composition(&args)?;

    let mut written = Vec::new();
    match &args.atlas {
        Some(path) => {
            let atlas = playout_file::load_coverage(path).with_context(|| format!("reading {}", path.display()))?;
            composition.set_atlas(atlas);
            if !composition.set_atlas_mode(AtlasMode::Export) {
                bail!("atlas {} has no features", path.display());
            }
            let count = composition.atlas().num_features();
            for index in 0..count {
                composition.atlas_seek(index);
                let output = suffixed_path(&args.output, Some((index + 1).to_string()), format.extension());
                written.extend(exporter.export(&mut composition, &output)?);
            }
            composition.set_atlas_mode(AtlasMode::Off);
        }
        None => written.extend(exporter.export(&mut composition, &args.output)?),
    }

    for event in composition.take_events() {
        tracing::debug!("{:?}", event);
    }
    info!("Export finished, {} file(s) written", written.len());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing::subscriber::set_global_default(FmtSubscriber::builder().with_max_level(level).finish())?;

    match cli.command {
        Command::Export(args) => export(args),
    }
}
