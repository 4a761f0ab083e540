use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use layerstack::{
    CompositeKey, EngineOpts, LayerIndex, LayerStack, plan_instructions, select_cover,
};

#[derive(Parser, Debug)]
#[command(name = "layerstack", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Flatten layer images into a single PNG.
    Flatten(FlattenArgs),
    /// Print the reused cover and blend instructions for a target as JSON.
    Plan(PlanArgs),
}

#[derive(Parser, Debug)]
struct FlattenArgs {
    /// Layer image, bottom first. Repeat for every layer.
    #[arg(long = "layer", required = true)]
    layers: Vec<PathBuf>,

    /// Index of a layer to hide. Repeatable.
    #[arg(long = "hidden")]
    hidden: Vec<usize>,

    /// Display-only image drawn over the flattened result.
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Engine options JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct PlanArgs {
    /// Visible layer indices, ascending and comma separated.
    #[arg(long, value_delimiter = ',', required = true)]
    target: Vec<usize>,

    /// Cached key, comma separated (e.g. `1,2`). Repeat for several keys.
    #[arg(long = "cached", value_parser = parse_key)]
    cached: Vec<CompositeKey>,
}

fn parse_key(s: &str) -> Result<CompositeKey, String> {
    let raw = s
        .split(',')
        .map(|p| p.trim().parse::<usize>().map_err(|e| format!("'{p}': {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    CompositeKey::from_raw(raw).map_err(|e| e.to_string())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Flatten(args) => cmd_flatten(args),
        Command::Plan(args) => cmd_plan(args),
    }
}

fn read_image(path: &Path) -> anyhow::Result<image::DynamicImage> {
    image::open(path).with_context(|| format!("read image '{}'", path.display()))
}

fn cmd_flatten(args: FlattenArgs) -> anyhow::Result<()> {
    let opts = match &args.config {
        Some(p) => EngineOpts::from_json_path(p)?,
        None => EngineOpts::default(),
    };

    let (first, rest) = args
        .layers
        .split_first()
        .context("at least one --layer is required")?;
    let mut stack = LayerStack::from_image(read_image(first)?, opts);
    for path in rest {
        stack
            .add_layer(read_image(path)?.to_rgba8(), false)
            .with_context(|| format!("add layer '{}'", path.display()))?;
    }
    for &i in &args.hidden {
        stack
            .set_layer_visibility(LayerIndex(i), false)
            .with_context(|| format!("hide layer {i}"))?;
    }

    let flat = match &args.preview {
        Some(p) => stack.render_with_preview(&read_image(p)?.to_rgba8())?,
        None => stack.render()?.as_ref().clone(),
    };

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    flat.save_with_format(&args.out, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_plan(args: PlanArgs) -> anyhow::Result<()> {
    let target = CompositeKey::from_raw(args.target).context("invalid --target")?;
    let cover = select_cover(args.cached.iter(), target.indices());
    let instructions = plan_instructions(&cover, target.indices())?;

    let out = serde_json::json!({
        "target": target,
        "cover": cover,
        "instructions": instructions,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
