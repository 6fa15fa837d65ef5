use clap::{Parser, Subcommand};
use imagelab::bitmap::{Bitmap, Header};
use imagelab::harness::Harness;
use imagelab::registry::Registry;
use imagelab::starter::Starter;
use imagelab::store::{InputStore, SnapshotStore};
use imagelab::types::{Coordinate, ManipKind, Rgb};
use imagelab::workspace::{Slot, Workspace};
use imagelab::{config, output, suite};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "imagelab")]
#[command(about = "Pixel manipulation lab with a differential grading harness")]
#[command(long_about = "\
Pixel manipulation lab with a differential grading harness

Tools run at a clicked pixel, filters run over the whole image. The harness
runs every case of a suite against the linked module and compares each
result with a golden snapshot, pixel by pixel, within a tolerance.

Project layout:

  imagelab.toml        # Config (optional; see 'imagelab gen-config')
  suite.toml           # [[case]] tables: name, manip, weight, image_sets, ...
  inputs/              # Original images: square.bmp, pad1.png, ...
  golden/              # Golden snapshots written by 'imagelab snapshot'
  └── manifest.json

Typical workflow:
  imagelab snapshot --suite suite.toml   # record reference output
  imagelab run --suite suite.toml        # grade the linked module")]
#[command(version)]
struct Cli {
    /// Project directory (inputs and golden paths are relative to it)
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Config file (default: <root>/imagelab.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Grade the linked module against the golden store
    Run {
        #[arg(long, default_value = "suite.toml")]
        suite: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the tools and filters the linked module exports
    List,
    /// Regenerate the golden store from the linked module
    Snapshot {
        #[arg(long, default_value = "suite.toml")]
        suite: PathBuf,
    },
    /// Show the validated header of a bitmap
    Inspect { file: PathBuf },
    /// Apply one tool or filter to an image
    Apply {
        manip: String,
        input: PathBuf,
        #[arg(value_name = "OUTPUT")]
        dest: PathBuf,
        /// Color as R,G,B
        #[arg(long, value_parser = parse_rgb)]
        color: Option<Rgb>,
        /// Free-text parameter
        #[arg(long, default_value = "")]
        extra: String,
        /// Top-down click position as X,Y (tools only)
        #[arg(long, value_parser = parse_coordinate)]
        at: Option<Coordinate>,
        /// Second image, passed to functions that take two
        #[arg(long)]
        other: Option<PathBuf>,
    },
    /// Print a stock imagelab.toml with all options documented
    GenConfig,
}

fn parse_numbers<const N: usize>(s: &str) -> Result<[u32; N], String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != N {
        return Err(format!("expected {N} comma-separated numbers, got {s:?}"));
    }
    let mut out = [0u32; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part
            .parse()
            .map_err(|e| format!("{part:?} is not a number: {e}"))?;
    }
    Ok(out)
}

fn parse_rgb(s: &str) -> Result<Rgb, String> {
    let [r, g, b] = parse_numbers::<3>(s)?;
    let channel = |v: u32| u8::try_from(v).map_err(|_| format!("channel {v} is above 255"));
    Ok(Rgb::new(channel(r)?, channel(g)?, channel(b)?))
}

fn parse_coordinate(s: &str) -> Result<Coordinate, String> {
    let [x, y] = parse_numbers::<2>(s)?;
    Ok(Coordinate::new(x, y))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn resolve_path(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.root.join(config::DEFAULT_CONFIG_FILE));

    match cli.command {
        Command::Run { suite: suite_file, json } => {
            let lab = config::load_config(&config_path)?;
            let suite_path = resolve_path(&cli.root, &suite_file);
            if !json {
                println!("==> Loading suite {}", suite_path.display());
            }
            let suite = suite::load_suite(&suite_path, &lab)?;
            let harness = Harness::from_config(&lab, &cli.root)?;
            let registry = Registry::load(&Starter);
            if let Err(e) = &registry {
                log::warn!("{e}; every case will be skipped");
            }
            let threads = config::effective_threads(&lab.processing);
            if !json {
                println!("==> Grading {} cases on {} workers", suite.len(), threads);
            }
            let report = harness.run_suite(&suite, registry.as_ref(), threads)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                output::print_suite_report(&report);
            }
        }
        Command::List => {
            let registry = Registry::load(&Starter)?;
            output::print_registry(&registry);
        }
        Command::Snapshot { suite: suite_file } => {
            let lab = config::load_config(&config_path)?;
            let suite_path = resolve_path(&cli.root, &suite_file);
            let suite = suite::load_suite(&suite_path, &lab)?;
            let registry = Registry::load(&Starter)?;
            let inputs = InputStore::new(cli.root.join(&lab.paths.inputs));
            let golden_dir = cli.root.join(&lab.paths.golden);
            let mut golden = SnapshotStore::open_or_create(golden_dir.clone())?;

            println!("==> Writing snapshots to {}", golden_dir.display());
            let summary = imagelab::snapshot::regenerate(
                &suite,
                &registry,
                &inputs,
                &mut golden,
                lab.harness.seed,
            )?;
            output::print_snapshot_summary(&summary, &golden_dir);
        }
        Command::Inspect { file } => {
            let bytes = std::fs::read(&file)?;
            let header = Header::parse(&bytes)?;
            Bitmap::decode(&bytes)?;
            output::print_header(&file, &header);
        }
        Command::Apply {
            manip,
            input,
            dest,
            color,
            extra,
            at,
            other,
        } => {
            let registry = Registry::load(&Starter)?;
            let descriptor = registry
                .get(&manip)
                .ok_or_else(|| format!("{manip}() is not exported by {}", registry.module_name()))?;

            let mut workspace = Workspace::new();
            workspace.load(Slot::Primary, &input)?;
            if let Some(other) = &other {
                workspace.load(Slot::Secondary, other)?;
            }
            if let Some(color) = color {
                workspace.color = color;
            }
            workspace.extra = extra;

            match descriptor.kind() {
                ManipKind::Filter => workspace.apply_filter(descriptor)?,
                ManipKind::Tool => {
                    let at = at.ok_or_else(|| format!("{manip}() is a tool; pass --at X,Y"))?;
                    workspace.apply_tool(descriptor, at)?;
                }
            }
            workspace.save(Slot::Primary, &dest)?;
            println!("==> {manip}: {} → {}", input.display(), dest.display());
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}
