use clap::{Parser, Subcommand};
use log::{error, info};
use pathimg::loader::FileLoader;
use pathimg::{config, output, path, pipeline};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "pathimg")]
#[command(about = "Image transformations addressed by a URL path")]
#[command(long_about = "\
Image transformations addressed by a URL path

A path names the source image and every operation applied to it:

  unsafe/trim/10x20:300x400/fit-in/300x200/left/top/filters:blur(2)/photos/a.jpg
  │      │    │             │      │       │         │               └ image
  │      │    │             │      │       │         └ filters, applied in order
  │      │    │             │      │       └ alignment (or smart)
  │      │    │             │      └ target size; -W / -H flip
  │      │    │             └ fit inside the box instead of covering it
  │      │    └ crop rectangle left x top : right x bottom
  │      └ trim uniform borders
  └ unsafe, or a signature

Run 'pathimg gen-config' to generate a documented config file.")]
#[command(version)]
struct Cli {
    /// Config file (missing file means stock defaults)
    #[arg(long, default_value = "pathimg.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a path and print the resulting plan
    Parse {
        /// Request path, starting with `unsafe/` or a signature
        path: String,
        /// Print the plan as JSON instead of a tree
        #[arg(long)]
        json: bool,
    },
    /// Render one path to a file
    Render {
        /// Request path, starting with `unsafe/` or a signature
        path: String,
        /// Directory image identifiers are resolved against
        #[arg(long, default_value = ".")]
        images: PathBuf,
        /// Output file
        #[arg(long)]
        out: PathBuf,
    },
    /// Render every path listed in a file (one per line) in parallel
    Batch {
        /// File with one request path per line; blank lines and `#` comments are skipped
        file: PathBuf,
        /// Directory image identifiers are resolved against
        #[arg(long, default_value = ".")]
        images: PathBuf,
        /// Directory results are written to, named by result key
        #[arg(long, default_value = "out")]
        out_dir: PathBuf,
    },
    /// Print a stock config file with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Parse { path, json } => {
            let plan = path::parse_request_path(&path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                output::print_plan(&plan);
            }
        }
        Command::Render { path, images, out } => {
            let config = config::load_config(&cli.config)?;
            let loader = FileLoader::new(images);
            let rendered = pipeline::process_path(&path, &loader, &config)?;
            std::fs::write(&out, &rendered.bytes)?;
            output::print_rendered(&path, &out, &rendered);
        }
        Command::Batch {
            file,
            images,
            out_dir,
        } => {
            let config = config::load_config(&cli.config)?;
            let loader = FileLoader::new(images);
            let list = std::fs::read_to_string(&file)?;
            let paths: Vec<&str> = list
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .collect();
            std::fs::create_dir_all(&out_dir)?;
            info!("Rendering {} paths from {}", paths.len(), file.display());

            let failed = paths
                .par_iter()
                .filter(|raw| {
                    match render_one(raw, &loader, &config, &out_dir) {
                        Ok(()) => false,
                        Err(e) => {
                            error!("{raw}: {e}");
                            true
                        }
                    }
                })
                .count();
            println!("{}", output::format_batch_summary(paths.len() - failed, failed));
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Render one batch entry to `<out_dir>/<result key>.<ext>`.
fn render_one(
    raw: &str,
    loader: &FileLoader,
    config: &config::ProcessorConfig,
    out_dir: &Path,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let plan = path::parse_request_path(raw)?;
    let cancel = pipeline::CancelToken::for_config(config);
    let rendered = pipeline::process(&plan, loader, config, &cancel)?;
    let ext = if plan.meta {
        "json"
    } else {
        rendered.format.as_str()
    };
    let destination = out_dir.join(format!("{}.{ext}", plan.result_key()));
    std::fs::write(&destination, &rendered.bytes)?;
    output::print_rendered(&plan.image, &destination, &rendered);
    Ok(())
}
