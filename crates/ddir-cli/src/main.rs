use clap::Parser as ClapParser;
use ddir::ast::Design;
use ddir::{ConverterOptions, ModelBuilder, dump_model};
use miette::{IntoDiagnostic, Result, bail};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "ddir", about = "Lower a behavioral design (JSON AST) into a decision-diagram model")]
struct Cli {
    /// Design AST as JSON
    design: PathBuf,

    /// Converter options as TOML
    #[arg(long)]
    options: Option<PathBuf>,

    /// Write the model as JSON to this file
    #[arg(long, short)]
    out: Option<PathBuf>,

    /// Print the text listing of the model instead of JSON
    #[arg(long)]
    dump: bool,

    /// Print the lowered graphs and the graph order
    #[arg(long)]
    trace: bool,

    /// Log pipeline stages (overridden by RUST_LOG)
    #[arg(long, short)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let options = match &cli.options {
        Some(path) => {
            let text = fs::read_to_string(path).into_diagnostic()?;
            ConverterOptions::from_toml_str(&text).into_diagnostic()?
        }
        None => ConverterOptions::default(),
    };

    let input = fs::read_to_string(&cli.design).into_diagnostic()?;
    let design: Design = serde_json::from_str(&input).into_diagnostic()?;
    log::info!("converting entity {}", design.entity.name);

    let mut builder = ModelBuilder::new(&design).options(options);
    if cli.trace {
        builder = builder.trace_graphs().trace_order().trace_on_build();
    }
    let model = match builder.build_with_trace().res {
        Ok(model) => model,
        Err(err) => bail!("conversion of `{}` failed: {err}", cli.design.display()),
    };

    if cli.dump {
        print!("{}", dump_model(&model));
    }
    let json = serde_json::to_string_pretty(&model).into_diagnostic()?;
    match &cli.out {
        Some(path) => fs::write(path, json).into_diagnostic()?,
        None if !cli.dump => println!("{json}"),
        None => {}
    }
    Ok(())
}
