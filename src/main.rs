use anyhow::{Context, Result};
use lbm_scheme::{ListingGenerator, ReportWriter, Scheme, SchemeConfig};
use lbm_scheme::config::OutputConfig;
use log::info;
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <scheme.json> [output_directory]", args[0]);
        eprintln!("  scheme.json      - JSON file describing the scheme and the analyses");
        eprintln!("  output_directory - overrides `output.output_directory`");
        std::process::exit(1);
    }

    let config_path = &args[1];
    info!("Loading scheme from: {}", config_path);
    let config = SchemeConfig::from_file(config_path)
        .with_context(|| format!("reading {config_path}"))?;

    let output = match (args.get(2), &config.output) {
        (Some(dir), current) => Some(OutputConfig {
            output_directory: dir.clone(),
            write_json: current.as_ref().is_none_or(|o| o.write_json),
        }),
        (None, current) => current.clone(),
    };

    let scheme = Scheme::new(config)?;
    info!("{scheme}");

    let analysis = scheme.analyze()?;
    if let Some(stable) = analysis.monotonically_stable {
        println!("monotonically stable: {stable}");
    }
    if let Some(stable) = analysis.l2_stable {
        println!("L2 stable: {stable}");
    }
    if let Some(consistency) = &analysis.consistency {
        print!("{consistency}");
    }

    if let Some(output) = output {
        let mut generator = ListingGenerator::new();
        scheme.generate(&mut generator)?;
        let writer = ReportWriter::new(&output);
        writer.write(&scheme, analysis, Some(generator.code()))?;
        info!("Output files written to: {}", writer.directory().display());
    }

    Ok(())
}
