use clap::Parser;
use pcb_autoroute::{load, route, RoutingSettings};
use std::error::Error;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pcb-autoroute", about = "Route two-pad nets on a KiCad board")]
struct Cli {
    /// Input board file (.kicad_pcb)
    input: PathBuf,

    /// Net to route, by name (repeatable; default: every named net)
    #[arg(short, long = "net", value_name = "NAME")]
    nets: Vec<String>,

    /// Grid resolution in mm per cell (overrides the settings file)
    #[arg(short, long)]
    resolution: Option<f64>,

    /// JSON routing settings file
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Emit the parsed board instead of routing it
    #[arg(long)]
    board: bool,

    /// Output JSON file (stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

fn run(cli: &Cli) -> Result<String, Box<dyn Error>> {
    let board = load(&cli.input)?;

    if cli.board {
        return Ok(to_json(&board, cli.pretty)?);
    }

    let mut settings = match &cli.settings {
        Some(path) => RoutingSettings::from_json_file(path)?,
        None => RoutingSettings::default(),
    };
    if let Some(resolution) = cli.resolution {
        settings.resolution = resolution;
        settings.validate()?;
    }

    let net_ids: Vec<_> = if cli.nets.is_empty() {
        board.nets().iter().map(|n| n.index).collect()
    } else {
        cli.nets
            .iter()
            .map(|name| {
                board
                    .net_index_of(name)
                    .ok_or_else(|| format!("unknown net: {name}"))
            })
            .collect::<Result<Vec<_>, _>>()?
    };

    let result = route(&board, &settings, &net_ids);
    Ok(to_json(&result, cli.pretty)?)
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let json = match run(&cli) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if let Some(output_path) = &cli.output {
        if let Err(e) = std::fs::write(output_path, &json) {
            eprintln!("Error writing {}: {e}", output_path.display());
            std::process::exit(1);
        }
        eprintln!("Written to {}", output_path.display());
    } else {
        println!("{json}");
    }
}
