use std::process::ExitCode;

use tracing::info;
use tracing_subscriber::EnvFilter;
use vf_solver::{Diagnostics, PennyCrack, PennyOutcome, SimulationConfig, VfError};

fn usage() {
    eprintln!("usage: vf-cli run <case.toml> [--json]");
    eprintln!("       vf-cli penny [--n N] [--radius R] [--pressure P] [--json]");
    eprintln!("       vf-cli check <case.toml>");
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_diagnostics(d: &Diagnostics) {
    println!("status: {:?}", d.status);
    println!("iterations: {}", d.iterations);
    println!("newton_iterations: {}", d.newton_iterations);
    println!("delta_v: {:.6e}", d.delta_v);
    println!("elastic_energy: {:.6e}", d.elastic_energy);
    println!("surface_energy: {:.6e}", d.surface_energy);
    println!("pressure_work: {:.6e}", d.pressure_work);
    println!("insitu_work: {:.6e}", d.insitu_work);
    println!("total_energy: {:.6e}", d.total_energy);
    println!("crack_volume: {:.6e}", d.crack_volume);
    println!("v_min: {:.6e}", d.v_min);
    println!("v_max: {:.6e}", d.v_max);
}

fn print_penny(outcome: &PennyOutcome) {
    print_diagnostics(&outcome.diagnostics);
    println!("cracked_nodes: {}", outcome.cracked_nodes);
    println!("sneddon_volume: {:.6e}", outcome.sneddon_volume);
    println!("volume_ratio: {:.4}", outcome.volume_ratio());
    println!("nominal_surface_energy: {:.6e}", outcome.nominal_surface_energy);
    println!("surface_ratio: {:.4}", outcome.surface_ratio());
}

fn fail(err: VfError) -> ExitCode {
    if err.is_configuration() {
        eprintln!("configuration error: {err}");
    } else {
        eprintln!("error: {err}");
    }
    ExitCode::from(1)
}

fn run_case(path: &str, json: bool) -> ExitCode {
    let config = match SimulationConfig::from_file(path) {
        Ok(config) => config,
        Err(err) => return fail(err),
    };
    info!("running {path} ({:?}, {} load steps)", config.mode, config.loads.steps);
    let history = match config.run() {
        Ok(history) => history,
        Err(err) => return fail(err),
    };
    if json {
        match serde_json::to_string_pretty(&history) {
            Ok(text) => println!("{text}"),
            Err(err) => return fail(err.into()),
        }
    } else {
        for (step, diagnostics) in history.iter().enumerate() {
            println!("step: {step}");
            print_diagnostics(diagnostics);
        }
    }
    ExitCode::SUCCESS
}

fn check_case(path: &str) -> ExitCode {
    let config = match SimulationConfig::from_file(path) {
        Ok(config) => config,
        Err(err) => return fail(err),
    };
    let model = match config.build_model() {
        Ok(model) => model,
        Err(err) => return fail(err),
    };
    let [nx, ny, nz] = model.grid.dims();
    println!("grid: {nx} x {ny} x {nz}");
    println!("subdomains: {}", model.partition.len());
    println!("layers: {}", model.materials.materials().len());
    println!("mode: {:?}", config.mode);
    println!("linear_solver: {}", config.linear.solver);
    println!("unilateral: {}", model.policy);
    println!("load_steps: {}", config.loads.steps);
    ExitCode::SUCCESS
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> Option<T> {
    match value.map(|v| v.parse::<T>()) {
        Some(Ok(parsed)) => Some(parsed),
        _ => {
            eprintln!("invalid or missing value for {flag}");
            None
        }
    }
}

fn run_penny(args: &[String]) -> ExitCode {
    let mut penny = PennyCrack::default();
    let mut json = false;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let parsed = match arg.as_str() {
            "--json" => {
                json = true;
                Some(())
            }
            "--n" => parse_value(arg, iter.next()).map(|n| penny.n = n),
            "--radius" => parse_value(arg, iter.next()).map(|r| penny.radius = r),
            "--pressure" => parse_value(arg, iter.next()).map(|p| penny.pressure = p),
            _ => None,
        };
        if parsed.is_none() {
            usage();
            return ExitCode::from(2);
        }
    }

    let outcome = match penny.run() {
        Ok(outcome) => outcome,
        Err(err) => return fail(err),
    };
    if json {
        match serde_json::to_string_pretty(&outcome) {
            Ok(text) => println!("{text}"),
            Err(err) => return fail(err.into()),
        }
    } else {
        print_penny(&outcome);
    }
    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        usage();
        return ExitCode::from(2);
    }
    init_logging();

    match (args[1].as_str(), &args[2..]) {
        ("run", [path]) => run_case(path, false),
        ("run", [path, flag]) if flag == "--json" => run_case(path, true),
        ("check", [path]) => check_case(path),
        ("penny", rest) => run_penny(rest),
        _ => {
            usage();
            ExitCode::from(2)
        }
    }
}
