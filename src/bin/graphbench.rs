use std::{env, fs, path::PathBuf, process};

use graphbench::{
    BackendFactory, BenchConfig, BenchSession, DatasetDescriptor, DefaultFactory,
    GraphBenchError, MeasurementStore, NativeBackend, SqliteBackend, SqliteConfig, StatsFile,
    cli::{Command, CommandLineConfig},
    conformance::{ConformanceReport, run_conformance},
    report::render_markdown,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("{}", CommandLineConfig::help());
        return;
    }
    let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    let cli = match CommandLineConfig::from_args(&arg_refs) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {err}");
            eprint!("{}", CommandLineConfig::help());
            process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("graphbench=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(err) => {
            error!(error = %err, "command failed");
            eprintln!("command failed: {err}");
            process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when the command ran but reported failures.
fn run(cli: &CommandLineConfig) -> Result<bool, GraphBenchError> {
    let config = load_config(cli)?;
    match cli.command {
        Command::SelfTest => self_test(cli, &config),
        Command::Import => {
            let factory = DefaultFactory::new(&config.base_dir);
            let mut store = StatsFile::open(&config.stats_file)?;
            let summary = BenchSession::new(&config, &factory).import_all(&mut store)?;
            for (dataset, backend, err) in &summary.failures {
                println!("{dataset} @ {backend}: import failed: {err}");
            }
            Ok(summary.failures.is_empty())
        }
        Command::Bench => {
            let factory = DefaultFactory::new(&config.base_dir);
            let mut store = StatsFile::open(&config.stats_file)?;
            let summary = BenchSession::new(&config, &factory).run(&mut store)?;
            for pair in &summary.pairs {
                match &pair.skipped {
                    Some(reason) => println!("{} @ {}: skipped ({reason})", pair.dataset, pair.backend),
                    None => println!(
                        "{} @ {}: {} operations measured",
                        pair.dataset,
                        pair.backend,
                        pair.measured()
                    ),
                }
            }
            for (dataset, backend, err) in &summary.failures {
                println!("{dataset} @ {backend}: failed: {err}");
            }
            info!(stats = %config.stats_file.display(), records = store.len(), "session finished");
            Ok(true)
        }
        Command::Report => {
            let store = StatsFile::open(&config.stats_file)?;
            let markdown = render_markdown(&store, &config.device_name);
            match &cli.output {
                Some(path) => fs::write(path, markdown)
                    .map_err(|e| GraphBenchError::store(format!("{}: {e}", path.display())))?,
                None => print!("{markdown}"),
            }
            Ok(true)
        }
    }
}

fn load_config(cli: &CommandLineConfig) -> Result<BenchConfig, GraphBenchError> {
    let mut config = match &cli.config {
        Some(path) => BenchConfig::load(path)?,
        None => {
            let mut config = BenchConfig::default();
            config.apply_env(|name| env::var(name).ok())?;
            config
        }
    };
    if let Some(stats) = &cli.stats {
        config.stats_file = stats.clone();
    }
    if let Some(device) = &cli.device {
        config.device_name = device.clone();
    }
    if cli.repeat_existing {
        config.repeat_existing = true;
    }
    Ok(config)
}

fn self_test(cli: &CommandLineConfig, config: &BenchConfig) -> Result<bool, GraphBenchError> {
    let mut reports: Vec<(String, ConformanceReport)> = Vec::new();
    if cli.config.is_some() {
        let factory = DefaultFactory::new(&config.base_dir);
        let dataset = DatasetDescriptor {
            name: "GraphTest".to_string(),
            path: PathBuf::new(),
            enabled: true,
        };
        for backend in config.enabled_backends() {
            let handle = factory.open(backend, &dataset)?;
            reports.push((backend.name.clone(), run_conformance(handle.as_ref())?));
        }
    } else {
        let sqlite = SqliteBackend::in_memory("GraphTest", &SqliteConfig::default())?;
        reports.push(("SQLiteMem".to_string(), run_conformance(&sqlite)?));
        let native = NativeBackend::in_memory("GraphTest")?;
        reports.push(("Native".to_string(), run_conformance(&native)?));
    }

    let mut passed = true;
    for (name, report) in &reports {
        println!("{name}: {report}");
        passed &= report.passed();
    }
    Ok(passed)
}
