//! Fractal MAIS simulation CLI
//!
//! Generates hierarchies, computes ME-ERT-CORE reliability and runs the
//! benchmark and measurement sweeps

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fmais_simulation_engine::{
    BenchReport, MeErtCore, ReliabilityVariant, Scenario, SimulationConfig, SystemModel, bench,
    fixtures, me_ert_core_coefficient, measurement, storage,
};

#[derive(Parser, Debug)]
#[command(name = "fmais-sim")]
#[command(about = "Fractal MAIS generator and ME-ERT-CORE reliability engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Random seed for reproducible runs
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory for JSON and CSV output
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    /// Output file name prefix (e.g. docker)
    #[arg(long, global = true)]
    tag: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a random hierarchy and compute its reliability
    Example {
        /// Maximum number of layers
        #[arg(short, long)]
        depth: Option<usize>,

        /// Ordinary applications
        #[arg(short, long)]
        apps: Option<usize>,

        /// Minimum instances per application
        #[arg(long)]
        min_instances: Option<usize>,

        /// Exclusive upper bound of instances per application
        #[arg(long)]
        max_instances: Option<usize>,

        /// Save the generated model as JSON
        #[arg(long)]
        save: bool,
    },

    /// Compute every reliability variant of a reference hierarchy
    Reliability {
        #[arg(value_enum, default_value_t = Fixture::Basic)]
        fixture: Fixture,
    },

    /// Run a timing sweep and save the tables
    Bench {
        #[command(subcommand)]
        target: BenchTarget,
    },

    /// Run the depth 2/3/4 and wide measurements and save the series
    Measure {
        /// Largest application count of the wide scenario
        #[arg(long)]
        wide_max_apps: Option<usize>,

        /// Application count increment of the wide scenario
        #[arg(long)]
        wide_step: Option<usize>,

        /// Skip the wide scenario
        #[arg(long)]
        skip_wide: bool,
    },

    /// Normalize a reliability into the ME-ERT-CORE coefficient
    Coefficient {
        value: f64,
        order: usize,
    },
}

#[derive(Subcommand, Debug)]
enum BenchTarget {
    /// Hierarchy generation
    Model,
    /// Canonical reliability on random hierarchies
    Meertcore,
    /// Simple reliability on wide hierarchies
    Optimized {
        /// Applications in every wide hierarchy
        #[arg(long, default_value_t = 100)]
        apps: usize,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Fixture {
    Basic,
    Depth2,
    Depth3,
    Depth4,
}

impl Fixture {
    fn model(self) -> SystemModel {
        match self {
            Fixture::Basic => fixtures::basic(),
            Fixture::Depth2 => fixtures::depth2(),
            Fixture::Depth3 => fixtures::depth3(),
            Fixture::Depth4 => fixtures::depth4(),
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fmais_simulation_engine=info,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║  Fractal MAIS Simulation Engine                          ║");
    println!("╚══════════════════════════════════════════════════════════╝\n");

    match cli.command {
        Commands::Example {
            depth,
            apps,
            min_instances,
            max_instances,
            save,
        } => {
            let mut config = config;
            if let Some(depth) = depth {
                config.generator.depth = depth;
            }
            if let Some(apps) = apps {
                config.generator.apps = apps;
            }
            if let Some(min) = min_instances {
                config.generator.min_instances = min;
            }
            if let Some(max) = max_instances {
                config.generator.max_instances = max;
            }
            config.validate()?;
            run_example(&config, save)
        }
        Commands::Reliability { fixture } => run_reliability(fixture),
        Commands::Bench { target } => run_bench(&config, target),
        Commands::Measure {
            wide_max_apps,
            wide_step,
            skip_wide,
        } => {
            let mut config = config;
            let max_apps = wide_max_apps.unwrap_or(config.measurement.wide_max_apps);
            let step = wide_step.unwrap_or(config.measurement.wide_step);
            config.measurement = config.measurement.with_wide_range(max_apps, step);
            config.validate()?;
            run_measure(&config, skip_wide)
        }
        Commands::Coefficient { value, order } => {
            let coefficient = me_ert_core_coefficient(value, order)?;
            println!("ME-ERT-CORE coefficient of {} (order {}): {}", value, order, coefficient);
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<SimulationConfig> {
    let mut config = match &cli.config {
        Some(path) => SimulationConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => SimulationConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config = config.with_seed(seed);
    }
    if let Some(dir) = &cli.output_dir {
        config = config.with_output_dir(dir);
    }
    if let Some(tag) = &cli.tag {
        config = config.with_tag(tag);
    }
    Ok(config)
}

fn run_example(config: &SimulationConfig, save: bool) -> anyhow::Result<()> {
    let generator = config.generator;
    let mut rng = config.rng();

    println!("Configuration:");
    println!("  Depth: {}", generator.depth);
    println!("  Applications: {}", generator.apps);
    println!(
        "  Instances per application: {}..{}\n",
        generator.min_instances, generator.max_instances
    );

    let names = SystemModel::generate_app_names(generator.apps);
    let mut model = SystemModel::new(names.len(), generator.depth);
    model.create_random_applications(
        &names,
        generator.min_instances,
        generator.max_instances,
        &mut rng,
    );
    model.generate(&mut rng);

    println!("{}", model);
    println!(
        "Layers: {}  Instances: {}  VI hosts: {}\n",
        model.layer_count(),
        model.total_instances(),
        model.vi_count()
    );

    model.set_application_priorities_random(&mut rng);
    model.set_instance_priorities_random(&mut rng)?;
    model.set_instance_reliabilities_random(&mut rng)?;
    let reliability = MeErtCore::new(&mut model).compute(ReliabilityVariant::Canonical)?;
    println!("ME-ERT-CORE reliability: {:.6}", reliability);

    if save {
        let path = storage::export_json(&config.output_dir, &config.file_stem("model"), &model)?;
        println!("  Model saved to {}", path.display());
    }
    Ok(())
}

fn run_reliability(fixture: Fixture) -> anyhow::Result<()> {
    let mut model = fixture.model();
    println!("{}", model);

    model.gather_all_applications_reliabilities()?;
    model.set_chain_coefficients()?;

    println!("{:<12} {:>16}", "Variant", "Reliability");
    println!("{}", "-".repeat(29));
    for variant in [
        ReliabilityVariant::Canonical,
        ReliabilityVariant::Optimized,
        ReliabilityVariant::Simple,
    ] {
        // optimized passes overwrite application reliabilities
        model.gather_all_applications_reliabilities()?;
        let value = MeErtCore::new(&mut model).compute(variant)?;
        println!("{:<12} {:>16.12}", variant, value);
    }
    Ok(())
}

fn run_bench(config: &SimulationConfig, target: BenchTarget) -> anyhow::Result<()> {
    let mut rng = config.rng();
    println!("Sweep: {:?}\n", config.bench);

    let report: Box<dyn BenchReport> = match target {
        BenchTarget::Model => Box::new(bench::bench_system_model(&config.bench, &mut rng)?),
        BenchTarget::Meertcore => Box::new(bench::bench_me_ert_core(&config.bench, &mut rng)?),
        BenchTarget::Optimized { apps } => {
            if config.bench.max_depth > 4 {
                warn!(max_depth = config.bench.max_depth, "wide hierarchies stop at depth 4");
            }
            Box::new(bench::bench_me_ert_core_optimized(&config.bench, apps, &mut rng)?)
        }
    };

    for (suffix, table) in report.tables() {
        let name = config.file_stem(&format!("{}_{}", suffix, report.name()));
        for path in storage::save_table(&config.output_dir, &name, &table)? {
            println!("  Saved {}", path.display());
        }
    }

    println!("\n✅ Benchmark complete!\n");
    Ok(())
}

fn run_measure(config: &SimulationConfig, skip_wide: bool) -> anyhow::Result<()> {
    let mut rng = config.rng();
    let dir = &config.output_dir;

    for scenario in Scenario::ALL {
        let run = measurement::run(scenario, &config.measurement, &mut rng)?;
        let stem = config.file_stem(&format!("depth{}", run.depth));
        storage::export_json(dir, &format!("{}_reliability", stem), &run.reliability)?;
        storage::export_json(dir, &format!("{}_coefficient", stem), &run.coefficients)?;
        info!(depth = run.depth, applications = run.applications, "measurement saved");
    }

    if !skip_wide {
        let wide = measurement::run_wide(&config.measurement, &mut rng)?;
        let stem = config.file_stem("wide");
        storage::export_json(dir, &format!("{}_reliability", stem), &wide.reliability)?;
        storage::export_json(dir, &format!("{}_coefficient", stem), &wide.coefficients)?;
        info!(models = wide.reliability.len(), "wide measurement saved");
    }

    println!("\n✅ Measurement complete! Results in {}\n", dir.display());
    Ok(())
}
