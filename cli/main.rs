#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process;

use netreg::ccd::{Convergence, Penalty};
use netreg::data::{Family, ModelData};
use netreg::io::{read_graph, read_matrix, write_indices, write_matrix, write_vector};
use netreg::model::{FitConfig, FittedModel, fit};
use netreg::model_selection::{SearchDimension, SelectionConfig, select_and_fit};

#[derive(Clone, Copy, ValueEnum)]
pub enum FamilyCli {
    Gaussian,
    Binomial,
}

impl From<FamilyCli> for Family {
    fn from(f: FamilyCli) -> Self {
        match f {
            FamilyCli::Gaussian => Family::Gaussian,
            FamilyCli::Binomial => Family::Binomial,
        }
    }
}

#[derive(Args)]
pub struct InputArgs {
    /// Design matrix X: headerless TSV, one sample per row
    #[arg(short = 'd', long)]
    pub design: PathBuf,

    /// Response matrix Y: headerless TSV, one sample per row
    #[arg(short = 'r', long)]
    pub response: PathBuf,

    /// Covariate affinity matrix (P x P). Omit to disable the covariate graph penalty
    #[arg(short = 'u', long)]
    pub gx: Option<PathBuf>,

    /// Response affinity matrix (Q x Q). Omit to disable the response graph penalty
    #[arg(short = 'v', long)]
    pub gy: Option<PathBuf>,

    #[arg(short = 'f', long, value_enum, default_value_t = FamilyCli::Gaussian)]
    pub family: FamilyCli,

    /// Prefix for all output files
    #[arg(short = 'o', long, default_value = "netreg")]
    pub out: String,
}

#[derive(Args)]
pub struct SolverArgs {
    /// Elastic-net mixing parameter (1 = Lasso, 0 = ridge)
    #[arg(short = 'a', long, default_value = "1")]
    pub alpha: f64,

    /// Maximum number of coordinate-descent sweeps
    #[arg(short = 'm', long, default_value = "100000")]
    pub max_iterations: usize,

    /// Convergence threshold on the summed absolute coefficient change
    #[arg(short = 't', long, default_value = "1e-5")]
    pub threshold: f64,
}

impl SolverArgs {
    fn convergence(&self) -> Convergence {
        Convergence {
            max_iterations: self.max_iterations,
            threshold: self.threshold,
        }
    }
}

#[derive(Args)]
pub struct FitArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub solver: SolverArgs,

    /// Overall penalization strength
    #[arg(short = 'l', long, default_value = "1")]
    pub lambda: f64,

    /// Weight of the covariate graph penalty
    #[arg(short = 'x', long, default_value = "1")]
    pub psigx: f64,

    /// Weight of the response graph penalty
    #[arg(short = 'y', long, default_value = "1")]
    pub psigy: f64,
}

#[derive(Args)]
pub struct SelectArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub solver: SolverArgs,

    /// Number of cross-validation folds
    #[arg(long, default_value = "10")]
    pub n_folds: usize,

    /// Seed of the fold shuffle
    #[arg(long, default_value = "23")]
    pub seed: u64,

    /// Maximum number of cross-validated objective evaluations
    #[arg(long, default_value = "1000")]
    pub optim_max_evaluations: usize,

    /// Final trust-region radius of the hyperparameter search
    #[arg(long, default_value = "1e-3")]
    pub optim_epsilon: f64,

    /// Hold lambda at this value instead of searching it
    #[arg(long, value_name = "LAMBDA")]
    pub fix_lambda: Option<f64>,

    /// Hold psigx at this value instead of searching it
    #[arg(long, value_name = "PSIGX")]
    pub fix_psigx: Option<f64>,

    /// Hold psigy at this value instead of searching it
    #[arg(long, value_name = "PSIGY")]
    pub fix_psigy: Option<f64>,

    /// Upper bound of the lambda search
    #[arg(long, default_value = "100")]
    pub max_lambda: f64,

    /// Upper bound of the psigx and psigy searches
    #[arg(long, default_value = "10000")]
    pub max_psi: f64,
}

#[derive(Parser)]
#[command(
    name = "netreg",
    about = "Network-regularized multivariate linear regression",
    long_about = "Fits a multivariate linear model with an elastic-net penalty and graph penalties \
                  over covariates and responses, optionally choosing the penalty strengths by \
                  cross-validation."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit with fixed hyperparameters
    #[command(about = "Fit a model (outputs: coefficients, intercepts, model.toml)")]
    Fit(FitArgs),

    /// Choose hyperparameters by cross-validation, then fit
    #[command(about = "Select hyperparameters and fit (outputs: fit outputs, folds, hyperparameters)")]
    Select(SelectArgs),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Fit(args) => fit_command(&args),
        Commands::Select(args) => select_command(&args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn load_data(input: &InputArgs) -> Result<ModelData, Box<dyn std::error::Error>> {
    let x = read_matrix(&input.design)?;
    let y = read_matrix(&input.response)?;
    let gx = read_graph(input.gx.as_deref())?;
    let gy = read_graph(input.gy.as_deref())?;
    println!(
        "Loaded {} samples, {} covariates, {} responses",
        x.nrows(),
        x.ncols(),
        y.ncols()
    );
    Ok(ModelData::new(input.family.into(), x, y, gx.view(), gy.view())?)
}

fn write_model(prefix: &str, model: &FittedModel) -> Result<(), Box<dyn std::error::Error>> {
    let coefficients = output_path(prefix, "coefficients.tsv");
    let intercepts = output_path(prefix, "intercepts.tsv");
    let toml = output_path(prefix, "model.toml");
    write_matrix(&coefficients, model.coefficients.view())?;
    write_vector(&intercepts, model.intercept.view())?;
    model.save(&toml)?;
    println!(
        "Coefficients ({} x {}) written to {}",
        model.n_covariates(),
        model.n_responses(),
        coefficients.display()
    );
    println!("Intercepts written to {}", intercepts.display());
    println!("Model written to {}", toml.display());
    Ok(())
}

fn output_path(prefix: &str, suffix: &str) -> PathBuf {
    PathBuf::from(format!("{prefix}_{suffix}"))
}

fn fit_command(args: &FitArgs) -> Result<(), Box<dyn std::error::Error>> {
    let data = load_data(&args.input)?;
    let config = FitConfig {
        penalty: Penalty {
            lambda: args.lambda,
            alpha: args.solver.alpha,
            psigx: args.psigx,
            psigy: args.psigy,
        },
        convergence: args.solver.convergence(),
    };
    let model = fit(&data, &config)?;
    write_model(&args.input.out, &model)
}

fn select_command(args: &SelectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let data = load_data(&args.input)?;
    let dimension = |fixed: Option<f64>, upper: f64| match fixed {
        Some(v) => SearchDimension::fixed(v),
        None => SearchDimension::free(1.0_f64.min(upper), 0.0, upper),
    };
    let defaults = SelectionConfig::default();
    let config = SelectionConfig {
        n_folds: args.n_folds,
        seed: args.seed,
        lambda: dimension(args.fix_lambda, args.max_lambda),
        psigx: dimension(args.fix_psigx, args.max_psi),
        psigy: dimension(args.fix_psigy, args.max_psi),
        alpha: args.solver.alpha,
        max_evaluations: args.optim_max_evaluations,
        radius_stop: args.optim_epsilon,
        convergence: args.solver.convergence(),
        ..defaults
    };

    let (selection, model) = select_and_fit(&data, &config, args.solver.convergence())?;

    for (name, value) in selection.parameters.to_map() {
        println!("{name}\t{value}");
    }
    let folds = output_path(&args.input.out, "folds.tsv");
    write_indices(&folds, &selection.fold_ids)?;
    println!("Fold assignments written to {}", folds.display());

    let params = output_path(&args.input.out, "hyperparameters.toml");
    std::fs::write(&params, toml::to_string_pretty(&selection.parameters)?)?;
    println!("Hyperparameters written to {}", params.display());

    write_model(&args.input.out, &model)
}
