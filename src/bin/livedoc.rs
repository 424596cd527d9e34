use clap::{Parser, Subcommand};
use livedoc::infrastructure::{init_logging, Config, LogConfig};
use livedoc::performance::{CheckCache, ParallelChecker};
use livedoc::{Document, DocumentCompiler, ModuleTypeEnv, ModuleValueEnv, Prelude, TypeError};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, error, info, Level};

#[derive(Parser, Debug)]
#[command(name = "livedoc", version, about = "Typecheck and evaluate live documents")]
struct Cli {
    /// Configuration file; defaults to the nearest livedoc.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<Level>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Typecheck documents given as JSON
    Check {
        files: Vec<PathBuf>,

        /// JSON map of module path to module type
        #[arg(long)]
        modules: Option<PathBuf>,

        /// Print the interface map of each document as JSON
        #[arg(long)]
        interfaces: bool,

        /// Number of worker threads (0 = auto)
        #[arg(long, default_value_t = 0)]
        workers: usize,
    },

    /// Typecheck and evaluate one document, printing each fragment's current value
    Eval {
        file: PathBuf,
    },

    /// Write a default livedoc.toml into the current directory
    Init,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut log = config.log.to_log_config().unwrap_or_else(|_| LogConfig::default());
    if let Some(level) = cli.log_level {
        log = log.with_level(level);
    }
    let _guard = init_logging(log);

    info!("livedoc starting");
    let result = match cli.command {
        Command::Check { files, modules, interfaces, workers } => {
            run_check(&config, &files, modules.as_deref(), interfaces, workers, !cli.no_color)
        }
        Command::Eval { file } => run_eval(&config, &file, !cli.no_color),
        Command::Init => run_init(),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::from(2)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(path) => Config::load(path)?,
        None => Config::discover()?,
    })
}

fn read_document(path: &Path) -> Result<Document, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let doc = Document::from_json(&content)
        .map_err(|e| format!("invalid document {}: {}", path.display(), e))?;
    debug!(path = %path.display(), fragments = doc.fragments.len(), "loaded document");
    Ok(doc)
}

fn read_modules(path: Option<&Path>) -> Result<ModuleTypeEnv, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(ModuleTypeEnv::new());
    };
    let content = fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    Ok(serde_json::from_str(&content)?)
}

fn compiler(config: &Config, modules: ModuleTypeEnv) -> DocumentCompiler {
    let compiler = DocumentCompiler::new(config.check.clone()).with_modules(modules);
    if config.cache.enabled {
        compiler.with_cache(Arc::new(CheckCache::new(config.cache.capacity)))
    } else {
        compiler
    }
}

fn print_errors(path: &Path, errors: &[TypeError], dropped: usize, color: bool) {
    for error in errors {
        let line = format!("{}:{}", path.display(), error);
        if color {
            eprintln!("\x1b[31m{}\x1b[0m", line);
        } else {
            eprintln!("{}", line);
        }
    }
    if dropped > 0 {
        eprintln!("{}: {} more error(s) not shown", path.display(), dropped);
    }
}

fn run_check(
    config: &Config,
    files: &[PathBuf],
    modules: Option<&Path>,
    interfaces: bool,
    workers: usize,
    color: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    if files.is_empty() {
        return Err("no documents specified".into());
    }

    let modules = read_modules(modules)?;
    let documents = files.iter()
        .map(|path| read_document(path))
        .collect::<Result<Vec<_>, _>>()?;

    let checker = ParallelChecker::new(compiler(config, modules), workers);
    let reports = checker.check_all(&documents);

    let mut total = 0;
    for report in &reports {
        let path = &files[report.index];
        total += report.checked.errors.len() + report.checked.dropped;
        print_errors(path, &report.checked.errors, report.checked.dropped, color);
        if interfaces {
            println!("{}", serde_json::to_string_pretty(&report.checked.interfaces.to_json())?);
        }
    }

    if total == 0 {
        println!("Checked {} document(s), no errors found", files.len());
    } else {
        eprintln!("Found {} error(s) in {} document(s)", total, files.len());
    }
    Ok(total == 0)
}

fn run_eval(config: &Config, file: &Path, color: bool) -> Result<bool, Box<dyn std::error::Error>> {
    let doc = read_document(file)?;
    let checked = compiler(config, ModuleTypeEnv::new()).check(&doc);
    print_errors(file, &checked.errors, checked.dropped, color);

    let evaluated = checked.evaluate(
        &doc,
        &Prelude::new(),
        Rc::new(ModuleValueEnv::new()),
        config.eval.to_options(),
        None,
    )?;

    let values: Vec<serde_json::Value> = evaluated.values.iter().map(|v| v.to_json()).collect();
    println!("{}", serde_json::to_string_pretty(&values)?);
    Ok(!checked.has_errors())
}

fn run_init() -> Result<bool, Box<dyn std::error::Error>> {
    let path = PathBuf::from(livedoc::infrastructure::config::CONFIG_FILE);
    if path.exists() {
        return Err(format!("{} already exists", path.display()).into());
    }
    Config::default().save(&path)?;
    println!("Wrote {}", path.display());
    Ok(true)
}
