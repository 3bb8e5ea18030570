use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use kconfig_check::expect::{ConfigExpectations, check_expectations};
use kconfig_check::manifest::{self, CheckManifest, InputOverrides};
use kconfig_check::{CheckConfig, ConfigFormat, Error, Result, parse_config};

/// Exit status when the check ran and found errors (sysexits EX_SOFTWARE).
const EX_SOFTWARE: u8 = 70;
const LOG_JSON_ENV: &str = "KCONFIG_CHECK_LOG_JSON";

/// Checks that the input .config has all CONFIG_s listed in defconfig and fragments.
#[derive(Debug, Parser)]
#[command(author, version, about, args_override_self = true)]
struct Args {
    #[command(flatten)]
    check: CheckArgs,
    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Debug, clap::Args)]
struct CheckArgs {
    /// The .config produced by the build
    #[arg(long = "dot_config")]
    dot_config: Option<PathBuf>,
    /// Base defconfig
    #[arg(long)]
    defconfig: Option<PathBuf>,
    /// Fragments applied before the base defconfig is finalized; later ones win.
    /// Repeating the flag replaces the earlier list.
    #[arg(long = "pre_defconfig_fragments", num_args = 0.., action = ArgAction::Set)]
    pre_defconfig_fragments: Vec<PathBuf>,
    /// Fragments applied last; every entry of every fragment is checked
    #[arg(long = "post_defconfig_fragments", num_args = 0.., action = ArgAction::Set)]
    post_defconfig_fragments: Vec<PathBuf>,
    /// TOML file listing the inputs above; command line values win
    #[arg(long)]
    manifest: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Assert explicit CONFIG_ values in a .config
    Expect {
        /// The .config to inspect
        #[arg(long)]
        actual: PathBuf,
        /// JSON object of CONFIG_ name to expected value, e.g. '{"CONFIG_A": "y"}'
        #[arg(long)]
        expects: String,
    },
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let res = match args.cmd {
        Some(Command::Expect { actual, expects }) => cmd_expect(&actual, &expects),
        None => cmd_check(args.check),
    };
    match res {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EX_SOFTWARE),
        Err(Error::Usage(msg)) => Args::command()
            .error(ErrorKind::MissingRequiredArgument, msg)
            .exit(),
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kconfig_check=warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if env_bool(LOG_JSON_ENV, false) {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn cmd_check(args: CheckArgs) -> Result<bool> {
    let base = match &args.manifest {
        Some(path) => manifest::load(path)?,
        None => CheckManifest::default(),
    };
    let inputs = base.into_inputs(InputOverrides {
        dot_config: args.dot_config,
        defconfig: args.defconfig,
        pre_defconfig_fragments: args.pre_defconfig_fragments,
        post_defconfig_fragments: args.post_defconfig_fragments,
    })?;

    let checker = CheckConfig::new(inputs)?;
    Ok(checker.run())
}

fn cmd_expect(actual: &Path, expects: &str) -> Result<bool> {
    let expectations = ConfigExpectations::from_json(expects)?;
    let parsed = parse_config(actual, ConfigFormat::DotConfig)?;
    let failures = check_expectations(&parsed, actual, &expectations);
    for f in &failures {
        eprint!("{}", f.render());
    }
    Ok(failures.is_empty())
}
