//! `solidify` — CLI du solidifieur
//!
//! Ici on fait uniquement : parsing d'arguments, initialisation (logger,
//! couleur), et délégation à `solidify_cli` (lib).

#![forbid(unsafe_code)]

use std::{path::PathBuf, process::ExitCode};

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use solidify_cli as cli;

// ──────────────────────────── CLI (clap) ────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "solidify", version, about = "Solidifie closures, classes et modules en déclarations C constantes", long_about = None)]
struct Opt {
    /// Augmente la verbosité (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Mode silencieux (casse la verbosité)
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,

    /// Force la couleur (si la feature `color` est compilée)
    #[arg(long = "color", value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    /// Sous-commandes
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Solidifier la racine d'un graphe JSON en source C
    Dump {
        /// Graphe JSON (ou - pour stdin)
        input: Option<PathBuf>,
        /// Fichier C de sortie (stdout si omis)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Chaînes en littéraux `"..."` plutôt qu'en identifiants
        #[arg(short = 'l', long)]
        literal: bool,
        /// Nombre de globales built-in (remplace celui du document)
        #[arg(short = 'b', long)]
        builtins: Option<usize>,
        /// Profondeur d'imbrication maximale
        #[arg(long = "max-depth", default_value_t = cli::DEFAULT_MAX_DEPTH)]
        max_depth: usize,
        /// Créer les dossiers parents si nécessaire
        #[arg(long = "mkdir")]
        auto_mkdir: bool,
        /// Écraser le fichier de sortie
        #[arg(long)]
        overwrite: bool,
        /// Afficher le temps de solidification
        #[arg(long)]
        time: bool,
    },

    /// Désassembler les prototypes d'un graphe JSON
    Disasm {
        /// Graphe JSON (ou - pour stdin)
        input: Option<PathBuf>,
        /// Fichier de sortie (stdout si omis)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Id du prototype à lister
        #[arg(long)]
        proto: Option<String>,
    },
}

// ──────────────────────────── Helpers ────────────────────────────

fn input_from_opt(p: Option<PathBuf>) -> cli::Input {
    match p {
        Some(p) if p.as_os_str() != "-" => cli::Input::Path(p),
        _ => cli::Input::Stdin,
    }
}

fn output_from_opt(p: Option<PathBuf>) -> cli::Output {
    p.map_or(cli::Output::Stdout, cli::Output::Path)
}

// ──────────────────────────── Logger / Verbosité ────────────────────────────

fn init_telemetry(verbose: u8, quiet: bool) {
    #[cfg(feature = "trace")]
    {
        let level = if quiet {
            "error"
        } else {
            match verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        };
        std::env::set_var(
            "RUST_LOG",
            std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string()),
        );
        cli::init_logger();
    }
    #[cfg(not(feature = "trace"))]
    let _ = (verbose, quiet);
}

fn init_color(choice: ColorChoice) {
    // `owo-colors` détecte le TTY ; on ne force que sur demande
    match choice {
        ColorChoice::Auto => {},
        ColorChoice::Always => {
            std::env::set_var("CLICOLOR_FORCE", "1");
            std::env::remove_var("NO_COLOR");
        },
        ColorChoice::Never => {
            std::env::set_var("NO_COLOR", "1");
            std::env::remove_var("CLICOLOR_FORCE");
        },
    }
}

// ──────────────────────────── main ────────────────────────────

fn main() -> ExitCode {
    match real_main() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        },
    }
}

fn real_main() -> Result<u8> {
    let opt = Opt::parse();

    init_color(opt.color);
    init_telemetry(opt.verbose, opt.quiet);

    let command = match opt.cmd {
        Command::Dump { input, output, literal, builtins, max_depth, auto_mkdir, overwrite, time } => {
            cli::Command::Dump(cli::DumpTask {
                input: input_from_opt(input),
                output: output_from_opt(output),
                literal,
                builtins,
                max_depth,
                auto_mkdir,
                overwrite,
                time,
            })
        },
        Command::Disasm { input, output, proto } => cli::Command::Disasm(cli::DisasmTask {
            input: input_from_opt(input),
            output: output_from_opt(output),
            proto,
        }),
    };

    let code = cli::execute(command)?;
    Ok(u8::try_from(code).unwrap_or(1))
}
