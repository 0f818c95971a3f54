//! solidify-cli — bibliothèque interne du binaire `solidify`
//!
//! But : garder `main.rs` limité au parsing d'arguments et fournir ici une
//! API testable :
//! - chargement d'un graphe d'objets JSON (fichier ou stdin)
//! - `dump` : solidification vers C (stdout ou fichier, écriture atomique)
//! - `disasm` : listing des prototypes du graphe
//! - Traces (`feature = "trace"`) et couleurs (`feature = "color"`) optionnelles

#![deny(unused_must_use)]
#![forbid(unsafe_code)]

use std::{
    fs,
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    rc::Rc,
    time::Instant,
};

use anyhow::{anyhow, Context, Result};

#[cfg(feature = "color")]
use owo_colors::OwoColorize;

use solidify_core::{disasm::disassemble, graph::Graph, Proto, Value};
use solidify_emit::{DumpOptions, Solidifier};

pub use solidify_emit::DEFAULT_MAX_DEPTH;

// ───────────────────────────── Types publics ─────────────────────────────

/// Commande haut-niveau (le parsing CLI reste dans main.rs).
#[derive(Clone, Debug)]
pub enum Command {
    /// Solidifie la racine d'un graphe en C.
    Dump(DumpTask),
    /// Désassemble les prototypes d'un graphe.
    Disasm(DisasmTask),
}

/// Paramètres de `dump`.
#[derive(Clone, Debug)]
pub struct DumpTask {
    /// Graphe JSON.
    pub input: Input,
    /// Fichier C ou stdout.
    pub output: Output,
    /// Chaînes en littéraux plutôt qu'en identifiants.
    pub literal: bool,
    /// Nombre de globales built-in (prioritaire sur celui du document).
    pub builtins: Option<usize>,
    /// Profondeur d'imbrication maximale.
    pub max_depth: usize,
    /// Crée les dossiers parents si besoin.
    pub auto_mkdir: bool,
    /// Autorise l'écrasement.
    pub overwrite: bool,
    /// Affiche le temps de solidification.
    pub time: bool,
}

impl Default for DumpTask {
    fn default() -> Self {
        Self {
            input: Input::default(),
            output: Output::default(),
            literal: false,
            builtins: None,
            max_depth: DEFAULT_MAX_DEPTH,
            auto_mkdir: false,
            overwrite: false,
            time: false,
        }
    }
}

/// Paramètres de `disasm`.
#[derive(Clone, Debug, Default)]
pub struct DisasmTask {
    /// Graphe JSON.
    pub input: Input,
    /// Fichier texte ou stdout.
    pub output: Output,
    /// Id d'un prototype précis (sinon : la racine si c'est une closure, tous sinon).
    pub proto: Option<String>,
}

/// Entrée : fichier ou `-` (=stdin).
#[derive(Clone, Debug, Default)]
pub enum Input {
    /// Fichier.
    Path(PathBuf),
    /// Entrée standard.
    #[default]
    Stdin,
}

/// Sortie : fichier (écrit atomiquement) ou stdout.
#[derive(Clone, Debug, Default)]
pub enum Output {
    /// Fichier.
    Path(PathBuf),
    /// Sortie standard.
    #[default]
    Stdout,
}

// ───────────────────────────── Initialisation ─────────────────────────────

/// Initialise le logger selon la feature `trace`.
pub fn init_logger() {
    #[cfg(feature = "trace")]
    {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
            .format_timestamp_secs()
            .try_init();
    }
}

// ───────────────────────────── Exécution ─────────────────────────────

/// Exécute une commande. Retourne un code de sortie.
pub fn execute(cmd: Command) -> Result<i32> {
    match cmd {
        Command::Dump(t) => dump_entry(t)?,
        Command::Disasm(t) => disasm_entry(t)?,
    }
    Ok(0)
}

fn dump_entry(task: DumpTask) -> Result<()> {
    let graph = load_graph(&task.input)?;
    let opts = DumpOptions::new()
        .literal(task.literal)
        .builtins(task.builtins.or(graph.builtins).unwrap_or(0))
        .max_depth(task.max_depth);
    log::debug!("options: {opts:?}");

    let start = Instant::now();
    match &task.output {
        Output::Stdout => {
            // flux direct : un échec laisse un texte partiel sur stdout
            let mut s = Solidifier::new(BufWriter::new(io::stdout().lock()), opts);
            s.dump(&graph.root).context("échec de solidification")?;
        }
        Output::Path(p) => {
            prepare_output(p, task.auto_mkdir, task.overwrite)?;
            write_atomic_with(p, |w| {
                Solidifier::new(w, opts).dump(&graph.root).context("échec de solidification")
            })
            .with_context(|| format!("écriture de {}", display(p)))?;
            status_ok("SOLIDIFY", &display(p));
        }
    }
    if task.time {
        status_info("TIME", &format!("dump: {} ms", start.elapsed().as_millis()));
    }
    Ok(())
}

fn disasm_entry(task: DisasmTask) -> Result<()> {
    let graph = load_graph(&task.input)?;
    let listing: Vec<(String, Rc<Proto>)> = match (&task.proto, &graph.root) {
        (Some(id), _) => {
            let p = graph.protos.get(id).ok_or_else(|| anyhow!("prototype inconnu: {id}"))?;
            vec![(id.clone(), Rc::clone(p))]
        }
        (None, Value::Closure { closure, .. }) => {
            vec![(closure.proto.name.to_string_lossy(), Rc::clone(&closure.proto))]
        }
        (None, _) => graph.protos.iter().map(|(id, p)| (id.clone(), Rc::clone(p))).collect(),
    };

    let text = listing
        .iter()
        .map(|(title, proto)| disassemble(proto, title))
        .collect::<Vec<_>>()
        .join("\n");
    match &task.output {
        Output::Stdout => {
            let mut w = BufWriter::new(io::stdout().lock());
            w.write_all(text.as_bytes())?;
            w.flush()?;
        }
        Output::Path(p) => {
            write_atomic_with(p, |w| Ok(w.write_all(text.as_bytes())?))?;
            status_ok("DISASM", &display(p));
        }
    }
    Ok(())
}

// ───────────────────────────── Utilitaires E/S ─────────────────────────────

fn load_graph(input: &Input) -> Result<Graph> {
    let graph = match input {
        Input::Stdin => Graph::from_reader(io::stdin().lock()).context("lecture du graphe sur stdin")?,
        Input::Path(p) => {
            let f = File::open(p).with_context(|| format!("ouverture: {}", display(p)))?;
            Graph::from_reader(BufReader::new(f)).with_context(|| format!("lecture du graphe: {}", display(p)))?
        }
    };
    log::info!(
        "graphe chargé: {} classes, {} protos, {} modules, racine {}",
        graph.classes.len(),
        graph.protos.len(),
        graph.modules.len(),
        graph.root.kind()
    );
    Ok(graph)
}

fn prepare_output(path: &Path, auto_mkdir: bool, overwrite: bool) -> Result<()> {
    if auto_mkdir {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
    }
    if path.exists() && !overwrite {
        return Err(anyhow!("fichier de sortie existe déjà: {}", display(path)));
    }
    Ok(())
}

/// Écrit via `fill` dans un fichier temporaire voisin, renommé sur `path` seulement en cas de succès.
fn write_atomic_with<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = unique_tmp_path(parent, path.file_name().unwrap_or_default());
    let result = File::create(&tmp).map_err(anyhow::Error::from).and_then(|f| {
        let mut w = BufWriter::new(f);
        fill(&mut w)?;
        w.flush()?;
        Ok(())
    });
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    if path.exists() {
        // Windows : Rename sur cible existante peut échouer
        let _ = fs::remove_file(path);
    }
    fs::rename(&tmp, path).or_else(|_| {
        // fallback : copie puis suppr tmp
        fs::copy(&tmp, path).map(|_| ()).and_then(|()| fs::remove_file(&tmp))
    })?;
    Ok(())
}

fn unique_tmp_path(dir: &Path, base: &std::ffi::OsStr) -> PathBuf {
    let mut i = 0u32;
    loop {
        let candidate = dir.join(format!("{}.tmp{}", base.to_string_lossy(), i));
        if !candidate.exists() {
            return candidate;
        }
        i = i.wrapping_add(1);
    }
}

fn display(p: &Path) -> String { p.to_string_lossy().to_string() }

// ───────────────────────────── Sorties jolies ─────────────────────────────

fn status_ok(tag: &str, msg: &str) {
    #[cfg(feature = "color")]
    {
        eprintln!("{} {}", tag.green().bold(), msg);
    }
    #[cfg(not(feature = "color"))]
    {
        eprintln!("{tag} {msg}");
    }
}

fn status_info(tag: &str, msg: &str) {
    #[cfg(feature = "color")]
    {
        eprintln!("{} {}", tag.blue().bold(), msg);
    }
    #[cfg(not(feature = "color"))]
    {
        eprintln!("{tag} {msg}");
    }
}

// ───────────────────────────── Tests ─────────────────────────────
