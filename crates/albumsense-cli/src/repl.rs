//! Interactive REPL for AlbumSense.
//!
//! Launch with `albumsense repl` to enter interactive mode.
//! Type `/help` for available commands, Tab for completion.

use std::path::Path;

use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};

use albumsense::catalog::is_supported_image;
use albumsense::{Modality, ResultArtifact};

use crate::config::DataPaths;
use crate::service::{join_rebuild, RebuildHandle, RetrievalService};

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/info", "Show loaded indexes and data paths"),
    ("/build", "Build an index now: /build image|audio"),
    ("/rebuild", "Rebuild an index in the background"),
    ("/image", "Search by cover image file"),
    ("/melody", "Search by pitch file (.notes.json)"),
    ("/load", "Load a .fspace index file"),
    ("/mapper", "Reload mapper.json"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Quit the REPL"),
];

/// REPL helper for tab completion.
struct AlbumHelper;

impl Default for AlbumHelper {
    fn default() -> Self {
        Self
    }
}

fn wants_file(cmd: &str, path: &Path) -> bool {
    let name = path.to_string_lossy();
    match cmd {
        "/load" => path.extension().is_some_and(|e| e == "fspace"),
        "/image" => is_supported_image(&name),
        "/melody" => name.ends_with(".json"),
        _ => false,
    }
}

impl Completer for AlbumHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];

        if !input.contains(' ') {
            let matches: Vec<Pair> = COMMANDS
                .iter()
                .filter(|(cmd, _)| cmd.starts_with(input))
                .map(|(cmd, desc)| Pair {
                    display: format!("{cmd:<16} {desc}"),
                    replacement: format!("{cmd} "),
                })
                .collect();
            return Ok((0, matches));
        }

        let parts: Vec<&str> = input.splitn(2, ' ').collect();
        let cmd = parts[0];
        let args = if parts.len() > 1 { parts[1] } else { "" };
        let prefix_start = input.len() - args.len();

        if cmd == "/build" || cmd == "/rebuild" {
            let matches: Vec<Pair> = ["image", "audio"]
                .iter()
                .filter(|m| m.starts_with(args.trim()))
                .map(|m| Pair {
                    display: m.to_string(),
                    replacement: format!("{m} "),
                })
                .collect();
            return Ok((prefix_start, matches));
        }

        if cmd == "/load" || cmd == "/image" || cmd == "/melody" {
            let mut files = Vec::new();
            if let Ok(entries) = std::fs::read_dir(".") {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if wants_file(cmd, &path) {
                        if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                            files.push(name.to_string());
                        }
                    }
                }
            }
            files.sort();
            let matches: Vec<Pair> = files
                .iter()
                .filter(|f| f.starts_with(args.trim()))
                .map(|f| Pair {
                    display: f.clone(),
                    replacement: format!("{f} "),
                })
                .collect();
            return Ok((prefix_start, matches));
        }

        Ok((pos, Vec::new()))
    }
}

impl Hinter for AlbumHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() || line.is_empty() {
            return None;
        }
        if line.starts_with('/') && !line.contains(' ') {
            for (cmd, _) in COMMANDS {
                if cmd.starts_with(line) && *cmd != line {
                    return Some(cmd[line.len()..].to_string());
                }
            }
        }
        None
    }
}

impl Highlighter for AlbumHelper {}
impl Validator for AlbumHelper {}
impl Helper for AlbumHelper {}

struct TabCompleteOrAcceptHint;

impl ConditionalEventHandler for TabCompleteOrAcceptHint {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        if ctx.has_hint() {
            Some(Cmd::CompleteHint)
        } else {
            Some(Cmd::Complete)
        }
    }
}

/// Session state.
struct ReplState {
    service: RetrievalService,
    rebuilds: Vec<(Modality, RebuildHandle)>,
}

impl ReplState {
    /// Report rebuilds that finished since the last prompt.
    fn reap_rebuilds(&mut self) {
        let (done, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.rebuilds)
            .into_iter()
            .partition(|(_, h)| h.is_finished());
        self.rebuilds = running;
        for (modality, handle) in done {
            match join_rebuild(handle) {
                Ok(report) => eprintln!(
                    "  \x1b[32m\u{2714}\x1b[0m {modality} rebuild done: {} items, {} variants, {} skipped",
                    report.processed,
                    report.variants,
                    report.skipped.len()
                ),
                Err(e) => eprintln!("  {modality} rebuild failed: {e}"),
            }
        }
    }
}

/// Run the interactive REPL.
pub fn run(paths: DataPaths) -> anyhow::Result<()> {
    eprintln!();
    eprintln!(
        "  \x1b[32m\u{25c9}\x1b[0m \x1b[1malbumsense v{}\x1b[0m \x1b[90m\u{2014} Album search by cover and melody\x1b[0m",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!();
    eprintln!(
        "    Press \x1b[36m/\x1b[0m to browse commands, \x1b[90mTab\x1b[0m to complete, \x1b[90m/exit\x1b[0m to quit."
    );
    eprintln!();

    let service = RetrievalService::open(paths)?;

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(20)
        .build();

    let mut rl: Editor<AlbumHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(config)?;
    rl.set_helper(Some(AlbumHelper));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    let hist_path = std::path::PathBuf::from(&home).join(".albumsense_history");
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let mut state = ReplState {
        service,
        rebuilds: Vec::new(),
    };
    let prompt = " \x1b[36malbum>\x1b[0m ";

    loop {
        state.reap_rebuilds();
        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let input = line.strip_prefix('/').unwrap_or(line);
                if input.is_empty() {
                    cmd_help();
                    continue;
                }

                let mut parts = input.splitn(2, ' ');
                let cmd = parts.next().unwrap_or("");
                let args = parts.next().unwrap_or("").trim();

                match cmd {
                    "exit" | "quit" => {
                        if !state.rebuilds.is_empty() {
                            eprintln!("  Waiting for {} rebuild(s)...", state.rebuilds.len());
                            for (_, handle) in state.rebuilds.drain(..) {
                                if let Err(e) = join_rebuild(handle) {
                                    eprintln!("  Rebuild failed: {e}");
                                }
                            }
                        }
                        eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                        break;
                    }
                    "help" | "h" | "?" => cmd_help(),
                    "clear" | "cls" => eprint!("\x1b[2J\x1b[H"),
                    "info" => cmd_info(&state),
                    "build" => cmd_build(args, &state),
                    "rebuild" => cmd_rebuild(args, &mut state),
                    "image" => cmd_image(args, &state),
                    "melody" => cmd_melody(args, &state),
                    "load" => cmd_load(args, &state),
                    "mapper" => cmd_mapper(&mut state),
                    _ => {
                        eprintln!("  Unknown command '/{cmd}'. Type /help for commands.");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => {
                eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    let _ = std::fs::create_dir_all(hist_path.parent().unwrap_or(std::path::Path::new(".")));
    let _ = rl.save_history(&hist_path);

    Ok(())
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for (cmd, desc) in COMMANDS {
        eprintln!("    {cmd:<18} {desc}");
    }
    eprintln!();
    eprintln!("  Tip: Tab completion works for commands, modalities, and files.");
    eprintln!();
}

fn parse_modality(args: &str) -> Option<Modality> {
    let word = args.split_whitespace().next()?;
    match word.parse() {
        Ok(m) => Some(m),
        Err(e) => {
            eprintln!("  {e}");
            None
        }
    }
}

fn first_arg(args: &str) -> Option<&str> {
    args.split_whitespace().next()
}

fn cmd_info(state: &ReplState) {
    let info = state.service.info();
    eprintln!();
    eprintln!("  Data dir:  {}", info.data_dir);
    eprintln!("  Config:    {}", info.config.as_deref().unwrap_or("(defaults)"));
    eprintln!("  Albums:    {}", info.albums);
    eprintln!("  Threshold: {:.1}%", info.similarity_threshold);
    for (label, space) in [("Image", &info.image), ("Audio", &info.audio)] {
        match space {
            Some(s) => eprintln!(
                "  {label}:     {} items, {} vectors, {} -> {} dims, {} (built {})",
                s.items, s.vectors, s.input_dims, s.components, s.metric, s.built_at
            ),
            None => eprintln!("  {label}:     not loaded"),
        }
    }
    if !state.rebuilds.is_empty() {
        eprintln!("  Rebuilds:  {} running", state.rebuilds.len());
    }
    eprintln!();
}

fn cmd_build(args: &str, state: &ReplState) {
    let Some(modality) = parse_modality(args) else {
        eprintln!("  Usage: /build image|audio");
        return;
    };
    match state.service.build(modality) {
        Ok(report) => eprintln!(
            "  Built {modality} index: {} items, {} variants, {} components, {} skipped",
            report.processed,
            report.variants,
            report.components,
            report.skipped.len()
        ),
        Err(e) => eprintln!("  Build failed: {e}"),
    }
}

fn cmd_rebuild(args: &str, state: &mut ReplState) {
    let Some(modality) = parse_modality(args) else {
        eprintln!("  Usage: /rebuild image|audio");
        return;
    };
    if state.rebuilds.iter().any(|(m, _)| *m == modality) {
        eprintln!("  A {modality} rebuild is already running.");
        return;
    }
    match state.service.spawn_rebuild(modality) {
        Ok(handle) => {
            eprintln!("  Rebuilding {modality} index in the background; searches keep working.");
            state.rebuilds.push((modality, handle));
        }
        Err(e) => eprintln!("  Could not start rebuild: {e}"),
    }
}

fn print_results(artifact: &ResultArtifact) {
    eprintln!();
    if artifact.is_empty() {
        eprintln!("  No albums above {:.1}%.", artifact.threshold);
    }
    for r in &artifact.results {
        eprintln!(
            "    #{:<3} {:>6.2}%  {}  (id {})",
            r.rank, r.percentage, r.title, r.id
        );
    }
    eprintln!();
}

fn cmd_image(args: &str, state: &ReplState) {
    let Some(path) = first_arg(args) else {
        eprintln!("  Usage: /image <cover.jpg>");
        return;
    };
    match state.service.search_image_file(Path::new(path)) {
        Ok(artifact) => print_results(&artifact),
        Err(e) => eprintln!("  Search failed: {e}"),
    }
}

fn cmd_melody(args: &str, state: &ReplState) {
    let Some(path) = first_arg(args) else {
        eprintln!("  Usage: /melody <song.notes.json>");
        return;
    };
    match state.service.search_melody_file(Path::new(path)) {
        Ok(artifact) => print_results(&artifact),
        Err(e) => eprintln!("  Search failed: {e}"),
    }
}

fn cmd_load(args: &str, state: &ReplState) {
    let Some(path) = first_arg(args) else {
        eprintln!("  Usage: /load <file.fspace>");
        return;
    };
    match state.service.load_index(Path::new(path)) {
        Ok(modality) => eprintln!("  Loaded {modality} index from {path}"),
        Err(e) => eprintln!("  Failed to load: {e}"),
    }
}

fn cmd_mapper(state: &mut ReplState) {
    match state.service.reload_mapper() {
        Ok(n) => eprintln!("  Loaded {n} album records"),
        Err(e) => eprintln!("  Failed to load mapper: {e}"),
    }
}
