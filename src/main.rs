use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use prune::config::{Config, StorageBackend};
use prune::db::{migrate, DecisionBackend};
use prune::export::{export_decisions, ExportFormat};
use prune::library::resource::format_bytes;
use prune::library::FsLibrary;
use prune::manager::RebuildReport;
use prune::model::AlbumRef;
use prune::{AlbumId, Decision, DecisionStore, LibraryManager, ManagerOptions, PhotoId, PhotoLibrary};

/// How long one-shot commands wait for a rebuild to finish.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AlbumFilter {
    Months,
    System,
    User,
}

#[derive(Debug)]
enum Command {
    Status,
    Albums(Option<AlbumFilter>),
    Photos { album: AlbumId, unreviewed: bool },
    /// `None` clears the decision.
    Decide { decision: Option<Decision>, photos: Vec<PhotoId> },
    RestoreAll(Decision),
    RestoreAlbum { album: AlbumId, decision: Decision },
    Favorite(PhotoId),
    Reconcile,
    EmptyTrash { confirmed: bool },
    Export { path: PathBuf, format: Option<ExportFormat> },
    Migrate(StorageBackend),
    Watch { once: bool, interval: Option<u64> },
}

struct CliArgs {
    config_path: Option<PathBuf>,
    command: Command,
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {}", message);
    eprintln!("Run 'prune --help' for usage.");
    std::process::exit(1);
}

fn parse_decision(s: &str) -> Decision {
    Decision::parse(s).unwrap_or_else(|| fail(&format!("expected 'archive' or 'trash', got '{}'", s)))
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut config_path = None;
    let mut rest = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("prune {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    fail("--config requires a path argument");
                }
            }
            _ => rest.push(args[i].clone()),
        }
        i += 1;
    }

    let command = parse_command(&rest);
    CliArgs { config_path, command }
}

fn parse_command(args: &[String]) -> Command {
    let Some((name, params)) = args.split_first() else {
        return Command::Status;
    };
    let flag = |f: &str| params.iter().any(|p| p == f);
    let positional: Vec<&String> = params.iter().filter(|p| !p.starts_with("--")).collect();

    match name.as_str() {
        "status" => Command::Status,
        "albums" => Command::Albums(match positional.first().map(|s| s.as_str()) {
            None => None,
            Some("months") => Some(AlbumFilter::Months),
            Some("system") => Some(AlbumFilter::System),
            Some("user") => Some(AlbumFilter::User),
            Some(other) => fail(&format!("unknown album kind '{}'", other)),
        }),
        "photos" => {
            let album = positional
                .first()
                .unwrap_or_else(|| fail("photos requires an album id"));
            Command::Photos {
                album: AlbumId::new(album.as_str()),
                unreviewed: flag("--unreviewed"),
            }
        }
        "keep" | "delete" | "clear" => {
            if positional.is_empty() {
                fail(&format!("{} requires at least one photo id", name));
            }
            let decision = match name.as_str() {
                "keep" => Some(Decision::Archived),
                "delete" => Some(Decision::Trashed),
                _ => None,
            };
            Command::Decide {
                decision,
                photos: positional.iter().map(|p| PhotoId::new(p.as_str())).collect(),
            }
        }
        "restore-all" => {
            let which = positional
                .first()
                .unwrap_or_else(|| fail("restore-all requires 'archive' or 'trash'"));
            Command::RestoreAll(parse_decision(which))
        }
        "restore-album" => {
            if positional.len() < 2 {
                fail("restore-album requires an album id and 'archive' or 'trash'");
            }
            Command::RestoreAlbum {
                album: AlbumId::new(positional[0].as_str()),
                decision: parse_decision(positional[1]),
            }
        }
        "favorite" => {
            let photo = positional
                .first()
                .unwrap_or_else(|| fail("favorite requires a photo id"));
            Command::Favorite(PhotoId::new(photo.as_str()))
        }
        "reconcile" => Command::Reconcile,
        "empty-trash" => Command::EmptyTrash {
            confirmed: flag("--yes"),
        },
        "export" => {
            let mut path = None;
            let mut format = None;
            let mut j = 0;
            while j < params.len() {
                match params[j].as_str() {
                    "--format" | "-f" => {
                        let value = params
                            .get(j + 1)
                            .unwrap_or_else(|| fail("--format requires 'json' or 'csv'"));
                        format = Some(
                            ExportFormat::parse(value)
                                .unwrap_or_else(|| fail(&format!("unknown export format '{}'", value))),
                        );
                        j += 1;
                    }
                    other => path = Some(PathBuf::from(other)),
                }
                j += 1;
            }
            Command::Export {
                path: path.unwrap_or_else(|| fail("export requires an output path")),
                format,
            }
        }
        "migrate" => {
            let target = positional
                .first()
                .unwrap_or_else(|| fail("migrate requires 'json' or 'sqlite'"));
            Command::Migrate(
                StorageBackend::parse(target)
                    .unwrap_or_else(|| fail(&format!("unknown storage backend '{}'", target))),
            )
        }
        "watch" => {
            let mut once = false;
            let mut interval = None;
            let mut j = 0;
            while j < params.len() {
                match params[j].as_str() {
                    "--once" | "-1" => once = true,
                    "--interval" | "-i" => {
                        interval = params.get(j + 1).and_then(|v| v.parse().ok());
                        if interval.is_none() {
                            fail("--interval requires a number of seconds");
                        }
                        j += 1;
                    }
                    other => fail(&format!("unknown watch option '{}'", other)),
                }
                j += 1;
            }
            Command::Watch { once, interval }
        }
        other => fail(&format!("unknown command '{}'", other)),
    }
}

fn print_help() {
    println!(
        r#"prune - review a photo library month by month, keep or delete each photo

USAGE:
    prune [OPTIONS] [COMMAND]

COMMANDS:
    status                              Review progress and library summary (default)
    albums [months|system|user]         List albums with unreviewed counts
    photos ALBUM [--unreviewed]         List an album's photos and their state
    keep PHOTO...                       Move photos to the Archive
    delete PHOTO...                     Move photos to the Trash
    clear PHOTO...                      Return photos to review
    restore-all archive|trash           Return every archived or trashed photo to review
    restore-album ALBUM archive|trash   Same, for one album
    favorite PHOTO                      Toggle a photo's favorite flag
    reconcile                           Drop decisions for photos no longer in the library
    empty-trash --yes                   Delete trashed photos from the library
    export PATH [--format json|csv]     Write every decision to a file
    migrate json|sqlite                 Copy decisions to another storage backend
    watch [--once] [--interval N]       Follow library changes until Ctrl-C

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    PRUNE_CONFIG        Path to config file (overrides default location)
    PRUNE_LOG           Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/prune/config.toml

Deleted photos are moved to the configured trash folder, never erased."#
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    // Initialize logging (uses journald on Linux, file fallback otherwise)
    let _ = prune::logging::init(None);

    let config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Command::Migrate(target) = args.command {
        return run_migrate(&config, target);
    }

    let library = Arc::new(FsLibrary::open(&config)?);
    let mut manager = open_manager(&config, Arc::clone(&library))?;

    match args.command {
        Command::Status => print_status(&manager, &library),
        Command::Albums(filter) => print_albums(&mut manager, filter),
        Command::Photos { album, unreviewed } => print_photos(&mut manager, &album, unreviewed)?,
        Command::Decide { decision, photos } => {
            let mut changed = 0;
            for photo in &photos {
                let did_change = match decision {
                    Some(decision) => manager.decide(photo, decision)?,
                    None => manager.clear(photo)?,
                };
                if did_change {
                    changed += 1;
                }
            }
            let state = decision.map(|d| d.to_string()).unwrap_or_else(|| "unreviewed".to_string());
            println!("{} of {} photos now {}", changed, photos.len(), state);
        }
        Command::RestoreAll(decision) => {
            let restored = manager.restore_all(decision)?;
            println!("Returned {} {} photos to review", restored, decision);
        }
        Command::RestoreAlbum { album, decision } => {
            if manager.find_album(&album).is_none() {
                bail!("No album '{}'", album);
            }
            let restored = manager.restore_album(&album, decision)?;
            println!("Returned {} {} photos of {} to review", restored, decision, album);
        }
        Command::Favorite(photo) => {
            let favorite = manager.toggle_favorite(&photo)?;
            println!("{} is {}a favorite", photo, if favorite { "now " } else { "no longer " });
        }
        Command::Reconcile => match manager.reconcile_orphans()? {
            Some(pruned) => println!("Removed {} decisions for photos no longer in the library", pruned),
            None => println!(
                "Skipped: library access is {}, orphans cannot be told apart from hidden photos",
                manager.authorization_status().display_name()
            ),
        },
        Command::EmptyTrash { confirmed } => {
            let trashed = manager.decisions().counts().trashed;
            if !confirmed {
                println!(
                    "{} photos are in the Trash. Run 'prune empty-trash --yes' to delete them.",
                    trashed
                );
                return Ok(());
            }
            let outcome = manager.empty_trash()?;
            println!(
                "Deleted {} of {} photos ({}), moved to {}",
                outcome.deleted,
                outcome.requested,
                outcome.space.display(),
                library.trash().trash_path().display()
            );
        }
        Command::Export { path, format } => {
            let format = format.unwrap_or_else(|| ExportFormat::from_path(&path));
            let library: &dyn PhotoLibrary = library.as_ref();
            let count = export_decisions(manager.decisions(), library, &path, format)?;
            println!("Exported {} decisions as {} to {}", count, format.name(), path.display());
        }
        Command::Watch { once, interval } => {
            let interval = interval.unwrap_or(config.library.poll_interval_secs).max(1);
            run_watch(&mut manager, &library, once, Duration::from_secs(interval)).await?;
        }
        Command::Migrate(_) => unreachable!("handled before the library is opened"),
    }

    manager.flush()?;
    Ok(())
}

fn open_manager(config: &Config, library: Arc<FsLibrary>) -> Result<LibraryManager> {
    let backend = DecisionBackend::open(&config.storage).with_context(|| {
        format!("Failed to open decision store at {}", config.decisions_path().display())
    })?;
    let decisions = DecisionStore::load(backend).with_context(|| {
        format!(
            "Cannot read decisions from {}; fix or move the file to continue",
            config.decisions_path().display()
        )
    })?;

    let library: Arc<dyn PhotoLibrary> = library;
    let manager = LibraryManager::new(library, decisions, ManagerOptions::from(config));

    let status = manager.authorization_status();
    if !status.allows_access() {
        return Err(anyhow!(
            "Cannot read photo library at {} (access {})",
            config.library.root.display(),
            status.display_name()
        ));
    }
    Ok(manager)
}

fn run_migrate(config: &Config, target: StorageBackend) -> Result<()> {
    if target == config.storage.backend {
        bail!("Decisions are already stored in the {:?} backend", target);
    }
    let from = DecisionBackend::open(&config.storage)?;
    let to = DecisionBackend::open_kind(target, &config.storage)?;
    let count = migrate::copy_decisions(&from, &to)?;

    println!(
        "Copied {} decisions from {} to {}",
        count,
        from.location().display(),
        to.location().display()
    );
    println!(
        "Set `backend = \"{}\"` under [storage] in {} to use it.",
        format!("{:?}", target).to_lowercase(),
        Config::config_path().display()
    );
    Ok(())
}

fn report_rebuild(report: &RebuildReport) {
    match (report.applied, report.pruned) {
        (false, _) => println!("Rebuild #{} failed, keeping the previous index", report.generation),
        (true, Some(pruned)) if pruned > 0 => println!(
            "Library changed (rebuild #{}), removed {} orphaned decisions",
            report.generation, pruned
        ),
        (true, _) => println!("Library changed (rebuild #{})", report.generation),
    }
}

async fn run_watch(
    manager: &mut LibraryManager,
    library: &Arc<FsLibrary>,
    once: bool,
    interval: Duration,
) -> Result<()> {
    if once {
        manager.refresh();
        for report in manager.settle(SETTLE_TIMEOUT) {
            report_rebuild(&report);
        }
        print_status(manager, library);
        return Ok(());
    }

    let _watcher = library.watch(interval);
    info!("Watching for library changes every {:?}", interval);
    println!("Watching {} (Ctrl-C to stop)", library.root().display());

    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(report) = manager.poll() {
                    report_rebuild(&report);
                }
            }
            _ = &mut shutdown => {
                info!("Stopping watch");
                break;
            }
        }
    }

    manager.flush()?;
    Ok(())
}

fn print_status(manager: &LibraryManager, library: &FsLibrary) {
    let stats = manager.stats();
    let decisions = manager.decisions();

    println!("Library access:  {}", manager.authorization_status().display_name());
    println!("Photos:          {} in {} months", stats.photos, stats.months);
    println!("Albums:          {} system, {} user", stats.system_albums, stats.user_albums);
    println!("Reviewed:        {:.1}%", stats.reviewed_percent());
    println!("  Unreviewed:    {}", stats.unreviewed);
    println!("  Archive:       {}", stats.archived);
    println!("  Trash:         {} ({})", stats.trashed, stats.trash_space.display());
    println!(
        "Decisions:       {} ({:?})",
        decisions.backend().location().display(),
        decisions.backend().kind()
    );
    if let Ok(bytes) = library.trash().total_size() {
        if bytes > 0 {
            println!("Deleted files:   {} in {}", format_bytes(bytes), library.trash().trash_path().display());
        }
    }
    if decisions.is_dirty() {
        println!("Warning: latest decisions are not saved yet");
    }
}

fn print_album_line(manager: &mut LibraryManager, album: &AlbumRef) {
    let progress = manager.album_progress(&album.id);
    let marker = if progress.is_complete() { "done" } else { "" };
    println!(
        "  {:<24} {:<28} {:>6} photos {:>6} unreviewed {}",
        album.id,
        album.title,
        progress.total,
        progress.unreviewed(),
        marker
    );
}

fn print_albums(manager: &mut LibraryManager, filter: Option<AlbumFilter>) {
    let show = |kind: AlbumFilter| filter.map_or(true, |f| f == kind);

    if show(AlbumFilter::Months) {
        println!("Months:");
        let months: Vec<AlbumRef> = manager.month_albums().iter().map(|m| m.album.clone()).collect();
        for album in &months {
            print_album_line(manager, album);
        }
    }
    if show(AlbumFilter::System) {
        println!("Media:");
        let system = manager.system_albums().to_vec();
        for album in &system {
            print_album_line(manager, album);
        }
    }
    if show(AlbumFilter::User) {
        println!("Albums:");
        let user = manager.user_albums().to_vec();
        for album in &user {
            print_album_line(manager, album);
        }
    }
}

fn print_photos(manager: &mut LibraryManager, album: &AlbumId, unreviewed: bool) -> Result<()> {
    let title = manager
        .find_album(album)
        .map(|a| a.title.clone())
        .ok_or_else(|| anyhow!("No album '{}'", album))?;

    let photos = if unreviewed {
        manager.unreviewed_photos(album)
    } else {
        manager.photos_for(album).as_ref().clone()
    };

    println!("{} ({} photos)", title, photos.len());
    for photo in &photos {
        let created = photo
            .created
            .map(|c| c.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "undated".to_string());
        let size = manager
            .library()
            .resource_value(&photo.id, prune::library::ResourceKey::FileSize);
        let size = prune::library::resource::decode_file_size(size.as_ref())
            .map(format_bytes)
            .unwrap_or_else(|| "?".to_string());
        println!(
            "  {:<11} {:<17} {:>9} {}{}",
            manager.state_of(&photo.id).to_string(),
            created,
            size,
            photo.id,
            if photo.is_favorite { " *" } else { "" }
        );
    }
    Ok(())
}
