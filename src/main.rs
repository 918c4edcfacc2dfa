//! DriveKit CLI - drive a remote file-storage account from the terminal
//!
//! Thin front end over the library: signs in, keeps the session snapshot on
//! disk, and exposes the folder tree and derived views as subcommands.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use drivekit::api::types::{AccessLevel, UploadMetadata};
use drivekit::cache::Resource;
use drivekit::{ApiGateway, HttpTransport, ResourceCache, SessionManager, SessionStore, Transport};

const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// CLI command
#[derive(Debug)]
enum Command {
    Login { email: String, password: String },
    Logout,
    Whoami,
    Ls { folder: Option<String> },
    Mkdir { name: String, parent: Option<String> },
    Upload { path: PathBuf, folder: Option<String> },
    Download { file_id: String, dest: PathBuf },
    Trash { file_id: String },
    Restore { file_id: String },
    Recent,
    Favorites,
    Shared,
    TrashList,
    Search { query: String },
    Share { file_id: String, email: String, level: AccessLevel },
    Help,
}

fn print_help() {
    eprintln!(
        r#"DriveKit - command-line client for your drive

USAGE:
    drivekit <command> [args]

COMMANDS:
    login <email> <password>           Sign in and persist the session
    logout                             Sign out and clear the session
    whoami                             Show the signed-in account
    ls [folder_id]                     List a folder (root by default)
    mkdir <name> [parent_id]           Create a folder
    upload <path> [folder_id]          Upload a file
    download <file_id> <dest>          Download a file
    trash <file_id>                    Move a file to the trash
    restore <file_id>                  Restore a file from the trash
    recent                             Recently accessed files
    favorites                          Favorite files
    shared                             Files shared with you
    trash-list                         Contents of the trash
    search <query>                     Search files by name and tags
    share <file_id> <email> [level]    Share a file (view, edit, admin)
    help                               Show this help message

ENVIRONMENT:
    DRIVEKIT_URL     API base URL (default: {})
    RUST_LOG         Log level (trace, debug, info, warn, error)
"#,
        DEFAULT_BASE_URL
    );
}

fn parse_level(arg: Option<&String>) -> Result<AccessLevel> {
    match arg.map(String::as_str) {
        None | Some("view") => Ok(AccessLevel::View),
        Some("edit") => Ok(AccessLevel::Edit),
        Some("admin") => Ok(AccessLevel::Admin),
        Some(other) => Err(anyhow!("unknown access level: {}", other)),
    }
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        return Ok(Command::Help);
    }

    match args[1].as_str() {
        "login" => {
            if args.len() < 4 {
                return Err(anyhow!("Usage: drivekit login <email> <password>"));
            }
            Ok(Command::Login {
                email: args[2].clone(),
                password: args[3].clone(),
            })
        }
        "logout" => Ok(Command::Logout),
        "whoami" => Ok(Command::Whoami),
        "ls" => Ok(Command::Ls {
            folder: args.get(2).cloned(),
        }),
        "mkdir" => {
            if args.len() < 3 {
                return Err(anyhow!("Usage: drivekit mkdir <name> [parent_id]"));
            }
            Ok(Command::Mkdir {
                name: args[2].clone(),
                parent: args.get(3).cloned(),
            })
        }
        "upload" => {
            if args.len() < 3 {
                return Err(anyhow!("Usage: drivekit upload <path> [folder_id]"));
            }
            Ok(Command::Upload {
                path: PathBuf::from(&args[2]),
                folder: args.get(3).cloned(),
            })
        }
        "download" => {
            if args.len() < 4 {
                return Err(anyhow!("Usage: drivekit download <file_id> <dest>"));
            }
            Ok(Command::Download {
                file_id: args[2].clone(),
                dest: PathBuf::from(&args[3]),
            })
        }
        "trash" => {
            if args.len() < 3 {
                return Err(anyhow!("Usage: drivekit trash <file_id>"));
            }
            Ok(Command::Trash {
                file_id: args[2].clone(),
            })
        }
        "restore" => {
            if args.len() < 3 {
                return Err(anyhow!("Usage: drivekit restore <file_id>"));
            }
            Ok(Command::Restore {
                file_id: args[2].clone(),
            })
        }
        "recent" => Ok(Command::Recent),
        "favorites" => Ok(Command::Favorites),
        "shared" => Ok(Command::Shared),
        "trash-list" => Ok(Command::TrashList),
        "search" => {
            if args.len() < 3 {
                return Err(anyhow!("Usage: drivekit search <query>"));
            }
            Ok(Command::Search {
                query: args[2..].join(" "),
            })
        }
        "share" => {
            if args.len() < 4 {
                return Err(anyhow!(
                    "Usage: drivekit share <file_id> <email> [view|edit|admin]"
                ));
            }
            Ok(Command::Share {
                file_id: args[2].clone(),
                email: args[3].clone(),
                level: parse_level(args.get(4))?,
            })
        }
        "help" | "--help" | "-h" => Ok(Command::Help),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            Ok(Command::Help)
        }
    }
}

fn print_listing(resources: &[Resource]) {
    if resources.is_empty() {
        println!("(empty)");
        return;
    }
    for resource in resources {
        let marker = match resource.kind {
            drivekit::cache::ResourceKind::Folder => "d",
            drivekit::cache::ResourceKind::File => "-",
        };
        let favorite = if resource.is_favorite { "*" } else { " " };
        println!(
            "{}{} {:>10}  {}  {}",
            marker, favorite, resource.size, resource.id, resource.name
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::WARN);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let command = match parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    if matches!(command, Command::Help) {
        print_help();
        return Ok(());
    }

    let base_url = env::var("DRIVEKIT_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&base_url)?);
    let store = SessionStore::default_path().map(SessionStore::new);
    let session = Arc::new(SessionManager::new(Arc::clone(&transport), store));
    session.rehydrate().await?;

    if let Command::Login { email, password } = &command {
        let user = session.login(email, password).await?;
        println!("Signed in as {} ({})", user.email, user.id);
        return Ok(());
    }
    if matches!(command, Command::Logout) {
        session.logout();
        println!("Signed out.");
        return Ok(());
    }
    if !session.is_authenticated() {
        return Err(anyhow!("not signed in; run `drivekit login` first"));
    }

    let gateway = Arc::new(ApiGateway::new(transport, Arc::clone(&session)));
    let cache = ResourceCache::new(Arc::clone(&gateway));

    match command {
        Command::Whoami => {
            let user = gateway.profile().await?;
            println!("{} {} <{}>", user.first_name, user.last_name, user.email);
        }
        Command::Ls { folder } => {
            cache.navigate_to(folder.as_deref()).await?;
            let snapshot = cache.snapshot();
            let breadcrumbs: Vec<&str> =
                snapshot.path.iter().map(|entry| entry.name.as_str()).collect();
            println!("/{}", breadcrumbs.join("/"));
            print_listing(&snapshot.current);
        }
        Command::Mkdir { name, parent } => {
            let folder = cache.create_folder(&name, parent.as_deref()).await?;
            println!("Created folder {} ({})", folder.name, folder.id);
        }
        Command::Upload { path, folder } => {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow!("invalid file name: {}", path.display()))?
                .to_string();
            let metadata = UploadMetadata {
                title: file_name.clone(),
                file_name,
                folder,
                tags: Vec::new(),
                description: None,
            };
            let file = cache.upload_file(metadata, bytes).await?;
            println!("Uploaded {} ({}, {} bytes)", file.name, file.id, file.size);
        }
        Command::Download { file_id, dest } => {
            let bytes = cache.download(&file_id).await?;
            std::fs::write(&dest, &bytes)
                .with_context(|| format!("failed to write {}", dest.display()))?;
            println!("Wrote {} bytes to {}", bytes.len(), dest.display());
        }
        Command::Trash { file_id } => {
            cache.trash(&file_id).await?;
            println!("Moved {} to trash.", file_id);
        }
        Command::Restore { file_id } => {
            cache.restore(&file_id).await?;
            println!("Restored {}.", file_id);
        }
        Command::Recent => {
            cache.fetch_recent().await?;
            print_listing(&cache.snapshot().recent);
        }
        Command::Favorites => {
            cache.fetch_favorites().await?;
            print_listing(&cache.snapshot().favorites);
        }
        Command::Shared => {
            cache.fetch_shared().await?;
            print_listing(&cache.snapshot().shared);
        }
        Command::TrashList => {
            cache.fetch_trash().await?;
            print_listing(&cache.snapshot().trashed);
        }
        Command::Search { query } => {
            let results = cache.search(&query).await?;
            print_listing(&results);
        }
        Command::Share {
            file_id,
            email,
            level,
        } => {
            cache.share_file(&file_id, &email, level).await?;
            println!("Shared {} with {} ({}).", file_id, email, level.as_str());
        }
        Command::Login { .. } | Command::Logout | Command::Help => unreachable!(),
    }

    Ok(())
}
