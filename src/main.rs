use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vellum::config::ServerConfig;
use vellum::repository::Repository;
use vellum::server::{AppState, create_router};
use vellum::types::{NewProject, ProjectId};

const ADMIN_USER: &str = "Admin";
const USERS_GROUP: &str = "Users";
const OFFLINE_PROJECT: &str = "Offline";

#[cfg(unix)]
fn set_restrictive_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Failed to set permissions on {}: {e}", path.display());
    }
}

#[derive(Parser)]
#[command(name = "vellum")]
#[command(about = "A versioned content repository with offline projects and publishing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(long, short, default_value = "8080")]
        port: u16,

        /// Data directory for the database and vellum.toml
        #[arg(long, default_value = "./data")]
        data_dir: String,
    },

    /// Publish every pending change of a project as the administrator
    Publish {
        /// Project to publish
        #[arg(long, default_value = OFFLINE_PROJECT)]
        project: String,

        #[arg(long, default_value = "./data")]
        data_dir: String,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the repository (create database, root folder and admin token)
    Init {
        #[arg(long, default_value = "./data")]
        data_dir: String,
    },

    /// Show repository information
    Info {
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a user and print an API token for it
    CreateUser {
        #[arg(long, default_value = "./data")]
        data_dir: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        password: String,

        /// Groups to add the user to
        #[arg(long = "group")]
        groups: Vec<String>,
    },
}

fn open_repository(data_dir: &str) -> anyhow::Result<(ServerConfig, Repository)> {
    let config = ServerConfig {
        data_dir: PathBuf::from(data_dir),
        ..ServerConfig::default()
    };
    let repository = Repository::open(config.repository_config()?)
        .with_context(|| format!("failed to open repository in {data_dir}"))?;
    Ok((config, repository))
}

fn require_initialized(repository: &Repository) -> anyhow::Result<()> {
    match repository.principals().read_user_by_name(ADMIN_USER) {
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() => {
            bail!("Repository not initialized. Run 'vellum admin init' first.")
        }
        Err(e) => Err(e.into()),
    }
}

fn run_init(data_dir: String) -> anyhow::Result<()> {
    fs::create_dir_all(&data_dir)?;
    let (config, repository) = open_repository(&data_dir)?;
    let token_file = config.data_dir.join(".admin_token");

    if require_initialized(&repository).is_ok() {
        bail!(
            "Repository already initialized. Admin token exists at: {}",
            token_file.display()
        );
    }

    let principals = repository.principals();
    let admins = principals.create_group(
        principals.administrators_group(),
        Some("Administrators bypass access control"),
        None,
    )?;
    let users = principals.create_group(USERS_GROUP, Some("All authors"), None)?;
    let password = uuid::Uuid::new_v4().simple().to_string();
    let admin = principals.create_user(ADMIN_USER, &password, Some("The administrator"))?;
    principals.add_user_to_group(ADMIN_USER, &admins.name)?;
    principals.add_user_to_group(ADMIN_USER, &users.name)?;

    repository.bootstrap(&admin.id, &users.id)?;

    let ctx = repository.context(&admin.id, ProjectId::ONLINE)?;
    let projects = repository.projects();
    let offline = projects.create_project(
        &ctx,
        &NewProject {
            name: OFFLINE_PROJECT.to_string(),
            description: Some("The default offline project".to_string()),
            user_group_id: Some(users.id),
            manager_group_id: Some(admins.id),
            ..NewProject::default()
        },
    )?;
    projects.copy_resource_to_project(&ctx, offline.id, "/")?;

    let raw_token = principals.issue_token(&admin, None)?;
    fs::write(&token_file, &raw_token)?;

    #[cfg(unix)]
    set_restrictive_permissions(&token_file);

    println!();
    println!("========================================");
    println!("Admin token (save this, it won't be shown again):");
    println!();
    println!("  {raw_token}");
    println!();
    println!("Token also written to: {}", token_file.display());
    println!("========================================");
    println!();

    repository.shutdown();
    Ok(())
}

fn run_info(data_dir: String, as_json: bool) -> anyhow::Result<()> {
    let (config, repository) = open_repository(&data_dir)?;
    require_initialized(&repository)?;

    let projects: Vec<String> = repository
        .projects()
        .list_projects()?
        .into_iter()
        .map(|p| p.name)
        .collect();
    let users = repository.principals().list_users()?.len();

    if as_json {
        let info = json!({
            "data_dir": config.data_dir,
            "database": config.db_path(),
            "projects": projects,
            "users": users,
        });
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("Data directory: {}", config.data_dir.display());
        println!("Database:       {}", config.db_path().display());
        println!("Users:          {users}");
        println!("Projects:       {}", projects.join(", "));
    }
    Ok(())
}

fn run_create_user(
    data_dir: String,
    name: String,
    password: String,
    groups: Vec<String>,
) -> anyhow::Result<()> {
    let (_, repository) = open_repository(&data_dir)?;
    require_initialized(&repository)?;

    let principals = repository.principals();
    let user = principals.create_user(&name, &password, None)?;
    for group in &groups {
        principals.add_user_to_group(&user.name, group)?;
    }
    let raw_token = principals.issue_token(&user, None)?;

    println!("Created user '{}' with token:", user.name);
    println!();
    println!("  {raw_token}");
    Ok(())
}

fn run_publish(data_dir: String, project: String) -> anyhow::Result<()> {
    let (_, repository) = open_repository(&data_dir)?;
    require_initialized(&repository)?;

    let admin = repository.principals().read_user_by_name(ADMIN_USER)?;
    let project = repository.projects().read_project_by_name(&project)?;
    let ctx = repository.context(&admin.id, project.id)?;
    let result = repository.publisher().publish_project(&ctx)?;

    println!(
        "Published {} folder(s), {} file(s), {} deleted folder(s) as version {}",
        result.folders.len(),
        result.files.len(),
        result.deleted_folders.len(),
        result.tag
    );
    repository.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vellum=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init { data_dir } => run_init(data_dir)?,
            AdminCommands::Info { data_dir, json } => run_info(data_dir, json)?,
            AdminCommands::CreateUser {
                data_dir,
                name,
                password,
                groups,
            } => run_create_user(data_dir, name, password, groups)?,
        },
        Commands::Publish { project, data_dir } => run_publish(data_dir, project)?,
        Commands::Serve {
            host,
            port,
            data_dir,
        } => {
            let config = ServerConfig {
                host,
                port,
                data_dir: data_dir.into(),
            };

            let token_file = config.data_dir.join(".admin_token");
            if !token_file.exists() {
                bail!("Repository not initialized. Run 'vellum admin init' first.");
            }

            let repository = Arc::new(Repository::open(config.repository_config()?)?);
            require_initialized(&repository)?;

            info!("Admin token available at {}", token_file.display());

            let state = Arc::new(AppState {
                repository: repository.clone(),
            });

            let app = create_router(state);
            let addr = config.socket_addr()?;

            info!("Starting server on {}", addr);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
            repository.shutdown();
        }
    }

    Ok(())
}
