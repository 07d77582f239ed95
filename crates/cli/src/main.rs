use anyhow::{anyhow, bail, Context};
use api_shared::auth::{generate_token, hash_password, token_digest};
use clap::{Parser, Subcommand};
use drivefs_core::config::{cache_config_from_raw, core_config_from_env_values, RawCacheSettings};
use drivefs_core::store::{DriveUpdate, NewUser, Store, UserRecord};
use drivefs_core::{DriveCore, Identity, PermissionLevel};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "drivefs")]
#[command(about = "DriveFS operator CLI")]
struct Cli {
    /// Administrator login that drive and member commands act as
    #[arg(long = "as", global = true)]
    actor: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users
    #[command(subcommand)]
    User(UserCommand),
    /// Issue a new API bearer token for a user, replacing the previous one
    Token {
        login: String,
    },
    /// Set a user's WebDAV application password (read from stdin when omitted)
    DavPassword {
        login: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Manage shared drives
    #[command(subcommand)]
    Drive(DriveCommand),
    /// Manage drive members
    #[command(subcommand)]
    Member(MemberCommand),
    /// Drop every cached permission verdict, drive list and folder statistic
    FlushCache,
}

#[derive(Subcommand)]
enum UserCommand {
    /// Create a user
    Create {
        login: String,
        /// Display name (defaults to the login)
        #[arg(long)]
        display_name: Option<String>,
        /// Grant administrator rights
        #[arg(long)]
        admin: bool,
    },
    /// List all users
    List,
}

#[derive(Subcommand)]
enum DriveCommand {
    /// Create a drive
    Create {
        name: String,
        /// Quota in bytes, 0 for unlimited
        #[arg(long, default_value_t = 0)]
        quota_bytes: u64,
    },
    /// List all drives
    List,
    /// Change a drive's quota or active flag
    Update {
        name: String,
        #[arg(long)]
        quota_bytes: Option<u64>,
        #[arg(long)]
        active: Option<bool>,
    },
    /// Delete a drive and everything stored in it
    Delete {
        name: String,
    },
}

#[derive(Subcommand)]
enum MemberCommand {
    /// Add a member or change their permission (read, read-write)
    Set {
        drive: String,
        login: String,
        permission: PermissionLevel,
    },
    /// Remove a member
    Remove {
        drive: String,
        login: String,
    },
    /// List a drive's members
    List {
        drive: String,
    },
}

async fn user(core: &DriveCore, login: &str) -> anyhow::Result<UserRecord> {
    core.store()
        .user_by_login(login)
        .await?
        .ok_or_else(|| anyhow!("no user with login {login}"))
}

async fn actor(core: &DriveCore, login: Option<&str>) -> anyhow::Result<Identity> {
    let login = login.context("this command needs --as <ADMIN_LOGIN>")?;
    Ok(user(core, login).await?.identity())
}

fn read_password() -> anyhow::Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("reading password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn run(core: &DriveCore, actor_login: Option<&str>, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::User(UserCommand::Create {
            login,
            display_name,
            admin,
        }) => {
            let display_name = display_name.unwrap_or_else(|| login.clone());
            let user = core
                .store()
                .create_user(NewUser {
                    login,
                    display_name,
                    is_admin: admin,
                })
                .await?;
            println!("Created user {} ({})", user.login, user.id);
        }
        Commands::User(UserCommand::List) => {
            let users = core.store().list_users().await?;
            if users.is_empty() {
                println!("No users found.");
            }
            for user in users {
                println!(
                    "{}\t{}\t{}{}",
                    user.id,
                    user.login,
                    user.display_name,
                    if user.is_admin { "\tadmin" } else { "" }
                );
            }
        }
        Commands::Token { login } => {
            let user = user(core, &login).await?;
            let token = generate_token();
            core.store()
                .set_api_token_digest(user.id, &token_digest(&token))
                .await?;
            println!("{token}");
        }
        Commands::DavPassword { login, password } => {
            let user = user(core, &login).await?;
            let password = match password {
                Some(password) => password,
                None => read_password()?,
            };
            if password.is_empty() {
                bail!("password must not be empty");
            }
            let hash = hash_password(&password)?;
            core.store().set_dav_password_hash(user.id, &hash).await?;
            println!("WebDAV password set for {login}");
        }
        Commands::Drive(command) => {
            let actor = actor(core, actor_login).await?;
            let drives = core.drives();
            match command {
                DriveCommand::Create { name, quota_bytes } => {
                    let drive = drives.create_drive(&actor, &name, quota_bytes).await?;
                    println!("Created drive {} ({})", drive.name, drive.id);
                }
                DriveCommand::List => {
                    for drive in drives.list_drives(&actor).await? {
                        println!(
                            "{}\tquota={}\t{}",
                            drive.name,
                            drive.quota_bytes,
                            if drive.active { "active" } else { "inactive" }
                        );
                    }
                }
                DriveCommand::Update {
                    name,
                    quota_bytes,
                    active,
                } => {
                    let drive = drives
                        .update_drive(&actor, &name, DriveUpdate { quota_bytes, active })
                        .await?;
                    println!(
                        "Updated drive {}: quota={} active={}",
                        drive.name, drive.quota_bytes, drive.active
                    );
                }
                DriveCommand::Delete { name } => {
                    drives.delete_drive(&actor, &name).await?;
                    println!("Deleted drive {name}");
                }
            }
        }
        Commands::Member(command) => {
            let actor = actor(core, actor_login).await?;
            let drives = core.drives();
            match command {
                MemberCommand::Set {
                    drive,
                    login,
                    permission,
                } => {
                    drives.set_member(&actor, &drive, &login, permission).await?;
                    println!("{login} now has {permission} on {drive}");
                }
                MemberCommand::Remove { drive, login } => {
                    if drives.remove_member(&actor, &drive, &login).await? {
                        println!("Removed {login} from {drive}");
                    } else {
                        println!("{login} was not a member of {drive}");
                    }
                }
                MemberCommand::List { drive } => {
                    for member in drives.members(&actor, &drive).await? {
                        println!("{}\t{}\t{}", member.login, member.display_name, member.permission);
                    }
                }
            }
        }
        Commands::FlushCache => {
            core.cache().flush_all().await;
            println!("Caches flushed");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("drivefs_core=warn".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'drivefs --help' for commands");
        return Ok(());
    };

    let config = core_config_from_env_values(
        std::env::var("DRIVEFS_DATA_DIR").ok(),
        std::env::var("DRIVEFS_DB_PATH").ok(),
    )?;
    let cache_config = cache_config_from_raw(RawCacheSettings::from_lookup(|k| {
        std::env::var(k).ok()
    }))?;
    let core = DriveCore::open(config, &cache_config).await?;

    let result = run(&core, cli.actor.as_deref(), command).await;
    core.close().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use drivefs_core::cache::CacheService;
    use drivefs_core::config::{CacheConfig, CoreConfig};
    use drivefs_core::store::SqliteStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn core(temp: &TempDir) -> DriveCore {
        let config = CoreConfig::new(temp.path().to_path_buf(), None).unwrap();
        std::fs::create_dir_all(config.users_root()).unwrap();
        std::fs::create_dir_all(config.drives_root()).unwrap();
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let cache = Arc::new(CacheService::with_external(&CacheConfig::default(), None));
        DriveCore::assemble(config, store, cache)
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("drivefs").chain(args.iter().copied())).unwrap()
    }

    async fn exec(core: &DriveCore, args: &[&str]) -> anyhow::Result<()> {
        let cli = parse(args);
        run(core, cli.actor.as_deref(), cli.command.unwrap()).await
    }

    #[tokio::test]
    async fn operator_workflow() {
        let temp = TempDir::new().unwrap();
        let core = core(&temp);

        exec(&core, &["user", "create", "root", "--admin"]).await.unwrap();
        exec(&core, &["user", "create", "u1", "--display-name", "User One"])
            .await
            .unwrap();
        exec(&core, &["token", "u1"]).await.unwrap();
        exec(&core, &["dav-password", "u1", "--password", "s3cret"])
            .await
            .unwrap();

        let u1 = core.store().user_by_login("u1").await.unwrap().unwrap();
        assert_eq!(u1.display_name, "User One");
        assert!(u1.api_token_sha256.is_some());
        assert!(u1.dav_password_hash.is_some());

        exec(&core, &["--as", "root", "drive", "create", "design", "--quota-bytes", "1024"])
            .await
            .unwrap();
        exec(&core, &["member", "set", "design", "u1", "read-write", "--as", "root"])
            .await
            .unwrap();
        let members = core
            .drives()
            .members(&core.store().user_by_login("root").await.unwrap().unwrap().identity(), "design")
            .await
            .unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].permission, PermissionLevel::ReadWrite);

        exec(&core, &["--as", "root", "drive", "update", "design", "--active", "false"])
            .await
            .unwrap();
        exec(&core, &["--as", "root", "drive", "delete", "design"])
            .await
            .unwrap();
        assert!(core.store().drive_by_name("design").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn drive_commands_need_an_administrator() {
        let temp = TempDir::new().unwrap();
        let core = core(&temp);
        exec(&core, &["user", "create", "u1"]).await.unwrap();

        assert!(exec(&core, &["drive", "create", "design"]).await.is_err());
        assert!(exec(&core, &["--as", "u1", "drive", "create", "design"]).await.is_err());
        assert!(exec(&core, &["--as", "ghost", "drive", "list"]).await.is_err());
        assert!(exec(&core, &["token", "ghost"]).await.is_err());
    }

    #[test]
    fn permission_levels_parse_from_arguments() {
        let cli = parse(&["member", "set", "design", "u1", "read"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Member(MemberCommand::Set {
                permission: PermissionLevel::Read,
                ..
            }))
        ));
        assert!(Cli::try_parse_from(["drivefs", "member", "set", "d", "u", "owner"]).is_err());
    }
}
