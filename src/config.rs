use crate::{
    models::credential::{Addressing, Credential},
    services::signing_service::StorageSettings,
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::{env, path::PathBuf};

/// Default location of the gallery metadata database.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://./data/gallery.db";

/// Command-line + environment configuration. CLI values win over the environment.
#[derive(Parser, Debug)]
#[command(author, version, about = "Gallery media upload pipeline")]
pub struct Cli {
    /// Database URL (overrides GALLERY_UPLOAD_DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Run migrations and exit
    #[arg(long, global = true)]
    pub migrate: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the signing service (default)
    Serve(ServeArgs),
    /// Upload local files into a gallery
    Upload(UploadArgs),
    /// Remove every media item of a gallery
    Purge(PurgeArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Host to bind to (overrides GALLERY_UPLOAD_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides GALLERY_UPLOAD_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Bucket name (overrides STORAGE_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Address the bucket in the path instead of the host name
    #[arg(long)]
    pub path_style: bool,
}

/// Where the signing service lives and how to reach the metadata store.
#[derive(Args, Debug, Default)]
pub struct ClientArgs {
    /// Signing service base URL (overrides GALLERY_UPLOAD_SIGNER_URL)
    #[arg(long)]
    pub signer_url: Option<String>,

    /// Session token presented to the signing service (overrides GALLERY_UPLOAD_TOKEN)
    #[arg(long)]
    pub token: Option<String>,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Target gallery id
    #[arg(long)]
    pub gallery: String,

    /// Gallery title used when the gallery does not exist yet
    #[arg(long, default_value = "")]
    pub title: String,

    /// Files uploaded concurrently
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,

    #[command(flatten)]
    pub client: ClientArgs,

    /// Files to upload, in gallery order
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct PurgeArgs {
    /// Gallery id whose media is removed
    #[arg(long)]
    pub gallery: String,

    #[command(flatten)]
    pub client: ClientArgs,
}

/// Settings for `serve`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub storage: StorageSettings,
    /// Accepted operator tokens; empty means any validated session is trusted.
    pub tokens: Vec<String>,
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Settings shared by the client-side commands.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub signer_url: String,
    pub token: Option<String>,
    pub database_url: String,
}

#[derive(Debug, Clone)]
pub enum Mode {
    Migrate {
        database_url: String,
    },
    Serve(ServerConfig),
    Upload {
        client: ClientConfig,
        gallery: String,
        title: String,
        concurrency: usize,
        files: Vec<PathBuf>,
    },
    Purge {
        client: ClientConfig,
        gallery: String,
    },
}

impl Mode {
    /// Parse CLI args and the process environment.
    pub fn from_env_and_args() -> Result<Self> {
        Self::resolve(Cli::parse(), |name| env::var(name))
    }

    /// Merge parsed args with environment lookups.
    pub fn resolve<F>(cli: Cli, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let env = Env(lookup);
        let database_url = cli
            .database_url
            .map(Ok)
            .unwrap_or_else(|| env.or("GALLERY_UPLOAD_DATABASE_URL", DEFAULT_DATABASE_URL))?;

        if cli.migrate {
            return Ok(Mode::Migrate { database_url });
        }

        match cli.command {
            None => Ok(Mode::Serve(server_config(ServeArgs::default(), &env)?)),
            Some(Command::Serve(args)) => Ok(Mode::Serve(server_config(args, &env)?)),
            Some(Command::Upload(args)) => Ok(Mode::Upload {
                client: client_config(args.client, database_url, &env)?,
                gallery: args.gallery,
                title: args.title,
                concurrency: args.concurrency.max(1),
                files: args.files,
            }),
            Some(Command::Purge(args)) => Ok(Mode::Purge {
                client: client_config(args.client, database_url, &env)?,
                gallery: args.gallery,
            }),
        }
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Result<String, env::VarError>,
{
    fn get(&self, name: &str) -> Result<Option<String>> {
        match (self.0)(name) {
            Ok(value) => Ok(Some(value)),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(err) => Err(err).with_context(|| format!("reading {}", name)),
        }
    }

    fn or(&self, name: &str, default: &str) -> Result<String> {
        Ok(self.get(name)?.unwrap_or_else(|| default.to_string()))
    }

    fn flag(&self, name: &str) -> Result<bool> {
        Ok(matches!(
            self.get(name)?.as_deref().map(str::trim),
            Some("1" | "true" | "TRUE" | "yes")
        ))
    }
}

fn server_config<F>(args: ServeArgs, env: &Env<F>) -> Result<ServerConfig>
where
    F: Fn(&str) -> Result<String, env::VarError>,
{
    let env_host = env.or("GALLERY_UPLOAD_HOST", "0.0.0.0")?;
    let env_port = match env.get("GALLERY_UPLOAD_PORT")? {
        Some(value) => value
            .parse::<u16>()
            .with_context(|| format!("parsing GALLERY_UPLOAD_PORT value `{}`", value))?,
        None => 3000,
    };

    // Missing storage fields are left empty here and reported by the service.
    let account_endpoint = match env.get("STORAGE_ENDPOINT")? {
        Some(endpoint) => endpoint,
        None => env
            .get("R2_ACCOUNT_ID")?
            .map(|id| Credential::r2_endpoint(&id))
            .unwrap_or_default(),
    };
    let addressing = if args.path_style || env.flag("STORAGE_PATH_STYLE")? {
        Addressing::PathStyle
    } else {
        Addressing::VirtualHosted
    };

    let credential = Credential {
        access_key_id: env.or("STORAGE_ACCESS_KEY_ID", "")?,
        secret_access_key: env.or("STORAGE_SECRET_ACCESS_KEY", "")?,
        account_endpoint,
        bucket: match args.bucket {
            Some(bucket) => bucket,
            None => env.or("STORAGE_BUCKET", "")?,
        },
        addressing,
    };

    let tokens = env
        .or("GALLERY_UPLOAD_TOKENS", "")?
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    Ok(ServerConfig {
        host: args.host.unwrap_or(env_host),
        port: args.port.unwrap_or(env_port),
        storage: StorageSettings {
            credential,
            public_base_url: env.or("STORAGE_PUBLIC_BASE_URL", "")?,
        },
        tokens,
    })
}

fn client_config<F>(args: ClientArgs, database_url: String, env: &Env<F>) -> Result<ClientConfig>
where
    F: Fn(&str) -> Result<String, env::VarError>,
{
    let signer_url = match args.signer_url {
        Some(url) => url,
        None => env.or("GALLERY_UPLOAD_SIGNER_URL", "http://127.0.0.1:3000")?,
    };
    let token = match args.token {
        Some(token) => Some(token),
        None => env.get("GALLERY_UPLOAD_TOKEN")?,
    };

    Ok(ClientConfig {
        signer_url,
        token,
        database_url,
    })
}
