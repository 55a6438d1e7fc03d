use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use societaire::net::types::{
    ConfirmUserRequest, CreateCheckoutSessionRequest, CreateTokenRequest, CreateUserRequest, Document,
    DocumentUpload, EmailRequest, ResetUserRequest, UseGiftCodeRequest, ValidationError,
};
use societaire::{
    ApiClient, ApiError, Category, ClientConfig, ConfigError, FileStore, Session, SessionState, StorageError,
    Toaster, claims,
};
use tracing_subscriber::{EnvFilter, fmt};

const QUIET_LOG: &str = "warn";
const VERBOSE_LOG: &str = "warn,societaire=debug,societaire_cli=debug";

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("token store unavailable: {0}")]
    Storage(#[from] StorageError),
    #[error("{}", describe_api_error(.0))]
    Api(#[from] ApiError),
    #[error("invalid registration: {0}")]
    Validation(#[from] ValidationError),
    #[error("file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("not signed in; run `societaire-cli login` first")]
    NotSignedIn,
}

fn describe_api_error(error: &ApiError) -> String {
    match error.message() {
        Some(message) => message.to_owned(),
        None => error.to_string(),
    }
}

#[derive(Parser, Debug)]
#[command(name = "societaire-cli", about = "Entrelac membership service CLI")]
struct Cli {
    /// Service base URL. Defaults to the one for SOCIETAIRE_ENV.
    #[arg(long, env = "SOCIETAIRE_BASE_URL")]
    base_url: Option<String>,

    /// Directory holding the stored session token.
    #[arg(long, env = "SOCIETAIRE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log request details to stderr. Ignored when RUST_LOG is set.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account. A confirmation code is emailed.
    Register(RegisterArgs),
    /// Confirm an account with the emailed code and sign in.
    Confirm {
        #[arg(long)]
        email: String,
        #[arg(long)]
        code: String,
    },
    ResendConfirmation {
        #[arg(long)]
        email: String,
    },
    /// Email a password reset code.
    ForgotPassword {
        #[arg(long)]
        email: String,
    },
    /// Set a new password with the emailed code and sign in.
    ResetPassword {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SOCIETAIRE_PASSWORD")]
        password: String,
        #[arg(long)]
        code: String,
    },
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SOCIETAIRE_PASSWORD")]
        password: String,
    },
    Logout,
    /// Show the identity held in the stored token.
    Whoami,
    /// Show the signed-in member's account.
    Me,
    /// Start a checkout for new shares and print its URL.
    Checkout {
        #[arg(long, default_value_t = 1)]
        quantity: u32,
        /// Buy the shares as a gift.
        #[arg(long, default_value_t = false)]
        gift: bool,
    },
    RedeemGift {
        code: String,
    },
    UploadDocuments(UploadArgs),
    /// Download the card for a gifted purchase.
    GiftCard {
        gift_id: String,
        #[arg(long, short)]
        output: PathBuf,
    },
    /// List membership categories.
    Categories,
    Admin(AdminCommand),
}

#[derive(Args, Debug)]
struct RegisterArgs {
    #[arg(long)]
    email: String,
    #[arg(long, env = "SOCIETAIRE_PASSWORD")]
    password: String,
    #[arg(long)]
    phone_number: String,
    #[arg(long)]
    first_name: String,
    #[arg(long)]
    last_name: String,
    #[arg(long)]
    address: String,
    #[arg(long)]
    postal_code: String,
    #[arg(long)]
    city: String,
    #[arg(long, default_value = "FR")]
    country: String,
    #[arg(long, default_value = "supporters")]
    category: Category,
    /// Required for every category except supporters.
    #[arg(long)]
    reason: Option<String>,
}

#[derive(Args, Debug)]
struct UploadArgs {
    #[arg(long)]
    identity_front: PathBuf,
    #[arg(long)]
    identity_back: Option<PathBuf>,
    #[arg(long)]
    address_proof: PathBuf,
}

#[derive(Args, Debug)]
struct AdminCommand {
    #[command(subcommand)]
    command: AdminSubcommand,
}

#[derive(Subcommand, Debug)]
enum AdminSubcommand {
    Users,
    User {
        user_id: String,
    },
    /// Export all members as CSV to a file, or stdout.
    ExportCsv {
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    Document {
        user_id: String,
        document_id: String,
        #[arg(long, short)]
        output: PathBuf,
    },
}

struct CliContext {
    client: ApiClient,
    toaster: Toaster,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback_log(verbose)));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn fallback_log(verbose: bool) -> &'static str {
    if verbose { VERBOSE_LOG } else { QUIET_LOG }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url)?;
    }
    if let Some(dir) = cli.data_dir {
        config = config.with_data_dir(dir);
    }

    let store = FileStore::open(config.resolve_data_dir()?)?;
    let session = Session::load(Arc::new(store));
    session.set_navigator(|_: &str| eprintln!("signed out"));

    let toaster = Toaster::new();
    toaster.subscribe(|toast| {
        if let Some(toast) = toast {
            println!("{}", toast.message);
        }
    });

    let ctx = CliContext { client: ApiClient::new(&config, session)?, toaster };
    tracing::debug!(base_url = ctx.client.base_url(), "client ready");

    match cli.command {
        Command::Register(args) => run_register(&ctx, args).await,
        Command::Confirm { email, code } => {
            let issued = ctx
                .client
                .confirm_user(&ConfirmUserRequest { email, token: code })
                .await?;
            ctx.client.session().set_token(issued.token);
            ctx.toaster.success("account confirmed; you are signed in");
            Ok(())
        }
        Command::ResendConfirmation { email } => {
            ctx.client.start_confirm_user(&EmailRequest { email }).await?;
            ctx.toaster.success("confirmation code sent");
            Ok(())
        }
        Command::ForgotPassword { email } => {
            ctx.client.start_reset_user(&EmailRequest { email }).await?;
            ctx.toaster.success("reset code sent");
            Ok(())
        }
        Command::ResetPassword { email, password, code } => {
            let issued = ctx
                .client
                .reset_user(&ResetUserRequest { email, password, token: code })
                .await?;
            ctx.client.session().set_token(issued.token);
            ctx.toaster.success("password changed; you are signed in");
            Ok(())
        }
        Command::Login { email, password } => {
            let issued = ctx.client.create_token(&CreateTokenRequest { email, password }).await?;
            ctx.client.session().set_token(issued.token);
            ctx.toaster.success("signed in");
            Ok(())
        }
        Command::Logout => {
            ctx.client.session().sign_out();
            Ok(())
        }
        Command::Whoami => run_whoami(ctx.client.session()),
        Command::Me => {
            require_session(&ctx)?;
            print_json(&ctx.client.get_current_user().await?)
        }
        Command::Checkout { quantity, gift } => {
            require_session(&ctx)?;
            let checkout = ctx
                .client
                .create_checkout_session(&CreateCheckoutSessionRequest { quantity, gift: gift.then_some(true) })
                .await?;
            println!("{}", checkout.url);
            Ok(())
        }
        Command::RedeemGift { code } => {
            require_session(&ctx)?;
            ctx.client.use_gift_code(&UseGiftCodeRequest { gift_code: code }).await?;
            ctx.toaster.success("gift code redeemed");
            Ok(())
        }
        Command::UploadDocuments(args) => run_upload(&ctx, args).await,
        Command::GiftCard { gift_id, output } => {
            let bytes = ctx.client.get_gift_card(&gift_id).await?;
            write_output(&output, &bytes).await?;
            ctx.toaster.success(format!("gift card saved to {}", output.display()));
            Ok(())
        }
        Command::Categories => {
            for (slug, label) in societaire::categories::all() {
                println!("{slug:<26} {label}");
            }
            Ok(())
        }
        Command::Admin(admin) => run_admin(&ctx, admin).await,
    }
}

async fn run_register(ctx: &CliContext, args: RegisterArgs) -> Result<(), CliError> {
    let form = CreateUserRequest {
        email: args.email,
        password: args.password,
        phone_number: args.phone_number,
        first_name: args.first_name,
        last_name: args.last_name,
        address: args.address,
        postal_code: args.postal_code,
        city: args.city,
        country: args.country,
        category: args.category,
        reason: args.reason,
    };
    form.validate()?;
    ctx.client.create_user(&form).await?;
    ctx.toaster.success("account created; check your email for the confirmation code");
    Ok(())
}

fn run_whoami(session: &Session) -> Result<(), CliError> {
    println!("{}", describe_session(&session.state(), unix_now())?);
    Ok(())
}

/// One-line summary of who the stored token belongs to, flagging a token
/// already past its `exp` at `now`.
fn describe_session(state: &SessionState, now: u64) -> Result<String, CliError> {
    let (Some(token), identity) = (&state.token, &state.identity) else {
        return Err(CliError::NotSignedIn);
    };
    let Some(identity) = identity else {
        return Ok("signed in (token payload unreadable)".to_owned());
    };
    let role = if identity.admin { "admin" } else { "member" };
    let expired = claims::decode(token).is_ok_and(|c| c.is_expired_at(now));
    if expired {
        Ok(format!("{} ({role}, token expired; log in again)", identity.user_id))
    } else {
        Ok(format!("{} ({role})", identity.user_id))
    }
}

fn unix_now() -> u64 {
    let Ok(duration) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    duration.as_secs()
}

async fn run_upload(ctx: &CliContext, args: UploadArgs) -> Result<(), CliError> {
    require_session(ctx)?;
    let identity_back = match &args.identity_back {
        Some(path) => Some(Document::from_path(path).await?),
        None => None,
    };
    let upload = DocumentUpload {
        identity_front: Document::from_path(&args.identity_front).await?,
        identity_back,
        address_proof: Document::from_path(&args.address_proof).await?,
    };
    ctx.client.upload_documents(upload).await?;
    ctx.toaster.success("documents uploaded");
    Ok(())
}

async fn run_admin(ctx: &CliContext, admin: AdminCommand) -> Result<(), CliError> {
    require_session(ctx)?;
    match admin.command {
        AdminSubcommand::Users => print_json(&ctx.client.get_users().await?),
        AdminSubcommand::User { user_id } => print_json(&ctx.client.get_user(&user_id).await?),
        AdminSubcommand::ExportCsv { output } => {
            let csv = ctx.client.export_users_csv().await?;
            match output {
                Some(path) => {
                    write_output(&path, csv.as_bytes()).await?;
                    ctx.toaster.success(format!("export saved to {}", path.display()));
                }
                None => print!("{csv}"),
            }
            Ok(())
        }
        AdminSubcommand::Document { user_id, document_id, output } => {
            let bytes = ctx.client.get_user_document(&user_id, &document_id).await?;
            write_output(&output, &bytes).await?;
            ctx.toaster.success(format!("document saved to {}", output.display()));
            Ok(())
        }
    }
}

fn require_session(ctx: &CliContext) -> Result<(), CliError> {
    if ctx.client.session().is_signed_in() {
        Ok(())
    } else {
        Err(CliError::NotSignedIn)
    }
}

async fn write_output(path: &Path, bytes: &[u8]) -> Result<(), CliError> {
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
