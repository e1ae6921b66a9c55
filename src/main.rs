use clap::Parser;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use shadow_raffle::{
    api::HttpRaffleApi,
    auth::{
        self,
        AuthOutcome,
        LoginForm,
        RegisterForm,
    },
    client,
    config::{
        AppConfig,
        Args,
        Command,
    },
    session::SessionStore,
    storage::SledLocalStorage,
};
use std::sync::OnceLock;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

const LOG_FILE_PREFIX: &str = "shadow-raffle.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn init_tracing(config: &AppConfig) -> Result<()> {
    std::fs::create_dir_all(&config.log_dir).wrap_err_with(|| {
        format!("failed to create log directory {}", config.log_dir.display())
    })?;
    let appender = rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|err| eyre!("failed to install tracing subscriber: {err}"))
}

fn ensure_data_dir(config: &AppConfig) -> Result<()> {
    std::fs::create_dir_all(&config.data_dir).wrap_err_with(|| {
        format!("failed to create data directory {}", config.data_dir.display())
    })
}

fn open_session(config: &AppConfig) -> Result<SessionStore<SledLocalStorage>> {
    ensure_data_dir(config)?;
    let storage = SledLocalStorage::open(config.session_db_path())
        .wrap_err("failed to open local session store")?;
    Ok(SessionStore::new(storage))
}

fn report(outcome: AuthOutcome) -> Result<()> {
    match outcome {
        AuthOutcome::LoggedIn { user, message } => {
            if !message.is_empty() {
                println!("{message}");
            }
            println!(
                "Signed in as {} ({} shadow coins)",
                user.nickname, user.shadow_coins
            );
            Ok(())
        }
        AuthOutcome::Failed { message } => Err(eyre!(message)),
    }
}

async fn login(config: &AppConfig, nickname: String) -> Result<()> {
    let password = rpassword::prompt_password("Password: ")?;
    let request = LoginForm { nickname, password }.validate()?;
    let api = HttpRaffleApi::new(config.api_url.clone())?;
    let mut session = open_session(config)?;
    report(auth::login(&api, &mut session, &request).await)
}

async fn register(
    config: &AppConfig,
    nickname: String,
    telegram: Option<String>,
    site_url: Option<String>,
) -> Result<()> {
    let password = rpassword::prompt_password("Password: ")?;
    let confirm_password = rpassword::prompt_password("Confirm password: ")?;
    let form = RegisterForm {
        nickname,
        password,
        confirm_password,
        telegram: telegram.unwrap_or_default(),
        site_url: site_url.unwrap_or_default(),
    };
    let request = form.validate(&config.profile_site)?;
    let api = HttpRaffleApi::new(config.api_url.clone())?;
    let mut session = open_session(config)?;
    report(auth::register(&api, &mut session, &request).await)
}

fn logout(config: &AppConfig) -> Result<()> {
    let mut session = open_session(config)?;
    auth::logout(&mut session).wrap_err("failed to clear session")?;
    println!("Signed out");
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let config = AppConfig::try_from(&args)?;
    init_tracing(&config)?;

    match args.command.unwrap_or(Command::Play) {
        Command::Play => {
            ensure_data_dir(&config)?;
            client::run_app(config).await
        }
        Command::Login { nickname } => login(&config, nickname).await,
        Command::Register {
            nickname,
            telegram,
            site_url,
        } => register(&config, nickname, telegram, site_url).await,
        Command::Logout => logout(&config),
    }
}
