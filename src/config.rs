use crate::{
    api::DEFAULT_API_URL,
    draw::LandingPolicy,
    profile::DEFAULT_PROFILE_SITE,
    roulette::{
        DEFAULT_EXTRA_ROTATIONS,
        DEFAULT_MIN_COPIES,
        RouletteConfig,
    },
};
use clap::{
    Parser,
    Subcommand,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use std::{
    path::PathBuf,
    time::Duration,
};

pub const DEFAULT_DATA_DIR: &str = "~/.shadow-raffle";
const DEFAULT_SPIN_MS: u64 = 6000;

#[derive(Parser, Debug)]
#[command(version, about = "Terminal client for the Shadow Raffle", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Base URL of the raffle API
    #[arg(long, default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Directory holding the local session store
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: String,

    /// Directory for log files (defaults to <data-dir>/logs)
    #[arg(long)]
    pub log_dir: Option<String>,

    #[arg(long, value_enum, default_value_t = LandingPolicy::Cosmetic)]
    pub landing: LandingPolicy,

    /// Spin animation length in milliseconds
    #[arg(long, default_value_t = DEFAULT_SPIN_MS)]
    pub spin_ms: u64,

    #[arg(long, default_value_t = DEFAULT_EXTRA_ROTATIONS)]
    pub extra_rotations: usize,

    #[arg(long, default_value_t = DEFAULT_MIN_COPIES)]
    pub min_copies: usize,

    /// Host that profile links must point to
    #[arg(long, default_value = DEFAULT_PROFILE_SITE)]
    pub profile_site: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open the game (default)
    Play,
    /// Log in and store the session
    Login {
        #[arg(long)]
        nickname: String,
    },
    /// Create an account and store the session
    Register {
        #[arg(long)]
        nickname: String,
        #[arg(long)]
        telegram: Option<String>,
        #[arg(long)]
        site_url: Option<String>,
    },
    /// Forget the stored session
    Logout,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api_url: String,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub landing: LandingPolicy,
    pub roulette: RouletteConfig,
    pub profile_site: String,
}

impl AppConfig {
    pub fn session_db_path(&self) -> PathBuf {
        self.data_dir.join("session")
    }
}

pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

impl TryFrom<&Args> for AppConfig {
    type Error = color_eyre::Report;

    fn try_from(args: &Args) -> Result<Self> {
        let api_url = url::Url::parse(&args.api_url)
            .wrap_err_with(|| format!("invalid --api-url {}", args.api_url))?;
        if !matches!(api_url.scheme(), "http" | "https") {
            return Err(eyre!("--api-url must use http or https"));
        }
        if args.spin_ms == 0 {
            return Err(eyre!("--spin-ms must be positive"));
        }
        if args.profile_site.trim().is_empty() {
            return Err(eyre!("--profile-site must not be empty"));
        }
        let data_dir = expand_path(&args.data_dir);
        let log_dir = args
            .log_dir
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(|| data_dir.join("logs"));
        let roulette = RouletteConfig {
            spin_duration: Duration::from_millis(args.spin_ms),
            extra_rotations: args.extra_rotations,
            min_copies: args.min_copies,
            ..RouletteConfig::default()
        };
        Ok(AppConfig {
            api_url: args.api_url.trim_end_matches('/').to_string(),
            data_dir,
            log_dir,
            landing: args.landing,
            roulette,
            profile_site: args.profile_site.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn args__defaults_build_config() {
        // given
        let args = Args::parse_from(["shadow-raffle", "--data-dir", "/tmp/raffle"]);

        // when
        let config = AppConfig::try_from(&args).unwrap();

        // then
        assert_eq!(args.command, None);
        assert_eq!(config.api_url, "http://localhost:5000");
        assert_eq!(config.landing, LandingPolicy::Cosmetic);
        assert_eq!(config.profile_site, "vk.com");
        assert_eq!(config.log_dir, PathBuf::from("/tmp/raffle/logs"));
        assert_eq!(config.session_db_path(), PathBuf::from("/tmp/raffle/session"));
        assert_eq!(config.roulette, RouletteConfig::default());
    }

    #[test]
    fn args__overrides_flow_into_roulette_config() {
        let args = Args::parse_from([
            "shadow-raffle",
            "--landing",
            "authoritative",
            "--spin-ms",
            "1500",
            "--extra-rotations",
            "2",
            "--api-url",
            "https://raffle.example/",
            "login",
            "--nickname",
            "shadow",
        ]);

        let config = AppConfig::try_from(&args).unwrap();

        assert_eq!(config.landing, LandingPolicy::Authoritative);
        assert_eq!(config.roulette.spin_duration, Duration::from_millis(1500));
        assert_eq!(config.roulette.extra_rotations, 2);
        assert_eq!(config.api_url, "https://raffle.example");
        assert_eq!(
            args.command,
            Some(Command::Login {
                nickname: "shadow".into()
            })
        );
    }

    #[test]
    fn args__rejects_non_http_api_url() {
        let args = Args::parse_from(["shadow-raffle", "--api-url", "ftp://host"]);

        assert!(AppConfig::try_from(&args).is_err());
    }
}
