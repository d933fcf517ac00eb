use crate::core::config::AppConfig;
use crate::plugins::registry::CliPlugin;
use clap::{Arg, ArgMatches, Command};

pub struct NeteaseCliPlugin;

impl NeteaseCliPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl CliPlugin for NeteaseCliPlugin {
    fn name(&self) -> &'static str {
        "netease"
    }

    fn augment_command(&self, cmd: Command) -> Command {
        cmd.arg(
            Arg::new("netease_api")
                .long("netease-api")
                .env("NETEASE_API")
                .global(true)
                .help_heading("NetEase")
                .help("Base URL of the NeteaseCloudMusicApi service")
                .num_args(1),
        )
        .arg(
            Arg::new("netease_cookie")
                .long("netease-cookie")
                .env("NETEASE_COOKIE")
                .hide_env_values(true)
                .global(true)
                .help_heading("NetEase")
                .help("Fallback cloud session cookie (MUSIC_U=...)")
                .num_args(1),
        )
    }

    fn apply_matches(&self, matches: &ArgMatches, cfg: &mut AppConfig) -> anyhow::Result<()> {
        if let Some(api) = matches.get_one::<String>("netease_api") {
            url::Url::parse(api).map_err(|e| anyhow::anyhow!("invalid --netease-api {api}: {e}"))?;
            cfg.netease.api_base = api.clone();
        }
        if let Some(c) = matches.get_one::<String>("netease_cookie") {
            cfg.netease.cookie = Some(c.clone()).filter(|c| !c.trim().is_empty());
        }
        Ok(())
    }
}
