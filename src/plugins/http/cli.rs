use crate::core::config::AppConfig;
use crate::plugins::registry::CliPlugin;
use clap::{Arg, ArgMatches, Command};

pub struct HttpCliPlugin;

impl HttpCliPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl CliPlugin for HttpCliPlugin {
    fn name(&self) -> &'static str {
        "http"
    }

    fn augment_command(&self, cmd: Command) -> Command {
        cmd.arg(
            Arg::new("http_user_agent")
                .long("user-agent")
                .env("LTC_USER_AGENT")
                .global(true)
                .help_heading("HTTP")
                .help("User-Agent for redirect resolution and yt-dlp (defaults to desktop Chrome)")
                .num_args(1),
        )
        .arg(
            Arg::new("http_timeout_secs")
                .long("timeout-secs")
                .env("LTC_TIMEOUT_SECS")
                .global(true)
                .help_heading("HTTP")
                .help("Timeout in seconds for outbound HTTP requests")
                .num_args(1),
        )
    }

    fn apply_matches(&self, matches: &ArgMatches, cfg: &mut AppConfig) -> anyhow::Result<()> {
        if let Some(ua) = matches.get_one::<String>("http_user_agent") {
            cfg.user_agent = ua.clone();
        }
        if let Some(s) = matches.get_one::<String>("http_timeout_secs") {
            cfg.timeout_secs = s.parse()?;
        }
        Ok(())
    }
}
