use crate::core::config::AppConfig;
use crate::plugins::registry::CliPlugin;
use clap::{Arg, ArgAction, ArgMatches, Command};

pub struct YtDlpCliPlugin;

impl YtDlpCliPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl CliPlugin for YtDlpCliPlugin {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    fn augment_command(&self, cmd: Command) -> Command {
        cmd.arg(
            Arg::new("ytdlp_path")
                .long("ytdlp-path")
                .env("YTDLP_PATH")
                .global(true)
                .help_heading("yt-dlp")
                .help("yt-dlp executable")
                .num_args(1),
        )
        .arg(
            Arg::new("ytdlp_proxy")
                .long("proxy")
                .env("LTC_PROXY")
                .global(true)
                .help_heading("yt-dlp")
                .help("Proxy URL passed to yt-dlp, e.g. socks5://127.0.0.1:1080")
                .num_args(1),
        )
        .arg(
            Arg::new("enable_youtube")
                .long("enable-youtube")
                .env("ENABLE_YOUTUBE")
                .global(true)
                .help_heading("yt-dlp")
                .help("Allow YouTube links (off by default)")
                .action(ArgAction::SetTrue),
        )
    }

    fn apply_matches(&self, matches: &ArgMatches, cfg: &mut AppConfig) -> anyhow::Result<()> {
        if let Some(p) = matches.get_one::<String>("ytdlp_path") {
            cfg.ytdlp.binary = p.clone();
        }
        if let Some(p) = matches.get_one::<String>("ytdlp_proxy") {
            cfg.ytdlp.proxy = Some(p.clone());
        }
        if matches.get_flag("enable_youtube") {
            cfg.enable_youtube = true;
        }
        Ok(())
    }
}
