use crate::core::config::AppConfig;
use crate::plugins::registry::CliPlugin;
use clap::{Arg, ArgMatches, Command};

pub struct FfmpegCliPlugin;

impl FfmpegCliPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl CliPlugin for FfmpegCliPlugin {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn augment_command(&self, cmd: Command) -> Command {
        cmd.arg(
            Arg::new("ffmpeg_path")
                .long("ffmpeg-path")
                .env("FFMPEG_PATH")
                .global(true)
                .help_heading("ffmpeg")
                .help("ffmpeg executable")
                .num_args(1),
        )
    }

    fn apply_matches(&self, matches: &ArgMatches, cfg: &mut AppConfig) -> anyhow::Result<()> {
        if let Some(p) = matches.get_one::<String>("ffmpeg_path") {
            cfg.ffmpeg.binary = p.clone();
        }
        Ok(())
    }
}
