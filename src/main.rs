mod api;
mod core;
mod i18n;
mod plugins;

use crate::core::config::AppConfig;
use crate::core::engine::Engine;
use crate::core::model::CookieSettings;
use crate::i18n::Locale;
use crate::plugins::ffmpeg::driver::FfmpegTranscoder;
use crate::plugins::registry::PluginRegistry;
use crate::plugins::ytdlp::driver::YtDlpDriver;
use clap::{Arg, ArgAction, ArgMatches, Command};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn build_cli() -> Command {
    let serve = Command::new("serve")
        .about("Run the HTTP API with live progress over SSE")
        .arg(
            Arg::new("host")
                .long("host")
                .env("HOST")
                .help("Bind address")
                .default_value("0.0.0.0")
                .num_args(1),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .env("PORT")
                .help("Bind port")
                .default_value("3000")
                .num_args(1),
        );

    let process = Command::new("process")
        .about("Process one link in the foreground")
        .arg(
            Arg::new("text")
                .help("Link, or share text containing a link")
                .action(ArgAction::Append)
                .num_args(1..)
                .required(true),
        )
        .arg(cookie_arg("douyin_cookie", "douyin-cookie", "Douyin"))
        .arg(cookie_arg("bilibili_cookie", "bilibili-cookie", "Bilibili"))
        .arg(cookie_arg("tiktok_cookie", "tiktok-cookie", "TikTok"))
        .arg(cookie_arg("youtube_cookie", "youtube-cookie", "YouTube"));

    let cmd = Command::new("link-to-cloud")
        .about("Resolve social media links, extract the audio and upload it to NetEase Cloud Music")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(dir_arg("temp_dir", "temp-dir", "LTC_TEMP_DIR", "Scratch directory for downloads"))
        .arg(dir_arg("download_dir", "download-dir", "LTC_DOWNLOAD_DIR", "Where transcoded MP3s are written"))
        .arg(dir_arg("data_dir", "data-dir", "LTC_DATA_DIR", "Directory holding the settings database"))
        .arg(
            Arg::new("locale")
                .long("locale")
                .env("LTC_LOCALE")
                .global(true)
                .help("Progress message language (en, zh)")
                .num_args(1),
        )
        .subcommand(serve)
        .subcommand(process);

    PluginRegistry::augment_command(cmd)
}

fn dir_arg(id: &'static str, long: &'static str, env: &'static str, help: &'static str) -> Arg {
    Arg::new(id).long(long).env(env).global(true).help(help).num_args(1)
}

fn cookie_arg(id: &'static str, long: &'static str, platform: &'static str) -> Arg {
    Arg::new(id)
        .long(long)
        .help_heading("Cookies")
        .help(format!("{platform} cookie: header string or Netscape cookie-jar text"))
        .num_args(1)
}

fn config_from_matches(m: &ArgMatches) -> anyhow::Result<AppConfig> {
    let mut cfg = AppConfig::default();
    if let Some(d) = m.get_one::<String>("temp_dir") {
        cfg.temp_dir = PathBuf::from(d);
    }
    if let Some(d) = m.get_one::<String>("download_dir") {
        cfg.download_dir = PathBuf::from(d);
    }
    if let Some(d) = m.get_one::<String>("data_dir") {
        cfg.data_dir = PathBuf::from(d);
    }
    if let Some(l) = m.get_one::<String>("locale") {
        cfg.locale = Locale::from_str(l);
    }
    PluginRegistry::apply_matches(m, &mut cfg)?;
    Ok(cfg)
}

async fn log_tool_versions(cfg: &AppConfig) {
    match YtDlpDriver::detect_version(&cfg.ytdlp.binary).await {
        Some(v) => info!(binary = %cfg.ytdlp.binary, version = %v, "yt-dlp found"),
        None => warn!(binary = %cfg.ytdlp.binary, "yt-dlp is not runnable; downloads will fail"),
    }
    match FfmpegTranscoder::detect_version(&cfg.ffmpeg.binary).await {
        Some(v) => info!(binary = %cfg.ffmpeg.binary, version = %v, "ffmpeg found"),
        None => warn!(binary = %cfg.ffmpeg.binary, "ffmpeg is not runnable; transcoding will fail"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let matches = build_cli().get_matches();
    let Some((name, m)) = matches.subcommand() else {
        return Ok(());
    };

    let mut cfg = config_from_matches(m)?;
    if name == "serve" {
        if let Some(h) = m.get_one::<String>("host") {
            cfg.host = h.clone();
        }
        if let Some(p) = m.get_one::<String>("port") {
            cfg.port = p.parse()?;
        }
    }
    log_tool_versions(&cfg).await;
    let (host, port) = (cfg.host.clone(), cfg.port);
    let registry = PluginRegistry::from_config(&cfg)?;
    let engine = Engine::new(registry, cfg).await?;

    match name {
        "serve" => {
            let _sweeper = engine.spawn_sweeper();
            api::server::serve(engine, &host, port).await?;
        }
        "process" => {
            let text = m
                .get_many::<String>("text")
                .map(|v| v.cloned().collect::<Vec<_>>().join(" "))
                .unwrap_or_default();
            let cookie = |id: &str| m.get_one::<String>(id).cloned().unwrap_or_default();
            let cookies = CookieSettings {
                netease_cookie: String::new(),
                douyin_cookie: cookie("douyin_cookie"),
                bilibili_cookie: cookie("bilibili_cookie"),
                tiktok_cookie: cookie("tiktok_cookie"),
                youtube_cookie: cookie("youtube_cookie"),
            };

            let pb = ProgressBar::new_spinner();
            pb.set_style(ProgressStyle::with_template("{spinner:.green} {wide_msg}")?.tick_chars("|/-\\ "));
            pb.enable_steady_tick(Duration::from_millis(120));
            let sink = |msg: &str| pb.set_message(msg.to_string());

            match engine.run_once(&text, &cookies, &sink).await {
                Ok(outcome) => {
                    pb.finish_and_clear();
                    println!("{} ({})", outcome.message, outcome.song_name);
                }
                Err(e) => {
                    pb.finish_and_clear();
                    return Err(e);
                }
            }
        }
        _ => {}
    }

    Ok(())
}
