use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use udb_core::core::events::ProgressSink;
use udb_core::fs_paths::{AppPaths, DesktopPaths};
use udb_core::models::settings::AppSettings;

use crate::core::batch::{build_queue, load_entries, run_batch, DownloadType, SeriesLayout};
use crate::core::downloader::Downloader;
use crate::core::ffmpeg::is_ffmpeg_available;
use crate::models::job::{DownloadJob, JobSource, SubtitleTrack};
use crate::progress::TerminalProgress;
use crate::storage::config::{load_settings, save_settings};

#[derive(Parser, Debug)]
#[command(
    name = "udb",
    version,
    about = "Downloads episodes from HLS playlists or direct links into MP4 files"
)]
pub struct CliArgs {
    /// Settings file (JSON); defaults to the per-user config directory
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Concurrent segment downloads
    #[arg(short, long, global = true)]
    pub workers: Option<u32>,

    /// Attempts per request before giving up
    #[arg(long, global = true)]
    pub retries: Option<u32>,

    /// Referer header sent with every request
    #[arg(long, global = true)]
    pub referer: Option<String>,

    #[arg(long, global = true, help = "Hide the progress bar")]
    pub no_progress: bool,

    #[arg(short, long, action = ArgAction::Count, global = true, help = "More logging (-v debug, -vv trace)")]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download one episode from a media playlist
    Hls {
        url: String,
        #[arg(long)]
        name: String,
        #[arg(long, help = "Destination folder (default: download_dir from settings)")]
        out: Option<PathBuf>,
        #[arg(long = "sub", value_name = "LABEL=URL", value_parser = parse_subtitle)]
        subs: Vec<SubtitleTrack>,
    },
    /// Download one episode from a direct MP4 link
    Direct {
        url: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long = "sub", value_name = "LABEL=URL", value_parser = parse_subtitle)]
        subs: Vec<SubtitleTrack>,
    },
    /// Download every episode listed in a JSON batch file
    Batch {
        file: PathBuf,
        #[arg(long, help = "Series title (default: batch file name)")]
        series: Option<String>,
    },
    /// Print the effective settings
    Config {
        #[arg(long, help = "Write the effective settings to the settings file")]
        save: bool,
    },
}

pub fn parse_subtitle(value: &str) -> Result<SubtitleTrack, String> {
    let (label, url) = value
        .split_once('=')
        .ok_or_else(|| format!("expected LABEL=URL, got '{}'", value))?;
    let (label, url) = (label.trim(), url.trim());
    if label.is_empty() || url.is_empty() {
        return Err(format!("expected LABEL=URL, got '{}'", value));
    }
    Ok(SubtitleTrack {
        label: label.to_string(),
        url: url.to_string(),
    })
}

pub fn log_filter(verbose: u8) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let directives = match verbose {
        0 => "info",
        1 => "debug,hyper_util=info,reqwest=info,rustls=info",
        _ => "trace",
    };
    EnvFilter::new(directives)
}

impl CliArgs {
    pub fn settings_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| DesktopPaths.settings_file())
    }

    /// Command line values win over the settings file.
    pub fn apply_overrides(&self, settings: &mut AppSettings) {
        if let Some(workers) = self.workers {
            settings.downloader.max_workers = workers.max(1);
        }
        if let Some(retries) = self.retries {
            settings.downloader.max_retries = retries.max(1);
        }
        if let Some(referer) = &self.referer {
            settings.downloader.referer = Some(referer.clone());
        }
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, stopping after cleanup");
            child.cancel();
        }
    });
    token
}

async fn require_ffmpeg(settings: &AppSettings) -> anyhow::Result<()> {
    if !is_ffmpeg_available(&settings.downloader.ffmpeg_path).await {
        anyhow::bail!(
            "ffmpeg not found (looked for '{}'); install it or set ffmpeg_path in the settings file",
            settings.downloader.ffmpeg_path
        );
    }
    Ok(())
}

/// Runs the parsed command and returns the process exit code.
pub async fn execute(args: CliArgs) -> anyhow::Result<i32> {
    let settings_path = args.settings_path();
    let mut settings = load_settings(&settings_path);
    args.apply_overrides(&mut settings);

    let progress: Box<dyn ProgressSink> = if args.no_progress {
        Box::new(TerminalProgress::new_disabled())
    } else {
        Box::new(TerminalProgress::new())
    };

    match args.command {
        Command::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            if save {
                save_settings(&settings_path, &settings)?;
                tracing::info!("settings written to {}", settings_path.display());
            }
            Ok(0)
        }
        Command::Hls { url, name, out, subs } => {
            require_ffmpeg(&settings).await?;
            let source = JobSource::Hls { manifest_url: url };
            run_single(&settings, source, &name, out, subs, progress.as_ref()).await
        }
        Command::Direct { url, name, out, subs } => {
            let source = JobSource::Progressive { url };
            run_single(&settings, source, &name, out, subs, progress.as_ref()).await
        }
        Command::Batch { file, series } => {
            let entries = load_entries(&file)?;
            if entries.iter().any(|e| e.download_type == DownloadType::Hls) {
                require_ffmpeg(&settings).await?;
            }
            let series = series.unwrap_or_else(|| {
                file.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "series".to_string())
            });

            let layout = SeriesLayout::new(&settings.downloader, &series);
            tracing::info!(
                "[batch] {} episode(s) of '{}' into {}",
                entries.len(),
                series,
                layout.series_dir.display()
            );
            let mut queue = build_queue(&entries, &layout, &settings.downloader);
            let downloader = Downloader::from_settings(&settings.downloader, &settings.proxy)?;
            let cancel = cancel_on_ctrl_c();

            let summary = run_batch(&downloader, &mut queue, progress.as_ref(), &cancel).await;
            Ok(summary.exit_code())
        }
    }
}

async fn run_single(
    settings: &AppSettings,
    source: JobSource,
    name: &str,
    out: Option<PathBuf>,
    subs: Vec<SubtitleTrack>,
    progress: &dyn ProgressSink,
) -> anyhow::Result<i32> {
    let out_dir = out.unwrap_or_else(|| settings.downloader.download_dir.clone());
    let temp_dir = out_dir.join(&settings.downloader.temp_dir_name);
    let job = DownloadJob::new(name, out_dir, temp_dir, source)
        .with_subtitles(subs)
        .with_resolution(Some(settings.downloader.resolution.clone()));

    if settings.downloader.skip_existing && job.output_path().is_file() {
        tracing::info!("{} already exists, nothing to do", job.output_path().display());
        return Ok(0);
    }

    let downloader = Downloader::from_settings(&settings.downloader, &settings.proxy)?;
    let cancel = cancel_on_ctrl_c();
    let outcome = downloader.start(&job, progress, &cancel).await;
    if let Some(message) = &outcome.message {
        eprintln!("{}", message);
    }
    Ok(outcome.exit_code)
}

pub fn run() -> i32 {
    let args = CliArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(args.verbose))
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start runtime: {}", e);
            return 1;
        }
    };

    match runtime.block_on(execute(args)) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtitle_argument_splits_on_first_equals() {
        let track = parse_subtitle("English=https://s.example.com/a.srt?t=1").unwrap();
        assert_eq!(track.label, "English");
        assert_eq!(track.url, "https://s.example.com/a.srt?t=1");
    }

    #[test]
    fn subtitle_argument_requires_both_parts() {
        assert!(parse_subtitle("English").is_err());
        assert!(parse_subtitle("=https://s/a.srt").is_err());
    }

    #[test]
    fn parses_hls_command_with_subtitles() {
        let args = CliArgs::try_parse_from([
            "udb",
            "hls",
            "https://x.example.com/index.m3u8",
            "--name",
            "Episode 1",
            "--sub",
            "English=https://s/en.srt",
            "--sub",
            "Thai=https://s/th.srt",
            "-w",
            "4",
        ])
        .unwrap();
        assert_eq!(args.workers, Some(4));
        match args.command {
            Command::Hls { name, subs, out, .. } => {
                assert_eq!(name, "Episode 1");
                assert_eq!(subs.len(), 2);
                assert!(out.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn parses_batch_command_with_global_flags_after() {
        let args =
            CliArgs::try_parse_from(["udb", "batch", "show.json", "--series", "Show", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
        assert!(matches!(args.command, Command::Batch { series: Some(_), .. }));
    }

    #[test]
    fn hls_requires_name() {
        assert!(CliArgs::try_parse_from(["udb", "hls", "https://x/index.m3u8"]).is_err());
    }

    #[test]
    fn overrides_replace_settings() {
        let args = CliArgs::try_parse_from([
            "udb", "--retries", "0", "--referer", "https://r.example.com/", "config",
        ])
        .unwrap();
        let mut settings = AppSettings::default();
        args.apply_overrides(&mut settings);
        assert_eq!(settings.downloader.max_retries, 1);
        assert_eq!(settings.downloader.referer.as_deref(), Some("https://r.example.com/"));
        assert_eq!(settings.downloader.max_workers, 16);
    }

    #[test]
    fn explicit_config_path_wins() {
        let args = CliArgs::try_parse_from(["udb", "--config", "/tmp/udb.json", "config"]).unwrap();
        assert_eq!(args.settings_path(), PathBuf::from("/tmp/udb.json"));
    }
}
