//! `earshot`: continuous recorder and range export.

mod commands;
mod settings;

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::{error, info};

use settings::{default_settings_path, load_settings, save_settings};

const USAGE: &str = "\
Usage: earshot [--settings <file>] <command> [options]

Commands:
  record   [--for <seconds>]                       capture until Ctrl-C
  list     [--from <date>] [--to <date>] [--json]  sealed segments, newest first
  export   --start <time> --end <time> --out <file.wav> [--strict] [--reject-gaps]
  bundle   [--from <date>] [--to <date>] [--out <dir>]
  devices  [--json]
  settings                                         print effective settings

Times are RFC 3339 or `YYYY-MM-DD HH:MM:SS[.fff]` (UTC); dates are `YYYY-MM-DD`.";

#[derive(Debug, PartialEq)]
enum Command {
    Record {
        limit: Option<Duration>,
    },
    List {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        json: bool,
    },
    Export {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        out: PathBuf,
        strict: bool,
        reject_gaps: bool,
    },
    Bundle {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        out: PathBuf,
    },
    Devices {
        json: bool,
    },
    Settings,
    Help,
}

#[derive(Debug, PartialEq)]
struct Args {
    settings_path: Option<PathBuf>,
    command: Command,
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(t.and_utc());
        }
    }
    Err(format!("invalid time: {raw}"))
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| format!("invalid date: {raw}"))
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut settings_path = None;
    let mut command: Option<String> = None;
    let mut limit = None;
    let (mut from, mut to) = (None, None);
    let (mut start, mut end) = (None, None);
    let mut out: Option<PathBuf> = None;
    let (mut json, mut strict, mut reject_gaps) = (false, false, false);

    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        let mut value = |name: &str| it.next().ok_or_else(|| format!("missing value for {name}"));
        match arg.as_str() {
            "--settings" => settings_path = Some(PathBuf::from(value("--settings")?)),
            "--for" => {
                let secs = value("--for")?
                    .parse::<u64>()
                    .map_err(|_| "invalid value for --for".to_string())?;
                limit = Some(Duration::from_secs(secs.max(1)));
            }
            "--from" => from = Some(parse_date(&value("--from")?)?),
            "--to" => to = Some(parse_date(&value("--to")?)?),
            "--start" => start = Some(parse_time(&value("--start")?)?),
            "--end" => end = Some(parse_time(&value("--end")?)?),
            "--out" => out = Some(PathBuf::from(value("--out")?)),
            "--json" => json = true,
            "--strict" => strict = true,
            "--reject-gaps" => reject_gaps = true,
            "--help" | "-h" => command = Some("help".into()),
            other if other.starts_with('-') => return Err(format!("unknown argument: {other}")),
            other if command.is_none() => command = Some(other.to_string()),
            other => return Err(format!("unexpected argument: {other}")),
        }
    }

    let command = match command.as_deref() {
        Some("record") => Command::Record { limit },
        Some("list") => Command::List { from, to, json },
        Some("export") => Command::Export {
            start: start.ok_or("export needs --start")?,
            end: end.ok_or("export needs --end")?,
            out: out.ok_or("export needs --out")?,
            strict,
            reject_gaps,
        },
        Some("bundle") => Command::Bundle {
            from,
            to,
            out: out.unwrap_or_else(|| PathBuf::from(".")),
        },
        Some("devices") => Command::Devices { json },
        Some("settings") => Command::Settings,
        Some("help") | None => Command::Help,
        Some(other) => return Err(format!("unknown command: {other}")),
    };

    Ok(Args {
        settings_path,
        command,
    })
}

#[tokio::main]
async fn main() {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("earshot=info,earshot_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    if let Err(e) = run(args).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let settings_path = args.settings_path.unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&settings_path);
    settings.apply_env_overrides();
    info!(
        settings_path = %settings_path.display(),
        recordings_dir = %settings.recordings_dir.display(),
        sample_rate = settings.sample_rate,
        segment_seconds = settings.segment_seconds,
        codec = ?settings.codec,
        "settings loaded"
    );

    match args.command {
        Command::Record { limit } => {
            if !settings_path.exists() {
                save_settings(&settings_path, &settings)?;
                info!(path = %settings_path.display(), "default settings written");
            }
            commands::record(&settings, limit).await
        }
        Command::List { from, to, json } => commands::list(&settings, from, to, json),
        Command::Export {
            start,
            end,
            out,
            strict,
            reject_gaps,
        } => commands::export(
            &settings,
            commands::ExportArgs {
                start,
                end,
                out,
                strict,
                reject_gaps,
            },
        ),
        Command::Bundle { from, to, out } => {
            commands::bundle(&settings, from, to, &out).map(|_| ())
        }
        Command::Devices { json } => commands::devices(json),
        Command::Settings => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
        Command::Help => {
            println!("{USAGE}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parse(args: &[&str]) -> Result<Args, String> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_export_with_flags() {
        let args = parse(&[
            "--settings",
            "/tmp/s.json",
            "export",
            "--start",
            "2026-10-17T10:00:02Z",
            "--end",
            "2026-10-17 10:00:05.250",
            "--out",
            "clip.wav",
            "--strict",
        ])
        .unwrap();
        assert_eq!(args.settings_path, Some(PathBuf::from("/tmp/s.json")));
        assert_eq!(
            args.command,
            Command::Export {
                start: Utc.with_ymd_and_hms(2026, 10, 17, 10, 0, 2).unwrap(),
                end: Utc.with_ymd_and_hms(2026, 10, 17, 10, 0, 5).unwrap()
                    + chrono::TimeDelta::milliseconds(250),
                out: PathBuf::from("clip.wav"),
                strict: true,
                reject_gaps: false,
            }
        );
    }

    #[test]
    fn export_requires_window_and_output() {
        assert!(parse(&["export", "--start", "2026-10-17T10:00:00Z"]).is_err());
    }

    #[test]
    fn rfc3339_offsets_convert_to_utc() {
        let t = parse_time("2026-10-17T12:00:00+02:00").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2026, 10, 17, 10, 0, 0).unwrap());
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn list_and_bundle_take_dates() {
        let args = parse(&["list", "--from", "2026-10-01", "--json"]).unwrap();
        assert_eq!(
            args.command,
            Command::List {
                from: NaiveDate::from_ymd_opt(2026, 10, 1),
                to: None,
                json: true,
            }
        );
        assert!(parse(&["bundle", "--to", "17/10/2026"]).is_err());
    }

    #[test]
    fn no_command_shows_help_and_unknown_is_rejected() {
        assert_eq!(parse(&[]).unwrap().command, Command::Help);
        assert!(parse(&["transcribe"]).is_err());
        assert!(parse(&["record", "--verbose"]).is_err());
    }
}
