//! Line-oriented driver for [`Dashboard`] sessions.
//!
//! Each input line is one command:
//!
//! ```text
//! upload PATH              attach a file (re-attaching the same bytes is a no-op)
//! upload-cleared           detach it
//! filter COLUMN v1,v2      restrict COLUMN to the listed values
//! unfilter [COLUMN]        lift one restriction, or all of them
//! report                   print the current view
//! export PATH              write the filtered rows as CSV
//! clear --yes              wipe dataset and store
//! quit
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use std::{
    io::{BufRead, Write},
    path::PathBuf,
};

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info, warn};

use crate::{
    cli::SessionArgs,
    error::Severity,
    export,
    filter::split_values,
    ingest::Upload,
    report,
    session::{AppState, Dashboard, Event},
    store::Store,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Upload(PathBuf),
    UploadCleared,
    Filter { column: String, values: Vec<String> },
    Unfilter(Option<String>),
    Report,
    Export(PathBuf),
    Clear { confirmed: bool },
    Quit,
}

pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let command = match verb.to_ascii_lowercase().as_str() {
        "upload" if !rest.is_empty() => Command::Upload(PathBuf::from(rest)),
        "upload" => bail!("upload needs a file path"),
        "upload-cleared" => Command::UploadCleared,
        "filter" => {
            let (column, values) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| anyhow!("filter needs a column and a value list"))?;
            Command::Filter {
                column: crate::data::normalize_column_name(column),
                values: split_values(values)?,
            }
        }
        "unfilter" if rest.is_empty() => Command::Unfilter(None),
        "unfilter" => Command::Unfilter(Some(crate::data::normalize_column_name(rest))),
        "report" => Command::Report,
        "export" if !rest.is_empty() => Command::Export(PathBuf::from(rest)),
        "export" => bail!("export needs a file path"),
        "clear" => Command::Clear {
            confirmed: matches!(rest, "--yes" | "-y"),
        },
        "quit" | "exit" => Command::Quit,
        other => bail!("Unknown command '{other}'"),
    };
    Ok(Some(command))
}

/// Apply commands from `input` until end of input or `quit`.
///
/// Bad commands and unreadable files are reported on `out` and the session
/// carries on with the state it had.
pub fn run_session<S, R, W>(dashboard: &Dashboard<S>, input: R, out: &mut W) -> Result<AppState>
where
    S: Store,
    R: BufRead,
    W: Write,
{
    let mut state = dashboard.startup();
    report_diagnostics(&state, out)?;
    for (idx, line) in input.lines().enumerate() {
        let line = line.with_context(|| format!("Reading command on line {}", idx + 1))?;
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                warn!("line {}: {err}", idx + 1);
                writeln!(out, "[error] line {}: {err}", idx + 1)?;
                continue;
            }
        };
        debug!("Command: {command:?}");
        let event = match command {
            Command::Quit => break,
            Command::Report => {
                report::print_view(&dashboard.render(&state), dashboard.config(), out)?;
                continue;
            }
            Command::Export(path) => {
                match export::write_export(
                    dashboard.config(),
                    &state.dataset,
                    &state.selection,
                    Some(&path),
                ) {
                    Ok(rows) => writeln!(out, "[info] exported {rows} row(s) to {}", path.display())?,
                    Err(err) => writeln!(out, "[error] {err:#}")?,
                }
                continue;
            }
            Command::Upload(path) => match Upload::from_path(&path) {
                Ok(upload) => Event::Upload(upload),
                Err(err) => {
                    writeln!(out, "[error] reading {}: {err}", path.display())?;
                    continue;
                }
            },
            Command::UploadCleared => Event::UploadCleared,
            Command::Filter { column, values } => Event::Select { column, values },
            Command::Unfilter(column) => Event::Unselect { column },
            Command::Clear { confirmed } => Event::Clear { confirmed },
        };
        state = dashboard.update(state, event);
        report_diagnostics(&state, out)?;
    }
    info!("Session ended with {} row(s)", state.dataset.row_count());
    Ok(state)
}

fn report_diagnostics<W: Write>(state: &AppState, out: &mut W) -> Result<()> {
    for diagnostic in &state.diagnostics {
        let tag = match diagnostic.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        writeln!(out, "[{tag}] {}", diagnostic.message)?;
    }
    Ok(())
}

pub fn execute(args: &SessionArgs) -> Result<()> {
    let dashboard = crate::open_dashboard(&args.store)?;
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run_session(&dashboard, stdin.lock(), &mut out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::DashboardConfig, store::MemoryStore};

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("  # note").unwrap(), None);
        assert_eq!(
            parse_command("upload data/sales march.csv").unwrap(),
            Some(Command::Upload(PathBuf::from("data/sales march.csv")))
        );
        assert_eq!(
            parse_command("filter Status paid,'on hold'").unwrap(),
            Some(Command::Filter {
                column: "status".into(),
                values: vec!["paid".into(), "on hold".into()],
            })
        );
        assert_eq!(parse_command("unfilter").unwrap(), Some(Command::Unfilter(None)));
        assert_eq!(
            parse_command("clear").unwrap(),
            Some(Command::Clear { confirmed: false })
        );
        assert_eq!(
            parse_command("clear --yes").unwrap(),
            Some(Command::Clear { confirmed: true })
        );
        assert!(parse_command("upload").is_err());
        assert!(parse_command("dance").is_err());
    }

    #[test]
    fn session_consolidates_repeated_upload_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        std::fs::write(&path, "date,total\n01/03/2024,\"10,50\"\n").unwrap();
        let script = format!(
            "upload {0}\nupload {0}\nupload-cleared\nbogus\nfilter status paid\nquit\nupload {0}\n",
            path.display()
        );
        let dashboard = Dashboard::new(DashboardConfig::default(), MemoryStore::new());
        let mut out = Vec::new();
        let state = run_session(&dashboard, script.as_bytes(), &mut out).unwrap();
        assert_eq!(state.dataset.row_count(), 1);
        assert!(state.selection.selected("status").is_some());
        let printed = String::from_utf8(out).unwrap();
        assert_eq!(printed.matches("Merged 1 row").count(), 1);
        assert!(printed.contains("Unknown command 'bogus'"));
    }

    #[test]
    fn session_reports_are_written_to_the_session_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        std::fs::write(&path, "date,total\n01/03/2024,\"10,50\"\n").unwrap();
        let script = format!("report\nupload {}\nreport\n", path.display());
        let dashboard = Dashboard::new(DashboardConfig::default(), MemoryStore::new());
        let mut out = Vec::new();
        run_session(&dashboard, script.as_bytes(), &mut out).unwrap();
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains(report::EMPTY_HINT));
        assert!(printed.contains("Records: 1  Columns: 4  Period: 03/2024 - 03/2024"));
        assert!(printed.contains("R$ 10,50"));
        assert!(printed.contains("Sales by month"));
    }
}
