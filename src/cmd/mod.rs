//! Command execution layer: resolves global options, opens the manager,
//! and dispatches to the subcommand implementations in `cmds`.

use std::fmt::Display;
use std::io;
use std::io::Write;

use ansi_term::Style;
use enum_dispatch::enum_dispatch;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use log::error;

use crate::config::Config;
use crate::updater::{
    Conflict, FileId, Result, Status, UpdateError, UpdateManager,
};

pub mod cmds;
pub mod opts;
pub mod style;
pub mod table;

use opts::{
    AddUpdateSiteCmd, AddUpdateSitesCmd, Command, DeactivateUpdateSiteCmd, DiffCmd,
    DowngradeCmd, EditUpdateSiteCmd, HistoryCmd, ListCmd, ListCurrentCmd, ListFromSiteCmd,
    ListLocalOnlyCmd, ListModifiedCmd, ListNotUptodateCmd, ListShadowedCmd, ListUpdateSitesCmd,
    ListUpdateableCmd, ListUptodateCmd, RefreshUpdateSitesCmd, RemoveUpdateSiteCmd,
    RevertUnrealChangesCmd, RupsArgs, ShowCmd, UpdateCmd, UpdateForceCmd,
    UpdateForcePristineCmd, UploadCmd, UploadCompleteSiteCmd,
};
use table::{Cell, ColumnSpec, Table};

/// Options every subcommand receives alongside the manager
#[derive(Clone)]
pub struct GlobalArgs {
    pub quiet: bool,
    pub no_styles: bool,
    pub config: Config,
}

#[enum_dispatch]
pub trait Cmd {
    /// Executes the command
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()>;
}

/// Entry point the binary calls after parsing arguments
pub fn exec_command(args: &RupsArgs, config: Config) -> Result<()> {
    let root = args
        .root
        .clone()
        .or_else(|| config.root.clone())
        .unwrap_or_else(|| ".".to_string());

    let mut manager = UpdateManager::open(root)?;

    // Ctrl-C cancels in-flight downloads; partial files are left under
    // update/ for the next run to overwrite
    let cancel = manager.fetcher().cancel_flag();
    let _ = ctrlc::set_handler(move || cancel.store(true, std::sync::atomic::Ordering::Release));

    let globals = GlobalArgs {
        quiet: args.quiet,
        no_styles: args.no_styles || !atty::is(atty::Stream::Stdout),
        config,
    };

    args.command.exec(&mut manager, &globals)
}

/// Fetches remote catalogs and scans the installation; the common preamble
/// of every command that inspects file state. `strict` must be set by
/// commands that go on to modify state.
pub(crate) fn ready(manager: &mut UpdateManager, strict: bool, quiet: bool) -> Result<()> {
    manager.fetch_remote_catalogs(strict)?;
    let conflicts = manager.scan()?;
    print_conflicts(&conflicts, quiet);
    Ok(())
}

/// Resolves file arguments (globs allowed) to ids; all files when empty
pub(crate) fn select_ids(manager: &UpdateManager, patterns: &[String]) -> Result<Vec<FileId>> {
    if patterns.is_empty() {
        return Ok(manager.collection().ids());
    }

    let globs = build_globs(patterns)?;
    let ids: Vec<FileId> = manager
        .collection()
        .iter()
        .filter(|(_, file)| globs.is_match(&file.name))
        .map(|(id, _)| id)
        .collect();

    if ids.is_empty() {
        return Err(UpdateError::NotFound(format!(
            "No file matches {}",
            patterns.join(", ")
        )));
    }

    Ok(ids)
}

fn build_globs(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            GlobBuilder::new(pattern)
                .backslash_escape(true)
                .build()?,
        );
    }
    Ok(builder.build()?)
}

pub(crate) fn print_conflicts(conflicts: &[Conflict], quiet: bool) {
    if quiet {
        return;
    }

    for conflict in conflicts {
        error!("{}", conflict);
        let _ = println(conflict);
        for resolution in &conflict.resolutions {
            let _ = println(format!("  - {}", resolution.description));
        }
    }
}

pub(crate) fn status_style(status: Status) -> Style {
    match status {
        Status::Installed | Status::LocalOnly => *style::GREEN,
        Status::New | Status::Updateable => *style::CYAN,
        Status::Modified | Status::NotInstalled => *style::YELLOW,
        Status::Obsolete | Status::ObsoleteModified | Status::ObsoleteUninstalled => *style::RED,
    }
}

// https://github.com/rust-lang/rust/issues/46016
pub(crate) fn println(value: impl Display) -> Result<()> {
    if let Err(e) = writeln!(io::stdout(), "{}", value) {
        match e.kind() {
            io::ErrorKind::BrokenPipe => Ok(()),
            _ => Err(e.into()),
        }
    } else {
        Ok(())
    }
}

/// One line of file listing output
pub(crate) struct FileListing {
    pub name: String,
    pub status: Status,
    pub action: String,
    pub site: String,
}

impl FileListing {
    pub(crate) fn from_manager(manager: &UpdateManager, id: FileId) -> Self {
        let file = manager.collection().file(id);
        Self {
            name: file.name.clone(),
            status: file.status,
            action: file.action.to_string(),
            site: manager
                .collection()
                .winner(id)
                .map(|record| record.site.clone())
                .unwrap_or_default(),
        }
    }
}

/// Renders the standard file listing table
pub(crate) fn print_file_listings(
    listings: &[FileListing],
    header: bool,
    no_styles: bool,
) -> Result<()> {
    let mut table = Table::new(
        vec![
            ColumnSpec::left("Name"),
            ColumnSpec::left("Status"),
            ColumnSpec::left("Action"),
            ColumnSpec::left("Site"),
        ],
        header,
        !no_styles,
    );

    for listing in listings {
        table.row(vec![
            Cell::plain(listing.name.as_str()),
            Cell::styled(listing.status.to_string(), status_style(listing.status)),
            Cell::plain(listing.action.as_str()),
            Cell::plain(listing.site.as_str()),
        ]);
    }

    Ok(table.print()?)
}
