use clap::{Args, Parser, Subcommand, ValueEnum};
use enum_dispatch::enum_dispatch;

use crate::updater::Timestamp;

/// A package manager CLI for Spectra plug-in update sites
///
/// rups reconciles a Spectra installation against its configured update
/// sites: it discovers what is installed, compares it to the union of the
/// site catalogs, stages and verifies downloads, and publishes uploads for
/// sites you have upload rights on.
///
/// It is intended to be run from within an installation root. Use the
/// '--root' option to operate on another installation. Each subcommand has
/// its own help page describing its options.
#[derive(Debug, Parser)]
#[command(name = "rups", author = "The Spectra Project Developers", version)]
pub struct RupsArgs {
    /// Absolute or relative path to the installation root
    ///
    /// Defaults to the root configured in the rups config file, or the
    /// current directory.
    #[arg(short, long, value_name = "ROOT_PATH")]
    pub root: Option<String>,

    /// Suppress error messages and other command specific logging
    #[arg(short, long)]
    pub quiet: bool,

    /// Increase log level
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Disable all output styling
    #[arg(short = 'S', long)]
    pub no_styles: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

#[enum_dispatch(Cmd)]
#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "list")]
    List(ListCmd),
    #[command(name = "list-current")]
    ListCurrent(ListCurrentCmd),
    #[command(name = "list-uptodate")]
    ListUptodate(ListUptodateCmd),
    #[command(name = "list-not-uptodate")]
    ListNotUptodate(ListNotUptodateCmd),
    #[command(name = "list-updateable")]
    ListUpdateable(ListUpdateableCmd),
    #[command(name = "list-modified")]
    ListModified(ListModifiedCmd),
    #[command(name = "list-local-only")]
    ListLocalOnly(ListLocalOnlyCmd),
    #[command(name = "list-shadowed")]
    ListShadowed(ListShadowedCmd),
    #[command(name = "list-from-site")]
    ListFromSite(ListFromSiteCmd),
    #[command(name = "show")]
    Show(ShowCmd),
    #[command(name = "update")]
    Update(UpdateCmd),
    #[command(name = "update-force")]
    UpdateForce(UpdateForceCmd),
    #[command(name = "update-force-pristine")]
    UpdateForcePristine(UpdateForcePristineCmd),
    #[command(name = "upload")]
    Upload(UploadCmd),
    #[command(name = "upload-complete-site")]
    UploadCompleteSite(UploadCompleteSiteCmd),
    #[command(name = "list-update-sites")]
    ListUpdateSites(ListUpdateSitesCmd),
    #[command(name = "add-update-site")]
    AddUpdateSite(AddUpdateSiteCmd),
    #[command(name = "add-update-sites")]
    AddUpdateSites(AddUpdateSitesCmd),
    #[command(name = "edit-update-site")]
    EditUpdateSite(EditUpdateSiteCmd),
    #[command(name = "remove-update-site")]
    RemoveUpdateSite(RemoveUpdateSiteCmd),
    #[command(name = "deactivate-update-site")]
    DeactivateUpdateSite(DeactivateUpdateSiteCmd),
    #[command(name = "refresh-update-sites")]
    RefreshUpdateSites(RefreshUpdateSitesCmd),
    #[command(name = "diff")]
    Diff(DiffCmd),
    #[command(name = "history")]
    History(HistoryCmd),
    #[command(name = "downgrade")]
    Downgrade(DowngradeCmd),
    #[command(name = "revert-unreal-changes")]
    RevertUnrealChanges(RevertUnrealChangesCmd),
}

/// List files and their statuses
///
/// This command supports glob expressions. When you use globs, it is
/// usually a good idea to quote them so that your shell does not attempt
/// to expand them.
#[derive(Args, Debug)]
pub struct ListCmd {
    /// Display a header row
    #[arg(short = 'H', long)]
    pub header: bool,

    /// Files or glob patterns to list; everything when omitted
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,
}

/// List files that have a current version in the catalog
#[derive(Args, Debug)]
pub struct ListCurrentCmd {
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,
}

/// List installed files that match their catalog version
#[derive(Args, Debug)]
pub struct ListUptodateCmd {
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,
}

/// List files that differ from their catalog version
#[derive(Args, Debug)]
pub struct ListNotUptodateCmd {
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,
}

/// List files a newer version is available for
#[derive(Args, Debug)]
pub struct ListUpdateableCmd {
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,
}

/// List locally modified files
#[derive(Args, Debug)]
pub struct ListModifiedCmd {
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,
}

/// List files no update site knows about
#[derive(Args, Debug)]
pub struct ListLocalOnlyCmd {
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,
}

/// List files claimed by more than one update site
#[derive(Args, Debug)]
pub struct ListShadowedCmd {
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,
}

/// List the files owned by one update site
#[derive(Args, Debug)]
pub struct ListFromSiteCmd {
    /// Name of the update site
    #[arg(value_name = "NAME")]
    pub site: String,
}

/// Show the full catalog entry of one or more files
#[derive(Args, Debug)]
pub struct ShowCmd {
    #[arg(value_name = "FILES", required = true)]
    pub files: Vec<String>,
}

/// Install new files and update updateable ones
///
/// Without arguments, every file applying to this platform is brought up
/// to date. Locally modified files are reported and left untouched; use
/// update-force to overwrite them.
#[derive(Args, Debug)]
pub struct UpdateCmd {
    /// Only stage the changes; report what would happen
    #[arg(long)]
    pub simulate: bool,

    /// Files or glob patterns to update; everything when omitted
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,
}

/// Update, overwriting locally modified files
#[derive(Args, Debug)]
pub struct UpdateForceCmd {
    /// Only stage the changes; report what would happen
    #[arg(long)]
    pub simulate: bool,

    #[arg(value_name = "FILES")]
    pub files: Vec<String>,
}

/// Restore the pristine catalog state
///
/// Like update-force, but additionally re-installs files previously marked
/// not-installed and removes obsolete local copies.
#[derive(Args, Debug)]
pub struct UpdateForcePristineCmd {
    /// Only stage the changes; report what would happen
    #[arg(long)]
    pub simulate: bool,

    #[arg(value_name = "FILES")]
    pub files: Vec<String>,
}

/// Upload files to an update site
#[derive(Args, Debug)]
pub struct UploadCmd {
    /// Go through the motions without writing to the site
    #[arg(long)]
    pub simulate: bool,

    /// Site to upload to; inferred from the files when omitted
    #[arg(long, value_name = "NAME")]
    pub update_site: Option<String>,

    /// Permit uploads that shadow another site's entries
    #[arg(long)]
    pub force_shadow: bool,

    /// Drop dependencies that cannot be resolved instead of failing
    #[arg(long)]
    pub forget_missing_dependencies: bool,

    #[arg(value_name = "FILES", required = true)]
    pub files: Vec<String>,
}

/// Upload everything installed locally to one update site
///
/// Useful for maintaining a complete mirror. The target site must shadow
/// the sites it copies from.
#[derive(Args, Debug)]
pub struct UploadCompleteSiteCmd {
    /// Go through the motions without writing to the site
    #[arg(long)]
    pub simulate: bool,

    /// Also re-upload files the site already has at this version
    #[arg(long)]
    pub force: bool,

    /// Permit uploads that shadow another site's entries
    #[arg(long)]
    pub force_shadow: bool,

    /// Restrict the upload to files for these platforms
    #[arg(long, value_name = "LIST", value_delimiter = ',')]
    pub platforms: Vec<String>,

    /// Name of the update site
    #[arg(value_name = "SITE")]
    pub site: String,
}

/// List the configured update sites
#[derive(Args, Debug)]
pub struct ListUpdateSitesCmd {
    /// Display a header row
    #[arg(short = 'H', long)]
    pub header: bool,
}

/// Add an update site
#[derive(Args, Debug)]
pub struct AddUpdateSiteCmd {
    /// Name of the update site
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Base URL the catalog and payloads live under
    #[arg(value_name = "URL")]
    pub url: String,

    /// Upload transport address, e.g. 'file:/srv/site'
    #[arg(value_name = "HOST")]
    pub host: Option<String>,

    /// Directory on the host uploads are written to
    #[arg(value_name = "UPLOAD_DIRECTORY")]
    pub upload_directory: Option<String>,
}

/// Add several update sites in one go
#[derive(Args, Debug)]
pub struct AddUpdateSitesCmd {
    /// Alternating names and URLs: NAME1 URL1 NAME2 URL2 ...
    #[arg(value_name = "NAME_URL", required = true)]
    pub pairs: Vec<String>,
}

/// Change an update site's URL or upload coordinates
#[derive(Args, Debug)]
pub struct EditUpdateSiteCmd {
    #[arg(value_name = "NAME")]
    pub name: String,

    #[arg(value_name = "URL")]
    pub url: String,

    #[arg(value_name = "HOST")]
    pub host: Option<String>,

    #[arg(value_name = "UPLOAD_DIRECTORY")]
    pub upload_directory: Option<String>,
}

/// Remove update sites entirely
#[derive(Args, Debug)]
pub struct RemoveUpdateSiteCmd {
    #[arg(value_name = "NAME", required = true)]
    pub names: Vec<String>,
}

/// Deactivate update sites, keeping their configuration
#[derive(Args, Debug)]
pub struct DeactivateUpdateSiteCmd {
    #[arg(value_name = "NAME", required = true)]
    pub names: Vec<String>,
}

/// Re-read every active site's catalog
#[derive(Args, Debug)]
pub struct RefreshUpdateSitesCmd {
    /// Report what would change without installing anything
    #[arg(long)]
    pub simulate: bool,

    /// Bring every file up to date after refreshing
    #[arg(long)]
    pub updateall: bool,
}

/// Compare local files with their advertised current versions
#[derive(Args, Debug)]
pub struct DiffCmd {
    /// How to compare
    #[arg(
        value_enum,
        long,
        value_name = "MODE",
        default_value = "summary",
        ignore_case = true
    )]
    pub mode: DiffMode,

    #[arg(value_name = "FILES")]
    pub files: Vec<String>,
}

/// Show the version history of files
#[derive(Args, Debug)]
pub struct HistoryCmd {
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,
}

/// Install the newest versions at or before a given instant
#[derive(Args, Debug)]
pub struct DowngradeCmd {
    /// Report what would be downgraded without touching anything
    #[arg(long)]
    pub simulate: bool,

    /// 14-digit YYYYMMDDhhmmss instant to go back to
    #[arg(value_name = "TIMESTAMP")]
    pub timestamp: Timestamp,

    #[arg(value_name = "FILES")]
    pub files: Vec<String>,
}

/// Clear modified markers on files whose content still matches the catalog
///
/// Re-checksums modified files from scratch; files whose fresh digest
/// matches an advertised version again were never really changed.
#[derive(Args, Debug)]
pub struct RevertUnrealChangesCmd {
    /// Report the files without updating any state
    #[arg(long)]
    pub simulate: bool,

    #[arg(value_name = "FILES")]
    pub files: Vec<String>,
}

#[derive(ValueEnum, Debug, Copy, Clone, Eq, PartialEq)]
pub enum DiffMode {
    /// One line per file: identical or differing
    Summary,
    /// Compare byte counts
    Bytes,
    /// Compare archive entries member by member
    Entries,
}
