use std::collections::BTreeMap;
use std::fs;

use log::info;

use crate::cmd::opts::*;
use crate::cmd::table::{Cell, ColumnSpec, Table};
use crate::cmd::{
    print_conflicts, print_file_listings, println, ready, select_ids, Cmd, FileListing,
    GlobalArgs,
};
use crate::updater::{
    can_proceed, Action, ConsoleProgress, FileId, FileRecord, Progress, Result, SilentProgress,
    Status, UpdateError, UpdateManager, UpdatePolicy,
};

impl Cmd for ListCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        list_filtered(manager, args, &self.files, self.header, |_, _| true)
    }
}

impl Cmd for ListCurrentCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        list_filtered(manager, args, &self.files, false, |manager, id| {
            manager
                .collection()
                .winner(id)
                .map(|record| record.current.is_some())
                .unwrap_or(false)
        })
    }
}

impl Cmd for ListUptodateCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        list_filtered(manager, args, &self.files, false, |manager, id| {
            manager.collection().file(id).status == Status::Installed
        })
    }
}

impl Cmd for ListNotUptodateCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        list_filtered(manager, args, &self.files, false, |manager, id| {
            !matches!(
                manager.collection().file(id).status,
                Status::Installed | Status::NotInstalled | Status::ObsoleteUninstalled
            )
        })
    }
}

impl Cmd for ListUpdateableCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        list_filtered(manager, args, &self.files, false, |manager, id| {
            manager.collection().file(id).status == Status::Updateable
        })
    }
}

impl Cmd for ListModifiedCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        list_filtered(manager, args, &self.files, false, |manager, id| {
            matches!(
                manager.collection().file(id).status,
                Status::Modified | Status::ObsoleteModified
            )
        })
    }
}

impl Cmd for ListLocalOnlyCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        list_filtered(manager, args, &self.files, false, |manager, id| {
            manager.collection().file(id).status == Status::LocalOnly
        })
    }
}

impl Cmd for ListShadowedCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        list_filtered(manager, args, &self.files, false, |manager, id| {
            manager.collection().file(id).is_shadowing()
        })
    }
}

impl Cmd for ListFromSiteCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        if manager.collection().site(&self.site).is_none() {
            return Err(UpdateError::NotFound(format!("Update site {}", self.site)));
        }

        let site = self.site.clone();
        list_filtered(manager, args, &[], false, move |manager, id| {
            manager
                .collection()
                .winner(id)
                .map(|record| record.site == site)
                .unwrap_or(false)
        })
    }
}

impl Cmd for ShowCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        ready(manager, false, args.quiet)?;

        for id in select_ids(manager, &self.files)? {
            show_file(manager, id)?;
        }

        Ok(())
    }
}

impl Cmd for UpdateCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        update_command(
            manager,
            args,
            &self.files,
            UpdatePolicy::Default,
            self.simulate,
        )
    }
}

impl Cmd for UpdateForceCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        update_command(
            manager,
            args,
            &self.files,
            UpdatePolicy::Force,
            self.simulate,
        )
    }
}

impl Cmd for UpdateForcePristineCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        update_command(
            manager,
            args,
            &self.files,
            UpdatePolicy::ForcePristine,
            self.simulate,
        )
    }
}

impl Cmd for UploadCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        ready(manager, true, args.quiet)?;

        let ids = select_ids(manager, &self.files)?;
        let site = resolve_upload_site(manager, self.update_site.as_deref(), args, &ids)?;

        for &id in &ids {
            stage_upload(manager, id, &site, self.force_shadow)?;

            manager.refresh_dependencies(id)?;
            if self.forget_missing_dependencies {
                forget_missing_dependencies(manager, id);
            }
        }

        let conflicts = manager.conflicts(true);
        print_conflicts(&conflicts, args.quiet);
        if !can_proceed(&conflicts) {
            return Err(UpdateError::IllegalState(
                "Critical conflicts remain; resolve them first".to_string(),
            ));
        }

        if self.simulate {
            for &id in &ids {
                println(format!(
                    "Would upload {} to {}",
                    manager.collection().file(id).name,
                    site
                ))?;
            }
            return Ok(());
        }

        let timestamp = manager.upload(&site, progress(args).as_mut())?;
        println(format!("Uploaded {} files to {} at {}", ids.len(), site, timestamp))
    }
}

impl Cmd for UploadCompleteSiteCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        ready(manager, true, args.quiet)?;

        if manager.collection().site(&self.site).is_none() {
            return Err(UpdateError::NotFound(format!("Update site {}", self.site)));
        }

        let platforms = if self.platforms.is_empty() {
            vec![crate::updater::platform::current_platform().to_string()]
        } else {
            self.platforms.clone()
        };

        let mut staged = Vec::new();
        for id in manager.collection().ids() {
            let file = manager.collection().file(id);
            if file.local.digest.is_none() {
                continue;
            }

            let applies = manager
                .collection()
                .winner(id)
                .map(|record| {
                    platforms
                        .iter()
                        .any(|p| crate::updater::platform::applies_to(&record.platforms, p))
                })
                .unwrap_or(true);
            if !applies {
                continue;
            }

            // Skip files the site already has at exactly this version
            if !self.force {
                let up_to_date = manager
                    .collection()
                    .winner(id)
                    .map(|record| {
                        record.site == self.site
                            && record
                                .current
                                .as_ref()
                                .map(|current| file.local.matches(&current.checksum))
                                .unwrap_or(false)
                    })
                    .unwrap_or(false);
                if up_to_date {
                    continue;
                }
            }

            stage_upload(manager, id, &self.site, self.force_shadow)?;
            staged.push(id);
        }

        if staged.is_empty() {
            return println(format!("{} is complete; nothing to upload", self.site));
        }

        let conflicts = manager.conflicts(true);
        print_conflicts(&conflicts, args.quiet);
        if !can_proceed(&conflicts) {
            return Err(UpdateError::IllegalState(
                "Critical conflicts remain; resolve them first".to_string(),
            ));
        }

        if self.simulate {
            for &id in &staged {
                println(format!(
                    "Would upload {} to {}",
                    manager.collection().file(id).name,
                    self.site
                ))?;
            }
            return Ok(());
        }

        let timestamp = manager.upload(&self.site, progress(args).as_mut())?;
        println(format!(
            "Uploaded {} files to {} at {}",
            staged.len(),
            self.site,
            timestamp
        ))
    }
}

impl Cmd for ListUpdateSitesCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        let mut table = Table::new(
            vec![
                ColumnSpec::left("Name"),
                ColumnSpec::capped("URL", 60),
                ColumnSpec::left("Active"),
                ColumnSpec::left("Uploadable"),
                ColumnSpec::right("Timestamp"),
            ],
            self.header,
            !args.no_styles,
        );

        for site in manager.collection().sites() {
            table.row(vec![
                Cell::plain(site.name.as_str()),
                Cell::plain(site.url()),
                Cell::plain(if site.active { "yes" } else { "no" }),
                Cell::plain(if site.is_uploadable() { "yes" } else { "no" }),
                Cell::plain(
                    site.timestamp
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                ),
            ]);
        }

        Ok(table.print()?)
    }
}

impl Cmd for AddUpdateSiteCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        manager.collection_mut().add_site(&self.name, &self.url)?;
        if let Some(site) = manager.collection_mut().site_mut(&self.name) {
            site.host = self.host.clone();
            site.upload_directory = self.upload_directory.clone();
        }

        // Only the site declaration is persisted; the site's files stay
        // unseen until the next status-reading command and surface as new
        manager.write_local_catalog()?;

        if !args.quiet {
            println(format!("Added update site {}", self.name))?;
        }
        Ok(())
    }
}

impl Cmd for AddUpdateSitesCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        if self.pairs.len() % 2 != 0 {
            return Err(UpdateError::IllegalArgument(
                "add-update-sites takes alternating NAME URL pairs".to_string(),
            ));
        }

        for pair in self.pairs.chunks(2) {
            manager.collection_mut().add_site(&pair[0], &pair[1])?;
            if !args.quiet {
                println(format!("Added update site {}", pair[0]))?;
            }
        }

        manager.write_local_catalog()
    }
}

impl Cmd for EditUpdateSiteCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        {
            let site = manager
                .collection_mut()
                .site_mut(&self.name)
                .ok_or_else(|| UpdateError::NotFound(format!("Update site {}", self.name)))?;

            site.set_url(&self.url);
            if self.host.is_some() {
                site.host = self.host.clone();
            }
            if self.upload_directory.is_some() {
                site.upload_directory = self.upload_directory.clone();
            }
        }

        manager.write_local_catalog()?;

        if !args.quiet {
            println(format!("Edited update site {}", self.name))?;
        }
        Ok(())
    }
}

impl Cmd for RemoveUpdateSiteCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        for name in &self.names {
            let promoted = manager.collection_mut().remove_site(name)?;
            report_promotions(manager, &promoted, args)?;
            if !args.quiet {
                println(format!("Removed update site {}", name))?;
            }
        }

        manager.write_local_catalog()
    }
}

impl Cmd for DeactivateUpdateSiteCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        for name in &self.names {
            let promoted = manager.collection_mut().deactivate_site(name)?;
            report_promotions(manager, &promoted, args)?;
            if !args.quiet {
                println(format!("Deactivated update site {}", name))?;
            }
        }

        manager.write_local_catalog()
    }
}

impl Cmd for RefreshUpdateSitesCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        ready(manager, !self.simulate, args.quiet)?;

        if self.updateall {
            let staged = manager.stage_updates(UpdatePolicy::Default)?;

            if self.simulate {
                for &id in &staged {
                    let file = manager.collection().file(id);
                    println(format!("Would {} {}", file.action, file.name))?;
                }
                return Ok(());
            }

            if !staged.is_empty() {
                manager.install(progress(args).as_mut())?;
            }
        }

        if !self.simulate {
            manager.write_local_catalog()?;
        }
        Ok(())
    }
}

impl Cmd for DiffCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        ready(manager, false, args.quiet)?;

        for id in select_ids(manager, &self.files)? {
            diff_file(manager, id, self.mode)?;
        }

        Ok(())
    }
}

impl Cmd for HistoryCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        ready(manager, false, args.quiet)?;

        for id in select_ids(manager, &self.files)? {
            let file = manager.collection().file(id);
            let record = match manager.collection().winner(id) {
                Some(record) => record,
                None => {
                    println(format!("{}: local only, no history", file.name))?;
                    continue;
                }
            };

            println(&file.name)?;
            if let Some(current) = &record.current {
                println(format!("* {} {}", current.timestamp, current.checksum))?;
            }
            for previous in record.previous.iter().rev() {
                let mut line = format!("  {} {}", previous.timestamp, previous.checksum);
                if let Some(filename) = &previous.filename {
                    line.push_str(&format!(" (as {})", filename));
                }
                if let Some(obsolete) = previous.timestamp_obsolete {
                    line.push_str(&format!(" (obsoleted {})", obsolete));
                }
                println(line)?;
            }
        }

        Ok(())
    }
}

impl Cmd for DowngradeCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        ready(manager, true, args.quiet)?;

        let ids = select_ids(manager, &self.files)?;

        if self.simulate {
            for &id in &ids {
                let record = match manager.collection().winner(id) {
                    Some(record) => record,
                    None => continue,
                };
                let candidate = record
                    .current
                    .iter()
                    .chain(record.previous.iter())
                    .filter(|v| v.timestamp <= self.timestamp)
                    .max_by_key(|v| v.timestamp);

                if let Some(version) = candidate {
                    println(format!(
                        "Would install {} at {}",
                        manager.collection().file(id).name,
                        version.timestamp
                    ))?;
                }
            }
            return Ok(());
        }

        let downgraded = manager.downgrade(self.timestamp, &ids, progress(args).as_mut())?;
        manager.write_local_catalog()?;
        println(format!("Downgraded {} files", downgraded.len()))
    }
}

impl Cmd for RevertUnrealChangesCmd {
    fn exec(&self, manager: &mut UpdateManager, args: &GlobalArgs) -> Result<()> {
        ready(manager, false, args.quiet)?;

        let ids = select_ids(manager, &self.files)?;
        let reverted = manager.revert_unreal_changes(&ids, self.simulate)?;

        if reverted.is_empty() {
            return println("Every modification is real");
        }

        for name in &reverted {
            if self.simulate {
                println(format!("Would revert {}", name))?;
            } else {
                println(format!("Reverted {}", name))?;
            }
        }

        if !self.simulate {
            manager.write_local_catalog()?;
        }
        Ok(())
    }
}

// ---- helpers ----

fn progress(args: &GlobalArgs) -> Box<dyn Progress> {
    if args.quiet {
        Box::new(SilentProgress)
    } else {
        Box::new(ConsoleProgress::new())
    }
}

fn list_filtered(
    manager: &mut UpdateManager,
    args: &GlobalArgs,
    patterns: &[String],
    header: bool,
    predicate: impl Fn(&UpdateManager, FileId) -> bool,
) -> Result<()> {
    ready(manager, false, args.quiet)?;

    let mut ids = match select_ids(manager, patterns) {
        Ok(ids) => ids,
        Err(UpdateError::NotFound(_)) => Vec::new(),
        Err(e) => return Err(e),
    };
    ids.retain(|&id| predicate(manager, id));

    let mut listings: Vec<FileListing> = ids
        .iter()
        .map(|&id| FileListing::from_manager(manager, id))
        .collect();
    listings.sort_by(|a, b| natord::compare(&a.name, &b.name));

    print_file_listings(&listings, header, args.no_styles)
}

fn show_file(manager: &UpdateManager, id: FileId) -> Result<()> {
    let file = manager.collection().file(id);

    println(format!("{:width$} {}", "Name:", file.name, width = 12))?;
    println(format!("{:width$} {}", "Status:", file.status, width = 12))?;
    println(format!("{:width$} {}", "Action:", file.action, width = 12))?;

    if let Some(filename) = &file.local.filename {
        if *filename != file.name {
            println(format!("{:width$} {}", "Local name:", filename, width = 12))?;
        }
    }

    for record in manager.collection().stacked_records(id) {
        show_record(manager, record)?;
    }

    println("")
}

fn show_record(manager: &UpdateManager, record: &FileRecord) -> Result<()> {
    let shadowed = manager
        .collection()
        .site(&record.site)
        .map(|site| !site.active)
        .unwrap_or(false);

    println(format!(
        "{:width$} {}{}",
        "Site:",
        record.site,
        if shadowed { " (inactive)" } else { "" },
        width = 12
    ))?;

    if let Some(current) = &record.current {
        println(format!(
            "{:width$} {} ({} bytes, {})",
            "Current:",
            current.timestamp,
            record.filesize,
            current.checksum,
            width = 12
        ))?;
    }
    if !record.previous.is_empty() {
        println(format!(
            "{:width$} {}",
            "Previous:",
            record.previous.len(),
            width = 12
        ))?;
    }
    if let Some(description) = &record.description {
        println(format!("{:width$} {}", "Description:", description, width = 12))?;
    }
    if !record.dependencies.is_empty() {
        let deps: Vec<&str> = record
            .dependencies
            .iter()
            .map(|d| d.filename.as_str())
            .collect();
        println(format!("{:width$} {}", "Depends on:", deps.join(", "), width = 12))?;
    }
    if !record.authors.is_empty() {
        println(format!(
            "{:width$} {}",
            "Authors:",
            record.authors.join(", "),
            width = 12
        ))?;
    }
    if !record.platforms.is_empty() {
        let platforms: Vec<&str> = record.platforms.iter().map(String::as_str).collect();
        println(format!(
            "{:width$} {}",
            "Platforms:",
            platforms.join(", "),
            width = 12
        ))?;
    }

    Ok(())
}

fn update_command(
    manager: &mut UpdateManager,
    args: &GlobalArgs,
    patterns: &[String],
    policy: UpdatePolicy,
    simulate: bool,
) -> Result<()> {
    ready(manager, true, args.quiet)?;

    let ids = match select_ids(manager, patterns) {
        Ok(ids) => ids,
        Err(UpdateError::NotFound(_)) if patterns.is_empty() => Vec::new(),
        Err(e) => return Err(e),
    };

    // Locally modified files are respected unless forced
    if policy == UpdatePolicy::Default {
        let modified: Vec<FileId> = ids
            .iter()
            .copied()
            .filter(|&id| {
                matches!(
                    manager.collection().file(id).status,
                    Status::Modified | Status::ObsoleteModified
                )
            })
            .collect();

        for id in modified {
            let file = manager.collection().file(id);
            println(format!(
                "Error: {} is locally modified; use update-force to overwrite",
                file.name
            ))?;
        }
    }

    let staged = manager.stage_updates_for(&ids, policy)?;

    if staged.is_empty() {
        return println("Already up to date");
    }

    let conflicts = manager.conflicts(false);
    print_conflicts(&conflicts, args.quiet);
    if !can_proceed(&conflicts) {
        return Err(UpdateError::IllegalState(
            "Critical conflicts remain; resolve them first".to_string(),
        ));
    }

    if simulate {
        for &id in &staged {
            let file = manager.collection().file(id);
            println(format!("Would {} {}", file.action, file.name))?;
        }
        return Ok(());
    }

    manager.install(progress(args).as_mut())?;

    info!("Updated {} files", staged.len());
    println(format!("Updated {} files", staged.len()))
}

fn resolve_upload_site(
    manager: &UpdateManager,
    explicit: Option<&str>,
    args: &GlobalArgs,
    ids: &[FileId],
) -> Result<String> {
    if let Some(site) = explicit {
        return Ok(site.to_string());
    }
    if let Some(site) = &args.config.update_site {
        return Ok(site.clone());
    }

    // Infer from the owning sites of the named files
    let mut inferred: Option<String> = None;
    for &id in ids {
        let site = manager
            .collection()
            .winner(id)
            .map(|record| record.site.clone());

        match (&inferred, site) {
            (None, Some(site)) => inferred = Some(site),
            (Some(existing), Some(site)) if *existing != site => {
                return Err(UpdateError::IllegalArgument(format!(
                    "Files belong to different update sites ({}, {}); use --update-site",
                    existing, site
                )))
            }
            _ => {}
        }
    }

    inferred.ok_or_else(|| {
        UpdateError::IllegalArgument(
            "Cannot infer the update site; use --update-site".to_string(),
        )
    })
}

fn stage_upload(
    manager: &mut UpdateManager,
    id: FileId,
    site: &str,
    force_shadow: bool,
) -> Result<()> {
    let winner_site = manager
        .collection()
        .winner(id)
        .map(|record| record.site.clone());

    if winner_site.as_deref() != Some(site) {
        if winner_site.is_some() && !force_shadow {
            let file = manager.collection().file(id);
            return Err(UpdateError::IllegalState(format!(
                "Uploading {} to {} would shadow {}; use --force-shadow",
                file.name,
                site,
                winner_site.unwrap()
            )));
        }

        if !manager.collection().has_record_for(id, site) {
            let name = manager.collection().file(id).name.clone();
            manager
                .collection_mut()
                .insert_record(FileRecord::new(site, name))?;
        }

        // The target site must now own the file, otherwise it is outranked
        let owner = manager
            .collection()
            .winner(id)
            .map(|record| record.site.clone());
        if owner.as_deref() != Some(site) {
            let file = manager.collection().file(id);
            return Err(UpdateError::IllegalState(format!(
                "{} cannot shadow {}, which outranks it, for {}",
                site,
                owner.unwrap_or_default(),
                file.name
            )));
        }
    } else if manager.collection().file(id).is_shadowing() && !force_shadow {
        let file = manager.collection().file(id);
        if file
            .local
            .filename
            .as_deref()
            .map(|local| local != file.name)
            .unwrap_or(false)
        {
            return Err(UpdateError::IllegalState(format!(
                "{} shadows another site's entry under a different local name; \
                 use --force-shadow",
                file.name
            )));
        }
    }

    manager.collection_mut().set_action(id, Action::Upload)
}

fn forget_missing_dependencies(manager: &mut UpdateManager, id: FileId) {
    let missing: Vec<String> = manager
        .collection()
        .winner(id)
        .map(|record| {
            record
                .dependencies
                .iter()
                .filter(|dep| manager.collection().get(&dep.filename).is_none())
                .map(|dep| dep.filename.clone())
                .collect()
        })
        .unwrap_or_default();

    if let Some(record) = manager.collection_mut().winner_mut(id) {
        record
            .dependencies
            .retain(|dep| !missing.contains(&dep.filename));
    }
}

fn report_promotions(
    manager: &UpdateManager,
    promoted: &[FileId],
    args: &GlobalArgs,
) -> Result<()> {
    if args.quiet {
        return Ok(());
    }

    for &id in promoted {
        let file = manager.collection().file(id);
        println(format!(
            "{} now comes from {} and has an update pending",
            file.name,
            manager
                .collection()
                .winner(id)
                .map(|record| record.site.as_str())
                .unwrap_or("-")
        ))?;
    }

    Ok(())
}

fn diff_file(manager: &UpdateManager, id: FileId, mode: DiffMode) -> Result<()> {
    let file = manager.collection().file(id);
    let name = file.name.clone();

    let record = match manager.collection().winner(id) {
        Some(record) => record,
        None => return println(format!("{}: local only", name)),
    };
    let current = match &record.current {
        Some(current) => current.clone(),
        None => return println(format!("{}: no current version", name)),
    };

    if !file.is_installed_locally() {
        return println(format!("{}: not installed", name));
    }

    let local_path = manager.root().join(file.local_filename());

    match mode {
        DiffMode::Summary => {
            if file.local.matches(&current.checksum) {
                println(format!("{}: identical", name))
            } else {
                println(format!("{}: differs", name))
            }
        }
        DiffMode::Bytes => {
            let local_size = local_path.metadata()?.len();
            if local_size == record.filesize {
                println(format!("{}: {} bytes on both sides", name, local_size))
            } else {
                println(format!(
                    "{}: {} bytes locally, {} in the catalog",
                    name, local_size, record.filesize
                ))
            }
        }
        DiffMode::Entries => {
            if !name.ends_with(".jar") {
                return println(format!("{}: not an archive; use --mode bytes", name));
            }

            let remote_bytes = manager.fetch_current_payload(id)?;
            let local = archive_entry_crcs(&fs::read(&local_path)?)?;
            let remote = archive_entry_crcs(&remote_bytes)?;
            print_entry_diff(&name, &local, &remote)
        }
    }
}

fn archive_entry_crcs(bytes: &[u8]) -> Result<BTreeMap<String, u32>> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))?;
    let mut entries = BTreeMap::new();

    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if !entry.name().ends_with('/') {
            entries.insert(entry.name().to_string(), entry.crc32());
        }
    }

    Ok(entries)
}

fn print_entry_diff(
    name: &str,
    local: &BTreeMap<String, u32>,
    remote: &BTreeMap<String, u32>,
) -> Result<()> {
    let mut differences = 0;

    for (entry, crc) in local {
        match remote.get(entry) {
            None => {
                println(format!("{}: only local: {}", name, entry))?;
                differences += 1;
            }
            Some(remote_crc) if remote_crc != crc => {
                println(format!("{}: differs: {}", name, entry))?;
                differences += 1;
            }
            _ => {}
        }
    }
    for entry in remote.keys() {
        if !local.contains_key(entry) {
            println(format!("{}: only remote: {}", name, entry))?;
            differences += 1;
        }
    }

    if differences == 0 {
        println(format!("{}: all entries identical", name))?;
    }
    Ok(())
}
