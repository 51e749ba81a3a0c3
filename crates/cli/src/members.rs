//! Roster browsing and single-member commands.

use std::io;
use std::path::PathBuf;

use serde::Serialize;

use drg_recon::roster::{self, MemberEdit};
use drg_recon::{MemberKey, MemberRecord, MemberSnapshot, Rank, RosterRead};

use crate::exit_codes::EXIT_ERROR;
use crate::{print_json, CliError, Context};

/// JSON shape of one member: stored fields plus progress since first seen.
#[derive(Serialize)]
struct MemberView<'a> {
    key: &'a str,
    display_name: &'a str,
    rank: Rank,
    level_start: u32,
    level_current: u32,
    level_delta: i64,
    power_start: u64,
    power_current: u64,
    power_delta: i64,
}

impl<'a> From<&'a MemberRecord> for MemberView<'a> {
    fn from(r: &'a MemberRecord) -> Self {
        Self {
            key: r.key().as_str(),
            display_name: r.display_name(),
            rank: r.rank(),
            level_start: r.level_start(),
            level_current: r.level_current(),
            level_delta: r.level_delta(),
            power_start: r.power_start(),
            power_current: r.power_current(),
            power_delta: r.power_delta(),
        }
    }
}

fn parse_key(raw: &str) -> Result<MemberKey, CliError> {
    MemberKey::new(raw).map_err(CliError::invalid)
}

pub fn cmd_list(ctx: &Context, json: bool) -> Result<(), CliError> {
    let store = ctx.open_store()?;
    let records = store.list_all().map_err(CliError::store)?;

    if json {
        let views: Vec<MemberView> = records.iter().map(MemberView::from).collect();
        return print_json(&views);
    }

    if records.is_empty() {
        println!("roster is empty");
        return Ok(());
    }
    println!(
        "{:<16} {:<20} {:<4} {:>5} {:>6} {:>14} {:>12}",
        "KEY", "NAME", "RANK", "LEVEL", "+LVL", "POWER", "+POWER"
    );
    for r in &records {
        println!(
            "{:<16} {:<20} {:<4} {:>5} {:>+6} {:>14} {:>+12}",
            r.key().as_str(),
            r.display_name(),
            r.rank(),
            r.level_current(),
            r.level_delta(),
            r.power_current(),
            r.power_delta(),
        );
    }
    println!("{} members", records.len());
    Ok(())
}

pub fn cmd_show(ctx: &Context, key: &str, json: bool) -> Result<(), CliError> {
    let key = parse_key(key)?;
    let store = ctx.open_store()?;
    let record = store.get(&key).map_err(CliError::store)?;

    if json {
        return print_json(&MemberView::from(&record));
    }
    println!("key:    {}", record.key());
    println!("name:   {}", record.display_name());
    println!("rank:   {}", record.rank());
    println!(
        "level:  {} (started at {}, {:+})",
        record.level_current(),
        record.level_start(),
        record.level_delta()
    );
    println!(
        "power:  {} (started at {}, {:+})",
        record.power_current(),
        record.power_start(),
        record.power_delta()
    );
    Ok(())
}

pub fn cmd_add(
    ctx: &Context,
    key: &str,
    name: &str,
    rank: &str,
    level: &str,
    power: &str,
) -> Result<(), CliError> {
    let snapshot = MemberSnapshot::from_fields(key, name, rank, level, power).map_err(CliError::invalid)?;
    let store = ctx.open_store()?;
    let record = roster::add_member(&store, &snapshot).map_err(CliError::store)?;
    println!("added {} ({})", record.key(), record.display_name());
    Ok(())
}

pub struct EditArgs {
    pub name: Option<String>,
    pub rank: Option<String>,
    pub level: Option<String>,
    pub power: Option<String>,
    pub record_changes: bool,
}

pub fn cmd_edit(ctx: &Context, key: &str, args: EditArgs) -> Result<(), CliError> {
    let key = parse_key(key)?;
    let edit = MemberEdit::parse(
        args.name.as_deref(),
        args.rank.as_deref(),
        args.level.as_deref(),
        args.power.as_deref(),
    )
    .map_err(CliError::invalid)?;
    if edit.is_empty() {
        return Err(CliError::usage("nothing to change").with_hint("pass --name, --rank, --level or --power"));
    }

    let record_changes = args.record_changes || ctx.settings.import.record_changes;
    let store = ctx.open_store()?;
    let record = roster::edit_member(&store, &key, &edit, record_changes).map_err(CliError::store)?;
    println!(
        "{}: {} {} level {} power {}",
        record.key(),
        record.display_name(),
        record.rank(),
        record.level_current(),
        record.power_current()
    );
    Ok(())
}

pub fn cmd_remove(ctx: &Context, key: &str) -> Result<(), CliError> {
    let key = parse_key(key)?;
    let store = ctx.open_store()?;
    let record = roster::remove_member(&store, &key).map_err(CliError::store)?;
    println!("removed {} ({})", record.key(), record.display_name());
    Ok(())
}

pub fn cmd_history(ctx: &Context, key: &str, json: bool) -> Result<(), CliError> {
    let key = parse_key(key)?;
    let store = ctx.open_store()?;
    let entries = roster::history(&store, &key).map_err(CliError::store)?;

    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("no recorded changes for {key}");
        return Ok(());
    }
    for e in &entries {
        let mut line = format!(
            "{}  rank {} -> {}  level {} -> {} ({:+})  power {} -> {} ({:+})",
            e.recorded_at.format("%Y-%m-%d %H:%M"),
            e.rank_old,
            e.rank_new,
            e.level_old,
            e.level_new,
            e.level_delta(),
            e.power_old,
            e.power_new,
            e.power_delta(),
        );
        if e.renamed() {
            line.push_str(&format!("  name '{}' -> '{}'", e.display_name_old, e.display_name));
        }
        println!("{line}");
    }
    Ok(())
}

pub fn cmd_export(ctx: &Context, output: Option<PathBuf>) -> Result<(), CliError> {
    let store = ctx.open_store()?;
    let records = store.list_all().map_err(CliError::store)?;

    match output {
        Some(path) => {
            drg_io::csv::export_roster_to_path(&records, &path, true)
                .map_err(|e| CliError::new(EXIT_ERROR, format!("cannot write {}: {e}", path.display())))?;
            eprintln!("wrote {} members to {}", records.len(), path.display());
        }
        None => {
            drg_io::csv::export_roster(&records, io::stdout().lock(), true)
                .map_err(|e| CliError::new(EXIT_ERROR, e))?;
        }
    }
    Ok(())
}
