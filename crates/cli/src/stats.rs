//! `drg stats` - power and progress rankings.

use serde::Serialize;

use drg_recon::stats::{Order, RosterStats, RosterSummary, StatEntry};

use crate::{print_json, CliError, Context};

#[derive(Serialize)]
struct StatsOutput {
    summary: RosterSummary,
    top_power: Vec<StatEntry>,
    lowest_power: Vec<StatEntry>,
    most_power_gained: Vec<StatEntry>,
    least_power_gained: Vec<StatEntry>,
    least_level_progress: Vec<StatEntry>,
}

pub fn cmd_stats(ctx: &Context, top: Option<usize>, json: bool) -> Result<(), CliError> {
    let n = top.unwrap_or(ctx.settings.stats.top_n);
    if n == 0 {
        return Err(CliError::usage("-n must be at least 1"));
    }

    let store = ctx.open_store()?;
    let stats = RosterStats::load(&store).map_err(CliError::store)?;
    let output = StatsOutput {
        summary: stats.summary(),
        top_power: stats.top_power(n),
        lowest_power: stats.lowest_power(n),
        most_power_gained: stats.power_gain(n, Order::Descending),
        least_power_gained: stats.power_gain(n, Order::Ascending),
        least_level_progress: stats.least_level_progress(n),
    };

    if json {
        return print_json(&output);
    }

    println!(
        "{} members, total power {}",
        output.summary.members, output.summary.total_power
    );
    print_view("Top power", &output.top_power, false);
    print_view("Lowest power", &output.lowest_power, false);
    print_view("Most power gained", &output.most_power_gained, true);
    print_view("Least power gained", &output.least_power_gained, true);
    print_view("Least level progress", &output.least_level_progress, true);
    Ok(())
}

fn print_view(title: &str, entries: &[StatEntry], signed: bool) {
    println!();
    println!("{title}");
    for (i, e) in entries.iter().enumerate() {
        if signed {
            println!("  {:>2}. {:<20} {:>+14}", i + 1, e.display_name, e.value);
        } else {
            println!("  {:>2}. {:<20} {:>14}", i + 1, e.display_name, e.value);
        }
    }
}
