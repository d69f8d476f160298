// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ledgerplan::{cli, commands, db, utils};

fn init_logger(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = cli::build_cli();
    let matches = cli.get_matches();
    init_logger(matches.get_count("verbose"));

    let db_arg = matches.get_one::<PathBuf>("db");
    let mut conn = db::open_or_init(db_arg.map(PathBuf::as_path))?;

    match matches.subcommand() {
        Some(("init", sub)) => {
            if let Some(ccy) = sub.get_one::<String>("currency") {
                utils::set_currency(&conn, ccy)?;
            }
            let path = match db_arg {
                Some(p) => p.clone(),
                None => db::db_path()?,
            };
            println!(
                "Database initialized at {} (currency {})",
                path.display(),
                utils::get_currency(&conn)?
            );
        }
        Some(("category", sub)) => commands::categories::handle(&conn, sub)?,
        Some(("account", sub)) => commands::accounts::handle(&conn, sub)?,
        Some(("tx", sub)) => commands::transactions::handle(&mut conn, sub)?,
        Some(("balance", sub)) => commands::reports::handle(&conn, sub)?,
        Some(("budget", sub)) => commands::budgets::handle(&mut conn, sub)?,
        Some(("fixed", sub)) => commands::fixed::handle(&conn, sub)?,
        Some(("card", sub)) => commands::cards::handle(&mut conn, sub)?,
        Some(("portfolio", sub)) => commands::portfolio::handle(&mut conn, sub)?,
        Some(("audit", sub)) => commands::audit::handle(&conn, sub)?,
        Some(("export", sub)) => commands::exporter::handle(&conn, sub)?,
        Some(("doctor", sub)) => commands::doctor::handle(&conn, sub)?,
        _ => {
            cli::build_cli().print_help()?;
            println!();
        }
    }
    Ok(())
}
