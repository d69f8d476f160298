// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{Arg, ArgAction, Command, value_parser};
use std::path::PathBuf;

fn json_flags() -> [Arg; 2] {
    [
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Print as pretty JSON"),
        Arg::new("jsonl")
            .long("jsonl")
            .action(ArgAction::SetTrue)
            .conflicts_with("json")
            .help("Print as JSON lines"),
    ]
}

fn as_of() -> Arg {
    Arg::new("as-of")
        .long("as-of")
        .value_name("YYYY-MM-DD")
        .help("Only count entries on or before this date")
}

fn month(required: bool) -> Arg {
    Arg::new("month")
        .long("month")
        .value_name("YYYY-MM")
        .required(required)
}

fn amount(id: &'static str) -> Arg {
    Arg::new(id).required(true).allow_negative_numbers(true)
}

pub fn build_cli() -> Command {
    Command::new("ledgerplan")
        .about("Double-entry ledger with budgets, fixed expenses and card tracking")
        .version(clap::crate_version!())
        .arg(
            Arg::new("db")
                .long("db")
                .global(true)
                .env("LEDGERPLAN_DB")
                .value_parser(value_parser!(PathBuf))
                .help("Database file (defaults to the platform data dir)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::Count)
                .help("Increase log verbosity (-v info, -vv debug)"),
        )
        .subcommand(
            Command::new("init")
                .about("Create the database and set the display currency")
                .arg(Arg::new("currency").long("currency").value_name("CCY")),
        )
        .subcommand(
            Command::new("category")
                .about("Account categories")
                .subcommand_required(true)
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("name").required(true))
                        .arg(
                            Arg::new("type")
                                .required(true)
                                .help("asset|liability|equity|income|expense"),
                        )
                        .arg(Arg::new("description").long("description"))
                        .arg(Arg::new("color").long("color"))
                        .arg(
                            Arg::new("order")
                                .long("order")
                                .value_parser(value_parser!(i64))
                                .default_value("0"),
                        ),
                )
                .subcommand(Command::new("list")),
        )
        .subcommand(
            Command::new("account")
                .about("Accounts")
                .subcommand_required(true)
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("name").required(true))
                        .arg(Arg::new("category").long("category").required(true))
                        .arg(Arg::new("description").long("description"))
                        .arg(
                            Arg::new("budget")
                                .long("budget")
                                .help("Budget category fed by this account"),
                        ),
                )
                .subcommand(
                    Command::new("list").arg(
                        Arg::new("all")
                            .long("all")
                            .action(ArgAction::SetTrue)
                            .help("Include inactive accounts"),
                    ),
                )
                .subcommand(
                    Command::new("deactivate")
                        .arg(Arg::new("name").required(true))
                        .arg(as_of()),
                ),
        )
        .subcommand(
            Command::new("tx")
                .about("Ledger transactions")
                .subcommand_required(true)
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("date").long("date").required(true))
                        .arg(Arg::new("description").required(true))
                        .arg(
                            Arg::new("debit")
                                .long("debit")
                                .value_name("ACCOUNT=AMOUNT")
                                .action(ArgAction::Append),
                        )
                        .arg(
                            Arg::new("credit")
                                .long("credit")
                                .value_name("ACCOUNT=AMOUNT")
                                .action(ArgAction::Append),
                        )
                        .arg(Arg::new("card").long("card").help("Card used for this transaction")),
                )
                .subcommand(
                    Command::new("list")
                        .arg(month(false))
                        .arg(Arg::new("account").long("account"))
                        .arg(
                            Arg::new("limit")
                                .long("limit")
                                .value_parser(value_parser!(usize)),
                        )
                        .args(json_flags()),
                )
                .subcommand(
                    Command::new("show")
                        .arg(Arg::new("id").required(true).value_parser(value_parser!(i64)))
                        .arg(Arg::new("json").long("json").action(ArgAction::SetTrue)),
                )
                .subcommand(
                    Command::new("correct")
                        .about("Change the date or description of a transaction")
                        .arg(Arg::new("id").required(true).value_parser(value_parser!(i64)))
                        .arg(Arg::new("date").long("date"))
                        .arg(Arg::new("description").long("description")),
                ),
        )
        .subcommand(
            Command::new("balance")
                .about("Balances and net worth")
                .subcommand_required(true)
                .subcommand(
                    Command::new("account")
                        .arg(Arg::new("name").required(true))
                        .arg(as_of()),
                )
                .subcommand(Command::new("all").arg(as_of()).args(json_flags()))
                .subcommand(Command::new("networth").arg(as_of()).args(json_flags()))
                .subcommand(Command::new("overview").arg(as_of()).args(json_flags()))
                .subcommand(
                    Command::new("cashflow")
                        .arg(month(true))
                        .args(json_flags()),
                ),
        )
        .subcommand(
            Command::new("budget")
                .about("Monthly spending plans")
                .subcommand_required(true)
                .subcommand(
                    Command::new("add-category")
                        .arg(Arg::new("name").required(true))
                        .arg(Arg::new("color").long("color"))
                        .arg(Arg::new("icon").long("icon"))
                        .arg(
                            Arg::new("order")
                                .long("order")
                                .value_parser(value_parser!(i64))
                                .default_value("0"),
                        ),
                )
                .subcommand(Command::new("categories"))
                .subcommand(
                    Command::new("set")
                        .arg(month(true))
                        .arg(Arg::new("category").long("category").required(true))
                        .arg(amount("amount")),
                )
                .subcommand(Command::new("income").arg(month(true)).arg(amount("amount")))
                .subcommand(Command::new("show").arg(month(true)).args(json_flags()))
                .subcommand(
                    Command::new("report")
                        .about("Planned against actual per category")
                        .arg(month(true))
                        .args(json_flags()),
                ),
        )
        .subcommand(
            Command::new("fixed")
                .about("Recurring fixed expenses")
                .subcommand_required(true)
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("name").required(true))
                        .arg(amount("amount"))
                        .arg(Arg::new("category").long("category").required(true))
                        .arg(
                            Arg::new("frequency")
                                .long("frequency")
                                .default_value("monthly")
                                .help("monthly|annual"),
                        )
                        .arg(Arg::new("start").long("start").required(true))
                        .arg(Arg::new("end").long("end"))
                        .arg(Arg::new("description").long("description")),
                )
                .subcommand(Command::new("list").args(json_flags()))
                .subcommand(
                    Command::new("activate")
                        .arg(Arg::new("id").required(true).value_parser(value_parser!(i64))),
                )
                .subcommand(
                    Command::new("deactivate")
                        .arg(Arg::new("id").required(true).value_parser(value_parser!(i64))),
                )
                .subcommand(Command::new("summary").arg(month(true)).args(json_flags())),
        )
        .subcommand(
            Command::new("card")
                .about("Cards and monthly usage")
                .subcommand_required(true)
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("name").required(true))
                        .arg(
                            Arg::new("type")
                                .long("type")
                                .default_value("credit")
                                .help("credit|debit"),
                        )
                        .arg(Arg::new("issuer").long("issuer").required(true))
                        .arg(Arg::new("last4").long("last4").required(true))
                        .arg(Arg::new("limit").long("limit"))
                        .arg(Arg::new("account").long("account"))
                        .arg(Arg::new("color").long("color")),
                )
                .subcommand(Command::new("list").args(json_flags()))
                .subcommand(
                    Command::new("link")
                        .arg(Arg::new("tx").required(true).value_parser(value_parser!(i64)))
                        .arg(Arg::new("card").required(true)),
                )
                .subcommand(
                    Command::new("unlink")
                        .arg(Arg::new("tx").required(true).value_parser(value_parser!(i64)))
                        .arg(Arg::new("card").required(true)),
                )
                .subcommand(Command::new("summary").arg(month(true)).args(json_flags())),
        )
        .subcommand(
            Command::new("portfolio")
                .about("Investment assets")
                .subcommand_required(true)
                .subcommand(
                    Command::new("add-asset")
                        .arg(Arg::new("symbol").required(true))
                        .arg(Arg::new("name").required(true))
                        .arg(
                            Arg::new("kind")
                                .long("kind")
                                .default_value("stock")
                                .help("stock|etf|bond|crypto|currency|other"),
                        )
                        .arg(Arg::new("currency").long("currency")),
                )
                .subcommand(Command::new("list-assets").args(json_flags()))
                .subcommand(
                    Command::new("price")
                        .arg(Arg::new("symbol").required(true))
                        .arg(amount("price"))
                        .arg(Arg::new("date").long("date")),
                )
                .subcommand(trade_command("buy"))
                .subcommand(trade_command("sell"))
                .subcommand(
                    Command::new("dividend")
                        .arg(Arg::new("symbol").required(true))
                        .arg(amount("amount"))
                        .arg(Arg::new("ex-date").long("ex-date").required(true))
                        .arg(Arg::new("pay-date").long("pay-date")),
                )
                .subcommand(Command::new("positions").args(json_flags()))
                .subcommand(Command::new("summary").args(json_flags()))
                .subcommand(
                    Command::new("snapshot")
                        .about("Store today's (or --date's) total portfolio value")
                        .arg(Arg::new("date").long("date")),
                )
                .subcommand(Command::new("snapshots").args(json_flags())),
        )
        .subcommand(
            Command::new("audit")
                .about("Recent changes")
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .value_parser(value_parser!(usize))
                        .default_value("20"),
                )
                .args(json_flags()),
        )
        .subcommand(
            Command::new("export")
                .about("Export data")
                .subcommand_required(true)
                .subcommand(
                    Command::new("journal")
                        .arg(
                            Arg::new("format")
                                .long("format")
                                .default_value("csv")
                                .help("csv|json"),
                        )
                        .arg(Arg::new("out").long("out").required(true)),
                ),
        )
        .subcommand(
            Command::new("doctor")
                .about("Check stored data for inconsistencies")
                .args(json_flags()),
        )
}

fn trade_command(side: &'static str) -> Command {
    Command::new(side)
        .arg(Arg::new("symbol").required(true))
        .arg(amount("quantity"))
        .arg(amount("price"))
        .arg(Arg::new("date").long("date").required(true))
        .arg(Arg::new("description").long("description"))
}
