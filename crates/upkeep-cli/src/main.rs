// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod runtime;

use anyhow::{Context, Result, anyhow, bail};
use config::Config;
use runtime::{Command, ItemChoice, Runtime};
use std::env;
use std::path::PathBuf;
use time::OffsetDateTime;
use tracing::info;
use upkeep_app::{
    BundleEngine, BundleRecordId, BundleStatus, CandidateId, CompatibilityTable, WorkItemId,
};
use upkeep_catalog::CatalogClient;
use upkeep_db::{BundleLedger, Store};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `upkeep --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;

    let db_path = if options.demo {
        PathBuf::from(":memory:")
    } else {
        config.db_path()?
    };
    if options.print_db_path {
        println!("{}", db_path.display());
        return Ok(());
    }

    let store = Store::open(&db_path).with_context(|| {
        format!(
            "open database {} -- if this path is wrong, set [storage].db_path or UPKEEP_DB_PATH",
            db_path.display()
        )
    })?;
    store.bootstrap()?;

    let catalog = if options.demo || !config.catalog_enabled() {
        None
    } else {
        Some(
            CatalogClient::new(config.catalog_base_url(), config.catalog_timeout()?).with_context(
                || {
                    format!(
                        "invalid [catalog] config in {}; fix base_url/timeout values",
                        options.config_path.display()
                    )
                },
            )?,
        )
    };
    if options.check_only {
        info!(
            config = %options.config_path.display(),
            db = %db_path.display(),
            catalog = catalog.as_ref().map_or("disabled", CatalogClient::base_url),
            "startup checks passed"
        );
        return Ok(());
    }

    let engine = BundleEngine::new(config.bundling_policy(), CompatibilityTable::default());
    let mut runtime = Runtime::new(engine, catalog, BundleLedger::new(store));
    let command = options
        .command
        .unwrap_or(Command::Generate { seeds: Vec::new() });
    let output = runtime.execute(&command, OffsetDateTime::now_utc())?;
    print!("{output}");
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_db_path: bool,
    demo: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
    command: Option<Command>,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        print_db_path: false,
        demo: false,
        print_example: false,
        check_only: false,
        show_help: false,
        command: None,
    };

    let mut command_name: Option<String> = None;
    let mut positionals: Vec<String> = Vec::new();
    let mut seeds: Vec<WorkItemId> = Vec::new();
    let mut items: Vec<WorkItemId> = Vec::new();
    let mut all_items = false;
    let mut status: Option<BundleStatus> = None;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--seed" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--seed requires a work item id"))?;
                seeds.push(WorkItemId::new(value.as_ref().trim()));
            }
            "--item" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--item requires a work item id"))?;
                items.push(WorkItemId::new(value.as_ref().trim()));
            }
            "--all" => {
                all_items = true;
            }
            "--status" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--status requires a status"))?;
                status = Some(BundleStatus::parse(value.as_ref()).ok_or_else(|| {
                    anyhow!(
                        "unknown status {:?}; use candidate, ready_for_dispatch, or dispatched",
                        value.as_ref()
                    )
                })?);
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-path" => {
                options.print_db_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--demo" => {
                options.demo = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            flag if flag.starts_with('-') => {
                bail!("unknown argument {flag:?}; run with --help to see supported options");
            }
            word => {
                if command_name.is_none() {
                    command_name = Some(word.to_owned());
                } else {
                    positionals.push(word.to_owned());
                }
            }
        }
    }

    let Some(name) = command_name else {
        if !seeds.is_empty() || !items.is_empty() || all_items || status.is_some() {
            bail!("--seed, --item, --all and --status need a command; run with --help");
        }
        return Ok(options);
    };

    let only = |allowed: &[&str]| -> Result<()> {
        let used = [
            ("--seed", !seeds.is_empty()),
            ("--item", !items.is_empty()),
            ("--all", all_items),
            ("--status", status.is_some()),
        ];
        match used
            .iter()
            .find(|(flag, present)| *present && !allowed.contains(flag))
        {
            Some((flag, _)) => bail!("{flag} does not apply to `{name}`"),
            None => Ok(()),
        }
    };

    let command = match name.as_str() {
        "generate" => {
            only(&["--seed"])?;
            no_positionals(&name, &positionals)?;
            Command::Generate { seeds }
        }
        "list" => {
            only(&["--status"])?;
            no_positionals(&name, &positionals)?;
            Command::List { status }
        }
        "accept" => {
            only(&["--seed", "--item", "--all"])?;
            let [candidate] = positionals.as_slice() else {
                bail!("accept takes exactly one candidate id, for example BUNDLE-North-PLUMBING");
            };
            let items = match (all_items, items.is_empty()) {
                (true, false) => bail!("--all and --item are mutually exclusive"),
                (true, true) => ItemChoice::All,
                (false, true) => ItemChoice::Default,
                (false, false) => ItemChoice::Only(items),
            };
            Command::Accept {
                candidate: CandidateId::new(candidate.as_str()),
                items,
                seeds,
            }
        }
        "dispatch" => {
            only(&[])?;
            if positionals.is_empty() {
                bail!("dispatch needs at least one bundle id, for example BND-000001");
            }
            let ids = positionals
                .iter()
                .map(|raw| {
                    BundleRecordId::parse(raw)
                        .ok_or_else(|| anyhow!("{raw:?} is not a bundle id like BND-000001"))
                })
                .collect::<Result<Vec<_>>>()?;
            Command::Dispatch { ids }
        }
        other => bail!("unknown command {other:?}; run with --help to see supported commands"),
    };
    options.command = Some(command);
    Ok(options)
}

fn no_positionals(name: &str, positionals: &[String]) -> Result<()> {
    match positionals.first() {
        Some(extra) => bail!("unexpected argument {extra:?} for `{name}`"),
        None => Ok(()),
    }
}

fn print_help() {
    println!("upkeep [options] [command]");
    println!();
    println!("commands:");
    println!("  generate [--seed ID]...             List bundle opportunities (default)");
    println!("  list [--status STATUS]              List accepted bundles");
    println!("  accept CANDIDATE [--item ID]... [--all] [--seed ID]...");
    println!("                                      Accept a candidate for dispatch");
    println!("  dispatch BND-ID...                  Dispatch accepted bundles");
    println!();
    println!("options:");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-path             Print resolved database path");
    println!("  --print-example-config   Print a config template");
    println!("  --demo                   Use sample data and an in-memory database");
    println!("  --check                  Validate config + DB + catalog settings");
    println!("  --help                   Show this help");
}

#[cfg(test)]
mod tests {
    use super::{CliOptions, parse_cli_args};
    use crate::runtime::{Command, ItemChoice};
    use anyhow::Result;
    use std::path::PathBuf;
    use upkeep_app::{BundleRecordId, BundleStatus, CandidateId, WorkItemId};

    fn default_options_path() -> PathBuf {
        PathBuf::from("/tmp/upkeep-config.toml")
    }

    #[test]
    fn parse_cli_args_defaults_to_provided_config_path() -> Result<()> {
        let options = parse_cli_args(Vec::<String>::new(), default_options_path())?;
        assert_eq!(
            options,
            CliOptions {
                config_path: default_options_path(),
                print_config_path: false,
                print_db_path: false,
                demo: false,
                print_example: false,
                check_only: false,
                show_help: false,
                command: None,
            }
        );
        Ok(())
    }

    #[test]
    fn parse_cli_args_sets_config_path_override() -> Result<()> {
        let options = parse_cli_args(
            vec!["--config", "/custom/config.toml"],
            default_options_path(),
        )?;
        assert_eq!(options.config_path, PathBuf::from("/custom/config.toml"));
        Ok(())
    }

    #[test]
    fn parse_cli_args_errors_for_missing_values() {
        for args in [vec!["--config"], vec!["generate", "--seed"], vec!["list", "--status"]] {
            let error = parse_cli_args(args.clone(), default_options_path())
                .expect_err("missing value should fail");
            assert!(error.to_string().contains("requires"), "{args:?}: {error}");
        }
    }

    #[test]
    fn parse_cli_args_errors_for_unknown_argument_and_command() {
        let error = parse_cli_args(vec!["--wat"], default_options_path())
            .expect_err("unknown arg should fail");
        assert!(error.to_string().contains("--help"));

        let error = parse_cli_args(vec!["rebuild"], default_options_path())
            .expect_err("unknown command should fail");
        assert!(error.to_string().contains("unknown command"));
    }

    #[test]
    fn parse_cli_args_sets_print_and_check_flags() -> Result<()> {
        let options = parse_cli_args(
            vec!["--print-config-path", "--print-example-config", "--check"],
            default_options_path(),
        )?;
        assert!(options.print_config_path);
        assert!(!options.print_db_path);
        assert!(!options.demo);
        assert!(options.print_example);
        assert!(options.check_only);
        assert!(!options.show_help);
        Ok(())
    }

    #[test]
    fn parse_cli_args_sets_help_flag_for_long_and_short_variants() -> Result<()> {
        assert!(parse_cli_args(vec!["--help"], default_options_path())?.show_help);
        assert!(parse_cli_args(vec!["-h"], default_options_path())?.show_help);
        Ok(())
    }

    #[test]
    fn generate_collects_seeds_in_order() -> Result<()> {
        let options = parse_cli_args(
            vec!["--demo", "generate", "--seed", "ASSET-1001", "--seed", "WO-003"],
            default_options_path(),
        )?;
        assert!(options.demo);
        assert_eq!(
            options.command,
            Some(Command::Generate {
                seeds: vec![WorkItemId::new("ASSET-1001"), WorkItemId::new("WO-003")],
            })
        );
        Ok(())
    }

    #[test]
    fn list_parses_status_filter() -> Result<()> {
        let options = parse_cli_args(vec!["list", "--status", "ready"], default_options_path())?;
        assert_eq!(
            options.command,
            Some(Command::List {
                status: Some(BundleStatus::ReadyForDispatch),
            })
        );

        let error = parse_cli_args(vec!["list", "--status", "lost"], default_options_path())
            .expect_err("bad status");
        assert!(error.to_string().contains("unknown status"));
        Ok(())
    }

    #[test]
    fn accept_parses_item_choices() -> Result<()> {
        let options = parse_cli_args(
            vec!["accept", "BUNDLE-North-PLUMBING", "--item", "WO-001"],
            default_options_path(),
        )?;
        assert_eq!(
            options.command,
            Some(Command::Accept {
                candidate: CandidateId::new("BUNDLE-North-PLUMBING"),
                items: ItemChoice::Only(vec![WorkItemId::new("WO-001")]),
                seeds: Vec::new(),
            })
        );

        let options = parse_cli_args(vec!["accept", "B", "--all"], default_options_path())?;
        assert!(matches!(
            options.command,
            Some(Command::Accept {
                items: ItemChoice::All,
                ..
            })
        ));

        let options = parse_cli_args(vec!["accept", "B"], default_options_path())?;
        assert!(matches!(
            options.command,
            Some(Command::Accept {
                items: ItemChoice::Default,
                ..
            })
        ));

        assert!(parse_cli_args(vec!["accept"], default_options_path()).is_err());
        assert!(
            parse_cli_args(vec!["accept", "B", "--all", "--item", "X"], default_options_path())
                .is_err()
        );
        Ok(())
    }

    #[test]
    fn dispatch_parses_prefixed_and_bare_ids() -> Result<()> {
        let options = parse_cli_args(
            vec!["dispatch", "BND-000002", "7"],
            default_options_path(),
        )?;
        assert_eq!(
            options.command,
            Some(Command::Dispatch {
                ids: vec![BundleRecordId::new(2), BundleRecordId::new(7)],
            })
        );

        assert!(parse_cli_args(vec!["dispatch"], default_options_path()).is_err());
        assert!(parse_cli_args(vec!["dispatch", "WO-001"], default_options_path()).is_err());
        Ok(())
    }

    #[test]
    fn flags_are_checked_against_the_command() {
        let error = parse_cli_args(vec!["list", "--item", "WO-001"], default_options_path())
            .expect_err("--item does not apply to list");
        assert!(error.to_string().contains("does not apply to `list`"));

        let error = parse_cli_args(vec!["generate", "extra"], default_options_path())
            .expect_err("generate takes no positionals");
        assert!(error.to_string().contains("unexpected argument"));

        let error = parse_cli_args(vec!["--seed", "WO-001"], default_options_path())
            .expect_err("seed without command");
        assert!(error.to_string().contains("need a command"));
    }
}
