#![cfg(feature = "sqlite")]
//! CLI integration tests.
//!
//! Tests cover:
//! - Argument parsing for every subcommand
//! - Schema bootstrap against a file-backed database
//! - CSV stock import, including rejected files
//! - Securities id changes and interest accrual through the CLI
//! - Exit codes per error kind

mod common;

use clap::Parser;
use common::*;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use stsserver::adapters::file_config_adapter::FileConfigAdapter;
use stsserver::cli::{self, Cli, Command};
use stsserver::domain::account_service::{create_personal_account, fund_accounts_of};
use stsserver::domain::error::{ErrorKind, StsError};
use stsserver::domain::stock_service::fetch_all_stock;
use stsserver::ports::store_port::transact;
use tempfile::TempDir;

// ExitCode has no PartialEq on every toolchain, so compare the Debug form.
fn same_exit(actual: ExitCode, expected: ExitCode) -> bool {
    format!("{actual:?}") == format!("{expected:?}")
}

struct Workspace {
    dir: TempDir,
    ini: PathBuf,
}

impl Workspace {
    fn new(extra: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let ini = dir.path().join("sts.ini");
        let content = format!(
            "[database]\nbackend = sqlite\n\n[sqlite]\npath = {}\n\n[logging]\nfilter = warn\n{extra}",
            dir.path().join("sts.db").display()
        );
        fs::write(&ini, content).unwrap();
        Self { dir, ini }
    }

    fn run(&self, args: &[&str]) -> ExitCode {
        let mut argv = vec!["stsserver"];
        argv.extend_from_slice(args);
        let with_config: Vec<String> = argv
            .iter()
            .map(|a| a.replace("{ini}", &self.ini.display().to_string()))
            .collect();
        cli::run(Cli::parse_from(with_config))
    }

    fn config(&self) -> FileConfigAdapter {
        FileConfigAdapter::from_file(&self.ini).unwrap()
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

mod parsing {
    use super::*;

    #[test]
    fn alter_securities_id_arguments() {
        let cli = Cli::try_parse_from([
            "stsserver",
            "alter-securities-id",
            "--config",
            "sts.ini",
            "--from",
            "3",
            "--to",
            "30",
        ])
        .unwrap();
        match cli.command {
            Command::AlterSecuritiesId { config, from, to } => {
                assert_eq!(config, PathBuf::from("sts.ini"));
                assert_eq!((from, to), (3, 30));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn import_requires_file() {
        assert!(Cli::try_parse_from(["stsserver", "import-stocks", "-c", "sts.ini"]).is_err());
    }

    #[test]
    fn hash_password_takes_no_arguments() {
        let cli = Cli::try_parse_from(["stsserver", "hash-password"]).unwrap();
        assert!(matches!(cli.command, Command::HashPassword));
    }

    #[test]
    fn unknown_subcommand_rejected() {
        assert!(Cli::try_parse_from(["stsserver", "trade"]).is_err());
    }
}

mod schema {
    use super::*;

    #[test]
    fn init_schema_seeds_configured_rate() {
        let ws = Workspace::new("\n[interest]\nrate = 0.01\n");
        assert!(same_exit(
            ws.run(&["init-schema", "--config", "{ini}"]),
            ExitCode::SUCCESS
        ));

        let store = cli::open_store(&ws.config()).unwrap();
        let rate = transact(store.as_ref(), |gw| gw.get_rate()).unwrap();
        assert_eq!(rate, 0.01);
    }

    #[test]
    fn init_schema_is_idempotent() {
        let ws = Workspace::new("");
        ws.run(&["init-schema", "--config", "{ini}"]);
        assert!(same_exit(
            ws.run(&["init-schema", "--config", "{ini}"]),
            ExitCode::SUCCESS
        ));

        let store = cli::open_store(&ws.config()).unwrap();
        assert_eq!(transact(store.as_ref(), |gw| gw.get_rate()).unwrap(), SEED_RATE);
    }

    #[test]
    fn missing_config_file_exits_with_config_code() {
        let dir = TempDir::new().unwrap();
        let ini = dir.path().join("absent.ini");
        let code = cli::run(Cli::parse_from([
            "stsserver",
            "init-schema",
            "--config",
            ini.to_str().unwrap(),
        ]));
        assert!(same_exit(code, ExitCode::from(2)));
    }

    #[test]
    fn unknown_backend_rejected() {
        let config = FileConfigAdapter::from_string("[database]\nbackend = mysql\n").unwrap();
        match cli::open_store(&config) {
            Err(err) => assert_eq!(err.kind(), ErrorKind::Config),
            Ok(_) => panic!("expected a config error"),
        }
    }

    #[cfg(not(feature = "postgres"))]
    #[test]
    fn postgres_backend_needs_feature() {
        let config = FileConfigAdapter::from_string(
            "[database]\nbackend = postgres\n[postgres]\nconnection_string = host=db\n",
        )
        .unwrap();
        assert!(matches!(
            cli::open_store(&config),
            Err(StsError::ConfigInvalid { .. })
        ));
    }
}

mod import {
    use super::*;

    const CATALOG: &str = "code,name,price,last_close,volume,privilege,state,limit\n\
        600000,PF Bank,10.5,10.2,120000,1,normal,0.1\n\
        600001,Handan Steel,4.2,4.3,90000,3,suspended_3_days,-1\n";

    #[test]
    fn import_loads_catalog() {
        let ws = Workspace::new("");
        ws.run(&["init-schema", "--config", "{ini}"]);
        let csv = ws.path("catalog.csv");
        fs::write(&csv, CATALOG).unwrap();

        let code = ws.run(&[
            "import-stocks",
            "--config",
            "{ini}",
            "--file",
            csv.to_str().unwrap(),
        ]);
        assert!(same_exit(code, ExitCode::SUCCESS));

        let store = cli::open_store(&ws.config()).unwrap();
        let stocks = fetch_all_stock(store.as_ref()).unwrap();
        assert_eq!(codes(&stocks), vec!["600000", "600001"]);
    }

    #[test]
    fn bad_row_imports_nothing() {
        let ws = Workspace::new("");
        ws.run(&["init-schema", "--config", "{ini}"]);
        let csv = ws.path("catalog.csv");
        fs::write(&csv, format!("{CATALOG}600002,Broken,x,1,1,1,normal,0.1\n")).unwrap();

        let code = ws.run(&[
            "import-stocks",
            "--config",
            "{ini}",
            "--file",
            csv.to_str().unwrap(),
        ]);
        assert!(same_exit(code, ExitCode::from(4)));

        let store = cli::open_store(&ws.config()).unwrap();
        assert!(fetch_all_stock(store.as_ref()).unwrap().is_empty());
    }

    #[test]
    fn import_before_schema_is_persistence_error() {
        let ws = Workspace::new("");
        let csv = ws.path("catalog.csv");
        fs::write(&csv, CATALOG).unwrap();

        let code = ws.run(&[
            "import-stocks",
            "--config",
            "{ini}",
            "--file",
            csv.to_str().unwrap(),
        ]);
        assert!(same_exit(code, ExitCode::from(3)));
    }
}

mod accounts {
    use super::*;

    #[test]
    fn alter_securities_id_relinks_funds() {
        let ws = Workspace::new("");
        ws.run(&["init-schema", "--config", "{ini}"]);
        let store = cli::open_store(&ws.config()).unwrap();
        create_personal_account(store.as_ref(), &personal_account("Li Lei", "A1"), "pw").unwrap();

        let code = ws.run(&[
            "alter-securities-id",
            "--config",
            "{ini}",
            "--from",
            "1",
            "--to",
            "88",
        ]);
        assert!(same_exit(code, ExitCode::SUCCESS));
        assert_eq!(fund_accounts_of(store.as_ref(), 88).unwrap().len(), 1);
    }

    #[test]
    fn alter_unknown_account_exits_not_found() {
        let ws = Workspace::new("");
        ws.run(&["init-schema", "--config", "{ini}"]);
        let code = ws.run(&[
            "alter-securities-id",
            "--config",
            "{ini}",
            "--from",
            "7",
            "--to",
            "8",
        ]);
        assert!(same_exit(code, ExitCode::from(5)));
    }

    #[test]
    fn accrue_interest_succeeds_on_empty_ledger() {
        let ws = Workspace::new("");
        ws.run(&["init-schema", "--config", "{ini}"]);
        assert!(same_exit(
            ws.run(&["accrue-interest", "--config", "{ini}"]),
            ExitCode::SUCCESS
        ));
    }
}
