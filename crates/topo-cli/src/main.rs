//! `topo`: run topograph engine operations against a JSON snapshot

use anyhow::{bail, Context};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use topo_core::{
    AssociationQuery, CallContext, Collaborators, InstSelector, LoggingConfig, TopoConfig,
    TopoEngine,
};
use topo_model::InstId;
use topo_store::{MemorySnapshot, MemoryStore};
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn kind_arg() -> Arg {
    Arg::new("kind")
        .long("kind")
        .required(true)
        .help("Object kind identifier")
}

fn id_arg() -> Arg {
    Arg::new("id")
        .long("id")
        .required(true)
        .value_parser(value_parser!(InstId))
        .help("Instance id")
}

fn cli() -> Command {
    Command::new("topo")
        .version(topo_core::VERSION)
        .about("Instance/association graph engine over a JSON snapshot")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("snapshot")
                .long("snapshot")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("JSON snapshot loaded into the in-memory store"),
        )
        .arg(
            Arg::new("deadline-ms")
                .long("deadline-ms")
                .global(true)
                .value_parser(value_parser!(u64))
                .help("Abort the command after this many milliseconds"),
        )
        .arg(
            Arg::new("compact")
                .long("compact")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print single-line JSON"),
        )
        .subcommand(
            Command::new("topo-view")
                .about("Print parent and child groups of an instance")
                .arg(kind_arg())
                .arg(id_arg()),
        )
        .subcommand(
            Command::new("check-delete")
                .about("Print the removal list of an instance or the veto")
                .arg(kind_arg())
                .arg(id_arg()),
        )
        .subcommand(
            Command::new("query")
                .about("Find instances through associations of other kinds")
                .arg(kind_arg())
                .arg(
                    Arg::new("condition")
                        .long("condition")
                        .default_value("{}")
                        .help("Association query as JSON: {\"condition\": {kind: [clauses]}, ...}"),
                ),
        )
        .subcommand(
            Command::new("sync")
                .about("Resynchronise the association edges of an instance")
                .arg(kind_arg())
                .arg(id_arg()),
        )
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_engine(matches: &ArgMatches) -> anyhow::Result<TopoEngine> {
    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => TopoConfig::load(path)?,
        None => TopoConfig::default(),
    };
    init_tracing(&config.logging);

    let Some(path) = matches.get_one::<PathBuf>("snapshot") else {
        bail!("--snapshot is required");
    };
    let snapshot = MemorySnapshot::load(path)?;
    let store = Arc::new(MemoryStore::from_snapshot(snapshot)?);
    debug!(snapshot = %path.display(), "snapshot loaded");
    Ok(TopoEngine::new(config, Collaborators::from_shared(store))?)
}

async fn execute(
    engine: &TopoEngine,
    ctx: &CallContext,
    command: &str,
    args: &ArgMatches,
) -> anyhow::Result<serde_json::Value> {
    let kind_id = args
        .get_one::<String>("kind")
        .context("--kind is required")?;
    let kind = engine.kind(ctx, kind_id).await?;
    let inst_id = || {
        args.get_one::<InstId>("id")
            .copied()
            .context("--id is required")
    };

    let value = match command {
        "topo-view" => {
            let views = engine
                .inst_topo(ctx, &kind, &InstSelector::Id(inst_id()?))
                .await?;
            serde_json::to_value(views)?
        }
        "check-delete" => {
            let verdict = engine.check_deletable(ctx, &kind, inst_id()?).await?;
            serde_json::to_value(verdict)?
        }
        "query" => {
            let raw = args
                .get_one::<String>("condition")
                .map_or("{}", String::as_str);
            let query: AssociationQuery =
                serde_json::from_str(raw).context("--condition is not a valid association query")?;
            serde_json::to_value(engine.find_by_association(ctx, &kind, &query).await?)?
        }
        "sync" => {
            let report = engine.sync_inst(ctx, &kind, inst_id()?).await?;
            serde_json::to_value(report)?
        }
        other => bail!("unknown command {other}"),
    };
    Ok(value)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    let engine = load_engine(&matches)?;

    let mut ctx = engine.context();
    if let Some(ms) = matches.get_one::<u64>("deadline-ms") {
        ctx = ctx.with_budget(Duration::from_millis(*ms));
    }

    let Some((command, args)) = matches.subcommand() else {
        bail!("no command given");
    };
    let output = execute(&engine, &ctx, command, args).await?;
    if matches.get_flag("compact") {
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
        "kinds": [
            {"id": "set", "name": "Set", "builtin": true,
             "inst_id_field": "bk_set_id", "inst_name_field": "bk_set_name"},
            {"id": "module", "name": "Module", "builtin": true,
             "inst_id_field": "bk_module_id", "inst_name_field": "bk_module_name"}
        ],
        "associations": [
            {"bk_obj_id": "set", "bk_object_att_id": "bk_childid", "bk_asst_obj_id": "module"}
        ],
        "instances": {
            "set": [{"bk_set_id": 1, "bk_set_name": "web"}],
            "module": [
                {"bk_module_id": 2, "bk_module_name": "nginx", "bk_parent_id": 1},
                {"bk_module_id": 3, "bk_module_name": "php", "bk_parent_id": 1}
            ]
        },
        "host_bindings": [{"bk_host_id": 9, "bk_inst_id": 3}]
    }"#;

    fn engine() -> TopoEngine {
        let store = MemoryStore::from_snapshot(MemorySnapshot::from_json(SNAPSHOT).unwrap()).unwrap();
        TopoEngine::new(TopoConfig::default(), Collaborators::from_shared(Arc::new(store))).unwrap()
    }

    fn run(argv: &[&str]) -> serde_json::Value {
        let matches = cli().try_get_matches_from(argv).unwrap();
        let (command, args) = matches.subcommand().unwrap();
        let engine = engine();
        let ctx = engine.context();
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(execute(&engine, &ctx, command, args))
            .unwrap()
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn test_check_delete_reports_veto() {
        let out = run(&["topo", "check-delete", "--kind", "set", "--id", "1"]);
        assert_eq!(out["status"], "blocked");
        assert_eq!(out["inst_id"], 3);
    }

    #[test]
    fn test_topo_view_lists_children() {
        let out = run(&["topo", "topo-view", "--kind", "set", "--id", "1"]);
        assert_eq!(out[0]["next"][0]["count"], 2);
        assert_eq!(out[0]["curr"]["bk_inst_name"], "web");
    }

    #[test]
    fn test_snapshot_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, SNAPSHOT).unwrap();

        let argv = ["topo", "--snapshot", path.to_str().unwrap(), "sync", "--kind", "module", "--id", "2"];
        let matches = cli().try_get_matches_from(argv).unwrap();
        let loaded = matches.get_one::<PathBuf>("snapshot").unwrap();
        let snapshot = MemorySnapshot::load(loaded).unwrap();
        assert_eq!(snapshot.kinds.len(), 2);
        assert_eq!(snapshot.host_bindings.len(), 1);
    }
}
