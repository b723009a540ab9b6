//! Concord server binary
//!
//! Serves a sample collaborative workspace schema over websockets, with
//! background loops for idle-document eviction and periodic snapshots.

use clap::{Arg, Command};
use concord::core::{config, create_app_state};
use concord::schema::{self, Primitive, Refinement, TreeChild, TreeNodeDef};
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let matches = Command::new("concord")
        .version(concord::VERSION)
        .about("Real-time collaborative document engine")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .get_matches();

    // Load configuration
    let config_path = matches.get_one::<String>("config").map(|s| s.as_str());
    let config = config::Config::load(config_path)?;

    // Initialize logging and metrics
    concord::init(&config.logging);

    info!(
        workers = config.optimal_worker_threads(),
        "Starting Concord"
    );

    let bind_addr = config.server.bind_addr;
    let evict_after = config.evict_after();
    let snapshot_interval = config.document.snapshot_interval_secs;

    let state = create_app_state(config, workspace_schema()?)?;
    info!("Application state created");

    // Background loop: evict idle documents with no subscribers
    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(evict_after.max(Duration::from_secs(1)));
            loop {
                ticker.tick().await;
                let evicted = state.manager.evict_idle(evict_after).await;
                if evicted > 0 {
                    info!(evicted, "evicted idle documents");
                }
            }
        });
    }

    // Background loop: periodic snapshots of dirty documents
    if snapshot_interval > 0 {
        let state = state.clone();
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(snapshot_interval));
            loop {
                ticker.tick().await;
                state.manager.persist_all().await;
            }
        });
    }

    // Start the server
    let server_state = state.clone();
    let server_handle = tokio::spawn(async move {
        concord::api::start_server(server_state, bind_addr)
            .await
            .expect("server failed")
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            warn!("Received shutdown signal");
        }
        _ = server_handle => {
            warn!("Server terminated unexpectedly");
        }
    }

    // Final snapshot pass before exit
    state.manager.persist_all().await;
    info!("Shutdown complete");
    Ok(())
}

/// The sample schema served by the binary: a titled workspace with a todo
/// list and a folder/file outline.
fn workspace_schema() -> concord::core::Result<Primitive> {
    let todo = schema::struct_of(vec![
        ("label", schema::string().default_value("").refine(Refinement::MaxLength(512))),
        ("done", schema::boolean().default_value(false)),
        (
            "priority",
            schema::either(vec![
                schema::literal("none"),
                schema::number().refine(Refinement::MinNumber(1.0)).refine(Refinement::Integer),
            ])?
            .default_value("none"),
        ),
    ]);

    let outline = schema::tree(
        "folder",
        vec![
            (
                "folder",
                TreeNodeDef::new(schema::struct_of(vec![(
                    "name",
                    schema::string().default_value("untitled"),
                )]))
                .children([TreeChild::SelfSame, TreeChild::from("file")]),
            ),
            (
                "file",
                TreeNodeDef::new(schema::struct_of(vec![
                    ("name", schema::string().default_value("")),
                    ("size", schema::number().default_value(0i64)),
                ])),
            ),
        ],
    )?;

    Ok(schema::struct_of(vec![
        ("title", schema::string().default_value("")),
        ("todos", schema::array_of(todo)),
        ("outline", outline),
    ]))
}
