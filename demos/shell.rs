//! Scripted shell: signs a user up, adds and removes tasks, switches users,
//! and prints every list the session publishes.
//!
//! Run with `RUST_LOG=tasksync=debug cargo run --example shell` to see the
//! subscription lifecycle. Pass a TOML config path as the first argument to
//! override the defaults.

use std::sync::Arc;
use std::time::Duration;

use tasksync::logging::init_logging;
use tasksync::store::AccessRules;
use tasksync::{InMemoryAuthService, InMemoryDocumentStore, TaskListConfig, TaskListSession};

#[tokio::main]
async fn main() -> tasksync::Result<()> {
    init_logging();

    let config = match std::env::args().nth(1) {
        Some(path) => TaskListConfig::from_file(path)?,
        None => TaskListConfig::default(),
    };

    let auth = Arc::new(InMemoryAuthService::new());
    let store = Arc::new(
        InMemoryDocumentStore::new()
            .with_rules(AccessRules::owner_only(config.schema.owner_field.clone()))
            .with_principal(auth.clone())
            .with_write_latency(Duration::from_millis(150)),
    );
    let session = TaskListSession::new(auth, store, config);

    let _who = session.on_identity_change(|identity| match identity {
        Some(identity) => println!("signed in as {}", identity.email()),
        None => println!("signed out"),
    });
    let _tasks = session.on_tasks_change(|tasks| {
        let rendered: Vec<_> = tasks.iter().collect();
        match serde_json::to_string(&rendered) {
            Ok(json) => println!("tasks: {json}"),
            Err(e) => eprintln!("failed to render tasks: {e}"),
        }
    });
    let _errors = session.on_subscription_error(|e| eprintln!("subscription failed: {e}"));

    session.start()?;

    session.sign_up("ada@example.com", "correct horse").await?;
    let milk = session.add_task("buy milk").await?;
    session.add_task("walk the dog").await?;

    if let Err(e) = session.add_task("   ").await {
        println!("rejected: {e}");
    }

    session.remove_task(&milk).await?;

    if let Err(e) = session.sign_up("ada@example.com", "whatever").await {
        println!("rejected: {e}");
    }

    session.sign_up("bob@example.com", "hunter22").await?;
    session.add_task("bob's first task").await?;

    session.sign_in("ada@example.com", "correct horse").await?;
    session.sign_out().await?;

    session.dispose();
    Ok(())
}
