// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! HTTP serving and process bootstrap. */

use {
    crate::error::Result,
    std::{collections::HashMap, sync::Arc},
    tracing::info,
};

mod config;
mod handler;

pub use {
    config::{build_repo, Config, RepoConfig},
    handler::{router, RepoMap},
};

/// Load configuration, build every configured repo, and serve until
/// interrupted.
pub async fn run() -> Result<()> {
    let config = Config::load()?;

    let mut repos = HashMap::new();
    for (name, repo_config) in config.repos.clone() {
        let repo = build_repo(name.clone(), repo_config).await?;
        repos.insert(name, repo);
    }

    let app = handler::router(Arc::new(repos));

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
}
