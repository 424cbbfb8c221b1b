use anyhow::Context;

use stockyard_infra::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockyard_observability::init();

    let settings = Settings::from_env().context("loading configuration")?;
    let app = stockyard_api::app::build_app(&settings).await?;

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
