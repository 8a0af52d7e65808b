use mock_server::Shape;
use tokio::net::TcpListener;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,mock_server=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "1337".to_string());
    let shape = match std::env::var("SHAPE") {
        Ok(name) => Shape::from_name(&name).unwrap_or_else(|| {
            warn!("unknown SHAPE {name:?}, using nested");
            Shape::Nested
        }),
        Err(_) => Shape::default(),
    };
    let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;
    mock_server::run_with_shape(listener, shape).await
}
