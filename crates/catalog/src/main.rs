//! Catalog command-line entry point.
//!
//! ```text
//! catalog <name> <price-in-cents>
//! ```
//!
//! Creates one product and prints it as JSON.

use std::process::ExitCode;
use std::sync::Arc;

use catalog::{
    CatalogEvent, Config, CreateProductInput, CreateProductUseCase, InMemoryProductRepository,
    PostgresProductRepository, ProductOutput, ProductRepository, register_handlers,
};
use domain::{ApplicationService, EventMediator};
use storage::{InMemoryStore, PostgresTransactionManager};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn parse_args() -> Result<CreateProductInput, String> {
    let mut args = std::env::args().skip(1);
    let usage = "usage: catalog <name> <price-in-cents>";
    let name = args.next().ok_or(usage)?;
    let price = args
        .next()
        .ok_or(usage)?
        .parse()
        .map_err(|e| format!("invalid price: {e}"))?;
    Ok(CreateProductInput { name, price })
}

async fn create_product<R>(
    store: R::Store,
    products: R,
    input: CreateProductInput,
) -> Result<ProductOutput, BoxError>
where
    R: ProductRepository + 'static,
{
    let mut mediator: EventMediator<CatalogEvent> = EventMediator::new();
    register_handlers(&mut mediator);
    let service = ApplicationService::new(store, Arc::new(mediator));

    let use_case = CreateProductUseCase::new(service, Arc::new(products));
    Ok(use_case.execute(input).await?)
}

async fn run(config: Config, input: CreateProductInput) -> Result<ProductOutput, BoxError> {
    if config.uses_postgres() {
        let store = PostgresTransactionManager::connect(&config.store).await?;
        store.run_migrations().await?;
        create_product(store, PostgresProductRepository::new(), input).await
    } else {
        tracing::info!("DATABASE_URL not set, using the in-memory store");
        let store = InMemoryStore::with_config(&config.store);
        create_product(store.clone(), InMemoryProductRepository::new(store), input).await
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::from_env();

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(config.json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!config.json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    let input = match parse_args() {
        Ok(input) => input,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };

    match run(config, input).await {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize output");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "failed to create product");
            ExitCode::FAILURE
        }
    }
}
