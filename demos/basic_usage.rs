//! Basic usage example of the store provider.

use std::sync::Arc;
use store_provider::{
    backend::InMemoryClient, config::StoreOptions, error::Result, initialize,
    logger::LogCrateSink, Environment, ProviderConfig, StoreClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .try_init()
        .ok();

    println!("\n=== Store Provider - Basic Example ===\n");

    // 1. Resolve configuration
    println!("1. Resolving configuration (REDIS_HOST / REDIS_PORT override the config)...");
    let config = ProviderConfig::new(StoreOptions::with_endpoint("localhost", 6379));
    let env = Environment::from_process();

    let provider = initialize::<InMemoryClient>(&config, &env, Arc::new(LogCrateSink)).await?;
    println!(
        "   ✓ Provider ready for {} ({})\n",
        provider.service().options().endpoint(),
        provider.state()
    );

    // 2. Hand the fatal signal to a supervisor
    println!("2. Watching for fatal transport errors...");
    let fatal = provider.fatal_error();
    let supervisor = tokio::spawn(async move {
        let err = fatal.await;
        println!("   ✗ Supervisor saw fatal error: {}", err);
    });
    println!("   ✓ Supervisor installed\n");

    // 3. Round trip
    println!("3. SET / GET / DEL round trip:");
    let redis = provider.service();
    redis.set("testkey", b"testvalue".to_vec(), None).await?;
    let value = redis.get("testkey").await?;
    println!(
        "   ✓ GET testkey -> {:?}",
        value.as_deref().map(String::from_utf8_lossy)
    );
    redis.del("testkey").await?;
    println!("   ✓ After DEL -> {:?}\n", redis.get("testkey").await?);

    // 4. Simulate a transport failure
    println!("4. Simulating a transport failure:");
    redis.inject_transport_error("connection reset by peer");
    redis.inject_transport_error("ignored second failure");
    supervisor.await.ok();
    println!("   ✓ Provider state: {}\n", provider.state());

    // 5. Dispose
    println!("5. Disposing provider...");
    provider.dispose().await;
    println!("   ✓ Session closed\n");

    println!("=== Example Complete ===\n");

    Ok(())
}
