use goose::prelude::*;
use rand::Rng;

/// Load testing suite for the resizekit service.
///
/// Mixes URL resizes with randomized dimensions (cache misses), fixed
/// parameters (cache hits after warmup) and health checks.
///
/// # Usage
/// ```bash
/// cd loadtest
/// cargo run --release -- --host http://localhost:8080 --users 10 --hatch-rate 2 --run-time 60s
/// ```
///
/// Set `SOURCE_URL` to point the resizes at a different origin image.

fn source_url() -> String {
    std::env::var("SOURCE_URL").unwrap_or_else(|_| "https://picsum.photos/id/10/2000/2000.jpg".to_string())
}

#[tokio::main]
async fn main() -> Result<(), GooseError> {
    GooseAttack::initialize()?
        .register_scenario(
            scenario!("ImageResize")
                .register_transaction(transaction!(random_resize).set_weight(10)?)
                .register_transaction(transaction!(health_check).set_weight(1)?)
        )
        .register_scenario(
            scenario!("CachePerformance")
                .register_transaction(transaction!(cached_resize).set_weight(15)?)
                .register_transaction(transaction!(uncached_resize).set_weight(5)?)
        )
        .execute()
        .await?;

    Ok(())
}

/// Resize with random dimensions, format and quality.
async fn random_resize(user: &mut GooseUser) -> TransactionResult {
    // Generate random parameters before await to satisfy Send bounds
    let path = {
        let mut rng = rand::thread_rng();
        let width = rng.gen_range(100..1000);
        let height = rng.gen_range(100..1000);
        let formats = ["webp", "jpeg", "png"];
        let format = formats[rng.gen_range(0..formats.len())];
        let quality = rng.gen_range(50..=95);

        format!(
            "/resize?url={}&width={}&height={}&format={}&quality={}",
            source_url(),
            width,
            height,
            format,
            quality
        )
    };

    let _goose = user.get(&path).await?;
    Ok(())
}

/// Fixed parameters, so every request after the first is a cache hit.
async fn cached_resize(user: &mut GooseUser) -> TransactionResult {
    let path = format!("/resize?url={}&width=500&height=500&format=webp&quality=80", source_url());
    let _goose = user.get(&path).await?;
    Ok(())
}

/// Timestamp-derived dimensions to force a transform.
async fn uncached_resize(user: &mut GooseUser) -> TransactionResult {
    let timestamp = chrono::Utc::now().timestamp_millis();
    let width = 200 + (timestamp % 300);
    let height = 200 + ((timestamp / 300) % 300);

    let path = format!(
        "/resize?url={}&width={}&height={}&format=jpeg",
        source_url(),
        width,
        height
    );

    let _goose = user.get(&path).await?;
    Ok(())
}

async fn health_check(user: &mut GooseUser) -> TransactionResult {
    let _goose = user.get("/health").await?;
    Ok(())
}
