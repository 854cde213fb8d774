use std::time::{Duration, Instant};

use actix_web::rt::task::JoinHandle;
use log::{info, warn};

/// Requests `url` in the background so the renderer has the screen ready by
/// the time the device fetches it.
///
/// The caller does not await the handle; the outcome only reaches the log.
pub fn spawn_prefetch(client: reqwest::Client, url: String, timeout: Duration) -> JoinHandle<()> {
    actix_web::rt::spawn(async move {
        let started = Instant::now();

        let res = async {
            let res = client
                .get(&url)
                .timeout(timeout)
                .send()
                .await?
                .error_for_status()?;
            res.bytes().await
        }
        .await;

        match res {
            Ok(body) => info!(
                "Prefetched {url} ({} bytes) in {:?}",
                body.len(),
                started.elapsed()
            ),
            Err(err) => warn!("Prefetch of {url} failed: {err}"),
        }
    })
}
