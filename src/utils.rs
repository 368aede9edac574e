use crate::error::FetchError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Repeatedly runs `probe` until it yields a value or `timeout` elapses.
///
/// The probe always runs at least once, so a zero timeout means "check
/// now". Errors from the probe end the wait immediately.
pub async fn poll_until<T, F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<Option<T>, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, FetchError>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = probe().await? {
            return Ok(Some(value));
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

/// Sleeps unless the delay is zero
pub async fn settle(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// URL of listing page `page` (1-based).
///
/// The first page is the base URL untouched; later pages carry the page
/// number in `param`, replacing any value already present.
pub fn page_url(base: &Url, param: &str, page: u32) -> Url {
    if page <= 1 {
        return base.clone();
    }

    let retained = base
        .query_pairs()
        .filter(|(key, _)| key != param)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect::<Vec<_>>();

    let mut url = base.clone();
    url.set_query(None);
    {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &retained {
            pairs.append_pair(key, value);
        }
        pairs.append_pair(param, &page.to_string());
    }
    url
}
