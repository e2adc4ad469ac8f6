use std::time::Duration;

use crate::output::MatchRecord;

/// Posts a round's records as a JSON array to the delivery webhook.
///
/// A single attempt; a non-2xx answer is returned as an error.
pub async fn push_records(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    records: &[MatchRecord],
) -> Result<(), reqwest::Error> {
    tracing::info!(%url, records = records.len(), "pushing round to webhook");
    let response = client
        .post(url)
        .timeout(timeout)
        .json(records)
        .send()
        .await?;
    response.error_for_status()?;
    Ok(())
}
