use crate::net::Response;
use url::Url;

// Loads an URL and returns the fully buffered response
pub async fn fetch(url: &Url) -> Result<Response, reqwest::Error> {
    let client = reqwest::Client::new();
    let res = client.get(url.clone()).send().await?;

    let final_url = res.url().clone();
    let status = res.status().as_u16();
    let status_text = res.status().canonical_reason().unwrap_or("Unknown").to_string();
    let headers = res.headers().clone();

    // No streaming, vendor lists are small enough to buffer
    let body = res.bytes().await?.to_vec();

    Ok(Response {
        url: final_url,
        status,
        status_text,
        headers,
        body,
    })
}
