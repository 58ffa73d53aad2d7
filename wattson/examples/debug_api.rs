use reqwest::Client;
use std::env;
use wattson::types::{EnergyPoint, Period, Statistics};

/// Attempts to parse JSON and shows error info on failure
fn try_parse<T: serde::de::DeserializeOwned>(json: &str, type_name: &str) {
    println!("\n>>> Attempting to parse as {type_name} <<<");
    match serde_json::from_str::<T>(json) {
        Ok(_) => println!("SUCCESS: Parsed {type_name} correctly"),
        Err(e) => println!("FAILED: {e}"),
    }
}

fn banner(title: &str) {
    println!("\n{}", "=".repeat(60));
    println!("{title}");
    println!("{}", "=".repeat(60));
}

#[tokio::main]
async fn main() {
    let base_url =
        env::var("WATTSON_API_URL").unwrap_or_else(|_| wattson::DEFAULT_BASE_URL.to_string());
    let username =
        env::var("WATTSON_USERNAME").expect("WATTSON_USERNAME environment variable not set");
    let password =
        env::var("WATTSON_PASSWORD").expect("WATTSON_PASSWORD environment variable not set");

    let client = Client::new();

    banner("STEP 1: POST login/");
    let url = format!("{base_url}login/");
    let response = client
        .post(&url)
        .json(&serde_json::json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("login request failed");
    let status = response.status();
    let body: serde_json::Value = response.json().await.expect("login body is not JSON");
    println!("Status: {status}");
    let Some(token) = body.get("access").and_then(|v| v.as_str()).map(str::to_string) else {
        println!("No access token in response: {body}");
        return;
    };

    for period in [Period::Hourly, Period::Daily, Period::Monthly] {
        banner(&format!("GET energy-data/?period={period}"));
        let url = format!("{base_url}energy-data/");
        match client
            .get(&url)
            .bearer_auth(&token)
            .query(&[("period", period.as_str())])
            .send()
            .await
        {
            Ok(resp) => {
                let text = resp.text().await.unwrap();
                println!("Response length: {} bytes", text.len());
                try_parse::<Vec<EnergyPoint>>(&text, "Vec<EnergyPoint>");
            }
            Err(e) => println!("Request failed: {e}"),
        }
    }

    banner("GET statistics/");
    let url = format!("{base_url}statistics/");
    match client.get(&url).bearer_auth(&token).send().await {
        Ok(resp) => {
            let text = resp.text().await.unwrap();
            println!("Response: {text}");
            try_parse::<Statistics>(&text, "Statistics");
        }
        Err(e) => println!("Request failed: {e}"),
    }
}
