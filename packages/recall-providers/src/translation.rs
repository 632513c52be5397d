use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde_json::Value;

pub async fn translate(
	cfg: &recall_config::TranslationProviderConfig,
	text: &str,
	source: &str,
	target: &str,
) -> Result<String> {
	if text.trim().is_empty() {
		return Ok(String::new());
	}

	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"q": text,
		"source": source,
		"target": target,
		"format": "text",
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_translation_response(json)
}

fn parse_translation_response(json: Value) -> Result<String> {
	if let Some(text) = json.get("translatedText").and_then(|v| v.as_str()) {
		return Ok(text.to_string());
	}

	// Google-style envelope.
	if let Some(text) = json
		.get("data")
		.and_then(|v| v.get("translations"))
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|item| item.get("translatedText"))
		.and_then(|t| t.as_str())
	{
		return Ok(text.to_string());
	}

	Err(eyre::eyre!("Translation response is missing translatedText."))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_flat_response() {
		let json = serde_json::json!({ "translatedText": "hello" });

		assert_eq!(parse_translation_response(json).expect("parse failed"), "hello");
	}

	#[test]
	fn parses_nested_envelope() {
		let json = serde_json::json!({
			"data": { "translations": [{ "translatedText": "hello" }] }
		});

		assert_eq!(parse_translation_response(json).expect("parse failed"), "hello");
	}

	#[test]
	fn rejects_unknown_shape() {
		assert!(parse_translation_response(serde_json::json!({ "ok": true })).is_err());
	}
}
