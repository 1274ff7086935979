use serde::Serialize;

use crate::cli::Cli;
use crate::error::CliError;

/// JSON response envelope
#[derive(Serialize)]
pub struct JsonResponse<T: Serialize> {
    pub schema_version: u32,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonError>,
}

#[derive(Serialize)]
pub struct JsonError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

/// Output a successful result as JSON (no-op in human mode)
pub fn output_json<T: Serialize>(cli: &Cli, data: T) {
    if !cli.json {
        return;
    }
    let response = JsonResponse {
        schema_version: 1,
        ok: true,
        data: Some(data),
        error: None,
    };
    match serde_json::to_string_pretty(&response) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("error: failed to serialize output: {}", e),
    }
}

/// Output an error
pub fn output_error(cli: &Cli, err: &CliError) {
    let suggestions = err.suggestions();
    if cli.json {
        let details = if suggestions.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::json!({ "suggestions": suggestions })
        };

        let response: JsonResponse<()> = JsonResponse {
            schema_version: 1,
            ok: false,
            data: None,
            error: Some(JsonError {
                code: err.error_code().to_string(),
                message: err.to_string(),
                details,
            }),
        };
        match serde_json::to_string_pretty(&response) {
            Ok(text) => eprintln!("{}", text),
            Err(_) => eprintln!("error: {}", err),
        }
    } else {
        eprintln!("error: {}", err);
        if !suggestions.is_empty() {
            eprintln!();
            eprintln!("Suggestions:");
            for suggestion in suggestions {
                eprintln!("  - {}", suggestion);
            }
        }
    }
}

/// Print human-readable output (ignored in quiet and JSON modes)
pub fn print_human(cli: &Cli, msg: &str) {
    if !cli.json && !cli.quiet {
        println!("{}", msg);
    }
}
