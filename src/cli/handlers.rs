use anyhow::{bail, Result};
use serde_json::{json, Value};

use crate::dispatch::{Dispatcher, Response, COMMANDS};
use crate::matching::extract_tokens;
use crate::vocab::Language;

fn print_response(response: &Response) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    if let Some(error) = &response.error {
        bail!("{}: {}", error.code, error.message);
    }
    Ok(())
}

fn run(dispatcher: &Dispatcher, cmd: &str, payload: Value) -> Result<()> {
    let response = match dispatcher.handle(cmd, payload) {
        Ok(data) => Response::ok(Value::Null, data),
        Err(e) => Response::err(Value::Null, e.code(), e.to_string()),
    };
    print_response(&response)
}

pub fn handle_serve(dispatcher: &Dispatcher) -> Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    dispatcher.serve(stdin.lock(), stdout.lock())?;
    Ok(())
}

pub fn handle_exec(dispatcher: &Dispatcher, cmd: &str, payload: Option<String>) -> Result<()> {
    if !COMMANDS.contains(&cmd) {
        bail!("unknown command {cmd}, expected one of: {}", COMMANDS.join(", "));
    }

    let payload = match payload.as_deref().map(str::trim) {
        None | Some("") => Value::Null,
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| anyhow::anyhow!("payload is not valid JSON: {e}"))?,
    };
    run(dispatcher, cmd, payload)
}

pub fn handle_add(
    dispatcher: &Dispatcher,
    word: String,
    lang: Language,
    translation: Option<String>,
    notes: Option<String>,
) -> Result<()> {
    let payload = json!({
        "language": lang,
        "word": word,
        "translation": translation,
        "notes": notes,
    });
    run(dispatcher, "add_entry", payload)
}

pub fn handle_resolve(
    dispatcher: &Dispatcher,
    query: String,
    lang: Option<Language>,
    top_k: Option<usize>,
) -> Result<()> {
    let payload = json!({ "q": query, "language": lang, "topK": top_k });
    run(dispatcher, "resolve_entry", payload)
}

pub fn handle_tokens(text: &str) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&extract_tokens(text))?);
    Ok(())
}

pub fn handle_ann_apply(dispatcher: &Dispatcher, model: Option<String>) -> Result<()> {
    run(dispatcher, "ann_apply_updates", json!({ "model": model }))
}
