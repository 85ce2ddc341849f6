//! Output conventions: JSON mode emits one document on stdout; errors go to
//! stderr, colored in text mode, as `{error, code, hint?}` in JSON mode.

use ctx_core::Error;

const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

/// Print a command's JSON document to stdout.
pub fn print_json<T: serde::Serialize>(value: &T) {
  match serde_json::to_string_pretty(value) {
    Ok(rendered) => println!("{rendered}"),
    Err(e) => eprintln!("failed to serialize output: {e}"),
  }
}

/// Render an error and return the process exit code.
pub fn report_error(error: &Error, json: bool, verbose: bool) -> i32 {
  let code = error.exit_code();
  if json {
    let mut body = serde_json::json!({ "error": error.to_string(), "code": code });
    if let Some(hint) = error.hint() {
      body["hint"] = serde_json::Value::String(hint.to_string());
    }
    eprintln!("{body}");
  } else {
    eprintln!("{RED}Error:{RESET} {error}");
    if let Some(hint) = error.hint() {
      eprintln!("{YELLOW}Hint:{RESET} {hint}");
    }
    if verbose {
      eprintln!("{error:?}");
    }
  }
  code
}

/// Non-fatal warnings, text mode only.
pub fn print_warnings(warnings: &[String], json: bool) {
  if json {
    return;
  }
  for warning in warnings {
    eprintln!("{YELLOW}Warning:{RESET} {warning}");
  }
}
