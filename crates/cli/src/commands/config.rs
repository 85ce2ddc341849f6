//! `ctx config` - get, set, list, reset.

use crate::app::App;
use crate::output;
use ctx_core::{Config, Result};

pub fn cmd_config_get(key: &str) -> Result<()> {
  let app = App::load()?;
  match app.config.get_value(key)? {
    toml::Value::String(value) => println!("{value}"),
    value => println!("{value}"),
  }
  Ok(())
}

pub fn cmd_config_set(key: &str, value: &str) -> Result<()> {
  let mut app = App::load()?;
  app.config.set_value(key, value)?;
  app.config.save(&app.base_dir)?;
  println!("{key} = {}", app.config.get_value(key)?);
  Ok(())
}

pub fn cmd_config_list(json: bool) -> Result<()> {
  let app = App::load()?;
  if json {
    output::print_json(&app.config);
  } else {
    match toml::to_string_pretty(&app.config) {
      Ok(rendered) => print!("{rendered}"),
      Err(e) => return Err(ctx_core::Error::Config(e.to_string())),
    }
  }
  Ok(())
}

pub fn cmd_config_reset() -> Result<()> {
  let app = App::load()?;
  Config::default().save(&app.base_dir)?;
  println!("Configuration reset to defaults.");
  Ok(())
}
