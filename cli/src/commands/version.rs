//! Version command

use anyhow::Result;

use crate::output::json;

/// Run the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn run(json_mode: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");

    if json_mode {
        println!("{}", json::pretty(&serde_json::json!({ "version": version }))?);
    } else {
        println!("agent-deploy {version}");
    }
    Ok(())
}
