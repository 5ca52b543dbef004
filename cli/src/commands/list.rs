//! List command — registered allocations in registration order.

use anyhow::Result;

use crate::app::AppContext;
use crate::output::human::HumanRenderer;
use crate::output::json;

/// Run the list command.
///
/// # Errors
///
/// Returns an error if the registry cannot be opened or JSON serialization
/// fails.
pub fn run(app: &AppContext) -> Result<()> {
    let registry = app.open_registry()?;
    if app.is_json() {
        println!("{}", json::pretty(&json::allocations(registry.list()))?);
    } else {
        HumanRenderer::new(&app.output).render_allocations(registry.list());
    }
    Ok(())
}
