//! Subcommand implementations

mod export;
mod health;
mod install;
mod network;
mod proxy;
mod remediate;
mod resources;
mod services;
mod status;
mod sync;
mod up;

pub use export::execute as execute_export;
pub use health::execute as execute_health;
pub use install::execute as execute_install;
pub use network::execute as execute_network;
pub use proxy::execute as execute_proxy;
pub use remediate::execute as execute_remediate;
pub use resources::execute as execute_resources;
pub use services::execute as execute_services;
pub use status::execute as execute_status;
pub use sync::execute as execute_sync;
pub use up::execute as execute_up;

/// Turn a boolean facade result into a CLI error
pub(crate) fn require(ok: bool, what: &str) -> anyhow::Result<()> {
    if ok {
        println!("{}", crate::format_success(what));
        Ok(())
    } else {
        anyhow::bail!("{} failed; run with --verbose for details", what)
    }
}
