//! Phase 7 simple stubs -- commands with no arguments or minimal footprint.
//!
//! Groups: hooks, federation, audit, swarm, slot, merge_slot, pour, quick,
//! human, route, routed, epic.

use anyhow::Result;

use crate::context::RuntimeContext;

/// Execute the `bd hooks` command (stub).
pub fn run_hooks(_ctx: &RuntimeContext) -> Result<()> {
    println!("bd hooks: not yet implemented");
    Ok(())
}

/// Execute the `bd federation` command (stub).
pub fn run_federation(_ctx: &RuntimeContext) -> Result<()> {
    println!("bd federation: not yet implemented");
    Ok(())
}

/// Execute the `bd audit` command (stub).
pub fn run_audit(_ctx: &RuntimeContext) -> Result<()> {
    println!("bd audit: not yet implemented");
    Ok(())
}

/// Execute the `bd slot` command (stub).
pub fn run_slot(_ctx: &RuntimeContext) -> Result<()> {
    println!("bd slot: not yet implemented");
    Ok(())
}

/// Execute the `bd merge-slot` command (stub).
pub fn run_merge_slot(_ctx: &RuntimeContext) -> Result<()> {
    println!("bd merge-slot: not yet implemented");
    Ok(())
}

/// Execute the `bd pour` command (stub).
pub fn run_pour(_ctx: &RuntimeContext) -> Result<()> {
    println!("bd pour: not yet implemented");
    Ok(())
}

/// Execute the `bd quick` command (stub).
pub fn run_quick(_ctx: &RuntimeContext) -> Result<()> {
    println!("bd quick: not yet implemented");
    Ok(())
}

/// Execute the `bd human` command (stub).
pub fn run_human(_ctx: &RuntimeContext) -> Result<()> {
    println!("bd human: not yet implemented");
    Ok(())
}

/// Execute the `bd route` command (stub).
pub fn run_route(_ctx: &RuntimeContext) -> Result<()> {
    println!("bd route: not yet implemented");
    Ok(())
}

/// Execute the `bd routed` command (stub).
pub fn run_routed(_ctx: &RuntimeContext) -> Result<()> {
    println!("bd routed: not yet implemented");
    Ok(())
}

/// Execute the `bd epic` command (stub).
pub fn run_epic(_ctx: &RuntimeContext) -> Result<()> {
    println!("bd epic: not yet implemented");
    Ok(())
}
