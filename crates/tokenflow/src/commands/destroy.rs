use super::{Context, state_key, tracked};
use colored::Colorize;

pub async fn handle(ctx: &Context, address: &str) -> anyhow::Result<()> {
    let resource = ctx.resource()?;

    let lock = ctx.state.acquire_lock().await?;
    let mut global = ctx.state.load().await?;

    let state = tracked(&global, address)?;
    resource.delete(&state).await?;

    global.remove_resource(&state_key(address));
    ctx.state.save(&global).await?;
    lock.release().await?;

    println!("{} {} destroyed", "✓".green(), address.cyan());
    Ok(())
}
