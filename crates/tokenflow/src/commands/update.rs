use super::{Context, store, tracked};
use colored::Colorize;

pub async fn handle(ctx: &Context, address: &str) -> anyhow::Result<()> {
    let manifest = ctx.manifest()?;
    let desired = manifest.token(address)?;
    let resource = ctx.resource()?;

    let lock = ctx.state.acquire_lock().await?;
    let mut global = ctx.state.load().await?;

    let mut state = tracked(&global, address)?;
    resource.update(desired, &mut state).await?;

    store(&mut global, address, &state)?;
    ctx.state.save(&global).await?;
    lock.release().await?;

    println!(
        "{} {} updated (modified {})",
        "✓".green(),
        address.cyan(),
        state.modified_on.as_deref().unwrap_or("-")
    );
    Ok(())
}
