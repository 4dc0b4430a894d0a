use super::{Context, state_key, store};
use anyhow::bail;
use colored::Colorize;
use tokenflow_cloudflare::UserTokenState;

pub async fn handle(ctx: &Context, address: &str) -> anyhow::Result<()> {
    let manifest = ctx.manifest()?;
    let desired = manifest.token(address)?;
    let resource = ctx.resource()?;

    let lock = ctx.state.acquire_lock().await?;
    let mut global = ctx.state.load().await?;

    if global.get_resource(&state_key(address)).is_some() {
        bail!(
            "token {} is already tracked; use `tokenflow update {}`",
            address,
            address
        );
    }

    let mut state = UserTokenState::default();
    let token = resource.create(desired, &mut state).await?;

    // The secret is only returned by this call, so it is printed even when
    // tracking the new token fails.
    let tracked = match store(&mut global, address, &state) {
        Ok(()) => ctx.state.save(&global).await.map_err(anyhow::Error::from),
        Err(e) => Err(e),
    };
    if let Err(e) = tracked {
        print_value(&state);
        return Err(e.context(format!(
            "token {} was created as {} but is not tracked; \
             save the value above and delete or import the token manually",
            address, token.id
        )));
    }
    lock.release().await?;

    println!(
        "{} {} ({}) created: id {}",
        "✓".green(),
        address.cyan(),
        state.name,
        token.id
    );
    print_value(&state);

    Ok(())
}

fn print_value(state: &UserTokenState) {
    if let Some(value) = &state.value {
        println!();
        println!("{}", "Token value (shown once, store it now):".yellow().bold());
        println!("  {}", value.expose());
    }
}
