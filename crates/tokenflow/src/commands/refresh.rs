use super::{Context, state_key, store, tracked, tracked_addresses};
use anyhow::bail;
use colored::Colorize;
use tokenflow_cloudflare::same_policy_set;

pub async fn handle(ctx: &Context, address: Option<&str>) -> anyhow::Result<()> {
    let resource = ctx.resource()?;
    // Only used to report drift; a broken manifest must not block a refresh.
    let manifest = match ctx.manifest_if_present() {
        Ok(manifest) => manifest,
        Err(e) => {
            tracing::warn!("Ignoring manifest: {:#}", e);
            eprintln!(
                "{} manifest ignored, drift is not reported: {:#}",
                "!".yellow(),
                e
            );
            None
        }
    };

    let lock = ctx.state.acquire_lock().await?;
    let mut global = ctx.state.load().await?;

    let addresses = match address {
        Some(address) => vec![address.to_string()],
        None => tracked_addresses(&global),
    };

    if addresses.is_empty() {
        println!("No tracked tokens");
    }

    let mut failed = Vec::new();
    for address in addresses {
        let mut state = match tracked(&global, &address) {
            Ok(state) => state,
            Err(e) => {
                eprintln!("{} {}: {:#}", "✗".red(), address.cyan(), e);
                failed.push(address);
                continue;
            }
        };

        match resource.read(&mut state).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!("{} was deleted outside tokenflow", address);
                global.remove_resource(&state_key(&address));
                println!(
                    "{} {} no longer exists and was removed from state",
                    "!".yellow(),
                    address.cyan()
                );
                continue;
            }
            Err(e) => {
                eprintln!("{} {}: {}", "✗".red(), address.cyan(), e);
                failed.push(address);
                continue;
            }
        }

        store(&mut global, &address, &state)?;

        let desired = manifest.as_ref().and_then(|m| m.tokens.get(&address));
        match desired {
            Some(desired)
                if desired.name != state.name
                    || !same_policy_set(&desired.policy, &state.policy) =>
            {
                println!(
                    "{} {} differs from the manifest; run `tokenflow update {}`",
                    "~".yellow(),
                    address.cyan(),
                    address
                );
            }
            _ => println!("{} {} ({})", "✓".green(), address.cyan(), state.status),
        }
    }

    // Removals and refreshes that did succeed are kept even when others failed
    ctx.state.save(&global).await?;
    lock.release().await?;

    if !failed.is_empty() {
        bail!("failed to refresh {}", failed.join(", "));
    }
    Ok(())
}
