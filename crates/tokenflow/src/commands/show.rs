use super::{Context, tracked, tracked_addresses};
use colored::Colorize;

pub async fn handle(ctx: &Context, address: Option<&str>, reveal: bool) -> anyhow::Result<()> {
    let global = ctx.state.load().await?;

    let addresses = match address {
        Some(address) => vec![address.to_string()],
        None => tracked_addresses(&global),
    };

    if addresses.is_empty() {
        println!("No tracked tokens");
        return Ok(());
    }

    for address in addresses {
        let state = tracked(&global, &address)?;

        println!("{}", address.cyan().bold());
        println!("  id:          {}", state.id.as_deref().unwrap_or("-"));
        println!("  name:        {}", state.name);
        println!("  status:      {}", state.status);
        println!("  issued_on:   {}", state.issued_on.as_deref().unwrap_or("-"));
        println!("  modified_on: {}", state.modified_on.as_deref().unwrap_or("-"));
        let value = match &state.value {
            Some(value) if reveal => value.expose().to_string(),
            Some(_) => "(sensitive)".dimmed().to_string(),
            None => "-".to_string(),
        };
        println!("  value:       {}", value);
        for (i, block) in state.policy.iter().enumerate() {
            println!("  policy[{}]:", i);
            println!("    resources:         {}", block.resources.join(", "));
            println!("    permission_groups: {}", block.permission_groups.join(", "));
        }
    }

    Ok(())
}
