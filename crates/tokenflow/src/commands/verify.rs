use super::Context;
use colored::Colorize;
use tokenflow_cloudflare::UserTokenApi;

pub async fn handle(ctx: &Context) -> anyhow::Result<()> {
    let resource = ctx.resource()?;
    let verification = resource.client().verify_user_token().await?;

    let status = if verification.status == "active" {
        verification.status.green()
    } else {
        verification.status.red()
    };
    println!("token {}: {}", verification.id, status);
    if let Some(expires_on) = verification.expires_on {
        println!("expires on {}", expires_on);
    }
    Ok(())
}
