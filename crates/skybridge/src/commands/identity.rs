use crate::context::tenant_context;
use crate::{ServiceUserCommands, TenantArgs, TrustCommands};
use colored::Colorize;
use skybridge_driver::ProxyDriver;

pub async fn service_user(driver: &ProxyDriver, cmd: ServiceUserCommands) -> anyhow::Result<()> {
    let broker = driver.broker();

    match cmd {
        ServiceUserCommands::Create {
            project,
            name,
            password,
        } => {
            let user_id = broker
                .create_service_user(&project, &name, &password)
                .await?;
            println!(
                "{} {} ({})",
                "✓ Service user created:".green().bold(),
                name,
                user_id.cyan()
            );
        }
        ServiceUserCommands::Delete { user_id } => {
            broker.delete_service_user(&user_id).await?;
            println!("{} {}", "✓ Service user deleted:".green().bold(), user_id);
        }
    }

    Ok(())
}

pub async fn trust(
    driver: &ProxyDriver,
    tenant: &TenantArgs,
    cmd: TrustCommands,
) -> anyhow::Result<()> {
    let ctx = tenant_context(tenant)?;
    let broker = driver.broker();

    match cmd {
        TrustCommands::Create { trustee, roles } => {
            let trust_id = broker
                .create_delegation_trust(&ctx, &trustee, &roles)
                .await?;
            println!("{} {}", "✓ Trust created:".green().bold(), trust_id.cyan());
        }
        TrustCommands::Delete { trust_id } => {
            broker.delete_delegation_trust(&ctx, &trust_id).await?;
            println!("{} {}", "✓ Trust deleted:".green().bold(), trust_id);
        }
    }

    Ok(())
}
