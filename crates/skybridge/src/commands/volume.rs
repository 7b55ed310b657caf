use crate::TenantArgs;
use crate::context::{read_json, tenant_context};
use colored::Colorize;
use skybridge_cloud::{InstanceDescriptor, VolumeConnectionInfo};
use skybridge_driver::ProxyDriver;
use std::path::Path;

pub async fn attach(
    driver: &ProxyDriver,
    tenant: &TenantArgs,
    instance: &Path,
    volume: &Path,
    mountpoint: &str,
) -> anyhow::Result<()> {
    let mut ctx = tenant_context(tenant)?;
    let instance: InstanceDescriptor = read_json(instance)?;
    let volume: VolumeConnectionInfo = read_json(volume)?;

    println!(
        "{}",
        format!(
            "Attaching volume {} to '{}'...",
            volume.volume_id, instance.display_name
        )
        .yellow()
    );
    driver
        .attach_volume(&mut ctx, &instance, &volume, mountpoint)
        .await?;

    println!("{}", "✓ Volume in use".green().bold());
    Ok(())
}

pub async fn detach(
    driver: &ProxyDriver,
    tenant: &TenantArgs,
    instance: &Path,
    volume: &Path,
    mountpoint: &str,
) -> anyhow::Result<()> {
    let mut ctx = tenant_context(tenant)?;
    let instance: InstanceDescriptor = read_json(instance)?;
    let volume: VolumeConnectionInfo = read_json(volume)?;

    println!(
        "{}",
        format!(
            "Detaching volume {} from '{}'...",
            volume.volume_id, instance.display_name
        )
        .yellow()
    );
    driver
        .detach_volume(&mut ctx, &instance, &volume, mountpoint)
        .await?;

    println!("{}", "✓ Volume available".green().bold());
    Ok(())
}
