use crate::TenantArgs;
use crate::context::{read_json, tenant_context};
use anyhow::Context;
use colored::Colorize;
use skybridge_cloud::{
    BlockDeviceDescriptor, ImageDescriptor, InjectedFile, InstanceDescriptor, PowerState,
};
use skybridge_driver::ProxyDriver;
use std::path::Path;

/// Parse `GUEST_PATH=LOCAL_PATH` and read the local file
fn injected_file(arg: &str) -> anyhow::Result<InjectedFile> {
    let (guest, local) = arg
        .split_once('=')
        .with_context(|| format!("expected GUEST_PATH=LOCAL_PATH, got '{}'", arg))?;
    let contents =
        std::fs::read(local).with_context(|| format!("failed to read injected file {}", local))?;
    Ok(InjectedFile {
        path: guest.to_string(),
        contents,
    })
}

pub async fn spawn(
    driver: &ProxyDriver,
    tenant: &TenantArgs,
    instance: &Path,
    image: &Path,
    block_devices: Option<&Path>,
    inject: &[String],
) -> anyhow::Result<()> {
    let mut ctx = tenant_context(tenant)?;
    let instance: InstanceDescriptor = read_json(instance)?;
    let image: ImageDescriptor = read_json(image)?;
    let block_devices: Vec<BlockDeviceDescriptor> = match block_devices {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };
    let files = inject
        .iter()
        .map(|arg| injected_file(arg))
        .collect::<anyhow::Result<Vec<_>>>()?;

    println!(
        "{}",
        format!("Spawning '{}' ({})...", instance.display_name, instance.uuid).yellow()
    );
    let remote_id = driver
        .spawn(&mut ctx, &instance, &image, &files, &block_devices)
        .await?;

    println!("{} {}", "✓ Active as".green().bold(), remote_id.cyan());
    Ok(())
}

pub async fn destroy(
    driver: &ProxyDriver,
    tenant: &TenantArgs,
    instance: &Path,
) -> anyhow::Result<()> {
    let mut ctx = tenant_context(tenant)?;
    let instance: InstanceDescriptor = read_json(instance)?;

    println!("{}", format!("Destroying '{}'...", instance.display_name).yellow());
    driver.destroy(&mut ctx, &instance).await?;

    println!("{}", "✓ Destroyed".green().bold());
    Ok(())
}

pub async fn power_on(
    driver: &ProxyDriver,
    tenant: &TenantArgs,
    instance: &Path,
) -> anyhow::Result<()> {
    let mut ctx = tenant_context(tenant)?;
    let instance: InstanceDescriptor = read_json(instance)?;
    driver.power_on(&mut ctx, &instance).await?;
    println!("{}", format!("✓ '{}' is running", instance.display_name).green());
    Ok(())
}

pub async fn power_off(
    driver: &ProxyDriver,
    tenant: &TenantArgs,
    instance: &Path,
) -> anyhow::Result<()> {
    let mut ctx = tenant_context(tenant)?;
    let instance: InstanceDescriptor = read_json(instance)?;
    driver.power_off(&mut ctx, &instance).await?;
    println!("{}", format!("✓ '{}' is shut off", instance.display_name).green());
    Ok(())
}

pub async fn reboot(
    driver: &ProxyDriver,
    tenant: &TenantArgs,
    instance: &Path,
) -> anyhow::Result<()> {
    let mut ctx = tenant_context(tenant)?;
    let instance: InstanceDescriptor = read_json(instance)?;
    driver.reboot(&mut ctx, &instance).await?;
    println!("{}", format!("✓ '{}' rebooted", instance.display_name).green());
    Ok(())
}

pub async fn inspect(
    driver: &ProxyDriver,
    tenant: &TenantArgs,
    instance: &Path,
) -> anyhow::Result<()> {
    let mut ctx = tenant_context(tenant)?;
    let instance: InstanceDescriptor = read_json(instance)?;
    let state = driver.inspect(&mut ctx, &instance).await?;

    let label = match state {
        PowerState::Running => state.to_string().green(),
        PowerState::NoState | PowerState::Crashed => state.to_string().red(),
        _ => state.to_string().yellow(),
    };
    println!("{}: {}", instance.display_name.bold(), label);
    Ok(())
}

pub async fn list(driver: &ProxyDriver, tenant: &TenantArgs) -> anyhow::Result<()> {
    let mut ctx = tenant_context(tenant)?;
    let ids = driver.list_instances(&mut ctx).await?;

    if ids.is_empty() {
        println!("{}", "No remote instances".dimmed());
        return Ok(());
    }
    for id in ids {
        println!("  • {}", id.cyan());
    }
    Ok(())
}

pub fn capacity(driver: &ProxyDriver, node: &str, json: bool) -> anyhow::Result<()> {
    let snapshot = driver.get_available_resource(node);

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("{}", snapshot.hypervisor_hostname.bold());
    println!("  type:      {}", snapshot.hypervisor_type);
    println!("  vcpus:     {}", snapshot.vcpus);
    println!("  memory_mb: {}", snapshot.memory_mb);
    println!("  local_gb:  {}", snapshot.local_gb);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injected_file_reads_local_path() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("motd");
        std::fs::write(&local, b"hello").unwrap();

        let file = injected_file(&format!("/etc/motd={}", local.display())).unwrap();
        assert_eq!(file.path, "/etc/motd");
        assert_eq!(file.contents, b"hello");
    }

    #[test]
    fn test_injected_file_requires_separator() {
        assert!(injected_file("/etc/motd").is_err());
    }
}
