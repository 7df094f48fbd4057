//! `nuget endpoints`: print the resolved endpoint map.

use nuget_client::{NuGetClient, ServiceType};
use nuget_core::error::NuGetResult;

use super::CommandContext;

pub async fn execute(ctx: &CommandContext) -> NuGetResult<()> {
    let client = ctx.connect().await?;

    for line in render(&client) {
        ctx.output.print(&line);
    }
    ctx.output.info(&format!(
        "{} of {} capabilities offered by {}",
        client.endpoints().len(),
        ServiceType::ALL.len(),
        client.index_url()
    ));
    Ok(())
}

/// One `<capability> <url>` line per resolved endpoint, in catalog order
pub fn render(client: &NuGetClient) -> Vec<String> {
    let width = client
        .endpoints()
        .iter()
        .map(|(service_type, _)| service_type.name().len())
        .max()
        .unwrap_or(0);

    client
        .endpoints()
        .iter()
        .map(|(service_type, url)| format!("{:<width$}  {}", service_type.name(), url, width = width))
        .collect()
}
