//! `nuget get`: GET a capability URL and pretty-print the JSON body.

use nuget_client::{Method, RequestOptions};
use nuget_core::error::{NuGetError, NuGetResult};
use tracing::debug;

use super::{parse_capability, CommandContext};

pub async fn execute(
    capability: String,
    path: Option<String>,
    query: Vec<(String, String)>,
    ctx: &CommandContext,
) -> NuGetResult<()> {
    let service_type = parse_capability(&capability)?;
    if service_type.is_template() {
        return Err(NuGetError::build(format!(
            "{} is a URI template, not a fetchable resource",
            service_type
        )));
    }

    let client = ctx.connect().await?;
    let url = client.endpoint_url(service_type, path.as_deref().unwrap_or_default())?;
    debug!(url = %url, "Resolved request URL");

    let options = query
        .into_iter()
        .fold(RequestOptions::new().cancellation(ctx.cancel.clone()), |options, (key, value)| {
            options.query(key, value)
        });

    let body: serde_json::Value = client.request_json(Method::GET, url, (), options).await?;
    let pretty = serde_json::to_string_pretty(&body).map_err(|e| NuGetError::Decode {
        message: format!("Failed to format response: {}", e),
        source: Some(Box::new(e)),
    })?;

    ctx.output.print(&pretty);
    Ok(())
}
