//! User agent string for outgoing requests

use crate::config::ProductSurface;
use crate::host::HostEnv;

/// Which optional segments to append to the user agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserAgentOptions {
    pub include_platform: bool,
    pub include_client_id: bool,
}

/// `<app name with whitespace as hyphens>/<host version>`
pub fn platform_pair(host: &dyn HostEnv) -> String {
    let app_name: String = host
        .app_name()
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .collect();
    format!("{}/{}", app_name, host.host_version())
}

/// Product identity segment for the active surface
pub fn product_pair(host: &dyn HostEnv) -> String {
    let product = match host.product() {
        ProductSurface::AmazonQ => "AmazonQ-For-VSCode",
        ProductSurface::Toolkit => "AWS-Toolkit-For-VSCode",
    };
    format!("{}/{}", product, host.extension_version())
}

/// Build the user agent: product, then platform, then `ClientId/<id>`.
///
/// `client_id` is only called when the client id segment is requested.
pub fn get_user_agent(
    host: &dyn HostEnv,
    options: UserAgentOptions,
    client_id: impl FnOnce() -> String,
) -> String {
    let mut pairs = vec![product_pair(host)];

    if options.include_platform {
        pairs.push(platform_pair(host));
    }

    if options.include_client_id {
        pairs.push(format!("ClientId/{}", client_id()));
    }

    pairs.join(" ")
}
