use glory_hole_domain::{CliOverrides, Config};
use tracing::info;

pub fn load_config(
    config_path: Option<&str>,
    cli_overrides: CliOverrides,
) -> anyhow::Result<Config> {
    let config = Config::load(config_path, cli_overrides)?;
    config.validate()?;

    info!(
        config_file = config_path.unwrap_or("default"),
        listen = %config.server.listen_address,
        web = %config.server.web_ui_address,
        upstreams = config.upstream_dns_servers.len(),
        blocklists = config.blocklists.len(),
        "Configuration loaded"
    );

    Ok(config)
}
