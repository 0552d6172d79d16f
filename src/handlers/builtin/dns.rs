use std::net::IpAddr;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use tracing::{debug, warn};

use crate::handlers::registry::ModuleDescriptor;
use crate::handlers::traits::{HandlerError, ModuleHandler};
use crate::handlers::types::{ConfigBag, Fields, HandlerOutput};

const NAMESERVER_KEY: &str = "nameserver";
const DNS_PORT: u16 = 53;

/// Forward lookup: hostname to its first IPv4 address
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsHandler;

impl DnsHandler {
    pub const INPUTS: [&'static str; 3] = ["hostname", "domain", "domain|ip"];

    pub fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new("dns")
            .description("Resolve a hostname or domain to its IP address")
            .inputs(Self::INPUTS)
            .config([NAMESERVER_KEY])
            .external()
    }
}

#[async_trait]
impl ModuleHandler for DnsHandler {
    async fn run(&self, fields: Fields, config: ConfigBag) -> Result<HandlerOutput, HandlerError> {
        let (key, value) = fields
            .first_str(&Self::INPUTS)
            .ok_or_else(|| HandlerError::MissingInput(Self::INPUTS.join(", ")))?;

        let host = match key {
            "domain|ip" => value.split('|').next().unwrap_or(value),
            _ => value,
        }
        .trim();

        let resolver = build_resolver(&config)?;
        debug!(host, "Resolving A record");

        let lookup = resolver
            .lookup_ip(host)
            .await
            .map_err(|err| HandlerError::Upstream(format!("DNS resolving error: {err}")))?;

        let address = lookup
            .iter()
            .find(IpAddr::is_ipv4)
            .ok_or_else(|| {
                HandlerError::Upstream(format!("DNS resolving error: no A record for {host}"))
            })?;

        Ok(HandlerOutput::values(vec![address.to_string()]))
    }
}

/// Reverse lookup: IP address to its first PTR name
#[derive(Debug, Clone, Copy, Default)]
pub struct ReverseDnsHandler;

impl ReverseDnsHandler {
    pub const INPUTS: [&'static str; 3] = ["ip-src", "ip-dst", "domain|ip"];

    pub fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new("reversedns")
            .description("Resolve an IP address to its hostname (PTR record)")
            .inputs(Self::INPUTS)
            .config([NAMESERVER_KEY])
            .external()
    }
}

#[async_trait]
impl ModuleHandler for ReverseDnsHandler {
    async fn run(&self, fields: Fields, config: ConfigBag) -> Result<HandlerOutput, HandlerError> {
        let (key, value) = fields
            .first_str(&Self::INPUTS)
            .ok_or_else(|| HandlerError::MissingInput(Self::INPUTS.join(", ")))?;

        let raw = match key {
            "domain|ip" => value.rsplit('|').next().unwrap_or(value),
            _ => value,
        }
        .trim();

        let ip: IpAddr = raw
            .parse()
            .map_err(|_| HandlerError::InvalidInput(format!("'{raw}' is not an IP address")))?;

        let resolver = build_resolver(&config)?;
        debug!(%ip, "Resolving PTR record");

        let lookup = resolver
            .reverse_lookup(ip)
            .await
            .map_err(|err| HandlerError::Upstream(format!("DNS resolving error: {err}")))?;

        let name = lookup.iter().next().ok_or_else(|| {
            HandlerError::Upstream(format!("DNS resolving error: no PTR record for {ip}"))
        })?;

        Ok(HandlerOutput::values(vec![name.to_string()]))
    }
}

/// Resolver honouring the optional `nameserver` option, system config otherwise
fn build_resolver(config: &ConfigBag) -> Result<TokioAsyncResolver, HandlerError> {
    if let Some(nameserver) = config.get(NAMESERVER_KEY) {
        let ip = parse_nameserver(nameserver)?;
        let group = NameServerConfigGroup::from_ips_clear(&[ip], DNS_PORT, true);
        let resolver_config = ResolverConfig::from_parts(None, vec![], group);
        return Ok(TokioAsyncResolver::tokio(
            resolver_config,
            ResolverOpts::default(),
        ));
    }

    Ok(TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|err| {
        warn!(error = %err, "System resolver configuration unavailable, using defaults");
        TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
    }))
}

fn parse_nameserver(value: &str) -> Result<IpAddr, HandlerError> {
    value.trim().parse().map_err(|_| {
        HandlerError::InvalidInput(format!("nameserver '{value}' is not an IP address"))
    })
}
