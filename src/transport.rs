use std::error::Error as StdError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::redirect;
use reqwest::{Client, ClientBuilder, Url};
use url::Host;

use crate::context::ContextError;
use crate::errors::BoxError;

pub const MAX_REDIRECTS: usize = 5;
/// Hard cap on how much of a response body is ever read (10 MiB).
pub const MAX_RESPONSE_BODY: u64 = 10 << 20;
pub const USER_AGENT: &str = "PageInsightBot/1.0";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TCP_KEEPALIVE: Duration = Duration::from_secs(30);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const PAGE_POOL_SIZE: usize = 10;

/// Ranges that are globally routable on paper but must never be dialed.
const RESERVED_V4: [(Ipv4Addr, u32); 6] = [
    (Ipv4Addr::new(100, 64, 0, 0), 10),   // carrier-grade NAT (RFC 6598)
    (Ipv4Addr::new(192, 0, 0, 0), 24),    // IETF protocol assignments (RFC 6890)
    (Ipv4Addr::new(192, 0, 2, 0), 24),    // TEST-NET-1 (RFC 5737)
    (Ipv4Addr::new(198, 18, 0, 0), 15),   // benchmarking (RFC 2544)
    (Ipv4Addr::new(198, 51, 100, 0), 24), // TEST-NET-2 (RFC 5737)
    (Ipv4Addr::new(203, 0, 113, 0), 24),  // TEST-NET-3 (RFC 5737)
];

/// Returns true for any address that is not public unicast.
///
/// IPv4-mapped IPv6 addresses are unmapped first so `::ffff:127.0.0.1`
/// is judged as `127.0.0.1`.
pub fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip.to_canonical() {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => is_blocked_v6(v6),
    }
}

fn is_blocked_v4(ip: Ipv4Addr) -> bool {
    if ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_broadcast()
    {
        return true;
    }
    RESERVED_V4
        .iter()
        .any(|&(network, prefix)| in_prefix(ip, network, prefix))
}

fn is_blocked_v6(ip: Ipv6Addr) -> bool {
    ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_multicast()
        || ip.is_unicast_link_local()
        || ip.is_unique_local()
}

fn in_prefix(ip: Ipv4Addr, network: Ipv4Addr, prefix: u32) -> bool {
    let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
    (u32::from(ip) & mask) == (u32::from(network) & mask)
}

/// Which destinations a client may connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialPolicy {
    #[default]
    PublicOnly,
    /// No address filtering. Only meant for tests against local servers.
    AllowAll,
}

impl DialPolicy {
    pub fn permits(self, ip: IpAddr) -> bool {
        match self {
            DialPolicy::PublicOnly => !is_blocked_ip(ip),
            DialPolicy::AllowAll => true,
        }
    }
}

/// A request was refused by the transport before or while connecting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyViolation {
    #[error("request to private/reserved network address is not allowed: {0}")]
    BlockedAddress(IpAddr),
    #[error("request to private/reserved network address is not allowed: {0} has no public address")]
    NoPublicAddress(String),
    #[error("too many redirects: stopped after {0}")]
    TooManyRedirects(usize),
    #[error("redirect to non-http(s) scheme blocked: {0}")]
    BlockedRedirectScheme(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Policy(#[from] PolicyViolation),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("failed to build http client: {0}")]
    Build(#[source] reqwest::Error),
    #[error(transparent)]
    Canceled(#[from] ContextError),
    #[error(transparent)]
    Request(reqwest::Error),
}

impl TransportError {
    /// Pulls a policy violation out of reqwest's error chain when there is
    /// one, so a blocked redirect does not look like a plain network error.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let mut source = err.source();
        while let Some(inner) = source {
            if let Some(violation) = inner.downcast_ref::<PolicyViolation>() {
                return TransportError::Policy(violation.clone());
            }
            source = inner.source();
        }
        TransportError::Request(err)
    }

    pub fn is_policy_violation(&self) -> bool {
        matches!(self, TransportError::Policy(_))
    }
}

/// Checks a destination whose host is a literal IP. Hostnames are checked
/// after resolution by [`SafeResolver`].
pub fn check_destination(policy: DialPolicy, url: &Url) -> Result<(), PolicyViolation> {
    let ip = match url.host() {
        Some(Host::Ipv4(v4)) => IpAddr::V4(v4),
        Some(Host::Ipv6(v6)) => IpAddr::V6(v6),
        _ => return Ok(()),
    };
    if policy.permits(ip) {
        Ok(())
    } else {
        Err(PolicyViolation::BlockedAddress(ip))
    }
}

/// Decides whether a redirect to `next` may be followed, given how many
/// URLs the chain has already requested (the original one included).
pub fn check_redirect(policy: DialPolicy, next: &Url, requested: usize) -> Result<(), PolicyViolation> {
    if requested > MAX_REDIRECTS {
        return Err(PolicyViolation::TooManyRedirects(MAX_REDIRECTS));
    }
    if !matches!(next.scheme(), "http" | "https") {
        return Err(PolicyViolation::BlockedRedirectScheme(next.scheme().to_string()));
    }
    check_destination(policy, next)
}

/// DNS resolver that drops every resolved address the policy refuses.
///
/// Filtering happens on the addresses that will actually be dialed, so a
/// host that flips its records between checks cannot sneak through.
#[derive(Debug, Clone, Copy)]
pub struct SafeResolver {
    policy: DialPolicy,
}

impl SafeResolver {
    pub fn new(policy: DialPolicy) -> Self {
        Self { policy }
    }
}

impl Resolve for SafeResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let policy = self.policy;
        let host = name.as_str().to_string();
        Box::pin(async move {
            let resolved = tokio::net::lookup_host((host.as_str(), 0)).await?;
            let allowed: Vec<SocketAddr> = resolved
                .filter(|addr| {
                    let permitted = policy.permits(addr.ip());
                    if !permitted {
                        log::warn!("refusing to dial {} for host {host}", addr.ip());
                    }
                    permitted
                })
                .collect();

            if allowed.is_empty() {
                let err: BoxError = Box::new(PolicyViolation::NoPublicAddress(host));
                return Err(err);
            }
            let addrs: Addrs = Box::new(allowed.into_iter());
            Ok(addrs)
        })
    }
}

/// Builds the http clients used for fetching pages and probing links.
///
/// Both share the same dial policy; each client keeps its own pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafeTransport {
    policy: DialPolicy,
}

impl SafeTransport {
    pub fn new(policy: DialPolicy) -> Self {
        Self { policy }
    }

    pub fn check_destination(&self, url: &Url) -> Result<(), PolicyViolation> {
        check_destination(self.policy, url)
    }

    /// Client for the analyzed page: follows up to [`MAX_REDIRECTS`] safe redirects.
    pub fn page_client(&self, timeout: Duration) -> Result<Client, TransportError> {
        let policy = self.policy;
        let redirects = redirect::Policy::custom(move |attempt| {
            let requested = attempt.previous().len();
            match check_redirect(policy, attempt.url(), requested) {
                Ok(()) => attempt.follow(),
                Err(violation) => attempt.error(violation),
            }
        });

        self.builder(timeout)
            .redirect(redirects)
            .pool_max_idle_per_host(PAGE_POOL_SIZE)
            .build()
            .map_err(TransportError::Build)
    }

    /// Client for link probes: never follows redirects, pool sized to the worker count.
    pub fn probe_client(&self, timeout: Duration, pool_size: usize) -> Result<Client, TransportError> {
        self.builder(timeout)
            .redirect(redirect::Policy::none())
            .pool_max_idle_per_host(pool_size)
            .build()
            .map_err(TransportError::Build)
    }

    fn builder(&self, timeout: Duration) -> ClientBuilder {
        // A proxy would resolve names on our behalf and bypass the resolver.
        Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .tcp_keepalive(TCP_KEEPALIVE)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .no_proxy()
            .dns_resolver(Arc::new(SafeResolver::new(self.policy)))
    }
}
