use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    time::Duration,
};

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};
use governor::{
    clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter,
};
use tracing::warn;

use crate::{config::RateLimitConfig, error::AppError, state::AppState};

type KeyedLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Per-client budget for snippet creation: `max_requests` per window, refilled
/// continuously.
pub struct CreateLimiter {
    limiter: KeyedLimiter,
    trust_proxy: bool,
}

impl CreateLimiter {
    pub fn new(cfg: &RateLimitConfig) -> Self {
        let burst = NonZeroU32::new(cfg.max_requests).unwrap_or(NonZeroU32::MIN);
        let period = Duration::from_secs(cfg.window_secs.max(1)) / burst.get();
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);
        Self {
            limiter: RateLimiter::keyed(quota),
            trust_proxy: cfg.trust_proxy,
        }
    }

    /// Spend one unit for `ip`; false once its budget is exhausted.
    pub fn check(&self, ip: IpAddr) -> bool {
        self.limiter.check_key(&ip).is_ok()
    }

    /// Forget clients whose budget has fully refilled.
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
    }

    /// The peer address, or the first `X-Forwarded-For` hop when the
    /// service sits behind a trusted proxy.
    fn client_ip(&self, parts: &Parts) -> IpAddr {
        let forwarded = if self.trust_proxy {
            forwarded_for(parts)
        } else {
            None
        };
        forwarded
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip())
            })
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }
}

fn forwarded_for(parts: &Parts) -> Option<IpAddr> {
    parts
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
}

/// Spends one unit of the caller's snippet-creation budget.
pub struct CreateQuota;

#[async_trait]
impl FromRequestParts<AppState> for CreateQuota {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let ip = state.create_limiter.client_ip(parts);
        if state.create_limiter.check(ip) {
            Ok(CreateQuota)
        } else {
            warn!(client = %ip, "snippet creation rate limited");
            Err(AppError::RateLimited)
        }
    }
}
