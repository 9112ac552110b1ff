//! Well-known names shared by the client, the session store and the wire.

/// Name of the invariant variant, the fallback site and the default origin.
pub const DEFAULT_NAME: &str = "default";
pub const DEFAULT_SITE_NAME: &str = DEFAULT_NAME;
pub const DEFAULT_VARIANT_NAME: &str = DEFAULT_NAME;

/// Origin used when the client is not bound to a browsing origin.
pub const DEFAULT_ORIGIN: &str = DEFAULT_NAME;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_SITE_PATH: &str = "api/site";
pub const DEFAULT_METRICS_PATH: &str = "api/metrics";

pub const HEADER_SESSION: &str = "X-IB-Session";
pub const HEADER_SITE: &str = "X-IB-Site";

pub const PARAM_SELECT: &str = "select";
pub const PARAM_TIMESTAMP: &str = "ts";
pub const PARAM_SITE: &str = "site";
pub const PARAM_VARIANT: &str = "variant";

/// Metrics tracked per variant.
pub const METRIC_EXPOSURES: &str = "exposures";
pub const METRIC_CONVERSIONS: &str = "conversions";
pub const METRIC_CLICKS: &str = "clicks";

pub const ALGO_RANDOM: &str = "random";
pub const ALGO_EPSILON_GREEDY: &str = "epsilon-greedy-mab";

pub const DEFAULT_EPSILON: f64 = 0.02;
